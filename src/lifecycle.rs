// 🔄 Lifecycle Tables - State transitions as data
// Two closed lifecycles: fleet vehicles (motos) and workshop orders (OTs)
//
// A transition is legal iff it appears in the outbound set for the current
// state. Unknown or terminal states have an empty outbound set, so every
// request against them fails closed.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::hash::Hash;

// ============================================================================
// MOTO LIFECYCLE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MotoState {
    /// Registration paperwork in progress, not yet rentable
    #[serde(rename = "EN_PATENTAMIENTO")]
    EnPatentamiento,

    /// In the fleet, ready to rent
    #[serde(rename = "DISPONIBLE")]
    Disponible,

    /// Held for a client, contract not yet signed
    #[serde(rename = "RESERVADA")]
    Reservada,

    /// Out on an active contract
    #[serde(rename = "ALQUILADA")]
    Alquilada,

    /// In the workshop
    #[serde(rename = "EN_MANTENIMIENTO")]
    EnMantenimiento,

    /// Sold or transferred out of the fleet (terminal)
    #[serde(rename = "TRANSFERIDA")]
    Transferida,
}

impl MotoState {
    pub const ALL: [MotoState; 6] = [
        MotoState::EnPatentamiento,
        MotoState::Disponible,
        MotoState::Reservada,
        MotoState::Alquilada,
        MotoState::EnMantenimiento,
        MotoState::Transferida,
    ];

    /// Database string for this state
    pub fn as_str(&self) -> &'static str {
        match self {
            MotoState::EnPatentamiento => "EN_PATENTAMIENTO",
            MotoState::Disponible => "DISPONIBLE",
            MotoState::Reservada => "RESERVADA",
            MotoState::Alquilada => "ALQUILADA",
            MotoState::EnMantenimiento => "EN_MANTENIMIENTO",
            MotoState::Transferida => "TRANSFERIDA",
        }
    }

    pub fn parse(s: &str) -> Option<MotoState> {
        MotoState::ALL.iter().copied().find(|st| st.as_str() == s)
    }
}

// ============================================================================
// WORK ORDER LIFECYCLE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrdenTrabajoState {
    #[serde(rename = "PENDIENTE")]
    Pendiente,

    #[serde(rename = "EN_PROGRESO")]
    EnProgreso,

    /// Blocked waiting on parts
    #[serde(rename = "ESPERANDO_REPUESTOS")]
    EsperandoRepuestos,

    /// Work done and signed off (terminal)
    #[serde(rename = "COMPLETADA")]
    Completada,

    /// Abandoned (terminal)
    #[serde(rename = "CANCELADA")]
    Cancelada,
}

impl OrdenTrabajoState {
    pub const ALL: [OrdenTrabajoState; 5] = [
        OrdenTrabajoState::Pendiente,
        OrdenTrabajoState::EnProgreso,
        OrdenTrabajoState::EsperandoRepuestos,
        OrdenTrabajoState::Completada,
        OrdenTrabajoState::Cancelada,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrdenTrabajoState::Pendiente => "PENDIENTE",
            OrdenTrabajoState::EnProgreso => "EN_PROGRESO",
            OrdenTrabajoState::EsperandoRepuestos => "ESPERANDO_REPUESTOS",
            OrdenTrabajoState::Completada => "COMPLETADA",
            OrdenTrabajoState::Cancelada => "CANCELADA",
        }
    }

    pub fn parse(s: &str) -> Option<OrdenTrabajoState> {
        OrdenTrabajoState::ALL
            .iter()
            .copied()
            .find(|st| st.as_str() == s)
    }
}

// ============================================================================
// TRANSITION TABLE
// ============================================================================

/// Table-driven transition validator
///
/// Terminal states simply have no entry; `is_valid_transition` returns
/// false for any target requested from them. Self-transitions are never
/// legal, even when the table author lists one by mistake.
pub struct TransitionTable<S> {
    outbound: HashMap<S, Vec<S>>,
}

impl<S: Copy + Eq + Hash> TransitionTable<S> {
    pub fn from_edges(edges: &[(S, &[S])]) -> Self {
        let outbound = edges
            .iter()
            .map(|(from, to)| (*from, to.to_vec()))
            .collect();
        TransitionTable { outbound }
    }

    /// Check whether `current → target` is an admissible single step
    pub fn is_valid_transition(&self, current: S, target: S) -> bool {
        if current == target {
            return false;
        }
        self.outbound
            .get(&current)
            .map_or(false, |targets| targets.contains(&target))
    }

    /// States reachable in one step (empty for terminal/unknown states)
    pub fn reachable_states(&self, current: S) -> &[S] {
        self.outbound
            .get(&current)
            .map_or(&[], |targets| targets.as_slice())
    }
}

/// Fleet vehicle lifecycle
pub fn moto_transitions() -> TransitionTable<MotoState> {
    use MotoState::*;
    TransitionTable::from_edges(&[
        (EnPatentamiento, &[Disponible][..]),
        (Disponible, &[Reservada, Alquilada, EnMantenimiento, Transferida]),
        (Reservada, &[Alquilada, Disponible]),
        (Alquilada, &[Disponible, EnMantenimiento]),
        (EnMantenimiento, &[Disponible, Transferida]),
        // Transferida: terminal, no entry
    ])
}

/// Workshop order lifecycle
pub fn orden_trabajo_transitions() -> TransitionTable<OrdenTrabajoState> {
    use OrdenTrabajoState::*;
    TransitionTable::from_edges(&[
        (Pendiente, &[EnProgreso, Cancelada][..]),
        (EnProgreso, &[EsperandoRepuestos, Completada, Cancelada]),
        (EsperandoRepuestos, &[EnProgreso, Cancelada]),
        // Completada / Cancelada: terminal, no entry
    ])
}

// ============================================================================
// TESTS
// ============================================================================
