// ⚖️ Reconciliation Matcher - Propose bank-line ↔ internal-record matches
// Surfaces high-confidence candidates for human confirmation; nothing is
// auto-committed. Accept flips the statement line's conciliado flag,
// reject frees the line for re-matching.

use chrono::Duration;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::{
    self, Conciliacion, ConciliacionEstado, Extracto, MatchEstado, MatchRecord, Registro,
};

// ============================================================================
// ERRORS
// ============================================================================

/// Typed business failures; callers branch on these instead of strings
#[derive(Debug, Error)]
pub enum MatchError {
    #[error("match or batch not found")]
    NotFound,

    #[error("match already resolved")]
    AlreadyResolved,

    #[error("match belongs to a different batch")]
    BatchMismatch,

    #[error("rejection requires a non-empty reason")]
    InvalidReason,

    #[error("batch is closed")]
    BatchClosed,

    #[error(transparent)]
    Db(#[from] rusqlite::Error),
}

// ============================================================================
// PROPOSE REPORT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposeReport {
    pub conciliacion_id: i64,
    /// Matches persisted by this run, descending confidence
    pub propuestos: Vec<MatchRecord>,
    /// Statement-line ids with no candidate above the floor
    pub sin_conciliar: Vec<i64>,
    /// Lines skipped because they already carry a live match
    pub omitidos: usize,
}

impl ProposeReport {
    pub fn summary(&self) -> String {
        format!(
            "Conciliacion {}: {} propuestos, {} sin conciliar, {} omitidos",
            self.conciliacion_id,
            self.propuestos.len(),
            self.sin_conciliar.len(),
            self.omitidos
        )
    }
}

// ============================================================================
// MATCHER
// ============================================================================

pub struct Matcher {
    /// Amount tolerance in account currency (default: $0.01)
    pub tolerancia_monto: f64,

    /// Date window in days around the statement-line date (default: 5)
    pub ventana_dias: i64,

    /// Minimum confidence to persist a candidate (default: 0.5)
    pub piso_confianza: f64,
}

impl Matcher {
    pub fn new() -> Self {
        Matcher {
            tolerancia_monto: 0.01,
            ventana_dias: 5,
            piso_confianza: 0.5,
        }
    }

    pub fn with_thresholds(tolerancia_monto: f64, ventana_dias: i64, piso_confianza: f64) -> Self {
        Matcher {
            tolerancia_monto,
            ventana_dias,
            piso_confianza,
        }
    }

    /// Confidence for one extracto/registro pair, or None when outside the
    /// tolerance/window or below the floor.
    ///
    /// Weighted sum: amount 60%, date 40%. Each score decays linearly with
    /// the amount delta / day distance, so exact amount + same day is the
    /// ceiling and candidates further out rank strictly lower.
    pub fn score(&self, extracto: &Extracto, registro: &Registro) -> Option<f64> {
        let delta_monto = (extracto.monto.abs() - registro.monto.abs()).abs();
        if delta_monto > self.tolerancia_monto {
            return None;
        }

        let dias = (extracto.fecha - registro.fecha).num_days().abs();
        if dias > self.ventana_dias {
            return None;
        }

        let monto_score = (1.0 - delta_monto / (self.tolerancia_monto + 0.01)).max(0.0);
        let fecha_score = 1.0 - dias as f64 / (self.ventana_dias as f64 + 1.0);

        let confianza = monto_score * 0.6 + fecha_score * 0.4;
        (confianza >= self.piso_confianza).then_some(confianza)
    }

    /// Propose matches for every unreconciled line in an open batch.
    ///
    /// Idempotent: lines already carrying a PROPUESTO or ACEPTADO match are
    /// skipped, so a re-run creates no duplicates; RECHAZADO matches may be
    /// re-proposed. All inserts happen in one transaction.
    pub fn propose_matches(
        &self,
        conn: &mut Connection,
        conciliacion_id: i64,
    ) -> Result<ProposeReport, MatchError> {
        let batch = db::get_conciliacion(conn, conciliacion_id)
            .map_err(flatten_db)?
            .ok_or(MatchError::NotFound)?;

        if batch.estado == ConciliacionEstado::Cerrada {
            return Err(MatchError::BatchClosed);
        }

        let tx = conn.transaction()?;

        let extractos = db::get_extractos_for_batch(&tx, conciliacion_id).map_err(flatten_db)?;
        let ya_propuestos =
            db::extractos_con_match_vigente(&tx, conciliacion_id).map_err(flatten_db)?;
        let candidatos = self.load_candidates(&tx, &batch)?;
        let mut registros_usados = db::registros_con_match_vigente(&tx).map_err(flatten_db)?;

        let mut report = ProposeReport {
            conciliacion_id,
            propuestos: Vec::new(),
            sin_conciliar: Vec::new(),
            omitidos: 0,
        };

        // Extractos arrive oldest-first, so on contention for the same
        // registro the earliest statement line wins.
        for extracto in &extractos {
            if extracto.conciliado || ya_propuestos.contains(&extracto.id) {
                report.omitidos += 1;
                continue;
            }

            let best = candidatos
                .iter()
                .filter(|r| !registros_usados.contains(&r.id))
                .filter_map(|r| self.score(extracto, r).map(|c| (r, c)))
                // Candidates are in creation order; strictly-greater keeps
                // the earliest registro on a confidence tie.
                .fold(None::<(&Registro, f64)>, |acc, (r, c)| match acc {
                    Some((_, best_c)) if c <= best_c => acc,
                    _ => Some((r, c)),
                });

            match best {
                Some((registro, confianza)) => {
                    let m = MatchRecord::propuesto(
                        conciliacion_id,
                        extracto.id,
                        registro.id,
                        confianza,
                    );
                    db::insert_match(&tx, &m).map_err(flatten_db)?;
                    registros_usados.insert(registro.id);
                    report.propuestos.push(m);
                }
                None => report.sin_conciliar.push(extracto.id),
            }
        }

        tx.commit()?;

        report
            .propuestos
            .sort_by(|a, b| b.confianza.partial_cmp(&a.confianza).unwrap_or(std::cmp::Ordering::Equal));

        Ok(report)
    }

    fn load_candidates(
        &self,
        conn: &Connection,
        batch: &Conciliacion,
    ) -> Result<Vec<Registro>, MatchError> {
        let desde = batch.desde - Duration::days(self.ventana_dias);
        let hasta = batch.hasta + Duration::days(self.ventana_dias);
        db::get_registros_between(conn, desde, hasta).map_err(flatten_db)
    }

    /// Confirm a proposed match. Flips the extracto's conciliado flag and
    /// the match state in one transaction.
    pub fn accept_match(
        &self,
        conn: &mut Connection,
        match_id: &str,
        conciliacion_id: i64,
    ) -> Result<MatchRecord, MatchError> {
        let tx = conn.transaction()?;

        let m = db::get_match(&tx, match_id)
            .map_err(flatten_db)?
            .ok_or(MatchError::NotFound)?;

        if m.conciliacion_id != conciliacion_id {
            return Err(MatchError::BatchMismatch);
        }
        if m.estado != MatchEstado::Propuesto {
            return Err(MatchError::AlreadyResolved);
        }

        db::set_match_estado(&tx, match_id, MatchEstado::Aceptado, None).map_err(flatten_db)?;
        db::set_extracto_conciliado(&tx, m.extracto_id).map_err(flatten_db)?;

        tx.commit()?;

        Ok(MatchRecord {
            estado: MatchEstado::Aceptado,
            ..m
        })
    }

    /// Discard a proposed match. The extracto stays unreconciled and can be
    /// re-proposed later; the reason is mandatory.
    pub fn reject_match(
        &self,
        conn: &mut Connection,
        match_id: &str,
        motivo: &str,
    ) -> Result<MatchRecord, MatchError> {
        // Validate before touching anything
        if motivo.trim().is_empty() {
            return Err(MatchError::InvalidReason);
        }

        let tx = conn.transaction()?;

        let m = db::get_match(&tx, match_id)
            .map_err(flatten_db)?
            .ok_or(MatchError::NotFound)?;

        if m.estado != MatchEstado::Propuesto {
            return Err(MatchError::AlreadyResolved);
        }

        db::set_match_estado(&tx, match_id, MatchEstado::Rechazado, Some(motivo))
            .map_err(flatten_db)?;

        tx.commit()?;

        Ok(MatchRecord {
            estado: MatchEstado::Rechazado,
            motivo_rechazo: Some(motivo.to_string()),
            ..m
        })
    }
}

impl Default for Matcher {
    fn default() -> Self {
        Self::new()
    }
}

// db helpers return anyhow::Error; inside the matcher everything narrows to
// MatchError, with non-sqlite failures mapped to rusqlite's generic error
fn flatten_db(e: anyhow::Error) -> MatchError {
    match e.downcast::<rusqlite::Error>() {
        Ok(sql) => MatchError::Db(sql),
        Err(_) => MatchError::Db(rusqlite::Error::InvalidQuery),
    }
}

// ============================================================================
// TESTS
// ============================================================================
