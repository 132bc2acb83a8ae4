// 📒 Business-Event Ledger - Append-only audit trail + handler dispatch
// Every state-changing operation leaves exactly one event behind. Events are
// never updated; the retention sweep is the only delete path.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// BUSINESS EVENT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventStatus {
    #[serde(rename = "SUCCESS")]
    Success,
    #[serde(rename = "FAILED")]
    Failed,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Success => "SUCCESS",
            EventStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "SUCCESS" => Some(EventStatus::Success),
            "FAILED" => Some(EventStatus::Failed),
            _ => None,
        }
    }
}

/// Immutable record of one state-changing operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusinessEvent {
    pub event_id: String,
    pub operation_id: String,
    pub entity_type: String,
    pub entity_id: String,
    pub payload: Value,
    pub actor: String,
    pub status: EventStatus,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl BusinessEvent {
    pub fn success(
        operation_id: &str,
        entity_type: &str,
        entity_id: &str,
        payload: Value,
        actor: &str,
    ) -> Self {
        BusinessEvent {
            event_id: uuid::Uuid::new_v4().to_string(),
            operation_id: operation_id.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            payload,
            actor: actor.to_string(),
            status: EventStatus::Success,
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn failed(
        operation_id: &str,
        entity_type: &str,
        entity_id: &str,
        payload: Value,
        actor: &str,
        error: &str,
    ) -> Self {
        BusinessEvent {
            event_id: uuid::Uuid::new_v4().to_string(),
            operation_id: operation_id.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            payload,
            actor: actor.to_string(),
            status: EventStatus::Failed,
            error: Some(error.to_string()),
            timestamp: Utc::now(),
        }
    }
}

// ============================================================================
// PERSISTENCE
// ============================================================================

pub fn insert_event(conn: &Connection, event: &BusinessEvent) -> Result<()> {
    let payload_json = serde_json::to_string(&event.payload)?;

    conn.execute(
        "INSERT INTO eventos (
            event_id, operation_id, entity_type, entity_id, payload, actor, status, error, timestamp
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            event.event_id,
            event.operation_id,
            event.entity_type,
            event.entity_id,
            payload_json,
            event.actor,
            event.status.as_str(),
            event.error,
            event.timestamp.to_rfc3339(),
        ],
    )?;

    Ok(())
}

fn map_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<BusinessEvent> {
    let payload_json: String = row.get(4)?;
    let status_str: String = row.get(6)?;
    let timestamp_str: String = row.get(8)?;

    Ok(BusinessEvent {
        event_id: row.get(0)?,
        operation_id: row.get(1)?,
        entity_type: row.get(2)?,
        entity_id: row.get(3)?,
        payload: serde_json::from_str(&payload_json).map_err(|_| rusqlite::Error::InvalidQuery)?,
        actor: row.get(5)?,
        status: EventStatus::parse(&status_str).ok_or(rusqlite::Error::InvalidQuery)?,
        error: row.get(7)?,
        timestamp: DateTime::parse_from_rfc3339(&timestamp_str)
            .map_err(|_| rusqlite::Error::InvalidQuery)?
            .with_timezone(&Utc),
    })
}

/// Audit trail for one entity, newest first
pub fn get_events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> Result<Vec<BusinessEvent>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, operation_id, entity_type, entity_id, payload, actor, status, error, timestamp
         FROM eventos
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY timestamp DESC",
    )?;

    let events = stmt
        .query_map(params![entity_type, entity_id], map_event)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(events)
}

/// Delete events strictly older than the retention threshold.
/// Status is irrelevant; only age counts. Returns the exact count removed.
pub fn cleanup(conn: &Connection, retention_days: i64) -> Result<usize> {
    let cutoff = Utc::now() - Duration::days(retention_days);

    let deleted = conn.execute(
        "DELETE FROM eventos WHERE timestamp < ?1",
        params![cutoff.to_rfc3339()],
    )?;

    Ok(deleted)
}

// ============================================================================
// DISPATCH REGISTRY
// ============================================================================

type HandlerFn = Box<dyn Fn(&BusinessEvent) -> Result<()>>;

/// Subscriber with a wildcard pattern over operation ids
pub struct EventHandler {
    pub name: String,
    pub pattern: String,
    pub priority: i32,
    callback: HandlerFn,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandlerInfo {
    pub name: String,
    pub pattern: String,
    pub priority: i32,
}

#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    /// Handler names that ran, in invocation order
    pub invoked: Vec<String>,
    /// Handler name + error message for each failure
    pub failures: Vec<(String, String)>,
}

/// Explicitly constructed, passed-in registry (never ambient state).
/// Handlers run in descending priority; a failing handler is recorded and
/// the rest still run.
#[derive(Default)]
pub struct DispatchRegistry {
    handlers: Vec<EventHandler>,
}

impl DispatchRegistry {
    pub fn new() -> Self {
        DispatchRegistry {
            handlers: Vec::new(),
        }
    }

    pub fn register<F>(&mut self, name: &str, pattern: &str, priority: i32, callback: F)
    where
        F: Fn(&BusinessEvent) -> Result<()> + 'static,
    {
        self.handlers.push(EventHandler {
            name: name.to_string(),
            pattern: pattern.to_string(),
            priority,
            callback: Box::new(callback),
        });
        // Keep descending priority order
        self.handlers.sort_by(|a, b| b.priority.cmp(&a.priority));
    }

    /// Registry inspection for callers
    pub fn handlers(&self) -> Vec<HandlerInfo> {
        self.handlers
            .iter()
            .map(|h| HandlerInfo {
                name: h.name.clone(),
                pattern: h.pattern.clone(),
                priority: h.priority,
            })
            .collect()
    }

    /// Check if a wildcard pattern matches an operation id
    /// (`conciliacion.*` matches `conciliacion.aceptada`)
    pub fn pattern_matches(pattern: &str, operation_id: &str) -> bool {
        if !pattern.contains('*') {
            return pattern == operation_id;
        }

        let parts: Vec<&str> = pattern.split('*').collect();

        if !parts[0].is_empty() && !operation_id.starts_with(parts[0]) {
            return false;
        }
        if !parts[parts.len() - 1].is_empty() && !operation_id.ends_with(parts[parts.len() - 1]) {
            return false;
        }

        // Middle parts must appear in order
        let mut current_pos = parts[0].len();
        for part in &parts[1..parts.len() - 1] {
            if part.is_empty() {
                continue;
            }
            if let Some(pos) = operation_id[current_pos..].find(part) {
                current_pos += pos + part.len();
            } else {
                return false;
            }
        }

        true
    }

    /// Fire every matching handler. Failures are collected, printed, and do
    /// not stop later handlers or fail the triggering operation.
    pub fn dispatch(&self, event: &BusinessEvent) -> DispatchReport {
        let mut report = DispatchReport::default();

        for handler in &self.handlers {
            if !Self::pattern_matches(&handler.pattern, &event.operation_id) {
                continue;
            }

            report.invoked.push(handler.name.clone());
            if let Err(e) = (handler.callback)(event) {
                eprintln!(
                    "⚠️  Handler '{}' failed for {}: {}",
                    handler.name, event.operation_id, e
                );
                report.failures.push((handler.name.clone(), e.to_string()));
            }
        }

        report
    }
}

// ============================================================================
// EMIT / WITH_EVENT
// ============================================================================

/// Append one event and fire matching handlers
pub fn emit(
    conn: &Connection,
    registry: &DispatchRegistry,
    event: BusinessEvent,
) -> Result<(BusinessEvent, DispatchReport)> {
    insert_event(conn, &event)?;
    let report = registry.dispatch(&event);
    Ok((event, report))
}

/// Run a mutation and record exactly one event reflecting its outcome.
///
/// The mutation runs first; emission follows. On success the mutation's
/// serialized result lands in the payload under `result`. On failure a
/// FAILED event carries the error message and the original error is
/// returned unchanged to the caller.
pub fn with_event<T, F>(
    conn: &Connection,
    registry: &DispatchRegistry,
    operation_id: &str,
    entity_type: &str,
    entity_id: &str,
    actor: &str,
    extra_payload: Option<Value>,
    mutation: F,
) -> Result<T>
where
    T: Serialize,
    F: FnOnce(&Connection) -> Result<T>,
{
    let base_payload = extra_payload.unwrap_or_else(|| serde_json::json!({}));

    match mutation(conn) {
        Ok(value) => {
            let mut payload = base_payload;
            if let Value::Object(ref mut map) = payload {
                map.insert(
                    "result".to_string(),
                    serde_json::to_value(&value).unwrap_or(Value::Null),
                );
            }
            let event =
                BusinessEvent::success(operation_id, entity_type, entity_id, payload, actor);
            emit(conn, registry, event)?;
            Ok(value)
        }
        Err(e) => {
            let event = BusinessEvent::failed(
                operation_id,
                entity_type,
                entity_id,
                base_payload,
                actor,
                &e.to_string(),
            );
            // Best-effort append; the caller's error takes precedence
            let _ = emit(conn, registry, event);
            Err(e)
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::setup_database;
    use anyhow::anyhow;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    fn event_count(conn: &Connection) -> i64 {
        conn.query_row("SELECT COUNT(*) FROM eventos", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_emit_and_query() {
        let conn = test_conn();
        let registry = DispatchRegistry::new();

        let event = BusinessEvent::success(
            "moto.transicion",
            "moto",
            "moto-7",
            serde_json::json!({"de": "DISPONIBLE", "a": "ALQUILADA"}),
            "user-1",
        );
        emit(&conn, &registry, event).unwrap();

        let events = get_events_for_entity(&conn, "moto", "moto-7").unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].operation_id, "moto.transicion");
        assert_eq!(events[0].status, EventStatus::Success);
        assert!(events[0].error.is_none());
    }

    #[test]
    fn test_with_event_success() {
        let conn = test_conn();
        let registry = DispatchRegistry::new();

        let result = with_event(
            &conn,
            &registry,
            "contrato.aprobado",
            "contrato",
            "c-12",
            "user-1",
            Some(serde_json::json!({"sucursal": "CABA"})),
            |_conn| Ok(42u32),
        )
        .unwrap();

        assert_eq!(result, 42);

        let events = get_events_for_entity(&conn, "contrato", "c-12").unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].status, EventStatus::Success);
        assert_eq!(events[0].payload["result"], 42);
        assert_eq!(events[0].payload["sucursal"], "CABA");
    }

    #[test]
    fn test_with_event_failure_emits_and_reraises() {
        let conn = test_conn();
        let registry = DispatchRegistry::new();

        let result: Result<u32> = with_event(
            &conn,
            &registry,
            "contrato.aprobado",
            "contrato",
            "c-13",
            "user-1",
            None,
            |_conn| Err(anyhow!("saldo insuficiente")),
        );

        // Original error propagates
        assert_eq!(result.unwrap_err().to_string(), "saldo insuficiente");

        // Exactly one event, marked FAILED
        let events = get_events_for_entity(&conn, "contrato", "c-13").unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].status, EventStatus::Failed);
        assert_eq!(events[0].error.as_deref(), Some("saldo insuficiente"));
    }

    #[test]
    fn test_dispatch_priority_order() {
        let conn = test_conn();
        let mut registry = DispatchRegistry::new();

        let calls = Rc::new(RefCell::new(Vec::new()));

        let c1 = Rc::clone(&calls);
        registry.register("contabilidad", "contrato.*", 10, move |_e| {
            c1.borrow_mut().push("contabilidad");
            Ok(())
        });
        let c2 = Rc::clone(&calls);
        registry.register("notificaciones", "contrato.*", 100, move |_e| {
            c2.borrow_mut().push("notificaciones");
            Ok(())
        });
        let c3 = Rc::clone(&calls);
        registry.register("flota", "moto.*", 50, move |_e| {
            c3.borrow_mut().push("flota");
            Ok(())
        });

        let event = BusinessEvent::success(
            "contrato.aprobado",
            "contrato",
            "c-1",
            serde_json::json!({}),
            "user-1",
        );
        let (_, report) = emit(&conn, &registry, event).unwrap();

        // Higher priority first; non-matching handler never runs
        assert_eq!(*calls.borrow(), vec!["notificaciones", "contabilidad"]);
        assert_eq!(report.invoked, vec!["notificaciones", "contabilidad"]);
        assert!(report.failures.is_empty());
    }

    #[test]
    fn test_dispatch_failure_isolated() {
        let conn = test_conn();
        let mut registry = DispatchRegistry::new();

        let calls = Rc::new(RefCell::new(Vec::new()));

        registry.register("roto", "*", 100, |_e| Err(anyhow!("smtp down")));
        let c = Rc::clone(&calls);
        registry.register("sano", "*", 10, move |_e| {
            c.borrow_mut().push("sano");
            Ok(())
        });

        let event = BusinessEvent::success(
            "pago.registrado",
            "pago",
            "p-1",
            serde_json::json!({}),
            "user-1",
        );
        let (_, report) = emit(&conn, &registry, event).unwrap();

        // Failure recorded, later handler still ran, emit still succeeded
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, "roto");
        assert_eq!(*calls.borrow(), vec!["sano"]);
        assert_eq!(event_count(&conn), 1);
    }

    #[test]
    fn test_pattern_matching() {
        assert!(DispatchRegistry::pattern_matches("*", "anything.at.all"));
        assert!(DispatchRegistry::pattern_matches(
            "conciliacion.*",
            "conciliacion.aceptada"
        ));
        assert!(!DispatchRegistry::pattern_matches(
            "conciliacion.*",
            "contrato.aprobado"
        ));
        assert!(DispatchRegistry::pattern_matches(
            "moto.transicion",
            "moto.transicion"
        ));
        assert!(!DispatchRegistry::pattern_matches(
            "moto.transicion",
            "moto.transicion.v2"
        ));
        assert!(DispatchRegistry::pattern_matches(
            "*.aprobado",
            "contrato.aprobado"
        ));
    }

    #[test]
    fn test_handler_inspection() {
        let mut registry = DispatchRegistry::new();
        registry.register("a", "contrato.*", 1, |_e| Ok(()));
        registry.register("b", "*", 50, |_e| Ok(()));

        let infos = registry.handlers();
        assert_eq!(infos.len(), 2);
        // Sorted by descending priority
        assert_eq!(infos[0].name, "b");
        assert_eq!(infos[0].priority, 50);
        assert_eq!(infos[1].name, "a");
    }

    #[test]
    fn test_cleanup_retention() {
        let conn = test_conn();

        // One old event (backdated), two recent
        let mut old = BusinessEvent::success("op.viejo", "x", "1", serde_json::json!({}), "a");
        old.timestamp = Utc::now() - Duration::days(120);
        insert_event(&conn, &old).unwrap();

        for i in 0..2 {
            let e = BusinessEvent::success(
                "op.nuevo",
                "x",
                &i.to_string(),
                serde_json::json!({}),
                "a",
            );
            insert_event(&conn, &e).unwrap();
        }

        let deleted = cleanup(&conn, 90).unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(event_count(&conn), 2);

        // Re-running deletes nothing further
        assert_eq!(cleanup(&conn, 90).unwrap(), 0);
    }

    #[test]
    fn test_cleanup_ignores_status() {
        let conn = test_conn();

        let mut failed = BusinessEvent::failed(
            "op.viejo",
            "x",
            "1",
            serde_json::json!({}),
            "a",
            "timeout",
        );
        failed.timestamp = Utc::now() - Duration::days(100);
        insert_event(&conn, &failed).unwrap();

        let mut ok = BusinessEvent::success("op.viejo", "x", "2", serde_json::json!({}), "a");
        ok.timestamp = Utc::now() - Duration::days(100);
        insert_event(&conn, &ok).unwrap();

        assert_eq!(cleanup(&conn, 90).unwrap(), 2);
    }
}
