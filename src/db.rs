use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::Path;

use crate::ledger::{insert_event, BusinessEvent};

// ============================================================================
// EXTRACTO (imported bank-statement line)
// ============================================================================

/// Imported bank-statement line
///
/// Immutable after import except for the `conciliado` flip when a match is
/// accepted. The idempotency hash makes re-importing the same file a no-op.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Extracto {
    /// Database rowid (0 until inserted)
    #[serde(default)]
    pub id: i64,

    /// Batch this line belongs to (claimed when a Conciliacion is created)
    #[serde(default)]
    pub conciliacion_id: Option<i64>,

    #[serde(rename = "Cuenta")]
    pub cuenta: String,

    #[serde(rename = "Fecha")]
    pub fecha: NaiveDate,

    #[serde(rename = "Monto")]
    pub monto: f64,

    #[serde(rename = "Descripcion")]
    pub descripcion: String,

    #[serde(default)]
    pub conciliado: bool,
}

impl Extracto {
    /// Idempotency hash for duplicate detection on import
    pub fn compute_idempotency_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format!(
            "{}{}{}{}",
            self.cuenta, self.fecha, self.monto, self.descripcion
        ));
        format!("{:x}", hasher.finalize())
    }
}

// ============================================================================
// CONCILIACION (reconciliation batch)
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConciliacionEstado {
    #[serde(rename = "ABIERTA")]
    Abierta,
    #[serde(rename = "CERRADA")]
    Cerrada,
}

impl ConciliacionEstado {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConciliacionEstado::Abierta => "ABIERTA",
            ConciliacionEstado::Cerrada => "CERRADA",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ABIERTA" => Some(ConciliacionEstado::Abierta),
            "CERRADA" => Some(ConciliacionEstado::Cerrada),
            _ => None,
        }
    }
}

/// Groups statement lines for one bank account over a date range
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conciliacion {
    pub id: i64,
    pub cuenta: String,
    pub desde: NaiveDate,
    pub hasta: NaiveDate,
    pub estado: ConciliacionEstado,
}

// ============================================================================
// REGISTRO (internal financial record)
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistroTipo {
    #[serde(rename = "FACTURA")]
    Factura,
    #[serde(rename = "PAGO")]
    Pago,
    #[serde(rename = "GASTO")]
    Gasto,
}

impl RegistroTipo {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegistroTipo::Factura => "FACTURA",
            RegistroTipo::Pago => "PAGO",
            RegistroTipo::Gasto => "GASTO",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "FACTURA" => Some(RegistroTipo::Factura),
            "PAGO" => Some(RegistroTipo::Pago),
            "GASTO" => Some(RegistroTipo::Gasto),
            _ => None,
        }
    }
}

/// Internal record a statement line can be matched against
/// (invoice, incoming payment, or expense)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registro {
    #[serde(default)]
    pub id: i64,
    pub tipo: RegistroTipo,
    pub fecha: NaiveDate,
    pub monto: f64,
    pub descripcion: String,
}

// ============================================================================
// MATCH (proposed link extracto ↔ registro)
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchEstado {
    #[serde(rename = "PROPUESTO")]
    Propuesto,
    #[serde(rename = "ACEPTADO")]
    Aceptado,
    #[serde(rename = "RECHAZADO")]
    Rechazado,
}

impl MatchEstado {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchEstado::Propuesto => "PROPUESTO",
            MatchEstado::Aceptado => "ACEPTADO",
            MatchEstado::Rechazado => "RECHAZADO",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PROPUESTO" => Some(MatchEstado::Propuesto),
            "ACEPTADO" => Some(MatchEstado::Aceptado),
            "RECHAZADO" => Some(MatchEstado::Rechazado),
            _ => None,
        }
    }
}

/// One candidate link between a statement line and an internal record.
/// Leaves PROPUESTO at most once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchRecord {
    pub id: String,
    pub conciliacion_id: i64,
    pub extracto_id: i64,
    pub registro_id: i64,
    pub confianza: f64,
    pub estado: MatchEstado,
    pub motivo_rechazo: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl MatchRecord {
    pub fn propuesto(
        conciliacion_id: i64,
        extracto_id: i64,
        registro_id: i64,
        confianza: f64,
    ) -> Self {
        MatchRecord {
            id: uuid::Uuid::new_v4().to_string(),
            conciliacion_id,
            extracto_id,
            registro_id,
            confianza,
            estado: MatchEstado::Propuesto,
            motivo_rechazo: None,
            created_at: Utc::now(),
        }
    }
}

// ============================================================================
// SCHEMA
// ============================================================================

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS extractos (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            idempotency_hash TEXT UNIQUE NOT NULL,
            conciliacion_id INTEGER,
            cuenta TEXT NOT NULL,
            fecha TEXT NOT NULL,
            monto REAL NOT NULL,
            descripcion TEXT NOT NULL,
            conciliado INTEGER NOT NULL DEFAULT 0,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS conciliaciones (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            cuenta TEXT NOT NULL,
            desde TEXT NOT NULL,
            hasta TEXT NOT NULL,
            estado TEXT NOT NULL DEFAULT 'ABIERTA',
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS registros (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            tipo TEXT NOT NULL,
            fecha TEXT NOT NULL,
            monto REAL NOT NULL,
            descripcion TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS matches (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            match_uuid TEXT UNIQUE NOT NULL,
            conciliacion_id INTEGER NOT NULL,
            extracto_id INTEGER NOT NULL,
            registro_id INTEGER NOT NULL,
            confianza REAL NOT NULL,
            estado TEXT NOT NULL,
            motivo_rechazo TEXT,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    // Append-only business-event ledger
    conn.execute(
        "CREATE TABLE IF NOT EXISTS eventos (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            operation_id TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            payload TEXT NOT NULL,
            actor TEXT NOT NULL,
            status TEXT NOT NULL,
            error TEXT,
            timestamp TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_extractos_batch ON extractos(conciliacion_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_extractos_cuenta_fecha ON extractos(cuenta, fecha)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_matches_batch ON matches(conciliacion_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_eventos_entity ON eventos(entity_type, entity_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_eventos_timestamp ON eventos(timestamp)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// EXTRACTO IMPORT
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct ImportStats {
    pub insertados: usize,
    pub duplicados: usize,
}

pub fn load_extractos_csv(csv_path: &Path) -> Result<Vec<Extracto>> {
    let mut rdr = csv::Reader::from_path(csv_path).context("Failed to open extractos CSV")?;

    let mut extractos = Vec::new();
    for result in rdr.deserialize() {
        let extracto: Extracto = result.context("Failed to deserialize extracto row")?;
        extractos.push(extracto);
    }

    Ok(extractos)
}

/// Insert statement lines, skipping lines already imported (same hash).
/// One `extracto.importado` event is appended per inserted line.
pub fn insert_extractos(
    conn: &Connection,
    extractos: &[Extracto],
    actor: &str,
) -> Result<ImportStats> {
    let mut stats = ImportStats::default();

    for linea in extractos {
        let hash = linea.compute_idempotency_hash();

        let result = conn.execute(
            "INSERT INTO extractos (
                idempotency_hash, conciliacion_id, cuenta, fecha, monto, descripcion, conciliado
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0)",
            params![
                hash,
                linea.conciliacion_id,
                linea.cuenta,
                linea.fecha.to_string(),
                linea.monto,
                linea.descripcion,
            ],
        );

        match result {
            Ok(_) => {
                stats.insertados += 1;

                let extracto_id = conn.last_insert_rowid();
                let event = BusinessEvent::success(
                    "extracto.importado",
                    "extracto",
                    &extracto_id.to_string(),
                    serde_json::json!({
                        "cuenta": linea.cuenta,
                        "fecha": linea.fecha,
                        "monto": linea.monto,
                    }),
                    actor,
                );
                let _ = insert_event(conn, &event);
            }
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                stats.duplicados += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(stats)
}

fn map_extracto(row: &rusqlite::Row<'_>) -> rusqlite::Result<Extracto> {
    let fecha_str: String = row.get(3)?;
    Ok(Extracto {
        id: row.get(0)?,
        conciliacion_id: row.get(1)?,
        cuenta: row.get(2)?,
        fecha: NaiveDate::parse_from_str(&fecha_str, "%Y-%m-%d")
            .map_err(|_| rusqlite::Error::InvalidQuery)?,
        monto: row.get(4)?,
        descripcion: row.get(5)?,
        conciliado: row.get::<_, i64>(6)? != 0,
    })
}

pub fn get_extracto(conn: &Connection, id: i64) -> Result<Option<Extracto>> {
    let mut stmt = conn.prepare(
        "SELECT id, conciliacion_id, cuenta, fecha, monto, descripcion, conciliado
         FROM extractos WHERE id = ?1",
    )?;

    let mut rows = stmt.query_map(params![id], map_extracto)?;
    rows.next().transpose().map_err(Into::into)
}

/// Statement lines claimed by a batch, oldest first (tie broken by rowid)
pub fn get_extractos_for_batch(conn: &Connection, conciliacion_id: i64) -> Result<Vec<Extracto>> {
    let mut stmt = conn.prepare(
        "SELECT id, conciliacion_id, cuenta, fecha, monto, descripcion, conciliado
         FROM extractos
         WHERE conciliacion_id = ?1
         ORDER BY fecha ASC, id ASC",
    )?;

    let extractos = stmt
        .query_map(params![conciliacion_id], map_extracto)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(extractos)
}

pub fn set_extracto_conciliado(conn: &Connection, extracto_id: i64) -> Result<()> {
    conn.execute(
        "UPDATE extractos SET conciliado = 1 WHERE id = ?1",
        params![extracto_id],
    )?;
    Ok(())
}

// ============================================================================
// CONCILIACION CRUD
// ============================================================================

/// Create a batch and claim the account's unassigned lines in range.
/// Claiming runs in the same transaction as the insert so a partially
/// claimed batch cannot be observed.
pub fn create_conciliacion(
    conn: &mut Connection,
    cuenta: &str,
    desde: NaiveDate,
    hasta: NaiveDate,
) -> Result<Conciliacion> {
    let tx = conn.transaction()?;

    tx.execute(
        "INSERT INTO conciliaciones (cuenta, desde, hasta, estado) VALUES (?1, ?2, ?3, 'ABIERTA')",
        params![cuenta, desde.to_string(), hasta.to_string()],
    )?;
    let id = tx.last_insert_rowid();

    tx.execute(
        "UPDATE extractos SET conciliacion_id = ?1
         WHERE cuenta = ?2 AND conciliacion_id IS NULL
           AND fecha >= ?3 AND fecha <= ?4",
        params![id, cuenta, desde.to_string(), hasta.to_string()],
    )?;

    tx.commit()?;

    Ok(Conciliacion {
        id,
        cuenta: cuenta.to_string(),
        desde,
        hasta,
        estado: ConciliacionEstado::Abierta,
    })
}

pub fn get_conciliacion(conn: &Connection, id: i64) -> Result<Option<Conciliacion>> {
    let mut stmt =
        conn.prepare("SELECT id, cuenta, desde, hasta, estado FROM conciliaciones WHERE id = ?1")?;

    let mut rows = stmt.query_map(params![id], |row| {
        let desde_str: String = row.get(2)?;
        let hasta_str: String = row.get(3)?;
        let estado_str: String = row.get(4)?;
        Ok(Conciliacion {
            id: row.get(0)?,
            cuenta: row.get(1)?,
            desde: NaiveDate::parse_from_str(&desde_str, "%Y-%m-%d")
                .map_err(|_| rusqlite::Error::InvalidQuery)?,
            hasta: NaiveDate::parse_from_str(&hasta_str, "%Y-%m-%d")
                .map_err(|_| rusqlite::Error::InvalidQuery)?,
            estado: ConciliacionEstado::parse(&estado_str).ok_or(rusqlite::Error::InvalidQuery)?,
        })
    })?;

    rows.next().transpose().map_err(Into::into)
}

pub fn cerrar_conciliacion(conn: &Connection, id: i64) -> Result<()> {
    conn.execute(
        "UPDATE conciliaciones SET estado = 'CERRADA' WHERE id = ?1",
        params![id],
    )?;
    Ok(())
}

// ============================================================================
// REGISTRO CRUD
// ============================================================================

pub fn insert_registro(conn: &Connection, registro: &Registro) -> Result<i64> {
    conn.execute(
        "INSERT INTO registros (tipo, fecha, monto, descripcion) VALUES (?1, ?2, ?3, ?4)",
        params![
            registro.tipo.as_str(),
            registro.fecha.to_string(),
            registro.monto,
            registro.descripcion,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Internal records in a date range, in creation order (rowid)
pub fn get_registros_between(
    conn: &Connection,
    desde: NaiveDate,
    hasta: NaiveDate,
) -> Result<Vec<Registro>> {
    let mut stmt = conn.prepare(
        "SELECT id, tipo, fecha, monto, descripcion FROM registros
         WHERE fecha >= ?1 AND fecha <= ?2
         ORDER BY id ASC",
    )?;

    let registros = stmt
        .query_map(params![desde.to_string(), hasta.to_string()], |row| {
            let tipo_str: String = row.get(1)?;
            let fecha_str: String = row.get(2)?;
            Ok(Registro {
                id: row.get(0)?,
                tipo: RegistroTipo::parse(&tipo_str).ok_or(rusqlite::Error::InvalidQuery)?,
                fecha: NaiveDate::parse_from_str(&fecha_str, "%Y-%m-%d")
                    .map_err(|_| rusqlite::Error::InvalidQuery)?,
                monto: row.get(3)?,
                descripcion: row.get(4)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(registros)
}

// ============================================================================
// MATCH CRUD
// ============================================================================

fn map_match(row: &rusqlite::Row<'_>) -> rusqlite::Result<MatchRecord> {
    let estado_str: String = row.get(5)?;
    let created_str: String = row.get(7)?;
    Ok(MatchRecord {
        id: row.get(0)?,
        conciliacion_id: row.get(1)?,
        extracto_id: row.get(2)?,
        registro_id: row.get(3)?,
        confianza: row.get(4)?,
        estado: MatchEstado::parse(&estado_str).ok_or(rusqlite::Error::InvalidQuery)?,
        motivo_rechazo: row.get(6)?,
        created_at: DateTime::parse_from_rfc3339(&created_str)
            .map_err(|_| rusqlite::Error::InvalidQuery)?
            .with_timezone(&Utc),
    })
}

const MATCH_COLUMNS: &str = "match_uuid, conciliacion_id, extracto_id, registro_id, confianza, \
                             estado, motivo_rechazo, created_at";

pub fn insert_match(conn: &Connection, m: &MatchRecord) -> Result<()> {
    conn.execute(
        "INSERT INTO matches (
            match_uuid, conciliacion_id, extracto_id, registro_id,
            confianza, estado, motivo_rechazo, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            m.id,
            m.conciliacion_id,
            m.extracto_id,
            m.registro_id,
            m.confianza,
            m.estado.as_str(),
            m.motivo_rechazo,
            m.created_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

pub fn get_match(conn: &Connection, match_id: &str) -> Result<Option<MatchRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {MATCH_COLUMNS} FROM matches WHERE match_uuid = ?1"
    ))?;

    let mut rows = stmt.query_map(params![match_id], map_match)?;
    rows.next().transpose().map_err(Into::into)
}

/// All matches in a batch, best candidates first
pub fn get_matches_for_batch(conn: &Connection, conciliacion_id: i64) -> Result<Vec<MatchRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {MATCH_COLUMNS} FROM matches
         WHERE conciliacion_id = ?1
         ORDER BY confianza DESC, created_at ASC"
    ))?;

    let matches = stmt
        .query_map(params![conciliacion_id], map_match)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(matches)
}

pub fn set_match_estado(
    conn: &Connection,
    match_id: &str,
    estado: MatchEstado,
    motivo_rechazo: Option<&str>,
) -> Result<()> {
    conn.execute(
        "UPDATE matches SET estado = ?1, motivo_rechazo = ?2 WHERE match_uuid = ?3",
        params![estado.as_str(), motivo_rechazo, match_id],
    )?;
    Ok(())
}

/// Statement-line ids in a batch that already carry a PROPUESTO or ACEPTADO
/// match. Rejected matches do not block re-proposal.
pub fn extractos_con_match_vigente(
    conn: &Connection,
    conciliacion_id: i64,
) -> Result<HashSet<i64>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT extracto_id FROM matches
         WHERE conciliacion_id = ?1 AND estado IN ('PROPUESTO', 'ACEPTADO')",
    )?;

    let ids = stmt
        .query_map(params![conciliacion_id], |row| row.get::<_, i64>(0))?
        .collect::<rusqlite::Result<HashSet<_>>>()?;

    Ok(ids)
}

/// Internal-record ids already tied up by a PROPUESTO or ACEPTADO match
pub fn registros_con_match_vigente(conn: &Connection) -> Result<HashSet<i64>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT registro_id FROM matches WHERE estado IN ('PROPUESTO', 'ACEPTADO')",
    )?;

    let ids = stmt
        .query_map([], |row| row.get::<_, i64>(0))?
        .collect::<rusqlite::Result<HashSet<_>>>()?;

    Ok(ids)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn fecha(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn create_test_extracto(cuenta: &str, fecha_str: &str, monto: f64, desc: &str) -> Extracto {
        Extracto {
            id: 0,
            conciliacion_id: None,
            cuenta: cuenta.to_string(),
            fecha: fecha(fecha_str),
            monto,
            descripcion: desc.to_string(),
            conciliado: false,
        }
    }

    #[test]
    fn test_import_idempotency() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let extractos = vec![
            create_test_extracto("BANCO_GALICIA_CC", "2025-06-10", 50000.0, "TRANSFERENCIA RECIBIDA"),
            create_test_extracto("BANCO_GALICIA_CC", "2025-06-11", -12000.0, "DEBITO SEGURO"),
        ];

        let first = insert_extractos(&conn, &extractos, "importador").unwrap();
        assert_eq!(first.insertados, 2);
        assert_eq!(first.duplicados, 0);

        // Second import of the same file inserts nothing
        let second = insert_extractos(&conn, &extractos, "importador").unwrap();
        assert_eq!(second.insertados, 0);
        assert_eq!(second.duplicados, 2);

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM extractos", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn test_import_emits_events() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let extractos = vec![create_test_extracto(
            "BANCO_GALICIA_CC",
            "2025-06-10",
            50000.0,
            "TRANSFERENCIA",
        )];
        insert_extractos(&conn, &extractos, "importador").unwrap();

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM eventos WHERE operation_id = 'extracto.importado'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_idempotency_hash_stable() {
        let e = create_test_extracto("BANCO_GALICIA_CC", "2025-06-10", 50000.0, "TRANSFERENCIA");
        assert_eq!(e.compute_idempotency_hash(), e.compute_idempotency_hash());
        assert_eq!(e.compute_idempotency_hash().len(), 64);

        let other = create_test_extracto("BANCO_GALICIA_CC", "2025-06-10", 50000.5, "TRANSFERENCIA");
        assert_ne!(e.compute_idempotency_hash(), other.compute_idempotency_hash());
    }

    #[test]
    fn test_create_conciliacion_claims_lines() {
        let mut conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let extractos = vec![
            create_test_extracto("BANCO_GALICIA_CC", "2025-06-10", 50000.0, "A"),
            create_test_extracto("BANCO_GALICIA_CC", "2025-06-20", -3000.0, "B"),
            // Outside the range, stays unclaimed
            create_test_extracto("BANCO_GALICIA_CC", "2025-07-05", 900.0, "C"),
            // Other account, stays unclaimed
            create_test_extracto("BANCO_NACION_CC", "2025-06-12", 100.0, "D"),
        ];
        insert_extractos(&conn, &extractos, "importador").unwrap();

        let batch = create_conciliacion(
            &mut conn,
            "BANCO_GALICIA_CC",
            fecha("2025-06-01"),
            fecha("2025-06-30"),
        )
        .unwrap();

        assert_eq!(batch.estado, ConciliacionEstado::Abierta);

        let claimed = get_extractos_for_batch(&conn, batch.id).unwrap();
        assert_eq!(claimed.len(), 2);
        assert_eq!(claimed[0].descripcion, "A");
        assert_eq!(claimed[1].descripcion, "B");
    }

    #[test]
    fn test_match_round_trip() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let m = MatchRecord::propuesto(1, 10, 20, 0.92);
        insert_match(&conn, &m).unwrap();

        let loaded = get_match(&conn, &m.id).unwrap().unwrap();
        assert_eq!(loaded.extracto_id, 10);
        assert_eq!(loaded.registro_id, 20);
        assert_eq!(loaded.estado, MatchEstado::Propuesto);
        assert!(loaded.motivo_rechazo.is_none());

        set_match_estado(&conn, &m.id, MatchEstado::Rechazado, Some("monto incorrecto")).unwrap();
        let rejected = get_match(&conn, &m.id).unwrap().unwrap();
        assert_eq!(rejected.estado, MatchEstado::Rechazado);
        assert_eq!(rejected.motivo_rechazo.as_deref(), Some("monto incorrecto"));
    }

    #[test]
    fn test_registros_between() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        for (f, monto) in [("2025-06-05", 100.0), ("2025-06-15", 200.0), ("2025-07-02", 300.0)] {
            insert_registro(
                &conn,
                &Registro {
                    id: 0,
                    tipo: RegistroTipo::Factura,
                    fecha: fecha(f),
                    monto,
                    descripcion: "Factura".to_string(),
                },
            )
            .unwrap();
        }

        let en_junio =
            get_registros_between(&conn, fecha("2025-06-01"), fecha("2025-06-30")).unwrap();
        assert_eq!(en_junio.len(), 2);
        assert_eq!(en_junio[0].monto, 100.0);
    }
}
