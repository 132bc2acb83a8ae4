// Flotilla Core - Back-office business logic for the rental fleet
// Exposes all modules for use in the CLI, route handlers, and tests

pub mod db;
pub mod ledger;
pub mod lifecycle;
pub mod matcher;

// Re-export commonly used types
pub use db::{
    cerrar_conciliacion, create_conciliacion, get_conciliacion, get_extracto,
    get_extractos_for_batch, get_match, get_matches_for_batch, get_registros_between,
    insert_extractos, insert_registro, load_extractos_csv, setup_database, Conciliacion,
    ConciliacionEstado, Extracto, ImportStats, MatchEstado, MatchRecord, Registro, RegistroTipo,
};
pub use ledger::{
    cleanup, emit, get_events_for_entity, insert_event, with_event, BusinessEvent,
    DispatchRegistry, DispatchReport, EventStatus, HandlerInfo,
};
pub use lifecycle::{
    moto_transitions, orden_trabajo_transitions, MotoState, OrdenTrabajoState, TransitionTable,
};
pub use matcher::{MatchError, Matcher, ProposeReport};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
