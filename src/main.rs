use anyhow::{bail, Result};
use rusqlite::Connection;
use std::env;
use std::path::Path;

use flotilla_core::{
    cleanup, insert_extractos, load_extractos_csv, setup_database, Matcher,
};

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    match args.get(1).map(String::as_str) {
        Some("import") if args.len() == 4 => run_import(&args[2], &args[3]),
        Some("conciliar") if args.len() == 4 => run_conciliar(&args[2], &args[3]),
        Some("eventos-cleanup") if args.len() == 4 => run_cleanup(&args[2], &args[3]),
        _ => {
            eprintln!("Uso:");
            eprintln!("  flotilla import <extractos.csv> <db>");
            eprintln!("  flotilla conciliar <db> <conciliacion-id>");
            eprintln!("  flotilla eventos-cleanup <db> <dias-retencion>");
            std::process::exit(2);
        }
    }
}

fn run_import(csv_path: &str, db_path: &str) -> Result<()> {
    println!("📂 Importando extractos desde {csv_path}...");
    let extractos = load_extractos_csv(Path::new(csv_path))?;
    println!("✓ {} lineas leidas", extractos.len());

    let conn = Connection::open(Path::new(db_path))?;
    setup_database(&conn)?;

    let stats = insert_extractos(&conn, &extractos, "cli-importador")?;
    println!("✓ Insertadas: {}", stats.insertados);
    println!("✓ Duplicadas omitidas: {}", stats.duplicados);

    Ok(())
}

fn run_conciliar(db_path: &str, batch_id: &str) -> Result<()> {
    let id: i64 = batch_id.parse()?;

    let mut conn = Connection::open(Path::new(db_path))?;
    setup_database(&conn)?;

    let matcher = Matcher::new();
    let report = match matcher.propose_matches(&mut conn, id) {
        Ok(r) => r,
        Err(e) => bail!("conciliacion {id}: {e}"),
    };

    println!("{}", report.summary());
    for m in &report.propuestos {
        println!(
            "  extracto {} ↔ registro {} (confianza {:.2})",
            m.extracto_id, m.registro_id, m.confianza
        );
    }
    if !report.sin_conciliar.is_empty() {
        println!("  Sin candidato: extractos {:?}", report.sin_conciliar);
    }

    Ok(())
}

fn run_cleanup(db_path: &str, days: &str) -> Result<()> {
    let retention: i64 = days.parse()?;

    let conn = Connection::open(Path::new(db_path))?;
    setup_database(&conn)?;

    let deleted = cleanup(&conn, retention)?;
    println!("✓ {deleted} eventos eliminados (retencion {retention} dias)");

    Ok(())
}
