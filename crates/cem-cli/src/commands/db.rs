//! `cem db ...` — schema lifecycle commands.

use anyhow::Result;
use clap::Subcommand;

#[derive(Subcommand)]
pub enum DbCmd {
    /// Connectivity + core-schema-presence check.
    Status,
    /// Apply all pending `sqlx::migrate!` migrations.
    Migrate,
}

pub async fn run(cmd: DbCmd) -> Result<()> {
    let pool = cem_db::connect_from_env().await?;
    match cmd {
        DbCmd::Status => {
            let s = cem_db::status(&pool).await?;
            println!("db_ok={} has_core_schema={}", s.ok, s.has_core_schema);
        }
        DbCmd::Migrate => {
            cem_db::migrate(&pool).await?;
            println!("migrations_applied=true");
        }
    }
    Ok(())
}
