use std::env;
use std::sync::Arc;

use anyhow::{Context, Result};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

use paperscout::{
    config::AppConfig,
    db,
    ledger::{VersionLedger, DEFAULT_KEEP_VERSIONS},
    store::PgMetadataStore,
};

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

const USAGE: &str = "Usage: maintenance migrate | prune-versions <record_id> [keep]";

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut args = env::args().skip(1);
    match args.next().as_deref() {
        Some("migrate") => migrate()?,
        Some("prune-versions") => {
            let record_id = args
                .next()
                .context("prune-versions requires a record id")?
                .parse()
                .context("record id must be an integer")?;
            let keep = match args.next() {
                Some(raw) => raw.parse().context("keep must be an integer")?,
                None => DEFAULT_KEEP_VERSIONS,
            };
            prune_versions(record_id, keep).await?;
        }
        Some(cmd) => {
            eprintln!("Unknown command: {cmd}\n{USAGE}");
            std::process::exit(1);
        }
        None => {
            eprintln!("{USAGE}");
            std::process::exit(1);
        }
    }

    Ok(())
}

fn migrate() -> Result<()> {
    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "maintenance",
        database_url = %config.redacted_database_url(),
        "running pending migrations"
    );
    let pool = db::init_pool(&config.database_url, config.database_max_pool_size)?;
    let mut conn = pool.get().context("failed to get database connection")?;
    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(|err| anyhow::anyhow!("failed to run migrations: {err}"))?;
    println!("Applied {} migrations.", applied.len());
    Ok(())
}

async fn prune_versions(record_id: i64, keep: usize) -> Result<()> {
    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "maintenance",
        database_url = %config.redacted_database_url(),
        record_id,
        keep,
        "pruning version history"
    );
    let pool = db::init_pool(&config.database_url, config.database_max_pool_size)?;
    let ledger = VersionLedger::new(Arc::new(PgMetadataStore::new(pool)));

    let deleted = ledger
        .prune(record_id, keep)
        .await
        .with_context(|| format!("failed to prune versions of record {record_id}"))?;
    println!("Deleted {deleted} archived versions.");
    Ok(())
}
