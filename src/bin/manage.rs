//! Schema management for the Tennis Encounter backend
//!
//! `manage upgrade` creates missing tables in the configured store.
//! `manage schema` prints the DDL for the configured dialect.

use anyhow::{anyhow, bail, Context};
use tracing::info;
use tracing_subscriber::EnvFilter;

use tennis_encounter_backend::config::Config;
use tennis_encounter_backend::database::{schema, Database};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env().map_err(|e| anyhow!(e))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.app_env.log_level())),
        )
        .with_writer(std::io::stderr)
        .init();

    let command = std::env::args().nth(1).unwrap_or_default();
    match command.as_str() {
        "upgrade" => {
            let database = Database::new(&config.database_url)
                .await
                .with_context(|| format!("Failed to upgrade the {} store", config.dialect))?;
            info!("Schema upgraded on {} store", database.dialect());
        }
        "schema" => {
            let codec = config.dialect.guid_codec();
            for statement in schema(codec.as_ref()) {
                println!("{};", statement.trim());
            }
        }
        other => bail!("Unknown command `{other}`, expected `upgrade` or `schema`"),
    }

    Ok(())
}
