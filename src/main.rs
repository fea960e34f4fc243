use tennis_encounter_backend::config::Config;
use tennis_encounter_backend::database::Database;
use tennis_encounter_backend::routes;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Load .env file
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.app_env.log_level())),
        )
        .init();

    // Initialize database connection
    let database = Database::new(&config.database_url).await?;

    let app = routes::router(database);

    let listener = TcpListener::bind(&config.bind_addr).await?;
    info!(
        "Server starting on {} ({} environment, {} store)",
        config.bind_addr, config.app_env, config.dialect
    );
    axum::serve(listener, app).await?;
    Ok(())
}
