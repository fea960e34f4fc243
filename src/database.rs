use sqlx::any::{install_default_drivers, AnyPoolOptions};
use sqlx::pool::PoolConnection;
use sqlx::{Any, AnyPool};
use tracing::{debug, info};

use crate::dialect::Dialect;
use crate::guid::GuidCodec;
use crate::repository::Repository;

#[derive(Clone)]
pub struct Database {
    pool: AnyPool,
    repository: Repository,
}

impl Database {
    /// Connects and makes sure every table exists.
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        let database = Self::connect(database_url).await?;
        database.migrate().await?;
        Ok(database)
    }

    /// Connects without touching the schema.
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        let dialect = Dialect::from_url(database_url).map_err(sqlx::Error::Configuration)?;
        install_default_drivers();

        let options = if is_memory_url(database_url) {
            // every connection to :memory: is its own database; keep exactly one alive
            AnyPoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            AnyPoolOptions::new()
        };
        let pool = options.connect(database_url).await?;
        info!("Connected to {} database", dialect);

        Ok(Database {
            pool,
            repository: Repository::new(dialect),
        })
    }

    /// Creates the tables that don't exist yet.
    pub async fn migrate(&self) -> Result<(), sqlx::Error> {
        for statement in schema(self.repository.codec()) {
            sqlx::query(&statement).execute(&self.pool).await?;
        }
        debug!("Schema is up to date");
        Ok(())
    }

    /// A request-scoped session. Dropping it returns the connection to the
    /// pool.
    pub async fn session(&self) -> Result<PoolConnection<Any>, sqlx::Error> {
        self.pool.acquire().await
    }

    /// Round-trips a trivial statement to check the store is reachable.
    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    pub fn dialect(&self) -> Dialect {
        self.repository.dialect()
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }
}

fn is_memory_url(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}

/// `CREATE TABLE` statements, parents before children.
pub fn schema(codec: &dyn GuidCodec) -> Vec<String> {
    let dialect = codec.dialect();
    let guid = codec.column_type();
    let (serial, integer, small_int, blob) = match dialect {
        Dialect::Sqlite => ("INTEGER PRIMARY KEY AUTOINCREMENT", "INTEGER", "SMALLINT", "BLOB"),
        Dialect::Postgres => ("BIGSERIAL PRIMARY KEY", "BIGINT", "SMALLINT", "BYTEA"),
    };

    vec![
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS cities (
                id {serial},
                name VARCHAR NOT NULL UNIQUE
            )
            "#
        ),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS states (
                id {serial},
                name VARCHAR NOT NULL UNIQUE
            )
            "#
        ),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS locations (
                id {serial},
                city_id {integer} REFERENCES cities(id),
                state_id {integer} REFERENCES states(id)
            )
            "#
        ),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id {guid} PRIMARY KEY,
                game_level {small_int},
                password {blob} NOT NULL,
                places TEXT,
                full_name VARCHAR(50) NOT NULL,
                email VARCHAR(100) NOT NULL UNIQUE,
                age {small_int} NOT NULL,
                description TEXT,
                created_at TEXT NOT NULL
            )
            "#
        ),
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS user_location_association (
                user_id {guid} NOT NULL REFERENCES users(id),
                location_id {integer} NOT NULL REFERENCES locations(id),
                PRIMARY KEY (user_id, location_id)
            )
            "#
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guid::{HexGuidCodec, NativeGuidCodec};

    #[tokio::test]
    async fn in_memory_database_is_created_and_reachable() {
        let database = Database::new("sqlite::memory:").await.unwrap();
        assert_eq!(database.dialect(), Dialect::Sqlite);
        database.ping().await.unwrap();
        // running it twice is harmless
        database.migrate().await.unwrap();
    }

    #[tokio::test]
    async fn unknown_scheme_is_a_configuration_error() {
        let err = Database::connect("mysql://localhost/tennis").await.err().unwrap();
        assert!(matches!(err, sqlx::Error::Configuration(_)));
    }

    #[test]
    fn guid_columns_follow_the_codec() {
        let sqlite = schema(&HexGuidCodec).join("\n");
        assert!(sqlite.contains("id CHAR(32) PRIMARY KEY"));
        assert!(sqlite.contains("user_id CHAR(32) NOT NULL"));
        assert!(sqlite.contains("INTEGER PRIMARY KEY AUTOINCREMENT"));

        let postgres = schema(&NativeGuidCodec).join("\n");
        assert!(postgres.contains("id UUID PRIMARY KEY"));
        assert!(postgres.contains("user_id UUID NOT NULL"));
        assert!(postgres.contains("password BYTEA NOT NULL"));
        assert!(!postgres.contains("CHAR(32)"));
    }
}
