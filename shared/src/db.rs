//! Database connection management.

use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};

use crate::secrets::DatabaseCredentials;
use crate::{Config, Error, Result};

/// Connection settings from the secret, falling back to config for the
/// host and database name.
pub fn connect_options(config: &Config, credentials: &DatabaseCredentials) -> PgConnectOptions {
    PgConnectOptions::new()
        .host(credentials.host.as_deref().unwrap_or(&config.db_host))
        .port(credentials.port.unwrap_or(5432))
        .username(&credentials.username)
        .password(&credentials.password)
        .database(credentials.dbname.as_deref().unwrap_or(&config.db_name))
}

/// Create a database connection pool.
pub async fn create_pool(config: &Config, credentials: &DatabaseCredentials) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(config.request_timeout)
        .connect_with(connect_options(config, credentials))
        .await
        .map_err(|e| Error::StoreFailure(format!("Failed to connect to database: {}", e)))
}

/// Apply pending schema migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| Error::StoreFailure(format!("Failed to run migrations: {}", e)))
}
