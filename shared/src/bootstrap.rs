//! Startup wiring shared by the Lambda binaries.

use std::sync::Arc;

use aws_config::{BehaviorVersion, Region, SdkConfig};
use tracing::info;

use crate::config::StoreKind;
use crate::csrf::CsrfKeys;
use crate::secrets::{get_csrf_key, get_database_credentials};
use crate::store::{PgStore, ReferenceStore, Store};
use crate::{db, Config, Error, Result};

/// Load the AWS SDK configuration for the configured region.
pub async fn load_aws_config(config: &Config) -> SdkConfig {
    aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(config.aws_region.clone()))
        .load()
        .await
}

/// Connect the store selected by `RSVP_STORE`.
pub async fn connect_store(config: &Config, aws: &SdkConfig) -> Result<Arc<dyn Store>> {
    match config.store {
        StoreKind::Reference => {
            info!("Using in-memory reference store");
            Ok(Arc::new(ReferenceStore::new()))
        }
        StoreKind::Postgres => {
            let secrets_client = aws_sdk_secretsmanager::Client::new(aws);
            let credentials = get_database_credentials(&secrets_client, &config.db_secret_arn).await?;
            let pool = db::create_pool(config, &credentials).await?;
            db::migrate(&pool).await?;
            info!(host = %config.db_host, database = %config.db_name, "Connected to PostgreSQL");
            Ok(Arc::new(PgStore::new(pool)))
        }
    }
}

/// Load the CSRF signing key named by `CSRF_SECRET_ARN`.
pub async fn load_csrf_keys(config: &Config, aws: &SdkConfig) -> Result<CsrfKeys> {
    let secret_arn = config
        .csrf_secret_arn
        .as_deref()
        .ok_or_else(|| Error::Config("CSRF_SECRET_ARN not set".to_string()))?;
    let secrets_client = aws_sdk_secretsmanager::Client::new(aws);
    let key = get_csrf_key(&secrets_client, secret_arn).await?;
    CsrfKeys::from_secret(&key, config.csrf_ttl)
}
