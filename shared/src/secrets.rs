//! AWS Secrets Manager integration.

use aws_sdk_secretsmanager::Client as SecretsClient;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::OnceLock;
use tokio::sync::RwLock;

use crate::{Error, Result};

/// Cached secrets, shared by every invocation of a warm Lambda.
static SECRETS_CACHE: OnceLock<RwLock<HashMap<String, String>>> = OnceLock::new();

fn get_cache() -> &'static RwLock<HashMap<String, String>> {
    SECRETS_CACHE.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Database credentials from Secrets Manager.
#[derive(Deserialize)]
pub struct DatabaseCredentials {
    pub username: String,
    pub password: String,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub dbname: Option<String>,
}

impl std::fmt::Debug for DatabaseCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("dbname", &self.dbname)
            .finish()
    }
}

/// CSRF signing key from Secrets Manager.
#[derive(Deserialize)]
struct CsrfSecret {
    key: String,
}

/// Get a secret value from Secrets Manager with caching.
pub async fn get_secret(client: &SecretsClient, secret_arn: &str) -> Result<String> {
    {
        let cache = get_cache().read().await;
        if let Some(value) = cache.get(secret_arn) {
            return Ok(value.clone());
        }
    }

    let response = client
        .get_secret_value()
        .secret_id(secret_arn)
        .send()
        .await
        .map_err(|e| Error::Config(format!("Failed to get secret: {}", e)))?;

    let secret_string = response
        .secret_string()
        .ok_or_else(|| Error::Config("Secret has no string value".to_string()))?
        .to_string();

    get_cache()
        .write()
        .await
        .insert(secret_arn.to_string(), secret_string.clone());

    Ok(secret_string)
}

/// Get database credentials from Secrets Manager.
pub async fn get_database_credentials(
    client: &SecretsClient,
    secret_arn: &str,
) -> Result<DatabaseCredentials> {
    let secret_string = get_secret(client, secret_arn).await?;
    parse_database_credentials(&secret_string)
}

/// Get the CSRF signing key from Secrets Manager.
///
/// The secret is either a JSON object `{"key": "..."}` or the raw key.
pub async fn get_csrf_key(client: &SecretsClient, secret_arn: &str) -> Result<Vec<u8>> {
    let secret_string = get_secret(client, secret_arn).await?;
    Ok(parse_csrf_key(&secret_string))
}

fn parse_database_credentials(raw: &str) -> Result<DatabaseCredentials> {
    serde_json::from_str(raw)
        .map_err(|e| Error::Config(format!("Failed to parse database credentials: {}", e)))
}

fn parse_csrf_key(raw: &str) -> Vec<u8> {
    match serde_json::from_str::<CsrfSecret>(raw) {
        Ok(secret) => secret.key.into_bytes(),
        Err(_) => raw.trim().as_bytes().to_vec(),
    }
}
