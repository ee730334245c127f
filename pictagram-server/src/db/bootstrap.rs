//! Schema application and startup health probes.

use sqlx::PgPool;
use thiserror::Error;
use tracing::info;

const SCHEMA: &str = include_str!("schema.sql");

/// Errors produced while bootstrapping the database.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// A schema statement failed to apply.
    #[error("database error applying schema: {0}")]
    Sql(#[from] sqlx::Error),
}

/// Applies the messaging schema. Statements are idempotent, so running
/// at every startup is safe.
///
/// # Errors
/// Returns a [`BootstrapError`] if any statement fails.
pub async fn run(pool: &PgPool) -> Result<(), BootstrapError> {
    info!("applying database schema");
    sqlx::raw_sql(SCHEMA).execute(pool).await?;
    Ok(())
}

/// Simple liveness check used during startup.
///
/// # Errors
/// Returns the underlying [`sqlx::Error`] if the database is unreachable.
pub async fn ensure_liveness(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await.map(|_| ())
}

/// Readiness probe verifying the messaging tables exist.
///
/// # Errors
/// Returns the underlying [`sqlx::Error`] if the probe query fails.
pub async fn ensure_readiness(pool: &PgPool) -> Result<(), sqlx::Error> {
    if let Some(outcome) = readiness_override() {
        return outcome.map_err(sqlx::Error::Protocol);
    }

    sqlx::query("SELECT 1 FROM messages LIMIT 1")
        .execute(pool)
        .await
        .map(|_| ())
}

#[cfg(test)]
use std::sync::Mutex;

#[cfg(test)]
static READINESS_OVERRIDE: Mutex<Option<Result<(), String>>> = Mutex::new(None);

#[cfg(test)]
pub(crate) fn set_readiness_override(outcome: Option<Result<(), String>>) {
    *READINESS_OVERRIDE.lock().unwrap() = outcome;
}

#[cfg(test)]
fn readiness_override() -> Option<Result<(), String>> {
    READINESS_OVERRIDE.lock().unwrap().clone()
}

#[cfg(not(test))]
fn readiness_override() -> Option<Result<(), String>> {
    None
}
