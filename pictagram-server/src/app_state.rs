//! Application state shared across all routes.

use std::sync::Arc;

use crate::services::persistence::PersistenceGateway;

/// State handed to every route handler.
#[derive(Clone, Default)]
pub struct AppState {
    /// Database connection pool, absent when running without a database.
    pub pool: Option<sqlx::PgPool>,
    /// Persistence gateway backing the REST handlers and the relay.
    pub gateway: Option<Arc<dyn PersistenceGateway>>,
}
