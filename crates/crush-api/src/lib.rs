pub mod comments;
pub mod convert;
pub mod error;
pub mod feed;
pub mod friends;
pub mod middleware;
pub mod notifications;
pub mod posts;
pub mod reactions;
pub mod router;
pub mod users;

use std::sync::Arc;

use serde::Deserialize;
use tracing::error;

use crush_db::Database;

pub use error::ApiError;
pub use router::router;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    /// Upper bound applied to every `limit` query parameter.
    pub max_page_size: u32,
}

/// Run an engine call off the async runtime.
pub(crate) async fn blocking<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> crush_db::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal
        })?
        .map_err(ApiError::from)
}

#[derive(Debug, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub offset: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

pub(crate) fn default_limit() -> u32 {
    20
}

impl Pagination {
    pub fn clamped(&self, max: u32) -> (u32, u32) {
        (self.offset, self.limit.clamp(1, max.max(1)))
    }
}
