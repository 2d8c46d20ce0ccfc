//! Key-value state stores addressed by client identity.
//!
//! A store only knows how to get and put one opaque document. Coalescing,
//! retries, and staleness checks live in [`crate::persistence`] and
//! [`crate::engine`].

pub mod file;
pub mod http;
pub mod memory;

pub use file::FileStateStore;
pub use http::HttpStateStore;
pub use memory::MemoryStateStore;

use crate::config::TimeslicerConfig;
use crate::error::Result;
use crate::model::AppState;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

/// Get/put access to the stored document for one client identity.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Fetch the stored document.
    ///
    /// `Ok(None)` means there is no usable document: nothing stored yet, or
    /// the stored payload is malformed or has an unsupported version.
    async fn load(&self) -> Result<Option<AppState>>;

    /// Replace the stored document.
    async fn save(&self, state: &AppState) -> Result<()>;

    /// Short human-readable location, for logs.
    fn describe(&self) -> String;
}

/// Build the store selected by `config`: HTTP when `remote.api_base` is set,
/// otherwise a local file under [`crate::paths::state_dir`].
///
/// # Errors
///
/// Returns an error if the HTTP client cannot be constructed.
pub fn from_config(config: &TimeslicerConfig) -> Result<Arc<dyn StateStore>> {
    match config.remote.api_base.as_deref() {
        Some(base) => Ok(Arc::new(HttpStateStore::new(
            base,
            &config.remote.client_id,
            config.remote.bearer_token.clone(),
            config.request_timeout(),
        )?)),
        None => Ok(Arc::new(FileStateStore::new(
            crate::paths::state_dir(),
            &config.remote.client_id,
        ))),
    }
}

/// Decode a loaded payload, treating rejected documents as absent.
pub(crate) fn accept_loaded(value: serde_json::Value, source: &str) -> Option<AppState> {
    match AppState::from_value(value) {
        Ok(state) => Some(state),
        Err(e) => {
            warn!(source, error = %e, "ignoring stored state");
            None
        }
    }
}
