//! Local file state store, one JSON document per client identity.
//!
//! Used when no remote service is configured. Writes go to a temporary
//! sibling first and are renamed into place so a crash never leaves a
//! half-written document.

use crate::error::{Result, TimeslicerError};
use crate::model::AppState;
use crate::store::{StateStore, accept_loaded};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::warn;

/// File-backed state store.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    /// Store documents for `client_id` under `dir`.
    pub fn new(dir: impl Into<PathBuf>, client_id: &str) -> Self {
        let dir = dir.into();
        Self {
            path: dir.join(format!("{}.json", file_stem(client_id))),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Client ids are free text; keep only characters safe in a file name.
fn file_stem(client_id: &str) -> String {
    let stem: String = client_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if stem.is_empty() {
        "default".to_owned()
    } else {
        stem
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn load(&self) -> Result<Option<AppState>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice::<serde_json::Value>(&bytes) {
            Ok(value) => Ok(accept_loaded(value, &self.path.display().to_string())),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "stored state is not valid JSON");
                Ok(None)
            }
        }
    }

    async fn save(&self, state: &AppState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                TimeslicerError::Store(format!(
                    "cannot create state directory {}: {e}",
                    parent.display()
                ))
            })?;
        }

        let json = serde_json::to_vec_pretty(state)
            .map_err(|e| TimeslicerError::Store(format!("cannot serialize state: {e}")))?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await.map_err(|e| {
            TimeslicerError::Store(format!("cannot write {}: {e}", tmp.display()))
        })?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(|e| {
            TimeslicerError::Store(format!("cannot replace {}: {e}", self.path.display()))
        })?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }
}
