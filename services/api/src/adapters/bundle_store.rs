//! services/api/src/adapters/bundle_store.rs
//!
//! This module contains the file adapter, the concrete implementation of the
//! `BundleStore` port from the `core` crate. The whole session bundle lives in a
//! single JSON document that is replaced atomically on every save.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use companion_core::domain::SessionBundle;
use companion_core::ports::{BundleStore, PortError, PortResult};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const FORMAT_VERSION: u32 = 1;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A bundle store that implements the `BundleStore` port on top of one JSON file.
#[derive(Clone, Debug)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    /// Creates a new `JsonFileStore`. The file is created on first save.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

//=========================================================================================
// On-Disk Record
//=========================================================================================

#[derive(Serialize, Deserialize)]
struct BundleRecord {
    version: u32,
    saved_at: DateTime<Utc>,
    bundle: SessionBundle,
}

//=========================================================================================
// `BundleStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl BundleStore for JsonFileStore {
    /// A missing file means nothing was saved yet. An unreadable file is
    /// discarded so the user can start fresh.
    async fn load(&self) -> PortResult<Option<SessionBundle>> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(PortError::Unexpected(format!(
                    "Failed to read '{}': {}",
                    self.path.display(),
                    e
                )))
            }
        };

        match serde_json::from_slice::<BundleRecord>(&raw) {
            Ok(record) if record.version == FORMAT_VERSION => {
                info!(path = %self.path.display(), saved_at = %record.saved_at, "Session bundle loaded");
                Ok(Some(record.bundle))
            }
            Ok(record) => {
                warn!(version = record.version, "Unsupported bundle version, starting fresh");
                self.clear().await?;
                Ok(None)
            }
            Err(e) => {
                warn!(error = %e, "Corrupt session bundle, starting fresh");
                self.clear().await?;
                Ok(None)
            }
        }
    }

    async fn save(&self, bundle: &SessionBundle) -> PortResult<()> {
        let record = BundleRecord {
            version: FORMAT_VERSION,
            saved_at: Utc::now(),
            bundle: bundle.clone(),
        };
        let json = serde_json::to_vec_pretty(&record).map_err(|e| PortError::Unexpected(e.to_string()))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| PortError::Unavailable(format!("Failed to create '{}': {}", parent.display(), e)))?;
        }

        let temp_path = self.temp_path();
        tokio::fs::write(&temp_path, json)
            .await
            .map_err(|e| PortError::Unavailable(format!("Failed to write '{}': {}", temp_path.display(), e)))?;
        tokio::fs::rename(&temp_path, &self.path)
            .await
            .map_err(|e| PortError::Unavailable(format!("Failed to replace '{}': {}", self.path.display(), e)))?;
        Ok(())
    }

    async fn clear(&self) -> PortResult<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                info!(path = %self.path.display(), "Session bundle erased");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PortError::Unexpected(format!(
                "Failed to remove '{}': {}",
                self.path.display(),
                e
            ))),
        }
    }
}
