//! Toolchain artifact installation
//!
//! Ensures the toolchain artifact is present in a target directory,
//! fetching it from its release URL when absent. Installation is
//! idempotent: an artifact already on disk is never re-fetched or
//! overwritten. Failed fetches surface directly to the caller; this is a
//! one-time setup action, so there is no retry logic.

use crate::error::{BridgeError, Result};
use std::path::{Path, PathBuf};

/// Result of an installation check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnsureOutcome {
    /// The artifact was already on disk; nothing was fetched
    AlreadyPresent(PathBuf),
    /// The artifact was fetched and written
    Installed(PathBuf),
}

impl EnsureOutcome {
    /// Path to the artifact on disk
    pub fn path(&self) -> &Path {
        match self {
            Self::AlreadyPresent(path) | Self::Installed(path) => path,
        }
    }
}

/// Installer for the toolchain artifact
pub struct Installer {
    /// HTTP client
    client: reqwest::Client,
}

impl Installer {
    /// Create a new installer
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| BridgeError::Fetch(e.to_string()))?;

        Ok(Self { client })
    }

    /// Ensure the artifact `artifact_name` exists in `target_dir`
    ///
    /// If `target_dir/artifact_name` exists the call returns immediately.
    /// Otherwise the artifact bytes are fetched from `source_url` and
    /// written atomically (temp file, then rename), so a failed or
    /// interrupted download never leaves a partial artifact at the
    /// expected path.
    pub async fn ensure_installed(
        &self,
        target_dir: &Path,
        artifact_name: &str,
        source_url: &str,
    ) -> Result<EnsureOutcome> {
        let artifact_path = target_dir.join(artifact_name);

        if artifact_path.exists() {
            tracing::debug!(path = %artifact_path.display(), "artifact already present");
            return Ok(EnsureOutcome::AlreadyPresent(artifact_path));
        }

        tokio::fs::create_dir_all(target_dir)
            .await
            .map_err(|e| BridgeError::Write(format!("{}: {}", target_dir.display(), e)))?;

        tracing::info!(url = source_url, "fetching toolchain artifact");
        let response = self
            .client
            .get(source_url)
            .send()
            .await
            .map_err(|e| BridgeError::Fetch(e.to_string()))?;

        if !response.status().is_success() {
            return Err(BridgeError::Fetch(format!(
                "{} returned {}",
                source_url,
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| BridgeError::Fetch(e.to_string()))?;

        let part_path = target_dir.join(format!("{}.part", artifact_name));
        tokio::fs::write(&part_path, &bytes)
            .await
            .map_err(|e| BridgeError::Write(format!("{}: {}", part_path.display(), e)))?;
        tokio::fs::rename(&part_path, &artifact_path)
            .await
            .map_err(|e| BridgeError::Write(format!("{}: {}", artifact_path.display(), e)))?;

        tracing::info!(
            path = %artifact_path.display(),
            bytes = bytes.len(),
            "artifact installed"
        );
        Ok(EnsureOutcome::Installed(artifact_path))
    }
}
