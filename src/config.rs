//! Bridge configuration and toolchain launch description
//!
//! `BridgeConfig` is the small persisted state of the bridge: where the
//! toolchain artifact lives, what it is called, which runtime launches it,
//! and where to fetch it from. `ToolSpec` is the resolved, immutable launch
//! description threaded explicitly into every invocation.

use crate::error::{BridgeError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Default artifact file name
pub const DEFAULT_ARTIFACT: &str = "toolchain.jar";

/// Default runtime used to launch the artifact
pub const DEFAULT_RUNTIME: &str = "java";

/// Persisted bridge configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Directory believed to contain the toolchain artifact
    pub tool_dir: Option<PathBuf>,
    /// Artifact file name within the tool directory
    pub artifact: String,
    /// Runtime program that launches the artifact
    pub runtime: String,
    /// Remote URL the artifact is fetched from
    pub source_url: Option<String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            tool_dir: None,
            artifact: DEFAULT_ARTIFACT.to_string(),
            runtime: DEFAULT_RUNTIME.to_string(),
            source_url: None,
        }
    }
}

impl BridgeConfig {
    /// Default config file path under the user's config directory
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("jarbridge")
            .join("config.json")
    }

    /// Load the configuration from `path`, falling back to defaults if the
    /// file does not exist yet
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let data = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&data)?;
        Ok(config)
    }

    /// Save the configuration to `path`, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let data = serde_json::to_string_pretty(self)?;
        std::fs::write(path, data)?;
        Ok(())
    }

    /// Resolve a launch description, with `dir_override` taking precedence
    /// over the persisted tool directory
    pub fn resolve(&self, dir_override: Option<&Path>) -> Result<ToolSpec> {
        let dir = dir_override
            .map(Path::to_path_buf)
            .or_else(|| self.tool_dir.clone())
            .ok_or_else(|| {
                BridgeError::Config(
                    "no tool directory configured; run `jarbridge install` or pass --dir"
                        .to_string(),
                )
            })?;

        Ok(ToolSpec::jar(&self.runtime, dir.join(&self.artifact)))
    }
}

/// Resolved launch description for the toolchain
///
/// The artifact is not directly executable; it is launched through a runtime
/// program with a fixed set of runtime arguments (`java -jar <artifact>` in
/// the default case).
#[derive(Debug, Clone)]
pub struct ToolSpec {
    /// Runtime program
    pub runtime: String,
    /// Arguments passed to the runtime before any toolchain arguments
    pub runtime_args: Vec<String>,
    /// Path to the toolchain artifact
    pub artifact: PathBuf,
}

impl ToolSpec {
    /// Launch description for a jar artifact run via `<runtime> -jar <path>`
    pub fn jar(runtime: &str, artifact: PathBuf) -> Self {
        Self {
            runtime: runtime.to_string(),
            runtime_args: vec!["-jar".to_string(), artifact.display().to_string()],
            artifact,
        }
    }

    /// Launch description with explicit runtime arguments
    ///
    /// Used by tests to substitute an arbitrary local program for the
    /// jar runtime.
    pub fn raw(runtime: &str, runtime_args: Vec<String>, artifact: PathBuf) -> Self {
        Self {
            runtime: runtime.to_string(),
            runtime_args,
            artifact,
        }
    }

    /// Check whether the artifact is present on disk
    pub fn artifact_exists(&self) -> bool {
        self.artifact.exists()
    }

    /// Build a command launching the toolchain with `args`
    pub fn command<I, S>(&self, args: I) -> Command
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        let mut cmd = Command::new(&self.runtime);
        cmd.args(&self.runtime_args);
        cmd.args(args);
        cmd
    }
}
