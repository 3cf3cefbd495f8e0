//! One-shot toolchain invocations
//!
//! A one-shot invocation launches the toolchain with a single subcommand
//! (`init`, `build`, `run`, or arbitrary tokens) in a working directory and
//! returns as soon as the process is running. Completion is never awaited
//! and exit status is never observed; output streams straight to the
//! invoking terminal. Invocations are independent of sessions and of each
//! other.

use crate::config::ToolSpec;
use crate::error::{BridgeError, Result};
use std::path::{Path, PathBuf};

/// A single non-interactive toolchain invocation
#[derive(Debug, Clone)]
pub struct InvocationRequest {
    /// Working directory the toolchain runs in
    pub work_dir: PathBuf,
    /// Subcommand tokens passed to the toolchain
    pub args: Vec<String>,
}

impl InvocationRequest {
    /// Create a request for `args` run in `work_dir`
    pub fn new(work_dir: &Path, args: Vec<String>) -> Self {
        Self {
            work_dir: work_dir.to_path_buf(),
            args,
        }
    }
}

/// Launch the toolchain detached with the request's subcommand
///
/// Fails with [`BridgeError::ArtifactNotFound`] before any spawn if the
/// artifact is missing. On success returns the child pid; "success" means
/// the process launched, not that it completed.
pub fn invoke_one_shot(spec: &ToolSpec, request: &InvocationRequest) -> Result<u32> {
    if !spec.artifact_exists() {
        return Err(BridgeError::ArtifactNotFound(spec.artifact.clone()));
    }

    let invocation_id = uuid::Uuid::new_v4().to_string()[..8].to_string();

    let mut cmd = spec.command(&request.args);
    cmd.current_dir(&request.work_dir)
        .stdin(std::process::Stdio::inherit())
        .stdout(std::process::Stdio::inherit())
        .stderr(std::process::Stdio::inherit());

    let child = cmd
        .spawn()
        .map_err(|e| BridgeError::Spawn(format!("{}: {}", spec.runtime, e)))?;

    let pid = child
        .id()
        .ok_or_else(|| BridgeError::Spawn("pid unavailable after spawn".to_string()))?;

    tracing::info!(
        id = %invocation_id,
        pid,
        args = ?request.args,
        "one-shot invocation launched"
    );

    // Dropping the child handle detaches it; the process runs on.
    Ok(pid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_artifact_fails_before_spawn() {
        let dir = TempDir::new().unwrap();
        let spec = ToolSpec::jar("java", dir.path().join("absent.jar"));
        let request = InvocationRequest::new(dir.path(), vec!["build".to_string()]);

        let err = invoke_one_shot(&spec, &request).unwrap_err();
        assert!(matches!(err, BridgeError::ArtifactNotFound(_)));
    }

    #[tokio::test]
    async fn test_launch_is_fire_and_forget() {
        let dir = TempDir::new().unwrap();
        let artifact = dir.path().join("toolchain.jar");
        std::fs::write(&artifact, b"stub").unwrap();

        // The stand-in writes a marker into its working directory; seeing
        // the marker proves the process launched with the right cwd even
        // though the invocation never waited for it.
        let spec = ToolSpec::raw(
            "/bin/sh",
            vec!["-c".to_string(), "echo ran > marker".to_string()],
            artifact,
        );
        let request = InvocationRequest::new(dir.path(), vec!["build".to_string()]);

        let pid = invoke_one_shot(&spec, &request).unwrap();
        assert!(pid > 0);

        let marker = dir.path().join("marker");
        for _ in 0..500 {
            if marker.exists() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("detached invocation never ran");
    }

    #[tokio::test]
    async fn test_unlaunchable_runtime_is_a_spawn_error() {
        let dir = TempDir::new().unwrap();
        let artifact = dir.path().join("toolchain.jar");
        std::fs::write(&artifact, b"stub").unwrap();

        let spec = ToolSpec::raw("/nonexistent/runtime", Vec::new(), artifact);
        let request = InvocationRequest::new(dir.path(), vec!["build".to_string()]);

        let err = invoke_one_shot(&spec, &request).unwrap_err();
        assert!(matches!(err, BridgeError::Spawn(_)));
    }
}
