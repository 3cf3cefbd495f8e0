//! REPL session lifecycle management
//!
//! A session is a long-lived toolchain subprocess launched with the `repl`
//! argument. Its stdin is fed from an input-line channel; its stdout and
//! stderr are pumped through ANSI filters into a shared display sink. The
//! manager guards the session table with a single lock so that lifecycle
//! operations for a name serialize: two concurrent starts yield one live
//! subprocess, and restart is atomic from the caller's point of view.

use crate::ansi::AnsiFilter;
use crate::config::ToolSpec;
use crate::error::{BridgeError, Result};
use crate::session::sink::DisplaySink;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin};
use tokio::sync::{mpsc, Mutex};

/// Fixed argument that puts the toolchain into interactive mode
pub const REPL_ARG: &str = "repl";

/// Snapshot of a live session
#[derive(Debug, Clone)]
pub struct SessionHandle {
    /// Session name
    pub name: String,
    /// Subprocess ID
    pub pid: Option<u32>,
    /// When the session was started
    pub started_at: DateTime<Utc>,
    /// Working directory the session was started in
    pub work_dir: PathBuf,
}

/// A live session record
struct SessionEntry {
    child: Child,
    input_tx: mpsc::UnboundedSender<String>,
    pid: Option<u32>,
    started_at: DateTime<Utc>,
    work_dir: PathBuf,
}

impl SessionEntry {
    fn handle(&self, name: &str) -> SessionHandle {
        SessionHandle {
            name: name.to_string(),
            pid: self.pid,
            started_at: self.started_at,
            work_dir: self.work_dir.clone(),
        }
    }
}

/// Manager for named REPL sessions
pub struct SessionManager {
    /// All live sessions indexed by name
    sessions: Arc<Mutex<HashMap<String, SessionEntry>>>,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionManager {
    /// Create a new session manager with no live sessions
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Start a session, or surface the existing one
    ///
    /// Starting a name that is already live is a no-op returning the live
    /// session's handle; no second subprocess is spawned. A session whose
    /// subprocess has exited on its own is discarded and replaced.
    pub async fn start_session(
        &self,
        name: &str,
        spec: &ToolSpec,
        work_dir: &Path,
        sink: Arc<dyn DisplaySink>,
    ) -> Result<SessionHandle> {
        let mut sessions = self.sessions.lock().await;
        self.start_locked(&mut sessions, name, spec, work_dir, sink)
            .await
    }

    /// Stop a session, killing its subprocess forcibly
    ///
    /// Returns `true` if a session was stopped; stopping a name with no
    /// live session is a silent no-op returning `false`.
    pub async fn stop_session(&self, name: &str) -> Result<bool> {
        let mut sessions = self.sessions.lock().await;
        self.stop_locked(&mut sessions, name).await
    }

    /// Stop and immediately start a session as one atomic operation
    ///
    /// The session table stays locked across both steps, so no caller can
    /// observe the intermediate state between teardown and startup.
    pub async fn restart_session(
        &self,
        name: &str,
        spec: &ToolSpec,
        work_dir: &Path,
        sink: Arc<dyn DisplaySink>,
    ) -> Result<SessionHandle> {
        let mut sessions = self.sessions.lock().await;
        self.stop_locked(&mut sessions, name).await?;
        self.start_locked(&mut sessions, name, spec, work_dir, sink)
            .await
    }

    /// Send one line of input to a live session
    ///
    /// The text is queued on the session's input channel with a trailing
    /// newline; a writer task appends queued lines to the subprocess stdin
    /// in call order. Fire-and-forget: no response is awaited.
    pub async fn send_line(&self, name: &str, text: &str) -> Result<()> {
        let input_tx = {
            let mut sessions = self.sessions.lock().await;
            let entry = match sessions.get_mut(name) {
                Some(entry) => entry,
                None => return Err(BridgeError::NoActiveSession(name.to_string())),
            };

            // A subprocess that exited on its own leaves a stale record
            if entry.child.try_wait()?.is_some() {
                sessions.remove(name);
                return Err(BridgeError::NoActiveSession(name.to_string()));
            }

            entry.input_tx.clone()
        };

        let mut line = String::with_capacity(text.len() + 1);
        line.push_str(text);
        line.push('\n');

        // A closed channel means the session was torn down between the
        // lookup above and this send (e.g. a racing restart).
        input_tx
            .send(line)
            .map_err(|_| BridgeError::NoActiveSession(name.to_string()))
    }

    /// Check whether a session is live
    pub async fn is_live(&self, name: &str) -> bool {
        let mut sessions = self.sessions.lock().await;
        match sessions.get_mut(name) {
            Some(entry) => match entry.child.try_wait() {
                Ok(None) => true,
                _ => {
                    sessions.remove(name);
                    false
                }
            },
            None => false,
        }
    }

    /// Snapshot all live sessions
    pub async fn list(&self) -> Vec<SessionHandle> {
        let sessions = self.sessions.lock().await;
        sessions
            .iter()
            .map(|(name, entry)| entry.handle(name))
            .collect()
    }

    /// Number of live sessions
    pub async fn count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    async fn start_locked(
        &self,
        sessions: &mut HashMap<String, SessionEntry>,
        name: &str,
        spec: &ToolSpec,
        work_dir: &Path,
        sink: Arc<dyn DisplaySink>,
    ) -> Result<SessionHandle> {
        if let Some(entry) = sessions.get_mut(name) {
            if entry.child.try_wait()?.is_none() {
                tracing::debug!(session = name, "session already live");
                return Ok(entry.handle(name));
            }
            sessions.remove(name);
        }

        if !spec.artifact_exists() {
            return Err(BridgeError::ArtifactNotFound(spec.artifact.clone()));
        }

        let mut cmd = spec.command([REPL_ARG]);
        cmd.current_dir(work_dir)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| BridgeError::Spawn(format!("{}: {}", spec.runtime, e)))?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let (input_tx, input_rx) = mpsc::unbounded_channel();
        if let Some(stdin) = stdin {
            tokio::spawn(pump_input(stdin, input_rx, name.to_string()));
        }
        if let Some(stdout) = stdout {
            tokio::spawn(pump_output(stdout, Arc::clone(&sink)));
        }
        if let Some(stderr) = stderr {
            tokio::spawn(pump_output(stderr, Arc::clone(&sink)));
        }

        let entry = SessionEntry {
            pid: child.id(),
            started_at: Utc::now(),
            work_dir: work_dir.to_path_buf(),
            child,
            input_tx,
        };
        let handle = entry.handle(name);

        tracing::info!(session = name, pid = ?handle.pid, "session started");
        sessions.insert(name.to_string(), entry);
        Ok(handle)
    }

    async fn stop_locked(
        &self,
        sessions: &mut HashMap<String, SessionEntry>,
        name: &str,
    ) -> Result<bool> {
        let mut entry = match sessions.remove(name) {
            Some(entry) => entry,
            None => return Ok(false),
        };

        // Forceful termination, no grace period. Dropping the entry closes
        // the input channel, which ends the writer task; the output pumps
        // end on EOF.
        match entry.child.kill().await {
            Ok(()) => {}
            Err(e) => tracing::warn!(session = name, "kill failed: {}", e),
        }

        tracing::info!(session = name, "session stopped");
        Ok(true)
    }
}

/// Drain the input-line channel into the subprocess stdin, in channel order
async fn pump_input(
    mut stdin: ChildStdin,
    mut input_rx: mpsc::UnboundedReceiver<String>,
    name: String,
) {
    while let Some(line) = input_rx.recv().await {
        if let Err(e) = stdin.write_all(line.as_bytes()).await {
            tracing::warn!(session = %name, "stdin write failed: {}", e);
            break;
        }
        if let Err(e) = stdin.flush().await {
            tracing::warn!(session = %name, "stdin flush failed: {}", e);
            break;
        }
    }
}

/// Pump one output stream through an ANSI filter into the sink
async fn pump_output<R>(mut stream: R, sink: Arc<dyn DisplaySink>)
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    let mut filter = AnsiFilter::new();
    let mut buf = [0u8; 4096];

    loop {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let spans = filter.push_bytes(&buf[..n]);
                if !spans.is_empty() {
                    sink.append(&spans);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::sink::MemorySink;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Launch description that stands in for the jar runtime: `sh -c cat`
    /// echoes stdin back to stdout and ignores the trailing `repl`
    /// argument (it becomes `$0`).
    fn cat_spec(dir: &TempDir) -> ToolSpec {
        let artifact = dir.path().join("toolchain.jar");
        std::fs::write(&artifact, b"stub").unwrap();
        ToolSpec::raw(
            "/bin/sh",
            vec!["-c".to_string(), "cat".to_string()],
            artifact,
        )
    }

    async fn wait_for_text(sink: &MemorySink, needle: &str) {
        for _ in 0..500 {
            if sink.text().contains(needle) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("output never contained {:?}, got {:?}", needle, sink.text());
    }

    #[tokio::test]
    async fn test_start_send_stop_roundtrip() {
        let dir = TempDir::new().unwrap();
        let spec = cat_spec(&dir);
        let sink = Arc::new(MemorySink::new());
        let manager = SessionManager::new();

        let handle = manager
            .start_session("x", &spec, dir.path(), sink.clone())
            .await
            .unwrap();
        assert!(handle.pid.is_some());
        assert!(manager.is_live("x").await);

        manager.send_line("x", "1+1").await.unwrap();
        wait_for_text(&sink, "1+1\n").await;

        assert!(manager.stop_session("x").await.unwrap());
        assert!(!manager.is_live("x").await);

        let err = manager.send_line("x", "2+2").await.unwrap_err();
        assert!(matches!(err, BridgeError::NoActiveSession(_)));
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let spec = cat_spec(&dir);
        let sink = Arc::new(MemorySink::new());
        let manager = SessionManager::new();

        let first = manager
            .start_session("x", &spec, dir.path(), sink.clone())
            .await
            .unwrap();
        let second = manager
            .start_session("x", &spec, dir.path(), sink.clone())
            .await
            .unwrap();

        assert_eq!(first.pid, second.pid);
        assert_eq!(manager.count().await, 1);
    }

    #[tokio::test]
    async fn test_send_line_order_is_preserved() {
        let dir = TempDir::new().unwrap();
        let spec = cat_spec(&dir);
        let sink = Arc::new(MemorySink::new());
        let manager = SessionManager::new();

        manager
            .start_session("x", &spec, dir.path(), sink.clone())
            .await
            .unwrap();
        manager.send_line("x", "a").await.unwrap();
        manager.send_line("x", "b").await.unwrap();

        wait_for_text(&sink, "b\n").await;
        assert_eq!(sink.text(), "a\nb\n");
    }

    #[tokio::test]
    async fn test_stop_absent_session_is_a_noop() {
        let manager = SessionManager::new();
        assert!(!manager.stop_session("ghost").await.unwrap());
    }

    #[tokio::test]
    async fn test_restart_yields_exactly_one_new_session() {
        let dir = TempDir::new().unwrap();
        let spec = cat_spec(&dir);
        let sink = Arc::new(MemorySink::new());
        let manager = SessionManager::new();

        let first = manager
            .start_session("x", &spec, dir.path(), sink.clone())
            .await
            .unwrap();
        let second = manager
            .restart_session("x", &spec, dir.path(), sink.clone())
            .await
            .unwrap();

        assert_ne!(first.pid, second.pid);
        assert_eq!(manager.count().await, 1);
        assert!(manager.is_live("x").await);

        manager.send_line("x", "after").await.unwrap();
        wait_for_text(&sink, "after\n").await;
    }

    #[tokio::test]
    async fn test_restart_on_absent_name_just_starts() {
        let dir = TempDir::new().unwrap();
        let spec = cat_spec(&dir);
        let sink = Arc::new(MemorySink::new());
        let manager = SessionManager::new();

        let handle = manager
            .restart_session("x", &spec, dir.path(), sink.clone())
            .await
            .unwrap();
        assert!(handle.pid.is_some());
        assert_eq!(manager.count().await, 1);
    }

    #[tokio::test]
    async fn test_missing_artifact_fails_before_spawn() {
        let dir = TempDir::new().unwrap();
        let spec = ToolSpec::raw(
            "/bin/sh",
            vec!["-c".to_string(), "cat".to_string()],
            dir.path().join("absent.jar"),
        );
        let sink = Arc::new(MemorySink::new());
        let manager = SessionManager::new();

        let err = manager
            .start_session("x", &spec, dir.path(), sink)
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::ArtifactNotFound(_)));
        assert_eq!(manager.count().await, 0);
    }

    #[tokio::test]
    async fn test_spawn_failure_leaves_session_absent() {
        let dir = TempDir::new().unwrap();
        let artifact = dir.path().join("toolchain.jar");
        std::fs::write(&artifact, b"stub").unwrap();
        let spec = ToolSpec::raw("/nonexistent/runtime", Vec::new(), artifact);
        let sink = Arc::new(MemorySink::new());
        let manager = SessionManager::new();

        let err = manager
            .start_session("x", &spec, dir.path(), sink)
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Spawn(_)));
        assert!(!manager.is_live("x").await);
    }

    #[tokio::test]
    async fn test_list_reports_live_session_details() {
        let dir = TempDir::new().unwrap();
        let spec = cat_spec(&dir);
        let sink = Arc::new(MemorySink::new());
        let manager = SessionManager::new();

        let started = manager
            .start_session("x", &spec, dir.path(), sink.clone())
            .await
            .unwrap();

        let sessions = manager.list().await;
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].name, "x");
        assert_eq!(sessions[0].pid, started.pid);
        assert_eq!(sessions[0].work_dir, dir.path());
        assert!(sessions[0].started_at <= Utc::now());
    }

    #[tokio::test]
    async fn test_concurrent_starts_yield_one_session() {
        let dir = TempDir::new().unwrap();
        let spec = cat_spec(&dir);
        let sink = Arc::new(MemorySink::new());
        let manager = SessionManager::new();

        let (first, second) = tokio::join!(
            manager.start_session("x", &spec, dir.path(), sink.clone()),
            manager.start_session("x", &spec, dir.path(), sink.clone()),
        );

        let first = first.unwrap();
        let second = second.unwrap();
        assert_eq!(first.pid, second.pid);
        assert_eq!(manager.count().await, 1);
        assert!(manager.is_live("x").await);
    }

    #[tokio::test]
    async fn test_send_line_racing_restart_lands_or_errors() {
        let dir = TempDir::new().unwrap();
        let spec = cat_spec(&dir);
        let sink = Arc::new(MemorySink::new());
        let manager = SessionManager::new();

        manager
            .start_session("x", &spec, dir.path(), sink.clone())
            .await
            .unwrap();

        // Each racing send must reach the old subprocess, the new one, or
        // fail loudly; it must never disappear without either effect.
        let (restarted, sent) = tokio::join!(
            manager.restart_session("x", &spec, dir.path(), sink.clone()),
            manager.send_line("x", "raced"),
        );

        restarted.unwrap();
        match sent {
            Ok(()) => {}
            Err(BridgeError::NoActiveSession(_)) => {}
            Err(e) => panic!("unexpected error: {}", e),
        }

        assert_eq!(manager.count().await, 1);
        assert!(manager.is_live("x").await);

        // The surviving session is usable
        manager.send_line("x", "after-race").await.unwrap();
        wait_for_text(&sink, "after-race\n").await;
    }

    #[tokio::test]
    async fn test_session_output_is_ansi_filtered() {
        let dir = TempDir::new().unwrap();
        let artifact = dir.path().join("toolchain.jar");
        std::fs::write(&artifact, b"stub").unwrap();
        // Emit a colored line and exit; the escape bytes must not reach
        // the sink as literal text.
        let spec = ToolSpec::raw(
            "/bin/sh",
            vec![
                "-c".to_string(),
                "printf '\\033[32mok\\033[0m\\n'".to_string(),
            ],
            artifact,
        );
        let sink = Arc::new(MemorySink::new());
        let manager = SessionManager::new();

        manager
            .start_session("x", &spec, dir.path(), sink.clone())
            .await
            .unwrap();
        wait_for_text(&sink, "ok\n").await;

        assert!(!sink.text().contains('\x1b'));
        let spans = sink.spans();
        let ok = spans.iter().find(|s| s.text == "ok").unwrap();
        assert_eq!(ok.style.fg, Some(crate::ansi::AnsiColor::Green));
    }
}
