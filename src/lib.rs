//! jarbridge - installer and REPL bridge for a jar-distributed toolchain
//!
//! jarbridge manages a small external compiler toolchain shipped as a
//! runnable jar archive. It provides:
//!
//! - Artifact installation (fetch once, never re-fetch)
//! - One-shot toolchain invocations (init, build, run, arbitrary commands)
//! - Named long-lived REPL sessions with managed stdin and
//!   ANSI-interpreted output
//! - Pluggable display sinks for session output

pub mod ansi;
pub mod config;
pub mod error;
pub mod install;
pub mod invoke;
pub mod session;

pub use error::{BridgeError, Result};
