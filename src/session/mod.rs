//! REPL session management
//!
//! This module provides the session half of the bridge: named, long-lived
//! toolchain subprocesses with managed stdin and ANSI-filtered output.

pub mod manager;
pub mod sink;

pub use manager::{SessionHandle, SessionManager, REPL_ARG};
pub use sink::{DisplaySink, MemorySink, StdoutSink};
