//! jarbridge - installer and REPL bridge for a jar-distributed toolchain
//!
//! This is the main CLI entry point for jarbridge.

use clap::{Parser, Subcommand};
use jarbridge::config::BridgeConfig;
use jarbridge::error::{BridgeError, Result};
use jarbridge::install::{EnsureOutcome, Installer};
use jarbridge::invoke::{invoke_one_shot, InvocationRequest};
use jarbridge::session::{SessionManager, StdoutSink};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

/// Name of the session driven by the interactive `repl` command
const REPL_SESSION: &str = "repl";

/// jarbridge - toolchain installer and REPL bridge
#[derive(Parser)]
#[command(name = "jarbridge")]
#[command(version)]
#[command(about = "Installer and REPL bridge for a jar-distributed compiler toolchain", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Install the toolchain artifact
    Install {
        /// URL to fetch the artifact from
        #[arg(long)]
        url: Option<String>,
        /// Directory to install into
        #[arg(long)]
        dir: Option<PathBuf>,
        /// Artifact file name
        #[arg(long)]
        artifact: Option<String>,
    },

    /// Initialize a project in the current directory
    Init {
        /// Tool directory (overrides the configured one)
        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// Build the project in the current directory
    Build {
        /// Tool directory (overrides the configured one)
        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// Run the project in the current directory
    Run {
        /// Tool directory (overrides the configured one)
        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// Run an arbitrary toolchain subcommand
    Cmd {
        /// Tool directory (overrides the configured one)
        #[arg(long)]
        dir: Option<PathBuf>,
        /// Subcommand tokens passed to the toolchain
        #[arg(trailing_var_arg = true, required = true)]
        args: Vec<String>,
    },

    /// Start an interactive REPL session
    Repl {
        /// Tool directory (overrides the configured one)
        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// Print the resolved tool location
    Where,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config_path = BridgeConfig::default_path();
    let mut config = BridgeConfig::load(&config_path)?;

    match cli.command {
        Commands::Install { url, dir, artifact } => {
            let url = url.or_else(|| config.source_url.clone()).ok_or_else(|| {
                BridgeError::Config("no source URL configured; pass --url".to_string())
            })?;
            if let Some(artifact) = artifact {
                config.artifact = artifact;
            }
            let target_dir = dir
                .or_else(|| config.tool_dir.clone())
                .unwrap_or_else(default_tool_dir);

            let installer = Installer::new()?;
            let outcome = installer
                .ensure_installed(&target_dir, &config.artifact, &url)
                .await?;

            match &outcome {
                EnsureOutcome::AlreadyPresent(path) => {
                    println!("already installed: {}", path.display());
                }
                EnsureOutcome::Installed(path) => {
                    println!("installed: {}", path.display());
                }
            }

            // Remember where the toolchain lives for later invocations
            config.tool_dir = Some(target_dir);
            config.source_url = Some(url);
            config.save(&config_path)?;
        }

        Commands::Init { dir } => one_shot(&config, dir, vec!["init".to_string()])?,
        Commands::Build { dir } => one_shot(&config, dir, vec!["build".to_string()])?,
        Commands::Run { dir } => one_shot(&config, dir, vec!["run".to_string()])?,
        Commands::Cmd { dir, args } => one_shot(&config, dir, args)?,

        Commands::Repl { dir } => {
            run_repl(&config, dir).await?;
        }

        Commands::Where => match &config.tool_dir {
            Some(dir) => println!("{}", dir.join(&config.artifact).display()),
            None => println!("not installed (run `jarbridge install`)"),
        },
    }

    Ok(())
}

/// Default installation directory under the user's data directory
fn default_tool_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("jarbridge")
}

/// Launch a detached one-shot toolchain invocation in the current directory
fn one_shot(config: &BridgeConfig, dir: Option<PathBuf>, args: Vec<String>) -> Result<()> {
    let spec = config.resolve(dir.as_deref())?;
    let work_dir = std::env::current_dir()?;
    let request = InvocationRequest::new(&work_dir, args);

    let pid = invoke_one_shot(&spec, &request)?;
    println!("launched (pid {})", pid);
    Ok(())
}

/// Drive an interactive REPL session in the foreground
///
/// Lines from stdin are forwarded to the session; the bridge-level meta
/// commands `:restart` and `:quit` restart and stop it. EOF behaves as
/// `:quit`.
async fn run_repl(config: &BridgeConfig, dir: Option<PathBuf>) -> Result<()> {
    let spec = config.resolve(dir.as_deref())?;
    let work_dir = std::env::current_dir()?;
    let sink = Arc::new(StdoutSink::new());
    let manager = SessionManager::new();

    manager
        .start_session(REPL_SESSION, &spec, &work_dir, sink.clone())
        .await?;
    println!("session started; :sessions lists, :restart restarts, :quit or EOF exits");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            ":quit" => break,
            ":sessions" => {
                for session in manager.list().await {
                    let uptime = chrono::Utc::now().signed_duration_since(session.started_at);
                    let pid = session
                        .pid
                        .map(|p| p.to_string())
                        .unwrap_or_else(|| "-".to_string());
                    println!(
                        "{}  pid {}  up {}s  in {}",
                        session.name,
                        pid,
                        uptime.num_seconds(),
                        session.work_dir.display()
                    );
                }
            }
            ":restart" => {
                manager
                    .restart_session(REPL_SESSION, &spec, &work_dir, sink.clone())
                    .await?;
                println!("session restarted");
            }
            _ => match manager.send_line(REPL_SESSION, &line).await {
                Ok(()) => {}
                Err(BridgeError::NoActiveSession(_)) => {
                    println!("session exited; :restart to start a new one");
                }
                Err(e) => return Err(e),
            },
        }
    }

    manager.stop_session(REPL_SESSION).await?;
    Ok(())
}
