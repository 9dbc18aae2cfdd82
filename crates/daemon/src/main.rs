// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! wso daemon (wsod)
//!
//! Background process that maintains the VM fleet.
//!
//! Architecture:
//! - Listener task: TCP control socket, updates desired size
//! - Reconciler task: edge-triggered fleet reconciliation
//! - Per-VM worker tasks: launch / configure / probe / destroy

use std::sync::Arc;

use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

use wso_daemon::lifecycle::{self, Paths, StartupResult};
use wso_daemon::listener::Listener;
use wso_daemon::{reconcile, Settings};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Some(arg) = std::env::args().nth(1) {
        match arg.as_str() {
            "--version" | "-V" | "-v" => {
                println!("wsod {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" | "-h" | "help" => {
                println!("wsod {}", env!("CARGO_PKG_VERSION"));
                println!("wso daemon - maintains a fleet of VMs on the local hypervisor");
                println!();
                println!("USAGE:");
                println!("    wsod");
                println!();
                println!("The daemon is typically started by the `wso` CLI and should not");
                println!("be invoked directly. It is configured through environment");
                println!("variables (IMAGE_PATH, WORKDIR, SERVER_HOST, SERVER_PORT, ...)");
                println!("and listens on a TCP control socket for commands from `wso`.");
                println!();
                println!("OPTIONS:");
                println!("    -h, --help       Print help information");
                println!("    -v, --version    Print version information");
                return Ok(());
            }
            _ => {
                eprintln!("error: unexpected argument '{arg}'");
                eprintln!("Usage: wsod [--help | --version]");
                std::process::exit(1);
            }
        }
    }

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };

    let paths = Paths::new(&settings.workdir);
    std::fs::create_dir_all(&paths.workdir)?;

    // Rotate the log file if it has grown too large, then set up logging
    rotate_log_if_needed(&paths.log_path);
    let _log_guard = setup_logging(&paths)?;

    info!("starting daemon");

    let StartupResult { daemon, listener } = match lifecycle::startup(settings).await {
        Ok(result) => result,
        Err(lifecycle::LifecycleError::LockFailed(_)) => {
            // Another daemon owns the workdir; print a human-readable
            // message instead of a raw debug error.
            let pid = std::fs::read_to_string(&paths.pid_path)
                .unwrap_or_default()
                .trim()
                .to_string();
            eprintln!("wsod is already running");
            if !pid.is_empty() {
                eprintln!("  pid: {pid}");
            }
            std::process::exit(1);
        }
        Err(e) => {
            error!("failed to start daemon: {}", e);
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };

    let ctx = daemon.ctx();

    // Spawn the listener and reconciler tasks
    let listener_task = tokio::spawn(Listener::new(listener, Arc::clone(&ctx)).run());
    let reconciler_task = tokio::spawn(reconcile::run(Arc::clone(&ctx)));

    // Kick the first reconciliation so the fleet grows toward MIN_VMS
    ctx.fleet.notify();

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    info!("daemon ready");

    // Signal ready for the parent process (the CLI waits for startup)
    println!("READY");

    tokio::select! {
        _ = sigterm.recv() => {
            info!("received SIGTERM, shutting down...");
        }
        _ = sigint.recv() => {
            info!("received SIGINT, shutting down...");
        }
    }

    // Stop accepting commands and stop reconciling, then tear down.
    listener_task.abort();
    reconciler_task.abort();

    match daemon.shutdown().await {
        Ok(()) => {
            info!("daemon stopped");
            Ok(())
        }
        Err(e) => {
            error!("shutdown incomplete: {}", e);
            std::process::exit(1);
        }
    }
}

/// Maximum log size before rotation (1 MB)
const MAX_LOG_SIZE: u64 = 1024 * 1024;

/// Number of rotated logs kept (server.log.1 .. server.log.5)
const MAX_ROTATED_LOGS: u32 = 5;

/// Rotate the daemon log file if it exceeds [`MAX_LOG_SIZE`].
fn rotate_log_if_needed(log_path: &std::path::Path) {
    let size = match std::fs::metadata(log_path) {
        Ok(m) => m.len(),
        Err(_) => return,
    };

    if size < MAX_LOG_SIZE {
        return;
    }

    let log_str = log_path.display().to_string();

    // Shift older rotations: .5 is deleted, .4→.5, ..., .1→.2
    for i in (1..MAX_ROTATED_LOGS).rev() {
        let from = format!("{log_str}.{i}");
        let to = format!("{log_str}.{}", i + 1);
        let _ = std::fs::rename(&from, &to);
    }

    // Rotate current log → .1
    let _ = std::fs::rename(log_path, format!("{log_str}.1"));
}

fn setup_logging(
    paths: &Paths,
) -> Result<tracing_appender::non_blocking::WorkerGuard, std::io::Error> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let file_appender = tracing_appender::rolling::never(
        &paths.workdir,
        paths
            .log_path
            .file_name()
            .unwrap_or_else(|| std::ffi::OsStr::new("server.log")),
    );
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // WSO_LOG overrides the default info level
    let filter = EnvFilter::try_from_env("WSO_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking))
        .init();

    Ok(guard)
}
