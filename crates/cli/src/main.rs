// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! wso - VM fleet autoscaler CLI

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod client;
mod daemon_process;
mod env;

use anyhow::{anyhow, bail, Result};
use clap::{Parser, Subcommand};

use crate::client::{ClientError, DaemonClient};

#[derive(Parser)]
#[command(
    name = "wso",
    version,
    about = "wso - maintain a fleet of VMs on the local hypervisor"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon
    Start {
        /// Run in the foreground (useful for debugging)
        #[arg(long)]
        foreground: bool,
    },
    /// Stop the daemon and destroy the fleet
    Stop,
    /// Show the fleet state
    State,
    /// Set the desired fleet size
    Scale {
        /// Target number of VMs
        n: usize,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Start { foreground } => start(foreground).await,
        Commands::Stop => stop().await,
        Commands::State => state().await,
        Commands::Scale { n } => scale(n).await,
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

async fn start(foreground: bool) -> Result<()> {
    let client = DaemonClient::from_env();
    if client.is_up().await {
        println!("daemon already running");
        return Ok(());
    }

    if foreground {
        // Replace this invocation with a blocking daemon run.
        let status = std::process::Command::new(daemon_process::find_wsod_binary()).status()?;
        if !status.success() {
            bail!("wsod exited with {status}");
        }
        return Ok(());
    }

    let child = daemon_process::start_daemon_background()?;
    if !client.wait_until_up().await {
        bail!(
            "daemon (pid {}) did not start accepting connections in time; \
             check <WORKDIR>/server.log",
            child.id()
        );
    }

    println!("daemon started (pid {})", child.id());
    Ok(())
}

async fn stop() -> Result<()> {
    let pid = daemon_process::read_daemon_pid()
        .ok_or_else(|| anyhow!("daemon not running (no PID file)"))?;

    if !daemon_process::process_exists(pid) {
        bail!("daemon not running (stale PID file for pid {pid})");
    }

    if !daemon_process::terminate(pid) {
        bail!("failed to signal pid {pid}");
    }

    // Shutdown destroys the whole fleet; give it time.
    if !daemon_process::wait_for_exit(pid, env::timeout_exit()).await {
        bail!("daemon (pid {pid}) did not exit in time");
    }

    println!("daemon stopped");
    Ok(())
}

async fn state() -> Result<()> {
    let body = DaemonClient::from_env().send("state").await?;

    // Re-render so output is pretty even if the daemon ever compacts it.
    match serde_json::from_str::<serde_json::Value>(&body) {
        Ok(value) => println!("{}", serde_json::to_string_pretty(&value)?),
        Err(_) => println!("{body}"),
    }
    Ok(())
}

async fn scale(n: usize) -> Result<()> {
    match DaemonClient::from_env().send(&format!("scale {n}")).await {
        Ok(body) => {
            println!("{body}");
            Ok(())
        }
        Err(ClientError::Rejected(message)) => bail!("{message}"),
        Err(e) => Err(e.into()),
    }
}
