// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control listener task.
//!
//! Accepts TCP connections and handles each in its own task: one
//! connection = one command = one response. The listener never mutates
//! the fleet; a `scale` command only stores the new desired size and
//! signals the reconciler.

use crate::ctx::Ctx;
use crate::protocol::{self, ProtocolError, Request, DEFAULT_TIMEOUT};
use crate::state_view;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};
use wso_adapters::{Configurer, Hypervisor, Provisioner};

/// Listener task for accepting control connections.
pub struct Listener<H: Hypervisor, P: Provisioner, C: Configurer> {
    socket: TcpListener,
    ctx: Arc<Ctx<H, P, C>>,
}

impl<H: Hypervisor, P: Provisioner, C: Configurer> Listener<H, P, C> {
    pub fn new(socket: TcpListener, ctx: Arc<Ctx<H, P, C>>) -> Self {
        Self { socket, ctx }
    }

    /// Run the accept loop until the task is aborted.
    pub async fn run(self) {
        loop {
            match self.socket.accept().await {
                Ok((stream, peer)) => {
                    debug!(%peer, "control connection accepted");
                    let ctx = Arc::clone(&self.ctx);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, &ctx).await {
                            match e {
                                ProtocolError::ConnectionClosed => debug!("client disconnected"),
                                ProtocolError::Timeout => warn!("control connection timeout"),
                                _ => error!("control connection error: {}", e),
                            }
                        }
                    });
                }
                Err(e) => {
                    error!("accept error: {}", e);
                }
            }
        }
    }
}

/// Handle a single control connection.
async fn handle_connection<H: Hypervisor, P: Provisioner, C: Configurer>(
    stream: TcpStream,
    ctx: &Ctx<H, P, C>,
) -> Result<(), ProtocolError> {
    let (mut reader, mut writer) = stream.into_split();

    let line = protocol::read_request(&mut reader, DEFAULT_TIMEOUT).await?;
    debug!(command = %line, "received command");

    match protocol::parse_request(&line, ctx.settings.min_vms, ctx.settings.max_vms) {
        Ok(Request::State) => {
            let body = state_view::state_json(&ctx.settings.hypervisor_url, &ctx.fleet.snapshot());
            let body = serde_json::to_string_pretty(&body)?;
            protocol::write_ok(&mut writer, &body, DEFAULT_TIMEOUT).await
        }
        Ok(Request::Scale(n)) => {
            ctx.desired.store(n, Ordering::SeqCst);
            ctx.fleet.notify();
            info!(desired = n, "desired size updated");
            let body = format!("desired size set to {n}");
            protocol::write_ok(&mut writer, &body, DEFAULT_TIMEOUT).await
        }
        Err(e) => {
            warn!(command = %line, error = %e, "rejected command");
            protocol::write_error(&mut writer, &e.to_string(), DEFAULT_TIMEOUT).await
        }
    }
}

#[cfg(test)]
#[path = "listener_tests.rs"]
mod tests;
