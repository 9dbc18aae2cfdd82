// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_support::{record, test_ctx, test_settings, TestCtx};
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use wso_core::{host_ip, VmState};

async fn start_listener(ctx: Arc<TestCtx>) -> SocketAddr {
    let socket = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    tokio::spawn(Listener::new(socket, ctx).run());
    addr
}

/// One connection, one command, one (status, body) response.
async fn send_command(addr: SocketAddr, command: &str) -> (String, String) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(command.as_bytes()).await.unwrap();

    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();

    let (status, body) = response.split_once('\n').unwrap_or((response.as_str(), ""));
    (status.to_string(), body.to_string())
}

#[tokio::test]
async fn state_returns_the_fleet_as_json() {
    let ctx = test_ctx(test_settings());
    ctx.fleet
        .insert(record("wso-aaaa0001", VmState::Healthy, host_ip(4)))
        .unwrap();
    let addr = start_listener(Arc::clone(&ctx)).await;

    let (status, body) = send_command(addr, "state\n").await;
    assert_eq!(status, "OK");

    let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
    let domains = &parsed["qemu:///system"]["domains"];
    assert_eq!(domains["wso-aaaa0001"]["state"], "healthy");
    assert_eq!(domains["wso-aaaa0001"]["ip_address"], "192.168.100.4");
}

#[tokio::test]
async fn scale_updates_desired_size_and_signals() {
    let ctx = test_ctx(test_settings());
    let addr = start_listener(Arc::clone(&ctx)).await;

    let (status, body) = send_command(addr, "scale 7\n").await;
    assert_eq!(status, "OK");
    assert!(body.contains('7'), "got body: {body}");
    assert_eq!(ctx.desired.load(Ordering::SeqCst), 7);

    // The reconciler's signal was set by the command.
    tokio::time::timeout(std::time::Duration::from_secs(1), ctx.fleet.wait())
        .await
        .expect("scale must notify the reconciler");
}

#[tokio::test]
async fn out_of_range_scale_is_rejected() {
    let ctx = test_ctx(test_settings());
    let addr = start_listener(Arc::clone(&ctx)).await;

    for command in ["scale 0\n", "scale 101\n", "scale lots\n"] {
        let (status, body) = send_command(addr, command).await;
        assert_eq!(status, "ERROR", "command: {command:?}");
        assert!(body.contains("usage: scale"), "got body: {body}");
        // Desired size is untouched.
        assert_eq!(ctx.desired.load(Ordering::SeqCst), 1);
    }
}

#[tokio::test]
async fn unknown_commands_get_an_error_and_leave_the_fleet_alone() {
    let ctx = test_ctx(test_settings());
    ctx.fleet
        .insert(record("wso-aaaa0001", VmState::Healthy, host_ip(4)))
        .unwrap();
    let addr = start_listener(Arc::clone(&ctx)).await;

    let (status, body) = send_command(addr, "frobnicate\n").await;
    assert_eq!(status, "ERROR");
    assert!(body.contains("unknown command"), "got body: {body}");
    assert_eq!(ctx.fleet.len(), 1);
}

#[tokio::test]
async fn oversized_requests_are_cut_at_the_protocol_limit() {
    let ctx = test_ctx(test_settings());
    let addr = start_listener(Arc::clone(&ctx)).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    // Exactly the cap, no newline: the server must stop reading and reject.
    let blob = vec![b'x'; crate::protocol::MAX_REQUEST_SIZE];
    stream.write_all(&blob).await.unwrap();

    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    assert!(response.starts_with("ERROR\n"), "got: {response}");
}

#[tokio::test]
async fn connections_are_independent() {
    let ctx = test_ctx(test_settings());
    let addr = start_listener(Arc::clone(&ctx)).await;

    let (status, _) = send_command(addr, "scale 3\n").await;
    assert_eq!(status, "OK");
    let (status, _) = send_command(addr, "state\n").await;
    assert_eq!(status, "OK");
    let (status, _) = send_command(addr, "scale 2\n").await;
    assert_eq!(status, "OK");
    assert_eq!(ctx.desired.load(Ordering::SeqCst), 2);
}
