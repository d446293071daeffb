// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Channel Integration Tests
//!
//! Secure channel behavior against the mock server:
//!
//! - Handshake and raw service calls
//! - Message security modes
//! - Pipelining and chunked responses
//! - Sequence, signature and abort faults
//! - Keep-alive and request timeouts
//!
//! ## Test Categories
//!
//! - `test_channel_*`: Raw channel tests
//! - `test_security_*`: Security mode tests
//! - `test_fault_*`: Injected fault tests
//! - `test_keepalive_*`: Keep-alive tests

use std::time::Duration;

use uabin_client::codec::Variant;
use uabin_client::services::{decode_response, encode_request, FindServersRequest, FindServersResponse, RequestHeader};
use uabin_client::types::{NodeId, UaString};
use uabin_client::{
    ChannelConfig, ProtocolError, SecureChannel, SecurityMode, SecurityPolicy, UaError,
};

use uabin_tests::common::*;

fn find_servers() -> FindServersRequest {
    FindServersRequest {
        request_header: RequestHeader::new(NodeId::null(), 1, 1000),
        endpoint_url: UaString::from(MOCK_ENDPOINT_URL),
        ..FindServersRequest::default()
    }
}

// =============================================================================
// Raw Channel Tests
// =============================================================================

#[tokio::test]
async fn test_channel_open_and_call() {
    init_test_logging();
    let server = MockServer::new(demo_address_space());

    let channel = SecureChannel::open(&server, MOCK_ENDPOINT_URL, ChannelConfig::default())
        .await
        .assert_ok();
    assert!(channel.is_open());
    assert_ne!(channel.secure_channel_id(), 0);
    assert_eq!(channel.security_mode(), SecurityMode::None);

    let body = channel.send_request(encode_request(&find_servers())).await.assert_ok();
    let response = decode_response::<FindServersResponse>(&body)
        .assert_ok()
        .expect("FindServers must not fault");
    let servers = response.servers.unwrap_or_default();
    assert_eq!(servers.len(), 1);
    assert_eq!(servers[0].application_uri.as_str(), MOCK_APPLICATION_URI);

    channel.close().await.assert_ok();
    assert!(!channel.is_open());
    wait_for_or_panic(
        Duration::from_secs(2),
        Duration::from_millis(10),
        "server sees CloseSecureChannel",
        || server.closed_channels() == 1,
    )
    .await;
    server.shutdown();
}

#[tokio::test]
async fn test_channel_counts_requests() {
    init_test_logging();
    let server = MockServer::new(demo_address_space());
    let channel = SecureChannel::open(&server, MOCK_ENDPOINT_URL, ChannelConfig::default())
        .await
        .assert_ok();

    for _ in 0..3 {
        channel.send_request(encode_request(&find_servers())).await.assert_ok();
    }
    assert_eq!(channel.stats().requests_sent(), 3);
    assert_eq!(channel.stats().responses_received(), 3);
    assert_eq!(channel.pending_requests(), 0);

    channel.close().await.assert_ok();
    server.shutdown();
}

#[tokio::test]
async fn test_channel_refused_connection() {
    init_test_logging();
    let server = MockServer::new(demo_address_space());
    server.refuse_connections(true);

    let err = SecureChannel::open(&server, MOCK_ENDPOINT_URL, ChannelConfig::default())
        .await
        .assert_err();
    assert!(matches!(err, UaError::Connection(_)), "unexpected error: {}", err);
    server.shutdown();
}

// =============================================================================
// Security Mode Tests
// =============================================================================

#[tokio::test]
async fn test_security_sign() {
    let config = TestHarnessConfig::new("security_sign")
        .security(SecurityMode::Sign, SecurityPolicy::Basic256Sha256);
    let harness = TestHarness::with_config(config).await;

    harness
        .run(|| async {
            let result = harness
                .client
                .read(&[demo_address("Demo.Static.Scalar.Double")])
                .await
                .assert_ok();
            result[0].assert_value(&Variant::Double(DEMO_DOUBLE));
            assert_eq!(harness.server.channel_modes(), vec![SecurityMode::Sign]);
        })
        .await;
}

#[tokio::test]
async fn test_security_sign_and_encrypt() {
    let config = TestHarnessConfig::new("security_encrypt")
        .security(SecurityMode::SignAndEncrypt, SecurityPolicy::Basic256Sha256);
    let harness = TestHarness::with_config(config).await;

    harness
        .run(|| async {
            let result = harness
                .client
                .read(&[
                    demo_address("Demo.Static.Scalar.String"),
                    demo_address("Demo.Static.Vector"),
                ])
                .await
                .assert_ok();
            result[0].assert_value(&Variant::from(DEMO_STRING));
            result[1].assert_good();
            assert_eq!(
                harness.server.channel_modes(),
                vec![SecurityMode::SignAndEncrypt]
            );
        })
        .await;
}

// =============================================================================
// Pipelining Tests
// =============================================================================

#[tokio::test]
async fn test_channel_responses_out_of_order() {
    let harness = TestHarness::start().await;
    harness.client.connect().await.assert_ok();
    harness
        .server
        .delay_reads_of(demo_node("Demo.Static.Scalar.Double"), Duration::from_millis(400));

    let slow_client = harness.client.clone();
    let slow = tokio::spawn(async move {
        slow_client
            .read(&[demo_address("Demo.Static.Scalar.Double")])
            .await
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let fast = harness
        .client
        .read(&[demo_address("Demo.Static.Scalar.Int32")])
        .await
        .assert_ok();
    fast[0].assert_value(&Variant::Int32(DEMO_INT32));
    assert!(!slow.is_finished(), "slow read finished before the fast one");

    let slow = slow.await.expect("slow read task panicked").assert_ok();
    slow[0].assert_value_approx(DEMO_DOUBLE, 1e-9);
    assert_eq!(harness.server.connections(), 1);
}

#[tokio::test]
async fn test_channel_chunked_responses() {
    let harness = TestHarness::start().await;
    harness.server.split_responses(64);

    harness
        .run(|| async {
            let result = harness
                .client
                .read(&[vector_add_inputs(), demo_address("Demo.Static.Sample")])
                .await
                .assert_ok();
            assert!(result.all_good(), "chunked read failed: {:?}", result);
            assert!(matches!(result[0].data, Some(Variant::Array(_))));
        })
        .await;
}

// =============================================================================
// Fault Tests
// =============================================================================

#[tokio::test]
async fn test_fault_sequence_gap_fails_channel() {
    let harness = TestHarness::start().await;
    harness.client.connect().await.assert_ok();
    harness.server.skip_next_sequence_number();

    let err = harness
        .client
        .read(&[demo_address("Demo.Static.Scalar.Double")])
        .await
        .assert_err();
    assert!(
        matches!(err, UaError::Protocol(ProtocolError::SequenceMismatch { .. })),
        "unexpected error: {}",
        err
    );
    assert!(!harness.client.is_connected());

    let result = harness
        .client
        .read(&[demo_address("Demo.Static.Scalar.Double")])
        .await
        .assert_ok();
    result[0].assert_good();
    assert_eq!(harness.server.connections(), 2);
}

#[tokio::test]
async fn test_fault_bad_signature_fails_channel() {
    let config = TestHarnessConfig::new("bad_signature")
        .security(SecurityMode::Sign, SecurityPolicy::Basic256Sha256);
    let harness = TestHarness::with_config(config).await;
    harness.client.connect().await.assert_ok();
    harness.server.corrupt_next_frame();

    let err = harness
        .client
        .read(&[demo_address("Demo.Static.Scalar.Int32")])
        .await
        .assert_err();
    assert!(matches!(err, UaError::Security(_)), "unexpected error: {}", err);
    assert!(err.is_fatal_to_channel());
    assert!(!harness.client.is_connected());
}

#[tokio::test]
async fn test_fault_abort_fails_only_one_request() {
    let harness = TestHarness::start().await;
    harness.client.connect().await.assert_ok();
    harness.server.abort_next_response();

    let err = harness
        .client
        .read(&[demo_address("Demo.Static.Scalar.Int32")])
        .await
        .assert_err();
    assert!(
        matches!(err, UaError::Protocol(ProtocolError::Aborted { .. })),
        "unexpected error: {}",
        err
    );
    assert!(!err.is_fatal_to_channel());
    assert!(harness.client.is_connected());

    let result = harness
        .client
        .read(&[demo_address("Demo.Static.Scalar.Int32")])
        .await
        .assert_ok();
    result[0].assert_value(&Variant::Int32(DEMO_INT32));
    assert_eq!(harness.server.connections(), 1);
}

#[tokio::test]
async fn test_fault_dropped_connection_reconnects() {
    let harness = TestHarness::start().await;
    harness.client.connect().await.assert_ok();
    harness.server.drop_next_request();

    let err = harness
        .client
        .read(&[demo_address("Demo.Static.Scalar.Double")])
        .await
        .assert_err();
    assert!(matches!(err, UaError::Connection(_)), "unexpected error: {}", err);

    let result = harness
        .client
        .read(&[demo_address("Demo.Static.Scalar.Double")])
        .await
        .assert_ok();
    result[0].assert_good();
    assert_eq!(harness.server.connections(), 2);
    assert_eq!(harness.client.stats().connections(), 2);
}

#[tokio::test]
async fn test_fault_request_timeout_keeps_channel() {
    let config = TestHarnessConfig::new("request_timeout").request_timeout(Duration::from_millis(200));
    let harness = TestHarness::with_config(config).await;
    harness.client.connect().await.assert_ok();
    harness
        .server
        .delay_reads_of(demo_node("Demo.Static.Scalar.Double"), Duration::from_secs(1));

    let err = harness
        .client
        .read(&[demo_address("Demo.Static.Scalar.Double")])
        .await
        .assert_err();
    assert!(matches!(err, UaError::Timeout(_)), "unexpected error: {}", err);
    assert!(harness.client.is_connected());

    let result = harness
        .client
        .read(&[demo_address("Demo.Static.Scalar.Int32")])
        .await
        .assert_ok();
    result[0].assert_good();
    assert_eq!(harness.server.connections(), 1);
}

// =============================================================================
// Keep-alive Tests
// =============================================================================

#[tokio::test]
async fn test_keepalive_sent_when_idle() {
    let config = TestHarnessConfig::new("keepalive_idle")
        .keepalive(Duration::from_millis(100), Duration::from_millis(500));
    let harness = TestHarness::with_config(config).await;
    harness.client.connect().await.assert_ok();

    wait_for_or_panic(
        Duration::from_secs(3),
        Duration::from_millis(20),
        "two keep-alives sent",
        || harness.server.keepalives() >= 2,
    )
    .await;
    assert!(harness.client.is_connected());
}

#[tokio::test]
async fn test_keepalive_timeout_loses_connection() {
    let config = TestHarnessConfig::new("keepalive_timeout")
        .keepalive(Duration::from_millis(100), Duration::from_millis(200));
    let harness = TestHarness::with_config(config).await;
    harness.client.connect().await.assert_ok();
    harness.server.ignore_keepalives(true);

    wait_for_or_panic(
        Duration::from_secs(3),
        Duration::from_millis(20),
        "unanswered keep-alive drops the connection",
        || !harness.client.is_connected(),
    )
    .await;

    harness.server.ignore_keepalives(false);
    let result = harness
        .client
        .read(&[demo_address("Demo.Static.Scalar.Int32")])
        .await
        .assert_ok();
    result[0].assert_good();
    assert_eq!(harness.server.connections(), 2);
}
