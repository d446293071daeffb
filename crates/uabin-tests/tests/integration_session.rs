// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Session Integration Tests
//!
//! Session lifecycle against the mock server:
//!
//! - Anonymous and user name activation
//! - Rejected credentials
//! - Service calls outside the activated state
//! - Request handle checks
//! - Recreation after the server forgets a session
//! - Orderly close on disconnect

use std::time::Duration;

use uabin_client::codec::Variant;
use uabin_client::types::ids::{objects, reference_types};
use uabin_client::types::{AttributeId, BrowseDirection};
use uabin_client::{
    ChannelConfig, ClientSettings, ConnectionError, ProtocolError, SecureChannel, SecurityMode,
    SecurityPolicy, Session, SessionError, SessionState, UaError, UserIdentity,
};

use uabin_tests::common::*;

// =============================================================================
// Activation Tests
// =============================================================================

#[tokio::test]
async fn test_session_anonymous() {
    let harness = TestHarness::start().await;
    harness.client.connect().await.assert_ok();

    assert!(harness.client.is_connected());
    assert_eq!(harness.server.sessions_created(), 1);
    assert_eq!(harness.server.sessions_activated(), 1);
    assert_eq!(harness.server.identities(), vec!["anonymous".to_string()]);
    assert_eq!(harness.server.open_sessions(), 1);
}

#[tokio::test]
async fn test_session_user_name() {
    let config = TestHarnessConfig::new("session_user").user(TEST_USER, TEST_PASSWORD);
    let harness = TestHarness::with_config(config).await;

    harness
        .run(|| async {
            let result = harness
                .client
                .read(&[demo_address("Demo.Static.Scalar.Int32")])
                .await
                .assert_ok();
            result[0].assert_value(&Variant::Int32(DEMO_INT32));
            assert_eq!(harness.server.identities(), vec![TEST_USER.to_string()]);
        })
        .await;
}

#[tokio::test]
async fn test_session_user_name_over_encrypted_channel() {
    let config = TestHarnessConfig::new("session_user_encrypted")
        .security(SecurityMode::SignAndEncrypt, SecurityPolicy::Basic256Sha256)
        .user(TEST_USER, TEST_PASSWORD);
    let harness = TestHarness::with_config(config).await;

    harness.client.connect().await.assert_ok();
    assert_eq!(harness.server.identities(), vec![TEST_USER.to_string()]);
    assert_eq!(
        harness.server.channel_modes(),
        vec![SecurityMode::SignAndEncrypt]
    );
}

#[tokio::test]
async fn test_session_wrong_password_rejected() {
    let config = TestHarnessConfig::new("session_wrong_password").user(TEST_USER, "not-the-password");
    let harness = TestHarness::with_config(config).await;

    let err = harness.client.connect().await.assert_err();
    assert!(
        matches!(
            err,
            UaError::Connection(ConnectionError::AllEndpointsFailed { attempts: 1, .. })
        ),
        "unexpected error: {}",
        err
    );
    assert!(!harness.client.is_connected());
    assert_eq!(harness.server.sessions_created(), 1);
    assert_eq!(harness.server.sessions_activated(), 0);
    assert_eq!(harness.server.open_sessions(), 0);
    assert_eq!(harness.client.stats().connection_failures(), 1);
}

#[tokio::test]
async fn test_session_namespace_array_read_on_activation() {
    let harness = TestHarness::start().await;

    let namespaces = harness.client.namespaces().await.assert_ok();
    assert_eq!(namespaces.find_namespace_index(DEMO_NS), Some(DEMO_NS_INDEX));
    assert_eq!(namespaces.find_namespace_index(UA_NS), Some(0));
    assert_eq!(namespaces.find_namespace_index("urn:nowhere"), None);
}

// =============================================================================
// State Tests
// =============================================================================

async fn created_session(server: &MockServer) -> Session {
    let settings = ClientSettings::builder()
        .application_name("session state test")
        .discovery_url(MOCK_ENDPOINT_URL)
        .build()
        .assert_ok();
    let channel = SecureChannel::open(server, MOCK_ENDPOINT_URL, ChannelConfig::from_settings(&settings))
        .await
        .assert_ok();
    Session::create(channel, &settings).await.assert_ok()
}

fn assert_invalid_state(err: UaError, expected: SessionState) {
    match err {
        UaError::Session(SessionError::InvalidState { state, .. }) => assert_eq!(state, expected),
        other => panic!("expected InvalidState, got {}", other),
    }
}

#[tokio::test]
async fn test_session_calls_require_activation() {
    init_test_logging();
    let server = MockServer::new(demo_address_space());
    let session = created_session(&server).await;
    assert_eq!(session.state(), SessionState::Created);
    let node = demo_node("Demo.Static.Scalar.Double");

    let err = session.read(&[node.clone()], AttributeId::Value).await.assert_err();
    assert_invalid_state(err, SessionState::Created);
    let err = session
        .browse(
            &objects::OBJECTS_FOLDER,
            BrowseDirection::Forward,
            &reference_types::HIERARCHICAL_REFERENCES,
        )
        .await
        .assert_err();
    assert_invalid_state(err, SessionState::Created);
    assert_eq!(server.reads(), 0);
    assert_eq!(server.browses(), 0);

    session.activate(&UserIdentity::Anonymous).await.assert_ok();
    let values = session.read(&[node.clone()], AttributeId::Value).await.assert_ok();
    assert_eq!(values[0].value, Some(Variant::Double(DEMO_DOUBLE)));

    session.close().await.assert_ok();
    assert_eq!(session.state(), SessionState::Closed);
    let err = session.read(&[node], AttributeId::Value).await.assert_err();
    assert!(!err.is_retryable());
    assert_invalid_state(err, SessionState::Closed);
    let err = session.activate(&UserIdentity::Anonymous).await.assert_err();
    assert_invalid_state(err, SessionState::Closed);
    server.shutdown();
}

#[tokio::test]
async fn test_session_rejects_wrong_request_handle() {
    let harness = TestHarness::start().await;
    harness.client.connect().await.assert_ok();

    harness.server.corrupt_next_request_handle();
    let err = harness
        .client
        .read(&[demo_address("Demo.Static.Scalar.Int32")])
        .await
        .assert_err();
    assert!(
        matches!(err, UaError::Protocol(ProtocolError::HandleMismatch { .. })),
        "unexpected error: {}",
        err
    );
    assert!(err.is_fatal_to_channel());
    assert!(!harness.client.is_connected());

    let result = harness
        .client
        .read(&[demo_address("Demo.Static.Scalar.Int32")])
        .await
        .assert_ok();
    result[0].assert_value(&Variant::Int32(DEMO_INT32));
    assert_eq!(harness.server.connections(), 2);
}

// =============================================================================
// Recovery Tests
// =============================================================================

#[tokio::test]
async fn test_session_recreated_after_invalidation() {
    let harness = TestHarness::start().await;
    harness
        .client
        .read(&[demo_address("Demo.Static.Scalar.Double")])
        .await
        .assert_ok();

    harness.server.invalidate_sessions();

    let result = harness
        .client
        .read(&[demo_address("Demo.Static.Scalar.Double")])
        .await
        .assert_ok();
    result[0].assert_value_approx(DEMO_DOUBLE, 1e-9);
    assert_eq!(harness.server.sessions_created(), 2);
    assert_eq!(harness.server.sessions_activated(), 2);
    assert_eq!(harness.server.connections(), 1);
}

#[tokio::test]
async fn test_session_recreation_reloads_namespaces() {
    const ADDED_NS: &str = "urn:uabin:restarted";
    let harness = TestHarness::start().await;
    let before = harness.client.namespaces().await.assert_ok();
    assert_eq!(before.find_namespace_index(ADDED_NS), None);

    harness.server.with_address_space(|space| {
        let mut namespaces = space.namespaces().to_vec();
        namespaces.push(ADDED_NS.to_string());
        space.set_namespaces(namespaces);
    });
    harness.server.invalidate_sessions();

    let result = harness
        .client
        .read(&[demo_address("Demo.Static.Scalar.Double")])
        .await
        .assert_ok();
    result[0].assert_good();
    assert_eq!(harness.server.sessions_created(), 2);

    let after = harness.client.namespaces().await.assert_ok();
    assert_eq!(after.find_namespace_index(ADDED_NS), Some(before.len() as u16));
    assert_eq!(after.find_namespace_index(DEMO_NS), Some(DEMO_NS_INDEX));
}

#[tokio::test]
async fn test_session_recreated_once_for_concurrent_calls() {
    let harness = TestHarness::start().await;
    harness.client.connect().await.assert_ok();
    harness.server.invalidate_sessions();

    let mut tasks = Vec::new();
    for _ in 0..4 {
        let client = harness.client.clone();
        tasks.push(tokio::spawn(async move {
            client.read(&[demo_address("Demo.Static.Scalar.Int32")]).await
        }));
    }
    for task in tasks {
        let result = task.await.expect("read task panicked").assert_ok();
        result[0].assert_good();
    }
    assert_eq!(harness.server.sessions_created(), 2);
}

// =============================================================================
// Close Tests
// =============================================================================

#[tokio::test]
async fn test_session_closed_on_disconnect() {
    let harness = TestHarness::start().await;
    harness.client.connect().await.assert_ok();

    harness.client.disconnect().await.assert_ok();
    assert!(!harness.client.is_connected());
    assert_eq!(harness.server.sessions_closed(), 1);
    assert_eq!(harness.server.open_sessions(), 0);
    wait_for_or_panic(
        Duration::from_secs(2),
        Duration::from_millis(10),
        "channel closed after the session",
        || harness.server.closed_channels() == 1,
    )
    .await;

    let result = harness
        .client
        .read(&[demo_address("Demo.Static.Scalar.String")])
        .await
        .assert_ok();
    result[0].assert_value(&Variant::from(DEMO_STRING));
    assert_eq!(harness.server.connections(), 2);
}

#[tokio::test]
async fn test_session_disconnect_without_connection() {
    let harness = TestHarness::start().await;
    harness.client.disconnect().await.assert_ok();
    assert_eq!(harness.server.connections(), 0);
}
