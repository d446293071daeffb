// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA Integration Tests
//!
//! These tests require a running OPC UA server with the Unified Automation
//! demo address space (for example the UaCPPServer or UaExpert demo server).
//!
//! # Environment Variables
//!
//! - `UABIN_TEST_ENDPOINT`: server endpoint (default: opc.tcp://localhost:48010)
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p uabin-client --test opcua_integration -- --ignored
//! ```

use std::time::Duration;

use uabin_client::types::{Address, ExpandedNodeId, NodeIdentifier, QualifiedName};
use uabin_client::{Argument, Client, ClientSettings, NodeId, StatusCode, TargetErrorKind};

// =============================================================================
// Test Configuration
// =============================================================================

const DEFAULT_TEST_ENDPOINT: &str = "opc.tcp://localhost:48010";

const DEMO_NAMESPACE: &str = "http://www.unifiedautomation.com/DemoServer/";

fn test_endpoint() -> String {
    std::env::var("UABIN_TEST_ENDPOINT").unwrap_or_else(|_| DEFAULT_TEST_ENDPOINT.to_string())
}

fn test_client() -> Client {
    let settings = ClientSettings::builder()
        .application_name("uabin integration test")
        .discovery_url(test_endpoint())
        .request_timeout(Duration::from_secs(5))
        .build()
        .unwrap();
    Client::new(settings).unwrap()
}

fn demo_node(identifier: &str) -> Address {
    Address::absolute(
        ExpandedNodeId::with_namespace_uri(
            NodeIdentifier::String(identifier.to_string()),
            DEMO_NAMESPACE,
        ),
        None,
    )
}

// =============================================================================
// Offline Tests
// =============================================================================

#[tokio::test]
async fn test_empty_batch_read_needs_server() {
    let settings = ClientSettings::builder()
        .discovery_url("opc.tcp://127.0.0.1:1")
        .connect_timeout(Duration::from_millis(300))
        .build()
        .unwrap();
    let client = Client::new(settings).unwrap();
    assert!(client.read(&[]).await.is_err());
}

// =============================================================================
// Integration Tests (Requires OPC UA Server)
// =============================================================================

#[tokio::test]
#[ignore = "Requires OPC UA demo server"]
async fn test_real_server_namespace_array() {
    let client = test_client();
    let namespaces = client.namespaces().await.expect("Failed to connect");
    assert_eq!(namespaces.find_namespace_index("http://opcfoundation.org/UA/"), Some(0));
    assert!(namespaces.find_namespace_index(DEMO_NAMESPACE).is_some());
    client.disconnect().await.unwrap();
}

#[tokio::test]
#[ignore = "Requires OPC UA demo server"]
async fn test_real_server_vector_add_arguments() {
    let client = test_client();
    let inputs = Address::relative(
        demo_node("Demo.Method.VectorAdd"),
        [QualifiedName::new(0, "InputArguments")],
    );

    let result = client.read(&[inputs]).await.expect("Read failed");
    let target = &result[0];
    assert!(target.is_good(), "unexpected outcome: {:?}", target);

    let arguments = Argument::from_variant(target.data.as_ref().unwrap()).unwrap();
    assert!(!arguments.is_empty());
    for argument in &arguments {
        println!("{}", argument);
    }
    client.disconnect().await.unwrap();
}

#[tokio::test]
#[ignore = "Requires OPC UA demo server"]
async fn test_real_server_mixed_batch() {
    let client = test_client();
    let missing_namespace = Address::absolute(
        ExpandedNodeId::with_namespace_uri(NodeIdentifier::Numeric(1), "urn:not-there"),
        None,
    );
    let addresses = [
        demo_node("Demo.Static.Scalar.Double"),
        missing_namespace,
        Address::from(NodeId::numeric(0, 2255)),
    ];

    let result = client.read(&addresses).await.expect("Read failed");
    assert_eq!(result.len(), 3);
    assert_eq!(result[0].status_code, StatusCode::GOOD);
    assert_eq!(
        result[1].error.as_ref().map(|e| e.kind),
        Some(TargetErrorKind::UnknownNamespace)
    );
    assert!(result[2].is_good());
    client.disconnect().await.unwrap();
}
