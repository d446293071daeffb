// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Settings Integration Tests
//!
//! Settings files on disk driving a real client:
//!
//! - YAML, TOML and JSON files
//! - Load errors
//! - A loaded file connecting to the mock server

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;

use uabin_client::codec::Variant;
use uabin_client::{
    Client, ClientSettings, ConfigurationError, SecurityMode, SecurityPolicy, UaError, UserIdentity,
};

use uabin_tests::common::*;

const YAML: &str = r#"
application_name: settings test
discovery_urls:
  - opc.tcp://mock.uabin.test:4840
request_timeout: 3s
connect_timeout: 1s
keepalive_interval: 1m
max_pending_requests: 4
user_token:
  type: user_name
  username: operator
  password: secret
"#;

const TOML: &str = r#"
application_name = "settings test"
discovery_urls = ["opc.tcp://mock.uabin.test:4840", "opc.tcp://backup.uabin.test:4840"]
security_mode = "sign"
session_timeout = "2m 30s"
"#;

const JSON: &str = r#"{
  "application_name": "settings test",
  "discovery_urls": ["opc.tcp://mock.uabin.test"],
  "receive_buffer_size": 16384,
  "send_buffer_size": 16384
}"#;

// =============================================================================
// File Format Tests
// =============================================================================

#[test]
fn test_settings_yaml_file() {
    let dir = temp_test_dir("uabin-settings");
    let path = dir.path().join("client.yaml");
    fs::write(&path, YAML).expect("write settings");

    let settings = ClientSettings::from_file(&path).assert_ok();
    assert_eq!(settings.application_name, "settings test");
    assert_eq!(settings.request_timeout, Duration::from_secs(3));
    assert_eq!(settings.connect_timeout, Duration::from_secs(1));
    assert_eq!(settings.keepalive_interval, Duration::from_secs(60));
    assert_eq!(settings.max_pending_requests, 4);
    assert_eq!(
        settings.user_token,
        UserIdentity::UserName {
            username: TEST_USER.to_string(),
            password: TEST_PASSWORD.to_string(),
        }
    );
    assert_eq!(settings.security_mode, SecurityMode::None);
}

#[test]
fn test_settings_toml_requires_matching_policy() {
    let dir = temp_test_dir("uabin-settings");
    let path = dir.path().join("client.toml");
    fs::write(&path, TOML).expect("write settings");

    let err = ClientSettings::from_file(&path).assert_err();
    assert!(
        matches!(
            err,
            UaError::Configuration(ConfigurationError::InvalidValue { .. })
        ),
        "unexpected error: {}",
        err
    );
}

#[test]
fn test_settings_yaml_round_trip_with_security() {
    let settings = ClientSettings::builder()
        .application_name("settings test")
        .discovery_urls([MOCK_ENDPOINT_URL, "opc.tcp://backup.uabin.test:4840"])
        .security(SecurityMode::Sign, SecurityPolicy::Basic256Sha256)
        .session_timeout(Duration::from_secs(150))
        .build()
        .assert_ok();

    let text = serde_yaml::to_string(&settings).expect("serialize settings");
    let dir = temp_test_dir("uabin-settings");
    let path = dir.path().join("client.yml");
    fs::write(&path, text).expect("write settings");

    let loaded = ClientSettings::from_file(&path).assert_ok();
    assert_eq!(loaded, settings);
    assert_eq!(loaded.discovery_urls.len(), 2);
}

#[test]
fn test_settings_json_file() {
    let dir = temp_test_dir("uabin-settings");
    let path = dir.path().join("client.json");
    fs::write(&path, JSON).expect("write settings");

    let settings = ClientSettings::from_file(&path).assert_ok();
    assert_eq!(settings.receive_buffer_size, 16384);
    assert_eq!(settings.send_buffer_size, 16384);
    assert_eq!(settings.discovery_urls, vec!["opc.tcp://mock.uabin.test".to_string()]);
    assert_eq!(settings.user_token, UserIdentity::Anonymous);
}

// =============================================================================
// Load Error Tests
// =============================================================================

#[test]
fn test_settings_missing_file() {
    let dir = temp_test_dir("uabin-settings");
    let err = ClientSettings::from_file(dir.path().join("absent.yaml")).assert_err();
    assert!(matches!(
        err,
        UaError::Configuration(ConfigurationError::FileRead { .. })
    ));
}

#[test]
fn test_settings_malformed_content() {
    let dir = temp_test_dir("uabin-settings");
    let path = dir.path().join("client.json");
    fs::write(&path, "{ \"application_name\": ").expect("write settings");

    let err = ClientSettings::from_file(&path).assert_err();
    match err {
        UaError::Configuration(ConfigurationError::Parse { format, .. }) => assert_eq!(format, "JSON"),
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_settings_invalid_endpoint_in_file() {
    let dir = temp_test_dir("uabin-settings");
    let path = dir.path().join("client.yml");
    fs::write(&path, "discovery_urls:\n  - http://mock.uabin.test\n").expect("write settings");

    let err = ClientSettings::from_file(&path).assert_err();
    assert!(matches!(
        err,
        UaError::Configuration(ConfigurationError::InvalidEndpoint { .. })
    ));
}

// =============================================================================
// End-to-end Tests
// =============================================================================

#[tokio::test]
async fn test_settings_file_drives_client() {
    init_test_logging();
    let dir = temp_test_dir("uabin-settings");
    let path = dir.path().join("client.yaml");
    let mut settings: ClientSettings = serde_yaml::from_str(YAML).expect("parse settings");
    settings.security_mode = SecurityMode::SignAndEncrypt;
    settings.security_policy = SecurityPolicy::Basic256Sha256;
    fs::write(&path, serde_yaml::to_string(&settings).expect("serialize settings"))
        .expect("write settings");

    let server = MockServer::new(demo_address_space());
    server.add_user(TEST_USER, TEST_PASSWORD);
    let client = Client::with_connector(
        ClientSettings::from_file(&path).assert_ok(),
        Arc::new(server.clone()),
    )
    .assert_ok();

    let result = client
        .read(&[demo_address("Demo.Static.Scalar.Double")])
        .await
        .assert_ok();
    result[0].assert_value(&Variant::Double(DEMO_DOUBLE));
    assert_eq!(server.identities(), vec![TEST_USER.to_string()]);
    assert_eq!(server.channel_modes(), vec![SecurityMode::SignAndEncrypt]);

    client.disconnect().await.assert_ok();
    server.shutdown();
}
