// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Test Harness
//!
//! Connects a [`Client`] to a fresh [`MockServer`] serving the demo address
//! space.
//!
//! ## Design Principles
//!
//! - Every harness owns its own server; tests never share state
//! - Short timeouts so fault tests fail fast
//! - The server shuts down when the harness drops

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use uabin_client::types::Address;
use uabin_client::{Client, ClientSettings, SecurityMode, SecurityPolicy, UaResult};

use super::fixtures::{demo_address, demo_address_space};
use super::init_test_logging;
use super::mocks::{AddressSpace, MockServer, MOCK_ENDPOINT_URL};

/// Default user accepted by every harness server.
pub const TEST_USER: &str = "operator";

/// Password of [`TEST_USER`].
pub const TEST_PASSWORD: &str = "secret";

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the test harness.
#[derive(Debug, Clone)]
pub struct TestHarnessConfig {
    /// Name of the test, used as the client application name.
    pub test_name: String,

    /// Timeout for the entire test body.
    pub timeout: Duration,

    /// Per-request timeout of the client.
    pub request_timeout: Duration,

    /// Keep-alive interval and timeout.
    pub keepalive: (Duration, Duration),

    /// Message security.
    pub security: (SecurityMode, SecurityPolicy),

    /// User name identity; anonymous when `None`.
    pub user: Option<(String, String)>,

    /// Discovery URLs tried in order.
    pub discovery_urls: Vec<String>,

    /// Maximum requests in flight.
    pub max_pending_requests: usize,
}

impl Default for TestHarnessConfig {
    fn default() -> Self {
        Self {
            test_name: "uabin_test".to_string(),
            timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(2),
            keepalive: (Duration::from_secs(60), Duration::from_secs(5)),
            security: (SecurityMode::None, SecurityPolicy::None),
            user: None,
            discovery_urls: vec![MOCK_ENDPOINT_URL.to_string()],
            max_pending_requests: 32,
        }
    }
}

impl TestHarnessConfig {
    /// Create a new config with a test name.
    pub fn new(test_name: impl Into<String>) -> Self {
        Self {
            test_name: test_name.into(),
            ..Default::default()
        }
    }

    /// Set the test timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the request timeout.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the keep-alive interval and timeout.
    pub fn keepalive(mut self, interval: Duration, timeout: Duration) -> Self {
        self.keepalive = (interval, timeout);
        self
    }

    /// Use message security.
    pub fn security(mut self, mode: SecurityMode, policy: SecurityPolicy) -> Self {
        self.security = (mode, policy);
        self
    }

    /// Authenticate with a user name.
    pub fn user(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = Some((username.into(), password.into()));
        self
    }

    /// Replace the discovery URLs.
    pub fn discovery_urls<I, S>(mut self, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.discovery_urls = urls.into_iter().map(Into::into).collect();
        self
    }

    /// Set the pending request window.
    pub fn max_pending_requests(mut self, max: usize) -> Self {
        self.max_pending_requests = max;
        self
    }

    /// Client settings for this configuration.
    pub fn settings(&self) -> UaResult<ClientSettings> {
        let mut builder = ClientSettings::builder()
            .application_name(self.test_name.clone())
            .discovery_urls(self.discovery_urls.clone())
            .security(self.security.0, self.security.1)
            .request_timeout(self.request_timeout)
            .connect_timeout(Duration::from_secs(2))
            .keepalive(self.keepalive.0, self.keepalive.1)
            .max_pending_requests(self.max_pending_requests);
        if let Some((username, password)) = &self.user {
            builder = builder.username(username.clone(), password.clone());
        }
        builder.build()
    }
}

// =============================================================================
// Harness
// =============================================================================

/// A client wired to its own mock server.
pub struct TestHarness {
    /// Configuration used to create this harness.
    pub config: TestHarnessConfig,

    /// The mock server.
    pub server: MockServer,

    /// Client connected to [`server`](Self::server) on first use.
    pub client: Arc<Client>,
}

impl TestHarness {
    /// Starts a harness with the default configuration.
    pub async fn start() -> Self {
        Self::with_config(TestHarnessConfig::default()).await
    }

    /// Starts a harness with `config`.
    pub async fn with_config(config: TestHarnessConfig) -> Self {
        Self::with_address_space(config, demo_address_space()).await
    }

    /// Starts a harness serving `space`.
    pub async fn with_address_space(config: TestHarnessConfig, space: AddressSpace) -> Self {
        init_test_logging();
        let server = MockServer::new(space);
        server.add_user(TEST_USER, TEST_PASSWORD);
        let client = Self::client_for(&config, &server);
        Self {
            config,
            server,
            client,
        }
    }

    /// Builds another client against the same server.
    pub fn new_client(&self) -> Arc<Client> {
        Self::client_for(&self.config, &self.server)
    }

    fn client_for(config: &TestHarnessConfig, server: &MockServer) -> Arc<Client> {
        let settings = config.settings().expect("harness settings must be valid");
        Arc::new(
            Client::with_connector(settings, Arc::new(server.clone()))
                .expect("harness client must build"),
        )
    }

    /// An absolute address of a demo node.
    pub fn demo_address(&self, identifier: &str) -> Address {
        demo_address(identifier)
    }

    /// Runs `test` under the configured timeout.
    pub async fn run<F, Fut>(&self, test: F)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ()>,
    {
        let timeout = self.config.timeout;
        if tokio::time::timeout(timeout, test()).await.is_err() {
            panic!("Test {} timed out after {:?}", self.config.test_name, timeout);
        }
    }
}

impl Drop for TestHarness {
    fn drop(&mut self) {
        self.server.shutdown();
    }
}

impl std::fmt::Debug for TestHarness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestHarness")
            .field("test_name", &self.config.test_name)
            .field("server", &self.server)
            .finish()
    }
}
