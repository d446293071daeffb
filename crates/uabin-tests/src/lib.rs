// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # uabin Integration Tests
//!
//! This crate runs `uabin-client` against an in-process OPC UA server that
//! speaks the real binary protocol over in-memory streams. No network and
//! no external server are needed.
//!
//! ## Module Structure
//!
//! - [`common`]: Shared test utilities, fixtures, and helpers
//!   - `fixtures`: The demo address space and its type dictionary
//!   - `assertions`: Custom assertion helpers for read results
//!   - `mocks`: The mock server and its fault injection
//!   - `harness`: Connects a client to a fresh mock server
//!
//! ## Running Tests
//!
//! ```bash
//! # Run all integration tests
//! cargo test -p uabin-tests
//!
//! # Run specific test suite
//! cargo test -p uabin-tests --test integration_channel
//! cargo test -p uabin-tests --test integration_session
//! cargo test -p uabin-tests --test integration_resolver
//! cargo test -p uabin-tests --test integration_dictionary
//! cargo test -p uabin-tests --test integration_client
//! cargo test -p uabin-tests --test integration_settings
//!
//! # Run with protocol logs
//! RUST_LOG=uabin_client=trace cargo test -p uabin-tests -- --nocapture
//! ```
//!
//! ## Test Categories
//!
//! ### Channel Tests (`integration_channel.rs`)
//! - Handshake and message security modes
//! - Pipelined requests and out-of-order responses
//! - Sequence, signature and connection faults
//! - Keep-alive
//!
//! ### Session Tests (`integration_session.rs`)
//! - Create, activate and close
//! - Identity tokens
//! - Re-creation after `BadSessionIdInvalid`
//!
//! ### Resolver Tests (`integration_resolver.rs`)
//! - Absolute and relative addresses
//! - Per-element translate calls and caching
//!
//! ### Dictionary Tests (`integration_dictionary.rs`)
//! - Lazy loading and single fetch per dictionary
//! - Structure, optional field and union decoding
//!
//! ### Client Tests (`integration_client.rs`)
//! - Batch reads with per-item failures
//! - Method argument inspection
//! - Reconnection and endpoint failover
//!
//! ### Settings Tests (`integration_settings.rs`)
//! - Settings files in YAML, TOML and JSON
//!
//! ## Writing New Tests
//!
//! ```rust,ignore
//! use uabin_tests::common::harness::TestHarness;
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let harness = TestHarness::start().await;
//!     let result = harness.client.read(&[harness.demo_address("Demo.Static.Scalar.Double")]).await;
//!     // ... test logic
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod common;

/// Re-export commonly used items for convenience.
pub mod prelude {
    pub use crate::common::assertions::*;
    pub use crate::common::fixtures::*;
    pub use crate::common::harness::*;
    pub use crate::common::mocks::*;
}
