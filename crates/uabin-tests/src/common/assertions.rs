// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Custom Test Assertions
//!
//! Assertion helpers for read results and decoded values.
//!
//! ## Design Principles
//!
//! - Provide clear, informative failure messages
//! - Support both synchronous and asynchronous assertions

use std::time::Duration;

use uabin_client::codec::{ExtensionObjectBody, GenericValue, Variant};
use uabin_client::{ReadResultTarget, StatusCode, TargetErrorKind, UaError};

// =============================================================================
// Read Result Assertions
// =============================================================================

/// Assertion extensions for one read target.
pub trait ReadTargetAssertions {
    /// Assert that the target was read and decoded.
    fn assert_good(&self);

    /// Assert the value.
    fn assert_value(&self, expected: &Variant);

    /// Assert a double value within `tolerance`.
    fn assert_value_approx(&self, expected: f64, tolerance: f64);

    /// Assert the server status of a resolved target.
    fn assert_status(&self, expected: StatusCode);

    /// Assert a local failure of `kind`.
    fn assert_error_kind(&self, expected: TargetErrorKind);

    /// Return the decoded structure or union of the value.
    fn decoded(&self) -> &GenericValue;
}

impl ReadTargetAssertions for ReadResultTarget {
    fn assert_good(&self) {
        assert!(
            self.is_good(),
            "Expected a good target, but got status {} error {:?} for {:?}",
            self.status_code,
            self.error,
            self.node_id
        );
    }

    fn assert_value(&self, expected: &Variant) {
        self.assert_good();
        assert_eq!(
            self.data.as_ref(),
            Some(expected),
            "Expected value {:?}, but got {:?} for {:?}",
            expected,
            self.data,
            self.node_id
        );
    }

    fn assert_value_approx(&self, expected: f64, tolerance: f64) {
        self.assert_good();
        let actual = match &self.data {
            Some(Variant::Double(v)) => *v,
            Some(Variant::Float(v)) => f64::from(*v),
            other => panic!("Value is not a floating point number: {:?}", other),
        };
        let diff = (actual - expected).abs();
        assert!(
            diff <= tolerance,
            "Expected value {} ± {}, but got {} (diff: {}) for {:?}",
            expected,
            tolerance,
            actual,
            diff,
            self.node_id
        );
    }

    fn assert_status(&self, expected: StatusCode) {
        assert!(self.node_id.is_some(), "Target was not resolved: {:?}", self.error);
        assert_eq!(
            self.status_code, expected,
            "Expected status {}, but got {} for {:?}",
            expected, self.status_code, self.node_id
        );
    }

    fn assert_error_kind(&self, expected: TargetErrorKind) {
        match &self.error {
            Some(error) => assert_eq!(
                error.kind, expected,
                "Expected {:?} failure, but got {:?}: {}",
                expected, error.kind, error.message
            ),
            None => panic!(
                "Expected {:?} failure, but target succeeded with {:?}",
                expected, self.data
            ),
        }
    }

    fn decoded(&self) -> &GenericValue {
        match &self.data {
            Some(Variant::ExtensionObject(obj)) => match &obj.body {
                ExtensionObjectBody::Decoded(value) => value,
                other => panic!("Extension object {} was not decoded: {:?}", obj.type_id, other),
            },
            other => panic!("Value is not an extension object: {:?}", other),
        }
    }
}

/// Returns a scalar field of a decoded value.
pub fn scalar_field<'a>(value: &'a GenericValue, name: &str) -> &'a Variant {
    match value.field(name) {
        Ok(field) => field
            .as_scalar()
            .unwrap_or_else(|| panic!("Field {} is not a scalar: {:?}", name, field)),
        Err(e) => panic!("Field {} missing from {}: {}", name, value.name(), e),
    }
}

/// Asserts that `error` carries `status`.
pub fn assert_status_error(error: &UaError, status: StatusCode) {
    assert_eq!(
        error.status_code(),
        Some(status),
        "Expected an error with status {}, but got {}",
        status,
        error
    );
}

// =============================================================================
// Result Assertions
// =============================================================================

/// Assertion helper for Results.
pub trait ResultAssertions<T, E> {
    /// Assert that the result is Ok and return the value.
    fn assert_ok(self) -> T;

    /// Assert that the result is Err.
    fn assert_err(self) -> E;
}

impl<T: std::fmt::Debug, E: std::fmt::Debug> ResultAssertions<T, E> for Result<T, E> {
    fn assert_ok(self) -> T {
        match self {
            Ok(v) => v,
            Err(e) => panic!("Expected Ok, but got Err: {:?}", e),
        }
    }

    fn assert_err(self) -> E {
        match self {
            Ok(v) => panic!("Expected Err, but got Ok: {:?}", v),
            Err(e) => e,
        }
    }
}

// =============================================================================
// Async Assertion Helpers
// =============================================================================

/// Wait for a condition to become true within a timeout.
pub async fn wait_for<F>(timeout: Duration, interval: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let start = tokio::time::Instant::now();
    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        tokio::time::sleep(interval).await;
    }
    condition()
}

/// Wait for a condition to become true, panicking if it doesn't.
pub async fn wait_for_or_panic<F>(timeout: Duration, interval: Duration, message: &str, condition: F)
where
    F: FnMut() -> bool,
{
    if !wait_for(timeout, interval, condition).await {
        panic!("Condition not met within {:?}: {}", timeout, message);
    }
}

/// Assert that an async operation completes within a timeout.
#[macro_export]
macro_rules! assert_completes_within {
    ($timeout:expr, $future:expr) => {{
        match tokio::time::timeout($timeout, $future).await {
            Ok(result) => result,
            Err(_) => panic!("Operation did not complete within {:?}", $timeout),
        }
    }};
}
