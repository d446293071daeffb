// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Built-in value types with a null form.
//!
//! OPC UA strings and byte strings distinguish null (length `-1`) from
//! empty (length `0`). The newtypes here keep that distinction so a decoded
//! value re-encodes to the same bytes.

use std::fmt;

use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// UaString
// =============================================================================

/// A nullable UTF-8 string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UaString(pub Option<String>);

impl UaString {
    /// The null string.
    pub const fn null() -> Self {
        Self(None)
    }

    /// Returns `true` if this is the null string.
    pub fn is_null(&self) -> bool {
        self.0.is_none()
    }

    /// Returns the string, treating null as empty.
    pub fn as_str(&self) -> &str {
        self.0.as_deref().unwrap_or("")
    }
}

impl From<&str> for UaString {
    fn from(value: &str) -> Self {
        Self(Some(value.to_string()))
    }
}

impl From<String> for UaString {
    fn from(value: String) -> Self {
        Self(Some(value))
    }
}

impl fmt::Display for UaString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// ByteString
// =============================================================================

/// A nullable byte string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ByteString(pub Option<Vec<u8>>);

impl ByteString {
    /// The null byte string.
    pub const fn null() -> Self {
        Self(None)
    }

    /// Returns `true` if this is the null byte string.
    pub fn is_null(&self) -> bool {
        self.0.is_none()
    }

    /// Returns the bytes, treating null as empty.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_deref().unwrap_or(&[])
    }

    /// Returns the length, treating null as empty.
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    /// Returns `true` if null or empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Vec<u8>> for ByteString {
    fn from(value: Vec<u8>) -> Self {
        Self(Some(value))
    }
}

impl From<&[u8]> for ByteString {
    fn from(value: &[u8]) -> Self {
        Self(Some(value.to_vec()))
    }
}

// =============================================================================
// DateTime
// =============================================================================

/// Ticks between 1601-01-01 and the Unix epoch, in 100 ns units.
const UNIX_EPOCH_TICKS: i64 = 116_444_736_000_000_000;

/// An OPC UA timestamp: 100 ns ticks since 1601-01-01 UTC.
///
/// Stored as raw ticks so every wire value round-trips exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DateTime(pub i64);

impl DateTime {
    /// The null timestamp (tick 0).
    pub const NULL: DateTime = DateTime(0);

    /// Returns the current time.
    pub fn now() -> Self {
        Self::from_chrono(Utc::now())
    }

    /// Converts from a chrono timestamp.
    pub fn from_chrono(value: chrono::DateTime<Utc>) -> Self {
        let micros = value.timestamp_micros();
        Self(micros.saturating_mul(10).saturating_add(UNIX_EPOCH_TICKS))
    }

    /// Converts to a chrono timestamp. Returns `None` outside chrono's range.
    pub fn to_chrono(self) -> Option<chrono::DateTime<Utc>> {
        let since_unix = self.0.checked_sub(UNIX_EPOCH_TICKS)?;
        let secs = since_unix.div_euclid(10_000_000);
        let nanos = (since_unix.rem_euclid(10_000_000) * 100) as u32;
        Utc.timestamp_opt(secs, nanos).single()
    }

    /// Returns `true` for the null timestamp.
    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_chrono() {
            Some(ts) => write!(f, "{}", ts.to_rfc3339()),
            None => write!(f, "ticks:{}", self.0),
        }
    }
}

// =============================================================================
// QualifiedName
// =============================================================================

/// A name qualified by a namespace index.
///
/// Used as the browse name of a node and as the target of relative path
/// elements.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct QualifiedName {
    /// Namespace index of the name.
    pub namespace_index: u16,
    /// The name text.
    pub name: UaString,
}

impl QualifiedName {
    /// Creates a qualified name.
    pub fn new(namespace_index: u16, name: impl Into<String>) -> Self {
        Self {
            namespace_index,
            name: UaString(Some(name.into())),
        }
    }

    /// Returns `true` if the name is null.
    pub fn is_null(&self) -> bool {
        self.namespace_index == 0 && self.name.is_null()
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace_index == 0 {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}:{}", self.namespace_index, self.name)
        }
    }
}

// =============================================================================
// LocalizedText
// =============================================================================

/// Human readable text with an optional locale.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct LocalizedText {
    /// Locale identifier such as `en-US`.
    pub locale: UaString,
    /// The text.
    pub text: UaString,
}

impl LocalizedText {
    /// Creates a localized text.
    pub fn new(locale: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            locale: UaString(Some(locale.into())),
            text: UaString(Some(text.into())),
        }
    }

    /// Creates a text without locale.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            locale: UaString::null(),
            text: UaString(Some(text.into())),
        }
    }
}

impl fmt::Display for LocalizedText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.locale.is_null() {
            write!(f, "{}", self.text)
        } else {
            write!(f, "[{}] {}", self.locale, self.text)
        }
    }
}
