// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Error types for the OPC UA binary client core.
//!
//! Errors are grouped by the layer that raises them so callers can tell
//! channel-wide failures apart from failures that only affect one item of a
//! batch read.
//!
//! # Error Categories
//!
//! ```text
//! UaError
//! ├── Connection    - Transport connect failures, lost connections
//! ├── Protocol      - Framing, sequence and handle violations (fatal)
//! ├── Security      - Signature and decryption failures (fatal, no retry)
//! ├── Session       - Session lifecycle and service faults
//! ├── Resolution    - Namespace and browse path resolution (per item)
//! ├── Dictionary    - Type dictionary loading and lookup (per item)
//! ├── Codec         - Binary encoding and decoding (per item)
//! ├── Configuration - Invalid settings
//! └── Timeout       - Request and connect deadlines
//! ```
//!
//! # Examples
//!
//! ```
//! use uabin_client::error::{UaError, ResolutionError};
//!
//! let error = UaError::resolution(ResolutionError::unknown_namespace("urn:missing"));
//! assert!(error.is_per_item());
//! assert!(!error.is_fatal_to_channel());
//! ```

use std::fmt;
use std::io;
use std::time::Duration;

use thiserror::Error;
use tracing::Level;

use crate::session::SessionState;
use crate::types::StatusCode;

// =============================================================================
// UaError - Main Error Type
// =============================================================================

/// The main error type for client operations.
#[derive(Debug, Error)]
pub enum UaError {
    /// Connection-related errors.
    #[error("{0}")]
    Connection(#[from] ConnectionError),

    /// Wire protocol violations.
    #[error("{0}")]
    Protocol(#[from] ProtocolError),

    /// Message security failures.
    #[error("{0}")]
    Security(#[from] SecurityError),

    /// Session lifecycle errors.
    #[error("{0}")]
    Session(#[from] SessionError),

    /// Address resolution errors.
    #[error("{0}")]
    Resolution(#[from] ResolutionError),

    /// Type dictionary errors.
    #[error("{0}")]
    Dictionary(#[from] DictionaryError),

    /// Binary codec errors.
    #[error("{0}")]
    Codec(#[from] CodecError),

    /// Configuration errors.
    #[error("{0}")]
    Configuration(#[from] ConfigurationError),

    /// Timeout errors.
    #[error("{0}")]
    Timeout(#[from] TimeoutError),
}

impl UaError {
    // =========================================================================
    // Factory Methods
    // =========================================================================

    /// Creates a connection error.
    #[inline]
    pub fn connection(error: ConnectionError) -> Self {
        Self::Connection(error)
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(error: ProtocolError) -> Self {
        Self::Protocol(error)
    }

    /// Creates a security error.
    #[inline]
    pub fn security(error: SecurityError) -> Self {
        Self::Security(error)
    }

    /// Creates a session error.
    #[inline]
    pub fn session(error: SessionError) -> Self {
        Self::Session(error)
    }

    /// Creates a resolution error.
    #[inline]
    pub fn resolution(error: ResolutionError) -> Self {
        Self::Resolution(error)
    }

    /// Creates a dictionary error.
    #[inline]
    pub fn dictionary(error: DictionaryError) -> Self {
        Self::Dictionary(error)
    }

    /// Creates a codec error.
    #[inline]
    pub fn codec(error: CodecError) -> Self {
        Self::Codec(error)
    }

    /// Creates a configuration error.
    #[inline]
    pub fn configuration(error: ConfigurationError) -> Self {
        Self::Configuration(error)
    }

    /// Creates a timeout error.
    #[inline]
    pub fn timeout(error: TimeoutError) -> Self {
        Self::Timeout(error)
    }

    // =========================================================================
    // Convenience Factory Methods
    // =========================================================================

    /// Creates a connection lost error.
    pub fn connection_lost(reason: impl Into<String>) -> Self {
        Self::Connection(ConnectionError::lost(reason))
    }

    /// Creates a not connected error.
    pub fn not_connected() -> Self {
        Self::Connection(ConnectionError::NotConnected)
    }

    /// Creates an invalid session state error.
    pub fn invalid_state(operation: &'static str, state: SessionState) -> Self {
        Self::Session(SessionError::InvalidState { operation, state })
    }

    /// Creates a request timeout error.
    pub fn request_timeout(request_id: u32, duration: Duration) -> Self {
        Self::Timeout(TimeoutError::Request {
            request_id,
            duration,
        })
    }

    /// Creates a malformed message error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Protocol(ProtocolError::Malformed {
            message: message.into(),
        })
    }

    // =========================================================================
    // Error Properties
    // =========================================================================

    /// Returns `true` if this error tears down the secure channel.
    ///
    /// Every pending request on the channel receives the same failure.
    pub fn is_fatal_to_channel(&self) -> bool {
        match self {
            Self::Connection(e) => e.is_fatal_to_channel(),
            Self::Protocol(ProtocolError::Aborted { .. }) => false,
            Self::Protocol(_) | Self::Security(_) => true,
            _ => false,
        }
    }

    /// Returns `true` if the failure only affects one item of a batch.
    pub fn is_per_item(&self) -> bool {
        matches!(
            self,
            Self::Resolution(_) | Self::Dictionary(_) | Self::Codec(_)
        )
    }

    /// Returns `true` if the operation may succeed on a later attempt.
    ///
    /// Security failures and caller bugs are never retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection(e) => e.is_retryable(),
            Self::Session(e) => e.is_retryable(),
            Self::Timeout(_) => true,
            Self::Protocol(_)
            | Self::Security(_)
            | Self::Resolution(_)
            | Self::Dictionary(_)
            | Self::Codec(_)
            | Self::Configuration(_) => false,
        }
    }

    /// Returns the server status code carried by this error, if any.
    pub fn status_code(&self) -> Option<StatusCode> {
        match self {
            Self::Connection(ConnectionError::ServerError { status, .. }) => Some(*status),
            Self::Protocol(ProtocolError::Aborted { status, .. }) => Some(*status),
            Self::Session(e) => e.status_code(),
            Self::Resolution(ResolutionError::TranslateFailed { status, .. }) => Some(*status),
            Self::Dictionary(DictionaryError::ReadFailed { status, .. }) => Some(*status),
            _ => None,
        }
    }

    /// Returns the severity level of this error.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Connection(e) => e.severity(),
            Self::Protocol(_) => ErrorSeverity::Error,
            Self::Security(_) => ErrorSeverity::Critical,
            Self::Session(e) => e.severity(),
            Self::Resolution(_) | Self::Dictionary(_) | Self::Codec(_) => ErrorSeverity::Warning,
            Self::Configuration(_) => ErrorSeverity::Critical,
            Self::Timeout(_) => ErrorSeverity::Warning,
        }
    }

    /// Returns the error category for logging.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Connection(_) => "connection",
            Self::Protocol(_) => "protocol",
            Self::Security(_) => "security",
            Self::Session(_) => "session",
            Self::Resolution(_) => "resolution",
            Self::Dictionary(_) => "dictionary",
            Self::Codec(_) => "codec",
            Self::Configuration(_) => "configuration",
            Self::Timeout(_) => "timeout",
        }
    }

    /// Returns a unique error code for this error.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Connection(e) => e.error_code(),
            Self::Protocol(e) => e.error_code(),
            Self::Security(e) => e.error_code(),
            Self::Session(e) => e.error_code(),
            Self::Resolution(e) => e.error_code(),
            Self::Dictionary(e) => e.error_code(),
            Self::Codec(e) => e.error_code(),
            Self::Configuration(e) => e.error_code(),
            Self::Timeout(e) => e.error_code(),
        }
    }

    /// Returns recovery hints for this error.
    pub fn recovery_hints(&self) -> Vec<&'static str> {
        match self {
            Self::Connection(_) => vec![
                "Check if the server is running",
                "Verify the discovery URLs in the client settings",
            ],
            Self::Protocol(_) => vec!["The channel was closed; the next call reconnects"],
            Self::Security(_) => vec![
                "Verify the security mode and policy match the server endpoint",
                "Do not retry until the security configuration is fixed",
            ],
            Self::Session(SessionError::InvalidState { .. }) => {
                vec!["Activate the session before issuing service calls"]
            }
            Self::Session(_) => vec!["Check the server diagnostics for the service result"],
            Self::Resolution(_) => vec![
                "Check the namespace URI against the server namespace array",
                "Verify each browse name along the relative path",
            ],
            Self::Dictionary(_) => vec!["Check that the server exposes an OPC binary type dictionary"],
            Self::Codec(_) => vec!["The raw bytes are preserved on the extension object"],
            Self::Configuration(_) => vec!["Fix the client settings and restart"],
            Self::Timeout(_) => vec![
                "Increase the request timeout",
                "Check network latency to the server",
            ],
        }
    }

    /// Returns the tracing level for this error.
    pub fn tracing_level(&self) -> Level {
        self.severity().to_tracing_level()
    }

    /// Logs this error with appropriate level and context.
    pub fn log(&self, context: &str) {
        let code = self.error_code();

        match self.tracing_level() {
            Level::ERROR => tracing::error!(
                error_code = %code,
                category = self.category(),
                context = context,
                fatal = self.is_fatal_to_channel(),
                "{self}"
            ),
            Level::WARN => tracing::warn!(
                error_code = %code,
                category = self.category(),
                context = context,
                fatal = self.is_fatal_to_channel(),
                "{self}"
            ),
            _ => tracing::debug!(
                error_code = %code,
                category = self.category(),
                context = context,
                "{self}"
            ),
        }
    }
}

impl From<io::Error> for UaError {
    fn from(error: io::Error) -> Self {
        Self::Connection(ConnectionError::from(error))
    }
}

// =============================================================================
// ConnectionError
// =============================================================================

/// Transport-level connection errors.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// Connection refused.
    #[error("Connection refused to '{endpoint}'")]
    Refused {
        /// Target endpoint.
        endpoint: String,
        /// Underlying error.
        #[source]
        source: Option<io::Error>,
    },

    /// Invalid endpoint URL.
    #[error("Invalid endpoint URL: '{url}' - {reason}")]
    InvalidEndpoint {
        /// The invalid URL.
        url: String,
        /// Reason.
        reason: String,
    },

    /// The connection was lost or stopped answering keep-alives.
    #[error("Connection lost: {reason}")]
    ConnectionLost {
        /// Reason for the loss.
        reason: String,
    },

    /// The server answered with an `ERR` message.
    #[error("Server error {status}: {reason}")]
    ServerError {
        /// Status code sent by the server.
        status: StatusCode,
        /// Reason text sent by the server.
        reason: String,
    },

    /// The channel was closed by the client.
    #[error("Secure channel closed")]
    Closed,

    /// Not connected.
    #[error("Not connected to an OPC UA server")]
    NotConnected,

    /// Every discovery URL was tried and none connected.
    #[error("All {attempts} discovery URLs failed, last error: {last_error}")]
    AllEndpointsFailed {
        /// Number of endpoints tried.
        attempts: usize,
        /// Message of the last failure.
        last_error: String,
    },

    /// Generic I/O error.
    #[error("I/O error: {message}")]
    Io {
        /// Error message.
        message: String,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
}

impl ConnectionError {
    /// Creates a connection refused error with source.
    pub fn refused_with(endpoint: impl Into<String>, source: io::Error) -> Self {
        Self::Refused {
            endpoint: endpoint.into(),
            source: Some(source),
        }
    }

    /// Creates an invalid endpoint error.
    pub fn invalid_endpoint(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidEndpoint {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Creates a connection lost error.
    pub fn lost(reason: impl Into<String>) -> Self {
        Self::ConnectionLost {
            reason: reason.into(),
        }
    }

    /// Returns `true` if this error tears down the channel.
    pub fn is_fatal_to_channel(&self) -> bool {
        matches!(
            self,
            Self::ConnectionLost { .. } | Self::ServerError { .. } | Self::Closed | Self::Io { .. }
        )
    }

    /// Returns `true` if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Refused { .. }
            | Self::ConnectionLost { .. }
            | Self::NotConnected
            | Self::AllEndpointsFailed { .. } => true,
            Self::Io { source, .. } => matches!(
                source.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::Interrupted
            ),
            Self::InvalidEndpoint { .. } | Self::ServerError { .. } | Self::Closed => false,
        }
    }

    /// Returns the severity level.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::NotConnected | Self::Closed => ErrorSeverity::Warning,
            Self::InvalidEndpoint { .. } => ErrorSeverity::Critical,
            _ => ErrorSeverity::Error,
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Refused { .. } => ErrorCode::new(1, 1),
            Self::InvalidEndpoint { .. } => ErrorCode::new(1, 2),
            Self::ConnectionLost { .. } => ErrorCode::new(1, 3),
            Self::ServerError { .. } => ErrorCode::new(1, 4),
            Self::Closed => ErrorCode::new(1, 5),
            Self::NotConnected => ErrorCode::new(1, 6),
            Self::AllEndpointsFailed { .. } => ErrorCode::new(1, 7),
            Self::Io { .. } => ErrorCode::new(1, 8),
        }
    }
}

impl From<io::Error> for ConnectionError {
    fn from(error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::ConnectionRefused => Self::Refused {
                endpoint: "unknown".to_string(),
                source: Some(error),
            },
            io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe => Self::ConnectionLost {
                reason: error.to_string(),
            },
            _ => Self::Io {
                message: error.to_string(),
                source: error,
            },
        }
    }
}

// =============================================================================
// ProtocolError
// =============================================================================

/// Violations of the OPC UA TCP binary protocol.
///
/// All protocol errors are fatal to the secure channel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// An incoming sequence number was not the next expected value.
    #[error("Sequence number desync: expected {expected}, received {actual}")]
    SequenceMismatch {
        /// Expected sequence number.
        expected: u32,
        /// Received sequence number.
        actual: u32,
    },

    /// A response carried a different request handle than its request.
    #[error("Request handle mismatch: expected {expected}, received {actual}")]
    HandleMismatch {
        /// Handle sent with the request.
        expected: u32,
        /// Handle found in the response.
        actual: u32,
    },

    /// A message of an unexpected type arrived.
    #[error("Unexpected message: expected {expected}, received {actual}")]
    UnexpectedMessage {
        /// Expected message type.
        expected: String,
        /// Received message type.
        actual: String,
    },

    /// A response body had an unexpected type id.
    #[error("Unexpected response type: expected {expected}, received {actual}")]
    UnexpectedResponse {
        /// Expected encoding id.
        expected: String,
        /// Received encoding id.
        actual: String,
    },

    /// A message carried a foreign secure channel id.
    #[error("Secure channel id mismatch: expected {expected}, received {actual}")]
    ChannelIdMismatch {
        /// Channel id assigned by the server.
        expected: u32,
        /// Channel id in the message.
        actual: u32,
    },

    /// A message exceeded the negotiated size limit.
    #[error("Message of {size} bytes exceeds the limit of {max} bytes")]
    MessageTooLarge {
        /// Message size.
        size: usize,
        /// Negotiated limit.
        max: usize,
    },

    /// A message was split into more chunks than negotiated.
    #[error("Message exceeds the chunk limit of {max}")]
    TooManyChunks {
        /// Negotiated chunk limit.
        max: u32,
    },

    /// The server aborted a chunked message.
    #[error("Message aborted by server: {status} {reason}")]
    Aborted {
        /// Status of the abort.
        status: StatusCode,
        /// Server supplied reason.
        reason: String,
    },

    /// A message could not be parsed.
    #[error("Malformed message: {message}")]
    Malformed {
        /// Description of the defect.
        message: String,
    },
}

impl ProtocolError {
    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::SequenceMismatch { .. } => ErrorCode::new(2, 1),
            Self::HandleMismatch { .. } => ErrorCode::new(2, 2),
            Self::UnexpectedMessage { .. } => ErrorCode::new(2, 3),
            Self::UnexpectedResponse { .. } => ErrorCode::new(2, 4),
            Self::ChannelIdMismatch { .. } => ErrorCode::new(2, 5),
            Self::MessageTooLarge { .. } => ErrorCode::new(2, 6),
            Self::TooManyChunks { .. } => ErrorCode::new(2, 7),
            Self::Aborted { .. } => ErrorCode::new(2, 8),
            Self::Malformed { .. } => ErrorCode::new(2, 9),
        }
    }
}

// =============================================================================
// SecurityError
// =============================================================================

/// Message security errors. Always fatal and never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SecurityError {
    /// A message signature did not verify.
    #[error("Message signature verification failed")]
    SignatureInvalid,

    /// A message could not be decrypted.
    #[error("Message decryption failed")]
    DecryptionFailed,

    /// A message could not be encrypted.
    #[error("Message encryption failed")]
    EncryptionFailed,

    /// The security policy is not supported by this client.
    #[error("Security policy not supported: {policy}")]
    PolicyNotSupported {
        /// Policy name.
        policy: String,
    },

    /// The server answered with a different security policy.
    #[error("Security policy mismatch: requested '{requested}', server used '{actual}'")]
    PolicyMismatch {
        /// Requested policy URI.
        requested: String,
        /// Policy URI in the response.
        actual: String,
    },

    /// Nonces were missing or too short for key derivation.
    #[error("Invalid nonce: {message}")]
    InvalidNonce {
        /// Description of the defect.
        message: String,
    },
}

impl SecurityError {
    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::SignatureInvalid => ErrorCode::new(3, 1),
            Self::DecryptionFailed => ErrorCode::new(3, 2),
            Self::EncryptionFailed => ErrorCode::new(3, 3),
            Self::PolicyNotSupported { .. } => ErrorCode::new(3, 4),
            Self::PolicyMismatch { .. } => ErrorCode::new(3, 5),
            Self::InvalidNonce { .. } => ErrorCode::new(3, 6),
        }
    }
}

// =============================================================================
// SessionError
// =============================================================================

/// Session lifecycle errors.
#[derive(Debug, Error)]
pub enum SessionError {
    /// An operation was attempted in the wrong session state.
    #[error("Cannot {operation} while session is {state}")]
    InvalidState {
        /// Attempted operation.
        operation: &'static str,
        /// Current session state.
        state: SessionState,
    },

    /// CreateSession failed.
    #[error("Failed to create session: {status}")]
    CreationFailed {
        /// Service result.
        status: StatusCode,
    },

    /// ActivateSession failed.
    #[error("Failed to activate session: {status}")]
    ActivationFailed {
        /// Service result.
        status: StatusCode,
    },

    /// A service call returned a bad service result.
    #[error("{service} failed: {status}")]
    ServiceFault {
        /// Service name.
        service: &'static str,
        /// Service result.
        status: StatusCode,
    },

    /// The server returned a different number of results than requested.
    #[error("{service} returned {actual} results for {expected} operations")]
    ResultCountMismatch {
        /// Service name.
        service: &'static str,
        /// Number of operations requested.
        expected: usize,
        /// Number of results received.
        actual: usize,
    },

    /// No user token policy matches the configured identity.
    #[error("Server offers no user token policy for {token_type}")]
    NoTokenPolicy {
        /// Identity token type.
        token_type: &'static str,
    },
}

impl SessionError {
    /// Returns `true` if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ServiceFault { status, .. } => {
                matches!(*status, StatusCode::BAD_TIMEOUT | StatusCode::BAD_TOO_MANY_OPERATIONS)
            }
            _ => false,
        }
    }

    /// Returns the server status code, if any.
    pub fn status_code(&self) -> Option<StatusCode> {
        match self {
            Self::CreationFailed { status }
            | Self::ActivationFailed { status }
            | Self::ServiceFault { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns the severity level.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::InvalidState { .. } => ErrorSeverity::Error,
            Self::ServiceFault { .. } => ErrorSeverity::Warning,
            _ => ErrorSeverity::Error,
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::InvalidState { .. } => ErrorCode::new(4, 1),
            Self::CreationFailed { .. } => ErrorCode::new(4, 2),
            Self::ActivationFailed { .. } => ErrorCode::new(4, 3),
            Self::ServiceFault { .. } => ErrorCode::new(4, 4),
            Self::ResultCountMismatch { .. } => ErrorCode::new(4, 5),
            Self::NoTokenPolicy { .. } => ErrorCode::new(4, 6),
        }
    }
}

// =============================================================================
// ResolutionError
// =============================================================================

/// Address resolution errors. Reported per item in batch reads.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    /// The namespace URI is not in the server namespace array.
    #[error("Unknown namespace URI '{uri}'")]
    UnknownNamespace {
        /// The namespace URI.
        uri: String,
    },

    /// The address names a server other than the connected one.
    #[error("Unknown server URI '{uri}'")]
    UnknownServer {
        /// The server URI.
        uri: String,
    },

    /// A relative path element matched no target.
    #[error("No match for '{target_name}' at path element {element} from {start}")]
    NoSuchPath {
        /// Node the failing step started from.
        start: String,
        /// Index of the failing element.
        element: usize,
        /// Target browse name of the failing element.
        target_name: String,
    },

    /// A relative path element matched more than one target.
    #[error("{matches} matches for '{target_name}' at path element {element}")]
    AmbiguousPath {
        /// Index of the failing element.
        element: usize,
        /// Target browse name of the failing element.
        target_name: String,
        /// Number of matches.
        matches: usize,
    },

    /// TranslateBrowsePathsToNodeIds failed for a reason other than no match.
    #[error("Browse path translation failed at element {element}: {status}")]
    TranslateFailed {
        /// Index of the failing element.
        element: usize,
        /// Operation status.
        status: StatusCode,
    },

    /// The target lives on another server.
    #[error("Path element {element} leaves the server (server index {server_index})")]
    CrossServerTarget {
        /// Index of the failing element.
        element: usize,
        /// Server index of the target.
        server_index: u32,
    },
}

impl ResolutionError {
    /// Creates an unknown namespace error.
    pub fn unknown_namespace(uri: impl Into<String>) -> Self {
        Self::UnknownNamespace { uri: uri.into() }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::UnknownNamespace { .. } => ErrorCode::new(5, 1),
            Self::UnknownServer { .. } => ErrorCode::new(5, 2),
            Self::NoSuchPath { .. } => ErrorCode::new(5, 3),
            Self::AmbiguousPath { .. } => ErrorCode::new(5, 4),
            Self::TranslateFailed { .. } => ErrorCode::new(5, 5),
            Self::CrossServerTarget { .. } => ErrorCode::new(5, 6),
        }
    }
}

// =============================================================================
// DictionaryError
// =============================================================================

/// Type dictionary errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DictionaryError {
    /// No definition exists for the data type after loading.
    #[error("Unknown data type {data_type_id}")]
    UnknownDataType {
        /// The data type or encoding id.
        data_type_id: String,
    },

    /// The dictionary XML could not be parsed.
    #[error("Failed to parse dictionary {dictionary}: {message}")]
    SchemaParse {
        /// Dictionary node id.
        dictionary: String,
        /// Parser message.
        message: String,
    },

    /// The dictionary node value was not a byte string.
    #[error("Dictionary node {dictionary} does not hold a byte string")]
    InvalidDictionaryValue {
        /// Dictionary node id.
        dictionary: String,
    },

    /// Reading a dictionary related node failed.
    #[error("Reading {node} failed: {status}")]
    ReadFailed {
        /// Node that was read.
        node: String,
        /// Operation status.
        status: StatusCode,
    },

    /// The definition is a union, not a structure.
    #[error("Data type {data_type_id} is not a structure")]
    NotAStructure {
        /// The data type id.
        data_type_id: String,
    },

    /// The definition is a structure, not a union.
    #[error("Data type {data_type_id} is not a union")]
    NotAUnion {
        /// The data type id.
        data_type_id: String,
    },

    /// A structure declares more optional fields than its encoding mask holds.
    #[error("Structure {data_type} has {count} optional fields, at most {limit} are supported")]
    TooManyOptionalFields {
        /// Structure name.
        data_type: String,
        /// Declared optional fields.
        count: usize,
        /// Bits in the encoding mask.
        limit: usize,
    },

    /// Fetching from the server failed.
    #[error("Dictionary fetch failed: {message}")]
    FetchFailed {
        /// Underlying error message.
        message: String,
    },
}

impl DictionaryError {
    /// Creates an unknown data type error.
    pub fn unknown_data_type(data_type_id: impl fmt::Display) -> Self {
        Self::UnknownDataType {
            data_type_id: data_type_id.to_string(),
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::UnknownDataType { .. } => ErrorCode::new(6, 1),
            Self::SchemaParse { .. } => ErrorCode::new(6, 2),
            Self::InvalidDictionaryValue { .. } => ErrorCode::new(6, 3),
            Self::ReadFailed { .. } => ErrorCode::new(6, 4),
            Self::NotAStructure { .. } => ErrorCode::new(6, 5),
            Self::NotAUnion { .. } => ErrorCode::new(6, 6),
            Self::FetchFailed { .. } => ErrorCode::new(6, 7),
            Self::TooManyOptionalFields { .. } => ErrorCode::new(6, 8),
        }
    }
}

// =============================================================================
// CodecError
// =============================================================================

/// Binary encoding and decoding errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// The input ended early.
    #[error("Unexpected end of input: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEof {
        /// Bytes needed.
        needed: usize,
        /// Bytes remaining.
        remaining: usize,
    },

    /// A length prefix was negative and not the null sentinel.
    #[error("Invalid length {length} for {context}")]
    InvalidLength {
        /// Decoded length.
        length: i32,
        /// What was being decoded.
        context: &'static str,
    },

    /// An encoding byte or mask had an unsupported value.
    #[error("Invalid encoding byte 0x{value:02X} for {context}")]
    InvalidEncoding {
        /// Decoded byte.
        value: u8,
        /// What was being decoded.
        context: &'static str,
    },

    /// A string was not valid UTF-8.
    #[error("Invalid UTF-8 in string")]
    InvalidUtf8,

    /// No definition is known for an extension object.
    #[error("Unknown data type {type_id}")]
    UnknownDataType {
        /// Encoding or data type id.
        type_id: String,
    },

    /// A value did not have the expected type.
    #[error("Type mismatch: expected {expected}, found {actual}")]
    TypeMismatch {
        /// Expected type.
        expected: String,
        /// Actual type.
        actual: String,
    },

    /// A structure field name was looked up but is not declared.
    #[error("Field '{name}' not found")]
    FieldNotFound {
        /// The field name.
        name: String,
    },

    /// A union switch value selects no declared field.
    #[error("Union switch value {switch_value} selects no field of {data_type}")]
    InvalidSwitch {
        /// Decoded switch value.
        switch_value: u32,
        /// Union name.
        data_type: String,
    },

    /// Nesting exceeded the decoder depth limit.
    #[error("Nesting depth limit of {limit} exceeded")]
    DepthExceeded {
        /// Depth limit.
        limit: usize,
    },

    /// Bytes were left over after decoding a body.
    #[error("{remaining} trailing bytes after decoding {context}")]
    TrailingBytes {
        /// Unconsumed bytes.
        remaining: usize,
        /// What was decoded.
        context: String,
    },
}

impl CodecError {
    /// Creates a type mismatch error.
    pub fn type_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Creates a field not found error.
    pub fn field_not_found(name: impl Into<String>) -> Self {
        Self::FieldNotFound { name: name.into() }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::UnexpectedEof { .. } => ErrorCode::new(7, 1),
            Self::InvalidLength { .. } => ErrorCode::new(7, 2),
            Self::InvalidEncoding { .. } => ErrorCode::new(7, 3),
            Self::InvalidUtf8 => ErrorCode::new(7, 4),
            Self::UnknownDataType { .. } => ErrorCode::new(7, 5),
            Self::TypeMismatch { .. } => ErrorCode::new(7, 6),
            Self::FieldNotFound { .. } => ErrorCode::new(7, 7),
            Self::InvalidSwitch { .. } => ErrorCode::new(7, 8),
            Self::DepthExceeded { .. } => ErrorCode::new(7, 9),
            Self::TrailingBytes { .. } => ErrorCode::new(7, 10),
        }
    }
}

// =============================================================================
// ConfigurationError
// =============================================================================

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// A required field is missing.
    #[error("Missing required field: {field}")]
    MissingField {
        /// Field name.
        field: String,
    },

    /// A field has an invalid value.
    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue {
        /// Field name.
        field: String,
        /// Reason.
        reason: String,
    },

    /// An endpoint URL is invalid.
    #[error("Invalid endpoint '{url}': {reason}")]
    InvalidEndpoint {
        /// Endpoint URL.
        url: String,
        /// Reason.
        reason: String,
    },

    /// A node id string could not be parsed.
    #[error("Invalid node id '{value}': {reason}")]
    InvalidNodeId {
        /// Input string.
        value: String,
        /// Reason.
        reason: String,
    },

    /// A settings file could not be read.
    #[error("Failed to read '{path}': {source}")]
    FileRead {
        /// File path.
        path: String,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// A settings file could not be parsed.
    #[error("Failed to parse {format} settings: {message}")]
    Parse {
        /// File format.
        format: &'static str,
        /// Parser message.
        message: String,
    },

    /// A settings file has an unsupported extension.
    #[error("Unsupported settings format: {extension}")]
    UnsupportedFormat {
        /// File extension.
        extension: String,
    },
}

impl ConfigurationError {
    /// Creates a missing field error.
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    /// Creates an invalid value error.
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid endpoint error.
    pub fn invalid_endpoint(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidEndpoint {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid node id error.
    pub fn invalid_node_id(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidNodeId {
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::MissingField { .. } => ErrorCode::new(8, 1),
            Self::InvalidValue { .. } => ErrorCode::new(8, 2),
            Self::InvalidEndpoint { .. } => ErrorCode::new(8, 3),
            Self::InvalidNodeId { .. } => ErrorCode::new(8, 4),
            Self::FileRead { .. } => ErrorCode::new(8, 5),
            Self::Parse { .. } => ErrorCode::new(8, 6),
            Self::UnsupportedFormat { .. } => ErrorCode::new(8, 7),
        }
    }
}

// =============================================================================
// TimeoutError
// =============================================================================

/// Deadline errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeoutError {
    /// A request received no response in time.
    ///
    /// The pending entry is removed. A late response is discarded.
    #[error("Request {request_id} timed out after {duration:?}")]
    Request {
        /// Request id on the channel.
        request_id: u32,
        /// Timeout duration.
        duration: Duration,
    },

    /// Connecting to an endpoint took too long.
    #[error("Connecting to '{endpoint}' timed out after {duration:?}")]
    Connect {
        /// Endpoint URL.
        endpoint: String,
        /// Timeout duration.
        duration: Duration,
    },
}

impl TimeoutError {
    /// Returns the timeout duration.
    pub fn duration(&self) -> Duration {
        match self {
            Self::Request { duration, .. } | Self::Connect { duration, .. } => *duration,
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Request { .. } => ErrorCode::new(9, 1),
            Self::Connect { .. } => ErrorCode::new(9, 2),
        }
    }
}

// =============================================================================
// ChannelFault
// =============================================================================

/// A cloneable channel failure delivered to every pending waiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelFault {
    /// The connection dropped or stopped answering.
    ConnectionLost(String),
    /// The server sent an `ERR` message.
    Server {
        /// Status code.
        status: StatusCode,
        /// Reason text.
        reason: String,
    },
    /// A protocol violation was detected.
    Protocol(ProtocolError),
    /// A message failed verification.
    Security(SecurityError),
    /// The channel was closed locally.
    Closed,
}

impl ChannelFault {
    /// Converts the fault into an error for one waiter.
    pub fn to_error(&self) -> UaError {
        match self {
            Self::ConnectionLost(reason) => UaError::connection_lost(reason.clone()),
            Self::Server { status, reason } => UaError::Connection(ConnectionError::ServerError {
                status: *status,
                reason: reason.clone(),
            }),
            Self::Protocol(e) => UaError::Protocol(e.clone()),
            Self::Security(e) => UaError::Security(e.clone()),
            Self::Closed => UaError::Connection(ConnectionError::Closed),
        }
    }

    /// Extracts the fault carried by a channel-fatal error.
    pub fn from_error(error: &UaError) -> Self {
        match error {
            UaError::Protocol(e) => Self::Protocol(e.clone()),
            UaError::Security(e) => Self::Security(e.clone()),
            UaError::Connection(ConnectionError::ServerError { status, reason }) => Self::Server {
                status: *status,
                reason: reason.clone(),
            },
            UaError::Connection(ConnectionError::Closed) => Self::Closed,
            other => Self::ConnectionLost(other.to_string()),
        }
    }
}

impl fmt::Display for ChannelFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_error())
    }
}

// =============================================================================
// TargetError
// =============================================================================

/// Kind of a per-item failure in a batch read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetErrorKind {
    /// Namespace URI not in the namespace array.
    UnknownNamespace,
    /// Address names another server.
    UnknownServer,
    /// No definition for an extension object.
    UnknownDataType,
    /// A relative path step had no match.
    NoSuchPath,
    /// A relative path step had several matches.
    AmbiguousPath,
    /// The value could not be decoded.
    DecodeError,
    /// Any other per-item failure.
    Other,
}

impl fmt::Display for TargetErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::UnknownNamespace => "UnknownNamespace",
            Self::UnknownServer => "UnknownServer",
            Self::UnknownDataType => "UnknownDataType",
            Self::NoSuchPath => "NoSuchPath",
            Self::AmbiguousPath => "AmbiguousPath",
            Self::DecodeError => "DecodeError",
            Self::Other => "Other",
        };
        f.write_str(name)
    }
}

impl TargetErrorKind {
    /// Status reported for a target that failed locally.
    pub fn status_code(self) -> StatusCode {
        match self {
            Self::UnknownNamespace => StatusCode::BAD_NOT_FOUND,
            Self::UnknownServer => StatusCode::BAD_SERVER_URI_INVALID,
            Self::UnknownDataType => StatusCode::BAD_DATA_TYPE_ID_UNKNOWN,
            Self::NoSuchPath => StatusCode::BAD_NO_MATCH,
            Self::AmbiguousPath => StatusCode::BAD_TOO_MANY_MATCHES,
            Self::DecodeError => StatusCode::BAD_DECODING_ERROR,
            Self::Other => StatusCode::BAD_UNEXPECTED_ERROR,
        }
    }
}

/// A per-item failure, cloneable so it can live in a read result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct TargetError {
    /// Failure kind.
    pub kind: TargetErrorKind,
    /// Human readable description.
    pub message: String,
}

impl From<&UaError> for TargetError {
    fn from(error: &UaError) -> Self {
        let kind = match error {
            UaError::Resolution(ResolutionError::UnknownNamespace { .. }) => {
                TargetErrorKind::UnknownNamespace
            }
            UaError::Resolution(ResolutionError::UnknownServer { .. }) => {
                TargetErrorKind::UnknownServer
            }
            UaError::Resolution(ResolutionError::NoSuchPath { .. }) => TargetErrorKind::NoSuchPath,
            UaError::Resolution(ResolutionError::AmbiguousPath { .. }) => {
                TargetErrorKind::AmbiguousPath
            }
            UaError::Dictionary(DictionaryError::UnknownDataType { .. })
            | UaError::Codec(CodecError::UnknownDataType { .. }) => {
                TargetErrorKind::UnknownDataType
            }
            UaError::Codec(_) => TargetErrorKind::DecodeError,
            _ => TargetErrorKind::Other,
        };
        Self {
            kind,
            message: error.to_string(),
        }
    }
}

// =============================================================================
// ErrorSeverity
// =============================================================================

/// Error severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorSeverity {
    /// Informational - no action required.
    Info,
    /// Warning - action may be required.
    Warning,
    /// Error - action required, but recoverable.
    Error,
    /// Critical - immediate action required.
    Critical,
}

impl ErrorSeverity {
    /// Converts to tracing level.
    pub fn to_tracing_level(self) -> Level {
        match self {
            Self::Info => Level::INFO,
            Self::Warning => Level::WARN,
            Self::Error | Self::Critical => Level::ERROR,
        }
    }

    /// Returns the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// ErrorCode
// =============================================================================

/// Structured error code for categorization.
///
/// Format: `UA-XXYY` where XX is category and YY is specific error.
///
/// Categories:
/// - 1: Connection
/// - 2: Protocol
/// - 3: Security
/// - 4: Session
/// - 5: Resolution
/// - 6: Dictionary
/// - 7: Codec
/// - 8: Configuration
/// - 9: Timeout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorCode {
    /// Category (1-9).
    pub category: u8,
    /// Specific error within category.
    pub code: u8,
}

impl ErrorCode {
    /// Creates a new error code.
    pub const fn new(category: u8, code: u8) -> Self {
        Self { category, code }
    }

    /// Returns the full error code as a u16.
    pub fn as_u16(&self) -> u16 {
        ((self.category as u16) << 8) | (self.code as u16)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UA-{:02X}{:02X}", self.category, self.code)
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// A Result type with UaError.
pub type UaResult<T> = Result<T, UaError>;

/// A Result type with CodecError.
pub type CodecResult<T> = Result<T, CodecError>;

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_security_errors_are_fatal_and_never_retried() {
        let error = UaError::security(SecurityError::SignatureInvalid);
        assert!(error.is_fatal_to_channel());
        assert!(!error.is_retryable());
        assert_eq!(error.severity(), ErrorSeverity::Critical);
    }

    #[test]
    fn test_protocol_errors_are_fatal() {
        let error = UaError::protocol(ProtocolError::SequenceMismatch {
            expected: 5,
            actual: 7,
        });
        assert!(error.is_fatal_to_channel());
        assert!(error.to_string().contains("expected 5"));
    }

    #[test]
    fn test_per_item_errors() {
        assert!(UaError::resolution(ResolutionError::unknown_namespace("urn:x")).is_per_item());
        assert!(UaError::dictionary(DictionaryError::unknown_data_type("ns=2;i=5")).is_per_item());
        assert!(UaError::codec(CodecError::InvalidUtf8).is_per_item());
        assert!(!UaError::connection_lost("eof").is_per_item());
    }

    #[test]
    fn test_invalid_state_is_caller_bug() {
        let error = UaError::invalid_state("read", SessionState::Created);
        assert!(!error.is_retryable());
        assert!(!error.is_fatal_to_channel());
        assert_eq!(error.to_string(), "Cannot read while session is created");
    }

    #[test]
    fn test_error_code_display() {
        let code = UaError::resolution(ResolutionError::unknown_namespace("urn:x")).error_code();
        assert_eq!(code.to_string(), "UA-0501");
        assert_eq!(code.as_u16(), 0x0501);
    }

    #[test]
    fn test_target_error_kind_mapping() {
        let error = UaError::resolution(ResolutionError::AmbiguousPath {
            element: 0,
            target_name: "InputArguments".into(),
            matches: 2,
        });
        let target = TargetError::from(&error);
        assert_eq!(target.kind, TargetErrorKind::AmbiguousPath);

        let target = TargetError::from(&UaError::codec(CodecError::InvalidLength {
            length: -2,
            context: "string",
        }));
        assert_eq!(target.kind, TargetErrorKind::DecodeError);
    }

    #[test]
    fn test_channel_fault_round_trip() {
        let fault = ChannelFault::Protocol(ProtocolError::TooManyChunks { max: 4 });
        let error = fault.to_error();
        assert_eq!(ChannelFault::from_error(&error), fault);

        let fault = ChannelFault::ConnectionLost("keep-alive".into());
        assert!(fault.to_error().is_fatal_to_channel());
    }

    #[test]
    fn test_io_error_conversion() {
        let error: UaError = io::Error::new(io::ErrorKind::UnexpectedEof, "eof").into();
        assert!(matches!(
            error,
            UaError::Connection(ConnectionError::ConnectionLost { .. })
        ));
        assert!(error.is_fatal_to_channel());
    }
}
