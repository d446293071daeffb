// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA status codes.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A 32-bit OPC UA status code.
///
/// The two high bits carry the severity: `00` good, `01` uncertain, `10` bad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusCode(pub u32);

impl StatusCode {
    /// Good.
    pub const GOOD: StatusCode = StatusCode(0x0000_0000);
    /// Bad with no further detail.
    pub const BAD: StatusCode = StatusCode(0x8000_0000);
    /// BadUnexpectedError.
    pub const BAD_UNEXPECTED_ERROR: StatusCode = StatusCode(0x8001_0000);
    /// BadInternalError.
    pub const BAD_INTERNAL_ERROR: StatusCode = StatusCode(0x8002_0000);
    /// BadCommunicationError.
    pub const BAD_COMMUNICATION_ERROR: StatusCode = StatusCode(0x8005_0000);
    /// BadEncodingError.
    pub const BAD_ENCODING_ERROR: StatusCode = StatusCode(0x8006_0000);
    /// BadDecodingError.
    pub const BAD_DECODING_ERROR: StatusCode = StatusCode(0x8007_0000);
    /// BadEncodingLimitsExceeded.
    pub const BAD_ENCODING_LIMITS_EXCEEDED: StatusCode = StatusCode(0x8008_0000);
    /// BadUnknownResponse.
    pub const BAD_UNKNOWN_RESPONSE: StatusCode = StatusCode(0x8009_0000);
    /// BadTimeout.
    pub const BAD_TIMEOUT: StatusCode = StatusCode(0x800A_0000);
    /// BadServiceUnsupported.
    pub const BAD_SERVICE_UNSUPPORTED: StatusCode = StatusCode(0x800B_0000);
    /// BadShutdown.
    pub const BAD_SHUTDOWN: StatusCode = StatusCode(0x800C_0000);
    /// BadServerNotConnected.
    pub const BAD_SERVER_NOT_CONNECTED: StatusCode = StatusCode(0x800D_0000);
    /// BadNothingToDo.
    pub const BAD_NOTHING_TO_DO: StatusCode = StatusCode(0x800F_0000);
    /// BadTooManyOperations.
    pub const BAD_TOO_MANY_OPERATIONS: StatusCode = StatusCode(0x8010_0000);
    /// BadDataTypeIdUnknown.
    pub const BAD_DATA_TYPE_ID_UNKNOWN: StatusCode = StatusCode(0x8011_0000);
    /// BadSecurityChecksFailed.
    pub const BAD_SECURITY_CHECKS_FAILED: StatusCode = StatusCode(0x8013_0000);
    /// BadUserAccessDenied.
    pub const BAD_USER_ACCESS_DENIED: StatusCode = StatusCode(0x801F_0000);
    /// BadIdentityTokenInvalid.
    pub const BAD_IDENTITY_TOKEN_INVALID: StatusCode = StatusCode(0x8020_0000);
    /// BadIdentityTokenRejected.
    pub const BAD_IDENTITY_TOKEN_REJECTED: StatusCode = StatusCode(0x8021_0000);
    /// BadSecureChannelIdInvalid.
    pub const BAD_SECURE_CHANNEL_ID_INVALID: StatusCode = StatusCode(0x8022_0000);
    /// BadNonceInvalid.
    pub const BAD_NONCE_INVALID: StatusCode = StatusCode(0x8024_0000);
    /// BadSessionIdInvalid.
    pub const BAD_SESSION_ID_INVALID: StatusCode = StatusCode(0x8025_0000);
    /// BadSessionClosed.
    pub const BAD_SESSION_CLOSED: StatusCode = StatusCode(0x8026_0000);
    /// BadSessionNotActivated.
    pub const BAD_SESSION_NOT_ACTIVATED: StatusCode = StatusCode(0x8027_0000);
    /// BadRequestHeaderInvalid.
    pub const BAD_REQUEST_HEADER_INVALID: StatusCode = StatusCode(0x802A_0000);
    /// BadNodeIdInvalid.
    pub const BAD_NODE_ID_INVALID: StatusCode = StatusCode(0x8033_0000);
    /// BadNodeIdUnknown.
    pub const BAD_NODE_ID_UNKNOWN: StatusCode = StatusCode(0x8034_0000);
    /// BadAttributeIdInvalid.
    pub const BAD_ATTRIBUTE_ID_INVALID: StatusCode = StatusCode(0x8035_0000);
    /// BadNotReadable.
    pub const BAD_NOT_READABLE: StatusCode = StatusCode(0x803A_0000);
    /// BadNotSupported.
    pub const BAD_NOT_SUPPORTED: StatusCode = StatusCode(0x803D_0000);
    /// BadNotFound.
    pub const BAD_NOT_FOUND: StatusCode = StatusCode(0x803E_0000);
    /// BadServerUriInvalid.
    pub const BAD_SERVER_URI_INVALID: StatusCode = StatusCode(0x804F_0000);
    /// BadBrowseNameInvalid.
    pub const BAD_BROWSE_NAME_INVALID: StatusCode = StatusCode(0x8060_0000);
    /// BadTooManyMatches.
    pub const BAD_TOO_MANY_MATCHES: StatusCode = StatusCode(0x806E_0000);
    /// BadNoMatch.
    pub const BAD_NO_MATCH: StatusCode = StatusCode(0x806F_0000);
    /// BadTcpMessageTypeInvalid.
    pub const BAD_TCP_MESSAGE_TYPE_INVALID: StatusCode = StatusCode(0x807E_0000);
    /// BadTcpSecureChannelUnknown.
    pub const BAD_TCP_SECURE_CHANNEL_UNKNOWN: StatusCode = StatusCode(0x807F_0000);
    /// BadTcpMessageTooLarge.
    pub const BAD_TCP_MESSAGE_TOO_LARGE: StatusCode = StatusCode(0x8080_0000);
    /// BadSequenceNumberInvalid.
    pub const BAD_SEQUENCE_NUMBER_INVALID: StatusCode = StatusCode(0x8088_0000);
    /// BadRequestTooLarge.
    pub const BAD_REQUEST_TOO_LARGE: StatusCode = StatusCode(0x80B8_0000);
    /// BadResponseTooLarge.
    pub const BAD_RESPONSE_TOO_LARGE: StatusCode = StatusCode(0x80B9_0000);

    /// Returns `true` if the severity bits are good.
    #[inline]
    pub const fn is_good(self) -> bool {
        self.0 & 0xC000_0000 == 0
    }

    /// Returns `true` if the severity bits are uncertain.
    #[inline]
    pub const fn is_uncertain(self) -> bool {
        self.0 & 0xC000_0000 == 0x4000_0000
    }

    /// Returns `true` if the severity bits are bad.
    #[inline]
    pub const fn is_bad(self) -> bool {
        self.0 & 0x8000_0000 != 0
    }

    /// Returns the code without the info bits.
    #[inline]
    pub const fn sub_code(self) -> StatusCode {
        StatusCode(self.0 & 0xFFFF_0000)
    }

    /// Returns the symbolic name, if known.
    pub fn name(self) -> Option<&'static str> {
        let name = match self.sub_code() {
            Self::GOOD => "Good",
            Self::BAD => "Bad",
            Self::BAD_UNEXPECTED_ERROR => "BadUnexpectedError",
            Self::BAD_INTERNAL_ERROR => "BadInternalError",
            Self::BAD_COMMUNICATION_ERROR => "BadCommunicationError",
            Self::BAD_ENCODING_ERROR => "BadEncodingError",
            Self::BAD_DECODING_ERROR => "BadDecodingError",
            Self::BAD_ENCODING_LIMITS_EXCEEDED => "BadEncodingLimitsExceeded",
            Self::BAD_UNKNOWN_RESPONSE => "BadUnknownResponse",
            Self::BAD_TIMEOUT => "BadTimeout",
            Self::BAD_SERVICE_UNSUPPORTED => "BadServiceUnsupported",
            Self::BAD_SHUTDOWN => "BadShutdown",
            Self::BAD_SERVER_NOT_CONNECTED => "BadServerNotConnected",
            Self::BAD_NOTHING_TO_DO => "BadNothingToDo",
            Self::BAD_TOO_MANY_OPERATIONS => "BadTooManyOperations",
            Self::BAD_DATA_TYPE_ID_UNKNOWN => "BadDataTypeIdUnknown",
            Self::BAD_SECURITY_CHECKS_FAILED => "BadSecurityChecksFailed",
            Self::BAD_USER_ACCESS_DENIED => "BadUserAccessDenied",
            Self::BAD_IDENTITY_TOKEN_INVALID => "BadIdentityTokenInvalid",
            Self::BAD_IDENTITY_TOKEN_REJECTED => "BadIdentityTokenRejected",
            Self::BAD_SECURE_CHANNEL_ID_INVALID => "BadSecureChannelIdInvalid",
            Self::BAD_NONCE_INVALID => "BadNonceInvalid",
            Self::BAD_SESSION_ID_INVALID => "BadSessionIdInvalid",
            Self::BAD_SESSION_CLOSED => "BadSessionClosed",
            Self::BAD_SESSION_NOT_ACTIVATED => "BadSessionNotActivated",
            Self::BAD_REQUEST_HEADER_INVALID => "BadRequestHeaderInvalid",
            Self::BAD_NODE_ID_INVALID => "BadNodeIdInvalid",
            Self::BAD_NODE_ID_UNKNOWN => "BadNodeIdUnknown",
            Self::BAD_ATTRIBUTE_ID_INVALID => "BadAttributeIdInvalid",
            Self::BAD_NOT_READABLE => "BadNotReadable",
            Self::BAD_NOT_SUPPORTED => "BadNotSupported",
            Self::BAD_NOT_FOUND => "BadNotFound",
            Self::BAD_SERVER_URI_INVALID => "BadServerUriInvalid",
            Self::BAD_BROWSE_NAME_INVALID => "BadBrowseNameInvalid",
            Self::BAD_TOO_MANY_MATCHES => "BadTooManyMatches",
            Self::BAD_NO_MATCH => "BadNoMatch",
            Self::BAD_TCP_MESSAGE_TYPE_INVALID => "BadTcpMessageTypeInvalid",
            Self::BAD_TCP_SECURE_CHANNEL_UNKNOWN => "BadTcpSecureChannelUnknown",
            Self::BAD_TCP_MESSAGE_TOO_LARGE => "BadTcpMessageTooLarge",
            Self::BAD_SEQUENCE_NUMBER_INVALID => "BadSequenceNumberInvalid",
            Self::BAD_REQUEST_TOO_LARGE => "BadRequestTooLarge",
            Self::BAD_RESPONSE_TOO_LARGE => "BadResponseTooLarge",
            _ => return None,
        };
        Some(name)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} (0x{:08X})", name, self.0),
            None => write!(f, "0x{:08X}", self.0),
        }
    }
}

impl From<u32> for StatusCode {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_bits() {
        assert!(StatusCode::GOOD.is_good());
        assert!(StatusCode::BAD_NO_MATCH.is_bad());
        assert!(StatusCode(0x4000_0000).is_uncertain());
        assert!(!StatusCode(0x4000_0000).is_bad());
    }

    #[test]
    fn test_names() {
        assert_eq!(StatusCode::BAD_SESSION_ID_INVALID.name(), Some("BadSessionIdInvalid"));
        assert_eq!(StatusCode(0x8025_0400).name(), Some("BadSessionIdInvalid"));
        assert_eq!(StatusCode(0x8FFF_0000).name(), None);
        assert_eq!(
            StatusCode::BAD_NO_MATCH.to_string(),
            "BadNoMatch (0x806F0000)"
        );
    }
}
