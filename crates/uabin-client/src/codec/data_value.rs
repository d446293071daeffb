// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! `DataValue` and `DiagnosticInfo`, the two masked composite types.

use crate::error::{CodecError, CodecResult};
use crate::types::{DateTime, StatusCode, UaString};

use super::encoder::{BinaryDecoder, BinaryEncodable, BinaryEncoder};
use super::variant::Variant;

// =============================================================================
// DataValue
// =============================================================================

const DV_VALUE: u8 = 0x01;
const DV_STATUS: u8 = 0x02;
const DV_SOURCE_TIMESTAMP: u8 = 0x04;
const DV_SERVER_TIMESTAMP: u8 = 0x08;
const DV_SOURCE_PICOSECONDS: u8 = 0x10;
const DV_SERVER_PICOSECONDS: u8 = 0x20;

/// A value with its status and timestamps.
///
/// Each field is present on the wire only when its mask bit is set.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataValue {
    /// The value.
    pub value: Option<Variant>,
    /// Status; absent means Good.
    pub status: Option<StatusCode>,
    /// Source timestamp.
    pub source_timestamp: Option<DateTime>,
    /// Source timestamp picoseconds.
    pub source_picoseconds: Option<u16>,
    /// Server timestamp.
    pub server_timestamp: Option<DateTime>,
    /// Server timestamp picoseconds.
    pub server_picoseconds: Option<u16>,
}

impl DataValue {
    /// Creates a data value holding only a value.
    pub fn new(value: impl Into<Variant>) -> Self {
        Self {
            value: Some(value.into()),
            ..Self::default()
        }
    }

    /// Creates a data value holding only a status.
    pub fn with_status(status: StatusCode) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Returns the status, defaulting to Good.
    pub fn status(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::GOOD)
    }
}

impl BinaryEncodable for DataValue {
    fn encode(&self, encoder: &mut BinaryEncoder) {
        let mut mask = 0;
        if self.value.is_some() {
            mask |= DV_VALUE;
        }
        if self.status.is_some() {
            mask |= DV_STATUS;
        }
        if self.source_timestamp.is_some() {
            mask |= DV_SOURCE_TIMESTAMP;
        }
        if self.server_timestamp.is_some() {
            mask |= DV_SERVER_TIMESTAMP;
        }
        if self.source_picoseconds.is_some() {
            mask |= DV_SOURCE_PICOSECONDS;
        }
        if self.server_picoseconds.is_some() {
            mask |= DV_SERVER_PICOSECONDS;
        }
        encoder.write_u8(mask);

        if let Some(value) = &self.value {
            value.encode(encoder);
        }
        if let Some(status) = &self.status {
            status.encode(encoder);
        }
        if let Some(ts) = &self.source_timestamp {
            ts.encode(encoder);
        }
        if let Some(ps) = self.source_picoseconds {
            encoder.write_u16(ps);
        }
        if let Some(ts) = &self.server_timestamp {
            ts.encode(encoder);
        }
        if let Some(ps) = self.server_picoseconds {
            encoder.write_u16(ps);
        }
    }

    fn decode(decoder: &mut BinaryDecoder<'_>) -> CodecResult<Self> {
        let mask = decoder.read_u8()?;
        if mask & 0xC0 != 0 {
            return Err(CodecError::InvalidEncoding {
                value: mask,
                context: "data value",
            });
        }
        let value = (mask & DV_VALUE != 0)
            .then(|| Variant::decode(decoder))
            .transpose()?;
        let status = (mask & DV_STATUS != 0)
            .then(|| StatusCode::decode(decoder))
            .transpose()?;
        let source_timestamp = (mask & DV_SOURCE_TIMESTAMP != 0)
            .then(|| DateTime::decode(decoder))
            .transpose()?;
        let source_picoseconds = (mask & DV_SOURCE_PICOSECONDS != 0)
            .then(|| decoder.read_u16())
            .transpose()?;
        let server_timestamp = (mask & DV_SERVER_TIMESTAMP != 0)
            .then(|| DateTime::decode(decoder))
            .transpose()?;
        let server_picoseconds = (mask & DV_SERVER_PICOSECONDS != 0)
            .then(|| decoder.read_u16())
            .transpose()?;

        Ok(Self {
            value,
            status,
            source_timestamp,
            source_picoseconds,
            server_timestamp,
            server_picoseconds,
        })
    }
}

// =============================================================================
// DiagnosticInfo
// =============================================================================

const DI_SYMBOLIC_ID: u8 = 0x01;
const DI_NAMESPACE_URI: u8 = 0x02;
const DI_LOCALIZED_TEXT: u8 = 0x04;
const DI_LOCALE: u8 = 0x08;
const DI_ADDITIONAL_INFO: u8 = 0x10;
const DI_INNER_STATUS_CODE: u8 = 0x20;
const DI_INNER_DIAGNOSTIC_INFO: u8 = 0x40;

/// Vendor diagnostics attached to a result.
///
/// The integer fields index into the string table of the response header.
/// Fields are written in mask-bit order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DiagnosticInfo {
    /// Symbolic id.
    pub symbolic_id: Option<i32>,
    /// Namespace URI index.
    pub namespace_uri: Option<i32>,
    /// Localized text index.
    pub localized_text: Option<i32>,
    /// Locale index.
    pub locale: Option<i32>,
    /// Additional vendor text.
    pub additional_info: Option<UaString>,
    /// Inner status code.
    pub inner_status_code: Option<StatusCode>,
    /// Nested diagnostic info.
    pub inner_diagnostic_info: Option<Box<DiagnosticInfo>>,
}

impl BinaryEncodable for DiagnosticInfo {
    fn encode(&self, encoder: &mut BinaryEncoder) {
        let mut mask = 0;
        for (present, bit) in [
            (self.symbolic_id.is_some(), DI_SYMBOLIC_ID),
            (self.namespace_uri.is_some(), DI_NAMESPACE_URI),
            (self.localized_text.is_some(), DI_LOCALIZED_TEXT),
            (self.locale.is_some(), DI_LOCALE),
            (self.additional_info.is_some(), DI_ADDITIONAL_INFO),
            (self.inner_status_code.is_some(), DI_INNER_STATUS_CODE),
            (self.inner_diagnostic_info.is_some(), DI_INNER_DIAGNOSTIC_INFO),
        ] {
            if present {
                mask |= bit;
            }
        }
        encoder.write_u8(mask);

        for value in [
            self.symbolic_id,
            self.namespace_uri,
            self.localized_text,
            self.locale,
        ]
        .into_iter()
        .flatten()
        {
            encoder.write_i32(value);
        }
        if let Some(info) = &self.additional_info {
            encoder.write_string(info);
        }
        if let Some(status) = &self.inner_status_code {
            status.encode(encoder);
        }
        if let Some(inner) = &self.inner_diagnostic_info {
            inner.encode(encoder);
        }
    }

    fn decode(decoder: &mut BinaryDecoder<'_>) -> CodecResult<Self> {
        let mask = decoder.read_u8()?;
        if mask & 0x80 != 0 {
            return Err(CodecError::InvalidEncoding {
                value: mask,
                context: "diagnostic info",
            });
        }
        let read_i32 = |bit: u8, d: &mut BinaryDecoder<'_>| -> CodecResult<Option<i32>> {
            (mask & bit != 0).then(|| d.read_i32()).transpose()
        };
        let symbolic_id = read_i32(DI_SYMBOLIC_ID, decoder)?;
        let namespace_uri = read_i32(DI_NAMESPACE_URI, decoder)?;
        let localized_text = read_i32(DI_LOCALIZED_TEXT, decoder)?;
        let locale = read_i32(DI_LOCALE, decoder)?;
        let additional_info = (mask & DI_ADDITIONAL_INFO != 0)
            .then(|| decoder.read_string())
            .transpose()?;
        let inner_status_code = (mask & DI_INNER_STATUS_CODE != 0)
            .then(|| StatusCode::decode(decoder))
            .transpose()?;
        let inner_diagnostic_info = if mask & DI_INNER_DIAGNOSTIC_INFO != 0 {
            decoder.enter()?;
            let inner = DiagnosticInfo::decode(decoder);
            decoder.leave();
            Some(Box::new(inner?))
        } else {
            None
        };

        Ok(Self {
            symbolic_id,
            namespace_uri,
            localized_text,
            locale,
            additional_info,
            inner_status_code,
            inner_diagnostic_info,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_data_value_is_one_byte() {
        let value = DataValue::default();
        assert_eq!(&value.to_bytes()[..], &[0]);
        assert_eq!(value.status(), StatusCode::GOOD);
    }

    #[test]
    fn test_data_value_field_order() {
        let value = DataValue {
            value: Some(Variant::Byte(7)),
            status: Some(StatusCode::BAD_NODE_ID_UNKNOWN),
            source_timestamp: Some(DateTime(1)),
            source_picoseconds: Some(2),
            server_timestamp: Some(DateTime(3)),
            server_picoseconds: Some(4),
        };
        let bytes = value.to_bytes();
        assert_eq!(bytes[0], 0x3F);
        // Variant(2) + status(4) + source ts(8) then source picoseconds.
        assert_eq!(&bytes[15..17], &[2, 0]);
        assert_eq!(DataValue::from_bytes(&bytes).unwrap(), value);
    }

    #[test]
    fn test_status_only() {
        let value = DataValue::with_status(StatusCode::BAD_NODE_ID_UNKNOWN);
        let decoded = DataValue::from_bytes(&value.to_bytes()).unwrap();
        assert_eq!(decoded.value, None);
        assert_eq!(decoded.status(), StatusCode::BAD_NODE_ID_UNKNOWN);
    }

    #[test]
    fn test_diagnostic_info_nested() {
        let info = DiagnosticInfo {
            symbolic_id: Some(1),
            locale: Some(4),
            additional_info: Some("detail".into()),
            inner_diagnostic_info: Some(Box::new(DiagnosticInfo {
                inner_status_code: Some(StatusCode::BAD_TIMEOUT),
                ..DiagnosticInfo::default()
            })),
            ..DiagnosticInfo::default()
        };
        let bytes = info.to_bytes();
        assert_eq!(bytes[0], DI_SYMBOLIC_ID | DI_LOCALE | DI_ADDITIONAL_INFO | DI_INNER_DIAGNOSTIC_INFO);
        assert_eq!(DiagnosticInfo::from_bytes(&bytes).unwrap(), info);
    }
}
