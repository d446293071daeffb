// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Extension objects: structured values wrapped with their encoding id.

use std::fmt;

use crate::error::{CodecError, CodecResult};
use crate::types::{ByteString, NodeId, UaString};

use super::encoder::{BinaryDecoder, BinaryEncodable, BinaryEncoder};
use super::generic::GenericValue;

const BODY_NONE: u8 = 0x00;
const BODY_BINARY: u8 = 0x01;
const BODY_XML: u8 = 0x02;

/// Body of an [`ExtensionObject`].
#[derive(Debug, Clone, PartialEq)]
pub enum ExtensionObjectBody {
    /// No body.
    None,
    /// Undecoded binary body.
    Raw {
        /// Body bytes. A `-1` body length decodes as the null byte string.
        bytes: ByteString,
        /// Data type, once known from a dictionary.
        data_type_id: Option<NodeId>,
    },
    /// XML body, kept as text.
    Xml(UaString),
    /// Body decoded against a structure or union definition.
    Decoded(GenericValue),
}

/// A structured value tagged with its encoding node id.
///
/// Decoding from the wire always yields [`ExtensionObjectBody::Raw`]; bodies
/// become [`ExtensionObjectBody::Decoded`] once a definition is available
/// (see [`decode_nested`](super::decode_nested)).
#[derive(Debug, Clone, PartialEq)]
pub struct ExtensionObject {
    /// Encoding node id (for example `i=298` for `Argument`).
    pub type_id: NodeId,
    /// The body.
    pub body: ExtensionObjectBody,
}

impl ExtensionObject {
    /// Creates an object with no body.
    pub fn null() -> Self {
        Self {
            type_id: NodeId::null(),
            body: ExtensionObjectBody::None,
        }
    }

    /// Creates an object with a raw binary body.
    pub fn from_raw(type_id: NodeId, bytes: Vec<u8>) -> Self {
        Self {
            type_id,
            body: ExtensionObjectBody::Raw {
                bytes: bytes.into(),
                data_type_id: None,
            },
        }
    }

    /// Creates an object from an encodable value.
    pub fn from_encodable<T: BinaryEncodable>(type_id: NodeId, value: &T) -> Self {
        Self::from_raw(type_id, value.to_bytes().to_vec())
    }

    /// Creates an object from a decoded value, tagged with its encoding id.
    pub fn from_generic(value: GenericValue) -> Self {
        Self {
            type_id: value.encoding_id().clone(),
            body: ExtensionObjectBody::Decoded(value),
        }
    }

    /// Returns `true` if the object has no body.
    pub fn is_null(&self) -> bool {
        matches!(self.body, ExtensionObjectBody::None)
    }

    /// Returns the raw body bytes.
    pub fn raw_bytes(&self) -> Option<&[u8]> {
        match &self.body {
            ExtensionObjectBody::Raw { bytes, .. } => Some(bytes.as_bytes()),
            _ => None,
        }
    }

    /// Returns the decoded body.
    pub fn decoded(&self) -> Option<&GenericValue> {
        match &self.body {
            ExtensionObjectBody::Decoded(value) => Some(value),
            _ => None,
        }
    }

    /// Decodes a raw body as a concrete type.
    pub fn decode_as<T: BinaryEncodable>(&self) -> CodecResult<T> {
        match &self.body {
            ExtensionObjectBody::Raw { bytes, .. } => T::from_bytes(bytes.as_bytes()),
            _ => Err(CodecError::type_mismatch("binary body", self.body_kind())),
        }
    }

    fn body_kind(&self) -> &'static str {
        match self.body {
            ExtensionObjectBody::None => "no body",
            ExtensionObjectBody::Raw { .. } => "binary body",
            ExtensionObjectBody::Xml(_) => "xml body",
            ExtensionObjectBody::Decoded(_) => "decoded body",
        }
    }
}

impl Default for ExtensionObject {
    fn default() -> Self {
        Self::null()
    }
}

impl BinaryEncodable for ExtensionObject {
    fn encode(&self, encoder: &mut BinaryEncoder) {
        self.type_id.encode(encoder);
        match &self.body {
            ExtensionObjectBody::None => encoder.write_u8(BODY_NONE),
            ExtensionObjectBody::Raw { bytes, .. } => {
                encoder.write_u8(BODY_BINARY);
                encoder.write_byte_string(bytes);
            }
            ExtensionObjectBody::Xml(xml) => {
                encoder.write_u8(BODY_XML);
                encoder.write_string(xml);
            }
            ExtensionObjectBody::Decoded(value) => {
                encoder.write_u8(BODY_BINARY);
                let start = encoder.len();
                encoder.write_i32(0);
                value.encode(encoder);
                let body_len = encoder.len() - start - 4;
                encoder.patch_u32(start, body_len as u32);
            }
        }
    }

    fn decode(decoder: &mut BinaryDecoder<'_>) -> CodecResult<Self> {
        let type_id = NodeId::decode(decoder)?;
        let encoding = decoder.read_u8()?;
        let body = match encoding {
            BODY_NONE => ExtensionObjectBody::None,
            BODY_BINARY => {
                let bytes = match decoder.read_length("extension object body")? {
                    Some(len) => ByteString::from(decoder.read_raw(len)?),
                    None => ByteString::null(),
                };
                ExtensionObjectBody::Raw {
                    bytes,
                    data_type_id: None,
                }
            }
            BODY_XML => ExtensionObjectBody::Xml(decoder.read_string()?),
            other => {
                return Err(CodecError::InvalidEncoding {
                    value: other,
                    context: "extension object",
                })
            }
        };
        Ok(Self { type_id, body })
    }
}

impl fmt::Display for ExtensionObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.body {
            ExtensionObjectBody::None => write!(f, "ExtensionObject({}, null)", self.type_id),
            ExtensionObjectBody::Raw { bytes, .. } => {
                write!(f, "ExtensionObject({}, {} bytes)", self.type_id, bytes.len())
            }
            ExtensionObjectBody::Xml(_) => write!(f, "ExtensionObject({}, xml)", self.type_id),
            ExtensionObjectBody::Decoded(value) => write!(f, "{}", value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_raw_body_round_trip() {
        let obj = ExtensionObject::from_raw(NodeId::numeric(0, 298), vec![1, 2, 3]);
        let bytes = obj.to_bytes();
        assert_eq!(&bytes[..], &[0x01, 0x00, 0x2A, 0x01, 0x01, 3, 0, 0, 0, 1, 2, 3]);
        assert_eq!(ExtensionObject::from_bytes(&bytes).unwrap(), obj);
    }

    #[test]
    fn test_null_body() {
        let obj = ExtensionObject::null();
        assert_eq!(&obj.to_bytes()[..], &[0x00, 0x00, 0x00]);
        assert!(ExtensionObject::from_bytes(&obj.to_bytes()).unwrap().is_null());
    }

    #[test]
    fn test_null_length_binary_body_is_empty() {
        let bytes = [0x00, 0x05, 0x01, 0xFF, 0xFF, 0xFF, 0xFF];
        let obj = ExtensionObject::from_bytes(&bytes).unwrap();
        assert_eq!(obj.raw_bytes(), Some(&[][..]));
    }

    #[test]
    fn test_null_length_binary_body_round_trip() {
        let bytes = [0x00, 0x05, 0x01, 0xFF, 0xFF, 0xFF, 0xFF];
        let obj = ExtensionObject::from_bytes(&bytes).unwrap();
        assert!(matches!(&obj.body, ExtensionObjectBody::Raw { bytes, .. } if bytes.is_null()));
        assert_eq!(&obj.to_bytes()[..], &bytes[..]);

        let empty = ExtensionObject::from_raw(NodeId::numeric(0, 5), Vec::new());
        assert_eq!(&empty.to_bytes()[..], &[0x00, 0x05, 0x01, 0, 0, 0, 0]);
        assert_ne!(ExtensionObject::from_bytes(&empty.to_bytes()).unwrap(), obj);
    }

    #[test]
    fn test_unknown_encoding_byte() {
        assert!(ExtensionObject::from_bytes(&[0x00, 0x05, 0x07]).is_err());
    }

    #[test]
    fn test_decode_as() {
        let obj = ExtensionObject::from_encodable(NodeId::numeric(0, 1), &42u32);
        assert_eq!(obj.decode_as::<u32>().unwrap(), 42);
        assert!(ExtensionObject::null().decode_as::<u32>().is_err());
    }
}
