// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Primitive binary encoding.
//!
//! All multi-byte values are little-endian. Strings, byte strings and arrays
//! carry an `Int32` length prefix where `-1` is the null sentinel and any
//! other negative length is a decode error.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use uuid::Uuid;

use crate::error::{CodecError, CodecResult};
use crate::types::{
    ByteString, DateTime, ExpandedNodeId, LocalizedText, NodeId, NodeIdentifier, QualifiedName,
    StatusCode, UaString,
};

/// Maximum nesting of variants, diagnostic infos and structures.
pub const MAX_DEPTH: usize = 64;

// =============================================================================
// BinaryEncodable
// =============================================================================

/// A type with an OPC UA binary representation.
pub trait BinaryEncodable: Sized {
    /// Appends the binary form of `self`.
    fn encode(&self, encoder: &mut BinaryEncoder);

    /// Reads a value from the decoder.
    fn decode(decoder: &mut BinaryDecoder<'_>) -> CodecResult<Self>;

    /// Encodes `self` into a fresh buffer.
    fn to_bytes(&self) -> Bytes {
        let mut encoder = BinaryEncoder::new();
        self.encode(&mut encoder);
        encoder.into_bytes()
    }

    /// Decodes a value that must span all of `bytes`.
    fn from_bytes(bytes: &[u8]) -> CodecResult<Self> {
        let mut decoder = BinaryDecoder::new(bytes);
        let value = Self::decode(&mut decoder)?;
        decoder.finish(std::any::type_name::<Self>())?;
        Ok(value)
    }
}

// =============================================================================
// BinaryEncoder
// =============================================================================

/// Growable output buffer.
#[derive(Debug, Default)]
pub struct BinaryEncoder {
    buf: BytesMut,
}

impl BinaryEncoder {
    /// Creates an empty encoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an encoder with reserved capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    /// Number of bytes written.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns `true` if nothing was written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Returns the written bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Finishes encoding.
    pub fn into_bytes(self) -> Bytes {
        self.buf.freeze()
    }

    /// Overwrites four bytes at `offset` with a little-endian u32.
    pub fn patch_u32(&mut self, offset: usize, value: u32) {
        self.buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Writes raw bytes.
    pub fn write_raw(&mut self, bytes: &[u8]) {
        self.buf.put_slice(bytes);
    }

    /// Writes a Boolean as one byte.
    pub fn write_bool(&mut self, value: bool) {
        self.buf.put_u8(u8::from(value));
    }

    /// Writes an SByte.
    pub fn write_i8(&mut self, value: i8) {
        self.buf.put_i8(value);
    }

    /// Writes a Byte.
    pub fn write_u8(&mut self, value: u8) {
        self.buf.put_u8(value);
    }

    /// Writes an Int16.
    pub fn write_i16(&mut self, value: i16) {
        self.buf.put_i16_le(value);
    }

    /// Writes a UInt16.
    pub fn write_u16(&mut self, value: u16) {
        self.buf.put_u16_le(value);
    }

    /// Writes an Int32.
    pub fn write_i32(&mut self, value: i32) {
        self.buf.put_i32_le(value);
    }

    /// Writes a UInt32.
    pub fn write_u32(&mut self, value: u32) {
        self.buf.put_u32_le(value);
    }

    /// Writes an Int64.
    pub fn write_i64(&mut self, value: i64) {
        self.buf.put_i64_le(value);
    }

    /// Writes a UInt64.
    pub fn write_u64(&mut self, value: u64) {
        self.buf.put_u64_le(value);
    }

    /// Writes a Float.
    pub fn write_f32(&mut self, value: f32) {
        self.buf.put_f32_le(value);
    }

    /// Writes a Double.
    pub fn write_f64(&mut self, value: f64) {
        self.buf.put_f64_le(value);
    }

    /// Writes an `Int32` length, `-1` for null.
    pub fn write_length(&mut self, length: Option<usize>) {
        match length {
            Some(len) => self.write_i32(len as i32),
            None => self.write_i32(-1),
        }
    }

    /// Writes a nullable string.
    pub fn write_string(&mut self, value: &UaString) {
        match &value.0 {
            Some(s) => {
                self.write_length(Some(s.len()));
                self.write_raw(s.as_bytes());
            }
            None => self.write_length(None),
        }
    }

    /// Writes a non-null string.
    pub fn write_str(&mut self, value: &str) {
        self.write_length(Some(value.len()));
        self.write_raw(value.as_bytes());
    }

    /// Writes a nullable byte string.
    pub fn write_byte_string(&mut self, value: &ByteString) {
        match &value.0 {
            Some(bytes) => {
                self.write_length(Some(bytes.len()));
                self.write_raw(bytes);
            }
            None => self.write_length(None),
        }
    }

    /// Writes a nullable array, one element at a time.
    pub fn write_array<T>(&mut self, values: Option<&[T]>, mut write: impl FnMut(&mut Self, &T)) {
        match values {
            Some(values) => {
                self.write_length(Some(values.len()));
                for value in values {
                    write(self, value);
                }
            }
            None => self.write_length(None),
        }
    }

    /// Writes a nullable array of encodable values.
    pub fn write_encodable_array<T: BinaryEncodable>(&mut self, values: Option<&[T]>) {
        self.write_array(values, |enc, value| value.encode(enc));
    }

    /// Writes an encodable value.
    pub fn write<T: BinaryEncodable>(&mut self, value: &T) {
        value.encode(self);
    }
}

// =============================================================================
// BinaryDecoder
// =============================================================================

/// Cursor over an input slice.
#[derive(Debug)]
pub struct BinaryDecoder<'a> {
    buf: &'a [u8],
    depth: usize,
}

impl<'a> BinaryDecoder<'a> {
    /// Creates a decoder over `buf`.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, depth: 0 }
    }

    /// Bytes left to read.
    pub fn remaining(&self) -> usize {
        self.buf.len()
    }

    /// Returns the unread bytes.
    pub fn rest(&self) -> &'a [u8] {
        self.buf
    }

    /// Fails if any bytes are left.
    pub fn finish(&self, context: &str) -> CodecResult<()> {
        if self.buf.is_empty() {
            Ok(())
        } else {
            Err(CodecError::TrailingBytes {
                remaining: self.buf.len(),
                context: context.to_string(),
            })
        }
    }

    /// Enters a nested value.
    pub fn enter(&mut self) -> CodecResult<()> {
        if self.depth >= MAX_DEPTH {
            return Err(CodecError::DepthExceeded { limit: MAX_DEPTH });
        }
        self.depth += 1;
        Ok(())
    }

    /// Leaves a nested value.
    pub fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    fn need(&self, needed: usize) -> CodecResult<()> {
        if self.buf.len() < needed {
            Err(CodecError::UnexpectedEof {
                needed,
                remaining: self.buf.len(),
            })
        } else {
            Ok(())
        }
    }

    /// Reads `len` raw bytes.
    pub fn read_raw(&mut self, len: usize) -> CodecResult<&'a [u8]> {
        self.need(len)?;
        let (head, tail) = self.buf.split_at(len);
        self.buf = tail;
        Ok(head)
    }

    /// Reads a Boolean. Any non-zero byte is `true`.
    pub fn read_bool(&mut self) -> CodecResult<bool> {
        Ok(self.read_u8()? != 0)
    }

    /// Reads an SByte.
    pub fn read_i8(&mut self) -> CodecResult<i8> {
        self.need(1)?;
        Ok(self.buf.get_i8())
    }

    /// Reads a Byte.
    pub fn read_u8(&mut self) -> CodecResult<u8> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    /// Reads an Int16.
    pub fn read_i16(&mut self) -> CodecResult<i16> {
        self.need(2)?;
        Ok(self.buf.get_i16_le())
    }

    /// Reads a UInt16.
    pub fn read_u16(&mut self) -> CodecResult<u16> {
        self.need(2)?;
        Ok(self.buf.get_u16_le())
    }

    /// Reads an Int32.
    pub fn read_i32(&mut self) -> CodecResult<i32> {
        self.need(4)?;
        Ok(self.buf.get_i32_le())
    }

    /// Reads a UInt32.
    pub fn read_u32(&mut self) -> CodecResult<u32> {
        self.need(4)?;
        Ok(self.buf.get_u32_le())
    }

    /// Reads an Int64.
    pub fn read_i64(&mut self) -> CodecResult<i64> {
        self.need(8)?;
        Ok(self.buf.get_i64_le())
    }

    /// Reads a UInt64.
    pub fn read_u64(&mut self) -> CodecResult<u64> {
        self.need(8)?;
        Ok(self.buf.get_u64_le())
    }

    /// Reads a Float.
    pub fn read_f32(&mut self) -> CodecResult<f32> {
        self.need(4)?;
        Ok(self.buf.get_f32_le())
    }

    /// Reads a Double.
    pub fn read_f64(&mut self) -> CodecResult<f64> {
        self.need(8)?;
        Ok(self.buf.get_f64_le())
    }

    /// Reads an `Int32` length prefix. `-1` yields `None`.
    ///
    /// Every encoded element takes at least one byte, so a length larger
    /// than the remaining input is rejected before allocating.
    pub fn read_length(&mut self, context: &'static str) -> CodecResult<Option<usize>> {
        let length = self.read_i32()?;
        match length {
            -1 => Ok(None),
            l if l < -1 => Err(CodecError::InvalidLength { length, context }),
            l => {
                let len = l as usize;
                self.need(len)?;
                Ok(Some(len))
            }
        }
    }

    /// Reads a nullable string.
    pub fn read_string(&mut self) -> CodecResult<UaString> {
        match self.read_length("string")? {
            Some(len) => {
                let bytes = self.read_raw(len)?;
                let text = std::str::from_utf8(bytes).map_err(|_| CodecError::InvalidUtf8)?;
                Ok(UaString(Some(text.to_string())))
            }
            None => Ok(UaString(None)),
        }
    }

    /// Reads a nullable byte string.
    pub fn read_byte_string(&mut self) -> CodecResult<ByteString> {
        match self.read_length("byte string")? {
            Some(len) => Ok(ByteString(Some(self.read_raw(len)?.to_vec()))),
            None => Ok(ByteString(None)),
        }
    }

    /// Reads a nullable array, one element at a time.
    pub fn read_array<T>(
        &mut self,
        context: &'static str,
        mut read: impl FnMut(&mut Self) -> CodecResult<T>,
    ) -> CodecResult<Option<Vec<T>>> {
        match self.read_length(context)? {
            Some(len) => {
                let mut values = Vec::with_capacity(len);
                for _ in 0..len {
                    values.push(read(self)?);
                }
                Ok(Some(values))
            }
            None => Ok(None),
        }
    }

    /// Reads a nullable array of encodable values.
    pub fn read_encodable_array<T: BinaryEncodable>(
        &mut self,
        context: &'static str,
    ) -> CodecResult<Option<Vec<T>>> {
        self.read_array(context, T::decode)
    }

    /// Reads an encodable value.
    pub fn read<T: BinaryEncodable>(&mut self) -> CodecResult<T> {
        T::decode(self)
    }
}

// =============================================================================
// Primitive Implementations
// =============================================================================

macro_rules! impl_primitive {
    ($ty:ty, $write:ident, $read:ident) => {
        impl BinaryEncodable for $ty {
            fn encode(&self, encoder: &mut BinaryEncoder) {
                encoder.$write(*self);
            }

            fn decode(decoder: &mut BinaryDecoder<'_>) -> CodecResult<Self> {
                decoder.$read()
            }
        }
    };
}

impl_primitive!(bool, write_bool, read_bool);
impl_primitive!(i8, write_i8, read_i8);
impl_primitive!(u8, write_u8, read_u8);
impl_primitive!(i16, write_i16, read_i16);
impl_primitive!(u16, write_u16, read_u16);
impl_primitive!(i32, write_i32, read_i32);
impl_primitive!(u32, write_u32, read_u32);
impl_primitive!(i64, write_i64, read_i64);
impl_primitive!(u64, write_u64, read_u64);
impl_primitive!(f32, write_f32, read_f32);
impl_primitive!(f64, write_f64, read_f64);

/// Nullable arrays.
impl<T: BinaryEncodable> BinaryEncodable for Option<Vec<T>> {
    fn encode(&self, encoder: &mut BinaryEncoder) {
        encoder.write_encodable_array(self.as_deref());
    }

    fn decode(decoder: &mut BinaryDecoder<'_>) -> CodecResult<Self> {
        decoder.read_encodable_array("array")
    }
}

impl BinaryEncodable for UaString {
    fn encode(&self, encoder: &mut BinaryEncoder) {
        encoder.write_string(self);
    }

    fn decode(decoder: &mut BinaryDecoder<'_>) -> CodecResult<Self> {
        decoder.read_string()
    }
}

impl BinaryEncodable for ByteString {
    fn encode(&self, encoder: &mut BinaryEncoder) {
        encoder.write_byte_string(self);
    }

    fn decode(decoder: &mut BinaryDecoder<'_>) -> CodecResult<Self> {
        decoder.read_byte_string()
    }
}

impl BinaryEncodable for DateTime {
    fn encode(&self, encoder: &mut BinaryEncoder) {
        encoder.write_i64(self.0);
    }

    fn decode(decoder: &mut BinaryDecoder<'_>) -> CodecResult<Self> {
        Ok(DateTime(decoder.read_i64()?))
    }
}

impl BinaryEncodable for StatusCode {
    fn encode(&self, encoder: &mut BinaryEncoder) {
        encoder.write_u32(self.0);
    }

    fn decode(decoder: &mut BinaryDecoder<'_>) -> CodecResult<Self> {
        Ok(StatusCode(decoder.read_u32()?))
    }
}

impl BinaryEncodable for Uuid {
    fn encode(&self, encoder: &mut BinaryEncoder) {
        let (d1, d2, d3, d4) = self.as_fields();
        encoder.write_u32(d1);
        encoder.write_u16(d2);
        encoder.write_u16(d3);
        encoder.write_raw(d4);
    }

    fn decode(decoder: &mut BinaryDecoder<'_>) -> CodecResult<Self> {
        let d1 = decoder.read_u32()?;
        let d2 = decoder.read_u16()?;
        let d3 = decoder.read_u16()?;
        let mut d4 = [0u8; 8];
        d4.copy_from_slice(decoder.read_raw(8)?);
        Ok(Uuid::from_fields(d1, d2, d3, &d4))
    }
}

// =============================================================================
// NodeId
// =============================================================================

const NODE_ID_TWO_BYTE: u8 = 0x00;
const NODE_ID_FOUR_BYTE: u8 = 0x01;
const NODE_ID_NUMERIC: u8 = 0x02;
const NODE_ID_STRING: u8 = 0x03;
const NODE_ID_GUID: u8 = 0x04;
const NODE_ID_BYTE_STRING: u8 = 0x05;

const EXPANDED_NAMESPACE_URI_FLAG: u8 = 0x80;
const EXPANDED_SERVER_INDEX_FLAG: u8 = 0x40;

/// Writes a node id with extra flag bits in the encoding byte.
fn encode_node_id_with_flags(node_id: &NodeId, flags: u8, encoder: &mut BinaryEncoder) {
    let ns = node_id.namespace_index;
    match &node_id.identifier {
        NodeIdentifier::Numeric(value) if ns == 0 && *value <= 0xFF => {
            encoder.write_u8(NODE_ID_TWO_BYTE | flags);
            encoder.write_u8(*value as u8);
        }
        NodeIdentifier::Numeric(value) if ns <= 0xFF && *value <= 0xFFFF => {
            encoder.write_u8(NODE_ID_FOUR_BYTE | flags);
            encoder.write_u8(ns as u8);
            encoder.write_u16(*value as u16);
        }
        NodeIdentifier::Numeric(value) => {
            encoder.write_u8(NODE_ID_NUMERIC | flags);
            encoder.write_u16(ns);
            encoder.write_u32(*value);
        }
        NodeIdentifier::String(value) => {
            encoder.write_u8(NODE_ID_STRING | flags);
            encoder.write_u16(ns);
            encoder.write_str(value);
        }
        NodeIdentifier::Guid(value) => {
            encoder.write_u8(NODE_ID_GUID | flags);
            encoder.write_u16(ns);
            value.encode(encoder);
        }
        NodeIdentifier::Opaque(value) => {
            encoder.write_u8(NODE_ID_BYTE_STRING | flags);
            encoder.write_u16(ns);
            encoder.write_length(Some(value.len()));
            encoder.write_raw(value);
        }
    }
}

/// Reads a node id body after its encoding byte.
fn decode_node_id_body(encoding: u8, decoder: &mut BinaryDecoder<'_>) -> CodecResult<NodeId> {
    match encoding & 0x3F {
        NODE_ID_TWO_BYTE => Ok(NodeId::numeric(0, decoder.read_u8()? as u32)),
        NODE_ID_FOUR_BYTE => {
            let ns = decoder.read_u8()? as u16;
            Ok(NodeId::numeric(ns, decoder.read_u16()? as u32))
        }
        NODE_ID_NUMERIC => {
            let ns = decoder.read_u16()?;
            Ok(NodeId::numeric(ns, decoder.read_u32()?))
        }
        NODE_ID_STRING => {
            let ns = decoder.read_u16()?;
            // A null string identifier decodes as empty.
            let value = decoder.read_string()?;
            Ok(NodeId::string(ns, value.0.unwrap_or_default()))
        }
        NODE_ID_GUID => {
            let ns = decoder.read_u16()?;
            Ok(NodeId::guid(ns, Uuid::decode(decoder)?))
        }
        NODE_ID_BYTE_STRING => {
            let ns = decoder.read_u16()?;
            let value = decoder.read_byte_string()?;
            Ok(NodeId::opaque(ns, value.0.unwrap_or_default()))
        }
        _ => Err(CodecError::InvalidEncoding {
            value: encoding,
            context: "node id",
        }),
    }
}

impl BinaryEncodable for NodeId {
    fn encode(&self, encoder: &mut BinaryEncoder) {
        encode_node_id_with_flags(self, 0, encoder);
    }

    fn decode(decoder: &mut BinaryDecoder<'_>) -> CodecResult<Self> {
        let encoding = decoder.read_u8()?;
        if encoding & 0xC0 != 0 {
            return Err(CodecError::InvalidEncoding {
                value: encoding,
                context: "node id",
            });
        }
        decode_node_id_body(encoding, decoder)
    }
}

impl BinaryEncodable for ExpandedNodeId {
    fn encode(&self, encoder: &mut BinaryEncoder) {
        let mut flags = 0;
        if self.namespace_uri.is_some() {
            flags |= EXPANDED_NAMESPACE_URI_FLAG;
        }
        if self.server_index != 0 {
            flags |= EXPANDED_SERVER_INDEX_FLAG;
        }
        encode_node_id_with_flags(&self.node_id, flags, encoder);
        if let Some(uri) = &self.namespace_uri {
            encoder.write_str(uri);
        }
        if self.server_index != 0 {
            encoder.write_u32(self.server_index);
        }
    }

    fn decode(decoder: &mut BinaryDecoder<'_>) -> CodecResult<Self> {
        let encoding = decoder.read_u8()?;
        let node_id = decode_node_id_body(encoding, decoder)?;
        let namespace_uri = if encoding & EXPANDED_NAMESPACE_URI_FLAG != 0 {
            decoder.read_string()?.0
        } else {
            None
        };
        let server_index = if encoding & EXPANDED_SERVER_INDEX_FLAG != 0 {
            decoder.read_u32()?
        } else {
            0
        };
        Ok(Self {
            node_id,
            namespace_uri,
            server_index,
        })
    }
}

// =============================================================================
// QualifiedName / LocalizedText
// =============================================================================

impl BinaryEncodable for QualifiedName {
    fn encode(&self, encoder: &mut BinaryEncoder) {
        encoder.write_u16(self.namespace_index);
        encoder.write_string(&self.name);
    }

    fn decode(decoder: &mut BinaryDecoder<'_>) -> CodecResult<Self> {
        Ok(Self {
            namespace_index: decoder.read_u16()?,
            name: decoder.read_string()?,
        })
    }
}

const LOCALIZED_TEXT_LOCALE: u8 = 0x01;
const LOCALIZED_TEXT_TEXT: u8 = 0x02;

impl BinaryEncodable for LocalizedText {
    fn encode(&self, encoder: &mut BinaryEncoder) {
        let mut mask = 0;
        if !self.locale.is_null() {
            mask |= LOCALIZED_TEXT_LOCALE;
        }
        if !self.text.is_null() {
            mask |= LOCALIZED_TEXT_TEXT;
        }
        encoder.write_u8(mask);
        if !self.locale.is_null() {
            encoder.write_string(&self.locale);
        }
        if !self.text.is_null() {
            encoder.write_string(&self.text);
        }
    }

    fn decode(decoder: &mut BinaryDecoder<'_>) -> CodecResult<Self> {
        let mask = decoder.read_u8()?;
        if mask & !(LOCALIZED_TEXT_LOCALE | LOCALIZED_TEXT_TEXT) != 0 {
            return Err(CodecError::InvalidEncoding {
                value: mask,
                context: "localized text",
            });
        }
        let locale = if mask & LOCALIZED_TEXT_LOCALE != 0 {
            decoder.read_string()?
        } else {
            UaString::null()
        };
        let text = if mask & LOCALIZED_TEXT_TEXT != 0 {
            decoder.read_string()?
        } else {
            UaString::null()
        };
        Ok(Self { locale, text })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn round_trip<T: BinaryEncodable + PartialEq + std::fmt::Debug>(value: T) -> Bytes {
        let bytes = value.to_bytes();
        assert_eq!(T::from_bytes(&bytes).unwrap(), value);
        bytes
    }

    #[test]
    fn test_primitive_little_endian() {
        assert_eq!(&round_trip(0x1234_5678u32)[..], &[0x78, 0x56, 0x34, 0x12]);
        assert_eq!(&round_trip(-2i16)[..], &[0xFE, 0xFF]);
        round_trip(1.5f64);
        round_trip(u64::MAX);
        round_trip(true);
    }

    #[test]
    fn test_null_and_empty_strings() {
        assert_eq!(&round_trip(UaString::null())[..], &[0xFF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(&round_trip(UaString::from(""))[..], &[0, 0, 0, 0]);
        assert_eq!(&round_trip(ByteString::null())[..], &[0xFF, 0xFF, 0xFF, 0xFF]);
        round_trip(UaString::from("Demo.Method.VectorAdd"));
    }

    #[test]
    fn test_negative_length_is_rejected() {
        let bytes = (-2i32).to_le_bytes();
        assert_eq!(
            UaString::from_bytes(&bytes),
            Err(CodecError::InvalidLength {
                length: -2,
                context: "string"
            })
        );
    }

    #[test]
    fn test_oversized_length_is_rejected() {
        let bytes = 1000i32.to_le_bytes();
        assert!(matches!(
            ByteString::from_bytes(&bytes),
            Err(CodecError::UnexpectedEof { .. })
        ));
    }

    #[test]
    fn test_node_id_compact_forms() {
        assert_eq!(&round_trip(NodeId::numeric(0, 85))[..], &[0x00, 85]);
        assert_eq!(&round_trip(NodeId::numeric(2, 1001))[..], &[0x01, 2, 0xE9, 0x03]);
        assert_eq!(round_trip(NodeId::numeric(0, 70000))[0], NODE_ID_NUMERIC);
        assert_eq!(round_trip(NodeId::string(2, "Temp"))[0], NODE_ID_STRING);
        assert_eq!(round_trip(NodeId::guid(3, Uuid::new_v4()))[0], NODE_ID_GUID);
        assert_eq!(round_trip(NodeId::opaque(4, vec![1, 2]))[0], NODE_ID_BYTE_STRING);
    }

    #[test]
    fn test_guid_field_layout() {
        let guid = Uuid::from_fields(0x7296_2B91, 0xFA75, 0x4AE6, &[0x8D, 0x28, 0xB4, 0x04, 0xDC, 0x7D, 0xAF, 0x63]);
        let bytes = round_trip(guid);
        assert_eq!(&bytes[..4], &[0x91, 0x2B, 0x96, 0x72]);
        assert_eq!(&bytes[4..6], &[0x75, 0xFA]);
        assert_eq!(&bytes[8..], &[0x8D, 0x28, 0xB4, 0x04, 0xDC, 0x7D, 0xAF, 0x63]);
    }

    #[test]
    fn test_expanded_node_id_flags() {
        let id = ExpandedNodeId {
            node_id: NodeId::string(0, "X"),
            namespace_uri: Some("urn:demo".into()),
            server_index: 3,
        };
        let bytes = round_trip(id);
        assert_eq!(bytes[0], NODE_ID_STRING | 0xC0);
        round_trip(ExpandedNodeId::local(NodeId::numeric(1, 7)));
    }

    #[test]
    fn test_localized_text_mask() {
        assert_eq!(&round_trip(LocalizedText::default())[..], &[0x00]);
        assert_eq!(round_trip(LocalizedText::text("A"))[0], LOCALIZED_TEXT_TEXT);
        assert_eq!(round_trip(LocalizedText::new("en", "A"))[0], 0x03);
    }

    #[test]
    fn test_trailing_bytes() {
        assert!(matches!(
            u16::from_bytes(&[1, 2, 3]),
            Err(CodecError::TrailingBytes { remaining: 1, .. })
        ));
    }

    #[test]
    fn test_depth_limit() {
        let mut decoder = BinaryDecoder::new(&[]);
        for _ in 0..MAX_DEPTH {
            decoder.enter().unwrap();
        }
        assert!(matches!(decoder.enter(), Err(CodecError::DepthExceeded { .. })));
    }
}
