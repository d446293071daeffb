// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Built-in types and the `Variant` union.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CodecError, CodecResult};
use crate::types::{
    ByteString, DateTime, ExpandedNodeId, LocalizedText, NodeId, QualifiedName, StatusCode,
    UaString,
};

use super::data_value::{DataValue, DiagnosticInfo};
use super::encoder::{BinaryDecoder, BinaryEncodable, BinaryEncoder};
use super::extension::ExtensionObject;

const VARIANT_TYPE_MASK: u8 = 0x3F;
const VARIANT_DIMENSIONS_FLAG: u8 = 0x40;
const VARIANT_ARRAY_FLAG: u8 = 0x80;

// =============================================================================
// BuiltInType
// =============================================================================

/// The 25 OPC UA built-in types plus `Null`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum BuiltInType {
    /// No value.
    Null = 0,
    /// Boolean.
    Boolean = 1,
    /// Signed 8-bit integer.
    SByte = 2,
    /// Unsigned 8-bit integer.
    Byte = 3,
    /// Signed 16-bit integer.
    Int16 = 4,
    /// Unsigned 16-bit integer.
    UInt16 = 5,
    /// Signed 32-bit integer.
    Int32 = 6,
    /// Unsigned 32-bit integer.
    UInt32 = 7,
    /// Signed 64-bit integer.
    Int64 = 8,
    /// Unsigned 64-bit integer.
    UInt64 = 9,
    /// IEEE 754 single precision.
    Float = 10,
    /// IEEE 754 double precision.
    Double = 11,
    /// UTF-8 string.
    String = 12,
    /// 100ns ticks since 1601.
    DateTime = 13,
    /// GUID.
    Guid = 14,
    /// Byte string.
    ByteString = 15,
    /// XML element as a string.
    XmlElement = 16,
    /// Node id.
    NodeId = 17,
    /// Expanded node id.
    ExpandedNodeId = 18,
    /// Status code.
    StatusCode = 19,
    /// Qualified name.
    QualifiedName = 20,
    /// Localized text.
    LocalizedText = 21,
    /// Extension object.
    ExtensionObject = 22,
    /// Data value.
    DataValue = 23,
    /// Variant (only valid as an array element or structure field type).
    Variant = 24,
    /// Diagnostic info.
    DiagnosticInfo = 25,
}

impl BuiltInType {
    /// Returns the built-in type id.
    pub const fn id(self) -> u8 {
        self as u8
    }

    /// Creates from a built-in type id.
    pub fn from_id(id: u8) -> Option<Self> {
        use BuiltInType::*;
        Some(match id {
            0 => Null,
            1 => Boolean,
            2 => SByte,
            3 => Byte,
            4 => Int16,
            5 => UInt16,
            6 => Int32,
            7 => UInt32,
            8 => Int64,
            9 => UInt64,
            10 => Float,
            11 => Double,
            12 => String,
            13 => DateTime,
            14 => Guid,
            15 => ByteString,
            16 => XmlElement,
            17 => NodeId,
            18 => ExpandedNodeId,
            19 => StatusCode,
            20 => QualifiedName,
            21 => LocalizedText,
            22 => ExtensionObject,
            23 => DataValue,
            24 => Variant,
            25 => DiagnosticInfo,
            _ => return None,
        })
    }

    /// Returns the ns0 data type node of this built-in type.
    pub const fn data_type_id(self) -> NodeId {
        NodeId::numeric(0, self as u32)
    }

    /// Maps a ns0 data type node to a built-in type.
    pub fn from_data_type_id(id: &NodeId) -> Option<Self> {
        if id.namespace_index != 0 {
            return None;
        }
        id.as_numeric()
            .and_then(|n| u8::try_from(n).ok())
            .and_then(Self::from_id)
    }

    /// Maps an OPC binary schema type name (`Int32`, `CharArray`, ...).
    pub fn from_schema_name(name: &str) -> Option<Self> {
        use BuiltInType::*;
        Some(match name {
            "Boolean" => Boolean,
            "SByte" => SByte,
            "Byte" => Byte,
            "Int16" => Int16,
            "UInt16" => UInt16,
            "Int32" => Int32,
            "UInt32" => UInt32,
            "Int64" => Int64,
            "UInt64" => UInt64,
            "Float" => Float,
            "Double" => Double,
            "String" | "CharArray" => String,
            "DateTime" => DateTime,
            "Guid" => Guid,
            "ByteString" => ByteString,
            "XmlElement" => XmlElement,
            "NodeId" => NodeId,
            "ExpandedNodeId" => ExpandedNodeId,
            "StatusCode" => StatusCode,
            "QualifiedName" => QualifiedName,
            "LocalizedText" => LocalizedText,
            "ExtensionObject" => ExtensionObject,
            "DataValue" => DataValue,
            "Variant" => Variant,
            "DiagnosticInfo" => DiagnosticInfo,
            _ => return None,
        })
    }
}

impl fmt::Display for BuiltInType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// =============================================================================
// Variant
// =============================================================================

/// A value of any built-in type, or an array of them.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Variant {
    /// No value.
    #[default]
    Empty,
    /// Boolean.
    Boolean(bool),
    /// SByte.
    SByte(i8),
    /// Byte.
    Byte(u8),
    /// Int16.
    Int16(i16),
    /// UInt16.
    UInt16(u16),
    /// Int32.
    Int32(i32),
    /// UInt32.
    UInt32(u32),
    /// Int64.
    Int64(i64),
    /// UInt64.
    UInt64(u64),
    /// Float.
    Float(f32),
    /// Double.
    Double(f64),
    /// String.
    String(UaString),
    /// DateTime.
    DateTime(DateTime),
    /// Guid.
    Guid(Uuid),
    /// ByteString.
    ByteString(ByteString),
    /// XmlElement.
    XmlElement(UaString),
    /// NodeId.
    NodeId(Box<NodeId>),
    /// ExpandedNodeId.
    ExpandedNodeId(Box<ExpandedNodeId>),
    /// StatusCode.
    StatusCode(StatusCode),
    /// QualifiedName.
    QualifiedName(Box<QualifiedName>),
    /// LocalizedText.
    LocalizedText(Box<LocalizedText>),
    /// ExtensionObject.
    ExtensionObject(Box<ExtensionObject>),
    /// DataValue.
    DataValue(Box<DataValue>),
    /// DiagnosticInfo.
    DiagnosticInfo(Box<DiagnosticInfo>),
    /// Array of one element type.
    Array(Box<VariantArray>),
}

/// A homogeneous array value.
///
/// Elements must all be of `element_type`. With `element_type` set to
/// [`BuiltInType::Variant`] each element is itself a full variant.
#[derive(Debug, Clone, PartialEq)]
pub struct VariantArray {
    /// Element type.
    pub element_type: BuiltInType,
    /// Elements in row-major order; `None` is the null array.
    pub values: Option<Vec<Variant>>,
    /// Dimension lengths of a multi-dimensional array.
    pub dimensions: Option<Vec<i32>>,
}

impl VariantArray {
    /// Creates a one-dimensional array, checking element types.
    pub fn new(element_type: BuiltInType, values: Vec<Variant>) -> CodecResult<Self> {
        if element_type != BuiltInType::Variant {
            if let Some(bad) = values.iter().find(|v| v.built_in_type() != element_type) {
                return Err(CodecError::type_mismatch(
                    element_type.to_string(),
                    bad.built_in_type().to_string(),
                ));
            }
        }
        Ok(Self {
            element_type,
            values: Some(values),
            dimensions: None,
        })
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.values.as_ref().map_or(0, Vec::len)
    }

    /// Returns `true` if the array is null or empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Variant {
    /// Creates an array variant.
    pub fn array(element_type: BuiltInType, values: Vec<Variant>) -> CodecResult<Self> {
        Ok(Self::Array(Box::new(VariantArray::new(element_type, values)?)))
    }

    /// Creates a string variant.
    pub fn string(value: impl Into<String>) -> Self {
        Self::String(UaString::from(value.into()))
    }

    /// Returns the built-in type; for arrays the element type.
    pub fn built_in_type(&self) -> BuiltInType {
        match self {
            Self::Empty => BuiltInType::Null,
            Self::Boolean(_) => BuiltInType::Boolean,
            Self::SByte(_) => BuiltInType::SByte,
            Self::Byte(_) => BuiltInType::Byte,
            Self::Int16(_) => BuiltInType::Int16,
            Self::UInt16(_) => BuiltInType::UInt16,
            Self::Int32(_) => BuiltInType::Int32,
            Self::UInt32(_) => BuiltInType::UInt32,
            Self::Int64(_) => BuiltInType::Int64,
            Self::UInt64(_) => BuiltInType::UInt64,
            Self::Float(_) => BuiltInType::Float,
            Self::Double(_) => BuiltInType::Double,
            Self::String(_) => BuiltInType::String,
            Self::DateTime(_) => BuiltInType::DateTime,
            Self::Guid(_) => BuiltInType::Guid,
            Self::ByteString(_) => BuiltInType::ByteString,
            Self::XmlElement(_) => BuiltInType::XmlElement,
            Self::NodeId(_) => BuiltInType::NodeId,
            Self::ExpandedNodeId(_) => BuiltInType::ExpandedNodeId,
            Self::StatusCode(_) => BuiltInType::StatusCode,
            Self::QualifiedName(_) => BuiltInType::QualifiedName,
            Self::LocalizedText(_) => BuiltInType::LocalizedText,
            Self::ExtensionObject(_) => BuiltInType::ExtensionObject,
            Self::DataValue(_) => BuiltInType::DataValue,
            Self::DiagnosticInfo(_) => BuiltInType::DiagnosticInfo,
            Self::Array(array) => array.element_type,
        }
    }

    /// Returns `true` for [`Variant::Empty`].
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Returns `true` for arrays.
    pub fn is_array(&self) -> bool {
        matches!(self, Self::Array(_))
    }

    /// Returns the array elements.
    pub fn as_array(&self) -> Option<&[Variant]> {
        match self {
            Self::Array(array) => array.values.as_deref(),
            _ => None,
        }
    }

    /// Returns the string payload.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) | Self::XmlElement(s) => s.0.as_deref(),
            _ => None,
        }
    }

    /// Returns the byte string payload.
    pub fn as_byte_string(&self) -> Option<&ByteString> {
        match self {
            Self::ByteString(b) => Some(b),
            _ => None,
        }
    }

    /// Returns the node id payload.
    pub fn as_node_id(&self) -> Option<&NodeId> {
        match self {
            Self::NodeId(id) => Some(id),
            _ => None,
        }
    }

    /// Returns the extension object payload.
    pub fn as_extension_object(&self) -> Option<&ExtensionObject> {
        match self {
            Self::ExtensionObject(obj) => Some(obj),
            _ => None,
        }
    }

    /// Widens integer payloads to `i64`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::SByte(v) => Some(*v as i64),
            Self::Byte(v) => Some(*v as i64),
            Self::Int16(v) => Some(*v as i64),
            Self::UInt16(v) => Some(*v as i64),
            Self::Int32(v) => Some(*v as i64),
            Self::UInt32(v) => Some(*v as i64),
            Self::Int64(v) => Some(*v),
            Self::UInt64(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Writes the value without the leading encoding mask.
    ///
    /// Arrays are written as an `Int32` count followed by element bodies,
    /// the layout used for array fields of structures.
    pub fn encode_body(&self, encoder: &mut BinaryEncoder) {
        match self {
            Self::Empty => {}
            Self::Boolean(v) => encoder.write_bool(*v),
            Self::SByte(v) => encoder.write_i8(*v),
            Self::Byte(v) => encoder.write_u8(*v),
            Self::Int16(v) => encoder.write_i16(*v),
            Self::UInt16(v) => encoder.write_u16(*v),
            Self::Int32(v) => encoder.write_i32(*v),
            Self::UInt32(v) => encoder.write_u32(*v),
            Self::Int64(v) => encoder.write_i64(*v),
            Self::UInt64(v) => encoder.write_u64(*v),
            Self::Float(v) => encoder.write_f32(*v),
            Self::Double(v) => encoder.write_f64(*v),
            Self::String(v) | Self::XmlElement(v) => encoder.write_string(v),
            Self::DateTime(v) => v.encode(encoder),
            Self::Guid(v) => v.encode(encoder),
            Self::ByteString(v) => encoder.write_byte_string(v),
            Self::NodeId(v) => v.encode(encoder),
            Self::ExpandedNodeId(v) => v.encode(encoder),
            Self::StatusCode(v) => v.encode(encoder),
            Self::QualifiedName(v) => v.encode(encoder),
            Self::LocalizedText(v) => v.encode(encoder),
            Self::ExtensionObject(v) => v.encode(encoder),
            Self::DataValue(v) => v.encode(encoder),
            Self::DiagnosticInfo(v) => v.encode(encoder),
            Self::Array(array) => encode_elements(array, encoder),
        }
    }

    /// Reads a value body of a known type.
    ///
    /// [`BuiltInType::Variant`] reads a full variant with its mask.
    pub fn decode_body(ty: BuiltInType, decoder: &mut BinaryDecoder<'_>) -> CodecResult<Self> {
        Ok(match ty {
            BuiltInType::Null => Self::Empty,
            BuiltInType::Boolean => Self::Boolean(decoder.read_bool()?),
            BuiltInType::SByte => Self::SByte(decoder.read_i8()?),
            BuiltInType::Byte => Self::Byte(decoder.read_u8()?),
            BuiltInType::Int16 => Self::Int16(decoder.read_i16()?),
            BuiltInType::UInt16 => Self::UInt16(decoder.read_u16()?),
            BuiltInType::Int32 => Self::Int32(decoder.read_i32()?),
            BuiltInType::UInt32 => Self::UInt32(decoder.read_u32()?),
            BuiltInType::Int64 => Self::Int64(decoder.read_i64()?),
            BuiltInType::UInt64 => Self::UInt64(decoder.read_u64()?),
            BuiltInType::Float => Self::Float(decoder.read_f32()?),
            BuiltInType::Double => Self::Double(decoder.read_f64()?),
            BuiltInType::String => Self::String(decoder.read_string()?),
            BuiltInType::DateTime => Self::DateTime(DateTime::decode(decoder)?),
            BuiltInType::Guid => Self::Guid(Uuid::decode(decoder)?),
            BuiltInType::ByteString => Self::ByteString(decoder.read_byte_string()?),
            BuiltInType::XmlElement => Self::XmlElement(decoder.read_string()?),
            BuiltInType::NodeId => Self::NodeId(Box::new(NodeId::decode(decoder)?)),
            BuiltInType::ExpandedNodeId => {
                Self::ExpandedNodeId(Box::new(ExpandedNodeId::decode(decoder)?))
            }
            BuiltInType::StatusCode => Self::StatusCode(StatusCode::decode(decoder)?),
            BuiltInType::QualifiedName => {
                Self::QualifiedName(Box::new(QualifiedName::decode(decoder)?))
            }
            BuiltInType::LocalizedText => {
                Self::LocalizedText(Box::new(LocalizedText::decode(decoder)?))
            }
            BuiltInType::ExtensionObject => {
                Self::ExtensionObject(Box::new(ExtensionObject::decode(decoder)?))
            }
            BuiltInType::DataValue => Self::DataValue(Box::new(DataValue::decode(decoder)?)),
            BuiltInType::Variant => Self::decode(decoder)?,
            BuiltInType::DiagnosticInfo => {
                Self::DiagnosticInfo(Box::new(DiagnosticInfo::decode(decoder)?))
            }
        })
    }
}

fn encode_elements(array: &VariantArray, encoder: &mut BinaryEncoder) {
    let full = array.element_type == BuiltInType::Variant;
    encoder.write_array(array.values.as_deref(), |enc, value| {
        if full {
            value.encode(enc);
        } else {
            value.encode_body(enc);
        }
    });
}

impl BinaryEncodable for Variant {
    fn encode(&self, encoder: &mut BinaryEncoder) {
        match self {
            Self::Empty => encoder.write_u8(0),
            Self::Array(array) => {
                let mut mask = array.element_type.id() | VARIANT_ARRAY_FLAG;
                if array.dimensions.is_some() {
                    mask |= VARIANT_DIMENSIONS_FLAG;
                }
                encoder.write_u8(mask);
                encode_elements(array, encoder);
                if let Some(dimensions) = &array.dimensions {
                    encoder.write_encodable_array(Some(dimensions.as_slice()));
                }
            }
            scalar => {
                encoder.write_u8(scalar.built_in_type().id());
                scalar.encode_body(encoder);
            }
        }
    }

    fn decode(decoder: &mut BinaryDecoder<'_>) -> CodecResult<Self> {
        decoder.enter()?;
        let result = decode_variant(decoder);
        decoder.leave();
        result
    }
}

fn decode_variant(decoder: &mut BinaryDecoder<'_>) -> CodecResult<Variant> {
    let mask = decoder.read_u8()?;
    let invalid = || CodecError::InvalidEncoding {
        value: mask,
        context: "variant",
    };
    let element_type = BuiltInType::from_id(mask & VARIANT_TYPE_MASK).ok_or_else(invalid)?;

    if mask & VARIANT_ARRAY_FLAG == 0 {
        if mask & VARIANT_DIMENSIONS_FLAG != 0 || element_type == BuiltInType::Variant {
            return Err(invalid());
        }
        return Variant::decode_body(element_type, decoder);
    }

    if element_type == BuiltInType::Null {
        return Err(invalid());
    }
    let values = decoder.read_array("variant array", |d| Variant::decode_body(element_type, d))?;
    let dimensions = if mask & VARIANT_DIMENSIONS_FLAG != 0 {
        decoder.read_encodable_array::<i32>("array dimensions")?
    } else {
        None
    };
    Ok(Variant::Array(Box::new(VariantArray {
        element_type,
        values,
        dimensions,
    })))
}

macro_rules! impl_from_scalar {
    ($ty:ty, $variant:ident) => {
        impl From<$ty> for Variant {
            fn from(value: $ty) -> Self {
                Self::$variant(value)
            }
        }
    };
}

impl_from_scalar!(bool, Boolean);
impl_from_scalar!(i8, SByte);
impl_from_scalar!(u8, Byte);
impl_from_scalar!(i16, Int16);
impl_from_scalar!(u16, UInt16);
impl_from_scalar!(i32, Int32);
impl_from_scalar!(u32, UInt32);
impl_from_scalar!(i64, Int64);
impl_from_scalar!(u64, UInt64);
impl_from_scalar!(f32, Float);
impl_from_scalar!(f64, Double);
impl_from_scalar!(UaString, String);
impl_from_scalar!(DateTime, DateTime);
impl_from_scalar!(ByteString, ByteString);
impl_from_scalar!(StatusCode, StatusCode);

impl From<&str> for Variant {
    fn from(value: &str) -> Self {
        Self::string(value)
    }
}

impl From<NodeId> for Variant {
    fn from(value: NodeId) -> Self {
        Self::NodeId(Box::new(value))
    }
}

impl From<QualifiedName> for Variant {
    fn from(value: QualifiedName) -> Self {
        Self::QualifiedName(Box::new(value))
    }
}

impl From<LocalizedText> for Variant {
    fn from(value: LocalizedText) -> Self {
        Self::LocalizedText(Box::new(value))
    }
}

impl From<ExtensionObject> for Variant {
    fn from(value: ExtensionObject) -> Self {
        Self::ExtensionObject(Box::new(value))
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "<empty>"),
            Self::Boolean(v) => write!(f, "{}", v),
            Self::SByte(v) => write!(f, "{}", v),
            Self::Byte(v) => write!(f, "{}", v),
            Self::Int16(v) => write!(f, "{}", v),
            Self::UInt16(v) => write!(f, "{}", v),
            Self::Int32(v) => write!(f, "{}", v),
            Self::UInt32(v) => write!(f, "{}", v),
            Self::Int64(v) => write!(f, "{}", v),
            Self::UInt64(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::Double(v) => write!(f, "{}", v),
            Self::String(v) | Self::XmlElement(v) => write!(f, "{}", v),
            Self::DateTime(v) => write!(f, "{}", v),
            Self::Guid(v) => write!(f, "{}", v),
            Self::ByteString(v) => write!(f, "<{} bytes>", v.len()),
            Self::NodeId(v) => write!(f, "{}", v),
            Self::ExpandedNodeId(v) => write!(f, "{}", v),
            Self::StatusCode(v) => write!(f, "{}", v),
            Self::QualifiedName(v) => write!(f, "{}", v),
            Self::LocalizedText(v) => write!(f, "{}", v),
            Self::ExtensionObject(v) => write!(f, "{}", v),
            Self::DataValue(v) => match &v.value {
                Some(inner) => write!(f, "{}", inner),
                None => write!(f, "<no value>"),
            },
            Self::DiagnosticInfo(_) => write!(f, "<diagnostic info>"),
            Self::Array(array) => {
                write!(f, "[")?;
                for (i, value) in array.values.iter().flatten().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", value)?;
                }
                write!(f, "]")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn round_trip(value: Variant) -> bytes::Bytes {
        let bytes = value.to_bytes();
        assert_eq!(Variant::from_bytes(&bytes).unwrap(), value);
        bytes
    }

    #[test]
    fn test_built_in_ids_are_stable() {
        for id in 0..=25u8 {
            assert_eq!(BuiltInType::from_id(id).unwrap().id(), id);
        }
        assert_eq!(BuiltInType::from_id(26), None);
        assert_eq!(BuiltInType::from_schema_name("CharArray"), Some(BuiltInType::String));
        assert_eq!(
            BuiltInType::from_data_type_id(&NodeId::numeric(0, 11)),
            Some(BuiltInType::Double)
        );
    }

    #[test]
    fn test_scalar_variants() {
        assert_eq!(&round_trip(Variant::Empty)[..], &[0]);
        assert_eq!(&round_trip(Variant::Int32(-1))[..], &[6, 0xFF, 0xFF, 0xFF, 0xFF]);
        round_trip(Variant::string("hello"));
        round_trip(Variant::String(UaString::null()));
        round_trip(Variant::from(NodeId::string(2, "Demo")));
        round_trip(Variant::from(LocalizedText::new("en", "Text")));
        round_trip(Variant::Guid(Uuid::new_v4()));
        round_trip(Variant::StatusCode(StatusCode::BAD_NO_MATCH));
    }

    #[test]
    fn test_arrays() {
        let array = Variant::array(BuiltInType::UInt32, vec![1u32.into(), 2u32.into()]).unwrap();
        let bytes = round_trip(array);
        assert_eq!(bytes[0], 7 | VARIANT_ARRAY_FLAG);

        let null = Variant::Array(Box::new(VariantArray {
            element_type: BuiltInType::String,
            values: None,
            dimensions: None,
        }));
        round_trip(null);

        let mixed = Variant::array(
            BuiltInType::Variant,
            vec![Variant::Int16(3), Variant::string("x"), Variant::Empty],
        )
        .unwrap();
        round_trip(mixed);
    }

    #[test]
    fn test_matrix_dimensions() {
        let matrix = Variant::Array(Box::new(VariantArray {
            element_type: BuiltInType::Byte,
            values: Some((0u8..6).map(Variant::from).collect()),
            dimensions: Some(vec![2, 3]),
        }));
        let bytes = round_trip(matrix);
        assert_eq!(bytes[0], 3 | VARIANT_ARRAY_FLAG | VARIANT_DIMENSIONS_FLAG);
    }

    #[test]
    fn test_array_type_check() {
        assert!(Variant::array(BuiltInType::Int32, vec![Variant::Boolean(true)]).is_err());
    }

    #[test]
    fn test_invalid_masks() {
        assert!(Variant::from_bytes(&[26]).is_err());
        assert!(Variant::from_bytes(&[24]).is_err());
        assert!(Variant::from_bytes(&[VARIANT_DIMENSIONS_FLAG | 6, 0, 0, 0, 0]).is_err());
    }

    #[test]
    fn test_nesting_is_bounded() {
        // Arrays of Variant elements, each holding another array.
        let mut bytes = Vec::new();
        for _ in 0..200 {
            bytes.push(24 | VARIANT_ARRAY_FLAG);
            bytes.extend_from_slice(&1i32.to_le_bytes());
        }
        bytes.push(0);
        assert!(matches!(
            Variant::from_bytes(&bytes),
            Err(CodecError::DepthExceeded { .. })
        ));
    }
}
