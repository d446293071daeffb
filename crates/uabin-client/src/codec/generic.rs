// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Definition-driven decoding of structures and unions.
//!
//! Values whose layout is only known at runtime are held as
//! [`GenericValue`]s: a structure keeps an ordered map of field values, a
//! union keeps its switch value and the selected field.
//!
//! # Wire Layout
//!
//! ```text
//! Structure: [u32 mask if any field is optional] field* (absent optionals skipped)
//! Union:     u32 switch (0 = null) [selected field]
//! Array:     i32 count (-1 = null) element*
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::dictionary::{
    DataTypeDefinition, FieldDescriptor, FieldType, StructureDefinition, UnionDefinition,
    MAX_OPTIONAL_FIELDS,
};
use crate::error::{CodecError, CodecResult};
use crate::types::NodeId;

use super::encoder::{BinaryDecoder, BinaryEncodable, BinaryEncoder};
use super::extension::{ExtensionObject, ExtensionObjectBody};
use super::variant::{BuiltInType, Variant};

// =============================================================================
// DataTypeLookup
// =============================================================================

/// Source of definitions for nested decoding.
pub trait DataTypeLookup {
    /// Finds a definition by data type node.
    fn lookup_data_type(&self, data_type_id: &NodeId) -> Option<DataTypeDefinition>;

    /// Finds a definition by binary encoding node.
    fn lookup_encoding(&self, encoding_id: &NodeId) -> Option<DataTypeDefinition>;
}

/// An in-memory set of definitions.
#[derive(Debug, Clone, Default)]
pub struct DefinitionSet {
    by_data_type: HashMap<NodeId, DataTypeDefinition>,
    by_encoding: HashMap<NodeId, DataTypeDefinition>,
}

impl DefinitionSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a definition under its data type and encoding ids.
    pub fn insert(&mut self, definition: impl Into<DataTypeDefinition>) {
        let definition = definition.into();
        self.by_encoding
            .insert(definition.encoding_id().clone(), definition.clone());
        self.by_data_type
            .insert(definition.data_type_id().clone(), definition);
    }

    /// Number of definitions.
    pub fn len(&self) -> usize {
        self.by_data_type.len()
    }

    /// Returns `true` if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.by_data_type.is_empty()
    }
}

impl DataTypeLookup for DefinitionSet {
    fn lookup_data_type(&self, data_type_id: &NodeId) -> Option<DataTypeDefinition> {
        self.by_data_type.get(data_type_id).cloned()
    }

    fn lookup_encoding(&self, encoding_id: &NodeId) -> Option<DataTypeDefinition> {
        self.by_encoding.get(encoding_id).cloned()
    }
}

// =============================================================================
// FieldValue
// =============================================================================

/// Value of one structure or union field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// An optional field that is not present, or an unselected union field.
    Absent,
    /// A scalar of a built-in type.
    Scalar(Variant),
    /// An array of a built-in type; `None` is the null array.
    Array(Option<Vec<Variant>>),
    /// A nested structure or union.
    Structure(Box<GenericValue>),
    /// An array of nested structures or unions.
    StructureArray(Option<Vec<GenericValue>>),
}

static ABSENT: FieldValue = FieldValue::Absent;

impl FieldValue {
    /// Returns `true` for [`FieldValue::Absent`].
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    /// Returns the scalar value.
    pub fn as_scalar(&self) -> Option<&Variant> {
        match self {
            Self::Scalar(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the array elements.
    pub fn as_array(&self) -> Option<&[Variant]> {
        match self {
            Self::Array(values) => values.as_deref(),
            _ => None,
        }
    }

    /// Returns the nested value.
    pub fn as_structure(&self) -> Option<&GenericValue> {
        match self {
            Self::Structure(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the nested values.
    pub fn as_structure_array(&self) -> Option<&[GenericValue]> {
        match self {
            Self::StructureArray(values) => values.as_deref(),
            _ => None,
        }
    }

    fn kind(&self) -> String {
        match self {
            Self::Absent => "absent".to_string(),
            Self::Scalar(v) if v.is_array() => format!("{}[]", v.built_in_type()),
            Self::Scalar(v) => v.built_in_type().to_string(),
            Self::Array(_) => "array".to_string(),
            Self::Structure(v) => v.name().to_string(),
            Self::StructureArray(_) => "structure array".to_string(),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, values: &Option<Vec<T>>) -> fmt::Result {
            match values {
                None => write!(f, "null"),
                Some(values) => {
                    write!(f, "[")?;
                    for (i, v) in values.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{}", v)?;
                    }
                    write!(f, "]")
                }
            }
        }
        match self {
            Self::Absent => write!(f, "<absent>"),
            Self::Scalar(v) => write!(f, "{}", v),
            Self::Array(values) => list(f, values),
            Self::Structure(v) => write!(f, "{}", v),
            Self::StructureArray(values) => list(f, values),
        }
    }
}

fn matches_built_in(expected: BuiltInType, value: &Variant) -> bool {
    expected == BuiltInType::Variant || (!value.is_array() && value.built_in_type() == expected)
}

fn check_field(field: &FieldDescriptor, value: &FieldValue) -> CodecResult<()> {
    let ok = match (&field.field_type, field.is_array(), value) {
        (_, _, FieldValue::Absent) => field.is_optional,
        (FieldType::BuiltIn(ty), false, FieldValue::Scalar(v)) => matches_built_in(*ty, v),
        (FieldType::BuiltIn(ty), true, FieldValue::Array(values)) => values
            .iter()
            .flatten()
            .all(|v| matches_built_in(*ty, v)),
        (FieldType::Structured(id), false, FieldValue::Structure(v)) => v.data_type_id() == id,
        (FieldType::Structured(id), true, FieldValue::StructureArray(values)) => {
            values.iter().flatten().all(|v| v.data_type_id() == id)
        }
        _ => false,
    };
    if ok {
        Ok(())
    } else {
        let suffix = if field.is_array() { "[]" } else { "" };
        Err(CodecError::type_mismatch(
            format!("{}: {}{}", field.name, field.field_type, suffix),
            value.kind(),
        ))
    }
}

// =============================================================================
// GenericStructureValue
// =============================================================================

/// A decoded structure.
#[derive(Debug, Clone, PartialEq)]
pub struct GenericStructureValue {
    definition: Arc<StructureDefinition>,
    fields: IndexMap<String, FieldValue>,
}

impl GenericStructureValue {
    /// Creates a structure value, checking it against the definition.
    ///
    /// Missing optional fields become [`FieldValue::Absent`]. Fields are
    /// stored in declaration order.
    pub fn new(
        definition: Arc<StructureDefinition>,
        mut fields: IndexMap<String, FieldValue>,
    ) -> CodecResult<Self> {
        if let Some(unknown) = fields.keys().find(|name| definition.field(name).is_none()) {
            return Err(CodecError::field_not_found(unknown.clone()));
        }
        let mut ordered = IndexMap::with_capacity(definition.fields.len());
        for field in &definition.fields {
            let value = fields.swap_remove(&field.name).unwrap_or(FieldValue::Absent);
            check_field(field, &value)?;
            ordered.insert(field.name.clone(), value);
        }
        Ok(Self {
            definition,
            fields: ordered,
        })
    }

    /// The definition.
    pub fn definition(&self) -> &Arc<StructureDefinition> {
        &self.definition
    }

    /// Looks up a field value.
    pub fn field(&self, name: &str) -> CodecResult<&FieldValue> {
        self.fields
            .get(name)
            .ok_or_else(|| CodecError::field_not_found(name))
    }

    /// Iterates fields in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    fn fields_mut(&mut self) -> impl Iterator<Item = &mut FieldValue> {
        self.fields.values_mut()
    }

    fn encode(&self, encoder: &mut BinaryEncoder) {
        if self.definition.has_optional_fields() {
            let mut mask = 0u32;
            let optionals = self.definition.fields.iter().filter(|f| f.is_optional);
            for (bit, field) in optionals.enumerate() {
                let present = self
                    .fields
                    .get(&field.name)
                    .is_some_and(|v| !v.is_absent());
                if present && bit < MAX_OPTIONAL_FIELDS {
                    mask |= 1 << bit;
                }
            }
            encoder.write_u32(mask);
        }
        for field in &self.definition.fields {
            if let Some(value) = self.fields.get(&field.name) {
                encode_field(field, value, encoder);
            }
        }
    }

    fn decode(
        decoder: &mut BinaryDecoder<'_>,
        definition: &Arc<StructureDefinition>,
        lookup: &dyn DataTypeLookup,
    ) -> CodecResult<Self> {
        let mask = if definition.has_optional_fields() {
            decoder.read_u32()?
        } else {
            0
        };
        let mut fields = IndexMap::with_capacity(definition.fields.len());
        let mut bit = 0u32;
        for field in &definition.fields {
            if field.is_optional {
                let present = (bit as usize) < MAX_OPTIONAL_FIELDS && mask & (1 << bit) != 0;
                bit += 1;
                if !present {
                    fields.insert(field.name.clone(), FieldValue::Absent);
                    continue;
                }
            }
            let value = decode_field(field, decoder, lookup)?;
            fields.insert(field.name.clone(), value);
        }
        Ok(Self {
            definition: Arc::clone(definition),
            fields,
        })
    }
}

// =============================================================================
// GenericUnionValue
// =============================================================================

/// A decoded union.
#[derive(Debug, Clone, PartialEq)]
pub struct GenericUnionValue {
    definition: Arc<UnionDefinition>,
    switch_value: u32,
    value: Option<(String, FieldValue)>,
}

impl GenericUnionValue {
    /// Creates the null union (switch value 0).
    pub fn null(definition: Arc<UnionDefinition>) -> Self {
        Self {
            definition,
            switch_value: 0,
            value: None,
        }
    }

    /// Creates a union with one selected field.
    pub fn new(
        definition: Arc<UnionDefinition>,
        field_name: &str,
        value: FieldValue,
    ) -> CodecResult<Self> {
        let (index, field) = definition
            .fields
            .iter()
            .enumerate()
            .find(|(_, f)| f.name == field_name)
            .ok_or_else(|| CodecError::field_not_found(field_name))?;
        if value.is_absent() {
            return Err(CodecError::type_mismatch(field.field_type.to_string(), "absent"));
        }
        check_field(field, &value)?;
        let switch_value = field.switch_value.unwrap_or(index as u32 + 1);
        let name = field.name.clone();
        Ok(Self {
            definition,
            switch_value,
            value: Some((name, value)),
        })
    }

    /// The definition.
    pub fn definition(&self) -> &Arc<UnionDefinition> {
        &self.definition
    }

    /// The switch value; 0 for the null union.
    pub fn switch_value(&self) -> u32 {
        self.switch_value
    }

    /// Returns the selected field name and value.
    pub fn selected(&self) -> Option<(&str, &FieldValue)> {
        self.value.as_ref().map(|(name, value)| (name.as_str(), value))
    }

    /// Looks up a field. Unselected fields are [`FieldValue::Absent`].
    pub fn field(&self, name: &str) -> CodecResult<&FieldValue> {
        if self.definition.field(name).is_none() {
            return Err(CodecError::field_not_found(name));
        }
        match &self.value {
            Some((selected, value)) if selected == name => Ok(value),
            _ => Ok(&ABSENT),
        }
    }

    fn encode(&self, encoder: &mut BinaryEncoder) {
        encoder.write_u32(self.switch_value);
        if let Some((name, value)) = &self.value {
            if let Some(field) = self.definition.field(name) {
                encode_field(field, value, encoder);
            }
        }
    }

    fn decode(
        decoder: &mut BinaryDecoder<'_>,
        definition: &Arc<UnionDefinition>,
        lookup: &dyn DataTypeLookup,
    ) -> CodecResult<Self> {
        let switch_value = decoder.read_u32()?;
        if switch_value == 0 {
            return Ok(Self::null(Arc::clone(definition)));
        }
        let field = definition
            .field_for_switch(switch_value)
            .ok_or_else(|| CodecError::InvalidSwitch {
                switch_value,
                data_type: definition.name.clone(),
            })?;
        let value = decode_field(field, decoder, lookup)?;
        Ok(Self {
            definition: Arc::clone(definition),
            switch_value,
            value: Some((field.name.clone(), value)),
        })
    }
}

// =============================================================================
// GenericValue
// =============================================================================

/// A structure or union decoded against a runtime definition.
#[derive(Debug, Clone, PartialEq)]
pub enum GenericValue {
    /// A structure.
    Structure(GenericStructureValue),
    /// A union.
    Union(GenericUnionValue),
}

impl GenericValue {
    /// Decodes a value of `definition`.
    pub fn decode(
        decoder: &mut BinaryDecoder<'_>,
        definition: &DataTypeDefinition,
        lookup: &dyn DataTypeLookup,
    ) -> CodecResult<Self> {
        decoder.enter()?;
        let result = match definition {
            DataTypeDefinition::Structure(def) => {
                GenericStructureValue::decode(decoder, def, lookup).map(Self::Structure)
            }
            DataTypeDefinition::Union(def) => {
                GenericUnionValue::decode(decoder, def, lookup).map(Self::Union)
            }
        };
        decoder.leave();
        result
    }

    /// Encodes the value body.
    pub fn encode(&self, encoder: &mut BinaryEncoder) {
        match self {
            Self::Structure(v) => v.encode(encoder),
            Self::Union(v) => v.encode(encoder),
        }
    }

    /// Encodes the value body into a fresh buffer.
    pub fn to_bytes(&self) -> bytes::Bytes {
        let mut encoder = BinaryEncoder::new();
        self.encode(&mut encoder);
        encoder.into_bytes()
    }

    /// Type name.
    pub fn name(&self) -> &str {
        match self {
            Self::Structure(v) => &v.definition.name,
            Self::Union(v) => &v.definition.name,
        }
    }

    /// Data type node.
    pub fn data_type_id(&self) -> &NodeId {
        match self {
            Self::Structure(v) => &v.definition.data_type_id,
            Self::Union(v) => &v.definition.data_type_id,
        }
    }

    /// Binary encoding node.
    pub fn encoding_id(&self) -> &NodeId {
        match self {
            Self::Structure(v) => &v.definition.encoding_id,
            Self::Union(v) => &v.definition.encoding_id,
        }
    }

    /// Looks up a field by name.
    pub fn field(&self, name: &str) -> CodecResult<&FieldValue> {
        match self {
            Self::Structure(v) => v.field(name),
            Self::Union(v) => v.field(name),
        }
    }

    /// Returns the structure value.
    pub fn as_structure(&self) -> Option<&GenericStructureValue> {
        match self {
            Self::Structure(v) => Some(v),
            Self::Union(_) => None,
        }
    }

    /// Returns the union value.
    pub fn as_union(&self) -> Option<&GenericUnionValue> {
        match self {
            Self::Union(v) => Some(v),
            Self::Structure(_) => None,
        }
    }

    fn values_mut(&mut self) -> Box<dyn Iterator<Item = &mut FieldValue> + '_> {
        match self {
            Self::Structure(v) => Box::new(v.fields_mut()),
            Self::Union(v) => Box::new(v.value.iter_mut().map(|(_, value)| value)),
        }
    }

    fn values(&self) -> Box<dyn Iterator<Item = &FieldValue> + '_> {
        match self {
            Self::Structure(v) => Box::new(v.fields.values()),
            Self::Union(v) => Box::new(v.value.iter().map(|(_, value)| value)),
        }
    }
}

impl fmt::Display for GenericValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Structure(v) => {
                write!(f, "{} {{", v.definition.name)?;
                let mut first = true;
                for (name, value) in v.fields() {
                    if value.is_absent() {
                        continue;
                    }
                    write!(f, "{}{}: {}", if first { " " } else { ", " }, name, value)?;
                    first = false;
                }
                write!(f, " }}")
            }
            Self::Union(v) => match v.selected() {
                Some((name, value)) => write!(f, "{}::{}({})", v.definition.name, name, value),
                None => write!(f, "{}::null", v.definition.name),
            },
        }
    }
}

/// Decodes a complete structure or union body.
pub fn decode_generic(
    bytes: &[u8],
    definition: &DataTypeDefinition,
    lookup: &dyn DataTypeLookup,
) -> CodecResult<GenericValue> {
    let mut decoder = BinaryDecoder::new(bytes);
    let value = GenericValue::decode(&mut decoder, definition, lookup)?;
    decoder.finish(definition.name())?;
    Ok(value)
}

// =============================================================================
// Field Codec
// =============================================================================

fn encode_scalar(full_variant: bool, value: &Variant, encoder: &mut BinaryEncoder) {
    if full_variant {
        value.encode(encoder);
    } else {
        value.encode_body(encoder);
    }
}

fn encode_field(field: &FieldDescriptor, value: &FieldValue, encoder: &mut BinaryEncoder) {
    let full_variant = field.field_type == FieldType::BuiltIn(BuiltInType::Variant);
    match value {
        FieldValue::Absent => {}
        FieldValue::Scalar(v) => encode_scalar(full_variant, v, encoder),
        FieldValue::Array(values) => {
            encoder.write_array(values.as_deref(), |enc, v| encode_scalar(full_variant, v, enc))
        }
        FieldValue::Structure(v) => v.encode(encoder),
        FieldValue::StructureArray(values) => {
            encoder.write_array(values.as_deref(), |enc, v| v.encode(enc))
        }
    }
}

fn decode_field(
    field: &FieldDescriptor,
    decoder: &mut BinaryDecoder<'_>,
    lookup: &dyn DataTypeLookup,
) -> CodecResult<FieldValue> {
    match &field.field_type {
        FieldType::BuiltIn(BuiltInType::Null) => Err(CodecError::type_mismatch(
            format!("{}: encodable type", field.name),
            "Null",
        )),
        FieldType::BuiltIn(ty) => {
            let ty = *ty;
            if field.is_array() {
                let values = decoder.read_array("structure field", |d| Variant::decode_body(ty, d))?;
                Ok(FieldValue::Array(values))
            } else {
                Ok(FieldValue::Scalar(Variant::decode_body(ty, decoder)?))
            }
        }
        FieldType::Structured(data_type_id) => {
            let definition = lookup.lookup_data_type(data_type_id).ok_or_else(|| {
                CodecError::UnknownDataType {
                    type_id: data_type_id.to_string(),
                }
            })?;
            if field.is_array() {
                let values = decoder.read_array("structure field", |d| {
                    GenericValue::decode(d, &definition, lookup)
                })?;
                Ok(FieldValue::StructureArray(values))
            } else {
                let value = GenericValue::decode(decoder, &definition, lookup)?;
                Ok(FieldValue::Structure(Box::new(value)))
            }
        }
    }
}

// =============================================================================
// Nested Decoding
// =============================================================================

/// Replaces every raw extension object body with a known encoding by its
/// decoded form, recursively.
///
/// Bodies with no definition in `lookup` stay raw. On a decode failure the
/// offending body stays raw with its `data_type_id` filled in and the error
/// is returned.
pub fn decode_nested(value: &mut Variant, lookup: &dyn DataTypeLookup) -> CodecResult<()> {
    match value {
        Variant::ExtensionObject(obj) => decode_extension_object(obj, lookup),
        Variant::DataValue(dv) => match dv.value.as_mut() {
            Some(inner) => decode_nested(inner, lookup),
            None => Ok(()),
        },
        Variant::Array(array) => {
            for element in array.values.iter_mut().flatten() {
                decode_nested(element, lookup)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn decode_extension_object(
    obj: &mut ExtensionObject,
    lookup: &dyn DataTypeLookup,
) -> CodecResult<()> {
    let outcome = match &obj.body {
        ExtensionObjectBody::Raw { bytes, .. } => lookup
            .lookup_encoding(&obj.type_id)
            .map(|def| (def.data_type_id().clone(), decode_generic(bytes.as_bytes(), &def, lookup))),
        _ => None,
    };
    match outcome {
        Some((_, Ok(decoded))) => obj.body = ExtensionObjectBody::Decoded(decoded),
        Some((id, Err(err))) => {
            if let ExtensionObjectBody::Raw { data_type_id, .. } = &mut obj.body {
                *data_type_id = Some(id);
            }
            return Err(err);
        }
        None => {}
    }
    if let ExtensionObjectBody::Decoded(decoded) = &mut obj.body {
        decode_generic_fields(decoded, lookup)?;
    }
    Ok(())
}

fn decode_generic_fields(value: &mut GenericValue, lookup: &dyn DataTypeLookup) -> CodecResult<()> {
    for field in value.values_mut() {
        match field {
            FieldValue::Scalar(v) => decode_nested(v, lookup)?,
            FieldValue::Array(Some(values)) => {
                for v in values {
                    decode_nested(v, lookup)?;
                }
            }
            FieldValue::Structure(nested) => decode_generic_fields(nested, lookup)?,
            FieldValue::StructureArray(Some(values)) => {
                for nested in values {
                    decode_generic_fields(nested, lookup)?;
                }
            }
            _ => {}
        }
    }
    Ok(())
}

/// Collects the encoding ids of every raw extension object body in `value`.
pub fn raw_encoding_ids(value: &Variant, out: &mut Vec<NodeId>) {
    match value {
        Variant::ExtensionObject(obj) => match &obj.body {
            ExtensionObjectBody::Raw { .. } if !obj.type_id.is_null() => {
                if !out.contains(&obj.type_id) {
                    out.push(obj.type_id.clone());
                }
            }
            ExtensionObjectBody::Decoded(decoded) => generic_raw_encoding_ids(decoded, out),
            _ => {}
        },
        Variant::DataValue(dv) => {
            if let Some(inner) = &dv.value {
                raw_encoding_ids(inner, out);
            }
        }
        Variant::Array(array) => {
            for element in array.values.iter().flatten() {
                raw_encoding_ids(element, out);
            }
        }
        _ => {}
    }
}

fn generic_raw_encoding_ids(value: &GenericValue, out: &mut Vec<NodeId>) {
    for field in value.values() {
        match field {
            FieldValue::Scalar(v) => raw_encoding_ids(v, out),
            FieldValue::Array(Some(values)) => {
                for v in values {
                    raw_encoding_ids(v, out);
                }
            }
            FieldValue::Structure(nested) => generic_raw_encoding_ids(nested, out),
            FieldValue::StructureArray(Some(values)) => {
                for nested in values {
                    generic_raw_encoding_ids(nested, out);
                }
            }
            _ => {}
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LocalizedText;
    use pretty_assertions::assert_eq;

    fn point() -> Arc<StructureDefinition> {
        Arc::new(StructureDefinition {
            data_type_id: NodeId::numeric(2, 3001),
            encoding_id: NodeId::numeric(2, 5001),
            name: "Point".into(),
            fields: vec![
                FieldDescriptor::scalar("X", BuiltInType::Double),
                FieldDescriptor::scalar("Y", BuiltInType::Double),
            ],
        })
    }

    fn labelled() -> Arc<StructureDefinition> {
        Arc::new(StructureDefinition {
            data_type_id: NodeId::numeric(2, 3002),
            encoding_id: NodeId::numeric(2, 5002),
            name: "Labelled".into(),
            fields: vec![
                FieldDescriptor::scalar("Label", BuiltInType::String).into_optional(),
                FieldDescriptor::structured("Points", NodeId::numeric(2, 3001)).into_array(),
                FieldDescriptor::scalar("Note", BuiltInType::LocalizedText).into_optional(),
            ],
        })
    }

    fn choice() -> Arc<UnionDefinition> {
        Arc::new(UnionDefinition {
            data_type_id: NodeId::numeric(2, 3003),
            encoding_id: NodeId::numeric(2, 5003),
            name: "Choice".into(),
            fields: vec![
                FieldDescriptor::scalar("Number", BuiltInType::Int32).with_switch_value(1),
                FieldDescriptor::scalar("Text", BuiltInType::String).with_switch_value(2),
            ],
        })
    }

    fn lookup() -> DefinitionSet {
        let mut set = DefinitionSet::new();
        set.insert(DataTypeDefinition::Structure(point()));
        set.insert(DataTypeDefinition::Structure(labelled()));
        set.insert(DataTypeDefinition::Union(choice()));
        set
    }

    fn point_value(x: f64, y: f64) -> GenericValue {
        let fields = IndexMap::from([
            ("X".to_string(), FieldValue::Scalar(x.into())),
            ("Y".to_string(), FieldValue::Scalar(y.into())),
        ]);
        GenericValue::Structure(GenericStructureValue::new(point(), fields).unwrap())
    }

    #[test]
    fn test_structure_round_trip() {
        let value = point_value(1.0, -2.5);
        let bytes = value.to_bytes();
        assert_eq!(bytes.len(), 16);
        let decoded = decode_generic(&bytes, &DataTypeDefinition::Structure(point()), &lookup())
            .unwrap();
        assert_eq!(decoded, value);
        assert_eq!(decoded.field("Y").unwrap().as_scalar(), Some(&Variant::Double(-2.5)));
        assert!(matches!(decoded.field("Z"), Err(CodecError::FieldNotFound { .. })));
    }

    #[test]
    fn test_optional_fields_all_absent() {
        let fields = IndexMap::from([(
            "Points".to_string(),
            FieldValue::StructureArray(Some(vec![])),
        )]);
        let value = GenericValue::Structure(GenericStructureValue::new(labelled(), fields).unwrap());
        let bytes = value.to_bytes();
        // mask(4) + empty array count(4)
        assert_eq!(&bytes[..], &[0, 0, 0, 0, 0, 0, 0, 0]);

        let decoded =
            decode_generic(&bytes, &DataTypeDefinition::Structure(labelled()), &lookup()).unwrap();
        assert!(decoded.field("Label").unwrap().is_absent());
        assert!(decoded.field("Note").unwrap().is_absent());
        assert_eq!(decoded.to_bytes(), bytes);
    }

    #[test]
    fn test_optional_mask_bits_follow_declaration_order() {
        let fields = IndexMap::from([
            ("Note".to_string(), FieldValue::Scalar(LocalizedText::text("n").into())),
            (
                "Points".to_string(),
                FieldValue::StructureArray(Some(vec![point_value(0.0, 1.0)])),
            ),
        ]);
        let value = GenericValue::Structure(GenericStructureValue::new(labelled(), fields).unwrap());
        let bytes = value.to_bytes();
        assert_eq!(&bytes[..4], &[0b10, 0, 0, 0]);

        let decoded =
            decode_generic(&bytes, &DataTypeDefinition::Structure(labelled()), &lookup()).unwrap();
        assert_eq!(decoded, value);
        let names: Vec<_> = decoded.as_structure().unwrap().fields().map(|(n, _)| n).collect();
        assert_eq!(names, ["Label", "Points", "Note"]);
    }

    #[test]
    fn test_constructor_rejects_bad_fields() {
        let missing = IndexMap::from([("X".to_string(), FieldValue::Scalar(1.0f64.into()))]);
        assert!(matches!(
            GenericStructureValue::new(point(), missing),
            Err(CodecError::TypeMismatch { .. })
        ));

        let wrong_type = IndexMap::from([
            ("X".to_string(), FieldValue::Scalar(1i32.into())),
            ("Y".to_string(), FieldValue::Scalar(1.0f64.into())),
        ]);
        assert!(GenericStructureValue::new(point(), wrong_type).is_err());

        let extra = IndexMap::from([("W".to_string(), FieldValue::Absent)]);
        assert!(matches!(
            GenericStructureValue::new(point(), extra),
            Err(CodecError::FieldNotFound { .. })
        ));
    }

    #[test]
    fn test_union_switch() {
        let def = DataTypeDefinition::Union(choice());
        let text = GenericValue::Union(
            GenericUnionValue::new(choice(), "Text", FieldValue::Scalar(Variant::string("hi")))
                .unwrap(),
        );
        let bytes = text.to_bytes();
        assert_eq!(&bytes[..4], &[2, 0, 0, 0]);
        let decoded = decode_generic(&bytes, &def, &lookup()).unwrap();
        assert_eq!(decoded, text);
        assert!(decoded.field("Number").unwrap().is_absent());

        let null = decode_generic(&[0, 0, 0, 0], &def, &lookup()).unwrap();
        assert_eq!(null.as_union().unwrap().selected(), None);

        assert!(matches!(
            decode_generic(&[9, 0, 0, 0], &def, &lookup()),
            Err(CodecError::InvalidSwitch { switch_value: 9, .. })
        ));
    }

    #[test]
    fn test_unknown_nested_type() {
        let empty = DefinitionSet::new();
        let bytes = [0, 0, 0, 0, 1, 0, 0, 0];
        assert!(matches!(
            decode_generic(&bytes, &DataTypeDefinition::Structure(labelled()), &empty),
            Err(CodecError::UnknownDataType { .. })
        ));
    }

    #[test]
    fn test_decode_nested_arrays() {
        let raw = ExtensionObject::from_raw(
            point().encoding_id.clone(),
            point_value(3.0, 4.0).to_bytes().to_vec(),
        );
        let unknown = ExtensionObject::from_raw(NodeId::numeric(2, 9999), vec![1]);
        let mut value = Variant::array(
            BuiltInType::ExtensionObject,
            vec![raw.into(), unknown.into()],
        )
        .unwrap();

        let mut ids = Vec::new();
        raw_encoding_ids(&value, &mut ids);
        assert_eq!(ids, vec![NodeId::numeric(2, 5001), NodeId::numeric(2, 9999)]);

        decode_nested(&mut value, &lookup()).unwrap();
        let elements = value.as_array().unwrap();
        let first = elements[0].as_extension_object().unwrap();
        assert_eq!(first.decoded(), Some(&point_value(3.0, 4.0)));
        assert!(elements[1].as_extension_object().unwrap().raw_bytes().is_some());
    }

    #[test]
    fn test_decode_failure_keeps_raw() {
        let mut value: Variant =
            ExtensionObject::from_raw(point().encoding_id.clone(), vec![0; 3]).into();
        assert!(decode_nested(&mut value, &lookup()).is_err());
        match &value.as_extension_object().unwrap().body {
            ExtensionObjectBody::Raw { data_type_id, bytes } => {
                assert_eq!(data_type_id.as_ref(), Some(&point().data_type_id));
                assert_eq!(bytes.len(), 3);
            }
            other => panic!("unexpected body {:?}", other),
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(point_value(1.0, 2.0).to_string(), "Point { X: 1, Y: 2 }");
    }
}
