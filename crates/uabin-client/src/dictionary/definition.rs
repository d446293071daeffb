// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Structure and union definitions.

use std::fmt;
use std::sync::Arc;

use crate::codec::BuiltInType;
use crate::types::NodeId;

/// Optional fields one structure can carry; the encoding mask is a `UInt32`.
pub const MAX_OPTIONAL_FIELDS: usize = 32;

// =============================================================================
// FieldDescriptor
// =============================================================================

/// How a field is encoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// A built-in type.
    BuiltIn(BuiltInType),
    /// Another structure or union, by data type id.
    Structured(NodeId),
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BuiltIn(ty) => write!(f, "{}", ty),
            Self::Structured(id) => write!(f, "{}", id),
        }
    }
}

/// One field of a structure or union.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldDescriptor {
    /// Field name.
    pub name: String,
    /// Data type node of the field.
    pub data_type: NodeId,
    /// Encoding of the field.
    pub field_type: FieldType,
    /// `-1` for scalars, `1` or more for arrays.
    pub value_rank: i32,
    /// Present only when its bit in the encoding mask is set.
    pub is_optional: bool,
    /// Union switch value selecting this field.
    pub switch_value: Option<u32>,
}

impl FieldDescriptor {
    /// Creates a scalar field of a built-in type.
    pub fn scalar(name: impl Into<String>, ty: BuiltInType) -> Self {
        Self {
            name: name.into(),
            data_type: ty.data_type_id(),
            field_type: FieldType::BuiltIn(ty),
            value_rank: -1,
            is_optional: false,
            switch_value: None,
        }
    }

    /// Creates a scalar field of a structured type.
    pub fn structured(name: impl Into<String>, data_type: NodeId) -> Self {
        Self {
            name: name.into(),
            field_type: FieldType::Structured(data_type.clone()),
            data_type,
            value_rank: -1,
            is_optional: false,
            switch_value: None,
        }
    }

    /// Makes the field a one-dimensional array.
    pub fn into_array(mut self) -> Self {
        self.value_rank = 1;
        self
    }

    /// Marks the field optional.
    pub fn into_optional(mut self) -> Self {
        self.is_optional = true;
        self
    }

    /// Sets the union switch value.
    pub fn with_switch_value(mut self, switch_value: u32) -> Self {
        self.switch_value = Some(switch_value);
        self
    }

    /// Returns `true` for array fields.
    pub fn is_array(&self) -> bool {
        self.value_rank >= 1
    }
}

// =============================================================================
// StructureDefinition / UnionDefinition
// =============================================================================

/// Layout of a structured data type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructureDefinition {
    /// Data type node.
    pub data_type_id: NodeId,
    /// Default binary encoding node.
    pub encoding_id: NodeId,
    /// Type name.
    pub name: String,
    /// Fields in wire order.
    pub fields: Vec<FieldDescriptor>,
}

impl StructureDefinition {
    /// Returns `true` if the encoding starts with an optional-field mask.
    pub fn has_optional_fields(&self) -> bool {
        self.fields.iter().any(|f| f.is_optional)
    }

    /// Number of optional fields.
    pub fn optional_field_count(&self) -> usize {
        self.fields.iter().filter(|f| f.is_optional).count()
    }

    /// Looks up a field by name.
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Layout of a union data type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnionDefinition {
    /// Data type node.
    pub data_type_id: NodeId,
    /// Default binary encoding node.
    pub encoding_id: NodeId,
    /// Type name.
    pub name: String,
    /// Alternatives; each carries its switch value.
    pub fields: Vec<FieldDescriptor>,
}

impl UnionDefinition {
    /// Looks up a field by name.
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Finds the field selected by a switch value.
    pub fn field_for_switch(&self, switch_value: u32) -> Option<&FieldDescriptor> {
        self.fields
            .iter()
            .find(|f| f.switch_value == Some(switch_value))
    }
}

// =============================================================================
// DataTypeDefinition
// =============================================================================

/// A structure or union definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataTypeDefinition {
    /// A structure.
    Structure(Arc<StructureDefinition>),
    /// A union.
    Union(Arc<UnionDefinition>),
}

impl DataTypeDefinition {
    /// Data type node.
    pub fn data_type_id(&self) -> &NodeId {
        match self {
            Self::Structure(def) => &def.data_type_id,
            Self::Union(def) => &def.data_type_id,
        }
    }

    /// Binary encoding node.
    pub fn encoding_id(&self) -> &NodeId {
        match self {
            Self::Structure(def) => &def.encoding_id,
            Self::Union(def) => &def.encoding_id,
        }
    }

    /// Type name.
    pub fn name(&self) -> &str {
        match self {
            Self::Structure(def) => &def.name,
            Self::Union(def) => &def.name,
        }
    }

    /// Fields.
    pub fn fields(&self) -> &[FieldDescriptor] {
        match self {
            Self::Structure(def) => &def.fields,
            Self::Union(def) => &def.fields,
        }
    }

    /// Data types of structured fields.
    pub fn structured_dependencies(&self) -> impl Iterator<Item = &NodeId> {
        self.fields().iter().filter_map(|f| match &f.field_type {
            FieldType::Structured(id) => Some(id),
            FieldType::BuiltIn(_) => None,
        })
    }
}

impl From<StructureDefinition> for DataTypeDefinition {
    fn from(def: StructureDefinition) -> Self {
        Self::Structure(Arc::new(def))
    }
}

impl From<UnionDefinition> for DataTypeDefinition {
    fn from(def: UnionDefinition) -> Self {
        Self::Union(Arc::new(def))
    }
}
