// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Typed view of the standard `Argument` structure.
//!
//! Method nodes publish `InputArguments` and `OutputArguments` as arrays of
//! `Argument` extension objects.

use std::fmt;

use crate::codec::{
    decode_generic, DefinitionSet, ExtensionObject, ExtensionObjectBody, FieldValue,
    GenericStructureValue, GenericValue, Variant,
};
use crate::dictionary::{standard, DataTypeDefinition};
use crate::error::{CodecError, CodecResult};
use crate::types::ids::data_types;
use crate::types::{LocalizedText, NodeId};

/// One method argument.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Argument {
    /// Argument name.
    pub name: String,
    /// Data type node.
    pub data_type: NodeId,
    /// -1 scalar, 0 one or more dimensions, n exactly n dimensions.
    pub value_rank: i32,
    /// Length of each dimension; `None` when not specified.
    pub array_dimensions: Option<Vec<u32>>,
    /// Description.
    pub description: LocalizedText,
}

impl Argument {
    /// Converts every element of an `Argument` array value.
    pub fn from_variant(value: &Variant) -> CodecResult<Vec<Argument>> {
        match value {
            Variant::Array(_) => value
                .as_array()
                .unwrap_or_default()
                .iter()
                .map(|element| {
                    element
                        .as_extension_object()
                        .ok_or_else(|| {
                            CodecError::type_mismatch("ExtensionObject", element.built_in_type().to_string())
                        })
                        .and_then(Argument::try_from)
                })
                .collect(),
            Variant::ExtensionObject(obj) => Ok(vec![Argument::try_from(obj.as_ref())?]),
            other => Err(CodecError::type_mismatch(
                "Argument array",
                other.built_in_type().to_string(),
            )),
        }
    }
}

impl TryFrom<&GenericStructureValue> for Argument {
    type Error = CodecError;

    fn try_from(value: &GenericStructureValue) -> CodecResult<Self> {
        let scalar = |name: &str| -> CodecResult<Option<Variant>> {
            Ok(value.field(name)?.as_scalar().cloned())
        };

        let name = match scalar("Name")? {
            Some(Variant::String(s)) => s.as_str().to_string(),
            _ => String::new(),
        };
        let data_type = match scalar("DataType")? {
            Some(Variant::NodeId(id)) => *id,
            _ => NodeId::null(),
        };
        let value_rank = match scalar("ValueRank")? {
            Some(Variant::Int32(rank)) => rank,
            other => {
                return Err(CodecError::type_mismatch(
                    "Int32 ValueRank",
                    format!("{:?}", other),
                ))
            }
        };
        let array_dimensions = match value.field("ArrayDimensions")? {
            FieldValue::Array(values) => values.as_ref().map(|values| {
                values
                    .iter()
                    .filter_map(|v| match v {
                        Variant::UInt32(n) => Some(*n),
                        _ => None,
                    })
                    .collect()
            }),
            _ => None,
        };
        let description = match scalar("Description")? {
            Some(Variant::LocalizedText(text)) => *text,
            _ => LocalizedText::default(),
        };

        Ok(Self {
            name,
            data_type,
            value_rank,
            array_dimensions,
            description,
        })
    }
}

impl TryFrom<&ExtensionObject> for Argument {
    type Error = CodecError;

    fn try_from(obj: &ExtensionObject) -> CodecResult<Self> {
        match &obj.body {
            ExtensionObjectBody::Decoded(GenericValue::Structure(value)) => Self::try_from(value),
            ExtensionObjectBody::Raw { bytes, .. } if obj.type_id == data_types::ARGUMENT_ENCODING => {
                let definition: DataTypeDefinition = standard::argument().into();
                let decoded = decode_generic(bytes.as_bytes(), &definition, &DefinitionSet::new())?;
                match decoded.as_structure() {
                    Some(value) => Self::try_from(value),
                    None => Err(CodecError::type_mismatch("Argument", decoded.name())),
                }
            }
            _ => Err(CodecError::UnknownDataType {
                type_id: obj.type_id.to_string(),
            }),
        }
    }
}

impl fmt::Display for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.data_type)?;
        match self.value_rank {
            -1 => {}
            0 => f.write_str("[...]")?,
            rank => match &self.array_dimensions {
                Some(dims) if !dims.is_empty() => {
                    let dims: Vec<String> = dims.iter().map(u32::to_string).collect();
                    write!(f, "[{}]", dims.join(", "))?;
                }
                _ => write!(f, "[rank {}]", rank)?,
            },
        }
        if !self.description.text.as_str().is_empty() {
            write!(f, " ({})", self.description.text)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{BinaryEncoder, BuiltInType};
    use crate::types::ids::data_types as ids;

    fn encode_argument(name: &str, value_rank: i32, dims: Option<&[u32]>) -> ExtensionObject {
        let mut encoder = BinaryEncoder::new();
        encoder.write_str(name);
        encoder.write(&NodeId::numeric(0, 11));
        encoder.write_i32(value_rank);
        match dims {
            Some(dims) => {
                encoder.write_i32(dims.len() as i32);
                for d in dims {
                    encoder.write_u32(*d);
                }
            }
            None => encoder.write_i32(-1),
        }
        encoder.write(&LocalizedText::text(format!("{} vector", name)));
        ExtensionObject::from_raw(ids::ARGUMENT_ENCODING, encoder.into_bytes().to_vec())
    }

    #[test]
    fn test_argument_from_raw_body() {
        let arg = Argument::try_from(&encode_argument("a", 1, Some(&[3]))).unwrap();
        assert_eq!(arg.name, "a");
        assert_eq!(arg.data_type, NodeId::numeric(0, 11));
        assert_eq!(arg.value_rank, 1);
        assert_eq!(arg.array_dimensions, Some(vec![3]));
        assert_eq!(arg.to_string(), "a: i=11[3] (a vector)");
    }

    #[test]
    fn test_arguments_from_array() {
        let array = Variant::array(
            BuiltInType::ExtensionObject,
            vec![
                Variant::ExtensionObject(Box::new(encode_argument("a", 1, Some(&[3])))),
                Variant::ExtensionObject(Box::new(encode_argument("b", -1, None))),
            ],
        )
        .unwrap();
        let args = Argument::from_variant(&array).unwrap();
        assert_eq!(args.len(), 2);
        assert_eq!(args[1].array_dimensions, None);
        assert_eq!(args[1].to_string(), "b: i=11 (b vector)");
    }

    #[test]
    fn test_unknown_encoding_rejected() {
        let obj = ExtensionObject::from_raw(NodeId::numeric(2, 5000), vec![1, 2, 3]);
        assert!(matches!(
            Argument::try_from(&obj),
            Err(CodecError::UnknownDataType { .. })
        ));
    }
}
