// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Standard namespace 0 structures known without loading a dictionary.

use crate::codec::BuiltInType;
use crate::types::ids::data_types;

use super::definition::{DataTypeDefinition, FieldDescriptor, StructureDefinition};

/// `Argument`: describes one method argument.
pub fn argument() -> StructureDefinition {
    StructureDefinition {
        data_type_id: data_types::ARGUMENT,
        encoding_id: data_types::ARGUMENT_ENCODING,
        name: "Argument".into(),
        fields: vec![
            FieldDescriptor::scalar("Name", BuiltInType::String),
            FieldDescriptor::scalar("DataType", BuiltInType::NodeId),
            FieldDescriptor::scalar("ValueRank", BuiltInType::Int32),
            FieldDescriptor::scalar("ArrayDimensions", BuiltInType::UInt32).into_array(),
            FieldDescriptor::scalar("Description", BuiltInType::LocalizedText),
        ],
    }
}

/// `Range`: a low/high pair.
pub fn range() -> StructureDefinition {
    StructureDefinition {
        data_type_id: data_types::RANGE,
        encoding_id: data_types::RANGE_ENCODING,
        name: "Range".into(),
        fields: vec![
            FieldDescriptor::scalar("Low", BuiltInType::Double),
            FieldDescriptor::scalar("High", BuiltInType::Double),
        ],
    }
}

/// `EUInformation`: engineering unit description.
pub fn eu_information() -> StructureDefinition {
    StructureDefinition {
        data_type_id: data_types::EU_INFORMATION,
        encoding_id: data_types::EU_INFORMATION_ENCODING,
        name: "EUInformation".into(),
        fields: vec![
            FieldDescriptor::scalar("NamespaceUri", BuiltInType::String),
            FieldDescriptor::scalar("UnitId", BuiltInType::Int32),
            FieldDescriptor::scalar("DisplayName", BuiltInType::LocalizedText),
            FieldDescriptor::scalar("Description", BuiltInType::LocalizedText),
        ],
    }
}

/// All standard definitions.
pub fn all() -> Vec<DataTypeDefinition> {
    vec![argument().into(), range().into(), eu_information().into()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{decode_generic, BinaryEncoder, DefinitionSet, FieldValue, Variant};
    use crate::types::{LocalizedText, NodeId, UaString};

    #[test]
    fn test_argument_layout() {
        let mut enc = BinaryEncoder::new();
        enc.write_str("v1");
        enc.write(&NodeId::numeric(0, 10));
        enc.write_i32(1);
        enc.write_encodable_array(Some(&[3u32][..]));
        enc.write(&LocalizedText::new("en", "first vector"));

        let def: DataTypeDefinition = argument().into();
        let value = decode_generic(enc.as_slice(), &def, &DefinitionSet::new()).unwrap();
        assert_eq!(
            value.field("Name").unwrap().as_scalar(),
            Some(&Variant::String(UaString::from("v1")))
        );
        assert_eq!(
            value.field("ArrayDimensions").unwrap(),
            &FieldValue::Array(Some(vec![Variant::UInt32(3)]))
        );
    }

    #[test]
    fn test_ids_are_distinct() {
        let defs = all();
        assert_eq!(defs.len(), 3);
        for def in &defs {
            assert_ne!(def.data_type_id(), def.encoding_id());
        }
    }
}
