// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC binary schema (`opc:TypeDictionary`) parsing.
//!
//! # Field Rules
//!
//! - `opc:Bit` fields are masks and are dropped
//! - a field whose `SwitchField` names a bit field is optional
//! - a field with a `LengthField` is an array; the `NoOf` count field is dropped
//! - a type whose fields switch on a non-bit field is a union; the switch
//!   field itself is dropped
//! - enumerations encode as `Int32`

use std::collections::{HashMap, HashSet};

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::codec::BuiltInType;
use crate::error::DictionaryError;
use crate::types::NodeId;

use super::definition::{
    DataTypeDefinition, FieldDescriptor, FieldType, StructureDefinition, UnionDefinition,
    MAX_OPTIONAL_FIELDS,
};

/// Namespace of the OPC binary schema primitives.
pub const OPC_BINARY_NAMESPACE: &str = "http://opcfoundation.org/BinarySchema/";

/// Namespace of the standard OPC UA types.
pub const UA_NAMESPACE: &str = "http://opcfoundation.org/UA/";

/// A type name qualified by its namespace URI.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeName {
    /// Namespace URI.
    pub namespace: String,
    /// Local name.
    pub name: String,
}

impl TypeName {
    /// Creates a type name.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

/// Node ids assigned to a dictionary type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeIds {
    /// Data type node.
    pub data_type_id: NodeId,
    /// Default binary encoding node.
    pub encoding_id: NodeId,
}

/// A field after the schema rules have been applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaField {
    /// Field name.
    pub name: String,
    /// Declared type.
    pub type_name: TypeName,
    /// Has a length field.
    pub is_array: bool,
    /// Guarded by a bit field.
    pub is_optional: bool,
    /// Union switch value.
    pub switch_value: Option<u32>,
}

/// A structured type after the schema rules have been applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaType {
    /// Type name.
    pub name: String,
    /// Decoded as a union.
    pub is_union: bool,
    /// Encoded fields in order.
    pub fields: Vec<SchemaField>,
}

/// A parsed type dictionary.
#[derive(Debug, Clone, Default)]
pub struct BinarySchema {
    /// Target namespace URI.
    pub target_namespace: String,
    /// Structured types in document order.
    pub types: Vec<SchemaType>,
    enumerations: HashSet<String>,
    opaque_types: HashSet<String>,
}

#[derive(Debug, Default)]
struct RawField {
    name: String,
    type_name: String,
    length_field: Option<String>,
    switch_field: Option<String>,
    switch_value: Option<u32>,
}

#[derive(Debug, Default)]
struct RawType {
    name: String,
    base_type: Option<String>,
    fields: Vec<RawField>,
}

#[derive(Default)]
struct Parser {
    prefixes: HashMap<String, String>,
    target_namespace: Option<String>,
    types: Vec<RawType>,
    current: Option<RawType>,
    enumerations: HashSet<String>,
    opaque_types: HashSet<String>,
}

impl BinarySchema {
    /// Parses dictionary XML. `dictionary` names the source in errors.
    pub fn parse(dictionary: &str, xml: &str) -> Result<Self, DictionaryError> {
        let fail = |message: String| DictionaryError::SchemaParse {
            dictionary: dictionary.to_string(),
            message,
        };

        let mut reader = Reader::from_str(xml.trim_start_matches('\u{feff}'));
        reader.trim_text(true);
        let mut parser = Parser::default();

        loop {
            let event = reader
                .read_event()
                .map_err(|e| fail(format!("at byte {}: {}", reader.buffer_position(), e)))?;
            match event {
                Event::Start(start) => parser.open(&start, false).map_err(fail)?,
                Event::Empty(start) => parser.open(&start, true).map_err(fail)?,
                Event::End(end) => {
                    if end.local_name().as_ref() == b"StructuredType" {
                        parser.close_type();
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        parser.finish().map_err(fail)
    }

    /// Returns `true` if `name` is an enumeration of this dictionary.
    pub fn is_enumeration(&self, name: &str) -> bool {
        self.enumerations.contains(name)
    }

    /// Enumeration names.
    pub fn enumerations(&self) -> impl Iterator<Item = &str> {
        self.enumerations.iter().map(String::as_str)
    }

    /// Builds definitions for every type that has ids.
    ///
    /// `external` resolves types of other namespaces (cross-dictionary and
    /// non-primitive `ua:` types).
    pub fn build_definitions(
        &self,
        ids: &HashMap<String, TypeIds>,
        external: &dyn Fn(&TypeName) -> Option<(NodeId, FieldType)>,
    ) -> Result<Vec<DataTypeDefinition>, DictionaryError> {
        let mut definitions = Vec::with_capacity(self.types.len());
        for ty in &self.types {
            let Some(type_ids) = ids.get(&ty.name) else {
                continue;
            };
            let fields: Vec<FieldDescriptor> = ty
                .fields
                .iter()
                .map(|field| {
                    let (data_type, field_type) = self.resolve(&field.type_name, ids, external);
                    FieldDescriptor {
                        name: field.name.clone(),
                        data_type,
                        field_type,
                        value_rank: if field.is_array { 1 } else { -1 },
                        is_optional: field.is_optional,
                        switch_value: field.switch_value,
                    }
                })
                .collect();
            let definition = if ty.is_union {
                DataTypeDefinition::from(UnionDefinition {
                    data_type_id: type_ids.data_type_id.clone(),
                    encoding_id: type_ids.encoding_id.clone(),
                    name: ty.name.clone(),
                    fields,
                })
            } else {
                let structure = StructureDefinition {
                    data_type_id: type_ids.data_type_id.clone(),
                    encoding_id: type_ids.encoding_id.clone(),
                    name: ty.name.clone(),
                    fields,
                };
                let count = structure.optional_field_count();
                if count > MAX_OPTIONAL_FIELDS {
                    return Err(DictionaryError::TooManyOptionalFields {
                        data_type: ty.name.clone(),
                        count,
                        limit: MAX_OPTIONAL_FIELDS,
                    });
                }
                DataTypeDefinition::from(structure)
            };
            definitions.push(definition);
        }
        Ok(definitions)
    }

    fn resolve(
        &self,
        ty: &TypeName,
        ids: &HashMap<String, TypeIds>,
        external: &dyn Fn(&TypeName) -> Option<(NodeId, FieldType)>,
    ) -> (NodeId, FieldType) {
        let built_in = |b: BuiltInType| (b.data_type_id(), FieldType::BuiltIn(b));

        if ty.namespace == OPC_BINARY_NAMESPACE {
            let b = match ty.name.as_str() {
                "Char" => BuiltInType::Byte,
                name => BuiltInType::from_schema_name(name).unwrap_or(BuiltInType::ByteString),
            };
            return built_in(b);
        }
        if ty.namespace == self.target_namespace {
            if self.enumerations.contains(&ty.name) {
                return built_in(BuiltInType::Int32);
            }
            if self.opaque_types.contains(&ty.name) {
                return built_in(BuiltInType::ByteString);
            }
            if let Some(type_ids) = ids.get(&ty.name) {
                return (
                    type_ids.data_type_id.clone(),
                    FieldType::Structured(type_ids.data_type_id.clone()),
                );
            }
        }
        if ty.namespace == UA_NAMESPACE {
            if let Some(b) = ua_alias(&ty.name).or_else(|| BuiltInType::from_schema_name(&ty.name)) {
                return built_in(b);
            }
        }
        external(ty).unwrap_or_else(|| {
            let id = NodeId::string(0, format!("{}#{}", ty.namespace, ty.name));
            (id.clone(), FieldType::Structured(id))
        })
    }
}

/// Standard simple types and enumerations that encode as a built-in type.
fn ua_alias(name: &str) -> Option<BuiltInType> {
    Some(match name {
        "Duration" => BuiltInType::Double,
        "UtcTime" | "Date" => BuiltInType::DateTime,
        "LocaleId" | "NumericRange" | "Time" => BuiltInType::String,
        "Counter" | "IntegerId" | "Index" | "VersionTime" => BuiltInType::UInt32,
        "ApplicationInstanceCertificate" | "ContinuationPoint" => BuiltInType::ByteString,
        "BaseDataType" => BuiltInType::Variant,
        "Enumeration" | "NodeClass" | "MessageSecurityMode" | "ApplicationType"
        | "BrowseDirection" | "TimestampsToReturn" | "ServerState" | "NamingRuleType"
        | "IdType" | "StructureType" | "UserTokenType" | "AxisScaleEnumeration" => {
            BuiltInType::Int32
        }
        _ => return None,
    })
}

// =============================================================================
// Parser
// =============================================================================

fn attributes(start: &BytesStart<'_>) -> Result<Vec<(String, String)>, String> {
    let mut out = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| e.to_string())?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value().map_err(|e| e.to_string())?.into_owned();
        out.push((key, value));
    }
    Ok(out)
}

fn attribute(attrs: &[(String, String)], name: &str) -> Option<String> {
    attrs
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.clone())
}

impl Parser {
    fn open(&mut self, start: &BytesStart<'_>, empty: bool) -> Result<(), String> {
        match start.local_name().as_ref() {
            b"TypeDictionary" => {
                for (key, value) in attributes(start)? {
                    if key == "TargetNamespace" {
                        self.target_namespace = Some(value);
                    } else if key == "xmlns" {
                        self.prefixes.insert(String::new(), value);
                    } else if let Some(prefix) = key.strip_prefix("xmlns:") {
                        self.prefixes.insert(prefix.to_string(), value);
                    }
                }
            }
            b"StructuredType" => {
                let attrs = attributes(start)?;
                let name = attribute(&attrs, "Name")
                    .ok_or_else(|| "StructuredType without Name".to_string())?;
                self.current = Some(RawType {
                    name,
                    base_type: attribute(&attrs, "BaseType"),
                    fields: Vec::new(),
                });
                if empty {
                    self.close_type();
                }
            }
            b"Field" => {
                let attrs = attributes(start)?;
                let Some(current) = self.current.as_mut() else {
                    return Ok(());
                };
                let name = attribute(&attrs, "Name")
                    .ok_or_else(|| format!("field without Name in {}", current.name))?;
                let switch_value = attribute(&attrs, "SwitchValue")
                    .map(|v| {
                        v.trim()
                            .parse::<u32>()
                            .map_err(|_| format!("invalid SwitchValue '{}' on {}", v, name))
                    })
                    .transpose()?;
                current.fields.push(RawField {
                    type_name: attribute(&attrs, "TypeName")
                        .ok_or_else(|| format!("field {} without TypeName", name))?,
                    name,
                    length_field: attribute(&attrs, "LengthField"),
                    switch_field: attribute(&attrs, "SwitchField"),
                    switch_value,
                });
            }
            b"EnumeratedType" => {
                if let Some(name) = attribute(&attributes(start)?, "Name") {
                    self.enumerations.insert(name);
                }
            }
            b"OpaqueType" => {
                if let Some(name) = attribute(&attributes(start)?, "Name") {
                    self.opaque_types.insert(name);
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn close_type(&mut self) {
        if let Some(ty) = self.current.take() {
            self.types.push(ty);
        }
    }

    fn qualify(&self, qualified: &str) -> TypeName {
        let (prefix, local) = qualified.split_once(':').unwrap_or(("", qualified));
        let namespace = match self.prefixes.get(prefix) {
            Some(uri) => uri.clone(),
            None if prefix.is_empty() => self.target_namespace.clone().unwrap_or_default(),
            None => prefix.to_string(),
        };
        TypeName::new(namespace, local)
    }

    fn finish(self) -> Result<BinarySchema, String> {
        let target_namespace = self
            .target_namespace
            .clone()
            .ok_or_else(|| "missing TargetNamespace".to_string())?;
        let types = self.types.iter().map(|raw| self.convert(raw)).collect();
        Ok(BinarySchema {
            target_namespace,
            types,
            enumerations: self.enumerations,
            opaque_types: self.opaque_types,
        })
    }

    fn convert(&self, raw: &RawType) -> SchemaType {
        let is_bit = |f: &RawField| {
            let ty = self.qualify(&f.type_name);
            ty.namespace == OPC_BINARY_NAMESPACE && ty.name == "Bit"
        };
        let bit_fields: HashSet<&str> = raw
            .fields
            .iter()
            .filter(|f| is_bit(f))
            .map(|f| f.name.as_str())
            .collect();
        let length_fields: HashSet<&str> = raw
            .fields
            .iter()
            .filter_map(|f| f.length_field.as_deref())
            .collect();
        let union_switches: HashSet<&str> = raw
            .fields
            .iter()
            .filter(|f| f.switch_value.is_some())
            .filter_map(|f| f.switch_field.as_deref())
            .filter(|s| !bit_fields.contains(s))
            .collect();
        let union_base = raw
            .base_type
            .as_deref()
            .map(|b| self.qualify(b).name == "Union")
            .unwrap_or(false);
        let is_union = union_base || !union_switches.is_empty();

        let fields = raw
            .fields
            .iter()
            .filter(|f| !bit_fields.contains(f.name.as_str()))
            .filter(|f| !length_fields.contains(f.name.as_str()))
            .filter(|f| !(is_union && union_switches.contains(f.name.as_str())))
            .filter(|f| !(is_union && f.name == "SwitchField"))
            .map(|f| SchemaField {
                name: f.name.clone(),
                type_name: self.qualify(&f.type_name),
                is_array: f.length_field.is_some(),
                is_optional: !is_union
                    && f
                        .switch_field
                        .as_deref()
                        .is_some_and(|s| bit_fields.contains(s)),
                switch_value: if is_union { f.switch_value } else { None },
            })
            .collect();

        SchemaType {
            name: raw.name.clone(),
            is_union,
            fields,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const DEMO: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<opc:TypeDictionary xmlns:opc="http://opcfoundation.org/BinarySchema/"
    xmlns:ua="http://opcfoundation.org/UA/"
    xmlns:tns="urn:demo:types"
    DefaultByteOrder="LittleEndian" TargetNamespace="urn:demo:types">
  <opc:Import Namespace="http://opcfoundation.org/UA/"/>
  <opc:EnumeratedType Name="Mode" LengthInBits="32">
    <opc:EnumeratedValue Name="Off" Value="0"/>
  </opc:EnumeratedType>
  <opc:StructuredType Name="Vector" BaseType="ua:ExtensionObject">
    <opc:Field Name="X" TypeName="opc:Double"/>
    <opc:Field Name="Y" TypeName="opc:Double"/>
    <opc:Field Name="Z" TypeName="opc:Double"/>
  </opc:StructuredType>
  <opc:StructuredType Name="Sample" BaseType="ua:ExtensionObject">
    <opc:Field Name="CommentSpecified" TypeName="opc:Bit"/>
    <opc:Field Name="Reserved1" TypeName="opc:Bit" Length="31"/>
    <opc:Field Name="Mode" TypeName="tns:Mode"/>
    <opc:Field Name="NoOfPoints" TypeName="opc:Int32"/>
    <opc:Field Name="Points" TypeName="tns:Vector" LengthField="NoOfPoints"/>
    <opc:Field Name="Comment" TypeName="opc:CharArray" SwitchField="CommentSpecified"/>
    <opc:Field Name="Timeout" TypeName="ua:Duration"/>
  </opc:StructuredType>
  <opc:StructuredType Name="Choice" BaseType="ua:Union">
    <opc:Field Name="SwitchField" TypeName="opc:UInt32"/>
    <opc:Field Name="Number" TypeName="opc:Int32" SwitchField="SwitchField" SwitchValue="1"/>
    <opc:Field Name="Text" TypeName="opc:CharArray" SwitchField="SwitchField" SwitchValue="2"/>
  </opc:StructuredType>
</opc:TypeDictionary>"#;

    fn ids() -> HashMap<String, TypeIds> {
        ["Vector", "Sample", "Choice"]
            .iter()
            .enumerate()
            .map(|(i, name)| {
                (
                    name.to_string(),
                    TypeIds {
                        data_type_id: NodeId::numeric(2, 3000 + i as u32),
                        encoding_id: NodeId::numeric(2, 5000 + i as u32),
                    },
                )
            })
            .collect()
    }

    #[test]
    fn test_parse_demo_dictionary() {
        let schema = BinarySchema::parse("ns=2;i=1", DEMO).unwrap();
        assert_eq!(schema.target_namespace, "urn:demo:types");
        assert!(schema.is_enumeration("Mode"));
        assert_eq!(schema.types.len(), 3);

        let sample = &schema.types[1];
        let names: Vec<_> = sample.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["Mode", "Points", "Comment", "Timeout"]);
        assert!(sample.fields[1].is_array);
        assert!(sample.fields[2].is_optional);
        assert!(!sample.fields[0].is_optional);

        let choice = &schema.types[2];
        assert!(choice.is_union);
        assert_eq!(choice.fields.len(), 2);
        assert_eq!(choice.fields[1].switch_value, Some(2));
    }

    #[test]
    fn test_build_definitions() {
        let schema = BinarySchema::parse("ns=2;i=1", DEMO).unwrap();
        let defs = schema.build_definitions(&ids(), &|_| None).unwrap();
        assert_eq!(defs.len(), 3);

        let DataTypeDefinition::Structure(sample) = &defs[1] else {
            panic!("expected structure");
        };
        assert_eq!(sample.encoding_id, NodeId::numeric(2, 5001));
        assert_eq!(sample.fields[0].field_type, FieldType::BuiltIn(BuiltInType::Int32));
        assert_eq!(
            sample.fields[1].field_type,
            FieldType::Structured(NodeId::numeric(2, 3000))
        );
        assert_eq!(sample.fields[1].value_rank, 1);
        assert_eq!(sample.fields[2].field_type, FieldType::BuiltIn(BuiltInType::String));
        assert_eq!(sample.fields[3].field_type, FieldType::BuiltIn(BuiltInType::Double));

        assert!(matches!(defs[2], DataTypeDefinition::Union(_)));
    }

    #[test]
    fn test_external_types() {
        let xml = r#"<opc:TypeDictionary xmlns:opc="http://opcfoundation.org/BinarySchema/"
            xmlns:ua="http://opcfoundation.org/UA/" xmlns:other="urn:other"
            TargetNamespace="urn:mine">
          <opc:StructuredType Name="Holder">
            <opc:Field Name="Arg" TypeName="ua:Argument"/>
            <opc:Field Name="Foreign" TypeName="other:Thing"/>
          </opc:StructuredType>
        </opc:TypeDictionary>"#;
        let schema = BinarySchema::parse("d", xml).unwrap();
        let ids = HashMap::from([(
            "Holder".to_string(),
            TypeIds {
                data_type_id: NodeId::numeric(3, 1),
                encoding_id: NodeId::numeric(3, 2),
            },
        )]);
        let external = |ty: &TypeName| {
            (ty.name == "Argument").then(|| {
                (
                    NodeId::numeric(0, 296),
                    FieldType::Structured(NodeId::numeric(0, 296)),
                )
            })
        };
        let defs = schema.build_definitions(&ids, &external).unwrap();
        let fields = defs[0].fields();
        assert_eq!(fields[0].field_type, FieldType::Structured(NodeId::numeric(0, 296)));
        assert_eq!(
            fields[1].field_type,
            FieldType::Structured(NodeId::string(0, "urn:other#Thing"))
        );
    }

    fn optional_heavy(optionals: usize) -> String {
        let bits: String = (0..optionals)
            .map(|i| format!("<opc:Field Name=\"F{}Specified\" TypeName=\"opc:Bit\"/>", i))
            .collect();
        let fields: String = (0..optionals)
            .map(|i| {
                format!(
                    "<opc:Field Name=\"F{0}\" TypeName=\"opc:Int32\" SwitchField=\"F{0}Specified\"/>",
                    i
                )
            })
            .collect();
        format!(
            r#"<opc:TypeDictionary xmlns:opc="http://opcfoundation.org/BinarySchema/"
    xmlns:ua="http://opcfoundation.org/UA/" TargetNamespace="urn:demo:types">
  <opc:StructuredType Name="Big" BaseType="ua:ExtensionObject">{}{}</opc:StructuredType>
</opc:TypeDictionary>"#,
            bits, fields
        )
    }

    fn big_ids() -> HashMap<String, TypeIds> {
        HashMap::from([(
            "Big".to_string(),
            TypeIds {
                data_type_id: NodeId::numeric(2, 7000),
                encoding_id: NodeId::numeric(2, 7001),
            },
        )])
    }

    #[test]
    fn test_optional_field_limit() {
        let schema = BinarySchema::parse("d", &optional_heavy(MAX_OPTIONAL_FIELDS)).unwrap();
        let defs = schema.build_definitions(&big_ids(), &|_| None).unwrap();
        let DataTypeDefinition::Structure(big) = &defs[0] else {
            panic!("Big is a structure");
        };
        assert_eq!(big.optional_field_count(), MAX_OPTIONAL_FIELDS);

        let schema = BinarySchema::parse("d", &optional_heavy(MAX_OPTIONAL_FIELDS + 1)).unwrap();
        assert_eq!(
            schema.build_definitions(&big_ids(), &|_| None),
            Err(DictionaryError::TooManyOptionalFields {
                data_type: "Big".to_string(),
                count: 33,
                limit: 32,
            })
        );
    }

    #[test]
    fn test_rejects_malformed_xml() {
        assert!(matches!(
            BinarySchema::parse("d", "<opc:TypeDictionary><opc:StructuredType"),
            Err(DictionaryError::SchemaParse { .. })
        ));
        assert!(BinarySchema::parse("d", "<TypeDictionary/>").is_err());
    }

    #[test]
    fn test_byte_order_mark_is_skipped() {
        let xml = format!("\u{feff}{}", DEMO);
        assert!(BinarySchema::parse("d", &xml).is_ok());
    }
}
