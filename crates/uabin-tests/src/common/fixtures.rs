// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Test Fixtures
//!
//! The demo address space served by the mock server.
//!
//! ## Design Principles
//!
//! - Node ids and values are stable so suites can assert on them
//! - The layout follows the Unified Automation demo server: `Demo.Static`
//!   scalars, the `Demo.Method.VectorAdd` method, structured values
//! - Structured types come from a real OPC binary schema served under
//!   `OPCBinarySchema_TypeSystem`

use uabin_client::codec::{BinaryEncoder, BuiltInType, ExtensionObject, Variant};
use uabin_client::types::ids::{data_types, objects, reference_types};
use uabin_client::types::{
    Address, ByteString, ExpandedNodeId, LocalizedText, NodeId, NodeIdentifier, QualifiedName,
    UaString,
};

use super::mocks::{AddressSpace, NODE_CLASS_DATA_TYPE, NODE_CLASS_OBJECT};

/// Standard OPC UA namespace.
pub const UA_NS: &str = "http://opcfoundation.org/UA/";

/// Namespace of the mock server's own nodes.
pub const SERVER_NS: &str = "urn:uabin:mock-server:nodes";

/// Demo server namespace, index 2 on the mock.
pub const DEMO_NS: &str = "http://www.unifiedautomation.com/DemoServer/";

/// Namespace index of [`DEMO_NS`].
pub const DEMO_NS_INDEX: u16 = 2;

/// Value of `Demo.Static.Scalar.Double`.
pub const DEMO_DOUBLE: f64 = 3.25;

/// Value of `Demo.Static.Scalar.Int32`.
pub const DEMO_INT32: i32 = -7;

/// Value of `Demo.Static.Scalar.String`.
pub const DEMO_STRING: &str = "uabin demo";

/// Dictionary node below `OPCBinarySchema_TypeSystem`.
pub const DICTIONARY_NODE: NodeId = NodeId::numeric(DEMO_NS_INDEX, 6001);

/// Data type of `Vector`.
pub const VECTOR_TYPE: NodeId = NodeId::numeric(DEMO_NS_INDEX, 3001);
/// Data type of `Sample`.
pub const SAMPLE_TYPE: NodeId = NodeId::numeric(DEMO_NS_INDEX, 3002);
/// Data type of `Choice`.
pub const CHOICE_TYPE: NodeId = NodeId::numeric(DEMO_NS_INDEX, 3003);

/// Binary encoding of `Vector`.
pub const VECTOR_ENCODING: NodeId = NodeId::numeric(DEMO_NS_INDEX, 5001);
/// Binary encoding of `Sample`.
pub const SAMPLE_ENCODING: NodeId = NodeId::numeric(DEMO_NS_INDEX, 5002);
/// Binary encoding of `Choice`.
pub const CHOICE_ENCODING: NodeId = NodeId::numeric(DEMO_NS_INDEX, 5003);
/// An encoding no dictionary describes.
pub const OPAQUE_ENCODING: NodeId = NodeId::numeric(DEMO_NS_INDEX, 5999);

/// The demo type dictionary.
pub const DEMO_DICTIONARY: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<opc:TypeDictionary xmlns:opc="http://opcfoundation.org/BinarySchema/"
    xmlns:ua="http://opcfoundation.org/UA/"
    xmlns:tns="http://www.unifiedautomation.com/DemoServer/"
    DefaultByteOrder="LittleEndian" TargetNamespace="http://www.unifiedautomation.com/DemoServer/">
  <opc:Import Namespace="http://opcfoundation.org/UA/"/>
  <opc:EnumeratedType Name="Mode" LengthInBits="32">
    <opc:EnumeratedValue Name="Off" Value="0"/>
    <opc:EnumeratedValue Name="Auto" Value="1"/>
    <opc:EnumeratedValue Name="Manual" Value="2"/>
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

// =============================================================================
// Node Ids
// =============================================================================

/// A string node id in the demo namespace.
pub fn demo_node(identifier: &str) -> NodeId {
    NodeId::string(DEMO_NS_INDEX, identifier)
}

/// An absolute address of a demo node, qualified by namespace URI.
pub fn demo_address(identifier: &str) -> Address {
    Address::absolute(
        ExpandedNodeId::with_namespace_uri(NodeIdentifier::String(identifier.into()), DEMO_NS),
        None,
    )
}

/// `Demo.Method.VectorAdd` / `InputArguments`.
pub fn vector_add_inputs() -> Address {
    Address::relative(
        demo_address("Demo.Method.VectorAdd"),
        [QualifiedName::new(0, "InputArguments")],
    )
}

/// `Demo.Method.VectorAdd` / `OutputArguments`.
pub fn vector_add_outputs() -> Address {
    Address::relative(
        demo_address("Demo.Method.VectorAdd"),
        [QualifiedName::new(0, "OutputArguments")],
    )
}

/// `Objects` / `2:Demo` / ... by browse names.
pub fn demo_path(names: &[&str]) -> Address {
    let mut path = vec![QualifiedName::new(DEMO_NS_INDEX, "Demo")];
    path.extend(names.iter().map(|n| QualifiedName::new(DEMO_NS_INDEX, *n)));
    Address::relative(Address::from(objects::OBJECTS_FOLDER), path)
}

// =============================================================================
// Encoded Values
// =============================================================================

/// An `Argument` extension object.
pub fn argument(name: &str, data_type: NodeId, value_rank: i32, description: &str) -> Variant {
    let mut encoder = BinaryEncoder::new();
    encoder.write_str(name);
    encoder.write(&data_type);
    encoder.write_i32(value_rank);
    let dimensions: Vec<u32> = if value_rank > 0 { vec![0; value_rank as usize] } else { Vec::new() };
    encoder.write_array(
        (value_rank > 0).then_some(dimensions.as_slice()),
        |e, d| e.write_u32(*d),
    );
    encoder.write(&LocalizedText::text(description));
    Variant::from(ExtensionObject::from_raw(
        data_types::ARGUMENT_ENCODING,
        encoder.into_bytes().to_vec(),
    ))
}

/// A `Vector` body.
pub fn vector_body(x: f64, y: f64, z: f64) -> Vec<u8> {
    let mut encoder = BinaryEncoder::new();
    encoder.write_f64(x);
    encoder.write_f64(y);
    encoder.write_f64(z);
    encoder.into_bytes().to_vec()
}

/// A `Sample` body.
pub fn sample_body(mode: i32, points: &[(f64, f64, f64)], comment: Option<&str>, timeout: f64) -> Vec<u8> {
    let mut encoder = BinaryEncoder::new();
    encoder.write_u32(u32::from(comment.is_some()));
    encoder.write_i32(mode);
    encoder.write_i32(points.len() as i32);
    for (x, y, z) in points {
        encoder.write_raw(&vector_body(*x, *y, *z));
    }
    if let Some(comment) = comment {
        encoder.write_str(comment);
    }
    encoder.write_f64(timeout);
    encoder.into_bytes().to_vec()
}

/// A `Choice` body selecting `Text`.
pub fn choice_text_body(text: &str) -> Vec<u8> {
    let mut encoder = BinaryEncoder::new();
    encoder.write_u32(2);
    encoder.write_str(text);
    encoder.into_bytes().to_vec()
}

fn raw(encoding: NodeId, body: Vec<u8>) -> Variant {
    Variant::from(ExtensionObject::from_raw(encoding, body))
}

// =============================================================================
// Address Space
// =============================================================================

/// Builds the demo address space.
///
/// ```text
/// Objects
/// └── 2:Demo
///     ├── 2:Static
///     │   ├── 2:Scalar
///     │   │   ├── 2:Double          3.25
///     │   │   ├── 2:Int32           -7
///     │   │   └── 2:String          "uabin demo"
///     │   ├── 2:Vector              Vector { 1, 2, 3 }
///     │   ├── 2:Sample              Sample with comment
///     │   ├── 2:Choice              Choice::Text
///     │   ├── 2:Opaque              undescribed encoding
///     │   └── 2:Twin (x2)           ambiguous browse name
///     └── 2:Method
///         └── 2:VectorAdd
///             ├── InputArguments    [A: Vector, B: Vector]
///             └── OutputArguments   [Result: Vector]
/// ```
pub fn demo_address_space() -> AddressSpace {
    let mut space = AddressSpace::new(vec![
        UA_NS.to_string(),
        SERVER_NS.to_string(),
        DEMO_NS.to_string(),
    ]);
    let ns = DEMO_NS_INDEX;
    let name = |n: &str| QualifiedName::new(ns, n);

    let demo = demo_node("Demo");
    let statics = demo_node("Demo.Static");
    let scalar = demo_node("Demo.Static.Scalar");
    space
        .add_object(&objects::OBJECTS_FOLDER, demo.clone(), name("Demo"))
        .add_object(&demo, statics.clone(), name("Static"))
        .add_object(&statics, scalar.clone(), name("Scalar"));

    let component = reference_types::HAS_COMPONENT;
    space
        .add_variable(&scalar, component.clone(), demo_node("Demo.Static.Scalar.Double"), name("Double"), DEMO_DOUBLE)
        .add_variable(&scalar, component.clone(), demo_node("Demo.Static.Scalar.Int32"), name("Int32"), DEMO_INT32)
        .add_variable(&scalar, component.clone(), demo_node("Demo.Static.Scalar.String"), name("String"), DEMO_STRING);

    space
        .add_variable(
            &statics,
            component.clone(),
            demo_node("Demo.Static.Vector"),
            name("Vector"),
            raw(VECTOR_ENCODING, vector_body(1.0, 2.0, 3.0)),
        )
        .add_variable(
            &statics,
            component.clone(),
            demo_node("Demo.Static.Sample"),
            name("Sample"),
            raw(
                SAMPLE_ENCODING,
                sample_body(1, &[(1.0, 0.0, 0.0), (0.0, 1.0, 0.0)], Some("two points"), 1500.0),
            ),
        )
        .add_variable(
            &statics,
            component.clone(),
            demo_node("Demo.Static.Choice"),
            name("Choice"),
            raw(CHOICE_ENCODING, choice_text_body("selected")),
        )
        .add_variable(
            &statics,
            component.clone(),
            demo_node("Demo.Static.Opaque"),
            name("Opaque"),
            raw(OPAQUE_ENCODING, vec![1, 2, 3, 4]),
        )
        .add_variable(&statics, component.clone(), demo_node("Demo.Static.TwinA"), name("Twin"), 1i32)
        .add_variable(&statics, component.clone(), demo_node("Demo.Static.TwinB"), name("Twin"), 2i32);

    let methods = demo_node("Demo.Method");
    let vector_add = demo_node("Demo.Method.VectorAdd");
    space
        .add_object(&demo, methods.clone(), name("Method"))
        .add_method(&methods, vector_add.clone(), name("VectorAdd"));

    let inputs = Variant::array(
        BuiltInType::ExtensionObject,
        vec![
            argument("A", VECTOR_TYPE, -1, "First operand"),
            argument("B", VECTOR_TYPE, -1, "Second operand"),
        ],
    )
    .unwrap_or_default();
    let outputs = Variant::array(
        BuiltInType::ExtensionObject,
        vec![argument("Result", VECTOR_TYPE, -1, "Sum of A and B")],
    )
    .unwrap_or_default();
    space
        .add_variable(
            &vector_add,
            reference_types::HAS_PROPERTY,
            demo_node("Demo.Method.VectorAdd.InputArguments"),
            QualifiedName::new(0, "InputArguments"),
            inputs,
        )
        .add_variable(
            &vector_add,
            reference_types::HAS_PROPERTY,
            demo_node("Demo.Method.VectorAdd.OutputArguments"),
            QualifiedName::new(0, "OutputArguments"),
            outputs,
        );

    add_dictionary(&mut space);
    space
}

/// Publishes [`DEMO_DICTIONARY`] with its description, encoding and data
/// type nodes.
fn add_dictionary(space: &mut AddressSpace) {
    space.add_variable(
        &objects::OPC_BINARY_SCHEMA_TYPE_SYSTEM,
        reference_types::HAS_COMPONENT,
        DICTIONARY_NODE,
        QualifiedName::new(DEMO_NS_INDEX, "DemoTypes"),
        ByteString::from(DEMO_DICTIONARY.as_bytes()),
    );

    let types = [
        ("Vector", 6101, VECTOR_ENCODING, VECTOR_TYPE),
        ("Sample", 6102, SAMPLE_ENCODING, SAMPLE_TYPE),
        ("Choice", 6103, CHOICE_ENCODING, CHOICE_TYPE),
    ];
    for (type_name, description, encoding, data_type) in types {
        let description = NodeId::numeric(DEMO_NS_INDEX, description);
        space
            .add_variable(
                &DICTIONARY_NODE,
                reference_types::HAS_COMPONENT,
                description.clone(),
                QualifiedName::new(DEMO_NS_INDEX, type_name),
                UaString::from(type_name),
            )
            .add_node(
                encoding.clone(),
                QualifiedName::new(0, "Default Binary"),
                NODE_CLASS_OBJECT,
                None,
            )
            .add_reference(encoding.clone(), reference_types::HAS_DESCRIPTION, description)
            .add_node(
                data_type.clone(),
                QualifiedName::new(DEMO_NS_INDEX, type_name),
                NODE_CLASS_DATA_TYPE,
                None,
            )
            .add_reference(data_type, reference_types::HAS_ENCODING, encoding);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uabin_client::Argument;

    #[test]
    fn test_argument_fixture_decodes() {
        let value = Variant::array(
            BuiltInType::ExtensionObject,
            vec![argument("A", VECTOR_TYPE, -1, "First operand")],
        )
        .unwrap();
        let arguments = Argument::from_variant(&value).unwrap();
        assert_eq!(arguments.len(), 1);
        assert_eq!(arguments[0].name, "A");
        assert_eq!(arguments[0].data_type, VECTOR_TYPE);
        assert_eq!(arguments[0].value_rank, -1);
    }

    #[test]
    fn test_sample_body_layout() {
        let body = sample_body(0, &[(1.0, 2.0, 3.0)], None, 10.0);
        // mask, mode, count, one vector, timeout
        assert_eq!(body.len(), 4 + 4 + 4 + 24 + 8);
        assert_eq!(&body[..4], &0u32.to_le_bytes());
    }
}
