// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Dictionary Integration Tests
//!
//! Type dictionary loading and structured value decoding:
//!
//! - Lazy, single fetch per connection
//! - Structures, optional fields, nested arrays and unions
//! - Unknown encodings
//! - Definition lookups

use std::time::Duration;

use uabin_client::codec::{ExtensionObjectBody, FieldValue, Variant};
use uabin_client::dictionary::FieldType;
use uabin_client::types::ids::data_types;
use uabin_client::{DataTypeDefinition, DictionaryError, TargetErrorKind, UaError};

use uabin_tests::common::*;

// =============================================================================
// Loading Tests
// =============================================================================

#[tokio::test]
async fn test_dictionary_not_loaded_for_scalars() {
    let harness = TestHarness::start().await;

    let result = harness
        .client
        .read(&[
            demo_address("Demo.Static.Scalar.Double"),
            demo_address("Demo.Static.Scalar.String"),
        ])
        .await
        .assert_ok();
    assert!(result.all_good());
    assert_eq!(harness.server.read_count(&DICTIONARY_NODE), 0);
    assert_eq!(harness.server.browses(), 0);
}

#[tokio::test]
async fn test_dictionary_fetched_once_per_connection() {
    let harness = TestHarness::start().await;

    for id in ["Demo.Static.Vector", "Demo.Static.Sample", "Demo.Static.Choice", "Demo.Static.Vector"] {
        let result = harness.client.read(&[demo_address(id)]).await.assert_ok();
        result[0].assert_good();
    }
    assert_eq!(harness.server.read_count(&DICTIONARY_NODE), 1);

    harness.client.disconnect().await.assert_ok();
    assert_eq!(harness.client.stats().dictionary_loads(), 1);
}

#[tokio::test]
async fn test_dictionary_reloaded_after_reconnect() {
    let harness = TestHarness::start().await;
    harness
        .client
        .read(&[demo_address("Demo.Static.Vector")])
        .await
        .assert_ok();

    harness.server.drop_next_request();
    harness
        .client
        .read(&[demo_address("Demo.Static.Scalar.Int32")])
        .await
        .assert_err();

    let result = harness
        .client
        .read(&[demo_address("Demo.Static.Vector")])
        .await
        .assert_ok();
    result[0].assert_good();
    assert_eq!(harness.server.read_count(&DICTIONARY_NODE), 2);
}

#[tokio::test]
async fn test_dictionary_concurrent_reads_share_one_fetch() {
    let harness = TestHarness::start().await;
    harness.client.connect().await.assert_ok();
    harness.server.set_response_delay(Duration::from_millis(20));

    let mut tasks = Vec::new();
    for id in ["Demo.Static.Vector", "Demo.Static.Sample", "Demo.Static.Choice"] {
        let client = harness.client.clone();
        tasks.push(tokio::spawn(async move { client.read(&[demo_address(id)]).await }));
    }
    for task in tasks {
        let result = task.await.expect("read task panicked").assert_ok();
        result[0].assert_good();
    }
    assert_eq!(harness.server.read_count(&DICTIONARY_NODE), 1);
}

// =============================================================================
// Decoding Tests
// =============================================================================

#[tokio::test]
async fn test_decode_structure() {
    let harness = TestHarness::start().await;

    let result = harness
        .client
        .read(&[demo_address("Demo.Static.Vector")])
        .await
        .assert_ok();
    let vector = result[0].decoded();
    assert_eq!(vector.name(), "Vector");
    assert_eq!(vector.data_type_id(), &VECTOR_TYPE);
    assert_eq!(scalar_field(vector, "X"), &Variant::Double(1.0));
    assert_eq!(scalar_field(vector, "Y"), &Variant::Double(2.0));
    assert_eq!(scalar_field(vector, "Z"), &Variant::Double(3.0));
    assert!(vector.field("W").is_err());
}

#[tokio::test]
async fn test_decode_optional_field_and_nested_array() {
    let harness = TestHarness::start().await;

    let result = harness
        .client
        .read(&[demo_address("Demo.Static.Sample")])
        .await
        .assert_ok();
    let sample = result[0].decoded();
    assert_eq!(sample.name(), "Sample");
    assert_eq!(scalar_field(sample, "Mode"), &Variant::Int32(1));
    assert_eq!(scalar_field(sample, "Comment"), &Variant::from("two points"));
    assert_eq!(scalar_field(sample, "Timeout"), &Variant::Double(1500.0));

    let points = sample
        .field("Points")
        .assert_ok()
        .as_structure_array()
        .expect("Points is a structure array");
    assert_eq!(points.len(), 2);
    assert_eq!(points[0].name(), "Vector");
    assert_eq!(scalar_field(&points[0], "X"), &Variant::Double(1.0));
    assert_eq!(scalar_field(&points[1], "Y"), &Variant::Double(1.0));
}

#[tokio::test]
async fn test_decode_absent_optional_field() {
    let harness = TestHarness::start().await;
    harness.server.set_value(
        &demo_node("Demo.Static.Sample"),
        uabin_client::ExtensionObject::from_raw(SAMPLE_ENCODING, sample_body(2, &[], None, 0.5)),
    );

    let result = harness
        .client
        .read(&[demo_address("Demo.Static.Sample")])
        .await
        .assert_ok();
    let sample = result[0].decoded();
    assert_eq!(scalar_field(sample, "Mode"), &Variant::Int32(2));
    assert!(sample.field("Comment").assert_ok().is_absent());
    assert_eq!(
        sample.field("Points").assert_ok().as_structure_array().map(<[_]>::len),
        Some(0)
    );
}

#[tokio::test]
async fn test_decode_union() {
    let harness = TestHarness::start().await;

    let result = harness
        .client
        .read(&[demo_address("Demo.Static.Choice")])
        .await
        .assert_ok();
    let choice = result[0].decoded();
    assert_eq!(choice.name(), "Choice");
    let union = choice.as_union().expect("Choice is a union");
    assert_eq!(union.switch_value(), 2);
    let (name, value) = union.selected().expect("a field is selected");
    assert_eq!(name, "Text");
    assert_eq!(value, &FieldValue::Scalar(Variant::from("selected")));
}

#[tokio::test]
async fn test_decode_unknown_encoding_keeps_raw_body() {
    let harness = TestHarness::start().await;

    let result = harness
        .client
        .read(&[
            demo_address("Demo.Static.Opaque"),
            demo_address("Demo.Static.Vector"),
        ])
        .await
        .assert_ok();
    result[0].assert_error_kind(TargetErrorKind::UnknownDataType);
    match &result[0].data {
        Some(Variant::ExtensionObject(obj)) => {
            assert_eq!(obj.type_id, OPAQUE_ENCODING);
            assert!(matches!(obj.body, ExtensionObjectBody::Raw { .. }));
        }
        other => panic!("expected the raw extension object, got {:?}", other),
    }
    result[1].assert_good();

    harness
        .client
        .read(&[demo_address("Demo.Static.Opaque")])
        .await
        .assert_ok()[0]
        .assert_error_kind(TargetErrorKind::UnknownDataType);
    assert_eq!(harness.server.read_count(&DICTIONARY_NODE), 1);
}

#[tokio::test]
async fn test_decode_updated_value_without_refetch() {
    let harness = TestHarness::start().await;
    harness
        .client
        .read(&[demo_address("Demo.Static.Vector")])
        .await
        .assert_ok();

    harness.server.set_value(
        &demo_node("Demo.Static.Vector"),
        uabin_client::ExtensionObject::from_raw(VECTOR_ENCODING, vector_body(-1.5, 0.0, 8.0)),
    );
    let result = harness
        .client
        .read(&[demo_address("Demo.Static.Vector")])
        .await
        .assert_ok();
    let vector = result[0].decoded();
    assert_eq!(scalar_field(vector, "X"), &Variant::Double(-1.5));
    assert_eq!(scalar_field(vector, "Z"), &Variant::Double(8.0));
    assert_eq!(harness.server.read_count(&DICTIONARY_NODE), 1);
}

// =============================================================================
// Definition Lookup Tests
// =============================================================================

#[tokio::test]
async fn test_structure_definition_lookup() {
    let harness = TestHarness::start().await;

    let sample = harness
        .client
        .structure_definition(&SAMPLE_TYPE)
        .await
        .assert_ok();
    assert_eq!(sample.name, "Sample");
    assert_eq!(sample.encoding_id, SAMPLE_ENCODING);
    let names: Vec<&str> = sample.fields.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["Mode", "Points", "Comment", "Timeout"]);

    let points = sample.field("Points").expect("Points field");
    assert_eq!(points.field_type, FieldType::Structured(VECTOR_TYPE));
    assert!(points.is_array());
    assert!(sample.field("Comment").is_some_and(|f| f.is_optional));
    assert!(sample.has_optional_fields());
}

#[tokio::test]
async fn test_union_definition_lookup() {
    let harness = TestHarness::start().await;

    let choice = harness.client.union_definition(&CHOICE_TYPE).await.assert_ok();
    assert_eq!(choice.name, "Choice");
    assert_eq!(choice.field_for_switch(1).map(|f| f.name.as_str()), Some("Number"));
    assert_eq!(choice.field_for_switch(2).map(|f| f.name.as_str()), Some("Text"));
    assert!(choice.field_for_switch(3).is_none());
}

#[tokio::test]
async fn test_definition_kind_mismatch() {
    let harness = TestHarness::start().await;

    let err = harness.client.union_definition(&VECTOR_TYPE).await.assert_err();
    assert!(
        matches!(err, UaError::Dictionary(DictionaryError::NotAUnion { .. })),
        "unexpected error: {}",
        err
    );
    let err = harness.client.structure_definition(&CHOICE_TYPE).await.assert_err();
    assert!(
        matches!(err, UaError::Dictionary(DictionaryError::NotAStructure { .. })),
        "unexpected error: {}",
        err
    );
}

#[tokio::test]
async fn test_standard_definition_needs_no_fetch() {
    let harness = TestHarness::start().await;

    let definition = harness
        .client
        .data_type_definition(&data_types::ARGUMENT)
        .await
        .assert_ok();
    assert!(matches!(definition, DataTypeDefinition::Structure(_)));
    assert_eq!(definition.name(), "Argument");
    assert_eq!(definition.encoding_id(), &data_types::ARGUMENT_ENCODING);
    assert_eq!(harness.server.read_count(&DICTIONARY_NODE), 0);
}
