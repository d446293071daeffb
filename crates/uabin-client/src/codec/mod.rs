// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA binary encoding.
//!
//! # Layers
//!
//! - [`BinaryEncoder`] / [`BinaryDecoder`]: little-endian primitives, nullable
//!   strings and arrays, node ids
//! - [`Variant`] / [`DataValue`] / [`DiagnosticInfo`]: masked composites
//! - [`ExtensionObject`]: structured values tagged with an encoding id
//! - [`GenericValue`]: structures and unions decoded against runtime
//!   definitions
//!
//! # Example
//!
//! ```
//! use uabin_client::codec::{decode_value, encode_value, BuiltInType, DefinitionSet, Variant};
//!
//! let bytes = encode_value(&Variant::Int32(42));
//! let value = decode_value(&bytes, BuiltInType::Variant, &DefinitionSet::new()).unwrap();
//! assert_eq!(value, Variant::Int32(42));
//! ```

mod data_value;
mod encoder;
mod extension;
mod generic;
mod variant;

use bytes::Bytes;

use crate::error::CodecResult;

pub use data_value::{DataValue, DiagnosticInfo};
pub use encoder::{BinaryDecoder, BinaryEncodable, BinaryEncoder, MAX_DEPTH};
pub use extension::{ExtensionObject, ExtensionObjectBody};
pub use generic::{
    decode_generic, decode_nested, raw_encoding_ids, DataTypeLookup, DefinitionSet, FieldValue,
    GenericStructureValue, GenericUnionValue, GenericValue,
};
pub use variant::{BuiltInType, Variant, VariantArray};

/// Decodes one value of a declared built-in type, then decodes any nested
/// extension objects that `lookup` knows.
///
/// [`BuiltInType::Variant`] expects a full variant with its encoding mask.
/// Any other type expects the bare value body.
pub fn decode_value(
    bytes: &[u8],
    declared: BuiltInType,
    lookup: &dyn DataTypeLookup,
) -> CodecResult<Variant> {
    let mut decoder = BinaryDecoder::new(bytes);
    let mut value = Variant::decode_body(declared, &mut decoder)?;
    decoder.finish("value")?;
    decode_nested(&mut value, lookup)?;
    Ok(value)
}

/// Encodes a value as a full variant.
pub fn encode_value(value: &Variant) -> Bytes {
    value.to_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NodeId, UaString};
    use proptest::prelude::*;

    #[test]
    fn test_bare_body_decode() {
        let value = decode_value(&7u32.to_le_bytes(), BuiltInType::UInt32, &DefinitionSet::new())
            .unwrap();
        assert_eq!(value, Variant::UInt32(7));
    }

    #[test]
    fn test_null_sentinels_survive() {
        for value in [
            Variant::String(UaString::null()),
            Variant::ByteString(crate::types::ByteString::null()),
            Variant::from(NodeId::null()),
            Variant::Empty,
        ] {
            let decoded =
                decode_value(&encode_value(&value), BuiltInType::Variant, &DefinitionSet::new())
                    .unwrap();
            assert_eq!(decoded, value);
        }
    }

    proptest! {
        #[test]
        fn prop_int64_round_trip(n in any::<i64>()) {
            let decoded = decode_value(
                &encode_value(&Variant::Int64(n)),
                BuiltInType::Variant,
                &DefinitionSet::new(),
            ).unwrap();
            prop_assert_eq!(decoded, Variant::Int64(n));
        }

        #[test]
        fn prop_string_round_trip(s in ".*") {
            let value = Variant::string(s);
            let decoded = decode_value(&encode_value(&value), BuiltInType::Variant, &DefinitionSet::new()).unwrap();
            prop_assert_eq!(decoded, value);
        }

        #[test]
        fn prop_truncated_input_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..64)) {
            let _ = decode_value(&bytes, BuiltInType::Variant, &DefinitionSet::new());
        }
    }
}
