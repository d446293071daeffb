// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA data model types.
//!
//! - **NodeId / ExpandedNodeId**: node identifiers with parsing
//! - **Address / RelativePath**: symbolic addresses resolved by browsing
//! - **StatusCode**: status codes with severity helpers and names
//! - **NamespaceArray**: the server namespace table
//! - **Primitives**: nullable strings, timestamps, qualified names, texts
//! - **Security**: security mode, policy and user identity

mod address;
pub mod ids;
mod namespace;
mod node_id;
mod primitives;
mod security;
mod status;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use address::{Address, RelativePath, RelativePathElement};
pub use namespace::{simplified_uri, NamespaceArray};
pub use node_id::{ExpandedNodeId, NodeId, NodeIdentifier};
pub use primitives::{ByteString, DateTime, LocalizedText, QualifiedName, UaString};
pub use security::{SecurityMode, SecurityPolicy, UserIdentity};
pub use status::StatusCode;

/// GUIDs are carried as [`uuid::Uuid`].
pub type Guid = uuid::Uuid;

// =============================================================================
// AttributeId
// =============================================================================

/// Node attributes that can be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AttributeId {
    /// Node ID attribute.
    NodeId,
    /// Node class attribute.
    NodeClass,
    /// Browse name attribute.
    BrowseName,
    /// Display name attribute.
    DisplayName,
    /// Description attribute.
    Description,
    /// Value attribute.
    #[default]
    Value,
    /// Data type attribute.
    DataType,
    /// Value rank attribute.
    ValueRank,
    /// Array dimensions attribute.
    ArrayDimensions,
}

impl AttributeId {
    /// Returns the OPC UA numeric value.
    pub const fn value(&self) -> u32 {
        match self {
            Self::NodeId => 1,
            Self::NodeClass => 2,
            Self::BrowseName => 3,
            Self::DisplayName => 4,
            Self::Description => 5,
            Self::Value => 13,
            Self::DataType => 14,
            Self::ValueRank => 15,
            Self::ArrayDimensions => 16,
        }
    }

    /// Creates from the OPC UA numeric value.
    pub fn from_value(value: u32) -> Option<Self> {
        match value {
            1 => Some(Self::NodeId),
            2 => Some(Self::NodeClass),
            3 => Some(Self::BrowseName),
            4 => Some(Self::DisplayName),
            5 => Some(Self::Description),
            13 => Some(Self::Value),
            14 => Some(Self::DataType),
            15 => Some(Self::ValueRank),
            16 => Some(Self::ArrayDimensions),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// =============================================================================
// BrowseDirection
// =============================================================================

/// Direction of references to follow when browsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BrowseDirection {
    /// Forward references.
    #[default]
    Forward,
    /// Inverse references.
    Inverse,
    /// Both directions.
    Both,
}

impl BrowseDirection {
    /// Returns the OPC UA enumeration value.
    pub const fn value(&self) -> u32 {
        match self {
            Self::Forward => 0,
            Self::Inverse => 1,
            Self::Both => 2,
        }
    }

    /// Creates from the OPC UA enumeration value.
    pub fn from_value(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Forward),
            1 => Some(Self::Inverse),
            2 => Some(Self::Both),
            _ => None,
        }
    }
}
