// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Node identifiers.
//!
//! A [`NodeId`] is a namespace index plus exactly one identifier kind. An
//! [`ExpandedNodeId`] may name its namespace by URI instead, which the
//! session resolves against the server namespace array.

use std::fmt;
use std::str::FromStr;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ConfigurationError, UaError};

// =============================================================================
// NodeId
// =============================================================================

/// OPC UA Node Identifier.
///
/// # Examples
///
/// ```
/// use uabin_client::types::NodeId;
///
/// let numeric = NodeId::numeric(0, 2255);
/// let string = NodeId::string(2, "Demo.Method.VectorAdd");
///
/// let parsed: NodeId = "ns=2;s=Demo.Method.VectorAdd".parse().unwrap();
/// assert_eq!(parsed, string);
/// assert_eq!(numeric.to_string(), "i=2255");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId {
    /// Namespace index (0 = OPC UA standard namespace).
    pub namespace_index: u16,

    /// The node identifier.
    pub identifier: NodeIdentifier,
}

impl NodeId {
    /// Creates a numeric node ID.
    #[inline]
    pub const fn numeric(namespace_index: u16, value: u32) -> Self {
        Self {
            namespace_index,
            identifier: NodeIdentifier::Numeric(value),
        }
    }

    /// Creates a string node ID.
    #[inline]
    pub fn string(namespace_index: u16, value: impl Into<String>) -> Self {
        Self {
            namespace_index,
            identifier: NodeIdentifier::String(value.into()),
        }
    }

    /// Creates a GUID node ID.
    #[inline]
    pub fn guid(namespace_index: u16, value: Uuid) -> Self {
        Self {
            namespace_index,
            identifier: NodeIdentifier::Guid(value),
        }
    }

    /// Creates an opaque (byte string) node ID.
    #[inline]
    pub fn opaque(namespace_index: u16, value: Vec<u8>) -> Self {
        Self {
            namespace_index,
            identifier: NodeIdentifier::Opaque(value),
        }
    }

    /// Returns the null node ID (ns=0, i=0).
    #[inline]
    pub const fn null() -> Self {
        Self::numeric(0, 0)
    }

    /// Returns `true` if this is the null node ID.
    #[inline]
    pub fn is_null(&self) -> bool {
        self.namespace_index == 0 && matches!(self.identifier, NodeIdentifier::Numeric(0))
    }

    /// Returns the numeric value if this is a numeric identifier.
    #[inline]
    pub fn as_numeric(&self) -> Option<u32> {
        match &self.identifier {
            NodeIdentifier::Numeric(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the string value if this is a string identifier.
    #[inline]
    pub fn as_string(&self) -> Option<&str> {
        match &self.identifier {
            NodeIdentifier::String(v) => Some(v),
            _ => None,
        }
    }

    /// Returns `true` if this is a numeric node in namespace 0 with the given id.
    #[inline]
    pub fn is_ns0(&self, id: u32) -> bool {
        self.namespace_index == 0 && self.as_numeric() == Some(id)
    }

    /// Converts to the OPC UA string format.
    ///
    /// Format: `ns=<namespace>;{i|s|g|b}=<identifier>`, with the `ns=` part
    /// omitted for namespace 0.
    pub fn to_opc_string(&self) -> String {
        if self.namespace_index == 0 {
            self.identifier.to_string()
        } else {
            format!("ns={};{}", self.namespace_index, self.identifier)
        }
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::null()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_opc_string())
    }
}

impl From<u32> for NodeId {
    fn from(value: u32) -> Self {
        Self::numeric(0, value)
    }
}

impl FromStr for NodeId {
    type Err = UaError;

    /// Parses a NodeId from OPC UA string format.
    ///
    /// Supported formats: `ns=2;i=1001`, `ns=2;s=MyNode`,
    /// `ns=2;g=<uuid>`, `ns=2;b=<base64>`, and the same without `ns=`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = |reason: String| {
            UaError::configuration(ConfigurationError::invalid_node_id(s, reason))
        };

        let (namespace_index, identifier_part) = match s.strip_prefix("ns=") {
            Some(rest) => {
                let (ns, id) = rest
                    .split_once(';')
                    .ok_or_else(|| invalid("Missing identifier after namespace".into()))?;
                let ns: u16 = ns
                    .parse()
                    .map_err(|_| invalid("Invalid namespace index".into()))?;
                (ns, id)
            }
            None => (0, s),
        };

        let identifier = if let Some(id) = identifier_part.strip_prefix("i=") {
            NodeIdentifier::Numeric(
                id.parse()
                    .map_err(|_| invalid("Invalid numeric identifier".into()))?,
            )
        } else if let Some(id) = identifier_part.strip_prefix("s=") {
            NodeIdentifier::String(id.to_string())
        } else if let Some(id) = identifier_part.strip_prefix("g=") {
            NodeIdentifier::Guid(
                Uuid::parse_str(id).map_err(|e| invalid(format!("Invalid GUID: {}", e)))?,
            )
        } else if let Some(id) = identifier_part.strip_prefix("b=") {
            NodeIdentifier::Opaque(
                BASE64
                    .decode(id)
                    .map_err(|e| invalid(format!("Invalid base64: {}", e)))?,
            )
        } else {
            return Err(invalid(
                "Unknown identifier type. Expected i=, s=, g=, or b=".into(),
            ));
        };

        Ok(Self {
            namespace_index,
            identifier,
        })
    }
}

// =============================================================================
// NodeIdentifier
// =============================================================================

/// OPC UA node identifier kinds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum NodeIdentifier {
    /// Numeric identifier.
    Numeric(u32),

    /// String identifier.
    String(String),

    /// GUID identifier.
    Guid(Uuid),

    /// Opaque identifier (application-specific byte array).
    Opaque(Vec<u8>),
}

impl fmt::Display for NodeIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(v) => write!(f, "i={}", v),
            Self::String(v) => write!(f, "s={}", v),
            Self::Guid(v) => write!(f, "g={}", v),
            Self::Opaque(v) => write!(f, "b={}", BASE64.encode(v)),
        }
    }
}

// =============================================================================
// ExpandedNodeId
// =============================================================================

/// A node id that may carry a namespace URI and a server index.
///
/// When `namespace_uri` is set it takes precedence over
/// `node_id.namespace_index`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ExpandedNodeId {
    /// The node id. Its namespace index is ignored when a URI is present.
    pub node_id: NodeId,

    /// Namespace URI, resolved per session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace_uri: Option<String>,

    /// Index into the server array; 0 is the local server.
    #[serde(default)]
    pub server_index: u32,
}

impl ExpandedNodeId {
    /// Wraps a local node id.
    pub fn local(node_id: NodeId) -> Self {
        Self {
            node_id,
            namespace_uri: None,
            server_index: 0,
        }
    }

    /// Creates an expanded node id whose namespace is named by URI.
    pub fn with_namespace_uri(identifier: NodeIdentifier, namespace_uri: impl Into<String>) -> Self {
        Self {
            node_id: NodeId {
                namespace_index: 0,
                identifier,
            },
            namespace_uri: Some(namespace_uri.into()),
            server_index: 0,
        }
    }

    /// Returns `true` if the target lives on the local server.
    #[inline]
    pub fn is_local(&self) -> bool {
        self.server_index == 0
    }
}

impl From<NodeId> for ExpandedNodeId {
    fn from(node_id: NodeId) -> Self {
        Self::local(node_id)
    }
}

impl fmt::Display for ExpandedNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.server_index != 0 {
            write!(f, "svr={};", self.server_index)?;
        }
        match &self.namespace_uri {
            Some(uri) => write!(f, "nsu={};{}", uri, self.node_id.identifier),
            None => write!(f, "{}", self.node_id),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_formats() {
        assert_eq!("i=85".parse::<NodeId>().unwrap(), NodeId::numeric(0, 85));
        assert_eq!(
            "ns=3;s=Demo.Static".parse::<NodeId>().unwrap(),
            NodeId::string(3, "Demo.Static")
        );
        assert_eq!(
            "ns=1;b=AQID".parse::<NodeId>().unwrap(),
            NodeId::opaque(1, vec![1, 2, 3])
        );
        let guid = "ns=4;g=72962b91-fa75-4ae6-8d28-b404dc7daf63"
            .parse::<NodeId>()
            .unwrap();
        assert!(matches!(guid.identifier, NodeIdentifier::Guid(_)));
    }

    #[test]
    fn test_parse_errors() {
        assert!("ns=x;i=1".parse::<NodeId>().is_err());
        assert!("ns=1".parse::<NodeId>().is_err());
        assert!("q=1".parse::<NodeId>().is_err());
        assert!("i=abc".parse::<NodeId>().is_err());
    }

    #[test]
    fn test_display_round_trip() {
        for text in ["i=2255", "ns=2;s=Demo.Method.VectorAdd", "ns=7;b=AAEC"] {
            let node: NodeId = text.parse().unwrap();
            assert_eq!(node.to_string(), text);
        }
    }

    #[test]
    fn test_null() {
        assert!(NodeId::null().is_null());
        assert!(!NodeId::numeric(1, 0).is_null());
        assert!(NodeId::default().is_null());
    }

    #[test]
    fn test_expanded_display() {
        let id = ExpandedNodeId::with_namespace_uri(
            NodeIdentifier::String("Demo.Method.VectorAdd".into()),
            "http://www.unifiedautomation.com/DemoServer/",
        );
        assert_eq!(
            id.to_string(),
            "nsu=http://www.unifiedautomation.com/DemoServer/;s=Demo.Method.VectorAdd"
        );
        assert!(id.is_local());
    }
}
