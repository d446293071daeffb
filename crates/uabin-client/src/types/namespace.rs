// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The server namespace table.

use crate::error::ResolutionError;

use super::{ExpandedNodeId, NodeId};

/// Lower-cases a URI and drops one trailing `/`.
///
/// Namespace and server URIs are always compared in this form.
pub fn simplified_uri(uri: &str) -> String {
    let lower = uri.to_lowercase();
    match lower.strip_suffix('/') {
        Some(stripped) => stripped.to_string(),
        None => lower,
    }
}

/// The namespace array read from `Server_NamespaceArray`.
///
/// Index 0 is always `http://opcfoundation.org/UA/`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NamespaceArray {
    uris: Vec<String>,
    simplified: Vec<String>,
}

impl NamespaceArray {
    /// URI of namespace 0.
    pub const OPC_UA_NAMESPACE: &'static str = "http://opcfoundation.org/UA/";

    /// Creates a namespace array.
    pub fn new(uris: Vec<String>) -> Self {
        let simplified = uris.iter().map(|u| simplified_uri(u)).collect();
        Self { uris, simplified }
    }

    /// Returns the URIs in index order.
    pub fn uris(&self) -> &[String] {
        &self.uris
    }

    /// Number of namespaces.
    pub fn len(&self) -> usize {
        self.uris.len()
    }

    /// Returns `true` if the array is empty.
    pub fn is_empty(&self) -> bool {
        self.uris.is_empty()
    }

    /// Finds the index of a namespace URI.
    pub fn find_namespace_index(&self, uri: &str) -> Option<u16> {
        let wanted = simplified_uri(uri);
        self.simplified
            .iter()
            .position(|candidate| *candidate == wanted)
            .and_then(|index| u16::try_from(index).ok())
    }

    /// Finds the URI of a namespace index.
    pub fn find_namespace_uri(&self, index: u16) -> Option<&str> {
        self.uris.get(index as usize).map(String::as_str)
    }

    /// Converts an expanded node id to a session-local node id.
    pub fn resolve(&self, id: &ExpandedNodeId) -> Result<NodeId, ResolutionError> {
        match &id.namespace_uri {
            Some(uri) => {
                let namespace_index = self
                    .find_namespace_index(uri)
                    .ok_or_else(|| ResolutionError::unknown_namespace(uri.clone()))?;
                Ok(NodeId {
                    namespace_index,
                    identifier: id.node_id.identifier.clone(),
                })
            }
            None => Ok(id.node_id.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NodeIdentifier;

    fn demo_array() -> NamespaceArray {
        NamespaceArray::new(vec![
            NamespaceArray::OPC_UA_NAMESPACE.to_string(),
            "urn:UnifiedAutomation:UaServerCpp".to_string(),
            "http://www.unifiedautomation.com/DemoServer/".to_string(),
        ])
    }

    #[test]
    fn test_simplified_uri() {
        assert_eq!(simplified_uri("http://Example.com/NS/"), "http://example.com/ns");
        assert_eq!(simplified_uri("urn:a"), "urn:a");
    }

    #[test]
    fn test_lookup_ignores_case_and_trailing_slash() {
        let array = demo_array();
        assert_eq!(
            array.find_namespace_index("HTTP://www.unifiedautomation.com/DemoServer"),
            Some(2)
        );
        assert_eq!(array.find_namespace_index("urn:missing"), None);
        assert_eq!(array.find_namespace_uri(1), Some("urn:UnifiedAutomation:UaServerCpp"));
        assert_eq!(array.find_namespace_uri(9), None);
    }

    #[test]
    fn test_resolve_expanded() {
        let array = demo_array();
        let id = ExpandedNodeId::with_namespace_uri(
            NodeIdentifier::String("Demo.Method.VectorAdd".into()),
            "http://www.unifiedautomation.com/DemoServer/",
        );
        assert_eq!(array.resolve(&id).unwrap(), NodeId::string(2, "Demo.Method.VectorAdd"));

        let missing = ExpandedNodeId::with_namespace_uri(NodeIdentifier::Numeric(1), "urn:nope");
        assert_eq!(
            array.resolve(&missing),
            Err(ResolutionError::unknown_namespace("urn:nope"))
        );
    }
}
