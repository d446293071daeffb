// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Symbolic node addresses.
//!
//! An [`Address`] is either an absolute node on a named server or a base
//! address plus a [`RelativePath`]. Relative addresses form a chain that is
//! resolved from the absolute root outward:
//!
//! ```text
//! Relative { base: Relative { base: Absolute(VectorAdd), path: [A] }, path: [B] }
//!            └─ resolve Absolute ─→ browse A ─→ browse B ─→ NodeId
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use super::ids::reference_types;
use super::{ExpandedNodeId, NodeId, QualifiedName};

// =============================================================================
// RelativePathElement
// =============================================================================

/// One browse step of a relative path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelativePathElement {
    /// Reference type to follow.
    pub reference_type_id: NodeId,
    /// Follow the reference in inverse direction.
    pub is_inverse: bool,
    /// Also follow subtypes of the reference type.
    pub include_subtypes: bool,
    /// Browse name of the target.
    pub target_name: QualifiedName,
}

impl RelativePathElement {
    /// Creates a step following hierarchical references (and subtypes)
    /// forward to `target_name`.
    pub fn new(target_name: QualifiedName) -> Self {
        Self {
            reference_type_id: reference_types::HIERARCHICAL_REFERENCES,
            is_inverse: false,
            include_subtypes: true,
            target_name,
        }
    }

    /// Creates a step following one reference type.
    pub fn with_reference(
        reference_type_id: NodeId,
        is_inverse: bool,
        include_subtypes: bool,
        target_name: QualifiedName,
    ) -> Self {
        Self {
            reference_type_id,
            is_inverse,
            include_subtypes,
            target_name,
        }
    }
}

impl From<QualifiedName> for RelativePathElement {
    fn from(target_name: QualifiedName) -> Self {
        Self::new(target_name)
    }
}

// =============================================================================
// RelativePath
// =============================================================================

/// An ordered sequence of browse steps.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct RelativePath {
    /// Path elements in browse order.
    pub elements: Vec<RelativePathElement>,
}

impl RelativePath {
    /// Creates a path from elements.
    pub fn new(elements: Vec<RelativePathElement>) -> Self {
        Self { elements }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Returns `true` if the path has no elements.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

impl<T: Into<RelativePathElement>> FromIterator<T> for RelativePath {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            elements: iter.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Display for RelativePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for element in &self.elements {
            let sep = if element.is_inverse { '<' } else { '/' };
            write!(f, "{}{}", sep, element.target_name)?;
        }
        Ok(())
    }
}

// =============================================================================
// Address
// =============================================================================

/// A symbolic address of a node.
///
/// # Examples
///
/// ```
/// use uabin_client::types::{Address, ExpandedNodeId, NodeIdentifier, QualifiedName};
///
/// let method = Address::absolute(
///     ExpandedNodeId::with_namespace_uri(
///         NodeIdentifier::String("Demo.Method.VectorAdd".into()),
///         "http://www.unifiedautomation.com/DemoServer/",
///     ),
///     Some("urn:UnifiedAutomation:UaServerCpp"),
/// );
/// let input_arguments = Address::relative(method, [QualifiedName::new(0, "InputArguments")]);
/// assert_eq!(input_arguments.depth(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Address {
    /// A node on a server.
    Absolute {
        /// The node, with its namespace by index or by URI.
        node_id: ExpandedNodeId,
        /// Application URI of the server; `None` means the connected server.
        server_uri: Option<String>,
    },
    /// A node reached by browsing from a base address.
    Relative {
        /// Address the path starts from.
        base: Box<Address>,
        /// Browse steps.
        path: RelativePath,
    },
}

impl Address {
    /// Creates an absolute address.
    pub fn absolute(node_id: impl Into<ExpandedNodeId>, server_uri: Option<&str>) -> Self {
        Self::Absolute {
            node_id: node_id.into(),
            server_uri: server_uri.map(str::to_string),
        }
    }

    /// Creates an address relative to `base`.
    pub fn relative<I, T>(base: Address, path: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<RelativePathElement>,
    {
        Self::Relative {
            base: Box::new(base),
            path: path.into_iter().collect(),
        }
    }

    /// Returns the absolute address at the root of the chain.
    pub fn root(&self) -> &Address {
        let mut current = self;
        while let Self::Relative { base, .. } = current {
            current = base;
        }
        current
    }

    /// Number of relative links between this address and its root.
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut current = self;
        while let Self::Relative { base, .. } = current {
            depth += 1;
            current = base;
        }
        depth
    }
}

impl From<NodeId> for Address {
    fn from(node_id: NodeId) -> Self {
        Self::absolute(node_id, None)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absolute { node_id, .. } => write!(f, "{}", node_id),
            Self::Relative { base, path } => write!(f, "{}{}", base, path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_root_and_depth() {
        let root = Address::from(NodeId::numeric(0, 85));
        let step = Address::relative(root.clone(), [QualifiedName::new(2, "Demo")]);
        let leaf = Address::relative(step, [QualifiedName::new(2, "Static")]);

        assert_eq!(leaf.depth(), 2);
        assert_eq!(leaf.root(), &root);
        assert_eq!(leaf.to_string(), "i=85/2:Demo/2:Static");
    }

    #[test]
    fn test_default_element_follows_hierarchical_references() {
        let element = RelativePathElement::new(QualifiedName::new(0, "InputArguments"));
        assert_eq!(element.reference_type_id, reference_types::HIERARCHICAL_REFERENCES);
        assert!(element.include_subtypes);
        assert!(!element.is_inverse);
    }
}
