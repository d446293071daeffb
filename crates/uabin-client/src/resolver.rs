// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Address resolution.
//!
//! An [`Address`] chain is resolved from its absolute root outward. Each
//! relative path element costs one TranslateBrowsePathsToNodeIds call, so a
//! failing step stops the walk before later steps reach the server.
//! Resolved links are cached for the lifetime of one [`AddressResolver`].

use std::collections::HashMap;

use async_trait::async_trait;
use tracing::{debug, trace};

use crate::error::{ResolutionError, SessionError, UaResult};
use crate::services::{
    BrowsePath, BrowsePathResult, TranslateBrowsePathsToNodeIdsRequest, ServiceRequest,
    REMAINING_PATH_COMPLETE,
};
use crate::session::Session;
use crate::types::{
    simplified_uri, Address, ExpandedNodeId, NamespaceArray, NodeId, RelativePath,
    RelativePathElement, StatusCode,
};

/// Server access needed to resolve addresses.
#[async_trait]
pub trait PathTranslator: Send + Sync {
    /// Translates browse paths. Results are in request order.
    async fn translate(&self, paths: Vec<BrowsePath>) -> UaResult<Vec<BrowsePathResult>>;

    /// The server namespace table.
    fn namespaces(&self) -> NamespaceArray;

    /// Application URIs under which the connected server is known.
    ///
    /// An empty list accepts every server URI.
    fn server_uris(&self) -> Vec<String>;
}

#[async_trait]
impl PathTranslator for Session {
    async fn translate(&self, paths: Vec<BrowsePath>) -> UaResult<Vec<BrowsePathResult>> {
        self.translate_browse_paths(paths).await
    }

    fn namespaces(&self) -> NamespaceArray {
        Session::namespaces(self)
    }

    fn server_uris(&self) -> Vec<String> {
        let mut uris: Vec<String> = self
            .info()
            .server_endpoints
            .iter()
            .map(|e| e.server.application_uri.as_str().to_string())
            .filter(|uri| !uri.is_empty())
            .collect();
        uris.sort();
        uris.dedup();
        uris
    }
}

/// Resolves addresses against one server.
pub struct AddressResolver<'a> {
    translator: &'a dyn PathTranslator,
    namespaces: NamespaceArray,
    server_uris: Vec<String>,
    resolved: HashMap<Address, NodeId>,
    translate_calls: usize,
}

impl<'a> AddressResolver<'a> {
    /// Creates a resolver with an empty link cache.
    pub fn new(translator: &'a dyn PathTranslator) -> Self {
        Self {
            namespaces: translator.namespaces(),
            server_uris: translator
                .server_uris()
                .iter()
                .map(|uri| simplified_uri(uri))
                .collect(),
            translator,
            resolved: HashMap::new(),
            translate_calls: 0,
        }
    }

    /// Number of translate calls made so far.
    pub fn translate_calls(&self) -> usize {
        self.translate_calls
    }

    /// Resolves `address` to a session-local node id.
    ///
    /// Failures specific to the address are `UaError::Resolution`. Channel and
    /// session failures pass through unchanged.
    pub async fn resolve(&mut self, address: &Address) -> UaResult<NodeId> {
        let mut links: Vec<(&Address, &RelativePath)> = Vec::new();
        let mut current = address;
        let mut node = loop {
            if let Some(id) = self.resolved.get(current) {
                break id.clone();
            }
            match current {
                Address::Absolute { node_id, server_uri } => {
                    let id = self.resolve_absolute(node_id, server_uri.as_deref())?;
                    self.resolved.insert(current.clone(), id.clone());
                    break id;
                }
                Address::Relative { base, path } => {
                    links.push((current, path));
                    current = base;
                }
            }
        };

        for (link, path) in links.into_iter().rev() {
            for (index, element) in path.elements.iter().enumerate() {
                node = self.step(&node, index, element).await?;
            }
            self.resolved.insert(link.clone(), node.clone());
        }
        trace!(address = %address, node = %node, "Address resolved");
        Ok(node)
    }

    fn resolve_absolute(
        &self,
        node_id: &ExpandedNodeId,
        server_uri: Option<&str>,
    ) -> Result<NodeId, ResolutionError> {
        if let Some(uri) = server_uri {
            if !self.server_uris.is_empty() && !self.server_uris.contains(&simplified_uri(uri)) {
                return Err(ResolutionError::UnknownServer {
                    uri: uri.to_string(),
                });
            }
        }
        self.namespaces.resolve(node_id)
    }

    async fn step(
        &mut self,
        start: &NodeId,
        element_index: usize,
        element: &RelativePathElement,
    ) -> UaResult<NodeId> {
        self.translate_calls += 1;
        let path = BrowsePath {
            starting_node: start.clone(),
            relative_path: RelativePath {
                elements: vec![element.clone()],
            },
        };
        let result = self
            .translator
            .translate(vec![path])
            .await?
            .into_iter()
            .next()
            .ok_or(SessionError::ResultCountMismatch {
                service: TranslateBrowsePathsToNodeIdsRequest::NAME,
                expected: 1,
                actual: 0,
            })?;

        let no_match = || ResolutionError::NoSuchPath {
            start: start.to_string(),
            element: element_index,
            target_name: element.target_name.to_string(),
        };
        let status = result.status_code;
        if status == StatusCode::BAD_NO_MATCH || status == StatusCode::BAD_NOT_FOUND {
            debug!(start = %start, target = %element.target_name, "Browse path has no match");
            return Err(no_match().into());
        }
        if status.is_bad() {
            return Err(ResolutionError::TranslateFailed {
                element: element_index,
                status,
            }
            .into());
        }

        let mut targets: Vec<ExpandedNodeId> = Vec::new();
        for target in result.targets.unwrap_or_default() {
            if target.remaining_path_index == REMAINING_PATH_COMPLETE
                && !targets.contains(&target.target_id)
            {
                targets.push(target.target_id);
            }
        }

        match targets.len() {
            0 => Err(no_match().into()),
            1 => {
                let target = targets.remove(0);
                if target.server_index != 0 {
                    return Err(ResolutionError::CrossServerTarget {
                        element: element_index,
                        server_index: target.server_index,
                    }
                    .into());
                }
                Ok(self.namespaces.resolve(&target)?)
            }
            matches => Err(ResolutionError::AmbiguousPath {
                element: element_index,
                target_name: element.target_name.to_string(),
                matches,
            }
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UaError;
    use crate::services::BrowsePathTarget;
    use crate::types::{NodeIdentifier, QualifiedName};
    use parking_lot::Mutex;

    const DEMO_NS: &str = "http://www.unifiedautomation.com/DemoServer/";

    /// Answers each translate call from a table keyed by (start, target name).
    struct FakeTranslator {
        routes: HashMap<(NodeId, String), Vec<NodeId>>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeTranslator {
        fn new(routes: &[(NodeId, &str, &[NodeId])]) -> Self {
            Self {
                routes: routes
                    .iter()
                    .map(|(start, name, targets)| ((start.clone(), name.to_string()), targets.to_vec()))
                    .collect(),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl PathTranslator for FakeTranslator {
        async fn translate(&self, paths: Vec<BrowsePath>) -> UaResult<Vec<BrowsePathResult>> {
            Ok(paths
                .into_iter()
                .map(|path| {
                    let name = path.relative_path.elements[0].target_name.name.as_str().to_string();
                    self.calls.lock().push(name.clone());
                    match self.routes.get(&(path.starting_node, name)) {
                        Some(targets) if !targets.is_empty() => BrowsePathResult {
                            status_code: StatusCode::GOOD,
                            targets: Some(
                                targets
                                    .iter()
                                    .map(|t| BrowsePathTarget {
                                        target_id: ExpandedNodeId::from(t.clone()),
                                        remaining_path_index: REMAINING_PATH_COMPLETE,
                                    })
                                    .collect(),
                            ),
                        },
                        _ => BrowsePathResult {
                            status_code: StatusCode::BAD_NO_MATCH,
                            targets: None,
                        },
                    }
                })
                .collect())
        }

        fn namespaces(&self) -> NamespaceArray {
            NamespaceArray::new(vec![NamespaceArray::OPC_UA_NAMESPACE.into(), "urn:other".into(), DEMO_NS.into()])
        }

        fn server_uris(&self) -> Vec<String> {
            vec!["urn:UnifiedAutomation:UaServerCpp".into()]
        }
    }

    fn vector_add() -> Address {
        Address::absolute(
            ExpandedNodeId::with_namespace_uri(
                NodeIdentifier::String("Demo.Method.VectorAdd".into()),
                DEMO_NS,
            ),
            Some("urn:UnifiedAutomation:UaServerCpp"),
        )
    }

    fn method_id() -> NodeId {
        NodeId::string(2, "Demo.Method.VectorAdd")
    }

    #[tokio::test]
    async fn test_absolute_uses_namespace_table() {
        let translator = FakeTranslator::new(&[]);
        let mut resolver = AddressResolver::new(&translator);
        assert_eq!(resolver.resolve(&vector_add()).await.unwrap(), method_id());
        assert_eq!(resolver.translate_calls(), 0);
    }

    #[tokio::test]
    async fn test_unknown_namespace_and_server() {
        let translator = FakeTranslator::new(&[]);
        let mut resolver = AddressResolver::new(&translator);

        let unknown_ns = Address::absolute(
            ExpandedNodeId::with_namespace_uri(NodeIdentifier::Numeric(1), "urn:missing"),
            None,
        );
        assert!(matches!(
            resolver.resolve(&unknown_ns).await,
            Err(UaError::Resolution(ResolutionError::UnknownNamespace { .. }))
        ));

        let other_server = Address::absolute(NodeId::numeric(0, 85), Some("urn:elsewhere"));
        assert!(matches!(
            resolver.resolve(&other_server).await,
            Err(UaError::Resolution(ResolutionError::UnknownServer { .. }))
        ));
    }

    #[tokio::test]
    async fn test_relative_resolves_each_element() {
        let args = NodeId::string(2, "Demo.Method.VectorAdd.InputArguments");
        let translator = FakeTranslator::new(&[(method_id(), "InputArguments", &[args.clone()][..])]);
        let mut resolver = AddressResolver::new(&translator);

        let address = Address::relative(vector_add(), [QualifiedName::new(0, "InputArguments")]);
        assert_eq!(resolver.resolve(&address).await.unwrap(), args);
        assert_eq!(resolver.resolve(&address).await.unwrap(), args);
        assert_eq!(resolver.translate_calls(), 1);
    }

    #[tokio::test]
    async fn test_no_match_stops_walk() {
        let translator = FakeTranslator::new(&[]);
        let mut resolver = AddressResolver::new(&translator);

        let address = Address::relative(
            vector_add(),
            [QualifiedName::new(2, "Missing"), QualifiedName::new(2, "Never")],
        );
        let err = resolver.resolve(&address).await.unwrap_err();
        assert!(matches!(
            err,
            UaError::Resolution(ResolutionError::NoSuchPath { element: 0, .. })
        ));
        assert_eq!(*translator.calls.lock(), vec!["Missing".to_string()]);
    }

    #[tokio::test]
    async fn test_ambiguous_path() {
        let translator = FakeTranslator::new(&[(
            method_id(),
            "Twin",
            &[NodeId::numeric(2, 1), NodeId::numeric(2, 2)][..],
        )]);
        let mut resolver = AddressResolver::new(&translator);

        let address = Address::relative(vector_add(), [QualifiedName::new(2, "Twin")]);
        assert!(matches!(
            resolver.resolve(&address).await,
            Err(UaError::Resolution(ResolutionError::AmbiguousPath { matches: 2, .. }))
        ));
    }
}
