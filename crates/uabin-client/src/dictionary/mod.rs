// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Runtime type dictionaries.
//!
//! Servers describe their structured types in OPC binary schema documents
//! stored as the values of dictionary nodes below `OPCBinarySchema_TypeSystem`
//! (`i=93`). The [`TypeDictionary`] loads them on demand and maps each type to
//! its data type and encoding nodes:
//!
//! ```text
//! dictionary ──HasComponent──▶ description ◀──HasDescription── encoding
//!                                                 ◀──HasEncoding── data type
//! ```
//!
//! Each dictionary node is fetched at most once per `TypeDictionary`, also
//! under concurrent lookups. A failed load is remembered and not retried.

mod definition;
mod schema;
pub mod standard;

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::codec::{BuiltInType, DataTypeLookup, DataValue, DefinitionSet, Variant};
use crate::error::{DictionaryError, UaError, UaResult};
use crate::services::ReferenceDescription;
use crate::types::ids::{objects, reference_types};
use crate::types::{BrowseDirection, ExpandedNodeId, NamespaceArray, NodeId};

pub use definition::{
    DataTypeDefinition, FieldDescriptor, FieldType, StructureDefinition, UnionDefinition,
    MAX_OPTIONAL_FIELDS,
};
pub use schema::{
    BinarySchema, SchemaField, SchemaType, TypeIds, TypeName, OPC_BINARY_NAMESPACE, UA_NAMESPACE,
};

/// Node class mask value of variables.
const NODE_CLASS_VARIABLE: u32 = 2;

// =============================================================================
// DictionarySource
// =============================================================================

/// Server access needed to load dictionaries.
#[async_trait]
pub trait DictionarySource: Send + Sync {
    /// Reads the value attribute of each node.
    async fn read_values(&self, nodes: &[NodeId]) -> UaResult<Vec<DataValue>>;

    /// Returns the references of `node` of one reference type (and subtypes).
    async fn browse_references(
        &self,
        node: &NodeId,
        direction: BrowseDirection,
        reference_type: &NodeId,
    ) -> UaResult<Vec<ReferenceDescription>>;

    /// The server namespace table.
    fn namespaces(&self) -> NamespaceArray;
}

fn fetch_failed(error: UaError) -> DictionaryError {
    match error {
        UaError::Dictionary(e) => e,
        other => DictionaryError::FetchFailed {
            message: other.to_string(),
        },
    }
}

#[derive(Clone, Copy)]
enum Key<'a> {
    DataType(&'a NodeId),
    Encoding(&'a NodeId),
}

impl fmt::Display for Key<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DataType(id) | Self::Encoding(id) => write!(f, "{}", id),
        }
    }
}

#[derive(Default)]
struct Cache {
    definitions: DefinitionSet,
    names: HashMap<TypeName, (NodeId, FieldType)>,
}

impl Cache {
    fn add(&mut self, namespace: &str, definition: DataTypeDefinition) {
        let id = definition.data_type_id().clone();
        self.names.insert(
            TypeName::new(namespace, definition.name()),
            (id.clone(), FieldType::Structured(id)),
        );
        self.definitions.insert(definition);
    }
}

// =============================================================================
// TypeDictionary
// =============================================================================

/// Cache of structure and union definitions, filled from server dictionaries.
pub struct TypeDictionary {
    cache: RwLock<Cache>,
    dictionary_nodes: OnceCell<Result<Vec<NodeId>, DictionaryError>>,
    loads: Mutex<HashMap<NodeId, Arc<OnceCell<Result<(), DictionaryError>>>>>,
    fetches: AtomicU64,
}

impl TypeDictionary {
    /// Creates a dictionary holding the standard definitions.
    pub fn new() -> Self {
        let mut cache = Cache::default();
        for definition in standard::all() {
            cache.add(UA_NAMESPACE, definition);
        }
        Self {
            cache: RwLock::new(cache),
            dictionary_nodes: OnceCell::new(),
            loads: Mutex::new(HashMap::new()),
            fetches: AtomicU64::new(0),
        }
    }

    /// Adds a definition.
    pub fn insert(&self, namespace: &str, definition: impl Into<DataTypeDefinition>) {
        self.cache.write().add(namespace, definition.into());
    }

    /// Number of cached definitions.
    pub fn len(&self) -> usize {
        self.cache.read().definitions.len()
    }

    /// Returns `true` if no definitions are cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of dictionary node values fetched from the server.
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }

    fn lookup(&self, key: Key<'_>) -> Option<DataTypeDefinition> {
        match key {
            Key::DataType(id) => self.lookup_data_type(id),
            Key::Encoding(id) => self.lookup_encoding(id),
        }
    }

    /// Returns the definition of a data type, loading dictionaries as needed.
    pub async fn definition_for(
        &self,
        source: &dyn DictionarySource,
        data_type_id: &NodeId,
    ) -> Result<DataTypeDefinition, DictionaryError> {
        self.resolve(source, Key::DataType(data_type_id)).await
    }

    /// Returns the definition for a binary encoding node.
    pub async fn definition_for_encoding(
        &self,
        source: &dyn DictionarySource,
        encoding_id: &NodeId,
    ) -> Result<DataTypeDefinition, DictionaryError> {
        self.resolve(source, Key::Encoding(encoding_id)).await
    }

    /// Returns a structure definition.
    pub async fn structure_definition(
        &self,
        source: &dyn DictionarySource,
        data_type_id: &NodeId,
    ) -> Result<Arc<StructureDefinition>, DictionaryError> {
        match self.definition_for(source, data_type_id).await? {
            DataTypeDefinition::Structure(def) => Ok(def),
            DataTypeDefinition::Union(_) => Err(DictionaryError::NotAStructure {
                data_type_id: data_type_id.to_string(),
            }),
        }
    }

    /// Returns a union definition.
    pub async fn union_definition(
        &self,
        source: &dyn DictionarySource,
        data_type_id: &NodeId,
    ) -> Result<Arc<UnionDefinition>, DictionaryError> {
        match self.definition_for(source, data_type_id).await? {
            DataTypeDefinition::Union(def) => Ok(def),
            DataTypeDefinition::Structure(_) => Err(DictionaryError::NotAUnion {
                data_type_id: data_type_id.to_string(),
            }),
        }
    }

    async fn resolve(
        &self,
        source: &dyn DictionarySource,
        key: Key<'_>,
    ) -> Result<DataTypeDefinition, DictionaryError> {
        let definition = self
            .load_until(source, key)
            .await?
            .ok_or_else(|| DictionaryError::unknown_data_type(key))?;
        self.ensure_dependencies(source, &definition).await?;
        Ok(definition)
    }

    /// Loads definitions of all structured field types of `definition`,
    /// transitively. Types no dictionary defines are skipped.
    pub async fn ensure_dependencies(
        &self,
        source: &dyn DictionarySource,
        definition: &DataTypeDefinition,
    ) -> Result<(), DictionaryError> {
        let mut pending: Vec<NodeId> = definition.structured_dependencies().cloned().collect();
        let mut seen = HashSet::new();
        while let Some(id) = pending.pop() {
            if !seen.insert(id.clone()) {
                continue;
            }
            match self.load_until(source, Key::DataType(&id)).await? {
                Some(dependency) => pending.extend(dependency.structured_dependencies().cloned()),
                None => debug!(data_type = %id, "No definition for field type"),
            }
        }
        Ok(())
    }

    async fn load_until(
        &self,
        source: &dyn DictionarySource,
        key: Key<'_>,
    ) -> Result<Option<DataTypeDefinition>, DictionaryError> {
        if let Some(definition) = self.lookup(key) {
            return Ok(Some(definition));
        }
        for node in self.dictionary_nodes(source).await? {
            if let Err(e) = self.load_once(source, &node).await {
                warn!(dictionary = %node, error = %e, "Type dictionary unavailable");
            }
            if let Some(definition) = self.lookup(key) {
                return Ok(Some(definition));
            }
        }
        Ok(None)
    }

    /// Dictionary nodes below the OPC binary type system, browsed once.
    pub async fn dictionary_nodes(
        &self,
        source: &dyn DictionarySource,
    ) -> Result<Vec<NodeId>, DictionaryError> {
        self.dictionary_nodes
            .get_or_init(|| browse_dictionary_nodes(source))
            .await
            .clone()
    }

    async fn load_once(
        &self,
        source: &dyn DictionarySource,
        node: &NodeId,
    ) -> Result<(), DictionaryError> {
        let cell = Arc::clone(self.loads.lock().entry(node.clone()).or_default());
        cell.get_or_init(|| self.load_from(source, node))
            .await
            .clone()
    }

    /// Fetches, parses and caches one dictionary.
    pub async fn load_from(
        &self,
        source: &dyn DictionarySource,
        node: &NodeId,
    ) -> Result<(), DictionaryError> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        let dictionary = node.to_string();

        let value = source
            .read_values(std::slice::from_ref(node))
            .await
            .map_err(fetch_failed)?
            .into_iter()
            .next()
            .ok_or_else(|| DictionaryError::InvalidDictionaryValue {
                dictionary: dictionary.clone(),
            })?;
        if value.status().is_bad() {
            return Err(DictionaryError::ReadFailed {
                node: dictionary,
                status: value.status(),
            });
        }
        let bytes = match value.value {
            Some(Variant::ByteString(b)) => b.0.unwrap_or_default(),
            Some(Variant::String(s)) => s.0.unwrap_or_default().into_bytes(),
            _ => return Err(DictionaryError::InvalidDictionaryValue { dictionary }),
        };

        let xml = String::from_utf8_lossy(&bytes);
        let schema = BinarySchema::parse(&dictionary, &xml)?;
        let namespaces = source.namespaces();
        let ids = self.map_type_ids(source, node, &schema, &namespaces).await?;

        let definitions = {
            let cache = self.cache.read();
            schema.build_definitions(&ids, &|ty| cache.names.get(ty).cloned())?
        };

        let count = definitions.len();
        {
            let mut cache = self.cache.write();
            for name in schema.enumerations() {
                let int32 = BuiltInType::Int32;
                cache.names.insert(
                    TypeName::new(schema.target_namespace.clone(), name),
                    (int32.data_type_id(), FieldType::BuiltIn(int32)),
                );
            }
            for definition in definitions {
                cache.add(&schema.target_namespace, definition);
            }
        }

        info!(
            dictionary = %node,
            namespace = %schema.target_namespace,
            types = count,
            "Loaded type dictionary"
        );
        Ok(())
    }

    async fn map_type_ids(
        &self,
        source: &dyn DictionarySource,
        node: &NodeId,
        schema: &BinarySchema,
        namespaces: &NamespaceArray,
    ) -> Result<HashMap<String, TypeIds>, DictionaryError> {
        let descriptions: Vec<(NodeId, String)> = source
            .browse_references(node, BrowseDirection::Forward, &reference_types::HAS_COMPONENT)
            .await
            .map_err(fetch_failed)?
            .into_iter()
            .filter(|r| r.node_class == NODE_CLASS_VARIABLE)
            .filter_map(|r| {
                let id = local_node(namespaces, &r.node_id)?;
                Some((id, r.browse_name.name.as_str().to_string()))
            })
            .collect();

        let description_ids: Vec<NodeId> = descriptions.iter().map(|(id, _)| id.clone()).collect();
        let values = if description_ids.is_empty() {
            Vec::new()
        } else {
            source
                .read_values(&description_ids)
                .await
                .map_err(fetch_failed)?
        };

        let mut ids = HashMap::new();
        for (index, (description, browse_name)) in descriptions.iter().enumerate() {
            let name = match values.get(index).and_then(|v| v.value.as_ref()) {
                Some(Variant::String(s)) if !s.as_str().is_empty() => s.as_str().to_string(),
                _ => browse_name.clone(),
            };
            let Some(encoding_id) = self
                .follow_inverse(source, description, &reference_types::HAS_DESCRIPTION, namespaces)
                .await?
            else {
                continue;
            };
            let Some(data_type_id) = self
                .follow_inverse(source, &encoding_id, &reference_types::HAS_ENCODING, namespaces)
                .await?
            else {
                continue;
            };
            ids.insert(
                name,
                TypeIds {
                    data_type_id,
                    encoding_id,
                },
            );
        }

        let namespace_index = namespaces
            .find_namespace_index(&schema.target_namespace)
            .unwrap_or(0);
        for ty in &schema.types {
            ids.entry(ty.name.clone()).or_insert_with(|| {
                warn!(
                    dictionary = %node,
                    type_name = %ty.name,
                    "No description node for type, using synthesized ids"
                );
                TypeIds {
                    data_type_id: NodeId::string(namespace_index, ty.name.clone()),
                    encoding_id: NodeId::string(
                        namespace_index,
                        format!("{}_Encoding_DefaultBinary", ty.name),
                    ),
                }
            });
        }
        Ok(ids)
    }

    async fn follow_inverse(
        &self,
        source: &dyn DictionarySource,
        node: &NodeId,
        reference_type: &NodeId,
        namespaces: &NamespaceArray,
    ) -> Result<Option<NodeId>, DictionaryError> {
        let references = source
            .browse_references(node, BrowseDirection::Inverse, reference_type)
            .await
            .map_err(fetch_failed)?;
        Ok(references
            .iter()
            .find_map(|r| local_node(namespaces, &r.node_id)))
    }
}

impl Default for TypeDictionary {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TypeDictionary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDictionary")
            .field("definitions", &self.len())
            .field("fetches", &self.fetch_count())
            .finish()
    }
}

impl DataTypeLookup for TypeDictionary {
    fn lookup_data_type(&self, data_type_id: &NodeId) -> Option<DataTypeDefinition> {
        self.cache.read().definitions.lookup_data_type(data_type_id)
    }

    fn lookup_encoding(&self, encoding_id: &NodeId) -> Option<DataTypeDefinition> {
        self.cache.read().definitions.lookup_encoding(encoding_id)
    }
}

async fn browse_dictionary_nodes(
    source: &dyn DictionarySource,
) -> Result<Vec<NodeId>, DictionaryError> {
    let references = source
        .browse_references(
            &objects::OPC_BINARY_SCHEMA_TYPE_SYSTEM,
            BrowseDirection::Forward,
            &reference_types::HAS_COMPONENT,
        )
        .await
        .map_err(fetch_failed)?;
    let namespaces = source.namespaces();
    let nodes: Vec<NodeId> = references
        .iter()
        .filter(|r| r.node_class == NODE_CLASS_VARIABLE)
        .filter_map(|r| local_node(&namespaces, &r.node_id))
        .collect();
    debug!(count = nodes.len(), "Found type dictionaries");
    Ok(nodes)
}

fn local_node(namespaces: &NamespaceArray, id: &ExpandedNodeId) -> Option<NodeId> {
    if !id.is_local() {
        return None;
    }
    namespaces.resolve(id).ok()
}
