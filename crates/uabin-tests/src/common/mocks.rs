// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Mock OPC UA Server
//!
//! An in-process server speaking OPC UA TCP binary over `tokio::io::duplex`
//! streams. [`MockServer`] implements [`Connector`], so a client built with
//! [`Client::with_connector`](uabin_client::Client::with_connector) talks to
//! it through the real handshake, chunking and message security.
//!
//! ## Design Principles
//!
//! - Configurable behavior for different test scenarios
//! - Recording of interactions for verification
//! - Thread-safe for concurrent testing
//! - One-shot fault injection flags that reset when they fire

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use tokio::io::{AsyncWriteExt, DuplexStream, WriteHalf};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use uabin_client::channel::message::{
    encode_frame, read_frame, write_frame, AcknowledgeMessage, ChunkType, ErrorMessage,
    HelloMessage, MessageType, OpenChunk,
};
use uabin_client::channel::security::{generate_nonce, ChannelSecurity, SecurityRole};
use uabin_client::channel::{BoxedStream, Connector};
use uabin_client::codec::{BinaryDecoder, BinaryEncodable, BuiltInType, DataValue, Variant};
use uabin_client::error::{ConnectionError, UaError, UaResult};
use uabin_client::services::{
    encode_message, split_type_id, ActivateSessionRequest, ActivateSessionResponse,
    AnonymousIdentityToken, ApplicationDescription, BrowseDescription, BrowseNextRequest,
    BrowseNextResponse, BrowsePath, BrowsePathResult, BrowsePathTarget, BrowseRequest,
    BrowseResponse, BrowseResult, ChannelSecurityToken, CloseSessionRequest,
    CloseSessionResponse, CreateSessionRequest, CreateSessionResponse, EndpointDescription,
    FindServersRequest, FindServersResponse, OpenSecureChannelRequest,
    OpenSecureChannelResponse, ReadRequest, ReadResponse, ReferenceDescription, RequestHeader,
    ResponseHeader, ServiceFault, ServiceRequest, ServiceResponse,
    TranslateBrowsePathsToNodeIdsRequest, TranslateBrowsePathsToNodeIdsResponse,
    UserNameIdentityToken, UserTokenPolicy, REMAINING_PATH_COMPLETE,
};
use uabin_client::types::ids::{data_types, objects, reference_types, services as service_ids, variables};
use uabin_client::types::{
    AttributeId, BrowseDirection, ByteString, DateTime, ExpandedNodeId, LocalizedText, NodeId,
    QualifiedName, SecurityMode, SecurityPolicy, StatusCode, UaString,
};

/// Endpoint URL the mock server answers on.
pub const MOCK_ENDPOINT_URL: &str = "opc.tcp://mock.uabin.test:4840";

/// Application URI of the mock server.
pub const MOCK_APPLICATION_URI: &str = "urn:uabin:mock-server";

/// Policy id of the anonymous user token.
pub const ANONYMOUS_POLICY_ID: &str = "anonymous_0";

/// Policy id of the user name token.
pub const USERNAME_POLICY_ID: &str = "username_basic";

/// `NodeClass::Object`.
pub const NODE_CLASS_OBJECT: u32 = 1;
/// `NodeClass::Variable`.
pub const NODE_CLASS_VARIABLE: u32 = 2;
/// `NodeClass::Method`.
pub const NODE_CLASS_METHOD: u32 = 4;
/// `NodeClass::DataType`.
pub const NODE_CLASS_DATA_TYPE: u32 = 64;

const BUFFER_SIZE: u32 = 65_535;
const DUPLEX_CAPACITY: usize = 1 << 20;
const TOKEN_ID: u32 = 1;
const FIRST_SEQUENCE_NUMBER: u32 = 51;
const BAD_CONTINUATION_POINT_INVALID: StatusCode = StatusCode(0x804A_0000);
const TCP_BINARY_PROFILE: &str =
    "http://opcfoundation.org/UA-Profile/Transport/uatcp-uasc-uabinary";

// =============================================================================
// Address Space
// =============================================================================

/// A node of the mock address space.
#[derive(Debug, Clone)]
pub struct MockNode {
    /// Browse name.
    pub browse_name: QualifiedName,
    /// Node class.
    pub node_class: u32,
    /// Value attribute of variables.
    pub value: Option<DataValue>,
}

#[derive(Debug, Clone)]
struct MockReference {
    source: NodeId,
    reference_type: NodeId,
    target: NodeId,
}

/// Nodes and references served by the mock.
///
/// Hierarchical browse paths follow every reference type except
/// `HasEncoding` and `HasDescription`.
#[derive(Debug, Clone)]
pub struct AddressSpace {
    namespaces: Vec<String>,
    nodes: HashMap<NodeId, MockNode>,
    references: Vec<MockReference>,
}

impl AddressSpace {
    /// Creates the standard folders and `Server_NamespaceArray`.
    pub fn new(namespaces: Vec<String>) -> Self {
        let mut space = Self {
            namespaces: Vec::new(),
            nodes: HashMap::new(),
            references: Vec::new(),
        };
        space.add_node(objects::ROOT_FOLDER, QualifiedName::new(0, "Root"), NODE_CLASS_OBJECT, None);
        space.add_object(&objects::ROOT_FOLDER, objects::OBJECTS_FOLDER, QualifiedName::new(0, "Objects"));
        space.add_object(&objects::OBJECTS_FOLDER, objects::SERVER, QualifiedName::new(0, "Server"));
        space.add_node(
            objects::OPC_BINARY_SCHEMA_TYPE_SYSTEM,
            QualifiedName::new(0, "OPC Binary"),
            NODE_CLASS_OBJECT,
            None,
        );
        space.add_variable(
            &objects::SERVER,
            reference_types::HAS_PROPERTY,
            variables::SERVER_NAMESPACE_ARRAY,
            QualifiedName::new(0, "NamespaceArray"),
            Variant::Empty,
        );
        space.set_namespaces(namespaces);
        space
    }

    /// The namespace table.
    pub fn namespaces(&self) -> &[String] {
        &self.namespaces
    }

    /// Replaces the namespace table and the value of `Server_NamespaceArray`.
    pub fn set_namespaces(&mut self, namespaces: Vec<String>) {
        let value = Variant::array(
            BuiltInType::String,
            namespaces.iter().map(|uri| Variant::string(uri.clone())).collect(),
        )
        .unwrap_or_default();
        self.namespaces = namespaces;
        self.set_value(&variables::SERVER_NAMESPACE_ARRAY, value);
    }

    /// Adds a node without references.
    pub fn add_node(
        &mut self,
        id: NodeId,
        browse_name: QualifiedName,
        node_class: u32,
        value: Option<DataValue>,
    ) -> &mut Self {
        self.nodes.insert(
            id,
            MockNode {
                browse_name,
                node_class,
                value,
            },
        );
        self
    }

    /// Adds an object organized by `parent`.
    pub fn add_object(&mut self, parent: &NodeId, id: NodeId, browse_name: QualifiedName) -> &mut Self {
        self.add_node(id.clone(), browse_name, NODE_CLASS_OBJECT, None);
        self.add_reference(parent.clone(), reference_types::ORGANIZES, id)
    }

    /// Adds a method component of `parent`.
    pub fn add_method(&mut self, parent: &NodeId, id: NodeId, browse_name: QualifiedName) -> &mut Self {
        self.add_node(id.clone(), browse_name, NODE_CLASS_METHOD, None);
        self.add_reference(parent.clone(), reference_types::HAS_COMPONENT, id)
    }

    /// Adds a variable referenced from `parent`.
    pub fn add_variable(
        &mut self,
        parent: &NodeId,
        reference_type: NodeId,
        id: NodeId,
        browse_name: QualifiedName,
        value: impl Into<Variant>,
    ) -> &mut Self {
        self.add_node(
            id.clone(),
            browse_name,
            NODE_CLASS_VARIABLE,
            Some(DataValue::new(value)),
        );
        self.add_reference(parent.clone(), reference_type, id)
    }

    /// Adds a forward reference.
    pub fn add_reference(&mut self, source: NodeId, reference_type: NodeId, target: NodeId) -> &mut Self {
        self.references.push(MockReference {
            source,
            reference_type,
            target,
        });
        self
    }

    /// Replaces the value of a node.
    pub fn set_value(&mut self, id: &NodeId, value: impl Into<Variant>) {
        self.set_data_value(id, DataValue::new(value));
    }

    /// Replaces the data value of a node.
    pub fn set_data_value(&mut self, id: &NodeId, value: DataValue) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.value = Some(value);
        }
    }

    /// Returns a node.
    pub fn node(&self, id: &NodeId) -> Option<&MockNode> {
        self.nodes.get(id)
    }

    fn read(&self, id: &NodeId, attribute_id: u32) -> DataValue {
        let Some(node) = self.nodes.get(id) else {
            return DataValue::with_status(StatusCode::BAD_NODE_ID_UNKNOWN);
        };
        let mut value = match AttributeId::from_value(attribute_id) {
            Some(AttributeId::Value) => match &node.value {
                Some(value) => value.clone(),
                None => return DataValue::with_status(StatusCode::BAD_ATTRIBUTE_ID_INVALID),
            },
            Some(AttributeId::BrowseName) => DataValue::new(node.browse_name.clone()),
            Some(AttributeId::DisplayName) => {
                DataValue::new(LocalizedText::text(node.browse_name.name.as_str()))
            }
            Some(AttributeId::NodeClass) => DataValue::new(node.node_class as i32),
            Some(AttributeId::NodeId) => DataValue::new(id.clone()),
            _ => return DataValue::with_status(StatusCode::BAD_ATTRIBUTE_ID_INVALID),
        };
        let now = DateTime::now();
        value.source_timestamp.get_or_insert(now);
        value.server_timestamp = Some(now);
        value
    }

    fn browse(&self, description: &BrowseDescription) -> Result<Vec<ReferenceDescription>, StatusCode> {
        if !self.nodes.contains_key(&description.node_id) {
            return Err(StatusCode::BAD_NODE_ID_UNKNOWN);
        }
        let direction =
            BrowseDirection::from_value(description.browse_direction).unwrap_or_default();
        let wanted = &description.reference_type_id;
        let type_matches = |reference: &MockReference| {
            wanted.is_null()
                || *wanted == reference.reference_type
                || (description.include_subtypes && is_supertype(wanted, &reference.reference_type))
        };

        let mut out = Vec::new();
        for reference in self.references.iter().filter(|r| type_matches(r)) {
            let forward = reference.source == description.node_id;
            let inverse = reference.target == description.node_id;
            let other = match direction {
                BrowseDirection::Forward if forward => &reference.target,
                BrowseDirection::Inverse if inverse => &reference.source,
                BrowseDirection::Both if forward => &reference.target,
                BrowseDirection::Both if inverse => &reference.source,
                _ => continue,
            };
            out.push(self.describe(reference, other, forward));
        }
        Ok(out)
    }

    fn describe(&self, reference: &MockReference, other: &NodeId, is_forward: bool) -> ReferenceDescription {
        let node = self.nodes.get(other);
        let browse_name = node.map(|n| n.browse_name.clone()).unwrap_or_default();
        ReferenceDescription {
            reference_type_id: reference.reference_type.clone(),
            is_forward,
            node_id: ExpandedNodeId::local(other.clone()),
            display_name: LocalizedText::text(browse_name.name.as_str()),
            browse_name,
            node_class: node.map(|n| n.node_class).unwrap_or(0),
            type_definition: ExpandedNodeId::default(),
        }
    }

    fn translate(&self, path: &BrowsePath) -> BrowsePathResult {
        let failed = |status_code| BrowsePathResult {
            status_code,
            targets: None,
        };
        if !self.nodes.contains_key(&path.starting_node) {
            return failed(StatusCode::BAD_NODE_ID_UNKNOWN);
        }
        if path.relative_path.elements.is_empty() {
            return failed(StatusCode::BAD_NOTHING_TO_DO);
        }

        let mut current = vec![path.starting_node.clone()];
        for element in &path.relative_path.elements {
            if element.target_name.is_null() {
                return failed(StatusCode::BAD_BROWSE_NAME_INVALID);
            }
            let mut next: Vec<NodeId> = Vec::new();
            for node in &current {
                for reference in self.references.iter().filter(|r| is_hierarchical(&r.reference_type)) {
                    let candidate = if element.is_inverse {
                        (reference.target == *node).then_some(&reference.source)
                    } else {
                        (reference.source == *node).then_some(&reference.target)
                    };
                    let Some(candidate) = candidate else { continue };
                    let name_matches = self
                        .nodes
                        .get(candidate)
                        .is_some_and(|n| n.browse_name == element.target_name);
                    if name_matches && !next.contains(candidate) {
                        next.push(candidate.clone());
                    }
                }
            }
            if next.is_empty() {
                return failed(StatusCode::BAD_NO_MATCH);
            }
            current = next;
        }

        BrowsePathResult {
            status_code: StatusCode::GOOD,
            targets: Some(
                current
                    .into_iter()
                    .map(|id| BrowsePathTarget {
                        target_id: ExpandedNodeId::local(id),
                        remaining_path_index: REMAINING_PATH_COMPLETE,
                    })
                    .collect(),
            ),
        }
    }
}

fn is_hierarchical(reference_type: &NodeId) -> bool {
    *reference_type != reference_types::HAS_ENCODING
        && *reference_type != reference_types::HAS_DESCRIPTION
}

fn is_supertype(wanted: &NodeId, reference_type: &NodeId) -> bool {
    *wanted == reference_types::REFERENCES
        || (*wanted == reference_types::HIERARCHICAL_REFERENCES && is_hierarchical(reference_type))
}

// =============================================================================
// Fault Injection
// =============================================================================

/// Faults the mock server can inject.
#[derive(Debug, Default)]
pub struct MockFaults {
    /// Delay before every response.
    response_delay: Mutex<Duration>,

    /// Extra delay of reads touching a node.
    slow_nodes: Mutex<HashMap<NodeId, Duration>>,

    /// Skip one sequence number before the next response.
    skip_sequence_number: AtomicBool,

    /// Flip a byte of the next response frame.
    corrupt_next_frame: AtomicBool,

    /// Forget every session before the next session service.
    invalidate_sessions: AtomicBool,

    /// Close the connection instead of answering the next request.
    drop_next_request: AtomicBool,

    /// Answer the next request with an abort chunk.
    abort_next_response: AtomicBool,

    /// Echo a wrong request handle in the next service response.
    corrupt_request_handle: AtomicBool,

    /// Never answer keep-alive requests.
    ignore_keepalives: AtomicBool,

    /// Refuse every connection.
    refuse_connections: AtomicBool,

    /// Endpoint URLs that refuse connections.
    unreachable: Mutex<HashSet<String>>,

    /// Body bytes per response chunk; 0 sends single chunks.
    chunk_size: AtomicUsize,

    /// References per browse result; 0 sends everything at once.
    browse_page_size: AtomicUsize,
}

// =============================================================================
// Counters
// =============================================================================

/// Interactions recorded by the mock server.
#[derive(Debug, Default)]
pub struct MockCounters {
    connections: AtomicU64,
    closed_channels: AtomicU64,
    requests: AtomicU64,
    keepalives: AtomicU64,
    sessions_created: AtomicU64,
    sessions_activated: AtomicU64,
    sessions_closed: AtomicU64,
    reads: AtomicU64,
    browses: AtomicU64,
    browse_nexts: AtomicU64,
    translates: AtomicU64,
    node_reads: Mutex<HashMap<NodeId, u64>>,
    translated_names: Mutex<Vec<String>>,
    identities: Mutex<Vec<String>>,
    channel_modes: Mutex<Vec<SecurityMode>>,
}

impl MockCounters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

// =============================================================================
// Mock Server
// =============================================================================

struct SessionEntry {
    activated: bool,
}

struct Inner {
    space: RwLock<AddressSpace>,
    faults: MockFaults,
    counters: MockCounters,
    users: Mutex<HashMap<String, String>>,
    sessions: Mutex<HashMap<NodeId, SessionEntry>>,
    continuations: Mutex<HashMap<Vec<u8>, Vec<ReferenceDescription>>>,
    next_channel_id: AtomicU32,
    next_session_id: AtomicU32,
    next_continuation: AtomicU32,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// A configurable in-process OPC UA server.
///
/// Clones share the same address space, faults and counters.
#[derive(Clone)]
pub struct MockServer {
    inner: Arc<Inner>,
}

impl MockServer {
    /// Creates a server over `space`.
    pub fn new(space: AddressSpace) -> Self {
        Self {
            inner: Arc::new(Inner {
                space: RwLock::new(space),
                faults: MockFaults::default(),
                counters: MockCounters::default(),
                users: Mutex::new(HashMap::new()),
                sessions: Mutex::new(HashMap::new()),
                continuations: Mutex::new(HashMap::new()),
                next_channel_id: AtomicU32::new(0),
                next_session_id: AtomicU32::new(0),
                next_continuation: AtomicU32::new(0),
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Accepts `username` with `password`.
    pub fn add_user(&self, username: impl Into<String>, password: impl Into<String>) {
        self.inner.users.lock().insert(username.into(), password.into());
    }

    /// Runs `f` with the address space.
    pub fn with_address_space<T>(&self, f: impl FnOnce(&mut AddressSpace) -> T) -> T {
        f(&mut self.inner.space.write())
    }

    /// Replaces the value of a node.
    pub fn set_value(&self, id: &NodeId, value: impl Into<Variant>) {
        self.inner.space.write().set_value(id, value);
    }

    /// Aborts every connection task.
    pub fn shutdown(&self) {
        for task in self.inner.tasks.lock().drain(..) {
            task.abort();
        }
    }

    // -------------------------------------------------------------------------
    // Fault configuration
    // -------------------------------------------------------------------------

    /// Delays every response.
    pub fn set_response_delay(&self, delay: Duration) {
        *self.inner.faults.response_delay.lock() = delay;
    }

    /// Delays reads that include `node`.
    pub fn delay_reads_of(&self, node: NodeId, delay: Duration) {
        self.inner.faults.slow_nodes.lock().insert(node, delay);
    }

    /// Skips one sequence number before the next response.
    pub fn skip_next_sequence_number(&self) {
        self.inner.faults.skip_sequence_number.store(true, Ordering::SeqCst);
    }

    /// Corrupts the last byte of the next response frame.
    pub fn corrupt_next_frame(&self) {
        self.inner.faults.corrupt_next_frame.store(true, Ordering::SeqCst);
    }

    /// Forgets all sessions when the next session service arrives.
    pub fn invalidate_sessions(&self) {
        self.inner.faults.invalidate_sessions.store(true, Ordering::SeqCst);
    }

    /// Closes the connection instead of answering the next request.
    pub fn drop_next_request(&self) {
        self.inner.faults.drop_next_request.store(true, Ordering::SeqCst);
    }

    /// Answers the next request with an abort chunk.
    pub fn abort_next_response(&self) {
        self.inner.faults.abort_next_response.store(true, Ordering::SeqCst);
    }

    /// Echoes a wrong request handle in the next service response.
    pub fn corrupt_next_request_handle(&self) {
        self.inner.faults.corrupt_request_handle.store(true, Ordering::SeqCst);
    }

    /// Stops or resumes answering keep-alive requests.
    pub fn ignore_keepalives(&self, ignore: bool) {
        self.inner.faults.ignore_keepalives.store(ignore, Ordering::SeqCst);
    }

    /// Refuses or accepts all connections.
    pub fn refuse_connections(&self, refuse: bool) {
        self.inner.faults.refuse_connections.store(refuse, Ordering::SeqCst);
    }

    /// Refuses connections to one endpoint URL.
    pub fn mark_unreachable(&self, endpoint_url: impl Into<String>) {
        self.inner.faults.unreachable.lock().insert(endpoint_url.into());
    }

    /// Splits responses into chunks of `body_size` bytes.
    pub fn split_responses(&self, body_size: usize) {
        self.inner.faults.chunk_size.store(body_size, Ordering::SeqCst);
    }

    /// Returns at most `size` references per browse result.
    pub fn set_browse_page_size(&self, size: usize) {
        self.inner.faults.browse_page_size.store(size, Ordering::SeqCst);
    }

    // -------------------------------------------------------------------------
    // Verification
    // -------------------------------------------------------------------------

    /// Transport connections accepted.
    pub fn connections(&self) -> u64 {
        self.inner.counters.connections.load(Ordering::Relaxed)
    }

    /// CloseSecureChannel messages received.
    pub fn closed_channels(&self) -> u64 {
        self.inner.counters.closed_channels.load(Ordering::Relaxed)
    }

    /// Service requests received, keep-alives included.
    pub fn requests(&self) -> u64 {
        self.inner.counters.requests.load(Ordering::Relaxed)
    }

    /// Keep-alive requests received.
    pub fn keepalives(&self) -> u64 {
        self.inner.counters.keepalives.load(Ordering::Relaxed)
    }

    /// Sessions created.
    pub fn sessions_created(&self) -> u64 {
        self.inner.counters.sessions_created.load(Ordering::Relaxed)
    }

    /// Sessions activated.
    pub fn sessions_activated(&self) -> u64 {
        self.inner.counters.sessions_activated.load(Ordering::Relaxed)
    }

    /// Sessions closed by the client.
    pub fn sessions_closed(&self) -> u64 {
        self.inner.counters.sessions_closed.load(Ordering::Relaxed)
    }

    /// Read requests received.
    pub fn reads(&self) -> u64 {
        self.inner.counters.reads.load(Ordering::Relaxed)
    }

    /// Browse requests received.
    pub fn browses(&self) -> u64 {
        self.inner.counters.browses.load(Ordering::Relaxed)
    }

    /// BrowseNext requests received.
    pub fn browse_nexts(&self) -> u64 {
        self.inner.counters.browse_nexts.load(Ordering::Relaxed)
    }

    /// TranslateBrowsePathsToNodeIds requests received.
    pub fn translates(&self) -> u64 {
        self.inner.counters.translates.load(Ordering::Relaxed)
    }

    /// Times `node` was read.
    pub fn read_count(&self, node: &NodeId) -> u64 {
        self.inner.counters.node_reads.lock().get(node).copied().unwrap_or(0)
    }

    /// Last browse names of translated paths, in arrival order.
    pub fn translated_names(&self) -> Vec<String> {
        self.inner.counters.translated_names.lock().clone()
    }

    /// Identities of activated sessions: `anonymous` or the user name.
    pub fn identities(&self) -> Vec<String> {
        self.inner.counters.identities.lock().clone()
    }

    /// Security modes of opened channels.
    pub fn channel_modes(&self) -> Vec<SecurityMode> {
        self.inner.counters.channel_modes.lock().clone()
    }

    /// Sessions the server currently knows.
    pub fn open_sessions(&self) -> usize {
        self.inner.sessions.lock().len()
    }
}

impl std::fmt::Debug for MockServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockServer")
            .field("connections", &self.connections())
            .field("requests", &self.requests())
            .field("open_sessions", &self.open_sessions())
            .finish()
    }
}

#[async_trait]
impl Connector for MockServer {
    async fn connect(&self, endpoint_url: &str) -> UaResult<BoxedStream> {
        let faults = &self.inner.faults;
        if faults.refuse_connections.load(Ordering::SeqCst)
            || faults.unreachable.lock().contains(endpoint_url)
        {
            return Err(ConnectionError::refused_with(
                endpoint_url,
                std::io::Error::from(std::io::ErrorKind::ConnectionRefused),
            )
            .into());
        }

        let (client, server) = tokio::io::duplex(DUPLEX_CAPACITY);
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            if let Err(e) = serve(inner, server).await {
                debug!(error = %e, "Mock connection ended with error");
            }
        });
        self.inner.tasks.lock().push(task);
        Ok(Box::new(client))
    }
}

// =============================================================================
// Connection Handling
// =============================================================================

struct ServerWriter {
    stream: WriteHalf<DuplexStream>,
    sequence_number: u32,
}

struct ServerChannel {
    channel_id: u32,
    security: ChannelSecurity,
    writer: AsyncMutex<ServerWriter>,
}

impl ServerChannel {
    async fn send(&self, faults: &MockFaults, request_id: u32, body: &[u8]) -> UaResult<()> {
        let mut writer = self.writer.lock().await;

        if faults.abort_next_response.swap(false, Ordering::SeqCst) {
            let abort = ErrorMessage::new(StatusCode::BAD_RESPONSE_TOO_LARGE, "response aborted");
            let sequence_number = writer.next_sequence_number(faults);
            let frame = self.security.seal(
                MessageType::Message,
                ChunkType::Abort,
                self.channel_id,
                TOKEN_ID,
                sequence_number,
                request_id,
                &abort.to_bytes(),
            )?;
            return write_frame(&mut writer.stream, &frame).await;
        }

        let chunk_size = faults.chunk_size.load(Ordering::SeqCst);
        let pieces: Vec<&[u8]> = if chunk_size == 0 || body.is_empty() {
            vec![body]
        } else {
            body.chunks(chunk_size).collect()
        };
        let last = pieces.len() - 1;
        for (index, piece) in pieces.into_iter().enumerate() {
            let chunk_type = if index == last {
                ChunkType::Final
            } else {
                ChunkType::Intermediate
            };
            let sequence_number = writer.next_sequence_number(faults);
            let mut frame = self
                .security
                .seal(
                    MessageType::Message,
                    chunk_type,
                    self.channel_id,
                    TOKEN_ID,
                    sequence_number,
                    request_id,
                    piece,
                )?
                .to_vec();
            if faults.corrupt_next_frame.swap(false, Ordering::SeqCst) {
                if let Some(byte) = frame.last_mut() {
                    *byte ^= 0xFF;
                }
            }
            write_frame(&mut writer.stream, &frame).await?;
        }
        Ok(())
    }

    async fn close(&self) {
        let _ = self.writer.lock().await.stream.shutdown().await;
    }
}

impl ServerWriter {
    fn next_sequence_number(&mut self, faults: &MockFaults) -> u32 {
        if faults.skip_sequence_number.swap(false, Ordering::SeqCst) {
            self.sequence_number = self.sequence_number.wrapping_add(1);
        }
        let sequence_number = self.sequence_number;
        self.sequence_number = sequence_number.wrapping_add(1);
        sequence_number
    }
}

async fn serve(inner: Arc<Inner>, stream: DuplexStream) -> UaResult<()> {
    MockCounters::bump(&inner.counters.connections);
    let (mut reader, mut writer) = tokio::io::split(stream);

    let Some(frame) = read_frame(&mut reader, 0).await? else {
        return Ok(());
    };
    if frame.message_type != MessageType::Hello {
        return Err(UaError::malformed(format!("expected Hello, got {}", frame.message_type)));
    }
    let hello = HelloMessage::from_bytes(frame.payload())?;
    let ack = AcknowledgeMessage {
        protocol_version: 0,
        receive_buffer_size: hello.send_buffer_size.min(BUFFER_SIZE),
        send_buffer_size: hello.receive_buffer_size.min(BUFFER_SIZE),
        max_message_size: 0,
        max_chunk_count: 0,
    };
    write_frame(
        &mut writer,
        &encode_frame(MessageType::Acknowledge, ChunkType::Final, &ack.to_bytes()),
    )
    .await?;

    let Some(frame) = read_frame(&mut reader, 0).await? else {
        return Ok(());
    };
    let open = OpenChunk::decode(&frame)?;
    let (_, rest) = split_type_id(&open.body)?;
    let request = OpenSecureChannelRequest::from_bytes(rest)?;
    let mode = SecurityMode::from_value(request.security_mode).unwrap_or_default();
    let server_nonce = if mode == SecurityMode::None {
        ByteString::null()
    } else {
        ByteString::from(generate_nonce())
    };
    let security = ChannelSecurity::derive(
        mode,
        SecurityRole::Server,
        request.client_nonce.as_bytes(),
        server_nonce.as_bytes(),
    )?;
    let channel_id = inner.next_channel_id.fetch_add(1, Ordering::Relaxed) + 1;
    inner.counters.channel_modes.lock().push(mode);

    let response = OpenSecureChannelResponse {
        response_header: ResponseHeader::new(request.request_header.request_handle, StatusCode::GOOD),
        server_protocol_version: 0,
        security_token: ChannelSecurityToken {
            channel_id,
            token_id: TOKEN_ID,
            created_at: DateTime::now(),
            revised_lifetime: request.requested_lifetime,
        },
        server_nonce,
    };
    let reply = OpenChunk::new(
        channel_id,
        open.security_policy_uri.as_str(),
        FIRST_SEQUENCE_NUMBER,
        open.request_id,
        encode_message(&OpenSecureChannelResponse::TYPE_ID, &response),
    );
    write_frame(&mut writer, &reply.encode()).await?;
    debug!(channel_id, mode = %mode, "Mock channel opened");

    let channel = Arc::new(ServerChannel {
        channel_id,
        security,
        writer: AsyncMutex::new(ServerWriter {
            stream: writer,
            sequence_number: FIRST_SEQUENCE_NUMBER + 1,
        }),
    });

    let mut partials: HashMap<u32, Vec<u8>> = HashMap::new();
    loop {
        let frame = match read_frame(&mut reader, 0).await {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(e) => {
                debug!(error = %e, "Mock connection read failed");
                break;
            }
        };
        if frame.message_type == MessageType::Close {
            MockCounters::bump(&inner.counters.closed_channels);
            break;
        }
        if frame.message_type != MessageType::Message {
            warn!(message_type = %frame.message_type, "Mock server got unexpected frame");
            break;
        }
        let chunk = match channel.security.open(&frame) {
            Ok(chunk) => chunk,
            Err(e) => {
                warn!(error = %e, "Mock server rejected chunk");
                break;
            }
        };

        partials.entry(chunk.request_id).or_default().extend_from_slice(&chunk.body);
        match chunk.chunk_type {
            ChunkType::Intermediate => continue,
            ChunkType::Abort => {
                partials.remove(&chunk.request_id);
                continue;
            }
            ChunkType::Final => {}
        }
        let body = partials.remove(&chunk.request_id).unwrap_or_default();

        if inner.faults.drop_next_request.swap(false, Ordering::SeqCst) {
            debug!(channel_id, "Mock server dropping connection");
            break;
        }

        let inner = Arc::clone(&inner);
        let channel = Arc::clone(&channel);
        let request_id = chunk.request_id;
        tokio::spawn(async move {
            let Some(response) = dispatch(&inner, &body).await else {
                return;
            };
            let delay = *inner.faults.response_delay.lock();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if let Err(e) = channel.send(&inner.faults, request_id, &response).await {
                debug!(error = %e, "Mock response not sent");
            }
        });
    }

    channel.close().await;
    Ok(())
}

// =============================================================================
// Services
// =============================================================================

fn is<R: ServiceRequest>(type_id: &NodeId) -> bool {
    *type_id == R::TYPE_ID
}

fn reply<R: ServiceResponse>(response: &R) -> Bytes {
    encode_message(&R::TYPE_ID, response)
}

fn fault(request_handle: u32, status: StatusCode) -> Bytes {
    encode_message(
        &service_ids::SERVICE_FAULT,
        &ServiceFault {
            response_header: ResponseHeader::new(request_handle, status),
        },
    )
}

/// Handles one request body. `None` leaves the request unanswered.
async fn dispatch(inner: &Inner, body: &[u8]) -> Option<Bytes> {
    MockCounters::bump(&inner.counters.requests);
    let (type_id, rest) = match split_type_id(body) {
        Ok(parts) => parts,
        Err(_) => return Some(fault(0, StatusCode::BAD_DECODING_ERROR)),
    };
    let keepalive = is::<FindServersRequest>(&type_id);
    let outcome = if keepalive {
        MockCounters::bump(&inner.counters.keepalives);
        if inner.faults.ignore_keepalives.load(Ordering::SeqCst) {
            return None;
        }
        FindServersRequest::from_bytes(rest).map(|r| find_servers(&r))
    } else if is::<CreateSessionRequest>(&type_id) {
        CreateSessionRequest::from_bytes(rest).map(|r| inner.create_session(&r))
    } else if is::<ActivateSessionRequest>(&type_id) {
        ActivateSessionRequest::from_bytes(rest).map(|r| inner.activate_session(&r))
    } else if is::<CloseSessionRequest>(&type_id) {
        CloseSessionRequest::from_bytes(rest).map(|r| inner.close_session(&r))
    } else if is::<ReadRequest>(&type_id) {
        match ReadRequest::from_bytes(rest) {
            Ok(request) => Ok(inner.read(&request).await),
            Err(e) => Err(e),
        }
    } else if is::<BrowseRequest>(&type_id) {
        BrowseRequest::from_bytes(rest).map(|r| inner.browse(&r))
    } else if is::<BrowseNextRequest>(&type_id) {
        BrowseNextRequest::from_bytes(rest).map(|r| inner.browse_next(&r))
    } else if is::<TranslateBrowsePathsToNodeIdsRequest>(&type_id) {
        TranslateBrowsePathsToNodeIdsRequest::from_bytes(rest).map(|r| inner.translate(&r))
    } else {
        let handle = BinaryDecoder::new(rest)
            .read::<RequestHeader>()
            .map(|h| h.request_handle)
            .unwrap_or(0);
        return Some(fault(handle, StatusCode::BAD_SERVICE_UNSUPPORTED));
    };
    let response = outcome.unwrap_or_else(|_| fault(0, StatusCode::BAD_DECODING_ERROR));
    if !keepalive && inner.faults.corrupt_request_handle.swap(false, Ordering::SeqCst) {
        return Some(with_wrong_request_handle(&response));
    }
    Some(response)
}

/// Bumps the request handle of an encoded response.
///
/// The handle follows the type id and the 8 byte header timestamp.
fn with_wrong_request_handle(response: &[u8]) -> Bytes {
    let mut body = response.to_vec();
    let Ok((_, rest)) = split_type_id(response) else {
        return Bytes::from(body);
    };
    let offset = response.len() - rest.len() + 8;
    if let Some(field) = body.get_mut(offset..offset + 4) {
        let handle = u32::from_le_bytes([field[0], field[1], field[2], field[3]]);
        field.copy_from_slice(&handle.wrapping_add(1000).to_le_bytes());
    }
    Bytes::from(body)
}

fn application_description() -> ApplicationDescription {
    ApplicationDescription {
        application_uri: UaString::from(MOCK_APPLICATION_URI),
        product_uri: UaString::from("urn:uabin:mock"),
        application_name: LocalizedText::text("uabin mock server"),
        application_type: 0,
        discovery_urls: Some(vec![UaString::from(MOCK_ENDPOINT_URL)]),
        ..ApplicationDescription::default()
    }
}

fn find_servers(request: &FindServersRequest) -> Bytes {
    reply(&FindServersResponse {
        response_header: ResponseHeader::new(request.request_header.request_handle, StatusCode::GOOD),
        servers: Some(vec![application_description()]),
    })
}

fn endpoints(endpoint_url: &UaString) -> Vec<EndpointDescription> {
    let tokens = vec![
        UserTokenPolicy {
            policy_id: UaString::from(ANONYMOUS_POLICY_ID),
            token_type: 0,
            ..UserTokenPolicy::default()
        },
        UserTokenPolicy {
            policy_id: UaString::from(USERNAME_POLICY_ID),
            token_type: 1,
            ..UserTokenPolicy::default()
        },
    ];
    [
        (SecurityMode::None, SecurityPolicy::None, 0),
        (SecurityMode::Sign, SecurityPolicy::Basic256Sha256, 1),
        (SecurityMode::SignAndEncrypt, SecurityPolicy::Basic256Sha256, 2),
    ]
    .into_iter()
    .map(|(mode, policy, level)| EndpointDescription {
        endpoint_url: endpoint_url.clone(),
        server: application_description(),
        security_mode: mode.value(),
        security_policy_uri: UaString::from(policy.uri()),
        user_identity_tokens: Some(tokens.clone()),
        transport_profile_uri: UaString::from(TCP_BINARY_PROFILE),
        security_level: level,
        ..EndpointDescription::default()
    })
    .collect()
}

impl Inner {
    /// Validates the authentication token of a session service.
    fn check_session(&self, header: &RequestHeader, require_activated: bool) -> Result<(), StatusCode> {
        let mut sessions = self.sessions.lock();
        if self.faults.invalidate_sessions.swap(false, Ordering::SeqCst) {
            debug!(count = sessions.len(), "Mock server forgetting sessions");
            sessions.clear();
        }
        match sessions.get(&header.authentication_token) {
            None => Err(StatusCode::BAD_SESSION_ID_INVALID),
            Some(entry) if require_activated && !entry.activated => {
                Err(StatusCode::BAD_SESSION_NOT_ACTIVATED)
            }
            Some(_) => Ok(()),
        }
    }

    fn create_session(&self, request: &CreateSessionRequest) -> Bytes {
        let n = self.next_session_id.fetch_add(1, Ordering::Relaxed) + 1;
        let session_id = NodeId::numeric(1, n);
        let token = NodeId::numeric(1, 1_000_000 + n);
        self.sessions
            .lock()
            .insert(token.clone(), SessionEntry { activated: false });
        MockCounters::bump(&self.counters.sessions_created);

        reply(&CreateSessionResponse {
            response_header: ResponseHeader::new(request.request_header.request_handle, StatusCode::GOOD),
            session_id,
            authentication_token: token,
            revised_session_timeout: request.requested_session_timeout,
            server_nonce: ByteString::from(generate_nonce()),
            server_endpoints: Some(endpoints(&request.endpoint_url)),
            max_request_message_size: 0,
            ..CreateSessionResponse::default()
        })
    }

    fn activate_session(&self, request: &ActivateSessionRequest) -> Bytes {
        let handle = request.request_header.request_handle;
        if let Err(status) = self.check_session(&request.request_header, false) {
            return fault(handle, status);
        }

        let token = &request.user_identity_token;
        let identity = if token.type_id == data_types::ANONYMOUS_IDENTITY_TOKEN_ENCODING {
            match token.decode_as::<AnonymousIdentityToken>() {
                Ok(t) if t.policy_id.as_str() == ANONYMOUS_POLICY_ID => "anonymous".to_string(),
                _ => return fault(handle, StatusCode::BAD_IDENTITY_TOKEN_INVALID),
            }
        } else if token.type_id == data_types::USER_NAME_IDENTITY_TOKEN_ENCODING {
            let Ok(t) = token.decode_as::<UserNameIdentityToken>() else {
                return fault(handle, StatusCode::BAD_IDENTITY_TOKEN_INVALID);
            };
            if t.policy_id.as_str() != USERNAME_POLICY_ID {
                return fault(handle, StatusCode::BAD_IDENTITY_TOKEN_INVALID);
            }
            let user = t.user_name.as_str().to_string();
            let accepted = self
                .users
                .lock()
                .get(&user)
                .is_some_and(|password| password.as_bytes() == t.password.as_bytes());
            if !accepted {
                return fault(handle, StatusCode::BAD_USER_ACCESS_DENIED);
            }
            user
        } else {
            return fault(handle, StatusCode::BAD_IDENTITY_TOKEN_INVALID);
        };

        if let Some(entry) = self.sessions.lock().get_mut(&request.request_header.authentication_token) {
            entry.activated = true;
        }
        self.counters.identities.lock().push(identity);
        MockCounters::bump(&self.counters.sessions_activated);

        reply(&ActivateSessionResponse {
            response_header: ResponseHeader::new(handle, StatusCode::GOOD),
            server_nonce: ByteString::from(generate_nonce()),
            results: None,
            diagnostic_infos: None,
        })
    }

    fn close_session(&self, request: &CloseSessionRequest) -> Bytes {
        let handle = request.request_header.request_handle;
        if let Err(status) = self.check_session(&request.request_header, false) {
            return fault(handle, status);
        }
        self.sessions.lock().remove(&request.request_header.authentication_token);
        MockCounters::bump(&self.counters.sessions_closed);
        reply(&CloseSessionResponse {
            response_header: ResponseHeader::new(handle, StatusCode::GOOD),
        })
    }

    async fn read(&self, request: &ReadRequest) -> Bytes {
        let handle = request.request_header.request_handle;
        if let Err(status) = self.check_session(&request.request_header, true) {
            return fault(handle, status);
        }
        MockCounters::bump(&self.counters.reads);
        let nodes = request.nodes_to_read.as_deref().unwrap_or_default();
        if nodes.is_empty() {
            return fault(handle, StatusCode::BAD_NOTHING_TO_DO);
        }

        let delay = {
            let slow = self.faults.slow_nodes.lock();
            nodes
                .iter()
                .filter_map(|n| slow.get(&n.node_id).copied())
                .max()
                .unwrap_or_default()
        };
        {
            let mut counts = self.counters.node_reads.lock();
            for node in nodes {
                *counts.entry(node.node_id.clone()).or_default() += 1;
            }
        }
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let results = {
            let space = self.space.read();
            nodes
                .iter()
                .map(|n| space.read(&n.node_id, n.attribute_id))
                .collect()
        };
        reply(&ReadResponse {
            response_header: ResponseHeader::new(handle, StatusCode::GOOD),
            results: Some(results),
            diagnostic_infos: None,
        })
    }

    fn browse(&self, request: &BrowseRequest) -> Bytes {
        let handle = request.request_header.request_handle;
        if let Err(status) = self.check_session(&request.request_header, true) {
            return fault(handle, status);
        }
        MockCounters::bump(&self.counters.browses);
        let results = request
            .nodes_to_browse
            .iter()
            .flatten()
            .map(|description| {
                let references = self.space.read().browse(description);
                match references {
                    Ok(references) => self.page(references),
                    Err(status_code) => BrowseResult {
                        status_code,
                        ..BrowseResult::default()
                    },
                }
            })
            .collect();
        reply(&BrowseResponse {
            response_header: ResponseHeader::new(handle, StatusCode::GOOD),
            results: Some(results),
            diagnostic_infos: None,
        })
    }

    fn browse_next(&self, request: &BrowseNextRequest) -> Bytes {
        let handle = request.request_header.request_handle;
        if let Err(status) = self.check_session(&request.request_header, true) {
            return fault(handle, status);
        }
        MockCounters::bump(&self.counters.browse_nexts);
        let results = request
            .continuation_points
            .iter()
            .flatten()
            .map(|point| {
                let remaining = self.continuations.lock().remove(point.as_bytes());
                match remaining {
                    Some(_) if request.release_continuation_points => BrowseResult::default(),
                    Some(references) => self.page(references),
                    None => BrowseResult {
                        status_code: BAD_CONTINUATION_POINT_INVALID,
                        ..BrowseResult::default()
                    },
                }
            })
            .collect();
        reply(&BrowseNextResponse {
            response_header: ResponseHeader::new(handle, StatusCode::GOOD),
            results: Some(results),
            diagnostic_infos: None,
        })
    }

    fn page(&self, mut references: Vec<ReferenceDescription>) -> BrowseResult {
        let size = self.faults.browse_page_size.load(Ordering::SeqCst);
        let mut continuation_point = ByteString::null();
        if size > 0 && references.len() > size {
            let rest = references.split_off(size);
            let id = self.next_continuation.fetch_add(1, Ordering::Relaxed) + 1;
            let point = id.to_le_bytes().to_vec();
            self.continuations.lock().insert(point.clone(), rest);
            continuation_point = ByteString::from(point);
        }
        BrowseResult {
            status_code: StatusCode::GOOD,
            continuation_point,
            references: Some(references),
        }
    }

    fn translate(&self, request: &TranslateBrowsePathsToNodeIdsRequest) -> Bytes {
        let handle = request.request_header.request_handle;
        if let Err(status) = self.check_session(&request.request_header, true) {
            return fault(handle, status);
        }
        MockCounters::bump(&self.counters.translates);
        let paths = request.browse_paths.as_deref().unwrap_or_default();
        {
            let mut names = self.counters.translated_names.lock();
            for path in paths {
                if let Some(element) = path.relative_path.elements.last() {
                    names.push(element.target_name.name.as_str().to_string());
                }
            }
        }
        let results = {
            let space = self.space.read();
            paths.iter().map(|path| space.translate(path)).collect()
        };
        reply(&TranslateBrowsePathsToNodeIdsResponse {
            response_header: ResponseHeader::new(handle, StatusCode::GOOD),
            results: Some(results),
            diagnostic_infos: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uabin_client::types::RelativePath;

    fn space() -> AddressSpace {
        let mut space = AddressSpace::new(vec!["http://opcfoundation.org/UA/".into(), "urn:test".into()]);
        space.add_object(&objects::OBJECTS_FOLDER, NodeId::string(1, "Plant"), QualifiedName::new(1, "Plant"));
        space.add_variable(
            &NodeId::string(1, "Plant"),
            reference_types::HAS_COMPONENT,
            NodeId::string(1, "Plant.Speed"),
            QualifiedName::new(1, "Speed"),
            12.5f64,
        );
        space
    }

    #[test]
    fn test_translate_walks_hierarchy() {
        let space = space();
        let path = BrowsePath {
            starting_node: objects::OBJECTS_FOLDER,
            relative_path: RelativePath::from_iter([
                QualifiedName::new(1, "Plant"),
                QualifiedName::new(1, "Speed"),
            ]),
        };
        let result = space.translate(&path);
        assert_eq!(result.status_code, StatusCode::GOOD);
        let targets = result.targets.unwrap();
        assert_eq!(targets[0].target_id, ExpandedNodeId::local(NodeId::string(1, "Plant.Speed")));
    }

    #[test]
    fn test_translate_no_match() {
        let space = space();
        let path = BrowsePath {
            starting_node: objects::OBJECTS_FOLDER,
            relative_path: RelativePath::from_iter([QualifiedName::new(1, "Missing")]),
        };
        assert_eq!(space.translate(&path).status_code, StatusCode::BAD_NO_MATCH);
    }

    #[test]
    fn test_read_attributes() {
        let space = space();
        let speed = NodeId::string(1, "Plant.Speed");
        assert_eq!(space.read(&speed, 13).value, Some(Variant::Double(12.5)));
        assert_eq!(
            space.read(&NodeId::numeric(1, 99), 13).status(),
            StatusCode::BAD_NODE_ID_UNKNOWN
        );
        assert_eq!(
            space.read(&NodeId::string(1, "Plant"), 13).status(),
            StatusCode::BAD_ATTRIBUTE_ID_INVALID
        );
    }

    #[test]
    fn test_namespace_array_value() {
        let space = space();
        let value = space.read(&variables::SERVER_NAMESPACE_ARRAY, 13).value.unwrap();
        assert_eq!(value.as_array().map(|a| a.len()), Some(2));
    }
}
