// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Client facade.
//!
//! A [`Client`] connects lazily on the first call, trying the configured
//! discovery URLs in order. Each connection owns one activated [`Session`]
//! and one [`TypeDictionary`]. A channel-fatal error drops the connection;
//! the next call connects again.

use std::ops::Index;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use crate::channel::{ChannelConfig, Connector, SecureChannel, TcpConnector};
use crate::codec::{decode_nested, raw_encoding_ids, Variant};
use crate::dictionary::{DataTypeDefinition, StructureDefinition, TypeDictionary, UnionDefinition};
use crate::error::{ConnectionError, TargetError, UaError, UaResult};
use crate::resolver::AddressResolver;
use crate::session::Session;
use crate::settings::ClientSettings;
use crate::types::{Address, AttributeId, DateTime, NamespaceArray, NodeId, StatusCode};

/// Rounds of dictionary loading per value. Decoded bodies can expose
/// further raw bodies in `Variant` fields.
const MAX_DECODE_ROUNDS: usize = 4;

// =============================================================================
// ReadResult
// =============================================================================

/// Outcome of reading one address.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadResultTarget {
    /// Node the address resolved to.
    pub node_id: Option<NodeId>,
    /// Status reported by the server, or a bad code for local failures.
    pub status_code: StatusCode,
    /// Local failure: resolution or decoding.
    pub error: Option<TargetError>,
    /// The value. Undecodable bodies stay raw.
    pub data: Option<Variant>,
    /// Source timestamp.
    pub source_timestamp: Option<DateTime>,
    /// Server timestamp.
    pub server_timestamp: Option<DateTime>,
}

impl ReadResultTarget {
    fn failed(error: TargetError) -> Self {
        Self {
            node_id: None,
            status_code: error.kind.status_code(),
            error: Some(error),
            data: None,
            source_timestamp: None,
            server_timestamp: None,
        }
    }

    /// Returns `true` if the value was read and decoded.
    pub fn is_good(&self) -> bool {
        self.error.is_none() && self.status_code.is_good()
    }
}

/// Results of a batch read, in address order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReadResult {
    targets: Vec<ReadResultTarget>,
}

impl ReadResult {
    /// Number of targets.
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Returns `true` for an empty batch.
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Target `index`.
    pub fn get(&self, index: usize) -> Option<&ReadResultTarget> {
        self.targets.get(index)
    }

    /// Iterates the targets.
    pub fn iter(&self) -> std::slice::Iter<'_, ReadResultTarget> {
        self.targets.iter()
    }

    /// Returns `true` if every target is good.
    pub fn all_good(&self) -> bool {
        self.targets.iter().all(ReadResultTarget::is_good)
    }

    /// The targets.
    pub fn into_targets(self) -> Vec<ReadResultTarget> {
        self.targets
    }
}

impl Index<usize> for ReadResult {
    type Output = ReadResultTarget;

    fn index(&self, index: usize) -> &ReadResultTarget {
        &self.targets[index]
    }
}

impl IntoIterator for ReadResult {
    type Item = ReadResultTarget;
    type IntoIter = std::vec::IntoIter<ReadResultTarget>;

    fn into_iter(self) -> Self::IntoIter {
        self.targets.into_iter()
    }
}

impl<'a> IntoIterator for &'a ReadResult {
    type Item = &'a ReadResultTarget;
    type IntoIter = std::slice::Iter<'a, ReadResultTarget>;

    fn into_iter(self) -> Self::IntoIter {
        self.targets.iter()
    }
}

// =============================================================================
// ClientStats
// =============================================================================

/// Client counters.
#[derive(Debug, Default)]
pub struct ClientStats {
    connections: AtomicU64,
    connection_failures: AtomicU64,
    reads: AtomicU64,
    targets: AtomicU64,
    target_failures: AtomicU64,
    dictionary_loads: AtomicU64,
}

impl ClientStats {
    /// Connections established.
    pub fn connections(&self) -> u64 {
        self.connections.load(Ordering::Relaxed)
    }

    /// Discovery URLs that failed to connect.
    pub fn connection_failures(&self) -> u64 {
        self.connection_failures.load(Ordering::Relaxed)
    }

    /// Batch reads.
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// Addresses read.
    pub fn targets(&self) -> u64 {
        self.targets.load(Ordering::Relaxed)
    }

    /// Addresses that failed locally.
    pub fn target_failures(&self) -> u64 {
        self.target_failures.load(Ordering::Relaxed)
    }

    /// Dictionary documents fetched, over all connections.
    pub fn dictionary_loads(&self) -> u64 {
        self.dictionary_loads.load(Ordering::Relaxed)
    }

    fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }
}

// =============================================================================
// Client
// =============================================================================

struct Connection {
    session: Session,
    dictionary: TypeDictionary,
}

impl Connection {
    fn is_usable(&self) -> bool {
        self.session.channel().is_open() && self.session.state().is_activated()
    }
}

/// OPC UA client.
pub struct Client {
    settings: ClientSettings,
    connector: Arc<dyn Connector>,
    current: Mutex<Option<Arc<Connection>>>,
    connecting: AsyncMutex<()>,
    stats: ClientStats,
}

impl Client {
    /// Creates a client connecting over TCP.
    pub fn new(settings: ClientSettings) -> UaResult<Self> {
        Self::with_connector(settings, Arc::new(TcpConnector))
    }

    /// Creates a client with a custom transport.
    pub fn with_connector(settings: ClientSettings, connector: Arc<dyn Connector>) -> UaResult<Self> {
        settings.validate()?;
        Ok(Self {
            settings,
            connector,
            current: Mutex::new(None),
            connecting: AsyncMutex::new(()),
            stats: ClientStats::default(),
        })
    }

    /// Settings in use.
    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    /// Client counters.
    pub fn stats(&self) -> &ClientStats {
        &self.stats
    }

    /// Returns `true` while a usable connection exists.
    pub fn is_connected(&self) -> bool {
        self.current
            .lock()
            .as_ref()
            .map(|c| c.is_usable())
            .unwrap_or(false)
    }

    /// Connects now instead of on the first call.
    pub async fn connect(&self) -> UaResult<()> {
        self.connection().await.map(|_| ())
    }

    /// Closes the session and channel, if connected.
    pub async fn disconnect(&self) -> UaResult<()> {
        let _guard = self.connecting.lock().await;
        let connection = self.current.lock().take();
        match connection {
            Some(connection) => {
                self.record_dictionary_loads(&connection);
                connection.session.close().await
            }
            None => Ok(()),
        }
    }

    /// Reads the value of each address.
    ///
    /// Resolution and decode failures are reported per target; the batch
    /// fails only on channel or session errors.
    pub async fn read(&self, addresses: &[Address]) -> UaResult<ReadResult> {
        let connection = self.connection().await?;
        let result = self.read_with(&connection, addresses).await;
        self.check(&connection, result)
    }

    /// Resolves one address.
    pub async fn resolve(&self, address: &Address) -> UaResult<NodeId> {
        let connection = self.connection().await?;
        let result = AddressResolver::new(&connection.session).resolve(address).await;
        self.check(&connection, result)
    }

    /// Returns the definition of a structured data type.
    pub async fn data_type_definition(&self, data_type_id: &NodeId) -> UaResult<DataTypeDefinition> {
        let connection = self.connection().await?;
        let result = connection
            .dictionary
            .definition_for(&connection.session, data_type_id)
            .await
            .map_err(UaError::from);
        self.check(&connection, result)
    }

    /// Returns the definition of a structure data type.
    pub async fn structure_definition(
        &self,
        data_type_id: &NodeId,
    ) -> UaResult<Arc<StructureDefinition>> {
        let connection = self.connection().await?;
        let result = connection
            .dictionary
            .structure_definition(&connection.session, data_type_id)
            .await
            .map_err(UaError::from);
        self.check(&connection, result)
    }

    /// Returns the definition of a union data type.
    pub async fn union_definition(&self, data_type_id: &NodeId) -> UaResult<Arc<UnionDefinition>> {
        let connection = self.connection().await?;
        let result = connection
            .dictionary
            .union_definition(&connection.session, data_type_id)
            .await
            .map_err(UaError::from);
        self.check(&connection, result)
    }

    /// The server namespace table.
    pub async fn namespaces(&self) -> UaResult<NamespaceArray> {
        Ok(self.connection().await?.session.namespaces())
    }

    async fn read_with(&self, connection: &Connection, addresses: &[Address]) -> UaResult<ReadResult> {
        ClientStats::add(&self.stats.reads, 1);
        ClientStats::add(&self.stats.targets, addresses.len() as u64);

        let mut resolver = AddressResolver::new(&connection.session);
        let mut resolved: Vec<Result<NodeId, TargetError>> = Vec::with_capacity(addresses.len());
        for address in addresses {
            match resolver.resolve(address).await {
                Ok(node_id) => resolved.push(Ok(node_id)),
                Err(e) if e.is_per_item() => {
                    debug!(address = %address, error = %e, "Address not resolved");
                    resolved.push(Err(TargetError::from(&e)));
                }
                Err(e) => return Err(e),
            }
        }

        let node_ids: Vec<NodeId> = resolved
            .iter()
            .filter_map(|r| r.as_ref().ok().cloned())
            .collect();
        let mut values = connection
            .session
            .read(&node_ids, AttributeId::Value)
            .await?
            .into_iter();

        let mut targets = Vec::with_capacity(addresses.len());
        for outcome in resolved {
            let target = match outcome {
                Err(error) => ReadResultTarget::failed(error),
                Ok(node_id) => {
                    let value = values.next().unwrap_or_default();
                    let status_code = value.status();
                    let mut data = value.value;
                    let error = match data.as_mut() {
                        Some(variant) => self.decode_value(connection, variant).await.err(),
                        None => None,
                    };
                    ReadResultTarget {
                        node_id: Some(node_id),
                        status_code,
                        error,
                        data,
                        source_timestamp: value.source_timestamp,
                        server_timestamp: value.server_timestamp,
                    }
                }
            };
            if target.error.is_some() {
                ClientStats::add(&self.stats.target_failures, 1);
            }
            targets.push(target);
        }
        Ok(ReadResult { targets })
    }

    /// Loads the definitions needed by `value` and decodes its raw bodies.
    async fn decode_value(&self, connection: &Connection, value: &mut Variant) -> Result<(), TargetError> {
        let mut attempted: Vec<NodeId> = Vec::new();
        let mut first_error: Option<UaError> = None;

        for _ in 0..MAX_DECODE_ROUNDS {
            let mut pending = Vec::new();
            raw_encoding_ids(value, &mut pending);
            pending.retain(|id| !attempted.contains(id));
            if pending.is_empty() {
                break;
            }
            for encoding_id in pending {
                if let Err(e) = connection
                    .dictionary
                    .definition_for_encoding(&connection.session, &encoding_id)
                    .await
                {
                    debug!(encoding = %encoding_id, error = %e, "No definition for encoding");
                    first_error.get_or_insert(UaError::from(e));
                }
                attempted.push(encoding_id);
            }
            if let Err(e) = decode_nested(value, &connection.dictionary) {
                return Err(TargetError::from(&UaError::from(e)));
            }
        }

        match first_error {
            Some(e) => Err(TargetError::from(&e)),
            None => Ok(()),
        }
    }

    fn check<T>(&self, connection: &Arc<Connection>, result: UaResult<T>) -> UaResult<T> {
        if let Err(e) = &result {
            if e.is_fatal_to_channel() || !connection.is_usable() {
                self.drop_connection(connection, e);
            }
        }
        result
    }

    fn drop_connection(&self, connection: &Arc<Connection>, error: &UaError) {
        let mut current = self.current.lock();
        if current.as_ref().is_some_and(|c| Arc::ptr_eq(c, connection)) {
            *current = None;
            self.record_dictionary_loads(connection);
            warn!(error = %error, "Connection dropped");
        }
    }

    fn record_dictionary_loads(&self, connection: &Connection) {
        ClientStats::add(&self.stats.dictionary_loads, connection.dictionary.fetch_count());
    }

    async fn connection(&self) -> UaResult<Arc<Connection>> {
        if let Some(connection) = self.usable_connection() {
            return Ok(connection);
        }

        let _guard = self.connecting.lock().await;
        if let Some(connection) = self.usable_connection() {
            return Ok(connection);
        }
        if let Some(stale) = self.current.lock().take() {
            self.record_dictionary_loads(&stale);
        }

        let connection = Arc::new(self.establish().await?);
        *self.current.lock() = Some(Arc::clone(&connection));
        Ok(connection)
    }

    fn usable_connection(&self) -> Option<Arc<Connection>> {
        self.current
            .lock()
            .as_ref()
            .filter(|c| c.is_usable())
            .cloned()
    }

    async fn establish(&self) -> UaResult<Connection> {
        let urls = &self.settings.discovery_urls;
        let mut last_error: Option<UaError> = None;

        for url in urls {
            match self.connect_to(url).await {
                Ok(connection) => {
                    ClientStats::add(&self.stats.connections, 1);
                    info!(endpoint = %url, "Client connected");
                    return Ok(connection);
                }
                Err(e) => {
                    ClientStats::add(&self.stats.connection_failures, 1);
                    warn!(endpoint = %url, error = %e, "Endpoint failed");
                    if !e.is_retryable() && matches!(e, UaError::Security(_) | UaError::Configuration(_)) {
                        return Err(e);
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(ConnectionError::AllEndpointsFailed {
            attempts: urls.len(),
            last_error: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no discovery URLs".to_string()),
        }
        .into())
    }

    async fn connect_to(&self, url: &str) -> UaResult<Connection> {
        let channel =
            SecureChannel::open(self.connector.as_ref(), url, ChannelConfig::from_settings(&self.settings))
                .await?;
        let session = Session::create(channel, &self.settings).await?;
        if let Err(e) = session.activate(&self.settings.user_token).await {
            let _ = session.close().await;
            return Err(e);
        }
        Ok(Connection {
            session,
            dictionary: TypeDictionary::new(),
        })
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("application_name", &self.settings.application_name)
            .field("discovery_urls", &self.settings.discovery_urls)
            .field("connected", &self.is_connected())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TargetErrorKind;

    #[test]
    fn test_new_validates_settings() {
        let err = Client::new(ClientSettings::default()).unwrap_err();
        assert!(matches!(err, UaError::Configuration(_)));
        assert!(Client::new(ClientSettings::new("opc.tcp://localhost:4840")).is_ok());
    }

    #[test]
    fn test_failed_target() {
        let target = ReadResultTarget::failed(TargetError {
            kind: TargetErrorKind::UnknownNamespace,
            message: "unknown".into(),
        });
        assert!(!target.is_good());
        assert!(target.status_code.is_bad());

        let result = ReadResult {
            targets: vec![target],
        };
        assert_eq!(result.len(), 1);
        assert!(!result.all_good());
        assert_eq!(result[0].error.as_ref().unwrap().kind, TargetErrorKind::UnknownNamespace);
    }

    #[test]
    fn test_failed_target_status_per_kind() {
        let status = |kind| {
            ReadResultTarget::failed(TargetError {
                kind,
                message: String::new(),
            })
            .status_code
        };
        assert_eq!(status(TargetErrorKind::UnknownNamespace), StatusCode::BAD_NOT_FOUND);
        assert_eq!(status(TargetErrorKind::UnknownServer), StatusCode::BAD_SERVER_URI_INVALID);
        assert_eq!(status(TargetErrorKind::UnknownDataType), StatusCode::BAD_DATA_TYPE_ID_UNKNOWN);
        assert_eq!(status(TargetErrorKind::NoSuchPath), StatusCode::BAD_NO_MATCH);
        assert_eq!(status(TargetErrorKind::AmbiguousPath), StatusCode::BAD_TOO_MANY_MATCHES);
        assert_eq!(status(TargetErrorKind::DecodeError), StatusCode::BAD_DECODING_ERROR);
        assert_eq!(status(TargetErrorKind::Other), StatusCode::BAD_UNEXPECTED_ERROR);
    }

    #[tokio::test]
    async fn test_unreachable_endpoints() {
        let settings = ClientSettings::builder()
            .discovery_url("opc.tcp://127.0.0.1:1")
            .connect_timeout(std::time::Duration::from_millis(500))
            .build()
            .unwrap();
        let client = Client::new(settings).unwrap();
        let err = client.read(&[Address::from(NodeId::numeric(0, 2255))]).await.unwrap_err();
        assert!(matches!(
            err,
            UaError::Connection(ConnectionError::AllEndpointsFailed { attempts: 1, .. })
        ));
        assert_eq!(client.stats().connection_failures(), 1);
        assert!(!client.is_connected());
    }
}
