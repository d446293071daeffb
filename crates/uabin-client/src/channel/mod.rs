// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Secure channel over OPC UA TCP.
//!
//! [`SecureChannel::open`] runs the Hello/Acknowledge handshake and
//! OpenSecureChannel, then hands the read half to a reader task:
//!
//! ```text
//!  callers ──send_request──▶ writer (mutex) ──MSG chunks──▶ server
//!     ▲                                                       │
//!     └── oneshot ◀── pending[request id] ◀── reader task ◀───┘
//! ```
//!
//! - Requests are correlated by request id, so responses may arrive in any
//!   order. At most `max_pending_requests` are outstanding.
//! - Every incoming sequence number must be the previous one plus one.
//!   A gap fails every pending request and closes the channel.
//! - A timed out caller removes its pending entry. The late response is
//!   discarded when it arrives.
//! - A keep-alive task sends FindServers when the channel has been idle for
//!   `keepalive_interval`.

pub mod message;
pub mod security;

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex as AsyncMutex, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::codec::BinaryEncodable;
use crate::error::{
    ChannelFault, ConnectionError, ProtocolError, SecurityError, SessionError, TimeoutError,
    UaError, UaResult,
};
use crate::services::{
    decode_response, encode_message, encode_request, CloseSecureChannelRequest,
    FindServersRequest, OpenSecureChannelRequest, OpenSecureChannelResponse, RequestHeader,
    ServiceRequest, REQUEST_TYPE_ISSUE,
};
use crate::settings::{parse_endpoint, ClientSettings, MIN_BUFFER_SIZE};
use crate::types::ids::services as service_ids;
use crate::types::{ByteString, NodeId, SecurityMode, SecurityPolicy, UaString};

use message::{
    encode_frame, read_frame, write_frame, AcknowledgeMessage, ChunkType, ErrorMessage, Frame,
    HelloMessage, MessageType, OpenChunk, PROTOCOL_VERSION,
};
use security::{generate_nonce, ChannelSecurity, SecurityRole};

const FIRST_SEQUENCE_NUMBER: u32 = 1;
const OPEN_REQUEST_ID: u32 = 1;

// =============================================================================
// Connector
// =============================================================================

/// A bidirectional byte stream.
pub trait AsyncStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> AsyncStream for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

/// A boxed transport stream.
pub type BoxedStream = Box<dyn AsyncStream>;

/// Opens transport streams to endpoint URLs.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connects to `endpoint_url`.
    async fn connect(&self, endpoint_url: &str) -> UaResult<BoxedStream>;
}

/// Connects over TCP.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, endpoint_url: &str) -> UaResult<BoxedStream> {
        let address = parse_endpoint(endpoint_url)?;
        let stream = TcpStream::connect(&address)
            .await
            .map_err(|e| ConnectionError::refused_with(endpoint_url, e))?;
        stream.set_nodelay(true)?;
        Ok(Box::new(stream))
    }
}

// =============================================================================
// ChannelConfig
// =============================================================================

/// Channel parameters taken from [`ClientSettings`].
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelConfig {
    /// Message security mode.
    pub security_mode: SecurityMode,
    /// Security policy.
    pub security_policy: SecurityPolicy,
    /// Deadline for connect, Hello and OpenSecureChannel together.
    pub connect_timeout: Duration,
    /// Default deadline of a request.
    pub request_timeout: Duration,
    /// Idle time before a keep-alive.
    pub keepalive_interval: Duration,
    /// Deadline of a keep-alive response.
    pub keepalive_timeout: Duration,
    /// Requested token lifetime.
    pub secure_channel_lifetime: Duration,
    /// Pipelining window.
    pub max_pending_requests: usize,
    /// Largest incoming message; 0 for no limit.
    pub max_message_size: u32,
    /// Most chunks per incoming message; 0 for no limit.
    pub max_chunk_count: u32,
    /// Largest incoming chunk.
    pub receive_buffer_size: u32,
    /// Largest outgoing chunk.
    pub send_buffer_size: u32,
}

impl ChannelConfig {
    /// Extracts the channel parameters.
    pub fn from_settings(settings: &ClientSettings) -> Self {
        Self {
            security_mode: settings.security_mode,
            security_policy: settings.security_policy,
            connect_timeout: settings.connect_timeout,
            request_timeout: settings.request_timeout,
            keepalive_interval: settings.keepalive_interval,
            keepalive_timeout: settings.keepalive_timeout,
            secure_channel_lifetime: settings.secure_channel_lifetime,
            max_pending_requests: settings.max_pending_requests.max(1),
            max_message_size: settings.max_message_size,
            max_chunk_count: settings.max_chunk_count,
            receive_buffer_size: settings.receive_buffer_size,
            send_buffer_size: settings.send_buffer_size,
        }
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self::from_settings(&ClientSettings::default())
    }
}

/// Buffer limits agreed in Hello/Acknowledge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportLimits {
    /// Largest chunk sent.
    pub send_buffer_size: u32,
    /// Largest chunk received.
    pub receive_buffer_size: u32,
    /// Largest message the server accepts; 0 for no limit.
    pub remote_max_message_size: u32,
    /// Most chunks per message the server accepts; 0 for no limit.
    pub remote_max_chunk_count: u32,
}

impl TransportLimits {
    fn negotiate(config: &ChannelConfig, ack: &AcknowledgeMessage) -> UaResult<Self> {
        if ack.receive_buffer_size < MIN_BUFFER_SIZE || ack.send_buffer_size < MIN_BUFFER_SIZE {
            return Err(UaError::malformed(format!(
                "acknowledged buffer sizes {}/{} below {}",
                ack.receive_buffer_size, ack.send_buffer_size, MIN_BUFFER_SIZE
            )));
        }
        Ok(Self {
            send_buffer_size: config.send_buffer_size.min(ack.receive_buffer_size),
            receive_buffer_size: config.receive_buffer_size.min(ack.send_buffer_size),
            remote_max_message_size: ack.max_message_size,
            remote_max_chunk_count: ack.max_chunk_count,
        })
    }
}

// =============================================================================
// ChannelStats
// =============================================================================

/// Counters of one secure channel.
#[derive(Debug, Default)]
pub struct ChannelStats {
    requests_sent: AtomicU64,
    responses_received: AtomicU64,
    chunks_sent: AtomicU64,
    chunks_received: AtomicU64,
    late_responses: AtomicU64,
    timeouts: AtomicU64,
    keepalives: AtomicU64,
}

impl ChannelStats {
    /// Requests written.
    pub fn requests_sent(&self) -> u64 {
        self.requests_sent.load(Ordering::Relaxed)
    }

    /// Responses routed to a waiter.
    pub fn responses_received(&self) -> u64 {
        self.responses_received.load(Ordering::Relaxed)
    }

    /// Chunks written.
    pub fn chunks_sent(&self) -> u64 {
        self.chunks_sent.load(Ordering::Relaxed)
    }

    /// Chunks read.
    pub fn chunks_received(&self) -> u64 {
        self.chunks_received.load(Ordering::Relaxed)
    }

    /// Responses discarded because nobody waited for them.
    pub fn late_responses(&self) -> u64 {
        self.late_responses.load(Ordering::Relaxed)
    }

    /// Requests that timed out.
    pub fn timeouts(&self) -> u64 {
        self.timeouts.load(Ordering::Relaxed)
    }

    /// Keep-alive requests sent.
    pub fn keepalives(&self) -> u64 {
        self.keepalives.load(Ordering::Relaxed)
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

// =============================================================================
// Shared state
// =============================================================================

type PendingSender = oneshot::Sender<Result<Bytes, ChannelFault>>;

struct Writer {
    stream: WriteHalf<BoxedStream>,
    sequence_number: u32,
    request_id: u32,
}

impl Writer {
    fn next_sequence_number(&mut self) -> u32 {
        let sequence_number = self.sequence_number;
        self.sequence_number = sequence_number.wrapping_add(1);
        sequence_number
    }

    fn next_request_id(&mut self) -> u32 {
        self.request_id = self.request_id.wrapping_add(1).max(1);
        self.request_id
    }
}

#[derive(Default)]
struct PartialMessage {
    chunks: Vec<Bytes>,
    size: usize,
}

impl PartialMessage {
    fn push(&mut self, body: Bytes, max_chunks: u32, max_size: u32) -> UaResult<()> {
        self.size += body.len();
        self.chunks.push(body);
        if max_chunks != 0 && self.chunks.len() > max_chunks as usize {
            return Err(ProtocolError::TooManyChunks { max: max_chunks }.into());
        }
        if max_size != 0 && self.size > max_size as usize {
            return Err(ProtocolError::MessageTooLarge {
                size: self.size,
                max: max_size as usize,
            }
            .into());
        }
        Ok(())
    }

    fn assemble(self) -> Bytes {
        if self.chunks.len() == 1 {
            return self.chunks.into_iter().next().unwrap_or_default();
        }
        let mut body = BytesMut::with_capacity(self.size);
        for chunk in self.chunks {
            body.extend_from_slice(&chunk);
        }
        body.freeze()
    }
}

struct Shared {
    endpoint_url: String,
    config: ChannelConfig,
    secure_channel_id: u32,
    token_id: u32,
    revised_lifetime: Duration,
    security: ChannelSecurity,
    limits: TransportLimits,
    writer: AsyncMutex<Writer>,
    // lock order: pending, then fault
    pending: Mutex<HashMap<u32, PendingSender>>,
    fault: Mutex<Option<ChannelFault>>,
    window: Semaphore,
    last_activity: Mutex<Instant>,
    stats: ChannelStats,
}

impl Shared {
    fn check_open(&self) -> UaResult<()> {
        match &*self.fault.lock() {
            Some(fault) => Err(fault.to_error()),
            None => Ok(()),
        }
    }

    fn fault_error(&self) -> UaError {
        match &*self.fault.lock() {
            Some(fault) => fault.to_error(),
            None => UaError::connection_lost("secure channel stopped"),
        }
    }

    fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    fn idle_time(&self) -> Duration {
        self.last_activity.lock().elapsed()
    }

    /// Marks the channel failed and wakes every waiter. The first fault wins.
    fn fail(&self, fault: ChannelFault) {
        let drained: Vec<PendingSender> = {
            let mut pending = self.pending.lock();
            let mut current = self.fault.lock();
            if current.is_some() {
                return;
            }
            *current = Some(fault.clone());
            pending.drain().map(|(_, tx)| tx).collect()
        };
        self.window.close();

        if fault == ChannelFault::Closed {
            debug!(
                secure_channel_id = self.secure_channel_id,
                pending = drained.len(),
                "Secure channel closed"
            );
        } else {
            warn!(
                secure_channel_id = self.secure_channel_id,
                endpoint = %self.endpoint_url,
                pending = drained.len(),
                fault = %fault,
                "Secure channel failed"
            );
        }

        for tx in drained {
            let _ = tx.send(Err(fault.clone()));
        }
    }

    fn fail_with(&self, error: UaError) -> UaError {
        if error.is_fatal_to_channel() {
            self.fail(ChannelFault::from_error(&error));
        }
        error
    }

    async fn call(&self, body: Bytes, timeout: Duration) -> UaResult<Bytes> {
        self.check_open()?;
        let _permit = self.window.acquire().await.map_err(|_| self.fault_error())?;

        let (tx, rx) = oneshot::channel();
        let request_id = {
            let mut writer = self.writer.lock().await;
            let request_id = writer.next_request_id();
            {
                let mut pending = self.pending.lock();
                if let Some(fault) = &*self.fault.lock() {
                    return Err(fault.to_error());
                }
                pending.insert(request_id, tx);
            }
            if let Err(e) = self
                .write_message(&mut writer, MessageType::Message, request_id, &body)
                .await
            {
                self.pending.lock().remove(&request_id);
                return Err(e);
            }
            request_id
        };
        ChannelStats::bump(&self.stats.requests_sent);
        trace!(request_id, size = body.len(), "Request sent");

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(Ok(response))) => Ok(response),
            Ok(Ok(Err(fault))) => Err(fault.to_error()),
            Ok(Err(_)) => Err(self.fault_error()),
            Err(_) => {
                self.pending.lock().remove(&request_id);
                ChannelStats::bump(&self.stats.timeouts);
                warn!(
                    request_id,
                    timeout_ms = timeout.as_millis() as u64,
                    "Request timed out"
                );
                Err(UaError::request_timeout(request_id, timeout))
            }
        }
    }

    /// Splits `body` into chunks and writes them.
    async fn write_message(
        &self,
        writer: &mut Writer,
        message_type: MessageType,
        request_id: u32,
        body: &[u8],
    ) -> UaResult<()> {
        let limits = &self.limits;
        if limits.remote_max_message_size != 0 && body.len() > limits.remote_max_message_size as usize
        {
            return Err(ProtocolError::MessageTooLarge {
                size: body.len(),
                max: limits.remote_max_message_size as usize,
            }
            .into());
        }

        let max_body = (limits.send_buffer_size as usize)
            .saturating_sub(self.security.overhead())
            .max(1);
        let chunk_count = body.len().div_ceil(max_body).max(1);
        if limits.remote_max_chunk_count != 0 && chunk_count > limits.remote_max_chunk_count as usize
        {
            return Err(ProtocolError::TooManyChunks {
                max: limits.remote_max_chunk_count,
            }
            .into());
        }

        for index in 0..chunk_count {
            let start = index * max_body;
            let end = (start + max_body).min(body.len());
            let chunk_type = if index + 1 == chunk_count {
                ChunkType::Final
            } else {
                ChunkType::Intermediate
            };
            let sequence_number = writer.next_sequence_number();
            let frame = self
                .security
                .seal(
                    message_type,
                    chunk_type,
                    self.secure_channel_id,
                    self.token_id,
                    sequence_number,
                    request_id,
                    &body[start..end],
                )
                .map_err(|e| self.fail_with(e.into()))?;
            write_frame(&mut writer.stream, &frame).await.map_err(|e| {
                self.fail(ChannelFault::ConnectionLost(e.to_string()));
                e
            })?;
            ChannelStats::bump(&self.stats.chunks_sent);
        }
        self.touch();
        Ok(())
    }

    fn deliver(&self, request_id: u32, result: Result<Bytes, ChannelFault>) {
        let waiter = self.pending.lock().remove(&request_id);
        match waiter {
            Some(tx) => {
                ChannelStats::bump(&self.stats.responses_received);
                let _ = tx.send(result);
            }
            None => {
                ChannelStats::bump(&self.stats.late_responses);
                debug!(request_id, "Discarding response without a waiting request");
            }
        }
    }

    fn handle_frame(
        &self,
        frame: Frame,
        expected_sequence: &mut u32,
        partials: &mut HashMap<u32, PartialMessage>,
    ) -> UaResult<()> {
        match frame.message_type {
            MessageType::Message => {}
            MessageType::Error => {
                let error = ErrorMessage::from_bytes(frame.payload())?;
                return Err(UaError::Connection(ConnectionError::ServerError {
                    status: error.error,
                    reason: error.reason.as_str().to_string(),
                }));
            }
            other => {
                return Err(ProtocolError::UnexpectedMessage {
                    expected: MessageType::Message.to_string(),
                    actual: other.to_string(),
                }
                .into());
            }
        }

        let chunk = self.security.open(&frame)?;
        if chunk.secure_channel_id != self.secure_channel_id {
            return Err(ProtocolError::ChannelIdMismatch {
                expected: self.secure_channel_id,
                actual: chunk.secure_channel_id,
            }
            .into());
        }
        if chunk.sequence_number != *expected_sequence {
            return Err(ProtocolError::SequenceMismatch {
                expected: *expected_sequence,
                actual: chunk.sequence_number,
            }
            .into());
        }
        *expected_sequence = chunk.sequence_number.wrapping_add(1);
        ChannelStats::bump(&self.stats.chunks_received);

        let (max_chunks, max_size) = (self.config.max_chunk_count, self.config.max_message_size);
        match chunk.chunk_type {
            ChunkType::Intermediate => {
                partials
                    .entry(chunk.request_id)
                    .or_default()
                    .push(chunk.body, max_chunks, max_size)?;
            }
            ChunkType::Abort => {
                partials.remove(&chunk.request_id);
                let abort = ErrorMessage::from_bytes(&chunk.body)?;
                debug!(request_id = chunk.request_id, status = %abort.error, "Response aborted by server");
                self.deliver(
                    chunk.request_id,
                    Err(ChannelFault::Protocol(ProtocolError::Aborted {
                        status: abort.error,
                        reason: abort.reason.as_str().to_string(),
                    })),
                );
            }
            ChunkType::Final => {
                let body = match partials.remove(&chunk.request_id) {
                    Some(mut partial) => {
                        partial.push(chunk.body, max_chunks, max_size)?;
                        partial.assemble()
                    }
                    None => chunk.body,
                };
                self.deliver(chunk.request_id, Ok(body));
            }
        }
        Ok(())
    }
}

async fn run_reader(shared: Arc<Shared>, mut reader: ReadHalf<BoxedStream>, first_sequence: u32) {
    let mut expected_sequence = first_sequence;
    let mut partials: HashMap<u32, PartialMessage> = HashMap::new();

    loop {
        let frame = match read_frame(&mut reader, shared.limits.receive_buffer_size).await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                shared.fail(ChannelFault::ConnectionLost(
                    "connection closed by server".to_string(),
                ));
                break;
            }
            Err(e) => {
                shared.fail(ChannelFault::from_error(&e));
                break;
            }
        };
        shared.touch();

        if let Err(e) = shared.handle_frame(frame, &mut expected_sequence, &mut partials) {
            shared.fail(ChannelFault::from_error(&e));
            break;
        }
    }
}

async fn run_keepalive(shared: Weak<Shared>, interval: Duration, timeout: Duration) {
    loop {
        let idle = match shared.upgrade() {
            Some(channel) if channel.check_open().is_ok() => channel.idle_time(),
            _ => break,
        };
        if idle < interval {
            tokio::time::sleep(interval - idle).await;
            continue;
        }

        let Some(channel) = shared.upgrade() else {
            break;
        };
        let request = FindServersRequest {
            request_header: RequestHeader::new(NodeId::null(), 0, duration_ms(timeout)),
            ..FindServersRequest::default()
        };
        ChannelStats::bump(&channel.stats.keepalives);
        trace!(secure_channel_id = channel.secure_channel_id, "Sending keep-alive");

        match channel.call(encode_request(&request), timeout).await {
            Ok(_) => {}
            Err(UaError::Timeout(_)) => {
                channel.fail(ChannelFault::ConnectionLost(format!(
                    "keep-alive not answered within {:?}",
                    timeout
                )));
                break;
            }
            Err(e) if e.is_fatal_to_channel() => break,
            Err(e) => debug!(error = %e, "Keep-alive request failed"),
        }
    }
}

fn duration_ms(duration: Duration) -> u32 {
    u32::try_from(duration.as_millis()).unwrap_or(u32::MAX)
}

// =============================================================================
// SecureChannel
// =============================================================================

/// An open secure channel.
///
/// Dropping the channel stops its background tasks without sending
/// CloseSecureChannel; call [`close`](Self::close) for an orderly shutdown.
pub struct SecureChannel {
    shared: Arc<Shared>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SecureChannel {
    /// Connects to `endpoint_url` and opens a secure channel.
    pub async fn open(
        connector: &dyn Connector,
        endpoint_url: &str,
        config: ChannelConfig,
    ) -> UaResult<Self> {
        let connect_timeout = config.connect_timeout;
        tokio::time::timeout(connect_timeout, Self::handshake(connector, endpoint_url, config))
            .await
            .map_err(|_| {
                UaError::timeout(TimeoutError::Connect {
                    endpoint: endpoint_url.to_string(),
                    duration: connect_timeout,
                })
            })?
    }

    async fn handshake(
        connector: &dyn Connector,
        endpoint_url: &str,
        config: ChannelConfig,
    ) -> UaResult<Self> {
        if config.security_mode != SecurityMode::None && config.security_policy == SecurityPolicy::None
        {
            return Err(SecurityError::PolicyNotSupported {
                policy: format!("{} with {}", config.security_policy, config.security_mode),
            }
            .into());
        }

        let stream = connector.connect(endpoint_url).await?;
        let (mut reader, mut writer) = tokio::io::split(stream);

        let hello = HelloMessage {
            protocol_version: PROTOCOL_VERSION,
            receive_buffer_size: config.receive_buffer_size,
            send_buffer_size: config.send_buffer_size,
            max_message_size: config.max_message_size,
            max_chunk_count: config.max_chunk_count,
            endpoint_url: UaString::from(endpoint_url),
        };
        write_frame(
            &mut writer,
            &encode_frame(MessageType::Hello, ChunkType::Final, &hello.to_bytes()),
        )
        .await?;

        let frame = read_handshake_frame(&mut reader, config.receive_buffer_size, "Hello").await?;
        let ack = match frame.message_type {
            MessageType::Acknowledge => AcknowledgeMessage::from_bytes(frame.payload())?,
            other => {
                return Err(ProtocolError::UnexpectedMessage {
                    expected: MessageType::Acknowledge.to_string(),
                    actual: other.to_string(),
                }
                .into())
            }
        };
        let limits = TransportLimits::negotiate(&config, &ack)?;
        debug!(
            endpoint = %endpoint_url,
            send_buffer_size = limits.send_buffer_size,
            receive_buffer_size = limits.receive_buffer_size,
            "Transport acknowledged"
        );

        let client_nonce = if config.security_mode == SecurityMode::None {
            ByteString::null()
        } else {
            ByteString::from(generate_nonce())
        };
        let request = OpenSecureChannelRequest {
            request_header: RequestHeader::new(
                NodeId::null(),
                OPEN_REQUEST_ID,
                duration_ms(config.request_timeout),
            ),
            client_protocol_version: PROTOCOL_VERSION,
            request_type: REQUEST_TYPE_ISSUE,
            security_mode: config.security_mode.value(),
            client_nonce: client_nonce.clone(),
            requested_lifetime: duration_ms(config.secure_channel_lifetime),
        };
        let policy_uri = config.security_policy.uri();
        let open = OpenChunk::new(
            0,
            policy_uri,
            FIRST_SEQUENCE_NUMBER,
            OPEN_REQUEST_ID,
            encode_request(&request),
        );
        write_frame(&mut writer, &open.encode()).await?;

        let frame =
            read_handshake_frame(&mut reader, config.receive_buffer_size, "OpenSecureChannel")
                .await?;
        let reply = OpenChunk::decode(&frame)?;
        if reply.security_policy_uri.as_str() != policy_uri {
            return Err(SecurityError::PolicyMismatch {
                requested: policy_uri.to_string(),
                actual: reply.security_policy_uri.as_str().to_string(),
            }
            .into());
        }
        if reply.request_id != OPEN_REQUEST_ID {
            return Err(UaError::malformed(format!(
                "OpenSecureChannel response for request {}",
                reply.request_id
            )));
        }

        let response = match decode_response::<OpenSecureChannelResponse>(&reply.body)? {
            Ok(response) if !response.response_header.service_result.is_bad() => response,
            Ok(response) => {
                return Err(service_fault(response.response_header.service_result));
            }
            Err(fault) => return Err(service_fault(fault.response_header.service_result)),
        };
        let token = &response.security_token;
        if token.channel_id == 0 {
            return Err(UaError::malformed("server assigned secure channel id 0"));
        }
        if reply.secure_channel_id != token.channel_id {
            return Err(ProtocolError::ChannelIdMismatch {
                expected: token.channel_id,
                actual: reply.secure_channel_id,
            }
            .into());
        }

        let security = ChannelSecurity::derive(
            config.security_mode,
            SecurityRole::Client,
            client_nonce.as_bytes(),
            response.server_nonce.as_bytes(),
        )?;

        let keepalive = (config.keepalive_interval, config.keepalive_timeout);
        let window = Semaphore::new(config.max_pending_requests);
        let shared = Arc::new(Shared {
            endpoint_url: endpoint_url.to_string(),
            secure_channel_id: token.channel_id,
            token_id: token.token_id,
            revised_lifetime: Duration::from_millis(u64::from(token.revised_lifetime)),
            security,
            limits,
            writer: AsyncMutex::new(Writer {
                stream: writer,
                sequence_number: FIRST_SEQUENCE_NUMBER.wrapping_add(1),
                request_id: OPEN_REQUEST_ID,
            }),
            pending: Mutex::new(HashMap::new()),
            fault: Mutex::new(None),
            window,
            last_activity: Mutex::new(Instant::now()),
            stats: ChannelStats::default(),
            config,
        });

        let reader_task = tokio::spawn(run_reader(
            Arc::clone(&shared),
            reader,
            reply.sequence_number.wrapping_add(1),
        ));
        let keepalive_task = tokio::spawn(run_keepalive(
            Arc::downgrade(&shared),
            keepalive.0,
            keepalive.1,
        ));

        info!(
            endpoint = %shared.endpoint_url,
            secure_channel_id = shared.secure_channel_id,
            security_mode = %shared.config.security_mode,
            security_policy = %shared.config.security_policy,
            revised_lifetime_ms = token.revised_lifetime,
            "Secure channel opened"
        );

        Ok(Self {
            shared,
            tasks: Mutex::new(vec![reader_task, keepalive_task]),
        })
    }

    /// Sends a request body and waits for its response body.
    pub async fn send_request(&self, body: Bytes) -> UaResult<Bytes> {
        let timeout = self.shared.config.request_timeout;
        self.shared.call(body, timeout).await
    }

    /// Like [`send_request`](Self::send_request) with an explicit deadline.
    pub async fn send_request_with_timeout(&self, body: Bytes, timeout: Duration) -> UaResult<Bytes> {
        self.shared.call(body, timeout).await
    }

    /// Sends CloseSecureChannel and stops the channel.
    ///
    /// Pending requests fail with [`ConnectionError::Closed`].
    pub async fn close(&self) -> UaResult<()> {
        if self.shared.check_open().is_err() {
            self.abort_tasks();
            return Ok(());
        }

        let request = CloseSecureChannelRequest {
            request_header: RequestHeader::new(NodeId::null(), 0, 0),
        };
        let body = encode_message(&service_ids::CLOSE_SECURE_CHANNEL_REQUEST, &request);
        let result = {
            let mut writer = self.shared.writer.lock().await;
            self.shared.fail(ChannelFault::Closed);
            let request_id = writer.next_request_id();
            let written = self
                .shared
                .write_message(&mut writer, MessageType::Close, request_id, &body)
                .await;
            let _ = writer.stream.shutdown().await;
            written
        };
        self.abort_tasks();

        info!(
            endpoint = %self.shared.endpoint_url,
            secure_channel_id = self.shared.secure_channel_id,
            "Secure channel closed by client"
        );
        result
    }

    fn abort_tasks(&self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }

    /// Returns `true` until the channel fails or is closed.
    pub fn is_open(&self) -> bool {
        self.shared.check_open().is_ok()
    }

    /// The failure that stopped the channel, if any.
    pub fn fault(&self) -> Option<ChannelFault> {
        self.shared.fault.lock().clone()
    }

    /// Secure channel id assigned by the server.
    pub fn secure_channel_id(&self) -> u32 {
        self.shared.secure_channel_id
    }

    /// Endpoint URL.
    pub fn endpoint_url(&self) -> &str {
        &self.shared.endpoint_url
    }

    /// Message security mode.
    pub fn security_mode(&self) -> SecurityMode {
        self.shared.security.mode()
    }

    /// Negotiated buffer limits.
    pub fn limits(&self) -> TransportLimits {
        self.shared.limits
    }

    /// Token lifetime granted by the server.
    pub fn revised_lifetime(&self) -> Duration {
        self.shared.revised_lifetime
    }

    /// Default request timeout.
    pub fn request_timeout(&self) -> Duration {
        self.shared.config.request_timeout
    }

    /// Number of requests waiting for a response.
    pub fn pending_requests(&self) -> usize {
        self.shared.pending.lock().len()
    }

    /// Channel counters.
    pub fn stats(&self) -> &ChannelStats {
        &self.shared.stats
    }
}

impl Drop for SecureChannel {
    fn drop(&mut self) {
        self.abort_tasks();
    }
}

impl fmt::Debug for SecureChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecureChannel")
            .field("endpoint_url", &self.shared.endpoint_url)
            .field("secure_channel_id", &self.shared.secure_channel_id)
            .field("security_mode", &self.shared.security.mode())
            .field("open", &self.is_open())
            .finish()
    }
}

async fn read_handshake_frame(
    reader: &mut ReadHalf<BoxedStream>,
    max_size: u32,
    stage: &str,
) -> UaResult<Frame> {
    let frame = read_frame(reader, max_size)
        .await?
        .ok_or_else(|| UaError::connection_lost(format!("connection closed during {}", stage)))?;
    if frame.message_type == MessageType::Error {
        let error = ErrorMessage::from_bytes(frame.payload())?;
        return Err(UaError::Connection(ConnectionError::ServerError {
            status: error.error,
            reason: error.reason.as_str().to_string(),
        }));
    }
    Ok(frame)
}

fn service_fault(status: crate::types::StatusCode) -> UaError {
    UaError::session(SessionError::ServiceFault {
        service: OpenSecureChannelRequest::NAME,
        status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{ChannelSecurityToken, OpenSecureChannelResponse, ResponseHeader, ServiceResponse};
    use crate::types::{DateTime, StatusCode};
    use tokio::io::DuplexStream;

    const CHANNEL_ID: u32 = 9;

    struct DuplexConnector(Mutex<Option<DuplexStream>>);

    #[async_trait]
    impl Connector for DuplexConnector {
        async fn connect(&self, _endpoint_url: &str) -> UaResult<BoxedStream> {
            let stream = self.0.lock().take().ok_or_else(UaError::not_connected)?;
            Ok(Box::new(stream))
        }
    }

    struct Peer {
        reader: ReadHalf<DuplexStream>,
        writer: WriteHalf<DuplexStream>,
        sequence_number: u32,
    }

    impl Peer {
        async fn accept(stream: DuplexStream) -> Self {
            let (mut reader, mut writer) = tokio::io::split(stream);
            let hello = read_frame(&mut reader, 0).await.unwrap().unwrap();
            assert_eq!(hello.message_type, MessageType::Hello);
            let ack = AcknowledgeMessage {
                protocol_version: 0,
                receive_buffer_size: 65535,
                send_buffer_size: 65535,
                max_message_size: 0,
                max_chunk_count: 0,
            };
            write_frame(
                &mut writer,
                &encode_frame(MessageType::Acknowledge, ChunkType::Final, &ack.to_bytes()),
            )
            .await
            .unwrap();

            let open = OpenChunk::decode(&read_frame(&mut reader, 0).await.unwrap().unwrap()).unwrap();
            let response = OpenSecureChannelResponse {
                response_header: ResponseHeader::new(OPEN_REQUEST_ID, StatusCode::GOOD),
                security_token: ChannelSecurityToken {
                    channel_id: CHANNEL_ID,
                    token_id: 1,
                    created_at: DateTime::now(),
                    revised_lifetime: 60_000,
                },
                ..OpenSecureChannelResponse::default()
            };
            let body = encode_message(&OpenSecureChannelResponse::TYPE_ID, &response);
            let reply = OpenChunk::new(
                CHANNEL_ID,
                open.security_policy_uri.as_str(),
                100,
                open.request_id,
                body,
            );
            write_frame(&mut writer, &reply.encode()).await.unwrap();
            Self {
                reader,
                writer,
                sequence_number: 101,
            }
        }

        async fn next_request(&mut self) -> security::SymmetricChunk {
            let frame = read_frame(&mut self.reader, 0).await.unwrap().unwrap();
            ChannelSecurity::none().open(&frame).unwrap()
        }

        async fn reply(&mut self, chunk_type: ChunkType, request_id: u32, body: &[u8]) {
            let sequence_number = self.sequence_number;
            self.sequence_number += 1;
            self.reply_with_sequence(chunk_type, sequence_number, request_id, body).await;
        }

        async fn reply_with_sequence(
            &mut self,
            chunk_type: ChunkType,
            sequence_number: u32,
            request_id: u32,
            body: &[u8],
        ) {
            let frame = ChannelSecurity::none()
                .seal(MessageType::Message, chunk_type, CHANNEL_ID, 1, sequence_number, request_id, body)
                .unwrap();
            write_frame(&mut self.writer, &frame).await.unwrap();
        }
    }

    async fn connect<F, Fut>(config: ChannelConfig, peer: F) -> SecureChannel
    where
        F: FnOnce(Peer) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let (client, server) = tokio::io::duplex(1 << 20);
        tokio::spawn(async move {
            let peer_state = Peer::accept(server).await;
            peer(peer_state).await;
        });
        let connector = DuplexConnector(Mutex::new(Some(client)));
        SecureChannel::open(&connector, "opc.tcp://test:4840", config)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_open_and_echo() {
        let channel = connect(ChannelConfig::default(), |mut peer| async move {
            let request = peer.next_request().await;
            peer.reply(ChunkType::Final, request.request_id, &request.body).await;
            let _ = peer.next_request().await;
        })
        .await;

        assert_eq!(channel.secure_channel_id(), CHANNEL_ID);
        let response = channel.send_request(Bytes::from_static(b"ping")).await.unwrap();
        assert_eq!(&response[..], b"ping");
        assert_eq!(channel.stats().responses_received(), 1);
        assert_eq!(channel.pending_requests(), 0);
    }

    #[tokio::test]
    async fn test_out_of_order_responses() {
        let channel = Arc::new(
            connect(ChannelConfig::default(), |mut peer| async move {
                let first = peer.next_request().await;
                let second = peer.next_request().await;
                peer.reply(ChunkType::Final, second.request_id, &second.body).await;
                peer.reply(ChunkType::Final, first.request_id, &first.body).await;
                let _ = peer.next_request().await;
            })
            .await,
        );

        let a = tokio::spawn({
            let channel = Arc::clone(&channel);
            async move { channel.send_request(Bytes::from_static(b"a")).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        let b = tokio::spawn({
            let channel = Arc::clone(&channel);
            async move { channel.send_request(Bytes::from_static(b"b")).await }
        });

        assert_eq!(&a.await.unwrap().unwrap()[..], b"a");
        assert_eq!(&b.await.unwrap().unwrap()[..], b"b");
    }

    #[tokio::test]
    async fn test_sequence_gap_fails_pending() {
        let channel = connect(ChannelConfig::default(), |mut peer| async move {
            let request = peer.next_request().await;
            peer.reply_with_sequence(ChunkType::Final, 105, request.request_id, b"x")
                .await;
            let _ = peer.next_request().await;
        })
        .await;

        let err = channel.send_request(Bytes::from_static(b"x")).await.unwrap_err();
        assert!(matches!(
            err,
            UaError::Protocol(ProtocolError::SequenceMismatch {
                expected: 101,
                actual: 105
            })
        ));
        assert!(!channel.is_open());
        assert!(channel.send_request(Bytes::new()).await.is_err());
    }

    #[tokio::test]
    async fn test_timeout_discards_late_response() {
        let channel = connect(ChannelConfig::default(), |mut peer| async move {
            let slow = peer.next_request().await;
            tokio::time::sleep(Duration::from_millis(150)).await;
            peer.reply(ChunkType::Final, slow.request_id, b"late").await;
            let next = peer.next_request().await;
            peer.reply(ChunkType::Final, next.request_id, b"on time").await;
            let _ = peer.next_request().await;
        })
        .await;

        let err = channel
            .send_request_with_timeout(Bytes::from_static(b"slow"), Duration::from_millis(30))
            .await
            .unwrap_err();
        assert!(matches!(err, UaError::Timeout(TimeoutError::Request { .. })));
        assert_eq!(channel.pending_requests(), 0);

        tokio::time::sleep(Duration::from_millis(200)).await;
        let response = channel.send_request(Bytes::from_static(b"next")).await.unwrap();
        assert_eq!(&response[..], b"on time");
        assert_eq!(channel.stats().late_responses(), 1);
        assert_eq!(channel.stats().timeouts(), 1);
        assert!(channel.is_open());
    }

    #[tokio::test]
    async fn test_chunked_response_reassembled() {
        let channel = connect(ChannelConfig::default(), |mut peer| async move {
            let request = peer.next_request().await;
            peer.reply(ChunkType::Intermediate, request.request_id, b"hello ").await;
            peer.reply(ChunkType::Final, request.request_id, b"world").await;
            let _ = peer.next_request().await;
        })
        .await;

        let response = channel.send_request(Bytes::from_static(b"q")).await.unwrap();
        assert_eq!(&response[..], b"hello world");
    }

    #[tokio::test]
    async fn test_close_sends_clo() {
        let (tx, rx) = oneshot::channel();
        let channel = connect(ChannelConfig::default(), |mut peer| async move {
            let frame = read_frame(&mut peer.reader, 0).await.unwrap().unwrap();
            let _ = tx.send(frame.message_type);
        })
        .await;

        channel.close().await.unwrap();
        assert_eq!(rx.await.unwrap(), MessageType::Close);
        assert_eq!(channel.fault(), Some(ChannelFault::Closed));
        assert!(matches!(
            channel.send_request(Bytes::new()).await,
            Err(UaError::Connection(ConnectionError::Closed))
        ));
    }
}
