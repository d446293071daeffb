// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA session over one secure channel.
//!
//! ```text
//!   create ──▶ Created ──activate──▶ Activated ──close──▶ Closed
//! ```
//!
//! Every service call carries a fresh request handle that the response must
//! echo. When the server rejects the authentication token with
//! `BadSessionIdInvalid`, the session is created and activated again with the
//! stored identity and the call is retried once.

use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use crate::channel::security::generate_nonce;
use crate::channel::SecureChannel;
use crate::codec::{DataValue, ExtensionObject};
use crate::dictionary::DictionarySource;
use crate::error::{ProtocolError, SessionError, UaError, UaResult};
use crate::services::{
    decode_response, encode_request, ActivateSessionRequest, AnonymousIdentityToken,
    ApplicationDescription, BrowseDescription, BrowseNextRequest, BrowsePath, BrowsePathResult,
    BrowseRequest, CloseSessionRequest, CreateSessionRequest, EndpointDescription, ReadRequest,
    ReadResponse, ReadValueId, ReferenceDescription, RequestHeader, ServiceRequest, ServiceResponse,
    TranslateBrowsePathsToNodeIdsRequest, UserNameIdentityToken, BROWSE_RESULT_MASK_ALL,
    TIMESTAMPS_BOTH,
};
use crate::settings::ClientSettings;
use crate::types::ids::{data_types, variables};
use crate::types::{
    AttributeId, BrowseDirection, ByteString, LocalizedText, NamespaceArray, NodeId,
    SecurityMode, StatusCode, UaString, UserIdentity,
};

const APPLICATION_TYPE_CLIENT: u32 = 1;
const NODE_CLASS_ALL: u32 = 0;

// =============================================================================
// SessionState
// =============================================================================

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Created, not yet activated.
    #[default]
    Created,
    /// Activated and usable.
    Activated,
    /// Closed. Terminal.
    Closed,
}

impl SessionState {
    /// Returns `true` if service calls are allowed.
    #[inline]
    pub fn is_activated(&self) -> bool {
        matches!(self, Self::Activated)
    }

    /// Returns the state name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Activated => "activated",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// SessionInfo
// =============================================================================

/// Values assigned by the server in CreateSession.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionInfo {
    /// Session id.
    pub session_id: NodeId,
    /// Token sent in every request header.
    pub authentication_token: NodeId,
    /// Session timeout granted by the server.
    pub revised_timeout: Duration,
    /// Largest request the server accepts; 0 for no limit.
    pub max_request_message_size: u32,
    /// Endpoints the server reported.
    pub server_endpoints: Vec<EndpointDescription>,
}

// =============================================================================
// SessionStats
// =============================================================================

/// Session counters.
#[derive(Debug, Default)]
pub struct SessionStats {
    creations: AtomicU64,
    activations: AtomicU64,
    recreations: AtomicU64,
    service_calls: AtomicU64,
    service_faults: AtomicU64,
}

impl SessionStats {
    /// CreateSession calls that succeeded.
    pub fn creations(&self) -> u64 {
        self.creations.load(Ordering::Relaxed)
    }

    /// ActivateSession calls that succeeded.
    pub fn activations(&self) -> u64 {
        self.activations.load(Ordering::Relaxed)
    }

    /// Sessions re-created after `BadSessionIdInvalid`.
    pub fn recreations(&self) -> u64 {
        self.recreations.load(Ordering::Relaxed)
    }

    /// Service calls sent.
    pub fn service_calls(&self) -> u64 {
        self.service_calls.load(Ordering::Relaxed)
    }

    /// Calls the server answered with a bad service result.
    pub fn service_faults(&self) -> u64 {
        self.service_faults.load(Ordering::Relaxed)
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

// =============================================================================
// Session
// =============================================================================

/// An OPC UA session. Owns its secure channel.
pub struct Session {
    channel: SecureChannel,
    settings: ClientSettings,
    state: RwLock<SessionState>,
    info: RwLock<SessionInfo>,
    identity: RwLock<Option<UserIdentity>>,
    namespaces: RwLock<NamespaceArray>,
    request_handle: AtomicU32,
    generation: AtomicU64,
    recovery: AsyncMutex<()>,
    stats: SessionStats,
}

impl Session {
    /// Creates a session on `channel`.
    pub async fn create(channel: SecureChannel, settings: &ClientSettings) -> UaResult<Self> {
        let session = Self {
            channel,
            settings: settings.clone(),
            state: RwLock::new(SessionState::Created),
            info: RwLock::new(SessionInfo::default()),
            identity: RwLock::new(None),
            namespaces: RwLock::new(NamespaceArray::new(vec![
                NamespaceArray::OPC_UA_NAMESPACE.to_string(),
            ])),
            request_handle: AtomicU32::new(0),
            generation: AtomicU64::new(0),
            recovery: AsyncMutex::new(()),
            stats: SessionStats::default(),
        };
        let info = session.create_session().await?;
        *session.info.write() = info;
        Ok(session)
    }

    /// Activates the session with `identity` and reads the namespace table.
    pub async fn activate(&self, identity: &UserIdentity) -> UaResult<()> {
        let state = self.state();
        if state != SessionState::Created {
            return Err(UaError::invalid_state("activate", state));
        }
        self.activate_session(identity).await?;
        *self.identity.write() = Some(identity.clone());
        *self.state.write() = SessionState::Activated;
        self.refresh_namespaces().await?;
        Ok(())
    }

    /// Reads one attribute of each node. Results are in request order.
    pub async fn read(
        &self,
        nodes: &[NodeId],
        attribute_id: AttributeId,
    ) -> UaResult<Vec<DataValue>> {
        self.require_activated("read")?;
        if nodes.is_empty() {
            return Ok(Vec::new());
        }
        let request = ReadRequest {
            max_age: 0.0,
            timestamps_to_return: TIMESTAMPS_BOTH,
            nodes_to_read: Some(
                nodes
                    .iter()
                    .map(|node_id| ReadValueId {
                        node_id: node_id.clone(),
                        attribute_id: attribute_id.value(),
                        ..ReadValueId::default()
                    })
                    .collect(),
            ),
            ..ReadRequest::default()
        };
        let response = self.call(request).await?;
        let results = response.results.unwrap_or_default();
        check_count(ReadRequest::NAME, nodes.len(), results.len())?;
        Ok(results)
    }

    /// Returns every reference of `node` of `reference_type` and its subtypes,
    /// following continuation points.
    pub async fn browse(
        &self,
        node: &NodeId,
        direction: BrowseDirection,
        reference_type: &NodeId,
    ) -> UaResult<Vec<ReferenceDescription>> {
        self.require_activated("browse")?;
        let request = BrowseRequest {
            nodes_to_browse: Some(vec![BrowseDescription {
                node_id: node.clone(),
                browse_direction: direction.value(),
                reference_type_id: reference_type.clone(),
                include_subtypes: true,
                node_class_mask: NODE_CLASS_ALL,
                result_mask: BROWSE_RESULT_MASK_ALL,
            }]),
            ..BrowseRequest::default()
        };
        let response = self.call(request).await?;
        let mut results = response.results.unwrap_or_default();
        check_count(BrowseRequest::NAME, 1, results.len())?;
        let mut result = results.remove(0);

        let mut references = Vec::new();
        loop {
            if result.status_code.is_bad() {
                return Err(SessionError::ServiceFault {
                    service: BrowseRequest::NAME,
                    status: result.status_code,
                }
                .into());
            }
            references.extend(result.references.unwrap_or_default());
            if result.continuation_point.is_null() || result.continuation_point.as_bytes().is_empty()
            {
                break;
            }
            let request = BrowseNextRequest {
                release_continuation_points: false,
                continuation_points: Some(vec![result.continuation_point]),
                ..BrowseNextRequest::default()
            };
            let response = self.call(request).await?;
            let mut next = response.results.unwrap_or_default();
            check_count(BrowseNextRequest::NAME, 1, next.len())?;
            result = next.remove(0);
        }

        debug!(node = %node, references = references.len(), "Browsed node");
        Ok(references)
    }

    /// Translates browse paths to node ids. Results are in request order.
    pub async fn translate_browse_paths(
        &self,
        paths: Vec<BrowsePath>,
    ) -> UaResult<Vec<BrowsePathResult>> {
        self.require_activated("translate_browse_paths")?;
        let expected = paths.len();
        if expected == 0 {
            return Ok(Vec::new());
        }
        let request = TranslateBrowsePathsToNodeIdsRequest {
            browse_paths: Some(paths),
            ..TranslateBrowsePathsToNodeIdsRequest::default()
        };
        let response = self.call(request).await?;
        let results = response.results.unwrap_or_default();
        check_count(TranslateBrowsePathsToNodeIdsRequest::NAME, expected, results.len())?;
        Ok(results)
    }

    /// Closes the session and its secure channel.
    pub async fn close(&self) -> UaResult<()> {
        let previous = std::mem::replace(&mut *self.state.write(), SessionState::Closed);
        if previous == SessionState::Closed {
            return Ok(());
        }

        if self.channel.is_open() {
            let request = CloseSessionRequest {
                delete_subscriptions: true,
                ..CloseSessionRequest::default()
            };
            if let Err(e) = self.send(request).await {
                debug!(error = %e, "CloseSession failed");
            }
        }
        info!(session_id = %self.info.read().session_id, "Session closed");
        self.channel.close().await
    }

    /// Re-reads `Server_NamespaceArray`.
    pub async fn refresh_namespaces(&self) -> UaResult<NamespaceArray> {
        self.require_activated("read")?;
        let response = self.call(namespace_read_request()).await?;
        self.store_namespaces(response)
    }

    fn store_namespaces(&self, response: ReadResponse) -> UaResult<NamespaceArray> {
        let results = response.results.unwrap_or_default();
        check_count(ReadRequest::NAME, 1, results.len())?;
        let value = results.into_iter().next().unwrap_or_default();
        if value.status().is_bad() {
            return Err(SessionError::ServiceFault {
                service: ReadRequest::NAME,
                status: value.status(),
            }
            .into());
        }
        let namespaces = namespace_array(&value)
            .ok_or_else(|| UaError::malformed("Server_NamespaceArray is not a string array"))?;
        debug!(namespaces = namespaces.len(), "Namespace table loaded");
        *self.namespaces.write() = namespaces.clone();
        Ok(namespaces)
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    /// Values assigned by the server.
    pub fn info(&self) -> SessionInfo {
        self.info.read().clone()
    }

    /// The server namespace table.
    pub fn namespaces(&self) -> NamespaceArray {
        self.namespaces.read().clone()
    }

    /// The secure channel.
    pub fn channel(&self) -> &SecureChannel {
        &self.channel
    }

    /// Session counters.
    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    fn require_activated(&self, operation: &'static str) -> UaResult<()> {
        let state = self.state();
        if state.is_activated() {
            Ok(())
        } else {
            Err(UaError::invalid_state(operation, state))
        }
    }

    fn next_request_handle(&self) -> u32 {
        self.request_handle.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
    }

    /// Sends a request, re-creating the session once on `BadSessionIdInvalid`.
    async fn call<R>(&self, request: R) -> UaResult<R::Response>
    where
        R: ServiceRequest + Clone,
    {
        let generation = self.generation.load(Ordering::Acquire);
        match self.send(request.clone()).await {
            Err(e) if e.status_code() == Some(StatusCode::BAD_SESSION_ID_INVALID) => {
                warn!(service = R::NAME, "Session rejected by server, re-creating");
                self.recover(generation).await?;
                self.send(request).await
            }
            other => other,
        }
    }

    async fn recover(&self, seen_generation: u64) -> UaResult<()> {
        let _guard = self.recovery.lock().await;
        if self.generation.load(Ordering::Acquire) != seen_generation {
            return Ok(());
        }
        let identity = self
            .identity
            .read()
            .clone()
            .ok_or_else(|| UaError::invalid_state("recreate", self.state()))?;

        let info = self.create_session().await?;
        *self.info.write() = info;
        self.activate_session(&identity).await?;
        let response = self.send(namespace_read_request()).await?;
        self.store_namespaces(response)?;
        self.generation.fetch_add(1, Ordering::AcqRel);
        SessionStats::bump(&self.stats.recreations);
        info!(
            session_id = %self.info.read().session_id,
            "Session re-created"
        );
        Ok(())
    }

    async fn send<R: ServiceRequest>(&self, mut request: R) -> UaResult<R::Response> {
        let handle = self.next_request_handle();
        let timeout = self.channel.request_timeout();
        *request.request_header_mut() = RequestHeader::new(
            self.info.read().authentication_token.clone(),
            handle,
            u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX),
        );

        SessionStats::bump(&self.stats.service_calls);
        let body = self.channel.send_request(encode_request(&request)).await?;
        let (header, response) = match decode_response::<R::Response>(&body)? {
            Ok(response) => (response.response_header().clone(), Some(response)),
            Err(fault) => (fault.response_header, None),
        };

        if header.request_handle != handle {
            return Err(ProtocolError::HandleMismatch {
                expected: handle,
                actual: header.request_handle,
            }
            .into());
        }
        match response {
            Some(response) if !header.service_result.is_bad() => Ok(response),
            _ => {
                SessionStats::bump(&self.stats.service_faults);
                debug!(service = R::NAME, status = %header.service_result, "Service fault");
                Err(SessionError::ServiceFault {
                    service: R::NAME,
                    status: header.service_result,
                }
                .into())
            }
        }
    }

    async fn create_session(&self) -> UaResult<SessionInfo> {
        let settings = &self.settings;
        let client_nonce = if settings.security_mode == SecurityMode::None {
            ByteString::null()
        } else {
            ByteString::from(generate_nonce())
        };
        let request = CreateSessionRequest {
            client_description: ApplicationDescription {
                application_uri: UaString::from(settings.effective_application_uri()),
                product_uri: settings
                    .product_uri
                    .as_deref()
                    .map(UaString::from)
                    .unwrap_or_default(),
                application_name: LocalizedText::text(settings.application_name.clone()),
                application_type: APPLICATION_TYPE_CLIENT,
                ..ApplicationDescription::default()
            },
            endpoint_url: UaString::from(self.channel.endpoint_url()),
            session_name: UaString::from(settings.effective_session_name()),
            client_nonce,
            requested_session_timeout: settings.session_timeout.as_millis() as f64,
            max_response_message_size: settings.max_message_size,
            ..CreateSessionRequest::default()
        };

        let response = self.send(request).await.map_err(|e| match e {
            UaError::Session(SessionError::ServiceFault { status, .. }) => {
                UaError::session(SessionError::CreationFailed { status })
            }
            other => other,
        })?;
        SessionStats::bump(&self.stats.creations);

        let info = SessionInfo {
            session_id: response.session_id,
            authentication_token: response.authentication_token,
            revised_timeout: Duration::from_millis(response.revised_session_timeout.max(0.0) as u64),
            max_request_message_size: response.max_request_message_size,
            server_endpoints: response.server_endpoints.unwrap_or_default(),
        };
        info!(
            session_id = %info.session_id,
            endpoint = %self.channel.endpoint_url(),
            revised_timeout_ms = info.revised_timeout.as_millis() as u64,
            "Session created"
        );
        Ok(info)
    }

    async fn activate_session(&self, identity: &UserIdentity) -> UaResult<()> {
        let policy_id = {
            let info = self.info.read();
            token_policy_id(&info.server_endpoints, identity, &self.settings)?
        };
        let request = ActivateSessionRequest {
            user_identity_token: identity_token(identity, policy_id),
            ..ActivateSessionRequest::default()
        };
        let response = self.send(request).await.map_err(|e| match e {
            UaError::Session(SessionError::ServiceFault { status, .. }) => {
                UaError::session(SessionError::ActivationFailed { status })
            }
            other => other,
        })?;
        if let Some(status) = response
            .results
            .unwrap_or_default()
            .into_iter()
            .find(|s| s.is_bad())
        {
            return Err(SessionError::ActivationFailed { status }.into());
        }
        SessionStats::bump(&self.stats.activations);
        info!(
            session_id = %self.info.read().session_id,
            identity = identity.type_name(),
            "Session activated"
        );
        Ok(())
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("session_id", &self.info.read().session_id)
            .field("state", &self.state())
            .field("channel", &self.channel)
            .finish()
    }
}

#[async_trait]
impl DictionarySource for Session {
    async fn read_values(&self, nodes: &[NodeId]) -> UaResult<Vec<DataValue>> {
        self.read(nodes, AttributeId::Value).await
    }

    async fn browse_references(
        &self,
        node: &NodeId,
        direction: BrowseDirection,
        reference_type: &NodeId,
    ) -> UaResult<Vec<ReferenceDescription>> {
        self.browse(node, direction, reference_type).await
    }

    fn namespaces(&self) -> NamespaceArray {
        Session::namespaces(self)
    }
}

fn namespace_read_request() -> ReadRequest {
    ReadRequest {
        max_age: 0.0,
        timestamps_to_return: TIMESTAMPS_BOTH,
        nodes_to_read: Some(vec![ReadValueId {
            node_id: variables::SERVER_NAMESPACE_ARRAY,
            attribute_id: AttributeId::Value.value(),
            ..ReadValueId::default()
        }]),
        ..ReadRequest::default()
    }
}

fn check_count(service: &'static str, expected: usize, actual: usize) -> UaResult<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(SessionError::ResultCountMismatch {
            service,
            expected,
            actual,
        }
        .into())
    }
}

fn namespace_array(value: &DataValue) -> Option<NamespaceArray> {
    let uris = value
        .value
        .as_ref()?
        .as_array()?
        .iter()
        .map(|v| v.as_str().map(str::to_string))
        .collect::<Option<Vec<_>>>()?;
    Some(NamespaceArray::new(uris))
}

/// Picks the user token policy id for `identity`.
///
/// Endpoints matching the channel security are preferred. A server that
/// lists no endpoints gets the conventional policy ids.
fn token_policy_id(
    endpoints: &[EndpointDescription],
    identity: &UserIdentity,
    settings: &ClientSettings,
) -> Result<UaString, SessionError> {
    if endpoints.is_empty() {
        let default = match identity {
            UserIdentity::Anonymous => "anonymous",
            UserIdentity::UserName { .. } => "username",
        };
        return Ok(UaString::from(default));
    }

    let token_type = identity.token_type();
    let matching = endpoints.iter().filter(|e| {
        e.security_mode == settings.security_mode.value()
            && e.security_policy_uri.as_str() == settings.security_policy.uri()
    });
    policy_for(matching, token_type)
        .or_else(|| policy_for(endpoints.iter(), token_type))
        .ok_or(SessionError::NoTokenPolicy {
            token_type: identity.type_name(),
        })
}

fn policy_for<'a>(
    endpoints: impl Iterator<Item = &'a EndpointDescription>,
    token_type: u32,
) -> Option<UaString> {
    endpoints
        .flat_map(|e| e.user_identity_tokens.iter().flatten())
        .find(|p| p.token_type == token_type)
        .map(|p| p.policy_id.clone())
}

fn identity_token(identity: &UserIdentity, policy_id: UaString) -> ExtensionObject {
    match identity {
        UserIdentity::Anonymous => ExtensionObject::from_encodable(
            data_types::ANONYMOUS_IDENTITY_TOKEN_ENCODING,
            &AnonymousIdentityToken { policy_id },
        ),
        UserIdentity::UserName { username, password } => ExtensionObject::from_encodable(
            data_types::USER_NAME_IDENTITY_TOKEN_ENCODING,
            &UserNameIdentityToken {
                policy_id,
                user_name: UaString::from(username.as_str()),
                password: ByteString::from(password.as_bytes()),
                encryption_algorithm: UaString::null(),
            },
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{BinaryEncodable, Variant};
    use crate::services::UserTokenPolicy;
    use crate::types::SecurityPolicy;

    fn endpoint(mode: SecurityMode, policy: SecurityPolicy, tokens: &[(u32, &str)]) -> EndpointDescription {
        EndpointDescription {
            security_mode: mode.value(),
            security_policy_uri: UaString::from(policy.uri()),
            user_identity_tokens: Some(
                tokens
                    .iter()
                    .map(|(token_type, id)| UserTokenPolicy {
                        policy_id: UaString::from(*id),
                        token_type: *token_type,
                        ..UserTokenPolicy::default()
                    })
                    .collect(),
            ),
            ..EndpointDescription::default()
        }
    }

    #[test]
    fn test_state_display() {
        assert_eq!(SessionState::Activated.to_string(), "activated");
        assert!(!SessionState::Closed.is_activated());
    }

    #[test]
    fn test_token_policy_prefers_matching_endpoint() {
        let settings = ClientSettings::default();
        let endpoints = vec![
            endpoint(SecurityMode::SignAndEncrypt, SecurityPolicy::Basic256Sha256, &[(0, "secure-anon")]),
            endpoint(SecurityMode::None, SecurityPolicy::None, &[(0, "open-anon"), (1, "open-user")]),
        ];

        let anonymous = token_policy_id(&endpoints, &UserIdentity::Anonymous, &settings).unwrap();
        assert_eq!(anonymous.as_str(), "open-anon");

        let user = UserIdentity::UserName {
            username: "operator".into(),
            password: "secret".into(),
        };
        assert_eq!(token_policy_id(&endpoints, &user, &settings).unwrap().as_str(), "open-user");
    }

    #[test]
    fn test_token_policy_missing() {
        let settings = ClientSettings::default();
        let endpoints = vec![endpoint(SecurityMode::None, SecurityPolicy::None, &[(0, "anon")])];
        let user = UserIdentity::UserName {
            username: "operator".into(),
            password: "secret".into(),
        };
        assert!(matches!(
            token_policy_id(&endpoints, &user, &settings),
            Err(SessionError::NoTokenPolicy { .. })
        ));
        assert_eq!(
            token_policy_id(&[], &user, &settings).unwrap().as_str(),
            "username"
        );
    }

    #[test]
    fn test_identity_token_encoding() {
        let token = identity_token(&UserIdentity::Anonymous, UaString::from("anon"));
        assert_eq!(token.type_id, data_types::ANONYMOUS_IDENTITY_TOKEN_ENCODING);
        let decoded: AnonymousIdentityToken = token.decode_as().unwrap();
        assert_eq!(decoded.policy_id.as_str(), "anon");
        assert!(!decoded.to_bytes().is_empty());
    }

    #[test]
    fn test_namespace_array_from_value() {
        let value = DataValue::new(
            Variant::array(
                crate::codec::BuiltInType::String,
                vec![
                    Variant::string(NamespaceArray::OPC_UA_NAMESPACE),
                    Variant::string("urn:demo"),
                ],
            )
            .unwrap(),
        );
        let namespaces = namespace_array(&value).unwrap();
        assert_eq!(namespaces.find_namespace_index("urn:demo"), Some(1));
        assert!(namespace_array(&DataValue::new(Variant::Int32(1))).is_none());
    }
}
