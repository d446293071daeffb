// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Service request and response messages.
//!
//! A message body on a secure channel is the encoding node id of the
//! message followed by its fields in declaration order.
//!
//! # Services
//!
//! | Service | Request | Response |
//! |---------|---------|----------|
//! | FindServers | 422 | 425 |
//! | OpenSecureChannel | 446 | 449 |
//! | CloseSecureChannel | 452 | |
//! | CreateSession | 461 | 464 |
//! | ActivateSession | 467 | 470 |
//! | CloseSession | 473 | 476 |
//! | Browse | 527 | 530 |
//! | BrowseNext | 533 | 536 |
//! | TranslateBrowsePathsToNodeIds | 554 | 557 |
//! | Read | 631 | 634 |
//!
//! Any response may instead be a `ServiceFault` (397).

use bytes::Bytes;

use crate::codec::{
    BinaryDecoder, BinaryEncodable, BinaryEncoder, DataValue, DiagnosticInfo, ExtensionObject,
};
use crate::error::{CodecResult, ProtocolError, UaError, UaResult};
use crate::types::ids::services as ids;
use crate::types::{
    ByteString, DateTime, ExpandedNodeId, LocalizedText, NodeId, QualifiedName, RelativePath,
    RelativePathElement, StatusCode, UaString,
};

/// Declares a message struct whose binary form is its fields in order.
macro_rules! binary_struct {
    (
        $(#[$meta:meta])*
        pub struct $name:ident {
            $( $(#[$field_meta:meta])* pub $field:ident : $ty:ty ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Default)]
        pub struct $name {
            $( $(#[$field_meta])* pub $field: $ty, )*
        }

        impl BinaryEncodable for $name {
            fn encode(&self, encoder: &mut BinaryEncoder) {
                $( self.$field.encode(encoder); )*
            }

            fn decode(decoder: &mut BinaryDecoder<'_>) -> CodecResult<Self> {
                Ok(Self {
                    $( $field: <$ty as BinaryEncodable>::decode(decoder)?, )*
                })
            }
        }
    };
}

// =============================================================================
// Traits
// =============================================================================

/// A request message.
pub trait ServiceRequest: BinaryEncodable + Send + Sync {
    /// Encoding node id.
    const TYPE_ID: NodeId;
    /// Service name for logs and errors.
    const NAME: &'static str;
    /// The matching response.
    type Response: ServiceResponse;

    /// The request header.
    fn request_header(&self) -> &RequestHeader;

    /// The request header, mutably.
    fn request_header_mut(&mut self) -> &mut RequestHeader;
}

/// A response message.
pub trait ServiceResponse: BinaryEncodable + Send {
    /// Encoding node id.
    const TYPE_ID: NodeId;
    /// Message name for logs and errors.
    const NAME: &'static str;

    /// The response header.
    fn response_header(&self) -> &ResponseHeader;
}

macro_rules! service {
    ($name:literal, $request:ident, $request_id:expr, $response:ident, $response_id:expr) => {
        impl ServiceRequest for $request {
            const TYPE_ID: NodeId = $request_id;
            const NAME: &'static str = $name;
            type Response = $response;

            fn request_header(&self) -> &RequestHeader {
                &self.request_header
            }

            fn request_header_mut(&mut self) -> &mut RequestHeader {
                &mut self.request_header
            }
        }

        impl ServiceResponse for $response {
            const TYPE_ID: NodeId = $response_id;
            const NAME: &'static str = concat!($name, "Response");

            fn response_header(&self) -> &ResponseHeader {
                &self.response_header
            }
        }
    };
}

/// Encodes a message body: type id, then fields.
pub fn encode_message<T: BinaryEncodable>(type_id: &NodeId, message: &T) -> Bytes {
    let mut encoder = BinaryEncoder::with_capacity(256);
    type_id.encode(&mut encoder);
    message.encode(&mut encoder);
    encoder.into_bytes()
}

/// Encodes a request body.
pub fn encode_request<R: ServiceRequest>(request: &R) -> Bytes {
    encode_message(&R::TYPE_ID, request)
}

/// Splits a message body into its type id and fields.
pub fn split_type_id(body: &[u8]) -> CodecResult<(NodeId, &[u8])> {
    let mut decoder = BinaryDecoder::new(body);
    let type_id = NodeId::decode(&mut decoder)?;
    Ok((type_id, decoder.rest()))
}

/// Decodes a response body.
///
/// Returns `Ok(Err(fault))` when the server answered with a `ServiceFault`.
pub fn decode_response<R: ServiceResponse>(body: &[u8]) -> UaResult<Result<R, ServiceFault>> {
    let (type_id, rest) = split_type_id(body)?;
    if type_id == R::TYPE_ID {
        Ok(Ok(R::from_bytes(rest)?))
    } else if type_id == ids::SERVICE_FAULT {
        Ok(Err(ServiceFault::from_bytes(rest)?))
    } else {
        Err(UaError::protocol(ProtocolError::UnexpectedResponse {
            expected: format!("{} ({})", R::NAME, R::TYPE_ID),
            actual: type_id.to_string(),
        }))
    }
}

// =============================================================================
// Headers
// =============================================================================

binary_struct! {
    /// Common request fields.
    pub struct RequestHeader {
        /// Session authentication token; null before the session exists.
        pub authentication_token: NodeId,
        /// Send time.
        pub timestamp: DateTime,
        /// Client-chosen handle echoed in the response.
        pub request_handle: u32,
        /// Diagnostics bit mask.
        pub return_diagnostics: u32,
        /// Audit log id.
        pub audit_entry_id: UaString,
        /// Timeout hint in milliseconds.
        pub timeout_hint: u32,
        /// Reserved.
        pub additional_header: ExtensionObject,
    }
}

impl RequestHeader {
    /// Creates a header stamped with the current time.
    pub fn new(authentication_token: NodeId, request_handle: u32, timeout_hint: u32) -> Self {
        Self {
            authentication_token,
            timestamp: DateTime::now(),
            request_handle,
            timeout_hint,
            ..Self::default()
        }
    }
}

binary_struct! {
    /// Common response fields.
    pub struct ResponseHeader {
        /// Send time.
        pub timestamp: DateTime,
        /// Handle of the request.
        pub request_handle: u32,
        /// Overall result.
        pub service_result: StatusCode,
        /// Diagnostics for the service result.
        pub service_diagnostics: DiagnosticInfo,
        /// Strings referenced by diagnostic infos.
        pub string_table: Option<Vec<UaString>>,
        /// Reserved.
        pub additional_header: ExtensionObject,
    }
}

impl ResponseHeader {
    /// Creates a header answering `request_handle`.
    pub fn new(request_handle: u32, service_result: StatusCode) -> Self {
        Self {
            timestamp: DateTime::now(),
            request_handle,
            service_result,
            ..Self::default()
        }
    }
}

binary_struct! {
    /// A failed service call.
    pub struct ServiceFault {
        /// Header carrying the bad service result.
        pub response_header: ResponseHeader,
    }
}

// =============================================================================
// Discovery Types
// =============================================================================

binary_struct! {
    /// Describes an application.
    pub struct ApplicationDescription {
        /// Application URI.
        pub application_uri: UaString,
        /// Product URI.
        pub product_uri: UaString,
        /// Display name.
        pub application_name: LocalizedText,
        /// 0 server, 1 client, 2 both, 3 discovery server.
        pub application_type: u32,
        /// Gateway URI.
        pub gateway_server_uri: UaString,
        /// Discovery profile.
        pub discovery_profile_uri: UaString,
        /// Discovery URLs.
        pub discovery_urls: Option<Vec<UaString>>,
    }
}

binary_struct! {
    /// An accepted user token type.
    pub struct UserTokenPolicy {
        /// Policy id to put in identity tokens.
        pub policy_id: UaString,
        /// 0 anonymous, 1 user name, 2 certificate, 3 issued.
        pub token_type: u32,
        /// Issued token type.
        pub issued_token_type: UaString,
        /// Issuer endpoint.
        pub issuer_endpoint_url: UaString,
        /// Security policy for the token.
        pub security_policy_uri: UaString,
    }
}

binary_struct! {
    /// A server endpoint.
    pub struct EndpointDescription {
        /// Endpoint URL.
        pub endpoint_url: UaString,
        /// The server.
        pub server: ApplicationDescription,
        /// Server certificate.
        pub server_certificate: ByteString,
        /// Message security mode.
        pub security_mode: u32,
        /// Security policy URI.
        pub security_policy_uri: UaString,
        /// Accepted user tokens.
        pub user_identity_tokens: Option<Vec<UserTokenPolicy>>,
        /// Transport profile.
        pub transport_profile_uri: UaString,
        /// Relative security level.
        pub security_level: u8,
    }
}

binary_struct! {
    /// A signature with its algorithm.
    pub struct SignatureData {
        /// Algorithm URI.
        pub algorithm: UaString,
        /// Signature bytes.
        pub signature: ByteString,
    }
}

binary_struct! {
    /// A software certificate.
    pub struct SignedSoftwareCertificate {
        /// Certificate bytes.
        pub certificate_data: ByteString,
        /// Signature bytes.
        pub signature: ByteString,
    }
}

binary_struct! {
    /// FindServers request.
    pub struct FindServersRequest {
        /// Header.
        pub request_header: RequestHeader,
        /// URL the client used.
        pub endpoint_url: UaString,
        /// Preferred locales.
        pub locale_ids: Option<Vec<UaString>>,
        /// Server filter.
        pub server_uris: Option<Vec<UaString>>,
    }
}

binary_struct! {
    /// FindServers response.
    pub struct FindServersResponse {
        /// Header.
        pub response_header: ResponseHeader,
        /// Known servers.
        pub servers: Option<Vec<ApplicationDescription>>,
    }
}

service!(
    "FindServers",
    FindServersRequest,
    ids::FIND_SERVERS_REQUEST,
    FindServersResponse,
    ids::FIND_SERVERS_RESPONSE
);

// =============================================================================
// Secure Channel
// =============================================================================

/// `SecurityTokenRequestType::Issue`.
pub const REQUEST_TYPE_ISSUE: u32 = 0;
/// `SecurityTokenRequestType::Renew`.
pub const REQUEST_TYPE_RENEW: u32 = 1;

binary_struct! {
    /// OpenSecureChannel request.
    pub struct OpenSecureChannelRequest {
        /// Header.
        pub request_header: RequestHeader,
        /// Protocol version.
        pub client_protocol_version: u32,
        /// Issue or renew.
        pub request_type: u32,
        /// Message security mode.
        pub security_mode: u32,
        /// Client nonce for key derivation.
        pub client_nonce: ByteString,
        /// Requested token lifetime in milliseconds.
        pub requested_lifetime: u32,
    }
}

binary_struct! {
    /// A channel security token.
    pub struct ChannelSecurityToken {
        /// Secure channel id.
        pub channel_id: u32,
        /// Token id.
        pub token_id: u32,
        /// Creation time.
        pub created_at: DateTime,
        /// Granted lifetime in milliseconds.
        pub revised_lifetime: u32,
    }
}

binary_struct! {
    /// OpenSecureChannel response.
    pub struct OpenSecureChannelResponse {
        /// Header.
        pub response_header: ResponseHeader,
        /// Protocol version.
        pub server_protocol_version: u32,
        /// The granted token.
        pub security_token: ChannelSecurityToken,
        /// Server nonce for key derivation.
        pub server_nonce: ByteString,
    }
}

service!(
    "OpenSecureChannel",
    OpenSecureChannelRequest,
    ids::OPEN_SECURE_CHANNEL_REQUEST,
    OpenSecureChannelResponse,
    ids::OPEN_SECURE_CHANNEL_RESPONSE
);

binary_struct! {
    /// CloseSecureChannel request. Has no response.
    pub struct CloseSecureChannelRequest {
        /// Header.
        pub request_header: RequestHeader,
    }
}

// =============================================================================
// Session
// =============================================================================

binary_struct! {
    /// CreateSession request.
    pub struct CreateSessionRequest {
        /// Header.
        pub request_header: RequestHeader,
        /// This client.
        pub client_description: ApplicationDescription,
        /// Expected server URI.
        pub server_uri: UaString,
        /// URL the client connected to.
        pub endpoint_url: UaString,
        /// Readable session name.
        pub session_name: UaString,
        /// Client nonce.
        pub client_nonce: ByteString,
        /// Client certificate.
        pub client_certificate: ByteString,
        /// Requested timeout in milliseconds.
        pub requested_session_timeout: f64,
        /// Largest response the client accepts; 0 for no limit.
        pub max_response_message_size: u32,
    }
}

binary_struct! {
    /// CreateSession response.
    pub struct CreateSessionResponse {
        /// Header.
        pub response_header: ResponseHeader,
        /// Session node.
        pub session_id: NodeId,
        /// Token for request headers.
        pub authentication_token: NodeId,
        /// Granted timeout in milliseconds.
        pub revised_session_timeout: f64,
        /// Server nonce.
        pub server_nonce: ByteString,
        /// Server certificate.
        pub server_certificate: ByteString,
        /// Server endpoints.
        pub server_endpoints: Option<Vec<EndpointDescription>>,
        /// Unused.
        pub server_software_certificates: Option<Vec<SignedSoftwareCertificate>>,
        /// Server signature over the client nonce.
        pub server_signature: SignatureData,
        /// Largest request the server accepts.
        pub max_request_message_size: u32,
    }
}

service!(
    "CreateSession",
    CreateSessionRequest,
    ids::CREATE_SESSION_REQUEST,
    CreateSessionResponse,
    ids::CREATE_SESSION_RESPONSE
);

binary_struct! {
    /// ActivateSession request.
    pub struct ActivateSessionRequest {
        /// Header.
        pub request_header: RequestHeader,
        /// Client signature.
        pub client_signature: SignatureData,
        /// Unused.
        pub client_software_certificates: Option<Vec<SignedSoftwareCertificate>>,
        /// Preferred locales.
        pub locale_ids: Option<Vec<UaString>>,
        /// Identity token.
        pub user_identity_token: ExtensionObject,
        /// Identity token signature.
        pub user_token_signature: SignatureData,
    }
}

binary_struct! {
    /// ActivateSession response.
    pub struct ActivateSessionResponse {
        /// Header.
        pub response_header: ResponseHeader,
        /// New server nonce.
        pub server_nonce: ByteString,
        /// Software certificate results.
        pub results: Option<Vec<StatusCode>>,
        /// Diagnostics.
        pub diagnostic_infos: Option<Vec<DiagnosticInfo>>,
    }
}

service!(
    "ActivateSession",
    ActivateSessionRequest,
    ids::ACTIVATE_SESSION_REQUEST,
    ActivateSessionResponse,
    ids::ACTIVATE_SESSION_RESPONSE
);

binary_struct! {
    /// Anonymous identity token.
    pub struct AnonymousIdentityToken {
        /// Policy id from the endpoint.
        pub policy_id: UaString,
    }
}

binary_struct! {
    /// User name identity token.
    pub struct UserNameIdentityToken {
        /// Policy id from the endpoint.
        pub policy_id: UaString,
        /// User name.
        pub user_name: UaString,
        /// Password, plain when `encryption_algorithm` is null.
        pub password: ByteString,
        /// Encryption algorithm URI.
        pub encryption_algorithm: UaString,
    }
}

binary_struct! {
    /// CloseSession request.
    pub struct CloseSessionRequest {
        /// Header.
        pub request_header: RequestHeader,
        /// Also delete subscriptions.
        pub delete_subscriptions: bool,
    }
}

binary_struct! {
    /// CloseSession response.
    pub struct CloseSessionResponse {
        /// Header.
        pub response_header: ResponseHeader,
    }
}

service!(
    "CloseSession",
    CloseSessionRequest,
    ids::CLOSE_SESSION_REQUEST,
    CloseSessionResponse,
    ids::CLOSE_SESSION_RESPONSE
);

// =============================================================================
// Read
// =============================================================================

/// `TimestampsToReturn::Both`.
pub const TIMESTAMPS_BOTH: u32 = 2;

binary_struct! {
    /// One attribute to read.
    pub struct ReadValueId {
        /// Node to read.
        pub node_id: NodeId,
        /// Attribute id.
        pub attribute_id: u32,
        /// Index range for arrays.
        pub index_range: UaString,
        /// Requested data encoding.
        pub data_encoding: QualifiedName,
    }
}

binary_struct! {
    /// Read request.
    pub struct ReadRequest {
        /// Header.
        pub request_header: RequestHeader,
        /// Maximum cache age in milliseconds.
        pub max_age: f64,
        /// Timestamps to return.
        pub timestamps_to_return: u32,
        /// Attributes to read.
        pub nodes_to_read: Option<Vec<ReadValueId>>,
    }
}

binary_struct! {
    /// Read response.
    pub struct ReadResponse {
        /// Header.
        pub response_header: ResponseHeader,
        /// One result per requested attribute.
        pub results: Option<Vec<DataValue>>,
        /// Diagnostics.
        pub diagnostic_infos: Option<Vec<DiagnosticInfo>>,
    }
}

service!(
    "Read",
    ReadRequest,
    ids::READ_REQUEST,
    ReadResponse,
    ids::READ_RESPONSE
);

// =============================================================================
// Browse
// =============================================================================

/// Result mask requesting every `ReferenceDescription` field.
pub const BROWSE_RESULT_MASK_ALL: u32 = 0x3F;

binary_struct! {
    /// View to browse in; null for the whole address space.
    pub struct ViewDescription {
        /// View node.
        pub view_id: NodeId,
        /// View time.
        pub timestamp: DateTime,
        /// View version.
        pub view_version: u32,
    }
}

binary_struct! {
    /// One node to browse.
    pub struct BrowseDescription {
        /// Node to browse.
        pub node_id: NodeId,
        /// 0 forward, 1 inverse, 2 both.
        pub browse_direction: u32,
        /// Reference type filter.
        pub reference_type_id: NodeId,
        /// Include reference subtypes.
        pub include_subtypes: bool,
        /// Node class filter; 0 for all.
        pub node_class_mask: u32,
        /// Fields to return.
        pub result_mask: u32,
    }
}

binary_struct! {
    /// A reference returned by browsing.
    pub struct ReferenceDescription {
        /// Reference type.
        pub reference_type_id: NodeId,
        /// Direction.
        pub is_forward: bool,
        /// Target node.
        pub node_id: ExpandedNodeId,
        /// Target browse name.
        pub browse_name: QualifiedName,
        /// Target display name.
        pub display_name: LocalizedText,
        /// Target node class.
        pub node_class: u32,
        /// Target type definition.
        pub type_definition: ExpandedNodeId,
    }
}

binary_struct! {
    /// Browse result of one node.
    pub struct BrowseResult {
        /// Operation status.
        pub status_code: StatusCode,
        /// Set when more references remain.
        pub continuation_point: ByteString,
        /// References.
        pub references: Option<Vec<ReferenceDescription>>,
    }
}

binary_struct! {
    /// Browse request.
    pub struct BrowseRequest {
        /// Header.
        pub request_header: RequestHeader,
        /// View.
        pub view: ViewDescription,
        /// Per-node reference limit; 0 for none.
        pub requested_max_references_per_node: u32,
        /// Nodes to browse.
        pub nodes_to_browse: Option<Vec<BrowseDescription>>,
    }
}

binary_struct! {
    /// Browse response.
    pub struct BrowseResponse {
        /// Header.
        pub response_header: ResponseHeader,
        /// One result per node.
        pub results: Option<Vec<BrowseResult>>,
        /// Diagnostics.
        pub diagnostic_infos: Option<Vec<DiagnosticInfo>>,
    }
}

service!(
    "Browse",
    BrowseRequest,
    ids::BROWSE_REQUEST,
    BrowseResponse,
    ids::BROWSE_RESPONSE
);

binary_struct! {
    /// BrowseNext request.
    pub struct BrowseNextRequest {
        /// Header.
        pub request_header: RequestHeader,
        /// Release instead of continuing.
        pub release_continuation_points: bool,
        /// Continuation points from earlier results.
        pub continuation_points: Option<Vec<ByteString>>,
    }
}

binary_struct! {
    /// BrowseNext response.
    pub struct BrowseNextResponse {
        /// Header.
        pub response_header: ResponseHeader,
        /// One result per continuation point.
        pub results: Option<Vec<BrowseResult>>,
        /// Diagnostics.
        pub diagnostic_infos: Option<Vec<DiagnosticInfo>>,
    }
}

service!(
    "BrowseNext",
    BrowseNextRequest,
    ids::BROWSE_NEXT_REQUEST,
    BrowseNextResponse,
    ids::BROWSE_NEXT_RESPONSE
);

// =============================================================================
// TranslateBrowsePathsToNodeIds
// =============================================================================

impl BinaryEncodable for RelativePathElement {
    fn encode(&self, encoder: &mut BinaryEncoder) {
        self.reference_type_id.encode(encoder);
        encoder.write_bool(self.is_inverse);
        encoder.write_bool(self.include_subtypes);
        self.target_name.encode(encoder);
    }

    fn decode(decoder: &mut BinaryDecoder<'_>) -> CodecResult<Self> {
        Ok(Self {
            reference_type_id: NodeId::decode(decoder)?,
            is_inverse: decoder.read_bool()?,
            include_subtypes: decoder.read_bool()?,
            target_name: QualifiedName::decode(decoder)?,
        })
    }
}

impl BinaryEncodable for RelativePath {
    fn encode(&self, encoder: &mut BinaryEncoder) {
        encoder.write_encodable_array(Some(self.elements.as_slice()));
    }

    fn decode(decoder: &mut BinaryDecoder<'_>) -> CodecResult<Self> {
        let elements = decoder
            .read_encodable_array("relative path")?
            .unwrap_or_default();
        Ok(Self { elements })
    }
}

/// The remaining path index of a fully resolved target.
pub const REMAINING_PATH_COMPLETE: u32 = u32::MAX;

binary_struct! {
    /// A path to translate.
    pub struct BrowsePath {
        /// Start node.
        pub starting_node: NodeId,
        /// Steps.
        pub relative_path: RelativePath,
    }
}

binary_struct! {
    /// A node a path resolved to.
    pub struct BrowsePathTarget {
        /// Target node.
        pub target_id: ExpandedNodeId,
        /// Index of the first unprocessed element, or `u32::MAX`.
        pub remaining_path_index: u32,
    }
}

binary_struct! {
    /// Translation result of one path.
    pub struct BrowsePathResult {
        /// Operation status.
        pub status_code: StatusCode,
        /// Targets.
        pub targets: Option<Vec<BrowsePathTarget>>,
    }
}

binary_struct! {
    /// TranslateBrowsePathsToNodeIds request.
    pub struct TranslateBrowsePathsToNodeIdsRequest {
        /// Header.
        pub request_header: RequestHeader,
        /// Paths.
        pub browse_paths: Option<Vec<BrowsePath>>,
    }
}

binary_struct! {
    /// TranslateBrowsePathsToNodeIds response.
    pub struct TranslateBrowsePathsToNodeIdsResponse {
        /// Header.
        pub response_header: ResponseHeader,
        /// One result per path.
        pub results: Option<Vec<BrowsePathResult>>,
        /// Diagnostics.
        pub diagnostic_infos: Option<Vec<DiagnosticInfo>>,
    }
}

service!(
    "TranslateBrowsePathsToNodeIds",
    TranslateBrowsePathsToNodeIdsRequest,
    ids::TRANSLATE_BROWSE_PATHS_REQUEST,
    TranslateBrowsePathsToNodeIdsResponse,
    ids::TRANSLATE_BROWSE_PATHS_RESPONSE
);
