// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Well-known namespace 0 node ids used by the client core.

use super::NodeId;

/// Standard reference types.
pub mod reference_types {
    use super::NodeId;

    /// References (abstract base type) - i=31.
    pub const REFERENCES: NodeId = NodeId::numeric(0, 31);
    /// HierarchicalReferences (abstract) - i=33.
    pub const HIERARCHICAL_REFERENCES: NodeId = NodeId::numeric(0, 33);
    /// Organizes - i=35.
    pub const ORGANIZES: NodeId = NodeId::numeric(0, 35);
    /// HasEncoding - i=38.
    pub const HAS_ENCODING: NodeId = NodeId::numeric(0, 38);
    /// HasDescription - i=39.
    pub const HAS_DESCRIPTION: NodeId = NodeId::numeric(0, 39);
    /// HasTypeDefinition - i=40.
    pub const HAS_TYPE_DEFINITION: NodeId = NodeId::numeric(0, 40);
    /// HasSubtype - i=45.
    pub const HAS_SUBTYPE: NodeId = NodeId::numeric(0, 45);
    /// HasProperty - i=46.
    pub const HAS_PROPERTY: NodeId = NodeId::numeric(0, 46);
    /// HasComponent - i=47.
    pub const HAS_COMPONENT: NodeId = NodeId::numeric(0, 47);
}

/// Standard objects.
pub mod objects {
    use super::NodeId;

    /// Root folder - i=84.
    pub const ROOT_FOLDER: NodeId = NodeId::numeric(0, 84);
    /// Objects folder - i=85.
    pub const OBJECTS_FOLDER: NodeId = NodeId::numeric(0, 85);
    /// OPC binary type system folder holding the dictionaries - i=93.
    pub const OPC_BINARY_SCHEMA_TYPE_SYSTEM: NodeId = NodeId::numeric(0, 93);
    /// Server object - i=2253.
    pub const SERVER: NodeId = NodeId::numeric(0, 2253);
}

/// Standard variables.
pub mod variables {
    use super::NodeId;

    /// Server_ServerArray - i=2254.
    pub const SERVER_SERVER_ARRAY: NodeId = NodeId::numeric(0, 2254);
    /// Server_NamespaceArray - i=2255.
    pub const SERVER_NAMESPACE_ARRAY: NodeId = NodeId::numeric(0, 2255);
}

/// Standard structured data types and their binary encodings.
pub mod data_types {
    use super::NodeId;

    /// Argument - i=296.
    pub const ARGUMENT: NodeId = NodeId::numeric(0, 296);
    /// Argument_Encoding_DefaultBinary - i=298.
    pub const ARGUMENT_ENCODING: NodeId = NodeId::numeric(0, 298);
    /// Range - i=884.
    pub const RANGE: NodeId = NodeId::numeric(0, 884);
    /// Range_Encoding_DefaultBinary - i=886.
    pub const RANGE_ENCODING: NodeId = NodeId::numeric(0, 886);
    /// EUInformation - i=887.
    pub const EU_INFORMATION: NodeId = NodeId::numeric(0, 887);
    /// EUInformation_Encoding_DefaultBinary - i=889.
    pub const EU_INFORMATION_ENCODING: NodeId = NodeId::numeric(0, 889);
    /// AnonymousIdentityToken_Encoding_DefaultBinary - i=321.
    pub const ANONYMOUS_IDENTITY_TOKEN_ENCODING: NodeId = NodeId::numeric(0, 321);
    /// UserNameIdentityToken_Encoding_DefaultBinary - i=324.
    pub const USER_NAME_IDENTITY_TOKEN_ENCODING: NodeId = NodeId::numeric(0, 324);
}

/// Binary encoding ids of the service messages.
pub mod services {
    use super::NodeId;

    /// ServiceFault - i=397.
    pub const SERVICE_FAULT: NodeId = NodeId::numeric(0, 397);
    /// FindServersRequest - i=422.
    pub const FIND_SERVERS_REQUEST: NodeId = NodeId::numeric(0, 422);
    /// FindServersResponse - i=425.
    pub const FIND_SERVERS_RESPONSE: NodeId = NodeId::numeric(0, 425);
    /// OpenSecureChannelRequest - i=446.
    pub const OPEN_SECURE_CHANNEL_REQUEST: NodeId = NodeId::numeric(0, 446);
    /// OpenSecureChannelResponse - i=449.
    pub const OPEN_SECURE_CHANNEL_RESPONSE: NodeId = NodeId::numeric(0, 449);
    /// CloseSecureChannelRequest - i=452.
    pub const CLOSE_SECURE_CHANNEL_REQUEST: NodeId = NodeId::numeric(0, 452);
    /// CreateSessionRequest - i=461.
    pub const CREATE_SESSION_REQUEST: NodeId = NodeId::numeric(0, 461);
    /// CreateSessionResponse - i=464.
    pub const CREATE_SESSION_RESPONSE: NodeId = NodeId::numeric(0, 464);
    /// ActivateSessionRequest - i=467.
    pub const ACTIVATE_SESSION_REQUEST: NodeId = NodeId::numeric(0, 467);
    /// ActivateSessionResponse - i=470.
    pub const ACTIVATE_SESSION_RESPONSE: NodeId = NodeId::numeric(0, 470);
    /// CloseSessionRequest - i=473.
    pub const CLOSE_SESSION_REQUEST: NodeId = NodeId::numeric(0, 473);
    /// CloseSessionResponse - i=476.
    pub const CLOSE_SESSION_RESPONSE: NodeId = NodeId::numeric(0, 476);
    /// BrowseRequest - i=527.
    pub const BROWSE_REQUEST: NodeId = NodeId::numeric(0, 527);
    /// BrowseResponse - i=530.
    pub const BROWSE_RESPONSE: NodeId = NodeId::numeric(0, 530);
    /// BrowseNextRequest - i=533.
    pub const BROWSE_NEXT_REQUEST: NodeId = NodeId::numeric(0, 533);
    /// BrowseNextResponse - i=536.
    pub const BROWSE_NEXT_RESPONSE: NodeId = NodeId::numeric(0, 536);
    /// TranslateBrowsePathsToNodeIdsRequest - i=554.
    pub const TRANSLATE_BROWSE_PATHS_REQUEST: NodeId = NodeId::numeric(0, 554);
    /// TranslateBrowsePathsToNodeIdsResponse - i=557.
    pub const TRANSLATE_BROWSE_PATHS_RESPONSE: NodeId = NodeId::numeric(0, 557);
    /// ReadRequest - i=631.
    pub const READ_REQUEST: NodeId = NodeId::numeric(0, 631);
    /// ReadResponse - i=634.
    pub const READ_RESPONSE: NodeId = NodeId::numeric(0, 634);
}
