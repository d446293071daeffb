// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Minimal OPC UA binary client core.
//!
//! This crate speaks OPC UA TCP binary to a single server: it opens a secure
//! channel, creates and activates a session, resolves symbolic addresses to
//! node ids and reads values, decoding structured values against the
//! server's type dictionaries.
//!
//! # Features
//!
//! - Secure channel with pipelined requests and keep-alive
//! - Message security: None, Sign, SignAndEncrypt
//! - Session with automatic re-creation after `BadSessionIdInvalid`
//! - Address resolution through TranslateBrowsePathsToNodeIds
//! - Lazy OPC binary schema dictionaries and generic structure decoding
//!
//! # Error Handling
//!
//! ```text
//! UaError
//! ├── Connection    - Transport and endpoint failures
//! ├── Protocol      - Framing and sequencing violations
//! ├── Security      - Signature, decryption and policy failures
//! ├── Session       - Session lifecycle and service faults
//! ├── Resolution    - Address resolution failures (per item)
//! ├── Dictionary    - Type dictionary failures (per item)
//! ├── Codec         - Binary decoding failures (per item)
//! ├── Configuration - Invalid settings
//! └── Timeout       - Request and connect deadlines
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use uabin_client::types::{Address, ExpandedNodeId, NodeIdentifier, QualifiedName};
//! use uabin_client::{Argument, Client, ClientSettings};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = ClientSettings::builder()
//!         .application_name("inspector")
//!         .discovery_url("opc.tcp://localhost:48010")
//!         .build()?;
//!     let client = Client::new(settings)?;
//!
//!     let method = Address::absolute(
//!         ExpandedNodeId::with_namespace_uri(
//!             NodeIdentifier::String("Demo.Method.VectorAdd".into()),
//!             "http://www.unifiedautomation.com/DemoServer/",
//!         ),
//!         None,
//!     );
//!     let inputs = Address::relative(method, [QualifiedName::new(0, "InputArguments")]);
//!
//!     let result = client.read(&[inputs]).await?;
//!     if let Some(value) = &result[0].data {
//!         for argument in Argument::from_variant(value)? {
//!             println!("{}", argument);
//!         }
//!     }
//!     client.disconnect().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

pub mod argument;
pub mod channel;
pub mod client;
pub mod codec;
pub mod dictionary;
pub mod error;
pub mod resolver;
pub mod services;
pub mod session;
pub mod settings;
pub mod types;

pub use error::{
    ChannelFault, CodecError, ConfigurationError, ConnectionError, DictionaryError, ErrorCode,
    ErrorSeverity, ProtocolError, ResolutionError, SecurityError, SessionError, TargetError,
    TargetErrorKind, TimeoutError, UaError, UaResult,
};

pub use types::{
    Address, ExpandedNodeId, NamespaceArray, NodeId, QualifiedName, RelativePath,
    RelativePathElement, SecurityMode, SecurityPolicy, StatusCode, UserIdentity,
};

pub use argument::Argument;
pub use channel::{ChannelConfig, ChannelStats, Connector, SecureChannel, TcpConnector};
pub use client::{Client, ClientStats, ReadResult, ReadResultTarget};
pub use codec::{DataValue, ExtensionObject, ExtensionObjectBody, GenericValue, Variant};
pub use dictionary::{DataTypeDefinition, StructureDefinition, TypeDictionary, UnionDefinition};
pub use resolver::{AddressResolver, PathTranslator};
pub use session::{Session, SessionState, SessionStats};
pub use settings::{ClientSettings, ClientSettingsBuilder, SettingsFormat};
