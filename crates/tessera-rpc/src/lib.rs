//! Plugin RPC protocol for Tessera.
//!
//! A plugin is a child process exposing two interfaces:
//!
//! - `Service`: unary `Metadata`, `Invoke` and `State` calls used by the
//!   loader, actions and resource handlers.
//! - `Actors`: unary `GetActor` and the bidirectional `InvokeAction` stream,
//!   over which a running action can call back into the engine.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │  ActorsClient / ServiceClient                 │
//! │  - InvokeAction receive/dispatch loop         │
//! │  - Genesis callbacks (resource, notice)       │
//! └───────────────────────────────────────────────┘
//!                         │
//!                         ▼
//! ┌───────────────────────────────────────────────┐
//! │  Transport                                    │
//! │  - StdioTransport: Content-Length framing     │
//! │  - calls and streams multiplexed by id        │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tessera_rpc::{ServiceClient, StdioTransport, TransportConfig};
//!
//! let transport = StdioTransport::spawn(TransportConfig::new("./goplugins/hosts"))?;
//! let client = ServiceClient::new(Arc::new(transport));
//! let metadata = client.metadata().await?;
//! for def in &metadata.definitions {
//!     println!("{} ({})", def.name, def.style);
//! }
//! ```

pub mod client;
pub mod definition;
pub mod error;
pub mod genesis;
pub mod protocol;
pub mod stream;
pub mod transport;

pub use client::{ActorsClient, ServiceClient, invoke_on_stream};
pub use definition::{Definition, Namespace, Style, TypedName};
pub use error::{BoxError, Result, RpcError};
pub use genesis::Genesis;
pub use protocol::{
    ActionDefinition, ActorDefinition, Frame, GENESIS_NOTICE, GENESIS_RESOURCE, INVOKE_ACTION,
    Message, ServiceMetadata,
};
pub use stream::{ActionStream, ChannelStream, channel_pair};
pub use transport::{StdioTransport, Transport, TransportConfig, read_frame, write_frame};
