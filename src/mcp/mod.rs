//! Model Context Protocol (MCP) sessions over newline-delimited JSON-RPC.
//!
//! Both ends of a session live here: [`McpServer`] serves a
//! [`ToolDispatcher`] to one client, and [`ClientSession`] drives a server,
//! usually one started with [`process::ServerProcess`].
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          Session                             │
//! │                                                              │
//! │   ┌─────────────┐    ┌─────────────┐    ┌──────────────┐     │
//! │   │  Transport  │───▶│   Codec     │───▶│  Client or   │     │
//! │   │  (frames)   │    │ (protocol)  │    │  Server      │     │
//! │   └─────────────┘    └─────────────┘    └──────────────┘     │
//! │                                                │             │
//! │                                                ▼             │
//! │                          ┌──────────────────────────────┐    │
//! │                          │  Registry + Dispatcher       │    │
//! │                          └──────────────────────────────┘    │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Protocol Version
//!
//! This implementation targets MCP protocol version 2024-11-05.

pub mod client;
pub mod dispatch;
pub mod error;
pub mod process;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;
pub mod transport;
pub mod types;

pub use client::ClientSession;
pub use dispatch::ToolDispatcher;
pub use error::{CloseReason, CodecError, SessionError, TransportError};
pub use protocol::{Message, RequestId, MCP_PROTOCOL_VERSION};
pub use registry::{Arguments, ToolHandler, ToolRegistry};
pub use server::McpServer;
pub use session::{SessionConfig, SessionState};
pub use transport::Transport;
pub use types::{ParamType, ParameterSchema, ToolCallResult, ToolDescriptor};
