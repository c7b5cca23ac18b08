//! toolwire: a line-oriented JSON-RPC tool client and server over stdio
//!
//! A server publishes named tools with parameter schemas; a client spawns
//! the server as a subprocess, performs the initialize handshake, discovers
//! the tools and invokes them concurrently over one stream.
//!
//! # Architecture
//!
//! - **Transport**: newline-delimited frames over any byte stream
//! - **Codec**: JSON-RPC 2.0 requests, notifications and responses
//! - **Session**: handshake, request correlation, timeouts and shutdown
//! - **Registry / Dispatcher**: tool descriptors, argument checks, handlers
//!
//! # Modules
//!
//! - [`config`]: Configuration loading and validation
//! - [`error`]: Error types
//! - [`mcp`]: Protocol and session implementation
//! - [`tools`]: Built-in tools
//! - [`cli`]: Demo and interactive client

pub mod cli;
pub mod config;
pub mod error;
pub mod mcp;
pub mod tools;
