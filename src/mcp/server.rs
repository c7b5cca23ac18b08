//! Server side of a session.
//!
//! The server lifecycle:
//!
//! 1. **Handshaking**: only `initialize` followed by the
//!    `notifications/initialized` notification is accepted
//! 2. **Ready**: `tools/list`, `tools/call` and `ping` are served
//! 3. **Closing**: the client closed the stream, a signal arrived, or the
//!    client broke the protocol
//!
//! Requests are handled one at a time in arrival order. A request before
//! the handshake completes, a second `initialize`, or an undecodable frame
//! gets an error response and then ends the session. Unknown methods while
//! Ready get a method-not-found error and the session carries on.

use std::future::Future;

use serde::de::DeserializeOwned;
use serde_json::json;
use tokio::time::Instant;

use crate::mcp::dispatch::ToolDispatcher;
use crate::mcp::error::{SessionError, TransportError};
use crate::mcp::protocol::{
    self, methods, Message, Notification, Request, Response, MCP_PROTOCOL_VERSION,
};
use crate::mcp::session::{SessionConfig, SessionState};
use crate::mcp::transport::Transport;
use crate::mcp::types::{
    Implementation, InitializeParams, InitializeResult, ListToolsResult, ServerCapabilities,
    ToolCallParams,
};

/// A tool server bound to one session at a time.
pub struct McpServer {
    /// Current lifecycle state.
    state: SessionState,
    /// Tool routing.
    dispatcher: ToolDispatcher,
    /// Name, version and timeouts.
    config: SessionConfig,
    /// Negotiated protocol version (set after initialisation).
    protocol_version: Option<String>,
    /// Client name and version from the handshake.
    client_info: Option<Implementation>,
}

impl McpServer {
    /// Creates a server that dispatches to `dispatcher`.
    #[must_use]
    pub const fn new(dispatcher: ToolDispatcher, config: SessionConfig) -> Self {
        Self {
            state: SessionState::Unconnected,
            dispatcher,
            config,
            protocol_version: None,
            client_info: None,
        }
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// The tools this server publishes.
    #[must_use]
    pub const fn dispatcher(&self) -> &ToolDispatcher {
        &self.dispatcher
    }

    /// Client identity from the last handshake.
    #[must_use]
    pub const fn client_info(&self) -> Option<&Implementation> {
        self.client_info.as_ref()
    }

    /// Protocol version agreed in the last handshake.
    #[must_use]
    pub fn protocol_version(&self) -> Option<&str> {
        self.protocol_version.as_deref()
    }

    /// Serves one session over stdin/stdout until the client disconnects or
    /// the process is signalled.
    ///
    /// # Errors
    ///
    /// Returns an error if the session ends because of a transport failure
    /// or a protocol violation.
    pub async fn run_stdio(&mut self, max_frame_bytes: usize) -> Result<(), SessionError> {
        self.run_with_shutdown(Transport::stdio(max_frame_bytes))
            .await
    }

    /// Serves one session over `transport` until the client disconnects.
    ///
    /// # Errors
    ///
    /// See [`McpServer::run_stdio`].
    pub async fn run(&mut self, transport: Transport) -> Result<(), SessionError> {
        self.serve(transport, std::future::pending()).await
    }

    /// Runs the main loop and handles shutdown.
    #[cfg(unix)]
    async fn run_with_shutdown(&mut self, transport: Transport) -> Result<(), SessionError> {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt()).map_err(TransportError::from)?;
        let mut sigterm = signal(SignalKind::terminate()).map_err(TransportError::from)?;

        let shutdown = async move {
            tokio::select! {
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT, initiating graceful shutdown");
                }
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM, initiating graceful shutdown");
                }
            }
        };

        self.serve(transport, shutdown).await
    }

    /// Runs the main loop and handles shutdown.
    #[cfg(windows)]
    async fn run_with_shutdown(&mut self, transport: Transport) -> Result<(), SessionError> {
        let shutdown = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "Cannot listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        };

        self.serve(transport, shutdown).await
    }

    /// Serves one session until the client disconnects or `shutdown`
    /// completes. The transport is closed on every exit path.
    ///
    /// # Errors
    ///
    /// See [`McpServer::run_stdio`].
    pub async fn serve<F>(
        &mut self,
        mut transport: Transport,
        shutdown: F,
    ) -> Result<(), SessionError>
    where
        F: Future<Output = ()>,
    {
        self.state = SessionState::Handshaking;
        self.protocol_version = None;
        self.client_info = None;

        let deadline = Instant::now() + self.config.handshake_timeout;
        tokio::pin!(shutdown);

        let result = loop {
            let handshaking = self.state == SessionState::Handshaking;
            tokio::select! {
                () = &mut shutdown => break Ok(()),

                () = tokio::time::sleep_until(deadline), if handshaking => {
                    break Err(SessionError::Protocol("handshake timed out".to_string()));
                }

                frame_result = transport.receive() => {
                    match self.handle_transport_result(&mut transport, frame_result).await {
                        Ok(false) => {}
                        Ok(true) => break Ok(()),
                        Err(e) => break Err(e),
                    }
                }
            }
        };

        self.state = SessionState::Closing;
        if let Err(e) = transport.close().await {
            tracing::debug!(error = %e, "Error closing transport");
        }
        self.state = SessionState::Closed;

        match &result {
            Ok(()) => tracing::info!(label = %self.config.label, "Session closed"),
            Err(e) => tracing::warn!(label = %self.config.label, error = %e, "Session terminated"),
        }
        result
    }

    /// Handles the result from transport read.
    ///
    /// Returns `true` if the client closed the stream.
    async fn handle_transport_result(
        &mut self,
        transport: &mut Transport,
        frame_result: Result<Option<Vec<u8>>, TransportError>,
    ) -> Result<bool, SessionError> {
        let Some(frame) = frame_result? else {
            tracing::debug!("Client closed the stream");
            return Ok(true);
        };

        let message = match protocol::decode(&frame) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(error = %e, "Received malformed frame");
                Self::send(transport, Response::parse_error(&e).into()).await?;
                return Err(e.into());
            }
        };

        match message {
            Message::Request(req) => self.handle_request(transport, req).await?,
            Message::Notification(notif) => self.handle_notification(&notif)?,
            Message::Response(resp) => self.handle_response(&resp)?,
        }
        Ok(false)
    }

    /// Handles an incoming request.
    async fn handle_request(
        &mut self,
        transport: &mut Transport,
        req: Request,
    ) -> Result<(), SessionError> {
        let response = match (self.state, req.method.as_str()) {
            (SessionState::Handshaking, methods::INITIALIZE) if self.protocol_version.is_none() => {
                self.handle_initialize(&req)
            }
            (_, methods::INITIALIZE) => {
                return Self::reject(transport, &req, "Server already initialised").await;
            }
            (SessionState::Ready, methods::TOOLS_LIST) => self.handle_tools_list(&req),
            (SessionState::Ready, methods::TOOLS_CALL) => self.handle_tools_call(&req),
            (SessionState::Ready, methods::PING) => Self::handle_ping(&req),
            (SessionState::Ready, _) => {
                tracing::debug!(method = %req.method, "Unknown method");
                Response::method_not_found(req.id, &req.method)
            }
            _ => return Self::reject(transport, &req, "Server not initialised").await,
        };

        Self::send(transport, response.into()).await
    }

    /// Answers a request that breaks the lifecycle, then ends the session.
    async fn reject(
        transport: &mut Transport,
        req: &Request,
        message: &str,
    ) -> Result<(), SessionError> {
        tracing::warn!(method = %req.method, "{message}");
        Self::send(transport, Response::invalid_request(req.id, message).into()).await?;
        Err(SessionError::Protocol(format!(
            "'{}' rejected: {message}",
            req.method
        )))
    }

    /// Handles an incoming notification.
    fn handle_notification(&mut self, notif: &Notification) -> Result<(), SessionError> {
        match (self.state, notif.method.as_str()) {
            (SessionState::Handshaking, methods::INITIALIZED)
                if self.protocol_version.is_some() =>
            {
                self.state = SessionState::Ready;
                tracing::info!(
                    client = self.client_info.as_ref().map_or("unknown", |c| c.name.as_str()),
                    "Client initialised"
                );
                Ok(())
            }
            (SessionState::Ready, _) => {
                tracing::debug!(method = %notif.method, "Ignoring notification");
                Ok(())
            }
            _ => Err(SessionError::Protocol(format!(
                "'{}' received before initialisation completed",
                notif.method
            ))),
        }
    }

    /// Handles a response. The server never sends requests, so none match.
    fn handle_response(&self, resp: &Response) -> Result<(), SessionError> {
        if self.state != SessionState::Ready {
            return Err(SessionError::Protocol(
                "response received before initialisation completed".to_string(),
            ));
        }
        tracing::warn!(id = ?resp.id, "Dropping response with unmatched id");
        Ok(())
    }

    /// Handles the initialize request.
    fn handle_initialize(&mut self, req: &Request) -> Response {
        let params: InitializeParams = match Self::parse_params(req, "initialize") {
            Ok(params) => params,
            Err(response) => return response,
        };

        if params.protocol_version != MCP_PROTOCOL_VERSION {
            tracing::info!(
                requested = %params.protocol_version,
                offered = MCP_PROTOCOL_VERSION,
                "Client requested a different protocol version"
            );
        }

        let negotiated_version = MCP_PROTOCOL_VERSION.to_string();
        self.protocol_version = Some(negotiated_version.clone());
        self.client_info = params.client_info;

        let result = InitializeResult {
            protocol_version: negotiated_version,
            capabilities: ServerCapabilities::default(),
            server_info: self.config.implementation.clone(),
        };
        Self::to_response(req, &result)
    }

    /// Handles the tools/list request.
    fn handle_tools_list(&self, req: &Request) -> Response {
        let result = ListToolsResult {
            tools: self.dispatcher.registry().describe(),
        };
        Self::to_response(req, &result)
    }

    /// Handles the tools/call request.
    fn handle_tools_call(&self, req: &Request) -> Response {
        let params: ToolCallParams = match Self::parse_params(req, "tool call") {
            Ok(params) => params,
            Err(response) => return response,
        };

        tracing::debug!(tool = %params.name, "Calling tool");
        let result = self.dispatcher.dispatch(&params.name, &params.arguments);
        Self::to_response(req, &result)
    }

    /// Handles the ping request.
    fn handle_ping(req: &Request) -> Response {
        Response::success(req.id, json!({}))
    }

    fn parse_params<T: DeserializeOwned>(req: &Request, what: &str) -> Result<T, Response> {
        let params = req
            .params
            .clone()
            .ok_or_else(|| Response::invalid_params(req.id, format!("Missing {what} params")))?;

        serde_json::from_value(params)
            .map_err(|e| Response::invalid_params(req.id, format!("Invalid {what} params: {e}")))
    }

    fn to_response<T: serde::Serialize>(req: &Request, result: &T) -> Response {
        match serde_json::to_value(result) {
            Ok(value) => Response::success(req.id, value),
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialise result");
                Response::internal_error(req.id, "Internal error: failed to serialise result")
            }
        }
    }

    async fn send(transport: &mut Transport, message: Message) -> Result<(), SessionError> {
        let frame = protocol::encode(&message)?;
        transport.send(&frame).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::registry::ToolRegistry;
    use crate::mcp::transport::DEFAULT_MAX_FRAME_BYTES;
    use crate::mcp::types::{ParamType, ParameterSchema, ToolDescriptor};
    use serde_json::Value;
    use tokio::task::JoinHandle;

    fn echo_server() -> McpServer {
        let mut registry = ToolRegistry::new();
        registry.register_fn(
            ToolDescriptor::new(
                "echo",
                "Echo text",
                ParameterSchema::new().required("text", ParamType::String, "Text to echo"),
            ),
            |args| Ok(args["text"].as_str().unwrap_or_default().to_string()),
        );
        McpServer::new(ToolDispatcher::new(registry), SessionConfig::default())
    }

    fn spawn_server() -> (Transport, JoinHandle<(SessionState, Result<(), SessionError>)>) {
        let (client, server_side) = Transport::pair(DEFAULT_MAX_FRAME_BYTES);
        let handle = tokio::spawn(async move {
            let mut server = echo_server();
            let result = server.run(server_side).await;
            (server.state(), result)
        });
        (client, handle)
    }

    async fn send(transport: &mut Transport, value: Value) {
        transport.send(value.to_string().as_bytes()).await.unwrap();
    }

    async fn recv(transport: &mut Transport) -> Value {
        let frame = transport.receive().await.unwrap().unwrap();
        serde_json::from_slice(&frame).unwrap()
    }

    async fn handshake(transport: &mut Transport) -> Value {
        send(
            transport,
            json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": "initialize",
                "params": {
                    "protocolVersion": MCP_PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": {"name": "test", "version": "0"}
                }
            }),
        )
        .await;
        let response = recv(transport).await;
        send(
            transport,
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
        )
        .await;
        response
    }

    #[test]
    fn server_initial_state() {
        let server = echo_server();
        assert_eq!(server.state(), SessionState::Unconnected);
        assert_eq!(server.dispatcher().registry().len(), 1);
    }

    #[tokio::test]
    async fn handshake_list_and_call() {
        let (mut client, handle) = spawn_server();

        let init = handshake(&mut client).await;
        assert_eq!(init["id"], 1);
        assert_eq!(init["result"]["protocolVersion"], MCP_PROTOCOL_VERSION);
        assert!(init["result"]["serverInfo"]["name"].is_string());

        send(&mut client, json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"})).await;
        let list = recv(&mut client).await;
        assert_eq!(list["result"]["tools"][0]["name"], "echo");
        assert_eq!(list["result"]["tools"][0]["inputSchema"]["required"][0], "text");

        send(
            &mut client,
            json!({
                "jsonrpc": "2.0",
                "id": 3,
                "method": "tools/call",
                "params": {"name": "echo", "arguments": {"text": "hi"}}
            }),
        )
        .await;
        let call = recv(&mut client).await;
        assert_eq!(call["id"], 3);
        assert_eq!(call["result"]["content"][0]["text"], "hi");

        send(&mut client, json!({"jsonrpc": "2.0", "id": 4, "method": "ping"})).await;
        assert_eq!(recv(&mut client).await["result"], json!({}));

        client.close().await.unwrap();
        let (state, result) = handle.await.unwrap();
        assert_eq!(state, SessionState::Closed);
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn request_before_initialize_is_fatal() {
        let (mut client, handle) = spawn_server();

        send(&mut client, json!({"jsonrpc": "2.0", "id": 7, "method": "tools/list"})).await;
        let response = recv(&mut client).await;
        assert_eq!(response["id"], 7);
        assert_eq!(response["error"]["code"], -32600);

        assert!(client.receive().await.unwrap().is_none());
        let (state, result) = handle.await.unwrap();
        assert_eq!(state, SessionState::Closed);
        assert!(matches!(result, Err(SessionError::Protocol(_))));
    }

    #[tokio::test]
    async fn second_initialize_is_fatal() {
        let (mut client, handle) = spawn_server();
        handshake(&mut client).await;

        send(
            &mut client,
            json!({
                "jsonrpc": "2.0",
                "id": 9,
                "method": "initialize",
                "params": {"protocolVersion": MCP_PROTOCOL_VERSION}
            }),
        )
        .await;
        let response = recv(&mut client).await;
        assert_eq!(response["error"]["code"], -32600);

        let (_, result) = handle.await.unwrap();
        assert!(matches!(result, Err(SessionError::Protocol(_))));
    }

    #[tokio::test]
    async fn malformed_frame_gets_parse_error_and_closes() {
        let (mut client, handle) = spawn_server();
        handshake(&mut client).await;

        client.send(b"{not json").await.unwrap();
        let response = recv(&mut client).await;
        assert_eq!(response["id"], Value::Null);
        assert_eq!(response["error"]["code"], -32700);

        let (state, result) = handle.await.unwrap();
        assert_eq!(state, SessionState::Closed);
        assert!(matches!(result, Err(SessionError::Malformed(_))));
    }

    #[tokio::test]
    async fn unknown_method_keeps_session_open() {
        let (mut client, handle) = spawn_server();
        handshake(&mut client).await;

        send(&mut client, json!({"jsonrpc": "2.0", "id": 5, "method": "resources/list"})).await;
        let response = recv(&mut client).await;
        assert_eq!(response["error"]["code"], -32601);

        send(&mut client, json!({"jsonrpc": "2.0", "id": 6, "method": "ping"})).await;
        assert_eq!(recv(&mut client).await["id"], 6);

        client.close().await.unwrap();
        assert!(handle.await.unwrap().1.is_ok());
    }

    #[tokio::test]
    async fn invalid_tool_call_params() {
        let (mut client, handle) = spawn_server();
        handshake(&mut client).await;

        send(
            &mut client,
            json!({"jsonrpc": "2.0", "id": 8, "method": "tools/call", "params": {"arguments": {}}}),
        )
        .await;
        let response = recv(&mut client).await;
        assert_eq!(response["error"]["code"], -32602);

        send(
            &mut client,
            json!({
                "jsonrpc": "2.0",
                "id": 9,
                "method": "tools/call",
                "params": {"name": "missing", "arguments": {}}
            }),
        )
        .await;
        let response = recv(&mut client).await;
        assert_eq!(response["result"]["isError"], true);
        assert_eq!(response["result"]["content"][0]["text"], "unknown tool: missing");

        client.close().await.unwrap();
        assert!(handle.await.unwrap().1.is_ok());
    }
}
