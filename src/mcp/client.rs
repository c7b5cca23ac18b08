//! Client side of a session.
//!
//! [`ClientSession::connect`] performs the initialize handshake over a
//! [`Transport`] and starts a dispatch task that owns the reading half. The
//! task routes each response to the caller waiting on its id, answers the
//! server's `ping` requests, and closes the session on end of stream, a
//! transport failure, a malformed frame or a protocol violation. Every call
//! still pending at that point fails with [`SessionError::Closed`].
//!
//! All operations take `&self`, so one session can carry any number of
//! concurrent calls; responses may arrive in any order.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::mcp::error::{CloseReason, CodecError, SessionError};
use crate::mcp::protocol::{
    self, methods, Message, Notification, Request, Response, ResponsePayload,
    MCP_PROTOCOL_VERSION, SUPPORTED_PROTOCOL_VERSIONS,
};
use crate::mcp::registry::{Arguments, ToolCatalog};
use crate::mcp::session::{Delivery, PendingGuard, SessionConfig, SessionCore, SessionState};
use crate::mcp::transport::{FrameReader, FrameWriter, Transport};
use crate::mcp::types::{
    Implementation, InitializeParams, InitializeResult, ListToolsResult, ServerCapabilities,
    ToolCallParams, ToolCallResult, ToolDescriptor,
};

type SharedWriter = Arc<AsyncMutex<FrameWriter>>;

/// A connected client session.
pub struct ClientSession {
    link: Link,
    dispatch_task: Mutex<Option<JoinHandle<()>>>,
    catalog: Mutex<ToolCatalog>,
    server: InitializeResult,
    config: SessionConfig,
}

impl ClientSession {
    /// Performs the handshake over `transport` and returns a Ready session.
    ///
    /// # Errors
    ///
    /// Returns an error if the handshake fails, times out, or the server
    /// answers with an unsupported protocol version. The transport is
    /// closed in every error case.
    pub async fn connect(
        transport: Transport,
        config: SessionConfig,
    ) -> Result<Self, SessionError> {
        let (reader, writer) = transport.split();
        let core = Arc::new(SessionCore::new());
        let writer = Arc::new(AsyncMutex::new(writer));
        let span = tracing::info_span!("session", label = %config.label);

        core.begin_handshake();
        let task = tokio::spawn(
            dispatch_loop(Arc::clone(&core), reader, Arc::clone(&writer)).instrument(span.clone()),
        );
        let link = Link { core, writer };

        let after = config.handshake_timeout;
        let handshake = tokio::time::timeout(after, link.handshake(&config))
            .instrument(span)
            .await;

        let server = match handshake {
            Ok(Ok(server)) => server,
            Ok(Err(e)) => {
                tracing::warn!(label = %config.label, error = %e, "Handshake failed");
                let reason = e
                    .close_reason()
                    .unwrap_or_else(|| CloseReason::Protocol(e.to_string()));
                link.close(reason, Some(task)).await;
                return Err(e);
            }
            Err(_) => {
                tracing::warn!(label = %config.label, ?after, "Handshake timed out");
                link.close(
                    CloseReason::Protocol("handshake timed out".to_string()),
                    Some(task),
                )
                .await;
                return Err(SessionError::Timeout {
                    method: methods::INITIALIZE.to_string(),
                    after,
                });
            }
        };

        Ok(Self {
            link,
            dispatch_task: Mutex::new(Some(task)),
            catalog: Mutex::new(ToolCatalog::new()),
            server,
            config,
        })
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.link.core.state()
    }

    /// Why the session closed, once it has.
    #[must_use]
    pub fn close_reason(&self) -> Option<CloseReason> {
        self.link.core.close_reason()
    }

    /// Label used in log records.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.config.label
    }

    /// Server name and version from the handshake.
    #[must_use]
    pub const fn server_info(&self) -> &Implementation {
        &self.server.server_info
    }

    /// Protocol version the server agreed to.
    #[must_use]
    pub fn protocol_version(&self) -> &str {
        &self.server.protocol_version
    }

    /// Capabilities the server advertised.
    #[must_use]
    pub const fn server_capabilities(&self) -> &ServerCapabilities {
        &self.server.capabilities
    }

    /// Number of calls awaiting a response.
    #[must_use]
    pub fn pending_calls(&self) -> usize {
        self.link.core.pending_count()
    }

    /// Sends an arbitrary request and waits for its result.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Rpc`] if the server answers with an error
    /// object, [`SessionError::Timeout`] if the configured call timeout
    /// elapses, or [`SessionError::Closed`] if the session is not Ready or
    /// closes before the response arrives.
    pub async fn request(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<Value, SessionError> {
        self.link
            .request(method, params, self.config.request_timeout, false)
            .await
    }

    /// Checks that the server is responsive.
    ///
    /// # Errors
    ///
    /// See [`ClientSession::request`].
    pub async fn ping(&self) -> Result<(), SessionError> {
        self.request(methods::PING, None).await.map(|_| ())
    }

    /// Fetches the server's tools and replaces the local catalog.
    ///
    /// # Errors
    ///
    /// See [`ClientSession::request`]; also fails if the result is not a
    /// tool list.
    pub async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, SessionError> {
        let result = self.request(methods::TOOLS_LIST, None).await?;
        let listed: ListToolsResult = parse_result(methods::TOOLS_LIST, result)?;

        tracing::debug!(count = listed.tools.len(), "Discovered tools");
        self.catalog().update(listed.tools.clone());
        Ok(listed.tools)
    }

    /// Tools from the most recent [`ClientSession::list_tools`].
    #[must_use]
    pub fn tools(&self) -> Vec<ToolDescriptor> {
        self.catalog().tools()
    }

    /// Looks up a discovered tool by name.
    #[must_use]
    pub fn find_tool(&self, name: &str) -> Option<ToolDescriptor> {
        self.catalog().find(name).cloned()
    }

    /// Invokes a tool.
    ///
    /// A tool that fails still yields `Ok`; check
    /// [`ToolCallResult::is_failure`].
    ///
    /// # Errors
    ///
    /// See [`ClientSession::request`].
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Arguments,
    ) -> Result<ToolCallResult, SessionError> {
        self.call_tool_inner(name, arguments, self.config.request_timeout)
            .await
    }

    /// Invokes a tool with an explicit timeout.
    ///
    /// On timeout the call is abandoned: a late response is discarded and
    /// the session stays usable.
    ///
    /// # Errors
    ///
    /// See [`ClientSession::request`].
    pub async fn call_tool_with_timeout(
        &self,
        name: &str,
        arguments: Arguments,
        timeout: Duration,
    ) -> Result<ToolCallResult, SessionError> {
        self.call_tool_inner(name, arguments, Some(timeout)).await
    }

    async fn call_tool_inner(
        &self,
        name: &str,
        arguments: Arguments,
        timeout: Option<Duration>,
    ) -> Result<ToolCallResult, SessionError> {
        let params = ToolCallParams {
            name: name.to_string(),
            arguments,
        };
        let params = serde_json::to_value(params).map_err(CodecError::Encode)?;
        let result = self
            .link
            .request(methods::TOOLS_CALL, Some(params), timeout, false)
            .await?;
        parse_result(methods::TOOLS_CALL, result)
    }

    /// Closes the session. Idempotent.
    ///
    /// Pending calls fail with [`CloseReason::Shutdown`] and the transport
    /// is closed. The state is `Closed` on return.
    pub async fn shutdown(&self) {
        let task = self.take_task();
        if self.state() != SessionState::Closed {
            tracing::info!(label = %self.config.label, "Shutting down session");
        }
        self.link.close(CloseReason::Shutdown, task).await;
    }

    /// Waits until the session reaches `Closed`.
    pub async fn closed(&self) {
        let mut states = self.link.core.subscribe();
        let _ = states
            .wait_for(|state| *state == SessionState::Closed)
            .await;
    }

    fn catalog(&self) -> std::sync::MutexGuard<'_, ToolCatalog> {
        self.catalog.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn take_task(&self) -> Option<JoinHandle<()>> {
        self.dispatch_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

impl Drop for ClientSession {
    fn drop(&mut self) {
        if let Some(task) = self.take_task() {
            task.abort();
        }
        if self.link.core.begin_close(CloseReason::Shutdown) {
            tracing::debug!(label = %self.config.label, "Session dropped without shutdown");
        }
        self.link.core.finish_close();
    }
}

impl std::fmt::Debug for ClientSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSession")
            .field("label", &self.config.label)
            .field("state", &self.state())
            .field("server", &self.server.server_info)
            .finish_non_exhaustive()
    }
}

/// The writing side of a session plus its shared state.
struct Link {
    core: Arc<SessionCore>,
    writer: SharedWriter,
}

impl Link {
    async fn handshake(&self, config: &SessionConfig) -> Result<InitializeResult, SessionError> {
        let params = InitializeParams {
            protocol_version: MCP_PROTOCOL_VERSION.to_string(),
            capabilities: json!({}),
            client_info: Some(config.implementation.clone()),
        };
        let params = serde_json::to_value(params).map_err(CodecError::Encode)?;

        let result = self
            .request(methods::INITIALIZE, Some(params), None, true)
            .await?;
        let result: InitializeResult = parse_result(methods::INITIALIZE, result)?;

        if !SUPPORTED_PROTOCOL_VERSIONS.contains(&result.protocol_version.as_str()) {
            return Err(SessionError::Protocol(format!(
                "unsupported protocol version '{}'",
                result.protocol_version
            )));
        }

        // Ready before the notification goes out, so a server message that
        // follows it is not mistaken for a handshake violation.
        self.core.mark_ready().map_err(SessionError::closed)?;
        self.send(&Notification::new(methods::INITIALIZED, None).into())
            .await?;

        tracing::info!(
            server = %result.server_info.name,
            version = %result.server_info.version,
            protocol = %result.protocol_version,
            "Session ready"
        );
        Ok(result)
    }

    async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Option<Duration>,
        during_handshake: bool,
    ) -> Result<Value, SessionError> {
        let (id, rx) = self
            .core
            .register(during_handshake)
            .map_err(SessionError::closed)?;
        let mut guard = PendingGuard::new(&self.core, id);

        tracing::debug!(%id, method, "Sending request");
        self.send(&Request::new(id, method, params).into()).await?;

        let outcome = match timeout {
            Some(after) => {
                if let Ok(outcome) = tokio::time::timeout(after, rx).await {
                    outcome
                } else {
                    tracing::debug!(%id, method, ?after, "Request timed out");
                    return Err(SessionError::Timeout {
                        method: method.to_string(),
                        after,
                    });
                }
            }
            None => rx.await,
        };
        guard.disarm();

        match outcome {
            Ok(Ok(response)) => match response.payload {
                ResponsePayload::Result(value) => Ok(value),
                ResponsePayload::Error(error) => Err(SessionError::Rpc {
                    code: error.code,
                    message: error.message,
                }),
            },
            Ok(Err(reason)) => Err(SessionError::closed(reason)),
            Err(_) => Err(SessionError::closed(
                self.core.close_reason().unwrap_or(CloseReason::Shutdown),
            )),
        }
    }

    async fn send(&self, message: &Message) -> Result<(), SessionError> {
        match write_message(&self.writer, message).await {
            Ok(()) => Ok(()),
            Err(e @ SessionError::Transport(_)) => {
                if self.core.state().is_terminal() {
                    return Err(SessionError::closed(
                        self.core.close_reason().unwrap_or(CloseReason::Shutdown),
                    ));
                }
                tracing::warn!(error = %e, "Transport write failed");
                // The dispatch task sees the state change and finishes the close.
                if let Some(reason) = e.close_reason() {
                    self.core.begin_close(reason);
                }
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Fails pending calls, stops the dispatch task and closes the transport.
    async fn close(&self, reason: CloseReason, task: Option<JoinHandle<()>>) {
        self.core.begin_close(reason);

        if let Some(task) = task {
            task.abort();
            let _ = task.await;
        }

        if let Err(e) = self.writer.lock().await.close().await {
            tracing::debug!(error = %e, "Error closing transport");
        }
        self.core.finish_close();
    }
}

async fn write_message(writer: &SharedWriter, message: &Message) -> Result<(), SessionError> {
    let frame = protocol::encode(message)?;
    writer.lock().await.send(&frame).await?;
    Ok(())
}

fn parse_result<T: DeserializeOwned>(method: &str, value: Value) -> Result<T, SessionError> {
    serde_json::from_value(value).map_err(|e| SessionError::UnexpectedResult {
        method: method.to_string(),
        reason: e.to_string(),
    })
}

/// Reads frames until the session ends, then closes it.
///
/// A close begun elsewhere, such as a failed write, also ends the loop so the
/// session still reaches `Closed`.
async fn dispatch_loop(core: Arc<SessionCore>, mut reader: FrameReader, writer: SharedWriter) {
    let mut states = core.subscribe();
    let reason = loop {
        let received = tokio::select! {
            received = reader.receive() => Some(received),
            _ = states.wait_for(|state| state.is_terminal()) => None,
        };
        let Some(received) = received else {
            break core.close_reason().unwrap_or(CloseReason::Shutdown);
        };

        let frame = match received {
            Ok(Some(frame)) => frame,
            Ok(None) => break CloseReason::EndOfStream,
            Err(e) => {
                tracing::warn!(error = %e, "Transport read failed");
                break CloseReason::Transport(e.to_string());
            }
        };

        let message = match protocol::decode(&frame) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(error = %e, "Received malformed frame");
                break CloseReason::Malformed(e.to_string());
            }
        };

        if let Err(reason) = handle_incoming(&core, &writer, message).await {
            break reason;
        }
    };

    if core.begin_close(reason.clone()) {
        tracing::info!(%reason, "Session closed");
    }
    reader.close();
    if let Err(e) = writer.lock().await.close().await {
        tracing::debug!(error = %e, "Error closing transport");
    }
    core.finish_close();
}

async fn handle_incoming(
    core: &SessionCore,
    writer: &SharedWriter,
    message: Message,
) -> Result<(), CloseReason> {
    let handshaking = core.state() == SessionState::Handshaking;

    match message {
        Message::Response(response) => route_response(core, handshaking, response),
        Message::Request(request) => {
            if handshaking {
                return Err(CloseReason::Protocol(format!(
                    "server sent '{}' before the handshake completed",
                    request.method
                )));
            }

            let reply = if request.method == methods::PING {
                Response::success(request.id, json!({}))
            } else {
                tracing::debug!(method = %request.method, "Rejecting server request");
                Response::method_not_found(request.id, &request.method)
            };

            write_message(writer, &reply.into()).await.map_err(|e| {
                e.close_reason()
                    .unwrap_or_else(|| CloseReason::Transport(e.to_string()))
            })
        }
        Message::Notification(notification) => {
            if handshaking {
                return Err(CloseReason::Protocol(format!(
                    "server sent '{}' before the handshake completed",
                    notification.method
                )));
            }
            tracing::debug!(method = %notification.method, "Ignoring notification");
            Ok(())
        }
    }
}

fn route_response(
    core: &SessionCore,
    handshaking: bool,
    response: Response,
) -> Result<(), CloseReason> {
    match core.deliver(response) {
        Delivery::Delivered => Ok(()),
        Delivery::Abandoned => {
            tracing::debug!("Discarding response for an abandoned call");
            Ok(())
        }
        Delivery::Unmatched(response) => match response.id {
            None => {
                let detail = match response.payload {
                    ResponsePayload::Error(error) => error.message,
                    ResponsePayload::Result(_) => "result without id".to_string(),
                };
                Err(CloseReason::Protocol(format!(
                    "server reported an error without a request id: {detail}"
                )))
            }
            Some(id) if handshaking => Err(CloseReason::Protocol(format!(
                "unexpected response to request {id} during handshake"
            ))),
            Some(id) => {
                tracing::warn!(%id, "Dropping response with unmatched id");
                Ok(())
            }
        },
    }
}
