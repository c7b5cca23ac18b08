//! Session lifecycle shared by the client and server sides.
//!
//! ```text
//! Unconnected ──▶ Handshaking ──▶ Ready ──▶ Closing ──▶ Closed
//!                      │                       ▲
//!                      └───────────────────────┘
//! ```
//!
//! Once a session leaves `Ready` it never returns. [`SessionCore`] holds the
//! state together with the pending-call table so that closing and failing
//! every pending call happen under one lock: no call can register after the
//! table has been drained.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{oneshot, watch};

use crate::config::Config;
use crate::mcp::error::CloseReason;
use crate::mcp::protocol::{RequestId, Response};
use crate::mcp::types::Implementation;

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Transport bound, handshake not started.
    Unconnected,
    /// Initialize exchange in progress.
    Handshaking,
    /// Handshake complete; calls are accepted.
    Ready,
    /// Shutting down; new calls are rejected.
    Closing,
    /// Transport released.
    Closed,
}

impl SessionState {
    /// Returns `true` once the session has started closing.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Closing | Self::Closed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unconnected => "unconnected",
            Self::Handshaking => "handshaking",
            Self::Ready => "ready",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Per-session settings.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Label attached to this session's log records.
    pub label: String,
    /// Name and version announced during the handshake.
    pub implementation: Implementation,
    /// Default per-call timeout. `None` waits indefinitely.
    pub request_timeout: Option<Duration>,
    /// Limit on the whole initialize exchange.
    pub handshake_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            label: "session".to_string(),
            implementation: Implementation::this_crate(env!("CARGO_PKG_NAME")),
            request_timeout: None,
            handshake_timeout: Duration::from_secs(10),
        }
    }
}

impl SessionConfig {
    /// Settings for a client session.
    #[must_use]
    pub fn client(config: &Config) -> Self {
        Self {
            label: "client".to_string(),
            implementation: Implementation::this_crate(format!(
                "{}-client",
                env!("CARGO_PKG_NAME")
            )),
            request_timeout: config.session.request_timeout(),
            handshake_timeout: config.session.handshake_timeout(),
        }
    }

    /// Settings for a server session.
    #[must_use]
    pub fn server(config: &Config) -> Self {
        Self {
            label: "server".to_string(),
            implementation: Implementation::this_crate(config.server.name.clone()),
            request_timeout: config.session.request_timeout(),
            handshake_timeout: config.session.handshake_timeout(),
        }
    }
}

/// What a pending caller eventually receives.
pub(crate) type CallOutcome = Result<Response, CloseReason>;

/// Result of routing an incoming response.
#[derive(Debug)]
pub(crate) enum Delivery {
    /// A waiting caller received it.
    Delivered,
    /// The id matched but its caller had already gone.
    Abandoned,
    /// No pending call has this id.
    Unmatched(Response),
}

struct Inner {
    state: SessionState,
    close_reason: Option<CloseReason>,
    next_id: u64,
    pending: HashMap<RequestId, oneshot::Sender<CallOutcome>>,
}

/// Shared state of one client session.
pub(crate) struct SessionCore {
    inner: Mutex<Inner>,
    state_tx: watch::Sender<SessionState>,
}

impl SessionCore {
    pub(crate) fn new() -> Self {
        let (state_tx, _) = watch::channel(SessionState::Unconnected);
        Self {
            inner: Mutex::new(Inner {
                state: SessionState::Unconnected,
                close_reason: None,
                next_id: 1,
                pending: HashMap::new(),
            }),
            state_tx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, inner: &mut Inner, state: SessionState) {
        inner.state = state;
        self.state_tx.send_replace(state);
    }

    pub(crate) fn state(&self) -> SessionState {
        self.lock().state
    }

    pub(crate) fn close_reason(&self) -> Option<CloseReason> {
        self.lock().close_reason.clone()
    }

    /// Watches state transitions.
    pub(crate) fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// `Unconnected` to `Handshaking`.
    pub(crate) fn begin_handshake(&self) {
        let mut inner = self.lock();
        if inner.state == SessionState::Unconnected {
            self.set_state(&mut inner, SessionState::Handshaking);
        }
    }

    /// `Handshaking` to `Ready`.
    pub(crate) fn mark_ready(&self) -> Result<(), CloseReason> {
        let mut inner = self.lock();
        match inner.state {
            SessionState::Handshaking => {
                self.set_state(&mut inner, SessionState::Ready);
                Ok(())
            }
            SessionState::Ready => Ok(()),
            _ => Err(inner.close_reason.clone().unwrap_or(CloseReason::NotReady)),
        }
    }

    /// Moves to `Closing` and fails every pending call with `reason`.
    ///
    /// Returns `false` if the session was already closing; the first reason
    /// recorded is kept.
    pub(crate) fn begin_close(&self, reason: CloseReason) -> bool {
        let mut inner = self.lock();
        if inner.state.is_terminal() {
            return false;
        }

        self.set_state(&mut inner, SessionState::Closing);
        inner.close_reason = Some(reason.clone());

        let pending = std::mem::take(&mut inner.pending);
        if !pending.is_empty() {
            tracing::debug!(count = pending.len(), %reason, "Failing pending calls");
        }
        for (_, slot) in pending {
            let _ = slot.send(Err(reason.clone()));
        }
        true
    }

    /// `Closing` to `Closed`.
    pub(crate) fn finish_close(&self) {
        let mut inner = self.lock();
        if inner.close_reason.is_none() {
            inner.close_reason = Some(CloseReason::Shutdown);
        }
        self.set_state(&mut inner, SessionState::Closed);
    }

    /// Allocates an id and a response slot.
    ///
    /// Calls are accepted in `Ready`, and in `Handshaking` only when
    /// `during_handshake` is set.
    pub(crate) fn register(
        &self,
        during_handshake: bool,
    ) -> Result<(RequestId, oneshot::Receiver<CallOutcome>), CloseReason> {
        let mut inner = self.lock();
        let accepted = match inner.state {
            SessionState::Ready => true,
            SessionState::Handshaking => during_handshake,
            _ => false,
        };
        if !accepted {
            return Err(inner.close_reason.clone().unwrap_or(CloseReason::NotReady));
        }

        let id = RequestId(inner.next_id);
        inner.next_id += 1;
        let (tx, rx) = oneshot::channel();
        inner.pending.insert(id, tx);
        Ok((id, rx))
    }

    /// Drops a pending slot without completing it.
    pub(crate) fn abandon(&self, id: RequestId) -> bool {
        self.lock().pending.remove(&id).is_some()
    }

    /// Routes a response to the caller waiting on its id.
    pub(crate) fn deliver(&self, response: Response) -> Delivery {
        let Some(id) = response.id else {
            return Delivery::Unmatched(response);
        };
        let slot = self.lock().pending.remove(&id);
        match slot {
            Some(slot) => match slot.send(Ok(response)) {
                Ok(()) => Delivery::Delivered,
                Err(_) => Delivery::Abandoned,
            },
            None => Delivery::Unmatched(response),
        }
    }

    /// Number of calls awaiting a response.
    pub(crate) fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }
}

/// Removes a pending slot if its caller stops waiting early.
pub(crate) struct PendingGuard<'a> {
    core: &'a SessionCore,
    id: RequestId,
    armed: bool,
}

impl<'a> PendingGuard<'a> {
    pub(crate) const fn new(core: &'a SessionCore, id: RequestId) -> Self {
        Self {
            core,
            id,
            armed: true,
        }
    }

    /// The call completed; nothing to clean up.
    pub(crate) fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.core.abandon(self.id);
        }
    }
}
