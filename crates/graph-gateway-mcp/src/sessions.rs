// crates/graph-gateway-mcp/src/sessions.rs
// ============================================================================
// Module: Session Registry
// Description: Long-lived SSE sessions and follow-up message routing.
// Purpose: Correlate posted messages with the push channel that answers them.
// Dependencies: tokio, tokio-stream, rand
// ============================================================================

//! ## Overview
//! A session is opened per SSE connection and registered under a random
//! 128-bit hex id. The returned [`SessionStream`] yields the messages pushed
//! to that session and deregisters the session when dropped, so a client
//! disconnect closes it. [`SessionRegistry::shutdown`] stops accepting new
//! sessions and closes every open channel, which ends their streams.
//!
//! Routing: an explicit id must name an open session. Without an id the
//! message goes to the sole open session when single-session fallback is
//! enabled; zero or several open sessions are routing errors.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::Mutex;
use std::task::Context;
use std::task::Poll;

use graph_gateway_core::signing::hex_encode;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_stream::Stream;

use crate::audit::AuditDetail;
use crate::audit::McpAuditEvent;
use crate::audit::McpAuditSink;
use crate::audit::SessionAction;
use crate::audit::SessionAudit;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Pending messages buffered per session.
const SESSION_CHANNEL_CAPACITY: usize = 32;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Session routing and lifecycle failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The named session is not open.
    #[error("Unknown sessionId: {0}")]
    UnknownSession(String),
    /// No session is open to receive the message.
    #[error("No SSE connections established")]
    NoSessions,
    /// Several sessions are open and the message names none of them.
    #[error("Multiple SSE sessions active. Specify sessionId query parameter.")]
    Ambiguous,
    /// The registry no longer accepts sessions.
    #[error("Server is shutting down")]
    ShuttingDown,
    /// The session closed before the message was delivered.
    #[error("SSE session closed")]
    Closed,
    /// The session's reader has fallen a full buffer behind.
    #[error("SSE session is not keeping up; message dropped")]
    Backlogged,
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Registry state guarded by a single lock.
struct RegistryState {
    /// Open sessions by id.
    sessions: HashMap<String, mpsc::Sender<String>>,
    /// False once shutdown begins.
    accepting: bool,
}

/// Registry of open SSE sessions.
pub struct SessionRegistry {
    /// Guarded state; never held across an await.
    state: Mutex<RegistryState>,
    /// Route uncorrelated messages to a sole open session.
    single_session_fallback: bool,
    /// Audit sink for lifecycle events.
    audit: Arc<dyn McpAuditSink>,
}

impl SessionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new(single_session_fallback: bool, audit: Arc<dyn McpAuditSink>) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(RegistryState {
                sessions: HashMap::new(),
                accepting: true,
            }),
            single_session_fallback,
            audit,
        })
    }

    /// Opens a new session.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::ShuttingDown`] once shutdown has begun.
    pub fn open(self: &Arc<Self>) -> Result<SessionStream, SessionError> {
        let (sender, receiver) = mpsc::channel(SESSION_CHANNEL_CAPACITY);
        let (id, active) = {
            let mut state = self.state.lock().map_err(|_| SessionError::ShuttingDown)?;
            if !state.accepting {
                return Err(SessionError::ShuttingDown);
            }
            let mut id = new_session_id();
            while state.sessions.contains_key(&id) {
                id = new_session_id();
            }
            state.sessions.insert(id.clone(), sender);
            (id, state.sessions.len())
        };
        self.record(&id, SessionAction::Opened, active);
        Ok(SessionStream {
            id,
            receiver,
            registry: Arc::clone(self),
        })
    }

    /// Resolves the target session for a posted message.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when routing is impossible or ambiguous.
    pub fn resolve(&self, session_id: Option<&str>) -> Result<String, SessionError> {
        let state = self.state.lock().map_err(|_| SessionError::ShuttingDown)?;
        if let Some(id) = session_id.filter(|id| !id.is_empty()) {
            return if state.sessions.contains_key(id) {
                Ok(id.to_string())
            } else {
                Err(SessionError::UnknownSession(id.to_string()))
            };
        }
        match state.sessions.len() {
            0 => Err(SessionError::NoSessions),
            1 if self.single_session_fallback => {
                state.sessions.keys().next().cloned().ok_or(SessionError::NoSessions)
            }
            _ => Err(SessionError::Ambiguous),
        }
    }

    /// Pushes a payload onto an open session without waiting for buffer space.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when the session is gone or its buffer is full.
    pub fn deliver(&self, session_id: &str, payload: String) -> Result<(), SessionError> {
        let sender = {
            let state = self.state.lock().map_err(|_| SessionError::ShuttingDown)?;
            state
                .sessions
                .get(session_id)
                .cloned()
                .ok_or_else(|| SessionError::UnknownSession(session_id.to_string()))?
        };
        sender.try_send(payload).map_err(|err| match err {
            TrySendError::Full(_) => SessionError::Backlogged,
            TrySendError::Closed(_) => SessionError::Closed,
        })
    }

    /// Removes a session, closing its channel.
    pub fn close(&self, session_id: &str) {
        let removed = self.state.lock().ok().and_then(|mut state| {
            state.sessions.remove(session_id).map(|_| state.sessions.len())
        });
        if let Some(active) = removed {
            self.record(session_id, SessionAction::Closed, active);
        }
    }

    /// Stops accepting sessions and closes every open one.
    ///
    /// Returns the number of sessions closed.
    pub fn shutdown(&self) -> usize {
        let Ok(mut state) = self.state.lock() else {
            return 0;
        };
        state.accepting = false;
        let closed: Vec<String> = state.sessions.drain().map(|(id, _)| id).collect();
        drop(state);
        for id in &closed {
            self.record(id, SessionAction::Closed, 0);
        }
        closed.len()
    }

    /// Returns the number of open sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().map(|state| state.sessions.len()).unwrap_or(0)
    }

    /// Returns true when no sessions are open.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Records a lifecycle event.
    fn record(&self, session_id: &str, action: SessionAction, active: usize) {
        self.audit.record(&McpAuditEvent::new(AuditDetail::Session(SessionAudit {
            session_id: session_id.to_string(),
            action,
            active,
        })));
    }
}

// ============================================================================
// SECTION: Session Stream
// ============================================================================

/// Receiving side of one session; deregisters on drop.
pub struct SessionStream {
    /// Session identifier.
    id: String,
    /// Messages pushed to the session.
    receiver: mpsc::Receiver<String>,
    /// Owning registry.
    registry: Arc<SessionRegistry>,
}

impl SessionStream {
    /// Returns the session identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Stream for SessionStream {
    type Item = String;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

impl Drop for SessionStream {
    fn drop(&mut self) {
        self.registry.close(&self.id);
    }
}

/// Generates a 128-bit random session id as lowercase hex.
fn new_session_id() -> String {
    let bytes: [u8; 16] = rand::random();
    hex_encode(&bytes)
}

// ============================================================================
// SECTION: Tests
// ============================================================================
