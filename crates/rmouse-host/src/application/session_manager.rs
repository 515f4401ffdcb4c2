//! Session Manager: accepts, authenticates, and dispatches client sessions.
//!
//! Every inbound control-channel connection becomes a [`Session`]:
//!
//! ```text
//! accept() ──► Unauthenticated ──hello(pin ok)──► Authenticated ──► ... ──► drop
//!                     │                                   │
//!                     └── anything else / bad pin ──► close         on_disconnect
//! ```
//!
//! - `Unauthenticated`: only `Hello{pin}` is processed.  A bad PIN, any other
//!   message, or an undecodable frame closes the session with an `Error`.
//! - `Authenticated`: input messages go to the session's own
//!   [`InputTranslator`]; `Ping` is answered with `Pong`; a second `Hello` is a
//!   protocol violation that yields `Error` but keeps the session open.
//!
//! # Registry discipline
//!
//! The [`SessionRegistry`] is the only state shared between sessions.  The cap
//! check and the insert happen under one lock acquisition, so a racing accept
//! and disconnect can never lose an update or overshoot the cap.  Message
//! translation never holds the registry lock.
//!
//! A [`Session`] removes itself from the registry when dropped, so a session
//! task that ends for any reason (including a panic unwinding through it)
//! cannot leak its slot.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use rmouse_core::{
    discovery::DEFAULT_CAPABILITIES,
    keymap::Platform,
    protocol::{
        codec::{decode_message_bounded, ProtocolError},
        messages::{
            ControlMessage, ERR_ALREADY_AUTHENTICATED, ERR_EXPECTED_HELLO, ERR_INVALID_PIN,
            MAX_MESSAGE_SIZE,
        },
    },
};
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::application::translate_input::{InputSink, InputTranslator, DEFAULT_POINTER_SPEED};

/// Unique identifier of one control-channel connection.
pub type SessionId = Uuid;

/// Default cap on concurrent sessions.
pub const DEFAULT_MAX_SESSIONS: usize = 10;

/// Returned by [`SessionManager::accept`] when the cap is reached.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("session limit of {limit} reached")]
pub struct CapacityError {
    pub limit: usize,
}

/// Authentication state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    Authenticated,
}

/// Read-only view of one registry entry.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub id: SessionId,
    pub remote_addr: SocketAddr,
    pub auth: AuthState,
    pub connected_at: Instant,
    pub last_activity: Instant,
}

/// What the transport must do after a frame was handled.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageOutcome {
    /// Message to send back, if any.
    pub reply: Option<ControlMessage>,
    /// Close the connection after sending `reply`.
    pub close: bool,
}

impl MessageOutcome {
    fn none() -> Self {
        Self {
            reply: None,
            close: false,
        }
    }

    fn reply(msg: ControlMessage) -> Self {
        Self {
            reply: Some(msg),
            close: false,
        }
    }

    fn close_with(msg: ControlMessage) -> Self {
        Self {
            reply: Some(msg),
            close: true,
        }
    }
}

/// Settings the Session Manager reads on every accept.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Shared secret.  Empty means no PIN is required.
    pub pin: String,
    pub max_sessions: usize,
    /// Display name sent in the `Ok` reply.
    pub server_name: String,
    pub pointer_speed: f64,
    pub platform: Platform,
    /// Frames longer than this are rejected before parsing.
    pub max_message_size: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            pin: String::new(),
            max_sessions: DEFAULT_MAX_SESSIONS,
            server_name: "RemoteMouse".to_string(),
            pointer_speed: DEFAULT_POINTER_SPEED,
            platform: Platform::current(),
            max_message_size: MAX_MESSAGE_SIZE,
        }
    }
}

// ── Registry ──────────────────────────────────────────────────────────────────

/// Synchronized map of live sessions.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<SessionId, SessionInfo>>,
}

impl SessionRegistry {
    fn lock(&self) -> MutexGuard<'_, HashMap<SessionId, SessionInfo>> {
        // A panic while holding the lock leaves the map itself consistent.
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn try_insert(&self, info: SessionInfo, limit: usize) -> Result<(), CapacityError> {
        let mut sessions = self.lock();
        if sessions.len() >= limit {
            return Err(CapacityError { limit });
        }
        sessions.insert(info.id, info);
        Ok(())
    }

    fn remove(&self, id: SessionId) -> Option<SessionInfo> {
        self.lock().remove(&id)
    }

    fn update(&self, id: SessionId, f: impl FnOnce(&mut SessionInfo)) {
        if let Some(info) = self.lock().get_mut(&id) {
            f(info);
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns all entries, oldest connection first.
    pub fn snapshot(&self) -> Vec<SessionInfo> {
        let mut all: Vec<_> = self.lock().values().cloned().collect();
        all.sort_by_key(|s| s.connected_at);
        all
    }
}

// ── Session ───────────────────────────────────────────────────────────────────

/// One live connection, owned by the task that reads its frames.
///
/// Because a single task owns the `Session` and handles its frames one at a
/// time, messages from one client are always translated in arrival order.
pub struct Session {
    id: SessionId,
    remote_addr: SocketAddr,
    auth: AuthState,
    translator: InputTranslator,
    registry: Arc<SessionRegistry>,
}

impl Session {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    pub fn auth_state(&self) -> AuthState {
        self.auth
    }

    pub fn is_authenticated(&self) -> bool {
        self.auth == AuthState::Authenticated
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.translator.release_held();
        if self.registry.remove(self.id).is_some() {
            debug!(session = %self.id, "session released on drop");
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("remote_addr", &self.remote_addr)
            .field("auth", &self.auth)
            .finish()
    }
}

// ── Manager ───────────────────────────────────────────────────────────────────

/// Host-side session lifecycle and message dispatch.
pub struct SessionManager {
    settings: SessionSettings,
    sink: Arc<dyn InputSink>,
    registry: Arc<SessionRegistry>,
}

impl SessionManager {
    pub fn new(settings: SessionSettings, sink: Arc<dyn InputSink>) -> Self {
        Self {
            settings,
            sink,
            registry: Arc::new(SessionRegistry::default()),
        }
    }

    pub fn pin_required(&self) -> bool {
        !self.settings.pin.is_empty()
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Registers a new unauthenticated session for `remote_addr`.
    ///
    /// # Errors
    ///
    /// Returns [`CapacityError`] when `max_sessions` sessions already exist;
    /// the caller must close the connection without queuing it.
    pub fn accept(&self, remote_addr: SocketAddr) -> Result<Session, CapacityError> {
        let now = Instant::now();
        let id = Uuid::new_v4();
        self.registry.try_insert(
            SessionInfo {
                id,
                remote_addr,
                auth: AuthState::Unauthenticated,
                connected_at: now,
                last_activity: now,
            },
            self.settings.max_sessions,
        )?;

        info!(session = %id, %remote_addr, "session accepted");
        Ok(Session {
            id,
            remote_addr,
            auth: AuthState::Unauthenticated,
            translator: InputTranslator::new(
                Arc::clone(&self.sink),
                self.settings.platform,
                self.settings.pointer_speed,
            ),
            registry: Arc::clone(&self.registry),
        })
    }

    /// Decodes one text frame and handles it.
    ///
    /// A frame that fails to decode is answered with `Error`; it closes the
    /// session only while the session is still unauthenticated.
    pub fn on_frame(&self, session: &mut Session, text: &str) -> MessageOutcome {
        self.touch(session.id);
        match decode_message_bounded(text, self.settings.max_message_size) {
            Ok(msg) => self.on_message(session, msg),
            Err(e) => self.on_decode_error(session, e),
        }
    }

    fn on_decode_error(&self, session: &Session, e: ProtocolError) -> MessageOutcome {
        warn!(session = %session.id, "rejected frame: {e}");
        let reply = ControlMessage::error(e.to_string());
        if session.is_authenticated() {
            MessageOutcome::reply(reply)
        } else {
            MessageOutcome::close_with(reply)
        }
    }

    /// Handles one decoded message.
    pub fn on_message(&self, session: &mut Session, msg: ControlMessage) -> MessageOutcome {
        debug!(session = %session.id, tag = msg.tag(), "message");
        match session.auth {
            AuthState::Unauthenticated => self.authenticate(session, msg),
            AuthState::Authenticated => self.dispatch(session, msg),
        }
    }

    fn authenticate(&self, session: &mut Session, msg: ControlMessage) -> MessageOutcome {
        let pin = match msg {
            ControlMessage::Hello { pin } => pin,
            other => {
                warn!(
                    session = %session.id,
                    tag = other.tag(),
                    "first message was not hello"
                );
                return MessageOutcome::close_with(ControlMessage::error(ERR_EXPECTED_HELLO));
            }
        };

        if !self.pin_matches(&pin) {
            warn!(session = %session.id, remote = %session.remote_addr, "invalid pin");
            return MessageOutcome::close_with(ControlMessage::error(ERR_INVALID_PIN));
        }

        session.auth = AuthState::Authenticated;
        self.registry
            .update(session.id, |info| info.auth = AuthState::Authenticated);
        info!(session = %session.id, remote = %session.remote_addr, "session authenticated");

        MessageOutcome::reply(ControlMessage::Ok {
            server: Some(self.settings.server_name.clone()),
            capabilities: DEFAULT_CAPABILITIES.iter().map(|c| c.to_string()).collect(),
        })
    }

    fn dispatch(&self, session: &mut Session, msg: ControlMessage) -> MessageOutcome {
        match msg {
            ControlMessage::Hello { .. } => {
                MessageOutcome::reply(ControlMessage::error(ERR_ALREADY_AUTHENTICATED))
            }
            ControlMessage::Ping => MessageOutcome::reply(ControlMessage::Pong),
            ControlMessage::Pong => MessageOutcome::none(),
            other => match session.translator.apply(&other) {
                Ok(()) => MessageOutcome::none(),
                Err(e) => {
                    warn!(session = %session.id, tag = other.tag(), "input rejected: {e}");
                    MessageOutcome::reply(ControlMessage::error(e.to_string()))
                }
            },
        }
    }

    fn pin_matches(&self, candidate: &str) -> bool {
        if !self.pin_required() {
            return true;
        }
        candidate
            .as_bytes()
            .ct_eq(self.settings.pin.as_bytes())
            .into()
    }

    /// Refreshes the last-activity timestamp of `id`.
    pub fn touch(&self, id: SessionId) {
        self.registry.update(id, |info| info.last_activity = Instant::now());
    }

    /// Removes `id` from the registry.  Idempotent.
    pub fn on_disconnect(&self, id: SessionId) {
        if let Some(info) = self.registry.remove(id) {
            info!(
                session = %id,
                remote = %info.remote_addr,
                duration_ms = info.connected_at.elapsed().as_millis() as u64,
                "session closed"
            );
        }
    }

    /// Returns the current registry contents, oldest first.
    pub fn snapshot(&self) -> Vec<SessionInfo> {
        self.registry.snapshot()
    }

    pub fn session_count(&self) -> usize {
        self.registry.len()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
