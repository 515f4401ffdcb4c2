//! Client connection state machine.
//!
//! Pure state: no sockets, no timers.  The network driver reports what
//! happened and the machine decides what comes next.
//!
//! ```text
//!            connect / retry
//! Idle ─────────────────────────► Connecting ──opened──► Authenticating ──ok──► Active
//!  ▲                                   ▲  │                    │                  │
//!  │ reset                             │  └──── failure ───────┴──────────────────┘
//!  │                                   │                │
//!  │                    timer fired    │                ▼
//!  └──────────── (any) ◄────── Reconnecting(n) ◄── Disconnected ──► GivenUp
//!                                        retries < 5           retries == 5
//! ```
//!
//! # Epochs
//!
//! Every attempt runs under an epoch number.  [`ConnectionMachine::begin`],
//! [`ConnectionMachine::reset`] and a fired retry timer each start a new
//! epoch.  Reports carrying an older epoch are ignored, so a socket or timer
//! that was cancelled but had already completed cannot move the machine.

use std::fmt;
use std::time::Duration;

/// Automatic reconnects allowed before giving up.
pub const MAX_RETRIES: u32 = 5;

/// Upper bound for the linear backoff, in backoff units.
pub const MAX_BACKOFF_STEPS: u32 = 5;

/// Identifies one attempt.  See the module docs.
pub type Epoch = u64;

/// Observable connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Authenticating,
    Active,
    Disconnected,
    /// Waiting to reconnect; carries the retry number.
    Reconnecting(u32),
    GivenUp,
}

impl ConnectionState {
    /// `true` while a socket is open or being opened.
    pub fn is_in_flight(self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Authenticating | ConnectionState::Active
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Idle => f.write_str("idle"),
            ConnectionState::Connecting => f.write_str("connecting"),
            ConnectionState::Authenticating => f.write_str("authenticating"),
            ConnectionState::Active => f.write_str("connected"),
            ConnectionState::Disconnected => f.write_str("disconnected"),
            ConnectionState::Reconnecting(n) => write!(f, "reconnecting ({n}/{MAX_RETRIES})"),
            ConnectionState::GivenUp => f.write_str("gave up"),
        }
    }
}

/// Retry bookkeeping for the current host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionAttempt {
    pub retry_count: u32,
    pub last_error: Option<String>,
    /// Delay of the pending reconnect, if one is scheduled.
    pub next_delay: Option<Duration>,
}

/// What the driver should do after reporting a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfterFailure {
    /// The report was stale or the machine was not connecting; do nothing.
    Ignored,
    /// Sleep for the delay, then call [`ConnectionMachine::retry_due`].
    RetryAfter(Duration),
    /// Retries are exhausted; wait for the user.
    GaveUp,
}

/// The state machine.  Owned by one driver; not shared.
#[derive(Debug)]
pub struct ConnectionMachine {
    state: ConnectionState,
    attempt: ConnectionAttempt,
    epoch: Epoch,
    backoff_unit: Duration,
    entered: Vec<ConnectionState>,
}

impl Default for ConnectionMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionMachine {
    /// A machine in `Idle` with one-second backoff steps.
    pub fn new() -> Self {
        Self::with_backoff_unit(Duration::from_secs(1))
    }

    /// A machine whose backoff delay is `min(retry + 1, 5) * unit`.
    pub fn with_backoff_unit(unit: Duration) -> Self {
        Self {
            state: ConnectionState::Idle,
            attempt: ConnectionAttempt::default(),
            epoch: 0,
            backoff_unit: unit,
            entered: Vec::new(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn attempt(&self) -> &ConnectionAttempt {
        &self.attempt
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    /// Drains the states entered since the last call, oldest first.
    pub fn take_transitions(&mut self) -> Vec<ConnectionState> {
        std::mem::take(&mut self.entered)
    }

    /// User-initiated connect or retry.
    ///
    /// Invalidates any previous attempt, zeroes the retry counter and enters
    /// `Connecting`.  Returns the epoch the new attempt must report with.
    pub fn begin(&mut self) -> Epoch {
        self.epoch += 1;
        self.attempt = ConnectionAttempt::default();
        self.enter(ConnectionState::Connecting);
        self.epoch
    }

    /// User navigated away or disconnected: back to `Idle`.
    pub fn reset(&mut self) {
        self.epoch += 1;
        self.attempt = ConnectionAttempt::default();
        if self.state != ConnectionState::Idle {
            self.enter(ConnectionState::Idle);
        }
    }

    /// The socket is open and `Hello` is about to be sent.
    pub fn opened(&mut self, epoch: Epoch) -> bool {
        if !self.is_current(epoch) || self.state != ConnectionState::Connecting {
            return false;
        }
        self.enter(ConnectionState::Authenticating);
        true
    }

    /// The host answered `Ok`.
    pub fn authenticated(&mut self, epoch: Epoch) -> bool {
        if !self.is_current(epoch) || self.state != ConnectionState::Authenticating {
            return false;
        }
        self.attempt = ConnectionAttempt::default();
        self.enter(ConnectionState::Active);
        true
    }

    /// The attempt or the active channel ended with `cause`.
    pub fn failed(&mut self, epoch: Epoch, cause: impl Into<String>) -> AfterFailure {
        if !self.is_current(epoch) || !self.state.is_in_flight() {
            return AfterFailure::Ignored;
        }

        self.attempt.last_error = Some(cause.into());
        self.enter(ConnectionState::Disconnected);

        if self.attempt.retry_count >= MAX_RETRIES {
            self.attempt.next_delay = None;
            self.enter(ConnectionState::GivenUp);
            return AfterFailure::GaveUp;
        }

        let steps = (self.attempt.retry_count + 1).min(MAX_BACKOFF_STEPS);
        let delay = self.backoff_unit * steps;
        self.attempt.retry_count += 1;
        self.attempt.next_delay = Some(delay);
        self.enter(ConnectionState::Reconnecting(self.attempt.retry_count));
        AfterFailure::RetryAfter(delay)
    }

    /// The reconnect timer started under `epoch` fired.
    ///
    /// Returns the epoch of the new attempt, or `None` when the timer was
    /// cancelled in the meantime.
    pub fn retry_due(&mut self, epoch: Epoch) -> Option<Epoch> {
        if !self.is_current(epoch) || !matches!(self.state, ConnectionState::Reconnecting(_)) {
            return None;
        }
        self.epoch += 1;
        self.attempt.next_delay = None;
        self.enter(ConnectionState::Connecting);
        Some(self.epoch)
    }

    fn is_current(&self, epoch: Epoch) -> bool {
        epoch == self.epoch
    }

    fn enter(&mut self, state: ConnectionState) {
        self.state = state;
        self.entered.push(state);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
