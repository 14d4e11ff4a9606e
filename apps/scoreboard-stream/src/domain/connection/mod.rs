//! Logical Connection State Machine
//!
//! Pure state machine behind the reconnecting client. It owns the connection
//! state, the attempt counter and the attempt generation, and decides what
//! happens after every transport outcome. It never touches a socket or a
//! timer, so tests drive it with synthetic events.
//!
//! # Transitions
//!
//! ```text
//! disconnected ──connect──► connecting ──open──► connected
//!                               │                   │
//!                               └──failure──► error ◄┘
//!                                              │
//!            attempts < max: retry after delay ┤ (back to connecting)
//!            attempts ≥ max: disconnected, exhausted (manual retry only)
//! ```
//!
//! Every attempt gets a new generation. Transport events and retry timers
//! carry the generation they belong to and are ignored once it is stale.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

// =============================================================================
// Connection State
// =============================================================================

/// Observable state of a logical connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No connection and no attempt in flight.
    #[default]
    Disconnected,
    /// An attempt is in flight.
    Connecting,
    /// Transport is open.
    Connected,
    /// The last attempt or the live connection failed.
    Error,
}

impl ConnectionState {
    /// Lowercase name of the state.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one connection attempt.
pub type Generation = u64;

// =============================================================================
// Retry Policy
// =============================================================================

/// Bounded retry with a fixed delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Automatic retries allowed before the connection is given up.
    pub max_attempts: u32,
    /// Fixed delay before each automatic retry.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            delay: Duration::from_millis(2000),
        }
    }
}

// =============================================================================
// Status Snapshot
// =============================================================================

/// Point-in-time status of a logical connection.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ConnectionStatus {
    /// Current state.
    pub state: ConnectionState,
    /// Automatic retries used since the last successful open.
    pub attempts: u32,
    /// Retry cap.
    pub max_attempts: u32,
    /// Retries are used up; only a manual retry reconnects.
    pub exhausted: bool,
    /// Most recent failure, cleared on open.
    pub last_error: Option<String>,
}

// =============================================================================
// Machine
// =============================================================================

/// Returned when an attempt starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptStart {
    /// Generation of the new attempt.
    pub generation: Generation,
    /// A connection was still open or opening and must be closed first.
    pub close_previous: bool,
}

/// What to do after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Schedule exactly one retry.
    Retry {
        /// Generation the retry timer belongs to.
        generation: Generation,
        /// Retry number, starting at 1.
        attempt: u32,
        /// Delay before the retry.
        delay: Duration,
    },
    /// Retries are used up; the connection is now terminal.
    Exhausted,
    /// The failure belongs to an attempt that is no longer current.
    Stale,
}

/// State machine for one logical connection.
#[derive(Debug, Clone)]
pub struct ConnectionMachine {
    policy: RetryPolicy,
    state: ConnectionState,
    attempts: u32,
    generation: Generation,
    exhausted: bool,
    closed: bool,
    last_error: Option<String>,
}

impl ConnectionMachine {
    /// Create a disconnected machine.
    #[must_use]
    pub const fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            state: ConnectionState::Disconnected,
            attempts: 0,
            generation: 0,
            exhausted: false,
            closed: false,
            last_error: None,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// Current attempt generation.
    #[must_use]
    pub const fn generation(&self) -> Generation {
        self.generation
    }

    /// Automatic retries used.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Whether retries are used up.
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Retry policy in force.
    #[must_use]
    pub const fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Start a new attempt.
    pub fn begin_attempt(&mut self) -> AttemptStart {
        let close_previous = matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Connected
        );
        self.generation += 1;
        self.state = ConnectionState::Connecting;
        self.exhausted = false;
        self.closed = false;
        AttemptStart {
            generation: self.generation,
            close_previous,
        }
    }

    /// Reset the attempt counter and start a new attempt.
    pub fn manual_retry(&mut self) -> AttemptStart {
        self.attempts = 0;
        self.begin_attempt()
    }

    /// The transport for `generation` opened.
    ///
    /// Returns `false` when the event is stale.
    pub fn on_open(&mut self, generation: Generation) -> bool {
        if generation != self.generation || self.state != ConnectionState::Connecting {
            return false;
        }
        self.state = ConnectionState::Connected;
        self.attempts = 0;
        self.last_error = None;
        true
    }

    /// The transport for `generation` failed.
    pub fn on_failure(&mut self, generation: Generation, reason: impl Into<String>) -> FailureOutcome {
        if generation != self.generation
            || !matches!(
                self.state,
                ConnectionState::Connecting | ConnectionState::Connected
            )
        {
            return FailureOutcome::Stale;
        }

        self.state = ConnectionState::Error;
        self.last_error = Some(reason.into());

        if self.attempts < self.policy.max_attempts {
            self.attempts += 1;
            FailureOutcome::Retry {
                generation,
                attempt: self.attempts,
                delay: self.policy.delay,
            }
        } else {
            self.state = ConnectionState::Disconnected;
            self.exhausted = true;
            FailureOutcome::Exhausted
        }
    }

    /// The peer closed the connection for `generation` normally.
    ///
    /// Returns `false` when the event is stale.
    pub fn on_closed(&mut self, generation: Generation) -> bool {
        if generation != self.generation
            || !matches!(
                self.state,
                ConnectionState::Connecting | ConnectionState::Connected
            )
        {
            return false;
        }
        self.state = ConnectionState::Disconnected;
        true
    }

    /// Whether a retry timer scheduled for `generation` may still act.
    #[must_use]
    pub fn retry_due(&self, generation: Generation) -> bool {
        generation == self.generation
            && self.state == ConnectionState::Error
            && !self.exhausted
            && !self.closed
    }

    /// Close the logical connection and invalidate anything in flight.
    ///
    /// Returns `true` if this call changed anything.
    pub fn close(&mut self) -> bool {
        if self.closed {
            return false;
        }
        self.closed = true;
        self.generation += 1;
        self.state = ConnectionState::Disconnected;
        true
    }

    /// Point-in-time status.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        ConnectionStatus {
            state: self.state,
            attempts: self.attempts,
            max_attempts: self.policy.max_attempts,
            exhausted: self.exhausted,
            last_error: self.last_error.clone(),
        }
    }
}

impl Default for ConnectionMachine {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_is_one_retry_after_two_seconds() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.delay, Duration::from_millis(2000));
    }

    #[test]
    fn connect_then_open() {
        let mut machine = ConnectionMachine::default();
        let start = machine.begin_attempt();
        assert!(!start.close_previous);
        assert_eq!(machine.state(), ConnectionState::Connecting);

        assert!(machine.on_open(start.generation));
        assert_eq!(machine.state(), ConnectionState::Connected);
    }

    #[test]
    fn retry_cap_reaches_terminal_state() {
        let mut machine = ConnectionMachine::new(RetryPolicy {
            max_attempts: 1,
            delay: Duration::from_millis(2000),
        });

        let first = machine.begin_attempt();
        let outcome = machine.on_failure(first.generation, "refused");
        assert_eq!(
            outcome,
            FailureOutcome::Retry {
                generation: first.generation,
                attempt: 1,
                delay: Duration::from_millis(2000),
            }
        );
        assert_eq!(machine.state(), ConnectionState::Error);
        assert!(machine.retry_due(first.generation));

        let second = machine.begin_attempt();
        assert_eq!(machine.on_failure(second.generation, "refused"), FailureOutcome::Exhausted);
        assert_eq!(machine.state(), ConnectionState::Disconnected);
        assert!(machine.is_exhausted());
        assert!(!machine.retry_due(second.generation));
    }

    #[test]
    fn open_resets_attempts() {
        let mut machine = ConnectionMachine::new(RetryPolicy {
            max_attempts: 3,
            delay: Duration::from_millis(10),
        });
        let first = machine.begin_attempt();
        machine.on_failure(first.generation, "x");
        let second = machine.begin_attempt();
        machine.on_failure(second.generation, "x");
        assert_eq!(machine.attempts(), 2);

        let third = machine.begin_attempt();
        assert!(machine.on_open(third.generation));
        assert_eq!(machine.attempts(), 0);
        assert_eq!(machine.status().last_error, None);
    }

    #[test]
    fn connected_failure_schedules_retry() {
        let mut machine = ConnectionMachine::default();
        let start = machine.begin_attempt();
        machine.on_open(start.generation);

        let outcome = machine.on_failure(start.generation, "reset by peer");
        assert!(matches!(outcome, FailureOutcome::Retry { attempt: 1, .. }));
    }

    #[test]
    fn reconnect_while_connected_closes_previous() {
        let mut machine = ConnectionMachine::default();
        let first = machine.begin_attempt();
        machine.on_open(first.generation);

        let second = machine.begin_attempt();
        assert!(second.close_previous);
        assert_ne!(first.generation, second.generation);
    }

    #[test]
    fn stale_events_are_ignored() {
        let mut machine = ConnectionMachine::default();
        let first = machine.begin_attempt();
        let second = machine.begin_attempt();

        assert!(!machine.on_open(first.generation));
        assert_eq!(machine.on_failure(first.generation, "late"), FailureOutcome::Stale);
        assert!(!machine.on_closed(first.generation));
        assert_eq!(machine.state(), ConnectionState::Connecting);
        assert!(machine.on_open(second.generation));
    }

    #[test]
    fn close_invalidates_pending_retry() {
        let mut machine = ConnectionMachine::default();
        let start = machine.begin_attempt();
        machine.on_failure(start.generation, "refused");
        assert!(machine.retry_due(start.generation));

        assert!(machine.close());
        assert!(!machine.retry_due(start.generation));
        assert_eq!(machine.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn close_is_idempotent() {
        let mut machine = ConnectionMachine::default();
        machine.begin_attempt();
        assert!(machine.close());
        assert!(!machine.close());
        assert_eq!(machine.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn manual_retry_after_exhaustion() {
        let mut machine = ConnectionMachine::new(RetryPolicy {
            max_attempts: 0,
            delay: Duration::from_millis(10),
        });
        let start = machine.begin_attempt();
        assert_eq!(machine.on_failure(start.generation, "down"), FailureOutcome::Exhausted);

        let retry = machine.manual_retry();
        assert_eq!(machine.state(), ConnectionState::Connecting);
        assert!(!machine.is_exhausted());
        assert_eq!(machine.attempts(), 0);
        assert!(machine.on_open(retry.generation));
    }

    #[test]
    fn normal_close_disconnects_without_retry() {
        let mut machine = ConnectionMachine::default();
        let start = machine.begin_attempt();
        machine.on_open(start.generation);

        assert!(machine.on_closed(start.generation));
        assert_eq!(machine.state(), ConnectionState::Disconnected);
        assert!(!machine.retry_due(start.generation));
    }

    #[test]
    fn state_names() {
        assert_eq!(ConnectionState::Disconnected.as_str(), "disconnected");
        assert_eq!(ConnectionState::Connecting.as_str(), "connecting");
        assert_eq!(ConnectionState::Connected.as_str(), "connected");
        assert_eq!(ConnectionState::Error.to_string(), "error");
        assert_eq!(
            serde_json::to_string(&ConnectionState::Connected).unwrap(),
            "\"connected\""
        );
    }
}
