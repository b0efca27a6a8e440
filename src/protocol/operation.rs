//! Long-running device operation tracking.
//!
//! The console has no correlation ids: a bare `OK` means "the thing you are
//! currently doing finished". This tracker holds what that thing is, so the
//! session can route `OK`/`ERROR`/progress lines to the right outcome. While
//! a slot is occupied, idle polling stays suspended so a background query
//! cannot collide with the operation's own response stream.

use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Calibrating,
    Rebooting,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Calibrating => "calibration",
            OperationKind::Rebooting => "reboot",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ActiveOperation {
    pub kind: OperationKind,
    pub message: String,
    pub started_at: Instant,
    /// `None` once a terminal outcome arrived and the slot is just holding
    /// the display message until the delayed clear fires.
    pub deadline: Option<Instant>,
}

/// What a bare `OK` meant, given the operation in flight when it arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OkOutcome {
    CalibrationSuccess,
    RebootAcknowledged,
    /// `OK` with nothing tracked. Observed-safe fallback: show a short-lived
    /// generic success and touch nothing else.
    Generic,
}

#[derive(Debug, Default)]
pub struct OperationTracker {
    active: Option<ActiveOperation>,
}

impl OperationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn kind(&self) -> Option<OperationKind> {
        self.active.as_ref().map(|op| op.kind)
    }

    pub fn message(&self) -> Option<&str> {
        self.active.as_ref().map(|op| op.message.as_str())
    }

    /// Start (or restart) an operation. Restarting while one is in flight
    /// resets the message and deadline rather than erroring; the caller-side
    /// UI already refuses the action while a slot is occupied.
    pub fn begin(&mut self, kind: OperationKind, message: impl Into<String>, timeout: Duration) {
        let now = Instant::now();
        self.active = Some(ActiveOperation {
            kind,
            message: message.into(),
            started_at: now,
            deadline: Some(now + timeout),
        });
    }

    /// A `+SWRDCALI:` progress frame. Updates the countdown message, and
    /// adopts an in-progress calibration the engine did not start itself
    /// (the deadline then runs from now). Does not extend an existing
    /// deadline: progress is not completion.
    pub fn on_progress(&mut self, remaining: Option<&str>, adopt_timeout: Duration) {
        let countdown = remaining.unwrap_or("...");
        let message = format!("Calibrating: {}s left...", countdown);
        match &mut self.active {
            Some(op) => op.message = message,
            None => self.begin(OperationKind::Calibrating, message, adopt_timeout),
        }
    }

    /// Route a bare `OK` by the operation in flight. The slot stays occupied
    /// (with `deadline` disarmed) until the session's delayed clear fires.
    pub fn on_ok(&mut self) -> OkOutcome {
        match self.active.as_mut() {
            Some(op) if op.kind == OperationKind::Calibrating => {
                op.message = "Calibration Successful!".to_string();
                op.deadline = None;
                OkOutcome::CalibrationSuccess
            }
            Some(op) => {
                op.message = "Rebooting... Disconnecting".to_string();
                op.deadline = None;
                OkOutcome::RebootAcknowledged
            }
            None => OkOutcome::Generic,
        }
    }

    /// Route a bare `ERROR`. Returns true when an operation was in flight.
    pub fn on_error(&mut self) -> bool {
        match self.active.as_mut() {
            Some(op) => {
                op.message = "Operation Failed".to_string();
                op.deadline = None;
                true
            }
            None => false,
        }
    }

    /// Check the deadline. When it has elapsed, the slot flips to its
    /// timed-out display message (deadline disarmed so this fires once) and
    /// the expired kind is returned for the session to schedule the clear.
    pub fn poll_timeout(&mut self, now: Instant) -> Option<OperationKind> {
        let op = self.active.as_mut()?;
        let deadline = op.deadline?;
        if now < deadline {
            return None;
        }
        op.deadline = None;
        op.message = match op.kind {
            OperationKind::Calibrating => "Calibration Timed Out".to_string(),
            // The device may have rebooted without acking; nothing to do but
            // report that the command went out.
            OperationKind::Rebooting => "Reboot Command Sent".to_string(),
        };
        Some(op.kind)
    }

    /// Earliest instant `poll_timeout` could fire, for the session's sleep.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.active.as_ref().and_then(|op| op.deadline)
    }

    pub fn clear(&mut self) {
        self.active = None;
    }
}
