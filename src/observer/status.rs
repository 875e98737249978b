//! Observer status and its transition table.
//!
//! # State Transitions
//! ```text
//! RUNNING        → any error, NEEDS_SHUTDOWN, SHUTDOWN
//! *_ERROR        → RUNNING, NEEDS_SHUTDOWN, SHUTDOWN
//! NEEDS_SHUTDOWN → SHUTDOWN
//! SHUTDOWN       → SHUTDOWN
//! ```
//!
//! Requests outside the table are logged and dropped.

use serde::Serialize;
use std::fmt;
use tokio::sync::watch;

use crate::observability::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ObserverStatus {
    Running,
    StreamError,
    SilenceError,
    PublisherError,
    DatabaseError,
    NeedsShutdown,
    Shutdown,
}

use ObserverStatus::*;

/// Allowed next states for each state.
const TRANSITIONS: &[(ObserverStatus, &[ObserverStatus])] = &[
    (
        Running,
        &[StreamError, SilenceError, PublisherError, DatabaseError, NeedsShutdown, Shutdown],
    ),
    (StreamError, &[Running, NeedsShutdown, Shutdown]),
    (SilenceError, &[Running, NeedsShutdown, Shutdown]),
    (PublisherError, &[Running, NeedsShutdown, Shutdown]),
    (DatabaseError, &[Running, NeedsShutdown, Shutdown]),
    (NeedsShutdown, &[Shutdown]),
    (Shutdown, &[Shutdown]),
];

impl ObserverStatus {
    pub fn allowed_next(self) -> &'static [ObserverStatus] {
        TRANSITIONS
            .iter()
            .find(|(from, _)| *from == self)
            .map(|(_, next)| *next)
            .unwrap_or(&[])
    }

    pub fn can_transition_to(self, next: ObserverStatus) -> bool {
        self.allowed_next().contains(&next)
    }

    pub fn is_error(self) -> bool {
        matches!(self, StreamError | SilenceError | PublisherError | DatabaseError)
    }

    pub fn is_terminating(self) -> bool {
        matches!(self, NeedsShutdown | Shutdown)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Running => "RUNNING",
            StreamError => "STREAM_ERROR",
            SilenceError => "SILENCE_ERROR",
            PublisherError => "PUBLISHER_ERROR",
            DatabaseError => "DATABASE_ERROR",
            NeedsShutdown => "NEEDS_SHUTDOWN",
            Shutdown => "SHUTDOWN",
        }
    }
}

impl fmt::Display for ObserverStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a transition request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Applied,
    /// Already in the requested state.
    Unchanged,
    Rejected,
}

/// Shared, validated status cell.
///
/// Check-and-set happens under the watch channel's lock, so concurrent
/// requests from the delivery task and the watchers cannot interleave.
#[derive(Debug)]
pub struct StatusCell {
    tx: watch::Sender<ObserverStatus>,
}

impl StatusCell {
    pub fn new(initial: ObserverStatus) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx }
    }

    pub fn get(&self) -> ObserverStatus {
        *self.tx.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.get() == Running
    }

    pub fn subscribe(&self) -> watch::Receiver<ObserverStatus> {
        self.tx.subscribe()
    }

    /// Request a move to `next`.
    pub fn transition(&self, next: ObserverStatus) -> Transition {
        let mut outcome = Transition::Unchanged;
        let mut from = next;
        self.tx.send_if_modified(|current| {
            from = *current;
            if *current == next {
                return false;
            }
            if current.can_transition_to(next) {
                *current = next;
                outcome = Transition::Applied;
                true
            } else {
                outcome = Transition::Rejected;
                false
            }
        });

        match outcome {
            Transition::Applied => {
                tracing::info!(from = %from, to = %next, "Setting observer status");
                metrics::record_status_transition(next.as_str());
            }
            Transition::Rejected => {
                tracing::warn!(current = %from, requested = %next, "Rejected observer status change");
            }
            Transition::Unchanged => {}
        }
        outcome
    }
}
