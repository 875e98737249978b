//! Read-only health projection of the observer.

use serde::Serialize;

use crate::observer::{ObserverEngine, ObserverStatus};

/// Name reported in every snapshot.
pub const CHECK_NAME: &str = "stellar_payment_observer";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthBucket {
    Green,
    Yellow,
    Red,
}

impl HealthBucket {
    pub fn from_status(status: ObserverStatus) -> Self {
        match status {
            ObserverStatus::Running => Self::Green,
            ObserverStatus::NeedsShutdown | ObserverStatus::Shutdown => Self::Red,
            _ => Self::Yellow,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthSnapshot {
    pub name: &'static str,
    pub status: HealthBucket,
    pub observer_status: ObserverStatus,
    pub stream_open: bool,
    /// `"-1"` until the first event arrives.
    pub last_event_id: String,
    pub seconds_since_last_event: u64,
    pub watched_accounts: usize,
}

/// Pull-style status query consumed by monitoring endpoints.
pub trait HealthCheck: Send + Sync {
    fn name(&self) -> &str;
    fn check(&self) -> HealthSnapshot;
}

/// Health check backed by a running [`ObserverEngine`].
#[derive(Debug, Clone)]
pub struct HealthReporter {
    engine: ObserverEngine,
}

impl HealthReporter {
    pub fn new(engine: ObserverEngine) -> Self {
        Self { engine }
    }
}

impl HealthCheck for HealthReporter {
    fn name(&self) -> &str {
        CHECK_NAME
    }

    fn check(&self) -> HealthSnapshot {
        let observer_status = self.engine.status();
        let stream_open = self.engine.stream_open();

        let mut status = HealthBucket::from_status(observer_status);
        if observer_status == ObserverStatus::Running && !stream_open {
            status = HealthBucket::Red;
        }

        HealthSnapshot {
            name: CHECK_NAME,
            status,
            observer_status,
            stream_open,
            last_event_id: self.engine.last_event_id().unwrap_or_else(|| "-1".to_string()),
            seconds_since_last_event: self
                .engine
                .time_since_last_event()
                .map(|d| d.as_secs())
                .unwrap_or(0),
            watched_accounts: self.engine.registry().len(),
        }
    }
}
