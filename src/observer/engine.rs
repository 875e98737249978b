//! Payment observer engine.
//!
//! # Tasks
//! ```text
//! delivery task   one per subscription; runs the per-event algorithm in feed order
//! status watcher  short fixed tick; executes recovery for the current status
//! silence watcher detects an open but idle subscription
//! eviction loop   long fixed tick; evicts idle accounts and flushes the registry
//! ```
//!
//! Shared state is limited to the status cell, the three backoff timers,
//! the activity clock and the registry map. Each is locked on its own and
//! never across an await point.

use arc_swap::ArcSwapOption;
use futures_util::StreamExt;
use std::ops::ControlFlow;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

use crate::accounts::AccountRegistry;
use crate::config::{AccountsConfig, ObserverConfig};
use crate::ledger::{Cursor, LedgerClient, LedgerError, OperationStream, RawOperation};
use crate::lifecycle::Shutdown as ShutdownSignal;
use crate::observability::metrics;
use crate::observer::backoff::BackoffTimer;
use crate::observer::status::{ObserverStatus, StatusCell, Transition};
use crate::payments::{normalize_or_skip, ObservedPayment, PaymentListener, PublishError};
use crate::storage::{CursorStore, StorageError, StorageResult};

use ObserverStatus::*;

/// Timing and budget settings for the engine.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub status_check_interval: Duration,
    pub silence_check_interval: Duration,
    pub silence_timeout: Duration,
    /// Silence reconnects allowed before shutting down; 0 means unlimited.
    pub silence_timeout_retries: u32,
    pub initial_stream_backoff: Duration,
    pub max_stream_backoff: Duration,
    pub initial_event_backoff: Duration,
    pub max_event_backoff: Duration,
    pub initial_database_backoff: Duration,
    pub max_database_backoff: Duration,
    /// Furthest behind the tip a resumed subscription may start.
    pub max_page_size: u64,
    pub eviction_interval: Duration,
    pub max_idle: Duration,
}

impl EngineSettings {
    pub fn from_config(observer: &ObserverConfig, accounts: &AccountsConfig) -> Self {
        Self {
            status_check_interval: Duration::from_millis(observer.status_check_interval_ms),
            silence_check_interval: Duration::from_secs(observer.silence_check_interval_secs),
            silence_timeout: Duration::from_secs(observer.silence_timeout_secs),
            silence_timeout_retries: observer.silence_timeout_retries,
            initial_stream_backoff: Duration::from_secs(observer.initial_stream_backoff_secs),
            max_stream_backoff: Duration::from_secs(observer.max_stream_backoff_secs),
            initial_event_backoff: Duration::from_secs(observer.initial_event_backoff_secs),
            max_event_backoff: Duration::from_secs(observer.max_event_backoff_secs),
            initial_database_backoff: Duration::from_secs(observer.initial_database_backoff_secs),
            max_database_backoff: Duration::from_secs(observer.max_database_backoff_secs),
            max_page_size: observer.max_page_size,
            eviction_interval: Duration::from_secs(accounts.eviction_interval_secs),
            max_idle: Duration::from_secs(accounts.max_idle_secs),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&ObserverConfig::default(), &AccountsConfig::default())
    }
}

/// Failure while processing one feed event.
#[derive(Debug, Error)]
enum DispatchFailure {
    #[error(transparent)]
    Publisher(#[from] PublishError),

    #[error("cannot save the cursor: {0}")]
    Storage(#[from] StorageError),
}

impl DispatchFailure {
    fn status(&self) -> ObserverStatus {
        match self {
            Self::Publisher(_) => PublisherError,
            Self::Storage(_) => DatabaseError,
        }
    }

    fn outcome(&self) -> &'static str {
        match self {
            Self::Publisher(_) => "publisher_error",
            Self::Storage(_) => "database_error",
        }
    }
}

/// Failure while opening a subscription.
#[derive(Debug, Error)]
pub enum OpenError {
    #[error("cannot load observer state: {0}")]
    Storage(#[from] StorageError),

    #[error("cannot open the payment stream: {0}")]
    Ledger(#[from] LedgerError),
}

impl OpenError {
    fn status(&self) -> ObserverStatus {
        match self {
            Self::Storage(_) => DatabaseError,
            Self::Ledger(_) => StreamError,
        }
    }
}

/// Pick the cursor a fresh subscription starts from.
///
/// - no stored cursor: start at the tip
/// - stored cursor not older than the tip (network reset): start at the tip
/// - otherwise resume, but no more than `max_page_size` behind the tip
pub fn resolve_start_cursor(stored: Option<&Cursor>, tip: Option<&Cursor>, max_page_size: u64) -> Cursor {
    let Some(tip) = tip else {
        return match stored {
            Some(stored) => stored.clone(),
            None => Cursor::now(),
        };
    };
    let Some(stored) = stored else {
        info!(tip = %tip, "No stored cursor, starting from the latest cursor");
        return tip.clone();
    };

    match (stored.position(), tip.position()) {
        (Some(s), Some(t)) if s >= t => {
            info!(
                stored = %stored,
                tip = %tip,
                "Stored cursor is not older than the tip, probably a network reset. Starting from the tip"
            );
            tip.clone()
        }
        (Some(s), Some(t)) => Cursor::from(s.max(t.saturating_sub(max_page_size))),
        _ => {
            warn!(stored = %stored, tip = %tip, "Cursor is not numeric, starting from the latest cursor");
            tip.clone()
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Observes the ledger payment feed and routes matched payments to listeners.
#[derive(Clone)]
pub struct ObserverEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    client: Arc<dyn LedgerClient>,
    cursor_store: Arc<dyn CursorStore>,
    registry: AccountRegistry,
    listeners: Vec<Arc<dyn PaymentListener>>,
    settings: EngineSettings,

    status: StatusCell,
    stream_backoff: Mutex<BackoffTimer>,
    publish_backoff: Mutex<BackoffTimer>,
    database_backoff: Mutex<BackoffTimer>,
    silence_retries: AtomicU32,
    last_activity: Mutex<Option<Instant>>,
    last_event_id: ArcSwapOption<String>,

    subscription: Mutex<Option<JoinHandle<()>>>,
    /// Bumped whenever a subscription is opened or stopped; a delivery task
    /// only processes events while its own generation is current.
    generation: AtomicU64,
    shutdown: ShutdownSignal,
}

impl ObserverEngine {
    pub fn new(
        client: Arc<dyn LedgerClient>,
        cursor_store: Arc<dyn CursorStore>,
        registry: AccountRegistry,
        listeners: Vec<Arc<dyn PaymentListener>>,
        settings: EngineSettings,
    ) -> Self {
        let inner = EngineInner {
            stream_backoff: Mutex::new(BackoffTimer::new(
                settings.initial_stream_backoff,
                settings.max_stream_backoff,
            )),
            publish_backoff: Mutex::new(BackoffTimer::new(
                settings.initial_event_backoff,
                settings.max_event_backoff,
            )),
            database_backoff: Mutex::new(BackoffTimer::new(
                settings.initial_database_backoff,
                settings.max_database_backoff,
            )),
            client,
            cursor_store,
            registry,
            listeners,
            settings,
            status: StatusCell::new(Running),
            silence_retries: AtomicU32::new(0),
            last_activity: Mutex::new(None),
            last_event_id: ArcSwapOption::empty(),
            subscription: Mutex::new(None),
            generation: AtomicU64::new(0),
            shutdown: ShutdownSignal::new(),
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Open the first subscription and start the background tasks.
    ///
    /// A failure to open the stream is not returned; it moves the observer
    /// into the matching error status and the status watcher takes over.
    pub async fn start(&self) {
        let inner = &self.inner;

        info!("Starting the payment stream");
        if let Err(e) = inner.open_stream().await {
            error!(error = %e, "Could not open the payment stream");
            inner.status.transition(e.status());
        }

        info!("Starting the silence watcher");
        tokio::spawn(inner.clone().silence_loop(inner.shutdown.subscribe()));

        info!("Starting the status watcher");
        tokio::spawn(inner.clone().status_loop(inner.shutdown.subscribe()));

        info!("Starting the account eviction loop");
        tokio::spawn(inner.clone().eviction_loop(inner.shutdown.subscribe()));
    }

    /// Close the subscription, stop the background tasks and flush the
    /// account registry.
    pub fn shutdown(&self) {
        self.inner.shutdown();
    }

    /// Resolve once the observer has reached `SHUTDOWN`.
    pub async fn run_until_shutdown(&self) {
        let mut rx = self.inner.status.subscribe();
        let _ = rx.wait_for(|status| *status == Shutdown).await;
    }

    pub fn status(&self) -> ObserverStatus {
        self.inner.status.get()
    }

    pub fn registry(&self) -> &AccountRegistry {
        &self.inner.registry
    }

    /// Whether a delivery task is attached to a live subscription.
    pub fn stream_open(&self) -> bool {
        lock(&self.inner.subscription)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Id of the most recent event received from the feed.
    pub fn last_event_id(&self) -> Option<String> {
        self.inner.last_event_id.load_full().map(|id| id.as_ref().clone())
    }

    pub fn time_since_last_event(&self) -> Option<Duration> {
        let last = *lock(&self.inner.last_activity);
        last.map(|at| at.elapsed())
    }

    pub fn silence_retries(&self) -> u32 {
        self.inner.silence_retries.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for ObserverEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverEngine")
            .field("status", &self.status())
            .field("listeners", &self.inner.listeners.len())
            .field("registry", &self.inner.registry)
            .finish()
    }
}

impl EngineInner {
    // --- Subscription ---

    async fn open_stream(self: &Arc<Self>) -> Result<(), OpenError> {
        self.ensure_registry_loaded()?;
        let cursor = self.bootstrap_cursor().await?;
        info!(cursor = %cursor, "Opening the payment stream");
        let stream = self.client.subscribe(&cursor).await?;

        // RUNNING must be visible before the first event reaches the
        // delivery task.
        if self.status.transition(Running) == Transition::Rejected {
            return Ok(());
        }
        *lock(&self.last_activity) = Some(Instant::now());

        let mut slot = lock(&self.subscription);
        if self.shutdown.is_triggered() {
            return Ok(());
        }
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let handle = tokio::spawn(self.clone().deliver(stream, generation));
        if let Some(previous) = slot.replace(handle) {
            previous.abort();
        }
        Ok(())
    }

    /// Retire the current delivery task and return its handle.
    ///
    /// The task stops before its next event. An event already being
    /// processed runs to completion, including its cursor save.
    fn detach_stream(&self) -> Option<JoinHandle<()>> {
        let mut slot = lock(&self.subscription);
        self.generation.fetch_add(1, Ordering::SeqCst);
        let handle = slot.take()?;
        info!("Stopping the payment stream");
        handle.abort();
        Some(handle)
    }

    /// Retire the delivery task and wait until it has exited.
    async fn stop_stream(&self) {
        let Some(handle) = self.detach_stream() else {
            return;
        };
        if let Err(e) = handle.await {
            if e.is_panic() {
                error!(error = %e, "Payment stream task panicked");
            }
        }
    }

    async fn restart_stream(self: &Arc<Self>, reason: ObserverStatus) -> Result<(), OpenError> {
        info!(reason = %reason, "Restarting the payment stream");
        metrics::record_restart(reason.as_str());
        self.stop_stream().await;
        self.open_stream().await
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    async fn bootstrap_cursor(&self) -> Result<Cursor, OpenError> {
        let stored = self.load_cursor()?;
        let tip = self.client.latest_cursor().await?;
        Ok(resolve_start_cursor(
            stored.as_ref(),
            tip.as_ref(),
            self.settings.max_page_size,
        ))
    }

    fn ensure_registry_loaded(&self) -> StorageResult<()> {
        if !self.registry.is_loaded() {
            self.registry.load()?;
        }
        Ok(())
    }

    // --- Delivery ---

    async fn deliver(self: Arc<Self>, mut stream: OperationStream, generation: u64) {
        loop {
            let next = stream.next().await;
            if !self.is_current(generation) {
                debug!(generation, "Payment stream replaced, dropping buffered events");
                return;
            }
            let op = match next {
                Some(Ok(op)) => op,
                Some(Err(e)) => {
                    error!(error = %e, "Payment stream error");
                    self.status.transition(StreamError);
                    return;
                }
                None => {
                    error!("Payment stream ended unexpectedly");
                    self.status.transition(StreamError);
                    return;
                }
            };

            if !self.status.is_running() {
                warn!(id = %op.id, status = %self.status.get(), "Observer is not healthy, ignoring event");
                return;
            }

            debug!(id = %op.id, "Received event");
            self.record_activity(&op);

            if let Err(failure) = self.handle_operation(&op) {
                error!(id = %op.id, error = %failure, "Failed to process event");
                metrics::record_event(failure.outcome());
                self.status.transition(failure.status());
                return;
            }
        }
    }

    fn record_activity(&self, op: &RawOperation) {
        *lock(&self.last_activity) = Some(Instant::now());
        self.last_event_id.store(Some(Arc::new(op.id.clone())));
        self.silence_retries.store(0, Ordering::SeqCst);
        lock(&self.stream_backoff).reset();
    }

    /// Process one event. The cursor moves past it only when it was
    /// filtered or every listener accepted it.
    fn handle_operation(&self, op: &RawOperation) -> Result<(), DispatchFailure> {
        let cursor = op.cursor();

        if !op.transaction_successful {
            self.save_cursor(&cursor)?;
            metrics::record_event("filtered");
            return Ok(());
        }

        let Some(payment) = normalize_or_skip(op) else {
            self.save_cursor(&cursor)?;
            metrics::record_event("filtered");
            return Ok(());
        };

        debug!(id = %payment.id, "Dispatching event");
        self.dispatch(&payment)?;
        lock(&self.publish_backoff).reset();

        self.save_cursor(&cursor)?;
        metrics::record_event("dispatched");
        Ok(())
    }

    fn dispatch(&self, payment: &ObservedPayment) -> Result<(), PublishError> {
        let received = self.registry.match_and_touch(&payment.to);
        let sent = payment.from != payment.to && self.registry.match_and_touch(&payment.from);

        if received {
            for listener in &self.listeners {
                invoke(payment, || listener.on_received(payment))?;
            }
        }
        if sent {
            for listener in &self.listeners {
                invoke(payment, || listener.on_sent(payment))?;
            }
        }
        if !received && !sent {
            trace!(id = %payment.id, "Payment does not touch a watched account");
        }
        Ok(())
    }

    // --- Storage ---

    fn load_cursor(&self) -> StorageResult<Option<Cursor>> {
        info!("Loading the last stored cursor");
        let cursor = self.cursor_store.load()?;
        info!(cursor = ?cursor.as_ref().map(Cursor::as_str), "Last stored cursor loaded");
        Ok(cursor)
    }

    fn save_cursor(&self, cursor: &Cursor) -> StorageResult<()> {
        trace!(cursor = %cursor, "Saving cursor");
        self.cursor_store.save(cursor)?;
        lock(&self.database_backoff).reset();
        Ok(())
    }

    // --- Watchers ---

    async fn status_loop(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = time::interval(self.settings.status_check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if self.shutdown.is_triggered() || self.status.get() == Shutdown {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.recv() => break,
            }
            if self.check_status(&mut shutdown).await.is_break() {
                break;
            }
        }
        info!("Status watcher stopped");
    }

    async fn check_status(self: &Arc<Self>, shutdown: &mut broadcast::Receiver<()>) -> ControlFlow<()> {
        match self.status.get() {
            NeedsShutdown => {
                info!("Shutting down the observer");
                self.shutdown();
                return ControlFlow::Break(());
            }
            StreamError => {
                let Some(delay) = next_delay(&self.stream_backoff) else {
                    info!("The stream backoff timer is maxed, shutting down the observer");
                    self.status.transition(NeedsShutdown);
                    return ControlFlow::Continue(());
                };
                info!(delay_ms = delay.as_millis() as u64, "The stream needs a restart, backing off");
                if !sleep_or_shutdown(delay, shutdown).await {
                    return ControlFlow::Break(());
                }
                self.recover(StreamError).await;
            }
            SilenceError => {
                let retries = self.silence_retries.load(Ordering::SeqCst);
                let max_retries = self.settings.silence_timeout_retries;
                info!(retries, max_retries, "Silence reconnection count");
                if max_retries > 0 && retries >= max_retries {
                    info!(retries, "Too many silence reconnects, shutting down the observer");
                    self.status.transition(NeedsShutdown);
                } else {
                    self.silence_retries.fetch_add(1, Ordering::SeqCst);
                    self.recover(SilenceError).await;
                    *lock(&self.last_activity) = Some(Instant::now());
                }
            }
            PublisherError => {
                let delay = lock(&self.publish_backoff).next_delay();
                info!(delay_ms = delay.as_millis() as u64, "Publishing failed, backing off");
                if !sleep_or_shutdown(delay, shutdown).await {
                    return ControlFlow::Break(());
                }
                self.recover(PublisherError).await;
            }
            DatabaseError => {
                let Some(delay) = next_delay(&self.database_backoff) else {
                    info!("The database backoff timer is maxed, shutting down the observer");
                    self.status.transition(NeedsShutdown);
                    return ControlFlow::Continue(());
                };
                info!(delay_ms = delay.as_millis() as u64, "Storage failed, backing off");
                if !sleep_or_shutdown(delay, shutdown).await {
                    return ControlFlow::Break(());
                }
                self.recover(DatabaseError).await;
            }
            Running | Shutdown => {}
        }
        ControlFlow::Continue(())
    }

    /// Reopen the stream from the stored cursor. On failure the status is
    /// left as is, so the next tick retries with a longer delay.
    async fn recover(self: &Arc<Self>, reason: ObserverStatus) {
        if let Err(e) = self.restart_stream(reason).await {
            error!(reason = %reason, error = %e, "Could not restart the payment stream");
        }
    }

    async fn silence_loop(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = time::interval(self.settings.silence_check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if self.shutdown.is_triggered() {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => self.check_silence(),
                _ = shutdown.recv() => break,
            }
        }
        info!("Silence watcher stopped");
    }

    fn check_silence(&self) {
        if !self.status.is_running() {
            return;
        }
        let Some(last) = *lock(&self.last_activity) else {
            return;
        };
        let silence = last.elapsed();
        if silence > self.settings.silence_timeout {
            debug!(
                silence_secs = silence.as_secs(),
                "The observer has been silent for too long"
            );
            self.status.transition(SilenceError);
        } else {
            trace!(silence_ms = silence.as_millis() as u64, "Observer silence");
        }
    }

    async fn eviction_loop(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        let period = self.settings.eviction_interval;
        let mut ticker = time::interval_at(time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if self.shutdown.is_triggered() {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.recv() => break,
            }
            if !self.registry.is_loaded() {
                debug!("Watched accounts not loaded yet, skipping the sweep");
                continue;
            }
            match self.registry.sweep(self.settings.max_idle) {
                Ok(evicted) => debug!(evicted, remaining = self.registry.len(), "Account sweep complete"),
                Err(e) => {
                    error!(error = %e, "Cannot persist watched accounts");
                    self.status.transition(DatabaseError);
                }
            }
        }
        info!("Account eviction loop stopped");
    }

    // --- Shutdown ---

    fn shutdown(&self) {
        if self.status.get() == Shutdown {
            return;
        }
        info!("Shutting down the payment observer");
        self.shutdown.trigger();
        self.detach_stream();
        if !self.registry.is_loaded() {
            warn!("Watched accounts were never loaded, leaving the account store untouched");
        } else if let Err(e) = self.registry.flush() {
            error!(error = %e, "Cannot flush watched accounts on shutdown");
        }
        self.status.transition(Shutdown);
    }
}

/// Run one listener callback. A panicking listener counts as a delivery
/// failure instead of taking down the delivery task.
fn invoke<F>(payment: &ObservedPayment, callback: F) -> Result<(), PublishError>
where
    F: FnOnce() -> Result<(), PublishError>,
{
    catch_unwind(AssertUnwindSafe(callback))
        .unwrap_or_else(|_| Err(PublishError::new(payment, "listener panicked")))
}

/// Current delay of `timer` (then advanced), or `None` once it is maxed.
fn next_delay(timer: &Mutex<BackoffTimer>) -> Option<Duration> {
    let mut timer = lock(timer);
    if timer.is_maxed() {
        None
    } else {
        Some(timer.next_delay())
    }
}

/// Sleep for `delay`; `false` if shutdown was signalled first.
async fn sleep_or_shutdown(delay: Duration, shutdown: &mut broadcast::Receiver<()>) -> bool {
    tokio::select! {
        _ = time::sleep(delay) => true,
        _ = shutdown.recv() => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(position: u64) -> Cursor {
        Cursor::from(position)
    }

    #[test]
    fn test_bootstrap_clamps_backlog() {
        assert_eq!(resolve_start_cursor(Some(&c(10)), Some(&c(5000)), 200), c(4800));
        assert_eq!(resolve_start_cursor(Some(&c(123)), Some(&c(1000)), 200), c(800));
    }

    #[test]
    fn test_bootstrap_resumes_recent_cursor() {
        assert_eq!(resolve_start_cursor(Some(&c(4900)), Some(&c(5000)), 200), c(4900));
    }

    #[test]
    fn test_bootstrap_stale_cursor_uses_tip() {
        assert_eq!(resolve_start_cursor(Some(&c(5000)), Some(&c(5000)), 200), c(5000));
        assert_eq!(resolve_start_cursor(Some(&c(9000)), Some(&c(5000)), 200), c(5000));
    }

    #[test]
    fn test_bootstrap_without_stored_cursor() {
        assert_eq!(resolve_start_cursor(None, Some(&c(5000)), 200), c(5000));
        assert_eq!(resolve_start_cursor(None, None, 200), Cursor::now());
        assert_eq!(resolve_start_cursor(Some(&c(7)), None, 200), c(7));
    }

    #[test]
    fn test_bootstrap_non_numeric_cursor_uses_tip() {
        let stored = Cursor::new("garbage");
        assert_eq!(resolve_start_cursor(Some(&stored), Some(&c(5000)), 200), c(5000));
    }

    #[test]
    fn test_settings_from_config() {
        let settings = EngineSettings::default();
        assert_eq!(settings.silence_timeout, Duration::from_secs(90));
        assert_eq!(settings.max_page_size, 200);
        assert_eq!(settings.eviction_interval, Duration::from_secs(300));
        assert_eq!(settings.status_check_interval, Duration::from_secs(1));
    }
}
