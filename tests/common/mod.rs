//! Shared utilities for observer integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use ledger_observer::accounts::AccountRegistry;
use ledger_observer::ledger::{
    Cursor, LedgerClient, LedgerError, LedgerResult, OperationStream, RawOperation, RawTransaction,
};
use ledger_observer::observer::{EngineSettings, ObserverEngine};
use ledger_observer::payments::{ObservedPayment, PaymentListener, PublishError};
use ledger_observer::storage::{
    AccountStore, CursorStore, MemoryAccountStore, StorageError, StorageResult, StoredAccount,
};

type Feed = mpsc::UnboundedSender<LedgerResult<RawOperation>>;

/// In-memory ledger feed driven by the test.
///
/// Every `subscribe` opens a fresh channel; `push` writes to the newest one.
/// Older channels stay open so a replaced subscription never ends on its own.
#[derive(Default)]
pub struct ScriptedLedger {
    tip: Mutex<Option<Cursor>>,
    unavailable: AtomicBool,
    subscriptions: Mutex<Vec<Cursor>>,
    feeds: Mutex<Vec<Feed>>,
}

impl ScriptedLedger {
    pub fn new(tip: Option<u64>) -> Self {
        Self {
            tip: Mutex::new(tip.map(Cursor::from)),
            ..Self::default()
        }
    }

    /// Make the network refuse every request.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Cursors passed to each `subscribe` call, in order.
    pub fn subscriptions(&self) -> Vec<Cursor> {
        self.subscriptions.lock().unwrap().clone()
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.lock().unwrap().len()
    }

    /// Deliver `op` on the newest subscription.
    pub fn push(&self, op: RawOperation) -> bool {
        self.send(Ok(op))
    }

    /// Fail the newest subscription with a transport error.
    pub fn fail_stream(&self) -> bool {
        self.send(Err(LedgerError::Http("connection reset".to_string())))
    }

    fn send(&self, item: LedgerResult<RawOperation>) -> bool {
        self.feeds
            .lock()
            .unwrap()
            .last()
            .is_some_and(|feed| feed.send(item).is_ok())
    }
}

#[async_trait]
impl LedgerClient for ScriptedLedger {
    async fn latest_cursor(&self) -> LedgerResult<Option<Cursor>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(LedgerError::Http("network unreachable".to_string()));
        }
        Ok(self.tip.lock().unwrap().clone())
    }

    async fn subscribe(&self, from: &Cursor) -> LedgerResult<OperationStream> {
        self.subscriptions.lock().unwrap().push(from.clone());
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(LedgerError::Http("network unreachable".to_string()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        self.feeds.lock().unwrap().push(tx);
        Ok(stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })
        .boxed())
    }
}

/// Listener that records successful deliveries and can be told to fail.
#[derive(Default)]
pub struct RecordingListener {
    received: Mutex<Vec<ObservedPayment>>,
    sent: Mutex<Vec<ObservedPayment>>,
    failures: AtomicU32,
    attempts: AtomicU32,
    slow: Mutex<Option<(String, Duration)>>,
}

impl RecordingListener {
    /// Fail the next `n` deliveries.
    pub fn fail_next(&self, n: u32) {
        self.failures.store(n, Ordering::SeqCst);
    }

    /// Block the delivery thread for `delay` the first time `id` arrives.
    pub fn slow_on(&self, id: &str, delay: Duration) {
        *self.slow.lock().unwrap() = Some((id.to_string(), delay));
    }

    pub fn received(&self) -> Vec<ObservedPayment> {
        self.received.lock().unwrap().clone()
    }

    pub fn sent(&self) -> Vec<ObservedPayment> {
        self.sent.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    fn deliver(&self, into: &Mutex<Vec<ObservedPayment>>, payment: &ObservedPayment) -> Result<(), PublishError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let delay = {
            let mut slow = self.slow.lock().unwrap();
            match slow.as_ref() {
                Some((id, _)) if *id == payment.id => slow.take().map(|(_, delay)| delay),
                _ => None,
            }
        };
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(PublishError::new(payment, "downstream unavailable"));
        }
        into.lock().unwrap().push(payment.clone());
        Ok(())
    }
}

impl PaymentListener for RecordingListener {
    fn on_received(&self, payment: &ObservedPayment) -> Result<(), PublishError> {
        self.deliver(&self.received, payment)
    }

    fn on_sent(&self, payment: &ObservedPayment) -> Result<(), PublishError> {
        self.deliver(&self.sent, payment)
    }
}

/// Cursor store that records every save and can be switched to failing.
#[derive(Default)]
pub struct RecordingCursorStore {
    cursor: Mutex<Option<Cursor>>,
    saves: Mutex<Vec<Cursor>>,
    failing: AtomicBool,
    failing_saves: AtomicBool,
}

impl RecordingCursorStore {
    pub fn with_cursor(position: u64) -> Self {
        Self {
            cursor: Mutex::new(Some(Cursor::from(position))),
            ..Self::default()
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Fail saves only; loads keep working.
    pub fn set_failing_saves(&self, failing: bool) {
        self.failing_saves.store(failing, Ordering::SeqCst);
    }

    pub fn current(&self) -> Option<Cursor> {
        self.cursor.lock().unwrap().clone()
    }

    pub fn saves(&self) -> Vec<Cursor> {
        self.saves.lock().unwrap().clone()
    }

    fn check(&self) -> StorageResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("database offline".to_string()));
        }
        Ok(())
    }
}

impl CursorStore for RecordingCursorStore {
    fn save(&self, cursor: &Cursor) -> StorageResult<()> {
        self.check()?;
        if self.failing_saves.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("disk full".to_string()));
        }
        *self.cursor.lock().unwrap() = Some(cursor.clone());
        self.saves.lock().unwrap().push(cursor.clone());
        Ok(())
    }

    fn load(&self) -> StorageResult<Option<Cursor>> {
        self.check()?;
        Ok(self.current())
    }
}

/// Account store whose snapshot cannot be read back.
pub struct UnreadableAccountStore {
    inner: MemoryAccountStore,
}

impl UnreadableAccountStore {
    pub fn new(accounts: Vec<StoredAccount>) -> Self {
        Self {
            inner: MemoryAccountStore::with_accounts(accounts),
        }
    }

    /// What is currently persisted, bypassing the failing read path.
    pub fn stored(&self) -> Vec<StoredAccount> {
        self.inner.list().unwrap()
    }
}

impl AccountStore for UnreadableAccountStore {
    fn list(&self) -> StorageResult<Vec<StoredAccount>> {
        Err(StorageError::Unavailable("account table locked".to_string()))
    }

    fn replace_all(&self, accounts: &[StoredAccount]) -> StorageResult<()> {
        self.inner.replace_all(accounts)
    }
}

/// Millisecond-scale settings. Silence detection is effectively off.
pub fn fast_settings() -> EngineSettings {
    EngineSettings {
        status_check_interval: Duration::from_millis(10),
        silence_check_interval: Duration::from_millis(50),
        silence_timeout: Duration::from_secs(30),
        silence_timeout_retries: 2,
        initial_stream_backoff: Duration::from_millis(20),
        max_stream_backoff: Duration::from_millis(160),
        initial_event_backoff: Duration::from_millis(20),
        max_event_backoff: Duration::from_millis(160),
        initial_database_backoff: Duration::from_millis(20),
        max_database_backoff: Duration::from_secs(5),
        max_page_size: 200,
        eviction_interval: Duration::from_secs(3600),
        max_idle: Duration::from_secs(30 * 24 * 3600),
    }
}

/// An observer wired to in-memory collaborators.
pub struct Harness {
    pub ledger: Arc<ScriptedLedger>,
    pub cursors: Arc<RecordingCursorStore>,
    pub accounts: Arc<MemoryAccountStore>,
    pub listener: Arc<RecordingListener>,
    pub engine: ObserverEngine,
}

impl Harness {
    pub fn new(settings: EngineSettings, ledger: ScriptedLedger, cursors: RecordingCursorStore) -> Self {
        Self::with_accounts(settings, ledger, cursors, MemoryAccountStore::new())
    }

    pub fn with_accounts(
        settings: EngineSettings,
        ledger: ScriptedLedger,
        cursors: RecordingCursorStore,
        accounts: MemoryAccountStore,
    ) -> Self {
        let ledger = Arc::new(ledger);
        let cursors = Arc::new(cursors);
        let accounts = Arc::new(accounts);
        let listener = Arc::new(RecordingListener::default());

        let engine = ObserverEngine::new(
            ledger.clone(),
            cursors.clone(),
            AccountRegistry::new(accounts.clone()),
            vec![listener.clone() as Arc<dyn PaymentListener>],
            settings,
        );
        Self {
            ledger,
            cursors,
            accounts,
            listener,
            engine,
        }
    }

    pub fn registry(&self) -> &AccountRegistry {
        self.engine.registry()
    }
}

/// A native payment record at feed position `position`.
pub fn payment(position: u64, from: &str, to: &str) -> RawOperation {
    RawOperation {
        id: position.to_string(),
        paging_token: position.to_string(),
        op_type: "payment".to_string(),
        transaction_successful: true,
        source_account: Some(from.to_string()),
        created_at: Some("2024-01-01T00:00:00Z".to_string()),
        transaction_hash: Some(format!("tx{position}")),
        from: Some(from.to_string()),
        to: Some(to.to_string()),
        amount: Some("10.0000000".to_string()),
        asset_type: Some("native".to_string()),
        transaction: Some(RawTransaction {
            hash: Some(format!("tx{position}")),
            successful: Some(true),
            source_account: Some(from.to_string()),
            memo_type: Some("text".to_string()),
            memo: Some("deposit".to_string()),
            envelope_xdr: Some("AAAA".to_string()),
        }),
        ..RawOperation::default()
    }
}

/// Poll `condition` every 10ms until it holds or `timeout` elapses.
pub async fn wait_until<F>(timeout: Duration, condition: F) -> bool
where
    F: Fn() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Run `future`, failing the test if it takes longer than `timeout`.
pub async fn within<F: Future>(timeout: Duration, future: F) -> F::Output {
    tokio::time::timeout(timeout, future)
        .await
        .unwrap_or_else(|_| panic!("timed out after {timeout:?}"))
}
