//! Downstream sinks for matched payments.

use thiserror::Error;
use tracing::info;

use crate::payments::types::ObservedPayment;

/// A listener failed to deliver a payment downstream.
#[derive(Debug, Error)]
#[error("failed to deliver payment {payment_id}: {reason}")]
pub struct PublishError {
    pub payment_id: String,
    pub reason: String,
}

impl PublishError {
    pub fn new(payment: &ObservedPayment, reason: impl Into<String>) -> Self {
        Self {
            payment_id: payment.id.clone(),
            reason: reason.into(),
        }
    }
}

/// Business logic invoked for each payment touching a watched account.
///
/// Calls happen synchronously on the feed-delivery task, in feed order.
/// The same payment can be delivered again after a publishing failure, so
/// implementations must tolerate duplicates.
pub trait PaymentListener: Send + Sync {
    /// A watched account received `payment`.
    fn on_received(&self, payment: &ObservedPayment) -> Result<(), PublishError>;

    /// A watched account sent `payment`.
    fn on_sent(&self, payment: &ObservedPayment) -> Result<(), PublishError>;
}

/// Listener that records matched payments in the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingListener;

impl PaymentListener for LoggingListener {
    fn on_received(&self, payment: &ObservedPayment) -> Result<(), PublishError> {
        info!(
            id = %payment.id,
            to = %payment.to,
            amount = %payment.amount,
            asset = %payment.asset.name(),
            memo = ?payment.transaction_memo,
            "Payment received"
        );
        Ok(())
    }

    fn on_sent(&self, payment: &ObservedPayment) -> Result<(), PublishError> {
        info!(
            id = %payment.id,
            from = %payment.from,
            amount = %payment.amount,
            asset = %payment.asset.name(),
            "Payment sent"
        );
        Ok(())
    }
}
