//! Drives pending orders to `Paid` or `Failed` from any of the three confirmation channels.
//!
//! All channels funnel into [`ReconciliationApi::apply_signal`], which performs a compare-and-set on the order's
//! `Pending` status. Whichever signal arrives first wins; every later signal for the same order observes
//! [`TransitionOutcome::AlreadyFinal`] and is treated as a successful, idempotent confirmation.
use std::{fmt::Debug, time::Duration};

use chrono::Utc;
use log::*;
use serde_json::Value;

use crate::{
    db_types::{Order, PaymentChannel},
    events::{EventProducers, OrderFailedEvent, OrderPaidEvent},
    helpers::{extract_transaction, is_payment_received_notification},
    sfe_api::{
        errors::ReconciliationError,
        payment_objects::{
            CallbackOutcome,
            ConfirmationSignal,
            GatewayCallback,
            PollResult,
            SmsOutcome,
            SmsRelayMessage,
            WebhookPayload,
        },
    },
    traits::{CorrelationKeys, LedgerError, OrderLedger, PaymentGateway, Settlement, TransitionOutcome},
};

pub const DEFAULT_TRUSTED_SMS_SENDER: &str = "MPESA";
pub const DEFAULT_LOOKUP_ATTEMPTS: u32 = 3;
pub const DEFAULT_LOOKUP_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct ReconciliationOptions {
    /// SMS relay messages from any other sender id are ignored
    pub trusted_sms_sender: String,
    /// How many times a callback looks for its order before giving up
    pub lookup_attempts: u32,
    /// Pause between callback lookups
    pub lookup_delay: Duration,
}

impl Default for ReconciliationOptions {
    fn default() -> Self {
        Self {
            trusted_sms_sender: DEFAULT_TRUSTED_SMS_SENDER.to_string(),
            lookup_attempts: DEFAULT_LOOKUP_ATTEMPTS,
            lookup_delay: DEFAULT_LOOKUP_DELAY,
        }
    }
}

/// The outcome of dispatching a unified webhook payload.
#[derive(Debug, Clone)]
pub enum WebhookOutcome {
    Sms(SmsOutcome),
    Callback(CallbackOutcome),
}

pub struct ReconciliationApi<B, G> {
    db: B,
    gateway: G,
    producers: EventProducers,
    options: ReconciliationOptions,
}

impl<B, G> Debug for ReconciliationApi<B, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ReconciliationApi ({:?})", self.options)
    }
}

impl<B, G> ReconciliationApi<B, G> {
    pub fn new(db: B, gateway: G, producers: EventProducers) -> Self {
        Self { db, gateway, producers, options: ReconciliationOptions::default() }
    }

    pub fn with_options(mut self, options: ReconciliationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &ReconciliationOptions {
        &self.options
    }
}

impl<B, G> ReconciliationApi<B, G>
where
    B: OrderLedger,
    G: PaymentGateway,
{
    /// Moves `order` out of `Pending` according to `signal`.
    ///
    /// The write only happens if the order is still pending at that moment. If another signal got there first, the
    /// order is returned untouched as [`TransitionOutcome::AlreadyFinal`]. Hooks are notified only for applied
    /// transitions, so each order publishes at most one paid or failed event.
    pub async fn apply_signal(
        &self,
        order: &Order,
        signal: ConfirmationSignal,
    ) -> Result<TransitionOutcome, LedgerError> {
        if order.status.is_terminal() {
            trace!("🔄️💰️ Order [{}] is already {}. Skipping the write", order.order_id, order.status);
            return Ok(TransitionOutcome::AlreadyFinal(order.clone()));
        }
        let channel = signal.channel;
        let settlement = if signal.success {
            // A paid order must always carry a transaction id
            let transaction_id = signal
                .transaction_id
                .or_else(|| {
                    let fallback = signal.keys.transaction_reference.clone();
                    warn!(
                        "🔄️💰️ Success signal for [{}] carries no receipt number. Using reference {fallback:?} instead",
                        order.order_id
                    );
                    fallback
                })
                .unwrap_or_else(|| order.external_reference.clone());
            Settlement::Paid {
                transaction_id,
                channel,
                payment_meta: signal.payload,
                customer_phone: signal.customer_phone,
                customer_name: signal.customer_name,
                paid_at: Utc::now(),
            }
        } else {
            Settlement::Failed { channel, payment_meta: signal.payload }
        };
        let outcome = self.db.settle_order(order.id, settlement).await?;
        match &outcome {
            TransitionOutcome::Applied(updated) => {
                info!("🔄️💰️ Order [{}] is now {} (via {channel})", updated.order_id, updated.status);
                if signal.success {
                    self.producers.publish_order_paid(OrderPaidEvent::new(updated.clone(), channel)).await;
                } else {
                    self.producers.publish_order_failed(OrderFailedEvent::new(updated.clone(), channel)).await;
                }
            },
            TransitionOutcome::AlreadyFinal(current) => {
                info!(
                    "🔄️💰️ Order [{}] was settled as {} before this {channel} signal arrived. Nothing to do",
                    current.order_id, current.status
                );
            },
        }
        Ok(outcome)
    }

    /// Handles a gateway callback. The order may not be visible yet when the callback races the checkout response,
    /// so the lookup is retried according to [`ReconciliationOptions`].
    pub async fn process_callback(&self, callback: GatewayCallback) -> Result<CallbackOutcome, ReconciliationError> {
        let keys = callback.correlation_keys();
        if keys.is_empty() {
            error!("🔄️📞️ Callback carries no usable reference. Payload: {}", callback.raw);
            return Ok(CallbackOutcome::Unresolved(keys));
        }
        let Some(order) = self.find_order_with_retries(&keys).await? else {
            error!(
                "🔄️📞️ Order never found for callback after {} attempts. Keys: {keys:?}. Payload: {}",
                self.options.lookup_attempts, callback.raw
            );
            return Ok(CallbackOutcome::Unresolved(keys));
        };
        let success = callback.is_success();
        let signal = ConfirmationSignal::new(keys, success, PaymentChannel::Callback, callback.payment_details())
            .with_transaction_id(callback.response.mpesa_receipt_number.clone());
        debug!("🔄️📞️ Callback for order [{}]. Success: {success}", order.order_id);
        let outcome = match self.apply_signal(&order, signal).await? {
            TransitionOutcome::Applied(o) => CallbackOutcome::Applied(o),
            TransitionOutcome::AlreadyFinal(o) => CallbackOutcome::AlreadyFinal(o),
        };
        Ok(outcome)
    }

    async fn find_order_with_retries(&self, keys: &CorrelationKeys) -> Result<Option<Order>, LedgerError> {
        let attempts = self.options.lookup_attempts.max(1);
        for attempt in 1..=attempts {
            if let Some(order) = self.db.fetch_order_by_correlation(keys).await? {
                return Ok(Some(order));
            }
            if attempt < attempts {
                debug!("🔄️📞️ No order for callback yet (attempt {attempt}/{attempts}). Retrying");
                tokio::time::sleep(self.options.lookup_delay).await;
            }
        }
        Ok(None)
    }

    /// Handles a payment notification forwarded by the SMS relay.
    ///
    /// Notifications carry no reference, so the order is matched on amount: the most recent pending order for exactly
    /// the notified amount is taken to be the one paid for. A receipt number that already paid an order is reported as
    /// [`SmsOutcome::AlreadyFinal`] for that order.
    pub async fn process_sms(&self, message: SmsRelayMessage) -> Result<SmsOutcome, ReconciliationError> {
        if message.from.trim() != self.options.trusted_sms_sender {
            warn!("🔄️📨️ Ignoring SMS from untrusted sender '{}'", message.from);
            return Ok(SmsOutcome::Ignored(format!("Untrusted sender {}", message.from)));
        }
        if !is_payment_received_notification(&message.content) {
            debug!("🔄️📨️ Ignoring SMS that is not a payment notification");
            return Ok(SmsOutcome::Ignored("Not a payment notification".into()));
        }
        let tx = extract_transaction(&message.content)
            .ok_or_else(|| ReconciliationError::MalformedSms("No transaction id or amount found".into()))?;
        info!("🔄️📨️ SMS payment {} of {} received", tx.transaction_id, tx.amount);
        // Relays re-deliver messages, and a receipt that has paid one order must never pay another
        if let Some(paid) = self.db.fetch_order_by_mpesa_transaction_id(&tx.transaction_id).await? {
            info!(
                "🔄️📨️ SMS payment {} was already applied to order [{}]. Nothing to do",
                tx.transaction_id, paid.order_id
            );
            return Ok(SmsOutcome::AlreadyFinal(paid));
        }
        let candidates = self.db.fetch_pending_orders_by_amount(tx.amount).await?;
        let Some(order) = candidates.first() else {
            let total_pending = self.db.count_pending_orders().await?;
            warn!(
                "🔄️📨️ No pending order for SMS payment {} of {}. Pending orders at this amount: 0. Pending orders in \
                 total: {total_pending}",
                tx.transaction_id, tx.amount
            );
            return Ok(SmsOutcome::Unmatched { transaction_id: tx.transaction_id, amount: tx.amount });
        };
        if candidates.len() > 1 {
            let ids = candidates.iter().map(|o| o.order_id.to_string()).collect::<Vec<_>>().join(", ");
            warn!(
                "🔄️📨️ {} pending orders for {}: [{ids}]. Assuming the most recent, [{}], was paid by {}",
                candidates.len(),
                tx.amount,
                order.order_id,
                tx.transaction_id
            );
        }
        let keys = CorrelationKeys { order_id: Some(order.order_id.clone()), ..Default::default() };
        let payload = serde_json::to_value(&tx).unwrap_or(Value::Null);
        let signal = ConfirmationSignal::new(keys, true, PaymentChannel::Sms, payload)
            .with_transaction_id(Some(tx.transaction_id.clone()))
            .with_customer(tx.customer_name.clone(), tx.phone.clone());
        let outcome = match self.apply_signal(order, signal).await {
            Ok(TransitionOutcome::Applied(o)) => SmsOutcome::Applied(o),
            Ok(TransitionOutcome::AlreadyFinal(o)) => SmsOutcome::AlreadyFinal(o),
            // A concurrent delivery of the same message got there first
            Err(LedgerError::DuplicateTransaction(receipt)) => {
                let paid = self.db.fetch_order_by_mpesa_transaction_id(&receipt).await?.ok_or_else(|| {
                    ReconciliationError::DatabaseError(format!("Receipt {receipt} is recorded but its order is gone"))
                })?;
                info!("🔄️📨️ SMS payment {receipt} was applied to order [{}] concurrently", paid.order_id);
                SmsOutcome::AlreadyFinal(paid)
            },
            Err(e) => return Err(e.into()),
        };
        Ok(outcome)
    }

    /// Dispatches a decoded unified-webhook payload to the matching entry point.
    pub async fn process_webhook(&self, payload: WebhookPayload) -> Result<WebhookOutcome, ReconciliationError> {
        match payload {
            WebhookPayload::Sms(message) => self.process_sms(message).await.map(WebhookOutcome::Sms),
            WebhookPayload::Callback(callback) => self.process_callback(callback).await.map(WebhookOutcome::Callback),
        }
    }

    /// Answers a client that is waiting for its payment to complete.
    ///
    /// Settled orders are answered from the ledger. For a pending order the gateway is asked directly, and a
    /// definitive success settles the order. Gateway trouble is logged and reported as still pending.
    pub async fn poll_payment(&self, reference: &str) -> Result<PollResult, ReconciliationError> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Ok(PollResult::pending());
        }
        let Some(order) = self.db.fetch_order_by_correlation(&CorrelationKeys::any(reference)).await? else {
            debug!("🔄️🔍️ Poll for unknown reference {reference}");
            return Ok(PollResult::pending());
        };
        if let Some(result) = PollResult::for_settled_order(&order) {
            return Ok(result);
        }
        let gateway_ref = order.transaction_reference.as_deref().unwrap_or(reference);
        let status = match self.gateway.query_payment_status(gateway_ref).await {
            Ok(status) => status,
            Err(e) => {
                warn!("🔄️🔍️ Payment status query for [{}] failed. Ignoring. {e}", order.order_id);
                return Ok(PollResult::pending());
            },
        };
        if !status.is_definitive_success() {
            trace!("🔄️🔍️ Order [{}] is still pending at the gateway", order.order_id);
            return Ok(PollResult::pending());
        }
        let keys = CorrelationKeys {
            transaction_reference: Some(gateway_ref.to_string()),
            order_id: Some(order.order_id.clone()),
            ..Default::default()
        };
        let signal = ConfirmationSignal::new(keys, true, PaymentChannel::Poll, status.raw)
            .with_transaction_id(status.transaction_id);
        let outcome = self.apply_signal(&order, signal).await?;
        let result = PollResult::for_settled_order(outcome.order())
            .map(|r| if outcome.was_applied() { PollResult { message: "Payment confirmed".into(), ..r } } else { r })
            .unwrap_or_else(PollResult::pending);
        Ok(result)
    }
}
