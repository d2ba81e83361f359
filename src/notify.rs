//! Fan-out of "eligible conversion recorded" events.
//!
//! The hub is created at startup, shared behind an `Arc`, and closed at
//! shutdown. Subscribers either register a callback or take a bounded
//! broadcast receiver. Publishing never blocks the caller and never fails:
//! callback errors are logged and slow receivers lag and drop events.

use crate::domain::{ConversionEvent, TimeMs};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

/// Event published after an eligible conversion commits.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EligibleConversion {
    pub event_id: Uuid,
    pub conversion: ConversionEvent,
    pub published_at: TimeMs,
}

impl EligibleConversion {
    pub fn new(conversion: ConversionEvent, published_at: TimeMs) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            conversion,
            published_at,
        }
    }
}

/// Handle returned by [`NotificationHub::on_eligible_conversion`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback = Arc<dyn Fn(&EligibleConversion) -> anyhow::Result<()> + Send + Sync>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NotifyError {
    #[error("notification hub is closed")]
    Closed,
}

pub struct NotificationHub {
    callbacks: RwLock<Vec<(SubscriptionId, Callback)>>,
    sender: RwLock<Option<broadcast::Sender<EligibleConversion>>>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl NotificationHub {
    /// `capacity` bounds each broadcast receiver's backlog.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            callbacks: RwLock::new(Vec::new()),
            sender: RwLock::new(Some(sender)),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        }
    }

    pub fn on_eligible_conversion<F>(&self, callback: F) -> Result<SubscriptionId, NotifyError>
    where
        F: Fn(&EligibleConversion) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        if self.is_closed() {
            return Err(NotifyError::Closed);
        }
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.callbacks.write().push((id, Arc::new(callback)));
        debug!(subscription = id.0, "Eligible-conversion callback registered");
        Ok(id)
    }

    /// Remove a callback. Returns false if it was not registered.
    pub fn off_eligible_conversion(&self, id: SubscriptionId) -> bool {
        let mut callbacks = self.callbacks.write();
        let before = callbacks.len();
        callbacks.retain(|(sid, _)| *sid != id);
        callbacks.len() != before
    }

    pub fn subscribe(&self) -> Result<broadcast::Receiver<EligibleConversion>, NotifyError> {
        self.sender
            .read()
            .as_ref()
            .map(|s| s.subscribe())
            .ok_or(NotifyError::Closed)
    }

    pub fn callback_count(&self) -> usize {
        self.callbacks.read().len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Deliver an event to every subscriber at most once.
    ///
    /// Callbacks run on a spawned task when a Tokio runtime is available and
    /// inline otherwise.
    pub fn publish(&self, event: EligibleConversion) {
        if self.is_closed() {
            debug!(event_id = %event.event_id, "Hub closed, dropping event");
            return;
        }

        if let Some(sender) = self.sender.read().as_ref() {
            // Err only means there are no receivers right now.
            let _ = sender.send(event.clone());
        }

        let callbacks: Vec<(SubscriptionId, Callback)> = self.callbacks.read().clone();
        if callbacks.is_empty() {
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    run_callbacks(&callbacks, &event);
                });
            }
            Err(_) => run_callbacks(&callbacks, &event),
        }
    }

    /// Stop delivery. Receivers see the channel close once drained.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.callbacks.write().clear();
        self.sender.write().take();
        debug!("Notification hub closed");
    }
}

impl std::fmt::Debug for NotificationHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationHub")
            .field("callbacks", &self.callback_count())
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn run_callbacks(callbacks: &[(SubscriptionId, Callback)], event: &EligibleConversion) {
    for (id, callback) in callbacks {
        if let Err(e) = callback(event) {
            warn!(
                subscription = id.0,
                event_id = %event.event_id,
                error = %e,
                "Eligible-conversion subscriber failed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Amount, AttributionMethod, CustomerId, ProductId};
    use std::sync::atomic::AtomicUsize;
    use tokio_test::{assert_err, assert_ok};

    fn event() -> EligibleConversion {
        EligibleConversion::new(
            ConversionEvent {
                id: 1,
                tracking_code: "abc".to_string(),
                customer_id: CustomerId::new("c1"),
                product_id: ProductId::new("p1"),
                initial_spend_amount: Amount::from_int(1000),
                conversion_timestamp: TimeMs::new(0),
                attribution_method: AttributionMethod::Portal,
                commission_eligible: true,
                marketer_id: None,
                session_id: None,
                fingerprint: None,
                ip_address: None,
                user_agent: None,
                click_event_id: None,
                attribution_window_days: 30,
                deduplication_key: "k".to_string(),
            },
            TimeMs::new(0),
        )
    }

    #[test]
    fn test_callbacks_run_inline_without_runtime() {
        let hub = NotificationHub::new(8);
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        assert_ok!(hub.on_eligible_conversion(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));

        hub.publish(event());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failing_callback_does_not_stop_others() {
        let hub = NotificationHub::new(8);
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        hub.on_eligible_conversion(|_| anyhow::bail!("dashboard offline"))
            .unwrap();
        hub.on_eligible_conversion(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();

        hub.publish(event());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_off_removes_callback() {
        let hub = NotificationHub::new(8);
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let id = hub
            .on_eligible_conversion(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();

        assert!(hub.off_eligible_conversion(id));
        assert!(!hub.off_eligible_conversion(id));
        hub.publish(event());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_receiver_gets_event_once() {
        let hub = NotificationHub::new(8);
        let mut rx = hub.subscribe().unwrap();
        let sent = event();
        hub.publish(sent.clone());

        let got = rx.recv().await.unwrap();
        assert_eq!(got.event_id, sent.event_id);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_close_ends_delivery() {
        let hub = NotificationHub::new(8);
        let mut rx = hub.subscribe().unwrap();
        hub.close();

        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Closed)
        ));
        assert_err!(hub.subscribe());
        assert_eq!(
            hub.on_eligible_conversion(|_| Ok(())).unwrap_err(),
            NotifyError::Closed
        );
        hub.publish(event());
    }
}
