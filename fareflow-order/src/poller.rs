use crate::status;
use chrono::Utc;
use fareflow_core::distribution::OrderDistribution;
use fareflow_core::ndc::OrderView;
use fareflow_core::repository::{CachedOrder, SessionStore};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Default re-check interval for instant-issue orders.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(15);

/// Instant-issue fares settle asynchronously on the supplier side; keep
/// re-checking only while the effective status still reads as processing.
pub fn should_poll(order: &OrderView) -> bool {
    let effective = status::effective_status(order, Utc::now());
    status::is_instant_issue_fare(order.fare_type())
        && status::is_processing(&status::normalize_status(Some(&effective)))
}

/// Background re-check loop for one instant-issue order. One outstanding
/// timer per order; the task is aborted when the poller is dropped, which is
/// how view teardown and order switches cancel it.
pub struct InstantIssuePoller {
    order_reference: String,
    handle: JoinHandle<()>,
}

impl InstantIssuePoller {
    /// Start polling if the order qualifies. `refresh_gate` is shared with
    /// the manual refresh path so the two never fetch at the same time.
    pub fn spawn(
        api: Arc<dyn OrderDistribution>,
        store: Arc<dyn SessionStore>,
        order: &OrderView,
        interval: Duration,
        refresh_gate: Arc<AtomicBool>,
    ) -> Option<Self> {
        if !should_poll(order) {
            return None;
        }
        let order_reference = order.order_reference.clone();
        tracing::debug!(order_reference = %order_reference, "starting instant-issue poller");
        let task_reference = order_reference.clone();
        let handle = tokio::spawn(async move {
            poll_loop(api, store, task_reference, interval, refresh_gate).await;
        });
        Some(Self { order_reference, handle })
    }

    pub fn order_reference(&self) -> &str {
        &self.order_reference
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the loop to reach a terminal status on its own.
    pub async fn wait(mut self) {
        let _ = (&mut self.handle).await;
    }
}

impl Drop for InstantIssuePoller {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn poll_loop(
    api: Arc<dyn OrderDistribution>,
    store: Arc<dyn SessionStore>,
    order_reference: String,
    interval: Duration,
    refresh_gate: Arc<AtomicBool>,
) {
    loop {
        tokio::time::sleep(interval).await;

        // A manual refresh is already in flight; skip the tick instead of
        // double-fetching.
        if refresh_gate.swap(true, Ordering::SeqCst) {
            continue;
        }
        let fetched = api.retrieve_order(&order_reference).await;
        refresh_gate.store(false, Ordering::SeqCst);

        match fetched {
            Ok(view) => {
                let still_processing = should_poll(&view);
                let previous = store.get_snapshot(&order_reference).await.ok().flatten();
                let record = CachedOrder::refreshed(view, previous.as_ref());
                if let Err(err) = store.put_snapshot(&record).await {
                    tracing::warn!(order_reference = %order_reference, error = %err, "failed to cache refreshed order");
                }
                if !still_processing {
                    tracing::info!(order_reference = %order_reference, "instant-issue order settled");
                    break;
                }
            }
            Err(err) => {
                // Status unknown; keep the schedule until it can be read.
                tracing::warn!(order_reference = %order_reference, error = %err, "instant-issue status check failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{order_view, MemorySessionStore, MockDistribution};
    use std::sync::atomic::Ordering;

    #[test]
    fn test_should_poll_requires_web_fare_and_processing_status() {
        assert!(should_poll(&order_view("FF-1", "Pending", "web", 100)));
        assert!(should_poll(&order_view("FF-1", "InProgress", "WEB", 100)));
        assert!(!should_poll(&order_view("FF-1", "Confirmed", "web", 100)));
        assert!(!should_poll(&order_view("FF-1", "Pending", "regular", 100)));
        assert!(!should_poll(&order_view("FF-1", "OnHold", "web", 100)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_settled_order_never_schedules() {
        let api = Arc::new(MockDistribution::new(order_view("FF-1", "Confirmed", "web", 100)));
        let store: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new());
        let order = order_view("FF-1", "Confirmed", "web", 100);

        let poller = InstantIssuePoller::spawn(
            api.clone(),
            store,
            &order,
            DEFAULT_POLL_INTERVAL,
            Arc::new(AtomicBool::new(false)),
        );
        assert!(poller.is_none());
        assert_eq!(api.retrieve_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_recheck_after_interval_then_stop_on_terminal() {
        // The next retrieve reports the order settled.
        let api = Arc::new(MockDistribution::new(order_view("FF-2", "Confirmed", "web", 100)));
        let store = Arc::new(MemorySessionStore::new());
        let order = order_view("FF-2", "Pending", "web", 100);

        let poller = InstantIssuePoller::spawn(
            api.clone(),
            store.clone(),
            &order,
            DEFAULT_POLL_INTERVAL,
            Arc::new(AtomicBool::new(false)),
        )
        .unwrap();
        poller.wait().await;

        assert_eq!(api.retrieve_calls.load(Ordering::SeqCst), 1);
        let cached = store.get_snapshot("FF-2").await.unwrap().unwrap();
        assert_eq!(cached.snapshot.order_status, "Confirmed");
    }

    #[tokio::test(start_paused = true)]
    async fn test_keeps_polling_while_processing() {
        let api = Arc::new(MockDistribution::new(order_view("FF-3", "Confirmed", "web", 100)));
        // First tick still sees the order in progress.
        api.queue_retrieve(order_view("FF-3", "InProgress", "web", 100));
        let store = Arc::new(MemorySessionStore::new());
        let order = order_view("FF-3", "Pending", "web", 100);

        let poller = InstantIssuePoller::spawn(
            api.clone(),
            store.clone(),
            &order,
            DEFAULT_POLL_INTERVAL,
            Arc::new(AtomicBool::new(false)),
        )
        .unwrap();
        poller.wait().await;

        assert_eq!(api.retrieve_calls.load(Ordering::SeqCst), 2);
        // The cache saw both refreshes.
        let cached = store.get_snapshot("FF-3").await.unwrap().unwrap();
        assert_eq!(cached.snapshot.order_status, "Confirmed");
        assert_eq!(cached.revision, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_refresh_gate_suppresses_ticks() {
        let api = Arc::new(MockDistribution::new(order_view("FF-4", "Confirmed", "web", 100)));
        let store = Arc::new(MemorySessionStore::new());
        let order = order_view("FF-4", "Pending", "web", 100);
        let gate = Arc::new(AtomicBool::new(true));

        let poller = InstantIssuePoller::spawn(
            api.clone(),
            store,
            &order,
            DEFAULT_POLL_INTERVAL,
            gate.clone(),
        )
        .unwrap();

        // Hold the gate across three ticks, as a slow manual refresh would.
        tokio::time::sleep(DEFAULT_POLL_INTERVAL * 7 / 2).await;
        assert_eq!(api.retrieve_calls.load(Ordering::SeqCst), 0);
        gate.store(false, Ordering::SeqCst);

        poller.wait().await;
        assert_eq!(api.retrieve_calls.load(Ordering::SeqCst), 1);
    }
}
