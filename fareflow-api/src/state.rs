use fareflow_core::distribution::OrderDistribution;
use fareflow_core::ndc::OrderView;
use fareflow_core::repository::{BookingRepository, SessionStore};
use fareflow_order::confirmation::{PacingPolicy, SessionRegistry};
use fareflow_order::poller::InstantIssuePoller;
use fareflow_store::app_config::BusinessRules;
use fareflow_store::{EventProducer, RedisClient};
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone)]
pub struct AppState {
    pub redis: Arc<RedisClient>,
    pub kafka: Arc<EventProducer>,
    pub distribution: Arc<dyn OrderDistribution>,
    pub bookings: Arc<dyn BookingRepository>,
    pub store: Arc<dyn SessionStore>,
    pub sessions: Arc<SessionRegistry>,
    pub pollers: Arc<Mutex<HashMap<String, InstantIssuePoller>>>,
    pub refresh_gates: Arc<Mutex<HashMap<String, Arc<AtomicBool>>>>,
    pub rules: BusinessRules,
}

impl AppState {
    /// Per-order refresh-in-progress flag, shared between manual refreshes
    /// and the instant-issue poller.
    pub fn refresh_gate(&self, order_reference: &str) -> Arc<AtomicBool> {
        self.refresh_gates
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(order_reference.to_string())
            .or_insert_with(|| Arc::new(AtomicBool::new(false)))
            .clone()
    }

    pub fn pacing(&self) -> PacingPolicy {
        PacingPolicy {
            step_dwell: Duration::from_millis(self.rules.step_dwell_ms),
            success_linger: Duration::from_millis(self.rules.success_linger_ms),
        }
    }

    /// Start a poller for this order if it qualifies and none is running.
    /// Inserting drops any stale poller, which aborts its task.
    pub fn ensure_poller(&self, order: &OrderView) {
        let mut pollers = self.pollers.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = pollers.get(&order.order_reference) {
            if !existing.is_finished() {
                return;
            }
        }
        let gate = self.refresh_gate(&order.order_reference);
        if let Some(poller) = InstantIssuePoller::spawn(
            self.distribution.clone(),
            self.store.clone(),
            order,
            Duration::from_secs(self.rules.instant_issue_poll_seconds),
            gate,
        ) {
            pollers.insert(order.order_reference.clone(), poller);
        }
    }

    /// Stop polling an order that has reached a terminal status.
    pub fn drop_poller(&self, order_reference: &str) {
        self.pollers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(order_reference);
    }
}
