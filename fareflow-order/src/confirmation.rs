use crate::fare::{self, FareComparison};
use fareflow_core::distribution::OrderDistribution;
use fareflow_core::ndc::OrderView;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};

pub const REVALIDATE_FALLBACK_MESSAGE: &str = "Failed to revalidate fare";
pub const CONFIRM_FALLBACK_MESSAGE: &str = "Failed to confirm order";

// ============================================================================
// State Machine
// ============================================================================

/// The closed set of states a confirmation session moves through. The
/// session drives the traveller-visible progress dialog, so each state maps
/// to exactly one label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ConfirmationStep {
    Preparing,
    Revalidating,
    Confirming,
    Finalizing,
    FareUpdateRequired,
    Success,
    Failed,
}

impl ConfirmationStep {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConfirmationStep::Success | ConfirmationStep::Failed)
    }

    pub fn label(&self) -> &'static str {
        match self {
            ConfirmationStep::Preparing => "Preparing your booking",
            ConfirmationStep::Revalidating => "Revalidating fare",
            ConfirmationStep::Confirming => "Confirming price",
            ConfirmationStep::Finalizing => "Finalizing booking",
            ConfirmationStep::FareUpdateRequired => "Fare update required",
            ConfirmationStep::Success => "Booking confirmed",
            ConfirmationStep::Failed => "Confirmation failed",
        }
    }
}

/// Events that move a session between steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationEvent {
    DwellElapsed,
    ReshopSucceeded { fare_changed: bool },
    ReshopFailed,
    ConfirmSucceeded,
    ConfirmFailed,
    FareAccepted,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("illegal confirmation transition from {from:?} on {event}")]
pub struct TransitionError {
    pub from: ConfirmationStep,
    pub event: String,
}

/// Pure transition function. Anything outside the table is an error, never a
/// silent no-op.
pub fn transition(
    from: ConfirmationStep,
    event: &ConfirmationEvent,
) -> Result<ConfirmationStep, TransitionError> {
    use ConfirmationEvent as E;
    use ConfirmationStep as S;

    let next = match (from, event) {
        (S::Preparing, E::DwellElapsed) => S::Revalidating,
        (S::Revalidating, E::ReshopSucceeded { fare_changed: false }) => S::Confirming,
        (S::Revalidating, E::ReshopSucceeded { fare_changed: true }) => S::FareUpdateRequired,
        (S::Revalidating, E::ReshopFailed) => S::Failed,
        (S::Confirming, E::DwellElapsed) => S::Finalizing,
        (S::Finalizing, E::ConfirmSucceeded) => S::Success,
        (S::Finalizing, E::ConfirmFailed) => S::Failed,
        (S::FareUpdateRequired, E::FareAccepted) => S::Finalizing,
        (from, event) => {
            return Err(TransitionError { from, event: format!("{:?}", event) });
        }
    };
    Ok(next)
}

// ============================================================================
// Pacing
// ============================================================================

/// Deliberate pacing between steps so the traveller perceives distinct
/// verification phases even when the supplier answers instantly. Layered on
/// top of the remote awaits, never interleaved with them, so setting the
/// dwell to zero changes timing but not call order.
#[derive(Debug, Clone, Copy)]
pub struct PacingPolicy {
    pub step_dwell: Duration,
    /// How long the success state lingers before the session closes itself.
    pub success_linger: Duration,
}

impl Default for PacingPolicy {
    fn default() -> Self {
        Self {
            step_dwell: Duration::from_millis(1000),
            success_linger: Duration::from_millis(2000),
        }
    }
}

impl PacingPolicy {
    /// Zero-dwell pacing for tests.
    pub fn instant() -> Self {
        Self { step_dwell: Duration::ZERO, success_linger: Duration::ZERO }
    }
}

// ============================================================================
// Session Plumbing
// ============================================================================

/// Progress snapshot published after every step change.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationProgress {
    pub step: ConfirmationStep,
    pub label: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fare_comparison: Option<FareComparison>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FareDecision {
    Accept,
    Decline,
}

/// How a session ended, for the supervisor that applies side effects.
#[derive(Debug)]
pub enum SessionOutcome {
    /// Confirm succeeded. Carries the refreshed order when the follow-up
    /// retrieve worked; the confirmation itself stands either way.
    Confirmed { refreshed: Option<OrderView> },
    /// Traveller declined the new fare: the reshopped order becomes the new
    /// local snapshot, unconfirmed.
    FareUpdateDeclined { adopted: OrderView },
    Failed { message: String },
    /// Closed by the traveller before reaching a terminal step.
    Dismissed,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("a confirmation session is already open for this order")]
    AlreadyOpen,
    #[error("no confirmation session is open for this order")]
    NotFound,
    #[error("the confirmation session has been closed")]
    Closed,
    #[error("another action is already in progress for this order")]
    ActionInProgress,
}

/// Caller-side handle to a running session: subscribe to progress, deliver
/// fare decisions, close.
#[derive(Clone)]
pub struct SessionHandle {
    progress: broadcast::Sender<ConfirmationProgress>,
    decisions: mpsc::Sender<FareDecision>,
    closed: Arc<watch::Sender<bool>>,
}

impl SessionHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<ConfirmationProgress> {
        self.progress.subscribe()
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Resolve an open fare-update prompt. Ignored (with an error) once the
    /// session is closed.
    pub async fn decide(&self, decision: FareDecision) -> Result<(), SessionError> {
        if self.is_closed() {
            return Err(SessionError::Closed);
        }
        self.decisions
            .send(decision)
            .await
            .map_err(|_| SessionError::Closed)
    }

    /// Mark the session closed. The driver observes the flag after its next
    /// await and discards whatever the in-flight call returns.
    pub fn close(&self) {
        let _ = self.closed.send(true);
    }
}

// ============================================================================
// Session Registry
// ============================================================================

/// At most one confirmation session per order, plus the shared
/// action-in-progress flag that also gates the cancel action.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, SessionHandle>>,
    actions: Mutex<HashMap<String, Arc<AtomicBool>>>,
}

/// Clears the per-order action flag when dropped.
pub struct ActionGuard {
    flag: Arc<AtomicBool>,
}

impl Drop for ActionGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the order's action flag. Fails while a confirm or cancel is
    /// already underway, which is what makes double-clicks harmless.
    pub fn try_begin_action(&self, order_reference: &str) -> Result<ActionGuard, SessionError> {
        let flag = {
            let mut actions = self.actions.lock().unwrap_or_else(|e| e.into_inner());
            actions
                .entry(order_reference.to_string())
                .or_insert_with(|| Arc::new(AtomicBool::new(false)))
                .clone()
        };
        if flag.swap(true, Ordering::SeqCst) {
            return Err(SessionError::ActionInProgress);
        }
        Ok(ActionGuard { flag })
    }

    /// Open a session for the order. Returns the caller handle plus the
    /// driver, which the caller is expected to spawn. Re-entrant opens while
    /// a live session exists are rejected before any remote call is issued.
    pub fn open(
        &self,
        order_reference: &str,
        previous_total: Option<i64>,
        api: Arc<dyn OrderDistribution>,
        pacing: PacingPolicy,
    ) -> Result<(SessionHandle, ConfirmationSession), SessionError> {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = sessions.get(order_reference) {
            if !existing.is_closed() {
                return Err(SessionError::AlreadyOpen);
            }
        }

        let (progress_tx, _) = broadcast::channel(16);
        let (decision_tx, decision_rx) = mpsc::channel(4);
        let (closed_tx, closed_rx) = watch::channel(false);

        let handle = SessionHandle {
            progress: progress_tx.clone(),
            decisions: decision_tx,
            closed: Arc::new(closed_tx),
        };
        sessions.insert(order_reference.to_string(), handle.clone());

        let session = ConfirmationSession {
            order_reference: order_reference.to_string(),
            previous_total,
            api,
            pacing,
            step: ConfirmationStep::Preparing,
            progress: progress_tx,
            decisions: decision_rx,
            closed: closed_rx,
        };
        Ok((handle, session))
    }

    pub fn handle(&self, order_reference: &str) -> Option<SessionHandle> {
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(order_reference)
            .cloned()
    }

    /// Close and forget the session for an order, discarding its state.
    pub fn close(&self, order_reference: &str) -> Result<(), SessionError> {
        let handle = self.handle(order_reference).ok_or(SessionError::NotFound)?;
        handle.close();
        Ok(())
    }

    /// Drop the registry entry once the driver has returned.
    pub fn finish(&self, order_reference: &str) {
        if let Some(handle) = self
            .sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(order_reference)
        {
            handle.close();
        }
    }
}

// ============================================================================
// Session Driver
// ============================================================================

/// One confirmation attempt. Owns the session state; remote calls are
/// strictly sequential, and the reshop result is always evaluated before a
/// confirm is ever issued.
pub struct ConfirmationSession {
    order_reference: String,
    previous_total: Option<i64>,
    api: Arc<dyn OrderDistribution>,
    pacing: PacingPolicy,
    step: ConfirmationStep,
    progress: broadcast::Sender<ConfirmationProgress>,
    decisions: mpsc::Receiver<FareDecision>,
    closed: watch::Receiver<bool>,
}

impl ConfirmationSession {
    pub async fn run(mut self) -> SessionOutcome {
        self.emit(None, None);

        // Preparing → Revalidating
        tokio::time::sleep(self.pacing.step_dwell).await;
        if self.is_closed() {
            return SessionOutcome::Dismissed;
        }
        self.advance(ConfirmationEvent::DwellElapsed);
        self.emit(None, None);

        // Revalidating: reshop and evaluate.
        let reshopped = self.api.reshop_order(&self.order_reference).await;
        if self.is_closed() {
            return SessionOutcome::Dismissed;
        }
        let reshopped = match reshopped {
            Ok(view) => view,
            Err(err) => {
                let message = err.user_message(REVALIDATE_FALLBACK_MESSAGE).to_string();
                return self.fail(ConfirmationEvent::ReshopFailed, message);
            }
        };

        if fare::reshop_fare_changed(self.previous_total, &reshopped) {
            self.advance(ConfirmationEvent::ReshopSucceeded { fare_changed: true });
            let comparison = fare::compare_totals(self.previous_total, reshopped.total_payable());
            self.emit(None, comparison);

            let decision = tokio::select! {
                decision = self.decisions.recv() => decision,
                _ = self.closed.changed() => None,
            };
            if self.is_closed() {
                return SessionOutcome::Dismissed;
            }
            match decision {
                Some(FareDecision::Accept) => {
                    self.advance(ConfirmationEvent::FareAccepted);
                }
                Some(FareDecision::Decline) => {
                    return SessionOutcome::FareUpdateDeclined { adopted: reshopped };
                }
                None => return SessionOutcome::Dismissed,
            }
        } else {
            self.advance(ConfirmationEvent::ReshopSucceeded { fare_changed: false });
            self.emit(None, None);
            tokio::time::sleep(self.pacing.step_dwell).await;
            if self.is_closed() {
                return SessionOutcome::Dismissed;
            }
            self.advance(ConfirmationEvent::DwellElapsed);
        }

        // Finalizing: the single confirm call of the session.
        self.emit(None, None);
        let confirmed = self.api.confirm_order(&self.order_reference).await;
        if self.is_closed() {
            return SessionOutcome::Dismissed;
        }
        match confirmed {
            Ok(()) => {
                self.advance(ConfirmationEvent::ConfirmSucceeded);
                self.emit(None, None);
                // Refresh for display; a failure here does not undo the
                // confirmation.
                let refreshed = self.api.retrieve_order(&self.order_reference).await.ok();
                tokio::time::sleep(self.pacing.success_linger).await;
                SessionOutcome::Confirmed { refreshed }
            }
            Err(err) => {
                let message = err.user_message(CONFIRM_FALLBACK_MESSAGE).to_string();
                self.fail(ConfirmationEvent::ConfirmFailed, message)
            }
        }
    }

    fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    fn advance(&mut self, event: ConfirmationEvent) {
        self.step = transition(self.step, &event).unwrap_or_else(|err| {
            tracing::error!(order_reference = %self.order_reference, %err, "confirmation state machine bug");
            ConfirmationStep::Failed
        });
    }

    fn fail(&mut self, event: ConfirmationEvent, message: String) -> SessionOutcome {
        self.advance(event);
        self.emit(Some(message.clone()), None);
        SessionOutcome::Failed { message }
    }

    fn emit(&self, error_message: Option<String>, fare_comparison: Option<FareComparison>) {
        let _ = self.progress.send(ConfirmationProgress {
            step: self.step,
            label: self.step.label(),
            error_message,
            fare_comparison,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockDistribution;
    use fareflow_core::ndc::RemoteError;
    use std::sync::atomic::Ordering;

    fn drain_steps(rx: &mut broadcast::Receiver<ConfirmationProgress>) -> Vec<ConfirmationStep> {
        let mut steps = Vec::new();
        while let Ok(progress) = rx.try_recv() {
            steps.push(progress.step);
        }
        steps
    }

    #[test]
    fn test_transition_table_happy_path() {
        use ConfirmationEvent as E;
        use ConfirmationStep as S;

        let mut step = S::Preparing;
        for event in [
            E::DwellElapsed,
            E::ReshopSucceeded { fare_changed: false },
            E::DwellElapsed,
            E::ConfirmSucceeded,
        ] {
            step = transition(step, &event).unwrap();
        }
        assert_eq!(step, S::Success);
        assert!(step.is_terminal());
    }

    #[test]
    fn test_transition_table_fare_update_path() {
        use ConfirmationEvent as E;
        use ConfirmationStep as S;

        let step = transition(S::Preparing, &E::DwellElapsed).unwrap();
        let step = transition(step, &E::ReshopSucceeded { fare_changed: true }).unwrap();
        assert_eq!(step, S::FareUpdateRequired);
        // The prompt never advances on its own.
        assert!(transition(step, &E::DwellElapsed).is_err());
        let step = transition(step, &E::FareAccepted).unwrap();
        assert_eq!(step, S::Finalizing);
    }

    #[test]
    fn test_illegal_transitions_are_rejected() {
        use ConfirmationEvent as E;
        use ConfirmationStep as S;

        assert!(transition(S::Preparing, &E::ConfirmSucceeded).is_err());
        assert!(transition(S::Success, &E::DwellElapsed).is_err());
        assert!(transition(S::Revalidating, &E::FareAccepted).is_err());
    }

    #[tokio::test]
    async fn test_unchanged_fare_runs_straight_through() {
        let mock = Arc::new(MockDistribution::on_hold(5000));
        mock.set_reshop_total(5000);
        let registry = SessionRegistry::new();
        let (handle, session) = registry
            .open("FF-1", Some(5000), mock.clone(), PacingPolicy::instant())
            .unwrap();
        let mut rx = handle.subscribe();

        let outcome = session.run().await;
        assert!(matches!(outcome, SessionOutcome::Confirmed { .. }));
        assert_eq!(mock.reshop_calls.load(Ordering::SeqCst), 1);
        assert_eq!(mock.confirm_calls.load(Ordering::SeqCst), 1);

        let steps = drain_steps(&mut rx);
        assert_eq!(
            steps,
            vec![
                ConfirmationStep::Preparing,
                ConfirmationStep::Revalidating,
                ConfirmationStep::Confirming,
                ConfirmationStep::Finalizing,
                ConfirmationStep::Success,
            ]
        );
    }

    #[tokio::test]
    async fn test_fare_change_waits_for_acceptance() {
        let mock = Arc::new(MockDistribution::on_hold(5000));
        mock.set_reshop_total(5500);
        let registry = SessionRegistry::new();
        let (handle, session) = registry
            .open("FF-2", Some(5000), mock.clone(), PacingPolicy::instant())
            .unwrap();
        let mut rx = handle.subscribe();

        let driver = tokio::spawn(session.run());

        // Wait for the prompt; no confirm may have been issued yet.
        loop {
            let progress = rx.recv().await.unwrap();
            if progress.step == ConfirmationStep::FareUpdateRequired {
                let comparison = progress.fare_comparison.unwrap();
                assert_eq!(comparison.previous_total, 5000);
                assert_eq!(comparison.latest_total, 5500);
                assert_eq!(comparison.formatted_difference(), "+500");
                break;
            }
        }
        assert_eq!(mock.confirm_calls.load(Ordering::SeqCst), 0);

        handle.decide(FareDecision::Accept).await.unwrap();
        let outcome = driver.await.unwrap();
        assert!(matches!(outcome, SessionOutcome::Confirmed { .. }));
        // One reshop and one confirm in total, not one per attempt.
        assert_eq!(mock.reshop_calls.load(Ordering::SeqCst), 1);
        assert_eq!(mock.confirm_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_declined_fare_update_adopts_snapshot_without_confirming() {
        let mock = Arc::new(MockDistribution::on_hold(5000));
        mock.set_reshop_total(5500);
        let registry = SessionRegistry::new();
        let (handle, session) = registry
            .open("FF-3", Some(5000), mock.clone(), PacingPolicy::instant())
            .unwrap();
        let mut rx = handle.subscribe();

        let driver = tokio::spawn(session.run());
        loop {
            if rx.recv().await.unwrap().step == ConfirmationStep::FareUpdateRequired {
                break;
            }
        }
        handle.decide(FareDecision::Decline).await.unwrap();

        match driver.await.unwrap() {
            SessionOutcome::FareUpdateDeclined { adopted } => {
                assert_eq!(adopted.total_payable().unwrap().total, 5500);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(mock.confirm_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_reshop_failure_reports_supplier_message() {
        let mock = Arc::new(MockDistribution::on_hold(5000));
        mock.fail_reshop(RemoteError {
            error_message: Some("Offer expired".into()),
            message: None,
            details: None,
        });
        let registry = SessionRegistry::new();
        let (_handle, session) = registry
            .open("FF-4", Some(5000), mock.clone(), PacingPolicy::instant())
            .unwrap();

        match session.run().await {
            SessionOutcome::Failed { message } => assert_eq!(message, "Offer expired"),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(mock.confirm_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_reshop_failure_without_message_uses_fallback() {
        let mock = Arc::new(MockDistribution::on_hold(5000));
        mock.fail_reshop(RemoteError::default());
        let registry = SessionRegistry::new();
        let (_handle, session) = registry
            .open("FF-5", Some(5000), mock.clone(), PacingPolicy::instant())
            .unwrap();

        match session.run().await {
            SessionOutcome::Failed { message } => {
                assert_eq!(message, REVALIDATE_FALLBACK_MESSAGE);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_close_during_fare_prompt_dismisses_session() {
        let mock = Arc::new(MockDistribution::on_hold(5000));
        mock.set_reshop_total(5500);
        let registry = SessionRegistry::new();
        let (handle, session) = registry
            .open("FF-6", Some(5000), mock.clone(), PacingPolicy::instant())
            .unwrap();
        let mut rx = handle.subscribe();

        let driver = tokio::spawn(session.run());
        loop {
            if rx.recv().await.unwrap().step == ConfirmationStep::FareUpdateRequired {
                break;
            }
        }
        registry.close("FF-6").unwrap();

        assert!(matches!(driver.await.unwrap(), SessionOutcome::Dismissed));
        assert_eq!(mock.confirm_calls.load(Ordering::SeqCst), 0);
        assert!(handle.decide(FareDecision::Accept).await.is_err());
    }

    #[tokio::test]
    async fn test_second_open_is_rejected_while_session_live() {
        let mock = Arc::new(MockDistribution::on_hold(5000));
        let registry = SessionRegistry::new();
        let (_handle, _session) = registry
            .open("FF-7", Some(5000), mock.clone(), PacingPolicy::instant())
            .unwrap();

        let second = registry.open("FF-7", Some(5000), mock.clone(), PacingPolicy::instant());
        assert!(matches!(second, Err(SessionError::AlreadyOpen)));
        // Nothing remote happened for the rejected open.
        assert_eq!(mock.reshop_calls.load(Ordering::SeqCst), 0);

        // Once finished, the order can be confirmed again.
        registry.finish("FF-7");
        assert!(registry
            .open("FF-7", Some(5000), mock, PacingPolicy::instant())
            .is_ok());
    }

    #[test]
    fn test_action_flag_blocks_concurrent_actions() {
        let registry = SessionRegistry::new();
        let guard = registry.try_begin_action("FF-8").unwrap();
        assert!(matches!(
            registry.try_begin_action("FF-8"),
            Err(SessionError::ActionInProgress)
        ));
        drop(guard);
        assert!(registry.try_begin_action("FF-8").is_ok());
    }
}
