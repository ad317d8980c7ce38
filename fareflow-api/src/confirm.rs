use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use chrono::Utc;
use fareflow_core::repository::CachedOrder;
use fareflow_order::confirmation::{FareDecision, SessionOutcome};
use fareflow_order::status;
use fareflow_shared::models::events::{FareChangeDetectedEvent, OrderConfirmedEvent};
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use tokio_stream::wrappers::BroadcastStream;
use uuid::Uuid;
use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenConfirmationResponse {
    /// Correlation id for logs; the session itself is addressed by order
    /// reference.
    pub session_id: Uuid,
    pub stream_path: String,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DecisionAction {
    Accept,
    Decline,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionRequest {
    pub action: DecisionAction,
}

/// POST /v1/bookings/{order_reference}/confirmation
/// Open a confirmation session and start driving it.
pub async fn open_confirmation(
    State(state): State<AppState>,
    Path(order_reference): Path<String>,
) -> Result<(StatusCode, Json<OpenConfirmationResponse>), AppError> {
    // The shared action flag also covers cancel, so a double-click cannot
    // race two actions for the same order.
    let _guard = state
        .sessions
        .try_begin_action(&order_reference)
        .map_err(|err| AppError::Conflict(err.to_string()))?;

    let order = match state.store.get_snapshot(&order_reference).await {
        Ok(Some(cached)) => cached.snapshot,
        _ => state.distribution.retrieve_order(&order_reference).await?,
    };
    if !status::hold_actions_enabled(&order, Utc::now()) {
        return Err(AppError::Conflict("This booking can no longer be confirmed".to_string()));
    }
    let previous_total = order.total_payable().map(|t| t.total);

    let (_handle, session) = state
        .sessions
        .open(&order_reference, previous_total, state.distribution.clone(), state.pacing())
        .map_err(|err| AppError::Conflict(err.to_string()))?;

    let session_id = Uuid::new_v4();
    tracing::info!(order_reference = %order_reference, session_id = %session_id, "confirmation session opened");

    let supervisor = state.clone();
    let reference = order_reference.clone();
    tokio::spawn(async move {
        let outcome = session.run().await;
        apply_outcome(&supervisor, &reference, outcome).await;
        supervisor.sessions.finish(&reference);
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(OpenConfirmationResponse {
            session_id,
            stream_path: format!("/v1/bookings/{}/confirmation/stream", order_reference),
        }),
    ))
}

/// Apply a finished session's side effects. The driver itself never touches
/// shared state, so a dismissed session leaves no trace.
async fn apply_outcome(state: &AppState, order_reference: &str, outcome: SessionOutcome) {
    match outcome {
        SessionOutcome::Confirmed { refreshed } => {
            let view = match refreshed {
                Some(view) => Some(view),
                None => state.distribution.retrieve_order(order_reference).await.ok(),
            };
            let total = view.as_ref().and_then(|v| v.total_payable().cloned());
            if let Some(view) = view {
                let previous = state.store.get_snapshot(order_reference).await.ok().flatten();
                if let Err(err) = state
                    .store
                    .put_snapshot(&CachedOrder::refreshed(view, previous.as_ref()))
                    .await
                {
                    tracing::warn!(order_reference = %order_reference, error = %err, "failed to cache confirmed order");
                }
            }
            state.drop_poller(order_reference);
            state
                .kafka
                .publish_event(
                    "order.confirmed",
                    order_reference,
                    &OrderConfirmedEvent {
                        order_reference: order_reference.to_string(),
                        total: total.as_ref().map(|t| t.total).unwrap_or_default(),
                        currency: total.map(|t| t.currency).unwrap_or_default(),
                        timestamp: Utc::now().timestamp(),
                    },
                )
                .await;
        }
        SessionOutcome::FareUpdateDeclined { adopted } => {
            // Adopt the reshopped order as the new local snapshot, marked
            // unconfirmed; the order itself stays on hold remotely.
            let comparison = adopted.total_payable().cloned();
            let previous = state.store.get_snapshot(order_reference).await.ok().flatten();
            let record = match &previous {
                Some(existing) => existing.adopt_unconfirmed(adopted),
                None => CachedOrder {
                    snapshot: adopted,
                    revision: 1,
                    pending_confirmation: true,
                    cached_at: Utc::now(),
                },
            };
            if let Err(err) = state.store.put_snapshot(&record).await {
                tracing::warn!(order_reference = %order_reference, error = %err, "failed to adopt reshopped order");
            }
            if let (Some(previous), Some(latest)) = (
                previous.as_ref().and_then(|p| p.snapshot.total_payable().map(|t| t.total)),
                comparison,
            ) {
                state
                    .kafka
                    .publish_event(
                        "order.fare-changed",
                        order_reference,
                        &FareChangeDetectedEvent {
                            subject: order_reference.to_string(),
                            previous_total: previous,
                            latest_total: latest.total,
                            currency: latest.currency,
                            timestamp: Utc::now().timestamp(),
                        },
                    )
                    .await;
            }
        }
        SessionOutcome::Failed { message } => {
            tracing::warn!(order_reference = %order_reference, message = %message, "confirmation session failed");
        }
        SessionOutcome::Dismissed => {
            tracing::debug!(order_reference = %order_reference, "confirmation session dismissed");
        }
    }
}

/// GET /v1/bookings/{order_reference}/confirmation/stream
/// Server-sent progress events for the open session.
pub async fn confirmation_stream(
    State(state): State<AppState>,
    Path(order_reference): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let handle = state.sessions.handle(&order_reference).ok_or_else(|| {
        AppError::NotFound("No confirmation session is open for this order".to_string())
    })?;

    let stream = BroadcastStream::new(handle.subscribe()).filter_map(|result| async move {
        match result {
            Ok(progress) => match Event::default().event("progress").json_data(&progress) {
                Ok(event) => Some(Ok::<_, Infallible>(event)),
                Err(_) => None,
            },
            // Lagged receivers just miss the dropped frames.
            Err(_) => None,
        }
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// POST /v1/bookings/{order_reference}/confirmation/decision
/// Resolve an open fare-update prompt.
pub async fn submit_decision(
    State(state): State<AppState>,
    Path(order_reference): Path<String>,
    Json(request): Json<DecisionRequest>,
) -> Result<StatusCode, AppError> {
    let handle = state.sessions.handle(&order_reference).ok_or_else(|| {
        AppError::NotFound("No confirmation session is open for this order".to_string())
    })?;

    let decision = match request.action {
        DecisionAction::Accept => FareDecision::Accept,
        DecisionAction::Decline => FareDecision::Decline,
    };
    handle.decide(decision).await.map_err(|err| AppError::Conflict(err.to_string()))?;
    Ok(StatusCode::ACCEPTED)
}

/// DELETE /v1/bookings/{order_reference}/confirmation
/// Close the session and discard its state; any in-flight remote call
/// completes unobserved.
pub async fn close_confirmation(
    State(state): State<AppState>,
    Path(order_reference): Path<String>,
) -> Result<StatusCode, AppError> {
    state
        .sessions
        .close(&order_reference)
        .map_err(|err| AppError::NotFound(err.to_string()))?;
    tracing::info!(order_reference = %order_reference, "confirmation session closed by traveller");
    Ok(StatusCode::NO_CONTENT)
}
