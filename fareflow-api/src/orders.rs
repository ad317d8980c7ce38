use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use fareflow_core::ndc::OrderView;
use fareflow_core::repository::CachedOrder;
use fareflow_order::fare::FareComparison;
use fareflow_order::models::OrderDisplay;
use fareflow_order::sell::{BookingDraft, BookingOutcome, SellPipeline};
use fareflow_order::status;
use fareflow_shared::models::events::{
    FareChangeDetectedEvent, OrderCancelledEvent, OrderCreatedEvent,
};
use serde::Serialize;
use std::sync::atomic::Ordering;
use crate::error::AppError;
use crate::state::AppState;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingView {
    pub display: OrderDisplay,
    pub order: OrderView,
}

#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum CreateBookingResponse {
    #[serde(rename_all = "camelCase")]
    Created { booking: BookingView, celebrate: bool },
    #[serde(rename_all = "camelCase")]
    PriceChanged {
        fare_comparison: Option<FareComparison>,
        latest_total: Option<i64>,
    },
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /v1/bookings
/// First-time booking: sell, gate on price drift, create, persist.
pub async fn create_booking(
    State(state): State<AppState>,
    Json(draft): Json<BookingDraft>,
) -> Result<(StatusCode, Json<CreateBookingResponse>), AppError> {
    if draft.offer_id.is_empty() {
        return Err(AppError::Validation("At least one offer id is required".to_string()));
    }
    if draft.passengers.is_empty() {
        return Err(AppError::Validation("At least one passenger is required".to_string()));
    }

    let pipeline = SellPipeline::new(
        state.distribution.clone(),
        state.bookings.clone(),
        state.store.clone(),
        state.rules.created_by.clone(),
    );

    match pipeline.submit(&draft).await? {
        BookingOutcome::Created(booking) => {
            let created = *booking;
            let order_reference = created.order.order_reference.clone();
            let total = created.order.total_payable();
            state
                .kafka
                .publish_event(
                    "order.created",
                    &order_reference,
                    &OrderCreatedEvent {
                        order_reference: order_reference.clone(),
                        trace_id: draft.trace_id.clone(),
                        total: total.map(|t| t.total).unwrap_or_default(),
                        currency: total.map(|t| t.currency.clone()).unwrap_or_default(),
                        fare_type: created.order.fare_type().map(str::to_string),
                        timestamp: Utc::now().timestamp(),
                    },
                )
                .await;

            // Instant-issue fares settle asynchronously; keep an eye on them.
            state.ensure_poller(&created.order);

            let display =
                OrderDisplay::project(&created.order, Some(created.responded_on), Utc::now());
            Ok((
                StatusCode::CREATED,
                Json(CreateBookingResponse::Created {
                    booking: BookingView { display, order: created.order },
                    celebrate: created.celebrate,
                }),
            ))
        }
        BookingOutcome::PriceChanged { comparison, latest_total } => {
            if let Some(comparison) = &comparison {
                state
                    .kafka
                    .publish_event(
                        "order.fare-changed",
                        &draft.trace_id,
                        &FareChangeDetectedEvent {
                            subject: draft.trace_id.clone(),
                            previous_total: comparison.previous_total,
                            latest_total: comparison.latest_total,
                            currency: comparison.currency.clone(),
                            timestamp: Utc::now().timestamp(),
                        },
                    )
                    .await;
            }
            Ok((
                StatusCode::OK,
                Json(CreateBookingResponse::PriceChanged { fare_comparison: comparison, latest_total }),
            ))
        }
    }
}

/// GET /v1/bookings/{order_reference}
/// Current order snapshot with the derived display status.
pub async fn get_booking(
    State(state): State<AppState>,
    Path(order_reference): Path<String>,
) -> Result<Json<BookingView>, AppError> {
    let gate = state.refresh_gate(&order_reference);

    let order = if gate.swap(true, Ordering::SeqCst) {
        // A background re-check holds the refresh flag; serve the cached
        // snapshot instead of double-fetching.
        match state.store.get_snapshot(&order_reference).await {
            Ok(Some(cached)) => cached.snapshot,
            _ => state.distribution.retrieve_order(&order_reference).await?,
        }
    } else {
        let fetched = state.distribution.retrieve_order(&order_reference).await;
        gate.store(false, Ordering::SeqCst);
        let view = fetched?;
        let previous = state.store.get_snapshot(&order_reference).await.ok().flatten();
        if let Err(err) = state
            .store
            .put_snapshot(&CachedOrder::refreshed(view.clone(), previous.as_ref()))
            .await
        {
            tracing::warn!(order_reference = %order_reference, error = %err, "failed to cache order snapshot");
        }
        view
    };

    state.ensure_poller(&order);

    let created_on = state.store.get_created_on(&order_reference).await.ok().flatten();
    let display = OrderDisplay::project(&order, created_on, Utc::now());
    Ok(Json(BookingView { display, order }))
}

/// POST /v1/bookings/{order_reference}/cancel
/// Cancel a live hold.
pub async fn cancel_booking(
    State(state): State<AppState>,
    Path(order_reference): Path<String>,
) -> Result<StatusCode, AppError> {
    if let Some(handle) = state.sessions.handle(&order_reference) {
        if !handle.is_closed() {
            return Err(AppError::Conflict(
                "A confirmation is in progress for this order".to_string(),
            ));
        }
    }
    let _guard = state
        .sessions
        .try_begin_action(&order_reference)
        .map_err(|err| AppError::Conflict(err.to_string()))?;

    let order = state.distribution.retrieve_order(&order_reference).await?;
    if !status::hold_actions_enabled(&order, Utc::now()) {
        return Err(AppError::Conflict("This booking can no longer be cancelled".to_string()));
    }

    state.distribution.cancel_order(&order_reference).await?;
    tracing::info!(order_reference = %order_reference, "order cancelled");

    if let Ok(view) = state.distribution.retrieve_order(&order_reference).await {
        let previous = state.store.get_snapshot(&order_reference).await.ok().flatten();
        let _ = state.store.put_snapshot(&CachedOrder::refreshed(view, previous.as_ref())).await;
    }
    state.drop_poller(&order_reference);

    state
        .kafka
        .publish_event(
            "order.cancelled",
            &order_reference,
            &OrderCancelledEvent {
                order_reference: order_reference.clone(),
                timestamp: Utc::now().timestamp(),
            },
        )
        .await;

    Ok(StatusCode::NO_CONTENT)
}
