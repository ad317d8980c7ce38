use crate::fare::{self, FareComparison};
use chrono::{DateTime, NaiveDate, Utc};
use fareflow_core::distribution::{DistributionError, OrderDistribution};
use fareflow_core::ndc::{
    ContactInfo, CreatedOrder, LoyaltyProgramAccount, OrderSellRequest, OrderView, Pax,
    SellPayload, ServiceSelection, SpecialServiceRequest, TravelDocument,
};
use fareflow_core::repository::{BookingRecord, BookingRepository, CachedOrder, SessionStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Codes accepted even when the offer does not list them. Suppliers are
/// expected to honour these industry-standard requests.
pub const FALLBACK_SSR_CODES: &[&str] = &[
    "WCHR", "WCHS", "WCHC", "BLND", "DEAF", "DPNA", "MAAS", "UMNR", "FQTV", "VGML",
];

pub const FREQUENT_FLYER_CODE: &str = "FQTV";

// ============================================================================
// Service Request Screening
// ============================================================================

/// A special-service request as entered on the passenger form.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRequestInput {
    pub code: String,
    #[serde(default)]
    pub free_text: Option<String>,
    /// Frequent-flyer account number; only meaningful with code FQTV.
    #[serde(default)]
    pub loyalty_account: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SsrRejectionReason {
    /// Not 3–5 ASCII alphanumerics.
    MalformedCode,
    /// Neither offered by the supplier nor on the fallback allow-list.
    CodeNotPermitted,
    MissingLoyaltyAccount,
    NonNumericLoyaltyAccount,
}

#[derive(Debug, Clone, Serialize)]
pub struct RejectedSsr {
    pub code: String,
    pub reason: SsrRejectionReason,
}

/// Screening result: what goes on the wire and what was dropped, with
/// reasons, so callers can assert on the filtering instead of trusting a
/// log line.
#[derive(Debug, Default)]
pub struct ScreenedServices {
    pub ssrs: Vec<SpecialServiceRequest>,
    pub loyalty_programs: Vec<LoyaltyProgramAccount>,
    pub rejected: Vec<RejectedSsr>,
}

/// Filter service requests before they are sent upstream. An invalid code
/// would fail the whole order, so anything questionable is dropped here.
pub fn screen_service_requests(
    inputs: &[ServiceRequestInput],
    offer_codes: &[String],
) -> ScreenedServices {
    let mut outcome = ScreenedServices::default();

    for input in inputs {
        let code = input.code.trim().to_uppercase();

        let well_formed =
            (3..=5).contains(&code.len()) && code.chars().all(|c| c.is_ascii_alphanumeric());
        if !well_formed {
            outcome.rejected.push(RejectedSsr {
                code: input.code.clone(),
                reason: SsrRejectionReason::MalformedCode,
            });
            continue;
        }

        let permitted = offer_codes.iter().any(|c| c.trim().eq_ignore_ascii_case(&code))
            || FALLBACK_SSR_CODES.contains(&code.as_str());
        if !permitted {
            outcome.rejected.push(RejectedSsr {
                code,
                reason: SsrRejectionReason::CodeNotPermitted,
            });
            continue;
        }

        if code == FREQUENT_FLYER_CODE {
            // The account number travels in the loyalty block, never as a
            // free-text remark.
            let account = input.loyalty_account.as_deref().map(str::trim).unwrap_or("");
            if account.is_empty() {
                outcome.rejected.push(RejectedSsr {
                    code,
                    reason: SsrRejectionReason::MissingLoyaltyAccount,
                });
            } else if !account.chars().all(|c| c.is_ascii_digit()) {
                outcome.rejected.push(RejectedSsr {
                    code,
                    reason: SsrRejectionReason::NonNumericLoyaltyAccount,
                });
            } else {
                outcome.loyalty_programs.push(LoyaltyProgramAccount {
                    program_owner: None,
                    account_number: account.to_string(),
                });
            }
            continue;
        }

        outcome.ssrs.push(SpecialServiceRequest { code, free_text: input.free_text.clone() });
    }

    outcome
}

// ============================================================================
// Booking Draft
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PassengerInput {
    /// Passenger type code: ADT, CHD, INF.
    pub ptc: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(default)]
    pub document: Option<TravelDocument>,
    #[serde(default)]
    pub service_requests: Vec<ServiceRequestInput>,
    #[serde(default)]
    pub services: Vec<ServiceSelection>,
}

/// Everything the traveller entered, plus the pricing context of the offer
/// being booked.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingDraft {
    pub trace_id: String,
    pub offer_id: Vec<String>,
    pub contact_info: ContactInfo,
    pub passengers: Vec<PassengerInput>,
    /// Codes the offer itself declared sellable.
    #[serde(default)]
    pub offer_ssr_codes: Vec<String>,
    /// Price the traveller last saw, in minor units.
    #[serde(default)]
    pub last_known_total: Option<i64>,
    /// Set on resubmission after the traveller accepted a changed price.
    #[serde(default)]
    pub accept_new_price: bool,
}

// ============================================================================
// Pipeline
// ============================================================================

#[derive(Debug)]
pub struct CreatedBooking {
    pub order: OrderView,
    pub responded_on: DateTime<Utc>,
    /// True exactly once per order reference, across reloads.
    pub celebrate: bool,
    pub rejected_services: Vec<RejectedSsr>,
}

#[derive(Debug)]
pub enum BookingOutcome {
    Created(Box<CreatedBooking>),
    /// Sell priced the offer differently; nothing was committed and the
    /// draft stays valid for resubmission with `accept_new_price`.
    PriceChanged {
        comparison: Option<FareComparison>,
        latest_total: Option<i64>,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Distribution(#[from] DistributionError),
}

/// First-time booking path: validate through sell, gate on price drift,
/// commit through create, then persist. Persistence problems degrade, they
/// never fail a booking the supplier already created.
pub struct SellPipeline {
    api: Arc<dyn OrderDistribution>,
    bookings: Arc<dyn BookingRepository>,
    store: Arc<dyn SessionStore>,
    created_by: String,
}

impl SellPipeline {
    pub fn new(
        api: Arc<dyn OrderDistribution>,
        bookings: Arc<dyn BookingRepository>,
        store: Arc<dyn SessionStore>,
        created_by: impl Into<String>,
    ) -> Self {
        Self { api, bookings, store, created_by: created_by.into() }
    }

    pub async fn submit(&self, draft: &BookingDraft) -> Result<BookingOutcome, PipelineError> {
        let (request, rejected_services) = self.assemble_request(draft).await;

        let preview = self.api.sell_order(&request).await?;
        let latest_total = preview.total_payable.as_ref().map(|t| t.total);
        let changed = fare::has_fare_changed(
            draft.last_known_total,
            latest_total,
            preview.order_change_info.as_ref(),
        );
        if changed && !draft.accept_new_price {
            tracing::info!(
                trace_id = %draft.trace_id,
                previous = ?draft.last_known_total,
                latest = ?latest_total,
                "sell repriced the offer, waiting for traveller acceptance"
            );
            return Ok(BookingOutcome::PriceChanged {
                comparison: fare::compare_totals(
                    draft.last_known_total,
                    preview.total_payable.as_ref(),
                ),
                latest_total,
            });
        }

        let created = self.api.create_order(&request).await?;
        let reference = created.order.order_reference.clone();
        tracing::info!(order_reference = %reference, trace_id = %draft.trace_id, "order created");

        let offer_scope = draft.offer_id.first().map(String::as_str).unwrap_or("");
        self.record_traveller_sync(&draft.trace_id, offer_scope, &created.order).await;
        self.persist_booking(&created).await;

        if let Err(err) = self.store.record_created_on(&reference, created.responded_on).await {
            tracing::warn!(order_reference = %reference, error = %err, "failed to record creation timestamp");
        }
        if let Err(err) = self.store.put_snapshot(&CachedOrder::fresh(created.order.clone())).await
        {
            tracing::warn!(order_reference = %reference, error = %err, "failed to cache created order");
        }
        let celebrate = match self.store.claim_celebration(&reference).await {
            Ok(first) => first,
            Err(err) => {
                tracing::warn!(order_reference = %reference, error = %err, "celebration guard unavailable");
                false
            }
        };

        Ok(BookingOutcome::Created(Box::new(CreatedBooking {
            order: created.order,
            responded_on: created.responded_on,
            celebrate,
            rejected_services,
        })))
    }

    async fn assemble_request(
        &self,
        draft: &BookingDraft,
    ) -> (OrderSellRequest, Vec<RejectedSsr>) {
        let offer_scope = draft.offer_id.first().map(String::as_str).unwrap_or("");
        let mut rejected_all = Vec::new();
        let mut pax_list = Vec::with_capacity(draft.passengers.len());

        for (index, passenger) in draft.passengers.iter().enumerate() {
            let screened =
                screen_service_requests(&passenger.service_requests, &draft.offer_ssr_codes);
            for rejection in &screened.rejected {
                tracing::warn!(
                    trace_id = %draft.trace_id,
                    pax_index = index,
                    code = %rejection.code,
                    reason = ?rejection.reason,
                    "dropping service request before sell"
                );
            }

            let pax_id = match self.store.get_traveller_id(&draft.trace_id, offer_scope, index).await
            {
                Ok(id) => id,
                Err(err) => {
                    tracing::warn!(trace_id = %draft.trace_id, pax_index = index, error = %err, "traveller sync lookup failed");
                    None
                }
            };

            pax_list.push(Pax {
                pax_id,
                ptc: passenger.ptc.clone(),
                first_name: passenger.first_name.clone(),
                last_name: passenger.last_name.clone(),
                date_of_birth: passenger.date_of_birth,
                document: passenger.document.clone(),
                ssr: screened.ssrs,
                loyalty_programs: screened.loyalty_programs,
                services: passenger.services.clone(),
            });
            rejected_all.extend(screened.rejected);
        }

        let request = OrderSellRequest {
            trace_id: draft.trace_id.clone(),
            offer_id: draft.offer_id.clone(),
            request: SellPayload { contact_info: draft.contact_info.clone(), pax_list },
        };
        (request, rejected_all)
    }

    /// Remember supplier-assigned traveller ids per passenger index so a
    /// repeated sell updates the same profiles.
    async fn record_traveller_sync(&self, trace_id: &str, offer_id: &str, order: &OrderView) {
        for (index, pax) in order.pax_list.iter().enumerate() {
            if let Some(traveller_id) = &pax.pax_id {
                if let Err(err) =
                    self.store.set_traveller_id(trace_id, offer_id, index, traveller_id).await
                {
                    tracing::warn!(trace_id = %trace_id, pax_index = index, error = %err, "failed to persist traveller id");
                }
            }
        }
    }

    async fn persist_booking(&self, created: &CreatedOrder) {
        let reference = &created.order.order_reference;
        let payload = match serde_json::to_value(&created.order) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(order_reference = %reference, error = %err, "could not serialize create response");
                serde_json::Value::Null
            }
        };
        let record = BookingRecord {
            order_reference: reference.clone(),
            payload,
            responded_on: created.responded_on,
            created_by: self.created_by.clone(),
        };
        if let Err(err) = self.bookings.save_booking(&record).await {
            tracing::warn!(order_reference = %reference, error = %err, "rich booking save failed, falling back to minimal save");
            if let Err(err) = self.bookings.save_booking_reference(reference).await {
                tracing::warn!(order_reference = %reference, error = %err, "minimal booking save failed");
            }
        }
    }
}
