use crate::ndc::OrderView;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Durable booking record written after a successful create.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingRecord {
    pub order_reference: String,
    /// Full create response payload.
    pub payload: serde_json::Value,
    pub responded_on: DateTime<Utc>,
    pub created_by: String,
}

/// Locally cached order snapshot. Replaced wholesale, never mutated in
/// place: adopting a reshopped order bumps the revision and marks the
/// snapshot as awaiting confirmation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedOrder {
    pub snapshot: OrderView,
    pub revision: u64,
    pub pending_confirmation: bool,
    pub cached_at: DateTime<Utc>,
}

impl CachedOrder {
    pub fn fresh(snapshot: OrderView) -> Self {
        Self {
            snapshot,
            revision: 1,
            pending_confirmation: false,
            cached_at: Utc::now(),
        }
    }

    /// Next revision of this cache entry holding an adopted reshop result
    /// that the traveller has not confirmed yet.
    pub fn adopt_unconfirmed(&self, snapshot: OrderView) -> Self {
        Self {
            snapshot,
            revision: self.revision + 1,
            pending_confirmation: true,
            cached_at: Utc::now(),
        }
    }

    /// Next revision holding a freshly retrieved snapshot.
    pub fn refreshed(snapshot: OrderView, previous: Option<&CachedOrder>) -> Self {
        Self {
            snapshot,
            revision: previous.map(|p| p.revision + 1).unwrap_or(1),
            pending_confirmation: false,
            cached_at: Utc::now(),
        }
    }
}

/// Repository trait for booking history writes.
#[async_trait]
pub trait BookingRepository: Send + Sync {
    /// Rich save: full payload keyed by order reference.
    async fn save_booking(
        &self,
        record: &BookingRecord,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Minimal fallback save: order reference only. Attempted when the rich
    /// save fails so history never silently loses a created order.
    async fn save_booking_reference(
        &self,
        order_reference: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Key–value store for the engine's local state: snapshot cache, created-on
/// timestamps, the one-time celebration guard and traveller sync ids.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn put_snapshot(
        &self,
        record: &CachedOrder,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    async fn get_snapshot(
        &self,
        order_reference: &str,
    ) -> Result<Option<CachedOrder>, Box<dyn std::error::Error + Send + Sync>>;

    async fn record_created_on(
        &self,
        order_reference: &str,
        created_on: DateTime<Utc>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    async fn get_created_on(
        &self,
        order_reference: &str,
    ) -> Result<Option<DateTime<Utc>>, Box<dyn std::error::Error + Send + Sync>>;

    /// Claim the one-time success celebration for an order reference.
    /// Returns true for the first caller only, across reloads and redirects.
    async fn claim_celebration(
        &self,
        order_reference: &str,
    ) -> Result<bool, Box<dyn std::error::Error + Send + Sync>>;

    /// Persisted traveller id for a passenger index, scoped by trace id and
    /// offer id, so repeated sells update instead of duplicating profiles.
    async fn get_traveller_id(
        &self,
        trace_id: &str,
        offer_id: &str,
        pax_index: usize,
    ) -> Result<Option<String>, Box<dyn std::error::Error + Send + Sync>>;

    async fn set_traveller_id(
        &self,
        trace_id: &str,
        offer_id: &str,
        pax_index: usize,
        traveller_id: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}
