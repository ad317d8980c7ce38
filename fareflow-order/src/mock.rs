//! In-memory stand-ins for the remote distribution system and the stores,
//! used by this crate's tests and by local development of the API surface.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fareflow_core::distribution::{DistributionError, OrderDistribution};
use fareflow_core::ndc::{
    CreatedOrder, OrderItem, OrderPreview, OrderSellRequest, OrderView, Price, RemoteError,
    TotalPayable,
};
use fareflow_core::repository::{BookingRecord, BookingRepository, CachedOrder, SessionStore};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

/// Build a one-item order snapshot.
pub fn order_view(reference: &str, status: &str, fare_type: &str, total: i64) -> OrderView {
    OrderView {
        order_reference: reference.to_string(),
        order_status: status.to_string(),
        payment_time_limit: None,
        order_item: vec![OrderItem {
            fare_type: Some(fare_type.to_string()),
            price: Some(Price {
                total_payable: TotalPayable { total, currency: "INR".to_string() },
            }),
        }],
        order_change_info: None,
        pax_list: vec![],
        contact_info: None,
        created_on: None,
    }
}

/// Scriptable distribution client with per-operation call counters.
pub struct MockDistribution {
    base: Mutex<OrderView>,
    retrieve_queue: Mutex<VecDeque<OrderView>>,
    reshop_view: Mutex<Option<OrderView>>,
    reshop_error: Mutex<Option<RemoteError>>,
    confirm_error: Mutex<Option<RemoteError>>,
    sell_preview: Mutex<Option<OrderPreview>>,
    sell_error: Mutex<Option<RemoteError>>,
    create_error: Mutex<Option<RemoteError>>,
    pub last_sell_request: Mutex<Option<OrderSellRequest>>,
    pub retrieve_calls: AtomicUsize,
    pub reshop_calls: AtomicUsize,
    pub confirm_calls: AtomicUsize,
    pub cancel_calls: AtomicUsize,
    pub sell_calls: AtomicUsize,
    pub create_calls: AtomicUsize,
}

impl MockDistribution {
    pub fn new(base: OrderView) -> Self {
        Self {
            base: Mutex::new(base),
            retrieve_queue: Mutex::new(VecDeque::new()),
            reshop_view: Mutex::new(None),
            reshop_error: Mutex::new(None),
            confirm_error: Mutex::new(None),
            sell_preview: Mutex::new(None),
            sell_error: Mutex::new(None),
            create_error: Mutex::new(None),
            last_sell_request: Mutex::new(None),
            retrieve_calls: AtomicUsize::new(0),
            reshop_calls: AtomicUsize::new(0),
            confirm_calls: AtomicUsize::new(0),
            cancel_calls: AtomicUsize::new(0),
            sell_calls: AtomicUsize::new(0),
            create_calls: AtomicUsize::new(0),
        }
    }

    /// A plain on-hold order priced at `total`.
    pub fn on_hold(total: i64) -> Self {
        Self::new(order_view("FF-MOCK1", "OnHold", "regular", total))
    }

    /// Script the reshop response to reprice the base order.
    pub fn set_reshop_total(&self, total: i64) {
        let mut view = self.base.lock().unwrap().clone();
        if let Some(item) = view.order_item.first_mut() {
            item.price = Some(Price {
                total_payable: TotalPayable { total, currency: "INR".to_string() },
            });
        }
        *self.reshop_view.lock().unwrap() = Some(view);
    }

    /// Script the reshop response to carry a change-info marker.
    pub fn set_reshop_change_info(&self, info: serde_json::Value) {
        let mut slot = self.reshop_view.lock().unwrap();
        let mut view = slot.take().unwrap_or_else(|| self.base.lock().unwrap().clone());
        view.order_change_info = Some(info);
        *slot = Some(view);
    }

    pub fn fail_reshop(&self, error: RemoteError) {
        *self.reshop_error.lock().unwrap() = Some(error);
    }

    pub fn fail_confirm(&self, error: RemoteError) {
        *self.confirm_error.lock().unwrap() = Some(error);
    }

    pub fn fail_sell(&self, error: RemoteError) {
        *self.sell_error.lock().unwrap() = Some(error);
    }

    pub fn fail_create(&self, error: RemoteError) {
        *self.create_error.lock().unwrap() = Some(error);
    }

    pub fn set_sell_preview(&self, preview: OrderPreview) {
        *self.sell_preview.lock().unwrap() = Some(preview);
    }

    /// Queue a snapshot to be served by the next retrieve; the base snapshot
    /// is served once the queue is drained.
    pub fn queue_retrieve(&self, view: OrderView) {
        self.retrieve_queue.lock().unwrap().push_back(view);
    }
}

#[async_trait]
impl OrderDistribution for MockDistribution {
    async fn retrieve_order(&self, _order_reference: &str) -> Result<OrderView, DistributionError> {
        self.retrieve_calls.fetch_add(1, Ordering::SeqCst);
        let queued = self.retrieve_queue.lock().unwrap().pop_front();
        Ok(queued.unwrap_or_else(|| self.base.lock().unwrap().clone()))
    }

    async fn reshop_order(&self, _order_reference: &str) -> Result<OrderView, DistributionError> {
        self.reshop_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.reshop_error.lock().unwrap().clone() {
            return Err(DistributionError::Api(error));
        }
        let scripted = self.reshop_view.lock().unwrap().clone();
        Ok(scripted.unwrap_or_else(|| self.base.lock().unwrap().clone()))
    }

    async fn confirm_order(&self, _order_reference: &str) -> Result<(), DistributionError> {
        self.confirm_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.confirm_error.lock().unwrap().clone() {
            return Err(DistributionError::Api(error));
        }
        self.base.lock().unwrap().order_status = "Confirmed".to_string();
        Ok(())
    }

    async fn cancel_order(&self, _order_reference: &str) -> Result<(), DistributionError> {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        self.base.lock().unwrap().order_status = "Cancelled".to_string();
        Ok(())
    }

    async fn sell_order(
        &self,
        request: &OrderSellRequest,
    ) -> Result<OrderPreview, DistributionError> {
        self.sell_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_sell_request.lock().unwrap() = Some(request.clone());
        if let Some(error) = self.sell_error.lock().unwrap().clone() {
            return Err(DistributionError::Api(error));
        }
        let preview = self.sell_preview.lock().unwrap().clone();
        Ok(preview.unwrap_or_else(|| {
            let base = self.base.lock().unwrap();
            OrderPreview {
                offer_id: request.offer_id.clone(),
                total_payable: base.total_payable().cloned(),
                order_change_info: None,
                ssr_allow_list: vec![],
            }
        }))
    }

    async fn create_order(
        &self,
        request: &OrderSellRequest,
    ) -> Result<CreatedOrder, DistributionError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_sell_request.lock().unwrap() = Some(request.clone());
        if let Some(error) = self.create_error.lock().unwrap().clone() {
            return Err(DistributionError::Api(error));
        }
        Ok(CreatedOrder {
            order: self.base.lock().unwrap().clone(),
            responded_on: Utc::now(),
        })
    }
}

/// HashMap-backed [`SessionStore`].
#[derive(Default)]
pub struct MemorySessionStore {
    snapshots: Mutex<HashMap<String, CachedOrder>>,
    created_on: Mutex<HashMap<String, DateTime<Utc>>>,
    celebrated: Mutex<HashSet<String>>,
    traveller_ids: Mutex<HashMap<(String, String, usize), String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn put_snapshot(
        &self,
        record: &CachedOrder,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.snapshots
            .lock()
            .unwrap()
            .insert(record.snapshot.order_reference.clone(), record.clone());
        Ok(())
    }

    async fn get_snapshot(
        &self,
        order_reference: &str,
    ) -> Result<Option<CachedOrder>, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.snapshots.lock().unwrap().get(order_reference).cloned())
    }

    async fn record_created_on(
        &self,
        order_reference: &str,
        created_on: DateTime<Utc>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.created_on
            .lock()
            .unwrap()
            .insert(order_reference.to_string(), created_on);
        Ok(())
    }

    async fn get_created_on(
        &self,
        order_reference: &str,
    ) -> Result<Option<DateTime<Utc>>, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.created_on.lock().unwrap().get(order_reference).copied())
    }

    async fn claim_celebration(
        &self,
        order_reference: &str,
    ) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.celebrated.lock().unwrap().insert(order_reference.to_string()))
    }

    async fn get_traveller_id(
        &self,
        trace_id: &str,
        offer_id: &str,
        pax_index: usize,
    ) -> Result<Option<String>, Box<dyn std::error::Error + Send + Sync>> {
        let key = (trace_id.to_string(), offer_id.to_string(), pax_index);
        Ok(self.traveller_ids.lock().unwrap().get(&key).cloned())
    }

    async fn set_traveller_id(
        &self,
        trace_id: &str,
        offer_id: &str,
        pax_index: usize,
        traveller_id: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let key = (trace_id.to_string(), offer_id.to_string(), pax_index);
        self.traveller_ids.lock().unwrap().insert(key, traveller_id.to_string());
        Ok(())
    }
}

/// Booking repository that records saves and can be told to fail the rich
/// path, for exercising the minimal fallback.
#[derive(Default)]
pub struct RecordingBookingRepository {
    pub fail_rich: AtomicBool,
    pub rich_saves: Mutex<Vec<BookingRecord>>,
    pub minimal_saves: Mutex<Vec<String>>,
}

impl RecordingBookingRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BookingRepository for RecordingBookingRepository {
    async fn save_booking(
        &self,
        record: &BookingRecord,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if self.fail_rich.load(Ordering::SeqCst) {
            return Err("booking history unavailable".into());
        }
        self.rich_saves.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn save_booking_reference(
        &self,
        order_reference: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.minimal_saves.lock().unwrap().push(order_reference.to_string());
        Ok(())
    }
}
