#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct OrderCreatedEvent {
    pub order_reference: String,
    pub trace_id: String,
    pub total: i64,
    pub currency: String,
    pub fare_type: Option<String>,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct OrderConfirmedEvent {
    pub order_reference: String,
    pub total: i64,
    pub currency: String,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct OrderCancelledEvent {
    pub order_reference: String,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct FareChangeDetectedEvent {
    /// Order reference for reshop-time changes; trace id for sell-time
    /// changes, where no order exists yet.
    pub subject: String,
    pub previous_total: i64,
    pub latest_total: i64,
    pub currency: String,
    pub timestamp: i64,
}
