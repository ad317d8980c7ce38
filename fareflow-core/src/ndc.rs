use chrono::{DateTime, NaiveDate, Utc};
use fareflow_shared::pii::Masked;
use serde::{Deserialize, Serialize};

// ============================================================================
// Response Envelope
// ============================================================================

/// Top-level envelope every distribution endpoint responds with.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<T> {
    pub success: bool,
    pub response: Option<T>,
    #[serde(default)]
    pub responded_on: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error: Option<RemoteError>,
}

/// Error block of a failed envelope. Suppliers are inconsistent about which
/// field they fill in, so all three are optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteError {
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub details: Option<String>,
}

impl RemoteError {
    /// Most specific human-readable message the supplier provided, if any.
    /// Blank fields are skipped.
    pub fn preferred_message(&self) -> Option<&str> {
        fn non_blank(field: &Option<String>) -> Option<&str> {
            field.as_deref().map(str::trim).filter(|m| !m.is_empty())
        }

        non_blank(&self.error_message)
            .or_else(|| non_blank(&self.message))
            .or_else(|| non_blank(&self.details))
    }
}

// ============================================================================
// Order View Models
// ============================================================================

/// Snapshot of an order as the distribution system sees it. Returned by
/// retrieve, reshop and create.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderView {
    pub order_reference: String,
    pub order_status: String,
    #[serde(default)]
    pub payment_time_limit: Option<DateTime<Utc>>,
    #[serde(default)]
    pub order_item: Vec<OrderItem>,
    /// Opaque change marker. Presence alone signals the supplier detected a
    /// material change, even when the totals are numerically equal.
    #[serde(default)]
    pub order_change_info: Option<serde_json::Value>,
    #[serde(default)]
    pub pax_list: Vec<Pax>,
    #[serde(default)]
    pub contact_info: Option<ContactInfo>,
    #[serde(default)]
    pub created_on: Option<DateTime<Utc>>,
}

impl OrderView {
    /// Fare type of the lead order item, as sold.
    pub fn fare_type(&self) -> Option<&str> {
        self.order_item.first().and_then(|item| item.fare_type.as_deref())
    }

    /// Payable total of the lead order item.
    pub fn total_payable(&self) -> Option<&TotalPayable> {
        self.order_item
            .first()
            .and_then(|item| item.price.as_ref())
            .map(|price| &price.total_payable)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    #[serde(default)]
    pub fare_type: Option<String>,
    #[serde(default)]
    pub price: Option<Price>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Price {
    pub total_payable: TotalPayable,
}

/// Amounts are integers in the currency's smallest unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TotalPayable {
    pub total: i64,
    pub currency: String,
}

// ============================================================================
// Sell / Create Models
// ============================================================================

/// Request body shared by the sell (validate) and create operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSellRequest {
    pub trace_id: String,
    pub offer_id: Vec<String>,
    pub request: SellPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SellPayload {
    pub contact_info: ContactInfo,
    pub pax_list: Vec<Pax>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactInfo {
    pub email: Masked<String>,
    pub phone: Masked<String>,
    #[serde(default)]
    pub phone_country_code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pax {
    /// Persisted traveller id; set when a repeated sell should update an
    /// existing traveller profile instead of creating a duplicate.
    #[serde(default)]
    pub pax_id: Option<String>,
    /// Passenger type code: ADT, CHD, INF.
    pub ptc: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(default)]
    pub document: Option<TravelDocument>,
    #[serde(default)]
    pub ssr: Vec<SpecialServiceRequest>,
    #[serde(default)]
    pub loyalty_programs: Vec<LoyaltyProgramAccount>,
    #[serde(default)]
    pub services: Vec<ServiceSelection>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TravelDocument {
    pub doc_type: String,
    pub number: String,
    #[serde(default)]
    pub expiry: Option<NaiveDate>,
    #[serde(default)]
    pub nationality: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecialServiceRequest {
    pub code: String,
    #[serde(default)]
    pub free_text: Option<String>,
}

/// Frequent-flyer membership. The account number travels here, never as a
/// free-text SSR remark.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoyaltyProgramAccount {
    #[serde(default)]
    pub program_owner: Option<String>,
    pub account_number: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSelection {
    pub service_id: String,
    #[serde(default)]
    pub segment_ref: Option<String>,
}

/// Priced preview returned by the sell (validate) operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPreview {
    #[serde(default)]
    pub offer_id: Vec<String>,
    #[serde(default)]
    pub total_payable: Option<TotalPayable>,
    #[serde(default)]
    pub order_change_info: Option<serde_json::Value>,
    #[serde(default)]
    pub ssr_allow_list: Vec<String>,
}

/// Result of the create operation: the new order plus the moment the
/// supplier answered, which the booking record keeps for audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedOrder {
    pub order: OrderView,
    pub responded_on: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_roundtrip() {
        let json = r#"{
            "success": true,
            "respondedOn": "2026-03-01T10:15:00Z",
            "response": {
                "orderReference": "FF-9X2K1",
                "orderStatus": "OnHold",
                "paymentTimeLimit": "2026-03-02T10:15:00Z",
                "orderItem": [
                    {"fareType": "web", "price": {"totalPayable": {"total": 542000, "currency": "INR"}}}
                ]
            }
        }"#;

        let envelope: Envelope<OrderView> = serde_json::from_str(json).unwrap();
        assert!(envelope.success);
        let order = envelope.response.unwrap();
        assert_eq!(order.order_reference, "FF-9X2K1");
        assert_eq!(order.fare_type(), Some("web"));
        assert_eq!(order.total_payable().unwrap().total, 542000);
    }

    #[test]
    fn test_envelope_tolerates_missing_fields() {
        let json = r#"{"success": false, "error": {"errorMessage": "Offer no longer available"}}"#;
        let envelope: Envelope<OrderView> = serde_json::from_str(json).unwrap();
        assert!(!envelope.success);
        assert!(envelope.response.is_none());
        assert_eq!(
            envelope.error.unwrap().preferred_message(),
            Some("Offer no longer available")
        );
    }

    #[test]
    fn test_preferred_message_ordering() {
        let err = RemoteError {
            error_message: None,
            message: Some("generic".into()),
            details: Some("detailed".into()),
        };
        assert_eq!(err.preferred_message(), Some("generic"));

        let err = RemoteError {
            error_message: None,
            message: Some("   ".into()),
            details: Some("detailed".into()),
        };
        // Blank fields fall through to the next one.
        assert_eq!(err.preferred_message(), Some("detailed"));
    }
}
