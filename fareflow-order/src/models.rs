use crate::status::{self, InstantIssue, StatusBadge};
use chrono::{DateTime, Utc};
use fareflow_core::ndc::{OrderView, TotalPayable};
use serde::Serialize;

/// Display projection of an order: every status-derived fact a booking
/// surface needs, computed in one place so no screen re-derives it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDisplay {
    pub order_reference: String,
    /// Raw supplier status, untouched.
    pub order_status: String,
    /// Expiry-aware display status; the one field surfaces should gate on.
    pub effective_status: String,
    pub badge: StatusBadge,
    /// Confirm/cancel availability.
    pub actions_enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instant_issue: Option<InstantIssue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_payable: Option<TotalPayable>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_time_limit: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_on: Option<DateTime<Utc>>,
}

impl OrderDisplay {
    pub fn project(order: &OrderView, created_on: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Self {
        let effective = status::effective_status(order, now);
        Self {
            order_reference: order.order_reference.clone(),
            order_status: order.order_status.clone(),
            badge: status::status_badge(Some(&effective)),
            actions_enabled: status::hold_actions_enabled(order, now),
            instant_issue: status::instant_issue_state(order.fare_type(), &effective),
            total_payable: order.total_payable().cloned(),
            payment_time_limit: order.payment_time_limit,
            created_on: created_on.or(order.created_on),
            effective_status: effective,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use fareflow_core::ndc::{OrderItem, Price};

    fn order(status: &str, fare_type: &str, deadline: Option<DateTime<Utc>>) -> OrderView {
        OrderView {
            order_reference: "FF-7Q4D2".to_string(),
            order_status: status.to_string(),
            payment_time_limit: deadline,
            order_item: vec![OrderItem {
                fare_type: Some(fare_type.to_string()),
                price: Some(Price {
                    total_payable: TotalPayable { total: 420000, currency: "INR".to_string() },
                }),
            }],
            order_change_info: None,
            pax_list: vec![],
            contact_info: None,
            created_on: None,
        }
    }

    #[test]
    fn test_live_hold_projection() {
        let now = Utc::now();
        let view = OrderDisplay::project(&order("OnHold", "regular", Some(now + Duration::hours(1))), None, now);
        assert_eq!(view.effective_status, "OnHold");
        assert_eq!(view.badge.label, "On Hold");
        assert!(view.actions_enabled);
        assert!(view.instant_issue.is_none());
    }

    #[test]
    fn test_expired_hold_projection_keeps_raw_status() {
        let now = Utc::now();
        let view = OrderDisplay::project(&order("OnHold", "regular", Some(now - Duration::hours(1))), None, now);
        assert_eq!(view.order_status, "OnHold");
        assert_eq!(view.effective_status, "Expired");
        assert_eq!(view.badge.label, "Expired");
        assert!(!view.actions_enabled);
    }

    #[test]
    fn test_instant_issue_projection() {
        let now = Utc::now();
        let view = OrderDisplay::project(&order("Pending", "web", None), None, now);
        assert_eq!(view.instant_issue, Some(InstantIssue::Issuing));
        assert!(!view.actions_enabled);
    }
}
