use chrono::{DateTime, Utc};
use fareflow_core::ndc::OrderView;
use serde::Serialize;

/// Remote literal marking a reserved-but-unpaid order. The expiry check
/// matches it case-sensitively; everything display-facing goes through
/// [`normalize_status`] instead.
pub const ON_HOLD_RAW_STATUS: &str = "OnHold";

/// Effective display status substituted for an on-hold order whose payment
/// deadline has passed. View-layer only; the stored order keeps its raw
/// status until the supplier itself reports the expiry.
pub const EXPIRED_DISPLAY_STATUS: &str = "Expired";

/// Fare type sold for instant-issue products.
pub const INSTANT_ISSUE_FARE_TYPE: &str = "web";

/// Trimmed, lower-cased form of a raw order status. Absent input maps to the
/// empty string so downstream matching never deals with `Option`.
pub fn normalize_status(raw: Option<&str>) -> String {
    raw.map(|s| s.trim().to_lowercase()).unwrap_or_default()
}

/// True for statuses that mean the supplier is still settling the order.
pub fn is_processing(normalized: &str) -> bool {
    matches!(normalized, "pending" | "inprogress")
}

/// An on-hold order whose payment deadline is strictly in the past.
pub fn is_expired_hold(
    raw_status: &str,
    payment_time_limit: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> bool {
    raw_status == ON_HOLD_RAW_STATUS
        && payment_time_limit.map(|deadline| deadline < now).unwrap_or(false)
}

/// The single authoritative display status: the raw supplier status, except
/// that an expired hold reads as `Expired`.
pub fn effective_status(order: &OrderView, now: DateTime<Utc>) -> String {
    if is_expired_hold(&order.order_status, order.payment_time_limit, now) {
        EXPIRED_DISPLAY_STATUS.to_string()
    } else {
        order.order_status.clone()
    }
}

/// Confirm and cancel are only offered on a live hold.
pub fn hold_actions_enabled(order: &OrderView, now: DateTime<Utc>) -> bool {
    if is_expired_hold(&order.order_status, order.payment_time_limit, now) {
        return false;
    }
    matches!(
        normalize_status(Some(&order.order_status)).as_str(),
        "onhold" | "on-hold"
    )
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusBadge {
    pub label: String,
    pub color: &'static str,
}

const NEUTRAL_COLOR: &str = "#6b7280";

/// Total mapping from any raw status to a display badge. Unknown statuses
/// keep their raw text with the neutral color; this never panics.
pub fn status_badge(raw: Option<&str>) -> StatusBadge {
    let normalized = normalize_status(raw);
    let (label, color) = match normalized.as_str() {
        "onhold" | "on-hold" => ("On Hold", "#f59e0b"),
        "pending" => ("Pending", NEUTRAL_COLOR),
        "inprogress" | "in-progress" => ("In Progress", "#3b82f6"),
        "confirmed" => ("Confirmed", "#16a34a"),
        "expired" => ("Expired", "#dc2626"),
        "unconfirmed" | "un-confirmed" => ("Un-Confirmed", "#dc2626"),
        "cancelled" | "canceled" => ("Cancelled", "#9ca3af"),
        _ => {
            let raw_label = raw.map(str::trim).unwrap_or_default();
            return StatusBadge {
                label: if raw_label.is_empty() { "Pending".to_string() } else { raw_label.to_string() },
                color: NEUTRAL_COLOR,
            };
        }
    };
    StatusBadge { label: label.to_string(), color }
}

/// Issuance banner for instant-issue fares. Mutually exclusive by
/// construction; presentation-only and never consulted by the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum InstantIssue {
    Issuing,
    Failed,
    Issued,
}

pub fn is_instant_issue_fare(fare_type: Option<&str>) -> bool {
    fare_type
        .map(|f| f.trim().eq_ignore_ascii_case(INSTANT_ISSUE_FARE_TYPE))
        .unwrap_or(false)
}

pub fn instant_issue_state(
    fare_type: Option<&str>,
    effective_status: &str,
) -> Option<InstantIssue> {
    if !is_instant_issue_fare(fare_type) {
        return None;
    }
    let normalized = normalize_status(Some(effective_status));
    if is_processing(&normalized) {
        Some(InstantIssue::Issuing)
    } else if matches!(normalized.as_str(), "unknown" | "unconfirmed" | "un-confirmed") {
        Some(InstantIssue::Failed)
    } else if normalized == "confirmed" {
        Some(InstantIssue::Issued)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use fareflow_core::ndc::{OrderItem, Price, TotalPayable};

    fn on_hold_order(payment_time_limit: Option<DateTime<Utc>>) -> OrderView {
        OrderView {
            order_reference: "FF-TEST1".to_string(),
            order_status: "OnHold".to_string(),
            payment_time_limit,
            order_item: vec![OrderItem {
                fare_type: Some("regular".to_string()),
                price: Some(Price {
                    total_payable: TotalPayable { total: 5000, currency: "INR".to_string() },
                }),
            }],
            order_change_info: None,
            pax_list: vec![],
            contact_info: None,
            created_on: None,
        }
    }

    #[test]
    fn test_normalize_status() {
        assert_eq!(normalize_status(Some("  OnHold ")), "onhold");
        assert_eq!(normalize_status(Some("In-Progress")), "in-progress");
        assert_eq!(normalize_status(None), "");
    }

    #[test]
    fn test_is_processing() {
        assert!(is_processing(&normalize_status(Some("Pending"))));
        assert!(is_processing(&normalize_status(Some("InProgress"))));
        assert!(!is_processing(&normalize_status(Some("Confirmed"))));
        assert!(!is_processing(""));
    }

    #[test]
    fn test_expired_hold_requires_past_deadline() {
        let now = Utc::now();
        assert!(is_expired_hold("OnHold", Some(now - Duration::hours(1)), now));
        assert!(!is_expired_hold("OnHold", Some(now + Duration::hours(1)), now));
        assert!(!is_expired_hold("OnHold", None, now));
        // Deadline only matters while the order is actually on hold.
        assert!(!is_expired_hold("Confirmed", Some(now - Duration::hours(1)), now));
        // The raw literal is matched case-sensitively.
        assert!(!is_expired_hold("onhold", Some(now - Duration::hours(1)), now));
    }

    #[test]
    fn test_effective_status_overrides_display_only() {
        let now = Utc::now();
        let live = on_hold_order(Some(now + Duration::hours(1)));
        assert_eq!(effective_status(&live, now), "OnHold");
        assert!(hold_actions_enabled(&live, now));

        let expired = on_hold_order(Some(now - Duration::hours(1)));
        assert_eq!(effective_status(&expired, now), "Expired");
        assert!(!hold_actions_enabled(&expired, now));
        // The stored order keeps its raw status.
        assert_eq!(expired.order_status, "OnHold");

        // Status matching for actions tolerates the usual case variants.
        let mut hyphenated = on_hold_order(None);
        hyphenated.order_status = "ON-HOLD".to_string();
        assert!(hold_actions_enabled(&hyphenated, now));

        let mut confirmed = on_hold_order(None);
        confirmed.order_status = "Confirmed".to_string();
        assert!(!hold_actions_enabled(&confirmed, now));
    }

    #[test]
    fn test_badge_is_total() {
        for raw in [
            Some("OnHold"),
            Some("on-hold"),
            Some("PENDING"),
            Some("InProgress"),
            Some("Confirmed"),
            Some("Expired"),
            Some("UnConfirmed"),
            Some("canceled"),
            Some("SomethingNew"),
            Some("   "),
            None,
        ] {
            let badge = status_badge(raw);
            assert!(!badge.label.is_empty(), "empty label for {:?}", raw);
            assert!(badge.color.starts_with('#') && badge.color.len() == 7);
        }
        assert_eq!(status_badge(Some("un-confirmed")).label, "Un-Confirmed");
        // Unknown statuses keep their raw text with the neutral color.
        let unknown = status_badge(Some("Ticketed"));
        assert_eq!(unknown.label, "Ticketed");
        assert_eq!(unknown.color, NEUTRAL_COLOR);
    }

    #[test]
    fn test_instant_issue_flags() {
        assert_eq!(instant_issue_state(Some("web"), "Pending"), Some(InstantIssue::Issuing));
        assert_eq!(instant_issue_state(Some("WEB"), "InProgress"), Some(InstantIssue::Issuing));
        assert_eq!(instant_issue_state(Some("web"), "UnConfirmed"), Some(InstantIssue::Failed));
        assert_eq!(instant_issue_state(Some("web"), "Confirmed"), Some(InstantIssue::Issued));
        assert_eq!(instant_issue_state(Some("web"), "OnHold"), None);
        assert_eq!(instant_issue_state(Some("regular"), "Pending"), None);
        assert_eq!(instant_issue_state(None, "Pending"), None);
    }
}
