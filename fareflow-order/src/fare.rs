use fareflow_core::ndc::{OrderView, TotalPayable};
use serde::Serialize;

/// Decide whether a fresh pricing requires the traveller's consent.
///
/// A change is flagged when the totals differ (exact comparison on the
/// currency's smallest unit) or when the supplier attached a change-info
/// marker, whose mere presence signals a material change even at equal
/// totals. When either total is missing the comparison is unknowable and we
/// fail open rather than strand the traveller.
pub fn has_fare_changed(
    previous_total: Option<i64>,
    latest_total: Option<i64>,
    change_info: Option<&serde_json::Value>,
) -> bool {
    if change_info.is_some() {
        return true;
    }
    match (previous_total, latest_total) {
        (Some(previous), Some(latest)) => previous != latest,
        _ => false,
    }
}

/// Shorthand for reshop responses.
pub fn reshop_fare_changed(previous_total: Option<i64>, reshopped: &OrderView) -> bool {
    has_fare_changed(
        previous_total,
        reshopped.total_payable().map(|t| t.total),
        reshopped.order_change_info.as_ref(),
    )
}

/// Old-versus-new pricing shown on the fare-update prompt. Derived fresh
/// from each reshop response, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FareComparison {
    pub previous_total: i64,
    pub latest_total: i64,
    pub currency: String,
    /// Positive means a price increase.
    pub difference: i64,
}

impl FareComparison {
    pub fn new(previous_total: i64, latest_total: i64, currency: String) -> Self {
        Self {
            previous_total,
            latest_total,
            difference: latest_total - previous_total,
            currency,
        }
    }

    /// Signed rendering of the difference; non-negative values carry an
    /// explicit leading `+`.
    pub fn formatted_difference(&self) -> String {
        if self.difference >= 0 {
            format!("+{}", self.difference)
        } else {
            self.difference.to_string()
        }
    }
}

/// Comparison for display, when both sides are known.
pub fn compare_totals(
    previous_total: Option<i64>,
    latest: Option<&TotalPayable>,
) -> Option<FareComparison> {
    let previous = previous_total?;
    let latest = latest?;
    Some(FareComparison::new(previous, latest.total, latest.currency.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_equal_totals_are_not_a_change() {
        assert!(!has_fare_changed(Some(1000), Some(1000), None));
    }

    #[test]
    fn test_increase_and_decrease_are_changes() {
        assert!(has_fare_changed(Some(1000), Some(1200), None));
        assert!(has_fare_changed(Some(1000), Some(800), None));

        let up = FareComparison::new(1000, 1200, "INR".to_string());
        assert_eq!(up.difference, 200);
        assert_eq!(up.formatted_difference(), "+200");

        let down = FareComparison::new(1000, 800, "INR".to_string());
        assert_eq!(down.difference, -200);
        assert_eq!(down.formatted_difference(), "-200");
    }

    #[test]
    fn test_zero_difference_formats_with_plus() {
        let flat = FareComparison::new(1000, 1000, "INR".to_string());
        assert_eq!(flat.formatted_difference(), "+0");
    }

    #[test]
    fn test_change_info_marker_forces_prompt() {
        // Supplier flagged a change even though the totals agree.
        assert!(has_fare_changed(Some(1000), Some(1000), Some(&json!({"reason": "terms"}))));
        assert!(has_fare_changed(Some(1000), Some(1000), Some(&json!({}))));
    }

    #[test]
    fn test_missing_totals_fail_open() {
        assert!(!has_fare_changed(None, Some(1200), None));
        assert!(!has_fare_changed(Some(1000), None, None));
        assert!(!has_fare_changed(None, None, None));
    }

    #[test]
    fn test_compare_totals_requires_both_sides() {
        let latest = TotalPayable { total: 5500, currency: "INR".to_string() };
        let comparison = compare_totals(Some(5000), Some(&latest)).unwrap();
        assert_eq!(comparison.difference, 500);
        assert!(compare_totals(None, Some(&latest)).is_none());
        assert!(compare_totals(Some(5000), None).is_none());
    }
}
