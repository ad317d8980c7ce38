use crate::ndc::{CreatedOrder, OrderPreview, OrderSellRequest, OrderView, RemoteError};
use async_trait::async_trait;

/// Message shown when the wire itself failed (connect error, timeout,
/// unparseable body). Deliberately distinct from supplier-provided messages.
pub const TRANSPORT_FAILURE_MESSAGE: &str = "Failed to reach the booking service";

#[derive(Debug, thiserror::Error)]
pub enum DistributionError {
    /// The supplier answered with `success: false`.
    #[error("{}", .0.preferred_message().unwrap_or("Booking service rejected the request"))]
    Api(RemoteError),

    /// The request never produced a usable envelope.
    #[error("{TRANSPORT_FAILURE_MESSAGE}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl DistributionError {
    /// Best user-facing message for this failure. A structured supplier
    /// message wins; otherwise the caller's per-operation fallback is used,
    /// except for transport failures which always use the generic wording.
    pub fn user_message<'a>(&'a self, fallback: &'a str) -> &'a str {
        match self {
            DistributionError::Api(err) => err.preferred_message().unwrap_or(fallback),
            DistributionError::Transport(_) => TRANSPORT_FAILURE_MESSAGE,
        }
    }
}

/// The five remote operations of the flight-distribution system, plus sell's
/// committing twin. One request/response exchange each; implementations do
/// not retry.
#[async_trait]
pub trait OrderDistribution: Send + Sync {
    async fn retrieve_order(&self, order_reference: &str) -> Result<OrderView, DistributionError>;

    /// Re-price an existing order without committing anything.
    async fn reshop_order(&self, order_reference: &str) -> Result<OrderView, DistributionError>;

    async fn confirm_order(&self, order_reference: &str) -> Result<(), DistributionError>;

    async fn cancel_order(&self, order_reference: &str) -> Result<(), DistributionError>;

    /// Validate and price an assembled booking payload.
    async fn sell_order(&self, request: &OrderSellRequest)
        -> Result<OrderPreview, DistributionError>;

    /// Commit a previously validated payload into a real order.
    async fn create_order(&self, request: &OrderSellRequest)
        -> Result<CreatedOrder, DistributionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_prefers_supplier_text() {
        let err = DistributionError::Api(RemoteError {
            error_message: Some("Fare basis no longer valid".into()),
            message: None,
            details: None,
        });
        assert_eq!(err.user_message("Failed to revalidate fare"), "Fare basis no longer valid");
    }

    #[test]
    fn test_user_message_falls_back_per_operation() {
        let err = DistributionError::Api(RemoteError::default());
        assert_eq!(err.user_message("Failed to confirm order"), "Failed to confirm order");
    }

    #[test]
    fn test_transport_failure_uses_generic_wording() {
        let err = DistributionError::Transport("connection reset".into());
        assert_eq!(err.user_message("Failed to confirm order"), TRANSPORT_FAILURE_MESSAGE);
    }
}
