use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fareflow_core::distribution::{DistributionError, OrderDistribution};
use fareflow_core::ndc::{
    CreatedOrder, Envelope, OrderPreview, OrderSellRequest, OrderView, RemoteError,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

/// HTTP client for the third-party flight-distribution API. One POST per
/// logical operation, every response wrapped in the standard envelope.
#[derive(Debug, Clone)]
pub struct RemoteOrderClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OrderReferenceRequest<'a> {
    order_reference: &'a str,
}

impl RemoteOrderClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    async fn post<Req, Resp>(
        &self,
        path: &str,
        body: &Req,
    ) -> Result<Envelope<Resp>, DistributionError>
    where
        Req: Serialize + ?Sized + Sync,
        Resp: DeserializeOwned,
    {
        let url = format!("{}/{}", self.base_url, path);
        let mut request = self.http.post(&url).json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await.map_err(transport)?;
        debug!(%url, status = %response.status(), "distribution call answered");
        response.json::<Envelope<Resp>>().await.map_err(transport)
    }
}

fn transport(err: reqwest::Error) -> DistributionError {
    DistributionError::Transport(Box::new(err))
}

fn require_success<T>(envelope: Envelope<T>) -> Result<Envelope<T>, DistributionError> {
    if envelope.success {
        Ok(envelope)
    } else {
        Err(DistributionError::Api(envelope.error.unwrap_or_default()))
    }
}

/// A successful envelope with no payload is still unusable for callers that
/// need the order back.
fn require_response<T>(
    envelope: Envelope<T>,
) -> Result<(T, Option<DateTime<Utc>>), DistributionError> {
    let envelope = require_success(envelope)?;
    match envelope.response {
        Some(response) => Ok((response, envelope.responded_on)),
        None => Err(DistributionError::Api(RemoteError {
            message: Some("Booking service returned an empty response".to_string()),
            ..Default::default()
        })),
    }
}

#[async_trait]
impl OrderDistribution for RemoteOrderClient {
    async fn retrieve_order(&self, order_reference: &str) -> Result<OrderView, DistributionError> {
        let envelope = self
            .post::<_, OrderView>("order/retrieve", &OrderReferenceRequest { order_reference })
            .await?;
        require_response(envelope).map(|(order, _)| order)
    }

    async fn reshop_order(&self, order_reference: &str) -> Result<OrderView, DistributionError> {
        let envelope = self
            .post::<_, OrderView>("order/reshop", &OrderReferenceRequest { order_reference })
            .await?;
        require_response(envelope).map(|(order, _)| order)
    }

    async fn confirm_order(&self, order_reference: &str) -> Result<(), DistributionError> {
        let envelope = self
            .post::<_, serde_json::Value>(
                "order/confirm",
                &OrderReferenceRequest { order_reference },
            )
            .await?;
        require_success(envelope).map(|_| ())
    }

    async fn cancel_order(&self, order_reference: &str) -> Result<(), DistributionError> {
        let envelope = self
            .post::<_, serde_json::Value>(
                "order/cancel",
                &OrderReferenceRequest { order_reference },
            )
            .await?;
        require_success(envelope).map(|_| ())
    }

    async fn sell_order(
        &self,
        request: &OrderSellRequest,
    ) -> Result<OrderPreview, DistributionError> {
        let envelope = self.post::<_, OrderPreview>("order/sell", request).await?;
        require_response(envelope).map(|(preview, _)| preview)
    }

    async fn create_order(
        &self,
        request: &OrderSellRequest,
    ) -> Result<CreatedOrder, DistributionError> {
        let envelope = self.post::<_, OrderView>("order/create", request).await?;
        let (order, responded_on) = require_response(envelope)?;
        Ok(CreatedOrder {
            order,
            // Not every supplier stamps the envelope; fall back to receipt
            // time so the booking record always has one.
            responded_on: responded_on.unwrap_or_else(Utc::now),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order_envelope(json: &str) -> Envelope<OrderView> {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_unsuccessful_envelope_surfaces_supplier_error() {
        let envelope = order_envelope(
            r#"{"success": false, "error": {"errorMessage": "Order not found"}}"#,
        );
        match require_success(envelope) {
            Err(DistributionError::Api(err)) => {
                assert_eq!(err.preferred_message(), Some("Order not found"));
            }
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_unsuccessful_envelope_without_error_block_still_fails() {
        let envelope = order_envelope(r#"{"success": false}"#);
        let err = require_success(envelope).err().unwrap();
        match err {
            DistributionError::Api(remote) => assert_eq!(remote.preferred_message(), None),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_successful_envelope_without_payload_is_an_error() {
        let envelope = order_envelope(r#"{"success": true}"#);
        let err = require_response(envelope).err().unwrap();
        match err {
            DistributionError::Api(remote) => {
                assert_eq!(
                    remote.preferred_message(),
                    Some("Booking service returned an empty response")
                );
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_successful_envelope_yields_order_and_timestamp() {
        let envelope = order_envelope(
            r#"{
                "success": true,
                "respondedOn": "2026-03-01T08:00:00Z",
                "response": {"orderReference": "FF-1", "orderStatus": "OnHold"}
            }"#,
        );
        let (order, responded_on) = require_response(envelope).unwrap();
        assert_eq!(order.order_reference, "FF-1");
        assert!(responded_on.is_some());
    }
}
