//! HTTP execution bridge

use super::{OrderRef, TradeParams, TradeVenue, VenueError};
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
struct OrderRequest<'a> {
    asset_id: &'a str,
    side: &'static str,
    size: Decimal,
    max_slippage_bps: u32,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    order_ref: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Posts buys to a generic execution bridge: `POST {endpoint}/orders`.
///
/// The bridge owns signing and routing; this client only submits and reads
/// back an order reference. The coordinator enforces the timeout.
pub struct HttpVenue {
    endpoint: String,
    client: Client,
}

impl HttpVenue {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, VenueError> {
        let client = Client::builder().build()?;
        Ok(Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[async_trait]
impl TradeVenue for HttpVenue {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn submit(&self, asset_id: &str, params: &TradeParams) -> Result<OrderRef, VenueError> {
        let url = format!("{}/orders", self.endpoint);
        let request = OrderRequest {
            asset_id,
            side: "buy",
            size: params.size,
            max_slippage_bps: params.max_slippage_bps,
        };

        tracing::debug!(url = %url, asset_id, "Submitting order");
        let response = self.client.post(&url).json(&request).send().await?;

        let status = response.status();
        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(VenueError::Rejected(format!("{status}: {body}")));
        }
        let response = response.error_for_status()?;

        let body: OrderResponse = response
            .json()
            .await
            .map_err(|e| VenueError::InvalidResponse(e.to_string()))?;

        match (body.order_ref, body.error) {
            (_, Some(error)) => Err(VenueError::Rejected(error)),
            (Some(order_ref), None) if !order_ref.is_empty() => Ok(OrderRef(order_ref)),
            _ => Err(VenueError::InvalidResponse("missing order_ref".into())),
        }
    }
}
