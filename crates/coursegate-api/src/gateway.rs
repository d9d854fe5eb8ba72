//! [`HttpPaymentGateway`] posts payment-link requests to a JSON endpoint.

use std::time::Duration;

use coursegate_core::payment::{PaymentGateway, PaymentLink, PaymentLinkRequest};
use reqwest::{Client, StatusCode};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
  #[error("request failed: {0}")]
  Http(#[from] reqwest::Error),

  #[error("gateway answered {0}")]
  Status(StatusCode),
}

/// Cheap to clone; the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct HttpPaymentGateway {
  client:   Client,
  endpoint: String,
}

impl HttpPaymentGateway {
  pub fn new(endpoint: impl Into<String>) -> Result<Self, GatewayError> {
    let client = Client::builder().timeout(Duration::from_secs(15)).build()?;
    Ok(Self { client, endpoint: endpoint.into() })
  }
}

impl PaymentGateway for HttpPaymentGateway {
  type Error = GatewayError;

  async fn create_payment_link<'a>(
    &'a self,
    request: &'a PaymentLinkRequest,
  ) -> Result<PaymentLink, GatewayError> {
    let resp = self.client.post(&self.endpoint).json(request).send().await?;

    if !resp.status().is_success() {
      return Err(GatewayError::Status(resp.status()));
    }
    Ok(resp.json().await?)
  }
}
