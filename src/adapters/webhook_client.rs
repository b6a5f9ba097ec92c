use crate::core::webhook::sign_payload;
use crate::utils::error::Result;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

/// How a simulated delivery proves it came from the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryAuth {
    Signature { header: String, secret: String },
    SharedSecret { header: String, secret: String },
    None,
}

#[derive(Debug, Clone)]
pub struct DeliveryResult {
    pub status: u16,
    pub body: Value,
}

/// Posts provider-style payloads at a payment-webhook endpoint.
#[derive(Debug, Clone)]
pub struct WebhookClient {
    client: Client,
    url: String,
}

impl WebhookClient {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub async fn deliver(
        &self,
        payload: &Value,
        auth: &DeliveryAuth,
        timestamp: i64,
    ) -> Result<DeliveryResult> {
        let body = serde_json::to_vec(payload)?;
        let mut request = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json");

        match auth {
            DeliveryAuth::Signature { header, secret } => {
                request = request.header(header.as_str(), sign_payload(secret, timestamp, &body)?);
            }
            DeliveryAuth::SharedSecret { header, secret } => {
                request = request.header(header.as_str(), secret.as_str());
            }
            DeliveryAuth::None => {}
        }

        tracing::debug!("POST {} ({} bytes)", self.url, body.len());
        let response = request.body(body).send().await?;
        let status = response.status().as_u16();
        let text = response.text().await?;
        let body = serde_json::from_str(&text).unwrap_or(Value::String(text));

        Ok(DeliveryResult { status, body })
    }
}
