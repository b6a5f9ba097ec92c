//! Payment-provider webhook verification and payload extraction.
//!
//! Providers disagree on where they put the invoice id and the payment
//! status, so extraction walks an ordered list of candidate paths and takes
//! the first usable value.

use crate::config::portal::{SecretString, WebhookConfig};
use crate::domain::model::PaymentOutcome;
use crate::utils::error::{PortalError, Result};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use std::collections::HashMap;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

const INVOICE_ID_PATHS: &[&str] = &[
    "invoice_id",
    "invoiceId",
    "metadata.invoice_id",
    "metadata.invoiceId",
    "data.invoice_id",
    "data.metadata.invoice_id",
    "data.object.metadata.invoice_id",
    "external_reference",
    "externalReference",
    "reference",
    "data.reference",
];

const STATUS_PATHS: &[&str] = &[
    "status",
    "payment_status",
    "paymentStatus",
    "data.status",
    "data.object.status",
];

const EVENT_TYPE_PATHS: &[&str] = &["type", "event"];

const EVENT_ID_PATHS: &[&str] = &["id", "event_id", "eventId", "data.id"];

const AMOUNT_PATHS: &[&str] = &[
    "amount_cents",
    "amount",
    "amount_paid",
    "data.object.amount_received",
    "data.amount",
];

const PAYMENT_REFERENCE_PATHS: &[&str] = &[
    "payment_reference",
    "payment_id",
    "paymentId",
    "transaction_id",
    "data.object.payment_intent",
];

/// How a delivery was authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    Signature,
    SharedSecret,
    Skipped,
}

#[derive(Debug, Clone)]
pub struct WebhookVerifier {
    secret: Option<SecretString>,
    secret_header: String,
    signature_header: String,
    tolerance_seconds: i64,
    allow_unverified: bool,
}

impl WebhookVerifier {
    pub fn from_config(config: &WebhookConfig) -> Self {
        Self {
            secret: config.secret.clone(),
            secret_header: config.secret_header.to_ascii_lowercase(),
            signature_header: config.signature_header.to_ascii_lowercase(),
            tolerance_seconds: config.tolerance_seconds,
            allow_unverified: config.allow_unverified,
        }
    }

    /// Checks the signature header when present, else the shared-secret header.
    pub fn verify(
        &self,
        headers: &HashMap<String, String>,
        body: &[u8],
        now: DateTime<Utc>,
    ) -> Result<Verification> {
        let Some(secret) = &self.secret else {
            if self.allow_unverified {
                tracing::warn!("⚠️ Webhook accepted without verification (no secret configured)");
                return Ok(Verification::Skipped);
            }
            return Err(PortalError::unauthorized("webhook secret not configured"));
        };

        if let Some(signature) = header(headers, &self.signature_header) {
            verify_signature(secret.expose(), signature, body, now, self.tolerance_seconds)?;
            return Ok(Verification::Signature);
        }

        if let Some(presented) = header(headers, &self.secret_header) {
            if bool::from(presented.as_bytes().ct_eq(secret.expose().as_bytes())) {
                return Ok(Verification::SharedSecret);
            }
            return Err(PortalError::unauthorized("shared secret mismatch"));
        }

        Err(PortalError::unauthorized("missing webhook signature"))
    }
}

/// Case-insensitive header lookup.
pub fn header<'a>(headers: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Header value `t=<unix seconds>,v1=<hex hmac of "{t}.{body}">`.
pub fn sign_payload(secret: &str, timestamp: i64, body: &[u8]) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| PortalError::validation(format!("invalid webhook secret: {}", e)))?;
    mac.update(format!("{}.", timestamp).as_bytes());
    mac.update(body);

    Ok(format!(
        "t={},v1={}",
        timestamp,
        hex::encode(mac.finalize().into_bytes())
    ))
}

fn verify_signature(
    secret: &str,
    header_value: &str,
    body: &[u8],
    now: DateTime<Utc>,
    tolerance_seconds: i64,
) -> Result<()> {
    let mut timestamp: Option<i64> = None;
    let mut signatures = Vec::new();

    for part in header_value.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.trim().parse().ok(),
            Some(("v1", value)) => signatures.push(value.trim()),
            _ => {}
        }
    }

    let timestamp =
        timestamp.ok_or_else(|| PortalError::unauthorized("signature header has no timestamp"))?;
    if signatures.is_empty() {
        return Err(PortalError::unauthorized("signature header has no v1 entry"));
    }

    if now.timestamp().abs_diff(timestamp) > tolerance_seconds.unsigned_abs() {
        return Err(PortalError::unauthorized("signature timestamp outside tolerance"));
    }

    for signature in signatures {
        let Ok(expected) = hex::decode(signature) else {
            continue;
        };
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| PortalError::unauthorized(format!("invalid webhook secret: {}", e)))?;
        mac.update(format!("{}.", timestamp).as_bytes());
        mac.update(body);
        if mac.verify_slice(&expected).is_ok() {
            return Ok(());
        }
    }

    Err(PortalError::unauthorized("signature mismatch"))
}

/// What a webhook delivery says about one invoice.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentNotice {
    pub invoice_id: String,
    pub provider_status: String,
    pub outcome: PaymentOutcome,
    pub event_id: Option<String>,
    pub amount_cents: Option<i64>,
    pub payment_reference: Option<String>,
}

impl PaymentNotice {
    pub fn from_payload(payload: &Value) -> Result<Self> {
        let invoice_id = first_identifier(payload, INVOICE_ID_PATHS)
            .ok_or_else(|| PortalError::malformed("no invoice identifier in payload"))?;

        let provider_status = first_identifier(payload, STATUS_PATHS)
            .or_else(|| {
                first_identifier(payload, EVENT_TYPE_PATHS)
                    .and_then(|t| t.rsplit('.').next().map(str::to_string))
            })
            .ok_or_else(|| PortalError::malformed("no payment status in payload"))?;

        let amount_cents = AMOUNT_PATHS
            .iter()
            .filter_map(|path| lookup(payload, path))
            .find_map(Value::as_i64);

        Ok(Self {
            outcome: classify_status(&provider_status),
            invoice_id,
            provider_status,
            event_id: first_identifier(payload, EVENT_ID_PATHS),
            amount_cents,
            payment_reference: first_identifier(payload, PAYMENT_REFERENCE_PATHS),
        })
    }
}

pub fn classify_status(status: &str) -> PaymentOutcome {
    match status.trim().to_ascii_lowercase().as_str() {
        "succeeded" | "paid" | "completed" | "complete" | "approved" | "success" | "captured"
        | "settled" => PaymentOutcome::Succeeded,
        "failed" | "declined" | "rejected" | "canceled" | "cancelled" | "expired" => {
            PaymentOutcome::Failed
        }
        "pending" | "processing" | "in_process" | "requires_action" | "created" => {
            PaymentOutcome::Pending
        }
        "refunded" | "chargeback" | "reversed" => PaymentOutcome::Refunded,
        _ => PaymentOutcome::Unknown,
    }
}

fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |current, key| current.get(key))
}

fn first_identifier(payload: &Value, paths: &[&str]) -> Option<String> {
    paths
        .iter()
        .filter_map(|path| lookup(payload, path))
        .find_map(|value| match value {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) if n.is_i64() || n.is_u64() => Some(n.to_string()),
            _ => None,
        })
}
