use crate::config::portal::{PortalConfig, SecretString, StoreKind};
use crate::utils::error::{PortalError, Result};
use std::env;

impl PortalConfig {
    /// Serverless deployments have no config file; everything comes from the
    /// environment. `PORTAL_CONFIG` still points at a TOML file when present.
    pub fn from_env() -> Result<Self> {
        if let Ok(path) = env::var("PORTAL_CONFIG") {
            tracing::info!("Loading configuration from {}", path);
            return Self::from_file(path);
        }

        let mut config = PortalConfig::default();

        if let Some(kind) = var("PORTAL_STORE_KIND") {
            config.store.kind = match kind.to_ascii_lowercase().as_str() {
                "rest" => StoreKind::Rest,
                "memory" => StoreKind::Memory,
                other => {
                    return Err(PortalError::InvalidConfigValueError {
                        field: "PORTAL_STORE_KIND".to_string(),
                        value: other.to_string(),
                        reason: "expected rest or memory".to_string(),
                    })
                }
            };
        }
        config.store.url = var("PORTAL_STORE_URL");
        config.store.anon_key = var("PORTAL_STORE_ANON_KEY");
        config.store.service_key = var("PORTAL_STORE_SERVICE_KEY").map(SecretString::new);
        if let Some(timeout) = var("PORTAL_STORE_TIMEOUT_SECONDS") {
            config.store.timeout_seconds = parse("PORTAL_STORE_TIMEOUT_SECONDS", &timeout)?;
        }

        config.webhook.secret = var("PAYMENT_WEBHOOK_SECRET").map(SecretString::new);
        if let Some(header) = var("PAYMENT_WEBHOOK_SECRET_HEADER") {
            config.webhook.secret_header = header;
        }
        if let Some(header) = var("PAYMENT_WEBHOOK_SIGNATURE_HEADER") {
            config.webhook.signature_header = header;
        }
        if let Some(tolerance) = var("PAYMENT_WEBHOOK_TOLERANCE_SECONDS") {
            config.webhook.tolerance_seconds =
                parse("PAYMENT_WEBHOOK_TOLERANCE_SECONDS", &tolerance)?;
        }
        config.webhook.allow_unverified = var("PAYMENT_WEBHOOK_ALLOW_UNVERIFIED")
            .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        config.functions.service_token = var("PORTAL_SERVICE_TOKEN").map(SecretString::new);

        if let Some(name) = var("PORTAL_APP_NAME") {
            config.public.app_name = name;
        }
        config.public.support_email = var("PORTAL_SUPPORT_EMAIL");
        if let Some(currency) = var("PORTAL_CURRENCY") {
            config.public.currency = currency;
        }
        config.public.payment_publishable_key = var("PAYMENT_PUBLISHABLE_KEY");

        if let Some(port) = var("PORTAL_PORT") {
            config.server.port = parse("PORTAL_PORT", &port)?;
        }
        if let Some(origins) = var("PORTAL_ALLOWED_ORIGINS") {
            config.server.allowed_origins = origins
                .split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect();
        }
        if let Some(ttl) = var("PORTAL_CACHE_TTL_SECONDS") {
            config.cache.ttl_seconds = parse("PORTAL_CACHE_TTL_SECONDS", &ttl)?;
        }
        config.cache.dir = var("PORTAL_CACHE_DIR");

        Ok(config)
    }
}

fn var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| PortalError::InvalidConfigValueError {
            field: key.to_string(),
            value: value.to_string(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reports_field() {
        let err = parse::<u16>("PORTAL_PORT", "eighty").unwrap_err();
        match err {
            PortalError::InvalidConfigValueError { field, value, .. } => {
                assert_eq!(field, "PORTAL_PORT");
                assert_eq!(value, "eighty");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(parse::<u16>("PORTAL_PORT", " 8080 ").unwrap(), 8080);
    }
}
