use crate::utils::error::{PortalError, Result};
use crate::utils::validation::{
    validate_currency, validate_header_name, validate_non_empty_string, validate_path,
    validate_range, validate_required_field, validate_url, Validate,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::OnceLock;

/// String that never shows up in `Debug` output or logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretString(***)")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortalConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub functions: FunctionsConfig,
    #[serde(default)]
    pub public: PublicConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_origins")]
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            allowed_origins: default_origins(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    Rest,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub kind: StoreKind,
    #[serde(default)]
    pub url: Option<String>,
    /// Public key the browser uses; safe to hand out.
    #[serde(default)]
    pub anon_key: Option<String>,
    #[serde(default)]
    pub service_key: Option<SecretString>,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: StoreKind::default(),
            url: None,
            anon_key: None,
            service_key: None,
            timeout_seconds: default_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    #[serde(default)]
    pub secret: Option<SecretString>,
    #[serde(default = "default_secret_header")]
    pub secret_header: String,
    #[serde(default = "default_signature_header")]
    pub signature_header: String,
    #[serde(default = "default_tolerance")]
    pub tolerance_seconds: i64,
    #[serde(default)]
    pub allow_unverified: bool,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            secret: None,
            secret_header: default_secret_header(),
            signature_header: default_signature_header(),
            tolerance_seconds: default_tolerance(),
            allow_unverified: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FunctionsConfig {
    /// Bearer token required by mark-invoice-paid and mark-overdue when set.
    #[serde(default)]
    pub service_token: Option<SecretString>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicConfig {
    #[serde(default = "default_app_name")]
    pub app_name: String,
    #[serde(default)]
    pub support_email: Option<String>,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub payment_publishable_key: Option<String>,
}

impl Default for PublicConfig {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            support_email: None,
            currency: default_currency(),
            payment_publishable_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_ttl")]
    pub ttl_seconds: u64,
    /// Directory for the file-backed cache; memory when unset.
    #[serde(default)]
    pub dir: Option<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_cache_ttl(),
            dir: None,
        }
    }
}

fn default_port() -> u16 {
    8787
}

fn default_origins() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_timeout() -> u64 {
    30
}

fn default_secret_header() -> String {
    "x-webhook-secret".to_string()
}

fn default_signature_header() -> String {
    "x-webhook-signature".to_string()
}

fn default_tolerance() -> i64 {
    300
}

fn default_app_name() -> String {
    "Client Portal".to_string()
}

fn default_currency() -> String {
    "USD".to_string()
}

fn default_cache_ttl() -> u64 {
    60
}

fn env_placeholder() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{([^}]+)\}").expect("static regex"))
}

impl PortalConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(PortalError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content);

        let mut config: PortalConfig =
            toml::from_str(&processed_content).map_err(|e| PortalError::ConfigValidationError {
                field: "toml_parsing".to_string(),
                message: format!("TOML parsing error: {}", e),
            })?;
        config.drop_unresolved_secrets();
        Ok(config)
    }

    /// 替換環境變數 (例如 ${WEBHOOK_SECRET})；未設定的保持原樣
    fn substitute_env_vars(content: &str) -> String {
        env_placeholder()
            .replace_all(content, |caps: &regex::Captures| {
                let var_name = &caps[1];
                std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
            })
            .into_owned()
    }

    // A secret left as "${VAR}" means the variable was missing.
    fn drop_unresolved_secrets(&mut self) {
        fn unresolved(secret: &Option<SecretString>) -> bool {
            secret
                .as_ref()
                .is_some_and(|s| env_placeholder().is_match(s.expose()))
        }

        if unresolved(&self.webhook.secret) {
            tracing::warn!("webhook.secret references an unset environment variable");
            self.webhook.secret = None;
        }
        if unresolved(&self.store.service_key) {
            tracing::warn!("store.service_key references an unset environment variable");
            self.store.service_key = None;
        }
        if unresolved(&self.functions.service_token) {
            tracing::warn!("functions.service_token references an unset environment variable");
            self.functions.service_token = None;
        }
    }
}

impl Validate for PortalConfig {
    fn validate(&self) -> Result<()> {
        if self.store.kind == StoreKind::Rest {
            let url = validate_required_field("store.url", &self.store.url)?;
            validate_url("store.url", url)?;
            validate_required_field("store.service_key", &self.store.service_key)?;
        }
        validate_range("store.timeout_seconds", self.store.timeout_seconds, 1, 300)?;

        validate_header_name("webhook.secret_header", &self.webhook.secret_header)?;
        validate_header_name("webhook.signature_header", &self.webhook.signature_header)?;
        validate_range("webhook.tolerance_seconds", self.webhook.tolerance_seconds, 1, 86_400)?;
        if self.webhook.secret.is_none() && !self.webhook.allow_unverified {
            return Err(PortalError::MissingConfigError {
                field: "webhook.secret".to_string(),
            });
        }

        validate_non_empty_string("public.app_name", &self.public.app_name)?;
        validate_currency("public.currency", &self.public.currency)?;

        if let Some(dir) = &self.cache.dir {
            validate_path("cache.dir", dir)?;
        }
        validate_range("cache.ttl_seconds", self.cache.ttl_seconds, 0, 86_400)?;

        tracing::debug!("✅ Portal configuration validation passed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[server]
port = 9000

[store]
kind = "rest"
url = "https://db.example.com"
anon_key = "anon-123"
service_key = "service-456"

[webhook]
secret = "whsec_test"

[public]
app_name = "Acme Portal"
currency = "EUR"
"#;

    #[test]
    fn test_parse_sample_config() {
        let config = PortalConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.allowed_origins, vec!["*"]);
        assert_eq!(config.store.kind, StoreKind::Rest);
        assert_eq!(config.webhook.secret_header, "x-webhook-secret");
        assert_eq!(config.webhook.tolerance_seconds, 300);
        assert_eq!(config.cache.ttl_seconds, 60);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unresolved_secret_is_dropped() {
        let content = SAMPLE.replace(
            "secret = \"whsec_test\"",
            "secret = \"${PORTAL_TEST_SURELY_UNSET_VAR}\"",
        );
        let config = PortalConfig::from_toml_str(&content).unwrap();
        assert!(config.webhook.secret.is_none());
        assert!(matches!(
            config.validate(),
            Err(PortalError::MissingConfigError { .. })
        ));
    }

    #[test]
    fn test_rest_store_requires_url() {
        let mut config = PortalConfig::from_toml_str(SAMPLE).unwrap();
        config.store.url = None;
        assert!(config.validate().is_err());

        config.store.kind = StoreKind::Memory;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_secret_debug_is_redacted() {
        let config = PortalConfig::from_toml_str(SAMPLE).unwrap();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("whsec_test"));
        assert!(!debug.contains("service-456"));
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            PortalConfig::from_toml_str("[server\nport = 1"),
            Err(PortalError::ConfigValidationError { .. })
        ));
    }
}
