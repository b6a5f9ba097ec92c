use portal_fns::config::{PortalConfig, StoreKind};
use portal_fns::utils::validation::Validate;
use portal_fns::{FunctionContext, FunctionRequest, PortalFunction};
use std::io::Write;
use tempfile::NamedTempFile;

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_config_file_with_env_substitution() {
    std::env::set_var("PORTAL_IT_WEBHOOK_SECRET", "whsec_from_env");
    let file = write_config(
        r#"
[server]
port = 9100
allowed_origins = ["https://portal.example.com"]

[store]
kind = "memory"

[webhook]
secret = "${PORTAL_IT_WEBHOOK_SECRET}"
tolerance_seconds = 120

[functions]
service_token = "${PORTAL_IT_SURELY_UNSET_TOKEN}"
"#,
    );

    let config = PortalConfig::from_file(file.path()).unwrap();
    assert_eq!(config.server.port, 9100);
    assert_eq!(config.store.kind, StoreKind::Memory);
    assert_eq!(
        config.webhook.secret.as_ref().map(|s| s.expose()),
        Some("whsec_from_env")
    );
    assert_eq!(config.webhook.tolerance_seconds, 120);
    assert!(config.functions.service_token.is_none());
    assert!(config.validate().is_ok());
}

#[test]
fn test_missing_config_file() {
    assert!(PortalConfig::from_file("/definitely/not/here/portal.toml").is_err());
}

#[test]
fn test_rest_store_without_credentials_fails_validation() {
    let file = write_config(
        r#"
[store]
url = "https://db.example.com"

[webhook]
allow_unverified = true
"#,
    );
    let config = PortalConfig::from_file(file.path()).unwrap();
    assert!(config.validate().is_err());
    assert!(FunctionContext::from_config(config).is_err());
}

#[tokio::test]
async fn test_cors_follows_configured_origins() {
    let file = write_config(
        r#"
[server]
allowed_origins = ["https://portal.example.com"]

[store]
kind = "memory"

[webhook]
allow_unverified = true

[public]
app_name = "Acme Portal"
"#,
    );
    let config = PortalConfig::from_file(file.path()).unwrap();
    let ctx = FunctionContext::from_config(config).unwrap();

    let allowed = ctx
        .invoke(
            PortalFunction::PublicConfig,
            FunctionRequest::new("GET").with_header("Origin", "https://portal.example.com"),
        )
        .await;
    assert_eq!(allowed.body["app_name"], "Acme Portal");
    assert_eq!(
        allowed.headers.get("access-control-allow-origin").map(String::as_str),
        Some("https://portal.example.com")
    );

    let foreign = ctx
        .invoke(
            PortalFunction::PublicConfig,
            FunctionRequest::new("GET").with_header("Origin", "https://evil.example"),
        )
        .await;
    assert!(!foreign.headers.contains_key("access-control-allow-origin"));
}

#[tokio::test]
async fn test_file_backed_dashboard_cache() {
    let cache_dir = tempfile::TempDir::new().unwrap();
    let file = write_config(&format!(
        r#"
[store]
kind = "memory"

[webhook]
allow_unverified = true

[cache]
dir = "{}"
ttl_seconds = 600
"#,
        cache_dir.path().to_str().unwrap().replace('\\', "/")
    ));
    let config = PortalConfig::from_file(file.path()).unwrap();
    let ctx = FunctionContext::from_config(config).unwrap();

    let response = ctx
        .invoke(PortalFunction::DashboardStats, FunctionRequest::new("GET"))
        .await;
    assert_eq!(response.status, 200);
    assert_eq!(response.body["open_tickets"], 0);
    assert!(cache_dir
        .path()
        .join(format!("{}.json", hex::encode("dashboard:all")))
        .exists());
}
