//! Local HTTP host for the portal functions.
//!
//! Mounts every function at `/functions/v1/{name}` the way the hosted
//! platform does, plus thin CRUD routes under `/api` for the portal UI
//! during development. Requests are traced with `tower-http`.

pub mod error;
pub mod routes;

use crate::config::portal::PortalConfig;
use crate::core::functions::FunctionContext;
use crate::utils::error::{PortalError, Result};
use axum::{
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    routing::{any, get, patch, post},
    Router,
};
use std::time::Duration;
use tokio::{net::TcpListener, signal};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

use routes::*;

pub fn router(ctx: FunctionContext) -> Router {
    let api = Router::new()
        .route("/invoices", get(list_invoices).post(create_invoice))
        .route("/invoices/{id}", get(get_invoice))
        .route("/companies", get(list_companies).post(create_company))
        .route("/companies/{id}", get(get_company))
        .route("/tickets", get(list_tickets).post(create_ticket))
        .route("/tickets/{id}", get(get_ticket))
        .route("/tickets/{id}/status", patch(update_ticket_status))
        .route("/onboarding", get(list_onboarding).post(create_onboarding))
        .route("/onboarding/{id}", get(get_onboarding))
        .route(
            "/onboarding/{id}/steps/{index}/complete",
            post(complete_onboarding_step),
        )
        .route("/employees", get(list_employees).post(create_employee))
        .route("/employees/{id}", get(get_employee))
        .route("/employees/{id}/deactivate", post(deactivate_employee))
        .layer(cors_layer(&ctx.config().server.allowed_origins));

    // Function responses carry their own CORS headers.
    Router::new()
        .route("/health", get(health_handler))
        .route("/functions/v1/{name}", any(function_handler))
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .max_age(Duration::from_secs(60 * 60));

    if allowed_origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid allowed origin {:?}", o);
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}

/// Binds `0.0.0.0:{server.port}` and serves until Ctrl+C or SIGTERM.
pub async fn serve(config: PortalConfig) -> Result<()> {
    let port = config.server.port;
    let ctx = FunctionContext::from_config(config)?;
    let app = router(ctx);

    let address = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&address).await?;
    info!("Portal functions listening on {}", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(PortalError::IoError)?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MemoryStore;
    use crate::config::portal::{SecretString, StoreKind};
    use serde_json::{json, Value};
    use std::sync::Arc;

    async fn spawn() -> String {
        let mut config = PortalConfig::default();
        config.store.kind = StoreKind::Memory;
        config.webhook.secret = Some(SecretString::new("whsec"));

        let ctx = FunctionContext::new(config, Arc::new(MemoryStore::new()));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(ctx)).await.unwrap();
        });
        format!("http://{}", address)
    }

    #[tokio::test]
    async fn test_health() {
        let base = spawn().await;
        let body: Value = reqwest::get(format!("{}/health", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_unknown_function_is_404() {
        let base = spawn().await;
        let response = reqwest::get(format!("{}/functions/v1/send-email", base))
            .await
            .unwrap();
        assert_eq!(response.status(), 404);
    }

    #[tokio::test]
    async fn test_company_crud_and_validation_errors() {
        let base = spawn().await;
        let client = reqwest::Client::new();

        let created = client
            .post(format!("{}/api/companies", base))
            .json(&json!({"name": "Acme", "email": "billing@acme.test"}))
            .send()
            .await
            .unwrap();
        assert_eq!(created.status(), 201);
        let company: Value = created.json().await.unwrap();

        let fetched: Value = client
            .get(format!("{}/api/companies/{}", base, company["id"].as_str().unwrap()))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(fetched["name"], "Acme");

        let rejected = client
            .post(format!("{}/api/companies", base))
            .json(&json!({"name": "  "}))
            .send()
            .await
            .unwrap();
        assert_eq!(rejected.status(), 400);
        let error: Value = rejected.json().await.unwrap();
        assert!(error["error"].is_string());

        let missing = client
            .get(format!("{}/api/companies/nope", base))
            .send()
            .await
            .unwrap();
        assert_eq!(missing.status(), 404);
    }
}
