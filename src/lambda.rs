#[cfg(feature = "lambda")]
use lambda_runtime::{run, service_fn, Error, LambdaEvent};
#[cfg(feature = "lambda")]
use portal_fns::config::PortalConfig;
#[cfg(feature = "lambda")]
use portal_fns::utils::{logger, validation::Validate};
#[cfg(feature = "lambda")]
use portal_fns::{FunctionContext, FunctionRequest, FunctionResponse, PortalError, PortalFunction};
#[cfg(feature = "lambda")]
use serde::{Deserialize, Serialize};
#[cfg(feature = "lambda")]
use std::collections::{BTreeMap, HashMap};

/// API gateway proxy event; only the fields the functions read.
#[cfg(feature = "lambda")]
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyRequest {
    pub http_method: String,
    #[serde(default)]
    pub headers: Option<HashMap<String, String>>,
    #[serde(default)]
    pub query_string_parameters: Option<HashMap<String, String>>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub is_base64_encoded: bool,
}

#[cfg(feature = "lambda")]
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyResponse {
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

#[cfg(feature = "lambda")]
impl From<FunctionResponse> for ProxyResponse {
    fn from(response: FunctionResponse) -> Self {
        Self {
            status_code: response.status,
            body: response.body_string(),
            headers: response.headers,
        }
    }
}

#[cfg(feature = "lambda")]
async fn function_handler(
    ctx: FunctionContext,
    function: PortalFunction,
    event: LambdaEvent<ProxyRequest>,
) -> Result<ProxyResponse, Error> {
    let payload = event.payload;
    tracing::info!(
        request_id = %event.context.request_id,
        "Invoking {} ({})",
        function,
        payload.http_method
    );

    // 不支援 binary body
    if payload.is_base64_encoded {
        let err = PortalError::malformed("base64-encoded bodies are not supported");
        return Ok(FunctionResponse::error(&err).into());
    }

    let request = FunctionRequest {
        method: payload.http_method.to_ascii_uppercase(),
        headers: payload
            .headers
            .unwrap_or_default()
            .into_iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v))
            .collect(),
        query: payload.query_string_parameters.unwrap_or_default(),
        body: payload.body.unwrap_or_default().into_bytes(),
    };

    let response = ctx.invoke(function, request).await;
    tracing::info!("{} finished with {}", function, response.status);
    Ok(response.into())
}

#[cfg(feature = "lambda")]
#[tokio::main]
async fn main() -> Result<(), Error> {
    logger::init_lambda_logger();

    let function: PortalFunction = std::env::var("PORTAL_FUNCTION")
        .map_err(|_| PortalError::MissingConfigError {
            field: "PORTAL_FUNCTION".to_string(),
        })?
        .parse()?;

    let config = PortalConfig::from_env()?;
    config.validate()?;
    let ctx = FunctionContext::from_config(config)?;

    tracing::info!("Starting portal function {}", function);
    run(service_fn(move |event| {
        let ctx = ctx.clone();
        async move { function_handler(ctx, function, event).await }
    }))
    .await
}
