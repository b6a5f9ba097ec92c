use crate::core::functions::{FunctionContext, FunctionRequest, FunctionResponse, PortalFunction};
use crate::domain::model::{
    Company, Employee, Invoice, InvoiceStatus, NewCompany, NewEmployee, NewInvoice,
    NewOnboardingProcess, NewTicket, OnboardingProcess, Ticket, TicketStatus,
};
use crate::utils::error::{PortalError, Result};
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;

pub async fn health_handler() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn function_handler(
    State(ctx): State<FunctionContext>,
    Path(name): Path<String>,
    method: Method,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> Response {
    let Ok(function) = name.parse::<PortalFunction>() else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("Function {} not found", name) })),
        )
            .into_response();
    };

    let request = FunctionRequest {
        method: method.as_str().to_string(),
        headers: headers
            .iter()
            .filter_map(|(k, v)| {
                v.to_str()
                    .ok()
                    .map(|v| (k.as_str().to_string(), v.to_string()))
            })
            .collect(),
        query,
        body: body.to_vec(),
    };

    into_http(ctx.invoke(function, request).await)
}

fn into_http(response: FunctionResponse) -> Response {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = response.body_string();
    let mut http = (status, body).into_response();

    for (name, value) in &response.headers {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            http.headers_mut().insert(name, value);
        }
    }
    http
}

fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T> {
    serde_json::from_slice(body).map_err(|e| PortalError::malformed(e.to_string()))
}

fn authorize(ctx: &FunctionContext, headers: &HeaderMap) -> Result<()> {
    let authorization = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok());
    ctx.check_service_token(authorization)
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub company_id: Option<String>,
    pub status: Option<InvoiceStatus>,
}

// invoices

pub async fn list_invoices(
    State(ctx): State<FunctionContext>,
    headers: HeaderMap,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Invoice>>> {
    authorize(&ctx, &headers)?;
    let repo = ctx.repo();
    let mut invoices = match &params.company_id {
        Some(company_id) => repo.invoices_for_company(company_id).await?,
        None => repo.list_invoices().await?,
    };
    if let Some(status) = params.status {
        invoices.retain(|i| i.status == status);
    }
    Ok(Json(invoices))
}

pub async fn create_invoice(
    State(ctx): State<FunctionContext>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<Invoice>)> {
    authorize(&ctx, &headers)?;
    let input: NewInvoice = parse_body(&body)?;
    let invoice = ctx.repo().create_invoice(&input).await?;
    ctx.invalidate_dashboard(&invoice.company_id).await;
    tracing::info!("Created invoice {} for {}", invoice.number, invoice.company_id);
    Ok((StatusCode::CREATED, Json(invoice)))
}

pub async fn get_invoice(
    State(ctx): State<FunctionContext>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Invoice>> {
    authorize(&ctx, &headers)?;
    Ok(Json(ctx.repo().get_invoice(&id).await?))
}

// companies

pub async fn list_companies(
    State(ctx): State<FunctionContext>,
    headers: HeaderMap,
) -> Result<Json<Vec<Company>>> {
    authorize(&ctx, &headers)?;
    Ok(Json(ctx.repo().list_companies().await?))
}

pub async fn create_company(
    State(ctx): State<FunctionContext>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<Company>)> {
    authorize(&ctx, &headers)?;
    let input: NewCompany = parse_body(&body)?;
    Ok((StatusCode::CREATED, Json(ctx.repo().create_company(&input).await?)))
}

pub async fn get_company(
    State(ctx): State<FunctionContext>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Company>> {
    authorize(&ctx, &headers)?;
    Ok(Json(ctx.repo().get_company(&id).await?))
}

// tickets

pub async fn list_tickets(
    State(ctx): State<FunctionContext>,
    headers: HeaderMap,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Ticket>>> {
    authorize(&ctx, &headers)?;
    Ok(Json(
        ctx.repo().list_tickets(params.company_id.as_deref()).await?,
    ))
}

pub async fn create_ticket(
    State(ctx): State<FunctionContext>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<Ticket>)> {
    authorize(&ctx, &headers)?;
    let input: NewTicket = parse_body(&body)?;
    let ticket = ctx.repo().create_ticket(&input).await?;
    ctx.invalidate_dashboard(&ticket.company_id).await;
    Ok((StatusCode::CREATED, Json(ticket)))
}

pub async fn get_ticket(
    State(ctx): State<FunctionContext>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Ticket>> {
    authorize(&ctx, &headers)?;
    Ok(Json(ctx.repo().get_ticket(&id).await?))
}

#[derive(Debug, Deserialize)]
pub struct TicketStatusChange {
    pub status: TicketStatus,
}

pub async fn update_ticket_status(
    State(ctx): State<FunctionContext>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<Ticket>> {
    authorize(&ctx, &headers)?;
    let change: TicketStatusChange = parse_body(&body)?;
    let ticket = ctx.repo().set_ticket_status(&id, change.status).await?;
    ctx.invalidate_dashboard(&ticket.company_id).await;
    Ok(Json(ticket))
}

// onboarding

pub async fn list_onboarding(
    State(ctx): State<FunctionContext>,
    headers: HeaderMap,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<OnboardingProcess>>> {
    authorize(&ctx, &headers)?;
    Ok(Json(
        ctx.repo()
            .list_onboarding(params.company_id.as_deref())
            .await?,
    ))
}

pub async fn create_onboarding(
    State(ctx): State<FunctionContext>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<OnboardingProcess>)> {
    authorize(&ctx, &headers)?;
    let input: NewOnboardingProcess = parse_body(&body)?;
    let process = ctx.repo().create_onboarding(&input).await?;
    ctx.invalidate_dashboard(&process.company_id).await;
    Ok((StatusCode::CREATED, Json(process)))
}

pub async fn get_onboarding(
    State(ctx): State<FunctionContext>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<OnboardingProcess>> {
    authorize(&ctx, &headers)?;
    Ok(Json(ctx.repo().get_onboarding(&id).await?))
}

pub async fn complete_onboarding_step(
    State(ctx): State<FunctionContext>,
    headers: HeaderMap,
    Path((id, index)): Path<(String, usize)>,
) -> Result<Json<OnboardingProcess>> {
    authorize(&ctx, &headers)?;
    let process = ctx.repo().complete_onboarding_step(&id, index).await?;
    ctx.invalidate_dashboard(&process.company_id).await;
    Ok(Json(process))
}

// employees

pub async fn list_employees(
    State(ctx): State<FunctionContext>,
    headers: HeaderMap,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Employee>>> {
    authorize(&ctx, &headers)?;
    Ok(Json(
        ctx.repo()
            .list_employees(params.company_id.as_deref())
            .await?,
    ))
}

pub async fn create_employee(
    State(ctx): State<FunctionContext>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<Employee>)> {
    authorize(&ctx, &headers)?;
    let input: NewEmployee = parse_body(&body)?;
    let employee = ctx.repo().create_employee(&input).await?;
    ctx.invalidate_dashboard(&employee.company_id).await;
    Ok((StatusCode::CREATED, Json(employee)))
}

pub async fn get_employee(
    State(ctx): State<FunctionContext>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Employee>> {
    authorize(&ctx, &headers)?;
    Ok(Json(ctx.repo().get_employee(&id).await?))
}

pub async fn deactivate_employee(
    State(ctx): State<FunctionContext>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Employee>> {
    authorize(&ctx, &headers)?;
    let employee = ctx.repo().deactivate_employee(&id).await?;
    ctx.invalidate_dashboard(&employee.company_id).await;
    Ok(Json(employee))
}
