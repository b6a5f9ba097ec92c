use httpmock::prelude::*;
use httpmock::Method::PATCH;
use portal_fns::core::reconcile::{ReconcileOutcome, Reconciler};
use portal_fns::core::repository::PortalRepository;
use portal_fns::core::webhook::PaymentNotice;
use portal_fns::domain::model::InvoiceStatus;
use portal_fns::{PortalError, RestStore};
use serde_json::json;
use std::sync::Arc;

fn invoice_json(status: &str) -> serde_json::Value {
    json!({
        "id": "inv-7",
        "company_id": "c-1",
        "number": "2024-007",
        "amount_cents": 4200,
        "currency": "EUR",
        "status": status,
        "issued_on": "2024-06-01",
        "due_on": "2024-06-30"
    })
}

fn repo(server: &MockServer) -> PortalRepository {
    PortalRepository::new(Arc::new(
        RestStore::new(server.base_url(), "service-key").unwrap(),
    ))
}

#[tokio::test]
async fn test_get_invoice_sends_filters_and_keys() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET)
            .path("/rest/v1/invoices")
            .query_param("select", "*")
            .query_param("id", "eq.inv-7")
            .query_param("limit", "1")
            .header("apikey", "service-key")
            .header("authorization", "Bearer service-key");
        then.status(200).json_body(json!([invoice_json("pending")]));
    });

    let invoice = repo(&server).get_invoice("inv-7").await.unwrap();
    mock.assert();
    assert_eq!(invoice.amount_cents, 4200);
    assert_eq!(invoice.status, InvoiceStatus::Pending);
}

#[tokio::test]
async fn test_missing_invoice_is_not_found() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/rest/v1/invoices");
        then.status(200).json_body(json!([]));
    });

    let result = repo(&server).get_invoice("inv-7").await;
    assert!(matches!(result, Err(PortalError::NotFound { .. })));
}

#[tokio::test]
async fn test_status_update_is_compare_and_set() {
    let server = MockServer::start();
    let update = server.mock(|when, then| {
        when.method(PATCH)
            .path("/rest/v1/invoices")
            .query_param("id", "eq.inv-7")
            .query_param("status", "eq.pending")
            .header("prefer", "return=representation");
        then.status(200).json_body(json!([invoice_json("overdue")]));
    });

    let updated = repo(&server)
        .set_invoice_status(
            "inv-7",
            InvoiceStatus::Pending,
            InvoiceStatus::Overdue,
            serde_json::Map::new(),
        )
        .await
        .unwrap();

    update.assert();
    assert_eq!(updated.unwrap().status, InvoiceStatus::Overdue);
}

#[tokio::test]
async fn test_webhook_applies_through_rest_store() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET)
            .path("/rest/v1/payment_events")
            .query_param("id", "eq.evt_1");
        then.status(200).json_body(json!([]));
    });
    server.mock(|when, then| {
        when.method(GET).path("/rest/v1/invoices").query_param("id", "eq.inv-7");
        then.status(200).json_body(json!([invoice_json("pending")]));
    });
    let patch = server.mock(|when, then| {
        when.method(PATCH)
            .path("/rest/v1/invoices")
            .query_param("status", "eq.pending")
            .json_body_partial(r#"{"status": "paid", "payment_reference": "pi_123"}"#);
        then.status(200).json_body(json!([invoice_json("paid")]));
    });
    let ledger = server.mock(|when, then| {
        when.method(POST)
            .path("/rest/v1/payment_events")
            .json_body_partial(r#"{"id": "evt_1", "outcome": "succeeded"}"#);
        then.status(201).json_body(json!([{"id": "evt_1"}]));
    });

    let notice = PaymentNotice::from_payload(&json!({
        "id": "evt_1",
        "invoice_id": "inv-7",
        "status": "paid",
        "payment_reference": "pi_123"
    }))
    .unwrap();
    let report = Reconciler::new(repo(&server)).apply(&notice).await.unwrap();

    patch.assert();
    ledger.assert();
    assert_eq!(report.outcome, ReconcileOutcome::Applied);
    assert_eq!(report.status, Some(InvoiceStatus::Paid));
}

#[tokio::test]
async fn test_duplicate_ledger_insert_is_tolerated() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/rest/v1/payment_events");
        then.status(409)
            .json_body(json!({"code": "23505", "message": "duplicate key value"}));
    });

    let recorded = repo(&server)
        .record_payment_event(&portal_fns::domain::model::PaymentEvent {
            id: "evt_1".to_string(),
            invoice_id: "inv-7".to_string(),
            outcome: portal_fns::domain::model::PaymentOutcome::Succeeded,
            provider_status: "paid".to_string(),
            amount_cents: None,
            received_at: chrono::Utc::now(),
        })
        .await
        .unwrap();
    assert!(!recorded);
}

#[tokio::test]
async fn test_upstream_error_carries_message() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/rest/v1/companies");
        then.status(401).json_body(json!({"message": "Invalid API key"}));
    });

    match repo(&server).list_companies().await {
        Err(PortalError::Upstream { status, message }) => {
            assert_eq!(status, 401);
            assert_eq!(message, "Invalid API key");
        }
        other => panic!("expected upstream error, got {:?}", other.map(|c| c.len())),
    }
}
