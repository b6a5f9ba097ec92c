use crate::core::repository::PortalRepository;
use crate::core::webhook::PaymentNotice;
use crate::domain::model::{Invoice, InvoiceStatus, PaymentEvent, PaymentOutcome};
use crate::utils::error::{PortalError, Result};
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::{json, Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileOutcome {
    Applied,
    AlreadyApplied,
    Duplicate,
    Ignored,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    pub outcome: ReconcileOutcome,
    pub invoice_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<InvoiceStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
}

/// Moves invoices between statuses in response to payments and due dates.
#[derive(Clone)]
pub struct Reconciler {
    repo: PortalRepository,
}

impl Reconciler {
    pub fn new(repo: PortalRepository) -> Self {
        Self { repo }
    }

    pub async fn apply(&self, notice: &PaymentNotice) -> Result<ReconcileReport> {
        if let Some(event_id) = &notice.event_id {
            if self.repo.find_payment_event(event_id).await?.is_some() {
                tracing::info!("Payment event {} already processed", event_id);
                return Ok(ReconcileReport {
                    outcome: ReconcileOutcome::Duplicate,
                    invoice_id: notice.invoice_id.clone(),
                    status: None,
                    event_id: Some(event_id.clone()),
                });
            }
        }

        let invoice = self.repo.get_invoice(&notice.invoice_id).await?;
        tracing::debug!(
            "Invoice {} is {}, provider says {} ({})",
            invoice.id,
            invoice.status,
            notice.provider_status,
            notice.outcome.as_str()
        );

        let (outcome, status) = match notice.outcome {
            PaymentOutcome::Succeeded => {
                let (outcome, invoice) = self
                    .transition(
                        &invoice,
                        InvoiceStatus::Paid,
                        self.paid_patch(notice.payment_reference.as_deref()),
                    )
                    .await?;
                (outcome, invoice.status)
            }
            PaymentOutcome::Refunded if invoice.status == InvoiceStatus::Paid => {
                let mut patch = Map::new();
                patch.insert("paid_at".to_string(), Value::Null);
                let (outcome, invoice) = self
                    .transition(&invoice, InvoiceStatus::Pending, patch)
                    .await?;
                (outcome, invoice.status)
            }
            _ => {
                tracing::info!(
                    "Ignoring {} notice for invoice {}",
                    notice.provider_status,
                    invoice.id
                );
                (ReconcileOutcome::Ignored, invoice.status)
            }
        };

        if let Some(event_id) = &notice.event_id {
            let event = PaymentEvent {
                id: event_id.clone(),
                invoice_id: notice.invoice_id.clone(),
                outcome: notice.outcome,
                provider_status: notice.provider_status.clone(),
                amount_cents: notice.amount_cents,
                received_at: self.repo.clock().now(),
            };
            if !self.repo.record_payment_event(&event).await? {
                tracing::warn!("Payment event {} was recorded concurrently", event_id);
            }
        }

        Ok(ReconcileReport {
            outcome,
            invoice_id: notice.invoice_id.clone(),
            status: Some(status),
            event_id: notice.event_id.clone(),
        })
    }

    /// Manual path behind the mark-invoice-paid function.
    pub async fn mark_paid(
        &self,
        invoice_id: &str,
        payment_reference: Option<&str>,
    ) -> Result<(ReconcileOutcome, Invoice)> {
        let invoice = self.repo.get_invoice(invoice_id).await?;
        self.transition(
            &invoice,
            InvoiceStatus::Paid,
            self.paid_patch(payment_reference),
        )
        .await
    }

    /// Pending invoices due before `today` become overdue. Returns the moved rows.
    pub async fn sweep_overdue(&self, today: NaiveDate) -> Result<Vec<Invoice>> {
        let pending = self.repo.invoices_with_status(InvoiceStatus::Pending).await?;
        let mut moved = Vec::new();

        for invoice in pending.iter().filter(|i| i.is_past_due(today)) {
            let updated = self
                .repo
                .set_invoice_status(
                    &invoice.id,
                    InvoiceStatus::Pending,
                    InvoiceStatus::Overdue,
                    Map::new(),
                )
                .await?;
            match updated {
                Some(invoice) => moved.push(invoice),
                None => tracing::debug!("Invoice {} changed during sweep", invoice.id),
            }
        }

        tracing::info!("Marked {} invoice(s) overdue", moved.len());
        Ok(moved)
    }

    async fn transition(
        &self,
        invoice: &Invoice,
        target: InvoiceStatus,
        patch: Map<String, Value>,
    ) -> Result<(ReconcileOutcome, Invoice)> {
        if invoice.status == target {
            return Ok((ReconcileOutcome::AlreadyApplied, invoice.clone()));
        }
        if !invoice.status.can_transition_to(target) {
            return Err(PortalError::InvalidTransition {
                entity: "Invoice",
                from: invoice.status.to_string(),
                to: target.to_string(),
            });
        }

        if let Some(updated) = self
            .repo
            .set_invoice_status(&invoice.id, invoice.status, target, patch)
            .await?
        {
            tracing::info!("Invoice {}: {} -> {}", invoice.id, invoice.status, target);
            return Ok((ReconcileOutcome::Applied, updated));
        }

        // lost the compare-and-set; see where the row ended up
        let current = self.repo.get_invoice(&invoice.id).await?;
        if current.status == target {
            Ok((ReconcileOutcome::AlreadyApplied, current))
        } else {
            Err(PortalError::Conflict {
                entity: "Invoice",
                id: invoice.id.clone(),
            })
        }
    }

    fn paid_patch(&self, payment_reference: Option<&str>) -> Map<String, Value> {
        let mut patch = Map::new();
        patch.insert("paid_at".to_string(), json!(self.repo.clock().now()));
        if let Some(reference) = payment_reference {
            patch.insert("payment_reference".to_string(), json!(reference));
        }
        patch
    }
}
