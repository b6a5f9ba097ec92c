use crate::core::repository::PortalRepository;
use crate::domain::model::{InvoiceStatus, OnboardingStatus, TicketPriority};
use crate::utils::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Aggregates behind the portal's landing dashboard.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardStats {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_id: Option<String>,
    pub invoice_counts: BTreeMap<String, usize>,
    pub total_billed_cents: i64,
    pub paid_cents: i64,
    pub outstanding_cents: i64,
    pub overdue_cents: i64,
    pub currencies: BTreeSet<String>,
    pub open_tickets: usize,
    pub open_tickets_by_priority: BTreeMap<String, usize>,
    pub onboarding_in_progress: usize,
    pub active_employees: usize,
}

impl DashboardStats {
    pub async fn compute(repo: &PortalRepository, company_id: Option<&str>) -> Result<Self> {
        let invoices = match company_id {
            Some(id) => repo.invoices_for_company(id).await?,
            None => repo.list_invoices().await?,
        };
        let (tickets, onboarding, employees) = tokio::try_join!(
            repo.list_tickets(company_id),
            repo.list_onboarding(company_id),
            repo.list_employees(company_id),
        )?;

        let mut stats = DashboardStats {
            company_id: company_id.map(str::to_string),
            ..Default::default()
        };

        for status in InvoiceStatus::ALL {
            stats.invoice_counts.insert(status.as_str().to_string(), 0);
        }

        for invoice in &invoices {
            *stats
                .invoice_counts
                .entry(invoice.status.as_str().to_string())
                .or_default() += 1;
            stats.currencies.insert(invoice.currency.clone());

            // totals clamp instead of wrapping on absurd amounts
            let cents = invoice.amount_cents;
            match invoice.status {
                InvoiceStatus::Cancelled => continue,
                InvoiceStatus::Paid => stats.paid_cents = stats.paid_cents.saturating_add(cents),
                InvoiceStatus::Overdue => {
                    stats.overdue_cents = stats.overdue_cents.saturating_add(cents)
                }
                InvoiceStatus::Pending => {}
            }
            if invoice.status.is_outstanding() {
                stats.outstanding_cents = stats.outstanding_cents.saturating_add(cents);
            }
            stats.total_billed_cents = stats.total_billed_cents.saturating_add(cents);
        }

        for priority in [
            TicketPriority::Low,
            TicketPriority::Medium,
            TicketPriority::High,
            TicketPriority::Urgent,
        ] {
            stats
                .open_tickets_by_priority
                .insert(priority.as_str().to_string(), 0);
        }
        for ticket in tickets.iter().filter(|t| t.status.is_open()) {
            stats.open_tickets += 1;
            *stats
                .open_tickets_by_priority
                .entry(ticket.priority.as_str().to_string())
                .or_default() += 1;
        }

        stats.onboarding_in_progress = onboarding
            .iter()
            .filter(|p| p.status == OnboardingStatus::InProgress)
            .count();
        stats.active_employees = employees.iter().filter(|e| e.active).count();

        Ok(stats)
    }
}
