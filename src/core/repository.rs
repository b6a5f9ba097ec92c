use crate::domain::model::{
    Company, Employee, Invoice, InvoiceStatus, NewCompany, NewEmployee, NewInvoice,
    NewOnboardingProcess, NewTicket, OnboardingProcess, OnboardingStatus, OnboardingStep,
    PaymentEvent, Ticket, TicketStatus,
};
use crate::domain::ports::{Clock, Filter, RecordStore, SystemClock, Table};
use crate::utils::error::{PortalError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// Typed CRUD over a `RecordStore`.
#[derive(Clone)]
pub struct PortalRepository {
    store: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
}

impl PortalRepository {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<dyn RecordStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    async fn fetch<T: DeserializeOwned>(&self, table: Table, filter: &Filter) -> Result<Vec<T>> {
        let rows = self.store.select(table, filter).await?;
        rows.into_iter()
            .map(|row| serde_json::from_value(row).map_err(PortalError::from))
            .collect()
    }

    async fn fetch_one<T: DeserializeOwned>(
        &self,
        table: Table,
        entity: &'static str,
        id: &str,
    ) -> Result<T> {
        self.fetch(table, &Filter::by_id(id).limit(1))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| PortalError::not_found(entity, id))
    }

    async fn insert<I: Serialize, T: DeserializeOwned>(
        &self,
        table: Table,
        input: &I,
        extra: Value,
    ) -> Result<T> {
        let mut row = serde_json::to_value(input)?;
        if let (Some(object), Value::Object(extra)) = (row.as_object_mut(), extra) {
            object.extend(extra);
        }
        let inserted = self.store.insert(table, row).await?;
        Ok(serde_json::from_value(inserted)?)
    }

    async fn update_one<T: DeserializeOwned>(
        &self,
        table: Table,
        filter: &Filter,
        patch: Value,
    ) -> Result<Option<T>> {
        let rows = self.store.update(table, filter, patch).await?;
        rows.into_iter()
            .next()
            .map(serde_json::from_value)
            .transpose()
            .map_err(PortalError::from)
    }

    // invoices

    pub async fn list_invoices(&self) -> Result<Vec<Invoice>> {
        self.fetch(Table::Invoices, &Filter::new().order_by("due_on", false))
            .await
    }

    pub async fn invoices_for_company(&self, company_id: &str) -> Result<Vec<Invoice>> {
        self.fetch(
            Table::Invoices,
            &Filter::new()
                .eq("company_id", company_id)
                .order_by("due_on", false),
        )
        .await
    }

    pub async fn invoices_with_status(&self, status: InvoiceStatus) -> Result<Vec<Invoice>> {
        self.fetch(Table::Invoices, &Filter::new().eq("status", status.as_str()))
            .await
    }

    pub async fn get_invoice(&self, id: &str) -> Result<Invoice> {
        self.fetch_one(Table::Invoices, "Invoice", id).await
    }

    pub async fn create_invoice(&self, input: &NewInvoice) -> Result<Invoice> {
        input.validate()?;
        self.insert(
            Table::Invoices,
            input,
            json!({"status": InvoiceStatus::Pending}),
        )
        .await
    }

    /// Compare-and-set on the current status. `None` means the row was not
    /// in `from` any more (or is gone).
    pub async fn set_invoice_status(
        &self,
        id: &str,
        from: InvoiceStatus,
        to: InvoiceStatus,
        extra: Map<String, Value>,
    ) -> Result<Option<Invoice>> {
        if !from.can_transition_to(to) {
            return Err(PortalError::InvalidTransition {
                entity: "Invoice",
                from: from.to_string(),
                to: to.to_string(),
            });
        }

        let mut patch = extra;
        patch.insert("status".to_string(), json!(to));
        self.update_one(
            Table::Invoices,
            &Filter::by_id(id).eq("status", from.as_str()),
            Value::Object(patch),
        )
        .await
    }

    // companies

    pub async fn list_companies(&self) -> Result<Vec<Company>> {
        self.fetch(Table::Companies, &Filter::new().order_by("name", false))
            .await
    }

    pub async fn get_company(&self, id: &str) -> Result<Company> {
        self.fetch_one(Table::Companies, "Company", id).await
    }

    pub async fn create_company(&self, input: &NewCompany) -> Result<Company> {
        input.validate()?;
        self.insert(Table::Companies, input, json!({})).await
    }

    // tickets

    pub async fn list_tickets(&self, company_id: Option<&str>) -> Result<Vec<Ticket>> {
        let mut filter = Filter::new().order_by("created_at", true);
        if let Some(company_id) = company_id {
            filter = filter.eq("company_id", company_id);
        }
        self.fetch(Table::Tickets, &filter).await
    }

    pub async fn get_ticket(&self, id: &str) -> Result<Ticket> {
        self.fetch_one(Table::Tickets, "Ticket", id).await
    }

    pub async fn create_ticket(&self, input: &NewTicket) -> Result<Ticket> {
        input.validate()?;
        self.insert(
            Table::Tickets,
            input,
            json!({"status": TicketStatus::Open, "updated_at": self.clock.now()}),
        )
        .await
    }

    pub async fn set_ticket_status(&self, id: &str, next: TicketStatus) -> Result<Ticket> {
        let ticket = self.get_ticket(id).await?;
        if !ticket.status.can_transition_to(next) {
            return Err(PortalError::InvalidTransition {
                entity: "Ticket",
                from: ticket.status.to_string(),
                to: next.to_string(),
            });
        }

        self.update_one(
            Table::Tickets,
            &Filter::by_id(id).eq("status", ticket.status.as_str()),
            json!({"status": next, "updated_at": self.clock.now()}),
        )
        .await?
        .ok_or_else(|| PortalError::Conflict {
            entity: "Ticket",
            id: id.to_string(),
        })
    }

    // onboarding

    pub async fn list_onboarding(&self, company_id: Option<&str>) -> Result<Vec<OnboardingProcess>> {
        let mut filter = Filter::new();
        if let Some(company_id) = company_id {
            filter = filter.eq("company_id", company_id);
        }
        self.fetch(Table::OnboardingProcesses, &filter).await
    }

    pub async fn get_onboarding(&self, id: &str) -> Result<OnboardingProcess> {
        self.fetch_one(Table::OnboardingProcesses, "OnboardingProcess", id)
            .await
    }

    pub async fn create_onboarding(&self, input: &NewOnboardingProcess) -> Result<OnboardingProcess> {
        input.validate()?;
        let steps: Vec<OnboardingStep> = input
            .steps
            .iter()
            .map(|name| OnboardingStep {
                name: name.trim().to_string(),
                completed: false,
            })
            .collect();

        let row = json!({
            "company_id": input.company_id,
            "employee_id": input.employee_id,
            "title": input.title,
            "status": OnboardingStatus::NotStarted,
            "steps": steps,
        });
        let inserted = self.store.insert(Table::OnboardingProcesses, row).await?;
        Ok(serde_json::from_value(inserted)?)
    }

    pub async fn complete_onboarding_step(
        &self,
        id: &str,
        index: usize,
    ) -> Result<OnboardingProcess> {
        let mut process = self.get_onboarding(id).await?;
        process.complete_step(index, self.clock.now())?;

        self.update_one(
            Table::OnboardingProcesses,
            &Filter::by_id(id),
            json!({
                "status": process.status,
                "steps": process.steps,
                "started_on": process.started_on,
                "completed_at": process.completed_at,
            }),
        )
        .await?
        .ok_or_else(|| PortalError::not_found("OnboardingProcess", id))
    }

    // employees

    pub async fn list_employees(&self, company_id: Option<&str>) -> Result<Vec<Employee>> {
        let mut filter = Filter::new().order_by("full_name", false);
        if let Some(company_id) = company_id {
            filter = filter.eq("company_id", company_id);
        }
        self.fetch(Table::Employees, &filter).await
    }

    pub async fn get_employee(&self, id: &str) -> Result<Employee> {
        self.fetch_one(Table::Employees, "Employee", id).await
    }

    pub async fn create_employee(&self, input: &NewEmployee) -> Result<Employee> {
        input.validate()?;
        self.insert(Table::Employees, input, json!({"active": true}))
            .await
    }

    pub async fn deactivate_employee(&self, id: &str) -> Result<Employee> {
        self.update_one(Table::Employees, &Filter::by_id(id), json!({"active": false}))
            .await?
            .ok_or_else(|| PortalError::not_found("Employee", id))
    }

    // payment event ledger

    pub async fn find_payment_event(&self, event_id: &str) -> Result<Option<PaymentEvent>> {
        Ok(self
            .fetch(Table::PaymentEvents, &Filter::by_id(event_id).limit(1))
            .await?
            .into_iter()
            .next())
    }

    /// `false` when another delivery recorded the same event first.
    pub async fn record_payment_event(&self, event: &PaymentEvent) -> Result<bool> {
        match self
            .store
            .insert(Table::PaymentEvents, serde_json::to_value(event)?)
            .await
        {
            Ok(_) => Ok(true),
            Err(PortalError::Upstream { status: 409, .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }
}
