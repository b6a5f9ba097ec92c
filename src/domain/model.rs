use crate::utils::error::{PortalError, Result};
use crate::utils::validation::validate_currency;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Pending,
    Paid,
    Overdue,
    Cancelled,
}

impl InvoiceStatus {
    pub const ALL: [InvoiceStatus; 4] = [
        InvoiceStatus::Pending,
        InvoiceStatus::Paid,
        InvoiceStatus::Overdue,
        InvoiceStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Pending => "pending",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Overdue => "overdue",
            InvoiceStatus::Cancelled => "cancelled",
        }
    }

    /// paid -> pending only happens on a refund.
    pub fn can_transition_to(&self, next: InvoiceStatus) -> bool {
        use InvoiceStatus::*;
        matches!(
            (self, next),
            (Pending, Paid)
                | (Pending, Overdue)
                | (Pending, Cancelled)
                | (Overdue, Paid)
                | (Overdue, Cancelled)
                | (Paid, Pending)
        )
    }

    pub fn is_outstanding(&self) -> bool {
        matches!(self, InvoiceStatus::Pending | InvoiceStatus::Overdue)
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Invoice {
    #[serde(deserialize_with = "text_or_integer_id")]
    pub id: String,
    #[serde(deserialize_with = "text_or_integer_id")]
    pub company_id: String,
    pub number: String,
    #[serde(default)]
    pub description: Option<String>,
    pub amount_cents: i64,
    pub currency: String,
    pub status: InvoiceStatus,
    pub issued_on: NaiveDate,
    pub due_on: NaiveDate,
    #[serde(default)]
    pub paid_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub payment_reference: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Invoice {
    pub fn is_past_due(&self, today: NaiveDate) -> bool {
        self.status == InvoiceStatus::Pending && self.due_on < today
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewInvoice {
    pub company_id: String,
    pub number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub amount_cents: i64,
    pub currency: String,
    pub issued_on: NaiveDate,
    pub due_on: NaiveDate,
}

impl NewInvoice {
    pub fn validate(&self) -> Result<()> {
        require_non_empty("company_id", &self.company_id)?;
        require_non_empty("number", &self.number)?;
        if self.amount_cents <= 0 {
            return Err(PortalError::validation("amount_cents must be positive"));
        }
        validate_currency("currency", &self.currency)
            .map_err(|_| PortalError::validation("currency must be a three-letter code"))?;
        if self.due_on < self.issued_on {
            return Err(PortalError::validation("due_on cannot precede issued_on"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Company {
    #[serde(deserialize_with = "text_or_integer_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCompany {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl NewCompany {
    pub fn validate(&self) -> Result<()> {
        require_non_empty("name", &self.name)?;
        if let Some(email) = &self.email {
            require_email(email)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Open,
    InProgress,
    Resolved,
    Closed,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Open => "open",
            TicketStatus::InProgress => "in_progress",
            TicketStatus::Resolved => "resolved",
            TicketStatus::Closed => "closed",
        }
    }

    pub fn can_transition_to(&self, next: TicketStatus) -> bool {
        use TicketStatus::*;
        matches!(
            (self, next),
            (Open, InProgress)
                | (Open, Resolved)
                | (Open, Closed)
                | (InProgress, Open)
                | (InProgress, Resolved)
                | (InProgress, Closed)
                | (Resolved, Open)
                | (Resolved, Closed)
        )
    }

    pub fn is_open(&self) -> bool {
        matches!(self, TicketStatus::Open | TicketStatus::InProgress)
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum TicketPriority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl TicketPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketPriority::Low => "low",
            TicketPriority::Medium => "medium",
            TicketPriority::High => "high",
            TicketPriority::Urgent => "urgent",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Ticket {
    #[serde(deserialize_with = "text_or_integer_id")]
    pub id: String,
    #[serde(deserialize_with = "text_or_integer_id")]
    pub company_id: String,
    pub subject: String,
    #[serde(default)]
    pub description: Option<String>,
    pub status: TicketStatus,
    #[serde(default)]
    pub priority: TicketPriority,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTicket {
    pub company_id: String,
    pub subject: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: TicketPriority,
}

impl NewTicket {
    pub fn validate(&self) -> Result<()> {
        require_non_empty("company_id", &self.company_id)?;
        require_non_empty("subject", &self.subject)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnboardingStatus {
    NotStarted,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OnboardingStep {
    pub name: String,
    #[serde(default)]
    pub completed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OnboardingProcess {
    #[serde(deserialize_with = "text_or_integer_id")]
    pub id: String,
    #[serde(deserialize_with = "text_or_integer_id")]
    pub company_id: String,
    #[serde(default, deserialize_with = "optional_text_or_integer_id")]
    pub employee_id: Option<String>,
    pub title: String,
    pub status: OnboardingStatus,
    #[serde(default)]
    pub steps: Vec<OnboardingStep>,
    #[serde(default)]
    pub started_on: Option<NaiveDate>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl OnboardingProcess {
    /// Marks one step done and derives the process status from the step list.
    pub fn complete_step(&mut self, index: usize, now: DateTime<Utc>) -> Result<()> {
        let step_count = self.steps.len();
        let step = self.steps.get_mut(index).ok_or_else(|| {
            PortalError::validation(format!(
                "step {} out of range ({} steps)",
                index, step_count
            ))
        })?;
        step.completed = true;

        let done = self.steps.iter().filter(|s| s.completed).count();
        self.status = if done == 0 {
            OnboardingStatus::NotStarted
        } else if done < self.steps.len() {
            OnboardingStatus::InProgress
        } else {
            OnboardingStatus::Completed
        };

        if self.status == OnboardingStatus::Completed && self.completed_at.is_none() {
            self.completed_at = Some(now);
        }
        if self.started_on.is_none() {
            self.started_on = Some(now.date_naive());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOnboardingProcess {
    pub company_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub employee_id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub steps: Vec<String>,
}

impl NewOnboardingProcess {
    pub fn validate(&self) -> Result<()> {
        require_non_empty("company_id", &self.company_id)?;
        require_non_empty("title", &self.title)?;
        if self.steps.iter().any(|s| s.trim().is_empty()) {
            return Err(PortalError::validation("onboarding steps need a name"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Employee {
    #[serde(deserialize_with = "text_or_integer_id")]
    pub id: String,
    #[serde(deserialize_with = "text_or_integer_id")]
    pub company_id: String,
    pub full_name: String,
    pub email: String,
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub hired_on: Option<NaiveDate>,
    #[serde(default = "default_true")]
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEmployee {
    pub company_id: String,
    pub full_name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hired_on: Option<NaiveDate>,
}

impl NewEmployee {
    pub fn validate(&self) -> Result<()> {
        require_non_empty("company_id", &self.company_id)?;
        require_non_empty("full_name", &self.full_name)?;
        require_email(&self.email)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentOutcome {
    Succeeded,
    Failed,
    Pending,
    Refunded,
    Unknown,
}

impl PaymentOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentOutcome::Succeeded => "succeeded",
            PaymentOutcome::Failed => "failed",
            PaymentOutcome::Pending => "pending",
            PaymentOutcome::Refunded => "refunded",
            PaymentOutcome::Unknown => "unknown",
        }
    }
}

/// One processed webhook delivery, keyed by the provider's event id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentEvent {
    #[serde(deserialize_with = "text_or_integer_id")]
    pub id: String,
    #[serde(deserialize_with = "text_or_integer_id")]
    pub invoice_id: String,
    pub outcome: PaymentOutcome,
    pub provider_status: String,
    #[serde(default)]
    pub amount_cents: Option<i64>,
    pub received_at: DateTime<Utc>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Integer(i64),
}

impl From<RawId> for String {
    fn from(raw: RawId) -> Self {
        match raw {
            RawId::Text(text) => text,
            RawId::Integer(n) => n.to_string(),
        }
    }
}

/// Tables keyed by uuid send text ids, serial tables send integers.
fn text_or_integer_id<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    RawId::deserialize(deserializer).map(String::from)
}

fn optional_text_or_integer_id<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<RawId>::deserialize(deserializer).map(|raw| raw.map(String::from))
}

fn default_true() -> bool {
    true
}

fn require_non_empty(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(PortalError::validation(format!("{} is required", field)));
    }
    Ok(())
}

fn require_email(email: &str) -> Result<()> {
    match email.split_once('@') {
        Some((user, domain)) if !user.is_empty() && domain.contains('.') => Ok(()),
        _ => Err(PortalError::validation(format!("invalid email: {}", email))),
    }
}
