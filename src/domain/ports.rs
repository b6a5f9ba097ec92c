use crate::utils::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::fmt;

/// Tables of the hosted database this crate touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Invoices,
    Companies,
    Tickets,
    OnboardingProcesses,
    Employees,
    PaymentEvents,
}

impl Table {
    pub fn name(&self) -> &'static str {
        match self {
            Table::Invoices => "invoices",
            Table::Companies => "companies",
            Table::Tickets => "tickets",
            Table::OnboardingProcesses => "onboarding_processes",
            Table::Employees => "employees",
            Table::PaymentEvents => "payment_events",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub column: String,
    pub descending: bool,
}

/// Conjunction of `column = value` conditions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    pub conditions: Vec<(String, Value)>,
    pub order: Option<Order>,
    pub limit: Option<usize>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn by_id(id: &str) -> Self {
        Self::new().eq("id", id)
    }

    pub fn eq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.conditions.push((column.to_string(), value.into()));
        self
    }

    pub fn order_by(mut self, column: &str, descending: bool) -> Self {
        self.order = Some(Order {
            column: column.to_string(),
            descending,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether a JSON row satisfies every condition.
    ///
    /// Numbers and strings compare by their text, the way `eq.` filters do
    /// on the REST API.
    pub fn matches(&self, row: &Value) -> bool {
        self.conditions.iter().all(|(column, expected)| {
            row.get(column)
                .is_some_and(|actual| same_scalar(actual, expected))
        })
    }
}

fn same_scalar(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::String(s), Value::Number(n)) | (Value::Number(n), Value::String(s)) => {
            *s == n.to_string()
        }
        _ => a == b,
    }
}

/// Generic select/insert/update/delete over the hosted table API.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn select(&self, table: Table, filter: &Filter) -> Result<Vec<Value>>;
    async fn insert(&self, table: Table, row: Value) -> Result<Value>;
    /// Returns the rows after the patch; an empty vec means nothing matched.
    async fn update(&self, table: Table, filter: &Filter, patch: Value) -> Result<Vec<Value>>;
    async fn delete(&self, table: Table, filter: &Filter) -> Result<usize>;
}

pub trait KeyValueStorage: Send + Sync {
    fn get(&self, key: &str) -> impl std::future::Future<Output = Result<Option<Vec<u8>>>> + Send;
    fn set(
        &self,
        key: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
    fn remove(&self, key: &str) -> impl std::future::Future<Output = Result<()>> + Send;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
