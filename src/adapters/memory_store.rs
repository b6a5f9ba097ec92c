use crate::domain::ports::{Clock, Filter, RecordStore, SystemClock, Table};
use crate::utils::error::{PortalError, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// In-process `RecordStore` for tests and `--store memory` runs.
#[derive(Clone)]
pub struct MemoryStore {
    tables: Arc<Mutex<HashMap<Table, Vec<Value>>>>,
    next_id: Arc<AtomicU64>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            tables: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
            clock,
        }
    }

    /// Seeds rows as-is, without assigning ids.
    pub async fn seed(&self, table: Table, rows: Vec<Value>) {
        let mut tables = self.tables.lock().await;
        tables.entry(table).or_default().extend(rows);
    }

    pub async fn rows(&self, table: Table) -> Vec<Value> {
        let tables = self.tables.lock().await;
        tables.get(&table).cloned().unwrap_or_default()
    }

    fn next_id(&self, table: Table) -> String {
        let n = self.next_id.fetch_add(1, AtomicOrdering::SeqCst);
        format!("{}-{}", table.name(), n)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn select(&self, table: Table, filter: &Filter) -> Result<Vec<Value>> {
        let tables = self.tables.lock().await;
        let mut rows: Vec<Value> = tables
            .get(&table)
            .map(|rows| rows.iter().filter(|r| filter.matches(r)).cloned().collect())
            .unwrap_or_default();

        if let Some(order) = &filter.order {
            rows.sort_by(|a, b| {
                let ordering = compare_values(a.get(&order.column), b.get(&order.column));
                if order.descending {
                    ordering.reverse()
                } else {
                    ordering
                }
            });
        }
        if let Some(limit) = filter.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    async fn insert(&self, table: Table, mut row: Value) -> Result<Value> {
        let object = row
            .as_object_mut()
            .ok_or_else(|| PortalError::malformed(format!("row for {} must be an object", table)))?;

        if !object.contains_key("id") {
            object.insert("id".to_string(), Value::String(self.next_id(table)));
        }
        if table != Table::PaymentEvents && !object.contains_key("created_at") {
            object.insert(
                "created_at".to_string(),
                serde_json::to_value(self.clock.now())?,
            );
        }

        let mut tables = self.tables.lock().await;
        let rows = tables.entry(table).or_default();
        if rows.iter().any(|r| r.get("id") == row.get("id")) {
            return Err(PortalError::Upstream {
                status: 409,
                message: format!("duplicate key value violates unique constraint on {}", table),
            });
        }
        rows.push(row.clone());
        Ok(row)
    }

    async fn update(&self, table: Table, filter: &Filter, patch: Value) -> Result<Vec<Value>> {
        let patch = match patch {
            Value::Object(map) => map,
            _ => return Err(PortalError::malformed("patch must be an object")),
        };

        let mut tables = self.tables.lock().await;
        let mut updated = Vec::new();
        if let Some(rows) = tables.get_mut(&table) {
            for row in rows.iter_mut().filter(|r| filter.matches(r)) {
                if let Some(object) = row.as_object_mut() {
                    for (key, value) in &patch {
                        object.insert(key.clone(), value.clone());
                    }
                }
                updated.push(row.clone());
            }
        }
        Ok(updated)
    }

    async fn delete(&self, table: Table, filter: &Filter) -> Result<usize> {
        let mut tables = self.tables.lock().await;
        let Some(rows) = tables.get_mut(&table) else {
            return Ok(0);
        };
        let before = rows.len();
        rows.retain(|r| !filter.matches(r));
        Ok(before - rows.len())
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (None, Some(_)) | (Some(Value::Null), Some(_)) => Ordering::Less,
        (Some(_), None) | (Some(_), Some(Value::Null)) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}
