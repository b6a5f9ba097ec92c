use crate::domain::ports::{Filter, RecordStore, Table};
use crate::utils::error::{PortalError, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde_json::Value;
use std::time::Duration;

/// `RecordStore` over a hosted table REST API (`{base}/rest/v1/{table}`).
///
/// Filters are rendered as `column=eq.value` query pairs and every request
/// asks for the affected rows back with `Prefer: return=representation`.
#[derive(Debug, Clone)]
pub struct RestStore {
    client: Client,
    base_url: String,
    api_key: String,
}

impl RestStore {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        Self::with_timeout(base_url, api_key, Duration::from_secs(30))
    }

    pub fn with_timeout(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    fn table_url(&self, table: Table) -> String {
        format!("{}/rest/v1/{}", self.base_url, table.name())
    }

    fn request(&self, method: Method, table: Table, filter: Option<&Filter>) -> RequestBuilder {
        let mut builder = self
            .client
            .request(method, self.table_url(table))
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Prefer", "return=representation");

        if let Some(filter) = filter {
            builder = builder.query(&query_pairs(filter));
        }
        builder
    }

    async fn read_rows(table: Table, response: Response) -> Result<Vec<Value>> {
        let status = response.status();
        tracing::debug!("{} responded with {}", table, status);

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PortalError::Upstream {
                status: status.as_u16(),
                message: upstream_message(&body),
            });
        }

        let body = response.text().await?;
        if body.trim().is_empty() {
            return Ok(Vec::new());
        }

        match serde_json::from_str::<Value>(&body)? {
            Value::Array(rows) => Ok(rows),
            row @ Value::Object(_) => Ok(vec![row]),
            other => Err(PortalError::Upstream {
                status: status.as_u16(),
                message: format!("unexpected response body: {}", other),
            }),
        }
    }
}

#[async_trait]
impl RecordStore for RestStore {
    async fn select(&self, table: Table, filter: &Filter) -> Result<Vec<Value>> {
        let mut pairs = vec![("select".to_string(), "*".to_string())];
        pairs.extend(query_pairs(filter));

        let response = self
            .request(Method::GET, table, None)
            .query(&pairs)
            .send()
            .await?;
        Self::read_rows(table, response).await
    }

    async fn insert(&self, table: Table, row: Value) -> Result<Value> {
        let response = self
            .request(Method::POST, table, None)
            .json(&row)
            .send()
            .await?;

        Self::read_rows(table, response)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| PortalError::Upstream {
                status: 200,
                message: format!("insert into {} returned no row", table),
            })
    }

    async fn update(&self, table: Table, filter: &Filter, patch: Value) -> Result<Vec<Value>> {
        if filter.conditions.is_empty() {
            // 未加條件的 PATCH 會改到整張表
            return Err(PortalError::validation(format!(
                "refusing to update every row of {}",
                table
            )));
        }

        let response = self
            .request(Method::PATCH, table, Some(filter))
            .json(&patch)
            .send()
            .await?;
        Self::read_rows(table, response).await
    }

    async fn delete(&self, table: Table, filter: &Filter) -> Result<usize> {
        if filter.conditions.is_empty() {
            return Err(PortalError::validation(format!(
                "refusing to delete every row of {}",
                table
            )));
        }

        let response = self
            .request(Method::DELETE, table, Some(filter))
            .send()
            .await?;
        Ok(Self::read_rows(table, response).await?.len())
    }
}

fn query_pairs(filter: &Filter) -> Vec<(String, String)> {
    let mut pairs: Vec<(String, String)> = filter
        .conditions
        .iter()
        .map(|(column, value)| {
            let rendered = match value {
                Value::Null => "is.null".to_string(),
                Value::String(s) => format!("eq.{}", s),
                other => format!("eq.{}", other),
            };
            (column.clone(), rendered)
        })
        .collect();

    if let Some(order) = &filter.order {
        let direction = if order.descending { "desc" } else { "asc" };
        pairs.push(("order".to_string(), format!("{}.{}", order.column, direction)));
    }
    if let Some(limit) = filter.limit {
        pairs.push(("limit".to_string(), limit.to_string()));
    }
    pairs
}

fn upstream_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_pairs_rendering() {
        let filter = Filter::by_id("inv-1")
            .eq("amount_cents", 250)
            .eq("paid_at", Value::Null)
            .order_by("due_on", true)
            .limit(10);

        let pairs = query_pairs(&filter);
        assert_eq!(
            pairs,
            vec![
                ("id".to_string(), "eq.inv-1".to_string()),
                ("amount_cents".to_string(), "eq.250".to_string()),
                ("paid_at".to_string(), "is.null".to_string()),
                ("order".to_string(), "due_on.desc".to_string()),
                ("limit".to_string(), "10".to_string()),
            ]
        );
    }

    #[test]
    fn test_upstream_message_prefers_message_field() {
        let body = json!({"code": "23505", "message": "duplicate key"}).to_string();
        assert_eq!(upstream_message(&body), "duplicate key");
        assert_eq!(upstream_message(" gateway timeout "), "gateway timeout");
    }

    #[test]
    fn test_base_url_is_normalized() {
        let store =
            RestStore::with_timeout("https://db.example.com/", "key", Duration::from_secs(5))
                .unwrap();
        assert_eq!(
            store.table_url(Table::Invoices),
            "https://db.example.com/rest/v1/invoices"
        );
    }

    #[tokio::test]
    async fn test_update_without_conditions_is_refused() {
        let store = RestStore::new("http://127.0.0.1:9", "key").unwrap();
        let result = store
            .update(Table::Invoices, &Filter::new(), json!({"status": "paid"}))
            .await;
        assert!(matches!(result, Err(PortalError::ValidationError { .. })));
    }
}
