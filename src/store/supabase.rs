//! Supabase (PostgREST) document store using the service_role key
//!
//! Live queries are served by polling: the first select runs inline so a
//! failure surfaces as a failed subscription, after which a background task
//! re-runs the select and emits a snapshot whenever the result changed.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder, Response, StatusCode};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{
    Bound, Document, DocumentStore, Fields, Filter, Query, Snapshot, SortOrder, StoreError,
    StoreResult, Subscription,
};

/// Supabase client for server-side database operations
/// Uses service_role key which bypasses RLS - handle with care!
#[derive(Clone)]
pub struct SupabaseClient {
    client: Client,
    base_url: String,
    service_role_key: String,
    poll_interval: Duration,
}

impl SupabaseClient {
    pub fn new(base_url: &str, service_role_key: &str, poll_interval: Duration) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            service_role_key: service_role_key.to_string(),
            poll_interval,
        }
    }

    /// Get the REST API URL for a table
    fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.service_role_key)
            .header(
                header::AUTHORIZATION,
                format!("Bearer {}", self.service_role_key),
            )
            .header(header::CONTENT_TYPE, "application/json")
    }

    async fn check(response: Response) -> StoreResult<Response> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Run a query once
    async fn select(&self, query: &Query) -> StoreResult<Vec<Document>> {
        let response = self
            .authed(self.client.get(self.rest_url(&query.collection)))
            .query(&query_params(query))
            .send()
            .await?;
        let rows: Vec<Value> = Self::check(response).await?.json().await?;
        rows.iter().map(document_from_row).collect()
    }
}

/// Translate a query into PostgREST parameters
fn query_params(query: &Query) -> Vec<(String, String)> {
    let mut params = vec![filter_param(&query.filter)];

    if let Some(order) = &query.order {
        let dir = match order.order {
            SortOrder::Ascending => "asc",
            SortOrder::Descending => "desc",
        };
        params.push(("order".into(), format!("{0}.{dir},id.{dir}", order.field)));

        if let Some(bound) = &query.bound {
            let (op, cursor) = match bound {
                Bound::After(cursor) => ("gt", cursor),
                Bound::Before(cursor) => ("lt", cursor),
            };
            let value = literal(&cursor.sort_value);
            params.push((
                "or".into(),
                format!(
                    "({field}.{op}.{value},and({field}.eq.{value},id.{op}.{id}))",
                    field = order.field,
                    id = cursor.id,
                ),
            ));
        }
    }

    if let Some(limit) = query.limit {
        params.push(("limit".into(), limit.to_string()));
    }
    params
}

fn filter_param(filter: &Filter) -> (String, String) {
    (filter.field.clone(), format!("eq.{}", literal(&filter.value)))
}

fn literal(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

fn document_from_row(row: &Value) -> StoreResult<Document> {
    let mut fields = row
        .as_object()
        .cloned()
        .ok_or_else(|| StoreError::Malformed("row is not an object".into()))?;
    let id = match fields.remove("id") {
        Some(Value::String(id)) => id,
        Some(Value::Number(id)) => id.to_string(),
        _ => return Err(StoreError::Malformed("row has no id column".into())),
    };
    Ok(Document::new(id, fields))
}

/// Parse the total out of `Content-Range: 0-3/42` or `*/0`
fn parse_content_range(value: &str) -> Option<u64> {
    value.rsplit_once('/')?.1.trim().parse().ok()
}

#[async_trait]
impl DocumentStore for SupabaseClient {
    async fn get_one(&self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        let response = self
            .authed(self.client.get(self.rest_url(collection)))
            .header(header::ACCEPT, "application/vnd.pgrst.object+json")
            .query(&[("id", format!("eq.{id}"))])
            .send()
            .await?;

        if response.status() == StatusCode::NOT_ACCEPTABLE {
            // No rows found
            return Ok(None);
        }

        let row: Value = Self::check(response).await?.json().await?;
        document_from_row(&row).map(Some)
    }

    async fn subscribe(&self, query: Query) -> StoreResult<Subscription> {
        let initial = self.select(&query).await?;
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(Ok(Snapshot::new(initial.clone())));

        let client = self.clone();
        let task = tokio::spawn(async move {
            let mut last = initial;
            let mut interval = tokio::time::interval(client.poll_interval);
            // The first tick completes immediately
            interval.tick().await;

            loop {
                interval.tick().await;
                let result = match client.select(&query).await {
                    Ok(docs) if docs == last => continue,
                    Ok(docs) => {
                        last = docs.clone();
                        Ok(Snapshot::new(docs))
                    }
                    Err(e) => {
                        warn!(collection = %query.collection, error = %e, "Live query poll failed");
                        Err(e)
                    }
                };
                if tx.send(result).is_err() {
                    break;
                }
            }
            debug!(collection = %query.collection, "Live query poller stopped");
        });

        Ok(Subscription::new(rx, move || task.abort()))
    }

    async fn count(&self, collection: &str, filter: &Filter) -> StoreResult<u64> {
        let response = self
            .authed(self.client.get(self.rest_url(collection)))
            .header("Prefer", "count=exact")
            .header("Range-Unit", "items")
            .header(header::RANGE, "0-0")
            .query(&[filter_param(filter), ("select".into(), "id".into())])
            .send()
            .await?;
        let response = Self::check(response).await?;

        response
            .headers()
            .get(header::CONTENT_RANGE)
            .and_then(|h| h.to_str().ok())
            .and_then(parse_content_range)
            .ok_or_else(|| StoreError::Malformed("missing Content-Range total".into()))
    }

    async fn put(&self, collection: &str, id: &str, fields: Fields) -> StoreResult<()> {
        let mut row = fields;
        row.insert("id".into(), Value::String(id.to_string()));

        let response = self
            .authed(self.client.post(self.rest_url(collection)))
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .query(&[("on_conflict", "id")])
            .json(&Value::Object(row))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> StoreResult<()> {
        let response = self
            .authed(self.client.delete(self.rest_url(collection)))
            .query(&[("id", format!("eq.{id}"))])
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Cursor;
    use serde_json::json;

    #[test]
    fn forward_page_params() {
        let anchor = Document::new("r4", json!({"price": "12.50"}).as_object().cloned().unwrap());
        let query = Query::new("inventory", Filter::eq("product_id", "p1"))
            .order_by("price", SortOrder::Ascending)
            .bounded(Cursor::after(&anchor, "price"))
            .limit(4);

        let params = query_params(&query);
        assert_eq!(
            params,
            vec![
                ("product_id".to_string(), "eq.p1".to_string()),
                ("order".to_string(), "price.asc,id.asc".to_string()),
                (
                    "or".to_string(),
                    "(price.gt.12.50,and(price.eq.12.50,id.gt.r4))".to_string()
                ),
                ("limit".to_string(), "4".to_string()),
            ]
        );
    }

    #[test]
    fn backward_page_reads_descending_before_anchor() {
        let anchor = Document::new("r5", json!({"price": 9}).as_object().cloned().unwrap());
        let query = Query::new("inventory", Filter::eq("product_id", "p1"))
            .order_by("price", SortOrder::Descending)
            .bounded(Cursor::before(&anchor, "price"))
            .limit(4);

        let params = query_params(&query);
        assert_eq!(params[1].1, "price.desc,id.desc");
        assert_eq!(params[2].1, "(price.lt.9,and(price.eq.9,id.lt.r5))");
    }

    #[test]
    fn content_range_totals() {
        assert_eq!(parse_content_range("0-0/42"), Some(42));
        assert_eq!(parse_content_range("*/0"), Some(0));
        assert_eq!(parse_content_range("0-3/*"), None);
    }

    #[test]
    fn rows_need_an_id() {
        let doc = document_from_row(&json!({"id": 3, "price": 1})).unwrap();
        assert_eq!(doc.id, "3");
        assert!(!doc.fields.contains_key("id"));
        assert!(document_from_row(&json!({"price": 1})).is_err());
    }
}
