//! Data store access.
//!
//! The four record collections live in a hosted Postgres exposed through a
//! PostgREST-style REST layer. [`Store`] is the narrow contract the managers
//! code against; [`RestStore`] is the production implementation over
//! reqwest. The store's uniqueness constraints are the only true
//! serialization points between terminals and are treated as authoritative
//! even when they contradict a locally cached snapshot.

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode, Url};
use serde::Serialize;
use serde_json::Value;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::StoreConfig;

/// Default timeout for store requests (30 seconds).
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for the connectivity check (shorter than the request timeout so
/// a dead endpoint is reported quickly).
const CONNECTIVITY_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Resources, filters, queries
// ---------------------------------------------------------------------------

/// The four logical resources behind the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Reservations,
    Blacklist,
    TableHistory,
    PalletOrders,
}

impl Resource {
    /// Wire table name.
    pub fn table(self) -> &'static str {
        match self {
            Resource::Reservations => "table_reservations",
            Resource::Blacklist => "blacklist",
            Resource::TableHistory => "table_history",
            Resource::PalletOrders => "pallet_orders",
        }
    }
}

/// Equality filter on one column.
#[derive(Debug, Clone)]
pub struct Filter {
    pub column: &'static str,
    pub value: String,
}

impl Filter {
    pub fn eq(column: &'static str, value: impl ToString) -> Self {
        Self {
            column,
            value: value.to_string(),
        }
    }
}

/// Single sort key, ascending or descending.
#[derive(Debug, Clone)]
pub struct Order {
    pub column: &'static str,
    pub ascending: bool,
}

/// Select query: equality filters, one optional sort key, optional limit.
#[derive(Debug, Clone, Default)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order: Option<Order>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: &'static str, value: impl ToString) -> Self {
        self.filters.push(Filter::eq(column, value));
        self
    }

    pub fn order_asc(mut self, column: &'static str) -> Self {
        self.order = Some(Order {
            column,
            ascending: true,
        });
        self
    }

    pub fn order_desc(mut self, column: &'static str) -> Self {
        self.order = Some(Order {
            column,
            ascending: false,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failure surfaced by a store operation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Endpoint URL or access key missing from the environment.
    #[error("store endpoint URL and access key are not configured")]
    Unconfigured,

    /// Uniqueness violation, tagged with the column (or constraint) that
    /// rejected the write.
    #[error("unique constraint violated on {column}")]
    Conflict { column: String },

    /// No row matched the id.
    #[error("row not found")]
    NotFound,

    /// Network or HTTP-level failure, already mapped to a readable message.
    #[error("{0}")]
    Transport(String),

    /// The store answered with something we could not interpret.
    #[error("invalid response from store: {0}")]
    InvalidResponse(String),

    /// Response body failed to decode.
    #[error("invalid JSON from store: {0}")]
    Decode(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Store contract
// ---------------------------------------------------------------------------

/// Contract for the four logical resources. Rows cross this boundary as
/// `serde_json::Value` and are deserialized into typed models by the
/// managers.
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert one row; returns the created row including server-assigned
    /// `id` and `created_at`.
    async fn insert(&self, resource: Resource, row: Value) -> Result<Value, StoreError>;

    /// Apply a partial field set to the row with the given id; returns the
    /// updated row. `StoreError::NotFound` when the id matches nothing.
    async fn update_by_id(
        &self,
        resource: Resource,
        id: Uuid,
        patch: Value,
    ) -> Result<Value, StoreError>;

    /// Delete the row with the given id.
    async fn delete_by_id(&self, resource: Resource, id: Uuid) -> Result<(), StoreError>;

    /// Delete every row matching all filters.
    async fn delete_by_filter(
        &self,
        resource: Resource,
        filters: &[Filter],
    ) -> Result<(), StoreError>;

    /// Select rows matching the query.
    async fn select(&self, resource: Resource, query: Query) -> Result<Vec<Value>, StoreError>;
}

/// Deserialize a batch of rows into a typed model.
pub(crate) fn decode_rows<T: serde::de::DeserializeOwned>(
    rows: Vec<Value>,
) -> Result<Vec<T>, StoreError> {
    rows.into_iter()
        .map(|row| serde_json::from_value(row).map_err(StoreError::from))
        .collect()
}

/// Deserialize a single row into a typed model.
pub(crate) fn decode_row<T: serde::de::DeserializeOwned>(row: Value) -> Result<T, StoreError> {
    serde_json::from_value(row).map_err(StoreError::from)
}

// ---------------------------------------------------------------------------
// URL normalization
// ---------------------------------------------------------------------------

/// Normalize the store URL:
/// - strip trailing slashes
/// - strip a trailing `/rest/v1` segment
/// - ensure a scheme is present (https, or http for localhost)
pub fn normalize_store_url(url: &str) -> String {
    let mut url = url.trim().to_string();

    // Ensure scheme
    if !url.starts_with("http://") && !url.starts_with("https://") {
        if url.starts_with("localhost") || url.starts_with("127.0.0.1") {
            url = format!("http://{url}");
        } else {
            url = format!("https://{url}");
        }
    }

    // Strip trailing slashes
    while url.ends_with('/') {
        url.pop();
    }

    // Strip trailing /rest/v1
    if url.ends_with("/rest/v1") {
        url.truncate(url.len() - 8);
    }

    while url.ends_with('/') {
        url.pop();
    }

    url
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

/// Convert a `reqwest::Error` into a user-friendly message.
fn friendly_error(url: &str, err: &reqwest::Error) -> String {
    if err.is_connect() {
        return format!("Cannot reach the store at {url}");
    }
    if err.is_timeout() {
        return format!("Connection to {url} timed out");
    }
    if err.is_builder() {
        return format!("Invalid store URL: {url}");
    }
    format!("Network error communicating with {url}: {err}")
}

/// Convert an HTTP status code into a user-friendly message.
fn status_error(status: StatusCode) -> String {
    match status.as_u16() {
        401 => "Store access key is invalid or expired".to_string(),
        403 => "Store rejected the request (permission denied)".to_string(),
        404 => "Store resource not found".to_string(),
        s if s >= 500 => format!("Store server error (HTTP {s})"),
        s => format!("Unexpected response from the store (HTTP {s})"),
    }
}

/// Extract the violated column from a Postgres unique-violation body
/// (error code 23505). The detail line reads
/// `Key (table_number)=(5) already exists.`; when it is absent the
/// constraint name from the message is used as the tag instead.
fn conflict_column(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    if value.get("code").and_then(Value::as_str) != Some("23505") {
        return None;
    }

    let details = value.get("details").and_then(Value::as_str).unwrap_or("");
    if let Some(rest) = details.strip_prefix("Key (") {
        if let Some(end) = rest.find(')') {
            return Some(rest[..end].to_string());
        }
    }

    let message = value.get("message").and_then(Value::as_str).unwrap_or("");
    let start = message.find('"')? + 1;
    let end = start + message[start..].find('"')?;
    Some(message[start..end].to_string())
}

/// Build a readable failure message from a non-success response, preserving
/// the store's own message when the body carries one.
fn error_detail(status: StatusCode, body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        if let Some(message) = value
            .get("message")
            .or_else(|| value.get("error"))
            .and_then(Value::as_str)
        {
            return format!("{message} (HTTP {})", status.as_u16());
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("{} (HTTP {})", status_error(status), status.as_u16())
    } else {
        format!(
            "{} (HTTP {}): {trimmed}",
            status_error(status),
            status.as_u16()
        )
    }
}

fn check(status: StatusCode, body: &str) -> Result<(), StoreError> {
    if status.is_success() {
        return Ok(());
    }
    if let Some(column) = conflict_column(body) {
        return Err(StoreError::Conflict { column });
    }
    Err(StoreError::Transport(error_detail(status, body)))
}

// ---------------------------------------------------------------------------
// PostgREST client
// ---------------------------------------------------------------------------

/// Store client over the hosted Postgres REST layer.
///
/// Built from [`StoreConfig`]; when the configuration is absent every
/// operation fails with `StoreError::Unconfigured` so callers can surface a
/// setup problem instead of a confusing network error.
pub struct RestStore {
    inner: Option<Inner>,
}

struct Inner {
    client: Client,
    base_url: String,
    api_key: String,
}

impl RestStore {
    pub fn new(config: Option<StoreConfig>) -> Self {
        let inner = match config {
            Some(config) => match Client::builder().timeout(DEFAULT_TIMEOUT).build() {
                Ok(client) => Some(Inner {
                    client,
                    base_url: normalize_store_url(&config.url),
                    api_key: config.key,
                }),
                Err(e) => {
                    warn!(error = %e, "failed to build HTTP client; store left unconfigured");
                    None
                }
            },
            None => {
                warn!("store endpoint not configured; every store operation will fail");
                None
            }
        };
        Self { inner }
    }

    /// Build the store from `SUPABASE_URL` / `SUPABASE_ANON_KEY`.
    pub fn from_env() -> Self {
        Self::new(StoreConfig::from_env())
    }

    fn inner(&self) -> Result<&Inner, StoreError> {
        self.inner.as_ref().ok_or(StoreError::Unconfigured)
    }

    /// Check that the store endpoint is reachable and the access key is
    /// accepted. Hits the REST root with a short timeout and reports the
    /// observed latency.
    pub async fn test_connectivity(&self) -> ConnectivityResult {
        let inner = match self.inner() {
            Ok(inner) => inner,
            Err(e) => return ConnectivityResult::failure(e.to_string()),
        };

        let url = format!("{}/rest/v1/", inner.base_url);
        let start = Instant::now();
        let resp = inner
            .client
            .get(&url)
            .header("apikey", &inner.api_key)
            .header("Authorization", format!("Bearer {}", inner.api_key))
            .timeout(CONNECTIVITY_TIMEOUT)
            .send()
            .await;

        match resp {
            Ok(resp) => {
                let latency_ms = start.elapsed().as_millis() as u64;
                let status = resp.status();
                if status.is_success() {
                    info!(latency_ms, "store connectivity check passed");
                    ConnectivityResult {
                        success: true,
                        latency_ms: Some(latency_ms),
                        error: None,
                    }
                } else {
                    warn!(latency_ms, status = status.as_u16(), "store connectivity check rejected");
                    ConnectivityResult {
                        success: false,
                        latency_ms: Some(latency_ms),
                        error: Some(status_error(status)),
                    }
                }
            }
            Err(e) => {
                let message = friendly_error(&inner.base_url, &e);
                warn!(error = %message, "store connectivity check failed");
                ConnectivityResult::failure(message)
            }
        }
    }
}

/// Outcome of [`RestStore::test_connectivity`].
#[derive(Debug, Clone, Serialize)]
pub struct ConnectivityResult {
    pub success: bool,
    pub latency_ms: Option<u64>,
    pub error: Option<String>,
}

impl ConnectivityResult {
    fn failure(error: String) -> Self {
        Self {
            success: false,
            latency_ms: None,
            error: Some(error),
        }
    }
}

impl Inner {
    fn endpoint(&self, resource: Resource) -> Result<Url, StoreError> {
        Url::parse(&format!("{}/rest/v1/{}", self.base_url, resource.table()))
            .map_err(|e| StoreError::Transport(format!("Invalid store URL: {e}")))
    }

    async fn execute(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
        representation: bool,
    ) -> Result<(StatusCode, String), StoreError> {
        let mut req = self
            .client
            .request(method, url)
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json");
        if representation {
            req = req.header("Prefer", "return=representation");
        }
        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| StoreError::Transport(friendly_error(&self.base_url, &e)))?;
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        Ok((status, text))
    }
}

/// Append PostgREST query parameters (`col=eq.v`, `order=col.asc`,
/// `limit=n`) to the endpoint URL. Values are percent-encoded by the URL
/// builder.
fn apply_query(url: &mut Url, query: &Query) {
    let mut pairs = url.query_pairs_mut();
    for filter in &query.filters {
        pairs.append_pair(filter.column, &format!("eq.{}", filter.value));
    }
    if let Some(order) = &query.order {
        let direction = if order.ascending { "asc" } else { "desc" };
        pairs.append_pair("order", &format!("{}.{direction}", order.column));
    }
    if let Some(limit) = query.limit {
        pairs.append_pair("limit", &limit.to_string());
    }
}

/// Parse the `return=representation` body of an insert: PostgREST answers
/// with a one-element array.
fn created_row(body: &str) -> Result<Value, StoreError> {
    let value: Value = serde_json::from_str(body)?;
    match value {
        Value::Array(mut rows) if !rows.is_empty() => Ok(rows.remove(0)),
        Value::Object(_) => Ok(value),
        other => Err(StoreError::InvalidResponse(format!(
            "expected the created row, got {other}"
        ))),
    }
}

/// Parse the representation body of an update. An empty array means the id
/// matched nothing.
fn updated_row(body: &str) -> Result<Value, StoreError> {
    let value: Value = serde_json::from_str(body)?;
    match value {
        Value::Array(mut rows) => {
            if rows.is_empty() {
                Err(StoreError::NotFound)
            } else {
                Ok(rows.remove(0))
            }
        }
        Value::Object(_) => Ok(value),
        other => Err(StoreError::InvalidResponse(format!(
            "expected the updated row, got {other}"
        ))),
    }
}

#[async_trait]
impl Store for RestStore {
    async fn insert(&self, resource: Resource, row: Value) -> Result<Value, StoreError> {
        let inner = self.inner()?;
        let url = inner.endpoint(resource)?;
        debug!(table = resource.table(), "store insert");
        let (status, body) = inner.execute(Method::POST, url, Some(&row), true).await?;
        check(status, &body)?;
        created_row(&body)
    }

    async fn update_by_id(
        &self,
        resource: Resource,
        id: Uuid,
        patch: Value,
    ) -> Result<Value, StoreError> {
        let inner = self.inner()?;
        let mut url = inner.endpoint(resource)?;
        apply_query(&mut url, &Query::new().eq("id", id));
        debug!(table = resource.table(), %id, "store update");
        let (status, body) = inner.execute(Method::PATCH, url, Some(&patch), true).await?;
        check(status, &body)?;
        updated_row(&body)
    }

    async fn delete_by_id(&self, resource: Resource, id: Uuid) -> Result<(), StoreError> {
        let inner = self.inner()?;
        let mut url = inner.endpoint(resource)?;
        apply_query(&mut url, &Query::new().eq("id", id));
        debug!(table = resource.table(), %id, "store delete");
        let (status, body) = inner.execute(Method::DELETE, url, None, false).await?;
        check(status, &body)
    }

    async fn delete_by_filter(
        &self,
        resource: Resource,
        filters: &[Filter],
    ) -> Result<(), StoreError> {
        let inner = self.inner()?;
        let mut url = inner.endpoint(resource)?;
        let query = Query {
            filters: filters.to_vec(),
            ..Query::default()
        };
        apply_query(&mut url, &query);
        debug!(table = resource.table(), "store delete by filter");
        let (status, body) = inner.execute(Method::DELETE, url, None, false).await?;
        check(status, &body)
    }

    async fn select(&self, resource: Resource, query: Query) -> Result<Vec<Value>, StoreError> {
        let inner = self.inner()?;
        let mut url = inner.endpoint(resource)?;
        apply_query(&mut url, &query);
        let (status, body) = inner.execute(Method::GET, url, None, false).await?;
        check(status, &body)?;
        serde_json::from_str(&body).map_err(StoreError::from)
    }
}

// ---------------------------------------------------------------------------
// In-memory store for tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod mem {
    //! In-memory `Store` with the same observable contract as the hosted
    //! one: server-assigned ids and timestamps, unique constraints on
    //! `table_reservations.table_number` and `blacklist.badge_number`, and
    //! injectable insert and delete failures for archive-ordering tests.

    use super::*;
    use chrono::{DateTime, Utc};
    use serde_json::json;
    use std::cmp::Ordering as CmpOrdering;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    #[derive(Default)]
    pub(crate) struct MemStore {
        rows: Mutex<HashMap<&'static str, Vec<Value>>>,
        fail_inserts: Mutex<HashSet<&'static str>>,
        fail_deletes: Mutex<HashSet<&'static str>>,
    }

    impl MemStore {
        pub fn new() -> Self {
            Self::default()
        }

        /// Make every subsequent insert into `resource` fail.
        pub fn fail_inserts_into(&self, resource: Resource) {
            self.fail_inserts
                .lock()
                .expect("mem store lock")
                .insert(resource.table());
        }

        /// Make every subsequent delete from `resource` fail.
        pub fn fail_deletes_into(&self, resource: Resource) {
            self.fail_deletes
                .lock()
                .expect("mem store lock")
                .insert(resource.table());
        }

        fn delete_failure(&self, resource: Resource) -> Option<StoreError> {
            self.fail_deletes
                .lock()
                .expect("mem store lock")
                .contains(resource.table())
                .then(|| {
                    StoreError::Transport(format!(
                        "injected delete failure for {}",
                        resource.table()
                    ))
                })
        }

        /// Raw rows currently stored for a resource.
        pub fn rows(&self, resource: Resource) -> Vec<Value> {
            self.rows
                .lock()
                .expect("mem store lock")
                .get(resource.table())
                .cloned()
                .unwrap_or_default()
        }

        fn unique_columns(resource: Resource) -> &'static [&'static str] {
            match resource {
                Resource::Reservations => &["table_number"],
                Resource::Blacklist => &["badge_number"],
                _ => &[],
            }
        }
    }

    fn value_matches(value: Option<&Value>, expected: &str) -> bool {
        match value {
            Some(Value::String(s)) => s == expected,
            Some(Value::Number(n)) => n.to_string() == expected,
            Some(Value::Bool(b)) => b.to_string() == expected,
            _ => false,
        }
    }

    fn matches_filters(row: &Value, filters: &[Filter]) -> bool {
        filters
            .iter()
            .all(|f| value_matches(row.get(f.column), &f.value))
    }

    /// Column comparison: numbers numerically, RFC 3339 strings as
    /// timestamps, everything else lexicographically.
    fn compare(a: &Value, b: &Value) -> CmpOrdering {
        match (a, b) {
            (Value::Number(x), Value::Number(y)) => x
                .as_f64()
                .unwrap_or(0.0)
                .total_cmp(&y.as_f64().unwrap_or(0.0)),
            (Value::String(x), Value::String(y)) => {
                match (
                    DateTime::parse_from_rfc3339(x),
                    DateTime::parse_from_rfc3339(y),
                ) {
                    (Ok(ta), Ok(tb)) => ta.cmp(&tb),
                    _ => x.cmp(y),
                }
            }
            _ => CmpOrdering::Equal,
        }
    }

    #[async_trait]
    impl Store for MemStore {
        async fn insert(&self, resource: Resource, row: Value) -> Result<Value, StoreError> {
            if self
                .fail_inserts
                .lock()
                .expect("mem store lock")
                .contains(resource.table())
            {
                return Err(StoreError::Transport(format!(
                    "injected insert failure for {}",
                    resource.table()
                )));
            }

            let mut all = self.rows.lock().expect("mem store lock");
            let rows = all.entry(resource.table()).or_default();

            for column in Self::unique_columns(resource) {
                if let Some(value) = row.get(*column) {
                    if rows.iter().any(|r| r.get(*column) == Some(value)) {
                        return Err(StoreError::Conflict {
                            column: column.to_string(),
                        });
                    }
                }
            }

            let mut stored = row;
            let object = stored
                .as_object_mut()
                .ok_or_else(|| StoreError::InvalidResponse("row must be an object".into()))?;
            object
                .entry("id")
                .or_insert_with(|| json!(Uuid::new_v4()));
            object
                .entry("created_at")
                .or_insert_with(|| json!(Utc::now()));

            rows.push(stored.clone());
            Ok(stored)
        }

        async fn update_by_id(
            &self,
            resource: Resource,
            id: Uuid,
            patch: Value,
        ) -> Result<Value, StoreError> {
            let id = id.to_string();
            let mut all = self.rows.lock().expect("mem store lock");
            let rows = all.entry(resource.table()).or_default();

            for row in rows.iter_mut() {
                if row.get("id").and_then(Value::as_str) == Some(id.as_str()) {
                    if let (Some(target), Some(fields)) = (row.as_object_mut(), patch.as_object())
                    {
                        for (key, value) in fields {
                            target.insert(key.clone(), value.clone());
                        }
                    }
                    return Ok(row.clone());
                }
            }
            Err(StoreError::NotFound)
        }

        async fn delete_by_id(&self, resource: Resource, id: Uuid) -> Result<(), StoreError> {
            if let Some(err) = self.delete_failure(resource) {
                return Err(err);
            }
            let id = id.to_string();
            let mut all = self.rows.lock().expect("mem store lock");
            let rows = all.entry(resource.table()).or_default();
            rows.retain(|row| row.get("id").and_then(Value::as_str) != Some(id.as_str()));
            Ok(())
        }

        async fn delete_by_filter(
            &self,
            resource: Resource,
            filters: &[Filter],
        ) -> Result<(), StoreError> {
            if let Some(err) = self.delete_failure(resource) {
                return Err(err);
            }
            let mut all = self.rows.lock().expect("mem store lock");
            let rows = all.entry(resource.table()).or_default();
            rows.retain(|row| !matches_filters(row, filters));
            Ok(())
        }

        async fn select(&self, resource: Resource, query: Query) -> Result<Vec<Value>, StoreError> {
            let all = self.rows.lock().expect("mem store lock");
            let mut rows: Vec<Value> = all
                .get(resource.table())
                .map(|rows| {
                    rows.iter()
                        .filter(|row| matches_filters(row, &query.filters))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default();

            if let Some(order) = &query.order {
                rows.sort_by(|a, b| {
                    let ordering = compare(
                        a.get(order.column).unwrap_or(&Value::Null),
                        b.get(order.column).unwrap_or(&Value::Null),
                    );
                    if order.ascending {
                        ordering
                    } else {
                        ordering.reverse()
                    }
                });
            }
            if let Some(limit) = query.limit {
                rows.truncate(limit);
            }
            Ok(rows)
        }
    }
}
