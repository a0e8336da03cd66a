//! Firestore v1 REST adapter.
//!
//! Implements `DocumentStore` against the documents API: GET for reads,
//! PATCH with an update mask for merges, `:runQuery` for the equality
//! queries the migration runs, and `:commit` for its all-or-nothing photo
//! batch. Firestore's typed value wrappers (`stringValue`, `integerValue`
//! as a decimal string, `mapValue`, ...) are folded to and from plain JSON
//! at this boundary so the rest of the crate never sees them.
//!
//! Requests carry the signed-in user's ID token when a `FirebaseAuth` is
//! attached; without one (emulator with open rules) they go out bare.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use url::Url;

use super::{api_error, send_with_retry, FirebaseAuth, FirebaseError, RetryPolicy};
use crate::config::FirebaseConfig;
use crate::error::StoreError;
use crate::store::{BatchUpdate, DocRef, Document, DocumentStore, FieldMap, Filter};

const FIRESTORE_BASE: &str = "https://firestore.googleapis.com/v1";

/// Firestore client implementing `DocumentStore`.
pub struct Firestore {
    client: reqwest::Client,
    /// URL of the documents root, ending in `/documents`.
    base: Url,
    /// Resource-name prefix for `Write.update.name`, `projects/...`.
    name_root: String,
    retry: RetryPolicy,
    token_source: Option<Arc<FirebaseAuth>>,
}

impl Firestore {
    pub fn new(
        config: &FirebaseConfig,
        token_source: Option<Arc<FirebaseAuth>>,
    ) -> Result<Self, FirebaseError> {
        let name_root = format!(
            "projects/{}/databases/(default)/documents",
            config.project_id
        );
        let base = match &config.firestore_emulator_host {
            Some(host) => Url::parse(&format!("http://{host}/v1/{name_root}"))?,
            None => Url::parse(&format!("{FIRESTORE_BASE}/{name_root}"))?,
        };
        Ok(Self {
            client: reqwest::Client::new(),
            base,
            name_root,
            retry: RetryPolicy::default(),
            token_source,
        })
    }

    fn doc_url(&self, collection: &str, id: &str) -> Result<Url, FirebaseError> {
        Ok(Url::parse(&format!("{}/{collection}/{id}", self.base))?)
    }

    /// URL of a custom method on the documents root, e.g. `...documents:commit`.
    fn op_url(&self, op: &str) -> Result<Url, FirebaseError> {
        Ok(Url::parse(&format!("{}:{op}", self.base))?)
    }

    fn doc_name(&self, doc: &DocRef) -> String {
        format!("{}/{}/{}", self.name_root, doc.collection, doc.id)
    }

    async fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        let mut request = self.client.request(method, url);
        if let Some(auth) = &self.token_source {
            if let Some(token) = auth.bearer_token().await {
                request = request.bearer_auth(token);
            }
        }
        request
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, StoreError> {
        let response = send_with_retry(request, &self.retry)
            .await
            .map_err(map_store_error)?;
        if !response.status().is_success() {
            return Err(map_store_error(api_error(response).await));
        }
        Ok(response)
    }
}

#[async_trait::async_trait]
impl DocumentStore for Firestore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        let url = self.doc_url(collection, id).map_err(map_store_error)?;
        let request = self.request(reqwest::Method::GET, url).await;
        let response = send_with_retry(request, &self.retry)
            .await
            .map_err(map_store_error)?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(map_store_error(api_error(response).await));
        }
        let wire: WireDocument = response
            .json()
            .await
            .map_err(|e| StoreError::Malformed(e.to_string()))?;
        Ok(Some(wire.into_document()))
    }

    async fn set(
        &self,
        collection: &str,
        id: &str,
        fields: FieldMap,
        merge: bool,
    ) -> Result<(), StoreError> {
        let mut url = self.doc_url(collection, id).map_err(map_store_error)?;
        if merge {
            let mut pairs = url.query_pairs_mut();
            for key in fields.keys() {
                pairs.append_pair("updateMask.fieldPaths", key);
            }
        }
        let body = json!({ "fields": to_wire_fields(&fields) });
        let request = self.request(reqwest::Method::PATCH, url).await.json(&body);
        self.send(request).await?;
        Ok(())
    }

    async fn query(&self, collection: &str, filters: &[Filter]) -> Result<Vec<Document>, StoreError> {
        let url = self.op_url("runQuery").map_err(map_store_error)?;
        let body = structured_query(collection, filters);
        let request = self.request(reqwest::Method::POST, url).await.json(&body);
        let response = self.send(request).await?;

        // Streamed result: one row per element, rows without a document are
        // progress markers.
        let rows: Vec<RunQueryRow> = response
            .json()
            .await
            .map_err(|e| StoreError::Malformed(e.to_string()))?;
        Ok(rows
            .into_iter()
            .filter_map(|row| row.document)
            .map(WireDocument::into_document)
            .collect())
    }

    async fn update(&self, doc: &DocRef, fields: FieldMap) -> Result<(), StoreError> {
        let mut url = self
            .doc_url(&doc.collection, &doc.id)
            .map_err(map_store_error)?;
        {
            let mut pairs = url.query_pairs_mut();
            // Update-not-create: fail with NOT_FOUND instead of upserting
            pairs.append_pair("currentDocument.exists", "true");
            for key in fields.keys() {
                pairs.append_pair("updateMask.fieldPaths", key);
            }
        }
        let body = json!({ "fields": to_wire_fields(&fields) });
        let request = self.request(reqwest::Method::PATCH, url).await.json(&body);
        self.send(request).await?;
        Ok(())
    }

    async fn batch_update(&self, writes: Vec<BatchUpdate>) -> Result<(), StoreError> {
        if writes.is_empty() {
            return Ok(());
        }
        let url = self.op_url("commit").map_err(map_store_error)?;
        let body = commit_body(&self.name_root, &writes);
        let request = self.request(reqwest::Method::POST, url).await.json(&body);
        self.send(request).await?;
        Ok(())
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
struct WireDocument {
    name: String,
    #[serde(default)]
    fields: Value,
}

impl WireDocument {
    fn into_document(self) -> Document {
        Document::new(id_from_name(&self.name), from_wire_fields(&self.fields))
    }
}

#[derive(Debug, Deserialize)]
struct RunQueryRow {
    #[serde(default)]
    document: Option<WireDocument>,
}

/// Document id: the last segment of the full resource name.
fn id_from_name(name: &str) -> String {
    name.rsplit('/').next().unwrap_or(name).to_string()
}

// ============================================================================
// Value mapping
// ============================================================================

/// Plain JSON -> Firestore typed value.
///
/// Strings that parse as RFC 3339 become `timestampValue`, which keeps
/// chrono-serialized fields (`createdAt`, `convertedAt`) as queryable
/// native timestamps instead of opaque strings.
fn to_wire_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => match n.as_i64() {
            Some(i) => json!({ "integerValue": i.to_string() }),
            None => json!({ "doubleValue": n.as_f64() }),
        },
        Value::String(s) => {
            if chrono::DateTime::parse_from_rfc3339(s).is_ok() {
                json!({ "timestampValue": s })
            } else {
                json!({ "stringValue": s })
            }
        }
        Value::Array(items) => json!({
            "arrayValue": { "values": items.iter().map(to_wire_value).collect::<Vec<_>>() }
        }),
        Value::Object(map) => json!({
            "mapValue": { "fields": map.iter()
                .map(|(k, v)| (k.clone(), to_wire_value(v)))
                .collect::<serde_json::Map<_, _>>() }
        }),
    }
}

/// Firestore typed value -> plain JSON. Unknown wrapper types read as null.
fn from_wire_value(value: &Value) -> Value {
    let Some(map) = value.as_object() else {
        return Value::Null;
    };
    let Some((kind, inner)) = map.iter().next() else {
        return Value::Null;
    };
    match kind.as_str() {
        "nullValue" => Value::Null,
        "booleanValue" => inner.clone(),
        "integerValue" => {
            let parsed = match inner {
                Value::String(s) => s.parse::<i64>().ok(),
                Value::Number(n) => n.as_i64(),
                _ => None,
            };
            parsed.map(Value::from).unwrap_or_else(|| inner.clone())
        }
        "doubleValue" => inner.clone(),
        "stringValue" | "timestampValue" | "referenceValue" => inner.clone(),
        "arrayValue" => {
            let values = inner
                .get("values")
                .and_then(Value::as_array)
                .map(|items| items.iter().map(from_wire_value).collect())
                .unwrap_or_default();
            Value::Array(values)
        }
        "mapValue" => {
            let fields = inner
                .get("fields")
                .and_then(Value::as_object)
                .map(|map| {
                    map.iter()
                        .map(|(k, v)| (k.clone(), from_wire_value(v)))
                        .collect()
                })
                .unwrap_or_default();
            Value::Object(fields)
        }
        other => {
            log::warn!("unhandled firestore value type {other}");
            Value::Null
        }
    }
}

fn to_wire_fields(fields: &FieldMap) -> Value {
    Value::Object(
        fields
            .iter()
            .map(|(k, v)| (k.clone(), to_wire_value(v)))
            .collect(),
    )
}

fn from_wire_fields(fields: &Value) -> FieldMap {
    fields
        .as_object()
        .map(|map| {
            map.iter()
                .map(|(k, v)| (k.clone(), from_wire_value(v)))
                .collect()
        })
        .unwrap_or_default()
}

// ============================================================================
// Request bodies
// ============================================================================

fn filter_clause(filter: &Filter) -> Value {
    if filter.value.is_null() {
        // Firestore rejects EQUAL-to-null; null checks are a unary op
        json!({
            "unaryFilter": { "field": { "fieldPath": filter.field }, "op": "IS_NULL" }
        })
    } else {
        json!({
            "fieldFilter": {
                "field": { "fieldPath": filter.field },
                "op": "EQUAL",
                "value": to_wire_value(&filter.value),
            }
        })
    }
}

fn structured_query(collection: &str, filters: &[Filter]) -> Value {
    let mut query = json!({
        "from": [{ "collectionId": collection }],
    });
    match filters {
        [] => {}
        [single] => {
            query["where"] = filter_clause(single);
        }
        many => {
            query["where"] = json!({
                "compositeFilter": {
                    "op": "AND",
                    "filters": many.iter().map(filter_clause).collect::<Vec<_>>(),
                }
            });
        }
    }
    json!({ "structuredQuery": query })
}

fn commit_body(name_root: &str, writes: &[BatchUpdate]) -> Value {
    let writes: Vec<Value> = writes
        .iter()
        .map(|write| {
            json!({
                "update": {
                    "name": format!("{}/{}/{}", name_root, write.doc.collection, write.doc.id),
                    "fields": to_wire_fields(&write.fields),
                },
                "updateMask": {
                    "fieldPaths": write.fields.keys().collect::<Vec<_>>(),
                },
                // Update-not-create for every target, so one missing
                // document rejects the whole batch
                "currentDocument": { "exists": true },
            })
        })
        .collect();
    json!({ "writes": writes })
}

// ============================================================================
// Error mapping
// ============================================================================

fn map_store_error(err: FirebaseError) -> StoreError {
    match err {
        FirebaseError::Http(e) => StoreError::Network(e.to_string()),
        FirebaseError::Api { status, message } => match status {
            401 | 403 => StoreError::PermissionDenied(message),
            404 => StoreError::NotFound(message),
            400 => StoreError::Malformed(message),
            429 => StoreError::Network(format!("HTTP 429: {message}")),
            s if s >= 500 => StoreError::Network(format!("HTTP {s}: {message}")),
            s => StoreError::Unknown(format!("HTTP {s}: {message}")),
        },
        other => StoreError::Unknown(other.to_string()),
    }
}
