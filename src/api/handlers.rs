//! HTTP request handlers
//!
//! Handlers resolve the database, call the matching `DocumentStore`
//! operation and shape the reply. Store calls are short and never wait on
//! I/O, so they run inline on the request task. Multipart decoding blocks on
//! the request body and runs on the blocking pool instead.

use crate::api::error::{ApiError, ApiResult, JsonRequest};
use crate::core::error::{Error, Result};
use crate::core::AppState;
use crate::multipart::{parse_options_header, read_related_document};
use crate::storage::conflict::{DESIGN_PREFIX, LOCAL_PREFIX};
use crate::storage::{ChangesQuery, DocumentStore, StorageImpl};
use crate::system::metrics::{collect_metrics, Metrics};
use crate::types::{Document, StoredRevision};
use axum::{
    body::{to_bytes, Body, Bytes},
    extract::{Path, Query, State},
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::io::{self, BufReader};
use std::sync::Arc;
use tokio::task;
use tokio_util::io::{StreamReader, SyncIoBridge};
use tracing::{debug, info};

type AppStateRef<S> = State<Arc<AppState<S>>>;

/// Query parameters of the document endpoints
#[derive(Debug, Default, Deserialize)]
pub struct DocumentQuery {
    /// Base revision for writes, wanted revision for reads
    pub rev: Option<String>,
    /// `false` stores the supplied revision verbatim
    pub new_edits: Option<String>,
    /// `true` inlines attachment bodies on reads
    pub attachments: Option<String>,
}

/// Query parameters of `_changes`; `heartbeat` is accepted and ignored
#[derive(Debug, Default, Deserialize)]
pub struct ChangesParams {
    /// Only events after this sequence
    pub since: Option<String>,
    /// Feed kind
    pub feed: Option<String>,
    /// Revision style
    pub style: Option<String>,
    /// Filter function name
    pub filter: Option<String>,
}

/// `_bulk_docs` request body
#[derive(Debug, Deserialize)]
pub struct BulkDocsRequest {
    /// Documents to write
    pub docs: Vec<Value>,
    /// Defaults to true
    #[serde(default = "default_new_edits")]
    pub new_edits: bool,
}

fn default_new_edits() -> bool {
    true
}

/// Boolean query flag written as JSON (`true`/`false`)
fn parse_flag(name: &str, raw: Option<&str>, default: bool) -> Result<bool> {
    match raw {
        None => Ok(default),
        Some("true") => Ok(true),
        Some("false") => Ok(false),
        Some(other) => Err(Error::invalid_argument(format!(
            "Invalid value for {}: {}",
            name, other
        ))),
    }
}

fn created(stored: StoredRevision) -> Response {
    let body = json!({"ok": true, "id": stored.id, "rev": stored.rev});
    (StatusCode::CREATED, Json(body)).into_response()
}

fn count_conflict<T>(result: Result<T>) -> Result<T> {
    if let Err(Error::Conflict(_)) = &result {
        Metrics::global().write_conflicts.inc();
    }
    result
}

/// Root handler - server welcome
pub async fn root_handler() -> Json<Value> {
    Json(json!({
        "couchdb": "Welcome",
        "vendor": {"name": crate::NAME, "version": crate::VERSION},
        "version": crate::VERSION,
    }))
}

/// Liveness probe
pub async fn up_handler() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

/// Prometheus text exposition
pub async fn metrics_handler() -> ApiResult<Response> {
    let text = collect_metrics()?;
    Ok(([(CONTENT_TYPE, "text/plain; version=0.0.4")], text).into_response())
}

/// Unmatched routes
pub async fn fallback_handler() -> ApiError {
    ApiError(Error::not_found("missing"))
}

/// List database names
pub async fn all_dbs<S: StorageImpl>(State(app_state): AppStateRef<S>) -> Json<Vec<String>> {
    Json(app_state.registry.names())
}

/// `PUT /{db}`
pub async fn create_database<S: StorageImpl>(
    State(app_state): AppStateRef<S>,
    Path(db): Path<String>,
) -> ApiResult<Response> {
    app_state.registry.create(&db)?;
    Ok((StatusCode::CREATED, Json(json!({"ok": true}))).into_response())
}

/// `GET|HEAD /{db}`
pub async fn database_info<S: StorageImpl>(
    State(app_state): AppStateRef<S>,
    Path(db): Path<String>,
) -> ApiResult<Response> {
    let db = app_state.registry.get(&db)?;
    Ok(Json(db.info()).into_response())
}

/// `DELETE /{db}`
pub async fn delete_database<S: StorageImpl>(
    State(app_state): AppStateRef<S>,
    Path(db): Path<String>,
) -> ApiResult<Response> {
    app_state.registry.delete(&db)?;
    Ok(Json(json!({"ok": true})).into_response())
}

fn read_document<S: StorageImpl>(
    app_state: &AppState<S>,
    db: &str,
    docid: &str,
    query: &DocumentQuery,
) -> ApiResult<Response> {
    let db = app_state.registry.get(db)?;
    let doc = db.load(docid, query.rev.as_deref())?;
    let inline = parse_flag("attachments", query.attachments.as_deref(), false)?;
    let doc = if inline { doc } else { doc.with_attachment_stubs() };
    Ok(Json(doc).into_response())
}

async fn write_document<S: StorageImpl>(
    app_state: &AppState<S>,
    db: &str,
    docid: &str,
    query: &DocumentQuery,
    headers: &HeaderMap,
    body: Body,
) -> ApiResult<Response> {
    let db = app_state.registry.get(db)?;
    let rev = query.rev.as_deref();
    let new_edits = parse_flag("new_edits", query.new_edits.as_deref(), true)?;
    let limit = app_state.config.server.max_request_size;

    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    let (mime, params) = parse_options_header(content_type);

    let mut doc = match mime.as_str() {
        "application/json" => {
            let bytes = to_bytes(body, limit).await.map_err(|e| {
                Error::invalid_argument(format!("Failed to read request body: {}", e))
            })?;
            Document::from_slice(&bytes)?
        }
        "multipart/related" => {
            let boundary = params
                .get("boundary")
                .cloned()
                .ok_or_else(|| Error::malformed_multipart("Content-Type has no boundary"))?;
            let doc =
                read_multipart_body(Arc::clone(&db), body, boundary, query.rev.clone(), limit)
                    .await?;
            let received = doc.attachments()?.len() as u64;
            Metrics::global().attachments_received.inc_by(received);
            doc
        }
        _ => {
            return Err(Error::invalid_argument(format!(
                "Unsupported Content-Type: {}",
                content_type
            ))
            .into())
        }
    };
    doc.set_id(docid);

    let stored = count_conflict(db.store(doc, rev, new_edits))?;
    Metrics::global().documents_written.inc();
    Ok(created(stored))
}

/// Decode a `multipart/related` body on a blocking thread as it arrives
///
/// The decoder pulls chunks from the request stream one line at a time;
/// more than `limit` bytes in total aborts the upload.
async fn read_multipart_body<S: StorageImpl>(
    db: Arc<S>,
    body: Body,
    boundary: String,
    target_rev: Option<String>,
    limit: usize,
) -> Result<Document> {
    let mut received = 0usize;
    let chunks = body.into_data_stream().map(move |chunk| {
        let chunk = chunk.map_err(io::Error::other)?;
        received += chunk.len();
        if received > limit {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("request body exceeds {} bytes", limit),
            ));
        }
        Ok(chunk)
    });
    let reader = BufReader::new(SyncIoBridge::new(StreamReader::new(chunks)));

    task::spawn_blocking(move || {
        read_related_document(&*db, reader, &boundary, target_rev.as_deref())
    })
    .await
    .map_err(io::Error::from)?
}

fn remove_document<S: StorageImpl>(
    app_state: &AppState<S>,
    db: &str,
    docid: &str,
    query: &DocumentQuery,
) -> ApiResult<Response> {
    let db = app_state.registry.get(db)?;
    let stored = count_conflict(db.remove(docid, query.rev.as_deref()))?;
    Metrics::global().documents_deleted.inc();
    Ok(created(stored))
}

/// `GET|HEAD /{db}/{docid}`
pub async fn get_document<S: StorageImpl>(
    State(app_state): AppStateRef<S>,
    Path((db, docid)): Path<(String, String)>,
    Query(query): Query<DocumentQuery>,
) -> ApiResult<Response> {
    read_document(&app_state, &db, &docid, &query)
}

/// `PUT /{db}/{docid}`
pub async fn put_document<S: StorageImpl>(
    State(app_state): AppStateRef<S>,
    Path((db, docid)): Path<(String, String)>,
    Query(query): Query<DocumentQuery>,
    headers: HeaderMap,
    body: Body,
) -> ApiResult<Response> {
    write_document(&app_state, &db, &docid, &query, &headers, body).await
}

/// `DELETE /{db}/{docid}`
pub async fn delete_document<S: StorageImpl>(
    State(app_state): AppStateRef<S>,
    Path((db, docid)): Path<(String, String)>,
    Query(query): Query<DocumentQuery>,
) -> ApiResult<Response> {
    remove_document(&app_state, &db, &docid, &query)
}

/// `GET|HEAD /{db}/_design/{docid}`
pub async fn get_design_document<S: StorageImpl>(
    State(app_state): AppStateRef<S>,
    Path((db, docid)): Path<(String, String)>,
    Query(query): Query<DocumentQuery>,
) -> ApiResult<Response> {
    read_document(&app_state, &db, &format!("{}{}", DESIGN_PREFIX, docid), &query)
}

/// `PUT /{db}/_design/{docid}`
pub async fn put_design_document<S: StorageImpl>(
    State(app_state): AppStateRef<S>,
    Path((db, docid)): Path<(String, String)>,
    Query(query): Query<DocumentQuery>,
    headers: HeaderMap,
    body: Body,
) -> ApiResult<Response> {
    let docid = format!("{}{}", DESIGN_PREFIX, docid);
    write_document(&app_state, &db, &docid, &query, &headers, body).await
}

/// `DELETE /{db}/_design/{docid}`
pub async fn delete_design_document<S: StorageImpl>(
    State(app_state): AppStateRef<S>,
    Path((db, docid)): Path<(String, String)>,
    Query(query): Query<DocumentQuery>,
) -> ApiResult<Response> {
    remove_document(&app_state, &db, &format!("{}{}", DESIGN_PREFIX, docid), &query)
}

/// `GET /{db}/_local/{docid}`
pub async fn get_local_document<S: StorageImpl>(
    State(app_state): AppStateRef<S>,
    Path((db, docid)): Path<(String, String)>,
    Query(query): Query<DocumentQuery>,
) -> ApiResult<Response> {
    read_document(&app_state, &db, &format!("{}{}", LOCAL_PREFIX, docid), &query)
}

/// `PUT /{db}/_local/{docid}`
pub async fn put_local_document<S: StorageImpl>(
    State(app_state): AppStateRef<S>,
    Path((db, docid)): Path<(String, String)>,
    Query(query): Query<DocumentQuery>,
    headers: HeaderMap,
    body: Body,
) -> ApiResult<Response> {
    let docid = format!("{}{}", LOCAL_PREFIX, docid);
    write_document(&app_state, &db, &docid, &query, &headers, body).await
}

/// `DELETE /{db}/_local/{docid}`
pub async fn delete_local_document<S: StorageImpl>(
    State(app_state): AppStateRef<S>,
    Path((db, docid)): Path<(String, String)>,
    Query(query): Query<DocumentQuery>,
) -> ApiResult<Response> {
    remove_document(&app_state, &db, &format!("{}{}", LOCAL_PREFIX, docid), &query)
}

/// `POST /{db}/_revs_diff`
pub async fn revs_diff<S: StorageImpl>(
    State(app_state): AppStateRef<S>,
    Path(db): Path<String>,
    JsonRequest(request): JsonRequest<BTreeMap<String, Vec<String>>>,
) -> ApiResult<Response> {
    let db = app_state.registry.get(&db)?;
    let diff = db.revs_diff(&request);
    debug!(db = db.name(), asked = request.len(), missing = diff.len(), "revs_diff");
    Ok(Json(diff).into_response())
}

/// `POST /{db}/_bulk_docs`
pub async fn bulk_docs<S: StorageImpl>(
    State(app_state): AppStateRef<S>,
    Path(db): Path<String>,
    JsonRequest(request): JsonRequest<BulkDocsRequest>,
) -> ApiResult<Response> {
    let db = app_state.registry.get(&db)?;
    let results = db.bulk_docs(request.docs, request.new_edits);

    let failed = results.iter().filter(|r| !r.is_ok()).count() as u64;
    let written = results.len() as u64 - failed;
    let metrics = Metrics::global();
    metrics.documents_written.inc_by(written);
    metrics.bulk_entries_failed.inc_by(failed);
    info!(db = db.name(), written, failed, "bulk_docs");

    Ok((StatusCode::CREATED, Json(results)).into_response())
}

/// `POST /{db}/_ensure_full_commit`
pub async fn ensure_full_commit<S: StorageImpl>(
    State(app_state): AppStateRef<S>,
    Path(db): Path<String>,
) -> ApiResult<Response> {
    let db = app_state.registry.get(&db)?;
    Ok((StatusCode::CREATED, Json(db.ensure_full_commit())).into_response())
}

/// `GET /{db}/_changes`
///
/// The body is streamed: `last_seq` is written first, then the events are
/// pulled from the feed one at a time as the client reads.
pub async fn changes<S: StorageImpl>(
    State(app_state): AppStateRef<S>,
    Path(db): Path<String>,
    Query(params): Query<ChangesParams>,
) -> ApiResult<Response> {
    let db = app_state.registry.get(&db)?;
    let query = ChangesQuery::parse(
        params.since.as_deref(),
        params.feed.as_deref(),
        params.style.as_deref(),
        params.filter.as_deref(),
    )?;
    let feed = db.changes(&query)?;
    debug!(db = db.name(), since = query.since, last_seq = feed.last_seq(), "changes");

    let head = Bytes::from(format!("{{\"last_seq\":{},\"results\":[", feed.last_seq()));
    let events = feed.enumerate().map(|(i, event)| {
        Metrics::global().change_events_served.inc();
        let mut chunk = if i == 0 { Vec::new() } else { b",".to_vec() };
        serde_json::to_writer(&mut chunk, &event)?;
        Ok::<_, serde_json::Error>(Bytes::from(chunk))
    });

    let body = stream::once(async move { Ok::<_, serde_json::Error>(head) })
        .chain(stream::iter(events))
        .chain(stream::once(async { Ok(Bytes::from_static(b"]}")) }));

    Ok(([(CONTENT_TYPE, "application/json")], Body::from_stream(body)).into_response())
}
