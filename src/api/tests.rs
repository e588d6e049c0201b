use super::create_router;
use crate::core::{AppState, Config};
use crate::storage::MemoryRegistry;
use axum::{
    body::{to_bytes, Body, Bytes},
    http::{header::CONTENT_TYPE, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn app() -> Router {
    let state = AppState::new(Arc::new(MemoryRegistry::in_memory()), Config::default());
    create_router(Arc::new(state))
}

async fn send_raw(
    app: &Router,
    method: Method,
    uri: &str,
    content_type: Option<&str>,
    body: Body,
) -> (StatusCode, Bytes) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(content_type) = content_type {
        request = request.header(CONTENT_TYPE, content_type);
    }
    let response = app
        .clone()
        .oneshot(request.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, bytes)
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    content_type: Option<&str>,
    body: Body,
) -> (StatusCode, Value) {
    let (status, bytes) = send_raw(app, method, uri, content_type, body).await;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    send(app, Method::GET, uri, None, Body::empty()).await
}

async fn put_json(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    send(app, Method::PUT, uri, Some("application/json"), Body::from(body.to_string())).await
}

async fn post_json(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    send(app, Method::POST, uri, Some("application/json"), Body::from(body.to_string())).await
}

async fn delete(app: &Router, uri: &str) -> (StatusCode, Value) {
    send(app, Method::DELETE, uri, None, Body::empty()).await
}

async fn app_with_db() -> Router {
    let app = app();
    let (status, _) = send(&app, Method::PUT, "/db/", None, Body::empty()).await;
    assert_eq!(status, StatusCode::CREATED);
    app
}

#[tokio::test]
async fn test_write_conflict_scenario() {
    let app = app_with_db().await;

    let (status, body) = put_json(&app, "/db/doc1", json!({"a": 1})).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["ok"], json!(true));
    assert_eq!(body["id"], json!("doc1"));
    let rev1 = body["rev"].as_str().unwrap().to_string();
    assert!(rev1.starts_with("1-"));

    let (status, body) = put_json(&app, "/db/doc1", json!({"a": 2})).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], json!("conflict"));
    assert_eq!(body["reason"], json!("Document update conflict."));

    let (status, body) = put_json(&app, &format!("/db/doc1?rev={}", rev1), json!({"a": 2})).await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(body["rev"].as_str().unwrap().starts_with("2-"));

    let (status, doc) = get(&app, "/db/doc1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(doc["a"], json!(2));
    assert_eq!(doc["_id"], json!("doc1"));
}

#[tokio::test]
async fn test_database_lifecycle() {
    let app = app_with_db().await;

    let (status, body) = send(&app, Method::PUT, "/db", None, Body::empty()).await;
    assert_eq!(status, StatusCode::PRECONDITION_FAILED);
    assert_eq!(body["error"], json!("db_exists"));

    let (status, info) = get(&app, "/db").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(info["db_name"], json!("db"));
    assert_eq!(info["update_seq"], json!(0));
    assert!(info["instance_start_time"].as_str().unwrap().parse::<u64>().is_ok());

    let (status, body) = send(&app, Method::HEAD, "/db/", None, Body::empty()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::Null);

    let (status, names) = get(&app, "/_all_dbs").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(names, json!(["db"]));

    let (status, _) = delete(&app, "/db").await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = get(&app, "/db").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], json!("not_found"));
}

#[tokio::test]
async fn test_invalid_database_name() {
    let app = app();
    let (status, body) = send(&app, Method::PUT, "/Bad", None, Body::empty()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("bad_request"));
}

#[tokio::test]
async fn test_missing_database_and_document() {
    let app = app_with_db().await;

    let (status, _) = get(&app, "/nope/doc").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = get(&app, "/db/absent").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["reason"], json!("missing"));
}

#[tokio::test]
async fn test_delete_document() {
    let app = app_with_db().await;
    let (_, body) = put_json(&app, "/db/gone", json!({"x": true})).await;
    let rev = body["rev"].as_str().unwrap().to_string();

    let (status, _) = delete(&app, "/db/gone").await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = delete(&app, &format!("/db/gone?rev={}", rev)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(body["rev"].as_str().unwrap().starts_with("2-"));

    let (status, body) = get(&app, "/db/gone").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["reason"], json!("deleted"));

    let (status, _) = delete(&app, "/db/never?rev=1-abc").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_changes_feed() {
    let app = app_with_db().await;
    put_json(&app, "/db/foo", json!({})).await;
    put_json(&app, "/db/bar", json!({})).await;

    let (status, body) = get(&app, "/db/_changes").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["last_seq"], json!(2));
    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["seq"], json!(1));
    assert_eq!(results[0]["id"], json!("foo"));
    assert_eq!(results[1]["seq"], json!(2));
    assert_eq!(results[1]["id"], json!("bar"));
    assert!(results[1]["changes"][0]["rev"].as_str().unwrap().starts_with("1-"));

    let (_, body) = get(&app, "/db/_changes?since=1&style=all_docs&heartbeat=10000").await;
    assert_eq!(body["last_seq"], json!(2));
    assert_eq!(body["results"].as_array().unwrap().len(), 1);

    let (_, body) = get(&app, "/db/_changes?since=2").await;
    assert_eq!(body["results"], json!([]));

    let (status, _) = get(&app, "/db/_changes?feed=continuous").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = get(&app, "/db/_changes?filter=app/only").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_bulk_docs_partial_failure() {
    let app = app_with_db().await;
    put_json(&app, "/db/taken", json!({})).await;

    let (status, body) = post_json(
        &app,
        "/db/_bulk_docs",
        json!({"docs": [{"_id": "one"}, {"_id": "taken"}, {"_id": "two"}]}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let results = body.as_array().unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(results[0]["ok"], json!(true));
    assert_eq!(results[1]["id"], json!("taken"));
    assert_eq!(results[1]["error"], json!("conflict"));
    assert_eq!(results[2]["ok"], json!(true));

    let (_, info) = get(&app, "/db").await;
    assert_eq!(info["update_seq"], json!(3));
}

#[tokio::test]
async fn test_bulk_docs_replay() {
    let app = app_with_db().await;
    let (status, body) = post_json(
        &app,
        "/db/_bulk_docs",
        json!({"docs": [{"_id": "r", "_rev": "3-abc", "v": 1}], "new_edits": false}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body[0]["rev"], json!("3-abc"));

    let (_, doc) = get(&app, "/db/r?rev=3-abc").await;
    assert_eq!(doc["v"], json!(1));
}

#[tokio::test]
async fn test_bad_json_body() {
    let app = app_with_db().await;
    let (status, body) = send(
        &app,
        Method::POST,
        "/db/_bulk_docs",
        Some("application/json"),
        Body::from("{not json"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("bad_request"));

    let (status, _) = send(&app, Method::PUT, "/db/doc", Some("application/json"), Body::from("[1]")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_revs_diff() {
    let app = app_with_db().await;
    let (_, body) = put_json(&app, "/db/known", json!({})).await;
    let rev = body["rev"].as_str().unwrap().to_string();

    let (status, diff) = post_json(
        &app,
        "/db/_revs_diff",
        json!({"known": [rev, "1-zzz"], "unknown": ["1-a"]}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(diff["known"]["missing"], json!(["1-zzz"]));
    assert_eq!(diff["unknown"]["missing"], json!(["1-a"]));
}

#[tokio::test]
async fn test_ensure_full_commit() {
    let app = app_with_db().await;
    let (status, body) = send(&app, Method::POST, "/db/_ensure_full_commit", None, Body::empty()).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["ok"], json!(true));

    let (_, info) = get(&app, "/db").await;
    assert_eq!(body["instance_start_time"], info["instance_start_time"]);
}

#[tokio::test]
async fn test_multipart_upload() {
    let app = app_with_db().await;
    let body = "--abc\r\n\
Content-Type: application/json\r\n\
\r\n\
{\"title\":\"with attachment\"}\r\n\
--abc\r\n\
Content-Disposition: attachment; filename=\"note.txt\"\r\n\
Content-Type: text/plain\r\n\
\r\n\
hello\r\n\
--abc--\r\n";

    let (status, created) = send(
        &app,
        Method::PUT,
        "/db/attdoc",
        Some("multipart/related; boundary=\"abc\""),
        Body::from(body),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(created["rev"].as_str().unwrap().starts_with("1-"));

    let (_, doc) = get(&app, "/db/attdoc").await;
    assert_eq!(doc["title"], json!("with attachment"));
    let note = &doc["_attachments"]["note.txt"];
    assert_eq!(note["stub"], json!(true));
    assert_eq!(note["content_type"], json!("text/plain"));
    assert_eq!(note["digest"], json!("md5-XUFAKrxLKna5cZ2REBfFkg=="));
    assert_eq!(note["length"], json!(5));
    assert_eq!(note["revpos"], json!(1));
    assert!(note.get("data").is_none());

    let (_, doc) = get(&app, "/db/attdoc?attachments=true").await;
    assert_eq!(doc["_attachments"]["note.txt"]["data"], json!("aGVsbG8="));
}

const RELATED_BODY: &str = "--abc\r\n\
Content-Type: application/json\r\n\
\r\n\
{\"title\":\"streamed\"}\r\n\
--abc\r\n\
Content-Disposition: attachment; filename=\"note.txt\"\r\n\
\r\n\
hello\r\n\
--abc--\r\n";

#[tokio::test]
async fn test_multipart_upload_in_chunks() {
    let app = app_with_db().await;
    let chunks: Vec<Result<Bytes, std::io::Error>> = RELATED_BODY
        .as_bytes()
        .chunks(7)
        .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
        .collect();

    let (status, created) = send(
        &app,
        Method::PUT,
        "/db/chunked",
        Some("multipart/related; boundary=abc"),
        Body::from_stream(futures::stream::iter(chunks)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(created["rev"].as_str().unwrap().starts_with("1-"));

    let (_, doc) = get(&app, "/db/chunked?attachments=true").await;
    assert_eq!(doc["title"], json!("streamed"));
    let note = &doc["_attachments"]["note.txt"];
    assert_eq!(note["data"], json!("aGVsbG8="));
    assert_eq!(note["content_type"], json!("application/octet-stream"));
}

#[tokio::test]
async fn test_multipart_upload_over_limit() {
    let mut config = Config::default();
    config.server.max_request_size = 64;
    let state = AppState::new(Arc::new(MemoryRegistry::in_memory()), config);
    let app = create_router(Arc::new(state));
    send(&app, Method::PUT, "/db", None, Body::empty()).await;

    let (status, body) = send(
        &app,
        Method::PUT,
        "/db/big",
        Some("multipart/related; boundary=abc"),
        Body::from(RELATED_BODY),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("bad_request"));

    let (status, _) = get(&app, "/db/big").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unsupported_content_type() {
    let app = app_with_db().await;
    let (status, _) = send(&app, Method::PUT, "/db/doc", Some("text/plain"), Body::from("{}")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, Method::PUT, "/db/doc", Some("multipart/related"), Body::from("")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_local_and_design_documents() {
    let app = app_with_db().await;

    let (status, _) = put_json(&app, "/db/_local/ckpt", json!({"seq": 1})).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = put_json(&app, "/db/_local/ckpt", json!({"seq": 2})).await;
    assert_eq!(status, StatusCode::CREATED);
    let (_, doc) = get(&app, "/db/_local/ckpt").await;
    assert_eq!(doc["_id"], json!("_local/ckpt"));
    assert_eq!(doc["seq"], json!(2));

    let (status, body) = put_json(&app, "/db/_design/app", json!({"views": {}})).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["id"], json!("_design/app"));

    let (_, info) = get(&app, "/db").await;
    assert_eq!(info["update_seq"], json!(1));
}

#[tokio::test]
async fn test_server_routes() {
    let app = app();

    let (status, body) = get(&app, "/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["couchdb"], json!("Welcome"));

    let (status, body) = get(&app, "/_up").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("ok"));

    let (status, text) = send_raw(&app, Method::GET, "/_metrics", None, Body::empty()).await;
    assert_eq!(status, StatusCode::OK);
    assert!(String::from_utf8_lossy(&text).contains("replica_documents_written_total"));

    let (status, body) = get(&app, "/a/b/c/d").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], json!("not_found"));
}
