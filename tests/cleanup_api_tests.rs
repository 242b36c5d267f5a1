//! HTTP-level tests for the admin API, driven through `tower::ServiceExt::oneshot`.

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use chrono::{Duration, Utc};
use common::ContentDb;
use common::clock::Clock;
use common::config::Configuration;
use common::testing::{BlobCall, FakeBlobBackend, ManualClock, TestConfigBuilder};
use http_body_util::BodyExt;
use router::{AppState, create_router};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

const ADMIN_KEY: &str = "admin-key";
const EDITOR_KEY: &str = "editor-key";
const PUBLIC_URL: &str = "https://cdn.isynergies.test";

struct TestApp {
    app: Router,
    backend: FakeBlobBackend,
    db: ContentDb,
    clock: ManualClock,
}

fn base_config() -> TestConfigBuilder {
    TestConfigBuilder::new()
        .in_memory()
        .with_public_url(PUBLIC_URL)
        .with_storage_token("rw-token")
        .with_admin_key(ADMIN_KEY)
        .with_editor_key(EDITOR_KEY)
}

async fn test_app(config: Configuration) -> TestApp {
    let configured = config.storage.credential().is_some();
    let backend = FakeBlobBackend::new(PUBLIC_URL);
    let db = ContentDb::new_in_memory().await.unwrap();
    let clock = ManualClock::new(Utc::now());

    let blob_backend: Option<Arc<dyn common::BlobBackend>> = if configured {
        Some(Arc::new(backend.clone()))
    } else {
        None
    };
    let state = AppState::new(config, db.clone(), blob_backend, Arc::new(clock.clone()));

    TestApp {
        app: create_router(state),
        backend,
        db,
        clock,
    }
}

async fn send(app: &Router, method: Method, uri: &str, key: Option<&str>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(key) = key {
        builder = builder.header("authorization", format!("Bearer {key}"));
    }
    let response = app
        .clone()
        .oneshot(builder.body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        })
    };
    (status, body)
}

async fn admin(app: &Router, method: Method, uri: &str) -> (StatusCode, Value) {
    send(app, method, uri, Some(ADMIN_KEY)).await
}

#[tokio::test]
async fn test_health_needs_no_auth() {
    let app = test_app(base_config().build()).await;
    let (status, _) = send(&app.app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_auth_gate_runs_before_storage() {
    let app = test_app(base_config().build()).await;

    let (status, body) = send(&app.app, Method::POST, "/cleanup-blobs", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);

    let (status, _) = send(&app.app, Method::POST, "/cleanup-blobs", Some("wrong")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app.app, Method::POST, "/media-cleanup", Some(EDITOR_KEY)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    assert!(app.backend.calls().is_empty());
}

#[tokio::test]
async fn test_unconfigured_storage_is_a_noop() {
    let config = TestConfigBuilder::new()
        .in_memory()
        .with_admin_key(ADMIN_KEY)
        .build();
    let app = test_app(config).await;

    let (status, body) = admin(
        &app.app,
        Method::POST,
        "/cleanup-blobs?dryRun=false&mode=bogus&limit=abc",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["deleted"], 0);
    assert_eq!(body["skipped"], 0);
    assert!(body["message"].is_string());

    let (status, body) = admin(&app.app, Method::GET, "/cleanup-blobs").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["summary"]["orphanedBlobs"], 0);
    assert_eq!(body["orphanedBlobs"], Value::Array(vec![]));

    assert!(app.backend.calls().is_empty());
}

#[tokio::test]
async fn test_dry_run_lists_orphans_without_deleting() {
    let app = test_app(base_config().build()).await;
    let now = Utc::now();
    for name in ["a.png", "b.png", "c.png", "d.png"] {
        app.backend.insert(name, now, 2048);
    }
    app.db
        .insert_image(Some(&app.backend.url_for("b.png")), Some("b.png"))
        .await
        .unwrap();
    app.db
        .insert_media(None, Some(&app.backend.url_for("d.png")), "image")
        .await
        .unwrap();

    let (status, body) = admin(&app.app, Method::POST, "/cleanup-blobs?dryRun=true").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["dryRun"], true);
    assert_eq!(body["mode"], "orphaned");
    assert_eq!(body["summary"]["totalBlobsInStorage"], 4);
    assert_eq!(body["summary"]["referencedBlobs"], 2);
    assert_eq!(body["summary"]["blobsToDelete"], 2);
    assert_eq!(body["summary"]["deleted"], 0);
    assert!(body["summary"].get("kept").is_none());
    assert!(body.get("deletionResults").is_none());

    let listed: Vec<&str> = body["blobsToDelete"]
        .as_array()
        .unwrap()
        .iter()
        .map(|blob| blob["pathname"].as_str().unwrap())
        .collect();
    assert_eq!(listed, vec!["a.png", "c.png"]);
    assert_eq!(body["blobsToDelete"][0]["size"], 2048);
    assert!(body["blobsToDelete"][0]["uploadedAt"].is_string());

    assert_eq!(app.backend.len(), 4);
}

#[tokio::test]
async fn test_cleanup_all_mode_reports_results() {
    let app = test_app(base_config().build()).await;
    let now = Utc::now();
    for (i, name) in ["t1", "t2", "t3", "t4", "t5"].iter().enumerate() {
        app.backend.insert(name, now - Duration::minutes(10 - i as i64), 1);
    }
    app.backend.fail_bulk_deletes();
    app.backend.fail_delete_of(&app.backend.url_for("t2"));

    let (status, body) = admin(
        &app.app,
        Method::POST,
        "/cleanup-blobs?mode=all&keepCount=2",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["dryRun"], false);
    assert_eq!(body["mode"], "all");
    assert_eq!(body["summary"]["kept"], 2);
    assert_eq!(body["summary"]["blobsToDelete"], 3);
    assert_eq!(body["summary"]["deleted"], 2);
    assert_eq!(body["summary"]["failed"], 1);
    assert!(body["summary"].get("referencedBlobs").is_none());
    assert!(body.get("blobsToDelete").is_none());

    let results = body["deletionResults"].as_array().unwrap();
    assert_eq!(results.len(), 3);
    let failed: Vec<&Value> = results.iter().filter(|r| r["success"] == false).collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0]["url"], app.backend.url_for("t2"));
    assert!(failed[0]["error"].is_string());

    assert_eq!(
        app.backend.urls(),
        vec![
            app.backend.url_for("t2"),
            app.backend.url_for("t4"),
            app.backend.url_for("t5")
        ]
    );
}

#[tokio::test]
async fn test_cleanup_old_mode_uses_age_cutoff() {
    let app = test_app(base_config().build()).await;
    let now = app.clock.now();
    app.backend.insert("stale.png", now - Duration::minutes(90), 1);
    app.backend.insert("recent.png", now - Duration::minutes(30), 1);
    app.backend.insert("fresh.png", now, 1);

    let (status, body) = admin(
        &app.app,
        Method::POST,
        "/cleanup-blobs?dryRun=true&mode=old&olderThanMinutes=45",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["mode"], "old");
    assert_eq!(body["summary"]["totalBlobsInStorage"], 3);
    assert_eq!(body["summary"]["blobsToDelete"], 1);
    assert_eq!(body["blobsToDelete"][0]["pathname"], "stale.png");

    // Twenty minutes later the second blob has crossed the cutoff too.
    app.clock.advance(Duration::minutes(20));
    let (status, body) = admin(
        &app.app,
        Method::POST,
        "/cleanup-blobs?mode=old&olderThanMinutes=45",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["summary"]["deleted"], 2);
    assert_eq!(body["summary"]["failed"], 0);
    assert_eq!(app.backend.urls(), vec![app.backend.url_for("fresh.png")]);
}

#[tokio::test]
async fn test_invalid_parameters_are_rejected() {
    let app = test_app(base_config().build()).await;

    let (status, body) = admin(&app.app, Method::POST, "/cleanup-blobs?mode=newest").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let (status, _) = admin(&app.app, Method::POST, "/cleanup-blobs?limit=lots").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = admin(&app.app, Method::POST, "/cleanup-blobs?dryRun=maybe").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert!(app.backend.calls().is_empty());
}

#[tokio::test]
async fn test_storage_failure_detail_depends_on_environment() {
    let app = test_app(base_config().build()).await;
    app.backend.fail_listing("bucket unreachable");

    let (status, body) = admin(&app.app, Method::GET, "/cleanup-blobs").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Internal server error");
    assert!(body.get("stack").is_none());

    let app = test_app(base_config().development().build()).await;
    app.backend.fail_listing("bucket unreachable");

    let (status, body) = admin(&app.app, Method::POST, "/cleanup-blobs").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let stack = body["stack"].as_array().unwrap();
    assert!(stack.iter().any(|line| line == "bucket unreachable"));
}

#[tokio::test]
async fn test_stats_are_cached_until_cleanup_or_logout() {
    let app = test_app(base_config().build()).await;
    let now = Utc::now();
    app.backend.insert("orphan-1.png", now, 1);

    let (_, first) = admin(&app.app, Method::GET, "/cleanup-blobs").await;
    assert_eq!(first["summary"]["orphanedBlobs"], 1);

    // A new orphan is invisible while the cached response is fresh
    app.backend.insert("orphan-2.png", now, 1);
    let (_, cached) = admin(&app.app, Method::GET, "/cleanup-blobs").await;
    assert_eq!(cached["summary"]["orphanedBlobs"], 1);

    // A different limit is a different cache entry
    let (_, other) = admin(&app.app, Method::GET, "/cleanup-blobs?limit=10").await;
    assert_eq!(other["summary"]["orphanedBlobs"], 2);

    let (status, _) = admin(&app.app, Method::POST, "/logout").await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, fresh) = admin(&app.app, Method::GET, "/cleanup-blobs").await;
    assert_eq!(fresh["summary"]["orphanedBlobs"], 2);

    // Expiry
    app.backend.insert("orphan-3.png", now, 1);
    app.clock.advance(Duration::seconds(61));
    let (_, expired) = admin(&app.app, Method::GET, "/cleanup-blobs").await;
    assert_eq!(expired["summary"]["orphanedBlobs"], 3);

    // Cleanup invalidates
    admin(&app.app, Method::POST, "/cleanup-blobs").await;
    let (_, after) = admin(&app.app, Method::GET, "/cleanup-blobs").await;
    assert_eq!(after["summary"]["orphanedBlobs"], 0);

    let lists = app
        .backend
        .calls()
        .iter()
        .filter(|call| matches!(call, BlobCall::List { .. }))
        .count();
    assert_eq!(lists, 6);
}

#[tokio::test]
async fn test_media_cleanup_removes_dangling_rows() {
    let app = test_app(base_config().build()).await;

    let image = app.db.insert_image(None, Some("kept.png")).await.unwrap();
    app.db.insert_media(Some(image), None, "image").await.unwrap();
    let orphan = app.db.insert_media(Some(42), None, "image").await.unwrap();
    let chunk = app.db.insert_image_chunk(42, 0, b"data").await.unwrap();

    let (status, body) = admin(&app.app, Method::POST, "/media-cleanup").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["summary"]["orphanMedia"], 1);
    assert_eq!(body["summary"]["orphanChunks"], 1);
    assert_eq!(body["orphanMediaIds"], serde_json::json!([orphan]));
    assert_eq!(body["orphanChunkIds"], serde_json::json!([chunk]));
}
