use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use napulita_api::rest::{MODERATOR_HEADER, USER_HEADER};
use napulita_api::{router, AppState, QueryGateway};
use napulita_common::EngineConfig;
use napulita_engine::{AcceptingPhotoStore, LifecycleEngine};
use napulita_geo::GeohashIndex;
use napulita_scoring::{CategoryMultiplierPolicy, MemoryScoreLedger, Scoring};
use napulita_store::MemoryReportStore;

async fn app() -> Router {
    let scoring = Scoring::load(
        Arc::new(MemoryScoreLedger::new()),
        Arc::new(CategoryMultiplierPolicy::default()),
    )
    .await
    .unwrap();
    let engine = LifecycleEngine::new(
        Arc::new(MemoryReportStore::new()),
        Arc::new(GeohashIndex::new()),
        Arc::new(AcceptingPhotoStore::new(Some("https://cdn.napulita.test".into()))),
        Arc::new(scoring),
        EngineConfig::default(),
    );
    router(Arc::new(AppState {
        gateway: QueryGateway::new(Arc::new(engine)),
    }))
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    user: Option<(Uuid, bool)>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some((user_id, moderator)) = user {
        req = req.header(USER_HEADER, user_id.to_string());
        if moderator {
            req = req.header(MODERATOR_HEADER, "true");
        }
    }
    let req = match body {
        Some(body) => req
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => req.body(Body::empty()).unwrap(),
    };

    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

fn report_body() -> Value {
    json!({
        "lat": 40.8518,
        "lon": 14.2681,
        "category": "dog_waste",
        "note": "via Toledo, angolo",
        "photoRef": "before/1.jpg"
    })
}

#[tokio::test]
async fn health_check() {
    let app = app().await;
    let resp = app
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn report_lifecycle_over_http() {
    let app = app().await;
    let reporter = Uuid::new_v4();
    let cleaner = Uuid::new_v4();

    let (status, body) = send(&app, "POST", "/api/reports", Some((reporter, false)), Some(report_body())).await;
    assert_eq!(status, StatusCode::CREATED);
    let id = body["id"].as_i64().unwrap();

    let (status, body) = send(&app, "POST", &format!("/api/reports/{id}/claim"), Some((cleaner, false)), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["claimed"], true);

    let (_, body) = send(&app, "POST", &format!("/api/reports/{id}/claim"), Some((Uuid::new_v4(), false)), None).await;
    assert_eq!(body["claimed"], false);

    let cleanup = json!({ "afterPhotoRef": "after/1.jpg", "afterLat": 40.8519, "afterLon": 14.2681 });
    let (status, body) = send(&app, "POST", &format!("/api/reports/{id}/cleanup"), Some((cleaner, false)), Some(cleanup)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cleaned"], true);

    let (status, body) = send(&app, "GET", &format!("/api/reports/{id}"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "cleaned");
    assert_eq!(body["category"], "dog_waste");
    assert_eq!(body["before_photo_url"], "https://cdn.napulita.test/before/1.jpg");

    let (status, body) = send(&app, "GET", "/api/leaderboard?timeframe=all_time", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["user_id"], cleaner.to_string());
    assert_eq!(body[0]["points"], 10);
}

#[tokio::test]
async fn errors_carry_kind_and_message() {
    let app = app().await;
    let user = Uuid::new_v4();

    let (status, body) = send(&app, "POST", "/api/reports", None, Some(report_body())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["kind"], "permission_denied");

    let (status, body) = send(&app, "GET", "/api/reports/77", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["kind"], "not_found");
    assert!(body["error"]["message"].as_str().is_some());

    let (status, body) = send(&app, "GET", "/api/reports/abc", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["kind"], "invalid_argument");

    let (status, body) = send(&app, "GET", "/api/reports?days=soon", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["kind"], "invalid_argument");

    let (status, body) = send(&app, "POST", "/api/reports", Some((user, false)), Some(json!({ "lat": 40.85 }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]["message"].as_str().unwrap().contains("category"));

    let (_, body) = send(&app, "POST", "/api/reports", Some((user, false)), Some(report_body())).await;
    let id = body["id"].as_i64().unwrap();
    send(&app, "POST", &format!("/api/reports/{id}/claim"), Some((user, false)), None).await;
    let far = json!({ "after_photo_ref": "after/1.jpg", "after_lat": 40.90, "after_lon": 14.2681 });
    let (status, body) = send(&app, "POST", &format!("/api/reports/{id}/cleanup"), Some((user, false)), Some(far)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["kind"], "validation_failed");
}

#[tokio::test]
async fn moderation_and_comments_over_http() {
    let app = app().await;
    let user = Uuid::new_v4();
    let moderator = Uuid::new_v4();

    let (_, body) = send(&app, "POST", "/api/reports", Some((user, false)), Some(report_body())).await;
    let id = body["id"].as_i64().unwrap();

    let (status, body) = send(&app, "POST", &format!("/api/reports/{id}/comments"), Some((user, false)), Some(json!({ "body": "ancora qui" }))).await;
    assert_eq!(status, StatusCode::CREATED);
    let root = body["id"].as_i64().unwrap();

    let (status, _) = send(&app, "POST", &format!("/api/reports/{id}/comments"), Some((moderator, true)), Some(json!({ "body": "grazie", "parentId": root }))).await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, thread) = send(&app, "GET", &format!("/api/reports/{id}/comments"), None, None).await;
    assert_eq!(thread.as_array().unwrap().len(), 2);
    assert_eq!(thread[1]["parent_id"], root);

    let (status, _) = send(&app, "POST", &format!("/api/reports/{id}/invalidate"), Some((user, false)), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&app, "POST", &format!("/api/reports/{id}/invalidate"), Some((moderator, true)), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["invalidated"], true);

    let (_, body) = send(&app, "GET", "/api/reports?status=invalid", None, None).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
}
