use std::sync::Arc;

use assigner_core::{Assigner, AssignmentStore, RetryPolicy, SettingsManager};
use axum::{extract::DefaultBodyLimit, routing, Router};
use tower::limit::GlobalConcurrencyLimitLayer;

use super::{admin, assign};

#[derive(Clone)]
pub struct AppState {
    pub assigner: Arc<Assigner>,
    pub settings: Arc<SettingsManager>,
    pub retry_policy: RetryPolicy,
    /// Upper bound accepted by `PUT /settings`.
    pub max_groups: i64,
}

impl AppState {
    pub fn new(
        store: Arc<dyn AssignmentStore>,
        retry_policy: RetryPolicy,
        max_groups: i64,
    ) -> Self {
        Self {
            assigner: Arc::new(Assigner::new(store.clone())),
            settings: Arc::new(SettingsManager::new(store)),
            retry_policy,
            max_groups,
        }
    }
}

pub fn add_routes(
    router: Router,
    state: AppState,
    max_body_size: usize,
    concurrency_limit: usize,
) -> Router {
    let api = Router::new()
        .route("/assign", routing::post(assign::post_assign))
        .route("/assignments/:token", routing::get(assign::get_assignment))
        .route("/status", routing::get(admin::get_status))
        .route(
            "/settings",
            routing::get(admin::get_settings).put(admin::put_settings),
        )
        .route("/reset", routing::post(admin::post_reset))
        // One semaphore shared by every route, so the limit is per process rather than per route.
        .layer(GlobalConcurrencyLimitLayer::new(concurrency_limit))
        .layer(DefaultBodyLimit::max(max_body_size))
        .with_state(state);

    router
        .route("/", routing::get(index))
        .route("/_readiness", routing::get(index))
        .route("/_liveness", routing::get(index)) // No background loop to watch, axum being up is enough
        .merge(api)
}

pub async fn index() -> &'static str {
    "group assigner"
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use assert_json_diff::assert_json_include;
    use assigner_core::{MemoryStore, Settings};
    use axum::{
        body::Body,
        http::{self, header, Request, StatusCode},
        response::Response,
    };
    use http_body_util::BodyExt; // for `collect`
    use serde_json::{json, Value};
    use tower::ServiceExt; // for `call`, `oneshot`, and `ready`

    fn test_app(settings: Settings) -> (Arc<MemoryStore>, Router) {
        app_with_limits(settings, Duration::from_millis(50), 10)
    }

    fn app_with_limits(
        settings: Settings,
        lock_timeout: Duration,
        concurrency_limit: usize,
    ) -> (Arc<MemoryStore>, Router) {
        let store = Arc::new(MemoryStore::with_settings(settings, lock_timeout));
        let state = AppState::new(store.clone(), RetryPolicy::no_retries(), 50);

        (
            store,
            add_routes(Router::new(), state, 16384, concurrency_limit),
        )
    }

    fn json_request(method: http::Method, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(http::header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn index() {
        let (_, app) = test_app(Settings::new(10, 2));

        let response = app.oneshot(get("/")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"group assigner");
    }

    #[tokio::test]
    async fn assign_is_idempotent() {
        let (_, app) = test_app(Settings::new(10, 2));

        let response = app
            .clone()
            .oneshot(json_request(
                http::Method::POST,
                "/assign",
                json!({"token": "user-1"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let first = json_body(response).await;
        assert_eq!(first["token"], "user-1");
        let group = first["group"].as_u64().unwrap();
        assert!((1..=2).contains(&group));

        let response = app
            .oneshot(json_request(
                http::Method::POST,
                "/assign",
                json!({"token": "user-1"}),
            ))
            .await
            .unwrap();
        assert_eq!(json_body(response).await, first);
    }

    #[tokio::test]
    async fn assign_rejects_bad_tokens() {
        let (store, app) = test_app(Settings::new(10, 2));

        for token in [String::new(), "x".repeat(257)] {
            let response = app
                .clone()
                .oneshot(json_request(
                    http::Method::POST,
                    "/assign",
                    json!({ "token": token }),
                ))
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            assert!(json_body(response).await["error"].is_string());
        }

        assert_eq!(store.assigned_total().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn assign_with_broken_settings_is_a_conflict() {
        let (store, app) = test_app(Settings::new(0, 0));

        let response = app
            .oneshot(json_request(
                http::Method::POST,
                "/assign",
                json!({"token": "user-1"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(store.assigned_total().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn held_lock_returns_retry_after() {
        let (store, app) = test_app(Settings::new(10, 2));
        let held = store.begin_exclusive().await.unwrap();

        let response = app
            .oneshot(json_request(
                http::Method::POST,
                "/assign",
                json!({"token": "user-1"}),
            ))
            .await
            .unwrap();
        drop(held);

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers()[header::RETRY_AFTER], "1");
    }

    #[tokio::test]
    async fn status_is_served_while_an_assignment_holds_the_lock() {
        let (store, app) = test_app(Settings::new(10, 2));
        let held = store.begin_exclusive().await.unwrap();

        let response = app.oneshot(get("/status")).await.unwrap();
        drop(held);

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn concurrency_limit_is_shared_across_routes() {
        let (store, app) = app_with_limits(Settings::new(10, 2), Duration::from_secs(5), 1);
        let held = store.begin_exclusive().await.unwrap();

        // Takes the only permit and waits for the writer lock.
        let pending_assign = tokio::spawn(app.clone().oneshot(json_request(
            http::Method::POST,
            "/assign",
            json!({"token": "user-1"}),
        )));
        tokio::time::sleep(Duration::from_millis(50)).await;

        let status = tokio::time::timeout(
            Duration::from_millis(100),
            app.clone().oneshot(get("/status")),
        )
        .await;
        assert!(status.is_err(), "status should wait for a permit");

        drop(held);
        let response = pending_assign.await.unwrap().unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app.oneshot(get("/status")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn lookup_returns_stored_assignment() {
        let (_, app) = test_app(Settings::new(10, 2));

        let response = app.clone().oneshot(get("/assignments/user-1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .clone()
            .oneshot(json_request(
                http::Method::POST,
                "/assign",
                json!({"token": "user-1"}),
            ))
            .await
            .unwrap();
        let group = json_body(response).await["group"].clone();

        let response = app.oneshot(get("/assignments/user-1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_json_include!(
            actual: body.clone(),
            expected: json!({"token": "user-1", "group": group})
        );
        assert!(body["created_at"].is_string());
    }

    #[tokio::test]
    async fn status_reports_every_group() {
        let (_, app) = test_app(Settings::new(10, 3));

        for token in ["a", "b", "c"] {
            app.clone()
                .oneshot(json_request(
                    http::Method::POST,
                    "/assign",
                    json!({ "token": token }),
                ))
                .await
                .unwrap();
        }

        let response = app.oneshot(get("/status")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_json_include!(
            actual: body.clone(),
            expected: json!({"total": 10, "group_count": 3, "assigned_total": 3})
        );
        let per_group = body["per_group"].as_array().unwrap();
        assert_eq!(per_group.len(), 3);
        for (index, group) in per_group.iter().enumerate() {
            assert_eq!(group["group"], index + 1);
        }
        let assigned: i64 = per_group
            .iter()
            .map(|g| g["assigned"].as_i64().unwrap())
            .sum();
        assert_eq!(assigned, 3);
        let capacities: Vec<i64> = per_group
            .iter()
            .map(|g| g["capacity"].as_i64().unwrap())
            .collect();
        assert_eq!(capacities, vec![4, 3, 3]);
    }

    #[tokio::test]
    async fn settings_can_be_read_and_updated() {
        let (_, app) = test_app(Settings::new(1000, 7));

        let response = app.clone().oneshot(get("/settings")).await.unwrap();
        assert_eq!(json_body(response).await, json!({"total": 1000, "groups": 7}));

        let response = app
            .clone()
            .oneshot(json_request(
                http::Method::PUT,
                "/settings",
                json!({"total": 100, "groups": 4}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!({"total": 100, "groups": 4}));

        let response = app.oneshot(get("/settings")).await.unwrap();
        assert_eq!(json_body(response).await, json!({"total": 100, "groups": 4}));
    }

    #[tokio::test]
    async fn invalid_settings_are_rejected() {
        let (_, app) = test_app(Settings::new(1000, 7));

        for body in [
            json!({"total": 0, "groups": 4}),
            json!({"total": 100, "groups": 0}),
            json!({"total": 100, "groups": 51}),
        ] {
            let response = app
                .clone()
                .oneshot(json_request(http::Method::PUT, "/settings", body))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        }

        let response = app.oneshot(get("/settings")).await.unwrap();
        assert_eq!(json_body(response).await, json!({"total": 1000, "groups": 7}));
    }

    #[tokio::test]
    async fn reset_deletes_assignments() {
        let (store, app) = test_app(Settings::new(10, 2));

        for token in ["a", "b"] {
            app.clone()
                .oneshot(json_request(
                    http::Method::POST,
                    "/assign",
                    json!({ "token": token }),
                ))
                .await
                .unwrap();
        }

        let response = app
            .oneshot(
                Request::builder()
                    .method(http::Method::POST)
                    .uri("/reset")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!({"deleted": 2}));
        assert_eq!(store.assigned_total().await.unwrap(), 0);
        assert_eq!(store.settings().await.unwrap(), Settings::new(10, 2));
    }
}
