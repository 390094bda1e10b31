//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints, the router that wires them
//! together, and the master definition for the OpenAPI specification.

use axum::{
    extract::{rejection::JsonRejection, State},
    middleware as axum_middleware,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use poc_portal_core::ports::timestamp;
use serde_json::Value;
use std::sync::Arc;
use utoipa::OpenApi;

use crate::error::{ApiError, ErrorBody};
use crate::web::middleware::{log_requests, require_api_key};
use crate::web::protocol::{
    CommentRequest, CompleteRequest, DailyUpdateRequest, DeregisterRequest, DeregisterResponse,
    FeedbackRequest, HealthResponse, HeartbeatRequest, LinkResponse, RatingRequest, RegisterRequest,
    RegisterResponse, StatusResponse, UseCaseStatus, UseCaseTarget,
};
use crate::web::state::AppState;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        register_handler,
        deregister_handler,
        heartbeat_handler,
        daily_update_handler,
        complete_use_case_handler,
        rating_handler,
        feedback_handler,
        comment_handler,
        health_handler,
        backend_health_handler,
    ),
    components(
        schemas(
            RegisterRequest, RegisterResponse, DeregisterRequest, DeregisterResponse,
            UseCaseStatus, HeartbeatRequest, DailyUpdateRequest, StatusResponse,
            UseCaseTarget, CompleteRequest, RatingRequest, FeedbackRequest, CommentRequest,
            LinkResponse, HealthResponse, ErrorBody
        )
    ),
    tags(
        (name = "POC Portal API", description = "Registration and progress reporting for proof-of-concept projects.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// Router
//=========================================================================================

/// Builds the API router. Mutating routes sit behind the shared-secret check.
pub fn router(state: Arc<AppState>) -> Router {
    let protected_routes = Router::new()
        .route("/api/register", post(register_handler))
        .route("/api/deregister", post(deregister_handler))
        .route("/api/heartbeat", post(heartbeat_handler))
        .route("/api/daily_update", post(daily_update_handler))
        .route("/api/complete_use_case", post(complete_use_case_handler))
        .route("/api/rating", post(rating_handler))
        .route("/api/feedback", post(feedback_handler))
        .route("/api/comment", post(comment_handler))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ));

    let public_routes = Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/health/backend", get(backend_health_handler));

    Router::new()
        .merge(protected_routes)
        .merge(public_routes)
        .layer(axum_middleware::from_fn(log_requests))
        .with_state(state)
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Register a POC, or look up the one that already exists.
///
/// The POC is identified by owner e-mail, customer and product. Registering the same
/// triple twice returns the same `poc_uid` with `is_new = false`.
#[utoipa::path(
    post,
    path = "/api/register",
    request_body = RegisterRequest,
    responses(
        (status = 200, description = "POC registered or found", body = RegisterResponse),
        (status = 400, description = "Invalid JSON or missing fields", body = ErrorBody),
        (status = 401, description = "Missing or wrong API key", body = ErrorBody),
        (status = 500, description = "Backend or internal error", body = ErrorBody)
    ),
    params(("X-Api-Key" = Option<String>, Header, description = "Shared secret, when configured.")),
    tag = "POC Portal API"
)]
pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Json<RegisterResponse>, ApiError> {
    let Json(payload) = payload?;
    let registration = payload.into_registration()?;
    let registered = state.service.register(&registration).await?;
    Ok(Json(registered.into()))
}

/// Mark a POC inactive. Unknown ids succeed with an explanatory message.
#[utoipa::path(
    post,
    path = "/api/deregister",
    request_body = DeregisterRequest,
    responses(
        (status = 200, description = "POC deregistered", body = DeregisterResponse),
        (status = 400, description = "Missing poc_uid", body = ErrorBody),
        (status = 401, description = "Missing or wrong API key", body = ErrorBody)
    ),
    tag = "POC Portal API"
)]
pub async fn deregister_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<DeregisterRequest>, JsonRejection>,
) -> Result<Json<DeregisterResponse>, ApiError> {
    let Json(payload) = payload?;
    let poc_uid = payload.poc_uid()?;
    let outcome = state.service.deregister(&poc_uid).await?;
    Ok(Json(outcome.into()))
}

/// Report the full use case list of a registered POC.
///
/// Every listed use case ends active (unless stated otherwise); every other link of
/// the POC ends inactive.
#[utoipa::path(
    post,
    path = "/api/heartbeat",
    request_body = HeartbeatRequest,
    responses(
        (status = 200, description = "Snapshot applied", body = StatusResponse),
        (status = 400, description = "Missing poc_uid or use_cases", body = ErrorBody),
        (status = 404, description = "POC not registered", body = ErrorBody)
    ),
    tag = "POC Portal API"
)]
pub async fn heartbeat_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<HeartbeatRequest>, JsonRejection>,
) -> Result<Json<StatusResponse>, ApiError> {
    let Json(payload) = payload?;
    let (poc_uid, entries) = payload.into_parts()?;
    let applied = state.service.heartbeat(&poc_uid, &entries).await?;
    Ok(Json(applied.into()))
}

/// Report a full daily snapshot, creating the owner and the POC on first sight.
#[utoipa::path(
    post,
    path = "/api/daily_update",
    request_body = DailyUpdateRequest,
    responses(
        (status = 200, description = "Snapshot applied", body = StatusResponse),
        (status = 400, description = "Invalid JSON or missing fields", body = ErrorBody)
    ),
    tag = "POC Portal API"
)]
pub async fn daily_update_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<StatusResponse>, ApiError> {
    let Json(raw) = payload?;
    let request: DailyUpdateRequest =
        serde_json::from_value(raw.clone()).map_err(|e| ApiError::InvalidJson(e.to_string()))?;
    let update = request.into_daily_update(raw)?;
    let applied = state.service.daily_update(&update).await?;
    Ok(Json(applied.into()))
}

/// Mark one use case completed, or reopen it with `completed = false`.
#[utoipa::path(
    post,
    path = "/api/complete_use_case",
    request_body = CompleteRequest,
    responses(
        (status = 200, description = "Use case updated", body = LinkResponse),
        (status = 400, description = "Missing fields or invalid rating", body = ErrorBody),
        (status = 404, description = "POC not found", body = ErrorBody)
    ),
    tag = "POC Portal API"
)]
pub async fn complete_use_case_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CompleteRequest>, JsonRejection>,
) -> Result<Json<LinkResponse>, ApiError> {
    let Json(payload) = payload?;
    let completion = payload.into_completion()?;
    let changed = state.service.complete_use_case(&completion).await?;
    let mut response = LinkResponse::from(changed);
    response.completed = Some(completion.completed);
    Ok(Json(response))
}

/// Set the 1-5 rating of one use case.
#[utoipa::path(
    post,
    path = "/api/rating",
    request_body = RatingRequest,
    responses(
        (status = 200, description = "Rating stored", body = LinkResponse),
        (status = 400, description = "Missing fields or invalid rating", body = ErrorBody),
        (status = 404, description = "POC not found", body = ErrorBody)
    ),
    tag = "POC Portal API"
)]
pub async fn rating_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RatingRequest>, JsonRejection>,
) -> Result<Json<LinkResponse>, ApiError> {
    let Json(payload) = payload?;
    let change = payload.into_rating_change()?;
    let changed = state.service.rate_use_case(&change).await?;
    let mut response = LinkResponse::from(changed);
    response.rating = Some(change.rating.value());
    Ok(Json(response))
}

/// Submit text feedback for one use case.
#[utoipa::path(
    post,
    path = "/api/feedback",
    request_body = FeedbackRequest,
    responses(
        (status = 200, description = "Feedback stored", body = LinkResponse),
        (status = 400, description = "Missing fields or empty text", body = ErrorBody),
        (status = 404, description = "POC not found", body = ErrorBody)
    ),
    tag = "POC Portal API"
)]
pub async fn feedback_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<FeedbackRequest>, JsonRejection>,
) -> Result<Json<LinkResponse>, ApiError> {
    let Json(payload) = payload?;
    let feedback = payload.into_feedback()?;
    let changed = state
        .service
        .submit_feedback(&feedback.poc, &feedback.use_case, &feedback.text, feedback.rating)
        .await?;
    Ok(Json(changed.into()))
}

/// Add a feedback or question comment to one use case.
#[utoipa::path(
    post,
    path = "/api/comment",
    request_body = CommentRequest,
    responses(
        (status = 200, description = "Comment stored", body = LinkResponse),
        (status = 400, description = "Missing fields, invalid kind or rating", body = ErrorBody),
        (status = 404, description = "POC not found", body = ErrorBody)
    ),
    tag = "POC Portal API"
)]
pub async fn comment_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CommentRequest>, JsonRejection>,
) -> Result<Json<LinkResponse>, ApiError> {
    let Json(payload) = payload?;
    let submission = payload.into_submission()?;
    let changed = state.service.add_comment(&submission).await?;
    Ok(Json(changed.into()))
}

/// Liveness probe. Never touches the backend.
#[utoipa::path(
    get,
    path = "/api/health",
    responses((status = 200, description = "Service is up", body = HealthResponse)),
    tag = "POC Portal API"
)]
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: timestamp(Utc::now()),
    })
}

/// Readiness probe: the backend answers and accepts the service credentials.
#[utoipa::path(
    get,
    path = "/api/health/backend",
    responses(
        (status = 200, description = "Backend reachable", body = HealthResponse),
        (status = 503, description = "Backend unreachable", body = ErrorBody)
    ),
    tag = "POC Portal API"
)]
pub async fn backend_health_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<HealthResponse>, ApiError> {
    state
        .service
        .backend_health()
        .await
        .map_err(|e| ApiError::Unavailable(e.to_string()))?;
    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: timestamp(Utc::now()),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use poc_portal_core::domain::collections;
    use poc_portal_core::memory::{ManualClock, MemoryStore};
    use poc_portal_core::PortalService;
    use serde_json::json;
    use tower::ServiceExt;

    const SECRET: &str = "s3cret";

    fn app(secret: Option<&str>) -> (Arc<MemoryStore>, Router) {
        let store = Arc::new(MemoryStore::new());
        let service = PortalService::new(store.clone(), Arc::new(ManualClock::default()));
        let secret = secret.map(str::to_string);
        let config = Config::from_lookup(|key| match key {
            "PB_ADMIN_EMAIL" => Some("admin@example.com".to_string()),
            "PB_ADMIN_PASSWORD" => Some("secret".to_string()),
            "API_SHARED_SECRET" => secret.clone(),
            _ => None,
        })
        .unwrap();
        let state = Arc::new(AppState::new(service, Arc::new(config)));
        (store, router(state))
    }

    async fn post(app: &Router, path: &str, body: Value) -> (StatusCode, Value) {
        send(app, path, body, Some(SECRET)).await
    }

    async fn send(app: &Router, path: &str, body: Value, key: Option<&str>) -> (StatusCode, Value) {
        let mut request = Request::builder()
            .method("POST")
            .uri(path)
            .header("content-type", "application/json");
        if let Some(key) = key {
            request = request.header("x-api-key", key);
        }
        let response = app
            .clone()
            .oneshot(request.body(Body::from(body.to_string())).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    async fn get(app: &Router, path: &str) -> (StatusCode, Value) {
        let response = app
            .clone()
            .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    async fn register(app: &Router) -> String {
        let (status, body) = post(
            app,
            "/api/register",
            json!({ "se_email": "a@x.com", "customer_name": "Acme", "product": "P1" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        body["poc_uid"].as_str().unwrap().to_string()
    }

    fn link_of<'a>(store: &MemoryStore, links: &'a [Value], code: &str) -> &'a Value {
        let use_case = store
            .records(collections::USE_CASES)
            .into_iter()
            .find(|u| u["code"] == code)
            .unwrap();
        links.iter().find(|l| l["use_case"] == use_case["id"]).unwrap()
    }

    #[tokio::test]
    async fn register_twice_returns_the_same_poc() {
        let (store, app) = app(Some(SECRET));
        let body = json!({ "se_email": "a@x.com", "customer_name": "Acme", "product": "P1" });

        let (status, first) = post(&app, "/api/register", body.clone()).await;
        let (_, second) = post(&app, "/api/register", body).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["status"], "ok");
        assert_eq!(first["is_new"], true);
        assert_eq!(first["user_created"], true);
        assert_eq!(second["is_new"], false);
        assert!(second.get("user_created").is_none());
        assert_eq!(first["poc_uid"], second["poc_uid"]);
        assert_eq!(store.records(collections::POCS).len(), 1);
    }

    #[tokio::test]
    async fn wrong_or_missing_key_is_unauthorized() {
        let (store, app) = app(Some(SECRET));
        let body = json!({ "se_email": "a@x.com", "customer_name": "Acme", "product": "P1" });

        let (wrong, error) = send(&app, "/api/register", body.clone(), Some("nope")).await;
        let (missing, _) = send(&app, "/api/register", body, None).await;

        assert_eq!(wrong, StatusCode::UNAUTHORIZED);
        assert_eq!(missing, StatusCode::UNAUTHORIZED);
        assert_eq!(error["error"], "unauthorized");
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn unset_secret_disables_the_check() {
        let (_, app) = app(None);

        let (status, _) = send(
            &app,
            "/api/register",
            json!({ "se_email": "a@x.com", "customer_name": "Acme", "product": "P1" }),
            None,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn malformed_body_is_invalid_json() {
        let (_, app) = app(Some(SECRET));
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/register")
                    .header("content-type", "application/json")
                    .header("x-api-key", SECRET)
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "invalid_json");
    }

    #[tokio::test]
    async fn missing_fields_are_listed() {
        let (store, app) = app(Some(SECRET));

        let (status, body) = post(&app, "/api/register", json!({ "se_email": "a@x.com" })).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "missing_required_fields");
        assert_eq!(body["details"], "customer_name, product required");
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn heartbeats_replace_the_active_set() {
        let (store, app) = app(Some(SECRET));
        let poc_uid = register(&app).await;

        post(
            &app,
            "/api/heartbeat",
            json!({ "poc_uid": poc_uid, "use_cases": [{ "code": "dash", "is_completed": false }] }),
        )
        .await;
        let (status, body) = post(
            &app,
            "/api/heartbeat",
            json!({ "poc_uid": poc_uid, "use_cases": [{ "code": "other", "is_completed": true }] }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["use_cases_processed"], 1);
        assert_eq!(body["links_deactivated"], 1);
        let links = store.records(collections::POC_USE_CASES);
        assert_eq!(link_of(&store, &links, "dash")["is_active"], false);
        let other = link_of(&store, &links, "other");
        assert_eq!(other["is_active"], true);
        assert_eq!(other["is_completed"], true);
    }

    #[tokio::test]
    async fn heartbeat_for_unknown_poc_is_not_found() {
        let (_, app) = app(Some(SECRET));

        let (status, body) = post(
            &app,
            "/api/heartbeat",
            json!({ "poc_uid": "POC-000000000000", "use_cases": [{ "code": "dash" }] }),
        )
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "poc_not_found");
    }

    #[tokio::test]
    async fn heartbeat_without_uid_or_use_cases_is_rejected() {
        let (_, app) = app(Some(SECRET));

        let (_, no_uid) = post(&app, "/api/heartbeat", json!({ "use_cases": [] })).await;
        let (_, no_list) = post(&app, "/api/heartbeat", json!({ "poc_uid": "POC-1" })).await;

        assert_eq!(no_uid["error"], "missing_poc_uid");
        assert_eq!(no_list["error"], "missing_use_cases");
    }

    #[tokio::test]
    async fn out_of_range_rating_is_rejected_without_writes() {
        let (store, app) = app(Some(SECRET));
        let poc_uid = register(&app).await;
        let writes = store.write_count();

        let (status, body) = post(
            &app,
            "/api/rating",
            json!({ "poc_uid": poc_uid, "use_case_code": "dash", "rating": 9 }),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_rating");
        assert_eq!(store.write_count(), writes);
    }

    #[tokio::test]
    async fn rating_is_stored_on_the_link() {
        let (store, app) = app(Some(SECRET));
        let poc_uid = register(&app).await;

        let (status, body) = post(
            &app,
            "/api/rating",
            json!({ "poc_uid": poc_uid, "use_case_code": "dash", "rating": "4" }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["rating"], 4);
        assert_eq!(store.records(collections::POC_USE_CASES)[0]["rating"], 4);
    }

    #[tokio::test]
    async fn unknown_comment_kind_creates_no_comment() {
        let (store, app) = app(Some(SECRET));
        let poc_uid = register(&app).await;

        let (status, body) = post(
            &app,
            "/api/comment",
            json!({ "poc_uid": poc_uid, "use_case_code": "dash", "kind": "praise", "text": "nice" }),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_kind");
        assert!(store.records(collections::COMMENTS).is_empty());
    }

    #[tokio::test]
    async fn empty_feedback_creates_nothing_and_text_creates_one_comment() {
        let (store, app) = app(Some(SECRET));
        let poc_uid = register(&app).await;

        let (empty, body) = post(
            &app,
            "/api/feedback",
            json!({ "poc_uid": poc_uid, "use_case_code": "dash", "text": "" }),
        )
        .await;
        assert_eq!(empty, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "missing_text");
        assert!(store.records(collections::COMMENTS).is_empty());

        let (ok, body) = post(
            &app,
            "/api/feedback",
            json!({ "poc_uid": poc_uid, "use_case_code": "dash", "text": "ok" }),
        )
        .await;
        assert_eq!(ok, StatusCode::OK);
        assert!(body["comment_id"].is_string());
        let comments = store.records(collections::COMMENTS);
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0]["kind"], "feedback");
    }

    #[tokio::test]
    async fn completing_twice_restamps_the_link() {
        let (store, app) = app(Some(SECRET));
        let poc_uid = register(&app).await;
        let body = json!({ "poc_uid": poc_uid, "use_case_code": "dash" });

        let (status, response) = post(&app, "/api/complete_use_case", body.clone()).await;
        let first = store.records(collections::POC_USE_CASES)[0]["completed_at"].clone();
        post(&app, "/api/complete_use_case", body).await;
        let link = store.records(collections::POC_USE_CASES)[0].clone();

        assert_eq!(status, StatusCode::OK);
        assert_eq!(response["completed"], true);
        assert_eq!(link["is_completed"], true);
        assert!(first.as_str().is_some_and(|s| !s.is_empty()));
        assert_ne!(link["completed_at"], first);
    }

    #[tokio::test]
    async fn daily_update_creates_poc_and_snapshot() {
        let (store, app) = app(Some(SECRET));

        let (status, body) = post(
            &app,
            "/api/daily_update",
            json!({
                "se_email": "se@x.com",
                "poc_uid": "ACME-POC-1",
                "poc_name": "ACME Demo",
                "use_cases": [
                    { "code": "dash", "is_active": true, "feedback": ["", "ok"], "questions": ["how?"] }
                ]
            }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["comments_created"], 2);
        assert_eq!(body["snapshot_written"], true);
        assert_eq!(store.records(collections::POCS)[0]["poc_uid"], "ACME-POC-1");
        assert_eq!(store.records(collections::DAILY_STATUS).len(), 1);
    }

    #[tokio::test]
    async fn failed_link_create_is_a_backend_error_and_keeps_earlier_records() {
        let (store, app) = app(Some(SECRET));
        store.fail_creates_in(collections::POC_USE_CASES);

        let (status, body) = post(
            &app,
            "/api/daily_update",
            json!({
                "se_email": "se@x.com",
                "poc_uid": "ACME-POC-1",
                "use_cases": [{ "code": "dash" }]
            }),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "backend_http_error");
        assert!(body["details"].as_str().unwrap().contains("Failed to create record"));
        assert_eq!(store.records(collections::USERS).len(), 1);
        assert_eq!(store.records(collections::POCS)[0]["poc_uid"], "ACME-POC-1");
        assert_eq!(store.records(collections::USE_CASES).len(), 1);
        assert!(store.records(collections::POC_USE_CASES).is_empty());
    }

    #[tokio::test]
    async fn malformed_stored_record_is_an_internal_error() {
        let (store, app) = app(Some(SECRET));
        store.insert(collections::POCS, json!({ "poc_uid": "POC-1", "is_active": "yes" }));

        let (status, body) = post(&app, "/api/deregister", json!({ "poc_uid": "POC-1" })).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "internal_error");
        assert!(body["details"].as_str().unwrap().contains("Malformed pocs record"));
    }

    #[tokio::test]
    async fn deregister_unknown_poc_is_ok() {
        let (_, app) = app(Some(SECRET));

        let (status, body) = post(&app, "/api/deregister", json!({ "poc_uid": "POC-GONE" })).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert!(body["message"].is_string());
    }

    #[tokio::test]
    async fn health_needs_no_key_and_backend_health_reflects_the_store() {
        let (store, app) = app(Some(SECRET));

        let (status, body) = get(&app, "/api/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert!(body["timestamp"].is_string());

        let (up, _) = get(&app, "/api/health/backend").await;
        store.set_healthy(false);
        let (down, body) = get(&app, "/api/health/backend").await;

        assert_eq!(up, StatusCode::OK);
        assert_eq!(down, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "backend_unavailable");
    }

    #[test]
    fn openapi_document_lists_every_route() {
        let doc = ApiDoc::openapi();
        for path in [
            "/api/register",
            "/api/deregister",
            "/api/heartbeat",
            "/api/daily_update",
            "/api/complete_use_case",
            "/api/rating",
            "/api/feedback",
            "/api/comment",
            "/api/health",
            "/api/health/backend",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
