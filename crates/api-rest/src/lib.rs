//! # API REST
//!
//! REST surface over a notification reconciler.
//!
//! Handles:
//! - HTTP endpoints with axum, backed by a [`ReconcilerHandle`]
//! - OpenAPI/Swagger documentation
//! - REST-specific concerns (JSON serialization, CORS, the `x-api-key` admin gate)
//!
//! Uses `api-shared` for request/response types.

#![warn(rust_2018_idioms)]

use api_shared::{
    validate_api_key, AuthError, ClearAllRes, CreateNotificationReq, CreateNotificationRes,
    HealthRes, HealthService, ListNotificationsRes, MarkAllReadRes, NotificationRes, ScopeUnread,
    SummaryRes,
};
use axum::{
    extract::{Path, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
    Router,
};
use clinic_core::{DocumentId, DocumentStore, NotifyError, ReconcilerHandle};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Header carrying the admin API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Application state shared across REST API handlers.
///
/// The handle reads and writes the reconciled view; the store is used directly only to create
/// notifications, which then reach the view through the live query like any external write.
#[derive(Clone)]
pub struct AppState {
    pub handle: ReconcilerHandle,
    pub store: Arc<dyn DocumentStore>,
    /// When `None`, notification routes are open (local development only).
    pub api_key: Option<Arc<str>>,
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        list_notifications,
        notification_summary,
        create_notification,
        mark_all_read,
        mark_one_read,
        delete_notification,
        clear_notifications,
    ),
    components(schemas(
        HealthRes,
        NotificationRes,
        ListNotificationsRes,
        ScopeUnread,
        SummaryRes,
        CreateNotificationReq,
        CreateNotificationRes,
        MarkAllReadRes,
        ClearAllRes,
    ))
)]
pub struct ApiDoc;

type ApiError = (StatusCode, &'static str);

/// Builds the REST router.
///
/// `/health` and the Swagger UI are open; everything under `/notifications` requires the
/// configured API key.
pub fn router(state: AppState) -> Router {
    let notifications = Router::new()
        .route(
            "/notifications",
            get(list_notifications)
                .post(create_notification)
                .delete(clear_notifications),
        )
        .route("/notifications/summary", get(notification_summary))
        .route("/notifications/read-all", post(mark_all_read))
        .route("/notifications/:id/read", post(mark_one_read))
        .route("/notifications/:id", delete(delete_notification))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ));

    Router::new()
        .route("/health", get(health))
        .merge(notifications)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if let Some(expected) = &state.api_key {
        let provided = request
            .headers()
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok());
        match validate_api_key(provided, expected) {
            Ok(()) => {}
            Err(AuthError::Missing) => {
                return (StatusCode::UNAUTHORIZED, "Missing x-api-key header").into_response()
            }
            Err(AuthError::Invalid) => {
                return (StatusCode::UNAUTHORIZED, "Invalid API key").into_response()
            }
        }
    }
    next.run(request).await
}

fn error_response(context: &str, e: NotifyError) -> ApiError {
    match e {
        NotifyError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "Bad request"),
        NotifyError::Write(err) | NotifyError::Subscription(err) => {
            tracing::error!("{} error: {}", context, err);
            (StatusCode::BAD_GATEWAY, "Document store rejected the request")
        }
        NotifyError::HandleClosed => {
            tracing::error!("{} error: reconciler stopped", context);
            (StatusCode::SERVICE_UNAVAILABLE, "Notifications unavailable")
        }
    }
}

fn parse_id(raw: &str) -> Result<DocumentId, ApiError> {
    DocumentId::parse(raw).map_err(|_| (StatusCode::BAD_REQUEST, "Invalid notification id"))
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint for the REST API
#[axum::debug_handler]
async fn health(State(_state): State<AppState>) -> Json<HealthRes> {
    Json(HealthService::check_health())
}

#[utoipa::path(
    get,
    path = "/notifications",
    responses(
        (status = 200, description = "Reconciled notifications, newest first", body = ListNotificationsRes),
        (status = 401, description = "Missing or invalid API key"),
        (status = 503, description = "Reconciler stopped")
    )
)]
/// List the reconciled notification view
///
/// Returns the materialized list together with the unread count. The view reflects every
/// change batch the reconciler has applied so far, so a write made elsewhere appears here once
/// its change has been delivered.
#[axum::debug_handler]
async fn list_notifications(
    State(state): State<AppState>,
) -> Result<Json<ListNotificationsRes>, ApiError> {
    let snapshot = state
        .handle
        .snapshot()
        .await
        .map_err(|e| error_response("List notifications", e))?;
    Ok(Json(ListNotificationsRes::from(&snapshot)))
}

#[utoipa::path(
    get,
    path = "/notifications/summary",
    responses(
        (status = 200, description = "Unread counts per scope", body = SummaryRes),
        (status = 401, description = "Missing or invalid API key")
    )
)]
/// Unread counts grouped by department scope, for the super-admin overview
#[axum::debug_handler]
async fn notification_summary(
    State(state): State<AppState>,
) -> Result<Json<SummaryRes>, ApiError> {
    let snapshot = state
        .handle
        .snapshot()
        .await
        .map_err(|e| error_response("Notification summary", e))?;
    Ok(Json(SummaryRes::from(&snapshot)))
}

#[utoipa::path(
    post,
    path = "/notifications",
    request_body = CreateNotificationReq,
    responses(
        (status = 201, description = "Notification created", body = CreateNotificationRes),
        (status = 400, description = "Bad request"),
        (status = 502, description = "Document store rejected the write")
    )
)]
/// Create a notification
///
/// Stands in for the booking and contact-form workflows that normally write notifications.
/// The new document is written to the store; the reconciled view picks it up from the live
/// query.
#[axum::debug_handler]
async fn create_notification(
    State(state): State<AppState>,
    Json(req): Json<CreateNotificationReq>,
) -> Result<(StatusCode, Json<CreateNotificationRes>), ApiError> {
    let draft = req
        .to_draft()
        .map_err(|e| error_response("Create notification", e))?;
    let id = state
        .store
        .add(draft.to_fields())
        .await
        .map_err(|e| error_response("Create notification", NotifyError::Write(e)))?;

    tracing::info!("created notification {}", id);
    Ok((
        StatusCode::CREATED,
        Json(CreateNotificationRes { id: id.to_string() }),
    ))
}

#[utoipa::path(
    post,
    path = "/notifications/read-all",
    responses(
        (status = 200, description = "Every unread notification marked read", body = MarkAllReadRes),
        (status = 502, description = "Document store rejected the batch; nothing changed")
    )
)]
/// Mark every unread notification in the view as read, atomically
#[axum::debug_handler]
async fn mark_all_read(State(state): State<AppState>) -> Result<Json<MarkAllReadRes>, ApiError> {
    let marked = state
        .handle
        .mark_all_read()
        .await
        .map_err(|e| error_response("Mark all read", e))?;
    Ok(Json(MarkAllReadRes { marked }))
}

#[utoipa::path(
    post,
    path = "/notifications/{id}/read",
    params(("id" = String, Path, description = "Notification id")),
    responses(
        (status = 204, description = "Marked read, or nothing to do"),
        (status = 400, description = "Invalid notification id"),
        (status = 502, description = "Document store rejected the write")
    )
)]
/// Mark one notification as read
#[axum::debug_handler]
async fn mark_one_read(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&id)?;
    state
        .handle
        .mark_one_read(id)
        .await
        .map_err(|e| error_response("Mark read", e))?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    delete,
    path = "/notifications/{id}",
    params(("id" = String, Path, description = "Notification id")),
    responses(
        (status = 204, description = "Deleted, or not in the view"),
        (status = 400, description = "Invalid notification id"),
        (status = 502, description = "Document store rejected the delete")
    )
)]
/// Delete one notification
#[axum::debug_handler]
async fn delete_notification(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&id)?;
    state
        .handle
        .delete_one(id)
        .await
        .map_err(|e| error_response("Delete notification", e))?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    delete,
    path = "/notifications",
    responses(
        (status = 200, description = "Every notification in the view deleted", body = ClearAllRes),
        (status = 502, description = "Document store rejected the batch; nothing changed")
    )
)]
/// Delete every notification in the view, atomically
#[axum::debug_handler]
async fn clear_notifications(
    State(state): State<AppState>,
) -> Result<Json<ClearAllRes>, ApiError> {
    let deleted = state
        .handle
        .clear_all()
        .await
        .map_err(|e| error_response("Clear notifications", e))?;
    Ok(Json(ClearAllRes { deleted }))
}
