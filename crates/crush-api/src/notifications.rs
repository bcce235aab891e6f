use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;

use crush_types::api::{Claims, CountResponse, UpdateNotificationRequest};

use crate::{ApiError, AppState, blocking, convert, default_limit};

#[derive(Debug, Deserialize)]
pub struct NotificationQuery {
    #[serde(default)]
    pub offset: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub unread_only: bool,
}

pub async fn list_notifications(
    State(state): State<AppState>,
    Query(query): Query<NotificationQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = query.limit.clamp(1, state.max_page_size.max(1));
    let offset = query.offset;
    let unread_only = query.unread_only;
    let uid = claims.sub.to_string();

    let rows = blocking(&state, move |db| {
        db.list_notifications(&uid, offset, limit, unread_only)
    })
    .await?;

    Ok(Json(
        rows.into_iter()
            .filter_map(convert::notification)
            .collect::<Vec<_>>(),
    ))
}

pub async fn unread_count(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let uid = claims.sub.to_string();
    let count = blocking(&state, move |db| db.unread_notification_count(&uid)).await?;

    Ok(Json(CountResponse { count }))
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let uid = claims.sub.to_string();
    let count = blocking(&state, move |db| db.mark_all_notifications_read(&uid)).await?;

    Ok(Json(CountResponse { count }))
}

pub async fn update_notification(
    State(state): State<AppState>,
    Path(notification_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateNotificationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let nid = notification_id.to_string();
    let uid = claims.sub.to_string();
    let row = blocking(&state, move |db| {
        db.set_notification_read(&nid, &uid, req.is_read)
    })
    .await?;

    let notification = convert::notification(row).ok_or(ApiError::Internal)?;
    Ok(Json(notification))
}

pub async fn delete_notification(
    State(state): State<AppState>,
    Path(notification_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let nid = notification_id.to_string();
    let uid = claims.sub.to_string();
    blocking(&state, move |db| db.delete_notification(&nid, &uid)).await?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_all(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let uid = claims.sub.to_string();
    let count = blocking(&state, move |db| db.delete_all_notifications(&uid)).await?;

    Ok(Json(CountResponse { count }))
}
