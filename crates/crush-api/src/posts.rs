use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use crush_types::api::{Claims, CreatePostRequest, DeletePostResponse, UpdatePostRequest};

use crate::{ApiError, AppState, Pagination, blocking, convert};

pub(crate) fn validate_content(content: &str) -> Result<(), ApiError> {
    if content.trim().is_empty() {
        return Err(ApiError::Validation("content must not be empty".into()));
    }
    Ok(())
}

pub async fn create_post(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreatePostRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_content(&req.content)?;

    let uid = claims.sub.to_string();
    let row = blocking(&state, move |db| {
        db.create_post(&uid, &req.content, req.media_url.as_deref())
    })
    .await?;

    Ok((StatusCode::CREATED, Json(convert::post(row))))
}

pub async fn list_posts(
    State(state): State<AppState>,
    Query(page): Query<Pagination>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let (offset, limit) = page.clamped(state.max_page_size);
    let rows = blocking(&state, move |db| db.list_posts_with_counts(offset, limit)).await?;

    Ok(Json(
        rows.into_iter()
            .map(convert::post_with_counts)
            .collect::<Vec<_>>(),
    ))
}

pub async fn get_post(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let pid = post_id.to_string();
    let row = blocking(&state, move |db| {
        db.get_post(&pid)?.ok_or(crush_db::Error::NotFound("post"))
    })
    .await?;

    Ok(Json(convert::post(row)))
}

pub async fn update_post(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdatePostRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(content) = &req.content {
        validate_content(content)?;
    }

    let pid = post_id.to_string();
    let uid = claims.sub.to_string();
    let row = blocking(&state, move |db| {
        db.update_post(&pid, &uid, req.content.as_deref(), req.media_url.as_deref())
    })
    .await?;

    Ok(Json(convert::post(row)))
}

/// Author-only. Comments and reactions go with the post.
pub async fn delete_post(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let pid = post_id.to_string();
    let uid = claims.sub.to_string();
    let removed = blocking(&state, move |db| db.delete_post(&pid, &uid)).await?;

    Ok(Json(DeletePostResponse {
        id: post_id,
        comments_removed: removed.comments_removed,
        reactions_removed: removed.reactions_removed,
    }))
}
