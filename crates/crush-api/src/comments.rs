use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use crush_types::api::{Claims, CountResponse, CreateCommentRequest, UpdateCommentRequest};

use crate::posts::validate_content;
use crate::{ApiError, AppState, Pagination, blocking, convert};

pub async fn create_comment(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateCommentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_content(&req.content)?;

    let pid = post_id.to_string();
    let uid = claims.sub.to_string();
    let parent_id = req.parent_id.map(|id| id.to_string());
    let (row, author) = blocking(&state, move |db| {
        let row = db.create_comment(&pid, &uid, &req.content, parent_id.as_deref())?;
        let author = db.get_user_by_id(&uid)?;
        Ok((row, author))
    })
    .await?;

    Ok((StatusCode::CREATED, Json(convert::comment(row, author))))
}

pub async fn list_comments(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
    Query(page): Query<Pagination>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let (offset, limit) = page.clamped(state.max_page_size);
    let pid = post_id.to_string();
    let threads = blocking(&state, move |db| db.list_comment_threads(&pid, offset, limit)).await?;

    Ok(Json(threads.into_iter().map(convert::thread).collect::<Vec<_>>()))
}

/// GET /posts/{post_id}/comments/latest: 404 when the post has no comments.
pub async fn latest_comment(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let pid = post_id.to_string();
    let row = blocking(&state, move |db| {
        db.latest_comment(&pid)?.ok_or(crush_db::Error::NotFound("comment"))
    })
    .await?;

    Ok(Json(convert::comment_with_author(row)))
}

pub async fn list_replies(
    State(state): State<AppState>,
    Path(comment_id): Path<Uuid>,
    Query(page): Query<Pagination>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let (offset, limit) = page.clamped(state.max_page_size);
    let cid = comment_id.to_string();
    let rows = blocking(&state, move |db| db.list_replies(&cid, offset, limit)).await?;

    Ok(Json(rows.into_iter().map(convert::comment_with_author).collect::<Vec<_>>()))
}

pub async fn update_comment(
    State(state): State<AppState>,
    Path(comment_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateCommentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_content(&req.content)?;

    let cid = comment_id.to_string();
    let uid = claims.sub.to_string();
    let (row, author) = blocking(&state, move |db| {
        let row = db.update_comment(&cid, &uid, &req.content)?;
        let author = db.get_user_by_id(&uid)?;
        Ok((row, author))
    })
    .await?;

    Ok(Json(convert::comment(row, author)))
}

/// Deletes the comment and its replies; reports how many rows went.
pub async fn delete_comment(
    State(state): State<AppState>,
    Path(comment_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let cid = comment_id.to_string();
    let uid = claims.sub.to_string();
    let count = blocking(&state, move |db| db.delete_comment(&cid, &uid)).await?;

    Ok(Json(CountResponse { count }))
}
