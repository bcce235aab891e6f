use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use crush_types::api::{Claims, PostReactionsResponse, ReactRequest};
use crush_types::models::{ReactionCount, ReactionType};

use crate::{ApiError, AppState, Pagination, blocking, convert};

/// Sets the caller's reaction on a post. 201 on first reaction, 200 when an
/// existing reaction changed type.
pub async fn react(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ReactRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let reaction_type: ReactionType = req.reaction_type.parse()?;

    let pid = post_id.to_string();
    let uid = claims.sub.to_string();
    let (row, created) =
        blocking(&state, move |db| db.upsert_reaction(&uid, &pid, reaction_type)).await?;

    let status = if created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(convert::reaction(row))))
}

pub async fn list_reactions(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
    Query(page): Query<Pagination>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let (offset, limit) = page.clamped(state.max_page_size);
    let pid = post_id.to_string();
    let uid = claims.sub.to_string();

    let (rows, counts, mine) = blocking(&state, move |db| {
        if db.get_post(&pid)?.is_none() {
            return Err(crush_db::Error::NotFound("post"));
        }
        let rows = db.reactions_for_post(&pid, offset, limit)?;
        let counts = db.reaction_counts(&pid)?;
        let mine = db.get_reaction(&uid, &pid)?;
        Ok((rows, counts, mine))
    })
    .await?;

    let counts: Vec<ReactionCount> = counts
        .into_iter()
        .map(|(reaction_type, count)| ReactionCount {
            reaction_type,
            count,
        })
        .collect();

    Ok(Json(PostReactionsResponse {
        total: counts.iter().map(|c| c.count).sum(),
        counts,
        my_reaction: mine.map(convert::reaction),
        reactions: rows.into_iter().map(convert::reaction).collect(),
    }))
}

pub async fn remove_reaction(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let pid = post_id.to_string();
    let uid = claims.sub.to_string();
    blocking(&state, move |db| db.delete_reaction(&uid, &pid)).await?;

    Ok(StatusCode::NO_CONTENT)
}
