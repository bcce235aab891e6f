use axum::{
    Extension, Json,
    extract::{Query, State},
    response::IntoResponse,
};

use crush_types::api::Claims;

use crate::{ApiError, AppState, Pagination, blocking, convert};

/// Posts by the caller and their friends, newest first.
pub async fn home_feed(
    State(state): State<AppState>,
    Query(page): Query<Pagination>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let (offset, limit) = page.clamped(state.max_page_size);
    let uid = claims.sub.to_string();
    let rows = blocking(&state, move |db| db.home_feed(&uid, offset, limit)).await?;

    Ok(Json(convert::feed_page(rows)))
}
