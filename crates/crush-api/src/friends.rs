use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;

use crush_db::SendOutcome;
use crush_types::api::{Claims, RespondFriendRequest, SendFriendRequest, SendFriendResponse};
use crush_types::models::{RequestDirection, RequestStatus};

use crate::{ApiError, AppState, blocking, convert};

#[derive(Debug, Deserialize)]
pub struct RequestListQuery {
    #[serde(default)]
    pub direction: RequestDirection,
    pub status: Option<String>,
}

/// 201 with `accepted = false` for a new pending request; 200 with
/// `accepted = true` when the receiver had already asked.
pub async fn send_request(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendFriendRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let sender = claims.sub.to_string();
    let receiver = req.receiver_id.to_string();
    let outcome = blocking(&state, move |db| db.send_request(&sender, &receiver)).await?;

    let (status, accepted, row) = match outcome {
        SendOutcome::Pending(row) => (StatusCode::CREATED, false, row),
        SendOutcome::Accepted(row) => (StatusCode::OK, true, row),
    };

    Ok((
        status,
        Json(SendFriendResponse {
            accepted,
            request: convert::friend_request(row),
        }),
    ))
}

pub async fn respond_to_request(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<RespondFriendRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let decision: RequestStatus = req.status.parse()?;

    let rid = request_id.to_string();
    let uid = claims.sub.to_string();
    let row = blocking(&state, move |db| db.respond_to_request(&rid, &uid, decision)).await?;

    Ok(Json(convert::friend_request(row)))
}

pub async fn cancel_request(
    State(state): State<AppState>,
    Path(request_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let rid = request_id.to_string();
    let uid = claims.sub.to_string();
    let row = blocking(&state, move |db| db.cancel_request(&rid, &uid)).await?;

    Ok(Json(convert::friend_request(row)))
}

pub async fn list_requests(
    State(state): State<AppState>,
    Query(query): Query<RequestListQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<RequestStatus>)
        .transpose()?;

    let uid = claims.sub.to_string();
    let direction = query.direction;
    let rows = blocking(&state, move |db| db.list_requests(&uid, direction, status)).await?;

    Ok(Json(
        rows.into_iter()
            .map(convert::friend_request)
            .collect::<Vec<_>>(),
    ))
}

pub async fn list_friends(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let uid = claims.sub.to_string();
    let rows = blocking(&state, move |db| db.friends(&uid)).await?;

    Ok(Json(rows.into_iter().map(convert::user).collect::<Vec<_>>()))
}

pub async fn remove_friend(
    State(state): State<AppState>,
    Path(friend_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let uid = claims.sub.to_string();
    let fid = friend_id.to_string();
    blocking(&state, move |db| db.remove_friendship(&uid, &fid)).await?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn friendship_status(
    State(state): State<AppState>,
    Path(other_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let uid = claims.sub.to_string();
    let oid = other_id.to_string();
    let relation = blocking(&state, move |db| db.friendship_status(&uid, &oid)).await?;

    Ok(Json(convert::relation(relation)))
}
