use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;

use crush_db::models::{NewUser, ProfileUpdate};
use crush_types::api::{Claims, CreateUserRequest, UpdateUserRequest};

use crate::{ApiError, AppState, Pagination, blocking, convert, default_limit};

#[derive(Debug, Deserialize)]
pub struct UserListQuery {
    #[serde(default)]
    pub offset: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Case-insensitive search over username and full name.
    pub q: Option<String>,
}

fn validate_username(username: &str) -> Result<(), ApiError> {
    let chars = username.chars().count();
    if !(3..=32).contains(&chars) {
        return Err(ApiError::Validation(
            "username must be between 3 and 32 characters".into(),
        ));
    }
    Ok(())
}

/// Creates the profile for the token's subject.
pub async fn create_me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_username(&req.username)?;

    let new_user = NewUser {
        id: claims.sub.to_string(),
        username: req.username,
        email: req.email,
        full_name: req.full_name,
        university: req.university,
        is_verified: false,
    };
    let row = blocking(&state, move |db| db.create_user(&new_user)).await?;

    Ok((StatusCode::CREATED, Json(convert::user(row))))
}

pub async fn get_me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let uid = claims.sub.to_string();
    let row = blocking(&state, move |db| {
        db.get_user_by_id(&uid)?.ok_or(crush_db::Error::NotFound("user"))
    })
    .await?;

    Ok(Json(convert::user(row)))
}

pub async fn update_me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(username) = &req.username {
        validate_username(username)?;
    }

    let update = ProfileUpdate {
        email: req.email,
        username: req.username,
        full_name: req.full_name,
        bio: req.bio,
        profile_picture: req.profile_picture,
        university: req.university,
        department: req.department,
        graduation_year: req.graduation_year,
    };
    let uid = claims.sub.to_string();
    let row = blocking(&state, move |db| db.update_profile(&uid, &update)).await?;

    Ok(Json(convert::user(row)))
}

pub async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<UserListQuery>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = query.limit.clamp(1, state.max_page_size.max(1));
    let offset = query.offset;
    let term = query.q.filter(|q| !q.trim().is_empty());

    let rows = blocking(&state, move |db| match term {
        Some(term) => db.search_users(&term, offset, limit),
        None => db.list_users(offset, limit),
    })
    .await?;

    Ok(Json(rows.into_iter().map(convert::user).collect::<Vec<_>>()))
}

/// Verified users the caller has no connection with yet.
pub async fn suggestions(
    State(state): State<AppState>,
    Query(page): Query<Pagination>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let (offset, limit) = page.clamped(state.max_page_size);
    let uid = claims.sub.to_string();
    let rows = blocking(&state, move |db| db.suggested_users(&uid, offset, limit)).await?;

    Ok(Json(rows.into_iter().map(convert::user).collect::<Vec<_>>()))
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let uid = user_id.to_string();
    let row = blocking(&state, move |db| {
        db.get_user_by_id(&uid)?.ok_or(crush_db::Error::NotFound("user"))
    })
    .await?;

    Ok(Json(convert::user(row)))
}

pub async fn get_user_by_username(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let row = blocking(&state, move |db| {
        db.get_user_by_username(&username)?.ok_or(crush_db::Error::NotFound("user"))
    })
    .await?;

    Ok(Json(convert::user(row)))
}

pub async fn user_posts(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(page): Query<Pagination>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let (offset, limit) = page.clamped(state.max_page_size);
    let uid = user_id.to_string();
    let rows = blocking(&state, move |db| {
        if db.get_user_by_id(&uid)?.is_none() {
            return Err(crush_db::Error::NotFound("user"));
        }
        db.posts_by_user(&uid, offset, limit)
    })
    .await?;

    Ok(Json(rows.into_iter().map(convert::post).collect::<Vec<_>>()))
}
