use serde::{Deserialize, Serialize};
use uuid::Uuid;

// -- JWT Claims --

/// Bearer token claims. Tokens are minted by the identity service; this
/// backend only verifies them with the shared secret.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: usize,
}

// -- Users --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateUserRequest {
    pub username: String,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub university: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateUserRequest {
    pub email: Option<String>,
    pub username: Option<String>,
    pub full_name: Option<String>,
    pub bio: Option<String>,
    pub profile_picture: Option<String>,
    pub university: Option<String>,
    pub department: Option<String>,
    pub graduation_year: Option<String>,
}

// -- Posts --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreatePostRequest {
    pub content: String,
    pub media_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdatePostRequest {
    pub content: Option<String>,
    pub media_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeletePostResponse {
    pub id: Uuid,
    pub comments_removed: usize,
    pub reactions_removed: usize,
}

// -- Comments --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateCommentRequest {
    pub content: String,
    pub parent_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateCommentRequest {
    pub content: String,
}

// -- Reactions --

/// `reaction_type` is kept as a string so an unknown value surfaces as a
/// validation error instead of a body rejection.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReactRequest {
    pub reaction_type: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PostReactionsResponse {
    pub total: i64,
    pub counts: Vec<crate::models::ReactionCount>,
    pub my_reaction: Option<crate::models::Reaction>,
    pub reactions: Vec<crate::models::Reaction>,
}

// -- Friendships --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendFriendRequest {
    pub receiver_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RespondFriendRequest {
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SendFriendResponse {
    /// True when a crossing request from the receiver was accepted instead.
    pub accepted: bool,
    pub request: crate::models::FriendRequest,
}

// -- Notifications --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateNotificationRequest {
    #[serde(default = "default_true")]
    pub is_read: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CountResponse {
    pub count: usize,
}
