use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Returned when a stored or submitted string does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} must be one of: {allowed}; got '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub allowed: &'static str,
    pub value: String,
}

// -- Users --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: Option<String>,
    pub username: String,
    pub full_name: Option<String>,
    pub bio: Option<String>,
    pub profile_picture: Option<String>,
    pub university: Option<String>,
    pub department: Option<String>,
    pub graduation_year: Option<String>,
    pub is_active: bool,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// -- Posts --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: Uuid,
    pub author_id: Uuid,
    pub content: String,
    pub media_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostWithCounts {
    #[serde(flatten)]
    pub post: Post,
    pub comment_count: i64,
    pub reaction_count: i64,
}

// -- Comments --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: Uuid,
    pub post_id: Uuid,
    pub author_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub content: String,
    pub author: Option<User>,
    pub is_edited: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A top-level comment together with its (single level of) replies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentThread {
    #[serde(flatten)]
    pub comment: Comment,
    pub replies_count: usize,
    pub replies: Vec<Comment>,
}

// -- Reactions --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReactionType {
    Like,
    Love,
    Haha,
    Wow,
    Sad,
    Angry,
}

impl ReactionType {
    pub const ALL: [ReactionType; 6] = [
        Self::Like,
        Self::Love,
        Self::Haha,
        Self::Wow,
        Self::Sad,
        Self::Angry,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Like => "like",
            Self::Love => "love",
            Self::Haha => "haha",
            Self::Wow => "wow",
            Self::Sad => "sad",
            Self::Angry => "angry",
        }
    }
}

impl FromStr for ReactionType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownVariant {
                kind: "reaction_type",
                allowed: "like, love, haha, wow, sad, angry",
                value: s.to_string(),
            })
    }
}

impl fmt::Display for ReactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub post_id: Uuid,
    pub reaction_type: ReactionType,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactionCount {
    pub reaction_type: ReactionType,
    pub count: i64,
}

// -- Friendships --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }
}

impl FromStr for RequestStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "accepted" => Ok(Self::Accepted),
            "rejected" => Ok(Self::Rejected),
            _ => Err(UnknownVariant {
                kind: "status",
                allowed: "pending, accepted, rejected",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which side of a friend request the listing user is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestDirection {
    #[default]
    Received,
    Sent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FriendRequest {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// How the viewer relates to another user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FriendshipStatus {
    #[serde(rename = "self")]
    Myself,
    Friends,
    RequestSent { request_id: Uuid },
    RequestReceived { request_id: Uuid },
    None,
}

// -- Feed --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedItem {
    pub post: Post,
    pub author: User,
    pub comment_count: i64,
    pub reaction_count: i64,
    pub has_reacted: bool,
    pub reaction_type: Option<ReactionType>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedPage {
    pub items: Vec<FeedItem>,
    pub total: i64,
    pub has_more: bool,
}

// -- Notifications --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    FriendRequest,
    FriendAccepted,
    PostReaction,
    PostComment,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FriendRequest => "friend_request",
            Self::FriendAccepted => "friend_accepted",
            Self::PostReaction => "post_reaction",
            Self::PostComment => "post_comment",
        }
    }
}

impl FromStr for NotificationKind {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "friend_request" => Ok(Self::FriendRequest),
            "friend_accepted" => Ok(Self::FriendAccepted),
            "post_reaction" => Ok(Self::PostReaction),
            "post_comment" => Ok(Self::PostComment),
            _ => Err(UnknownVariant {
                kind: "notification kind",
                allowed: "friend_request, friend_accepted, post_reaction, post_comment",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub actor_id: Option<Uuid>,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub content: String,
    pub related_id: Option<Uuid>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    pub actor: Option<User>,
    /// Derived from `related_id`: the reacted post, or the commented post.
    pub post_id: Option<Uuid>,
    pub comment_id: Option<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reaction_type_parses_known_values() {
        for t in ReactionType::ALL {
            assert_eq!(t.as_str().parse::<ReactionType>().unwrap(), t);
        }
        let err = "meh".parse::<ReactionType>().unwrap_err();
        assert!(err.to_string().contains("reaction_type"));
    }

    #[test]
    fn friendship_status_is_tagged() {
        let json = serde_json::to_value(FriendshipStatus::Myself).unwrap();
        assert_eq!(json["status"], "self");

        let id = Uuid::new_v4();
        let json = serde_json::to_value(FriendshipStatus::RequestSent { request_id: id }).unwrap();
        assert_eq!(json["status"], "request_sent");
        assert_eq!(json["request_id"], id.to_string());
    }

    #[test]
    fn notification_kind_serializes_as_type() {
        let json = serde_json::to_value(NotificationKind::PostComment).unwrap();
        assert_eq!(json, "post_comment");
        assert_eq!("post_comment".parse::<NotificationKind>().unwrap(), NotificationKind::PostComment);
    }
}
