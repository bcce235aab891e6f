//! Row types as read from SQLite. The API shapes live in crush-types.

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: String,
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
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct PostRow {
    pub id: String,
    pub author_id: String,
    pub content: String,
    pub media_url: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct PostCountsRow {
    pub post: PostRow,
    pub comment_count: i64,
    pub reaction_count: i64,
}

#[derive(Debug, Clone)]
pub struct CommentRow {
    pub id: String,
    pub post_id: String,
    pub author_id: String,
    pub parent_id: Option<String>,
    pub content: String,
    pub created_at: String,
    pub updated_at: String,
}

/// A comment joined with its author; the author is `None` if the user row
/// has gone missing.
#[derive(Debug, Clone)]
pub struct CommentWithAuthor {
    pub comment: CommentRow,
    pub author: Option<UserRow>,
}

#[derive(Debug, Clone)]
pub struct CommentThreadRow {
    pub comment: CommentWithAuthor,
    pub replies: Vec<CommentWithAuthor>,
}

#[derive(Debug, Clone)]
pub struct ReactionRow {
    pub id: String,
    pub post_id: String,
    pub user_id: String,
    pub reaction_type: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FriendshipRow {
    pub user_id: String,
    pub friend_id: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct FriendRequestRow {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

/// How one user relates to another on the social graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Relation {
    Myself,
    Friends,
    /// Pending request from the viewer; carries the request id.
    RequestSent(String),
    /// Pending request to the viewer; carries the request id.
    RequestReceived(String),
    None,
}

#[derive(Debug, Clone)]
pub struct NotificationRow {
    pub id: String,
    pub user_id: String,
    pub actor_id: Option<String>,
    pub kind: String,
    pub content: String,
    pub related_id: Option<String>,
    pub is_read: bool,
    pub created_at: String,
    pub actor: Option<UserRow>,
    /// Post the notification points at: the related post for reactions, the
    /// commented post for comments.
    pub post_id: Option<String>,
    pub comment_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FeedRow {
    pub post: PostRow,
    pub author: UserRow,
    pub comment_count: i64,
    pub reaction_count: i64,
    /// The viewer's own reaction type on this post, if any.
    pub viewer_reaction: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FeedPageRows {
    pub items: Vec<FeedRow>,
    pub total: i64,
    pub has_more: bool,
}

// -- Inputs --

#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub id: String,
    pub username: String,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub university: Option<String>,
    pub is_verified: bool,
}

/// Partial profile update; `None` leaves a column unchanged.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub email: Option<String>,
    pub username: Option<String>,
    pub full_name: Option<String>,
    pub bio: Option<String>,
    pub profile_picture: Option<String>,
    pub university: Option<String>,
    pub department: Option<String>,
    pub graduation_year: Option<String>,
}

// -- Outcomes --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeletedPost {
    pub comments_removed: usize,
    pub reactions_removed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RepairReport {
    pub scanned: usize,
    pub repaired: usize,
    pub failed: usize,
}
