//! Row -> API model conversion.
//!
//! Stored ids and timestamps are trusted but not assumed: a value that fails
//! to parse is logged and replaced with a default instead of failing the
//! whole response.

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use crush_db::models::{
    CommentRow, CommentThreadRow, CommentWithAuthor, FeedPageRows, FeedRow, FriendRequestRow,
    NotificationRow, PostCountsRow, PostRow, ReactionRow, Relation, UserRow,
};
use crush_types::models::{
    Comment, CommentThread, FeedItem, FeedPage, FriendRequest, FriendshipStatus, Notification,
    NotificationKind, Post, PostWithCounts, Reaction, ReactionType, RequestStatus, User,
};

fn id(raw: &str, field: &str, owner: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} '{}' on '{}': {}", field, raw, owner, e);
        Uuid::default()
    })
}

fn opt_id(raw: Option<&str>, field: &str, owner: &str) -> Option<Uuid> {
    raw.map(|r| id(r, field, owner))
}

fn time(raw: &str, field: &str, owner: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            // Rows written by SQLite's CURRENT_TIMESTAMP carry no zone.
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt {} '{}' on '{}': {}", field, raw, owner, e);
            DateTime::default()
        })
}

pub fn user(row: UserRow) -> User {
    User {
        id: id(&row.id, "id", &row.id),
        created_at: time(&row.created_at, "created_at", &row.id),
        updated_at: time(&row.updated_at, "updated_at", &row.id),
        email: row.email,
        username: row.username,
        full_name: row.full_name,
        bio: row.bio,
        profile_picture: row.profile_picture,
        university: row.university,
        department: row.department,
        graduation_year: row.graduation_year,
        is_active: row.is_active,
        is_verified: row.is_verified,
    }
}

pub fn post(row: PostRow) -> Post {
    Post {
        id: id(&row.id, "id", &row.id),
        author_id: id(&row.author_id, "author_id", &row.id),
        created_at: time(&row.created_at, "created_at", &row.id),
        updated_at: time(&row.updated_at, "updated_at", &row.id),
        content: row.content,
        media_url: row.media_url,
    }
}

pub fn post_with_counts(row: PostCountsRow) -> PostWithCounts {
    PostWithCounts {
        post: post(row.post),
        comment_count: row.comment_count,
        reaction_count: row.reaction_count,
    }
}

pub fn comment(row: CommentRow, author: Option<UserRow>) -> Comment {
    Comment {
        id: id(&row.id, "id", &row.id),
        post_id: id(&row.post_id, "post_id", &row.id),
        author_id: id(&row.author_id, "author_id", &row.id),
        parent_id: opt_id(row.parent_id.as_deref(), "parent_id", &row.id),
        is_edited: row.updated_at != row.created_at,
        created_at: time(&row.created_at, "created_at", &row.id),
        updated_at: time(&row.updated_at, "updated_at", &row.id),
        content: row.content,
        author: author.map(user),
    }
}

pub fn comment_with_author(row: CommentWithAuthor) -> Comment {
    comment(row.comment, row.author)
}

pub fn thread(row: CommentThreadRow) -> CommentThread {
    let replies: Vec<Comment> = row.replies.into_iter().map(comment_with_author).collect();
    CommentThread {
        comment: comment_with_author(row.comment),
        replies_count: replies.len(),
        replies,
    }
}

fn reaction_type(raw: &str, owner: &str) -> ReactionType {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt reaction_type on '{}': {}", owner, e);
        ReactionType::Like
    })
}

pub fn reaction(row: ReactionRow) -> Reaction {
    Reaction {
        id: id(&row.id, "id", &row.id),
        user_id: id(&row.user_id, "user_id", &row.id),
        post_id: id(&row.post_id, "post_id", &row.id),
        reaction_type: reaction_type(&row.reaction_type, &row.id),
        created_at: time(&row.created_at, "created_at", &row.id),
    }
}

pub fn friend_request(row: FriendRequestRow) -> FriendRequest {
    FriendRequest {
        id: id(&row.id, "id", &row.id),
        sender_id: id(&row.sender_id, "sender_id", &row.id),
        receiver_id: id(&row.receiver_id, "receiver_id", &row.id),
        status: row.status.parse().unwrap_or_else(|e| {
            warn!("Corrupt status on request '{}': {}", row.id, e);
            RequestStatus::Pending
        }),
        created_at: time(&row.created_at, "created_at", &row.id),
        updated_at: time(&row.updated_at, "updated_at", &row.id),
    }
}

pub fn relation(relation: Relation) -> FriendshipStatus {
    match relation {
        Relation::Myself => FriendshipStatus::Myself,
        Relation::Friends => FriendshipStatus::Friends,
        Relation::RequestSent(request_id) => FriendshipStatus::RequestSent {
            request_id: id(&request_id, "id", &request_id),
        },
        Relation::RequestReceived(request_id) => FriendshipStatus::RequestReceived {
            request_id: id(&request_id, "id", &request_id),
        },
        Relation::None => FriendshipStatus::None,
    }
}

fn feed_item(row: FeedRow) -> FeedItem {
    let viewer_reaction = row
        .viewer_reaction
        .as_deref()
        .map(|raw| reaction_type(raw, &row.post.id));
    FeedItem {
        post: post(row.post),
        author: user(row.author),
        comment_count: row.comment_count,
        reaction_count: row.reaction_count,
        has_reacted: viewer_reaction.is_some(),
        reaction_type: viewer_reaction,
    }
}

pub fn feed_page(rows: FeedPageRows) -> FeedPage {
    FeedPage {
        items: rows.items.into_iter().map(feed_item).collect(),
        total: rows.total,
        has_more: rows.has_more,
    }
}

/// Notifications with an unknown kind are dropped from listings.
pub fn notification(row: NotificationRow) -> Option<Notification> {
    let kind = match row.kind.parse::<NotificationKind>() {
        Ok(kind) => kind,
        Err(e) => {
            warn!("Skipping notification '{}': {}", row.id, e);
            return None;
        }
    };

    Some(Notification {
        id: id(&row.id, "id", &row.id),
        user_id: id(&row.user_id, "user_id", &row.id),
        actor_id: opt_id(row.actor_id.as_deref(), "actor_id", &row.id),
        related_id: opt_id(row.related_id.as_deref(), "related_id", &row.id),
        post_id: opt_id(row.post_id.as_deref(), "post_id", &row.id),
        comment_id: opt_id(row.comment_id.as_deref(), "comment_id", &row.id),
        created_at: time(&row.created_at, "created_at", &row.id),
        kind,
        content: row.content,
        is_read: row.is_read,
        actor: row.actor.map(user),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_both_timestamp_layouts() {
        let rfc = time("2024-03-01T12:00:00.000001Z", "created_at", "x");
        assert_eq!(rfc.timestamp(), 1709294400);
        let naive = time("2024-03-01 12:00:00", "created_at", "x");
        assert_eq!(naive.timestamp(), 1709294400);
        assert_eq!(time("garbage", "created_at", "x"), DateTime::<Utc>::default());
    }

    #[test]
    fn corrupt_ids_fall_back_to_nil() {
        assert_eq!(id("not-a-uuid", "id", "x"), Uuid::nil());
        assert_eq!(opt_id(None, "id", "x"), None);
    }

    #[test]
    fn unknown_notification_kind_is_skipped() {
        let row = NotificationRow {
            id: Uuid::new_v4().to_string(),
            user_id: Uuid::new_v4().to_string(),
            actor_id: None,
            kind: "poke".into(),
            content: "poked you".into(),
            related_id: None,
            is_read: false,
            created_at: "2024-03-01T12:00:00Z".into(),
            actor: None,
            post_id: None,
            comment_id: None,
        };
        assert!(notification(row).is_none());
    }
}
