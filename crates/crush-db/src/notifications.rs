use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::{debug, error, info, warn};

use crush_types::models::NotificationKind;

use crate::models::NotificationRow;
use crate::posts::query_post;
use crate::users::{USER_COLUMNS, map_user, query_user_by_id};
use crate::{Database, Error, Result, new_id, timestamp};

const NOTIFICATION_SELECT: &str = "SELECT n.id, n.user_id, n.actor_id, n.kind, n.content, n.related_id, \
     n.is_read, n.created_at, c.post_id";

const NOTIFICATION_COLUMN_COUNT: usize = 9;

fn notification_query(filter: &str) -> String {
    format!(
        "{NOTIFICATION_SELECT}, {USER_COLUMNS}
         FROM notifications n
         LEFT JOIN users u ON u.id = n.actor_id
         LEFT JOIN comments c ON n.kind = 'post_comment' AND c.id = n.related_id
         {filter}"
    )
}

fn map_notification(row: &Row<'_>) -> rusqlite::Result<NotificationRow> {
    let kind: String = row.get(3)?;
    let related_id: Option<String> = row.get(5)?;
    let comment_post_id: Option<String> = row.get(8)?;

    let (post_id, comment_id) = match kind.as_str() {
        "post_reaction" => (related_id.clone(), None),
        "post_comment" => (comment_post_id, related_id.clone()),
        _ => (None, None),
    };

    let actor = match row.get::<_, Option<String>>(NOTIFICATION_COLUMN_COUNT)? {
        Some(_) => Some(map_user(row, NOTIFICATION_COLUMN_COUNT)?),
        None => None,
    };

    Ok(NotificationRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        actor_id: row.get(2)?,
        kind,
        content: row.get(4)?,
        related_id,
        is_read: row.get(6)?,
        created_at: row.get(7)?,
        actor,
        post_id,
        comment_id,
    })
}

/// Writes a notification for `recipient_id` unless the actor is the
/// recipient.
fn record(
    conn: &Connection,
    recipient_id: &str,
    actor_id: &str,
    kind: NotificationKind,
    content: &str,
    related_id: Option<&str>,
) -> Result<()> {
    if recipient_id == actor_id {
        debug!("Skipping {} notification to self ({})", kind.as_str(), actor_id);
        return Ok(());
    }

    conn.execute(
        "INSERT INTO notifications (id, user_id, actor_id, kind, content, related_id, is_read, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7)",
        params![new_id(), recipient_id, actor_id, kind.as_str(), content, related_id, timestamp()],
    )?;

    info!(
        "Created {} notification for user {} from user {}",
        kind.as_str(),
        recipient_id,
        actor_id
    );
    Ok(())
}

/// Swallows and logs emitter failures; the triggering operation has
/// already committed.
fn best_effort(what: &str, result: Result<()>) {
    if let Err(e) = result {
        error!("Error creating {} notification: {}", what, e);
    }
}

impl Database {
    // -- Notification emitter --

    pub(crate) fn notify_post_reaction(&self, post_id: &str, actor_id: &str) {
        let result = self.with_conn_mut(|conn| {
            let Some(post) = query_post(conn, post_id)? else {
                warn!("Post {} not found when creating reaction notification", post_id);
                return Ok(());
            };
            let Some(actor) = query_user_by_id(conn, actor_id)? else {
                warn!("User {} not found when creating reaction notification", actor_id);
                return Ok(());
            };
            record(
                conn,
                &post.author_id,
                actor_id,
                NotificationKind::PostReaction,
                &format!("{} reacted to your post", actor.username),
                Some(post_id),
            )
        });
        best_effort("post reaction", result);
    }

    pub(crate) fn notify_post_comment(&self, post_id: &str, comment_id: &str, actor_id: &str) {
        let result = self.with_conn_mut(|conn| {
            let Some(post) = query_post(conn, post_id)? else {
                warn!("Post {} not found when creating comment notification", post_id);
                return Ok(());
            };
            let Some(actor) = query_user_by_id(conn, actor_id)? else {
                warn!("User {} not found when creating comment notification", actor_id);
                return Ok(());
            };
            record(
                conn,
                &post.author_id,
                actor_id,
                NotificationKind::PostComment,
                &format!("{} commented on your post", actor.username),
                Some(comment_id),
            )
        });
        best_effort("post comment", result);
    }

    pub(crate) fn notify_friend_request(&self, sender_id: &str, receiver_id: &str, request_id: &str) {
        let result = self.with_conn_mut(|conn| {
            let Some(sender) = query_user_by_id(conn, sender_id)? else {
                warn!("User {} not found when creating friend request notification", sender_id);
                return Ok(());
            };
            record(
                conn,
                receiver_id,
                sender_id,
                NotificationKind::FriendRequest,
                &format!("{} sent you a friend request", sender.username),
                Some(request_id),
            )
        });
        best_effort("friend request", result);
    }

    pub(crate) fn notify_friend_accepted(&self, accepter_id: &str, requester_id: &str) {
        let result = self.with_conn_mut(|conn| {
            let Some(accepter) = query_user_by_id(conn, accepter_id)? else {
                warn!("User {} not found when creating friend accepted notification", accepter_id);
                return Ok(());
            };
            record(
                conn,
                requester_id,
                accepter_id,
                NotificationKind::FriendAccepted,
                &format!("{} accepted your friend request", accepter.username),
                None,
            )
        });
        best_effort("friend accepted", result);
    }

    // -- Notifications --

    pub fn list_notifications(
        &self,
        user_id: &str,
        offset: u32,
        limit: u32,
        unread_only: bool,
    ) -> Result<Vec<NotificationRow>> {
        self.with_conn(|conn| {
            let sql = notification_query(
                "WHERE n.user_id = ?1 AND (?2 = 0 OR n.is_read = 0)
                 ORDER BY n.created_at DESC, n.rowid DESC
                 LIMIT ?3 OFFSET ?4",
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![user_id, unread_only, limit, offset], map_notification)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn unread_notification_count(&self, user_id: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM notifications WHERE user_id = ?1 AND is_read = 0",
                [user_id],
                |row| row.get(0),
            )?;
            Ok(count as usize)
        })
    }

    /// Owner-only read/unread toggle.
    pub fn set_notification_read(&self, id: &str, user_id: &str, is_read: bool) -> Result<NotificationRow> {
        self.with_conn_mut(|conn| {
            let notification = query_notification(conn, id)?.ok_or(Error::NotFound("notification"))?;
            if notification.user_id != user_id {
                return Err(Error::Forbidden("not enough permissions".into()));
            }

            conn.execute(
                "UPDATE notifications SET is_read = ?2 WHERE id = ?1",
                params![id, is_read],
            )?;
            query_notification(conn, id)?.ok_or(Error::NotFound("notification"))
        })
    }

    pub fn mark_all_notifications_read(&self, user_id: &str) -> Result<usize> {
        self.with_conn_mut(|conn| {
            Ok(conn.execute(
                "UPDATE notifications SET is_read = 1 WHERE user_id = ?1 AND is_read = 0",
                [user_id],
            )?)
        })
    }

    pub fn delete_notification(&self, id: &str, user_id: &str) -> Result<NotificationRow> {
        self.with_conn_mut(|conn| {
            let notification = query_notification(conn, id)?.ok_or(Error::NotFound("notification"))?;
            if notification.user_id != user_id {
                return Err(Error::Forbidden("not enough permissions".into()));
            }

            conn.execute("DELETE FROM notifications WHERE id = ?1", [id])?;
            Ok(notification)
        })
    }

    pub fn delete_all_notifications(&self, user_id: &str) -> Result<usize> {
        self.with_conn_mut(|conn| {
            Ok(conn.execute("DELETE FROM notifications WHERE user_id = ?1", [user_id])?)
        })
    }
}

fn query_notification(conn: &Connection, id: &str) -> Result<Option<NotificationRow>> {
    let sql = notification_query("WHERE n.id = ?1");
    Ok(conn.query_row(&sql, [id], map_notification).optional()?)
}
