use std::collections::HashMap;

use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::info;

use crate::models::{CommentRow, CommentThreadRow, CommentWithAuthor};
use crate::posts::query_post;
use crate::users::{USER_COLUMNS, map_user, user_exists};
use crate::{Database, Error, Result, new_id, timestamp};

const COMMENT_COLUMNS: &str =
    "c.id, c.post_id, c.author_id, c.parent_id, c.content, c.created_at, c.updated_at";

const COMMENT_COLUMN_COUNT: usize = 7;

fn map_comment(row: &Row<'_>) -> rusqlite::Result<CommentRow> {
    Ok(CommentRow {
        id: row.get(0)?,
        post_id: row.get(1)?,
        author_id: row.get(2)?,
        parent_id: row.get(3)?,
        content: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

/// Maps `COMMENT_COLUMNS` followed by a LEFT JOINed `USER_COLUMNS` block.
fn map_comment_with_author(row: &Row<'_>) -> rusqlite::Result<CommentWithAuthor> {
    let comment = map_comment(row)?;
    let author = match row.get::<_, Option<String>>(COMMENT_COLUMN_COUNT)? {
        Some(_) => Some(map_user(row, COMMENT_COLUMN_COUNT)?),
        None => None,
    };
    Ok(CommentWithAuthor { comment, author })
}

impl Database {
    // -- Comments --

    /// Creates a comment or a reply. A reply's parent must be a top-level
    /// comment on the same post.
    pub fn create_comment(
        &self,
        post_id: &str,
        author_id: &str,
        content: &str,
        parent_id: Option<&str>,
    ) -> Result<CommentRow> {
        let comment = self.with_conn_mut(|conn| {
            if query_post(conn, post_id)?.is_none() {
                return Err(Error::NotFound("post"));
            }
            if !user_exists(conn, author_id)? {
                return Err(Error::NotFound("user"));
            }

            if let Some(parent_id) = parent_id {
                let parent = query_comment(conn, parent_id)?.ok_or(Error::NotFound("parent comment"))?;
                if parent.post_id != post_id {
                    return Err(Error::Validation(
                        "comment does not belong to the specified post".into(),
                    ));
                }
                if parent.parent_id.is_some() {
                    return Err(Error::Validation("replies cannot be nested".into()));
                }
            }

            let id = new_id();
            let now = timestamp();
            conn.execute(
                "INSERT INTO comments (id, post_id, author_id, parent_id, content, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                params![id, post_id, author_id, parent_id, content, now],
            )?;

            query_comment(conn, &id)?.ok_or(Error::NotFound("comment"))
        })?;

        self.notify_post_comment(post_id, &comment.id, author_id);
        Ok(comment)
    }

    pub fn get_comment(&self, id: &str) -> Result<Option<CommentRow>> {
        self.with_conn(|conn| query_comment(conn, id))
    }

    /// Top-level comments for a post (newest first) with their replies
    /// (oldest first) and authors.
    pub fn list_comment_threads(
        &self,
        post_id: &str,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<CommentThreadRow>> {
        self.with_conn(|conn| {
            if query_post(conn, post_id)?.is_none() {
                return Err(Error::NotFound("post"));
            }

            let sql = format!(
                "SELECT {COMMENT_COLUMNS}, {USER_COLUMNS}
                 FROM comments c
                 LEFT JOIN users u ON u.id = c.author_id
                 WHERE c.post_id = ?1 AND c.parent_id IS NULL
                 ORDER BY c.created_at DESC, c.rowid DESC
                 LIMIT ?2 OFFSET ?3"
            );
            let mut stmt = conn.prepare(&sql)?;
            let top_level = stmt
                .query_map(params![post_id, limit, offset], map_comment_with_author)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let parent_ids: Vec<String> = top_level.iter().map(|c| c.comment.id.clone()).collect();
            let mut replies = query_replies(conn, &parent_ids)?;

            Ok(top_level
                .into_iter()
                .map(|comment| {
                    let replies = replies.remove(&comment.comment.id).unwrap_or_default();
                    CommentThreadRow { comment, replies }
                })
                .collect())
        })
    }

    /// The most recent comment on a post at any depth.
    pub fn latest_comment(&self, post_id: &str) -> Result<Option<CommentWithAuthor>> {
        self.with_conn(|conn| {
            if query_post(conn, post_id)?.is_none() {
                return Err(Error::NotFound("post"));
            }

            let sql = format!(
                "SELECT {COMMENT_COLUMNS}, {USER_COLUMNS}
                 FROM comments c
                 LEFT JOIN users u ON u.id = c.author_id
                 WHERE c.post_id = ?1
                 ORDER BY c.created_at DESC, c.rowid DESC
                 LIMIT 1"
            );
            Ok(conn
                .query_row(&sql, [post_id], map_comment_with_author)
                .optional()?)
        })
    }

    /// Replies to one comment, oldest first.
    pub fn list_replies(&self, comment_id: &str, offset: u32, limit: u32) -> Result<Vec<CommentWithAuthor>> {
        self.with_conn(|conn| {
            if query_comment(conn, comment_id)?.is_none() {
                return Err(Error::NotFound("comment"));
            }

            let sql = format!(
                "SELECT {COMMENT_COLUMNS}, {USER_COLUMNS}
                 FROM comments c
                 LEFT JOIN users u ON u.id = c.author_id
                 WHERE c.parent_id = ?1
                 ORDER BY c.created_at ASC, c.rowid ASC
                 LIMIT ?2 OFFSET ?3"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![comment_id, limit, offset], map_comment_with_author)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn update_comment(&self, id: &str, actor_id: &str, content: &str) -> Result<CommentRow> {
        self.with_conn_mut(|conn| {
            let comment = query_comment(conn, id)?.ok_or(Error::NotFound("comment"))?;
            if comment.author_id != actor_id {
                return Err(Error::Forbidden("not the author of this comment".into()));
            }

            conn.execute(
                "UPDATE comments SET content = ?2, updated_at = ?3 WHERE id = ?1",
                params![id, content, timestamp()],
            )?;

            query_comment(conn, id)?.ok_or(Error::NotFound("comment"))
        })
    }

    /// Author-only delete; replies go with their parent. Returns the number
    /// of comment rows removed.
    pub fn delete_comment(&self, id: &str, actor_id: &str) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let comment = query_comment(conn, id)?.ok_or(Error::NotFound("comment"))?;
            if comment.author_id != actor_id {
                return Err(Error::Forbidden("not the author of this comment".into()));
            }

            let tx = conn.unchecked_transaction()?;
            let replies = tx.execute("DELETE FROM comments WHERE parent_id = ?1", [id])?;
            let removed = tx.execute("DELETE FROM comments WHERE id = ?1", [id])?;
            tx.commit()?;

            info!("Comment {} deleted by {} ({} replies)", id, actor_id, replies);
            Ok(replies + removed)
        })
    }
}

pub(crate) fn query_comment(conn: &Connection, id: &str) -> Result<Option<CommentRow>> {
    let sql = format!("SELECT {COMMENT_COLUMNS} FROM comments c WHERE c.id = ?1");
    Ok(conn.query_row(&sql, [id], map_comment).optional()?)
}

/// Batch-fetch replies for a set of parent comment IDs, grouped by parent.
fn query_replies(
    conn: &Connection,
    parent_ids: &[String],
) -> Result<HashMap<String, Vec<CommentWithAuthor>>> {
    let mut grouped: HashMap<String, Vec<CommentWithAuthor>> = HashMap::new();
    if parent_ids.is_empty() {
        return Ok(grouped);
    }

    let placeholders: Vec<String> = (1..=parent_ids.len()).map(|i| format!("?{}", i)).collect();
    let sql = format!(
        "SELECT {COMMENT_COLUMNS}, {USER_COLUMNS}
         FROM comments c
         LEFT JOIN users u ON u.id = c.author_id
         WHERE c.parent_id IN ({})
         ORDER BY c.created_at ASC, c.rowid ASC",
        placeholders.join(", ")
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(parent_ids.iter()), map_comment_with_author)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    for reply in rows {
        if let Some(parent) = reply.comment.parent_id.clone() {
            grouped.entry(parent).or_default().push(reply);
        }
    }
    Ok(grouped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::tests::add_user;

    #[test]
    fn test_comment_threads() {
        let db = Database::open_in_memory().unwrap();
        let alice = add_user(&db, "alice");
        let bob = add_user(&db, "bob");
        let post = db.create_post(&alice, "hello", None).unwrap();

        let first = db.create_comment(&post.id, &bob, "first", None).unwrap();
        let second = db.create_comment(&post.id, &alice, "second", None).unwrap();
        db.create_comment(&post.id, &alice, "reply a", Some(&first.id)).unwrap();
        db.create_comment(&post.id, &bob, "reply b", Some(&first.id)).unwrap();

        let threads = db.list_comment_threads(&post.id, 0, 10).unwrap();
        assert_eq!(threads.len(), 2);
        assert_eq!(threads[0].comment.comment.id, second.id);
        assert!(threads[0].replies.is_empty());

        let first_thread = &threads[1];
        assert_eq!(first_thread.comment.author.as_ref().unwrap().username, "bob");
        let reply_texts: Vec<&str> = first_thread
            .replies
            .iter()
            .map(|r| r.comment.content.as_str())
            .collect();
        assert_eq!(reply_texts, ["reply a", "reply b"]);
    }

    #[test]
    fn test_reply_rules() {
        let db = Database::open_in_memory().unwrap();
        let alice = add_user(&db, "alice");
        let post = db.create_post(&alice, "one", None).unwrap();
        let other = db.create_post(&alice, "two", None).unwrap();

        let top = db.create_comment(&post.id, &alice, "top", None).unwrap();
        let reply = db.create_comment(&post.id, &alice, "reply", Some(&top.id)).unwrap();
        assert_eq!(reply.parent_id.as_deref(), Some(top.id.as_str()));

        let err = db
            .create_comment(&post.id, &alice, "nested", Some(&reply.id))
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let err = db
            .create_comment(&other.id, &alice, "cross-post", Some(&top.id))
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let err = db
            .create_comment(&post.id, &alice, "orphan", Some("missing"))
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        let err = db.create_comment("missing", &alice, "nowhere", None).unwrap_err();
        assert!(matches!(err, Error::NotFound("post")));
    }

    #[test]
    fn test_latest_comment_and_replies() {
        let db = Database::open_in_memory().unwrap();
        let alice = add_user(&db, "alice");
        let bob = add_user(&db, "bob");
        let post = db.create_post(&alice, "hello", None).unwrap();
        assert!(db.latest_comment(&post.id).unwrap().is_none());

        let top = db.create_comment(&post.id, &bob, "top", None).unwrap();
        db.create_comment(&post.id, &alice, "first reply", Some(&top.id)).unwrap();
        let last = db.create_comment(&post.id, &bob, "second reply", Some(&top.id)).unwrap();

        let latest = db.latest_comment(&post.id).unwrap().unwrap();
        assert_eq!(latest.comment.id, last.id);
        assert_eq!(latest.author.unwrap().username, "bob");

        let replies = db.list_replies(&top.id, 0, 10).unwrap();
        let texts: Vec<&str> = replies.iter().map(|r| r.comment.content.as_str()).collect();
        assert_eq!(texts, ["first reply", "second reply"]);
        assert_eq!(db.list_replies(&top.id, 1, 10).unwrap().len(), 1);
        assert!(db.list_replies(&last.id, 0, 10).unwrap().is_empty());

        assert!(matches!(db.latest_comment("missing"), Err(Error::NotFound("post"))));
        assert!(matches!(db.list_replies("missing", 0, 10), Err(Error::NotFound("comment"))));
    }

    #[test]
    fn test_update_and_delete_comment() {
        let db = Database::open_in_memory().unwrap();
        let alice = add_user(&db, "alice");
        let bob = add_user(&db, "bob");
        let post = db.create_post(&alice, "hello", None).unwrap();

        let top = db.create_comment(&post.id, &bob, "typo", None).unwrap();
        db.create_comment(&post.id, &alice, "reply", Some(&top.id)).unwrap();

        let err = db.update_comment(&top.id, &alice, "edited").unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));
        let edited = db.update_comment(&top.id, &bob, "fixed").unwrap();
        assert_eq!(edited.content, "fixed");

        let err = db.delete_comment(&top.id, &alice).unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));
        assert_eq!(db.delete_comment(&top.id, &bob).unwrap(), 2);
        assert!(db.list_comment_threads(&post.id, 0, 10).unwrap().is_empty());
    }
}
