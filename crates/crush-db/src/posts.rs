use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::info;

use crate::models::{DeletedPost, PostCountsRow, PostRow};
use crate::users::user_exists;
use crate::{Database, Error, Result, new_id, timestamp};

pub(crate) const POST_COLUMNS: &str =
    "p.id, p.author_id, p.content, p.media_url, p.created_at, p.updated_at";

pub(crate) const POST_COLUMN_COUNT: usize = 6;

pub(crate) fn map_post(row: &Row<'_>, start: usize) -> rusqlite::Result<PostRow> {
    Ok(PostRow {
        id: row.get(start)?,
        author_id: row.get(start + 1)?,
        content: row.get(start + 2)?,
        media_url: row.get(start + 3)?,
        created_at: row.get(start + 4)?,
        updated_at: row.get(start + 5)?,
    })
}

impl Database {
    // -- Posts --

    pub fn create_post(
        &self,
        author_id: &str,
        content: &str,
        media_url: Option<&str>,
    ) -> Result<PostRow> {
        self.with_conn_mut(|conn| {
            if !user_exists(conn, author_id)? {
                return Err(Error::NotFound("user"));
            }

            let id = new_id();
            let now = timestamp();
            conn.execute(
                "INSERT INTO posts (id, author_id, content, media_url, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                params![id, author_id, content, media_url, now],
            )?;

            query_post(conn, &id)?.ok_or(Error::NotFound("post"))
        })
    }

    pub fn get_post(&self, id: &str) -> Result<Option<PostRow>> {
        self.with_conn(|conn| query_post(conn, id))
    }

    /// All posts, newest first, with comment and reaction counts.
    pub fn list_posts_with_counts(&self, offset: u32, limit: u32) -> Result<Vec<PostCountsRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {POST_COLUMNS},
                        (SELECT COUNT(*) FROM comments c WHERE c.post_id = p.id),
                        (SELECT COUNT(*) FROM reactions r WHERE r.post_id = p.id)
                 FROM posts p
                 ORDER BY p.created_at DESC, p.rowid DESC
                 LIMIT ?1 OFFSET ?2"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![limit, offset], |row| {
                    Ok(PostCountsRow {
                        post: map_post(row, 0)?,
                        comment_count: row.get(POST_COLUMN_COUNT)?,
                        reaction_count: row.get(POST_COLUMN_COUNT + 1)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn posts_by_user(&self, author_id: &str, offset: u32, limit: u32) -> Result<Vec<PostRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {POST_COLUMNS} FROM posts p
                 WHERE p.author_id = ?1
                 ORDER BY p.created_at DESC, p.rowid DESC
                 LIMIT ?2 OFFSET ?3"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![author_id, limit, offset], |row| map_post(row, 0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Author-only partial update.
    pub fn update_post(
        &self,
        id: &str,
        actor_id: &str,
        content: Option<&str>,
        media_url: Option<&str>,
    ) -> Result<PostRow> {
        self.with_conn_mut(|conn| {
            let post = query_post(conn, id)?.ok_or(Error::NotFound("post"))?;
            if post.author_id != actor_id {
                return Err(Error::Forbidden("not the author of this post".into()));
            }

            conn.execute(
                "UPDATE posts SET content = COALESCE(?2, content), media_url = COALESCE(?3, media_url),
                        updated_at = ?4
                 WHERE id = ?1",
                params![id, content, media_url, timestamp()],
            )?;

            query_post(conn, id)?.ok_or(Error::NotFound("post"))
        })
    }

    /// Author-only delete. Reactions and comments go first, then the post,
    /// all in one transaction.
    pub fn delete_post(&self, id: &str, actor_id: &str) -> Result<DeletedPost> {
        self.with_conn_mut(|conn| {
            let post = query_post(conn, id)?.ok_or(Error::NotFound("post"))?;
            if post.author_id != actor_id {
                return Err(Error::Forbidden("not the author of this post".into()));
            }

            let tx = conn.unchecked_transaction()?;
            let reactions_removed = tx.execute("DELETE FROM reactions WHERE post_id = ?1", [id])?;
            // Replies reference their parent, so they are removed before top-level comments.
            let replies_removed = tx.execute(
                "DELETE FROM comments WHERE post_id = ?1 AND parent_id IS NOT NULL",
                [id],
            )?;
            let top_level_removed = tx.execute("DELETE FROM comments WHERE post_id = ?1", [id])?;
            tx.execute("DELETE FROM posts WHERE id = ?1", [id])?;
            tx.commit()?;

            let deleted = DeletedPost {
                comments_removed: replies_removed + top_level_removed,
                reactions_removed,
            };
            info!(
                "Post {} deleted by {} ({} comments, {} reactions)",
                id, actor_id, deleted.comments_removed, deleted.reactions_removed
            );
            Ok(deleted)
        })
    }
}

pub(crate) fn query_post(conn: &Connection, id: &str) -> Result<Option<PostRow>> {
    let sql = format!("SELECT {POST_COLUMNS} FROM posts p WHERE p.id = ?1");
    Ok(conn.query_row(&sql, [id], |row| map_post(row, 0)).optional()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::tests::add_user;
    use crush_types::models::ReactionType;

    #[test]
    fn test_post_crud() {
        let db = Database::open_in_memory().unwrap();
        let alice = add_user(&db, "alice");
        let bob = add_user(&db, "bob");

        let post = db.create_post(&alice, "first!", None).unwrap();
        assert_eq!(post.author_id, alice);
        assert_eq!(post.content, "first!");

        let err = db.update_post(&post.id, &bob, Some("hijack"), None).unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));

        let updated = db
            .update_post(&post.id, &alice, None, Some("https://cdn/img.png"))
            .unwrap();
        assert_eq!(updated.content, "first!");
        assert_eq!(updated.media_url.as_deref(), Some("https://cdn/img.png"));

        assert_eq!(db.posts_by_user(&alice, 0, 20).unwrap().len(), 1);
        assert!(db.posts_by_user(&bob, 0, 20).unwrap().is_empty());
    }

    #[test]
    fn test_create_post_for_missing_user() {
        let db = Database::open_in_memory().unwrap();
        let err = db.create_post("ghost", "boo", None).unwrap_err();
        assert!(matches!(err, Error::NotFound("user")));
    }

    #[test]
    fn test_delete_post_removes_dependents() {
        let db = Database::open_in_memory().unwrap();
        let author = add_user(&db, "author");
        let post = db.create_post(&author, "to be deleted", None).unwrap();

        let mut reactors = Vec::new();
        for i in 0..5 {
            let user = add_user(&db, &format!("reactor{i}"));
            db.upsert_reaction(&user, &post.id, ReactionType::Like).unwrap();
            reactors.push(user);
        }
        let top = db.create_comment(&post.id, &reactors[0], "one", None).unwrap();
        db.create_comment(&post.id, &reactors[1], "two", None).unwrap();
        db.create_comment(&post.id, &reactors[2], "reply", Some(&top.id)).unwrap();

        let err = db.delete_post(&post.id, &reactors[0]).unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));

        let deleted = db.delete_post(&post.id, &author).unwrap();
        assert_eq!(deleted.comments_removed, 3);
        assert_eq!(deleted.reactions_removed, 5);

        assert!(db.get_post(&post.id).unwrap().is_none());
        let remaining: i64 = db
            .with_conn(|conn| {
                Ok(conn.query_row(
                    "SELECT (SELECT COUNT(*) FROM comments WHERE post_id = ?1)
                          + (SELECT COUNT(*) FROM reactions WHERE post_id = ?1)",
                    [&post.id],
                    |r| r.get(0),
                )?)
            })
            .unwrap();
        assert_eq!(remaining, 0);

        let err = db.delete_post(&post.id, &author).unwrap_err();
        assert!(matches!(err, Error::NotFound("post")));
    }

    #[test]
    fn test_list_posts_with_counts() {
        let db = Database::open_in_memory().unwrap();
        let alice = add_user(&db, "alice");
        let bob = add_user(&db, "bob");

        let older = db.create_post(&alice, "older", None).unwrap();
        let newer = db.create_post(&bob, "newer", None).unwrap();
        db.create_comment(&older.id, &bob, "nice", None).unwrap();
        db.create_comment(&older.id, &alice, "thanks", None).unwrap();
        db.upsert_reaction(&bob, &older.id, ReactionType::Love).unwrap();

        let posts = db.list_posts_with_counts(0, 10).unwrap();
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].post.id, newer.id);
        assert_eq!(posts[1].comment_count, 2);
        assert_eq!(posts[1].reaction_count, 1);
    }
}
