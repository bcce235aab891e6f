//! Home feed assembly.
//!
//! The visible author set is the viewer plus their friends, resolved inside
//! the query so the parameter count does not grow with the friend list.
//! Counts are aggregated with `COUNT(DISTINCT ..)` since the post is joined
//! against both comments and reactions in one pass.

use std::collections::HashMap;

use rusqlite::{Connection, params, params_from_iter};
use tracing::{debug, warn};

use crate::error::is_missing_table;
use crate::models::{FeedPageRows, FeedRow};
use crate::posts::{POST_COLUMNS, POST_COLUMN_COUNT, map_post};
use crate::users::{USER_COLUMN_COUNT, USER_COLUMNS, map_user};
use crate::{Database, Error, Result};

/// Posts by `?1` or anyone sharing a friendship row with `?1`.
const AUTHOR_OR_FRIENDS: &str = "p.author_id = ?1 OR p.author_id IN (
        SELECT friend_id FROM friendships WHERE user_id = ?1
        UNION
        SELECT user_id FROM friendships WHERE friend_id = ?1)";

const AUTHOR_ONLY: &str = "p.author_id = ?1";

impl Database {
    // -- Feed --

    pub fn home_feed(&self, user_id: &str, offset: u32, limit: u32) -> Result<FeedPageRows> {
        self.with_conn(|conn| {
            let (total, mut items) = match visible_page(conn, AUTHOR_OR_FRIENDS, user_id, offset, limit) {
                Err(Error::Sqlite(e)) if is_missing_table(&e) => {
                    warn!("Feed for {} without friendships: {}", user_id, e);
                    visible_page(conn, AUTHOR_ONLY, user_id, offset, limit)?
                }
                other => other?,
            };

            let post_ids: Vec<String> = items.iter().map(|item| item.post.id.clone()).collect();
            let mut viewer_reactions = query_viewer_reactions(conn, user_id, &post_ids)?;
            for item in &mut items {
                item.viewer_reaction = viewer_reactions.remove(&item.post.id);
            }

            let has_more = total > i64::from(offset) + i64::from(limit);
            debug!(
                "Feed for {}: {} of {} posts (offset {}, has_more {})",
                user_id,
                items.len(),
                total,
                offset,
                has_more
            );

            Ok(FeedPageRows {
                items,
                total,
                has_more,
            })
        })
    }
}

fn placeholders(start: usize, count: usize) -> String {
    (start..start + count)
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Total matching posts and the requested page, both filtered by `authors`.
fn visible_page(
    conn: &Connection,
    authors: &str,
    user_id: &str,
    offset: u32,
    limit: u32,
) -> Result<(i64, Vec<FeedRow>)> {
    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM posts p WHERE {authors}"),
        params![user_id],
        |row| row.get(0),
    )?;

    let sql = format!(
        "SELECT {POST_COLUMNS}, {USER_COLUMNS},
                COUNT(DISTINCT c.id), COUNT(DISTINCT r.id)
         FROM posts p
         JOIN users u ON u.id = p.author_id
         LEFT JOIN comments c ON c.post_id = p.id
         LEFT JOIN reactions r ON r.post_id = p.id
         WHERE {authors}
         GROUP BY p.id
         ORDER BY p.created_at DESC, p.rowid DESC
         LIMIT ?2 OFFSET ?3"
    );

    let counts_at = POST_COLUMN_COUNT + USER_COLUMN_COUNT;
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![user_id, limit, offset], |row| {
            Ok(FeedRow {
                post: map_post(row, 0)?,
                author: map_user(row, POST_COLUMN_COUNT)?,
                comment_count: row.get(counts_at)?,
                reaction_count: row.get(counts_at + 1)?,
                viewer_reaction: None,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok((total, rows))
}

/// The viewer's reaction type per post, for the given posts only.
fn query_viewer_reactions(
    conn: &Connection,
    user_id: &str,
    post_ids: &[String],
) -> Result<HashMap<String, String>> {
    if post_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let sql = format!(
        "SELECT post_id, reaction_type FROM reactions
         WHERE user_id = ?1 AND post_id IN ({})",
        placeholders(2, post_ids.len())
    );

    let params = std::iter::once(user_id).chain(post_ids.iter().map(String::as_str));
    let mut stmt = conn.prepare(&sql)?;
    let pairs = stmt
        .query_map(params_from_iter(params), |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<std::result::Result<HashMap<_, _>, _>>()?;
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::social::tests::befriend;
    use crate::users::tests::add_user;
    use crush_types::models::ReactionType;

    #[test]
    fn test_feed_without_friends_shows_own_posts() {
        let db = Database::open_in_memory().unwrap();
        let alice = add_user(&db, "alice");
        let bob = add_user(&db, "bob");
        db.create_post(&alice, "mine", None).unwrap();
        db.create_post(&bob, "not visible", None).unwrap();

        let page = db.home_feed(&alice, 0, 20).unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].post.content, "mine");
        assert_eq!(page.items[0].author.username, "alice");
        assert!(!page.has_more);
    }

    #[test]
    fn test_feed_includes_friends_newest_first() {
        let db = Database::open_in_memory().unwrap();
        let alice = add_user(&db, "alice");
        let bob = add_user(&db, "bob");
        let carol = add_user(&db, "carol");
        befriend(&db, &alice, &bob);

        db.create_post(&alice, "first", None).unwrap();
        db.create_post(&bob, "second", None).unwrap();
        db.create_post(&carol, "stranger", None).unwrap();
        db.create_post(&bob, "third", None).unwrap();

        let page = db.home_feed(&alice, 0, 20).unwrap();
        let contents: Vec<&str> = page.items.iter().map(|i| i.post.content.as_str()).collect();
        assert_eq!(contents, ["third", "second", "first"]);
        assert_eq!(page.total, 3);

        // Visibility is symmetric.
        let page = db.home_feed(&bob, 0, 20).unwrap();
        assert_eq!(page.total, 3);
    }

    #[test]
    fn test_feed_pagination() {
        let db = Database::open_in_memory().unwrap();
        let alice = add_user(&db, "alice");
        for i in 0..5 {
            db.create_post(&alice, &format!("post {i}"), None).unwrap();
        }

        let page = db.home_feed(&alice, 0, 2).unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.total, 5);
        assert!(page.has_more);

        let page = db.home_feed(&alice, 3, 2).unwrap();
        assert_eq!(page.items.len(), 2);
        assert!(!page.has_more);

        let page = db.home_feed(&alice, 10, 2).unwrap();
        assert!(page.items.is_empty());
        assert_eq!(page.total, 5);
        assert!(!page.has_more);
    }

    #[test]
    fn test_feed_counts_are_distinct() {
        let db = Database::open_in_memory().unwrap();
        let alice = add_user(&db, "alice");
        let bob = add_user(&db, "bob");
        let carol = add_user(&db, "carol");
        let post = db.create_post(&alice, "popular", None).unwrap();

        for (i, author) in [&alice, &bob, &carol].into_iter().enumerate() {
            db.create_comment(&post.id, author, &format!("comment {i}"), None).unwrap();
        }
        db.upsert_reaction(&bob, &post.id, ReactionType::Like).unwrap();
        db.upsert_reaction(&carol, &post.id, ReactionType::Love).unwrap();

        let page = db.home_feed(&alice, 0, 20).unwrap();
        assert_eq!(page.items[0].comment_count, 3);
        assert_eq!(page.items[0].reaction_count, 2);
    }

    #[test]
    fn test_feed_reports_viewer_reaction() {
        let db = Database::open_in_memory().unwrap();
        let alice = add_user(&db, "alice");
        let bob = add_user(&db, "bob");
        befriend(&db, &alice, &bob);
        let reacted = db.create_post(&bob, "reacted", None).unwrap();
        db.create_post(&bob, "ignored", None).unwrap();

        db.upsert_reaction(&alice, &reacted.id, ReactionType::Wow).unwrap();
        db.upsert_reaction(&bob, &reacted.id, ReactionType::Sad).unwrap();

        let page = db.home_feed(&alice, 0, 20).unwrap();
        let by_content: HashMap<&str, &FeedRow> =
            page.items.iter().map(|i| (i.post.content.as_str(), i)).collect();
        assert_eq!(by_content["reacted"].viewer_reaction.as_deref(), Some("wow"));
        assert!(by_content["ignored"].viewer_reaction.is_none());
    }

    #[test]
    fn test_feed_with_many_friends() {
        let db = Database::open_in_memory().unwrap();
        let alice = add_user(&db, "alice");
        let friends: Vec<String> = (0..600).map(|i| add_user(&db, &format!("friend{i}"))).collect();

        db.with_conn_mut(|conn| {
            let tx = conn.unchecked_transaction()?;
            for friend in &friends {
                tx.execute(
                    "INSERT INTO friendships (user_id, friend_id, created_at) VALUES (?1, ?2, ?3), (?2, ?1, ?3)",
                    params![alice, friend, crate::timestamp()],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
        .unwrap();
        for friend in &friends {
            db.create_post(friend, "hello", None).unwrap();
        }
        db.create_post(&add_user(&db, "stranger"), "hidden", None).unwrap();

        let page = db.home_feed(&alice, 0, 20).unwrap();
        assert_eq!(page.total, 600);
        assert_eq!(page.items.len(), 20);
        assert!(page.has_more);
        assert!(page.items.iter().all(|item| item.post.content == "hello"));
    }

    #[test]
    fn test_feed_with_missing_friendships_table() {
        let db = Database::open_in_memory().unwrap();
        let alice = add_user(&db, "alice");
        db.create_post(&alice, "still here", None).unwrap();

        db.with_conn_mut(|conn| {
            conn.execute_batch("DROP TABLE friendships;")?;
            Ok(())
        })
        .unwrap();

        let page = db.home_feed(&alice, 0, 20).unwrap();
        assert_eq!(page.total, 1);
    }
}
