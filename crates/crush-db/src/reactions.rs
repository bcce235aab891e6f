use rusqlite::{Connection, OptionalExtension, Row, params};

use crush_types::models::ReactionType;

use crate::models::ReactionRow;
use crate::posts::query_post;
use crate::users::user_exists;
use crate::{Database, Error, Result, new_id, timestamp};

fn map_reaction(row: &Row<'_>) -> rusqlite::Result<ReactionRow> {
    Ok(ReactionRow {
        id: row.get(0)?,
        post_id: row.get(1)?,
        user_id: row.get(2)?,
        reaction_type: row.get(3)?,
        created_at: row.get(4)?,
    })
}

impl Database {
    // -- Reactions --

    /// Insert-or-update the caller's single reaction on a post.
    /// Returns the stored row and whether it was newly created.
    pub fn upsert_reaction(
        &self,
        user_id: &str,
        post_id: &str,
        reaction_type: ReactionType,
    ) -> Result<(ReactionRow, bool)> {
        let (reaction, created) = self.with_conn_mut(|conn| {
            if query_post(conn, post_id)?.is_none() {
                return Err(Error::NotFound("post"));
            }
            if !user_exists(conn, user_id)? {
                return Err(Error::NotFound("user"));
            }

            let existed = query_reaction(conn, user_id, post_id)?.is_some();
            conn.execute(
                "INSERT INTO reactions (id, post_id, user_id, reaction_type, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(user_id, post_id) DO UPDATE SET reaction_type = excluded.reaction_type",
                params![new_id(), post_id, user_id, reaction_type.as_str(), timestamp()],
            )?;

            let reaction = query_reaction(conn, user_id, post_id)?.ok_or(Error::NotFound("reaction"))?;
            Ok((reaction, !existed))
        })?;

        // Changing the type of an existing reaction is not news to the author.
        if created {
            self.notify_post_reaction(post_id, user_id);
        }
        Ok((reaction, created))
    }

    pub fn get_reaction(&self, user_id: &str, post_id: &str) -> Result<Option<ReactionRow>> {
        self.with_conn(|conn| query_reaction(conn, user_id, post_id))
    }

    pub fn reactions_for_post(&self, post_id: &str, offset: u32, limit: u32) -> Result<Vec<ReactionRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, post_id, user_id, reaction_type, created_at FROM reactions
                 WHERE post_id = ?1
                 ORDER BY created_at, rowid
                 LIMIT ?2 OFFSET ?3",
            )?;
            let rows = stmt
                .query_map(params![post_id, limit, offset], map_reaction)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Reaction counts per type for a post, most frequent first.
    pub fn reaction_counts(&self, post_id: &str) -> Result<Vec<(ReactionType, i64)>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT reaction_type, COUNT(*) FROM reactions
                 WHERE post_id = ?1
                 GROUP BY reaction_type
                 ORDER BY COUNT(*) DESC, reaction_type",
            )?;
            let rows = stmt
                .query_map([post_id], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            rows.into_iter()
                .map(|(kind, count)| -> Result<_> { Ok((kind.parse::<ReactionType>()?, count)) })
                .collect()
        })
    }

    pub fn delete_reaction(&self, user_id: &str, post_id: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            let removed = conn.execute(
                "DELETE FROM reactions WHERE user_id = ?1 AND post_id = ?2",
                params![user_id, post_id],
            )?;
            if removed == 0 {
                return Err(Error::NotFound("reaction"));
            }
            Ok(())
        })
    }
}

fn query_reaction(conn: &Connection, user_id: &str, post_id: &str) -> Result<Option<ReactionRow>> {
    Ok(conn
        .query_row(
            "SELECT id, post_id, user_id, reaction_type, created_at FROM reactions
             WHERE user_id = ?1 AND post_id = ?2",
            params![user_id, post_id],
            map_reaction,
        )
        .optional()?)
}
