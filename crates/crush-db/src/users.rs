use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::info;

use crate::error::is_constraint_violation;
use crate::models::{NewUser, ProfileUpdate, UserRow};
use crate::{Database, Error, Result, timestamp};

pub(crate) const USER_COLUMNS: &str = "u.id, u.email, u.username, u.full_name, u.bio, u.profile_picture, \
     u.university, u.department, u.graduation_year, u.is_active, u.is_verified, u.created_at, u.updated_at";

/// Number of columns read by `map_user`.
pub(crate) const USER_COLUMN_COUNT: usize = 13;

pub(crate) fn map_user(row: &Row<'_>, start: usize) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(start)?,
        email: row.get(start + 1)?,
        username: row.get(start + 2)?,
        full_name: row.get(start + 3)?,
        bio: row.get(start + 4)?,
        profile_picture: row.get(start + 5)?,
        university: row.get(start + 6)?,
        department: row.get(start + 7)?,
        graduation_year: row.get(start + 8)?,
        is_active: row.get(start + 9)?,
        is_verified: row.get(start + 10)?,
        created_at: row.get(start + 11)?,
        updated_at: row.get(start + 12)?,
    })
}

impl Database {
    // -- Users --

    pub fn create_user(&self, user: &NewUser) -> Result<UserRow> {
        self.with_conn_mut(|conn| {
            let now = timestamp();
            conn.execute(
                "INSERT INTO users (id, username, email, full_name, university, is_verified, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
                params![
                    user.id,
                    user.username,
                    user.email,
                    user.full_name,
                    user.university,
                    user.is_verified,
                    now,
                ],
            )
            .map_err(|e| {
                if is_constraint_violation(&e) {
                    Error::Conflict("username or email already taken".into())
                } else {
                    e.into()
                }
            })?;

            info!("User {} created ({})", user.id, user.username);
            query_user_by_id(conn, &user.id)?.ok_or(Error::NotFound("user"))
        })
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_id(conn, id))
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {USER_COLUMNS} FROM users u WHERE u.username = ?1");
            Ok(conn.query_row(&sql, [username], |row| map_user(row, 0)).optional()?)
        })
    }

    pub fn list_users(&self, offset: u32, limit: u32) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {USER_COLUMNS} FROM users u ORDER BY u.created_at, u.rowid LIMIT ?1 OFFSET ?2"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![limit, offset], |row| map_user(row, 0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Case-insensitive substring match on username or full name.
    pub fn search_users(&self, term: &str, offset: u32, limit: u32) -> Result<Vec<UserRow>> {
        let pattern = format!("%{}%", term.trim().to_lowercase());
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {USER_COLUMNS} FROM users u
                 WHERE lower(u.username) LIKE ?1 OR lower(COALESCE(u.full_name, '')) LIKE ?1
                 ORDER BY u.username LIMIT ?2 OFFSET ?3"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![pattern, limit, offset], |row| map_user(row, 0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn update_profile(&self, id: &str, update: &ProfileUpdate) -> Result<UserRow> {
        self.with_conn_mut(|conn| {
            let changed = conn
                .execute(
                    "UPDATE users SET
                        email = COALESCE(?2, email),
                        username = COALESCE(?3, username),
                        full_name = COALESCE(?4, full_name),
                        bio = COALESCE(?5, bio),
                        profile_picture = COALESCE(?6, profile_picture),
                        university = COALESCE(?7, university),
                        department = COALESCE(?8, department),
                        graduation_year = COALESCE(?9, graduation_year),
                        updated_at = ?10
                     WHERE id = ?1",
                    params![
                        id,
                        update.email,
                        update.username,
                        update.full_name,
                        update.bio,
                        update.profile_picture,
                        update.university,
                        update.department,
                        update.graduation_year,
                        timestamp(),
                    ],
                )
                .map_err(|e| {
                    if is_constraint_violation(&e) {
                        Error::Conflict("username or email already taken".into())
                    } else {
                        e.into()
                    }
                })?;

            if changed == 0 {
                return Err(Error::NotFound("user"));
            }
            query_user_by_id(conn, id)?.ok_or(Error::NotFound("user"))
        })
    }

    pub fn set_user_verified(&self, id: &str, verified: bool) -> Result<()> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE users SET is_verified = ?2, updated_at = ?3 WHERE id = ?1",
                params![id, verified, timestamp()],
            )?;
            if changed == 0 {
                return Err(Error::NotFound("user"));
            }
            Ok(())
        })
    }
}

pub(crate) fn query_user_by_id(conn: &Connection, id: &str) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users u WHERE u.id = ?1");
    Ok(conn.query_row(&sql, [id], |row| map_user(row, 0)).optional()?)
}

/// Batch-fetch users for a set of IDs, ordered by username. Unknown IDs are
/// simply absent from the result.
pub(crate) fn query_users_by_ids(conn: &Connection, ids: &[String]) -> Result<Vec<UserRow>> {
    if ids.is_empty() {
        return Ok(vec![]);
    }

    let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("?{}", i)).collect();
    let sql = format!(
        "SELECT {USER_COLUMNS} FROM users u WHERE u.id IN ({}) ORDER BY u.username",
        placeholders.join(", ")
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(ids.iter()), |row| map_user(row, 0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub(crate) fn user_exists(conn: &Connection, id: &str) -> Result<bool> {
    Ok(conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM users WHERE id = ?1)",
        [id],
        |row| row.get(0),
    )?)
}
