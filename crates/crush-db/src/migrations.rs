use rusqlite::Connection;
use tracing::info;

use crate::Result;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            BEGIN;

            CREATE TABLE users (
                id              TEXT PRIMARY KEY,
                email           TEXT UNIQUE,
                username        TEXT NOT NULL UNIQUE,
                full_name       TEXT,
                bio             TEXT,
                profile_picture TEXT,
                university      TEXT,
                department      TEXT,
                graduation_year TEXT,
                is_active       INTEGER NOT NULL DEFAULT 1,
                is_verified     INTEGER NOT NULL DEFAULT 0,
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL
            );

            CREATE TABLE posts (
                id          TEXT PRIMARY KEY,
                author_id   TEXT NOT NULL REFERENCES users(id),
                content     TEXT NOT NULL,
                media_url   TEXT,
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            );

            CREATE INDEX idx_posts_author ON posts(author_id, created_at);

            CREATE TABLE comments (
                id          TEXT PRIMARY KEY,
                post_id     TEXT NOT NULL REFERENCES posts(id),
                author_id   TEXT NOT NULL REFERENCES users(id),
                parent_id   TEXT REFERENCES comments(id),
                content     TEXT NOT NULL,
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            );

            CREATE INDEX idx_comments_post ON comments(post_id, parent_id);

            CREATE TABLE reactions (
                id              TEXT PRIMARY KEY,
                post_id         TEXT NOT NULL REFERENCES posts(id),
                user_id         TEXT NOT NULL REFERENCES users(id),
                reaction_type   TEXT NOT NULL
                    CHECK (reaction_type IN ('like', 'love', 'haha', 'wow', 'sad', 'angry')),
                created_at      TEXT NOT NULL,
                UNIQUE(user_id, post_id)
            );

            CREATE INDEX idx_reactions_post ON reactions(post_id);

            CREATE TABLE friendships (
                user_id     TEXT NOT NULL REFERENCES users(id),
                friend_id   TEXT NOT NULL REFERENCES users(id),
                created_at  TEXT NOT NULL,
                PRIMARY KEY (user_id, friend_id),
                CHECK (user_id != friend_id)
            );

            CREATE INDEX idx_friendships_friend ON friendships(friend_id);

            CREATE TABLE friendship_requests (
                id          TEXT PRIMARY KEY,
                sender_id   TEXT NOT NULL REFERENCES users(id),
                receiver_id TEXT NOT NULL REFERENCES users(id),
                status      TEXT NOT NULL DEFAULT 'pending'
                    CHECK (status IN ('pending', 'accepted', 'rejected')),
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL,
                UNIQUE(sender_id, receiver_id),
                CHECK (sender_id != receiver_id)
            );

            CREATE INDEX idx_requests_receiver ON friendship_requests(receiver_id, status);

            CREATE TABLE notifications (
                id          TEXT PRIMARY KEY,
                user_id     TEXT NOT NULL REFERENCES users(id),
                actor_id    TEXT REFERENCES users(id),
                kind        TEXT NOT NULL,
                content     TEXT NOT NULL,
                related_id  TEXT,
                is_read     INTEGER NOT NULL DEFAULT 0,
                created_at  TEXT NOT NULL
            );

            CREATE INDEX idx_notifications_user ON notifications(user_id, created_at);

            INSERT INTO schema_version (version) VALUES (1);

            COMMIT;
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
