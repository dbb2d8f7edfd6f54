//! v001 -- Initial schema creation.
//!
//! Creates the three collections: `users`, `diary_entries` and
//! `user_profiles`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Users
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    id            TEXT PRIMARY KEY NOT NULL,   -- UUID v4
    username      TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,               -- Argon2 PHC string
    created_at    TEXT NOT NULL                -- RFC-3339, UTC
);

-- ----------------------------------------------------------------
-- Diary entries
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS diary_entries (
    id           TEXT PRIMARY KEY NOT NULL,    -- UUID v4
    user_id      TEXT NOT NULL,                -- FK -> users(id)
    content      TEXT NOT NULL,
    title        TEXT NOT NULL,
    image_url    TEXT NOT NULL,
    image_prompt TEXT NOT NULL,
    entry_date   TEXT NOT NULL,                -- the day the memory is about
    created_at   TEXT NOT NULL,                -- when the record was written

    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_entries_user_id ON diary_entries(user_id);

CREATE INDEX IF NOT EXISTS idx_entries_user_entry_date
    ON diary_entries(user_id, entry_date DESC, created_at DESC);

-- ----------------------------------------------------------------
-- User profiles (demographic prompt hints)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS user_profiles (
    user_id    TEXT PRIMARY KEY NOT NULL,      -- FK -> users(id)
    gender     TEXT NOT NULL DEFAULT '',
    age_range  TEXT NOT NULL DEFAULT '',
    ethnicity  TEXT NOT NULL DEFAULT '',
    updated_at TEXT NOT NULL,

    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
