use rusqlite::Connection;

// Author-style rewrite columns. Entries written before this migration keep NULL.
const UP_SQL: &str = r#"
ALTER TABLE diary_entries ADD COLUMN stylized_content TEXT;
ALTER TABLE diary_entries ADD COLUMN author_style     TEXT;
"#;

pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
