//! CRUD operations for [`DiaryEntry`] records.
//!
//! Every read and delete is scoped by owner: a caller can never see or remove
//! another user's entries through these helpers.

use rusqlite::params;

use daybook_shared::{EntryId, UserId};

use crate::database::Database;
use crate::error::{not_found, Result};
use crate::models::DiaryEntry;
use crate::timestamps;

const ENTRY_COLUMNS: &str = "id, user_id, content, title, image_url, image_prompt,
     entry_date, created_at, stylized_content, author_style";

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    pub fn insert_entry(&self, entry: &DiaryEntry) -> Result<()> {
        self.conn().execute(
            "INSERT INTO diary_entries (id, user_id, content, title, image_url, image_prompt,
                                        entry_date, created_at, stylized_content, author_style)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                entry.id.to_string(),
                entry.user_id.to_string(),
                entry.content,
                entry.title,
                entry.image_url,
                entry.image_prompt,
                timestamps::encode(&entry.entry_date),
                timestamps::encode(&entry.created_at),
                entry.stylized_content,
                entry.author_style,
            ],
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// All entries owned by `user_id`, newest entry date first, ties broken
    /// by newest creation time.
    pub fn list_entries_for_user(&self, user_id: UserId) -> Result<Vec<DiaryEntry>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {ENTRY_COLUMNS}
             FROM diary_entries
             WHERE user_id = ?1
             ORDER BY entry_date DESC, created_at DESC"
        ))?;

        let rows = stmt.query_map(params![user_id.to_string()], row_to_entry)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    /// Fetch one entry if it exists *and* belongs to `user_id`.
    pub fn get_entry_for_user(&self, id: EntryId, user_id: UserId) -> Result<DiaryEntry> {
        self.conn()
            .query_row(
                &format!(
                    "SELECT {ENTRY_COLUMNS}
                     FROM diary_entries
                     WHERE id = ?1 AND user_id = ?2"
                ),
                params![id.to_string(), user_id.to_string()],
                row_to_entry,
            )
            .map_err(not_found)
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Delete one owned entry. Returns `true` if a row was deleted.
    pub fn delete_entry_for_user(&self, id: EntryId, user_id: UserId) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM diary_entries WHERE id = ?1 AND user_id = ?2",
            params![id.to_string(), user_id.to_string()],
        )?;
        Ok(affected > 0)
    }

    /// Delete the given entries of `user_id` in one transaction. Ids that are
    /// missing or owned by someone else are skipped. Returns the number removed.
    pub fn delete_entries_for_user(&self, user_id: UserId, ids: &[EntryId]) -> Result<u64> {
        let tx = self.conn().unchecked_transaction()?;
        let mut removed = 0u64;
        {
            let mut stmt =
                tx.prepare("DELETE FROM diary_entries WHERE id = ?1 AND user_id = ?2")?;
            let owner = user_id.to_string();
            for id in ids {
                removed += stmt.execute(params![id.to_string(), owner])? as u64;
            }
        }
        tx.commit()?;
        Ok(removed)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<DiaryEntry> {
    let id_str: String = row.get(0)?;
    let user_str: String = row.get(1)?;
    let entry_date_str: String = row.get(6)?;
    let created_str: String = row.get(7)?;

    Ok(DiaryEntry {
        id: EntryId(timestamps::decode_uuid(0, &id_str)?),
        user_id: UserId(timestamps::decode_uuid(1, &user_str)?),
        content: row.get(2)?,
        title: row.get(3)?,
        image_url: row.get(4)?,
        image_prompt: row.get(5)?,
        entry_date: timestamps::decode(6, &entry_date_str)?,
        created_at: timestamps::decode(7, &created_str)?,
        stylized_content: row.get(8)?,
        author_style: row.get(9)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::models::User;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn db_with_users(names: &[&str]) -> (Database, Vec<UserId>) {
        let db = Database::open_in_memory().unwrap();
        let ids = names
            .iter()
            .map(|name| {
                let user = User {
                    id: UserId::new(),
                    username: name.to_string(),
                    password_hash: "x".into(),
                    created_at: Utc::now(),
                };
                db.create_user(&user).unwrap();
                user.id
            })
            .collect();
        (db, ids)
    }

    fn entry(user_id: UserId, entry_date: DateTime<Utc>, created_at: DateTime<Utc>) -> DiaryEntry {
        let id = EntryId::new();
        DiaryEntry {
            id,
            user_id,
            content: "Walked on the beach at sunset".into(),
            title: "Sunset".into(),
            image_url: format!("https://img.example/{id}.png"),
            image_prompt: "golden hour over the sea".into(),
            entry_date,
            created_at,
            stylized_content: None,
            author_style: None,
        }
    }

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn insert_and_get_round_trip() {
        let (db, users) = db_with_users(&["alice"]);
        let created = Utc.with_ymd_and_hms(2024, 4, 1, 12, 0, 0).unwrap();
        let mut e = entry(users[0], day(1), created);
        e.stylized_content = Some("The sea swallowed the sun.".into());
        e.author_style = Some("Virginia Woolf".into());
        db.insert_entry(&e).unwrap();

        let loaded = db.get_entry_for_user(e.id, users[0]).unwrap();
        assert_eq!(loaded, e);
    }

    #[test]
    fn list_orders_by_entry_date_then_created_at() {
        let (db, users) = db_with_users(&["alice"]);
        let base = Utc.with_ymd_and_hms(2024, 4, 1, 12, 0, 0).unwrap();

        let older_day = entry(users[0], day(1), base + Duration::hours(5));
        let same_day_first = entry(users[0], day(3), base);
        let same_day_second = entry(users[0], day(3), base + Duration::milliseconds(1));
        for e in [&older_day, &same_day_first, &same_day_second] {
            db.insert_entry(e).unwrap();
        }

        let ids: Vec<EntryId> = db
            .list_entries_for_user(users[0])
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec![same_day_second.id, same_day_first.id, older_day.id]);
    }

    #[test]
    fn list_never_includes_other_users() {
        let (db, users) = db_with_users(&["alice", "bob"]);
        db.insert_entry(&entry(users[0], day(1), Utc::now())).unwrap();
        db.insert_entry(&entry(users[1], day(2), Utc::now())).unwrap();

        let alice = db.list_entries_for_user(users[0]).unwrap();
        assert_eq!(alice.len(), 1);
        assert!(alice.iter().all(|e| e.user_id == users[0]));
    }

    #[test]
    fn foreign_entry_is_not_found_and_not_deleted() {
        let (db, users) = db_with_users(&["alice", "bob"]);
        let e = entry(users[0], day(1), Utc::now());
        db.insert_entry(&e).unwrap();

        assert!(matches!(
            db.get_entry_for_user(e.id, users[1]),
            Err(StoreError::NotFound)
        ));
        assert!(!db.delete_entry_for_user(e.id, users[1]).unwrap());
        assert!(db.delete_entry_for_user(e.id, users[0]).unwrap());
    }

    #[test]
    fn bulk_delete_counts_only_own_entries() {
        let (db, users) = db_with_users(&["alice", "bob"]);
        let mut ids = Vec::new();
        for d in 1..=3 {
            let e = entry(users[0], day(d), Utc::now());
            db.insert_entry(&e).unwrap();
            ids.push(e.id);
        }
        let bobs = entry(users[1], day(1), Utc::now());
        db.insert_entry(&bobs).unwrap();
        ids.push(bobs.id);

        assert_eq!(db.delete_entries_for_user(users[0], &ids).unwrap(), 3);
        assert!(db.list_entries_for_user(users[0]).unwrap().is_empty());
        assert_eq!(db.list_entries_for_user(users[1]).unwrap().len(), 1);
    }

    #[test]
    fn bulk_delete_leaves_unlisted_entries() {
        let (db, users) = db_with_users(&["alice"]);
        let listed = entry(users[0], day(1), Utc::now());
        let later = entry(users[0], day(2), Utc::now());
        db.insert_entry(&listed).unwrap();
        db.insert_entry(&later).unwrap();

        assert_eq!(db.delete_entries_for_user(users[0], &[listed.id]).unwrap(), 1);
        let left = db.list_entries_for_user(users[0]).unwrap();
        assert_eq!(left, vec![later]);
    }
}
