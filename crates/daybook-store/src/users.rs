//! CRUD operations for [`User`] records.

use rusqlite::{params, ErrorCode};

use daybook_shared::UserId;

use crate::database::Database;
use crate::error::{not_found, Result, StoreError};
use crate::models::User;
use crate::timestamps;

impl Database {
    /// Insert a new user. A taken username yields [`StoreError::Conflict`].
    pub fn create_user(&self, user: &User) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO users (id, username, password_hash, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    user.id.to_string(),
                    user.username,
                    user.password_hash,
                    timestamps::encode(&user.created_at),
                ],
            )
            .map_err(|e| match e {
                rusqlite::Error::SqliteFailure(err, _)
                    if err.code == ErrorCode::ConstraintViolation =>
                {
                    StoreError::Conflict(format!("username '{}' already exists", user.username))
                }
                other => StoreError::Sqlite(other),
            })?;
        Ok(())
    }

    pub fn get_user(&self, id: UserId) -> Result<User> {
        self.conn()
            .query_row(
                "SELECT id, username, password_hash, created_at
                 FROM users
                 WHERE id = ?1",
                params![id.to_string()],
                row_to_user,
            )
            .map_err(not_found)
    }

    /// Look a user up by login name. Absence is `Ok(None)`.
    pub fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        match self.conn().query_row(
            "SELECT id, username, password_hash, created_at
             FROM users
             WHERE username = ?1",
            params![username],
            row_to_user,
        ) {
            Ok(user) => Ok(Some(user)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Sqlite(e)),
        }
    }
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    let id_str: String = row.get(0)?;
    let username: String = row.get(1)?;
    let password_hash: String = row.get(2)?;
    let created_str: String = row.get(3)?;

    Ok(User {
        id: UserId(timestamps::decode_uuid(0, &id_str)?),
        username,
        password_hash,
        created_at: timestamps::decode(3, &created_str)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn user(name: &str) -> User {
        User {
            id: UserId::new(),
            username: name.to_string(),
            password_hash: "$argon2id$stub".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn create_and_find() {
        let db = Database::open_in_memory().unwrap();
        let alice = user("alice");
        db.create_user(&alice).unwrap();

        let found = db.find_user_by_username("alice").unwrap().unwrap();
        assert_eq!(found.id, alice.id);
        assert_eq!(db.get_user(alice.id).unwrap().username, "alice");
        assert!(db.find_user_by_username("bob").unwrap().is_none());
    }

    #[test]
    fn duplicate_username_conflicts() {
        let db = Database::open_in_memory().unwrap();
        db.create_user(&user("alice")).unwrap();

        let err = db.create_user(&user("alice")).unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[test]
    fn missing_user_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(db.get_user(UserId::new()), Err(StoreError::NotFound)));
    }
}
