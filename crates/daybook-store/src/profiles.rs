//! Read and upsert [`UserProfile`] records.

use rusqlite::params;

use daybook_shared::UserId;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::UserProfile;
use crate::timestamps;

impl Database {
    /// Fetch the stored profile, `None` when the user never saved one.
    pub fn get_profile(&self, user_id: UserId) -> Result<Option<UserProfile>> {
        match self.conn().query_row(
            "SELECT user_id, gender, age_range, ethnicity, updated_at
             FROM user_profiles
             WHERE user_id = ?1",
            params![user_id.to_string()],
            row_to_profile,
        ) {
            Ok(profile) => Ok(Some(profile)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Sqlite(e)),
        }
    }

    /// Insert the profile or replace the existing one for the same user.
    pub fn upsert_profile(&self, profile: &UserProfile) -> Result<()> {
        self.conn().execute(
            "INSERT INTO user_profiles (user_id, gender, age_range, ethnicity, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(user_id) DO UPDATE SET
                 gender     = excluded.gender,
                 age_range  = excluded.age_range,
                 ethnicity  = excluded.ethnicity,
                 updated_at = excluded.updated_at",
            params![
                profile.user_id.to_string(),
                profile.gender,
                profile.age_range,
                profile.ethnicity,
                timestamps::encode(&profile.updated_at),
            ],
        )?;
        Ok(())
    }
}

fn row_to_profile(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserProfile> {
    let user_str: String = row.get(0)?;
    let updated_str: String = row.get(4)?;

    Ok(UserProfile {
        user_id: UserId(timestamps::decode_uuid(0, &user_str)?),
        gender: row.get(1)?,
        age_range: row.get(2)?,
        ethnicity: row.get(3)?,
        updated_at: timestamps::decode(4, &updated_str)?,
    })
}
