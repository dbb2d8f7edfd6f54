//! Domain model structs persisted in the SQLite database.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use daybook_shared::{EntryId, UserId};

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A registered account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    /// Unique login name.
    pub username: String,
    /// Argon2 PHC string. Never rendered to clients.
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Diary entry
// ---------------------------------------------------------------------------

/// An illustrated diary entry. Entries are never edited after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiaryEntry {
    pub id: EntryId,
    /// Owner of the entry.
    pub user_id: UserId,
    /// Text exactly as the user wrote it.
    pub content: String,
    /// Short derived title.
    pub title: String,
    /// Stable URL of the hosted illustration.
    pub image_url: String,
    /// Prompt the illustration was generated from.
    pub image_prompt: String,
    /// The day the memory is about (user supplied).
    pub entry_date: DateTime<Utc>,
    /// When the record was written (system time).
    pub created_at: DateTime<Utc>,
    /// Author-style rewrite of `content`, when one was derived.
    pub stylized_content: Option<String>,
    /// Label of the author style used for the rewrite.
    pub author_style: Option<String>,
}

// ---------------------------------------------------------------------------
// Profile
// ---------------------------------------------------------------------------

/// Optional demographic hints attached to a user.
///
/// A user without a stored profile is treated as having the empty profile
/// returned by [`UserProfile::empty`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserProfile {
    pub user_id: UserId,
    pub gender: String,
    pub age_range: String,
    pub ethnicity: String,
    pub updated_at: DateTime<Utc>,
}

impl UserProfile {
    pub fn empty(user_id: UserId) -> Self {
        Self {
            user_id,
            gender: String::new(),
            age_range: String::new(),
            ethnicity: String::new(),
            updated_at: DateTime::<Utc>::default(),
        }
    }

    /// `true` when no hint is set.
    pub fn is_blank(&self) -> bool {
        self.gender.is_empty() && self.age_range.is_empty() && self.ethnicity.is_empty()
    }
}
