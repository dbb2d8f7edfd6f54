//! JSON bodies exchanged between the web client and the server.
//!
//! Field names are camelCase on the wire.

use serde::{Deserialize, Serialize};

use crate::constants::{MAX_CONTENT_LEN, MAX_PROFILE_FIELD_LEN, MIN_PASSWORD_LEN, MIN_USERNAME_LEN};
use crate::error::ValidationError;

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

/// Body of `POST /api/entries`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEntryRequest {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub entry_date: Option<String>,
}

impl CreateEntryRequest {
    /// Return the content as submitted, rejecting blank or oversized input.
    pub fn validated_content(&self) -> Result<String, ValidationError> {
        let content = self
            .content
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .ok_or(ValidationError::MissingContent)?;

        if content.chars().count() > MAX_CONTENT_LEN {
            return Err(ValidationError::ContentTooLong);
        }
        Ok(content.to_string())
    }
}

/// A diary entry as rendered to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryResponse {
    pub id: String,
    pub content: String,
    pub title: String,
    pub image_url: String,
    pub image_prompt: String,
    pub entry_date: String,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stylized_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_style: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryListResponse {
    pub entries: Vec<EntryResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteAllResponse {
    pub success: bool,
    pub deleted_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}

impl SuccessResponse {
    pub fn ok() -> Self {
        Self { success: true }
    }
}

// ---------------------------------------------------------------------------
// Profile
// ---------------------------------------------------------------------------

/// Demographic hints used to bias image prompts. Every field may be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    pub user_id: String,
    pub gender: String,
    pub age_range: String,
    pub ethnicity: String,
}

/// Body of `POST /api/user/profile`. Missing fields are stored as empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub age_range: Option<String>,
    #[serde(default)]
    pub ethnicity: Option<String>,
}

impl ProfileUpdate {
    /// Trimmed `(gender, age_range, ethnicity)`.
    pub fn validated(&self) -> Result<(String, String, String), ValidationError> {
        Ok((
            profile_field("gender", self.gender.as_deref())?,
            profile_field("ageRange", self.age_range.as_deref())?,
            profile_field("ethnicity", self.ethnicity.as_deref())?,
        ))
    }
}

fn profile_field(name: &'static str, value: Option<&str>) -> Result<String, ValidationError> {
    let value = value.map(str::trim).unwrap_or_default();
    if value.chars().count() > MAX_PROFILE_FIELD_LEN {
        return Err(ValidationError::ProfileFieldTooLong(name));
    }
    Ok(value.to_string())
}

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl Credentials {
    /// Both fields present and non-empty. Used by login.
    pub fn required(&self) -> Result<(&str, &str), ValidationError> {
        match (self.username.as_deref(), self.password.as_deref()) {
            (Some(u), Some(p)) if !u.trim().is_empty() && !p.is_empty() => Ok((u.trim(), p)),
            _ => Err(ValidationError::MissingCredentials),
        }
    }

    /// Registration rules on top of [`Credentials::required`].
    pub fn for_registration(&self) -> Result<(&str, &str), ValidationError> {
        let (username, password) = self.required()?;
        if username.chars().count() < MIN_USERNAME_LEN {
            return Err(ValidationError::UsernameTooShort);
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ValidationError::PasswordTooShort);
        }
        Ok((username, password))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: String,
    pub username: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    pub user: UserSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user: UserSummary,
    pub token: String,
}
