//! Entry pipeline: turns submitted text into a stored, illustrated entry.
//!
//! Text derivation degrades to fixed defaults. Image generation and hosting
//! are hard failures because the illustration is the point of an entry.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use mockable::Clock;
use tracing::{info, warn};

use daybook_shared::constants::{DEFAULT_AUTHOR_STYLE, DEFAULT_IMAGE_PROMPT, DEFAULT_TITLE};
use daybook_shared::{EntryId, UserId};
use daybook_store::{DiaryEntry, UserProfile};

use crate::db::StoreHandle;
use crate::error::ServerError;
use crate::generative::{EntryDescription, ImageGenerator, StylizedContent, TextGenerator};
use crate::image_host::ImageHost;

#[derive(Clone)]
pub struct EntryPipeline {
    store: StoreHandle,
    text: Arc<dyn TextGenerator>,
    images: Arc<dyn ImageGenerator>,
    host: Arc<dyn ImageHost>,
    clock: Arc<dyn Clock + Send + Sync>,
    stylize: bool,
}

impl EntryPipeline {
    pub fn new(
        store: StoreHandle,
        text: Arc<dyn TextGenerator>,
        images: Arc<dyn ImageGenerator>,
        host: Arc<dyn ImageHost>,
        clock: Arc<dyn Clock + Send + Sync>,
        stylize: bool,
    ) -> Self {
        Self {
            store,
            text,
            images,
            host,
            clock,
            stylize,
        }
    }

    /// Create an entry for `user`. `content` must already be validated.
    /// Without an `entry_date` the entry is dated now.
    pub async fn create(
        &self,
        user: UserId,
        content: String,
        entry_date: Option<DateTime<Utc>>,
    ) -> Result<DiaryEntry, ServerError> {
        let profile = self.profile_or_empty(user).await;

        let (description, styled) = tokio::join!(
            self.describe(user, &content, &profile),
            self.stylize(user, &content)
        );

        let source_url = self.images.generate(&description.image_prompt).await?;
        let image_url = self.host.upload(&source_url).await?;

        let now = self.clock.utc();
        let entry = DiaryEntry {
            id: EntryId::new(),
            user_id: user,
            content,
            title: description.title,
            image_url,
            image_prompt: description.image_prompt,
            entry_date: entry_date.unwrap_or(now),
            created_at: now,
            stylized_content: styled.as_ref().map(|s| s.content.clone()),
            author_style: styled.map(|s| s.author_style),
        };

        let record = entry.clone();
        if let Err(e) = self.store.call(move |db| db.insert_entry(&record)).await {
            if let Err(cleanup) = self.host.delete(&entry.image_url).await {
                warn!(
                    user = %user,
                    url = %entry.image_url,
                    error = %cleanup,
                    "Failed to release image of unsaved entry"
                );
            }
            return Err(e.into());
        }

        info!(user = %user, entry = %entry.id, "Created diary entry");
        Ok(entry)
    }

    async fn profile_or_empty(&self, user: UserId) -> UserProfile {
        match self.store.call(move |db| db.get_profile(user)).await {
            Ok(Some(profile)) => profile,
            Ok(None) => UserProfile::empty(user),
            Err(e) => {
                warn!(user = %user, error = %e, "Profile lookup failed, continuing without it");
                UserProfile::empty(user)
            }
        }
    }

    async fn describe(&self, user: UserId, content: &str, profile: &UserProfile) -> EntryDescription {
        match self.text.describe(content, profile).await {
            Ok(description) => description,
            Err(e) => {
                warn!(user = %user, error = %e, "Title derivation failed, using defaults");
                EntryDescription {
                    title: DEFAULT_TITLE.to_string(),
                    image_prompt: DEFAULT_IMAGE_PROMPT.to_string(),
                }
            }
        }
    }

    async fn stylize(&self, user: UserId, content: &str) -> Option<StylizedContent> {
        if !self.stylize {
            return None;
        }
        match self.text.stylize(content).await {
            Ok(styled) => Some(styled),
            Err(e) => {
                warn!(user = %user, error = %e, "Stylized rewrite failed, keeping original");
                Some(StylizedContent {
                    content: content.to_string(),
                    author_style: DEFAULT_AUTHOR_STYLE.to_string(),
                })
            }
        }
    }
}
