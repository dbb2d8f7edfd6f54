//! Entry removal. Hosted images are released before the records that
//! reference them are dropped.

use std::sync::Arc;

use futures::future::join_all;
use tracing::{info, warn};

use daybook_shared::{EntryId, UserId};
use daybook_store::StoreError;

use crate::db::StoreHandle;
use crate::error::ServerError;
use crate::image_host::ImageHost;

#[derive(Clone)]
pub struct EntryRemover {
    store: StoreHandle,
    host: Arc<dyn ImageHost>,
}

impl EntryRemover {
    pub fn new(store: StoreHandle, host: Arc<dyn ImageHost>) -> Self {
        Self { store, host }
    }

    /// Delete one of `user`'s entries and its image.
    pub async fn remove_one(&self, user: UserId, id: EntryId) -> Result<(), ServerError> {
        let entry = self
            .store
            .call(move |db| db.get_entry_for_user(id, user))
            .await
            .map_err(|e| match e {
                StoreError::NotFound => ServerError::EntryNotFound,
                other => other.into(),
            })?;

        self.host
            .delete(&entry.image_url)
            .await
            .map_err(ServerError::ImageCleanup)?;

        let removed = self
            .store
            .call(move |db| db.delete_entry_for_user(id, user))
            .await?;
        if !removed {
            return Err(ServerError::EntryNotFound);
        }

        info!(user = %user, entry = %id, "Deleted diary entry");
        Ok(())
    }

    /// Delete all of `user`'s entries. Image deletions run concurrently; an
    /// entry's record is removed only once its image is gone, and entries
    /// created after the listing are left alone.
    pub async fn remove_all(&self, user: UserId) -> Result<u64, ServerError> {
        let entries = self
            .store
            .call(move |db| db.list_entries_for_user(user))
            .await?;

        let outcomes = join_all(entries.iter().map(|entry| self.host.delete(&entry.image_url))).await;

        let mut released = Vec::with_capacity(entries.len());
        let mut failure = None;
        for (entry, outcome) in entries.iter().zip(outcomes) {
            match outcome {
                Ok(()) => released.push(entry.id),
                Err(e) => {
                    warn!(user = %user, entry = %entry.id, error = %e, "Failed to release entry image");
                    failure.get_or_insert(e);
                }
            }
        }

        let removed = self
            .store
            .call(move |db| db.delete_entries_for_user(user, &released))
            .await?;

        if let Some(e) = failure {
            warn!(
                user = %user,
                removed,
                kept = (entries.len() as u64).saturating_sub(removed),
                "Bulk deletion incomplete"
            );
            return Err(ServerError::ImageCleanup(e));
        }

        info!(user = %user, removed, "Deleted all diary entries");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_host::ImageHostError;
    use crate::test_support::{seed_entry, seed_user, RecordingImageHost};
    use async_trait::async_trait;
    use daybook_store::{Database, DiaryEntry};
    use std::sync::Mutex;

    fn setup() -> (EntryRemover, StoreHandle, Arc<RecordingImageHost>) {
        let store = StoreHandle::new(Database::open_in_memory().unwrap());
        let host = Arc::new(RecordingImageHost::default());
        (EntryRemover::new(store.clone(), host.clone()), store, host)
    }

    #[tokio::test]
    async fn test_remove_one_releases_only_its_image() {
        let (remover, store, host) = setup();
        let user = seed_user(&store, "ada").await;
        let keep = seed_entry(&store, user, "https://images.test/keep.png").await;
        let drop = seed_entry(&store, user, "https://images.test/drop.png").await;

        remover.remove_one(user, drop.id).await.unwrap();

        assert_eq!(host.deleted(), vec!["https://images.test/drop.png".to_string()]);
        let left = store.call(move |db| db.list_entries_for_user(user)).await.unwrap();
        assert_eq!(left, vec![keep]);
    }

    #[tokio::test]
    async fn test_remove_one_foreign_entry_is_not_found() {
        let (remover, store, host) = setup();
        let owner = seed_user(&store, "ada").await;
        let entry = seed_entry(&store, owner, "https://images.test/a.png").await;

        let result = remover.remove_one(UserId::new(), entry.id).await;
        assert!(matches!(result, Err(ServerError::EntryNotFound)));
        assert!(host.deleted().is_empty());
    }

    #[tokio::test]
    async fn test_remove_all_releases_every_image_of_caller() {
        let (remover, store, host) = setup();
        let user = seed_user(&store, "ada").await;
        let other = seed_user(&store, "bob").await;
        seed_entry(&store, user, "https://images.test/1.png").await;
        seed_entry(&store, user, "https://images.test/2.png").await;
        seed_entry(&store, other, "https://images.test/other.png").await;

        assert_eq!(remover.remove_all(user).await.unwrap(), 2);

        let mut deleted = host.deleted();
        deleted.sort();
        assert_eq!(
            deleted,
            vec![
                "https://images.test/1.png".to_string(),
                "https://images.test/2.png".to_string()
            ]
        );
        let others = store.call(move |db| db.list_entries_for_user(other)).await.unwrap();
        assert_eq!(others.len(), 1);
    }

    #[tokio::test]
    async fn test_remove_all_drops_only_records_whose_image_was_released() {
        let (remover, store, host) = setup();
        let user = seed_user(&store, "ada").await;
        let good = seed_entry(&store, user, "https://images.test/good.png").await;
        let bad = seed_entry(&store, user, "https://images.test/bad.png").await;
        host.fail_delete_of(&bad.image_url);

        let result = remover.remove_all(user).await;
        assert!(matches!(result, Err(ServerError::ImageCleanup(_))));

        assert_eq!(host.deleted(), vec![good.image_url.clone()]);
        let left = store.call(move |db| db.list_entries_for_user(user)).await.unwrap();
        assert_eq!(left, vec![bad]);
    }

    /// Inserts a fresh entry for the owner the first time an image is deleted.
    struct InsertingImageHost {
        inner: RecordingImageHost,
        store: StoreHandle,
        user: UserId,
        inserted: Mutex<Option<DiaryEntry>>,
    }

    #[async_trait]
    impl ImageHost for InsertingImageHost {
        async fn upload(&self, source_url: &str) -> Result<String, ImageHostError> {
            self.inner.upload(source_url).await
        }

        async fn delete(&self, hosted_url: &str) -> Result<(), ImageHostError> {
            let first = self.inserted.lock().unwrap().is_none();
            if first {
                let entry = seed_entry(&self.store, self.user, "https://images.test/new.png").await;
                *self.inserted.lock().unwrap() = Some(entry);
            }
            self.inner.delete(hosted_url).await
        }
    }

    #[tokio::test]
    async fn test_remove_all_keeps_entries_created_after_listing() {
        let store = StoreHandle::new(Database::open_in_memory().unwrap());
        let user = seed_user(&store, "ada").await;
        seed_entry(&store, user, "https://images.test/old.png").await;
        let host = Arc::new(InsertingImageHost {
            inner: RecordingImageHost::default(),
            store: store.clone(),
            user,
            inserted: Mutex::new(None),
        });
        let remover = EntryRemover::new(store.clone(), host.clone());

        let removed = remover.remove_all(user).await.unwrap();

        assert_eq!(removed, 1);
        assert_eq!(host.inner.deleted(), vec!["https://images.test/old.png".to_string()]);
        let created = host.inserted.lock().unwrap().clone().unwrap();
        let left = store.call(move |db| db.list_entries_for_user(user)).await.unwrap();
        assert_eq!(left, vec![created]);
    }
}
