//! Shared test doubles.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local, TimeDelta, TimeZone, Utc};
use mockable::Clock;

use daybook_shared::{EntryId, UserId};
use daybook_store::{DiaryEntry, User};

use crate::counter_store::{CounterKey, CounterStore, CounterStoreError};
use crate::db::StoreHandle;
use crate::image_host::{ImageHost, ImageHostError};

/// Clock that only moves when told to.
pub struct MutableClock(Mutex<DateTime<Utc>>);

impl MutableClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self(Mutex::new(now))
    }

    pub fn advance(&self, delta: Duration) {
        let delta = match TimeDelta::from_std(delta) {
            Ok(delta) => delta,
            Err(error) => panic!("failed to convert Duration to TimeDelta: {error}; delta={delta:?}"),
        };
        *self.lock_clock() += delta;
    }

    fn lock_clock(&self) -> std::sync::MutexGuard<'_, DateTime<Utc>> {
        match self.0.lock() {
            Ok(guard) => guard,
            Err(_) => panic!("clock mutex"),
        }
    }
}

impl Default for MutableClock {
    /// 2024-02-29T00:00:00Z, the start of both a minute and a week bucket.
    fn default() -> Self {
        Self::new(Utc.with_ymd_and_hms(2024, 2, 29, 0, 0, 0).unwrap())
    }
}

impl Clock for MutableClock {
    fn local(&self) -> DateTime<Local> {
        self.utc().with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        *self.lock_clock()
    }
}

/// Counter store whose backend is always down.
pub struct FailingCounterStore;

#[async_trait]
impl CounterStore for FailingCounterStore {
    async fn increment(&self, _key: &CounterKey, _window: Duration) -> Result<u64, CounterStoreError> {
        Err(CounterStoreError::Unavailable("connection refused".to_string()))
    }

    async fn sweep(&self) -> usize {
        0
    }
}

/// Image host that hands out sequential URLs and records deletions.
#[derive(Default)]
pub struct RecordingImageHost {
    uploads: AtomicUsize,
    deleted: Mutex<Vec<String>>,
    fail_uploads: AtomicBool,
    failing_deletes: Mutex<Vec<String>>,
}

impl RecordingImageHost {
    pub fn fail_uploads(&self) {
        self.fail_uploads.store(true, Ordering::SeqCst);
    }

    /// Make deletion of `hosted_url` fail; other URLs still succeed.
    pub fn fail_delete_of(&self, hosted_url: &str) {
        match self.failing_deletes.lock() {
            Ok(mut failing) => failing.push(hosted_url.to_string()),
            Err(_) => panic!("failing deletes mutex"),
        }
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    pub fn deleted(&self) -> Vec<String> {
        match self.deleted.lock() {
            Ok(deleted) => deleted.clone(),
            Err(_) => panic!("deleted mutex"),
        }
    }
}

#[async_trait]
impl ImageHost for RecordingImageHost {
    async fn upload(&self, _source_url: &str) -> Result<String, ImageHostError> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(ImageHostError::Rejected("upload disabled".to_string()));
        }
        let n = self.uploads.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("https://images.test/{n}.png"))
    }

    async fn delete(&self, hosted_url: &str) -> Result<(), ImageHostError> {
        let failing = match self.failing_deletes.lock() {
            Ok(failing) => failing.iter().any(|url| url == hosted_url),
            Err(_) => panic!("failing deletes mutex"),
        };
        if failing {
            return Err(ImageHostError::Rejected("delete disabled".to_string()));
        }
        match self.deleted.lock() {
            Ok(mut deleted) => deleted.push(hosted_url.to_string()),
            Err(_) => panic!("deleted mutex"),
        }
        Ok(())
    }
}

/// Insert a user row so entries and profiles can reference it.
pub async fn seed_user(store: &StoreHandle, username: &str) -> UserId {
    let user = User {
        id: UserId::new(),
        username: username.to_string(),
        password_hash: "unused".to_string(),
        created_at: Utc::now(),
    };
    let id = user.id;
    store.call(move |db| db.create_user(&user)).await.unwrap();
    id
}

/// Insert an entry directly, bypassing the pipeline.
pub async fn seed_entry(store: &StoreHandle, user: UserId, image_url: &str) -> DiaryEntry {
    let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    let entry = DiaryEntry {
        id: EntryId::new(),
        user_id: user,
        content: "Seeded entry".to_string(),
        title: "Seeded".to_string(),
        image_url: image_url.to_string(),
        image_prompt: "A seed".to_string(),
        entry_date: now,
        created_at: now,
        stylized_content: None,
        author_style: None,
    };
    let record = entry.clone();
    store
        .call(move |db| db.insert_entry(&record))
        .await
        .unwrap();
    entry
}
