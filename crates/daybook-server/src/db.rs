use std::sync::{Arc, Mutex};

use daybook_store::{Database, StoreError};

/// Shared handle to the synchronous store, driven from the blocking pool.
#[derive(Clone)]
pub struct StoreHandle {
    db: Arc<Mutex<Database>>,
}

impl StoreHandle {
    pub fn new(db: Database) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
        }
    }

    /// Run `f` against the database on a blocking thread.
    pub async fn call<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Database) -> daybook_store::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db.lock().map_err(|_| StoreError::Poisoned)?;
            f(&guard)
        })
        .await
        .map_err(|e| StoreError::Io(std::io::Error::other(e)))?
    }
}
