//! Durable keyed store for pins.
//!
//! `PinStore` is a cheap, cloneable handle around one SQLite connection.
//! Every operation runs on tokio's blocking pool and resolves only after
//! SQLite has committed, so a successful `insert` or `delete_by_id` is on
//! disk by the time the caller sees it. Handles are plain values: open as
//! many independent stores as needed.

mod error;
mod pins;
mod schema;
pub mod sqlite;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

pub use error::StoreError;
pub use pins::{timestamp_now, NewPin, Pin};
pub use schema::SCHEMA_VERSION;

use sqlite::SqliteDb;

/// File name of the pin database inside the data directory.
pub const STORE_FILE_NAME: &str = "walk_app.db";

#[derive(Clone)]
pub struct PinStore {
    db: Arc<Mutex<SqliteDb>>,
}

impl PinStore {
    /// Open (creating if absent) the store at `path` and bring its schema up to date.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let db = run_blocking(move || {
            let mut db = SqliteDb::open(&path)?;
            db.initialize()?;
            info!("Pin store opened at {:?}", path);
            Ok(db)
        })
        .await?;
        Ok(Self::from_db(db))
    }

    /// A store that lives only as long as this handle and its clones.
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let db = run_blocking(|| {
            let mut db = SqliteDb::open_in_memory()?;
            db.initialize()?;
            Ok(db)
        })
        .await?;
        Ok(Self::from_db(db))
    }

    fn from_db(db: SqliteDb) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
        }
    }

    /// Store a new pin and return its freshly assigned id.
    pub async fn insert(&self, pin: NewPin) -> Result<i64, StoreError> {
        self.with_db(move |db| {
            let id = db.insert_pin(&pin)?;
            info!(id, lat = pin.lat, lng = pin.lng, bytes = pin.image.len(), "Pin stored");
            Ok(id)
        })
        .await
    }

    /// Snapshot of every pin in insertion order.
    pub async fn list_all(&self) -> Result<Vec<Pin>, StoreError> {
        self.with_db(|db| db.get_all_pins()).await
    }

    /// Snapshot of every pin, oldest `created_at` first.
    pub async fn list_by_created_at(&self) -> Result<Vec<Pin>, StoreError> {
        self.with_db(|db| db.get_pins_by_created_at()).await
    }

    pub async fn get(&self, id: i64) -> Result<Option<Pin>, StoreError> {
        self.with_db(move |db| db.get_pin(id)).await
    }

    pub async fn count(&self) -> Result<usize, StoreError> {
        self.with_db(|db| db.count_pins()).await
    }

    /// Remove a pin. Deleting an id that is not present succeeds.
    pub async fn delete_by_id(&self, id: i64) -> Result<(), StoreError> {
        self.with_db(move |db| {
            if db.delete_pin(id)? {
                info!(id, "Pin deleted");
            } else {
                debug!(id, "Delete requested for absent pin");
            }
            Ok(())
        })
        .await
    }

    pub async fn schema_version(&self) -> Result<i64, StoreError> {
        self.with_db(|db| db.schema_version()).await
    }

    async fn with_db<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut SqliteDb) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(&self.db);
        run_blocking(move || {
            let mut guard = db
                .lock()
                .map_err(|_| StoreError::Task("pin store lock poisoned".to_string()))?;
            f(&mut guard)
        })
        .await
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T, StoreError>
where
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
}
