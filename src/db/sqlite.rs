//! SQLite backend for the pin store.

use rusqlite::{params, Connection};
use std::path::Path;
use tracing::{debug, info};

use super::pins::{NewPin, Pin};
use super::schema::{MIGRATIONS, SCHEMA_VERSION};
use super::StoreError;

const PIN_COLUMNS: &str = "id, lat, lng, created_at, image";

pub struct SqliteDb {
    pub(crate) conn: Connection,
}

impl SqliteDb {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::unavailable("cannot create store directory", e))?;
            }
        }
        let conn = Connection::open(path)
            .map_err(|e| StoreError::unavailable("cannot open store", e))?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StoreError::unavailable("cannot open in-memory store", e))?;
        Ok(Self { conn })
    }

    /// Apply pragmas and bring the schema up to `SCHEMA_VERSION`.
    pub fn initialize(&mut self) -> Result<(), StoreError> {
        // In-memory databases answer "memory" here; that is fine.
        let mode: String = self
            .conn
            .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
            .map_err(|e| StoreError::unavailable("cannot set journal mode", e))?;
        debug!(journal_mode = %mode, "Pin store journal mode");

        // Commits are not reported before they reach the disk.
        self.conn
            .pragma_update(None, "synchronous", "FULL")
            .map_err(|e| StoreError::unavailable("cannot set synchronous mode", e))?;

        let found = self.schema_version()?;
        if found > SCHEMA_VERSION {
            return Err(StoreError::UpgradeBlocked {
                found,
                supported: SCHEMA_VERSION,
            });
        }

        self.run_migrations(found)
    }

    fn run_migrations(&mut self, from: i64) -> Result<(), StoreError> {
        for (version, sql) in MIGRATIONS.iter().filter(|(v, _)| *v > from) {
            let tx = self
                .conn
                .transaction()
                .map_err(|e| StoreError::unavailable("cannot begin migration", e))?;
            tx.execute_batch(sql)
                .map_err(|e| StoreError::unavailable("migration failed", e))?;
            tx.pragma_update(None, "user_version", version)
                .map_err(|e| StoreError::unavailable("cannot stamp schema version", e))?;
            tx.commit()
                .map_err(|e| StoreError::unavailable("cannot commit migration", e))?;
            info!(version, "Applied pin store migration");
        }
        Ok(())
    }

    pub fn schema_version(&self) -> Result<i64, StoreError> {
        self.conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .map_err(|e| StoreError::unavailable("cannot read schema version", e))
    }

    // ========================================================================
    // Pin operations
    // ========================================================================

    pub fn insert_pin(&mut self, pin: &NewPin) -> Result<i64, StoreError> {
        pin.validate()?;

        let tx = self.conn.transaction().map_err(StoreError::Write)?;
        tx.execute(
            "INSERT INTO pins (lat, lng, created_at, image) VALUES (?1, ?2, ?3, ?4)",
            params![pin.lat, pin.lng, pin.created_at, pin.image],
        )
        .map_err(StoreError::Write)?;
        let id = tx.last_insert_rowid();
        tx.commit().map_err(StoreError::Write)?;

        Ok(id)
    }

    pub fn get_all_pins(&self) -> Result<Vec<Pin>, StoreError> {
        self.query_pins(&format!("SELECT {} FROM pins ORDER BY id", PIN_COLUMNS))
    }

    pub fn get_pins_by_created_at(&self) -> Result<Vec<Pin>, StoreError> {
        self.query_pins(&format!(
            "SELECT {} FROM pins ORDER BY created_at, id",
            PIN_COLUMNS
        ))
    }

    pub fn get_pin(&self, id: i64) -> Result<Option<Pin>, StoreError> {
        let result = self.conn.query_row(
            &format!("SELECT {} FROM pins WHERE id = ?", PIN_COLUMNS),
            [id],
            row_to_pin,
        );
        match result {
            Ok(pin) => Ok(Some(pin)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StoreError::Read(e)),
        }
    }

    pub fn count_pins(&self) -> Result<usize, StoreError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM pins", [], |row| row.get(0))
            .map_err(StoreError::Read)?;
        Ok(count as usize)
    }

    /// Delete a pin. Returns whether a row was removed; a missing id is not an error.
    pub fn delete_pin(&mut self, id: i64) -> Result<bool, StoreError> {
        let tx = self.conn.transaction().map_err(StoreError::Write)?;
        let removed = tx
            .execute("DELETE FROM pins WHERE id = ?", [id])
            .map_err(StoreError::Write)?;
        tx.commit().map_err(StoreError::Write)?;
        Ok(removed > 0)
    }

    fn query_pins(&self, sql: &str) -> Result<Vec<Pin>, StoreError> {
        let mut stmt = self.conn.prepare(sql).map_err(StoreError::Read)?;
        let pins = stmt
            .query_map([], row_to_pin)
            .map_err(StoreError::Read)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(StoreError::Read)?;
        Ok(pins)
    }
}

fn row_to_pin(row: &rusqlite::Row) -> rusqlite::Result<Pin> {
    Ok(Pin {
        id: row.get(0)?,
        lat: row.get(1)?,
        lng: row.get(2)?,
        created_at: row.get(3)?,
        image: row.get(4)?,
    })
}
