//! Export pins to a portable JSON document and import them back.
//!
//! The document is a bare JSON array, one object per pin:
//!
//! ```json
//! [
//!   {
//!     "lat": 35.681236,
//!     "lng": 139.767125,
//!     "createdAt": "2024-05-01T09:30:00.123Z",
//!     "imageData": "data:image/jpeg;base64,/9j/4AAQ..."
//!   }
//! ]
//! ```
//!
//! Store ids are not exported; they only mean something to the store that
//! assigned them. There is no envelope and no format version.

use serde::Serialize;
use serde_json::Value;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::codec::{self, DecodeError};
use crate::db::{timestamp_now, NewPin, Pin, PinStore, StoreError};

/// Prefix of exported file names.
pub const EXPORT_FILE_PREFIX: &str = "walk_app_export_";

/// Key holding the encoded image. `image` is accepted on import as well.
const IMAGE_KEY: &str = "imageData";
const IMAGE_KEY_ALIAS: &str = "image";

#[derive(Error, Debug)]
pub enum ExportError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Failed to write export file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize export: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum ImportError {
    /// The file is not JSON, or its top level is not an array. Nothing was imported.
    #[error("The selected file is not a valid pin export: {0}")]
    Format(String),

    #[error("Failed to read import file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The store rejected an insert. Entries before it stay imported.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Why a single import entry was skipped.
#[derive(Error, Debug)]
enum SkipReason {
    #[error("entry is not an object")]
    NotAnObject,

    #[error("{0} is not a finite number")]
    BadCoordinate(&'static str),

    #[error("image data is missing")]
    MissingImage,

    #[error("image data is malformed: {0}")]
    Decode(#[from] DecodeError),
}

/// One pin as it appears in an export document.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExportedPin {
    pub lat: f64,
    pub lng: f64,
    pub created_at: String,
    pub image_data: String,
}

impl From<&Pin> for ExportedPin {
    fn from(pin: &Pin) -> Self {
        Self {
            lat: pin.lat,
            lng: pin.lng,
            created_at: pin.created_at.clone(),
            image_data: codec::encode(&pin.image),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    pub path: PathBuf,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub imported: usize,
    pub skipped: usize,
    pub ids: Vec<i64>,
}

/// Every pin in the store, in store order, ready for serialization.
pub async fn export_pins(store: &PinStore) -> Result<Vec<ExportedPin>, ExportError> {
    let pins = store.list_all().await?;
    Ok(pins.iter().map(ExportedPin::from).collect())
}

/// The export document as pretty-printed JSON.
pub async fn export_json(store: &PinStore) -> Result<String, ExportError> {
    let pins = export_pins(store).await?;
    Ok(serde_json::to_string_pretty(&pins)?)
}

/// Write the export document into `dir` under a timestamped file name.
pub async fn export_to_dir(store: &PinStore, dir: &Path) -> Result<ExportSummary, ExportError> {
    let pins = export_pins(store).await?;
    let json = serde_json::to_string_pretty(&pins)?;

    fs::create_dir_all(dir).await.map_err(|source| ExportError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let (path, mut file) = create_export_file(dir, &timestamp_now())
        .await
        .map_err(|source| ExportError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

    let written = match file.write_all(json.as_bytes()).await {
        Ok(()) => file.sync_all().await,
        Err(e) => Err(e),
    };
    written.map_err(|source| ExportError::Io {
        path: path.clone(),
        source,
    })?;

    info!(count = pins.len(), "Exported pins to {:?}", path);
    Ok(ExportSummary {
        path,
        count: pins.len(),
    })
}

/// Create `walk_app_export_2024-05-01T09-30-00-123Z.json` in `dir`, adding a
/// numeric suffix if the name is taken.
async fn create_export_file(dir: &Path, timestamp: &str) -> std::io::Result<(PathBuf, File)> {
    let stamp = timestamp.replace([':', '.'], "-");
    let mut path = dir.join(format!("{}{}.json", EXPORT_FILE_PREFIX, stamp));
    let mut n = 1;
    loop {
        match OpenOptions::new().write(true).create_new(true).open(&path).await {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                path = dir.join(format!("{}{}-{}.json", EXPORT_FILE_PREFIX, stamp, n));
                n += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Import an export document read from `path`.
pub async fn import_file<C>(store: &PinStore, path: &Path, on_inserted: C) -> Result<ImportSummary, ImportError>
where
    C: FnMut(&Pin),
{
    let text = fs::read_to_string(path)
        .await
        .map_err(|source| ImportError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    import_json(store, &text, on_inserted).await
}

/// Import an export document.
///
/// Entries are inserted one at a time, in document order, and each new pin
/// is handed to `on_inserted` as soon as it is stored. Malformed entries are
/// skipped; a store failure stops the batch but keeps what was already
/// inserted. Existing pins are never touched.
pub async fn import_json<C>(store: &PinStore, text: &str, mut on_inserted: C) -> Result<ImportSummary, ImportError>
where
    C: FnMut(&Pin),
{
    let document: Value =
        serde_json::from_str(text).map_err(|e| ImportError::Format(e.to_string()))?;
    let Value::Array(entries) = document else {
        return Err(ImportError::Format("top-level value is not an array".to_string()));
    };

    let mut summary = ImportSummary::default();
    for (index, entry) in entries.iter().enumerate() {
        let pin = match entry_to_pin(entry) {
            Ok(pin) => pin,
            Err(reason) => {
                warn!(index, %reason, "Skipping import entry");
                summary.skipped += 1;
                continue;
            }
        };

        let id = store.insert(pin.clone()).await?;
        on_inserted(&pin.into_pin(id));
        summary.imported += 1;
        summary.ids.push(id);
    }

    info!(imported = summary.imported, skipped = summary.skipped, "Import finished");
    Ok(summary)
}

fn entry_to_pin(entry: &Value) -> Result<NewPin, SkipReason> {
    let object = entry.as_object().ok_or(SkipReason::NotAnObject)?;

    let lat = finite_number(object.get("lat")).ok_or(SkipReason::BadCoordinate("lat"))?;
    let lng = finite_number(object.get("lng")).ok_or(SkipReason::BadCoordinate("lng"))?;

    let image_text = object
        .get(IMAGE_KEY)
        .or_else(|| object.get(IMAGE_KEY_ALIAS))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or(SkipReason::MissingImage)?;
    let image = codec::decode(image_text)?;
    if let Ok(mime) = codec::mime_type(image_text) {
        debug!(%mime, bytes = image.len(), "Decoded image data");
    }

    let created_at = object
        .get("createdAt")
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
        .unwrap_or_else(timestamp_now);

    Ok(NewPin::with_created_at(lat, lng, created_at, image))
}

fn finite_number(value: Option<&Value>) -> Option<f64> {
    value.and_then(Value::as_f64).filter(|v| v.is_finite())
}
