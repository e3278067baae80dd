//! Position lookup used when a pin is captured.
//!
//! A lookup never fails and never takes longer than its timeout: any
//! error, panic or timeout in the source yields `None`, and the caller
//! falls back to the map centre.

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Upper bound on how long capture waits for a position.
pub const LOCATION_TIMEOUT: Duration = Duration::from_secs(8);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub lat: f64,
    pub lng: f64,
}

impl Position {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lng.is_finite()
    }
}

/// Something that can report where the user is. May block.
pub trait PositionSource: Send + Sync + 'static {
    fn locate(&self) -> Option<Position>;
}

/// Resolve a position from `source`, giving up after `timeout`.
pub async fn current_position(source: Arc<dyn PositionSource>, timeout: Duration) -> Option<Position> {
    let lookup = tokio::task::spawn_blocking(move || source.locate());
    match tokio::time::timeout(timeout, lookup).await {
        Ok(Ok(Some(pos))) if pos.is_finite() => Some(pos),
        Ok(Ok(Some(pos))) => {
            debug!(?pos, "Position source returned non-finite coordinates");
            None
        }
        Ok(Ok(None)) => None,
        Ok(Err(e)) => {
            debug!(error = %e, "Position source failed");
            None
        }
        Err(_) => {
            debug!(?timeout, "Position lookup timed out");
            None
        }
    }
}

/// A position known up front, e.g. given on the command line.
pub struct FixedPosition(pub Position);

impl PositionSource for FixedPosition {
    fn locate(&self) -> Option<Position> {
        Some(self.0)
    }
}

/// Reads the GPS position a camera wrote into the photo's EXIF block.
pub struct ExifPosition {
    path: PathBuf,
}

impl ExifPosition {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl PositionSource for ExifPosition {
    fn locate(&self) -> Option<Position> {
        let file = File::open(&self.path).ok()?;
        let mut reader = BufReader::new(file);
        let exif = exif::Reader::new().read_from_container(&mut reader).ok()?;
        gps_position(&exif)
    }
}

fn gps_position(exif: &exif::Exif) -> Option<Position> {
    let lat_field = exif.get_field(exif::Tag::GPSLatitude, exif::In::PRIMARY)?;
    let lat_ref = exif.get_field(exif::Tag::GPSLatitudeRef, exif::In::PRIMARY)?;
    let lon_field = exif.get_field(exif::Tag::GPSLongitude, exif::In::PRIMARY)?;
    let lon_ref = exif.get_field(exif::Tag::GPSLongitudeRef, exif::In::PRIMARY)?;

    let lat = rational_dms(&lat_field.value)?;
    let lon = rational_dms(&lon_field.value)?;

    let lat_ref = lat_ref.display_value().to_string();
    let lon_ref = lon_ref.display_value().to_string();

    Some(Position {
        lat: if lat_ref.contains('S') { -lat } else { lat },
        lng: if lon_ref.contains('W') { -lon } else { lon },
    })
}

fn rational_dms(value: &exif::Value) -> Option<f64> {
    match value {
        exif::Value::Rational(v) if v.len() >= 3 => Some(dms_to_decimal(
            v[0].to_f64(),
            v[1].to_f64(),
            v[2].to_f64(),
        )),
        _ => None,
    }
}

fn dms_to_decimal(degrees: f64, minutes: f64, seconds: f64) -> f64 {
    degrees + minutes / 60.0 + seconds / 3600.0
}
