//! Pin record types.

use chrono::{SecondsFormat, Utc};

use super::StoreError;

/// One recorded photo observation as held by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Pin {
    pub id: i64,
    pub lat: f64,
    pub lng: f64,
    pub created_at: String,
    pub image: Vec<u8>,
}

/// A pin that has not been stored yet. The store assigns the id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPin {
    pub lat: f64,
    pub lng: f64,
    pub created_at: String,
    pub image: Vec<u8>,
}

impl NewPin {
    /// Capture a pin now.
    pub fn new(lat: f64, lng: f64, image: Vec<u8>) -> Self {
        Self::with_created_at(lat, lng, timestamp_now(), image)
    }

    pub fn with_created_at(lat: f64, lng: f64, created_at: impl Into<String>, image: Vec<u8>) -> Self {
        Self {
            lat,
            lng,
            created_at: created_at.into(),
            image,
        }
    }

    pub(crate) fn validate(&self) -> Result<(), StoreError> {
        if !self.lat.is_finite() || !self.lng.is_finite() {
            return Err(StoreError::InvalidPin(format!(
                "coordinates must be finite (lat={}, lng={})",
                self.lat, self.lng
            )));
        }
        if self.created_at.trim().is_empty() {
            return Err(StoreError::InvalidPin("createdAt is empty".to_string()));
        }
        Ok(())
    }

    pub(crate) fn into_pin(self, id: i64) -> Pin {
        Pin {
            id,
            lat: self.lat,
            lng: self.lng,
            created_at: self.created_at,
            image: self.image,
        }
    }
}

/// Current instant as ISO-8601 UTC with millisecond precision, e.g. `2024-05-01T09:30:00.123Z`.
pub fn timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
