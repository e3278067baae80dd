//! Local persistence, offline caching and export/import for geotagged photo pins.

pub mod cache;
pub mod codec;
pub mod config;
pub mod db;
pub mod export;
pub mod location;
pub mod logging;
