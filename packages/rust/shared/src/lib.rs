//! Shared types, error model, and configuration for ExpoFinder.
//!
//! This crate is the foundation depended on by all other ExpoFinder crates.
//! It provides:
//! - [`ExpoFinderError`], the unified error type
//! - Domain types ([`Venue`], [`ScrapingSource`], [`Exhibition`], [`ScrapeLog`])
//! - Configuration ([`AppConfig`] and config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CategoryQuery, CooldownConfig, DatabaseConfig, FetchConfig, GeocodingConfig,
    LlmConfig, PacingConfig, PlacesConfig, config_dir, config_file_path, expand_home,
    init_config, load_config, load_config_from,
};
pub use error::{ExpoFinderError, Result};
pub use types::{
    CityStatus, Exhibition, ExhibitionRecord, LogEntry, NewVenue, ScrapeLog, ScrapeStatus,
    ScrapingSource, SourceSummary, SourceTarget, SourceType, Venue, VenueSummary, VenueUpsert,
    format_timestamp, new_id, normalize_date,
};
