//! Indexing orchestration for ExpoFinder.
//!
//! This crate ties the fetcher, the extraction client, venue discovery and
//! storage together into the indexing workflows: all sources, one source,
//! or a whole city discovered through Places.

pub mod city;
pub mod cooldown;
pub mod geocode;
pub mod jobs;
pub mod pacing;
pub mod pipeline;

pub use city::{CitySummary, FailedVenue, IndexedVenue};
pub use geocode::PacedGeocoder;
pub use jobs::{IndexJob, JobStatus, spawn_index_all};
pub use pacing::{Pacer, Pacers};
pub use pipeline::{
    IndexOutcome, IndexStage, Indexer, ProgressReporter, SilentProgress, SingleIndexResult,
};
