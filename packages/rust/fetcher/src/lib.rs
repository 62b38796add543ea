//! Venue website retrieval and HTML sanitizing.
//!
//! This crate provides:
//! - [`Fetcher`], a single-GET HTTP client with an explicit timeout
//! - [`sanitize_html`], which reduces a page to its main content markup

pub mod client;
pub mod sanitize;

pub use client::Fetcher;
pub use sanitize::sanitize_html;
