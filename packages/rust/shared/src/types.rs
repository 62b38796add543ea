//! Core domain types for the ExpoFinder index.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generate a new time-sortable record identifier (UUID v7).
pub fn new_id() -> String {
    Uuid::now_v7().to_string()
}

/// Render a timestamp in the fixed-width form stored in the database.
///
/// Fixed microsecond precision keeps lexical and chronological order equal.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Accept only `YYYY-MM-DD` calendar dates; anything else becomes `None`.
pub fn normalize_date(raw: Option<&str>) -> Option<String> {
    let raw = raw?.trim();
    if raw.len() != 10 {
        return None;
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .map(|d| d.format("%Y-%m-%d").to_string())
}

// ---------------------------------------------------------------------------
// Venues
// ---------------------------------------------------------------------------

/// A museum or gallery that hosts exhibitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Venue {
    pub id: String,
    pub name: String,
    pub city: String,
    pub country: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Attributes for creating a venue.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewVenue {
    pub name: String,
    pub city: String,
    pub country: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub website_url: Option<String>,
}

/// Result of an idempotent venue upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VenueUpsert {
    pub id: String,
    /// `false` when an existing venue matched by website or name.
    pub created: bool,
}

/// Venue listing row with aggregate counts.
#[derive(Debug, Clone, Serialize)]
pub struct VenueSummary {
    #[serde(flatten)]
    pub venue: Venue,
    pub exhibition_count: u64,
    pub source_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_scraped_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Scraping sources
// ---------------------------------------------------------------------------

/// Kind of scraping source. Only websites are indexed today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Website,
}

impl SourceType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Website => "website",
        }
    }
}

impl std::str::FromStr for SourceType {
    type Err = crate::ExpoFinderError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "website" => Ok(Self::Website),
            other => Err(crate::ExpoFinderError::validation(format!(
                "unknown source type: {other}"
            ))),
        }
    }
}

/// A URL from which a venue's exhibitions are extracted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapingSource {
    pub id: String,
    pub venue_id: String,
    pub source_url: String,
    pub source_type: SourceType,
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_scraped_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// The unit of work for the indexer: a source joined with its venue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceTarget {
    pub source_id: String,
    pub source_url: String,
    pub venue_id: String,
    pub venue_name: String,
}

/// Source listing row with venue context and log statistics.
#[derive(Debug, Clone, Serialize)]
pub struct SourceSummary {
    #[serde(flatten)]
    pub source: ScrapingSource,
    pub venue_name: String,
    pub city: String,
    pub log_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_status: Option<ScrapeStatus>,
}

// ---------------------------------------------------------------------------
// Exhibitions
// ---------------------------------------------------------------------------

/// A persisted exhibition belonging to a venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exhibition {
    pub id: String,
    pub venue_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub exhibition_url: String,
    pub last_scraped_at: DateTime<Utc>,
}

/// One exhibition as returned by the extractor, before persistence.
///
/// Every field except `title` may be missing or null in the model output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExhibitionRecord {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub exhibition_url: Option<String>,
}

// ---------------------------------------------------------------------------
// Scrape logs
// ---------------------------------------------------------------------------

/// Outcome recorded for one indexing attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrapeStatus {
    Success,
    Failed,
}

impl ScrapeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ScrapeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ScrapeStatus {
    type Err = crate::ExpoFinderError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            other => Err(crate::ExpoFinderError::validation(format!(
                "unknown scrape status: {other}"
            ))),
        }
    }
}

/// Append-only record of one indexing attempt for a source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapeLog {
    pub id: String,
    pub source_id: String,
    pub status: ScrapeStatus,
    pub exhibitions_found: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub scraped_at: DateTime<Utc>,
}

/// A log row joined with its source URL and venue name.
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    #[serde(flatten)]
    pub log: ScrapeLog,
    pub source_url: String,
    pub venue_name: String,
}

/// Per-city indexing overview.
#[derive(Debug, Clone, Serialize)]
pub struct CityStatus {
    pub city: String,
    pub venue_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_indexed: Option<DateTime<Utc>>,
    /// Failed log rows in the trailing 7 days.
    pub recent_failures: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn new_ids_sort_by_creation() {
        let a = new_id();
        let b = new_id();
        assert_ne!(a, b);
        assert!(Uuid::parse_str(&a).is_ok());
    }

    #[test]
    fn timestamps_have_fixed_width() {
        let whole = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let later = whole + chrono::Duration::microseconds(1500);
        let a = format_timestamp(whole);
        let b = format_timestamp(later);
        assert_eq!(a, "2025-03-01T12:00:00.000000Z");
        assert_eq!(a.len(), b.len());
        assert!(a < b);
    }

    #[test]
    fn dates_outside_iso_format_are_dropped() {
        assert_eq!(
            normalize_date(Some("2025-06-30")),
            Some("2025-06-30".to_string())
        );
        assert_eq!(normalize_date(Some(" 2025-01-05 ")), Some("2025-01-05".into()));
        assert_eq!(normalize_date(Some("30/06/2025")), None);
        assert_eq!(normalize_date(Some("2025-02-30")), None);
        assert_eq!(normalize_date(Some("2025-6-3")), None);
        assert_eq!(normalize_date(Some("until further notice")), None);
        assert_eq!(normalize_date(None), None);
    }

    #[test]
    fn exhibition_record_tolerates_missing_fields() {
        let json = r#"{"title": "Ensor", "start_date": null}"#;
        let record: ExhibitionRecord = serde_json::from_str(json).expect("deserialize");
        assert_eq!(record.title, "Ensor");
        assert!(record.artist.is_none());
        assert!(record.exhibition_url.is_none());
    }

    #[test]
    fn status_strings_roundtrip() {
        assert_eq!(ScrapeStatus::Failed.as_str(), "failed");
        assert_eq!("success".parse::<ScrapeStatus>().unwrap(), ScrapeStatus::Success);
        assert!("pending".parse::<ScrapeStatus>().is_err());
        assert_eq!("website".parse::<SourceType>().unwrap(), SourceType::Website);
    }

    #[test]
    fn scrape_status_serializes_lowercase() {
        let json = serde_json::to_string(&ScrapeStatus::Success).expect("serialize");
        assert_eq!(json, "\"success\"");
    }
}
