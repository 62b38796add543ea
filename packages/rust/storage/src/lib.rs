//! libSQL persistence gateway for ExpoFinder (embedded, offline mode).
//!
//! The [`Storage`] struct wraps a libSQL database holding venues, scraping
//! sources, exhibitions, and the append-only scraping log. It is opened
//! explicitly with [`Storage::open`] and shared behind an `Arc`.
//!
//! **Write rules:**
//! - `upsert_venue` never updates an existing row; website match wins over name match.
//! - `replace_exhibitions` deletes and inserts inside one transaction and is
//!   serialized per venue, so readers never observe a half-replaced set.

mod migrations;
mod seed;

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use expofinder_shared::{
    CityStatus, Exhibition, ExhibitionRecord, ExpoFinderError, LogEntry, NewVenue, Result,
    ScrapeLog, ScrapeStatus, ScrapingSource, SourceSummary, SourceTarget, SourceType, Venue,
    VenueSummary, VenueUpsert, format_timestamp, new_id, normalize_date,
};
use libsql::{Connection, Database, TransactionBehavior, params};

/// Default number of rows returned by [`Storage::list_recent_logs`].
pub const DEFAULT_LOG_LIMIT: u32 = 100;

/// Window used for the failure count in [`Storage::city_status`].
const FAILURE_WINDOW_DAYS: i64 = 7;

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    db: Database,
    conn: Connection,
    venue_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl Storage {
    /// Open or create a database at `path` and apply pending migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ExpoFinderError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;

        let conn = db.connect().map_err(storage_err)?;
        set_busy_timeout(&conn).await?;

        let storage = Self {
            db,
            conn,
            venue_locks: Mutex::new(HashMap::new()),
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        ExpoFinderError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// The async lock guarding exhibition writes for one venue.
    fn venue_lock(&self, venue_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .venue_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks
            .entry(venue_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    // -----------------------------------------------------------------------
    // Venue operations
    // -----------------------------------------------------------------------

    /// Return the existing venue matching `venue` or create it.
    ///
    /// A non-blank website URL is checked first, then the exact name.
    pub async fn upsert_venue(&self, venue: &NewVenue) -> Result<VenueUpsert> {
        let website = venue
            .website_url
            .as_deref()
            .map(str::trim)
            .filter(|w| !w.is_empty());

        if let Some(website) = website {
            if let Some(id) = self
                .query_id("SELECT id FROM venues WHERE website_url = ?1 LIMIT 1", website)
                .await?
            {
                tracing::debug!(venue = %venue.name, id = %id, "venue matched by website");
                return Ok(VenueUpsert { id, created: false });
            }
        }

        if let Some(id) = self
            .query_id("SELECT id FROM venues WHERE name = ?1 LIMIT 1", &venue.name)
            .await?
        {
            tracing::debug!(venue = %venue.name, id = %id, "venue matched by name");
            return Ok(VenueUpsert { id, created: false });
        }

        let id = new_id();
        let now = format_timestamp(Utc::now());
        self.conn
            .execute(
                "INSERT INTO venues (id, name, city, country, address, latitude, longitude, website_url, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    id.as_str(),
                    venue.name.as_str(),
                    venue.city.as_str(),
                    venue.country.as_str(),
                    venue.address.as_deref(),
                    venue.latitude,
                    venue.longitude,
                    website,
                    now.as_str(),
                ],
            )
            .await
            .map_err(storage_err)?;

        tracing::info!(venue = %venue.name, city = %venue.city, id = %id, "venue created");
        Ok(VenueUpsert { id, created: true })
    }

    /// Get a venue by ID.
    pub async fn get_venue(&self, id: &str) -> Result<Option<Venue>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, name, city, country, address, latitude, longitude, website_url, created_at
                 FROM venues WHERE id = ?1",
                params![id],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(Some(row_to_venue(&row)?)),
            None => Ok(None),
        }
    }

    /// List all venues with exhibition and source counts, ordered by city then name.
    pub async fn list_venues(&self) -> Result<Vec<VenueSummary>> {
        let mut rows = self
            .conn
            .query(
                "SELECT v.id, v.name, v.city, v.country, v.address, v.latitude, v.longitude,
                        v.website_url, v.created_at,
                        (SELECT COUNT(*) FROM exhibitions e WHERE e.venue_id = v.id),
                        (SELECT COUNT(*) FROM scraping_sources s WHERE s.venue_id = v.id),
                        (SELECT MAX(s.last_scraped_at) FROM scraping_sources s WHERE s.venue_id = v.id)
                 FROM venues v
                 ORDER BY v.city, v.name",
                params![],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            results.push(VenueSummary {
                venue: row_to_venue(&row)?,
                exhibition_count: col_count(&row, 9)?,
                source_count: col_count(&row, 10)?,
                last_scraped_at: col_opt_ts(&row, 11)?,
            });
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Scraping source operations
    // -----------------------------------------------------------------------

    /// Return the venue's existing source, or create a website source for `url`.
    pub async fn ensure_source(&self, venue_id: &str, url: &str) -> Result<String> {
        if let Some(id) = self
            .query_id(
                "SELECT id FROM scraping_sources WHERE venue_id = ?1 ORDER BY created_at LIMIT 1",
                venue_id,
            )
            .await?
        {
            return Ok(id);
        }

        let id = new_id();
        let now = format_timestamp(Utc::now());
        self.conn
            .execute(
                "INSERT INTO scraping_sources (id, venue_id, source_url, source_type, is_active, created_at)
                 VALUES (?1, ?2, ?3, ?4, 1, ?5)",
                params![
                    id.as_str(),
                    venue_id,
                    url,
                    SourceType::Website.as_str(),
                    now.as_str()
                ],
            )
            .await
            .map_err(storage_err)?;

        tracing::debug!(venue_id, source_id = %id, url, "source created");
        Ok(id)
    }

    /// Set a source's `last_scraped_at` to now.
    pub async fn touch_source(&self, source_id: &str) -> Result<()> {
        self.touch_source_at(source_id, Utc::now()).await
    }

    /// Set a source's `last_scraped_at` to `at`.
    pub async fn touch_source_at(&self, source_id: &str, at: DateTime<Utc>) -> Result<()> {
        let ts = format_timestamp(at);
        let changed = self
            .conn
            .execute(
                "UPDATE scraping_sources SET last_scraped_at = ?1 WHERE id = ?2",
                params![ts.as_str(), source_id],
            )
            .await
            .map_err(storage_err)?;
        if changed == 0 {
            return Err(ExpoFinderError::not_found("source", source_id));
        }
        Ok(())
    }

    /// Enable or disable a source for batch indexing.
    pub async fn set_source_active(&self, source_id: &str, active: bool) -> Result<()> {
        let changed = self
            .conn
            .execute(
                "UPDATE scraping_sources SET is_active = ?1 WHERE id = ?2",
                params![i64::from(active), source_id],
            )
            .await
            .map_err(storage_err)?;
        if changed == 0 {
            return Err(ExpoFinderError::not_found("source", source_id));
        }
        Ok(())
    }

    /// Look up one source joined with its venue.
    pub async fn get_source_target(&self, source_id: &str) -> Result<Option<SourceTarget>> {
        let mut rows = self
            .conn
            .query(
                "SELECT s.id, s.source_url, v.id, v.name
                 FROM scraping_sources s JOIN venues v ON v.id = s.venue_id
                 WHERE s.id = ?1",
                params![source_id],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(Some(row_to_target(&row)?)),
            None => Ok(None),
        }
    }

    /// All active sources with their venues, ordered by venue name.
    pub async fn list_active_sources(&self) -> Result<Vec<SourceTarget>> {
        let mut rows = self
            .conn
            .query(
                "SELECT s.id, s.source_url, v.id, v.name
                 FROM scraping_sources s JOIN venues v ON v.id = s.venue_id
                 WHERE s.is_active = 1
                 ORDER BY v.name, s.created_at",
                params![],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            results.push(row_to_target(&row)?);
        }
        Ok(results)
    }

    /// All sources with venue context, log count and most recent status.
    pub async fn list_sources(&self) -> Result<Vec<SourceSummary>> {
        let mut rows = self
            .conn
            .query(
                "SELECT s.id, s.venue_id, s.source_url, s.source_type, s.is_active,
                        s.last_scraped_at, s.created_at, v.name, v.city,
                        (SELECT COUNT(*) FROM scraping_logs l WHERE l.source_id = s.id),
                        (SELECT l.status FROM scraping_logs l WHERE l.source_id = s.id
                         ORDER BY l.scraped_at DESC, l.id DESC LIMIT 1)
                 FROM scraping_sources s JOIN venues v ON v.id = s.venue_id
                 ORDER BY v.name, s.created_at",
                params![],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            let last_status = match row.get::<String>(10).ok() {
                Some(s) => Some(s.parse::<ScrapeStatus>()?),
                None => None,
            };
            results.push(SourceSummary {
                source: row_to_source(&row)?,
                venue_name: col_str(&row, 7)?,
                city: col_str(&row, 8)?,
                log_count: col_count(&row, 9)?,
                last_status,
            });
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Exhibition operations
    // -----------------------------------------------------------------------

    /// Replace all exhibitions of a venue with `records`. Returns the number saved.
    ///
    /// Records with a blank title are skipped. Dates that are not `YYYY-MM-DD`
    /// are stored as null, and a missing exhibition URL falls back to `fallback_url`.
    #[tracing::instrument(skip_all, fields(venue_id = %venue_id, records = records.len()))]
    pub async fn replace_exhibitions(
        &self,
        venue_id: &str,
        records: &[ExhibitionRecord],
        fallback_url: &str,
    ) -> Result<usize> {
        let lock = self.venue_lock(venue_id);
        let _guard = lock.lock().await;

        // Each replacement gets its own connection so concurrent venues do
        // not share one transaction.
        let conn = self.db.connect().map_err(storage_err)?;
        set_busy_timeout(&conn).await?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .await
            .map_err(storage_err)?;

        tx.execute(
            "DELETE FROM exhibitions WHERE venue_id = ?1",
            params![venue_id],
        )
        .await
        .map_err(storage_err)?;

        let now = format_timestamp(Utc::now());
        let mut saved = 0;
        for record in records {
            let title = record.title.trim();
            if title.is_empty() {
                continue;
            }
            let exhibition_url = record
                .exhibition_url
                .as_deref()
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .unwrap_or(fallback_url);
            let id = new_id();

            tx.execute(
                "INSERT INTO exhibitions (id, venue_id, title, artist, description, start_date,
                                          end_date, image_url, exhibition_url, last_scraped_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    id.as_str(),
                    venue_id,
                    title,
                    record.artist.as_deref(),
                    record.description.as_deref(),
                    normalize_date(record.start_date.as_deref()),
                    normalize_date(record.end_date.as_deref()),
                    record.image_url.as_deref(),
                    exhibition_url,
                    now.as_str(),
                ],
            )
            .await
            .map_err(storage_err)?;
            saved += 1;
        }

        tx.commit().await.map_err(storage_err)?;
        tracing::debug!(saved, "exhibitions replaced");
        Ok(saved)
    }

    /// A venue's exhibitions, ordered by start date then title.
    pub async fn list_exhibitions(&self, venue_id: &str) -> Result<Vec<Exhibition>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, venue_id, title, artist, description, start_date, end_date,
                        image_url, exhibition_url, last_scraped_at
                 FROM exhibitions WHERE venue_id = ?1
                 ORDER BY start_date IS NULL, start_date, title",
                params![venue_id],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            results.push(Exhibition {
                id: col_str(&row, 0)?,
                venue_id: col_str(&row, 1)?,
                title: col_str(&row, 2)?,
                artist: row.get::<String>(3).ok(),
                description: row.get::<String>(4).ok(),
                start_date: row.get::<String>(5).ok(),
                end_date: row.get::<String>(6).ok(),
                image_url: row.get::<String>(7).ok(),
                exhibition_url: col_str(&row, 8)?,
                last_scraped_at: col_ts(&row, 9)?,
            });
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Scraping log operations
    // -----------------------------------------------------------------------

    /// Append a log row for one indexing attempt. Returns the log ID.
    pub async fn append_log(
        &self,
        source_id: &str,
        status: ScrapeStatus,
        exhibitions_found: usize,
        error_message: Option<&str>,
    ) -> Result<String> {
        let id = new_id();
        let now = format_timestamp(Utc::now());
        self.conn
            .execute(
                "INSERT INTO scraping_logs (id, source_id, status, exhibitions_found, error_message, scraped_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    id.as_str(),
                    source_id,
                    status.as_str(),
                    exhibitions_found as i64,
                    error_message,
                    now.as_str(),
                ],
            )
            .await
            .map_err(storage_err)?;
        Ok(id)
    }

    /// Most recent log rows across all sources, newest first.
    pub async fn list_recent_logs(&self, limit: u32) -> Result<Vec<LogEntry>> {
        let mut rows = self
            .conn
            .query(
                "SELECT l.id, l.source_id, l.status, l.exhibitions_found, l.error_message,
                        l.scraped_at, s.source_url, v.name
                 FROM scraping_logs l
                 JOIN scraping_sources s ON s.id = l.source_id
                 JOIN venues v ON v.id = s.venue_id
                 ORDER BY l.scraped_at DESC, l.id DESC
                 LIMIT ?1",
                params![i64::from(limit)],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            results.push(LogEntry {
                log: row_to_log(&row)?,
                source_url: col_str(&row, 6)?,
                venue_name: col_str(&row, 7)?,
            });
        }
        Ok(results)
    }

    /// All log rows of one source, oldest first.
    pub async fn logs_for_source(&self, source_id: &str) -> Result<Vec<ScrapeLog>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, source_id, status, exhibitions_found, error_message, scraped_at
                 FROM scraping_logs WHERE source_id = ?1
                 ORDER BY scraped_at, id",
                params![source_id],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            results.push(row_to_log(&row)?);
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // City operations
    // -----------------------------------------------------------------------

    /// Most recent `last_scraped_at` over the city's sources (case-insensitive).
    pub async fn city_last_indexed(&self, city: &str) -> Result<Option<DateTime<Utc>>> {
        let mut rows = self
            .conn
            .query(
                "SELECT MAX(s.last_scraped_at)
                 FROM scraping_sources s JOIN venues v ON v.id = s.venue_id
                 WHERE LOWER(v.city) = LOWER(?1)",
                params![city.trim()],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => col_opt_ts(&row, 0),
            None => Ok(None),
        }
    }

    /// Per-city overview: venue count, last index time, failures in the last 7 days.
    pub async fn city_status(&self, now: DateTime<Utc>) -> Result<Vec<CityStatus>> {
        let since = format_timestamp(now - Duration::days(FAILURE_WINDOW_DAYS));
        let mut rows = self
            .conn
            .query(
                "SELECT MIN(v.city),
                        COUNT(DISTINCT v.id),
                        MAX(s.last_scraped_at),
                        (SELECT COUNT(*) FROM scraping_logs l
                         JOIN scraping_sources s2 ON s2.id = l.source_id
                         JOIN venues v2 ON v2.id = s2.venue_id
                         WHERE LOWER(v2.city) = LOWER(v.city)
                           AND l.status = 'failed' AND l.scraped_at >= ?1)
                 FROM venues v LEFT JOIN scraping_sources s ON s.venue_id = v.id
                 GROUP BY LOWER(v.city)
                 ORDER BY LOWER(v.city)",
                params![since.as_str()],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            results.push(CityStatus {
                city: col_str(&row, 0)?,
                venue_count: col_count(&row, 1)?,
                last_indexed: col_opt_ts(&row, 2)?,
                recent_failures: col_count(&row, 3)?,
            });
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Seed data
    // -----------------------------------------------------------------------

    /// Insert the starter Antwerp venues, each with a website source.
    /// Returns the number of venues created; existing ones are left alone.
    pub async fn seed_initial_venues(&self) -> Result<usize> {
        let mut created = 0;
        for venue in seed::initial_venues() {
            let upsert = self.upsert_venue(&venue).await?;
            if let Some(website) = venue.website_url.as_deref() {
                self.ensure_source(&upsert.id, website).await?;
            }
            if upsert.created {
                created += 1;
            }
        }
        tracing::info!(created, "seeded initial venues");
        Ok(created)
    }

    /// Run a single-parameter query that selects one ID column.
    async fn query_id(&self, sql: &str, param: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query(sql, params![param])
            .await
            .map_err(storage_err)?;
        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(Some(col_str(&row, 0)?)),
            None => Ok(None),
        }
    }
}

fn storage_err(e: libsql::Error) -> ExpoFinderError {
    ExpoFinderError::Storage(e.to_string())
}

async fn set_busy_timeout(conn: &Connection) -> Result<()> {
    // PRAGMA busy_timeout returns a row, so it goes through `query`.
    let mut rows = conn
        .query("PRAGMA busy_timeout = 5000", params![])
        .await
        .map_err(storage_err)?;
    rows.next().await.map_err(storage_err)?;
    Ok(())
}

fn col_str(row: &libsql::Row, idx: i32) -> Result<String> {
    row.get::<String>(idx).map_err(storage_err)
}

fn col_count(row: &libsql::Row, idx: i32) -> Result<u64> {
    row.get::<i64>(idx)
        .map(|v| v.max(0) as u64)
        .map_err(storage_err)
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ExpoFinderError::Storage(format!("invalid timestamp {s:?}: {e}")))
}

fn col_ts(row: &libsql::Row, idx: i32) -> Result<DateTime<Utc>> {
    parse_ts(&col_str(row, idx)?)
}

fn col_opt_ts(row: &libsql::Row, idx: i32) -> Result<Option<DateTime<Utc>>> {
    row.get::<String>(idx).ok().as_deref().map(parse_ts).transpose()
}

/// Convert a row starting with the nine venue columns to a [`Venue`].
fn row_to_venue(row: &libsql::Row) -> Result<Venue> {
    Ok(Venue {
        id: col_str(row, 0)?,
        name: col_str(row, 1)?,
        city: col_str(row, 2)?,
        country: col_str(row, 3)?,
        address: row.get::<String>(4).ok(),
        latitude: row.get::<f64>(5).ok(),
        longitude: row.get::<f64>(6).ok(),
        website_url: row.get::<String>(7).ok(),
        created_at: col_ts(row, 8)?,
    })
}

fn row_to_source(row: &libsql::Row) -> Result<ScrapingSource> {
    Ok(ScrapingSource {
        id: col_str(row, 0)?,
        venue_id: col_str(row, 1)?,
        source_url: col_str(row, 2)?,
        source_type: col_str(row, 3)?.parse()?,
        is_active: row.get::<i64>(4).map_err(storage_err)? != 0,
        last_scraped_at: col_opt_ts(row, 5)?,
        created_at: col_ts(row, 6)?,
    })
}

fn row_to_target(row: &libsql::Row) -> Result<SourceTarget> {
    Ok(SourceTarget {
        source_id: col_str(row, 0)?,
        source_url: col_str(row, 1)?,
        venue_id: col_str(row, 2)?,
        venue_name: col_str(row, 3)?,
    })
}

fn row_to_log(row: &libsql::Row) -> Result<ScrapeLog> {
    Ok(ScrapeLog {
        id: col_str(row, 0)?,
        source_id: col_str(row, 1)?,
        status: col_str(row, 2)?.parse()?,
        exhibitions_found: col_count(row, 3)?,
        error_message: row.get::<String>(4).ok(),
        scraped_at: col_ts(row, 5)?,
    })
}
