//! SQL migration definitions for the ExpoFinder database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: venues, scraping_sources, exhibitions, scraping_logs",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version   INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS venues (
    id          TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    city        TEXT NOT NULL,
    country     TEXT NOT NULL,
    address     TEXT,
    latitude    REAL,
    longitude   REAL,
    website_url TEXT,
    created_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_venues_name ON venues(name);
CREATE INDEX IF NOT EXISTS idx_venues_website ON venues(website_url);
CREATE INDEX IF NOT EXISTS idx_venues_city ON venues(city COLLATE NOCASE);

CREATE TABLE IF NOT EXISTS scraping_sources (
    id              TEXT PRIMARY KEY,
    venue_id        TEXT NOT NULL REFERENCES venues(id) ON DELETE CASCADE,
    source_url      TEXT NOT NULL,
    source_type     TEXT NOT NULL DEFAULT 'website',
    is_active       INTEGER NOT NULL DEFAULT 1,
    last_scraped_at TEXT,
    created_at      TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sources_venue ON scraping_sources(venue_id);

CREATE TABLE IF NOT EXISTS exhibitions (
    id              TEXT PRIMARY KEY,
    venue_id        TEXT NOT NULL REFERENCES venues(id) ON DELETE CASCADE,
    title           TEXT NOT NULL,
    artist          TEXT,
    description     TEXT,
    start_date      TEXT,
    end_date        TEXT,
    image_url       TEXT,
    exhibition_url  TEXT NOT NULL,
    last_scraped_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_exhibitions_venue ON exhibitions(venue_id);
CREATE INDEX IF NOT EXISTS idx_exhibitions_dates ON exhibitions(start_date, end_date);

-- Append-only history of indexing attempts
CREATE TABLE IF NOT EXISTS scraping_logs (
    id                TEXT PRIMARY KEY,
    source_id         TEXT NOT NULL REFERENCES scraping_sources(id) ON DELETE CASCADE,
    status            TEXT NOT NULL CHECK (status IN ('success', 'failed')),
    exhibitions_found INTEGER NOT NULL DEFAULT 0,
    error_message     TEXT,
    scraped_at        TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_logs_source ON scraping_logs(source_id);
CREATE INDEX IF NOT EXISTS idx_logs_scraped_at ON scraping_logs(scraped_at);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
