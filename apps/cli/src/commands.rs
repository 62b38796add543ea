//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use expofinder_core::{
    CitySummary, IndexOutcome, Indexer, JobStatus, PacedGeocoder, ProgressReporter,
    spawn_index_all,
};
use expofinder_shared::{AppConfig, NewVenue, expand_home, init_config, load_config};
use expofinder_storage::{DEFAULT_LOG_LIMIT, Storage};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing::{debug, info, warn};
use url::Url;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// ExpoFinder: index current art exhibitions from venue websites.
#[derive(Parser)]
#[command(
    name = "expofinder",
    version,
    about = "Discover art venues and index their current exhibitions.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Database file (overrides `[database] path`).
    #[arg(long, global = true, env = "EXPOFINDER_DB")]
    pub db: Option<PathBuf>,

    /// Print results as JSON instead of text.
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Database setup.
    Db {
        #[command(subcommand)]
        action: DbAction,
    },

    /// Index venue websites.
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },

    /// Discover and index the venues of a city.
    City {
        #[command(subcommand)]
        action: CityAction,
    },

    /// Manage venues.
    Venues {
        #[command(subcommand)]
        action: VenueAction,
    },

    /// Manage scraping sources.
    Sources {
        #[command(subcommand)]
        action: SourceAction,
    },

    /// Show the most recent scraping log entries.
    Logs {
        /// Maximum number of entries.
        #[arg(long, default_value_t = DEFAULT_LOG_LIMIT)]
        limit: u32,
    },

    /// List the stored exhibitions of a venue.
    Exhibitions {
        /// Venue ID.
        venue_id: String,
    },

    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub(crate) enum DbAction {
    /// Create the database and apply migrations.
    Init,
    /// Insert the starter Antwerp venues.
    Seed,
}

#[derive(Subcommand)]
pub(crate) enum IndexAction {
    /// Index every active source as a background job.
    All {
        /// How often a still-running job is logged at debug level, in milliseconds.
        #[arg(long = "detach-poll-ms", default_value_t = 250)]
        poll_ms: u64,
    },
    /// Index a single source.
    Source {
        /// Source ID.
        id: String,
    },
}

#[derive(Subcommand)]
pub(crate) enum CityAction {
    /// Find museums and galleries in a city and index them.
    Add {
        /// City name, e.g. "Ghent".
        name: String,
    },
    /// Venue counts, last index time and recent failures per city.
    Status,
    /// When a city was last indexed.
    LastIndexed {
        name: String,
    },
}

#[derive(Subcommand)]
pub(crate) enum VenueAction {
    /// List venues with exhibition and source counts.
    List,
    /// Register a venue by hand; the address is geocoded.
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        city: String,
        #[arg(long)]
        country: String,
        #[arg(long)]
        address: Option<String>,
        #[arg(long)]
        website: Option<String>,
        /// Page to index, when it differs from the website.
        #[arg(long)]
        source_url: Option<String>,
    },
}

#[derive(Subcommand)]
pub(crate) enum SourceAction {
    /// List sources with their latest status.
    List,
    /// Include a source in index runs.
    Enable { id: String },
    /// Exclude a source from index runs.
    Disable { id: String },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "expofinder=info",
        1 => "expofinder=debug",
        _ => "expofinder=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Resolved settings shared by the command handlers.
struct Context {
    config: AppConfig,
    db_path: PathBuf,
    json: bool,
}

impl Context {
    fn load(cli: &Cli) -> Result<Self> {
        let config = load_config()?;
        let db_path = match &cli.db {
            Some(path) => path.clone(),
            None => expand_home(&config.database.path)?,
        };
        Ok(Self {
            config,
            db_path,
            json: cli.json,
        })
    }

    async fn storage(&self) -> Result<Arc<Storage>> {
        Ok(Arc::new(Storage::open(&self.db_path).await?))
    }

    async fn indexer(&self) -> Result<Indexer> {
        let storage = self.storage().await?;
        Ok(Indexer::from_config(storage, &self.config)?)
    }

    /// Print `value` as pretty JSON when `--json` is set. Returns whether it did.
    fn emit_json<T: Serialize>(&self, value: &T) -> Result<bool> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        }
        Ok(self.json)
    }
}

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    if let Command::Config { action } = &cli.command {
        return match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        };
    }

    let ctx = Context::load(&cli)?;
    match cli.command {
        Command::Db { action } => match action {
            DbAction::Init => cmd_db_init(&ctx).await,
            DbAction::Seed => cmd_db_seed(&ctx).await,
        },
        Command::Index { action } => match action {
            IndexAction::All { poll_ms } => cmd_index_all(&ctx, poll_ms).await,
            IndexAction::Source { id } => cmd_index_source(&ctx, &id).await,
        },
        Command::City { action } => match action {
            CityAction::Add { name } => cmd_city_add(&ctx, &name).await,
            CityAction::Status => cmd_city_status(&ctx).await,
            CityAction::LastIndexed { name } => cmd_city_last_indexed(&ctx, &name).await,
        },
        Command::Venues { action } => match action {
            VenueAction::List => cmd_venues_list(&ctx).await,
            VenueAction::Add {
                name,
                city,
                country,
                address,
                website,
                source_url,
            } => {
                let venue = NewVenue {
                    name,
                    city,
                    country,
                    address,
                    website_url: website,
                    ..NewVenue::default()
                };
                cmd_venues_add(&ctx, venue, source_url).await
            }
        },
        Command::Sources { action } => match action {
            SourceAction::List => cmd_sources_list(&ctx).await,
            SourceAction::Enable { id } => cmd_sources_set_active(&ctx, &id, true).await,
            SourceAction::Disable { id } => cmd_sources_set_active(&ctx, &id, false).await,
        },
        Command::Logs { limit } => cmd_logs(&ctx, limit).await,
        Command::Exhibitions { venue_id } => cmd_exhibitions(&ctx, &venue_id).await,
        Command::Config { .. } => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            spinner.set_style(
                style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
            );
        }
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn source_started(&self, venue: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Indexing [{current}/{total}] {venue}"));
    }

    fn source_finished(&self, outcome: &IndexOutcome) {
        let line = match outcome {
            IndexOutcome::Success {
                venue,
                exhibitions_found,
                extraction_error: None,
                ..
            } => format!("  ok     {venue}: {exhibitions_found} exhibitions"),
            IndexOutcome::Success {
                venue,
                extraction_error: Some(e),
                ..
            } => format!("  empty  {venue}: extraction failed ({e})"),
            IndexOutcome::Failed { venue, error } => format!("  failed {venue}: {error}"),
        };
        self.spinner.println(line);
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_db_init(ctx: &Context) -> Result<()> {
    ctx.storage().await?;
    println!("Database ready at: {}", ctx.db_path.display());
    Ok(())
}

async fn cmd_db_seed(ctx: &Context) -> Result<()> {
    let storage = ctx.storage().await?;
    let created = storage.seed_initial_venues().await?;
    info!(created, "seeded initial venues");
    println!("Seeded {created} new venues.");
    Ok(())
}

async fn cmd_index_all(ctx: &Context, poll_ms: u64) -> Result<()> {
    let indexer = Arc::new(ctx.indexer().await?);
    let progress = Arc::new(CliProgress::new());
    let job = spawn_index_all(indexer, progress.clone());

    let started = Instant::now();
    let mut ticker = tokio::time::interval(Duration::from_millis(poll_ms.max(10)));
    let wait = job.wait();
    tokio::pin!(wait);
    let status = loop {
        tokio::select! {
            status = &mut wait => break status,
            _ = ticker.tick() => {
                debug!(elapsed_ms = started.elapsed().as_millis() as u64, "index job running");
            }
        }
    };
    progress.finish();

    let outcomes = match status {
        JobStatus::Completed(outcomes) => outcomes,
        JobStatus::Failed(message) => return Err(eyre!("index run failed: {message}")),
        JobStatus::Running => return Err(eyre!("index job ended without a result")),
    };

    if ctx.emit_json(&outcomes)? {
        return Ok(());
    }

    let succeeded: Vec<_> = outcomes.iter().filter(|o| o.is_success()).collect();
    let total_found: usize = outcomes.iter().map(IndexOutcome::exhibitions_found).sum();

    println!();
    println!("  Index run complete");
    println!("  Sources:     {}", outcomes.len());
    println!("  Succeeded:   {}", succeeded.len());
    println!("  Failed:      {}", outcomes.len() - succeeded.len());
    println!("  Exhibitions: {total_found}");
    for outcome in outcomes.iter().filter(|o| !o.is_success()) {
        if let IndexOutcome::Failed { venue, error } = outcome {
            println!("    - {venue}: {error}");
        }
    }
    println!();
    Ok(())
}

async fn cmd_index_source(ctx: &Context, source_id: &str) -> Result<()> {
    let indexer = ctx.indexer().await?;
    let result = indexer.index_single_source(source_id).await?;
    if ctx.emit_json(&result)? {
        return Ok(());
    }
    println!(
        "Indexed {}: {} exhibitions found.",
        result.venue, result.exhibitions_found
    );
    Ok(())
}

async fn cmd_city_add(ctx: &Context, city: &str) -> Result<()> {
    let indexer = ctx.indexer().await?;
    let progress = CliProgress::new();
    let summary = indexer.request_city_index(city, &progress).await;
    progress.finish();
    let summary = summary?;

    if ctx.emit_json(&summary)? {
        return Ok(());
    }
    print_city_summary(&summary);
    Ok(())
}

fn print_city_summary(summary: &CitySummary) {
    println!();
    println!("  {} indexed", summary.city);
    println!("  New venues:  {}", summary.venues_added);
    println!("  Exhibitions: {}", summary.exhibitions_found);
    for venue in &summary.venues {
        println!("    {:<40} {}", venue.name, venue.exhibitions_found);
    }
    if !summary.failed_venues.is_empty() {
        println!("  Failed:");
        for failed in &summary.failed_venues {
            println!("    - {}: {}", failed.name, failed.error);
        }
    }
    println!();
}

async fn cmd_city_status(ctx: &Context) -> Result<()> {
    let storage = ctx.storage().await?;
    let cities = storage.city_status(chrono::Utc::now()).await?;
    if ctx.emit_json(&cities)? {
        return Ok(());
    }
    if cities.is_empty() {
        println!("No venues yet.");
        return Ok(());
    }
    println!("{:<24} {:>7} {:>9}  LAST INDEXED", "CITY", "VENUES", "FAILURES");
    for city in cities {
        println!(
            "{:<24} {:>7} {:>9}  {}",
            city.city,
            city.venue_count,
            city.recent_failures,
            city.last_indexed
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "never".into())
        );
    }
    Ok(())
}

async fn cmd_city_last_indexed(ctx: &Context, city: &str) -> Result<()> {
    let storage = ctx.storage().await?;
    let last = storage.city_last_indexed(city).await?;
    if ctx.emit_json(&serde_json::json!({ "city": city, "last_indexed": last }))? {
        return Ok(());
    }
    match last {
        Some(t) => println!("{city} was last indexed at {}", t.to_rfc3339()),
        None => println!("{city} has never been indexed."),
    }
    Ok(())
}

async fn cmd_venues_list(ctx: &Context) -> Result<()> {
    let storage = ctx.storage().await?;
    let venues = storage.list_venues().await?;
    if ctx.emit_json(&venues)? {
        return Ok(());
    }
    for v in venues {
        println!(
            "{}  {:<36} {:<16} exhibitions={} sources={}",
            v.venue.id, v.venue.name, v.venue.city, v.exhibition_count, v.source_count
        );
    }
    Ok(())
}

async fn cmd_venues_add(
    ctx: &Context,
    mut venue: NewVenue,
    source_url: Option<String>,
) -> Result<()> {
    for url in venue.website_url.iter().chain(source_url.iter()) {
        Url::parse(url).map_err(|e| eyre!("invalid URL '{url}': {e}"))?;
    }

    if let Some(address) = venue.address.clone() {
        let geocoder = PacedGeocoder::from_config(&ctx.config)?;
        let query = format!("{address}, {}, {}", venue.city, venue.country);
        info!(backend = geocoder.backend_name(), "geocoding address");
        match geocoder.geocode(&query).await {
            Ok(Some(hit)) => {
                venue.latitude = Some(hit.latitude);
                venue.longitude = Some(hit.longitude);
            }
            Ok(None) => warn!(%address, "address not found, storing venue without coordinates"),
            Err(e) => warn!(%address, error = %e, "geocoding failed, storing venue without coordinates"),
        }
    }

    let storage = ctx.storage().await?;
    let upsert = storage.upsert_venue(&venue).await?;
    let source = match source_url.or_else(|| venue.website_url.clone()) {
        Some(url) => Some(storage.ensure_source(&upsert.id, &url).await?),
        None => None,
    };

    if ctx.emit_json(&serde_json::json!({
        "venue_id": upsert.id,
        "created": upsert.created,
        "source_id": source,
        "latitude": venue.latitude,
        "longitude": venue.longitude,
    }))? {
        return Ok(());
    }

    let verb = if upsert.created { "Added" } else { "Found existing" };
    println!("{verb} venue {} ({})", venue.name, upsert.id);
    if let (Some(lat), Some(lng)) = (venue.latitude, venue.longitude) {
        println!("  Location: {lat:.5}, {lng:.5}");
    }
    if let Some(source) = source {
        println!("  Source:   {source}");
    }
    Ok(())
}

async fn cmd_sources_list(ctx: &Context) -> Result<()> {
    let storage = ctx.storage().await?;
    let sources = storage.list_sources().await?;
    if ctx.emit_json(&sources)? {
        return Ok(());
    }
    for s in sources {
        println!(
            "{}  {:<8} {:<7} {:<32} {}",
            s.source.id,
            if s.source.is_active { "active" } else { "inactive" },
            s.last_status.map(|st| st.as_str()).unwrap_or("-"),
            s.venue_name,
            s.source.source_url
        );
    }
    Ok(())
}

async fn cmd_sources_set_active(ctx: &Context, source_id: &str, active: bool) -> Result<()> {
    let storage = ctx.storage().await?;
    storage.set_source_active(source_id, active).await?;
    println!(
        "Source {source_id} {}.",
        if active { "enabled" } else { "disabled" }
    );
    Ok(())
}

async fn cmd_logs(ctx: &Context, limit: u32) -> Result<()> {
    let storage = ctx.storage().await?;
    let logs = storage.list_recent_logs(limit).await?;
    if ctx.emit_json(&logs)? {
        return Ok(());
    }
    for entry in logs {
        println!(
            "{}  {:<7} {:>3}  {:<32} {}",
            entry.log.scraped_at.to_rfc3339(),
            entry.log.status.as_str(),
            entry.log.exhibitions_found,
            entry.venue_name,
            entry.log.error_message.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

async fn cmd_exhibitions(ctx: &Context, venue_id: &str) -> Result<()> {
    let storage = ctx.storage().await?;
    if storage.get_venue(venue_id).await?.is_none() {
        return Err(eyre!("venue not found: {venue_id}"));
    }
    let exhibitions = storage.list_exhibitions(venue_id).await?;
    if ctx.emit_json(&exhibitions)? {
        return Ok(());
    }
    if exhibitions.is_empty() {
        println!("No exhibitions stored for this venue.");
    }
    for e in exhibitions {
        let dates = match (&e.start_date, &e.end_date) {
            (Some(s), Some(end)) => format!("{s} - {end}"),
            (Some(s), None) => format!("from {s}"),
            (None, Some(end)) => format!("until {end}"),
            (None, None) => String::new(),
        };
        println!("{}", e.title);
        if let Some(artist) = &e.artist {
            println!("  {artist}");
        }
        if !dates.is_empty() {
            println!("  {dates}");
        }
        println!("  {}", e.exhibition_url);
    }
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
