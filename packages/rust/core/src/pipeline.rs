//! Per-source indexing: fetch -> extract -> persist, for one source or all.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use expofinder_discovery::PlacesClient;
use expofinder_extraction::ExtractionClient;
use expofinder_fetcher::Fetcher;
use expofinder_shared::{
    AppConfig, CategoryQuery, ExpoFinderError, Result, ScrapeStatus, SourceTarget,
};
use expofinder_storage::Storage;

use crate::cooldown::DEFAULT_WINDOW_HOURS;
use crate::pacing::Pacers;

/// Stage a source is in while it is being indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexStage {
    Pending,
    Fetching,
    Extracting,
    Persisting,
    Success,
    Failed,
}

impl IndexStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Fetching => "fetching",
            Self::Extracting => "extracting",
            Self::Persisting => "persisting",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

/// Result of indexing one source in a batch run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum IndexOutcome {
    Success {
        venue: String,
        exhibitions_found: usize,
        exhibitions_saved: usize,
        /// Set when the model call failed and the source was stored empty.
        #[serde(skip_serializing_if = "Option::is_none")]
        extraction_error: Option<String>,
    },
    Failed {
        venue: String,
        error: String,
    },
}

impl IndexOutcome {
    pub fn venue(&self) -> &str {
        match self {
            Self::Success { venue, .. } | Self::Failed { venue, .. } => venue,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn exhibitions_found(&self) -> usize {
        match self {
            Self::Success {
                exhibitions_found, ..
            } => *exhibitions_found,
            Self::Failed { .. } => 0,
        }
    }
}

/// Result of `index_single_source`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SingleIndexResult {
    pub venue: String,
    pub exhibitions_found: usize,
}

/// What a source run produced when it got past fetching.
#[derive(Debug)]
pub(crate) struct Processed {
    pub exhibitions_found: usize,
    pub exhibitions_saved: usize,
    pub extraction_error: Option<String>,
}

/// Progress callback for indexing runs.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called before a source is processed. `current` is 1-based.
    fn source_started(&self, venue: &str, current: usize, total: usize);
    /// Called after a source is processed.
    fn source_finished(&self, outcome: &IndexOutcome);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn source_started(&self, _venue: &str, _current: usize, _total: usize) {}
    fn source_finished(&self, _outcome: &IndexOutcome) {}
}

/// Drives indexing over an explicit storage handle and provider clients.
pub struct Indexer {
    pub(crate) storage: Arc<Storage>,
    fetcher: Fetcher,
    extractor: ExtractionClient,
    pub(crate) places: Option<PlacesClient>,
    pub(crate) places_key_env: String,
    pub(crate) categories: Vec<CategoryQuery>,
    pub(crate) cooldown_hours: u32,
    pub(crate) pacers: Pacers,
}

impl Indexer {
    /// An indexer without venue discovery, 24h cooldown and the given pacing.
    pub fn new(
        storage: Arc<Storage>,
        fetcher: Fetcher,
        extractor: ExtractionClient,
        pacers: Pacers,
    ) -> Self {
        Self {
            storage,
            fetcher,
            extractor,
            places: None,
            places_key_env: "GOOGLE_MAPS_API_KEY".into(),
            categories: Vec::new(),
            cooldown_hours: DEFAULT_WINDOW_HOURS,
            pacers,
        }
    }

    /// Enable city discovery with a Places client and its search categories.
    pub fn with_places(mut self, places: PlacesClient, categories: Vec<CategoryQuery>) -> Self {
        self.places = Some(places);
        self.categories = categories;
        self
    }

    pub fn with_cooldown_hours(mut self, hours: u32) -> Self {
        self.cooldown_hours = hours;
        self
    }

    /// Build every client from config.
    ///
    /// Fails with `CredentialMissing` when no LLM key is configured. A missing
    /// Places key only disables city discovery.
    pub fn from_config(storage: Arc<Storage>, config: &AppConfig) -> Result<Self> {
        let fetcher = Fetcher::new(&config.fetch)?;
        let extractor = ExtractionClient::from_config(&config.llm)?;
        let mut indexer = Self::new(storage, fetcher, extractor, Pacers::from_config(&config.pacing))
            .with_cooldown_hours(config.cooldown.hours);
        indexer.places_key_env = config.places.api_key_env.clone();

        match PlacesClient::from_config(&config.places)? {
            Some(places) => Ok(indexer.with_places(places, config.places.categories.clone())),
            None => {
                warn!(
                    env_var = %config.places.api_key_env,
                    "Places API key not set, city discovery disabled"
                );
                Ok(indexer)
            }
        }
    }

    /// Index every active source, one after another.
    ///
    /// A source that cannot be fetched gets a failure log and a `Failed`
    /// outcome; the run moves on. Storage errors abort the run.
    #[instrument(skip_all)]
    pub async fn index_all_sources(
        &self,
        progress: &dyn ProgressReporter,
    ) -> Result<Vec<IndexOutcome>> {
        let start = Instant::now();
        progress.phase("Loading active sources");
        let sources = self.storage.list_active_sources().await?;
        let total = sources.len();
        info!(sources = total, model = self.extractor.model(), "starting index run");

        progress.phase("Indexing sources");
        let mut outcomes = Vec::with_capacity(total);
        for (i, target) in sources.iter().enumerate() {
            debug!(
                stage = IndexStage::Pending.as_str(),
                venue = %target.venue_name,
                "waiting for pacer"
            );
            self.pacers.index.ready().await;
            progress.source_started(&target.venue_name, i + 1, total);

            let outcome = match self.process_source(target).await? {
                Ok(done) => IndexOutcome::Success {
                    venue: target.venue_name.clone(),
                    exhibitions_found: done.exhibitions_found,
                    exhibitions_saved: done.exhibitions_saved,
                    extraction_error: done.extraction_error,
                },
                Err(e) => IndexOutcome::Failed {
                    venue: target.venue_name.clone(),
                    error: e.to_string(),
                },
            };
            progress.source_finished(&outcome);
            outcomes.push(outcome);
        }

        let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
        info!(
            sources = total,
            succeeded,
            failed = total - succeeded,
            exhibitions = outcomes.iter().map(IndexOutcome::exhibitions_found).sum::<usize>(),
            elapsed_ms = start.elapsed().as_millis(),
            "index run complete"
        );
        Ok(outcomes)
    }

    /// Index one source by id.
    ///
    /// Unknown ids fail with `NotFound`. A fetch failure is logged against
    /// the source and returned as the error.
    #[instrument(skip_all, fields(source_id = %source_id))]
    pub async fn index_single_source(&self, source_id: &str) -> Result<SingleIndexResult> {
        let target = self
            .storage
            .get_source_target(source_id)
            .await?
            .ok_or_else(|| ExpoFinderError::not_found("source", source_id))?;

        let done = self.process_source(&target).await??;
        Ok(SingleIndexResult {
            venue: target.venue_name,
            exhibitions_found: done.exhibitions_found,
        })
    }

    /// Run one source through fetch, extract and persist.
    ///
    /// The outer `Result` carries fatal errors. The inner one carries a
    /// failure scoped to this source, already recorded in the log.
    #[instrument(skip_all, fields(venue = %target.venue_name, url = %target.source_url))]
    pub(crate) async fn process_source(
        &self,
        target: &SourceTarget,
    ) -> Result<Result<Processed>> {
        let content = match self.fetcher.fetch_clean_content(&target.source_url).await {
            Ok(content) => content,
            Err(e) if e.is_source_scoped() => {
                warn!(
                    stage = IndexStage::Failed.as_str(),
                    during = IndexStage::Fetching.as_str(),
                    error = %e,
                    "source failed"
                );
                self.storage
                    .append_log(&target.source_id, ScrapeStatus::Failed, 0, Some(&e.to_string()))
                    .await?;
                return Ok(Err(e));
            }
            Err(e) => return Err(e),
        };

        let (records, extraction_error) = match self
            .extractor
            .extract_exhibitions(&content, &target.source_url)
            .await
        {
            Ok(records) => (records, None),
            Err(e) if e.is_source_scoped() => {
                warn!(
                    stage = IndexStage::Extracting.as_str(),
                    error = %e,
                    "extraction failed, storing no exhibitions"
                );
                (Vec::new(), Some(e.to_string()))
            }
            Err(e) => return Err(e),
        };

        debug!(stage = IndexStage::Persisting.as_str(), records = records.len(), "persisting");
        let saved = self
            .storage
            .replace_exhibitions(&target.venue_id, &records, &target.source_url)
            .await?;
        self.storage.touch_source(&target.source_id).await?;
        self.storage
            .append_log(
                &target.source_id,
                ScrapeStatus::Success,
                records.len(),
                extraction_error.as_deref(),
            )
            .await?;

        info!(
            stage = IndexStage::Success.as_str(),
            found = records.len(),
            saved,
            "source indexed"
        );
        Ok(Ok(Processed {
            exhibitions_found: records.len(),
            exhibitions_saved: saved,
            extraction_error,
        }))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use expofinder_shared::{FetchConfig, LlmConfig, NewVenue};
    use std::sync::Mutex;
    use uuid::Uuid;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    pub(crate) async fn test_storage() -> Arc<Storage> {
        let tmp = std::env::temp_dir().join(format!("ef_core_{}.db", Uuid::now_v7()));
        Arc::new(Storage::open(&tmp).await.expect("open test db"))
    }

    /// Indexer whose LLM endpoint lives on `llm`.
    pub(crate) fn test_indexer(storage: Arc<Storage>, llm: &MockServer) -> Indexer {
        let fetcher = Fetcher::new(&FetchConfig::default()).unwrap();
        let extractor =
            ExtractionClient::new("test-key", &llm.uri(), &LlmConfig::default()).unwrap();
        Indexer::new(storage, fetcher, extractor, Pacers::unlimited())
    }

    pub(crate) fn llm_reply(content: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": content}}]
        }))
    }

    pub(crate) async fn mount_page(server: &MockServer, page: &str) {
        Mock::given(method("GET"))
            .and(path(page.to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<html><body><main><h2>Spring show</h2><p>Until June</p></main></body></html>",
            ))
            .mount(server)
            .await;
    }

    async fn add_source(storage: &Storage, name: &str, url: &str) -> String {
        let venue = storage
            .upsert_venue(&NewVenue {
                name: name.into(),
                city: "Antwerp".into(),
                country: "Belgium".into(),
                website_url: Some(url.into()),
                ..NewVenue::default()
            })
            .await
            .unwrap();
        storage.ensure_source(&venue.id, url).await.unwrap()
    }

    #[derive(Default)]
    pub(crate) struct Recorder(pub(crate) Mutex<Vec<String>>);

    impl ProgressReporter for Recorder {
        fn phase(&self, _name: &str) {}
        fn source_started(&self, venue: &str, current: usize, total: usize) {
            self.0.lock().unwrap().push(format!("{current}/{total} {venue}"));
        }
        fn source_finished(&self, outcome: &IndexOutcome) {
            self.0.lock().unwrap().push(format!("done {}", outcome.venue()));
        }
    }

    #[test]
    fn stage_names() {
        let stages = [
            IndexStage::Pending,
            IndexStage::Fetching,
            IndexStage::Extracting,
            IndexStage::Persisting,
            IndexStage::Success,
            IndexStage::Failed,
        ];
        let names: Vec<_> = stages.iter().map(|s| s.as_str()).collect();
        assert_eq!(
            names,
            ["pending", "fetching", "extracting", "persisting", "success", "failed"]
        );
    }

    #[tokio::test]
    async fn fetch_failure_is_logged_and_run_continues() {
        let server = MockServer::start().await;
        mount_page(&server, "/expo").await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(llm_reply(
                "```json\n[{\"title\": \"Spring show\", \"start_date\": \"2025-03-01\"}]\n```",
            ))
            .mount(&server)
            .await;

        let storage = test_storage().await;
        // Port 9 (discard) refuses connections locally.
        let broken = add_source(&storage, "Closed Museum", "http://127.0.0.1:9/").await;
        let good = add_source(&storage, "Open Gallery", &format!("{}/expo", server.uri())).await;

        let indexer = test_indexer(storage.clone(), &server);
        let progress = Recorder::default();
        let outcomes = indexer.index_all_sources(&progress).await.unwrap();

        assert_eq!(outcomes.len(), 2);
        assert!(matches!(&outcomes[0], IndexOutcome::Failed { venue, .. } if venue == "Closed Museum"));
        assert_eq!(
            outcomes[1],
            IndexOutcome::Success {
                venue: "Open Gallery".into(),
                exhibitions_found: 1,
                exhibitions_saved: 1,
                extraction_error: None,
            }
        );

        let failed_logs = storage.logs_for_source(&broken).await.unwrap();
        assert_eq!(failed_logs.len(), 1);
        assert_eq!(failed_logs[0].status, ScrapeStatus::Failed);
        assert_eq!(failed_logs[0].exhibitions_found, 0);
        assert!(failed_logs[0].error_message.is_some());

        let ok_logs = storage.logs_for_source(&good).await.unwrap();
        assert_eq!(ok_logs[0].status, ScrapeStatus::Success);
        assert_eq!(ok_logs[0].exhibitions_found, 1);

        assert_eq!(
            *progress.0.lock().unwrap(),
            vec![
                "1/2 Closed Museum",
                "done Closed Museum",
                "2/2 Open Gallery",
                "done Open Gallery"
            ]
        );
    }

    #[tokio::test]
    async fn extraction_failure_stores_empty_result_with_reason() {
        let server = MockServer::start().await;
        mount_page(&server, "/expo").await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let storage = test_storage().await;
        let source = add_source(&storage, "KMSKA", &format!("{}/expo", server.uri())).await;
        let indexer = test_indexer(storage.clone(), &server);

        let outcomes = indexer.index_all_sources(&SilentProgress).await.unwrap();
        match &outcomes[0] {
            IndexOutcome::Success {
                exhibitions_found,
                extraction_error,
                ..
            } => {
                assert_eq!(*exhibitions_found, 0);
                assert!(extraction_error.is_some());
            }
            other => panic!("unexpected outcome: {other:?}"),
        }

        let logs = storage.logs_for_source(&source).await.unwrap();
        assert_eq!(logs[0].status, ScrapeStatus::Success);
        assert!(logs[0].error_message.is_some());
    }

    #[tokio::test]
    async fn rerun_replaces_previous_exhibitions() {
        let server = MockServer::start().await;
        mount_page(&server, "/expo").await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(llm_reply(
                "[{\"title\": \"A\"}, {\"title\": \"B\", \"exhibition_url\": \"https://x.be/b\"}]",
            ))
            .mount(&server)
            .await;

        let storage = test_storage().await;
        let url = format!("{}/expo", server.uri());
        let source = add_source(&storage, "FOMU", &url).await;
        let indexer = test_indexer(storage.clone(), &server);

        indexer.index_single_source(&source).await.unwrap();
        let result = indexer.index_single_source(&source).await.unwrap();
        assert_eq!(result.venue, "FOMU");
        assert_eq!(result.exhibitions_found, 2);

        let target = storage.get_source_target(&source).await.unwrap().unwrap();
        let exhibitions = storage.list_exhibitions(&target.venue_id).await.unwrap();
        assert_eq!(exhibitions.len(), 2);
        assert!(exhibitions.iter().any(|e| e.exhibition_url == url));
        assert!(exhibitions.iter().any(|e| e.exhibition_url == "https://x.be/b"));
        assert_eq!(storage.logs_for_source(&source).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn single_source_unknown_id_is_not_found() {
        let server = MockServer::start().await;
        let indexer = test_indexer(test_storage().await, &server);
        let err = indexer.index_single_source("missing").await.unwrap_err();
        assert!(matches!(err, ExpoFinderError::NotFound { entity: "source", .. }));
    }

    #[tokio::test]
    async fn single_source_fetch_failure_is_logged_and_returned() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let storage = test_storage().await;
        let source = add_source(&storage, "M HKA", &format!("{}/gone", server.uri())).await;
        let indexer = test_indexer(storage.clone(), &server);

        let err = indexer.index_single_source(&source).await.unwrap_err();
        assert!(matches!(err, ExpoFinderError::Fetch { .. }));

        let logs = storage.logs_for_source(&source).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].status, ScrapeStatus::Failed);
    }

    #[test]
    fn outcome_serializes_with_status_tag() {
        let ok = IndexOutcome::Success {
            venue: "KMSKA".into(),
            exhibitions_found: 3,
            exhibitions_saved: 3,
            extraction_error: None,
        };
        assert_eq!(
            serde_json::to_value(&ok).unwrap(),
            serde_json::json!({
                "status": "success",
                "venue": "KMSKA",
                "exhibitions_found": 3,
                "exhibitions_saved": 3
            })
        );

        let failed = IndexOutcome::Failed {
            venue: "FOMU".into(),
            error: "timeout".into(),
        };
        assert_eq!(
            serde_json::to_value(&failed).unwrap(),
            serde_json::json!({"status": "failed", "venue": "FOMU", "error": "timeout"})
        );
    }
}
