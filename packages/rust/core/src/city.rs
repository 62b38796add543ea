//! City-level discovery: find venues through Places, register them, index each.

use std::collections::HashSet;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use expofinder_discovery::candidate_from_details;
use expofinder_shared::{ExpoFinderError, Result, SourceTarget};

use crate::cooldown;
use crate::pipeline::{IndexOutcome, Indexer, ProgressReporter};

/// A venue indexed during a city run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexedVenue {
    pub name: String,
    pub exhibitions_found: usize,
}

/// A venue that was registered but could not be indexed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedVenue {
    pub name: String,
    pub error: String,
}

/// Result of `add_city_and_index`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CitySummary {
    pub city: String,
    /// Venues newly created by this run; already known venues are not counted.
    pub venues_added: usize,
    pub exhibitions_found: usize,
    pub venues: Vec<IndexedVenue>,
    pub failed_venues: Vec<FailedVenue>,
}

impl Indexer {
    /// Reject the request with `CooldownActive` if `city` was indexed too recently.
    pub async fn check_city_cooldown(&self, city: &str) -> Result<()> {
        let last = self.storage.city_last_indexed(city).await?;
        cooldown::evaluate(city, last, Utc::now(), self.cooldown_hours)
    }

    /// Cooldown check followed by [`Indexer::add_city_and_index`].
    pub async fn request_city_index(
        &self,
        city: &str,
        progress: &dyn ProgressReporter,
    ) -> Result<CitySummary> {
        self.check_city_cooldown(city).await?;
        self.add_city_and_index(city, progress).await
    }

    /// Discover museums and galleries in `city`, register them and index each one.
    ///
    /// Categories run in configured order, each capped at its limit. Places
    /// without details or a website are skipped. A venue that fails to index
    /// ends up in `failed_venues` and the run continues.
    #[instrument(skip_all, fields(city = %city))]
    pub async fn add_city_and_index(
        &self,
        city: &str,
        progress: &dyn ProgressReporter,
    ) -> Result<CitySummary> {
        let places = self
            .places
            .as_ref()
            .ok_or_else(|| ExpoFinderError::credential_missing("Google Places", &self.places_key_env))?;

        let mut summary = CitySummary {
            city: city.to_string(),
            venues_added: 0,
            exhibitions_found: 0,
            venues: Vec::new(),
            failed_venues: Vec::new(),
        };
        let mut seen = HashSet::new();

        for query in &self.categories {
            progress.phase(&format!("Searching {} in {city}", query.category));
            self.pacers.places.ready().await;
            let hits = match places.text_search(&query.category, city).await {
                Ok(hits) => hits,
                Err(e) => {
                    warn!(category = %query.category, error = %e, "place search failed, skipping category");
                    continue;
                }
            };

            let total = hits.len().min(query.limit);
            for (i, hit) in hits.into_iter().take(query.limit).enumerate() {
                if !seen.insert(hit.place_id.clone()) {
                    continue;
                }

                self.pacers.places.ready().await;
                let details = match places.place_details(&hit.place_id).await {
                    Ok(Some(details)) => details,
                    Ok(None) => continue,
                    Err(e) => {
                        warn!(place = %hit.name, error = %e, "place details failed, skipping");
                        continue;
                    }
                };
                let Some(candidate) = candidate_from_details(&details, city) else {
                    debug!(place = %details.name, "place has no website, skipping");
                    continue;
                };
                let Some(website) = candidate.website_url.clone() else {
                    continue;
                };

                let upsert = self.storage.upsert_venue(&candidate).await?;
                if upsert.created {
                    summary.venues_added += 1;
                }
                let source_id = self.storage.ensure_source(&upsert.id, &website).await?;
                let target = self
                    .storage
                    .get_source_target(&source_id)
                    .await?
                    .unwrap_or(SourceTarget {
                        source_id,
                        source_url: website,
                        venue_id: upsert.id,
                        venue_name: candidate.name.clone(),
                    });

                self.pacers.index.ready().await;
                progress.source_started(&candidate.name, i + 1, total);
                let outcome = match self.process_source(&target).await? {
                    Ok(done) => IndexOutcome::Success {
                        venue: candidate.name,
                        exhibitions_found: done.exhibitions_found,
                        exhibitions_saved: done.exhibitions_saved,
                        extraction_error: done.extraction_error,
                    },
                    Err(e) => IndexOutcome::Failed {
                        venue: candidate.name,
                        error: e.to_string(),
                    },
                };
                progress.source_finished(&outcome);
                match outcome {
                    IndexOutcome::Success {
                        venue,
                        exhibitions_found,
                        ..
                    } => {
                        summary.exhibitions_found += exhibitions_found;
                        summary.venues.push(IndexedVenue {
                            name: venue,
                            exhibitions_found,
                        });
                    }
                    IndexOutcome::Failed { venue, error } => {
                        summary.failed_venues.push(FailedVenue { name: venue, error });
                    }
                }
            }
        }

        info!(
            venues_added = summary.venues_added,
            indexed = summary.venues.len(),
            failed = summary.failed_venues.len(),
            exhibitions = summary.exhibitions_found,
            "city indexed"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::SilentProgress;
    use crate::pipeline::tests::{Recorder, llm_reply, mount_page, test_indexer, test_storage};
    use chrono::Duration;
    use expofinder_discovery::PlacesClient;
    use expofinder_shared::{CategoryQuery, ScrapeStatus};
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn places_client(server: &MockServer) -> PlacesClient {
        PlacesClient::new("p-key", &server.uri(), std::time::Duration::from_secs(5)).unwrap()
    }

    fn categories() -> Vec<CategoryQuery> {
        vec![
            CategoryQuery {
                category: "museum".into(),
                limit: 5,
            },
            CategoryQuery {
                category: "art_gallery".into(),
                limit: 10,
            },
        ]
    }

    async fn mount_search(server: &MockServer, query: &str, body: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path("/textsearch/json"))
            .and(query_param("query", query))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }

    async fn mount_details(server: &MockServer, place_id: &str, result: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path("/details/json"))
            .and(query_param("place_id", place_id))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"status": "OK", "result": result})),
            )
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn discovers_registers_and_indexes_venues() {
        let server = MockServer::start().await;
        mount_page(&server, "/msk").await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(llm_reply("[{\"title\": \"Van Eyck\"}, {\"title\": \"Ensor\"}]"))
            .mount(&server)
            .await;
        mount_search(
            &server,
            "museum in Ghent",
            serde_json::json!({
                "status": "OK",
                "results": [
                    {"place_id": "p1", "name": "MSK Gent"},
                    {"place_id": "p2", "name": "Nowebsite Museum"}
                ]
            }),
        )
        .await;
        // Failed search for one category does not stop the run.
        mount_search(
            &server,
            "art_gallery in Ghent",
            serde_json::json!({"status": "OVER_QUERY_LIMIT", "results": []}),
        )
        .await;
        mount_details(
            &server,
            "p1",
            serde_json::json!({
                "name": "MSK Gent",
                "formatted_address": "Fernand Scribedreef 1, 9000 Gent, Belgium",
                "geometry": {"location": {"lat": 51.0386, "lng": 3.7233}},
                "website": format!("{}/msk", server.uri())
            }),
        )
        .await;
        mount_details(
            &server,
            "p2",
            serde_json::json!({"name": "Nowebsite Museum", "formatted_address": "Gent, Belgium"}),
        )
        .await;

        let storage = test_storage().await;
        let indexer = test_indexer(storage.clone(), &server)
            .with_places(places_client(&server), categories());

        let summary = indexer
            .add_city_and_index("Ghent", &SilentProgress)
            .await
            .unwrap();
        assert_eq!(summary.venues_added, 1);
        assert_eq!(summary.exhibitions_found, 2);
        assert_eq!(
            summary.venues,
            vec![IndexedVenue {
                name: "MSK Gent".into(),
                exhibitions_found: 2
            }]
        );
        assert!(summary.failed_venues.is_empty());

        // The place without a website left no venue and no source behind.
        let venues = storage.list_venues().await.unwrap();
        assert_eq!(venues.len(), 1);
        assert_eq!(venues[0].venue.country, "Belgium");
        assert_eq!(storage.list_sources().await.unwrap().len(), 1);

        // A second run finds the same venue and does not count it as new.
        let again = indexer
            .add_city_and_index("Ghent", &SilentProgress)
            .await
            .unwrap();
        assert_eq!(again.venues_added, 0);
        assert_eq!(storage.list_venues().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unreachable_venue_lands_in_failed_venues() {
        let server = MockServer::start().await;
        mount_search(
            &server,
            "museum in Leuven",
            serde_json::json!({"status": "OK", "results": [{"place_id": "m", "name": "M Leuven"}]}),
        )
        .await;
        mount_search(
            &server,
            "art_gallery in Leuven",
            serde_json::json!({"status": "ZERO_RESULTS", "results": []}),
        )
        .await;
        mount_details(
            &server,
            "m",
            serde_json::json!({"name": "M Leuven", "website": "http://127.0.0.1:9/"}),
        )
        .await;

        let storage = test_storage().await;
        let indexer = test_indexer(storage.clone(), &server)
            .with_places(places_client(&server), categories());

        let progress = Recorder::default();
        let summary = indexer
            .add_city_and_index("Leuven", &progress)
            .await
            .unwrap();
        assert_eq!(
            *progress.0.lock().unwrap(),
            vec!["1/1 M Leuven".to_string(), "done M Leuven".to_string()]
        );
        assert_eq!(summary.venues_added, 1);
        assert!(summary.venues.is_empty());
        assert_eq!(summary.failed_venues.len(), 1);
        assert_eq!(summary.failed_venues[0].name, "M Leuven");

        let logs = storage.list_recent_logs(10).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].log.status, ScrapeStatus::Failed);
    }

    #[tokio::test]
    async fn city_discovery_requires_places_client() {
        let server = MockServer::start().await;
        let indexer = test_indexer(test_storage().await, &server);
        let err = indexer
            .add_city_and_index("Bruges", &SilentProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, ExpoFinderError::CredentialMissing { .. }));
    }

    #[tokio::test]
    async fn request_is_rejected_during_cooldown() {
        let server = MockServer::start().await;
        let storage = test_storage().await;
        let venue = storage
            .upsert_venue(&expofinder_shared::NewVenue {
                name: "FOMU".into(),
                city: "Antwerp".into(),
                country: "Belgium".into(),
                website_url: Some("https://fomu.be".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        let source = storage.ensure_source(&venue.id, "https://fomu.be").await.unwrap();
        storage
            .touch_source_at(&source, Utc::now() - Duration::hours(10))
            .await
            .unwrap();

        let indexer = test_indexer(storage.clone(), &server)
            .with_places(places_client(&server), categories());
        let err = indexer
            .request_city_index("antwerp", &SilentProgress)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ExpoFinderError::CooldownActive {
                hours_since: 10,
                wait_hours: 14,
                ..
            }
        ));

        storage
            .touch_source_at(&source, Utc::now() - Duration::hours(30))
            .await
            .unwrap();
        assert!(indexer.check_city_cooldown("Antwerp").await.is_ok());
    }
}
