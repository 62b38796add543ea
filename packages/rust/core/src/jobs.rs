//! Batch index runs detached onto a tokio task with a pollable status.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::pipeline::{IndexOutcome, Indexer, ProgressReporter};

#[derive(Debug, Clone, PartialEq)]
pub enum JobStatus {
    Running,
    Completed(Vec<IndexOutcome>),
    Failed(String),
}

impl JobStatus {
    pub fn is_finished(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// Handle to a background `index_all_sources` run.
pub struct IndexJob {
    status: watch::Receiver<JobStatus>,
    handle: JoinHandle<()>,
}

impl IndexJob {
    /// Current status without waiting.
    pub fn status(&self) -> JobStatus {
        self.status.borrow().clone()
    }

    /// Wait for the run to finish and return its final status.
    pub async fn wait(mut self) -> JobStatus {
        let finished = self
            .status
            .wait_for(JobStatus::is_finished)
            .await
            .map(|s| s.clone());
        match finished {
            Ok(status) => status,
            // Sender dropped without a final status: the task panicked or was aborted.
            Err(_) => match self.handle.await {
                Err(e) => JobStatus::Failed(format!("index job aborted: {e}")),
                Ok(()) => self.status.borrow().clone(),
            },
        }
    }
}

/// Start `index_all_sources` in the background.
pub fn spawn_index_all(indexer: Arc<Indexer>, progress: Arc<dyn ProgressReporter>) -> IndexJob {
    let (tx, rx) = watch::channel(JobStatus::Running);

    let handle = tokio::spawn(async move {
        info!("background index job started");
        let status = match indexer.index_all_sources(progress.as_ref()).await {
            Ok(outcomes) => JobStatus::Completed(outcomes),
            Err(e) => {
                error!(error = %e, "background index job failed");
                JobStatus::Failed(e.to_string())
            }
        };
        let _ = tx.send(status);
    });

    IndexJob { status: rx, handle }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::SilentProgress;
    use crate::pipeline::tests::{llm_reply, mount_page, test_indexer, test_storage};
    use expofinder_shared::NewVenue;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer};

    #[tokio::test]
    async fn job_reports_completed_outcomes() {
        let server = MockServer::start().await;
        mount_page(&server, "/expo").await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(llm_reply("[{\"title\": \"Ensor\"}]"))
            .mount(&server)
            .await;

        let storage = test_storage().await;
        let url = format!("{}/expo", server.uri());
        let venue = storage
            .upsert_venue(&NewVenue {
                name: "Mu.ZEE".into(),
                city: "Ostend".into(),
                country: "Belgium".into(),
                website_url: Some(url.clone()),
                ..NewVenue::default()
            })
            .await
            .unwrap();
        storage.ensure_source(&venue.id, &url).await.unwrap();

        let indexer = Arc::new(test_indexer(storage, &server));
        let job = spawn_index_all(indexer, Arc::new(SilentProgress));

        match job.wait().await {
            JobStatus::Completed(outcomes) => {
                assert_eq!(outcomes.len(), 1);
                assert_eq!(outcomes[0].venue(), "Mu.ZEE");
                assert_eq!(outcomes[0].exhibitions_found(), 1);
            }
            other => panic!("unexpected status: {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_run_completes() {
        let server = MockServer::start().await;
        let indexer = Arc::new(test_indexer(test_storage().await, &server));
        let job = spawn_index_all(indexer, Arc::new(SilentProgress));
        while !job.status().is_finished() {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert_eq!(job.status(), JobStatus::Completed(Vec::new()));
        assert_eq!(job.wait().await, JobStatus::Completed(Vec::new()));
    }

    struct PanickingProgress;

    impl ProgressReporter for PanickingProgress {
        fn phase(&self, _name: &str) {}
        fn source_started(&self, _venue: &str, _current: usize, _total: usize) {
            panic!("reporter blew up");
        }
        fn source_finished(&self, _outcome: &IndexOutcome) {}
    }

    #[tokio::test]
    async fn panicked_task_resolves_to_failed() {
        let server = MockServer::start().await;
        let storage = test_storage().await;
        let venue = storage
            .upsert_venue(&NewVenue {
                name: "FOMU".into(),
                city: "Antwerp".into(),
                country: "Belgium".into(),
                ..NewVenue::default()
            })
            .await
            .unwrap();
        storage
            .ensure_source(&venue.id, &format!("{}/expo", server.uri()))
            .await
            .unwrap();

        let indexer = Arc::new(test_indexer(storage, &server));
        let job = spawn_index_all(indexer, Arc::new(PanickingProgress));

        let status = tokio::time::timeout(std::time::Duration::from_secs(5), job.wait())
            .await
            .expect("wait returns once the task is gone");
        match status {
            JobStatus::Failed(message) => assert!(message.contains("aborted"), "{message}"),
            other => panic!("unexpected status: {other:?}"),
        }
    }
}
