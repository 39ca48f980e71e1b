use super::race::IdentificationRace;
use crate::error::BackendError;
use crate::model::EmployeeSummary;
use crate::services::DirectoryService;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Result of one directory query
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResponse {
    /// Sequence number of the query that produced this response
    pub sequence: u64,
    pub query: String,
    pub results: Result<Vec<EmployeeSummary>, BackendError>,
}

/// Manual identification by directory lookup.
///
/// Every query change supersedes the previous one: the in-flight lookup is aborted and
/// only the newest sequence number is considered current.
pub struct ManualSearch {
    directory: Arc<dyn DirectoryService>,
    min_chars: usize,
    limit: usize,
    sequence: u64,
    in_flight: Option<JoinHandle<()>>,
}

impl ManualSearch {
    pub fn new(directory: Arc<dyn DirectoryService>, min_chars: usize, limit: usize) -> Self {
        Self {
            directory,
            min_chars,
            limit: limit.max(1),
            sequence: 0,
            in_flight: None,
        }
    }

    /// Issue a lookup for `query`, delivering the response through `deliver`.
    ///
    /// Queries shorter than the minimum are answered immediately with no results.
    pub fn submit<F>(&mut self, query: &str, race: &IdentificationRace, deliver: F) -> u64
    where
        F: FnOnce(SearchResponse) + Send + 'static,
    {
        self.cancel();
        self.sequence += 1;
        let sequence = self.sequence;
        let query = query.trim().to_string();

        if query.chars().count() < self.min_chars {
            deliver(SearchResponse {
                sequence,
                query,
                results: Ok(Vec::new()),
            });
            return sequence;
        }

        let directory = Arc::clone(&self.directory);
        let limit = self.limit;
        let token = race.token();

        debug!("Directory search #{} for '{}'", sequence, query);
        self.in_flight = Some(tokio::spawn(async move {
            let results = tokio::select! {
                _ = token.cancelled() => {
                    debug!("Search #{} cancelled", sequence);
                    return;
                }
                results = directory.search_employees(&query) => results,
            };

            let results = results
                .map(|mut found| {
                    found.truncate(limit);
                    found
                })
                .map_err(|e| {
                    warn!("Directory search for '{}' failed: {}", query, e);
                    e
                });

            deliver(SearchResponse {
                sequence,
                query,
                results,
            });
        }));

        sequence
    }

    /// Whether `sequence` names the newest query
    pub fn is_current(&self, sequence: u64) -> bool {
        sequence == self.sequence
    }

    pub fn has_pending(&self) -> bool {
        self.in_flight
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Abort any in-flight lookup
    pub fn cancel(&mut self) {
        if let Some(handle) = self.in_flight.take() {
            handle.abort();
        }
    }
}

impl Drop for ManualSearch {
    fn drop(&mut self) {
        self.cancel();
    }
}
