//! Service facade: single-flight full reindex, stop requests, page reindex, search and statistics.

use crate::controls::CrawlControls;
use crate::crawler::StopFlag;
use crate::fetcher::Fetch;
use crate::indexer::{Indexer, ReindexError};
use crate::model::Page;
use crate::normalizer::TextNormalizer;
use crate::search::{SearchEngine, SearchError, SearchRequest, SearchResults};
use crate::sites::SitesList;
use crate::stats::{self, StatisticsData};
use crate::store::{Storage, StoreError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Errors surfaced at the service boundary.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// A full reindex is already running.
    #[error("indexing is already running")]
    AlreadyIndexing,
    /// A stop was requested while nothing was running.
    #[error("indexing is not running")]
    NotIndexing,
    /// Single-page reindex failed.
    #[error(transparent)]
    Reindex(#[from] ReindexError),
    /// Search failed.
    #[error(transparent)]
    Search(#[from] SearchError),
    /// Statistics could not be read.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Owns the indexer, the search engine and the reindex single-flight state.
pub struct SearchService<S, F> {
    indexer: Arc<Indexer<S, F>>,
    engine: SearchEngine<S>,
    running: Arc<AtomicBool>,
    stop: Mutex<Option<StopFlag>>,
}

/// Clears the running flag when the reindex task ends, panics included.
struct RunningGuard {
    flag: Arc<AtomicBool>,
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

impl<S: Storage, F: Fetch> SearchService<S, F> {
    /// Wires the service over shared storage and fetcher handles.
    pub fn new(
        store: Arc<S>,
        fetcher: Arc<F>,
        normalizer: TextNormalizer,
        sites: SitesList,
        controls: CrawlControls,
    ) -> Self {
        let engine = SearchEngine::new(Arc::clone(&store), normalizer.clone());
        let indexer = Indexer::new(store, fetcher, normalizer, sites, controls);
        Self {
            indexer: Arc::new(indexer),
            engine,
            running: Arc::new(AtomicBool::new(false)),
            stop: Mutex::new(None),
        }
    }

    /// Whether a full reindex is running.
    pub fn is_indexing(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Starts a full reindex in the background.
    ///
    /// The returned handle resolves when the run ends; dropping it detaches the run.
    pub fn start_indexing(&self) -> Result<JoinHandle<()>, ServiceError> {
        let mut slot = self.stop.lock().unwrap_or_else(PoisonError::into_inner);
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ServiceError::AlreadyIndexing);
        }
        let guard = RunningGuard {
            flag: Arc::clone(&self.running),
        };
        let stop = StopFlag::new();
        *slot = Some(stop.clone());
        drop(slot);

        let indexer = Arc::clone(&self.indexer);
        info!("full reindex requested");
        Ok(tokio::spawn(async move {
            let _guard = guard;
            match indexer.full_reindex(&stop).await {
                Ok(report) => info!(pages = report.pages, lemmas = report.lemmas, "indexing complete"),
                Err(err) => error!(error = %err, "indexing aborted"),
            }
        }))
    }

    /// Raises the stop signal of the running reindex and returns immediately.
    pub fn stop_indexing(&self) -> Result<(), ServiceError> {
        let slot = self.stop.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.is_indexing() {
            return Err(ServiceError::NotIndexing);
        }
        if let Some(stop) = slot.as_ref() {
            stop.request_stop();
        }
        info!("stop requested");
        Ok(())
    }

    /// Refetches and reindexes one page.
    pub async fn index_page(&self, url: &str) -> Result<Page, ServiceError> {
        Ok(self.indexer.reindex_page(url).await?)
    }

    /// Runs a search.
    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResults, ServiceError> {
        Ok(self.engine.search(request).await?)
    }

    /// Current per-site and total counters.
    pub async fn statistics(&self) -> Result<StatisticsData, ServiceError> {
        Ok(stats::collect(self.indexer.store().as_ref(), self.is_indexing()).await?)
    }
}
