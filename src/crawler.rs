//! Recursive fork/join crawl of a single site.
//!
//! Every discovered URL becomes its own tokio task. A task fetches its page,
//! stores it, spawns children for unseen same-site links into a `JoinSet`,
//! waits for all of them and then refreshes the site heartbeat.

use crate::controls::CrawlControls;
use crate::fetcher::{Fetch, FetchedPage};
use crate::model::{NewPage, Site, SiteId};
use crate::store::{Storage, StoreError};
use futures_util::future::{BoxFuture, FutureExt};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Instant, SystemTime};
use tokio::sync::Notify;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, info, warn};
use url::Url;

/// Cloneable stop signal shared by every task of a reindex run.
#[derive(Clone, Default)]
pub struct StopFlag {
    inner: Arc<StopInner>,
}

#[derive(Default)]
struct StopInner {
    stopped: AtomicBool,
    notify: Notify,
}

impl StopFlag {
    /// Creates a lowered flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the flag and wakes every waiter.
    pub fn request_stop(&self) {
        self.inner.stopped.store(true, Ordering::Release);
        self.inner.notify.notify_waiters();
    }

    /// Whether the flag has been raised.
    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::Acquire)
    }

    /// Resolves once the flag is raised.
    pub async fn stopped(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_stopped() {
                return;
            }
            notified.await;
        }
    }
}

/// Errors that fail a site's crawl.
#[derive(Debug, thiserror::Error)]
pub enum CrawlError {
    /// The site root is not a valid URL.
    #[error("invalid site url {url:?}: {source}")]
    InvalidRoot {
        /// Stored site URL.
        url: String,
        /// Parse error.
        #[source]
        source: url::ParseError,
    },
    /// Persisting a page or the heartbeat failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// A crawl task panicked or was cancelled.
    #[error("crawl task failed: {0}")]
    Join(#[from] JoinError),
}

/// Counters for one crawl run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlSummary {
    /// Pages persisted.
    pub pages_stored: usize,
    /// URLs whose fetch failed.
    pub fetch_failures: usize,
    /// Links skipped because their URL was already seen.
    pub duplicate_links: usize,
}

#[derive(Default)]
struct CrawlMetrics {
    pages_stored: AtomicUsize,
    fetch_failures: AtomicUsize,
    duplicate_links: AtomicUsize,
}

impl CrawlMetrics {
    fn record_page_stored(&self) {
        self.pages_stored.fetch_add(1, Ordering::Relaxed);
    }

    fn record_fetch_failure(&self) {
        self.fetch_failures.fetch_add(1, Ordering::Relaxed);
    }

    fn record_duplicate(&self) {
        self.duplicate_links.fetch_add(1, Ordering::Relaxed);
    }

    fn summary(&self) -> CrawlSummary {
        CrawlSummary {
            pages_stored: self.pages_stored.load(Ordering::Relaxed),
            fetch_failures: self.fetch_failures.load(Ordering::Relaxed),
            duplicate_links: self.duplicate_links.load(Ordering::Relaxed),
        }
    }
}

/// Crawls sites into a store through a fetcher.
pub struct Crawler<S, F> {
    store: Arc<S>,
    fetcher: Arc<F>,
    controls: CrawlControls,
}

impl<S, F> Clone for Crawler<S, F> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            fetcher: Arc::clone(&self.fetcher),
            controls: self.controls.clone(),
        }
    }
}

impl<S: Storage, F: Fetch> Crawler<S, F> {
    /// Builds a crawler over shared storage and fetcher handles.
    pub fn new(store: Arc<S>, fetcher: Arc<F>, controls: CrawlControls) -> Self {
        Self {
            store,
            fetcher,
            controls,
        }
    }

    /// Crawls every page reachable from `site.url`, storing pages under `site.id`.
    ///
    /// Returns once the whole task tree has unwound, either by exhausting the
    /// site or by observing `stop`.
    pub async fn crawl_site(&self, site: &Site, stop: &StopFlag) -> Result<CrawlSummary, CrawlError> {
        let root = Url::parse(&site.url).map_err(|source| CrawlError::InvalidRoot {
            url: site.url.clone(),
            source,
        })?;
        let run = Arc::new(CrawlRun {
            store: Arc::clone(&self.store),
            fetcher: Arc::clone(&self.fetcher),
            controls: self.controls.clone(),
            site_id: site.id,
            stop: stop.clone(),
            seen: Mutex::new(HashSet::from([root.as_str().to_string()])),
            metrics: CrawlMetrics::default(),
        });

        let started = Instant::now();
        info!(site = %site.url, "crawl started");
        let result = visit(Arc::clone(&run), root, String::new(), 0).await;
        let summary = run.metrics.summary();
        info!(
            site = %site.url,
            pages_stored = summary.pages_stored,
            fetch_failures = summary.fetch_failures,
            duplicate_links = summary.duplicate_links,
            stopped = stop.is_stopped(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "crawl finished"
        );
        result.map(|()| summary)
    }
}

struct CrawlRun<S, F> {
    store: Arc<S>,
    fetcher: Arc<F>,
    controls: CrawlControls,
    site_id: SiteId,
    stop: StopFlag,
    seen: Mutex<HashSet<String>>,
    metrics: CrawlMetrics,
}

impl<S: Storage, F: Fetch> CrawlRun<S, F> {
    /// Marks `url` seen, returning false when it already was.
    fn mark_seen(&self, url: &Url) -> bool {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.as_str().to_string())
    }

    /// Sleeps for the politeness delay; false when the stop flag cut it short.
    async fn politeness_wait(&self) -> bool {
        let delay = self.controls.politeness_delay();
        if delay.is_zero() {
            return !self.stop.is_stopped();
        }
        tokio::select! {
            biased;
            _ = self.stop.stopped() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    async fn store_page(&self, path: &str, page: &FetchedPage) -> Result<(), StoreError> {
        let inserted = self
            .store
            .insert_page(NewPage {
                site_id: self.site_id,
                path: path.to_string(),
                code: page.status,
                content: page.html.clone(),
            })
            .await;
        match inserted {
            Ok(_) => {
                self.metrics.record_page_stored();
                Ok(())
            }
            Err(StoreError::Conflict { .. }) => {
                debug!(path, "page already stored");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }
}

fn visit<S: Storage, F: Fetch>(
    run: Arc<CrawlRun<S, F>>,
    url: Url,
    path: String,
    depth: usize,
) -> BoxFuture<'static, Result<(), CrawlError>> {
    async move {
        if run.stop.is_stopped() || !run.politeness_wait().await {
            return Ok(());
        }

        let page = match run.fetcher.fetch(&url).await {
            Ok(page) => Some(page),
            Err(err) => {
                warn!(url = %url, error = %err, "fetch failed, skipping");
                run.metrics.record_fetch_failure();
                None
            }
        };

        let mut outcome: Result<(), CrawlError> = Ok(());
        let mut children = JoinSet::new();
        if let Some(page) = page {
            if !path.is_empty() {
                outcome = run.store_page(&path, &page).await.map_err(CrawlError::from);
            }
            if outcome.is_ok() && run.controls.allows_depth(depth + 1) {
                for link in page.links {
                    if run.mark_seen(&link.url) {
                        children.spawn(visit(Arc::clone(&run), link.url, link.path, depth + 1));
                    } else {
                        run.metrics.record_duplicate();
                    }
                }
            }
        }

        while let Some(joined) = children.join_next().await {
            let child = joined.map_err(CrawlError::from).and_then(|result| result);
            if let Err(err) = child {
                if outcome.is_ok() {
                    outcome = Err(err);
                }
            }
        }

        if let Err(err) = run.store.touch_site(run.site_id, SystemTime::now()).await {
            if outcome.is_ok() {
                outcome = Err(err.into());
            }
        }
        outcome
    }
    .boxed()
}
