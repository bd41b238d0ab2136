//! Full-site and single-page index maintenance.

use crate::controls::CrawlControls;
use crate::crawler::{CrawlError, Crawler, StopFlag};
use crate::fetcher::{page_path, Fetch, FetchError};
use crate::model::{
    LemmaId, NewIndexEntry, NewLemma, NewPage, NewSite, Page, PageId, Site, SiteId, SiteStatus,
};
use crate::normalizer::{LemmaCounts, TextNormalizer};
use crate::sites::SitesList;
use crate::store::{Storage, StoreError};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Instant, SystemTime};
use tokio::sync::Mutex;
use tokio::task::{JoinError, JoinSet};
use tracing::{error, info, warn};
use url::Url;

/// Error recorded on sites whose crawl was interrupted by a stop request.
pub const STOPPED_BY_USER: &str = "Indexing stopped by user";

/// Fatal failure of a full reindex.
#[derive(Debug, thiserror::Error)]
pub enum IndexingError {
    /// Storage rejected a wipe, insert or update.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// A crawl or lemmatization task panicked.
    #[error("indexing task failed: {0}")]
    Join(#[from] JoinError),
}

/// Failure of a single-page reindex.
#[derive(Debug, thiserror::Error)]
pub enum ReindexError {
    /// The argument is not an absolute URL.
    #[error("invalid url {url:?}: {source}")]
    InvalidUrl {
        /// Raw argument.
        url: String,
        /// Parse error.
        #[source]
        source: url::ParseError,
    },
    /// No configured site shares the URL's origin.
    #[error("{0} is outside the configured sites")]
    NotConfigured(String),
    /// The owning site has not been through a full reindex yet.
    #[error("site of {0} has not been indexed yet")]
    NotYetIndexed(String),
    /// The page could not be fetched; the stored index is untouched.
    #[error(transparent)]
    Fetch(#[from] FetchError),
    /// Storage failure while rewriting the page's index rows.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Lemmatization task panicked.
    #[error("lemmatization task failed: {0}")]
    Join(#[from] JoinError),
}

/// Row counts produced by a full reindex.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexReport {
    /// Site records created.
    pub sites: usize,
    /// Pages lemmatized.
    pub pages: usize,
    /// Lemma rows written.
    pub lemmas: usize,
    /// Index entries written.
    pub entries: usize,
}

/// Drives crawling and keeps lemma and index tables consistent.
pub struct Indexer<S, F> {
    store: Arc<S>,
    fetcher: Arc<F>,
    crawler: Crawler<S, F>,
    normalizer: TextNormalizer,
    sites: SitesList,
    page_lock: Mutex<()>,
}

impl<S: Storage, F: Fetch> Indexer<S, F> {
    /// Wires an indexer over shared storage and fetcher handles.
    pub fn new(
        store: Arc<S>,
        fetcher: Arc<F>,
        normalizer: TextNormalizer,
        sites: SitesList,
        controls: CrawlControls,
    ) -> Self {
        let crawler = Crawler::new(Arc::clone(&store), Arc::clone(&fetcher), controls);
        Self {
            store,
            fetcher,
            crawler,
            normalizer,
            sites,
            page_lock: Mutex::new(()),
        }
    }

    /// Backing store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Normalizer used for page content.
    pub fn normalizer(&self) -> &TextNormalizer {
        &self.normalizer
    }

    /// Configured sites.
    pub fn sites(&self) -> &SitesList {
        &self.sites
    }

    /// Wipes every table, recrawls all configured sites and rebuilds lemmas and entries.
    ///
    /// Sites crawl concurrently. A raised `stop` ends the crawls early, marks the
    /// affected sites FAILED and still indexes whatever pages were stored.
    pub async fn full_reindex(&self, stop: &StopFlag) -> Result<IndexReport, IndexingError> {
        let started = Instant::now();
        self.wipe().await?;

        let mut sites = Vec::with_capacity(self.sites.sites().len());
        for config in self.sites.sites() {
            let site = self
                .store
                .insert_site(NewSite {
                    url: config.url.clone(),
                    name: config.name.clone(),
                    status: SiteStatus::Indexing,
                    status_time: SystemTime::now(),
                })
                .await?;
            sites.push(site);
        }

        self.crawl_all(&sites, stop).await?;

        let mut report = IndexReport {
            sites: sites.len(),
            ..IndexReport::default()
        };
        let mut page_counts: Vec<(Page, LemmaCounts)> = Vec::new();
        let mut lemma_ids: HashMap<(SiteId, String), LemmaId> = HashMap::new();
        for site in &sites {
            let pages = self.store.find_pages_by_site(site.id).await?;
            let mut frequencies: HashMap<String, u32> = HashMap::new();
            for page in pages {
                let counts = self.lemmatize(page.content.clone()).await?;
                for lemma in counts.keys() {
                    *frequencies.entry(lemma.clone()).or_insert(0) += 1;
                }
                page_counts.push((page, counts));
            }

            let mut frequencies: Vec<(String, u32)> = frequencies.into_iter().collect();
            frequencies.sort();
            for (lemma, frequency) in frequencies {
                let row = self
                    .store
                    .insert_lemma(NewLemma {
                        site_id: site.id,
                        lemma: lemma.clone(),
                        frequency,
                    })
                    .await?;
                lemma_ids.insert((site.id, lemma), row.id);
                report.lemmas += 1;
            }
        }

        report.pages = page_counts.len();
        for (page, counts) in &page_counts {
            for (lemma, weight) in counts {
                let Some(lemma_id) = lemma_ids.get(&(page.site_id, lemma.clone())) else {
                    warn!(page = %page.id, lemma = %lemma, "lemma row missing for page entry");
                    continue;
                };
                self.store
                    .insert_entry(NewIndexEntry {
                        page_id: page.id,
                        lemma_id: *lemma_id,
                        weight: *weight,
                    })
                    .await?;
                report.entries += 1;
            }
        }

        info!(
            sites = report.sites,
            pages = report.pages,
            lemmas = report.lemmas,
            entries = report.entries,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "full reindex finished"
        );
        Ok(report)
    }

    async fn wipe(&self) -> Result<(), StoreError> {
        self.store.delete_entries().await?;
        self.store.delete_lemmas().await?;
        self.store.delete_pages().await?;
        self.store.delete_sites().await
    }

    async fn crawl_all(&self, sites: &[Site], stop: &StopFlag) -> Result<(), IndexingError> {
        let mut crawls = JoinSet::new();
        for site in sites {
            let crawler = self.crawler.clone();
            let store = Arc::clone(&self.store);
            let stop = stop.clone();
            let mut site = site.clone();
            crawls.spawn(async move {
                let outcome = crawler.crawl_site(&site, &stop).await;
                let (status, last_error) = site_outcome(&outcome, &stop);
                if let Err(err) = &outcome {
                    error!(site = %site.url, error = %err, "site crawl failed");
                }
                site.transition(status, last_error);
                store.update_site(&site).await
            });
        }

        let mut first_error = None;
        while let Some(joined) = crawls.join_next().await {
            let result = joined
                .map_err(IndexingError::from)
                .and_then(|updated| updated.map_err(IndexingError::from));
            if let Err(err) = result {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    async fn lemmatize(&self, html: String) -> Result<LemmaCounts, JoinError> {
        let normalizer = self.normalizer.clone();
        tokio::task::spawn_blocking(move || normalizer.lemmatize(&html)).await
    }

    /// Refetches one page and replaces its contribution to the lemma and index tables.
    ///
    /// The fetch happens first, so a failed fetch leaves the stored index untouched.
    /// Calls are serialized.
    pub async fn reindex_page(&self, raw_url: &str) -> Result<Page, ReindexError> {
        let mut url = Url::parse(raw_url.trim()).map_err(|source| ReindexError::InvalidUrl {
            url: raw_url.to_string(),
            source,
        })?;
        url.set_fragment(None);
        if self.sites.site_for(&url).is_none() {
            return Err(ReindexError::NotConfigured(url.to_string()));
        }

        let _serialized = self.page_lock.lock().await;
        let site = self
            .store
            .find_sites()
            .await?
            .into_iter()
            .find(|site| site.contains_url(&url))
            .ok_or_else(|| ReindexError::NotYetIndexed(url.to_string()))?;
        let path = page_path(&url);

        let fetched = self.fetcher.fetch(&url).await?;
        let counts = self.lemmatize(fetched.html.clone()).await?;

        let page = match self.store.find_page_by_path(site.id, &path).await? {
            Some(mut page) => {
                self.remove_contribution(page.id).await?;
                page.code = fetched.status;
                page.content = fetched.html;
                self.store.update_page(&page).await?;
                page
            }
            None => {
                self.store
                    .insert_page(NewPage {
                        site_id: site.id,
                        path: path.clone(),
                        code: fetched.status,
                        content: fetched.html,
                    })
                    .await?
            }
        };

        let mut counts: Vec<(String, u32)> = counts.into_iter().collect();
        counts.sort();
        for (text, weight) in counts {
            let lemma = match self.store.find_lemma_by_text(site.id, &text).await? {
                Some(mut lemma) => {
                    lemma.frequency += 1;
                    self.store.update_lemma(&lemma).await?;
                    lemma
                }
                None => {
                    self.store
                        .insert_lemma(NewLemma {
                            site_id: site.id,
                            lemma: text,
                            frequency: 1,
                        })
                        .await?
                }
            };
            self.store
                .insert_entry(NewIndexEntry {
                    page_id: page.id,
                    lemma_id: lemma.id,
                    weight,
                })
                .await?;
        }

        info!(site = %site.url, path = %page.path, "page reindexed");
        Ok(page)
    }

    async fn remove_contribution(&self, page_id: PageId) -> Result<(), StoreError> {
        for entry in self.store.find_entries_by_page(page_id).await? {
            let Some(mut lemma) = self.store.find_lemma(entry.lemma_id).await? else {
                continue;
            };
            if lemma.frequency <= 1 {
                self.store.delete_lemma(lemma.id).await?;
            } else {
                lemma.frequency -= 1;
                self.store.update_lemma(&lemma).await?;
            }
        }
        self.store.delete_entries_by_page(page_id).await
    }
}

fn site_outcome<T>(
    outcome: &Result<T, CrawlError>,
    stop: &StopFlag,
) -> (SiteStatus, Option<String>) {
    match outcome {
        Err(err) => (SiteStatus::Failed, Some(err.to_string())),
        Ok(_) if stop.is_stopped() => (SiteStatus::Failed, Some(STOPPED_BY_USER.to_string())),
        Ok(_) => (SiteStatus::Indexed, None),
    }
}
