//! Record-store contract consumed by the indexer, the crawler and the search engine.
//!
//! Backends are plain record stores: no joins, no cascades and no transactions are
//! assumed. Callers delete dependents explicitly (index entries before lemmas and
//! pages, those before sites).

use crate::model::{
    IndexEntry, Lemma, LemmaId, NewIndexEntry, NewLemma, NewPage, NewSite, Page, PageId, Site,
    SiteId,
};
use std::future::Future;
use std::time::SystemTime;

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

/// Result alias for storage calls.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors surfaced by storage backends.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A unique key was violated.
    #[error("{entity} already exists: {key}")]
    Conflict {
        /// Table or record kind.
        entity: &'static str,
        /// Human readable key that collided.
        key: String,
    },
    /// An update targeted a record that does not exist.
    #[error("{entity} {id} not found")]
    NotFound {
        /// Table or record kind.
        entity: &'static str,
        /// Missing record id.
        id: i64,
    },
    /// A stored value could not be mapped back into a record.
    #[error("corrupt {entity} row: {message}")]
    Corrupt {
        /// Table or record kind.
        entity: &'static str,
        /// Description of the bad value.
        message: String,
    },
    /// In-memory tables were poisoned by a panicking writer.
    #[error("storage lock poisoned")]
    Poisoned,
    /// Postgres driver failure.
    #[error("postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),
}

/// Read/write contract for sites, pages, lemmas and index entries.
pub trait Storage: Send + Sync + 'static {
    /// Inserts a site and returns it with its assigned id.
    fn insert_site(&self, site: NewSite) -> impl Future<Output = StoreResult<Site>> + Send;
    /// Overwrites every column of an existing site.
    fn update_site(&self, site: &Site) -> impl Future<Output = StoreResult<()>> + Send;
    /// Refreshes only the status time of a site (crawl heartbeat).
    fn touch_site(
        &self,
        id: SiteId,
        at: SystemTime,
    ) -> impl Future<Output = StoreResult<()>> + Send;
    /// All sites ordered by id.
    fn find_sites(&self) -> impl Future<Output = StoreResult<Vec<Site>>> + Send;
    /// Site by id.
    fn find_site(&self, id: SiteId) -> impl Future<Output = StoreResult<Option<Site>>> + Send;
    /// Site by its exact root URL.
    fn find_site_by_url(
        &self,
        url: &str,
    ) -> impl Future<Output = StoreResult<Option<Site>>> + Send;
    /// Removes every site.
    fn delete_sites(&self) -> impl Future<Output = StoreResult<()>> + Send;

    /// Inserts a page; `(site_id, path)` must be unique.
    fn insert_page(&self, page: NewPage) -> impl Future<Output = StoreResult<Page>> + Send;
    /// Overwrites the code and content of an existing page.
    fn update_page(&self, page: &Page) -> impl Future<Output = StoreResult<()>> + Send;
    /// Page by id.
    fn find_page(&self, id: PageId) -> impl Future<Output = StoreResult<Option<Page>>> + Send;
    /// All pages ordered by id.
    fn find_pages(&self) -> impl Future<Output = StoreResult<Vec<Page>>> + Send;
    /// Pages of one site ordered by id.
    fn find_pages_by_site(
        &self,
        site_id: SiteId,
    ) -> impl Future<Output = StoreResult<Vec<Page>>> + Send;
    /// Page by site and relative path.
    fn find_page_by_path(
        &self,
        site_id: SiteId,
        path: &str,
    ) -> impl Future<Output = StoreResult<Option<Page>>> + Send;
    /// Number of pages, optionally restricted to one site.
    fn count_pages(
        &self,
        site_id: Option<SiteId>,
    ) -> impl Future<Output = StoreResult<usize>> + Send;
    /// Removes every page.
    fn delete_pages(&self) -> impl Future<Output = StoreResult<()>> + Send;

    /// Inserts a lemma; `(site_id, lemma)` must be unique.
    fn insert_lemma(&self, lemma: NewLemma) -> impl Future<Output = StoreResult<Lemma>> + Send;
    /// Overwrites the frequency of an existing lemma.
    fn update_lemma(&self, lemma: &Lemma) -> impl Future<Output = StoreResult<()>> + Send;
    /// Lemma by id.
    fn find_lemma(&self, id: LemmaId)
        -> impl Future<Output = StoreResult<Option<Lemma>>> + Send;
    /// All lemmas ordered by id.
    fn find_lemmas(&self) -> impl Future<Output = StoreResult<Vec<Lemma>>> + Send;
    /// Lemmas of one site ordered by id.
    fn find_lemmas_by_site(
        &self,
        site_id: SiteId,
    ) -> impl Future<Output = StoreResult<Vec<Lemma>>> + Send;
    /// Lemma by site and normalized text.
    fn find_lemma_by_text(
        &self,
        site_id: SiteId,
        lemma: &str,
    ) -> impl Future<Output = StoreResult<Option<Lemma>>> + Send;
    /// Number of lemmas, optionally restricted to one site.
    fn count_lemmas(
        &self,
        site_id: Option<SiteId>,
    ) -> impl Future<Output = StoreResult<usize>> + Send;
    /// Removes one lemma.
    fn delete_lemma(&self, id: LemmaId) -> impl Future<Output = StoreResult<()>> + Send;
    /// Removes every lemma.
    fn delete_lemmas(&self) -> impl Future<Output = StoreResult<()>> + Send;

    /// Inserts an index entry; `(page_id, lemma_id)` must be unique.
    fn insert_entry(
        &self,
        entry: NewIndexEntry,
    ) -> impl Future<Output = StoreResult<IndexEntry>> + Send;
    /// Entries of one page.
    fn find_entries_by_page(
        &self,
        page_id: PageId,
    ) -> impl Future<Output = StoreResult<Vec<IndexEntry>>> + Send;
    /// Entries of one lemma.
    fn find_entries_by_lemma(
        &self,
        lemma_id: LemmaId,
    ) -> impl Future<Output = StoreResult<Vec<IndexEntry>>> + Send;
    /// The entry linking `lemma_id` and `page_id`, if any.
    fn find_entry(
        &self,
        lemma_id: LemmaId,
        page_id: PageId,
    ) -> impl Future<Output = StoreResult<Option<IndexEntry>>> + Send;
    /// Removes every entry of one page.
    fn delete_entries_by_page(
        &self,
        page_id: PageId,
    ) -> impl Future<Output = StoreResult<()>> + Send;
    /// Removes every entry.
    fn delete_entries(&self) -> impl Future<Output = StoreResult<()>> + Send;
}
