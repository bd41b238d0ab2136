#![warn(missing_docs)]
//! Concurrent site crawler with a lemma-based inverted index and ranked snippet search.

pub mod api;
pub mod controls;
pub mod crawler;
pub mod fetcher;
pub mod html;
pub mod indexer;
pub mod model;
pub mod morphology;
pub mod normalizer;
pub mod search;
pub mod service;
pub mod sites;
pub mod snippet;
pub mod stats;
pub mod store;

#[cfg(test)]
mod testing;

pub use controls::{Cli, CrawlControls};
pub use crawler::{CrawlError, CrawlSummary, Crawler, StopFlag};
pub use fetcher::{Fetch, FetchError, FetchedPage, HttpFetcher, OutboundLink};
pub use indexer::{IndexReport, Indexer, IndexingError, ReindexError, STOPPED_BY_USER};
pub use model::{
    IndexEntry, IndexEntryId, Lemma, LemmaId, Page, PageId, Site, SiteId, SiteStatus,
};
pub use morphology::{DictionaryMorphology, Morphology, MorphologyError, WordAnalysis};
pub use normalizer::{LemmaCounts, TextNormalizer};
pub use search::{SearchEngine, SearchError, SearchHit, SearchRequest, SearchResults};
pub use service::{SearchService, ServiceError};
pub use sites::{SiteConfig, SitesError, SitesList};
pub use stats::StatisticsData;
pub use store::{MemoryStore, PostgresStore, Storage, StoreError};
