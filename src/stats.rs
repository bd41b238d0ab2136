//! Index statistics read straight off storage.

use crate::model::{epoch_ms, SiteStatus};
use crate::store::{Storage, StoreError};
use serde::Serialize;

/// Totals across every site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TotalStatistics {
    /// Site records.
    pub sites: usize,
    /// Stored pages.
    pub pages: usize,
    /// Lemma rows.
    pub lemmas: usize,
    /// Whether a full reindex is running.
    pub indexing: bool,
}

/// Per-site row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailedStatisticsItem {
    /// Site root URL.
    pub url: String,
    /// Site display name.
    pub name: String,
    /// Lifecycle state.
    pub status: SiteStatus,
    /// Last heartbeat or transition, epoch milliseconds.
    pub status_time: u64,
    /// Last error, empty when none.
    pub error: String,
    /// Stored pages of this site.
    pub pages: usize,
    /// Lemma rows of this site.
    pub lemmas: usize,
}

/// Totals plus one row per site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatisticsData {
    /// Totals.
    pub total: TotalStatistics,
    /// Per-site rows ordered by site id.
    pub detailed: Vec<DetailedStatisticsItem>,
}

/// Counts sites, pages and lemmas currently in `store`.
pub async fn collect<S: Storage>(store: &S, indexing: bool) -> Result<StatisticsData, StoreError> {
    let sites = store.find_sites().await?;
    let mut detailed = Vec::with_capacity(sites.len());
    for site in &sites {
        detailed.push(DetailedStatisticsItem {
            url: site.url.clone(),
            name: site.name.clone(),
            status: site.status,
            status_time: epoch_ms(site.status_time),
            error: site.last_error.clone().unwrap_or_default(),
            pages: store.count_pages(Some(site.id)).await?,
            lemmas: store.count_lemmas(Some(site.id)).await?,
        });
    }
    Ok(StatisticsData {
        total: TotalStatistics {
            sites: sites.len(),
            pages: store.count_pages(None).await?,
            lemmas: store.count_lemmas(None).await?,
            indexing,
        },
        detailed,
    })
}
