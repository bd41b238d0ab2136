//! AND-semantics lemma search with frequency ranking and snippets.

use crate::html;
use crate::model::{Lemma, LemmaId, PageId, Site, SiteId};
use crate::normalizer::TextNormalizer;
use crate::snippet::build_snippet;
use crate::store::{Storage, StoreError};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Default page size of a search.
pub const DEFAULT_LIMIT: usize = 20;

/// Query parameters of a search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    /// Free-text query.
    pub query: String,
    /// Root URL of the only site to search, or every site when `None`.
    pub site: Option<String>,
    /// Pagination offset (see [`window_start`]).
    pub offset: usize,
    /// Maximum number of results returned.
    pub limit: usize,
}

impl SearchRequest {
    /// Query over every site with default pagination.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            site: None,
            offset: 0,
            limit: DEFAULT_LIMIT,
        }
    }
}

/// One ranked page.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    /// Root URL of the page's site.
    pub site: String,
    /// Display name of the page's site.
    pub site_name: String,
    /// Site-relative page path.
    pub uri: String,
    /// Page title.
    pub title: String,
    /// Highlighted text fragments.
    pub snippet: String,
    /// Score normalized to the best match (1.0).
    pub relevance: f64,
}

/// Total match count plus the requested window of hits.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchResults {
    /// Matches before pagination.
    pub count: usize,
    /// Ranked hits inside the window.
    pub data: Vec<SearchHit>,
}

/// Errors surfaced by [`SearchEngine::search`].
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// The query was blank.
    #[error("empty search query")]
    EmptyQuery,
    /// Storage failure while reading lemmas, entries or pages.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Reads lemma and index tables to answer queries.
pub struct SearchEngine<S> {
    store: Arc<S>,
    normalizer: TextNormalizer,
}

struct SiteMatch {
    lemmas: Vec<Lemma>,
    pages: Vec<PageId>,
}

impl<S: Storage> SearchEngine<S> {
    /// Builds an engine over shared storage.
    pub fn new(store: Arc<S>, normalizer: TextNormalizer) -> Self {
        Self { store, normalizer }
    }

    /// Runs `request`, returning the match count and the ranked, snippeted window.
    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResults, SearchError> {
        if request.query.trim().is_empty() {
            return Err(SearchError::EmptyQuery);
        }
        let mut query_lemmas: Vec<String> =
            self.normalizer.lemmatize(&request.query).into_keys().collect();
        if query_lemmas.is_empty() {
            return Ok(SearchResults::default());
        }
        query_lemmas.sort();

        let sites = self.candidate_sites(request.site.as_deref()).await?;
        let mut weights: HashMap<(LemmaId, PageId), u32> = HashMap::new();
        let mut matched: Vec<(SiteId, SiteMatch)> = Vec::new();
        for site in &sites {
            if let Some(site_match) = self.match_site(site, &query_lemmas, &mut weights).await? {
                matched.push((site.id, site_match));
            }
        }

        let mut raw_scores = Vec::new();
        for (_, site_match) in &matched {
            for page_id in &site_match.pages {
                let score = site_match
                    .lemmas
                    .iter()
                    .filter_map(|lemma| weights.get(&(lemma.id, *page_id)))
                    .sum::<u32>();
                raw_scores.push((*page_id, score));
            }
        }
        let ranked = rank_pages(raw_scores);
        if ranked.is_empty() {
            return Ok(SearchResults::default());
        }

        let lemma_set: HashSet<String> = query_lemmas.into_iter().collect();
        let sites_by_id: HashMap<SiteId, &Site> = sites.iter().map(|site| (site.id, site)).collect();
        let start = window_start(request.limit, request.offset);
        let mut data = Vec::new();
        for (page_id, relevance) in ranked.iter().skip(start).take(request.limit) {
            let Some(page) = self.store.find_page(*page_id).await? else {
                continue;
            };
            let Some(site) = sites_by_id.get(&page.site_id) else {
                continue;
            };
            let fragments = html::text_fragments(&page.content);
            data.push(SearchHit {
                site: site.url.clone(),
                site_name: site.name.clone(),
                uri: page.path.clone(),
                title: html::page_title(&page.content),
                snippet: build_snippet(&fragments, &lemma_set, |word| {
                    self.normalizer.lemma_of(word)
                }),
                relevance: *relevance,
            });
        }

        tracing::debug!(query = %request.query, count = ranked.len(), returned = data.len(), "search finished");
        Ok(SearchResults {
            count: ranked.len(),
            data,
        })
    }

    async fn candidate_sites(&self, filter: Option<&str>) -> Result<Vec<Site>, StoreError> {
        let Some(url) = filter.map(str::trim).filter(|url| !url.is_empty()) else {
            return self.store.find_sites().await;
        };
        if let Some(site) = self.store.find_site_by_url(url).await? {
            return Ok(vec![site]);
        }
        let alternate = match url.strip_suffix('/') {
            Some(trimmed) => trimmed.to_string(),
            None => format!("{url}/"),
        };
        Ok(self.store.find_site_by_url(&alternate).await?.into_iter().collect())
    }

    /// AND-matches every query lemma within one site, rarest lemma first.
    async fn match_site(
        &self,
        site: &Site,
        query_lemmas: &[String],
        weights: &mut HashMap<(LemmaId, PageId), u32>,
    ) -> Result<Option<SiteMatch>, StoreError> {
        let mut lemmas = Vec::with_capacity(query_lemmas.len());
        for text in query_lemmas {
            match self.store.find_lemma_by_text(site.id, text).await? {
                Some(lemma) => lemmas.push(lemma),
                None => return Ok(None),
            }
        }
        lemmas.sort_by_key(|lemma| (lemma.frequency, lemma.id));

        let mut pages: Vec<PageId> = Vec::new();
        for (idx, lemma) in lemmas.iter().enumerate() {
            let entries = self.store.find_entries_by_lemma(lemma.id).await?;
            for entry in &entries {
                weights.insert((lemma.id, entry.page_id), entry.weight);
            }
            if idx == 0 {
                pages = entries.iter().map(|entry| entry.page_id).collect();
            } else {
                let containing: HashSet<PageId> = entries.iter().map(|entry| entry.page_id).collect();
                pages.retain(|page| containing.contains(page));
            }
            if pages.is_empty() {
                return Ok(None);
            }
        }
        Ok(Some(SiteMatch { lemmas, pages }))
    }
}

/// First result index for a page of `limit` results at `offset`.
pub fn window_start(limit: usize, offset: usize) -> usize {
    limit.saturating_mul(offset) / 10
}

/// Normalizes raw scores by the global maximum and sorts them best first.
///
/// Ties keep ascending page-id order.
pub fn rank_pages(raw_scores: Vec<(PageId, u32)>) -> Vec<(PageId, f64)> {
    let max = raw_scores.iter().map(|(_, score)| *score).max().unwrap_or(0);
    let mut ranked: Vec<(PageId, f64)> = raw_scores
        .into_iter()
        .map(|(page, score)| {
            let relevance = if max == 0 {
                0.0
            } else {
                f64::from(score) / f64::from(max)
            };
            (page, relevance)
        })
        .collect();
    ranked.sort_by(|(left_page, left), (right_page, right)| {
        right
            .partial_cmp(left)
            .unwrap_or(Ordering::Equal)
            .then(left_page.cmp(right_page))
    });
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NewIndexEntry, NewLemma, NewPage};
    use crate::store::MemoryStore;
    use crate::testing::{normalizer, site_record};
    use pretty_assertions::assert_eq;

    struct Fixture {
        engine: SearchEngine<MemoryStore>,
        store: Arc<MemoryStore>,
    }

    impl Fixture {
        fn new() -> Self {
            let store = Arc::new(MemoryStore::new());
            Self {
                engine: SearchEngine::new(Arc::clone(&store), normalizer()),
                store,
            }
        }

        async fn page(&self, site: &Site, path: &str, html: &str) -> PageId {
            self.store
                .insert_page(NewPage {
                    site_id: site.id,
                    path: path.to_string(),
                    code: 200,
                    content: html.to_string(),
                })
                .await
                .unwrap()
                .id
        }

        /// Writes a lemma row and its entries, frequency = number of pages.
        async fn lemma(&self, site: &Site, text: &str, weights: &[(PageId, u32)]) {
            let lemma = self
                .store
                .insert_lemma(NewLemma {
                    site_id: site.id,
                    lemma: text.to_string(),
                    frequency: weights.len() as u32,
                })
                .await
                .unwrap();
            for (page_id, weight) in weights {
                self.store
                    .insert_entry(NewIndexEntry {
                        page_id: *page_id,
                        lemma_id: lemma.id,
                        weight: *weight,
                    })
                    .await
                    .unwrap();
            }
        }
    }

    fn relevances(results: &SearchResults) -> Vec<(String, f64)> {
        results
            .data
            .iter()
            .map(|hit| (hit.uri.clone(), hit.relevance))
            .collect()
    }

    #[tokio::test]
    async fn single_lemma_ranks_by_normalized_weight() {
        let fx = Fixture::new();
        let site = site_record(fx.store.as_ref(), "http://a.test", "A").await;
        let p1 = fx.page(&site, "/one", "<title>Один</title><p>кот кот</p>").await;
        let p2 = fx.page(&site, "/two", "<p>коты</p>").await;
        let p3 = fx.page(&site, "/three", "<p>кот</p>").await;
        fx.lemma(&site, "кот", &[(p1, 5), (p2, 2), (p3, 1)]).await;

        let results = fx.engine.search(&SearchRequest::new("Кот")).await.expect("search");

        assert_eq!(results.count, 3);
        assert_eq!(
            relevances(&results),
            vec![
                ("/one".to_string(), 1.0),
                ("/two".to_string(), 0.4),
                ("/three".to_string(), 0.2),
            ]
        );
        let top = &results.data[0];
        assert_eq!(top.title, "Один");
        assert_eq!(top.snippet, "<b>кот</b> <b>кот</b>");
        assert_eq!(top.site_name, "A");
    }

    #[tokio::test]
    async fn every_query_lemma_must_share_a_page() {
        let fx = Fixture::new();
        let site = site_record(fx.store.as_ref(), "http://a.test", "A").await;
        let p1 = fx.page(&site, "/cats", "<p>кот</p>").await;
        let p2 = fx.page(&site, "/dogs", "<p>собака</p>").await;
        fx.lemma(&site, "кот", &[(p1, 1)]).await;
        fx.lemma(&site, "собака", &[(p2, 1)]).await;

        let results = fx.engine.search(&SearchRequest::new("кот собака")).await.expect("search");

        assert_eq!(results, SearchResults::default());
    }

    #[tokio::test]
    async fn multi_lemma_scores_sum_weights() {
        let fx = Fixture::new();
        let site = site_record(fx.store.as_ref(), "http://a.test", "A").await;
        let both = fx.page(&site, "/both", "<p>кот и собака</p>").await;
        let rich = fx.page(&site, "/rich", "<p>кот кот собака</p>").await;
        let cats = fx.page(&site, "/cats", "<p>кот</p>").await;
        fx.lemma(&site, "кот", &[(both, 1), (rich, 3), (cats, 4)]).await;
        fx.lemma(&site, "собака", &[(both, 1), (rich, 1)]).await;

        let results = fx.engine.search(&SearchRequest::new("кот, собаки")).await.expect("search");

        assert_eq!(
            relevances(&results),
            vec![("/rich".to_string(), 1.0), ("/both".to_string(), 0.5)]
        );
    }

    #[tokio::test]
    async fn normalization_is_global_across_sites() {
        let fx = Fixture::new();
        let a = site_record(fx.store.as_ref(), "http://a.test", "A").await;
        let b = site_record(fx.store.as_ref(), "http://b.test", "B").await;
        let pa = fx.page(&a, "/a", "<p>кот</p>").await;
        let pb = fx.page(&b, "/b", "<p>кот</p>").await;
        fx.lemma(&a, "кот", &[(pa, 4)]).await;
        fx.lemma(&b, "кот", &[(pb, 1)]).await;

        let all = fx.engine.search(&SearchRequest::new("кот")).await.expect("search");
        assert_eq!(
            relevances(&all),
            vec![("/a".to_string(), 1.0), ("/b".to_string(), 0.25)]
        );
        assert_eq!(all.data[1].site, "http://b.test");

        let only_b = SearchRequest {
            site: Some("http://b.test/".to_string()),
            ..SearchRequest::new("кот")
        };
        let filtered = fx.engine.search(&only_b).await.expect("search");
        assert_eq!(relevances(&filtered), vec![("/b".to_string(), 1.0)]);

        let unknown = SearchRequest {
            site: Some("http://c.test".to_string()),
            ..SearchRequest::new("кот")
        };
        assert_eq!(fx.engine.search(&unknown).await.expect("search").count, 0);
    }

    #[tokio::test]
    async fn pagination_window_reports_total_count() {
        let fx = Fixture::new();
        let site = site_record(fx.store.as_ref(), "http://a.test", "A").await;
        let mut weights = Vec::new();
        for idx in 0..5u32 {
            let page = fx.page(&site, &format!("/p{idx}"), "<p>кот</p>").await;
            weights.push((page, 10 - idx));
        }
        fx.lemma(&site, "кот", &weights).await;

        let request = SearchRequest {
            offset: 10,
            limit: 2,
            ..SearchRequest::new("кот")
        };
        let results = fx.engine.search(&request).await.expect("search");
        assert_eq!(results.count, 5);
        let uris: Vec<&str> = results.data.iter().map(|hit| hit.uri.as_str()).collect();
        assert_eq!(uris, vec!["/p2", "/p3"]);

        let past_end = SearchRequest {
            offset: 40,
            limit: 2,
            ..SearchRequest::new("кот")
        };
        let results = fx.engine.search(&past_end).await.expect("search");
        assert_eq!(results.count, 5);
        assert!(results.data.is_empty());
    }

    #[tokio::test]
    async fn blank_and_stopword_queries() {
        let fx = Fixture::new();
        assert!(matches!(
            fx.engine.search(&SearchRequest::new("  ")).await,
            Err(SearchError::EmptyQuery)
        ));
        let results = fx.engine.search(&SearchRequest::new("и в на")).await.expect("search");
        assert_eq!(results, SearchResults::default());
    }

    #[test]
    fn ranking_breaks_ties_by_page_id() {
        let ranked = rank_pages(vec![(PageId(9), 2), (PageId(3), 2), (PageId(5), 4)]);
        assert_eq!(
            ranked,
            vec![(PageId(5), 1.0), (PageId(3), 0.5), (PageId(9), 0.5)]
        );
    }

    #[test]
    fn window_start_scales_offset_by_limit() {
        assert_eq!(window_start(20, 0), 0);
        assert_eq!(window_start(20, 10), 20);
        assert_eq!(window_start(10, 5), 5);
    }
}
