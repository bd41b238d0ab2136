//! Fixtures shared by unit tests: a synthetic site and a small dictionary.

use crate::fetcher::{page_from_html, Fetch, FetchError, FetchedPage};
use crate::model::{
    IndexEntry, Lemma, LemmaId, NewIndexEntry, NewLemma, NewPage, NewSite, Page, PageId, Site,
    SiteId, SiteStatus,
};
use crate::morphology::DictionaryMorphology;
use crate::normalizer::TextNormalizer;
use crate::store::{MemoryStore, Storage, StoreError, StoreResult};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;
use url::Url;

pub(crate) const DICTIONARY: &str = "\
кот\tкот\tС мр,ед,им
кота\tкот\tС мр,ед,рд
коту\tкот\tС мр,ед,дт
коте\tкот\tС мр,ед,пр
коты\tкот\tС мр,мн,им
котов\tкот\tС мр,мн,рд
котами\tкот\tС мр,мн,тв
кошка\tкошка\tС жр,ед,им
кошки\tкошка\tС жр,мн,им
собака\tсобака\tС жр,ед,им
собаки\tсобака\tС жр,мн,им
собаку\tсобака\tС жр,ед,вн
окно\tокно\tС ср,ед,им
окне\tокно\tС ср,ед,пр
сидит\tсидеть\tГ нст,ед,3л
сидят\tсидеть\tГ нст,мн,3л
дом\tдом\tС мр,ед,им
доме\tдом\tС мр,ед,пр
же\tже\tЧ
";

pub(crate) fn morphology() -> Arc<DictionaryMorphology> {
    Arc::new(DictionaryMorphology::parse(DICTIONARY).expect("test dictionary"))
}

pub(crate) fn normalizer() -> TextNormalizer {
    TextNormalizer::new(morphology())
}

fn key(url: &str) -> String {
    Url::parse(url).expect("fixture url").to_string()
}

/// In-memory site served through the `Fetch` seam. Unknown URLs answer 404.
#[derive(Default)]
pub(crate) struct FakeSite {
    pages: Mutex<HashMap<String, String>>,
    fetched: Mutex<Vec<String>>,
}

impl FakeSite {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_page(self, url: &str, html: &str) -> Self {
        self.set_page(url, html);
        self
    }

    pub(crate) fn set_page(&self, url: &str, html: &str) {
        self.pages
            .lock()
            .unwrap()
            .insert(key(url), html.to_string());
    }

    pub(crate) fn remove_page(&self, url: &str) {
        self.pages.lock().unwrap().remove(&key(url));
    }

    pub(crate) fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }

    pub(crate) fn fetch_count(&self, url: &str) -> usize {
        let wanted = key(url);
        self.fetched
            .lock()
            .unwrap()
            .iter()
            .filter(|seen| **seen == wanted)
            .count()
    }
}

impl Fetch for FakeSite {
    async fn fetch(&self, url: &Url) -> Result<FetchedPage, FetchError> {
        self.fetched.lock().unwrap().push(url.to_string());
        let html = self.pages.lock().unwrap().get(url.as_str()).cloned();
        match html {
            Some(html) => page_from_html(url, 200, html),
            None => Err(FetchError::Status {
                url: url.clone(),
                status: 404,
            }),
        }
    }
}

pub(crate) async fn site_record<S: Storage>(store: &S, url: &str, name: &str) -> Site {
    store
        .insert_site(NewSite {
            url: url.to_string(),
            name: name.to_string(),
            status: SiteStatus::Indexing,
            status_time: SystemTime::now(),
        })
        .await
        .expect("insert site")
}

/// `MemoryStore` that refuses to store pages at one path, for any site.
pub(crate) struct RejectingStore {
    inner: MemoryStore,
    rejected_path: String,
}

impl RejectingStore {
    pub(crate) fn new(rejected_path: &str) -> Self {
        Self {
            inner: MemoryStore::new(),
            rejected_path: rejected_path.to_string(),
        }
    }
}

impl Storage for RejectingStore {
    async fn insert_site(&self, site: NewSite) -> StoreResult<Site> {
        self.inner.insert_site(site).await
    }
    async fn update_site(&self, site: &Site) -> StoreResult<()> {
        self.inner.update_site(site).await
    }
    async fn touch_site(&self, id: SiteId, at: SystemTime) -> StoreResult<()> {
        self.inner.touch_site(id, at).await
    }
    async fn find_sites(&self) -> StoreResult<Vec<Site>> {
        self.inner.find_sites().await
    }
    async fn find_site(&self, id: SiteId) -> StoreResult<Option<Site>> {
        self.inner.find_site(id).await
    }
    async fn find_site_by_url(&self, url: &str) -> StoreResult<Option<Site>> {
        self.inner.find_site_by_url(url).await
    }
    async fn delete_sites(&self) -> StoreResult<()> {
        self.inner.delete_sites().await
    }
    async fn insert_page(&self, page: NewPage) -> StoreResult<Page> {
        if page.path == self.rejected_path {
            return Err(StoreError::Corrupt {
                entity: "page",
                message: format!("rejected path {}", page.path),
            });
        }
        self.inner.insert_page(page).await
    }
    async fn update_page(&self, page: &Page) -> StoreResult<()> {
        self.inner.update_page(page).await
    }
    async fn find_page(&self, id: PageId) -> StoreResult<Option<Page>> {
        self.inner.find_page(id).await
    }
    async fn find_pages(&self) -> StoreResult<Vec<Page>> {
        self.inner.find_pages().await
    }
    async fn find_pages_by_site(&self, site_id: SiteId) -> StoreResult<Vec<Page>> {
        self.inner.find_pages_by_site(site_id).await
    }
    async fn find_page_by_path(&self, site_id: SiteId, path: &str) -> StoreResult<Option<Page>> {
        self.inner.find_page_by_path(site_id, path).await
    }
    async fn count_pages(&self, site_id: Option<SiteId>) -> StoreResult<usize> {
        self.inner.count_pages(site_id).await
    }
    async fn delete_pages(&self) -> StoreResult<()> {
        self.inner.delete_pages().await
    }
    async fn insert_lemma(&self, lemma: NewLemma) -> StoreResult<Lemma> {
        self.inner.insert_lemma(lemma).await
    }
    async fn update_lemma(&self, lemma: &Lemma) -> StoreResult<()> {
        self.inner.update_lemma(lemma).await
    }
    async fn find_lemma(&self, id: LemmaId) -> StoreResult<Option<Lemma>> {
        self.inner.find_lemma(id).await
    }
    async fn find_lemmas(&self) -> StoreResult<Vec<Lemma>> {
        self.inner.find_lemmas().await
    }
    async fn find_lemmas_by_site(&self, site_id: SiteId) -> StoreResult<Vec<Lemma>> {
        self.inner.find_lemmas_by_site(site_id).await
    }
    async fn find_lemma_by_text(&self, site_id: SiteId, lemma: &str) -> StoreResult<Option<Lemma>> {
        self.inner.find_lemma_by_text(site_id, lemma).await
    }
    async fn count_lemmas(&self, site_id: Option<SiteId>) -> StoreResult<usize> {
        self.inner.count_lemmas(site_id).await
    }
    async fn delete_lemma(&self, id: LemmaId) -> StoreResult<()> {
        self.inner.delete_lemma(id).await
    }
    async fn delete_lemmas(&self) -> StoreResult<()> {
        self.inner.delete_lemmas().await
    }
    async fn insert_entry(&self, entry: NewIndexEntry) -> StoreResult<IndexEntry> {
        self.inner.insert_entry(entry).await
    }
    async fn find_entries_by_page(&self, page_id: PageId) -> StoreResult<Vec<IndexEntry>> {
        self.inner.find_entries_by_page(page_id).await
    }
    async fn find_entries_by_lemma(&self, lemma_id: LemmaId) -> StoreResult<Vec<IndexEntry>> {
        self.inner.find_entries_by_lemma(lemma_id).await
    }
    async fn find_entry(&self, lemma_id: LemmaId, page_id: PageId) -> StoreResult<Option<IndexEntry>> {
        self.inner.find_entry(lemma_id, page_id).await
    }
    async fn delete_entries_by_page(&self, page_id: PageId) -> StoreResult<()> {
        self.inner.delete_entries_by_page(page_id).await
    }
    async fn delete_entries(&self) -> StoreResult<()> {
        self.inner.delete_entries().await
    }
}
