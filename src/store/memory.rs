//! In-process record store used by tests and by the API when no database is configured.

use super::{Storage, StoreError, StoreResult};
use crate::model::{
    IndexEntry, IndexEntryId, Lemma, LemmaId, NewIndexEntry, NewLemma, NewPage, NewSite, Page,
    PageId, Site, SiteId,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};
use std::time::SystemTime;

#[derive(Default)]
struct Tables {
    next_id: i64,
    sites: BTreeMap<SiteId, Site>,
    pages: BTreeMap<PageId, Page>,
    lemmas: BTreeMap<LemmaId, Lemma>,
    entries: BTreeMap<IndexEntryId, IndexEntry>,
    page_keys: HashMap<(SiteId, String), PageId>,
    lemma_keys: HashMap<(SiteId, String), LemmaId>,
    entry_keys: HashMap<(PageId, LemmaId), IndexEntryId>,
    entries_by_page: HashMap<PageId, BTreeSet<IndexEntryId>>,
    entries_by_lemma: HashMap<LemmaId, BTreeSet<IndexEntryId>>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn entries_of(&self, ids: Option<&BTreeSet<IndexEntryId>>) -> Vec<IndexEntry> {
        ids.into_iter()
            .flatten()
            .filter_map(|id| self.entries.get(id))
            .copied()
            .collect()
    }
}

/// Mutex-guarded tables with unique-key enforcement.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> StoreResult<MutexGuard<'_, Tables>> {
        self.tables.lock().map_err(|_| StoreError::Poisoned)
    }
}

impl Storage for MemoryStore {
    async fn insert_site(&self, site: NewSite) -> StoreResult<Site> {
        let mut tables = self.tables()?;
        let id = SiteId(tables.next_id());
        let record = Site {
            id,
            url: site.url,
            name: site.name,
            status: site.status,
            status_time: site.status_time,
            last_error: None,
        };
        tables.sites.insert(id, record.clone());
        Ok(record)
    }

    async fn update_site(&self, site: &Site) -> StoreResult<()> {
        let mut tables = self.tables()?;
        let slot = tables.sites.get_mut(&site.id).ok_or(StoreError::NotFound {
            entity: "site",
            id: site.id.0,
        })?;
        *slot = site.clone();
        Ok(())
    }

    async fn touch_site(&self, id: SiteId, at: SystemTime) -> StoreResult<()> {
        let mut tables = self.tables()?;
        let site = tables.sites.get_mut(&id).ok_or(StoreError::NotFound {
            entity: "site",
            id: id.0,
        })?;
        site.status_time = at;
        Ok(())
    }

    async fn find_sites(&self) -> StoreResult<Vec<Site>> {
        Ok(self.tables()?.sites.values().cloned().collect())
    }

    async fn find_site(&self, id: SiteId) -> StoreResult<Option<Site>> {
        Ok(self.tables()?.sites.get(&id).cloned())
    }

    async fn find_site_by_url(&self, url: &str) -> StoreResult<Option<Site>> {
        Ok(self
            .tables()?
            .sites
            .values()
            .find(|site| site.url == url)
            .cloned())
    }

    async fn delete_sites(&self) -> StoreResult<()> {
        self.tables()?.sites.clear();
        Ok(())
    }

    async fn insert_page(&self, page: NewPage) -> StoreResult<Page> {
        let mut tables = self.tables()?;
        let key = (page.site_id, page.path.clone());
        if tables.page_keys.contains_key(&key) {
            return Err(StoreError::Conflict {
                entity: "page",
                key: format!("site {} path {}", page.site_id, page.path),
            });
        }
        let id = PageId(tables.next_id());
        tables.page_keys.insert(key, id);
        let record = Page {
            id,
            site_id: page.site_id,
            path: page.path,
            code: page.code,
            content: page.content,
        };
        tables.pages.insert(id, record.clone());
        Ok(record)
    }

    async fn update_page(&self, page: &Page) -> StoreResult<()> {
        let mut tables = self.tables()?;
        let slot = tables.pages.get_mut(&page.id).ok_or(StoreError::NotFound {
            entity: "page",
            id: page.id.0,
        })?;
        slot.code = page.code;
        slot.content = page.content.clone();
        Ok(())
    }

    async fn find_page(&self, id: PageId) -> StoreResult<Option<Page>> {
        Ok(self.tables()?.pages.get(&id).cloned())
    }

    async fn find_pages(&self) -> StoreResult<Vec<Page>> {
        Ok(self.tables()?.pages.values().cloned().collect())
    }

    async fn find_pages_by_site(&self, site_id: SiteId) -> StoreResult<Vec<Page>> {
        Ok(self
            .tables()?
            .pages
            .values()
            .filter(|page| page.site_id == site_id)
            .cloned()
            .collect())
    }

    async fn find_page_by_path(&self, site_id: SiteId, path: &str) -> StoreResult<Option<Page>> {
        let tables = self.tables()?;
        Ok(tables
            .page_keys
            .get(&(site_id, path.to_string()))
            .and_then(|id| tables.pages.get(id))
            .cloned())
    }

    async fn count_pages(&self, site_id: Option<SiteId>) -> StoreResult<usize> {
        Ok(self
            .tables()?
            .pages
            .values()
            .filter(|page| site_id.map_or(true, |id| page.site_id == id))
            .count())
    }

    async fn delete_pages(&self) -> StoreResult<()> {
        let mut tables = self.tables()?;
        tables.pages.clear();
        tables.page_keys.clear();
        Ok(())
    }

    async fn insert_lemma(&self, lemma: NewLemma) -> StoreResult<Lemma> {
        let mut tables = self.tables()?;
        let key = (lemma.site_id, lemma.lemma.clone());
        if tables.lemma_keys.contains_key(&key) {
            return Err(StoreError::Conflict {
                entity: "lemma",
                key: format!("site {} lemma {}", lemma.site_id, lemma.lemma),
            });
        }
        let id = LemmaId(tables.next_id());
        tables.lemma_keys.insert(key, id);
        let record = Lemma {
            id,
            site_id: lemma.site_id,
            lemma: lemma.lemma,
            frequency: lemma.frequency,
        };
        tables.lemmas.insert(id, record.clone());
        Ok(record)
    }

    async fn update_lemma(&self, lemma: &Lemma) -> StoreResult<()> {
        let mut tables = self.tables()?;
        let slot = tables.lemmas.get_mut(&lemma.id).ok_or(StoreError::NotFound {
            entity: "lemma",
            id: lemma.id.0,
        })?;
        slot.frequency = lemma.frequency;
        Ok(())
    }

    async fn find_lemma(&self, id: LemmaId) -> StoreResult<Option<Lemma>> {
        Ok(self.tables()?.lemmas.get(&id).cloned())
    }

    async fn find_lemmas(&self) -> StoreResult<Vec<Lemma>> {
        Ok(self.tables()?.lemmas.values().cloned().collect())
    }

    async fn find_lemmas_by_site(&self, site_id: SiteId) -> StoreResult<Vec<Lemma>> {
        Ok(self
            .tables()?
            .lemmas
            .values()
            .filter(|lemma| lemma.site_id == site_id)
            .cloned()
            .collect())
    }

    async fn find_lemma_by_text(&self, site_id: SiteId, lemma: &str) -> StoreResult<Option<Lemma>> {
        let tables = self.tables()?;
        Ok(tables
            .lemma_keys
            .get(&(site_id, lemma.to_string()))
            .and_then(|id| tables.lemmas.get(id))
            .cloned())
    }

    async fn count_lemmas(&self, site_id: Option<SiteId>) -> StoreResult<usize> {
        Ok(self
            .tables()?
            .lemmas
            .values()
            .filter(|lemma| site_id.map_or(true, |id| lemma.site_id == id))
            .count())
    }

    async fn delete_lemma(&self, id: LemmaId) -> StoreResult<()> {
        let mut tables = self.tables()?;
        if let Some(lemma) = tables.lemmas.remove(&id) {
            tables.lemma_keys.remove(&(lemma.site_id, lemma.lemma));
        }
        Ok(())
    }

    async fn delete_lemmas(&self) -> StoreResult<()> {
        let mut tables = self.tables()?;
        tables.lemmas.clear();
        tables.lemma_keys.clear();
        Ok(())
    }

    async fn insert_entry(&self, entry: NewIndexEntry) -> StoreResult<IndexEntry> {
        let mut tables = self.tables()?;
        let key = (entry.page_id, entry.lemma_id);
        if tables.entry_keys.contains_key(&key) {
            return Err(StoreError::Conflict {
                entity: "index entry",
                key: format!("page {} lemma {}", entry.page_id, entry.lemma_id),
            });
        }
        let id = IndexEntryId(tables.next_id());
        tables.entry_keys.insert(key, id);
        tables.entries_by_page.entry(entry.page_id).or_default().insert(id);
        tables.entries_by_lemma.entry(entry.lemma_id).or_default().insert(id);
        let record = IndexEntry {
            id,
            page_id: entry.page_id,
            lemma_id: entry.lemma_id,
            weight: entry.weight,
        };
        tables.entries.insert(id, record);
        Ok(record)
    }

    async fn find_entries_by_page(&self, page_id: PageId) -> StoreResult<Vec<IndexEntry>> {
        let tables = self.tables()?;
        Ok(tables.entries_of(tables.entries_by_page.get(&page_id)))
    }

    async fn find_entries_by_lemma(&self, lemma_id: LemmaId) -> StoreResult<Vec<IndexEntry>> {
        let tables = self.tables()?;
        Ok(tables.entries_of(tables.entries_by_lemma.get(&lemma_id)))
    }

    async fn find_entry(&self, lemma_id: LemmaId, page_id: PageId) -> StoreResult<Option<IndexEntry>> {
        let tables = self.tables()?;
        Ok(tables
            .entry_keys
            .get(&(page_id, lemma_id))
            .and_then(|id| tables.entries.get(id))
            .copied())
    }

    async fn delete_entries_by_page(&self, page_id: PageId) -> StoreResult<()> {
        let mut tables = self.tables()?;
        let Some(ids) = tables.entries_by_page.remove(&page_id) else {
            return Ok(());
        };
        for id in ids {
            let Some(entry) = tables.entries.remove(&id) else {
                continue;
            };
            tables.entry_keys.remove(&(entry.page_id, entry.lemma_id));
            if let Some(by_lemma) = tables.entries_by_lemma.get_mut(&entry.lemma_id) {
                by_lemma.remove(&id);
                if by_lemma.is_empty() {
                    tables.entries_by_lemma.remove(&entry.lemma_id);
                }
            }
        }
        Ok(())
    }

    async fn delete_entries(&self) -> StoreResult<()> {
        let mut tables = self.tables()?;
        tables.entries.clear();
        tables.entry_keys.clear();
        tables.entries_by_page.clear();
        tables.entries_by_lemma.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SiteStatus;

    async fn seeded() -> (MemoryStore, Site) {
        let store = MemoryStore::new();
        let site = store
            .insert_site(NewSite {
                url: "https://a.test".to_string(),
                name: "A".to_string(),
                status: SiteStatus::Indexing,
                status_time: SystemTime::now(),
            })
            .await
            .expect("insert site");
        (store, site)
    }

    #[tokio::test]
    async fn rejects_duplicate_page_paths_per_site() {
        let (store, site) = seeded().await;
        let page = NewPage {
            site_id: site.id,
            path: "/x".to_string(),
            code: 200,
            content: "<p>x</p>".to_string(),
        };
        store.insert_page(page.clone()).await.expect("first insert");
        let err = store.insert_page(page).await.expect_err("duplicate");
        assert!(matches!(err, StoreError::Conflict { entity: "page", .. }));
    }

    #[tokio::test]
    async fn same_path_allowed_under_different_sites() {
        let (store, first) = seeded().await;
        let second = store
            .insert_site(NewSite {
                url: "https://b.test".to_string(),
                name: "B".to_string(),
                status: SiteStatus::Indexing,
                status_time: SystemTime::now(),
            })
            .await
            .expect("second site");
        for site_id in [first.id, second.id] {
            store
                .insert_page(NewPage {
                    site_id,
                    path: "/about".to_string(),
                    code: 200,
                    content: String::new(),
                })
                .await
                .expect("insert");
        }
        assert_eq!(store.count_pages(None).await.unwrap(), 2);
        assert_eq!(store.count_pages(Some(second.id)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn deleting_page_entries_leaves_other_pages_alone() {
        let (store, site) = seeded().await;
        let lemma = store
            .insert_lemma(NewLemma {
                site_id: site.id,
                lemma: "кот".to_string(),
                frequency: 2,
            })
            .await
            .unwrap();
        let mut pages = Vec::new();
        for path in ["/a", "/b"] {
            let page = store
                .insert_page(NewPage {
                    site_id: site.id,
                    path: path.to_string(),
                    code: 200,
                    content: String::new(),
                })
                .await
                .unwrap();
            store
                .insert_entry(NewIndexEntry {
                    page_id: page.id,
                    lemma_id: lemma.id,
                    weight: 1,
                })
                .await
                .unwrap();
            pages.push(page);
        }

        store.delete_entries_by_page(pages[0].id).await.unwrap();

        assert!(store.find_entries_by_page(pages[0].id).await.unwrap().is_empty());
        assert_eq!(store.find_entries_by_lemma(lemma.id).await.unwrap().len(), 1);
        assert!(store.find_entry(lemma.id, pages[1].id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn touch_site_only_moves_status_time() {
        let (store, site) = seeded().await;
        let later = site.status_time + std::time::Duration::from_secs(5);
        store.touch_site(site.id, later).await.unwrap();
        let stored = store.find_site(site.id).await.unwrap().expect("site");
        assert_eq!(stored.status_time, later);
        assert_eq!(stored.status, SiteStatus::Indexing);
    }

    #[tokio::test]
    async fn deletes_release_unique_keys() {
        let (store, site) = seeded().await;
        let lemma = NewLemma {
            site_id: site.id,
            lemma: "кот".to_string(),
            frequency: 1,
        };
        let first = store.insert_lemma(lemma.clone()).await.unwrap();
        assert!(matches!(
            store.insert_lemma(lemma.clone()).await,
            Err(StoreError::Conflict { entity: "lemma", .. })
        ));
        store.delete_lemma(first.id).await.unwrap();
        let second = store.insert_lemma(lemma).await.expect("key released");
        assert_eq!(
            store.find_lemma_by_text(site.id, "кот").await.unwrap().map(|row| row.id),
            Some(second.id)
        );

        let page = NewPage {
            site_id: site.id,
            path: "/x".to_string(),
            code: 200,
            content: String::new(),
        };
        let stored = store.insert_page(page.clone()).await.unwrap();
        let entry = NewIndexEntry {
            page_id: stored.id,
            lemma_id: second.id,
            weight: 3,
        };
        store.insert_entry(entry).await.unwrap();
        assert!(store.insert_entry(entry).await.is_err());
        store.delete_entries_by_page(stored.id).await.unwrap();
        assert!(store.find_entries_by_lemma(second.id).await.unwrap().is_empty());
        store.insert_entry(entry).await.expect("entry key released");

        store.delete_entries().await.unwrap();
        store.delete_pages().await.unwrap();
        assert!(store.find_page_by_path(site.id, "/x").await.unwrap().is_none());
        store.insert_page(page).await.expect("page key released");
    }
}
