//! Postgres-backed record store built on `tokio-postgres`.

use super::{Storage, StoreError, StoreResult};
use crate::model::{
    IndexEntry, IndexEntryId, Lemma, LemmaId, NewIndexEntry, NewLemma, NewPage, NewSite, Page,
    PageId, Site, SiteId, SiteStatus,
};
use std::time::SystemTime;
use tokio_postgres::{Client, NoTls, Row};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS site (
    id          BIGSERIAL PRIMARY KEY,
    status      TEXT NOT NULL,
    status_time TIMESTAMPTZ NOT NULL,
    last_error  TEXT,
    url         TEXT NOT NULL,
    name        TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS page (
    id      BIGSERIAL PRIMARY KEY,
    site_id BIGINT NOT NULL,
    path    TEXT NOT NULL,
    code    INTEGER NOT NULL,
    content TEXT NOT NULL,
    UNIQUE (site_id, path)
);
CREATE TABLE IF NOT EXISTS lemma (
    id        BIGSERIAL PRIMARY KEY,
    site_id   BIGINT NOT NULL,
    lemma     TEXT NOT NULL,
    frequency INTEGER NOT NULL,
    UNIQUE (site_id, lemma)
);
CREATE TABLE IF NOT EXISTS index_entry (
    id       BIGSERIAL PRIMARY KEY,
    page_id  BIGINT NOT NULL,
    lemma_id BIGINT NOT NULL,
    weight   INTEGER NOT NULL,
    UNIQUE (page_id, lemma_id)
);
CREATE INDEX IF NOT EXISTS index_entry_lemma_idx ON index_entry (lemma_id);
"#;

const SITE_COLUMNS: &str = "id, status, status_time, last_error, url, name";
const PAGE_COLUMNS: &str = "id, site_id, path, code, content";
const LEMMA_COLUMNS: &str = "id, site_id, lemma, frequency";
const ENTRY_COLUMNS: &str = "id, page_id, lemma_id, weight";

/// Record store over a single Postgres connection.
pub struct PostgresStore {
    client: Client,
}

impl PostgresStore {
    /// Connects to `database_url`, spawns the connection driver and ensures the schema.
    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        let (client, connection) = tokio_postgres::connect(database_url, NoTls).await?;
        tokio::spawn(async move {
            if let Err(err) = connection.await {
                tracing::error!(error = %err, "postgres connection error");
            }
        });
        client.batch_execute(SCHEMA).await?;
        Ok(Self { client })
    }
}

fn site_from_row(row: &Row) -> StoreResult<Site> {
    let status: String = row.get("status");
    let status = status.parse::<SiteStatus>().map_err(|err| StoreError::Corrupt {
        entity: "site",
        message: err.to_string(),
    })?;
    Ok(Site {
        id: SiteId(row.get("id")),
        url: row.get("url"),
        name: row.get("name"),
        status,
        status_time: row.get("status_time"),
        last_error: row.get("last_error"),
    })
}

fn page_from_row(row: &Row) -> StoreResult<Page> {
    let code: i32 = row.get("code");
    let code = u16::try_from(code).map_err(|_| StoreError::Corrupt {
        entity: "page",
        message: format!("status code {code} out of range"),
    })?;
    Ok(Page {
        id: PageId(row.get("id")),
        site_id: SiteId(row.get("site_id")),
        path: row.get("path"),
        code,
        content: row.get("content"),
    })
}

fn lemma_from_row(row: &Row) -> StoreResult<Lemma> {
    let frequency: i32 = row.get("frequency");
    Ok(Lemma {
        id: LemmaId(row.get("id")),
        site_id: SiteId(row.get("site_id")),
        lemma: row.get("lemma"),
        frequency: non_negative("lemma", "frequency", frequency)?,
    })
}

fn entry_from_row(row: &Row) -> StoreResult<IndexEntry> {
    let weight: i32 = row.get("weight");
    Ok(IndexEntry {
        id: IndexEntryId(row.get("id")),
        page_id: PageId(row.get("page_id")),
        lemma_id: LemmaId(row.get("lemma_id")),
        weight: non_negative("index entry", "weight", weight)?,
    })
}

fn non_negative(entity: &'static str, field: &str, value: i32) -> StoreResult<u32> {
    u32::try_from(value).map_err(|_| StoreError::Corrupt {
        entity,
        message: format!("{field} {value} is negative"),
    })
}

fn as_i32(entity: &'static str, value: u32) -> StoreResult<i32> {
    i32::try_from(value).map_err(|_| StoreError::Corrupt {
        entity,
        message: format!("value {value} exceeds i32 range"),
    })
}

fn map_rows<T>(rows: &[Row], map: fn(&Row) -> StoreResult<T>) -> StoreResult<Vec<T>> {
    rows.iter().map(map).collect()
}

fn conflict_or(err: tokio_postgres::Error, entity: &'static str, key: String) -> StoreError {
    if err.code() == Some(&tokio_postgres::error::SqlState::UNIQUE_VIOLATION) {
        StoreError::Conflict { entity, key }
    } else {
        StoreError::Postgres(err)
    }
}

fn ensure_updated(affected: u64, entity: &'static str, id: i64) -> StoreResult<()> {
    if affected == 0 {
        return Err(StoreError::NotFound { entity, id });
    }
    Ok(())
}

impl Storage for PostgresStore {
    async fn insert_site(&self, site: NewSite) -> StoreResult<Site> {
        let sql = format!(
            "INSERT INTO site (status, status_time, url, name) VALUES ($1, $2, $3, $4) \
             RETURNING {SITE_COLUMNS}"
        );
        let row = self
            .client
            .query_one(
                &sql,
                &[&site.status.as_str(), &site.status_time, &site.url, &site.name],
            )
            .await?;
        site_from_row(&row)
    }

    async fn update_site(&self, site: &Site) -> StoreResult<()> {
        let affected = self
            .client
            .execute(
                "UPDATE site SET status = $2, status_time = $3, last_error = $4, url = $5, name = $6 \
                 WHERE id = $1",
                &[
                    &site.id.0,
                    &site.status.as_str(),
                    &site.status_time,
                    &site.last_error,
                    &site.url,
                    &site.name,
                ],
            )
            .await?;
        ensure_updated(affected, "site", site.id.0)
    }

    async fn touch_site(&self, id: SiteId, at: SystemTime) -> StoreResult<()> {
        let affected = self
            .client
            .execute("UPDATE site SET status_time = $2 WHERE id = $1", &[&id.0, &at])
            .await?;
        ensure_updated(affected, "site", id.0)
    }

    async fn find_sites(&self) -> StoreResult<Vec<Site>> {
        let sql = format!("SELECT {SITE_COLUMNS} FROM site ORDER BY id");
        let rows = self.client.query(&sql, &[]).await?;
        map_rows(&rows, site_from_row)
    }

    async fn find_site(&self, id: SiteId) -> StoreResult<Option<Site>> {
        let sql = format!("SELECT {SITE_COLUMNS} FROM site WHERE id = $1");
        let row = self.client.query_opt(&sql, &[&id.0]).await?;
        row.as_ref().map(site_from_row).transpose()
    }

    async fn find_site_by_url(&self, url: &str) -> StoreResult<Option<Site>> {
        let sql = format!("SELECT {SITE_COLUMNS} FROM site WHERE url = $1 ORDER BY id LIMIT 1");
        let row = self.client.query_opt(&sql, &[&url]).await?;
        row.as_ref().map(site_from_row).transpose()
    }

    async fn delete_sites(&self) -> StoreResult<()> {
        self.client.execute("DELETE FROM site", &[]).await?;
        Ok(())
    }

    async fn insert_page(&self, page: NewPage) -> StoreResult<Page> {
        let sql = format!(
            "INSERT INTO page (site_id, path, code, content) VALUES ($1, $2, $3, $4) \
             RETURNING {PAGE_COLUMNS}"
        );
        let code = i32::from(page.code);
        let row = self
            .client
            .query_one(&sql, &[&page.site_id.0, &page.path, &code, &page.content])
            .await
            .map_err(|err| {
                conflict_or(err, "page", format!("site {} path {}", page.site_id, page.path))
            })?;
        page_from_row(&row)
    }

    async fn update_page(&self, page: &Page) -> StoreResult<()> {
        let code = i32::from(page.code);
        let affected = self
            .client
            .execute(
                "UPDATE page SET code = $2, content = $3 WHERE id = $1",
                &[&page.id.0, &code, &page.content],
            )
            .await?;
        ensure_updated(affected, "page", page.id.0)
    }

    async fn find_page(&self, id: PageId) -> StoreResult<Option<Page>> {
        let sql = format!("SELECT {PAGE_COLUMNS} FROM page WHERE id = $1");
        let row = self.client.query_opt(&sql, &[&id.0]).await?;
        row.as_ref().map(page_from_row).transpose()
    }

    async fn find_pages(&self) -> StoreResult<Vec<Page>> {
        let sql = format!("SELECT {PAGE_COLUMNS} FROM page ORDER BY id");
        let rows = self.client.query(&sql, &[]).await?;
        map_rows(&rows, page_from_row)
    }

    async fn find_pages_by_site(&self, site_id: SiteId) -> StoreResult<Vec<Page>> {
        let sql = format!("SELECT {PAGE_COLUMNS} FROM page WHERE site_id = $1 ORDER BY id");
        let rows = self.client.query(&sql, &[&site_id.0]).await?;
        map_rows(&rows, page_from_row)
    }

    async fn find_page_by_path(&self, site_id: SiteId, path: &str) -> StoreResult<Option<Page>> {
        let sql = format!("SELECT {PAGE_COLUMNS} FROM page WHERE site_id = $1 AND path = $2");
        let row = self.client.query_opt(&sql, &[&site_id.0, &path]).await?;
        row.as_ref().map(page_from_row).transpose()
    }

    async fn count_pages(&self, site_id: Option<SiteId>) -> StoreResult<usize> {
        let site = site_id.map(|id| id.0);
        let row = self
            .client
            .query_one(
                "SELECT COUNT(*) FROM page WHERE $1::BIGINT IS NULL OR site_id = $1",
                &[&site],
            )
            .await?;
        let count: i64 = row.get(0);
        Ok(count as usize)
    }

    async fn delete_pages(&self) -> StoreResult<()> {
        self.client.execute("DELETE FROM page", &[]).await?;
        Ok(())
    }

    async fn insert_lemma(&self, lemma: NewLemma) -> StoreResult<Lemma> {
        let sql = format!(
            "INSERT INTO lemma (site_id, lemma, frequency) VALUES ($1, $2, $3) \
             RETURNING {LEMMA_COLUMNS}"
        );
        let frequency = as_i32("lemma", lemma.frequency)?;
        let row = self
            .client
            .query_one(&sql, &[&lemma.site_id.0, &lemma.lemma, &frequency])
            .await
            .map_err(|err| {
                conflict_or(err, "lemma", format!("site {} lemma {}", lemma.site_id, lemma.lemma))
            })?;
        lemma_from_row(&row)
    }

    async fn update_lemma(&self, lemma: &Lemma) -> StoreResult<()> {
        let frequency = as_i32("lemma", lemma.frequency)?;
        let affected = self
            .client
            .execute(
                "UPDATE lemma SET frequency = $2 WHERE id = $1",
                &[&lemma.id.0, &frequency],
            )
            .await?;
        ensure_updated(affected, "lemma", lemma.id.0)
    }

    async fn find_lemma(&self, id: LemmaId) -> StoreResult<Option<Lemma>> {
        let sql = format!("SELECT {LEMMA_COLUMNS} FROM lemma WHERE id = $1");
        let row = self.client.query_opt(&sql, &[&id.0]).await?;
        row.as_ref().map(lemma_from_row).transpose()
    }

    async fn find_lemmas(&self) -> StoreResult<Vec<Lemma>> {
        let sql = format!("SELECT {LEMMA_COLUMNS} FROM lemma ORDER BY id");
        let rows = self.client.query(&sql, &[]).await?;
        map_rows(&rows, lemma_from_row)
    }

    async fn find_lemmas_by_site(&self, site_id: SiteId) -> StoreResult<Vec<Lemma>> {
        let sql = format!("SELECT {LEMMA_COLUMNS} FROM lemma WHERE site_id = $1 ORDER BY id");
        let rows = self.client.query(&sql, &[&site_id.0]).await?;
        map_rows(&rows, lemma_from_row)
    }

    async fn find_lemma_by_text(&self, site_id: SiteId, lemma: &str) -> StoreResult<Option<Lemma>> {
        let sql = format!("SELECT {LEMMA_COLUMNS} FROM lemma WHERE site_id = $1 AND lemma = $2");
        let row = self.client.query_opt(&sql, &[&site_id.0, &lemma]).await?;
        row.as_ref().map(lemma_from_row).transpose()
    }

    async fn count_lemmas(&self, site_id: Option<SiteId>) -> StoreResult<usize> {
        let site = site_id.map(|id| id.0);
        let row = self
            .client
            .query_one(
                "SELECT COUNT(*) FROM lemma WHERE $1::BIGINT IS NULL OR site_id = $1",
                &[&site],
            )
            .await?;
        let count: i64 = row.get(0);
        Ok(count as usize)
    }

    async fn delete_lemma(&self, id: LemmaId) -> StoreResult<()> {
        self.client
            .execute("DELETE FROM lemma WHERE id = $1", &[&id.0])
            .await?;
        Ok(())
    }

    async fn delete_lemmas(&self) -> StoreResult<()> {
        self.client.execute("DELETE FROM lemma", &[]).await?;
        Ok(())
    }

    async fn insert_entry(&self, entry: NewIndexEntry) -> StoreResult<IndexEntry> {
        let sql = format!(
            "INSERT INTO index_entry (page_id, lemma_id, weight) VALUES ($1, $2, $3) \
             RETURNING {ENTRY_COLUMNS}"
        );
        let weight = as_i32("index entry", entry.weight)?;
        let row = self
            .client
            .query_one(&sql, &[&entry.page_id.0, &entry.lemma_id.0, &weight])
            .await
            .map_err(|err| {
                conflict_or(
                    err,
                    "index entry",
                    format!("page {} lemma {}", entry.page_id, entry.lemma_id),
                )
            })?;
        entry_from_row(&row)
    }

    async fn find_entries_by_page(&self, page_id: PageId) -> StoreResult<Vec<IndexEntry>> {
        let sql = format!("SELECT {ENTRY_COLUMNS} FROM index_entry WHERE page_id = $1 ORDER BY id");
        let rows = self.client.query(&sql, &[&page_id.0]).await?;
        map_rows(&rows, entry_from_row)
    }

    async fn find_entries_by_lemma(&self, lemma_id: LemmaId) -> StoreResult<Vec<IndexEntry>> {
        let sql =
            format!("SELECT {ENTRY_COLUMNS} FROM index_entry WHERE lemma_id = $1 ORDER BY id");
        let rows = self.client.query(&sql, &[&lemma_id.0]).await?;
        map_rows(&rows, entry_from_row)
    }

    async fn find_entry(&self, lemma_id: LemmaId, page_id: PageId) -> StoreResult<Option<IndexEntry>> {
        let sql =
            format!("SELECT {ENTRY_COLUMNS} FROM index_entry WHERE lemma_id = $1 AND page_id = $2");
        let row = self
            .client
            .query_opt(&sql, &[&lemma_id.0, &page_id.0])
            .await?;
        row.as_ref().map(entry_from_row).transpose()
    }

    async fn delete_entries_by_page(&self, page_id: PageId) -> StoreResult<()> {
        self.client
            .execute("DELETE FROM index_entry WHERE page_id = $1", &[&page_id.0])
            .await?;
        Ok(())
    }

    async fn delete_entries(&self) -> StoreResult<()> {
        self.client.execute("DELETE FROM index_entry", &[]).await?;
        Ok(())
    }
}
