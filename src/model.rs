//! Record types shared by the crawler, the indexer and the storage backends.

use serde::ser::Serializer;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};
use url::Url;

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

record_id!(
    /// Primary key of a [`Site`].
    SiteId
);
record_id!(
    /// Primary key of a [`Page`].
    PageId
);
record_id!(
    /// Primary key of a [`Lemma`].
    LemmaId
);
record_id!(
    /// Primary key of an [`IndexEntry`].
    IndexEntryId
);

/// Lifecycle of a site during a full reindex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SiteStatus {
    /// Crawl in progress.
    Indexing,
    /// Crawl finished successfully.
    Indexed,
    /// Crawl failed or was stopped.
    Failed,
}

impl SiteStatus {
    /// Storage and wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Indexing => "INDEXING",
            Self::Indexed => "INDEXED",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for SiteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raised when a stored status string is not one of the known variants.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown site status {0:?}")]
pub struct UnknownStatus(pub String);

impl FromStr for SiteStatus {
    type Err = UnknownStatus;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "INDEXING" => Ok(Self::Indexing),
            "INDEXED" => Ok(Self::Indexed),
            "FAILED" => Ok(Self::Failed),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

impl Serialize for SiteStatus {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

/// A crawled website.
#[derive(Debug, Clone, PartialEq)]
pub struct Site {
    /// Record id.
    pub id: SiteId,
    /// Root URL as configured.
    pub url: String,
    /// Display name.
    pub name: String,
    /// Current lifecycle state.
    pub status: SiteStatus,
    /// Last heartbeat or status transition.
    pub status_time: SystemTime,
    /// Reason for the last failure, if any.
    pub last_error: Option<String>,
}

impl Site {
    /// Moves the site into `status`, stamping the transition time.
    pub fn transition(&mut self, status: SiteStatus, last_error: Option<String>) {
        self.status = status;
        self.last_error = last_error;
        self.status_time = SystemTime::now();
    }

    /// Returns true when `url` lives under this site's root URL.
    ///
    /// Origins must match and the root path must end at a segment boundary, so
    /// `http://a.test` does not claim `http://a.testing/x` or `http://a.test/blogs`
    /// when the root is `http://a.test/blog`.
    pub fn contains_url(&self, url: &Url) -> bool {
        let Ok(root) = Url::parse(&self.url) else {
            return false;
        };
        if root.origin() != url.origin() {
            return false;
        }
        let prefix = root.path().trim_end_matches('/');
        url.path()
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
    }
}

/// Values for inserting a new [`Site`].
#[derive(Debug, Clone)]
pub struct NewSite {
    /// Root URL.
    pub url: String,
    /// Display name.
    pub name: String,
    /// Initial status.
    pub status: SiteStatus,
    /// Initial status time.
    pub status_time: SystemTime,
}

/// A fetched page, keyed by its site-relative path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// Record id.
    pub id: PageId,
    /// Owning site.
    pub site_id: SiteId,
    /// Path relative to the site root, e.g. `/news/1`.
    pub path: String,
    /// HTTP status code of the last fetch.
    pub code: u16,
    /// Raw HTML of the last fetch.
    pub content: String,
}

/// Values for inserting a new [`Page`].
#[derive(Debug, Clone)]
pub struct NewPage {
    /// Owning site.
    pub site_id: SiteId,
    /// Site-relative path.
    pub path: String,
    /// HTTP status code.
    pub code: u16,
    /// Raw HTML.
    pub content: String,
}

/// A normalized word form and the number of pages of its site that contain it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lemma {
    /// Record id.
    pub id: LemmaId,
    /// Owning site.
    pub site_id: SiteId,
    /// Normalized word form.
    pub lemma: String,
    /// Document frequency.
    pub frequency: u32,
}

/// Values for inserting a new [`Lemma`].
#[derive(Debug, Clone)]
pub struct NewLemma {
    /// Owning site.
    pub site_id: SiteId,
    /// Normalized word form.
    pub lemma: String,
    /// Initial document frequency.
    pub frequency: u32,
}

/// Occurrence count of one lemma on one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    /// Record id.
    pub id: IndexEntryId,
    /// Page the lemma occurs on.
    pub page_id: PageId,
    /// Referenced lemma.
    pub lemma_id: LemmaId,
    /// Raw occurrence count on the page.
    pub weight: u32,
}

/// Values for inserting a new [`IndexEntry`].
#[derive(Debug, Clone, Copy)]
pub struct NewIndexEntry {
    /// Page the lemma occurs on.
    pub page_id: PageId,
    /// Referenced lemma.
    pub lemma_id: LemmaId,
    /// Raw occurrence count.
    pub weight: u32,
}

/// Milliseconds since the Unix epoch, saturating at zero for pre-epoch times.
pub fn epoch_ms(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|dur| dur.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_storage_strings() {
        for status in [SiteStatus::Indexing, SiteStatus::Indexed, SiteStatus::Failed] {
            assert_eq!(status.as_str().parse::<SiteStatus>(), Ok(status));
        }
        assert!("PAUSED".parse::<SiteStatus>().is_err());
    }

    fn site(url: &str) -> Site {
        Site {
            id: SiteId(1),
            url: url.to_string(),
            name: "A".to_string(),
            status: SiteStatus::Indexed,
            status_time: SystemTime::now(),
            last_error: None,
        }
    }

    fn url(raw: &str) -> Url {
        Url::parse(raw).unwrap()
    }

    #[test]
    fn site_url_prefix_ignores_trailing_slash() {
        let site = site("https://a.test/");
        assert!(site.contains_url(&url("https://a.test/news")));
        assert!(site.contains_url(&url("https://a.test")));
        assert!(!site.contains_url(&url("https://b.test/news")));
        assert!(!site.contains_url(&url("http://a.test/news")));
    }

    #[test]
    fn site_url_respects_host_and_segment_boundaries() {
        assert!(!site("http://a.test").contains_url(&url("http://a.testing/x")));
        assert!(!site("http://a.test").contains_url(&url("http://a.test:8080/x")));

        let blog = site("http://a.test/blog");
        assert!(blog.contains_url(&url("http://a.test/blog")));
        assert!(blog.contains_url(&url("http://a.test/blog/post")));
        assert!(!blog.contains_url(&url("http://a.test/blogs")));
    }
}
