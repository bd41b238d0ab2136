//! Configured site list, loaded from TOML.
//!
//! ```toml
//! [[sites]]
//! url = "https://example.ru"
//! name = "Example"
//! ```

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

/// One configured site.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SiteConfig {
    /// Root URL the crawl starts from.
    pub url: String,
    /// Display name.
    pub name: String,
}

impl SiteConfig {
    /// Parsed root URL.
    pub fn root(&self) -> Result<Url, SitesError> {
        Url::parse(&self.url).map_err(|source| SitesError::InvalidUrl {
            url: self.url.clone(),
            source,
        })
    }

    /// True when `url` shares scheme, host and port with this site.
    pub fn same_origin(&self, url: &Url) -> bool {
        self.root()
            .map(|root| root.origin() == url.origin())
            .unwrap_or(false)
    }
}

/// Sites crawled by a full reindex.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SitesList {
    sites: Vec<SiteConfig>,
}

/// Errors raised while loading the site list.
#[derive(Debug, thiserror::Error)]
pub enum SitesError {
    /// The file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// Site list location.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The TOML did not match the expected shape.
    #[error("invalid site list: {0}")]
    Parse(#[from] toml::de::Error),
    /// A site URL is not an absolute http(s) URL.
    #[error("invalid site url {url:?}: {source}")]
    InvalidUrl {
        /// Offending value.
        url: String,
        /// Parse error.
        #[source]
        source: url::ParseError,
    },
    /// A site URL uses a scheme other than http or https.
    #[error("unsupported scheme in site url {0:?}")]
    UnsupportedScheme(String),
    /// No sites were configured.
    #[error("site list is empty")]
    Empty,
}

impl SitesList {
    /// Validates and wraps `sites`.
    pub fn new(sites: Vec<SiteConfig>) -> Result<Self, SitesError> {
        let list = Self { sites };
        list.validate()?;
        Ok(list)
    }

    /// Parses TOML text.
    pub fn parse(source: &str) -> Result<Self, SitesError> {
        let list: Self = toml::from_str(source)?;
        list.validate()?;
        Ok(list)
    }

    /// Reads and parses a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SitesError> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).map_err(|source| SitesError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&source)
    }

    /// Configured sites in file order.
    pub fn sites(&self) -> &[SiteConfig] {
        &self.sites
    }

    /// The configured site whose origin matches `url`.
    pub fn site_for(&self, url: &Url) -> Option<&SiteConfig> {
        self.sites.iter().find(|site| site.same_origin(url))
    }

    fn validate(&self) -> Result<(), SitesError> {
        if self.sites.is_empty() {
            return Err(SitesError::Empty);
        }
        for site in &self.sites {
            let root = site.root()?;
            if !matches!(root.scheme(), "http" | "https") {
                return Err(SitesError::UnsupportedScheme(site.url.clone()));
            }
        }
        Ok(())
    }
}
