//! Page retrieval and same-site link discovery.

use crate::controls::CrawlControls;
use crate::html::{self, HtmlError};
use reqwest::header::{HeaderMap, HeaderValue, REFERER};
use reqwest::{redirect::Policy, Client};
use std::future::Future;
use url::Url;

/// A same-site link found on a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundLink {
    /// Site-relative path of the resolved URL, see [`page_path`].
    pub path: String,
    /// Attribute resolved against the page URL.
    pub url: Url,
}

/// Result of fetching one URL.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// URL that was requested.
    pub url: Url,
    /// HTTP status code.
    pub status: u16,
    /// Response body.
    pub html: String,
    /// Same-site links in document order.
    pub links: Vec<OutboundLink>,
}

/// Errors raised while fetching a single page.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Transport failure, timeout or body decoding error.
    #[error("request to {url} failed: {source}")]
    Http {
        /// Requested URL.
        url: Url,
        /// Client error.
        #[source]
        source: reqwest::Error,
    },
    /// The server answered with a non-success status.
    #[error("{url} answered with status {status}")]
    Status {
        /// Requested URL.
        url: Url,
        /// Status code.
        status: u16,
    },
    /// Markup could not be scanned for links.
    #[error("failed to scan {url}: {source}")]
    Html {
        /// Requested URL.
        url: Url,
        /// Scan error.
        #[source]
        source: HtmlError,
    },
    /// The HTTP client could not be configured.
    #[error("invalid client configuration: {0}")]
    Client(String),
}

/// Retrieves pages for the crawler and the single-page reindexer.
pub trait Fetch: Send + Sync + 'static {
    /// Fetches `url`, returning the status, body and same-site links.
    fn fetch(&self, url: &Url) -> impl Future<Output = Result<FetchedPage, FetchError>> + Send;
}

/// `reqwest`-backed fetcher.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Builds a client with the configured user agent, referrer and timeout.
    pub fn new(controls: &CrawlControls) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        if let Some(referrer) = controls.referrer() {
            let value = HeaderValue::from_str(referrer)
                .map_err(|err| FetchError::Client(format!("referrer: {err}")))?;
            headers.insert(REFERER, value);
        }
        let client = Client::builder()
            .user_agent(controls.user_agent())
            .default_headers(headers)
            .redirect(Policy::limited(5))
            .timeout(controls.request_timeout())
            .build()
            .map_err(|err| FetchError::Client(err.to_string()))?;
        Ok(Self { client })
    }
}

impl Fetch for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchedPage, FetchError> {
        let http_err = |source| FetchError::Http {
            url: url.clone(),
            source,
        };
        let response = self.client.get(url.clone()).send().await.map_err(http_err)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.clone(),
                status: status.as_u16(),
            });
        }
        let html = response.text().await.map_err(http_err)?;
        page_from_html(url, status.as_u16(), html)
    }
}

/// Builds a [`FetchedPage`] by scanning `html` for same-site links.
pub fn page_from_html(url: &Url, status: u16, html: String) -> Result<FetchedPage, FetchError> {
    let hrefs = html::extract_hrefs(&html).map_err(|source| FetchError::Html {
        url: url.clone(),
        source,
    })?;
    Ok(FetchedPage {
        url: url.clone(),
        status,
        links: same_site_links(url, &hrefs),
        html,
    })
}

/// Keeps path-relative hrefs (leading `/`, not `//`) and resolves them against `base`.
pub fn same_site_links(base: &Url, hrefs: &[String]) -> Vec<OutboundLink> {
    hrefs
        .iter()
        .filter_map(|raw| {
            let href = raw.trim();
            let href = href.split_once('#').map_or(href, |(path, _)| path);
            if !href.starts_with('/') || href.starts_with("//") {
                return None;
            }
            let mut url = base.join(href).ok()?;
            url.set_fragment(None);
            Some(OutboundLink {
                path: page_path(&url),
                url,
            })
        })
        .collect()
}

/// Path plus query of `url` in its serialized (percent-encoded) form.
///
/// Pages are keyed by this value, so `/новости` and `/%D0%BD...` name one page.
pub fn page_path(url: &Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{query}", url.path()),
        None => url.path().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn hrefs(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| (*value).to_string()).collect()
    }

    #[test]
    fn keeps_only_path_relative_links() {
        let base = Url::parse("https://a.test/news/").unwrap();
        let links = same_site_links(
            &base,
            &hrefs(&[
                "/x",
                "relative",
                "https://a.test/abs",
                "//cdn.test/lib.js",
                "#top",
                "mailto:a@a.test",
                " /y?page=2#c ",
            ]),
        );
        let found: Vec<(&str, &str)> = links
            .iter()
            .map(|link| (link.path.as_str(), link.url.as_str()))
            .collect();
        assert_eq!(
            found,
            vec![
                ("/x", "https://a.test/x"),
                ("/y?page=2", "https://a.test/y?page=2"),
            ]
        );
    }

    #[test]
    fn literal_and_encoded_paths_agree() {
        let base = Url::parse("http://a.test/").unwrap();
        let links = same_site_links(
            &base,
            &hrefs(&["/новости", "/%D0%BD%D0%BE%D0%B2%D0%BE%D1%81%D1%82%D0%B8"]),
        );
        assert_eq!(links[0].path, links[1].path);
        assert_eq!(links[0].path, page_path(&Url::parse("http://a.test/новости#top").unwrap()));
        assert_eq!(page_path(&Url::parse("http://a.test").unwrap()), "/");
        assert_eq!(page_path(&Url::parse("http://a.test/news?id=2").unwrap()), "/news?id=2");
    }

    #[test]
    fn page_from_html_resolves_links() {
        let url = Url::parse("http://a.test/").unwrap();
        let page = page_from_html(
            &url,
            200,
            r#"<a href="/x">x</a><a href="http://b.test/">b</a>"#.to_string(),
        )
        .expect("page");
        assert_eq!(page.status, 200);
        assert_eq!(page.links.len(), 1);
        assert_eq!(page.links[0].url.as_str(), "http://a.test/x");
    }

    #[test]
    fn builds_http_client_from_controls() {
        let controls = CrawlControls::default().with_referrer(Some("https://ref.test".into()));
        assert!(HttpFetcher::new(&controls).is_ok());

        let bad = CrawlControls::default().with_referrer(Some("bad\nvalue".into()));
        assert!(matches!(HttpFetcher::new(&bad), Err(FetchError::Client(_))));
    }
}
