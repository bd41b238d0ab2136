//! Crawl throttle controls and the command-line surface that builds them.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_USER_AGENT: &str = concat!("lemmacrawl/", env!("CARGO_PKG_VERSION"));

/// Tunable knobs that bound crawl behavior.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CrawlControls {
    politeness_delay: Duration,
    user_agent: String,
    referrer: Option<String>,
    request_timeout: Duration,
    max_depth: Option<usize>,
}

impl CrawlControls {
    /// Constructs a new set of crawl controls.
    pub fn new(
        politeness_delay: Duration,
        user_agent: String,
        referrer: Option<String>,
        request_timeout: Duration,
        max_depth: Option<usize>,
    ) -> Self {
        Self {
            politeness_delay,
            user_agent,
            referrer,
            request_timeout,
            max_depth,
        }
    }

    /// Time to wait before each fetch.
    pub fn politeness_delay(&self) -> Duration {
        self.politeness_delay
    }

    /// User agent sent with every request.
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Referrer header sent with every request, if any.
    pub fn referrer(&self) -> Option<&str> {
        self.referrer.as_deref()
    }

    /// Upper bound on a single request, connect through body.
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Deepest link level followed from a site root; `None` is unbounded.
    pub fn max_depth(&self) -> Option<usize> {
        self.max_depth
    }

    /// Returns a copy with a different politeness delay.
    pub fn with_politeness_delay(mut self, delay: Duration) -> Self {
        self.politeness_delay = delay;
        self
    }

    /// Returns a copy with a different referrer.
    pub fn with_referrer(mut self, referrer: Option<String>) -> Self {
        self.referrer = referrer;
        self
    }

    /// Returns a copy with a different depth cap.
    pub fn with_max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Whether a page found at `depth` may still be fetched.
    pub fn allows_depth(&self, depth: usize) -> bool {
        self.max_depth.map_or(true, |max| depth <= max)
    }
}

impl Default for CrawlControls {
    fn default() -> Self {
        Self {
            politeness_delay: Duration::from_millis(100),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            referrer: None,
            request_timeout: Duration::from_secs(30),
            max_depth: None,
        }
    }
}

/// Command-line interface for the search API binary.
#[derive(Parser, Debug, Clone)]
#[command(name = "lemmacrawl-api", about = "Site crawler with lemma search over HTTP")]
pub struct Cli {
    /// Address to bind the HTTP server to
    #[arg(long, env = "LEMMACRAWL_BIND", default_value = "127.0.0.1:8080")]
    pub bind: SocketAddr,

    /// TOML file listing the sites to crawl
    #[arg(long, env = "LEMMACRAWL_SITES", default_value = "sites.toml")]
    pub sites: PathBuf,

    /// Tab-separated morphology dictionary (built-in function words only when omitted)
    #[arg(long, env = "LEMMACRAWL_DICTIONARY")]
    pub dictionary: Option<PathBuf>,

    /// Milliseconds to wait before each fetch
    #[arg(long, env = "LEMMACRAWL_POLITENESS_MS", default_value_t = 100)]
    pub politeness_ms: u64,

    /// User agent sent with crawl requests
    #[arg(long, env = "LEMMACRAWL_USER_AGENT", default_value = DEFAULT_USER_AGENT)]
    pub user_agent: String,

    /// Referrer header sent with crawl requests
    #[arg(long, env = "LEMMACRAWL_REFERRER")]
    pub referrer: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long, env = "LEMMACRAWL_TIMEOUT_SECS", default_value_t = 30)]
    pub timeout_secs: u64,

    /// Maximum link depth from each site root (unbounded when omitted)
    #[arg(long, env = "LEMMACRAWL_MAX_DEPTH")]
    pub max_depth: Option<usize>,

    /// Postgres connection string; in-memory storage when omitted
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,
}

impl Cli {
    /// Converts the parsed CLI into `CrawlControls`.
    pub fn build_controls(&self) -> CrawlControls {
        CrawlControls::new(
            Duration::from_millis(self.politeness_ms),
            self.user_agent.clone(),
            self.referrer.clone().filter(|value| !value.trim().is_empty()),
            Duration::from_secs(self.timeout_secs),
            self.max_depth,
        )
    }
}
