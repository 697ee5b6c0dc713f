use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
// Use the interfaces crate for core types
pub use newsletter_interfaces::defs::{
    ArticleContent, ArticleReference, ArticleSummary, CategoryGroup, NewsletterDocument,
    OutputFormat, SummaryOutcome, UserProfile,
};

/// One configured feed. Accepts either a bare URL string or a mapping in YAML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeedSpec {
    Url(String),
    Detailed {
        url: String,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        category: Option<String>,
    },
}

impl FeedSpec {
    pub fn url(&self) -> &str {
        match self {
            FeedSpec::Url(url) => url,
            FeedSpec::Detailed { url, .. } => url,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            FeedSpec::Url(_) => None,
            FeedSpec::Detailed { name, .. } => name.as_deref(),
        }
    }

    pub fn category(&self) -> Option<&str> {
        match self {
            FeedSpec::Url(_) => None,
            FeedSpec::Detailed { category, .. } => category.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchResult {
    pub url: String,
    pub response_time_ms: u64,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub min_host_interval_ms: u64,
    pub respect_robots_txt: bool,
    pub max_body_size_mb: usize,
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "Auto-Newsletter-Generator/1.0".to_string(),
            timeout_seconds: 10,
            max_retries: 1,
            retry_delay_ms: 500,
            min_host_interval_ms: 250,
            respect_robots_txt: true,
            max_body_size_mb: 10,
            max_redirects: 5,
        }
    }
}

#[derive(Debug)]
pub struct ParsedFeed {
    pub title: Option<String>,
    pub entries: Vec<ParsedEntry>,
}

#[derive(Debug, Clone)]
pub struct ParsedEntry {
    pub url: String,
    pub title: String,
    pub summary: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub image_url: Option<String>,
}

/// A feed or article that was dropped, with the reason it was dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceFailure {
    pub source: String,
    pub url: String,
    pub reason: String,
}

#[derive(Debug, thiserror::Error)]
pub enum NewsletterError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status} from {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Access blocked for {url} (HTTP {status})")]
    Blocked { url: String, status: u16 },

    #[error("Robots.txt disallows access to {url}")]
    RobotsDisallowed { url: String },

    #[error("Request to {url} timed out after {seconds}s")]
    Timeout { url: String, seconds: u64 },

    #[error("Response from {url} exceeds {limit_mb}MB")]
    TooLarge { url: String, limit_mb: usize },

    #[error("Feed parse error: {0}")]
    Parse(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config file error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Profile not found: {name}")]
    ProfileNotFound { name: String },

    #[error("Invalid profile name: {name:?}")]
    InvalidProfileName { name: String },

    #[error("PDF rendering failed: {0}")]
    Pdf(String),

    #[error("No feeds configured")]
    NoFeedsConfigured,

    #[error("No articles selected: {reason}")]
    NoArticlesSelected { reason: String },

    #[error("All output formats failed: {reason}")]
    AllOutputsFailed { reason: String },

    #[error("General error: {0}")]
    General(String),
}

impl NewsletterError {
    /// Run-level failures abort a run without writing any output.
    pub fn is_run_level(&self) -> bool {
        matches!(
            self,
            NewsletterError::NoFeedsConfigured
                | NewsletterError::NoArticlesSelected { .. }
                | NewsletterError::AllOutputsFailed { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, NewsletterError>;
