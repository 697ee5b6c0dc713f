use crate::types::{FeedSpec, FetchConfig, NewsletterError, OutputFormat, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Location tried when no config path is given on the command line.
pub const DEFAULT_CONFIG_PATH: &str = "config/config.yaml";

/// Run configuration, loaded once per run from YAML. Every field has a default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub feeds: Vec<FeedSpec>,
    pub fetching: FetchingConfig,
    pub summarization: SummarizationConfig,
    pub api: ApiConfig,
    pub filter: FilterConfig,
    pub newsletter: NewsletterConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchingConfig {
    pub timeout_seconds: u64,
    pub user_agent: String,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub min_host_interval_ms: u64,
    pub respect_robots_txt: bool,
    pub concurrency: usize,
    pub max_articles_per_feed: Option<usize>,
    pub article_age_limit_days: Option<i64>,
    pub max_image_bytes: usize,
}

impl Default for FetchingConfig {
    fn default() -> Self {
        let fetch = FetchConfig::default();
        Self {
            timeout_seconds: fetch.timeout_seconds,
            user_agent: fetch.user_agent,
            max_retries: fetch.max_retries,
            retry_delay_ms: fetch.retry_delay_ms,
            min_host_interval_ms: fetch.min_host_interval_ms,
            respect_robots_txt: fetch.respect_robots_txt,
            concurrency: 4,
            max_articles_per_feed: None,
            article_age_limit_days: None,
            max_image_bytes: 5 * 1024 * 1024,
        }
    }
}

impl FetchingConfig {
    pub fn to_fetch_config(&self) -> FetchConfig {
        FetchConfig {
            user_agent: self.user_agent.clone(),
            timeout_seconds: self.timeout_seconds,
            // Never more than one retry per request
            max_retries: self.max_retries.min(1),
            retry_delay_ms: self.retry_delay_ms,
            min_host_interval_ms: self.min_host_interval_ms,
            respect_robots_txt: self.respect_robots_txt,
            ..FetchConfig::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryLength {
    Short,
    Medium,
    Long,
}

impl SummaryLength {
    /// Sentence count used by the offline summarizer.
    pub fn sentence_count(&self) -> usize {
        match self {
            SummaryLength::Short => 2,
            SummaryLength::Medium => 3,
            SummaryLength::Long => 5,
        }
    }

    /// Length instruction placed in the model prompt.
    pub fn prompt_hint(&self) -> &'static str {
        match self {
            SummaryLength::Short => "1-2 sentences",
            SummaryLength::Medium => "3-4 sentences",
            SummaryLength::Long => "5-6 sentences",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SummarizationConfig {
    pub length: SummaryLength,
    pub include_quotes: bool,
    pub include_key_points: bool,
    pub num_key_points: usize,
    pub max_content_chars: usize,
    pub generate_introduction: bool,
}

impl Default for SummarizationConfig {
    fn default() -> Self {
        Self {
            length: SummaryLength::Medium,
            include_quotes: true,
            include_key_points: true,
            num_key_points: 3,
            max_content_chars: 15_000,
            generate_introduction: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiProvider {
    Gemini,
    Openai,
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub provider: ApiProvider,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub base_url: Option<String>,
    pub timeout_seconds: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            provider: ApiProvider::Gemini,
            model: "gemini-1.5-flash".to_string(),
            temperature: 0.3,
            max_tokens: 1000,
            api_key_env: "GEMINI_API_KEY".to_string(),
            base_url: None,
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRule {
    pub name: String,
    pub keywords: Vec<String>,
}

impl CategoryRule {
    fn new(name: &str, keywords: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub max_articles: usize,
    pub relevance_threshold: f64,
    pub max_per_source: Option<usize>,
    pub default_category: String,
    pub categories: Vec<CategoryRule>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            max_articles: 10,
            relevance_threshold: 0.0,
            max_per_source: None,
            default_category: "General".to_string(),
            categories: default_category_rules(),
        }
    }
}

pub fn default_category_rules() -> Vec<CategoryRule> {
    vec![
        CategoryRule::new(
            "Technology",
            &["technology", "software", "ai", "artificial intelligence", "machine learning", "computer", "internet", "startup", "app", "programming"],
        ),
        CategoryRule::new(
            "Science",
            &["science", "research", "study", "space", "nasa", "physics", "biology", "climate", "medicine"],
        ),
        CategoryRule::new(
            "Business",
            &["business", "economy", "market", "stocks", "finance", "investment", "company", "earnings"],
        ),
        CategoryRule::new(
            "Sports",
            &["sports", "football", "basketball", "soccer", "tennis", "olympics", "championship"],
        ),
        CategoryRule::new(
            "Entertainment",
            &["movie", "film", "music", "celebrity", "television", "gaming", "streaming"],
        ),
        CategoryRule::new(
            "Politics",
            &["politics", "election", "government", "policy", "congress", "parliament", "senate"],
        ),
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewsletterConfig {
    pub title: String,
    pub subtitle: String,
    pub output_formats: Vec<OutputFormat>,
    pub include_images: bool,
    pub include_quotes: bool,
    pub include_links: bool,
    pub output_dir: PathBuf,
    pub date_format: String,
    pub profiles_dir: PathBuf,
}

impl Default for NewsletterConfig {
    fn default() -> Self {
        Self {
            title: "Daily Tech Digest".to_string(),
            subtitle: "Your Personalized News Summary".to_string(),
            output_formats: vec![OutputFormat::Markdown, OutputFormat::Pdf],
            include_images: true,
            include_quotes: true,
            include_links: true,
            output_dir: PathBuf::from("data/output"),
            date_format: "%Y-%m-%d".to_string(),
            profiles_dir: PathBuf::from("data/user_profiles"),
        }
    }
}

/// Per-run overrides coming from the CLI flags or the web form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunOverrides {
    pub max_articles: Option<usize>,
    pub relevance_threshold: Option<f64>,
    pub output_formats: Option<Vec<OutputFormat>>,
    pub output_dir: Option<PathBuf>,
    pub summary_length: Option<SummaryLength>,
    pub include_images: Option<bool>,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_yaml(&contents)?;
        info!("Loaded configuration from {} ({} feeds)", path.display(), config.feeds.len());
        Ok(config)
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `path` when given, else the default location, else defaults.
    /// An explicitly requested file that is missing is an error.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_PATH);
                if default_path.exists() {
                    Self::load(default_path)
                } else {
                    warn!("No config file at {}, using defaults", DEFAULT_CONFIG_PATH);
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.filter.relevance_threshold) {
            return Err(NewsletterError::Config(format!(
                "filter.relevance_threshold must be within [0, 1], got {}",
                self.filter.relevance_threshold
            )));
        }
        if self.filter.max_articles == 0 {
            return Err(NewsletterError::Config("filter.max_articles must be at least 1".to_string()));
        }
        if self.filter.max_per_source == Some(0) {
            return Err(NewsletterError::Config("filter.max_per_source must be at least 1".to_string()));
        }
        if self.fetching.concurrency == 0 {
            return Err(NewsletterError::Config("fetching.concurrency must be at least 1".to_string()));
        }
        if self.newsletter.output_formats.is_empty() {
            return Err(NewsletterError::Config("newsletter.output_formats must not be empty".to_string()));
        }
        for feed in &self.feeds {
            if !crate::utils::url::is_valid_feed_url(feed.url()) {
                return Err(NewsletterError::Config(format!("invalid feed URL: {}", feed.url())));
            }
        }
        Ok(())
    }

    /// Returns a copy with the overrides applied and re-validated.
    pub fn with_overrides(&self, overrides: &RunOverrides) -> Result<Self> {
        let mut config = self.clone();
        if let Some(max_articles) = overrides.max_articles {
            config.filter.max_articles = max_articles;
        }
        if let Some(threshold) = overrides.relevance_threshold {
            config.filter.relevance_threshold = threshold;
        }
        if let Some(formats) = &overrides.output_formats {
            config.newsletter.output_formats = formats.clone();
        }
        if let Some(dir) = &overrides.output_dir {
            config.newsletter.output_dir = dir.clone();
        }
        if let Some(length) = overrides.summary_length {
            config.summarization.length = length;
        }
        if let Some(include_images) = overrides.include_images {
            config.newsletter.include_images = include_images;
        }
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_yaml_uses_defaults() {
        let config = Config::from_yaml("{}").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.newsletter.title, "Daily Tech Digest");
        assert_eq!(config.filter.default_category, "General");
    }

    #[test]
    fn test_feeds_accept_strings_and_mappings() {
        let yaml = r#"
feeds:
  - https://example.com/rss
  - url: https://news.example.org/feed.xml
    name: Example News
    category: technology
filter:
  max_articles: 5
  relevance_threshold: 0.5
newsletter:
  output_formats: [markdown]
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.feeds.len(), 2);
        assert_eq!(config.feeds[0].url(), "https://example.com/rss");
        assert_eq!(config.feeds[1].name(), Some("Example News"));
        assert_eq!(config.feeds[1].category(), Some("technology"));
        assert_eq!(config.filter.max_articles, 5);
        assert_eq!(config.newsletter.output_formats, vec![OutputFormat::Markdown]);
    }

    #[test]
    fn test_shipped_config_loads() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("..").join(DEFAULT_CONFIG_PATH);
        let config = Config::load(path).unwrap();
        assert_eq!(config.feeds.len(), 6);
        assert_eq!(config.api.provider, ApiProvider::Gemini);
        assert_eq!(config.filter.max_per_source, Some(4));
    }

    #[test]
    fn test_threshold_out_of_range_is_rejected() {
        let err = Config::from_yaml("filter:\n  relevance_threshold: 1.5\n").unwrap_err();
        assert!(matches!(err, NewsletterError::Config(_)));
    }

    #[test]
    fn test_invalid_feed_url_is_rejected() {
        let err = Config::from_yaml("feeds:\n  - ftp://example.com/rss\n").unwrap_err();
        assert!(matches!(err, NewsletterError::Config(_)));
    }

    #[test]
    fn test_overrides_apply_and_validate() {
        let config = Config::default();
        let overrides = RunOverrides {
            max_articles: Some(3),
            output_formats: Some(vec![OutputFormat::Pdf]),
            ..RunOverrides::default()
        };
        let applied = config.with_overrides(&overrides).unwrap();
        assert_eq!(applied.filter.max_articles, 3);
        assert_eq!(applied.newsletter.output_formats, vec![OutputFormat::Pdf]);

        let bad = RunOverrides {
            max_articles: Some(0),
            ..RunOverrides::default()
        };
        assert!(config.with_overrides(&bad).is_err());
    }

    #[test]
    fn test_retries_are_capped_at_one() {
        let fetching = FetchingConfig {
            max_retries: 5,
            ..FetchingConfig::default()
        };
        assert_eq!(fetching.to_fetch_config().max_retries, 1);
    }
}
