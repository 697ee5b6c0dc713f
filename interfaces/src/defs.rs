use std::collections::BTreeMap;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

/// A link to one article as announced by a feed. Keyed by `url`, which is
/// already canonical when the reference is built.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArticleReference {
    pub url: String,
    pub title: String,
    pub source: String,
    pub published_at: Option<DateTime<Utc>>,
    /// Position in fetch order (feed list order, then feed-internal order).
    pub position: usize,
    pub feed_summary: Option<String>,
    pub feed_image_url: Option<String>,
    pub category_hint: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArticleContent {
    pub reference: ArticleReference,
    pub body: String,
    pub image_url: Option<String>,
    pub quotes: Vec<String>,
    pub authors: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArticleSummary {
    pub reference: ArticleReference,
    pub image_url: Option<String>,
    pub summary: String,
    pub key_points: Vec<String>,
    pub quotes: Vec<String>,
    pub relevance: f64,
    pub matched_interests: Vec<String>,
    /// Set when the summary came from the offline summarizer instead of the
    /// language model backend.
    pub degraded: bool,
}

impl ArticleSummary {
    pub fn url(&self) -> &str {
        &self.reference.url
    }

    pub fn source(&self) -> &str {
        &self.reference.source
    }
}

/// Result of summarizing one article. Degradation is a normal outcome,
/// not an error.
#[derive(Clone, Debug)]
pub enum SummaryOutcome {
    Generated(ArticleSummary),
    Degraded { summary: ArticleSummary, reason: String },
    Failed { reference: ArticleReference, reason: String },
}

impl SummaryOutcome {
    pub fn into_summary(self) -> Option<ArticleSummary> {
        match self {
            SummaryOutcome::Generated(summary) => Some(summary),
            SummaryOutcome::Degraded { summary, .. } => Some(summary),
            SummaryOutcome::Failed { .. } => None,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, SummaryOutcome::Degraded { .. })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub name: String,
    pub interests: Vec<String>,
    #[serde(default)]
    pub category_weights: BTreeMap<String, f64>,
    #[serde(default)]
    pub preferred_sources: Vec<String>,
    #[serde(default)]
    pub min_relevance: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserProfile {
    pub fn new(name: impl Into<String>, interests: Vec<String>) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            interests,
            category_weights: BTreeMap::new(),
            preferred_sources: Vec::new(),
            min_relevance: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Weight for a category, matched case-insensitively. Defaults to 1.0.
    pub fn category_weight(&self, category: &str) -> f64 {
        self.category_weights
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(category))
            .map(|(_, weight)| *weight)
            .unwrap_or(1.0)
    }

    pub fn prefers_source(&self, source: &str) -> bool {
        self.preferred_sources
            .iter()
            .any(|preferred| preferred.eq_ignore_ascii_case(source))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CategoryGroup {
    pub name: String,
    pub articles: Vec<ArticleSummary>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewsletterDocument {
    pub title: String,
    pub subtitle: String,
    pub generated_at: DateTime<Utc>,
    pub introduction: Option<String>,
    pub categories: Vec<CategoryGroup>,
    pub profile_name: String,
    pub interests: Vec<String>,
}

impl NewsletterDocument {
    pub fn article_count(&self) -> usize {
        self.categories.iter().map(|group| group.articles.len()).sum()
    }

    pub fn articles(&self) -> impl Iterator<Item = &ArticleSummary> {
        self.categories.iter().flat_map(|group| group.articles.iter())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Markdown,
    Pdf,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Markdown => "md",
            OutputFormat::Pdf => "pdf",
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Markdown => write!(f, "markdown"),
            OutputFormat::Pdf => write!(f, "pdf"),
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            "pdf" => Ok(OutputFormat::Pdf),
            other => Err(format!("unknown output format: {}", other)),
        }
    }
}
