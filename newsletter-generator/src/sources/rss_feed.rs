use crate::traits::ArticleSource;
use crate::types::{ArticleReference, FeedSpec, ParsedEntry, Result};
use crate::utils;
use crate::{FeedParser, Fetcher};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info};

/// One configured RSS/Atom feed
pub struct RssFeedSource {
    spec: FeedSpec,
    fetcher: Arc<Fetcher>,
    parser: FeedParser,
    max_entries: Option<usize>,
    age_limit: Option<Duration>,
}

impl RssFeedSource {
    pub fn new(spec: FeedSpec, fetcher: Arc<Fetcher>) -> Self {
        Self {
            spec,
            fetcher,
            parser: FeedParser::new(),
            max_entries: None,
            age_limit: None,
        }
    }

    pub fn with_max_entries(mut self, max_entries: Option<usize>) -> Self {
        self.max_entries = max_entries;
        self
    }

    pub fn with_age_limit_days(mut self, days: Option<i64>) -> Self {
        self.age_limit = days.map(Duration::days);
        self
    }

    fn is_too_old(&self, published_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        match (self.age_limit, published_at) {
            (Some(limit), Some(published)) => now.signed_duration_since(published) > limit,
            // Undated entries are kept
            _ => false,
        }
    }

    fn to_reference(&self, entry: ParsedEntry, source: &str) -> ArticleReference {
        ArticleReference {
            url: utils::url::canonicalize(&entry.url),
            title: entry.title,
            source: source.to_string(),
            published_at: entry.published_at,
            position: 0,
            feed_summary: entry.summary,
            feed_image_url: entry.image_url,
            category_hint: self.spec.category().map(|c| c.to_string()),
        }
    }
}

#[async_trait]
impl ArticleSource for RssFeedSource {
    fn source_name(&self) -> String {
        self.spec.name().map(|n| n.to_string()).unwrap_or_else(|| {
            // Extract domain name from URL as fallback
            utils::url::extract_domain(self.spec.url()).unwrap_or_else(|| "RSS Feed".to_string())
        })
    }

    fn source_url(&self) -> &str {
        self.spec.url()
    }

    async fn pull(&self) -> Result<Vec<ArticleReference>> {
        info!("Pulling RSS feed: {}", self.spec.url());

        let fetch_result = self.fetcher.fetch_feed(self.spec.url()).await?;
        let parsed_feed = self.parser.parse_feed(&fetch_result.content)?;

        // Configured name wins over the feed's own title
        let source = match (self.spec.name(), parsed_feed.title.as_deref()) {
            (Some(name), _) => name.to_string(),
            (None, Some(title)) if !title.trim().is_empty() => title.trim().to_string(),
            _ => self.source_name(),
        };

        let now = Utc::now();
        let mut references = Vec::new();
        for entry in parsed_feed.entries {
            if self.max_entries.is_some_and(|max| references.len() >= max) {
                break;
            }
            if self.is_too_old(entry.published_at, now) {
                debug!("Skipping stale entry: {}", entry.url);
                continue;
            }
            references.push(self.to_reference(entry, &source));
        }

        info!(
            "Pulled {} items from {} in {}ms",
            references.len(),
            self.spec.url(),
            fetch_result.response_time_ms
        );
        Ok(references)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FetchConfig;

    fn source(age_limit_days: Option<i64>) -> RssFeedSource {
        let fetcher = Arc::new(Fetcher::new(FetchConfig::default()).unwrap());
        RssFeedSource::new(FeedSpec::Url("https://example.com/rss".to_string()), fetcher)
            .with_age_limit_days(age_limit_days)
    }

    #[test]
    fn test_age_limit_keeps_undated_entries() {
        let now = Utc::now();
        let limited = source(Some(3));
        assert!(limited.is_too_old(Some(now - Duration::days(4)), now));
        assert!(!limited.is_too_old(Some(now - Duration::days(2)), now));
        assert!(!limited.is_too_old(None, now));

        let unlimited = source(None);
        assert!(!unlimited.is_too_old(Some(now - Duration::days(400)), now));
    }

    #[test]
    fn test_reference_uses_canonical_url_and_category_hint() {
        let spec = FeedSpec::Detailed {
            url: "https://example.com/rss".to_string(),
            name: Some("Example".to_string()),
            category: Some("science".to_string()),
        };
        let fetcher = Arc::new(Fetcher::new(FetchConfig::default()).unwrap());
        let source = RssFeedSource::new(spec, fetcher);
        assert_eq!(source.source_name(), "Example");

        let entry = ParsedEntry {
            url: "https://example.com/a?utm_source=rss#top".to_string(),
            title: "A".to_string(),
            summary: None,
            published_at: None,
            image_url: None,
        };
        let reference = source.to_reference(entry, "Example");
        assert_eq!(reference.url, "https://example.com/a");
        assert_eq!(reference.category_hint.as_deref(), Some("science"));
    }
}
