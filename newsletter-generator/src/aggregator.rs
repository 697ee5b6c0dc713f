use crate::config::FetchingConfig;
use crate::sources::RssFeedSource;
use crate::traits::ArticleSource;
use crate::types::{ArticleReference, FeedSpec, SourceFailure};
use crate::Fetcher;
use futures::stream::{self, StreamExt};
use futures::FutureExt;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info};

/// References gathered from every source, plus the sources that failed.
#[derive(Debug, Default)]
pub struct FeedFetchReport {
    pub references: Vec<ArticleReference>,
    pub failures: Vec<SourceFailure>,
    pub duplicates: usize,
}

/// Pulls all configured sources and flattens their references.
///
/// Output order is source order, then source-internal order, regardless of
/// how many sources are pulled at once. A failing source is logged,
/// recorded in the report and skipped.
pub struct FeedAggregator {
    sources: Vec<Arc<dyn ArticleSource>>,
    concurrency: usize,
}

impl FeedAggregator {
    pub fn new(concurrency: usize) -> Self {
        Self {
            sources: Vec::new(),
            concurrency: concurrency.max(1),
        }
    }

    pub fn from_feeds(feeds: &[FeedSpec], fetching: &FetchingConfig, fetcher: Arc<Fetcher>) -> Self {
        let mut aggregator = Self::new(fetching.concurrency);
        for feed in feeds {
            let source = RssFeedSource::new(feed.clone(), fetcher.clone())
                .with_max_entries(fetching.max_articles_per_feed)
                .with_age_limit_days(fetching.article_age_limit_days);
            aggregator.add_source(Arc::new(source));
        }
        aggregator
    }

    /// Add a new content source
    pub fn add_source(&mut self, source: Arc<dyn ArticleSource>) {
        debug!("Adding source: {}", source.source_name());
        self.sources.push(source);
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    pub async fn fetch_all(&self) -> FeedFetchReport {
        let total_sources = self.sources.len();
        info!("Fetching {} feeds", total_sources);

        // The run future must stay Send, so the pulls are built before streaming
        let pending: Vec<_> = self
            .sources
            .iter()
            .cloned()
            .map(|source| {
                async move {
                    let result = source.pull().await;
                    (source, result)
                }
                .boxed()
            })
            .collect();
        let pulls: Vec<_> = stream::iter(pending).buffered(self.concurrency).collect().await;

        let mut report = FeedFetchReport::default();
        let mut seen_urls = HashSet::new();
        let mut successful_fetches = 0;

        for (source, result) in pulls {
            match result {
                Ok(references) => {
                    successful_fetches += 1;
                    for mut reference in references {
                        if !seen_urls.insert(reference.url.clone()) {
                            debug!("Skipping duplicate entry with URL: {}", reference.url);
                            report.duplicates += 1;
                            continue;
                        }
                        reference.position = report.references.len();
                        report.references.push(reference);
                    }
                }
                Err(e) => {
                    error!("Failed to fetch feed {}: {}", source.source_url(), e);
                    report.failures.push(SourceFailure {
                        source: source.source_name(),
                        url: source.source_url().to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(
            "Successfully fetched {}/{} feeds, {} unique articles ({} duplicates removed)",
            successful_fetches,
            total_sources,
            report.references.len(),
            report.duplicates
        );
        report
    }
}
