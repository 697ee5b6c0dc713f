use crate::aggregator::FeedAggregator;
use crate::config::Config;
use crate::content::{ContentOutcome, ContentParser};
use crate::generator::{build_document, render_markdown, write_outputs, RenderOptions, RenderedOutput};
use crate::llm_adapter::{build_adapter, LlmAdapter};
use crate::pdf::render_pdf;
use crate::processing::{Categorizer, FilterStage, RelevanceScorer};
use crate::summarizer::Summarizer;
use crate::types::{
    NewsletterDocument, NewsletterError, OutputFormat, Result, SourceFailure, SummaryOutcome, UserProfile,
};
use crate::Fetcher;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Coarse progress of a run, published to the web GUI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Idle,
    FetchingFeeds,
    ParsingArticles,
    Summarizing,
    Filtering,
    Rendering,
    Writing,
    Done,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputFile {
    pub format: OutputFormat,
    pub path: PathBuf,
}

/// Everything a caller needs to know about a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub document: NewsletterDocument,
    pub outputs: Vec<OutputFile>,
    /// Articles dropped during parsing or summarization.
    pub skipped: Vec<SourceFailure>,
    pub feed_failures: Vec<SourceFailure>,
    pub degraded_count: usize,
    pub failed_formats: Vec<(OutputFormat, String)>,
    pub omitted_images: Vec<String>,
    pub below_threshold: usize,
}

impl RunReport {
    pub fn output_for(&self, format: OutputFormat) -> Option<&OutputFile> {
        self.outputs.iter().find(|output| output.format == format)
    }
}

/// The fetch → parse → summarize → filter → render → write sequence,
/// shared by the CLI and the web GUI.
#[derive(Clone)]
pub struct NewsletterPipeline {
    fetcher: Arc<Fetcher>,
    adapter: Option<Arc<dyn LlmAdapter>>,
}

impl NewsletterPipeline {
    pub fn new(config: &Config, adapter: Option<Arc<dyn LlmAdapter>>) -> Result<Self> {
        let fetcher = Fetcher::new(config.fetching.to_fetch_config())?;
        Ok(Self {
            fetcher: Arc::new(fetcher),
            adapter,
        })
    }

    /// Build the pipeline with the summarization backend named in `config.api`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let adapter = build_adapter(&config.api)?;
        Self::new(config, adapter)
    }

    pub fn is_offline(&self) -> bool {
        self.adapter.is_none()
    }

    pub async fn run(&self, config: &Config, profile: &UserProfile) -> Result<RunReport> {
        self.run_with_progress(config, profile, None).await
    }

    pub async fn run_with_progress(
        &self,
        config: &Config,
        profile: &UserProfile,
        progress: Option<&watch::Sender<PipelineStage>>,
    ) -> Result<RunReport> {
        let run_id = Uuid::new_v4();
        let span = info_span!("run", %run_id, profile = %profile.name);

        async move {
            let started = std::time::Instant::now();
            let result = self.execute(run_id, config, profile, progress).await;
            match &result {
                Ok(report) => info!(
                    "Run finished in {:.1}s: {} articles, {} outputs",
                    started.elapsed().as_secs_f64(),
                    report.document.article_count(),
                    report.outputs.len()
                ),
                Err(e) => error!("Run failed: {}", e),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn execute(
        &self,
        run_id: Uuid,
        config: &Config,
        profile: &UserProfile,
        progress: Option<&watch::Sender<PipelineStage>>,
    ) -> Result<RunReport> {
        let report_stage = |stage: PipelineStage| {
            debug!("Stage: {:?}", stage);
            if let Some(progress) = progress {
                progress.send_replace(stage);
            }
        };

        if config.feeds.is_empty() {
            return Err(NewsletterError::NoFeedsConfigured);
        }
        let concurrency = config.fetching.concurrency.max(1);

        // Fetch
        report_stage(PipelineStage::FetchingFeeds);
        let aggregator = FeedAggregator::from_feeds(&config.feeds, &config.fetching, self.fetcher.clone());
        let feed_report = aggregator.fetch_all().await;
        let fetched_count = feed_report.references.len();

        // Parse
        report_stage(PipelineStage::ParsingArticles);
        let parser = ContentParser::new(self.fetcher.clone());
        let parsed: Vec<ContentOutcome> = stream::iter(feed_report.references)
            .map(|reference| {
                let parser = parser.clone();
                async move { parser.parse(reference).await }
            })
            .buffered(concurrency)
            .collect()
            .await;

        let mut skipped = Vec::new();
        let mut contents = Vec::new();
        for outcome in parsed {
            match outcome {
                ContentOutcome::Extracted(content) => contents.push(content),
                ContentOutcome::Unavailable { reference, reason } => skipped.push(SourceFailure {
                    source: reference.source,
                    url: reference.url,
                    reason,
                }),
            }
        }
        info!("Parsed {}/{} articles", contents.len(), fetched_count);

        // Summarize
        report_stage(PipelineStage::Summarizing);
        let summarizer = Summarizer::new(self.adapter.clone(), config.summarization.clone());
        let scorer = Arc::new(RelevanceScorer::new(profile, Categorizer::from_config(&config.filter)));
        let shared_profile = Arc::new(profile.clone());
        let parsed_count = contents.len();

        let outcomes: Vec<SummaryOutcome> = stream::iter(contents)
            .map(|content| {
                let summarizer = summarizer.clone();
                let scorer = scorer.clone();
                let profile = shared_profile.clone();
                async move { summarizer.summarize(&content, &profile, &scorer).await }
            })
            .buffered(concurrency)
            .collect()
            .await;

        let mut summaries = Vec::new();
        let mut degraded_count = 0;
        for outcome in outcomes {
            match outcome {
                SummaryOutcome::Generated(summary) => summaries.push(summary),
                SummaryOutcome::Degraded { summary, reason } => {
                    debug!("Degraded summary for {}: {}", summary.url(), reason);
                    degraded_count += 1;
                    summaries.push(summary);
                }
                SummaryOutcome::Failed { reference, reason } => skipped.push(SourceFailure {
                    source: reference.source,
                    url: reference.url,
                    reason,
                }),
            }
        }
        info!("Summarized {} articles ({} degraded)", summaries.len(), degraded_count);

        // Filter
        report_stage(PipelineStage::Filtering);
        let summarized_count = summaries.len();
        let filter = FilterStage::from_config(&config.filter, profile);
        let filtered = filter.process(summaries);

        if filtered.article_count() == 0 {
            let reason = if fetched_count == 0 {
                format!("no articles could be fetched from {} feeds", config.feeds.len())
            } else if summarized_count == 0 {
                format!("none of the {} fetched articles could be parsed or summarized", fetched_count)
            } else {
                format!(
                    "none of the {} summarized articles met the relevance threshold",
                    summarized_count
                )
            };
            return Err(NewsletterError::NoArticlesSelected { reason });
        }
        debug!(
            "Selected {} of {} summaries ({} parsed)",
            filtered.article_count(),
            summarized_count,
            parsed_count
        );

        // Render
        report_stage(PipelineStage::Rendering);
        let introduction = summarizer.generate_introduction(&filtered.groups, profile).await;
        let document = build_document(&config.newsletter, profile, filtered.groups, introduction, Utc::now());
        let options = RenderOptions::from_config(&config.newsletter, &config.summarization);

        let mut formats: Vec<OutputFormat> = Vec::new();
        for format in &config.newsletter.output_formats {
            if !formats.contains(format) {
                formats.push(*format);
            }
        }

        let mut rendered = Vec::new();
        let mut failed_formats = Vec::new();
        let mut omitted_images = Vec::new();
        for format in formats {
            match format {
                OutputFormat::Markdown => rendered.push(RenderedOutput {
                    format,
                    bytes: render_markdown(&document, &options).into_bytes(),
                }),
                OutputFormat::Pdf => match self.render_pdf_output(&document, &options, config).await {
                    Ok((bytes, omitted)) => {
                        omitted_images = omitted;
                        rendered.push(RenderedOutput { format, bytes });
                    }
                    Err(e) => {
                        warn!("PDF rendering failed, continuing without it: {}", e);
                        failed_formats.push((format, e.to_string()));
                    }
                },
            }
        }

        // Write
        report_stage(PipelineStage::Writing);
        let output_dir = config.newsletter.output_dir.clone();
        let date_format = config.newsletter.date_format.clone();
        let generated_at = document.generated_at;
        let (written, write_failures) =
            tokio::task::spawn_blocking(move || write_outputs(&output_dir, generated_at, &date_format, &rendered))
                .await
                .map_err(|e| NewsletterError::General(format!("writer task failed: {}", e)))?;
        failed_formats.extend(write_failures);

        if written.is_empty() {
            let reason = failed_formats
                .iter()
                .map(|(format, reason)| format!("{}: {}", format, reason))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(NewsletterError::AllOutputsFailed { reason });
        }

        report_stage(PipelineStage::Done);
        Ok(RunReport {
            run_id,
            document,
            outputs: written
                .into_iter()
                .map(|(format, path)| OutputFile { format, path })
                .collect(),
            skipped,
            feed_failures: feed_report.failures,
            degraded_count,
            failed_formats,
            omitted_images,
            below_threshold: filtered.below_threshold,
        })
    }

    async fn render_pdf_output(
        &self,
        document: &NewsletterDocument,
        options: &RenderOptions,
        config: &Config,
    ) -> Result<(Vec<u8>, Vec<String>)> {
        let max_image_bytes = config.fetching.max_image_bytes;
        let images = if options.include_images {
            self.download_images(document, max_image_bytes, config.fetching.concurrency.max(1))
                .await
        } else {
            HashMap::new()
        };

        let document = document.clone();
        let options = *options;
        let render = tokio::task::spawn_blocking(move || render_pdf(&document, &options, &images, max_image_bytes))
            .await
            .map_err(|e| NewsletterError::Pdf(format!("renderer task failed: {}", e)))??;

        if !render.omitted_images.is_empty() {
            warn!("{} images left out of the PDF", render.omitted_images.len());
        }
        Ok((render.bytes, render.omitted_images))
    }

    /// Download article images for the PDF. Failures only leave the image
    /// out of the map.
    async fn download_images(
        &self,
        document: &NewsletterDocument,
        max_image_bytes: usize,
        concurrency: usize,
    ) -> HashMap<String, Vec<u8>> {
        let mut urls: Vec<String> = document.articles().filter_map(|article| article.image_url.clone()).collect();
        urls.sort();
        urls.dedup();

        let fetcher = self.fetcher.clone();
        stream::iter(urls)
            .map(|url| {
                let fetcher = fetcher.clone();
                async move {
                    let result = fetcher.fetch_bytes(&url, max_image_bytes).await;
                    (url, result)
                }
            })
            .buffer_unordered(concurrency)
            .filter_map(|(url, result)| async move {
                match result {
                    Ok(bytes) => Some((url, bytes)),
                    Err(e) => {
                        warn!("Could not download image {}: {}", url, e);
                        None
                    }
                }
            })
            .collect()
            .await
    }
}
