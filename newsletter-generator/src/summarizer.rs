use crate::config::SummarizationConfig;
use crate::content::extract_quotes;
use crate::llm_adapter::{LlmAdapter, LlmError};
use crate::processing::RelevanceScorer;
use crate::types::{ArticleContent, ArticleSummary, CategoryGroup, SummaryOutcome, UserProfile};
use crate::utils::text;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

const MAX_SUMMARY_CHARS: usize = 600;
const MAX_KEY_POINT_CHARS: usize = 240;

/// Summary fields before they are attached to an article.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SummaryParts {
    pub summary: String,
    #[serde(default)]
    pub key_points: Vec<String>,
    #[serde(default)]
    pub quotes: Vec<String>,
}

/// Summarizes articles through an [`LlmAdapter`], falling back to a
/// deterministic extractive summary when the backend is missing,
/// unreachable, out of quota, or keeps answering with malformed output.
#[derive(Clone)]
pub struct Summarizer {
    adapter: Option<Arc<dyn LlmAdapter>>,
    settings: SummarizationConfig,
}

impl Summarizer {
    pub fn new(adapter: Option<Arc<dyn LlmAdapter>>, settings: SummarizationConfig) -> Self {
        Self { adapter, settings }
    }

    pub fn is_offline(&self) -> bool {
        self.adapter.is_none()
    }

    pub async fn summarize(
        &self,
        content: &ArticleContent,
        profile: &UserProfile,
        scorer: &RelevanceScorer,
    ) -> SummaryOutcome {
        let Some(adapter) = &self.adapter else {
            return self.degrade(content, scorer, "no summarization backend configured".to_string());
        };

        debug!("Summarizing article: {}", content.reference.title);
        let prompt = self.build_prompt(content, profile, false);
        match adapter.complete(&prompt).await {
            Ok(answer) => {
                if let Some(parts) = parse_model_output(&answer) {
                    return self.assemble(content, parts, false, scorer);
                }
                warn!("Malformed summary for {}, retrying with a stricter prompt", content.reference.url);
            }
            Err(LlmError::EmptyResponse) => {
                warn!("Empty summary for {}, retrying with a stricter prompt", content.reference.url);
            }
            Err(e) => {
                warn!("Backend failed for {}: {}", content.reference.url, e);
                return self.degrade(content, scorer, e.to_string());
            }
        }

        let strict_prompt = self.build_prompt(content, profile, true);
        match adapter.complete(&strict_prompt).await {
            Ok(answer) => match parse_model_output(&answer) {
                Some(parts) => self.assemble(content, parts, false, scorer),
                None => self.degrade(content, scorer, "malformed output after retry".to_string()),
            },
            Err(e) => self.degrade(content, scorer, e.to_string()),
        }
    }

    pub fn build_prompt(&self, content: &ArticleContent, profile: &UserProfile, strict: bool) -> String {
        let reference = &content.reference;
        let body = text::truncate_chars(&content.body, self.settings.max_content_chars);
        if body.len() < content.body.len() {
            debug!("Content truncated for article: {}", reference.title);
        }

        let published = reference
            .published_at
            .map(|dt| dt.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let interests = if profile.interests.is_empty() {
            "general news".to_string()
        } else {
            profile.interests.join(", ")
        };
        let quotes_instruction = if self.settings.include_quotes {
            "Extract 2-3 notable quotes from the article."
        } else {
            "Skip quote extraction for this article."
        };

        let mut prompt = String::new();
        prompt.push_str("You are an expert news editor. Summarize the following article and provide key insights.\n\n");
        prompt.push_str("Article Information:\n");
        prompt.push_str(&format!("Title: {}\n", reference.title));
        prompt.push_str(&format!("Source: {}\n", reference.source));
        prompt.push_str(&format!(
            "Category: {}\n",
            reference.category_hint.as_deref().unwrap_or("general")
        ));
        prompt.push_str(&format!("Published: {}\n", published));
        prompt.push_str(&format!("Reader interests: {}\n\n", interests));
        prompt.push_str("Article Content:\n");
        prompt.push_str(&body);
        prompt.push_str("\n\nInstructions:\n");
        prompt.push_str(&format!(
            "1. Create a {} summary that captures the main points and key details\n",
            self.settings.length.prompt_hint()
        ));
        prompt.push_str(&format!(
            "2. Extract {} key points as bullet points\n",
            self.settings.num_key_points
        ));
        prompt.push_str(&format!("3. {}\n", quotes_instruction));
        prompt.push_str("4. Maintain a neutral, journalistic tone\n");
        prompt.push_str("5. Emphasize aspects related to the reader interests\n\n");
        prompt.push_str(
            "Please provide your response in this exact JSON format:\n\
             {\"summary\": \"...\", \"key_points\": [\"...\"], \"quotes\": [\"...\"]}\n\
             If there are no notable quotes, return an empty array for quotes.",
        );
        if strict {
            prompt.push_str(
                "\n\nIMPORTANT: Your previous answer could not be parsed. Respond with ONLY the JSON \
                 object. No prose, no code fences. \"summary\" must be a non-empty string, \
                 \"key_points\" and \"quotes\" arrays of strings.",
            );
        }
        prompt
    }

    /// Extractive summary: leading sentences as the summary, the following
    /// sentences as key points, the longest quote-like span as the quote.
    pub fn offline_summary(&self, content: &ArticleContent) -> Option<SummaryParts> {
        let source_text = if content.body.trim().is_empty() {
            content.reference.feed_summary.as_deref().unwrap_or("")
        } else {
            content.body.as_str()
        };
        let sentences = text::split_sentences(source_text);
        if sentences.is_empty() {
            return None;
        }

        let lead = self.settings.length.sentence_count().min(sentences.len());
        let summary = text::smart_truncate(&sentences[..lead].join(" "), MAX_SUMMARY_CHARS);

        let key_points = sentences[lead..]
            .iter()
            .take(self.settings.num_key_points)
            .map(|sentence| text::smart_truncate(sentence, MAX_KEY_POINT_CHARS))
            .collect();

        let mut candidates = extract_quotes(source_text);
        candidates.extend(content.quotes.iter().cloned());
        let quotes = candidates
            .into_iter()
            .max_by_key(|quote| quote.chars().count())
            .into_iter()
            .collect();

        Some(SummaryParts { summary, key_points, quotes })
    }

    fn degrade(&self, content: &ArticleContent, scorer: &RelevanceScorer, reason: String) -> SummaryOutcome {
        match self.offline_summary(content) {
            Some(parts) => match self.assemble(content, parts, true, scorer) {
                SummaryOutcome::Generated(summary) => SummaryOutcome::Degraded { summary, reason },
                other => other,
            },
            None => {
                warn!("Nothing to summarize for {}", content.reference.url);
                SummaryOutcome::Failed {
                    reference: content.reference.clone(),
                    reason: format!("{}; no text for an offline summary", reason),
                }
            }
        }
    }

    fn assemble(
        &self,
        content: &ArticleContent,
        mut parts: SummaryParts,
        degraded: bool,
        scorer: &RelevanceScorer,
    ) -> SummaryOutcome {
        if self.settings.include_key_points {
            parts.key_points.truncate(self.settings.num_key_points);
        } else {
            parts.key_points.clear();
        }
        if !self.settings.include_quotes {
            parts.quotes.clear();
        } else if parts.quotes.is_empty() && !degraded {
            // The model found no quotes; use the longest one lifted from the page
            parts.quotes = content
                .quotes
                .iter()
                .max_by_key(|quote| quote.chars().count())
                .cloned()
                .into_iter()
                .collect();
        }

        let reference = content.reference.clone();
        let relevance = scorer.score(
            &reference.title,
            &parts.summary,
            &reference.source,
            reference.category_hint.as_deref(),
        );

        SummaryOutcome::Generated(ArticleSummary {
            reference,
            image_url: content.image_url.clone(),
            summary: parts.summary,
            key_points: parts.key_points,
            quotes: parts.quotes,
            relevance: relevance.score,
            matched_interests: relevance.matched_interests,
            degraded,
        })
    }

    /// Short opening paragraph for the newsletter. `None` when disabled.
    pub async fn generate_introduction(&self, groups: &[CategoryGroup], profile: &UserProfile) -> Option<String> {
        if !self.settings.generate_introduction {
            return None;
        }

        let article_count: usize = groups.iter().map(|group| group.articles.len()).sum();
        let mut categories: Vec<&str> = groups.iter().map(|group| group.name.as_str()).collect();
        categories.sort_unstable();
        categories.dedup();
        let categories_text = if categories.is_empty() {
            "various topics".to_string()
        } else {
            categories.join(", ")
        };

        if let Some(adapter) = &self.adapter {
            let mut sources: Vec<&str> = groups
                .iter()
                .flat_map(|group| group.articles.iter().map(|a| a.reference.source.as_str()))
                .collect();
            sources.sort_unstable();
            sources.dedup();
            sources.truncate(5);

            let prompt = format!(
                "Write a brief, engaging introduction for a newsletter containing {} articles covering {}.\n\
                 The newsletter sources include: {}\n\
                 The reader is interested in: {}\n\
                 Write a 2-3 sentence introduction that welcomes the reader, mentions the key topics \
                 covered and sets an engaging tone. Keep it professional but friendly. Do not use JSON \
                 format, just return the introduction text.",
                article_count,
                categories_text,
                sources.join(", "),
                profile.interests.join(", ")
            );

            match adapter.complete(&prompt).await {
                Ok(answer) => {
                    let cleaned = answer.replace('"', "").replace("\n\n", "\n");
                    let cleaned = cleaned.trim();
                    if !cleaned.is_empty() {
                        info!("Generated introduction with {}", adapter.adapter_name());
                        return Some(cleaned.to_string());
                    }
                }
                Err(e) => warn!("Error generating introduction: {}", e),
            }
        }

        Some(fallback_introduction(article_count, &categories_text, &profile.interests))
    }
}

pub fn fallback_introduction(article_count: usize, categories_text: &str, interests: &[String]) -> String {
    let noun = if article_count == 1 { "article" } else { "articles" };
    let mut introduction = format!(
        "Welcome to your personalized newsletter! Today we've curated {} {} covering {} to keep you informed on the topics that matter most to you",
        article_count, noun, categories_text
    );
    if interests.is_empty() {
        introduction.push('.');
    } else {
        introduction.push_str(&format!(": {}.", interests.join(", ")));
    }
    introduction
}

/// Pulls the JSON object out of a model answer (between the first `{` and
/// the last `}`). Requires a non-empty `summary`.
pub fn parse_model_output(answer: &str) -> Option<SummaryParts> {
    let start = answer.find('{')?;
    let end = answer.rfind('}')?;
    if end <= start {
        return None;
    }

    let mut parts: SummaryParts = serde_json::from_str(&answer[start..=end]).ok()?;
    parts.summary = parts.summary.trim().to_string();
    if parts.summary.is_empty() {
        return None;
    }
    parts.key_points.retain(|point| !point.trim().is_empty());
    parts.quotes.retain(|quote| !quote.trim().is_empty());
    Some(parts)
}
