use crate::config::{CategoryRule, FilterConfig};
use crate::types::{ArticleSummary, CategoryGroup, UserProfile};
use crate::utils;
use std::collections::HashSet;
use tracing::{debug, info};

/// Bonus for preferred sources, only granted when an interest matched.
const PREFERRED_SOURCE_BONUS: f64 = 0.1;

/// Assigns a category label from keyword rules.
#[derive(Debug, Clone)]
pub struct Categorizer {
    rules: Vec<CategoryRule>,
    default_category: String,
}

impl Categorizer {
    pub fn new(rules: Vec<CategoryRule>, default_category: String) -> Self {
        Self { rules, default_category }
    }

    pub fn from_config(filter: &FilterConfig) -> Self {
        Self::new(filter.categories.clone(), filter.default_category.clone())
    }

    /// First rule with a keyword present (whole word, any case) in `text`,
    /// then the feed's category hint, then the default category.
    pub fn categorize(&self, text: &str, hint: Option<&str>) -> String {
        let matched = self.rules.iter().find(|rule| {
            rule.keywords
                .iter()
                .any(|keyword| utils::text::contains_word(text, keyword))
        });

        if let Some(rule) = matched {
            return rule.name.clone();
        }
        match hint.map(str::trim).filter(|h| !h.is_empty()) {
            Some(hint) => title_case(hint),
            None => self.default_category.clone(),
        }
    }

    pub fn categorize_summary(&self, summary: &ArticleSummary) -> String {
        let text = format!("{} {}", summary.reference.title, summary.summary);
        self.categorize(&text, summary.reference.category_hint.as_deref())
    }
}

fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            // Acronyms such as AI or EU stay as written
            if word.chars().all(|c| !c.is_lowercase()) {
                return word.to_string();
            }
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(|c| c.to_lowercase())).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// Relevance of one article to a profile
#[derive(Debug, Clone, PartialEq)]
pub struct RelevanceScore {
    pub score: f64,
    pub matched_interests: Vec<String>,
}

/// Scores articles against a profile's interests.
///
/// The base score is the share of interest terms found (case-insensitive
/// substring) in title plus summary. An empty interest list scores 1.0.
/// The base is multiplied by the profile's weight for the article's
/// category, a preferred source adds a small bonus when something matched,
/// and the result is clamped to [0, 1].
#[derive(Debug, Clone)]
pub struct RelevanceScorer {
    interests: Vec<(String, String)>,
    profile: UserProfile,
    categorizer: Categorizer,
}

impl RelevanceScorer {
    pub fn new(profile: &UserProfile, categorizer: Categorizer) -> Self {
        let interests = profile
            .interests
            .iter()
            .map(|interest| interest.trim())
            .filter(|interest| !interest.is_empty())
            .map(|interest| (interest.to_string(), interest.to_lowercase()))
            .collect();

        Self {
            interests,
            profile: profile.clone(),
            categorizer,
        }
    }

    pub fn score(&self, title: &str, summary: &str, source: &str, category_hint: Option<&str>) -> RelevanceScore {
        let text = format!("{} {}", title, summary);
        let haystack = text.to_lowercase();

        let matched_interests: Vec<String> = self
            .interests
            .iter()
            .filter(|(_, needle)| haystack.contains(needle.as_str()))
            .map(|(original, _)| original.clone())
            .collect();

        let base = if self.interests.is_empty() {
            1.0
        } else {
            matched_interests.len() as f64 / self.interests.len() as f64
        };

        let category = self.categorizer.categorize(&text, category_hint);
        let mut score = base * self.profile.category_weight(&category);
        if !matched_interests.is_empty() && self.profile.prefers_source(source) {
            score += PREFERRED_SOURCE_BONUS;
        }

        RelevanceScore {
            score: score.clamp(0.0, 1.0),
            matched_interests,
        }
    }
}

/// What the filter kept and why the rest went away.
#[derive(Debug, Clone, Default)]
pub struct FilterOutput {
    pub groups: Vec<CategoryGroup>,
    pub below_threshold: usize,
    pub over_source_cap: usize,
    pub over_limit: usize,
}

impl FilterOutput {
    pub fn article_count(&self) -> usize {
        self.groups.iter().map(|group| group.articles.len()).sum()
    }
}

/// Threshold, ordering, caps and category grouping over summaries
pub struct FilterStage {
    min_relevance_score: f64,
    max_items: usize,
    max_per_source: Option<usize>,
    categorizer: Categorizer,
}

impl FilterStage {
    pub fn new(min_relevance_score: f64, max_items: usize, categorizer: Categorizer) -> Self {
        Self {
            min_relevance_score,
            max_items,
            max_per_source: None,
            categorizer,
        }
    }

    pub fn with_max_per_source(mut self, max_per_source: Option<usize>) -> Self {
        self.max_per_source = max_per_source;
        self
    }

    /// The profile's own minimum relevance, when set, replaces the configured threshold.
    pub fn from_config(filter: &FilterConfig, profile: &UserProfile) -> Self {
        let threshold = profile.min_relevance.unwrap_or(filter.relevance_threshold);
        Self::new(threshold, filter.max_articles, Categorizer::from_config(filter))
            .with_max_per_source(filter.max_per_source)
    }

    pub fn process(&self, summaries: Vec<ArticleSummary>) -> FilterOutput {
        debug!(
            "Filtering {} items with min relevance score {}",
            summaries.len(),
            self.min_relevance_score
        );
        let mut output = FilterOutput::default();

        let mut seen_urls = HashSet::new();
        let mut filtered_items: Vec<ArticleSummary> = Vec::with_capacity(summaries.len());
        for summary in summaries {
            if summary.relevance < self.min_relevance_score {
                output.below_threshold += 1;
                continue;
            }
            if !seen_urls.insert(summary.reference.url.clone()) {
                continue;
            }
            filtered_items.push(summary);
        }

        // Stable sort: ties keep fetch order
        filtered_items.sort_by_key(|summary| summary.reference.position);
        filtered_items.sort_by(|a, b| b.relevance.total_cmp(&a.relevance));

        let mut per_source: Vec<(String, usize)> = Vec::new();
        let mut selected = Vec::new();
        for summary in filtered_items {
            if let Some(cap) = self.max_per_source {
                let source = summary.reference.source.clone();
                match per_source.iter_mut().find(|(name, _)| *name == source) {
                    Some((_, count)) if *count >= cap => {
                        output.over_source_cap += 1;
                        continue;
                    }
                    Some((_, count)) => *count += 1,
                    None => per_source.push((source, 1)),
                }
            }
            if selected.len() >= self.max_items {
                output.over_limit += 1;
                continue;
            }
            selected.push(summary);
        }

        for summary in selected {
            let category = self.categorizer.categorize_summary(&summary);
            match output.groups.iter_mut().find(|group| group.name == category) {
                Some(group) => group.articles.push(summary),
                None => output.groups.push(CategoryGroup {
                    name: category,
                    articles: vec![summary],
                }),
            }
        }

        info!(
            "Filter kept {} items in {} categories ({} below threshold, {} over source cap, {} over limit)",
            output.article_count(),
            output.groups.len(),
            output.below_threshold,
            output.over_source_cap,
            output.over_limit
        );
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_category_rules;
    use crate::types::ArticleReference;

    fn summary(position: usize, title: &str, source: &str, relevance: f64) -> ArticleSummary {
        ArticleSummary {
            reference: ArticleReference {
                url: format!("https://example.com/{}", position),
                title: title.to_string(),
                source: source.to_string(),
                published_at: None,
                position,
                feed_summary: None,
                feed_image_url: None,
                category_hint: None,
            },
            image_url: None,
            summary: String::new(),
            key_points: Vec::new(),
            quotes: Vec::new(),
            relevance,
            matched_interests: Vec::new(),
            degraded: false,
        }
    }

    fn categorizer() -> Categorizer {
        Categorizer::new(default_category_rules(), "General".to_string())
    }

    fn urls(output: &FilterOutput) -> Vec<String> {
        output
            .groups
            .iter()
            .flat_map(|group| group.articles.iter().map(|a| a.reference.url.clone()))
            .collect()
    }

    #[test]
    fn test_threshold_drops_low_scores() {
        let stage = FilterStage::new(0.5, 10, categorizer());
        let output = stage.process(vec![summary(0, "a", "s", 0.8), summary(1, "b", "s", 0.3)]);
        assert_eq!(urls(&output), vec!["https://example.com/0"]);
        assert_eq!(output.below_threshold, 1);
    }

    #[test]
    fn test_top_n_with_ties_in_fetch_order() {
        let stage = FilterStage::new(0.0, 3, Categorizer::new(Vec::new(), "General".to_string()));
        let output = stage.process(vec![
            summary(0, "a", "s", 0.5),
            summary(1, "b", "s", 0.9),
            summary(2, "c", "s", 0.5),
            summary(3, "d", "s", 0.1),
            summary(4, "e", "s", 0.5),
        ]);
        assert_eq!(
            urls(&output),
            vec!["https://example.com/1", "https://example.com/0", "https://example.com/2"]
        );
        assert_eq!(output.over_limit, 2);
    }

    #[test]
    fn test_source_cap_preserves_relative_order() {
        let stage = FilterStage::new(0.0, 10, Categorizer::new(Vec::new(), "General".to_string()))
            .with_max_per_source(Some(1));
        let output = stage.process(vec![
            summary(0, "a", "one", 0.9),
            summary(1, "b", "one", 0.8),
            summary(2, "c", "two", 0.7),
        ]);
        assert_eq!(urls(&output), vec!["https://example.com/0", "https://example.com/2"]);
        assert_eq!(output.over_source_cap, 1);
    }

    #[test]
    fn test_groups_follow_first_appearance_and_partition() {
        let stage = FilterStage::new(0.0, 10, categorizer());
        let output = stage.process(vec![
            summary(0, "New AI chip unveiled", "s", 0.9),
            summary(1, "Election results are in", "s", 0.8),
            summary(2, "Software update ships", "s", 0.7),
            summary(3, "A quiet day", "s", 0.6),
        ]);
        let names: Vec<_> = output.groups.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["Technology", "Politics", "General"]);
        assert_eq!(output.groups[0].articles.len(), 2);
        assert_eq!(output.article_count(), 4);
    }

    #[test]
    fn test_category_hint_used_when_no_rule_matches() {
        let categorizer = categorizer();
        assert_eq!(categorizer.categorize("A quiet day", Some("world news")), "World News");
        assert_eq!(categorizer.categorize("A quiet day", None), "General");
        assert_eq!(categorizer.categorize("Said it would rain", None), "General");
    }

    #[test]
    fn test_category_hint_keeps_acronyms() {
        let categorizer = categorizer();
        assert_eq!(categorizer.categorize("A quiet day", Some("AI research")), "AI Research");
        assert_eq!(categorizer.categorize("A quiet day", Some("eu POLICY")), "Eu POLICY");
    }

    #[test]
    fn test_relevance_is_share_of_matched_interests() {
        let profile = UserProfile::new("t", vec!["Rust".to_string(), "space".to_string()]);
        let scorer = RelevanceScorer::new(&profile, categorizer());

        let both = scorer.score("Rust in space", "", "s", None);
        assert_eq!(both.score, 1.0);
        let one = scorer.score("Rust 2.0 released", "Nothing else.", "s", None);
        assert_eq!(one.score, 0.5);
        assert_eq!(one.matched_interests, vec!["Rust"]);
        let none = scorer.score("Cooking", "Recipes.", "s", None);
        assert_eq!(none.score, 0.0);
    }

    #[test]
    fn test_empty_interests_score_one() {
        let profile = UserProfile::new("t", Vec::new());
        let scorer = RelevanceScorer::new(&profile, categorizer());
        assert_eq!(scorer.score("Anything", "", "s", None).score, 1.0);
    }

    #[test]
    fn test_weights_and_preferred_sources() {
        let mut profile = UserProfile::new("t", vec!["chip".to_string(), "budget".to_string()]);
        profile.category_weights.insert("technology".to_string(), 0.5);
        profile.preferred_sources.push("Wire".to_string());
        let scorer = RelevanceScorer::new(&profile, categorizer());

        // Technology article: 0.5 base, halved by weight
        assert_eq!(scorer.score("New AI chip", "", "Other", None).score, 0.25);
        // Preferred source bonus only with a match
        let bonus = scorer.score("Budget talks", "", "wire", None).score;
        assert!((bonus - 0.6).abs() < 1e-9);
        assert_eq!(scorer.score("Cooking", "", "wire", None).score, 0.0);
    }
}
