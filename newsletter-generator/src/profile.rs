use crate::generator::write_atomic;
use crate::types::{NewsletterError, Result, UserProfile};
use crate::utils::text::contains_word;
use chrono::Utc;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// File-backed store of named profiles, one pretty-printed JSON file each.
#[derive(Debug, Clone)]
pub struct ProfileStore {
    dir: PathBuf,
}

impl ProfileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File stem for a profile name: lowercase, whitespace to `_`, other
    /// non-word characters removed.
    pub fn slug(name: &str) -> String {
        name.trim()
            .to_lowercase()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join("_")
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == '_')
            .collect()
    }

    fn path_for(&self, name: &str) -> Result<PathBuf> {
        let slug = Self::slug(name);
        if slug.is_empty() {
            return Err(NewsletterError::InvalidProfileName { name: name.to_string() });
        }
        Ok(self.dir.join(format!("{}.json", slug)))
    }

    pub fn load(&self, name: &str) -> Result<UserProfile> {
        let path = self.path_for(name)?;
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(NewsletterError::ProfileNotFound { name: name.to_string() });
            }
            Err(e) => return Err(e.into()),
        };

        let profile: UserProfile = serde_json::from_str(&contents)?;
        debug!("Loaded profile {} from {}", profile.name, path.display());
        Ok(profile)
    }

    /// Overwrite the stored profile with `profile`, refreshing `updated_at`.
    pub fn save(&self, profile: &mut UserProfile) -> Result<PathBuf> {
        let path = self.path_for(&profile.name)?;
        profile.updated_at = Utc::now();

        let json = serde_json::to_string_pretty(profile)?;
        write_atomic(&path, json.as_bytes())?;

        info!("Saved user profile to {}", path.display());
        Ok(path)
    }

    /// Names of every readable profile, sorted.
    pub fn list(&self) -> Result<Vec<String>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let parsed = fs::read_to_string(&path)
                .map_err(NewsletterError::from)
                .and_then(|contents| serde_json::from_str::<UserProfile>(&contents).map_err(NewsletterError::from));
            match parsed {
                Ok(profile) => names.push(profile.name),
                Err(e) => warn!("Skipping unreadable profile {}: {}", path.display(), e),
            }
        }

        names.sort();
        Ok(names)
    }

    /// Returns whether a profile was removed.
    pub fn delete(&self, name: &str) -> Result<bool> {
        let path = self.path_for(name)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                info!("Deleted user profile {}", path.display());
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// A well-known feed for one detected category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedSuggestion {
    pub name: String,
    pub url: String,
    pub category: String,
}

/// Normalized interests plus what they say about the reader.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InterestAnalysis {
    pub interests: Vec<String>,
    pub detected_categories: Vec<String>,
    pub suggested_feeds: Vec<FeedSuggestion>,
}

const MAX_SUGGESTED_FEEDS: usize = 5;

const INTEREST_EXPANSIONS: &[(&str, &str)] = &[
    ("ai", "artificial intelligence"),
    ("ml", "machine learning"),
    ("tech", "technology"),
    ("programming", "software development"),
    ("coding", "software development"),
    ("software", "software development"),
    ("blockchain", "blockchain technology"),
    ("crypto", "cryptocurrency"),
    ("bitcoin", "cryptocurrency"),
    ("web dev", "web development"),
    ("mobile apps", "mobile development"),
    ("cloud", "cloud computing"),
    ("big data", "data analytics"),
    ("space", "space exploration"),
    ("nasa", "space exploration"),
    ("climate", "climate change"),
    ("environment", "environmental science"),
    ("medicine", "medical research"),
    ("health", "healthcare"),
    ("biotech", "biotechnology"),
    ("physics", "physics research"),
    ("chemistry", "chemistry research"),
    ("startup", "startups"),
    ("business", "business news"),
    ("finance", "financial news"),
    ("economy", "economic news"),
    ("market", "stock market"),
    ("investment", "investment news"),
    ("sports", "sports news"),
    ("entertainment", "entertainment news"),
    ("politics", "political news"),
    ("world news", "international news"),
];

const CATEGORY_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "technology",
        &[
            "artificial intelligence", "machine learning", "technology", "software development",
            "blockchain technology", "cryptocurrency", "web development", "mobile development",
            "cloud computing", "cybersecurity", "data science", "data analytics", "programming",
            "python", "javascript", "java", "rust", "react", "nodejs",
        ],
    ),
    (
        "science",
        &[
            "space exploration", "climate change", "environmental science", "medical research",
            "healthcare", "biotechnology", "physics research", "chemistry research", "biology",
            "astronomy", "genetics", "neuroscience",
        ],
    ),
    (
        "business",
        &[
            "startups", "business news", "financial news", "economic news", "stock market",
            "investment news", "entrepreneurship", "venture capital", "fintech",
        ],
    ),
    ("sports", &["sports news", "football", "basketball", "soccer", "tennis", "olympics"]),
    ("entertainment", &["entertainment news", "movies", "music", "gaming", "streaming"]),
    ("politics", &["political news", "government", "policy", "elections"]),
    ("world", &["international news", "global affairs", "current events"]),
];

const FEED_SUGGESTIONS: &[(&str, &str, &str)] = &[
    ("technology", "TechCrunch", "https://techcrunch.com/feed/"),
    ("technology", "Ars Technica", "http://feeds.arstechnica.com/arstechnica/index"),
    ("technology", "Hacker News", "https://hnrss.org/frontpage"),
    ("science", "Science Daily", "https://www.sciencedaily.com/rss/all.xml"),
    ("science", "Nature News", "https://www.nature.com/nature.rss"),
    ("science", "Scientific American", "http://rss.sciam.com/ScientificAmerican-News"),
    ("business", "Reuters Business", "https://feeds.reuters.com/reuters/businessNews"),
    ("business", "Bloomberg", "https://feeds.bloomberg.com/markets/news.rss"),
    ("world", "BBC World", "http://feeds.bbci.co.uk/news/world/rss.xml"),
    ("world", "Reuters World", "https://feeds.reuters.com/Reuters/worldNews"),
];

/// Turn free-form interest text into a normalized interest list, detect
/// the categories it covers and suggest feeds for them.
pub fn analyze_interests(text: &str) -> Result<InterestAnalysis> {
    let separators = Regex::new(r"(?i)[,;|&+\n]|\band\b|\bor\b")
        .map_err(|e| NewsletterError::General(e.to_string()))?;
    let punctuation = Regex::new(r"[^\w\s]").map_err(|e| NewsletterError::General(e.to_string()))?;

    let lowered = text.trim().to_lowercase();
    let mut interests: Vec<String> = Vec::new();

    for raw in separators.split(&lowered) {
        let stripped = punctuation.replace_all(raw, "");
        let cleaned = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
        if cleaned.chars().count() <= 1 {
            continue;
        }

        let expanded = INTEREST_EXPANSIONS
            .iter()
            .find(|(short, _)| *short == cleaned)
            .map(|(_, long)| long.to_string())
            .unwrap_or_else(|| cleaned.clone());
        push_unique(&mut interests, expanded);

        if contains_word(&cleaned, "ai") || cleaned.contains("artificial intelligence") {
            push_unique(&mut interests, "machine learning".to_string());
        } else if contains_word(&cleaned, "ml") || cleaned.contains("machine learning") {
            push_unique(&mut interests, "artificial intelligence".to_string());
        }
    }

    let detected_categories: Vec<String> = CATEGORY_KEYWORDS
        .iter()
        .filter(|(_, keywords)| {
            interests
                .iter()
                .any(|interest| keywords.iter().any(|keyword| interest.contains(keyword) || interest == keyword))
        })
        .map(|(category, _)| category.to_string())
        .collect();

    let suggested_feeds = FEED_SUGGESTIONS
        .iter()
        .filter(|(category, _, _)| detected_categories.iter().any(|detected| detected == category))
        .take(MAX_SUGGESTED_FEEDS)
        .map(|(category, name, url)| FeedSuggestion {
            name: name.to_string(),
            url: url.to_string(),
            category: category.to_string(),
        })
        .collect();

    debug!("Analyzed interests: {:?} -> {:?}", interests, detected_categories);
    Ok(InterestAnalysis {
        interests,
        detected_categories,
        suggested_feeds,
    })
}

fn push_unique(interests: &mut Vec<String>, interest: String) {
    if !interests.contains(&interest) {
        interests.push(interest);
    }
}
