use crate::types::{NewsletterError, ParsedEntry, ParsedFeed, Result};
use crate::utils;
use feed_rs::model::Entry;
use feed_rs::parser;
use scraper::{Html, Selector};
use tracing::{debug, info};

const IMAGE_EXTENSIONS: [&str; 6] = [".jpg", ".jpeg", ".png", ".gif", ".webp", ".avif"];

/// Turns RSS/Atom documents into parsed entries via `feed-rs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct FeedParser;

impl FeedParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse_feed(&self, content: &str) -> Result<ParsedFeed> {
        debug!("Parsing feed content ({} bytes)", content.len());

        let feed = parser::parse(content.as_bytes())
            .map_err(|e| NewsletterError::Parse(format!("Failed to parse feed: {}", e)))?;

        let title = feed.title.map(|t| t.content);
        let entries: Vec<ParsedEntry> = feed
            .entries
            .into_iter()
            .filter_map(|entry| self.parse_entry(entry))
            .collect();

        info!("Parsed feed with {} entries", entries.len());
        Ok(ParsedFeed { title, entries })
    }

    fn parse_entry(&self, entry: Entry) -> Option<ParsedEntry> {
        // Entries without a link cannot be fetched, skip them
        let url = entry
            .links
            .iter()
            .find(|link| link.rel.as_deref().map_or(true, |rel| rel == "alternate"))
            .or_else(|| entry.links.first())
            .map(|link| link.href.trim().to_string())
            .filter(|href| !href.is_empty())?;

        let title = entry
            .title
            .as_ref()
            .map(|t| utils::html::extract_text(&t.content))
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "Untitled".to_string());

        let image_url = extract_image_url(&entry).and_then(|src| utils::url::resolve(&url, &src));

        // Prefer the summary, fall back to the content body
        let summary_html = entry
            .summary
            .as_ref()
            .map(|s| s.content.clone())
            .or_else(|| entry.content.as_ref().and_then(|c| c.body.clone()));
        let summary = summary_html
            .map(|html| utils::html::extract_text(&html))
            .filter(|text| !text.is_empty());

        let published_at = entry.published.or(entry.updated);

        Some(ParsedEntry {
            url,
            title,
            summary,
            published_at,
            image_url,
        })
    }
}

/// Image announced by the feed: media content, thumbnails, image links or
/// enclosures, then the first `<img>` inside the entry HTML.
fn extract_image_url(entry: &Entry) -> Option<String> {
    for media in &entry.media {
        for content in &media.content {
            let Some(url) = &content.url else {
                continue;
            };
            let is_image = content
                .content_type
                .as_ref()
                .map(|mime| mime.to_string().starts_with("image/"))
                .unwrap_or_else(|| looks_like_image(url.as_str()));
            if is_image {
                return Some(url.to_string());
            }
        }
        if let Some(thumbnail) = media.thumbnails.first() {
            return Some(thumbnail.image.uri.clone());
        }
    }

    for link in &entry.links {
        let typed_image = link.media_type.as_deref().map_or(false, |t| t.starts_with("image/"));
        let enclosure = link.rel.as_deref() == Some("enclosure") && looks_like_image(&link.href);
        if typed_image || enclosure {
            return Some(link.href.clone());
        }
    }

    let html = entry
        .content
        .as_ref()
        .and_then(|c| c.body.as_deref())
        .or_else(|| entry.summary.as_ref().map(|s| s.content.as_str()))?;
    first_img_src(html)
}

fn first_img_src(html: &str) -> Option<String> {
    let selector = Selector::parse("img[src]").ok()?;
    let fragment = Html::parse_fragment(html);
    let src = fragment
        .select(&selector)
        .find_map(|img| img.value().attr("src").map(|s| s.to_string()));
    src
}

fn looks_like_image(url: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or(url).to_lowercase();
    IMAGE_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:media="http://search.yahoo.com/mrss/">
  <channel>
    <title>Example Feed</title>
    <link>https://example.com/</link>
    <description>Example</description>
    <item>
      <title>First &amp; foremost</title>
      <link>https://example.com/first</link>
      <description>&lt;p&gt;Summary of the &lt;b&gt;first&lt;/b&gt; post.&lt;/p&gt;</description>
      <pubDate>Mon, 06 Jan 2025 10:00:00 GMT</pubDate>
      <media:content url="https://example.com/first.jpg" type="image/jpeg" />
    </item>
    <item>
      <title>No link here</title>
      <description>Dropped</description>
    </item>
    <item>
      <link>https://example.com/untitled</link>
      <description>&lt;img src="/images/u.png"&gt; Body</description>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn test_parse_feed_entries() {
        let parsed = FeedParser::new().parse_feed(RSS).unwrap();
        assert_eq!(parsed.title.as_deref(), Some("Example Feed"));
        assert_eq!(parsed.entries.len(), 2);

        let first = &parsed.entries[0];
        assert_eq!(first.url, "https://example.com/first");
        assert_eq!(first.title, "First & foremost");
        assert_eq!(first.summary.as_deref(), Some("Summary of the first post."));
        assert!(first.published_at.is_some());
        assert_eq!(first.image_url.as_deref(), Some("https://example.com/first.jpg"));

        let second = &parsed.entries[1];
        assert_eq!(second.title, "Untitled");
        assert_eq!(second.image_url.as_deref(), Some("https://example.com/images/u.png"));
    }

    #[test]
    fn test_invalid_feed_is_parse_error() {
        let err = FeedParser::new().parse_feed("this is not xml").unwrap_err();
        assert!(matches!(err, NewsletterError::Parse(_)));
    }

    #[test]
    fn test_looks_like_image() {
        assert!(looks_like_image("https://cdn.example.com/a.JPG?w=200"));
        assert!(!looks_like_image("https://example.com/audio.mp3"));
    }
}
