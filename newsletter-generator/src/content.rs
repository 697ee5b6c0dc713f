use crate::types::{ArticleContent, ArticleReference};
use crate::utils;
use crate::Fetcher;
use chrono::{DateTime, Utc};
use scraper::{ElementRef, Html, Selector};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Containers tried in order before falling back to every paragraph.
const CONTENT_SELECTORS: [&str; 7] = [
    "article",
    "[itemprop=articleBody]",
    "main",
    ".post-content",
    ".entry-content",
    ".article-body",
    "#content",
];

/// A container needs at least this much paragraph text to be trusted.
const MIN_CONTAINER_CHARS: usize = 80;

const MIN_QUOTE_CHARS: usize = 20;
const MAX_QUOTE_CHARS: usize = 300;
const MAX_QUOTES: usize = 3;

/// Outcome of fetching and extracting one article. Never an error: an
/// unavailable article is dropped by the caller with the given reason.
#[derive(Debug, Clone)]
pub enum ContentOutcome {
    Extracted(ArticleContent),
    Unavailable { reference: ArticleReference, reason: String },
}

/// Fields pulled out of one article page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedPage {
    pub body: String,
    pub image_url: Option<String>,
    pub authors: Vec<String>,
    pub published_at: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct ContentParser {
    fetcher: Arc<Fetcher>,
}

impl ContentParser {
    pub fn new(fetcher: Arc<Fetcher>) -> Self {
        Self { fetcher }
    }

    pub async fn parse(&self, reference: ArticleReference) -> ContentOutcome {
        debug!("Parsing article: {} ({})", reference.title, reference.url);

        match self.fetcher.fetch_page(&reference.url).await {
            Ok(html) => build_content(reference, &html),
            Err(e) => {
                warn!("Article unavailable {}: {}", reference.url, e);
                ContentOutcome::Unavailable {
                    reference,
                    reason: e.to_string(),
                }
            }
        }
    }
}

/// Combine an extracted page with what the feed already told us.
pub fn build_content(mut reference: ArticleReference, html: &str) -> ContentOutcome {
    let page = extract_page(html, &reference.url);

    let mut body = page.body;
    if body.is_empty() {
        if let Some(summary) = reference.feed_summary.as_deref().filter(|s| !s.trim().is_empty()) {
            warn!("No content extracted, using feed summary for {}", reference.url);
            body = summary.trim().to_string();
        }
    }
    if body.is_empty() {
        warn!("No content available for {}, skipping", reference.url);
        return ContentOutcome::Unavailable {
            reference,
            reason: "no extractable content".to_string(),
        };
    }

    if reference.published_at.is_none() {
        reference.published_at = page.published_at;
    }

    // The feed's image wins over the page's
    let image_url = reference.feed_image_url.clone().or(page.image_url);
    let quotes = extract_quotes(&body);

    info!("Extracted {} chars from {}", body.len(), reference.url);
    ContentOutcome::Extracted(ArticleContent {
        reference,
        body,
        image_url,
        quotes,
        authors: page.authors,
    })
}

pub fn extract_page(html: &str, page_url: &str) -> ExtractedPage {
    let document = Html::parse_document(html);

    let container = CONTENT_SELECTORS.iter().find_map(|selector_str| {
        let selector = Selector::parse(selector_str).ok()?;
        let element = document.select(&selector).next()?;
        let text = paragraph_text(element);
        if text.chars().count() >= MIN_CONTAINER_CHARS {
            debug!("Found content using selector '{}'", selector_str);
            Some((element, text))
        } else {
            None
        }
    });

    let (container_element, body) = match container {
        Some((element, text)) => (Some(element), text),
        None => (None, paragraph_text(document.root_element())),
    };

    let image_url = meta_content(&document, "meta[property='og:image']")
        .or_else(|| meta_content(&document, "meta[name='twitter:image']"))
        .or_else(|| container_element.and_then(first_image_src))
        .and_then(|src| utils::url::resolve(page_url, &src));

    let authors = select_all(&document, "meta[name='author']")
        .into_iter()
        .filter_map(|element| element.value().attr("content"))
        .map(|author| author.trim().to_string())
        .filter(|author| !author.is_empty())
        .collect();

    let published_at = meta_content(&document, "meta[property='article:published_time']")
        .and_then(|value| DateTime::parse_from_rfc3339(value.trim()).ok())
        .map(|dt| dt.with_timezone(&Utc));

    ExtractedPage {
        body,
        image_url,
        authors,
        published_at,
    }
}

/// Text of every `<p>` under `element`, one paragraph per block.
fn paragraph_text(element: ElementRef<'_>) -> String {
    let Ok(selector) = Selector::parse("p") else {
        return String::new();
    };
    element
        .select(&selector)
        .map(|p| utils::text::normalize_whitespace(&p.text().collect::<Vec<_>>().join(" ")))
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn select_all<'a>(document: &'a Html, selector_str: &str) -> Vec<ElementRef<'a>> {
    match Selector::parse(selector_str) {
        Ok(selector) => document.select(&selector).collect(),
        Err(_) => Vec::new(),
    }
}

fn meta_content(document: &Html, selector_str: &str) -> Option<String> {
    select_all(document, selector_str)
        .into_iter()
        .find_map(|element| element.value().attr("content"))
        .map(|content| content.trim().to_string())
        .filter(|content| !content.is_empty())
}

fn first_image_src(element: ElementRef<'_>) -> Option<String> {
    let selector = Selector::parse("img[src]").ok()?;
    let src = element
        .select(&selector)
        .find_map(|img| img.value().attr("src"))
        .map(|src| src.to_string());
    src
}

/// Spans between double quotes (straight or curly), 20 to 300 characters,
/// de-duplicated, first three in text order.
pub fn extract_quotes(text: &str) -> Vec<String> {
    let mut quotes: Vec<String> = Vec::new();
    let mut current: Option<String> = None;

    for c in text.chars() {
        let opens = matches!(c, '"' | '\u{201c}');
        let closes = matches!(c, '"' | '\u{201d}');
        match current.take() {
            Some(quote) if closes => {
                let candidate = quote.trim().to_string();
                let length = candidate.chars().count();
                if length > MIN_QUOTE_CHARS && length < MAX_QUOTE_CHARS && !quotes.contains(&candidate) {
                    quotes.push(candidate);
                }
            }
            Some(mut quote) => {
                quote.push(c);
                current = Some(quote);
            }
            None if opens => current = Some(String::new()),
            None => {}
        }
        if quotes.len() == MAX_QUOTES {
            break;
        }
    }

    quotes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference(url: &str) -> ArticleReference {
        ArticleReference {
            url: url.to_string(),
            title: "Title".to_string(),
            source: "Example".to_string(),
            published_at: None,
            position: 0,
            feed_summary: None,
            feed_image_url: None,
            category_hint: None,
        }
    }

    const PAGE: &str = r#"<html><head>
        <meta property="og:image" content="/img/lead.jpg">
        <meta name="author" content="Ada Lovelace">
        <meta property="article:published_time" content="2025-01-06T10:00:00Z">
        </head><body>
        <nav><p>Home</p></nav>
        <article>
          <p>The first paragraph of the story explains what happened in some detail.</p>
          <p>The second paragraph adds "a quotation that is long enough to keep" for readers.</p>
        </article>
        <footer><p>Copyright</p></footer>
        </body></html>"#;

    #[test]
    fn test_extract_page_prefers_article_container() {
        let page = extract_page(PAGE, "https://example.com/news/story");
        assert!(page.body.starts_with("The first paragraph"));
        assert!(!page.body.contains("Home"));
        assert!(!page.body.contains("Copyright"));
        assert_eq!(page.image_url.as_deref(), Some("https://example.com/img/lead.jpg"));
        assert_eq!(page.authors, vec!["Ada Lovelace"]);
        assert!(page.published_at.is_some());
    }

    #[test]
    fn test_extract_page_falls_back_to_all_paragraphs() {
        let html = "<html><body><div><p>Only loose paragraph.</p></div><p>Another one.</p></body></html>";
        let page = extract_page(html, "https://example.com/");
        assert_eq!(page.body, "Only loose paragraph.\n\nAnother one.");
    }

    #[test]
    fn test_build_content_uses_feed_summary_when_page_is_empty() {
        let mut reference = reference("https://example.com/empty");
        reference.feed_summary = Some("Summary from the feed.".to_string());
        match build_content(reference, "<html><body></body></html>") {
            ContentOutcome::Extracted(content) => assert_eq!(content.body, "Summary from the feed."),
            other => panic!("expected extracted content, got {:?}", other),
        }
    }

    #[test]
    fn test_build_content_without_any_text_is_unavailable() {
        let outcome = build_content(reference("https://example.com/empty"), "<html></html>");
        assert!(matches!(outcome, ContentOutcome::Unavailable { .. }));
    }

    #[test]
    fn test_feed_image_wins_over_page_image() {
        let mut reference = reference("https://example.com/news/story");
        reference.feed_image_url = Some("https://cdn.example.com/feed.jpg".to_string());
        match build_content(reference, PAGE) {
            ContentOutcome::Extracted(content) => {
                assert_eq!(content.image_url.as_deref(), Some("https://cdn.example.com/feed.jpg"));
                assert_eq!(content.quotes, vec!["a quotation that is long enough to keep"]);
                assert!(content.reference.published_at.is_some());
            }
            other => panic!("expected extracted content, got {:?}", other),
        }
    }

    #[test]
    fn test_extract_quotes_bounds_and_dedup() {
        let text = r#"He said "short". Then "this quote is certainly long enough" and again
            "this quote is certainly long enough". Curly “another sufficiently long quotation” too.
            "third long enough quotation here" and "fourth long enough quotation here"."#;
        let quotes = extract_quotes(text);
        assert_eq!(
            quotes,
            vec![
                "this quote is certainly long enough",
                "another sufficiently long quotation",
                "third long enough quotation here",
            ]
        );
    }
}
