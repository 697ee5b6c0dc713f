/// Text processing utilities
pub mod text {
    /// Truncate text to at most `max_chars` characters, trying to break at
    /// sentence boundaries, then at word boundaries.
    pub fn smart_truncate(text: &str, max_chars: usize) -> String {
        if text.chars().count() <= max_chars {
            return text.to_string();
        }

        let truncated: String = text.chars().take(max_chars).collect();
        if let Some(last_sentence) = truncated.rfind(". ").or_else(|| truncated.rfind('.')) {
            if last_sentence > 0 {
                return truncated[..last_sentence + 1].to_string();
            }
        }
        if let Some(last_space) = truncated.rfind(' ') {
            format!("{}...", truncated[..last_space].trim_end())
        } else {
            format!("{}...", truncated)
        }
    }

    /// Cut text to `max_chars` characters and mark the cut with "...".
    pub fn truncate_chars(text: &str, max_chars: usize) -> String {
        match text.char_indices().nth(max_chars) {
            Some((byte_index, _)) => format!("{}...", &text[..byte_index]),
            None => text.to_string(),
        }
    }

    /// Split text into sentences ending with `.`, `!` or `?` followed by
    /// whitespace or end of text. Trailing text without terminator counts
    /// as a sentence.
    pub fn split_sentences(text: &str) -> Vec<String> {
        let normalized = normalize_whitespace(text);
        let mut sentences = Vec::new();
        let mut current = String::new();
        let mut chars = normalized.chars().peekable();

        while let Some(c) = chars.next() {
            current.push(c);
            if matches!(c, '.' | '!' | '?') {
                // Keep closing quotes and brackets with their sentence
                while let Some(&next) = chars.peek() {
                    if matches!(next, '"' | '\'' | ')' | '\u{201d}' | '\u{2019}') {
                        current.push(next);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if chars.peek().map_or(true, |next| next.is_whitespace()) {
                    let sentence = current.trim();
                    if !sentence.is_empty() {
                        sentences.push(sentence.to_string());
                    }
                    current.clear();
                }
            }
        }

        let rest = current.trim();
        if !rest.is_empty() {
            sentences.push(rest.to_string());
        }
        sentences
    }

    /// Collapse runs of whitespace into single spaces.
    pub fn normalize_whitespace(text: &str) -> String {
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Case-insensitive whole-word (or whole-phrase) match.
    pub fn contains_word(haystack: &str, needle: &str) -> bool {
        let haystack = haystack.to_lowercase();
        let needle = needle.trim().to_lowercase();
        if needle.is_empty() {
            return false;
        }

        let is_word_char = |c: char| c.is_alphanumeric();
        let mut start = 0;
        while let Some(found) = haystack[start..].find(&needle) {
            let begin = start + found;
            let end = begin + needle.len();
            let before_ok = haystack[..begin].chars().next_back().map_or(true, |c| !is_word_char(c));
            let after_ok = haystack[end..].chars().next().map_or(true, |c| !is_word_char(c));
            if before_ok && after_ok {
                return true;
            }
            start = begin + haystack[begin..].chars().next().map_or(1, |c| c.len_utf8());
        }
        false
    }
}

/// URL utilities
pub mod url {
    use url::Url;

    /// Extract domain from URL
    pub fn extract_domain(url_str: &str) -> Option<String> {
        Url::parse(url_str)
            .ok()
            .and_then(|url| url.host_str().map(|host| host.trim_start_matches("www.").to_string()))
    }

    /// Feed URLs must be absolute http(s) URLs.
    pub fn is_valid_feed_url(url_str: &str) -> bool {
        if let Ok(url) = Url::parse(url_str) {
            url.scheme() == "http" || url.scheme() == "https"
        } else {
            false
        }
    }

    /// Canonical form used as the article key: no fragment, no `utm_*`
    /// tracking parameters. Unparseable input is returned trimmed.
    pub fn canonicalize(url_str: &str) -> String {
        let trimmed = url_str.trim();
        let Ok(mut url) = Url::parse(trimmed) else {
            return trimmed.to_string();
        };
        url.set_fragment(None);

        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(key, _)| !key.starts_with("utm_"))
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();
        if kept.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(kept);
        }
        url.to_string()
    }

    /// Resolve a possibly relative link against the page it appeared on.
    pub fn resolve(base: &str, href: &str) -> Option<String> {
        let href = href.trim();
        if href.is_empty() || href.starts_with("data:") {
            return None;
        }
        let base = Url::parse(base).ok()?;
        base.join(href).ok().map(|url| url.to_string())
    }
}

/// HTML helpers shared by the feed and page parsers
pub mod html {
    use scraper::Html;

    /// Extract clean text content from an HTML fragment
    pub fn extract_text(html: &str) -> String {
        let fragment = Html::parse_fragment(html);
        let text: Vec<&str> = fragment.root_element().text().collect();
        super::text::normalize_whitespace(&text.join(" "))
    }
}
