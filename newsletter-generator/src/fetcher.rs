use crate::types::{FetchConfig, FetchResult, NewsletterError, Result};
use backoff::{backoff::Backoff, exponential::ExponentialBackoff};
use reqwest::{Client, Response, StatusCode};
use robotstxt::DefaultMatcher;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use url::Url;

/// Shared HTTP client for feeds, article pages and images.
///
/// Every request carries the configured timeout and is retried at most
/// `max_retries` times (clamped to one by the configuration layer) on
/// timeouts, connection errors, 408, 429 and 5xx responses.
pub struct Fetcher {
    client: Client,
    config: FetchConfig,
    robots_cache: Arc<RwLock<HashMap<String, RobotsRules>>>,
    rate_limiter: Arc<RwLock<HashMap<String, Instant>>>,
}

impl Fetcher {
    pub fn new(config: FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()?;

        Ok(Self {
            client,
            config,
            robots_cache: Arc::new(RwLock::new(HashMap::new())),
            rate_limiter: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Fetch a feed document as text.
    pub async fn fetch_feed(&self, url: &str) -> Result<FetchResult> {
        let start_time = Instant::now();

        debug!("Fetching feed: {}", url);
        let response = self.get_with_retry(url).await?;
        let status = response.status();
        let content = self.read_text(url, response).await?;

        info!("Fetched feed: {} ({} bytes, HTTP {})", url, content.len(), status);
        Ok(FetchResult {
            url: url.to_string(),
            response_time_ms: start_time.elapsed().as_millis() as u64,
            content,
        })
    }

    /// Fetch an article page as HTML, honouring robots.txt when enabled.
    pub async fn fetch_page(&self, url: &str) -> Result<String> {
        debug!("Fetching full content from: {}", url);

        if self.config.respect_robots_txt {
            self.check_robots_txt(url).await?;
        }

        let response = self.get_with_retry(url).await?;
        self.read_text(url, response).await
    }

    /// Fetch raw bytes (images), refusing bodies larger than `max_bytes`.
    pub async fn fetch_bytes(&self, url: &str, max_bytes: usize) -> Result<Vec<u8>> {
        let response = self.get_with_retry(url).await?;
        let limit_mb = (max_bytes / (1024 * 1024)).max(1);

        if let Some(content_length) = response.content_length() {
            if content_length as usize > max_bytes {
                return Err(NewsletterError::TooLarge { url: url.to_string(), limit_mb });
            }
        }

        let bytes = response.bytes().await.map_err(|e| self.classify(url, e))?;
        if bytes.len() > max_bytes {
            return Err(NewsletterError::TooLarge { url: url.to_string(), limit_mb });
        }
        Ok(bytes.to_vec())
    }

    async fn read_text(&self, url: &str, response: Response) -> Result<String> {
        if let Some(content_length) = response.content_length() {
            let size_mb = content_length as usize / (1024 * 1024);
            if size_mb > self.config.max_body_size_mb {
                return Err(NewsletterError::TooLarge {
                    url: url.to_string(),
                    limit_mb: self.config.max_body_size_mb,
                });
            }
        }
        response.text().await.map_err(|e| self.classify(url, e))
    }

    async fn get_with_retry(&self, url: &str) -> Result<Response> {
        let retry_delay = Duration::from_millis(self.config.retry_delay_ms);
        let mut backoff: ExponentialBackoff<backoff::SystemClock> = ExponentialBackoff {
            current_interval: retry_delay,
            initial_interval: retry_delay,
            max_interval: retry_delay * 8,
            multiplier: 2.0,
            max_elapsed_time: Some(Duration::from_secs(self.config.timeout_seconds * 2)),
            ..Default::default()
        };

        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            self.apply_rate_limit(url).await?;

            let retryable = match self.client.get(url).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }
                    if is_blocking_status(status) {
                        return Err(NewsletterError::Blocked { url: url.to_string(), status: status.as_u16() });
                    }
                    last_error = Some(NewsletterError::HttpStatus { url: url.to_string(), status: status.as_u16() });
                    is_retryable_status(status)
                }
                Err(e) => {
                    let retryable = e.is_timeout() || e.is_connect() || e.is_request();
                    last_error = Some(self.classify(url, e));
                    retryable
                }
            };

            if !retryable || attempt == self.config.max_retries {
                break;
            }
            match backoff.next_backoff() {
                Some(delay) => {
                    warn!("Attempt {} failed for {}, retrying in {:?}", attempt + 1, url, delay);
                    tokio::time::sleep(delay).await;
                }
                None => break,
            }
        }

        let error = last_error.unwrap_or_else(|| NewsletterError::General(format!("Request to {} failed", url)));
        error!("Request failed: {}", error);
        Err(error)
    }

    fn classify(&self, url: &str, error: reqwest::Error) -> NewsletterError {
        if error.is_timeout() {
            NewsletterError::Timeout { url: url.to_string(), seconds: self.config.timeout_seconds }
        } else {
            NewsletterError::Http(error)
        }
    }

    async fn check_robots_txt(&self, url: &str) -> Result<()> {
        let parsed_url = Url::parse(url)?;
        let origin = parsed_url.origin().ascii_serialization();

        // Check cache first
        {
            let cache = self.robots_cache.read().await;
            if let Some(rules) = cache.get(&origin) {
                return rules.check(&self.config.user_agent, url);
            }
        }

        let robots_url = format!("{}/robots.txt", origin);
        let rules = match self.client.get(&robots_url).send().await {
            Ok(response) if response.status().is_success() => match response.text().await {
                Ok(body) => RobotsRules::new(body),
                Err(_) => RobotsRules::default(),
            },
            Ok(response) => {
                debug!("No robots.txt at {} (HTTP {})", origin, response.status());
                RobotsRules::default()
            }
            Err(e) => {
                debug!("Could not fetch robots.txt for {}: {}", origin, e);
                RobotsRules::default()
            }
        };

        let verdict = rules.check(&self.config.user_agent, url);
        self.robots_cache.write().await.insert(origin, rules);
        verdict
    }

    async fn apply_rate_limit(&self, url: &str) -> Result<()> {
        let min_interval = Duration::from_millis(self.config.min_host_interval_ms);
        if min_interval.is_zero() {
            return Ok(());
        }

        let parsed_url = Url::parse(url)?;
        let host = parsed_url.host_str().unwrap_or("").to_string();

        // Reserve the next slot for this host, then wait outside the lock
        let wait_time = {
            let mut rate_limiter = self.rate_limiter.write().await;
            let now = Instant::now();
            let slot = match rate_limiter.get(&host) {
                Some(last_request) => (*last_request + min_interval).max(now),
                None => now,
            };
            rate_limiter.insert(host.clone(), slot);
            slot.saturating_duration_since(now)
        };

        if !wait_time.is_zero() {
            debug!("Rate limiting {}: waiting {:?}", host, wait_time);
            tokio::time::sleep(wait_time).await;
        }
        Ok(())
    }
}

fn is_blocking_status(status: StatusCode) -> bool {
    matches!(status.as_u16(), 401 | 402 | 403 | 451)
}

fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::REQUEST_TIMEOUT || status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// A cached robots.txt body, matched with Google's robots.txt rules
/// (groups, longest match, `*` and `$` patterns).
#[derive(Debug, Clone, Default)]
pub struct RobotsRules {
    body: String,
}

impl RobotsRules {
    pub fn new(body: impl Into<String>) -> Self {
        Self { body: body.into() }
    }

    /// `user_agent` may be a full header value; only its product token is
    /// matched against the `User-agent` lines.
    pub fn is_allowed(&self, user_agent: &str, url: &str) -> bool {
        if self.body.trim().is_empty() {
            return true;
        }
        let mut matcher = DefaultMatcher::default();
        matcher.one_agent_allowed_by_robots(&self.body, product_token(user_agent), url)
    }

    fn check(&self, user_agent: &str, url: &str) -> Result<()> {
        if self.is_allowed(user_agent, url) {
            Ok(())
        } else {
            Err(NewsletterError::RobotsDisallowed { url: url.to_string() })
        }
    }
}

fn product_token(user_agent: &str) -> &str {
    let token = user_agent.split('/').next().unwrap_or(user_agent).trim();
    let end = token
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == '_'))
        .unwrap_or(token.len());
    &token[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROBOTS: &str = "
User-agent: Googlebot
Disallow: /

User-agent: *
Disallow: /private/
Allow: /private/press/
# comment line
Disallow: /drafts
";

    #[test]
    fn test_robots_rules_for_wildcard_group() {
        let rules = RobotsRules::new(ROBOTS);
        let agent = "Auto-Newsletter-Generator/1.0";
        assert!(rules.is_allowed(agent, "https://example.com/news/story"));
        assert!(!rules.is_allowed(agent, "https://example.com/private/notes"));
        assert!(rules.is_allowed(agent, "https://example.com/private/press/release"));
        assert!(!rules.is_allowed(agent, "https://example.com/drafts/1"));
    }

    #[test]
    fn test_robots_rules_for_named_agent() {
        let rules = RobotsRules::new(ROBOTS);
        assert!(!rules.is_allowed("Googlebot/2.1", "https://example.com/anything"));
    }

    #[test]
    fn test_robots_rules_with_patterns() {
        let rules = RobotsRules::new("User-agent: *\nDisallow: /*.pdf$\nDisallow: /*/print\n");
        let agent = "Auto-Newsletter-Generator/1.0";
        assert!(!rules.is_allowed(agent, "https://example.com/files/report.pdf"));
        assert!(rules.is_allowed(agent, "https://example.com/files/report.pdf?download=1"));
        assert!(!rules.is_allowed(agent, "https://example.com/story/print"));
        assert!(rules.is_allowed(agent, "https://example.com/story"));
    }

    #[test]
    fn test_empty_robots_allows_everything() {
        assert!(RobotsRules::new("").is_allowed("x", "https://example.com/"));
        assert!(RobotsRules::default().is_allowed("x", "https://example.com/a/b"));
    }

    #[test]
    fn test_product_token() {
        assert_eq!(product_token("Auto-Newsletter-Generator/1.0"), "Auto-Newsletter-Generator");
        assert_eq!(product_token("Mozilla/5.0 (compatible)"), "Mozilla");
        assert_eq!(product_token("plainbot"), "plainbot");
    }

    #[test]
    fn test_status_classification() {
        assert!(is_blocking_status(StatusCode::FORBIDDEN));
        assert!(is_blocking_status(StatusCode::PAYMENT_REQUIRED));
        assert!(is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable_status(StatusCode::BAD_GATEWAY));
        assert!(!is_retryable_status(StatusCode::NOT_FOUND));
    }
}
