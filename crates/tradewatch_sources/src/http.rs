//! Shared HTTP fetcher with rate limiting and retry/backoff.
//!
//! One fetcher per adapter, at most one in-flight request at a time.
//! Between requests the fetcher sleeps out the configured delay; a
//! failing request retries with `2^attempt` backoff, except 404 (terminal)
//! and 429/502/503, which double the current pacing delay and retry.

use crate::error::{Result, SourceError};
use reqwest::cookie::Jar;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use tradewatch_protocol::SourceConfig;

/// Pacing state shared across requests on one fetcher.
struct Pacing {
    last_request: Option<Instant>,
    /// Current inter-request delay; doubled on 429/502/503.
    current_delay: Duration,
}

pub struct HttpFetcher {
    client: Client,
    jar: Arc<Jar>,
    max_retries: u32,
    pacing: Mutex<Pacing>,
}

impl HttpFetcher {
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let jar = Arc::new(Jar::default());

        let mut headers = reqwest::header::HeaderMap::new();
        for (name, value) in &config.headers {
            let name = reqwest::header::HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| SourceError::Parse(format!("bad header name {name}: {e}")))?;
            let value = reqwest::header::HeaderValue::from_str(value)
                .map_err(|e| SourceError::Parse(format!("bad header value: {e}")))?;
            headers.insert(name, value);
        }

        let client = Client::builder()
            .cookie_provider(Arc::clone(&jar))
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| SourceError::Transient(format!("client build failed: {e}")))?;

        Ok(Self {
            client,
            jar,
            max_retries: config.max_retries.max(1),
            pacing: Mutex::new(Pacing {
                last_request: None,
                current_delay: Duration::from_secs_f64(config.request_delay.max(0.0)),
            }),
        })
    }

    /// Read a cookie value for a URL from this fetcher's jar.
    pub fn cookie(&self, url: &str, name: &str) -> Option<String> {
        use reqwest::cookie::CookieStore;

        let parsed = url.parse().ok()?;
        let header = self.jar.cookies(&parsed)?;
        let cookies = header.to_str().ok()?.to_string();
        for pair in cookies.split(';') {
            let pair = pair.trim();
            if let Some((key, value)) = pair.split_once('=') {
                if key == name {
                    return Some(value.to_string());
                }
            }
        }
        None
    }

    /// Send a request with pacing and retry. The closure rebuilds the
    /// request for each attempt.
    pub async fn send<F>(&self, build: F) -> Result<Response>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let mut last_error = String::new();

        for attempt in 0..self.max_retries {
            self.pace().await;

            let response = match build(&self.client).send().await {
                Ok(response) => response,
                Err(e) => {
                    last_error = e.to_string();
                    warn!(attempt, error = %last_error, "Request failed");
                    tokio::time::sleep(Duration::from_secs(1u64 << attempt)).await;
                    continue;
                }
            };

            let status = response.status();

            if status == StatusCode::NOT_FOUND {
                return Err(SourceError::NotFound(response.url().to_string()));
            }

            if matches!(
                status,
                StatusCode::TOO_MANY_REQUESTS
                    | StatusCode::BAD_GATEWAY
                    | StatusCode::SERVICE_UNAVAILABLE
            ) {
                let doubled = {
                    let mut pacing = self.pacing.lock().await;
                    pacing.current_delay = pacing.current_delay.max(Duration::from_millis(250)) * 2;
                    pacing.current_delay
                };
                last_error = format!("HTTP {status}");
                warn!(attempt, %status, delay_ms = doubled.as_millis() as u64, "Rate limited, backing off");
                tokio::time::sleep(doubled).await;
                continue;
            }

            if status.is_success() || status.is_redirection() || status == StatusCode::FORBIDDEN {
                // 403 and redirects are returned to the adapter: the
                // Senate source inspects them for WAF blocks.
                return Ok(response);
            }

            last_error = format!("HTTP {status}");
            warn!(attempt, %status, "Unexpected status");
            tokio::time::sleep(Duration::from_secs(1u64 << attempt)).await;
        }

        Err(SourceError::RetriesExhausted {
            attempts: self.max_retries,
            last_error,
        })
    }

    /// GET a page as text.
    pub async fn get_text(&self, url: &str) -> Result<String> {
        let response = self.send(|client| client.get(url)).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Transient(format!("HTTP {status} for {url}")));
        }
        response
            .text()
            .await
            .map_err(|e| SourceError::Transient(format!("body read failed: {e}")))
    }

    /// GET a resource as raw bytes.
    pub async fn get_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.send(|client| client.get(url)).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Transient(format!("HTTP {status} for {url}")));
        }
        Ok(response
            .bytes()
            .await
            .map_err(|e| SourceError::Transient(format!("body read failed: {e}")))?
            .to_vec())
    }

    /// GET a JSON document.
    pub async fn get_json(&self, url: &str) -> Result<serde_json::Value> {
        let text = self.get_text(url).await?;
        serde_json::from_str(&text)
            .map_err(|e| SourceError::Parse(format!("invalid JSON from {url}: {e}")))
    }

    /// Sleep out the remaining inter-request delay.
    async fn pace(&self) {
        let wait = {
            let mut pacing = self.pacing.lock().await;
            let wait = match pacing.last_request {
                Some(last) => pacing.current_delay.saturating_sub(last.elapsed()),
                None => Duration::ZERO,
            };
            pacing.last_request = Some(Instant::now() + wait);
            wait
        };

        if !wait.is_zero() {
            debug!(wait_ms = wait.as_millis() as u64, "Pacing request");
            tokio::time::sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(base_url: &str) -> SourceConfig {
        SourceConfig::new("Test", "test", base_url)
            .with_request_delay(0.0)
            .with_max_retries(3)
            .with_timeout(5)
    }

    #[tokio::test]
    async fn test_get_text_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(ResponseTemplate::new(200).set_body_string("hello"))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(&test_config(&server.uri())).unwrap();
        let body = fetcher.get_text(&format!("{}/page", server.uri())).await.unwrap();
        assert_eq!(body, "hello");
    }

    #[tokio::test]
    async fn test_404_is_terminal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(&test_config(&server.uri())).unwrap();
        let err = fetcher.get_text(&format!("{}/missing", server.uri())).await.unwrap_err();
        assert!(matches!(err, SourceError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_429_retries_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(&test_config(&server.uri())).unwrap();
        let body = fetcher.get_text(&format!("{}/flaky", server.uri())).await.unwrap();
        assert_eq!(body, "ok");
    }

    #[tokio::test]
    async fn test_persistent_failure_exhausts_retries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/down"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(&test_config(&server.uri())).unwrap();
        let err = fetcher.get_text(&format!("{}/down", server.uri())).await.unwrap_err();
        assert!(matches!(err, SourceError::RetriesExhausted { attempts: 3, .. }));
    }
}
