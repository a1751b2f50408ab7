// Direct HTTP fetching with per-request user-agent rotation and bounded
// retries. The cascade sees either a response (any status) or a transport
// failure after retries are exhausted; classification happens downstream.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use newsloom_common::Config;
use rand::Rng;
use tracing::{debug, warn};

/// The slice of an HTTP exchange the cascade needs for classification.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    /// URL after redirects; paywalls often land on /login or /subscribe.
    pub final_url: String,
    /// Lowercased header names.
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.headers
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.header(name).is_some()
    }
}

#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// A response arrived. Retryable statuses (429, 5xx) only surface here
    /// once the retry budget is spent.
    Response(HttpResponse),
    /// No response after retries: connect error, reset, DNS failure, timeout.
    Transport { message: String, timed_out: bool },
}

/// Seam for the HTTP stage so tests can inject deterministic exchanges.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> FetchOutcome;
}

pub struct HttpFetcher {
    client: reqwest::Client,
    user_agents: Vec<String>,
    cursor: AtomicUsize,
    max_attempts: u32,
}

impl HttpFetcher {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_seconds))
            .redirect(reqwest::redirect::Policy::limited(10))
            .cookie_store(true)
            .build()?;

        Ok(Self {
            client,
            user_agents: config.user_agents.clone(),
            cursor: AtomicUsize::new(0),
            max_attempts: config.max_attempts.max(1),
        })
    }

    /// Rotated per request, not per session.
    fn next_user_agent(&self) -> &str {
        let i = self.cursor.fetch_add(1, Ordering::Relaxed);
        &self.user_agents[i % self.user_agents.len()]
    }
}

fn retryable_status(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}

/// Exponential backoff with jitter: 2^attempt + uniform(0, 1) seconds.
async fn backoff(attempt: u32) {
    let secs = 2f64.powi(attempt as i32) + rand::rng().random_range(0.0..1.0);
    tokio::time::sleep(Duration::from_secs_f64(secs)).await;
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> FetchOutcome {
        let mut last_transport: Option<(String, bool)> = None;

        for attempt in 0..self.max_attempts {
            let result = self
                .client
                .get(url)
                .header(reqwest::header::USER_AGENT, self.next_user_agent())
                .send()
                .await;

            match result {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if retryable_status(status) && attempt + 1 < self.max_attempts {
                        warn!(url, status, attempt = attempt + 1, "Retryable status, backing off");
                        backoff(attempt).await;
                        continue;
                    }

                    let final_url = resp.url().to_string();
                    let headers = resp
                        .headers()
                        .iter()
                        .map(|(k, v)| {
                            (
                                k.as_str().to_ascii_lowercase(),
                                v.to_str().unwrap_or_default().to_string(),
                            )
                        })
                        .collect();

                    // text() applies charset inference from the response headers.
                    match resp.text().await {
                        Ok(body) => {
                            debug!(url, status, bytes = body.len(), "Fetched");
                            return FetchOutcome::Response(HttpResponse {
                                status,
                                final_url,
                                headers,
                                body,
                            });
                        }
                        Err(e) if attempt + 1 < self.max_attempts => {
                            warn!(url, attempt = attempt + 1, error = %e, "Body read failed, retrying");
                            last_transport = Some((e.to_string(), e.is_timeout()));
                            backoff(attempt).await;
                            continue;
                        }
                        Err(e) => {
                            return FetchOutcome::Transport {
                                message: e.to_string(),
                                timed_out: e.is_timeout(),
                            }
                        }
                    }
                }
                Err(e) if attempt + 1 < self.max_attempts => {
                    warn!(url, attempt = attempt + 1, error = %e, "Request failed, retrying");
                    last_transport = Some((e.to_string(), e.is_timeout()));
                    backoff(attempt).await;
                }
                Err(e) => {
                    return FetchOutcome::Transport {
                        message: e.to_string(),
                        timed_out: e.is_timeout(),
                    }
                }
            }
        }

        let (message, timed_out) =
            last_transport.unwrap_or_else(|| ("retries exhausted".to_string(), false));
        FetchOutcome::Transport { message, timed_out }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_statuses() {
        assert!(retryable_status(429));
        assert!(retryable_status(500));
        assert!(retryable_status(503));
        assert!(!retryable_status(403));
        assert!(!retryable_status(404));
        assert!(!retryable_status(200));
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let resp = HttpResponse {
            status: 403,
            final_url: "https://example.com".to_string(),
            headers: vec![("cf-ray".to_string(), "abc123".to_string())],
            body: String::new(),
        };
        assert!(resp.has_header("CF-Ray"));
        assert_eq!(resp.header("cf-ray"), Some("abc123"));
        assert!(!resp.has_header("x-missing"));
    }

    #[test]
    fn user_agent_rotation_cycles_the_pool() {
        let config = Config::default();
        let fetcher = HttpFetcher::new(&config).unwrap();
        let n = config.user_agents.len();
        let first = fetcher.next_user_agent().to_string();
        for _ in 1..n {
            fetcher.next_user_agent();
        }
        // After a full cycle the rotation wraps to the same string.
        assert_eq!(fetcher.next_user_agent(), first);
    }
}
