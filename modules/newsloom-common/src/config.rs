use std::collections::HashMap;
use std::env;

/// Default per-domain minimum inter-request delays, in seconds.
/// Anything not listed falls back to `DEFAULT_DOMAIN_DELAY_SECS`.
const DEFAULT_DELAYS: &[(&str, f64)] = &[
    ("apnews.com", 1.5),
    ("reuters.com", 2.0),
    ("nytimes.com", 4.0),
    ("washingtonpost.com", 4.0),
    ("wsj.com", 6.0),
];

pub const DEFAULT_DOMAIN_DELAY_SECS: f64 = 3.0;

/// Rotating user-agent pool: real browser strings, rotated per request.
const DEFAULT_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36 Edg/124.0.2478.97",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:127.0) Gecko/20100101 Firefox/127.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:126.0) Gecko/20100101 Firefox/126.0",
    "Mozilla/5.0 (Windows NT 10.0; WOW64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.6 Safari/605.1.15",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:127.0) Gecko/20100101 Firefox/127.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_5) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64; rv:127.0) Gecko/20100101 Firefox/127.0",
    "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:126.0) Gecko/20100101 Firefox/126.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36 Edg/126.0.2592.68",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_5 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.5 Mobile/15E148 Safari/604.1",
];

/// Acquisition configuration loaded from environment variables.
/// Every knob has a default; the binary runs with no environment at all.
#[derive(Debug, Clone)]
pub struct Config {
    /// Parallelism of the primary HTTP worker pool.
    pub worker_count: usize,
    /// Concurrent headless browser contexts.
    pub browser_pool_size: usize,
    /// Acceptance floor for extracted text, in characters.
    pub min_text_length: usize,
    /// Domains eligible for the browser fallback (registrable form).
    pub paywall_domains: Vec<String>,
    /// Per-domain delay overrides, seconds. Merged over the built-in table.
    pub per_domain_delays: HashMap<String, f64>,
    /// User-agent pool, rotated per request.
    pub user_agents: Vec<String>,
    /// Retry cap for transient HTTP conditions.
    pub max_attempts: u32,
    /// Seconds in-flight workers get to finish after a shutdown signal.
    pub grace_shutdown_seconds: u64,
    /// Per-request HTTP timeout, seconds.
    pub http_timeout_seconds: u64,
    /// Per-render browser timeout, seconds.
    pub browser_timeout_seconds: u64,

    // Browserless rendering service (browser fallback disabled when unset)
    pub browserless_url: Option<String>,
    pub browserless_token: Option<String>,

    // Proxy pool (runs proxyless when unset)
    pub proxy_source: Option<String>,
    pub proxy_validation_url: String,
    /// Background refresh triggers when the active count drops below this.
    pub proxy_low_water: usize,
}

impl Config {
    /// Load configuration from environment variables, defaulting everything.
    pub fn from_env() -> Self {
        Self {
            worker_count: env_parse("WORKER_COUNT", 20),
            browser_pool_size: env_parse("BROWSER_POOL_SIZE", 3),
            min_text_length: env_parse("MIN_TEXT_LENGTH", 300),
            paywall_domains: env::var("PAYWALL_DOMAINS")
                .map(|v| split_list(&v))
                .unwrap_or_else(|_| {
                    vec![
                        "nytimes.com".to_string(),
                        "washingtonpost.com".to_string(),
                        "wsj.com".to_string(),
                    ]
                }),
            per_domain_delays: parse_delay_overrides(
                &env::var("PER_DOMAIN_DELAYS").unwrap_or_default(),
            ),
            user_agents: env::var("USER_AGENTS")
                .map(|v| split_list(&v))
                .unwrap_or_else(|_| DEFAULT_USER_AGENTS.iter().map(|s| s.to_string()).collect()),
            max_attempts: env_parse("MAX_ATTEMPTS", 3),
            grace_shutdown_seconds: env_parse("GRACE_SHUTDOWN_SECONDS", 30),
            http_timeout_seconds: env_parse("HTTP_TIMEOUT_SECONDS", 15),
            browser_timeout_seconds: env_parse("BROWSER_TIMEOUT_SECONDS", 30),
            browserless_url: env::var("BROWSERLESS_URL").ok().filter(|v| !v.is_empty()),
            browserless_token: env::var("BROWSERLESS_TOKEN").ok().filter(|v| !v.is_empty()),
            proxy_source: env::var("PROXY_SOURCE").ok().filter(|v| !v.is_empty()),
            proxy_validation_url: env::var("PROXY_VALIDATION_URL")
                .unwrap_or_else(|_| "https://api.ipify.org".to_string()),
            proxy_low_water: env_parse("PROXY_LOW_WATER", 10),
        }
    }

    /// The effective delay table: built-in defaults overlaid with overrides.
    pub fn domain_delays(&self) -> HashMap<String, f64> {
        let mut table: HashMap<String, f64> = DEFAULT_DELAYS
            .iter()
            .map(|(d, s)| (d.to_string(), *s))
            .collect();
        for (domain, secs) in &self.per_domain_delays {
            table.insert(domain.clone(), *secs);
        }
        table
    }

    /// Log the effective settings at startup. No secrets beyond lengths.
    pub fn log_summary(&self) {
        tracing::info!(
            workers = self.worker_count,
            browser_contexts = self.browser_pool_size,
            min_text_length = self.min_text_length,
            max_attempts = self.max_attempts,
            user_agents = self.user_agents.len(),
            paywall_domains = ?self.paywall_domains,
            browserless = self.browserless_url.is_some(),
            proxies = self.proxy_source.is_some(),
            "Configuration loaded"
        );
    }
}

impl Default for Config {
    fn default() -> Self {
        // Defaults only — ignores the process environment.
        Self {
            worker_count: 20,
            browser_pool_size: 3,
            min_text_length: 300,
            paywall_domains: vec![
                "nytimes.com".to_string(),
                "washingtonpost.com".to_string(),
                "wsj.com".to_string(),
            ],
            per_domain_delays: HashMap::new(),
            user_agents: DEFAULT_USER_AGENTS.iter().map(|s| s.to_string()).collect(),
            max_attempts: 3,
            grace_shutdown_seconds: 30,
            http_timeout_seconds: 15,
            browser_timeout_seconds: 30,
            browserless_url: None,
            browserless_token: None,
            proxy_source: None,
            proxy_validation_url: "https://api.ipify.org".to_string(),
            proxy_low_water: 10,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Parse `domain=seconds,domain=seconds` override strings. Malformed entries
/// are dropped with a warning rather than aborting startup.
fn parse_delay_overrides(value: &str) -> HashMap<String, f64> {
    let mut table = HashMap::new();
    for entry in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        match entry.split_once('=') {
            Some((domain, secs)) => match secs.trim().parse::<f64>() {
                Ok(s) if s >= 0.0 => {
                    table.insert(domain.trim().to_string(), s);
                }
                _ => tracing::warn!(entry, "Ignoring delay override with bad seconds"),
            },
            None => tracing::warn!(entry, "Ignoring malformed delay override"),
        }
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_overrides_parse_and_merge() {
        let overrides = parse_delay_overrides("nytimes.com=8.0, example.com=1.5, bad, x=notnum");
        assert_eq!(overrides.len(), 2);
        assert_eq!(overrides["nytimes.com"], 8.0);

        let cfg = Config {
            per_domain_delays: overrides,
            ..Config::default()
        };
        let table = cfg.domain_delays();
        assert_eq!(table["nytimes.com"], 8.0);
        assert_eq!(table["wsj.com"], 6.0);
        assert_eq!(table["example.com"], 1.5);
    }

    #[test]
    fn default_user_agent_pool_is_populated() {
        let cfg = Config::default();
        assert!(cfg.user_agents.len() >= 15);
        assert!(cfg.user_agents.iter().all(|ua| ua.starts_with("Mozilla/5.0")));
    }
}
