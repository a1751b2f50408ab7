use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// --- URL state machine ---

/// Lifecycle status of a candidate URL. `Success`, `Duplicate`, `Dead` and
/// `Skipped` are terminal; the failure statuses are terminal for a single run
/// but may be reset to `Pending` by a future re-seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrlStatus {
    Pending,
    Processing,
    Success,
    Duplicate,
    PaywallSuspected,
    ErrorParse,
    ErrorNetwork,
    Skipped,
    Dead,
}

impl UrlStatus {
    /// True for statuses the pipeline never self-transitions out of.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, UrlStatus::Pending | UrlStatus::Processing)
    }
}

impl std::fmt::Display for UrlStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UrlStatus::Pending => write!(f, "pending"),
            UrlStatus::Processing => write!(f, "processing"),
            UrlStatus::Success => write!(f, "success"),
            UrlStatus::Duplicate => write!(f, "duplicate"),
            UrlStatus::PaywallSuspected => write!(f, "paywall_suspected"),
            UrlStatus::ErrorParse => write!(f, "error_parse"),
            UrlStatus::ErrorNetwork => write!(f, "error_network"),
            UrlStatus::Skipped => write!(f, "skipped"),
            UrlStatus::Dead => write!(f, "dead"),
        }
    }
}

impl std::str::FromStr for UrlStatus {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "success" => Ok(Self::Success),
            "duplicate" => Ok(Self::Duplicate),
            "paywall_suspected" => Ok(Self::PaywallSuspected),
            "error_parse" => Ok(Self::ErrorParse),
            "error_network" => Ok(Self::ErrorNetwork),
            "skipped" => Ok(Self::Skipped),
            "dead" => Ok(Self::Dead),
            other => Err(format!("unknown UrlStatus: {other}")),
        }
    }
}

/// Secondary classifier attached to failure statuses — the observable cause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockReason {
    Paywall,
    BotDetection,
    RateLimited,
    Deleted,
    Transport,
    SoftPaywall,
    JsRequiredOrUnknown,
    NonProsePath,
    ProxyPoolEmpty,
}

impl std::fmt::Display for BlockReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlockReason::Paywall => write!(f, "paywall"),
            BlockReason::BotDetection => write!(f, "bot_detection"),
            BlockReason::RateLimited => write!(f, "rate_limited"),
            BlockReason::Deleted => write!(f, "deleted"),
            BlockReason::Transport => write!(f, "transport"),
            BlockReason::SoftPaywall => write!(f, "soft_paywall"),
            BlockReason::JsRequiredOrUnknown => write!(f, "js_required_or_unknown"),
            BlockReason::NonProsePath => write!(f, "non_prose_path"),
            BlockReason::ProxyPoolEmpty => write!(f, "proxy_pool_empty"),
        }
    }
}

impl std::str::FromStr for BlockReason {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "paywall" => Ok(Self::Paywall),
            "bot_detection" => Ok(Self::BotDetection),
            "rate_limited" => Ok(Self::RateLimited),
            "deleted" => Ok(Self::Deleted),
            "transport" => Ok(Self::Transport),
            "soft_paywall" => Ok(Self::SoftPaywall),
            "js_required_or_unknown" => Ok(Self::JsRequiredOrUnknown),
            "non_prose_path" => Ok(Self::NonProsePath),
            "proxy_pool_empty" => Ok(Self::ProxyPoolEmpty),
            other => Err(format!("unknown BlockReason: {other}")),
        }
    }
}

/// Where an article's publication date came from, in cascade priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DateSource {
    JsonLd,
    Opengraph,
    SecondaryExtractor,
    Upstream,
}

impl std::fmt::Display for DateSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DateSource::JsonLd => write!(f, "json-ld"),
            DateSource::Opengraph => write!(f, "opengraph"),
            DateSource::SecondaryExtractor => write!(f, "secondary-extractor"),
            DateSource::Upstream => write!(f, "upstream"),
        }
    }
}

impl std::str::FromStr for DateSource {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "json-ld" => Ok(Self::JsonLd),
            "opengraph" => Ok(Self::Opengraph),
            "secondary-extractor" => Ok(Self::SecondaryExtractor),
            "upstream" => Ok(Self::Upstream),
            other => Err(format!("unknown DateSource: {other}")),
        }
    }
}

// --- Records ---

/// A normalized candidate URL ready for seeding, with pass-through metadata
/// from the upstream discovery stage.
#[derive(Debug, Clone, PartialEq)]
pub struct SeedUrl {
    pub normalized_url: String,
    pub source: String,
    pub gdelt_publish_date: Option<DateTime<Utc>>,
    pub gdelt_themes: Option<String>,
    pub gdelt_tone: Option<String>,
}

/// One row of the `urls` table.
#[derive(Debug, Clone)]
pub struct UrlRecord {
    pub normalized_url: String,
    pub source: String,
    pub status: UrlStatus,
    pub attempt_count: i64,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub extractor_used: Option<String>,
    pub block_reason: Option<BlockReason>,
    pub gdelt_publish_date: Option<DateTime<Utc>>,
    pub gdelt_themes: Option<String>,
    pub gdelt_tone: Option<String>,
}

/// A successfully extracted article, pre-insert. The store assigns
/// `article_id` and `extraction_timestamp`.
#[derive(Debug, Clone)]
pub struct NewArticle {
    pub normalized_url: String,
    pub source: String,
    pub headline: Option<String>,
    /// Semicolon-joined author names.
    pub authors: Option<String>,
    pub publish_date: Option<DateTime<Utc>>,
    pub publish_date_source: Option<DateSource>,
    /// Set when the upstream-supplied date diverges from an extracted date by
    /// more than 7 days.
    pub date_divergence: bool,
    pub full_text: String,
    pub word_count: i64,
    pub content_hash: String,
}

/// One row of the `articles` table.
#[derive(Debug, Clone)]
pub struct ArticleRecord {
    pub article_id: i64,
    pub normalized_url: String,
    pub source: String,
    pub headline: Option<String>,
    pub authors: Option<String>,
    pub publish_date: Option<DateTime<Utc>>,
    pub publish_date_source: Option<DateSource>,
    pub date_divergence: bool,
    pub full_text: String,
    pub word_count: i64,
    pub content_hash: String,
    pub extraction_timestamp: DateTime<Utc>,
}

// --- Proxies ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyProtocol {
    Http,
    Https,
    Socks5,
}

impl std::fmt::Display for ProxyProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProxyProtocol::Http => write!(f, "http"),
            ProxyProtocol::Https => write!(f, "https"),
            ProxyProtocol::Socks5 => write!(f, "socks5"),
        }
    }
}

impl std::str::FromStr for ProxyProtocol {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "http" => Ok(Self::Http),
            "https" => Ok(Self::Https),
            "socks5" => Ok(Self::Socks5),
            other => Err(format!("unknown ProxyProtocol: {other}")),
        }
    }
}

/// A proxy endpoint. Identity is `(host, port)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProxyEndpoint {
    pub host: String,
    pub port: u16,
    pub protocol: ProxyProtocol,
}

impl ProxyEndpoint {
    /// Scheme-qualified URL form, e.g. `socks5://10.0.0.1:1080`.
    pub fn url(&self) -> String {
        format!("{}://{}:{}", self.protocol, self.host, self.port)
    }
}

impl std::fmt::Display for ProxyEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// One row of the `proxies` table.
#[derive(Debug, Clone)]
pub struct ProxyRecord {
    pub id: i64,
    pub endpoint: ProxyEndpoint,
    pub last_validated_at: Option<DateTime<Utc>>,
    pub success_count: i64,
    pub consecutive_failure_count: i64,
    pub is_active: bool,
}

// --- Content hashing ---

/// SHA-256 of the whitespace-normalized, lowercased text, hex-encoded.
/// Used as the cross-URL dedup key; must be stable across runs and platforms.
pub fn content_hash(text: &str) -> String {
    let normalized = text
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    hex::encode(hasher.finalize())
}

/// Word count as the downstream analysis stage defines it: whitespace splits.
pub fn word_count(text: &str) -> i64 {
    text.split_whitespace().count() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            UrlStatus::Pending,
            UrlStatus::Processing,
            UrlStatus::Success,
            UrlStatus::Duplicate,
            UrlStatus::PaywallSuspected,
            UrlStatus::ErrorParse,
            UrlStatus::ErrorNetwork,
            UrlStatus::Skipped,
            UrlStatus::Dead,
        ] {
            assert_eq!(status.to_string().parse::<UrlStatus>().unwrap(), status);
        }
    }

    #[test]
    fn terminal_statuses() {
        assert!(!UrlStatus::Pending.is_terminal());
        assert!(!UrlStatus::Processing.is_terminal());
        assert!(UrlStatus::Success.is_terminal());
        assert!(UrlStatus::Dead.is_terminal());
        assert!(UrlStatus::PaywallSuspected.is_terminal());
    }

    #[test]
    fn content_hash_ignores_whitespace_and_case() {
        let a = content_hash("Hello   World");
        let b = content_hash("hello world");
        let c = content_hash("  hello\n\tworld  ");
        assert_eq!(a, b);
        assert_eq!(b, c);
        assert_ne!(a, content_hash("hello worlds"));
    }

    #[test]
    fn content_hash_is_hex_sha256() {
        let h = content_hash("example");
        assert_eq!(h.len(), 64);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn word_count_splits_on_whitespace() {
        assert_eq!(word_count("one two  three\nfour"), 4);
        assert_eq!(word_count(""), 0);
    }

    #[test]
    fn proxy_endpoint_url_form() {
        let p = ProxyEndpoint {
            host: "10.0.0.1".to_string(),
            port: 1080,
            protocol: ProxyProtocol::Socks5,
        };
        assert_eq!(p.url(), "socks5://10.0.0.1:1080");
    }
}
