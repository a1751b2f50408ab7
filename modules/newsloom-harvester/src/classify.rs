// Failure classification: every fetch/extract dead end maps to exactly one
// (status, block_reason) bucket before it reaches the writer.

use newsloom_common::{BlockReason, UrlStatus};

use crate::fetch::HttpResponse;

/// Body markers that suggest a subscription wall.
const PAYWALL_MARKERS: &[&str] = &[
    "subscribe",
    "subscription required",
    "sign in to continue",
    "sign in",
    "log in to continue",
    "create a free account",
    "already a subscriber",
];

/// Body markers that suggest a bot challenge rather than a paywall.
const CAPTCHA_MARKERS: &[&str] = &[
    "captcha",
    "are you a robot",
    "verify you are human",
    "unusual traffic",
    "cf-chl",
    "challenge-platform",
];

/// Response headers planted by anti-bot layers.
const ANTIBOT_HEADERS: &[&str] = &["cf-ray", "cf-mitigated", "x-amzn-waf-action", "x-datadome"];

/// Redirect targets that mean the publisher bounced us to an auth page.
const LOGIN_PATHS: &[&str] = &["/login", "/signin", "/sign-in", "/subscribe", "/account"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub status: UrlStatus,
    pub reason: BlockReason,
    pub message: String,
}

impl Classification {
    fn new(status: UrlStatus, reason: BlockReason, message: impl Into<String>) -> Self {
        Self {
            status,
            reason,
            message: message.into(),
        }
    }
}

pub fn has_paywall_markers(text: &str) -> bool {
    let lower = text.to_lowercase();
    PAYWALL_MARKERS.iter().any(|m| lower.contains(m))
}

pub fn has_captcha_markers(text: &str) -> bool {
    let lower = text.to_lowercase();
    CAPTCHA_MARKERS.iter().any(|m| lower.contains(m))
}

pub fn has_antibot_headers(resp: &HttpResponse) -> bool {
    ANTIBOT_HEADERS.iter().any(|h| resp.has_header(h))
}

fn landed_on_login(resp: &HttpResponse) -> bool {
    let lower = resp.final_url.to_lowercase();
    LOGIN_PATHS.iter().any(|p| lower.contains(p))
}

/// Classify a non-2xx response. Retryable statuses (429, 5xx) only arrive
/// here after the fetcher's retry budget is spent.
pub fn classify_response_failure(resp: &HttpResponse) -> Classification {
    match resp.status {
        403 => {
            if landed_on_login(resp) || has_paywall_markers(&resp.body) {
                Classification::new(
                    UrlStatus::PaywallSuspected,
                    BlockReason::Paywall,
                    "HTTP 403 with paywall markers",
                )
            } else {
                // cf-ray / CAPTCHA bodies, and bare 403s which in practice
                // come from the same edge layers.
                Classification::new(
                    UrlStatus::ErrorNetwork,
                    BlockReason::BotDetection,
                    if has_antibot_headers(resp) || has_captcha_markers(&resp.body) {
                        "HTTP 403 with anti-bot markers"
                    } else {
                        "HTTP 403"
                    },
                )
            }
        }
        404 | 410 => Classification::new(
            UrlStatus::Dead,
            BlockReason::Deleted,
            format!("HTTP {}", resp.status),
        ),
        429 => Classification::new(
            UrlStatus::ErrorNetwork,
            BlockReason::RateLimited,
            "HTTP 429 after retries",
        ),
        status if status >= 500 => Classification::new(
            UrlStatus::ErrorNetwork,
            BlockReason::Transport,
            format!("HTTP {status} after retries"),
        ),
        status => Classification::new(
            UrlStatus::ErrorNetwork,
            BlockReason::Transport,
            format!("HTTP {status}"),
        ),
    }
}

/// Classify a transport-level dead end (no response at all).
pub fn classify_transport(message: &str, timed_out: bool) -> Classification {
    let message = if timed_out {
        format!("timeout: {message}")
    } else {
        message.to_string()
    };
    Classification::new(UrlStatus::ErrorNetwork, BlockReason::Transport, message)
}

/// Classify a 200 whose extracted text stayed under the acceptance floor:
/// paywall copy means a soft paywall, anything else is a parse failure
/// (most often a JS-only page).
pub fn classify_thin_text(html: &str, extracted: &str) -> Classification {
    if has_paywall_markers(extracted) || has_paywall_markers(html) {
        Classification::new(
            UrlStatus::PaywallSuspected,
            BlockReason::SoftPaywall,
            "extracted text under floor with paywall markers",
        )
    } else {
        Classification::new(
            UrlStatus::ErrorParse,
            BlockReason::JsRequiredOrUnknown,
            "extracted text under floor",
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resp(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            final_url: "https://www.example.com/story".to_string(),
            headers: Vec::new(),
            body: body.to_string(),
        }
    }

    #[test]
    fn forbidden_with_subscribe_copy_is_paywall() {
        let c = classify_response_failure(&resp(403, "Subscribe to read this story"));
        assert_eq!(c.status, UrlStatus::PaywallSuspected);
        assert_eq!(c.reason, BlockReason::Paywall);
    }

    #[test]
    fn forbidden_with_login_redirect_is_paywall() {
        let mut r = resp(403, "forbidden");
        r.final_url = "https://www.example.com/subscribe?return=/story".to_string();
        let c = classify_response_failure(&r);
        assert_eq!(c.status, UrlStatus::PaywallSuspected);
        assert_eq!(c.reason, BlockReason::Paywall);
    }

    #[test]
    fn forbidden_with_cf_ray_is_bot_detection() {
        let mut r = resp(403, "Access denied");
        r.headers.push(("cf-ray".to_string(), "8a1b2c3d".to_string()));
        let c = classify_response_failure(&r);
        assert_eq!(c.status, UrlStatus::ErrorNetwork);
        assert_eq!(c.reason, BlockReason::BotDetection);
    }

    #[test]
    fn forbidden_with_captcha_body_is_bot_detection() {
        let c = classify_response_failure(&resp(403, "Complete the CAPTCHA to continue"));
        assert_eq!(c.reason, BlockReason::BotDetection);
    }

    #[test]
    fn gone_and_not_found_are_dead() {
        for status in [404, 410] {
            let c = classify_response_failure(&resp(status, ""));
            assert_eq!(c.status, UrlStatus::Dead);
            assert_eq!(c.reason, BlockReason::Deleted);
        }
    }

    #[test]
    fn exhausted_429_is_rate_limited() {
        let c = classify_response_failure(&resp(429, "slow down"));
        assert_eq!(c.status, UrlStatus::ErrorNetwork);
        assert_eq!(c.reason, BlockReason::RateLimited);
    }

    #[test]
    fn exhausted_5xx_is_transport() {
        let c = classify_response_failure(&resp(503, ""));
        assert_eq!(c.status, UrlStatus::ErrorNetwork);
        assert_eq!(c.reason, BlockReason::Transport);
    }

    #[test]
    fn thin_text_with_subscribe_copy_is_soft_paywall() {
        let c = classify_thin_text("<html>...</html>", "Subscribe to continue reading");
        assert_eq!(c.status, UrlStatus::PaywallSuspected);
        assert_eq!(c.reason, BlockReason::SoftPaywall);
    }

    #[test]
    fn thin_text_without_markers_is_parse_error() {
        let c = classify_thin_text("<html><div id=app></div></html>", "Loading");
        assert_eq!(c.status, UrlStatus::ErrorParse);
        assert_eq!(c.reason, BlockReason::JsRequiredOrUnknown);
    }

    #[test]
    fn transport_timeout_is_annotated() {
        let c = classify_transport("deadline elapsed", true);
        assert_eq!(c.status, UrlStatus::ErrorNetwork);
        assert_eq!(c.reason, BlockReason::Transport);
        assert!(c.message.starts_with("timeout:"));
    }
}
