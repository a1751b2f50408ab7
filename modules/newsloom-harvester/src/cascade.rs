// The per-URL extraction cascade: pre-filter → HTTP fetch → primary
// extraction → secondary extraction → browser fallback → validation.
// `process` is a total function: every library-level error comes back as a
// classified terminal outcome the writer can persist.

use std::sync::Arc;

use newsloom_common::{
    content_hash, is_non_prose_path, word_count, BlockReason, Config, NewArticle, UrlRecord,
    UrlStatus,
};
use tracing::debug;
use url::Url;

use crate::browser_pool::{BrowserFetchError, RenderedFetcher};
use crate::classify::{
    classify_response_failure, classify_thin_text, classify_transport, Classification,
};
use crate::extract::{
    extract_authors, extract_headline, normalize_body, resolve_publish_date, BodyExtractor,
    PrimaryExtractor, SecondaryExtractor,
};
use crate::fetch::{FetchOutcome, PageFetcher};

/// A stage's candidate text must clear this floor (characters) to move on to
/// validation; under it the cascade tries the next stage.
const ACCEPT_FLOOR: usize = 150;

#[derive(Debug, Clone)]
pub struct CascadeConfig {
    /// Validation floor: shorter extractions are rejected outright.
    pub min_text_length: usize,
    /// Registrable domains eligible for the browser fallback.
    pub paywall_domains: Vec<String>,
}

impl CascadeConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            min_text_length: config.min_text_length,
            paywall_domains: config.paywall_domains.clone(),
        }
    }
}

/// Terminal outcome for one URL. Exactly one of the failure fields or the
/// article is populated, mirroring what the store persists.
#[derive(Debug, Clone)]
pub struct CascadeOutcome {
    pub status: UrlStatus,
    pub article: Option<NewArticle>,
    pub extractor_used: Option<String>,
    pub error_message: Option<String>,
    pub block_reason: Option<BlockReason>,
}

impl CascadeOutcome {
    fn failure(classification: Classification, extractor_used: Option<String>) -> Self {
        Self {
            status: classification.status,
            article: None,
            extractor_used,
            error_message: Some(classification.message),
            block_reason: Some(classification.reason),
        }
    }
}

pub struct ExtractorCascade {
    fetcher: Arc<dyn PageFetcher>,
    browser: Option<Arc<dyn RenderedFetcher>>,
    primary: Box<dyn BodyExtractor>,
    secondary: Box<dyn BodyExtractor>,
    config: CascadeConfig,
}

impl ExtractorCascade {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        browser: Option<Arc<dyn RenderedFetcher>>,
        config: CascadeConfig,
    ) -> Self {
        Self {
            fetcher,
            browser,
            primary: Box::new(PrimaryExtractor),
            secondary: Box::new(SecondaryExtractor),
            config,
        }
    }

    /// Swap the body extractors; tests use this to make extraction
    /// deterministic without a real HTML corpus.
    pub fn with_extractors(
        mut self,
        primary: Box<dyn BodyExtractor>,
        secondary: Box<dyn BodyExtractor>,
    ) -> Self {
        self.primary = primary;
        self.secondary = secondary;
        self
    }

    /// Run the full cascade for one claimed URL.
    pub async fn process(&self, record: &UrlRecord) -> CascadeOutcome {
        let url = record.normalized_url.as_str();

        // Stage 1: pre-filter. Seeding already drops these; this guards
        // rows seeded by older runs.
        let parsed = match Url::parse(url) {
            Ok(parsed) => parsed,
            Err(e) => {
                return CascadeOutcome::failure(
                    Classification {
                        status: UrlStatus::ErrorParse,
                        reason: BlockReason::JsRequiredOrUnknown,
                        message: format!("unparseable stored url: {e}"),
                    },
                    None,
                )
            }
        };
        if is_non_prose_path(parsed.path()) {
            return CascadeOutcome {
                status: UrlStatus::Skipped,
                article: None,
                extractor_used: None,
                error_message: None,
                block_reason: Some(BlockReason::NonProsePath),
            };
        }

        // Stage 2: HTTP fetch (retries live inside the fetcher).
        let response = match self.fetcher.fetch(url).await {
            FetchOutcome::Transport { message, timed_out } => {
                return CascadeOutcome::failure(classify_transport(&message, timed_out), None)
            }
            FetchOutcome::Response(resp) if !(200..300).contains(&resp.status) => {
                return CascadeOutcome::failure(classify_response_failure(&resp), None)
            }
            FetchOutcome::Response(resp) => resp,
        };

        // Stage 3: primary extraction (precision).
        let primary_text = normalize_body(&self.primary.extract(&response.body, url));
        if primary_text.chars().count() >= ACCEPT_FLOOR {
            return self.validate(record, &response.body, primary_text, self.primary.name());
        }
        debug!(url, chars = primary_text.chars().count(), "Primary extraction under floor");

        // Stage 4: secondary extraction (recall) on the same HTML.
        let secondary_text = normalize_body(&self.secondary.extract(&response.body, url));
        if secondary_text.chars().count() >= ACCEPT_FLOOR {
            return self.validate(record, &response.body, secondary_text, self.secondary.name());
        }
        debug!(url, chars = secondary_text.chars().count(), "Secondary extraction under floor");

        // Stage 5: browser fallback, paywall domains only.
        if self.is_paywall_domain(&parsed) {
            if let Some(browser) = &self.browser {
                return self.browser_fallback(record, browser.as_ref(), url).await;
            }
        }

        // Both extractors came up short and no fallback applies.
        let best = if secondary_text.chars().count() > primary_text.chars().count() {
            secondary_text
        } else {
            primary_text
        };
        CascadeOutcome::failure(
            classify_thin_text(&response.body, &best),
            Some(self.secondary.name().to_string()),
        )
    }

    async fn browser_fallback(
        &self,
        record: &UrlRecord,
        browser: &dyn RenderedFetcher,
        url: &str,
    ) -> CascadeOutcome {
        let rendered = match browser.fetch(url).await {
            Ok(html) => html,
            Err(BrowserFetchError::NoProxy) => {
                return CascadeOutcome {
                    status: UrlStatus::Skipped,
                    article: None,
                    extractor_used: None,
                    error_message: Some("browser fallback needs a proxy".to_string()),
                    block_reason: Some(BlockReason::ProxyPoolEmpty),
                }
            }
            Err(e) => {
                return CascadeOutcome::failure(
                    Classification {
                        status: UrlStatus::ErrorNetwork,
                        reason: BlockReason::Transport,
                        message: format!("browser fallback: {e}"),
                    },
                    Some("browser".to_string()),
                )
            }
        };

        // Rendered HTML goes back through the primary extractor.
        let extractor = format!("browser+{}", self.primary.name());
        let text = normalize_body(&self.primary.extract(&rendered, url));
        if text.chars().count() >= ACCEPT_FLOOR {
            return self.validate(record, &rendered, text, &extractor);
        }
        CascadeOutcome::failure(classify_thin_text(&rendered, &text), Some(extractor))
    }

    /// Final validation over a stage's candidate text, and article assembly.
    fn validate(
        &self,
        record: &UrlRecord,
        html: &str,
        text: String,
        extractor: &str,
    ) -> CascadeOutcome {
        if text.chars().count() < self.config.min_text_length {
            return CascadeOutcome::failure(
                classify_thin_text(html, &text),
                Some(extractor.to_string()),
            );
        }

        let resolved = resolve_publish_date(html, record.gdelt_publish_date);
        let article = NewArticle {
            normalized_url: record.normalized_url.clone(),
            source: record.source.clone(),
            headline: extract_headline(html),
            authors: extract_authors(html),
            publish_date: resolved.date,
            publish_date_source: resolved.source,
            date_divergence: resolved.divergence,
            word_count: word_count(&text),
            content_hash: content_hash(&text),
            full_text: text,
        };

        CascadeOutcome {
            status: UrlStatus::Success,
            article: Some(article),
            extractor_used: Some(extractor.to_string()),
            error_message: None,
            block_reason: None,
        }
    }

    fn is_paywall_domain(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        let host = host.to_ascii_lowercase();
        self.config
            .paywall_domains
            .iter()
            .any(|d| host == *d || host.ends_with(&format!(".{d}")))
    }
}
