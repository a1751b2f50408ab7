// Deterministic fakes for the cascade seams: scripted HTTP exchanges,
// scripted body extractors, and a scripted renderer. Each integration suite
// pulls in the subset it needs.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use newsloom_common::{UrlRecord, UrlStatus};
use newsloom_harvester::browser_pool::{BrowserFetchError, RenderedFetcher};
use newsloom_harvester::extract::BodyExtractor;
use newsloom_harvester::fetch::{FetchOutcome, HttpResponse, PageFetcher};

pub fn response(status: u16, body: &str) -> FetchOutcome {
    FetchOutcome::Response(HttpResponse {
        status,
        final_url: String::new(),
        headers: Vec::new(),
        body: body.to_string(),
    })
}

pub struct FakeFetcher {
    responses: HashMap<String, FetchOutcome>,
    calls: AtomicUsize,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self {
            responses: HashMap::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with(mut self, url: &str, outcome: FetchOutcome) -> Self {
        self.responses.insert(url.to_string(), outcome);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageFetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> FetchOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.responses
            .get(url)
            .cloned()
            .unwrap_or(FetchOutcome::Transport {
                message: format!("unscripted url {url}"),
                timed_out: false,
            })
    }
}

/// Returns the output paired with the first needle found in the HTML,
/// otherwise an empty string (extraction came up dry).
pub struct ScriptedExtractor {
    name: &'static str,
    rules: Vec<(String, String)>,
}

impl ScriptedExtractor {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            rules: Vec::new(),
        }
    }

    pub fn when(mut self, needle: &str, output: &str) -> Self {
        self.rules.push((needle.to_string(), output.to_string()));
        self
    }
}

impl BodyExtractor for ScriptedExtractor {
    fn extract(&self, html: &str, _url: &str) -> String {
        self.rules
            .iter()
            .find(|(needle, _)| html.contains(needle))
            .map(|(_, output)| output.clone())
            .unwrap_or_default()
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

pub enum FakeRender {
    Html(String),
    NoProxy,
    Fail,
}

pub struct FakeRenderer {
    script: FakeRender,
    calls: AtomicUsize,
}

impl FakeRenderer {
    pub fn new(script: FakeRender) -> Self {
        Self {
            script,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RenderedFetcher for FakeRenderer {
    async fn fetch(&self, _url: &str) -> Result<String, BrowserFetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.script {
            FakeRender::Html(html) => Ok(html.clone()),
            FakeRender::NoProxy => Err(BrowserFetchError::NoProxy),
            FakeRender::Fail => Err(BrowserFetchError::Render("proxy refused".to_string())),
        }
    }
}

pub fn claimed(url: &str, source: &str) -> UrlRecord {
    UrlRecord {
        normalized_url: url.to_string(),
        source: source.to_string(),
        status: UrlStatus::Processing,
        attempt_count: 0,
        last_attempt_at: None,
        error_message: None,
        extractor_used: None,
        block_reason: None,
        gdelt_publish_date: None,
        gdelt_themes: None,
        gdelt_tone: None,
    }
}

/// `n` words of filler prose, comfortably over any length floor.
pub fn prose(n: usize) -> String {
    (0..n)
        .map(|i| format!("word{i}"))
        .collect::<Vec<_>>()
        .join(" ")
}
