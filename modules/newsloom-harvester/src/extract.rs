// Body extraction and metadata scraping.
//
// Body extraction runs through spider_transformations' Readability transform
// behind the `BodyExtractor` seam: the primary pass prunes to main content
// (precision), the secondary pass converts the whole document (recall).
// Metadata (headline, authors, publication date) is scraped from the raw HTML
// with regexes so it works on whatever the extractors discard.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use newsloom_common::DateSource;
use regex::Regex;
use spider_transformations::transformation::content::{
    transform_content_input, ReturnFormat, TransformConfig, TransformInput,
};

pub trait BodyExtractor: Send + Sync {
    fn extract(&self, html: &str, url: &str) -> String;
    fn name(&self) -> &'static str;
}

/// Precision extractor: Readability + main-content pruning. No comments,
/// no navigation, no tables of links.
pub struct PrimaryExtractor;

impl BodyExtractor for PrimaryExtractor {
    fn extract(&self, html: &str, url: &str) -> String {
        transform(html, url, true)
    }

    fn name(&self) -> &'static str {
        "primary"
    }
}

/// Recall extractor: whole-document conversion for pages where Readability
/// guesses the wrong root node.
pub struct SecondaryExtractor;

impl BodyExtractor for SecondaryExtractor {
    fn extract(&self, html: &str, url: &str) -> String {
        transform(html, url, false)
    }

    fn name(&self) -> &'static str {
        "secondary"
    }
}

fn transform(html: &str, url: &str, main_content: bool) -> String {
    let parsed_url = url::Url::parse(url).ok();
    let config = TransformConfig {
        readability: main_content,
        main_content,
        return_format: ReturnFormat::Markdown,
        filter_images: true,
        filter_svg: true,
        clean_html: true,
    };
    let input = TransformInput {
        url: parsed_url.as_ref(),
        content: html.as_bytes(),
        screenshot_bytes: None,
        encoding: None,
        selector_config: None,
        ignore_tags: None,
    };

    transform_content_input(input, &config)
}

/// Post-extraction cleanup: strip null bytes, unescape HTML entities, trim.
/// Upstream charset conversion already happened at fetch time.
pub fn normalize_body(text: &str) -> String {
    let stripped: String = text.chars().filter(|c| *c != '\0').collect();
    let unescaped = htmlescape::decode_html(&stripped).unwrap_or(stripped);
    unescaped.trim().to_string()
}

// --- Metadata scraping ---

static JSON_LD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?si)<script[^>]*type\s*=\s*["']application/ld\+json["'][^>]*>(.*?)</script>"#)
        .expect("valid regex")
});

static TIME_ELEMENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<time[^>]*datetime\s*=\s*["']([^"']+)["']"#).expect("valid regex")
});

static TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?si)<title[^>]*>(.*?)</title>"#).expect("valid regex"));

/// Upstream dates are a last resort; when an extracted date exists and the
/// upstream one strays more than this from it, the article gets flagged.
const UPSTREAM_DIVERGENCE_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedDate {
    pub date: Option<DateTime<Utc>>,
    pub source: Option<DateSource>,
    pub divergence: bool,
}

/// Resolve the publication date in cascade priority: JSON-LD `datePublished`
/// → OpenGraph `article:published_time` → generic meta/`<time>` guess →
/// upstream-supplied date.
pub fn resolve_publish_date(html: &str, upstream: Option<DateTime<Utc>>) -> ResolvedDate {
    let extracted = extract_json_ld_date(html)
        .map(|d| (d, DateSource::JsonLd))
        .or_else(|| extract_opengraph_date(html).map(|d| (d, DateSource::Opengraph)))
        .or_else(|| extract_secondary_date(html).map(|d| (d, DateSource::SecondaryExtractor)));

    match (extracted, upstream) {
        (Some((date, source)), upstream) => {
            let divergence = upstream
                .map(|u| (date - u).num_days().abs() > UPSTREAM_DIVERGENCE_DAYS)
                .unwrap_or(false);
            ResolvedDate {
                date: Some(date),
                source: Some(source),
                divergence,
            }
        }
        (None, Some(upstream)) => ResolvedDate {
            date: Some(upstream),
            source: Some(DateSource::Upstream),
            divergence: false,
        },
        (None, None) => ResolvedDate {
            date: None,
            source: None,
            divergence: false,
        },
    }
}

pub fn extract_json_ld_date(html: &str) -> Option<DateTime<Utc>> {
    for cap in JSON_LD_RE.captures_iter(html) {
        let Ok(value) = serde_json::from_str::<serde_json::Value>(&cap[1]) else {
            continue;
        };
        if let Some(date) = json_ld_date_value(&value) {
            return Some(date);
        }
        if let Some(graph) = value.get("@graph").and_then(|v| v.as_array()) {
            for item in graph {
                if let Some(date) = json_ld_date_value(item) {
                    return Some(date);
                }
            }
        }
    }
    None
}

fn json_ld_date_value(value: &serde_json::Value) -> Option<DateTime<Utc>> {
    for key in ["datePublished", "dateModified"] {
        if let Some(date) = value.get(key).and_then(|v| v.as_str()).and_then(parse_date) {
            return Some(date);
        }
    }
    None
}

pub fn extract_opengraph_date(html: &str) -> Option<DateTime<Utc>> {
    meta_content(html, "property", "article:published_time").and_then(|v| parse_date(&v))
}

/// The secondary guess tier: generic meta date tags and HTML5 `<time>`.
pub fn extract_secondary_date(html: &str) -> Option<DateTime<Utc>> {
    for name in ["date", "publish_date", "pubdate", "publish-date", "DC.date.issued"] {
        if let Some(date) = meta_content(html, "name", name).and_then(|v| parse_date(&v)) {
            return Some(date);
        }
    }
    TIME_ELEMENT_RE
        .captures(html)
        .and_then(|cap| parse_date(&cap[1]))
}

/// Headline: OpenGraph title, falling back to the `<title>` element.
pub fn extract_headline(html: &str) -> Option<String> {
    if let Some(title) = meta_content(html, "property", "og:title") {
        let title = clean_inline(&title);
        if !title.is_empty() {
            return Some(title);
        }
    }
    TITLE_RE
        .captures(html)
        .map(|cap| clean_inline(&cap[1]))
        .filter(|t| !t.is_empty())
}

/// Authors: JSON-LD `author` (single object, array, or bare string), falling
/// back to `<meta name="author">`. Multiple names are semicolon-joined.
pub fn extract_authors(html: &str) -> Option<String> {
    for cap in JSON_LD_RE.captures_iter(html) {
        let Ok(value) = serde_json::from_str::<serde_json::Value>(&cap[1]) else {
            continue;
        };
        if let Some(names) = json_ld_authors(&value) {
            return Some(names);
        }
        if let Some(graph) = value.get("@graph").and_then(|v| v.as_array()) {
            for item in graph {
                if let Some(names) = json_ld_authors(item) {
                    return Some(names);
                }
            }
        }
    }
    meta_content(html, "name", "author")
        .map(|v| clean_inline(&v))
        .filter(|v| !v.is_empty())
}

fn json_ld_authors(value: &serde_json::Value) -> Option<String> {
    let author = value.get("author")?;
    let mut names = Vec::new();
    match author {
        serde_json::Value::String(s) => names.push(s.trim().to_string()),
        serde_json::Value::Object(_) => {
            if let Some(name) = author.get("name").and_then(|n| n.as_str()) {
                names.push(name.trim().to_string());
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                match item {
                    serde_json::Value::String(s) => names.push(s.trim().to_string()),
                    other => {
                        if let Some(name) = other.get("name").and_then(|n| n.as_str()) {
                            names.push(name.trim().to_string());
                        }
                    }
                }
            }
        }
        _ => {}
    }
    names.retain(|n| !n.is_empty());
    if names.is_empty() {
        None
    } else {
        Some(names.join("; "))
    }
}

/// Find a `<meta>` content value by attribute, tolerating either attribute
/// order. Regexes are built per call because the attribute name varies.
fn meta_content(html: &str, attr: &str, value: &str) -> Option<String> {
    let escaped = regex::escape(value);
    let forward = Regex::new(&format!(
        r#"(?i)<meta[^>]*{attr}\s*=\s*["']{escaped}["'][^>]*content\s*=\s*["']([^"']+)["']"#
    ))
    .ok()?;
    if let Some(cap) = forward.captures(html) {
        return Some(cap[1].to_string());
    }
    let reversed = Regex::new(&format!(
        r#"(?i)<meta[^>]*content\s*=\s*["']([^"']+)["'][^>]*{attr}\s*=\s*["']{escaped}["']"#
    ))
    .ok()?;
    reversed.captures(html).map(|cap| cap[1].to_string())
}

fn clean_inline(value: &str) -> String {
    let unescaped = htmlescape::decode_html(value).unwrap_or_else(|_| value.to_string());
    unescaped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse a date string, trying RFC 3339 first, then common newsroom formats.
fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Some(dt.and_utc());
    }
    if let Ok(d) = chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return d.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
    }
    if let Ok(d) = chrono::NaiveDate::parse_from_str(s, "%B %d, %Y") {
        return d.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
    }

    None
}
