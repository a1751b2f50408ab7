use url::Url;

use crate::error::NewsloomError;

/// Publisher allowlist: host suffix → canonical source label.
/// Hosts matching none of these are discarded before seeding.
const SOURCE_SUFFIXES: &[(&str, &str)] = &[
    ("nytimes.com", "nytimes"),
    ("reuters.com", "reuters"),
    ("washingtonpost.com", "washingtonpost"),
    ("apnews.com", "apnews"),
    ("wsj.com", "wsj"),
];

/// Query parameters dropped during normalization (exact matches).
const TRACKING_PARAMS: &[&str] = &["ref", "s", "ncid", "fbclid", "mc_cid"];

/// Path segments that mark non-prose content. URLs containing one of these
/// are filtered at seed time and skipped by the cascade pre-filter.
const NON_PROSE_SEGMENTS: &[&str] = &[
    "video",
    "podcast",
    "interactive",
    "live",
    "slideshow",
    "graphic",
];

/// Canonicalize a candidate URL into its unique-key form: https scheme,
/// lowercased host, tracking parameters stripped, fragment removed, AMP
/// variants collapsed, trailing slash normalized.
///
/// Idempotent: `normalize_url(normalize_url(u)) == normalize_url(u)`.
pub fn normalize_url(raw: &str) -> Result<String, NewsloomError> {
    let mut url = Url::parse(raw.trim()).map_err(|e| NewsloomError::InvalidUrl(format!("{raw}: {e}")))?;

    match url.scheme() {
        "http" => {
            url.set_scheme("https")
                .map_err(|_| NewsloomError::InvalidUrl(raw.to_string()))?;
        }
        "https" => {}
        other => {
            return Err(NewsloomError::InvalidUrl(format!(
                "{raw}: unsupported scheme {other}"
            )))
        }
    }

    if url.host_str().is_none() {
        return Err(NewsloomError::InvalidUrl(format!("{raw}: no host")));
    }

    url.set_fragment(None);

    // Drop tracking parameters and AMP query variants in one pass.
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, v)| {
            let amp_variant = (k == "amp" && v == "1") || (k == "outputType" && v == "amp");
            !amp_variant && !is_tracking_param(k)
        })
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    url.set_query(None);
    if !kept.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (k, v) in &kept {
            pairs.append_pair(k, v);
        }
    }

    // Collapse AMP path suffixes and normalize the trailing slash.
    let mut path = url.path().trim_end_matches('/').to_string();
    while path.ends_with("/amp") {
        path.truncate(path.len() - "/amp".len());
    }
    if path.is_empty() {
        path.push('/');
    }
    url.set_path(&path);

    Ok(url.to_string())
}

fn is_tracking_param(key: &str) -> bool {
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key)
}

/// Canonical publisher label for a host, e.g. `jp.reuters.com` → `reuters`.
/// Returns `None` for hosts outside the allowlist.
pub fn source_label(host: &str) -> Option<&'static str> {
    let host = host.to_ascii_lowercase();
    for (suffix, label) in SOURCE_SUFFIXES {
        if host == *suffix || host.ends_with(&format!(".{suffix}")) {
            return Some(label);
        }
    }
    None
}

/// The key the rate limiter buckets a host under: the registrable domain
/// (last two labels), so `www.reuters.com` and `jp.reuters.com` share a bucket.
pub fn rate_limit_domain(host: &str) -> String {
    let host = host.to_ascii_lowercase();
    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() <= 2 {
        host
    } else {
        labels[labels.len() - 2..].join(".")
    }
}

/// True when any path segment marks non-prose content (video, podcast,
/// interactive, live, slideshow, graphic).
pub fn is_non_prose_path(path: &str) -> bool {
    path.split('/')
        .any(|segment| NON_PROSE_SEGMENTS.contains(&segment))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forces_https_and_lowercases_host() {
        let n = normalize_url("http://WWW.Reuters.COM/world/example").unwrap();
        assert_eq!(n, "https://www.reuters.com/world/example");
    }

    #[test]
    fn strips_tracking_params_keeps_the_rest() {
        let n = normalize_url(
            "https://www.reuters.com/world/example?utm_source=x&utm_medium=y&page=2&ref=home",
        )
        .unwrap();
        assert_eq!(n, "https://www.reuters.com/world/example?page=2");
    }

    #[test]
    fn strips_fragment() {
        let n = normalize_url("https://apnews.com/article/abc#section-3").unwrap();
        assert_eq!(n, "https://apnews.com/article/abc");
    }

    #[test]
    fn collapses_amp_path_suffix() {
        let n = normalize_url("https://www.nytimes.com/2026/01/01/world/story/amp/").unwrap();
        assert_eq!(n, "https://www.nytimes.com/2026/01/01/world/story");
    }

    #[test]
    fn collapses_amp_query_variants() {
        let n = normalize_url("https://www.wsj.com/articles/story?amp=1").unwrap();
        assert_eq!(n, "https://www.wsj.com/articles/story");
        let n = normalize_url("https://www.washingtonpost.com/a/b?outputType=amp").unwrap();
        assert_eq!(n, "https://www.washingtonpost.com/a/b");
    }

    #[test]
    fn normalizes_trailing_slash() {
        let a = normalize_url("https://apnews.com/article/abc/").unwrap();
        let b = normalize_url("https://apnews.com/article/abc").unwrap();
        assert_eq!(a, b);
        // Root path keeps its slash
        assert_eq!(normalize_url("https://apnews.com").unwrap(), "https://apnews.com/");
    }

    #[test]
    fn normalization_is_idempotent() {
        let inputs = [
            "http://WWW.Reuters.com/world/example?utm_source=x&ref=a#frag",
            "https://www.nytimes.com/2026/01/01/story/amp/",
            "https://apnews.com/article/abc/",
            "https://www.wsj.com/articles/story?amp=1&page=3",
        ];
        for raw in inputs {
            let once = normalize_url(raw).unwrap();
            let twice = normalize_url(&once).unwrap();
            assert_eq!(once, twice, "not idempotent for {raw}");
        }
    }

    #[test]
    fn rejects_non_http_schemes() {
        assert!(normalize_url("ftp://example.com/file").is_err());
        assert!(normalize_url("not a url").is_err());
    }

    #[test]
    fn source_labels_cover_regional_hosts() {
        assert_eq!(source_label("www.reuters.com"), Some("reuters"));
        assert_eq!(source_label("jp.reuters.com"), Some("reuters"));
        assert_eq!(source_label("uk.reuters.com"), Some("reuters"));
        assert_eq!(source_label("apnews.com"), Some("apnews"));
        assert_eq!(source_label("www.nytimes.com"), Some("nytimes"));
        assert_eq!(source_label("example.com"), None);
        // Suffix match requires a label boundary
        assert_eq!(source_label("notreuters.com"), None);
    }

    #[test]
    fn rate_limit_domain_collapses_subdomains() {
        assert_eq!(rate_limit_domain("www.reuters.com"), "reuters.com");
        assert_eq!(rate_limit_domain("jp.reuters.com"), "reuters.com");
        assert_eq!(rate_limit_domain("apnews.com"), "apnews.com");
    }

    #[test]
    fn non_prose_paths_detected_by_segment() {
        assert!(is_non_prose_path("/video/2026/clip"));
        assert!(is_non_prose_path("/world/live/updates"));
        assert!(is_non_prose_path("/podcast"));
        assert!(!is_non_prose_path("/world/liveblog-recap"));
        assert!(!is_non_prose_path("/politics/videos-of-the-year-review"));
    }
}
