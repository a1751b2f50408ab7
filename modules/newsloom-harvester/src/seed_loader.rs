// Adapter over the upstream discovery CSV. Rows are normalized, allowlisted,
// pre-filtered against non-prose paths, and deduplicated before they ever
// reach the store; malformed rows are skipped with a warning, never fatal.

use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use newsloom_common::{
    is_non_prose_path, normalize_url, source_label, NewsloomError, SeedUrl,
};
use serde::Deserialize;
use tracing::{info, warn};
use url::Url;

#[derive(Debug, Deserialize)]
struct RawSeedRow {
    url: String,
    #[serde(default)]
    publish_date: Option<String>,
    // The upstream `source` column is ignored; the label derives from the host.
    #[serde(default)]
    themes: Option<String>,
    #[serde(default)]
    tone_scores: Option<String>,
}

pub fn load_seed_file(path: &Path) -> Result<Vec<SeedUrl>, NewsloomError> {
    let file = std::fs::File::open(path)
        .map_err(|e| NewsloomError::Seed(format!("{}: {e}", path.display())))?;
    load_seed_reader(file)
}

pub fn load_seed_reader<R: Read>(reader: R) -> Result<Vec<SeedUrl>, NewsloomError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(reader);

    let mut seen: HashSet<String> = HashSet::new();
    let mut records = Vec::new();
    let mut malformed = 0usize;
    let mut filtered = 0usize;

    for row in csv_reader.deserialize::<RawSeedRow>() {
        let row = match row {
            Ok(row) => row,
            Err(e) => {
                warn!(error = %e, "Skipping malformed seed row");
                malformed += 1;
                continue;
            }
        };

        let normalized = match normalize_url(&row.url) {
            Ok(normalized) => normalized,
            Err(e) => {
                warn!(url = %row.url, error = %e, "Skipping unparseable seed url");
                malformed += 1;
                continue;
            }
        };

        // Allowlist: the source label comes from the host, not the CSV.
        let parsed = Url::parse(&normalized).expect("normalized url parses");
        let Some(label) = parsed.host_str().and_then(source_label) else {
            filtered += 1;
            continue;
        };
        if is_non_prose_path(parsed.path()) {
            filtered += 1;
            continue;
        }
        if !seen.insert(normalized.clone()) {
            continue;
        }

        records.push(SeedUrl {
            normalized_url: normalized,
            source: label.to_string(),
            gdelt_publish_date: row.publish_date.as_deref().and_then(parse_upstream_date),
            gdelt_themes: row.themes.filter(|t| !t.is_empty()),
            gdelt_tone: row.tone_scores.filter(|t| !t.is_empty()),
        });
    }

    info!(
        kept = records.len(),
        filtered, malformed, "Seed file loaded"
    );
    Ok(records)
}

/// Upstream dates arrive either as ISO 8601 or as the compact
/// `YYYYMMDDHHMMSS` form the discovery stage emits.
pub fn parse_upstream_date(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y%m%d%H%M%S") {
        return Some(dt.and_utc());
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return d.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
    }
    None
}
