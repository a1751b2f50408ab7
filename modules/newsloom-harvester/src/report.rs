// Completion summary: COUNT per (source, status), overall success rate, and
// the publish-date span of the harvested set.

use chrono::{DateTime, Utc};
use newsloom_common::UrlStatus;
use newsloom_store::{MetricsRow, StateStore};

#[derive(Debug, Clone)]
pub struct RunReport {
    pub rows: Vec<MetricsRow>,
    pub total_urls: i64,
    pub successes: i64,
    pub duplicates: i64,
    pub publish_date_range: Option<(DateTime<Utc>, DateTime<Utc>)>,
}

impl RunReport {
    pub async fn build(store: &StateStore) -> newsloom_store::Result<Self> {
        let rows = store.metrics().await?;
        let total_urls = rows.iter().map(|r| r.count).sum();
        let successes = rows
            .iter()
            .filter(|r| r.status == UrlStatus::Success)
            .map(|r| r.count)
            .sum();
        let duplicates = rows
            .iter()
            .filter(|r| r.status == UrlStatus::Duplicate)
            .map(|r| r.count)
            .sum();
        let publish_date_range = store.publish_date_range().await?;

        Ok(Self {
            rows,
            total_urls,
            successes,
            duplicates,
            publish_date_range,
        })
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_urls == 0 {
            0.0
        } else {
            self.successes as f64 / self.total_urls as f64
        }
    }
}

impl std::fmt::Display for RunReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Run summary ({} urls):", self.total_urls)?;
        for row in &self.rows {
            writeln!(f, "  {:<16} {:<18} {}", row.source, row.status.to_string(), row.count)?;
        }
        writeln!(
            f,
            "  success rate: {:.1}% ({} articles, {} duplicates)",
            self.success_rate() * 100.0,
            self.successes,
            self.duplicates
        )?;
        match self.publish_date_range {
            Some((min, max)) => write!(
                f,
                "  publish dates: {} .. {}",
                min.format("%Y-%m-%d"),
                max.format("%Y-%m-%d")
            ),
            None => write!(f, "  publish dates: (none)"),
        }
    }
}
