// Manual row decoding. Status and reason columns are TEXT and round-trip
// through the Display/FromStr impls on the domain enums.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};

use crate::types::{
    ArticleRecord, BlockReason, DateSource, ProxyEndpoint, ProxyProtocol, ProxyRecord, UrlRecord,
    UrlStatus,
};

fn decode<T: std::str::FromStr<Err = String>>(
    row: &SqliteRow,
    column: &str,
) -> sqlx::Result<T> {
    let raw: String = row.try_get(column)?;
    raw.parse().map_err(|e: String| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: e.into(),
    })
}

fn decode_opt<T: std::str::FromStr<Err = String>>(
    row: &SqliteRow,
    column: &str,
) -> sqlx::Result<Option<T>> {
    let raw: Option<String> = row.try_get(column)?;
    raw.map(|s| {
        s.parse().map_err(|e: String| sqlx::Error::ColumnDecode {
            index: column.to_string(),
            source: e.into(),
        })
    })
    .transpose()
}

impl FromRow<'_, SqliteRow> for UrlRecord {
    fn from_row(row: &SqliteRow) -> sqlx::Result<Self> {
        Ok(UrlRecord {
            normalized_url: row.try_get("normalized_url")?,
            source: row.try_get("source")?,
            status: decode::<UrlStatus>(row, "status")?,
            attempt_count: row.try_get("attempt_count")?,
            last_attempt_at: row.try_get::<Option<DateTime<Utc>>, _>("last_attempt_at")?,
            error_message: row.try_get("error_message")?,
            extractor_used: row.try_get("extractor_used")?,
            block_reason: decode_opt::<BlockReason>(row, "block_reason")?,
            gdelt_publish_date: row.try_get::<Option<DateTime<Utc>>, _>("gdelt_publish_date")?,
            gdelt_themes: row.try_get("gdelt_themes")?,
            gdelt_tone: row.try_get("gdelt_tone")?,
        })
    }
}

impl FromRow<'_, SqliteRow> for ArticleRecord {
    fn from_row(row: &SqliteRow) -> sqlx::Result<Self> {
        Ok(ArticleRecord {
            article_id: row.try_get("article_id")?,
            normalized_url: row.try_get("normalized_url")?,
            source: row.try_get("source")?,
            headline: row.try_get("headline")?,
            authors: row.try_get("authors")?,
            publish_date: row.try_get::<Option<DateTime<Utc>>, _>("publish_date")?,
            publish_date_source: decode_opt::<DateSource>(row, "publish_date_source")?,
            date_divergence: row.try_get::<i64, _>("date_divergence")? != 0,
            full_text: row.try_get("full_text")?,
            word_count: row.try_get("word_count")?,
            content_hash: row.try_get("content_hash")?,
            extraction_timestamp: row.try_get("extraction_timestamp")?,
        })
    }
}

impl FromRow<'_, SqliteRow> for ProxyRecord {
    fn from_row(row: &SqliteRow) -> sqlx::Result<Self> {
        Ok(ProxyRecord {
            id: row.try_get("id")?,
            endpoint: ProxyEndpoint {
                host: row.try_get("host")?,
                port: row.try_get::<i64, _>("port")? as u16,
                protocol: decode::<ProxyProtocol>(row, "protocol")?,
            },
            last_validated_at: row.try_get::<Option<DateTime<Utc>>, _>("last_validated_at")?,
            success_count: row.try_get("success_count")?,
            consecutive_failure_count: row.try_get("consecutive_failure_count")?,
            is_active: row.try_get::<i64, _>("is_active")? != 0,
        })
    }
}
