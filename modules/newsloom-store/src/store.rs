use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use newsloom_common::{
    ArticleRecord, NewArticle, ProxyEndpoint, ProxyRecord, SeedUrl, UrlRecord, UrlStatus,
};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{FromRow, Row, SqlitePool};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::info;

use crate::error::{Result, StoreError};
use crate::writer::{run_writer, FailureUpdate, WriteOp};

/// Backpressure bound on the write queue.
const WRITE_QUEUE_DEPTH: usize = 256;

/// Result of `record_success`: either a fresh articles row, or a content-hash
/// collision downgraded to `duplicate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuccessOutcome {
    Inserted { article_id: i64 },
    Duplicate { existing_article_id: i64 },
}

/// One cell of the completion metrics: COUNT per (source, status).
#[derive(Debug, Clone)]
pub struct MetricsRow {
    pub source: String,
    pub status: UrlStatus,
    pub count: i64,
}

impl FromRow<'_, SqliteRow> for MetricsRow {
    fn from_row(row: &SqliteRow) -> sqlx::Result<Self> {
        let status: String = row.try_get("status")?;
        Ok(MetricsRow {
            source: row.try_get("source")?,
            status: status.parse().map_err(|e: String| sqlx::Error::ColumnDecode {
                index: "status".to_string(),
                source: e.into(),
            })?,
            count: row.try_get("count")?,
        })
    }
}

/// Durable store for URL status, extracted articles, and proxy health.
///
/// All mutations are serialized through a single writer task; the public
/// async methods submit `WriteOp`s over a bounded channel and resolve once
/// the corresponding transaction has committed. Reads run concurrently
/// against a separate read-only pool (WAL keeps them non-blocking).
#[derive(Clone)]
pub struct StateStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    readers: SqlitePool,
    ops: mpsc::Sender<WriteOp>,
    writer: Mutex<Option<JoinHandle<()>>>,
}

impl StateStore {
    /// Open (creating if missing) the store at `path`, run migrations, and
    /// start the writer task.
    pub async fn open(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5))
            .foreign_keys(true);

        // One pinned connection: the writer task is the only mutator, and
        // keeping it open keeps the WAL files alive for the readers.
        let writer_pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .connect_with(options.clone())
            .await?;

        sqlx::migrate!("./migrations").run(&writer_pool).await?;

        let readers = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options.read_only(true))
            .await?;

        let (ops, rx) = mpsc::channel(WRITE_QUEUE_DEPTH);
        let writer = tokio::spawn(run_writer(writer_pool, rx));

        info!(path = %path.display(), "State store opened");

        Ok(Self {
            inner: Arc::new(StoreInner {
                readers,
                ops,
                writer: Mutex::new(Some(writer)),
            }),
        })
    }

    async fn submit<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<T>>) -> WriteOp,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.inner
            .ops
            .send(make(tx))
            .await
            .map_err(|_| StoreError::WriterClosed)?;
        rx.await.map_err(|_| StoreError::WriterClosed)?
    }

    // --- Mutations (serialized through the writer task) ---

    /// Bulk-insert URL records as `pending`, ignoring already-known URLs.
    /// Idempotent across reruns. Returns the number of new rows.
    pub async fn seed(&self, records: Vec<SeedUrl>) -> Result<u64> {
        self.submit(|reply| WriteOp::Seed { records, reply }).await
    }

    /// Return every `processing` row to `pending`. Called exactly once at
    /// startup, before the orchestrator begins claiming.
    pub async fn reset_in_flight(&self) -> Result<u64> {
        self.submit(|reply| WriteOp::ResetInFlight { reply }).await
    }

    /// Atomically claim up to `limit` pending URLs, flipping them to
    /// `processing`. Two concurrent claimants never receive the same row.
    pub async fn claim_next(&self, limit: u32) -> Result<Vec<UrlRecord>> {
        self.submit(|reply| WriteOp::ClaimNext { limit, reply }).await
    }

    /// Record a successful extraction: inserts the article and marks the URL
    /// `success` in one transaction, or marks it `duplicate` when the
    /// content hash is already present.
    pub async fn record_success(
        &self,
        article: NewArticle,
        extractor_used: &str,
    ) -> Result<SuccessOutcome> {
        let extractor_used = extractor_used.to_string();
        self.submit(|reply| WriteOp::RecordSuccess {
            article,
            extractor_used,
            reply,
        })
        .await
    }

    /// Record a terminal failure classification; increments `attempt_count`.
    pub async fn record_failure(&self, update: FailureUpdate) -> Result<()> {
        self.submit(|reply| WriteOp::RecordFailure { update, reply })
            .await
    }

    /// Insert or reactivate proxy endpoints after validation.
    pub async fn proxy_upsert(&self, endpoints: Vec<ProxyEndpoint>) -> Result<()> {
        self.submit(|reply| WriteOp::ProxyUpsert { endpoints, reply })
            .await
    }

    /// Record one observed proxy outcome; returns the new consecutive
    /// failure count.
    pub async fn proxy_record_outcome(
        &self,
        endpoint: ProxyEndpoint,
        success: bool,
    ) -> Result<i64> {
        self.submit(|reply| WriteOp::ProxyOutcome {
            endpoint,
            success,
            reply,
        })
        .await
    }

    /// Remove a proxy from the active set.
    pub async fn retire_proxy(&self, endpoint: ProxyEndpoint) -> Result<()> {
        self.submit(|reply| WriteOp::RetireProxy { endpoint, reply })
            .await
    }

    /// Stop the writer task after draining queued ops. Mutations submitted
    /// after this resolve to `WriterClosed`.
    pub async fn close(&self) {
        let (tx, rx) = oneshot::channel();
        if self
            .inner
            .ops
            .send(WriteOp::Shutdown { reply: tx })
            .await
            .is_ok()
        {
            let _ = rx.await;
        }
        let handle = self.inner.writer.lock().expect("writer lock").take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    // --- Reads (concurrent, non-blocking against the writer) ---

    pub async fn get_url(&self, normalized_url: &str) -> Result<Option<UrlRecord>> {
        let row = sqlx::query_as::<_, UrlRecord>("SELECT * FROM urls WHERE normalized_url = ?")
            .bind(normalized_url)
            .fetch_optional(&self.inner.readers)
            .await?;
        Ok(row)
    }

    pub async fn get_article_by_url(
        &self,
        normalized_url: &str,
    ) -> Result<Option<ArticleRecord>> {
        let row =
            sqlx::query_as::<_, ArticleRecord>("SELECT * FROM articles WHERE normalized_url = ?")
                .bind(normalized_url)
                .fetch_optional(&self.inner.readers)
                .await?;
        Ok(row)
    }

    pub async fn count_by_status(&self, status: UrlStatus) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM urls WHERE status = ?")
            .bind(status.to_string())
            .fetch_one(&self.inner.readers)
            .await?;
        Ok(count)
    }

    pub async fn article_count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM articles")
            .fetch_one(&self.inner.readers)
            .await?;
        Ok(count)
    }

    /// Active proxies, least recently validated first.
    pub async fn list_active_proxies(&self) -> Result<Vec<ProxyRecord>> {
        let rows = sqlx::query_as::<_, ProxyRecord>(
            "SELECT * FROM proxies WHERE is_active = 1 ORDER BY last_validated_at, id",
        )
        .fetch_all(&self.inner.readers)
        .await?;
        Ok(rows)
    }

    /// Grouped counts for the completion summary.
    pub async fn metrics(&self) -> Result<Vec<MetricsRow>> {
        let rows = sqlx::query_as::<_, MetricsRow>(
            r#"
            SELECT source, status, COUNT(*) AS count
            FROM urls
            GROUP BY source, status
            ORDER BY source, status
            "#,
        )
        .fetch_all(&self.inner.readers)
        .await?;
        Ok(rows)
    }

    /// Publish-date span of the successful set, when any dated article exists.
    pub async fn publish_date_range(
        &self,
    ) -> Result<Option<(DateTime<Utc>, DateTime<Utc>)>> {
        let row: Option<(Option<DateTime<Utc>>, Option<DateTime<Utc>>)> = sqlx::query_as(
            "SELECT MIN(publish_date), MAX(publish_date) FROM articles WHERE publish_date IS NOT NULL",
        )
        .fetch_optional(&self.inner.readers)
        .await?;

        Ok(match row {
            Some((Some(min), Some(max))) => Some((min, max)),
            _ => None,
        })
    }
}
