// The single writer task. Every mutation of the store flows through here as a
// WriteOp; each op commits its own transaction before the sender is acked, so
// a caller that observes Ok has a durable write behind it.

use chrono::Utc;
use newsloom_common::{BlockReason, NewArticle, ProxyEndpoint, SeedUrl, UrlRecord, UrlStatus};
use sqlx::SqlitePool;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info};

use crate::error::{Result, StoreError};
use crate::store::SuccessOutcome;

/// Seed batches are committed in chunks of this size; a crash mid-seed loses
/// at most one chunk, and re-seeding is idempotent anyway.
const SEED_CHUNK: usize = 100;

/// Terminal failure fields applied to a urls row in one update.
#[derive(Debug, Clone)]
pub struct FailureUpdate {
    pub normalized_url: String,
    pub status: UrlStatus,
    pub error_message: Option<String>,
    pub block_reason: Option<BlockReason>,
    pub extractor_used: Option<String>,
}

pub(crate) enum WriteOp {
    Seed {
        records: Vec<SeedUrl>,
        reply: oneshot::Sender<Result<u64>>,
    },
    ResetInFlight {
        reply: oneshot::Sender<Result<u64>>,
    },
    ClaimNext {
        limit: u32,
        reply: oneshot::Sender<Result<Vec<UrlRecord>>>,
    },
    RecordSuccess {
        article: NewArticle,
        extractor_used: String,
        reply: oneshot::Sender<Result<SuccessOutcome>>,
    },
    RecordFailure {
        update: FailureUpdate,
        reply: oneshot::Sender<Result<()>>,
    },
    ProxyUpsert {
        endpoints: Vec<ProxyEndpoint>,
        reply: oneshot::Sender<Result<()>>,
    },
    ProxyOutcome {
        endpoint: ProxyEndpoint,
        success: bool,
        reply: oneshot::Sender<Result<i64>>,
    },
    RetireProxy {
        endpoint: ProxyEndpoint,
        reply: oneshot::Sender<Result<()>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

pub(crate) async fn run_writer(pool: SqlitePool, mut ops: mpsc::Receiver<WriteOp>) {
    while let Some(op) = ops.recv().await {
        match op {
            WriteOp::Seed { records, reply } => {
                let _ = reply.send(seed(&pool, records).await);
            }
            WriteOp::ResetInFlight { reply } => {
                let _ = reply.send(reset_in_flight(&pool).await);
            }
            WriteOp::ClaimNext { limit, reply } => {
                let _ = reply.send(claim_next(&pool, limit).await);
            }
            WriteOp::RecordSuccess {
                article,
                extractor_used,
                reply,
            } => {
                let _ = reply.send(record_success(&pool, article, &extractor_used).await);
            }
            WriteOp::RecordFailure { update, reply } => {
                let _ = reply.send(record_failure(&pool, update).await);
            }
            WriteOp::ProxyUpsert { endpoints, reply } => {
                let _ = reply.send(proxy_upsert(&pool, endpoints).await);
            }
            WriteOp::ProxyOutcome {
                endpoint,
                success,
                reply,
            } => {
                let _ = reply.send(proxy_outcome(&pool, &endpoint, success).await);
            }
            WriteOp::RetireProxy { endpoint, reply } => {
                let _ = reply.send(retire_proxy(&pool, &endpoint).await);
            }
            WriteOp::Shutdown { reply } => {
                let _ = reply.send(());
                break;
            }
        }
    }
    info!("Store writer task stopped");
}

async fn seed(pool: &SqlitePool, records: Vec<SeedUrl>) -> Result<u64> {
    let mut inserted = 0u64;
    for chunk in records.chunks(SEED_CHUNK) {
        let mut tx = pool.begin().await?;
        for rec in chunk {
            let result = sqlx::query(
                r#"
                INSERT INTO urls
                    (normalized_url, source, status, attempt_count,
                     gdelt_publish_date, gdelt_themes, gdelt_tone)
                VALUES (?, ?, 'pending', 0, ?, ?, ?)
                ON CONFLICT(normalized_url) DO NOTHING
                "#,
            )
            .bind(&rec.normalized_url)
            .bind(&rec.source)
            .bind(rec.gdelt_publish_date)
            .bind(&rec.gdelt_themes)
            .bind(&rec.gdelt_tone)
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected();
        }
        tx.commit().await?;
    }
    Ok(inserted)
}

async fn reset_in_flight(pool: &SqlitePool) -> Result<u64> {
    let result = sqlx::query("UPDATE urls SET status = 'pending' WHERE status = 'processing'")
        .execute(pool)
        .await?;
    if result.rows_affected() > 0 {
        info!(
            reset = result.rows_affected(),
            "Reset in-flight urls from previous run"
        );
    }
    Ok(result.rows_affected())
}

/// Read-and-flip in one statement so no two claimants can see the same row.
async fn claim_next(pool: &SqlitePool, limit: u32) -> Result<Vec<UrlRecord>> {
    let claimed = sqlx::query_as::<_, UrlRecord>(
        r#"
        UPDATE urls
        SET status = 'processing', last_attempt_at = ?
        WHERE normalized_url IN (
            SELECT normalized_url FROM urls
            WHERE status = 'pending'
            ORDER BY rowid
            LIMIT ?
        )
        RETURNING *
        "#,
    )
    .bind(Utc::now())
    .bind(limit as i64)
    .fetch_all(pool)
    .await?;

    Ok(claimed)
}

async fn record_success(
    pool: &SqlitePool,
    article: NewArticle,
    extractor_used: &str,
) -> Result<SuccessOutcome> {
    let now = Utc::now();
    let mut tx = pool.begin().await?;

    let exists: Option<i64> =
        sqlx::query_scalar("SELECT 1 FROM urls WHERE normalized_url = ? LIMIT 1")
            .bind(&article.normalized_url)
            .fetch_optional(&mut *tx)
            .await?;
    if exists.is_none() {
        return Err(StoreError::UnknownUrl(article.normalized_url));
    }

    // Content-level dedup: a second URL with the same hash becomes `duplicate`
    // and never produces an articles row.
    let existing: Option<i64> =
        sqlx::query_scalar("SELECT article_id FROM articles WHERE content_hash = ?")
            .bind(&article.content_hash)
            .fetch_optional(&mut *tx)
            .await?;

    if let Some(article_id) = existing {
        sqlx::query(
            r#"
            UPDATE urls
            SET status = 'duplicate', last_attempt_at = ?, extractor_used = ?,
                error_message = NULL, block_reason = NULL
            WHERE normalized_url = ?
            "#,
        )
        .bind(now)
        .bind(extractor_used)
        .bind(&article.normalized_url)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        return Ok(SuccessOutcome::Duplicate {
            existing_article_id: article_id,
        });
    }

    let article_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO articles
            (normalized_url, source, headline, authors, publish_date,
             publish_date_source, date_divergence, full_text, word_count,
             content_hash, extraction_timestamp)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING article_id
        "#,
    )
    .bind(&article.normalized_url)
    .bind(&article.source)
    .bind(&article.headline)
    .bind(&article.authors)
    .bind(article.publish_date)
    .bind(article.publish_date_source.map(|s| s.to_string()))
    .bind(article.date_divergence as i64)
    .bind(&article.full_text)
    .bind(article.word_count)
    .bind(&article.content_hash)
    .bind(now)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        UPDATE urls
        SET status = 'success', last_attempt_at = ?, extractor_used = ?,
            error_message = NULL, block_reason = NULL
        WHERE normalized_url = ?
        "#,
    )
    .bind(now)
    .bind(extractor_used)
    .bind(&article.normalized_url)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(SuccessOutcome::Inserted { article_id })
}

async fn record_failure(pool: &SqlitePool, update: FailureUpdate) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE urls
        SET status = ?, error_message = ?, block_reason = ?, extractor_used = ?,
            attempt_count = attempt_count + 1, last_attempt_at = ?
        WHERE normalized_url = ?
        "#,
    )
    .bind(update.status.to_string())
    .bind(&update.error_message)
    .bind(update.block_reason.map(|r| r.to_string()))
    .bind(&update.extractor_used)
    .bind(Utc::now())
    .bind(&update.normalized_url)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        error!(url = %update.normalized_url, "record_failure for unknown url");
        return Err(StoreError::UnknownUrl(update.normalized_url));
    }
    Ok(())
}

async fn proxy_upsert(pool: &SqlitePool, endpoints: Vec<ProxyEndpoint>) -> Result<()> {
    let now = Utc::now();
    let mut tx = pool.begin().await?;
    for p in &endpoints {
        sqlx::query(
            r#"
            INSERT INTO proxies (host, port, protocol, last_validated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(host, port) DO UPDATE SET
                protocol = excluded.protocol,
                last_validated_at = excluded.last_validated_at,
                consecutive_failure_count = 0,
                is_active = 1
            "#,
        )
        .bind(&p.host)
        .bind(p.port as i64)
        .bind(p.protocol.to_string())
        .bind(now)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(())
}

/// Returns the post-update consecutive failure count so the pool can apply
/// its retirement threshold without a follow-up read.
async fn proxy_outcome(pool: &SqlitePool, endpoint: &ProxyEndpoint, success: bool) -> Result<i64> {
    let sql = if success {
        r#"
        UPDATE proxies
        SET success_count = success_count + 1, consecutive_failure_count = 0
        WHERE host = ? AND port = ?
        RETURNING consecutive_failure_count
        "#
    } else {
        r#"
        UPDATE proxies
        SET consecutive_failure_count = consecutive_failure_count + 1
        WHERE host = ? AND port = ?
        RETURNING consecutive_failure_count
        "#
    };

    let count: Option<i64> = sqlx::query_scalar(sql)
        .bind(&endpoint.host)
        .bind(endpoint.port as i64)
        .fetch_optional(pool)
        .await?;

    Ok(count.unwrap_or(0))
}

async fn retire_proxy(pool: &SqlitePool, endpoint: &ProxyEndpoint) -> Result<()> {
    sqlx::query("UPDATE proxies SET is_active = 0 WHERE host = ? AND port = ?")
        .bind(&endpoint.host)
        .bind(endpoint.port as i64)
        .execute(pool)
        .await?;
    Ok(())
}
