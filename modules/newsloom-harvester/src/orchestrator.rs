// Drives a run end-to-end: claims pending URLs in batches, gates dispatch on
// the per-domain rate limiter, fans out to a bounded worker pool, and funnels
// every terminal outcome through the store's single writer.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use newsloom_common::{rate_limit_domain, Config, UrlRecord, UrlStatus};
use newsloom_store::{FailureUpdate, StateStore, SuccessOutcome};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use url::Url;

use crate::cascade::ExtractorCascade;
use crate::rate_limiter::RateLimiter;

pub struct Orchestrator {
    store: StateStore,
    limiter: Arc<RateLimiter>,
    cascade: Arc<ExtractorCascade>,
    worker_count: usize,
    claim_batch: u32,
    grace: Duration,
}

impl Orchestrator {
    pub fn new(
        store: StateStore,
        limiter: Arc<RateLimiter>,
        cascade: Arc<ExtractorCascade>,
        config: &Config,
    ) -> Self {
        Self {
            store,
            limiter,
            cascade,
            worker_count: config.worker_count.max(1),
            claim_batch: (config.worker_count.max(1) * 2) as u32,
            grace: Duration::from_secs(config.grace_shutdown_seconds),
        }
    }

    /// Process every pending URL. Returns once the backlog is drained or a
    /// shutdown signal arrives and in-flight workers have been given their
    /// grace period.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        self.store.reset_in_flight().await?;

        let semaphore = Arc::new(Semaphore::new(self.worker_count));
        let mut workers: JoinSet<()> = JoinSet::new();
        let mut interrupted = false;

        'claim: loop {
            if *shutdown.borrow() {
                interrupted = true;
                break;
            }

            let batch = self.store.claim_next(self.claim_batch).await?;
            if batch.is_empty() {
                if workers.is_empty() {
                    break;
                }
                // Backlog is drained (or all claimed); wait for stragglers.
                tokio::select! {
                    _ = workers.join_next() => {}
                    _ = shutdown.changed() => {
                        interrupted = true;
                        break;
                    }
                }
                continue;
            }

            for record in batch {
                if *shutdown.borrow() {
                    // Unclaimed rows of this batch stay `processing` and are
                    // reset on the next startup.
                    interrupted = true;
                    break 'claim;
                }

                // Dispatch-time gate: acquired before a worker is chosen.
                let domain = dispatch_domain(&record.normalized_url);
                self.limiter.acquire(&domain).await;

                let permit = semaphore
                    .clone()
                    .acquire_owned()
                    .await
                    .expect("worker semaphore closed");
                let store = self.store.clone();
                let cascade = Arc::clone(&self.cascade);
                workers.spawn(async move {
                    let _permit = permit;
                    run_worker(store, cascade, record).await;
                });
            }

            // Reap finished workers so the set doesn't accumulate handles.
            while workers.try_join_next().is_some() {}
        }

        if interrupted {
            info!(
                grace_seconds = self.grace.as_secs(),
                in_flight = workers.len(),
                "Shutdown requested; draining in-flight workers"
            );
            let drain = async {
                while workers.join_next().await.is_some() {}
            };
            if tokio::time::timeout(self.grace, drain).await.is_err() {
                warn!(
                    outstanding = workers.len(),
                    "Grace period elapsed; outstanding urls stay in processing for the next startup"
                );
                workers.shutdown().await;
            }
        } else {
            while workers.join_next().await.is_some() {}
        }

        Ok(())
    }
}

fn dispatch_domain(normalized_url: &str) -> String {
    Url::parse(normalized_url)
        .ok()
        .and_then(|u| u.host_str().map(rate_limit_domain))
        .unwrap_or_default()
}

/// One worker: run the cascade and persist the terminal outcome. Total — the
/// orchestrator never sees an error from here.
async fn run_worker(store: StateStore, cascade: Arc<ExtractorCascade>, record: UrlRecord) {
    let url = record.normalized_url.clone();
    let source = record.source.clone();
    let outcome = cascade.process(&record).await;

    match outcome.status {
        UrlStatus::Success => {
            let Some(article) = outcome.article else {
                error!(url, "Success outcome without an article; dropping");
                return;
            };
            let extractor = outcome.extractor_used.as_deref().unwrap_or("primary");
            match store.record_success(article, extractor).await {
                Ok(SuccessOutcome::Inserted { article_id }) => {
                    info!(
                        url,
                        source,
                        status = %UrlStatus::Success,
                        extractor,
                        article_id,
                        "URL finished"
                    );
                }
                Ok(SuccessOutcome::Duplicate { existing_article_id }) => {
                    info!(
                        url,
                        source,
                        status = %UrlStatus::Duplicate,
                        extractor,
                        duplicate_of = existing_article_id,
                        "URL finished"
                    );
                }
                Err(e) => error!(url, error = %e, "Failed to persist success"),
            }
        }
        status => {
            let update = FailureUpdate {
                normalized_url: record.normalized_url,
                status,
                error_message: outcome.error_message.clone(),
                block_reason: outcome.block_reason,
                extractor_used: outcome.extractor_used.clone(),
            };
            if let Err(e) = store.record_failure(update).await {
                error!(url, error = %e, "Failed to persist outcome");
                return;
            }
            info!(
                url,
                source,
                status = %status,
                extractor = outcome.extractor_used.as_deref().unwrap_or("none"),
                reason = outcome
                    .block_reason
                    .map(|r| r.to_string())
                    .unwrap_or_default(),
                error = outcome.error_message.as_deref().unwrap_or(""),
                "URL finished"
            );
        }
    }
}
