// Bounded pool of headless browser contexts on a dedicated single-threaded
// scheduler. Worker tasks on the main runtime hand off over an mpsc channel
// and suspend on a oneshot reply. Each context is paired with one proxy at
// creation; any render error tears the context down so the next job gets a
// fresh proxy and a clean session.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use browserless_client::{BrowserlessClient, BrowserlessError, ContentOptions, WaitUntil};
use newsloom_common::ProxyEndpoint;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use crate::proxy_pool::ProxyPool;

#[derive(Debug, thiserror::Error)]
pub enum BrowserFetchError {
    #[error("No active proxy available for a browser context")]
    NoProxy,

    #[error("Render failed: {0}")]
    Render(String),

    #[error("Browser render timed out")]
    Timeout,

    #[error("Browser pool is closed")]
    Closed,
}

/// Seam for the browser fallback so cascade tests can inject a fake renderer.
#[async_trait]
pub trait RenderedFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, BrowserFetchError>;
}

#[derive(Debug, Clone)]
pub struct BrowserPoolConfig {
    pub size: usize,
    pub base_url: String,
    pub token: Option<String>,
    pub timeout: Duration,
}

struct RenderJob {
    url: String,
    reply: oneshot::Sender<Result<String, BrowserFetchError>>,
}

pub struct BrowserPool {
    jobs: Mutex<Option<mpsc::Sender<RenderJob>>>,
    thread: Mutex<Option<std::thread::JoinHandle<()>>>,
    timeout: Duration,
}

impl BrowserPool {
    /// Spawn the pool scheduler thread. Contexts are created lazily, up to
    /// `config.size`, as jobs arrive.
    pub fn start(
        config: BrowserPoolConfig,
        proxies: Option<ProxyPool>,
    ) -> anyhow::Result<Self> {
        let (tx, rx) = mpsc::channel::<RenderJob>(config.size.max(1) * 2);
        let timeout = config.timeout;

        let thread = std::thread::Builder::new()
            .name("browser-pool".to_string())
            .spawn(move || {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .expect("browser pool runtime");
                runtime.block_on(run_pool(config, proxies, rx));
            })?;

        Ok(Self {
            jobs: Mutex::new(Some(tx)),
            thread: Mutex::new(Some(thread)),
            timeout,
        })
    }

    /// Stop accepting jobs, let queued renders finish, and join the scheduler
    /// thread. All browser contexts end with it.
    pub fn close(&self) {
        self.jobs.lock().expect("browser pool lock").take();
        let handle = self.thread.lock().expect("browser pool lock").take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("Browser pool thread panicked during shutdown");
            } else {
                info!("Browser pool closed");
            }
        }
    }
}

impl Drop for BrowserPool {
    fn drop(&mut self) {
        // Dropping the sender ends the scheduler even if close() was skipped.
        self.jobs.lock().expect("browser pool lock").take();
    }
}

#[async_trait]
impl RenderedFetcher for BrowserPool {
    async fn fetch(&self, url: &str) -> Result<String, BrowserFetchError> {
        let sender = self
            .jobs
            .lock()
            .expect("browser pool lock")
            .clone()
            .ok_or(BrowserFetchError::Closed)?;

        let (tx, rx) = oneshot::channel();
        sender
            .send(RenderJob {
                url: url.to_string(),
                reply: tx,
            })
            .await
            .map_err(|_| BrowserFetchError::Closed)?;

        // The render itself is capped on the pool side; double it here to
        // cover time spent queued behind busy contexts.
        match tokio::time::timeout(self.timeout * 2, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(BrowserFetchError::Closed),
            Err(_) => Err(BrowserFetchError::Timeout),
        }
    }
}

async fn run_pool(
    config: BrowserPoolConfig,
    proxies: Option<ProxyPool>,
    jobs: mpsc::Receiver<RenderJob>,
) {
    info!(
        contexts = config.size,
        base_url = %config.base_url,
        "Browser pool scheduler started"
    );

    let jobs = Arc::new(tokio::sync::Mutex::new(jobs));
    let mut contexts = Vec::with_capacity(config.size);
    for id in 0..config.size.max(1) {
        contexts.push(tokio::spawn(context_worker(
            id,
            config.clone(),
            proxies.clone(),
            Arc::clone(&jobs),
        )));
    }
    for context in contexts {
        let _ = context.await;
    }
}

/// One browser context: a rendering client bound to a single proxy. Lives
/// until a render fails, then is torn down and rebuilt on the next job.
struct BrowserContext {
    client: BrowserlessClient,
    proxy: Option<ProxyEndpoint>,
}

async fn context_worker(
    id: usize,
    config: BrowserPoolConfig,
    proxies: Option<ProxyPool>,
    jobs: Arc<tokio::sync::Mutex<mpsc::Receiver<RenderJob>>>,
) {
    let mut context: Option<BrowserContext> = None;

    loop {
        // Lock is held only while waiting for the next job; renders run
        // concurrently across contexts.
        let job = { jobs.lock().await.recv().await };
        let Some(job) = job else { break };

        if context.is_none() {
            let proxy = match &proxies {
                Some(pool) => match pool.get() {
                    Some(p) => Some(p),
                    None => {
                        warn!(context = id, url = %job.url, "No proxy for browser context");
                        let _ = job.reply.send(Err(BrowserFetchError::NoProxy));
                        continue;
                    }
                },
                None => None,
            };
            info!(context = id, proxy = ?proxy.as_ref().map(|p| p.to_string()), "Browser context created");
            context = Some(BrowserContext {
                client: BrowserlessClient::new(&config.base_url, config.token.as_deref()),
                proxy,
            });
        }

        let ctx = context.as_ref().expect("context just ensured");
        let options = ContentOptions {
            proxy: ctx.proxy.as_ref().map(|p| p.url()),
            timeout: config.timeout,
            wait_until: WaitUntil::NetworkIdle2,
        };

        match ctx.client.content(&job.url, &options).await {
            Ok(html) => {
                if let (Some(pool), Some(proxy)) = (&proxies, &ctx.proxy) {
                    pool.report_success(proxy).await;
                }
                let _ = job.reply.send(Ok(html));
            }
            Err(e) => {
                warn!(context = id, url = %job.url, error = %e, "Render failed, recycling context");
                if let (Some(pool), Some(proxy)) = (&proxies, &ctx.proxy) {
                    pool.report_failure(proxy).await;
                }
                let result = match e {
                    BrowserlessError::Timeout(_) => Err(BrowserFetchError::Timeout),
                    other => Err(BrowserFetchError::Render(other.to_string())),
                };
                let _ = job.reply.send(result);
                // Teardown: next job on this context binds a fresh proxy.
                context = None;
            }
        }
    }
}
