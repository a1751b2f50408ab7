// Health-tracked proxy pool: validated on entry, rotated least-recently-used,
// retired after consecutive failures, refreshed in the background when the
// active set runs low. Health counters are mirrored into the state store so
// they survive restarts.

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use newsloom_common::{ProxyEndpoint, ProxyProtocol};
use newsloom_store::StateStore;
use tracing::{info, warn};

/// A proxy is retired once it fails this many times in a row.
const RETIRE_AFTER: i64 = 3;
/// HEAD-through-the-proxy validation timeout.
const VALIDATION_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct ProxyPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    store: StateStore,
    source_path: PathBuf,
    validation_url: String,
    low_water: usize,
    state: Mutex<PoolState>,
    refreshing: AtomicBool,
}

struct PoolState {
    available: VecDeque<ProxyEndpoint>,
    in_use: HashSet<ProxyEndpoint>,
}

impl ProxyPool {
    /// Load endpoints from the source file, validate each through a HEAD to
    /// the echo endpoint, and persist the surviving set.
    pub async fn load(
        store: StateStore,
        source_path: &Path,
        validation_url: &str,
        low_water: usize,
    ) -> Result<Self> {
        let candidates = parse_source(source_path)?;
        let valid = validate_endpoints(&candidates, validation_url).await;
        info!(
            candidates = candidates.len(),
            valid = valid.len(),
            "Proxy pool loaded"
        );
        store.proxy_upsert(valid.clone()).await?;

        Ok(Self::with_endpoints(
            store,
            source_path.to_path_buf(),
            validation_url.to_string(),
            low_water,
            valid,
        ))
    }

    fn with_endpoints(
        store: StateStore,
        source_path: PathBuf,
        validation_url: String,
        low_water: usize,
        endpoints: Vec<ProxyEndpoint>,
    ) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                store,
                source_path,
                validation_url,
                low_water,
                state: Mutex::new(PoolState {
                    available: endpoints.into(),
                    in_use: HashSet::new(),
                }),
                refreshing: AtomicBool::new(false),
            }),
        }
    }

    /// Active proxies: rotating plus leased. Retired ones are gone for good.
    pub fn active_count(&self) -> usize {
        let state = self.inner.state.lock().expect("proxy pool lock");
        state.available.len() + state.in_use.len()
    }

    /// Lease the least-recently-used proxy. It stays out of rotation until a
    /// failure report returns (or retires) it.
    pub fn get(&self) -> Option<ProxyEndpoint> {
        let leased = {
            let mut state = self.inner.state.lock().expect("proxy pool lock");
            let proxy = state.available.pop_front();
            if let Some(ref p) = proxy {
                state.in_use.insert(p.clone());
            }
            proxy
        };
        if self.active_count() < self.inner.low_water {
            self.spawn_refresh();
        }
        leased
    }

    /// A fetch through this proxy worked; reset its failure streak. The lease
    /// holder keeps the proxy.
    pub async fn report_success(&self, endpoint: &ProxyEndpoint) {
        if let Err(e) = self
            .inner
            .store
            .proxy_record_outcome(endpoint.clone(), true)
            .await
        {
            warn!(proxy = %endpoint, error = %e, "Failed to record proxy success");
        }
    }

    /// A fetch through this proxy failed: the lease ends, the failure streak
    /// grows, and the proxy retires once the streak hits the threshold.
    pub async fn report_failure(&self, endpoint: &ProxyEndpoint) {
        let failures = match self
            .inner
            .store
            .proxy_record_outcome(endpoint.clone(), false)
            .await
        {
            Ok(count) => count,
            Err(e) => {
                warn!(proxy = %endpoint, error = %e, "Failed to record proxy failure");
                0
            }
        };
        let retire = failures >= RETIRE_AFTER;

        {
            let mut state = self.inner.state.lock().expect("proxy pool lock");
            state.in_use.remove(endpoint);
            if !retire {
                state.available.push_back(endpoint.clone());
            }
        }

        if retire {
            warn!(proxy = %endpoint, failures, "Retiring proxy");
            if let Err(e) = self.inner.store.retire_proxy(endpoint.clone()).await {
                warn!(proxy = %endpoint, error = %e, "Failed to retire proxy");
            }
        }

        if self.active_count() < self.inner.low_water {
            self.spawn_refresh();
        }
    }

    /// At most one refresh in flight at a time.
    fn spawn_refresh(&self) {
        if self
            .inner
            .refreshing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        let pool = self.clone();
        tokio::spawn(async move {
            if let Err(e) = pool.refresh().await {
                warn!(error = %e, "Proxy refresh failed");
            }
            pool.inner.refreshing.store(false, Ordering::SeqCst);
        });
    }

    async fn refresh(&self) -> Result<()> {
        info!(active = self.active_count(), "Refreshing proxy pool");
        let candidates = parse_source(&self.inner.source_path)?;
        let valid = validate_endpoints(&candidates, &self.inner.validation_url).await;
        self.inner.store.proxy_upsert(valid.clone()).await?;

        let mut state = self.inner.state.lock().expect("proxy pool lock");
        let known: HashSet<ProxyEndpoint> = state
            .available
            .iter()
            .chain(state.in_use.iter())
            .cloned()
            .collect();
        let fresh: Vec<ProxyEndpoint> = valid
            .into_iter()
            .filter(|p| !known.contains(p))
            .collect();
        let added = fresh.len();
        state.available.extend(fresh);
        drop(state);

        info!(added, active = self.active_count(), "Proxy refresh complete");
        Ok(())
    }
}

/// One endpoint per line: `host:port` (http assumed) or `scheme://host:port`.
/// Blank lines and `#` comments are ignored.
fn parse_source(path: &Path) -> Result<Vec<ProxyEndpoint>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading proxy source {}", path.display()))?;
    Ok(raw.lines().filter_map(parse_proxy_line).collect())
}

fn parse_proxy_line(line: &str) -> Option<ProxyEndpoint> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let (protocol, rest) = match line.split_once("://") {
        Some((scheme, rest)) => (scheme.parse::<ProxyProtocol>().ok()?, rest),
        None => (ProxyProtocol::Http, line),
    };

    let (host, port) = rest.rsplit_once(':')?;
    let port: u16 = port.parse().ok()?;
    if host.is_empty() {
        return None;
    }

    Some(ProxyEndpoint {
        host: host.to_string(),
        port,
        protocol,
    })
}

async fn validate_endpoints(
    candidates: &[ProxyEndpoint],
    validation_url: &str,
) -> Vec<ProxyEndpoint> {
    let checks = candidates.iter().map(|endpoint| async move {
        if validate_endpoint(endpoint, validation_url).await {
            Some(endpoint.clone())
        } else {
            warn!(proxy = %endpoint, "Proxy failed validation, discarding");
            None
        }
    });
    futures::future::join_all(checks)
        .await
        .into_iter()
        .flatten()
        .collect()
}

async fn validate_endpoint(endpoint: &ProxyEndpoint, validation_url: &str) -> bool {
    let Ok(proxy) = reqwest::Proxy::all(endpoint.url()) else {
        return false;
    };
    let Ok(client) = reqwest::Client::builder()
        .proxy(proxy)
        .timeout(VALIDATION_TIMEOUT)
        .build()
    else {
        return false;
    };
    match client.head(validation_url).send().await {
        Ok(resp) => resp.status().is_success(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn pool_with(endpoints: Vec<ProxyEndpoint>, dir: &TempDir) -> (ProxyPool, StateStore) {
        let store = StateStore::open(&dir.path().join("pool.db")).await.unwrap();
        store.proxy_upsert(endpoints.clone()).await.unwrap();
        let pool = ProxyPool::with_endpoints(
            store.clone(),
            dir.path().join("proxies.txt"),
            "https://api.ipify.org".to_string(),
            0,
            endpoints,
        );
        (pool, store)
    }

    fn endpoint(host: &str) -> ProxyEndpoint {
        ProxyEndpoint {
            host: host.to_string(),
            port: 8080,
            protocol: ProxyProtocol::Http,
        }
    }

    #[test]
    fn parse_lines_with_and_without_scheme() {
        assert_eq!(
            parse_proxy_line("10.0.0.1:8080"),
            Some(endpoint("10.0.0.1"))
        );
        let socks = parse_proxy_line("socks5://10.0.0.2:1080").unwrap();
        assert_eq!(socks.protocol, ProxyProtocol::Socks5);
        assert_eq!(socks.port, 1080);
        assert!(parse_proxy_line("# comment").is_none());
        assert!(parse_proxy_line("").is_none());
        assert!(parse_proxy_line("no-port-here").is_none());
        assert!(parse_proxy_line("ftp://10.0.0.3:21").is_none());
    }

    #[tokio::test]
    async fn get_rotates_least_recently_used() {
        let dir = TempDir::new().unwrap();
        let (pool, store) = pool_with(vec![endpoint("a"), endpoint("b")], &dir).await;

        let first = pool.get().unwrap();
        assert_eq!(first.host, "a");
        let second = pool.get().unwrap();
        assert_eq!(second.host, "b");
        assert!(pool.get().is_none(), "both leased");

        // A failure returns the proxy to the back of the rotation.
        pool.report_failure(&first).await;
        assert_eq!(pool.get().unwrap().host, "a");
        store.close().await;
    }

    #[tokio::test]
    async fn three_consecutive_failures_retire_a_proxy() {
        let dir = TempDir::new().unwrap();
        let (pool, store) = pool_with(vec![endpoint("flaky")], &dir).await;

        for _ in 0..2 {
            let p = pool.get().unwrap();
            pool.report_failure(&p).await;
        }
        assert_eq!(pool.active_count(), 1, "still active below threshold");

        let p = pool.get().unwrap();
        pool.report_failure(&p).await;
        assert_eq!(pool.active_count(), 0);
        assert!(pool.get().is_none());
        assert!(store.list_active_proxies().await.unwrap().is_empty());
        store.close().await;
    }

    #[tokio::test]
    async fn success_resets_the_failure_streak() {
        let dir = TempDir::new().unwrap();
        let (pool, store) = pool_with(vec![endpoint("recovers")], &dir).await;

        for _ in 0..2 {
            let p = pool.get().unwrap();
            pool.report_failure(&p).await;
        }
        let p = pool.get().unwrap();
        pool.report_success(&p).await;
        pool.report_failure(&p).await;
        // The earlier streak was wiped by the success, so one more failure
        // is far from the threshold.
        assert_eq!(pool.active_count(), 1);
        store.close().await;
    }
}
