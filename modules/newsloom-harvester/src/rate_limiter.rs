// Per-domain dispatch gate. Acquired by the orchestrator's dispatch loop
// before a worker is chosen, so N workers can never race the same domain;
// a single dispatching caller also makes per-domain acquisition FIFO.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use newsloom_common::config::DEFAULT_DOMAIN_DELAY_SECS;
use tokio::time::Instant;

pub struct RateLimiter {
    delays: HashMap<String, f64>,
    default_delay: f64,
    /// domain → last dispatch timestamp. Critical section is O(1).
    last_dispatch: Mutex<HashMap<String, Instant>>,
}

impl RateLimiter {
    pub fn new(delays: HashMap<String, f64>) -> Self {
        Self {
            delays,
            default_delay: DEFAULT_DOMAIN_DELAY_SECS,
            last_dispatch: Mutex::new(HashMap::new()),
        }
    }

    pub fn delay_for(&self, domain: &str) -> Duration {
        Duration::from_secs_f64(*self.delays.get(domain).unwrap_or(&self.default_delay))
    }

    /// Block until `now >= last_dispatch + delay(domain)`, then take the slot.
    pub async fn acquire(&self, domain: &str) {
        let delay = self.delay_for(domain);
        loop {
            let wait = {
                let mut slots = self.last_dispatch.lock().expect("rate limiter lock");
                let now = Instant::now();
                match slots.get(domain) {
                    Some(last) => {
                        let ready = *last + delay;
                        if now >= ready {
                            slots.insert(domain.to_string(), now);
                            return;
                        }
                        ready - now
                    }
                    None => {
                        slots.insert(domain.to_string(), now);
                        return;
                    }
                }
            };
            tokio::time::sleep(wait).await;
        }
    }
}
