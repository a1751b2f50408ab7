pub mod error;

pub use error::{BrowserlessError, Result};

use std::time::Duration;

/// Options applied to a single `/content` render.
#[derive(Debug, Clone)]
pub struct ContentOptions {
    /// Chromium `--proxy-server` value, e.g. `socks5://10.0.0.1:1080`.
    /// The render session routes all traffic through it.
    pub proxy: Option<String>,
    /// Navigation timeout. The HTTP request itself gets a small margin on top.
    pub timeout: Duration,
    /// Puppeteer `waitUntil` lifecycle event.
    pub wait_until: WaitUntil,
}

impl Default for ContentOptions {
    fn default() -> Self {
        Self {
            proxy: None,
            timeout: Duration::from_secs(30),
            wait_until: WaitUntil::NetworkIdle2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitUntil {
    Load,
    DomContentLoaded,
    NetworkIdle0,
    NetworkIdle2,
}

impl WaitUntil {
    fn as_str(&self) -> &'static str {
        match self {
            WaitUntil::Load => "load",
            WaitUntil::DomContentLoaded => "domcontentloaded",
            WaitUntil::NetworkIdle0 => "networkidle0",
            WaitUntil::NetworkIdle2 => "networkidle2",
        }
    }
}

/// Client for a Browserless-compatible rendering service. Each `content`
/// call is a fresh browser session on the service side, so two concurrent
/// renders never share cookies or storage.
pub struct BrowserlessClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

/// Margin added to the navigation timeout for the HTTP round trip itself.
const REQUEST_MARGIN: Duration = Duration::from_secs(5);

impl BrowserlessClient {
    pub fn new(base_url: &str, token: Option<&str>) -> Self {
        let client = reqwest::Client::builder()
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.map(String::from),
        }
    }

    /// Fetch fully rendered HTML for a URL via the `/content` endpoint.
    pub async fn content(&self, url: &str, opts: &ContentOptions) -> Result<String> {
        let mut endpoint = format!("{}/content", self.base_url);
        let mut query: Vec<String> = Vec::new();
        if let Some(ref token) = self.token {
            query.push(format!("token={token}"));
        }
        if let Some(ref proxy) = opts.proxy {
            // Launch args ride along as a JSON-encoded query parameter.
            let launch = serde_json::json!({ "args": [format!("--proxy-server={proxy}")] });
            query.push(format!(
                "launch={}",
                urlencode(&launch.to_string())
            ));
        }
        if !query.is_empty() {
            endpoint.push('?');
            endpoint.push_str(&query.join("&"));
        }

        let body = serde_json::json!({
            "url": url,
            "gotoOptions": {
                "waitUntil": opts.wait_until.as_str(),
                "timeout": opts.timeout.as_millis() as u64,
            },
        });

        let resp = self
            .client
            .post(&endpoint)
            .header("Content-Type", "application/json")
            .timeout(opts.timeout + REQUEST_MARGIN)
            .json(&body)
            .send()
            .await
            .map_err(|e| annotate_timeout(e, opts.timeout))?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(BrowserlessError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(resp
            .text()
            .await
            .map_err(|e| annotate_timeout(e, opts.timeout))?)
    }
}

fn annotate_timeout(err: reqwest::Error, timeout: Duration) -> BrowserlessError {
    if err.is_timeout() {
        BrowserlessError::Timeout(timeout.as_secs())
    } else {
        BrowserlessError::Network(err.to_string())
    }
}

/// Minimal percent-encoding for a query parameter value.
fn urlencode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            other => out.push_str(&format!("%{other:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urlencode_escapes_json() {
        let encoded = urlencode(r#"{"args":["--proxy-server=http://1.2.3.4:8080"]}"#);
        assert!(!encoded.contains('{'));
        assert!(!encoded.contains('"'));
        assert!(encoded.contains("proxy-server"));
    }

    #[test]
    fn wait_until_strings() {
        assert_eq!(WaitUntil::NetworkIdle2.as_str(), "networkidle2");
        assert_eq!(WaitUntil::DomContentLoaded.as_str(), "domcontentloaded");
    }
}
