//! Subscription retrieval: one attempt per URL per run, bounded concurrency,
//! no retries on the wire. The reputation engine provides the retry signal
//! across runs.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::cancel::CancelToken;
use crate::settings::Settings;

const MAX_REDIRECTS: usize = 5;
const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

#[derive(Debug, Clone)]
pub struct FetchResult {
    pub url: String,
    pub body: Option<String>,
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

impl FetchResult {
    pub fn ok(&self) -> bool {
        self.body.is_some()
    }
}

pub struct Fetcher {
    client: reqwest::Client,
    concurrency: usize,
}

impl Fetcher {
    pub fn new(settings: &Settings) -> anyhow::Result<Self> {
        // Certificate verification is deliberately off: many subscription
        // hosts serve self-signed or expired certificates. Tighten here if
        // your sources are trusted.
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .timeout(Duration::from_secs(settings.subscription_fetch_timeout_s))
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            concurrency: settings.fetcher_concurrency.max(1),
        })
    }

    /// Fetch every URL once. Output order matches input order.
    pub async fn fetch_all(&self, urls: &[String], cancel: &CancelToken) -> Vec<FetchResult> {
        let limit = Arc::new(Semaphore::new(self.concurrency));
        let tasks = urls.iter().map(|url| {
            let url = url.clone();
            let limit = limit.clone();
            let cancel = cancel.clone();
            async move {
                let _permit = limit.acquire_owned().await.expect("semaphore open");
                let start = Instant::now();
                if cancel.is_cancelled() {
                    return FetchResult {
                        url,
                        body: None,
                        error: Some("cancelled".into()),
                        elapsed_ms: 0,
                    };
                }
                let outcome = tokio::select! {
                    res = self.fetch_one(&url) => res,
                    _ = cancel.cancelled() => Err("cancelled".into()),
                };
                let elapsed_ms = start.elapsed().as_millis() as u64;
                match outcome {
                    Ok(body) => {
                        info!("fetched {} ({} bytes, {}ms)", url, body.len(), elapsed_ms);
                        FetchResult {
                            url,
                            body: Some(body),
                            error: None,
                            elapsed_ms,
                        }
                    }
                    Err(reason) => {
                        warn!("fetch failed for {}: {}", url, reason);
                        FetchResult {
                            url,
                            body: None,
                            error: Some(reason),
                            elapsed_ms,
                        }
                    }
                }
            }
        });
        join_all(tasks).await
    }

    async fn fetch_one(&self, url: &str) -> Result<String, String> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        let status = resp.status();
        if !status.is_success() {
            return Err(format!("http status {status}"));
        }
        // subscription bodies are occasionally mislabeled or mixed-encoding
        let bytes = resp.bytes().await.map_err(|e| e.to_string())?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}
