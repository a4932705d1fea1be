//! HTTP access with optional exponential backoff.
//!
//! Every network read in the pipeline goes through the [`Fetch`] trait:
//! - [`HttpFetcher`]: the `reqwest` implementation
//! - [`RetryFetch`]: decorator that retries transient failures of any [`Fetch`]
//!
//! # Retry Strategy
//!
//! ```text
//! delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
//! ```
//!
//! Only errors for which [`Error::is_transient`] holds are retried. With
//! `max_retries == 0` the decorator is a plain pass-through.

use crate::config::RetryConfig;
use crate::error::{Error, Result};
use rand::{Rng, rng};
use reqwest::Client;
use std::fmt;
use std::future::Future;
use std::time::{Duration as StdDuration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, instrument, warn};

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Something that can GET a URL.
pub trait Fetch {
    /// Fetch a page and decode it as text.
    async fn text(&self, url: &str) -> Result<String>;

    /// Fetch a resource as raw bytes.
    async fn bytes(&self, url: &str) -> Result<Vec<u8>>;
}

/// [`Fetch`] backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Build a client, optionally bounding each request by `timeout`.
    pub fn new(timeout: Option<StdDuration>) -> Result<Self> {
        let mut builder = Client::builder().user_agent(USER_AGENT);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(Error::Client)?;
        Ok(Self { client })
    }

    /// Send a GET and keep the response only if its status is 2xx.
    ///
    /// Transport failures become [`Error::Fetch`]; any other status becomes
    /// [`Error::Status`] so the retry layer can tell them apart.
    async fn get(&self, url: &str) -> Result<reqwest::Response> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| Error::Fetch {
                url: url.to_string(),
                source,
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(resp)
    }
}

impl Fetch for HttpFetcher {
    #[instrument(level = "debug", skip(self))]
    async fn text(&self, url: &str) -> Result<String> {
        let body = self
            .get(url)
            .await?
            .text()
            .await
            .map_err(|source| Error::Fetch {
                url: url.to_string(),
                source,
            })?;
        debug!(bytes = body.len(), "Fetched text");
        Ok(body)
    }

    #[instrument(level = "debug", skip(self))]
    async fn bytes(&self, url: &str) -> Result<Vec<u8>> {
        let body = self
            .get(url)
            .await?
            .bytes()
            .await
            .map_err(|source| Error::Fetch {
                url: url.to_string(),
                source,
            })?;
        debug!(bytes = body.len(), "Fetched bytes");
        Ok(body.to_vec())
    }
}

/// Wrapper that adds exponential backoff retry logic to any [`Fetch`] implementation.
pub struct RetryFetch<T> {
    /// The fetcher doing the actual requests.
    inner: T,
    /// Extra attempts after the first one.
    max_retries: usize,
    /// Delay before the first retry (doubles with each attempt).
    base_delay: StdDuration,
    /// Upper bound on any single delay, before jitter.
    max_delay: StdDuration,
}

impl<T: Fetch> RetryFetch<T> {
    /// Wrap `inner` with the backoff policy from `retry`.
    ///
    /// # Arguments
    ///
    /// * `inner` - The fetcher to wrap
    /// * `retry` - Attempt count and delay bounds; `max_retries: 0` makes
    ///   this a pass-through
    ///
    /// # Example
    ///
    /// ```ignore
    /// let http = HttpFetcher::new(Some(Duration::from_secs(30)))?;
    /// let fetcher = RetryFetch::new(http, &config.retry);
    /// ```
    pub fn new(inner: T, retry: &RetryConfig) -> Self {
        Self {
            inner,
            max_retries: retry.max_retries,
            base_delay: StdDuration::from_millis(retry.base_delay_ms),
            max_delay: StdDuration::from_millis(retry.max_delay_ms),
        }
    }

    async fn with_backoff<R, F, Fut>(&self, url: &str, mut op: F) -> Result<R>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<R>>,
    {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            match op().await {
                Ok(resp) => return Ok(resp),
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) => {
                    attempt += 1;
                    let total_dt = total_t0.elapsed();

                    if attempt > self.max_retries {
                        if self.max_retries > 0 {
                            error!(
                                %url,
                                attempt,
                                max = self.max_retries,
                                elapsed_ms_total = total_dt.as_millis(),
                                error = %e,
                                "fetch exhausted retries"
                            );
                        }
                        return Err(e);
                    }

                    let delay = self.delay_for(attempt);
                    warn!(
                        %url,
                        attempt,
                        max = self.max_retries,
                        elapsed_ms_total = total_dt.as_millis(),
                        ?delay,
                        error = %e,
                        "fetch attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }

    fn delay_for(&self, attempt: usize) -> StdDuration {
        let shift = (attempt - 1).min(31) as u32;
        let delay = self.base_delay.saturating_mul(1 << shift).min(self.max_delay);
        let jitter_ms: u64 = rng().random_range(0..=250);
        delay + StdDuration::from_millis(jitter_ms)
    }
}

impl<T> fmt::Debug for RetryFetch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryFetch")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

impl<T: Fetch> Fetch for RetryFetch<T> {
    async fn text(&self, url: &str) -> Result<String> {
        self.with_backoff(url, || self.inner.text(url)).await
    }

    async fn bytes(&self, url: &str) -> Result<Vec<u8>> {
        self.with_backoff(url, || self.inner.bytes(url)).await
    }
}
