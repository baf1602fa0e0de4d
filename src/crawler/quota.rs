//! Quota gate for the shared search budget
//!
//! The external service grants a rolling query budget shared by every request
//! this process makes. The gate blocks the single crawl task until the
//! observed remaining quota is above a safety threshold, sleeping a fixed
//! interval between observations so that refreshes are picked up.

use crate::config::QuotaConfig;
use crate::source::{Clock, QuotaObserver, QuotaStatus, SourceResult};
use std::time::Duration;

/// Blocks until the external quota has headroom
pub struct QuotaGate<O, C> {
    observer: O,
    clock: C,
    threshold: u64,
    interval: Duration,
    sleeps: u64,
}

impl<O: QuotaObserver, C: Clock> QuotaGate<O, C> {
    /// Creates a gate
    ///
    /// # Arguments
    ///
    /// * `observer` - Reads the remaining quota and service status
    /// * `clock` - Sleeps between observations
    /// * `threshold` - Capacity is available only when remaining quota exceeds this
    /// * `interval` - Fixed wait between observations
    pub fn new(observer: O, clock: C, threshold: u64, interval: Duration) -> Self {
        Self {
            observer,
            clock,
            threshold,
            interval,
            sleeps: 0,
        }
    }

    /// Creates a gate from the `[quota]` configuration section
    pub fn from_config(observer: O, clock: C, config: &QuotaConfig) -> Self {
        Self::new(
            observer,
            clock,
            config.threshold,
            Duration::from_secs(config.wait_secs),
        )
    }

    /// Waits until the remaining quota exceeds the threshold
    ///
    /// Logs the service status and the current quota on every call. Errors
    /// while observing the quota are returned to the caller unchanged.
    pub async fn await_capacity(&mut self) -> SourceResult<QuotaStatus> {
        let status = self.observer.service_status().await?;
        tracing::info!("API status: {}", status);

        loop {
            let quota = self.observer.quota().await?;
            tracing::info!(
                "Current rate limit: {}/{} remaining",
                quota.remaining,
                quota.limit
            );

            if quota.remaining > self.threshold {
                return Ok(quota);
            }

            tracing::info!(
                "Remaining API calls {} at or below threshold {}, waiting {} seconds",
                quota.remaining,
                self.threshold,
                self.interval.as_secs()
            );
            self.clock.sleep(self.interval).await;
            self.sleeps += 1;
        }
    }

    /// Waits one full interval, then for capacity
    ///
    /// Used after a transient service error. A throttling error can arrive
    /// while the reported quota still looks healthy (secondary limits), so
    /// the unconditional wait keeps retries from spinning.
    pub async fn backoff(&mut self) -> SourceResult<QuotaStatus> {
        tracing::info!("Backing off for {} seconds", self.interval.as_secs());
        self.clock.sleep(self.interval).await;
        self.sleeps += 1;
        self.await_capacity().await
    }

    /// Total number of sleeps performed by this gate
    pub fn sleeps(&self) -> u64 {
        self.sleeps
    }

    pub fn threshold(&self) -> u64 {
        self.threshold
    }
}
