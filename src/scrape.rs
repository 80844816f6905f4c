use crate::aggregate::max_seeders;
use crate::cancel::CancelToken;
use crate::config::ScrapeConfig;
use crate::consts::{MAX_UDP_CHUNK_SIZE, USER_AGENT};
use crate::infohash::InfoHash;
use crate::tracker::{ScrapeError, Tracker};
use reqwest::Client;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinSet;

/// Queries every tracker in a roster concurrently and merges the answers
#[derive(Debug)]
pub(crate) struct Scraper {
    config: ScrapeConfig,
    client: Client,
}

impl Scraper {
    pub(crate) fn new(config: ScrapeConfig) -> Result<Scraper, ScraperError> {
        if config.trackers.is_empty() {
            return Err(ScraperError::NoTrackers);
        }
        if !(1..=MAX_UDP_CHUNK_SIZE).contains(&config.udp_chunk_size) {
            return Err(ScraperError::BadChunkSize(config.udp_chunk_size));
        }
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(ScraperError::BuildClient)?;
        Ok(Scraper { config, client })
    }

    pub(crate) fn trackers(&self) -> &[Tracker] {
        &self.config.trackers
    }

    /// Return the highest seeder count reported by any tracker for each info
    /// hash, in the same order as `hashes`.  Trackers that fail or are still
    /// in flight when `cancel` fires count as reporting zero.
    pub(crate) async fn scrape(&self, hashes: &[InfoHash], cancel: &CancelToken) -> Vec<u32> {
        let per_tracker = self.scrape_each(hashes, cancel).await;
        max_seeders(hashes.len(), &per_tracker)
    }

    /// Query every tracker concurrently and return one vector of seeder
    /// counts per tracker, in roster order, each aligned with `hashes`
    pub(crate) async fn scrape_each(
        &self,
        hashes: &[InfoHash],
        cancel: &CancelToken,
    ) -> Vec<Vec<u32>> {
        let mut results = vec![vec![0; hashes.len()]; self.config.trackers.len()];
        if hashes.is_empty() {
            return results;
        }
        let hashes = Arc::<[InfoHash]>::from(hashes);
        let mut tasks = JoinSet::new();
        for (i, tracker) in self.config.trackers.iter().enumerate() {
            let task = TrackerTask {
                tracker: tracker.clone(),
                client: self.client.clone(),
                hashes: Arc::clone(&hashes),
                deadline: self.config.deadline,
                udp_chunk_size: self.config.udp_chunk_size,
                cancel: cancel.clone(),
            };
            tasks.spawn(async move { (i, task.run().await) });
        }
        while let Some(r) = tasks.join_next().await {
            match r {
                Ok((i, seeders)) => results[i] = seeders,
                // The slot keeps its zeros.
                Err(e) => tracing::warn!(error = %e, "Tracker task did not complete"),
            }
        }
        results
    }
}

/// The work of querying a single tracker for every info hash
#[derive(Debug)]
struct TrackerTask {
    tracker: Tracker,
    client: Client,
    hashes: Arc<[InfoHash]>,
    deadline: Duration,
    udp_chunk_size: usize,
    cancel: CancelToken,
}

impl TrackerTask {
    async fn run(self) -> Vec<u32> {
        match &self.tracker {
            Tracker::Udp(udp) => {
                let mut seeders = Vec::with_capacity(self.hashes.len());
                for chunk in self.hashes.chunks(self.udp_chunk_size) {
                    seeders.extend(
                        self.exchange(chunk.len(), udp.scrape(chunk, self.deadline))
                            .await,
                    );
                }
                seeders
            }
            Tracker::Http(http) => {
                self.exchange(
                    self.hashes.len(),
                    http.scrape(&self.client, &self.hashes, self.deadline),
                )
                .await
            }
        }
    }

    /// Run a single exchange covering `len` info hashes, degrading failure
    /// or cancellation to all zeros
    async fn exchange<F>(&self, len: usize, fut: F) -> Vec<u32>
    where
        F: Future<Output = Result<Vec<u32>, ScrapeError>> + Send,
    {
        let r = if self.cancel.is_cancelled() {
            Err(ScrapeError::Cancelled)
        } else {
            tokio::select! {
                r = fut => r,
                () = self.cancel.cancelled() => Err(ScrapeError::Cancelled),
            }
        };
        match r {
            Ok(seeders) => {
                tracing::debug!(tracker = %self.tracker, hashes = len, "Scrape succeeded");
                seeders
            }
            Err(e) => {
                let e = anyhow::Error::new(e);
                tracing::debug!(tracker = %self.tracker, hashes = len, "Scrape failed: {e:#}");
                vec![0; len]
            }
        }
    }
}

#[derive(Debug, Error)]
pub(crate) enum ScraperError {
    #[error("no trackers configured")]
    NoTrackers,
    #[error("UDP chunk size must be between 1 and {MAX_UDP_CHUNK_SIZE}, got {0}")]
    BadChunkSize(usize),
    #[error("failed to build HTTP client")]
    BuildClient(#[source] reqwest::Error),
}
