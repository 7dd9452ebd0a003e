//! # Fan-Out Collector
//!
//! Crawls every capable region for every explicit platform under a bounded
//! number of concurrent requests and returns one enriched batch that shares a
//! single `created_at`.
//!
//! Results are fanned in through a buffered stream and merged on the calling
//! task. The first failing pair stops the drain, which drops the remaining
//! in-flight requests and discards everything collected so far: a collection
//! either yields the whole batch or nothing.

use crate::{
    error::{
        Result,
        TrackerError,
    },
    geo::GeoEnricher,
    lobby::{
        Directory,
        Platform,
        EXPLICIT_PLATFORMS,
    },
    model::ServerRecord,
};
use futures::{
    stream,
    StreamExt,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct FanOutCollector {
    directory: Arc<dyn Directory>,
    enricher: GeoEnricher,
}

impl FanOutCollector {
    pub fn new(directory: Arc<dyn Directory>, enricher: GeoEnricher) -> Self {
        Self { directory, enricher }
    }

    pub fn directory(&self) -> &Arc<dyn Directory> {
        &self.directory
    }

    pub fn enricher(&self) -> &GeoEnricher {
        &self.enricher
    }

    pub async fn collect(&self, max_concurrency: usize, created_at: i64) -> Result<Vec<ServerRecord>> {
        if max_concurrency == 0 {
            return Err(TrackerError::configuration("collection concurrency must be at least 1"));
        }

        let regions = self.directory.capable_regions().await?;
        let pairs: Vec<(String, Platform)> = regions
            .iter()
            .flat_map(|region| EXPLICIT_PLATFORMS.iter().map(move |platform| (region.clone(), *platform)))
            .collect();
        debug!(
            regions = regions.len(),
            tasks = pairs.len(),
            max_concurrency,
            created_at,
            "starting lobby fan-out"
        );

        let mut results = stream::iter(pairs)
            .map(|(region, platform)| async move { self.collect_pair(&region, platform, created_at).await })
            .buffer_unordered(max_concurrency);

        let mut batch = Vec::new();
        while let Some(result) = results.next().await {
            batch.extend(result?);
        }

        Ok(batch)
    }

    async fn collect_pair(&self, region: &str, platform: Platform, created_at: i64) -> Result<Vec<ServerRecord>> {
        let servers = self
            .directory
            .list_servers(region, platform)
            .await
            .inspect_err(|e| warn!(region, %platform, error = %e, "lobby listing failed"))?;
        if servers.is_empty() {
            return Ok(Vec::new());
        }
        self.enricher
            .enrich_all(servers, region, created_at)
            .inspect_err(|e| warn!(region, %platform, error = %e, "enriching lobby listing failed"))
    }
}
