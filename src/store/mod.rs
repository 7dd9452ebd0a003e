//! # Snapshot Repository
//!
//! Epochs of [`ServerRecord`]s and their [`StatisticRollup`]s, stored behind
//! the [`SnapshotStore`] backend trait.
//!
//! An epoch is written in three steps: its metadata is recorded as in
//! progress, the batch is inserted, and the metadata flips to complete.
//! Listing queries only ever resolve against the latest complete epoch, so a
//! reader racing an insert keeps seeing the previous snapshot. A failed insert
//! discards whatever part of the batch already landed.

pub mod clickhouse_store;
pub mod memory;

use crate::{
    error::Result,
    model::{
        Page,
        ServerRecord,
        StatisticRollup,
    },
    query::{
        PageRequest,
        RollupRange,
        ServerFilter,
    },
};
use chrono::Utc;
pub use clickhouse_store::ClickHouseStore;
pub use memory::MemoryStore;
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    time::Duration,
};

pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Outcome of a retention pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovalSummary {
    pub deleted: u64,
    /// Records left across every remaining epoch.
    pub remaining: u64,
}

/// Storage primitives. Backends keep no policy of their own: the epoch
/// protocol, defaults and cutoffs live in [`SnapshotRepository`].
pub trait SnapshotStore: Send + Sync {
    /// Records `created_at` as in progress. Records already stored under the
    /// same timestamp are dropped, so a rerun within the same minute replaces
    /// the earlier one. Fails with
    /// [`EpochInProgress`](crate::error::TrackerError::EpochInProgress) while
    /// another run is still writing that epoch.
    fn begin_epoch(&self, created_at: i64) -> StoreFuture<'_, ()>;

    fn insert_servers<'a>(&'a self, records: &'a [ServerRecord]) -> StoreFuture<'a, ()>;

    fn complete_epoch(&self, created_at: i64) -> StoreFuture<'_, ()>;

    /// Drops an epoch's metadata and every record stored under it.
    fn discard_epoch(&self, created_at: i64) -> StoreFuture<'_, ()>;

    /// Latest epoch whose status is complete.
    fn latest_epoch(&self) -> StoreFuture<'_, Option<i64>>;

    /// One page of the epoch's records matching `filter`, one record per
    /// `row_id` (the earliest inserted), in `page.sort` order.
    fn find_servers<'a>(
        &'a self,
        epoch: i64,
        page: &'a PageRequest,
        filter: &'a ServerFilter,
    ) -> StoreFuture<'a, Vec<ServerRecord>>;

    /// Distinct `row_id`s of the epoch matching `filter`.
    fn count_servers<'a>(&'a self, epoch: i64, filter: &'a ServerFilter) -> StoreFuture<'a, u64>;

    /// Deletes every record created strictly before `cutoff`.
    fn remove_before(&self, cutoff: i64) -> StoreFuture<'_, RemovalSummary>;

    /// Stores the rollup, replacing any earlier rollup with the same `ts`.
    fn insert_rollup<'a>(&'a self, rollup: &'a StatisticRollup) -> StoreFuture<'a, ()>;

    /// Rollups inside the range, newest first.
    fn find_rollups<'a>(&'a self, range: &'a RollupRange) -> StoreFuture<'a, Vec<StatisticRollup>>;
}

#[derive(Clone)]
pub struct SnapshotRepository {
    store: Arc<dyn SnapshotStore>,
}

impl SnapshotRepository {
    pub fn new(store: Arc<dyn SnapshotStore>) -> Self {
        Self { store }
    }

    /// Persists a whole batch as the epoch `created_at` and returns the number
    /// of inserted records. The epoch only becomes visible once every record
    /// is stored.
    pub async fn insert_epoch(&self, created_at: i64, mut batch: Vec<ServerRecord>) -> Result<usize> {
        for (seq, record) in batch.iter_mut().enumerate() {
            record.created_at = created_at;
            record.seq = seq as u32;
        }

        self.store.begin_epoch(created_at).await?;
        let written = match self.store.insert_servers(&batch).await {
            Ok(()) => self.store.complete_epoch(created_at).await,
            Err(e) => Err(e),
        };

        if let Err(e) = written {
            warn!(created_at, error = %e, "discarding partially written epoch");
            if let Err(discard) = self.store.discard_epoch(created_at).await {
                error!(created_at, error = %discard, "failed to discard epoch");
            }
            return Err(e);
        }

        debug!(created_at, inserted = batch.len(), "epoch complete");
        Ok(batch.len())
    }

    pub async fn current_epoch(&self) -> Result<Option<i64>> {
        self.store.latest_epoch().await
    }

    /// Pages through the current epoch. An empty store yields an empty page.
    pub async fn query(&self, page: &PageRequest, filter: &ServerFilter) -> Result<Page<ServerRecord>> {
        page.validate()?;
        let Some(epoch) = self.store.latest_epoch().await? else {
            return Ok(Page::empty());
        };

        let total = self.store.count_servers(epoch, filter).await?;
        if total <= page.offset() {
            return Ok(Page {
                total,
                items: Vec::new(),
            });
        }
        let items = self.store.find_servers(epoch, page, filter).await?;

        Ok(Page { total, items })
    }

    /// Deletes records older than `now - ttl`.
    pub async fn remove_expired(&self, ttl: Duration) -> Result<RemovalSummary> {
        let cutoff = Utc::now().timestamp_millis() - ttl.as_millis() as i64;
        self.store.remove_before(cutoff).await
    }

    pub async fn save_rollup(&self, rollup: &StatisticRollup) -> Result<()> {
        self.store.insert_rollup(rollup).await
    }

    pub async fn rollups(&self, range: &RollupRange) -> Result<Vec<StatisticRollup>> {
        self.store.find_rollups(range).await
    }
}
