//! In-process backend. Nothing survives a restart; it backs the `memory`
//! storage setting and the test suite.

use super::{
    RemovalSummary,
    SnapshotStore,
    StoreFuture,
};
use crate::{
    error::TrackerError,
    model::{
        EpochStatus,
        ServerRecord,
        StatisticRollup,
    },
    query::{
        PageRequest,
        RollupRange,
        ServerFilter,
    },
};
use std::collections::{
    BTreeMap,
    HashSet,
};
use tokio::sync::RwLock;

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    servers: Vec<ServerRecord>,
    epochs: BTreeMap<i64, EpochStatus>,
    rollups: BTreeMap<i64, StatisticRollup>,
}

impl Inner {
    /// The epoch's filtered records, first inserted per `row_id`.
    fn distinct(&self, epoch: i64, filter: &ServerFilter) -> Vec<&ServerRecord> {
        let mut matching: Vec<&ServerRecord> = self
            .servers
            .iter()
            .filter(|r| r.created_at == epoch && filter.matches(r))
            .collect();
        matching.sort_by_key(|r| r.seq);

        let mut seen = HashSet::new();
        matching.retain(|r| seen.insert(r.row_id.as_str()));
        matching
    }
}

impl MemoryStore {
    /// Raw record count across every epoch, complete or not.
    pub async fn record_count(&self) -> usize {
        self.inner.read().await.servers.len()
    }
}

impl SnapshotStore for MemoryStore {
    fn begin_epoch(&self, created_at: i64) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut inner = self.inner.write().await;
            if inner.epochs.get(&created_at) == Some(&EpochStatus::InProgress) {
                return Err(TrackerError::EpochInProgress(created_at));
            }
            inner.servers.retain(|r| r.created_at != created_at);
            inner.epochs.insert(created_at, EpochStatus::InProgress);
            Ok(())
        })
    }

    fn insert_servers<'a>(&'a self, records: &'a [ServerRecord]) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.inner.write().await.servers.extend_from_slice(records);
            Ok(())
        })
    }

    fn complete_epoch(&self, created_at: i64) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.inner
                .write()
                .await
                .epochs
                .insert(created_at, EpochStatus::Complete);
            Ok(())
        })
    }

    fn discard_epoch(&self, created_at: i64) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut inner = self.inner.write().await;
            inner.servers.retain(|r| r.created_at != created_at);
            inner.epochs.remove(&created_at);
            Ok(())
        })
    }

    fn latest_epoch(&self) -> StoreFuture<'_, Option<i64>> {
        Box::pin(async move {
            let inner = self.inner.read().await;
            Ok(inner
                .epochs
                .iter()
                .rev()
                .find(|(_, status)| **status == EpochStatus::Complete)
                .map(|(created_at, _)| *created_at))
        })
    }

    fn find_servers<'a>(
        &'a self,
        epoch: i64,
        page: &'a PageRequest,
        filter: &'a ServerFilter,
    ) -> StoreFuture<'a, Vec<ServerRecord>> {
        Box::pin(async move {
            let inner = self.inner.read().await;
            let mut distinct = inner.distinct(epoch, filter);
            distinct.sort_by(|a, b| page.sort.compare(a, b));

            Ok(distinct
                .into_iter()
                .skip(page.offset() as usize)
                .take(page.size as usize)
                .cloned()
                .collect())
        })
    }

    fn count_servers<'a>(&'a self, epoch: i64, filter: &'a ServerFilter) -> StoreFuture<'a, u64> {
        Box::pin(async move { Ok(self.inner.read().await.distinct(epoch, filter).len() as u64) })
    }

    fn remove_before(&self, cutoff: i64) -> StoreFuture<'_, RemovalSummary> {
        Box::pin(async move {
            let mut inner = self.inner.write().await;
            let before = inner.servers.len();
            inner.servers.retain(|r| r.created_at >= cutoff);
            inner.epochs.retain(|created_at, _| *created_at >= cutoff);

            Ok(RemovalSummary {
                deleted: (before - inner.servers.len()) as u64,
                remaining: inner.servers.len() as u64,
            })
        })
    }

    fn insert_rollup<'a>(&'a self, rollup: &'a StatisticRollup) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.inner.write().await.rollups.insert(rollup.ts, rollup.clone());
            Ok(())
        })
    }

    fn find_rollups<'a>(&'a self, range: &'a RollupRange) -> StoreFuture<'a, Vec<StatisticRollup>> {
        Box::pin(async move {
            if range.before > range.until || range.bucket_ms <= 0 {
                return Ok(Vec::new());
            }
            let inner = self.inner.read().await;
            Ok(inner
                .rollups
                .range(range.before..=range.until)
                .rev()
                .filter(|(ts, _)| *ts % range.bucket_ms == 0)
                .take(range.tail as usize)
                .map(|(_, rollup)| rollup.clone())
                .collect())
        })
    }
}
