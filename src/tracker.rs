//! # Tracker
//!
//! The service surface: listing and detail queries, rollup queries, and the
//! collection and retention runs the scheduler triggers.

use crate::{
    collector::FanOutCollector,
    error::{
        Result,
        TrackerError,
    },
    lobby::ServerDetails,
    model::{
        Page,
        ServerRecord,
        StatisticRollup,
    },
    query::{
        ListServersQuery,
        StatisticsQuery,
    },
    statistics,
    store::{
        RemovalSummary,
        SnapshotRepository,
    },
};
use chrono::{
    DateTime,
    DurationRound,
    TimeDelta,
    Utc,
};
use lobby_tracker_config::{
    Config,
    LobbyConfig,
    QueryConfig,
    StatisticsConfig,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::time::Duration;

/// A live listing enriched like a stored one, plus its decoded detail
/// payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerDetailsView {
    #[serde(flatten)]
    pub server: ServerRecord,
    pub details: ServerDetails,
}

/// Epoch timestamp for a run starting at `now`: rounded to the minute, in
/// unix milliseconds.
pub fn epoch_timestamp(now: DateTime<Utc>) -> i64 {
    now.duration_round(TimeDelta::minutes(1))
        .unwrap_or(now)
        .timestamp_millis()
}

/// An epoch that made it into storage, with the rollup still to be saved.
struct StoredEpoch {
    inserted: usize,
    rollup: StatisticRollup,
}

#[derive(Clone)]
pub struct Tracker {
    /// Only needed by collection runs and live detail reads.
    collector: Option<FanOutCollector>,
    repository: SnapshotRepository,
    lobby: LobbyConfig,
    query: QueryConfig,
    statistics: StatisticsConfig,
}

impl Tracker {
    /// A tracker that answers queries and retention over stored snapshots.
    pub fn new(repository: SnapshotRepository, config: &Config) -> Self {
        Self {
            collector: None,
            repository,
            lobby: config.lobby.clone(),
            query: config.query.clone(),
            statistics: config.statistics.clone(),
        }
    }

    pub fn with_collector(mut self, collector: FanOutCollector) -> Self {
        self.collector = Some(collector);
        self
    }

    fn collector(&self) -> Result<&FanOutCollector> {
        self.collector
            .as_ref()
            .ok_or_else(|| TrackerError::configuration("no lobby collector configured"))
    }

    pub fn lobby_config(&self) -> &LobbyConfig {
        &self.lobby
    }

    pub fn repository(&self) -> &SnapshotRepository {
        &self.repository
    }

    pub async fn list_servers(&self, query: &ListServersQuery) -> Result<Page<ServerRecord>> {
        let page = query.page_request(&self.query)?;
        self.repository.query(&page, &query.filter).await
    }

    /// Reads one server live from the directory. Nothing is persisted.
    pub async fn server_details(&self, region: &str, row_id: &str) -> Result<ServerDetailsView> {
        let collector = self.collector()?;
        let raw = collector
            .directory()
            .server_details(region, row_id)
            .await?
            .ok_or_else(|| TrackerError::not_found(format!("server {row_id} in region {region}")))?;

        let details = ServerDetails::decode(&raw)?;
        let server = collector
            .enricher()
            .enrich(raw.server, region, Utc::now().timestamp_millis())?;

        Ok(ServerDetailsView { server, details })
    }

    pub async fn statistics(&self, query: &StatisticsQuery) -> Result<Vec<StatisticRollup>> {
        let range = statistics::rollup_range(query, &self.statistics, Utc::now().timestamp_millis())?;
        self.repository.rollups(&range).await
    }

    /// One collection run stamped with the current minute.
    pub async fn collect(&self, max_concurrency: usize) -> Result<usize> {
        self.collect_at(max_concurrency, epoch_timestamp(Utc::now())).await
    }

    /// Runs [`Tracker::collect`] with a deadline on collecting and storing the
    /// batch. An epoch interrupted by the deadline never becomes visible. The
    /// rollup of a stored epoch is saved after the deadline check.
    pub async fn collect_with_deadline(&self, max_concurrency: usize, deadline: Duration) -> Result<usize> {
        let created_at = epoch_timestamp(Utc::now());
        let stored = tokio::time::timeout(deadline, self.store_epoch(max_concurrency, created_at))
            .await
            .map_err(|_| TrackerError::DeadlineExceeded(deadline))??;
        Ok(self.save_rollup(stored).await)
    }

    /// Collects, stores the batch as epoch `created_at` and records its
    /// rollup. An empty collection stores nothing and keeps the previous
    /// epoch current.
    pub async fn collect_at(&self, max_concurrency: usize, created_at: i64) -> Result<usize> {
        let stored = self.store_epoch(max_concurrency, created_at).await?;
        Ok(self.save_rollup(stored).await)
    }

    async fn store_epoch(&self, max_concurrency: usize, created_at: i64) -> Result<Option<StoredEpoch>> {
        let batch = self.collector()?.collect(max_concurrency, created_at).await?;
        if batch.is_empty() {
            warn!(created_at, "directory returned no servers, keeping the previous epoch");
            return Ok(None);
        }

        let rollup = statistics::summarize(created_at, &batch);
        let inserted = self.repository.insert_epoch(created_at, batch).await?;
        Ok(Some(StoredEpoch { inserted, rollup }))
    }

    /// The epoch stays even without its rollup.
    async fn save_rollup(&self, stored: Option<StoredEpoch>) -> usize {
        let Some(StoredEpoch { inserted, rollup }) = stored else {
            return 0;
        };
        if let Err(e) = self.repository.save_rollup(&rollup).await {
            error!(created_at = rollup.ts, error = %e, "failed to store epoch statistics");
        }
        inserted
    }

    pub async fn clear_expired(&self, ttl: Duration) -> Result<RemovalSummary> {
        self.repository.remove_expired(ttl).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        geo::GeoEnricher,
        lobby::{
            LobbyServer,
            LobbyServerDetails,
            Platform,
            US_EAST_1,
        },
        query::ServerFilter,
        store::{
            MemoryStore,
            SnapshotStore,
        },
        testing::{
            lobby_server,
            FlakyStore,
            StaticDirectory,
            StaticGeo,
        },
    };
    use pretty_assertions::assert_eq;
    use std::{
        collections::BTreeSet,
        sync::Arc,
    };

    const HOUR_MS: i64 = 3_600_000;

    fn tracker(directory: StaticDirectory, store: Arc<dyn SnapshotStore>) -> Tracker {
        let geo = StaticGeo::default().with("1.2.3.4", "NA", "US", "Ashburn");
        let collector = FanOutCollector::new(Arc::new(directory), GeoEnricher::new(Arc::new(geo)));
        Tracker::new(SnapshotRepository::new(store), &Config::default()).with_collector(collector)
    }

    fn cross_platform_directory() -> StaticDirectory {
        StaticDirectory::new(&[US_EAST_1])
            .listing(US_EAST_1, Platform::Steam, vec![lobby_server("A", 1), lobby_server("B", 1)])
            .listing(US_EAST_1, Platform::Psn, vec![lobby_server("A", 2)])
    }

    fn numbered(count: usize) -> Vec<LobbyServer> {
        (0..count).map(|i| lobby_server(&format!("KU_{i:03}"), 1)).collect()
    }

    fn ids(page: &Page<ServerRecord>) -> Vec<&str> {
        page.items.iter().map(|r| r.row_id.as_str()).collect()
    }

    #[test]
    fn epoch_timestamps_round_to_the_minute() {
        let now = DateTime::parse_from_rfc3339("2024-05-01T10:15:31Z")
            .unwrap()
            .with_timezone(&Utc);
        let rounded = DateTime::parse_from_rfc3339("2024-05-01T10:16:00Z").unwrap();
        assert_eq!(epoch_timestamp(now), rounded.timestamp_millis());
    }

    #[tokio::test]
    async fn cross_platform_duplicates_count_once() {
        let tracker = tracker(cross_platform_directory(), Arc::new(MemoryStore::default()));

        let inserted = tracker.collect(4).await.unwrap();
        assert_eq!(inserted, 3);

        let page = tracker.list_servers(&ListServersQuery::default()).await.unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(ids(&page), vec!["A", "B"]);
    }

    #[tokio::test]
    async fn total_follows_the_filter() {
        let mut servers = numbered(4);
        servers[1].name = "Wilson's camp".to_string();
        servers[3].name = "wilson forever".to_string();
        let tracker = tracker(
            StaticDirectory::new(&[US_EAST_1]).listing(US_EAST_1, Platform::Steam, servers),
            Arc::new(MemoryStore::default()),
        );
        tracker.collect(2).await.unwrap();

        let query = ListServersQuery {
            filter: ServerFilter {
                name: Some("WILSON".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let page = tracker.list_servers(&query).await.unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(ids(&page), vec!["KU_001", "KU_003"]);
    }

    #[tokio::test]
    async fn failed_insert_keeps_the_previous_epoch() {
        let store = Arc::new(FlakyStore::default());
        let tracker = tracker(cross_platform_directory(), store.clone());
        tracker.collect_at(4, HOUR_MS).await.unwrap();

        store.fail_inserts_after(2);
        let result = tracker.collect_at(4, 2 * HOUR_MS).await;
        assert!(matches!(result, Err(TrackerError::Storage(_))));

        assert_eq!(tracker.repository().current_epoch().await.unwrap(), Some(HOUR_MS));
        let page = tracker.list_servers(&ListServersQuery::default()).await.unwrap();
        assert!(page.items.iter().all(|r| r.created_at == HOUR_MS));
        assert_eq!(store.inner.record_count().await, 3);
    }

    #[tokio::test]
    async fn failed_collection_stores_nothing() {
        let store = Arc::new(MemoryStore::default());
        let tracker = tracker(
            cross_platform_directory().failing_listing(US_EAST_1, Platform::Switch),
            store.clone(),
        );

        assert!(tracker.collect(4).await.is_err());
        assert_eq!(tracker.repository().current_epoch().await.unwrap(), None);
        assert_eq!(store.record_count().await, 0);
    }

    #[tokio::test]
    async fn pages_cover_every_distinct_server_once() {
        let mut duplicates = numbered(7);
        for server in &mut duplicates {
            server.platform = 2;
        }
        let tracker = tracker(
            StaticDirectory::new(&[US_EAST_1])
                .listing(US_EAST_1, Platform::Steam, numbered(23))
                .listing(US_EAST_1, Platform::Psn, duplicates),
            Arc::new(MemoryStore::default()),
        );
        tracker.collect(3).await.unwrap();

        for size in [1, 4, 5, 10, 23, 100] {
            let mut seen = Vec::new();
            let pages = 23_u32.div_ceil(size);
            for page in 1..=pages {
                let query = ListServersQuery {
                    page: Some(page),
                    size: Some(size),
                    sort: Some("-name".to_string()),
                    ..Default::default()
                };
                let result = tracker.list_servers(&query).await.unwrap();
                assert_eq!(result.total, 23);
                seen.extend(result.items.into_iter().map(|r| r.row_id));
            }

            let distinct: BTreeSet<&String> = seen.iter().collect();
            assert_eq!(seen.len(), 23, "page size {size}");
            assert_eq!(distinct.len(), 23, "page size {size}");
        }
    }

    #[tokio::test]
    async fn invalid_paging_is_rejected_before_storage() {
        let tracker = tracker(cross_platform_directory(), Arc::new(MemoryStore::default()));
        let query = ListServersQuery {
            size: Some(1000),
            ..Default::default()
        };
        assert!(matches!(
            tracker.list_servers(&query).await,
            Err(TrackerError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn rollup_matches_the_collected_batch() {
        let tracker = tracker(cross_platform_directory(), Arc::new(MemoryStore::default()));
        tracker.collect_at(4, 5 * HOUR_MS).await.unwrap();

        let rollups = tracker
            .statistics(&StatisticsQuery {
                until: Some(6 * HOUR_MS),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(rollups.len(), 1);

        let rollup = &rollups[0];
        assert_eq!(rollup.ts, 5 * HOUR_MS);
        assert_eq!(rollup.total_servers, 3);
        assert_eq!(rollup.online_players, 3);
        assert_eq!(rollup.platforms.iter().map(|i| i.total_servers).sum::<u64>(), 3);
        assert_eq!(rollup.areas.iter().map(|i| i.online_players).sum::<u64>(), 3);
        assert_eq!(rollup.platforms[0].label, "Steam");
    }

    #[tokio::test]
    async fn rollup_failure_keeps_the_epoch() {
        let store = Arc::new(FlakyStore::default());
        store.fail_rollups();
        let tracker = tracker(cross_platform_directory(), store);

        assert_eq!(tracker.collect_at(4, HOUR_MS).await.unwrap(), 3);
        assert_eq!(tracker.repository().current_epoch().await.unwrap(), Some(HOUR_MS));
        let rollups = tracker
            .statistics(&StatisticsQuery {
                until: Some(HOUR_MS),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(rollups.is_empty());
    }

    #[tokio::test]
    async fn empty_collection_is_skipped() {
        let store = Arc::new(MemoryStore::default());
        let tracker = tracker(StaticDirectory::new(&[US_EAST_1]), store.clone());

        assert_eq!(tracker.collect(4).await.unwrap(), 0);
        assert_eq!(tracker.repository().current_epoch().await.unwrap(), None);
        let rollups = tracker.statistics(&StatisticsQuery::default()).await.unwrap();
        assert!(rollups.is_empty());
    }

    #[tokio::test]
    async fn retention_removes_only_expired_epochs() {
        let store = Arc::new(MemoryStore::default());
        let tracker = tracker(cross_platform_directory(), store.clone());
        let now = Utc::now().timestamp_millis();
        tracker.collect_at(4, now - 3 * HOUR_MS).await.unwrap();
        tracker.collect_at(4, now - 2 * HOUR_MS).await.unwrap();
        tracker.collect_at(4, now).await.unwrap();
        let before = store.record_count().await as u64;

        let ttl = Duration::from_secs(150 * 60);
        let removed = tracker.clear_expired(ttl).await.unwrap();
        assert_eq!(removed.deleted, 3);
        assert_eq!(removed.deleted + removed.remaining, before);
        assert_eq!(tracker.repository().current_epoch().await.unwrap(), Some(now));

        let again = tracker.clear_expired(ttl).await.unwrap();
        assert_eq!(again.deleted, 0);
        assert_eq!(again.remaining, removed.remaining);
    }

    #[tokio::test]
    async fn deadline_abandons_the_run() {
        let store = Arc::new(MemoryStore::default());
        let tracker = tracker(
            cross_platform_directory().with_delay(Duration::from_millis(500)),
            store.clone(),
        );

        let result = tracker.collect_with_deadline(2, Duration::from_millis(20)).await;
        assert!(matches!(result, Err(TrackerError::DeadlineExceeded(_))));
        assert_eq!(tracker.repository().current_epoch().await.unwrap(), None);
        assert_eq!(store.record_count().await, 0);
    }

    #[tokio::test]
    async fn deadline_spares_a_stored_epoch_with_a_slow_rollup() {
        let store = Arc::new(FlakyStore::default());
        store.delay_rollups(Duration::from_millis(200));
        let tracker = tracker(cross_platform_directory(), store);

        let inserted = tracker.collect_with_deadline(4, Duration::from_millis(50)).await.unwrap();
        assert_eq!(inserted, 3);

        let epoch = tracker.repository().current_epoch().await.unwrap().unwrap();
        let rollups = tracker
            .statistics(&StatisticsQuery {
                until: Some(epoch),
                bucket: Some(Duration::from_secs(60)),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(rollups.iter().map(|r| r.ts).collect::<Vec<_>>(), vec![epoch]);
    }

    #[tokio::test]
    async fn queries_work_without_a_collector() {
        let store = Arc::new(MemoryStore::default());
        tracker(cross_platform_directory(), store.clone())
            .collect_at(4, HOUR_MS)
            .await
            .unwrap();

        let reader = Tracker::new(SnapshotRepository::new(store), &Config::default());
        let page = reader.list_servers(&ListServersQuery::default()).await.unwrap();
        assert_eq!(page.total, 2);
        assert!(matches!(reader.collect(4).await, Err(TrackerError::Configuration(_))));
        assert!(matches!(
            reader.server_details(US_EAST_1, "A").await,
            Err(TrackerError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn details_are_enriched_and_decoded() {
        let raw = LobbyServerDetails {
            server: lobby_server("KU_9", 1),
            data: "return { day=12 }".to_string(),
            ..Default::default()
        };
        let tracker = tracker(
            StaticDirectory::new(&[US_EAST_1]).detail(US_EAST_1, raw),
            Arc::new(MemoryStore::default()),
        );

        let view = tracker.server_details(US_EAST_1, "KU_9").await.unwrap();
        assert_eq!(view.server.area, "US");
        assert_eq!(view.server.platform_name, "Steam");
        assert_eq!(view.details.day, 12);
    }

    #[tokio::test]
    async fn unknown_details_are_not_found() {
        let tracker = tracker(StaticDirectory::new(&[US_EAST_1]), Arc::new(MemoryStore::default()));
        assert!(matches!(
            tracker.server_details(US_EAST_1, "KU_missing").await,
            Err(TrackerError::NotFound(_))
        ));
    }
}
