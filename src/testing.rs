//! In-process fakes for the directory and the geo database.

use crate::{
    error::{
        Result,
        TrackerError,
    },
    geo::{
        GeoInfo,
        GeoLookup,
    },
    lobby::{
        Directory,
        DirectoryFuture,
        LobbyServer,
        LobbyServerDetails,
        Platform,
    },
    model::{
        ServerRecord,
        StatisticRollup,
    },
    query::{
        PageRequest,
        RollupRange,
        ServerFilter,
    },
    store::{
        MemoryStore,
        RemovalSummary,
        SnapshotStore,
        StoreFuture,
    },
};
use eyre::eyre;
use std::{
    collections::{
        HashMap,
        HashSet,
    },
    net::IpAddr,
    sync::atomic::{
        AtomicBool,
        AtomicU64,
        AtomicUsize,
        Ordering,
    },
    time::Duration,
};
use tokio::sync::Notify;

pub fn lobby_server(row_id: &str, platform: u8) -> LobbyServer {
    LobbyServer {
        row_id: row_id.to_string(),
        guid: format!("guid-{row_id}"),
        address: "1.2.3.4".to_string(),
        port: 10999,
        platform,
        name: format!("server {row_id}"),
        game_mode: "survival".to_string(),
        intent: "cooperative".to_string(),
        max_connections: 6,
        connected: 1,
        ..Default::default()
    }
}

pub fn record(row_id: &str, created_at: i64) -> ServerRecord {
    ServerRecord {
        row_id: row_id.to_string(),
        name: format!("server {row_id}"),
        address: "1.2.3.4".to_string(),
        platform: 1,
        platform_name: "Steam".to_string(),
        area: "US".to_string(),
        game_mode: "survival".to_string(),
        intent: "cooperative".to_string(),
        max_connections: 6,
        connected: 1,
        region: "us-east-1".to_string(),
        created_at,
        ..Default::default()
    }
}

/// Unknown addresses resolve to blank geo data, like private ranges do.
#[derive(Default)]
pub struct StaticGeo {
    entries: HashMap<IpAddr, GeoInfo>,
    failing: HashSet<IpAddr>,
}

impl StaticGeo {
    pub fn with(mut self, ip: &str, continent: &str, country: &str, city: &str) -> Self {
        self.entries.insert(
            ip.parse().unwrap(),
            GeoInfo {
                continent: continent.to_string(),
                country: country.to_string(),
                city: city.to_string(),
            },
        );
        self
    }

    pub fn failing(mut self, ip: &str) -> Self {
        self.failing.insert(ip.parse().unwrap());
        self
    }
}

impl GeoLookup for StaticGeo {
    fn lookup(&self, ip: IpAddr) -> Result<GeoInfo> {
        if self.failing.contains(&ip) {
            return Err(TrackerError::Upstream(eyre!("geo database unavailable for {ip}")));
        }
        Ok(self.entries.get(&ip).cloned().unwrap_or_default())
    }
}

#[derive(Default)]
pub struct StaticDirectory {
    regions: Vec<String>,
    regions_fail: bool,
    listings: HashMap<(String, Platform), Vec<LobbyServer>>,
    failing: HashSet<(String, Platform)>,
    details: HashMap<(String, String), LobbyServerDetails>,
    delay: Option<Duration>,
    pub calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl StaticDirectory {
    pub fn new(regions: &[&str]) -> Self {
        Self {
            regions: regions.iter().map(|r| r.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn listing(mut self, region: &str, platform: Platform, servers: Vec<LobbyServer>) -> Self {
        self.listings.insert((region.to_string(), platform), servers);
        self
    }

    pub fn failing_listing(mut self, region: &str, platform: Platform) -> Self {
        self.failing.insert((region.to_string(), platform));
        self
    }

    pub fn failing_regions(mut self) -> Self {
        self.regions_fail = true;
        self
    }

    pub fn detail(mut self, region: &str, details: LobbyServerDetails) -> Self {
        self.details
            .insert((region.to_string(), details.server.row_id.clone()), details);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

impl Directory for StaticDirectory {
    fn capable_regions(&self) -> DirectoryFuture<'_, Vec<String>> {
        Box::pin(async move {
            if self.regions_fail {
                return Err(TrackerError::Upstream(eyre!("region list unavailable")));
            }
            Ok(self.regions.clone())
        })
    }

    fn list_servers<'a>(&'a self, region: &'a str, platform: Platform) -> DirectoryFuture<'a, Vec<LobbyServer>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let key = (region.to_string(), platform);
            if self.failing.contains(&key) {
                return Err(TrackerError::Upstream(eyre!("listing {region}-{platform} timed out")));
            }
            Ok(self.listings.get(&key).cloned().unwrap_or_default())
        })
    }

    fn server_details<'a>(
        &'a self,
        region: &'a str,
        row_id: &'a str,
    ) -> DirectoryFuture<'a, Option<LobbyServerDetails>> {
        Box::pin(async move {
            Ok(self
                .details
                .get(&(region.to_string(), row_id.to_string()))
                .cloned())
        })
    }
}

/// A [`MemoryStore`] whose writes can be made to fail.
pub struct FlakyStore {
    pub inner: MemoryStore,
    insert_limit: AtomicUsize,
    rollups_fail: AtomicBool,
    rollup_delay_ms: AtomicU64,
}

impl Default for FlakyStore {
    fn default() -> Self {
        Self {
            inner: MemoryStore::default(),
            insert_limit: AtomicUsize::new(usize::MAX),
            rollups_fail: AtomicBool::new(false),
            rollup_delay_ms: AtomicU64::new(0),
        }
    }
}

impl FlakyStore {
    /// Later inserts store at most `n` records and then fail.
    pub fn fail_inserts_after(&self, n: usize) {
        self.insert_limit.store(n, Ordering::SeqCst);
    }

    pub fn fail_rollups(&self) {
        self.rollups_fail.store(true, Ordering::SeqCst);
    }

    pub fn delay_rollups(&self, delay: Duration) {
        self.rollup_delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }
}

impl SnapshotStore for FlakyStore {
    fn begin_epoch(&self, created_at: i64) -> StoreFuture<'_, ()> {
        self.inner.begin_epoch(created_at)
    }

    fn insert_servers<'a>(&'a self, records: &'a [ServerRecord]) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let limit = self.insert_limit.load(Ordering::SeqCst);
            if records.len() <= limit {
                return self.inner.insert_servers(records).await;
            }
            self.inner.insert_servers(&records[..limit]).await?;
            Err(TrackerError::Storage(eyre!("connection reset after {limit} records")))
        })
    }

    fn complete_epoch(&self, created_at: i64) -> StoreFuture<'_, ()> {
        self.inner.complete_epoch(created_at)
    }

    fn discard_epoch(&self, created_at: i64) -> StoreFuture<'_, ()> {
        self.inner.discard_epoch(created_at)
    }

    fn latest_epoch(&self) -> StoreFuture<'_, Option<i64>> {
        self.inner.latest_epoch()
    }

    fn find_servers<'a>(
        &'a self,
        epoch: i64,
        page: &'a PageRequest,
        filter: &'a ServerFilter,
    ) -> StoreFuture<'a, Vec<ServerRecord>> {
        self.inner.find_servers(epoch, page, filter)
    }

    fn count_servers<'a>(&'a self, epoch: i64, filter: &'a ServerFilter) -> StoreFuture<'a, u64> {
        self.inner.count_servers(epoch, filter)
    }

    fn remove_before(&self, cutoff: i64) -> StoreFuture<'_, RemovalSummary> {
        self.inner.remove_before(cutoff)
    }

    fn insert_rollup<'a>(&'a self, rollup: &'a StatisticRollup) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let delay = self.rollup_delay_ms.load(Ordering::SeqCst);
            if delay > 0 {
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            if self.rollups_fail.load(Ordering::SeqCst) {
                return Err(TrackerError::Storage(eyre!("rollup table unavailable")));
            }
            self.inner.insert_rollup(rollup).await
        })
    }

    fn find_rollups<'a>(&'a self, range: &'a RollupRange) -> StoreFuture<'a, Vec<StatisticRollup>> {
        self.inner.find_rollups(range)
    }
}

/// A [`MemoryStore`] whose inserts park until released, to hold a run in the
/// middle of writing its epoch.
#[derive(Default)]
pub struct GatedStore {
    pub inner: MemoryStore,
    /// Signalled when an insert starts waiting.
    pub entered: Notify,
    pub release: Notify,
}

impl SnapshotStore for GatedStore {
    fn begin_epoch(&self, created_at: i64) -> StoreFuture<'_, ()> {
        self.inner.begin_epoch(created_at)
    }

    fn insert_servers<'a>(&'a self, records: &'a [ServerRecord]) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.entered.notify_one();
            self.release.notified().await;
            self.inner.insert_servers(records).await
        })
    }

    fn complete_epoch(&self, created_at: i64) -> StoreFuture<'_, ()> {
        self.inner.complete_epoch(created_at)
    }

    fn discard_epoch(&self, created_at: i64) -> StoreFuture<'_, ()> {
        self.inner.discard_epoch(created_at)
    }

    fn latest_epoch(&self) -> StoreFuture<'_, Option<i64>> {
        self.inner.latest_epoch()
    }

    fn find_servers<'a>(
        &'a self,
        epoch: i64,
        page: &'a PageRequest,
        filter: &'a ServerFilter,
    ) -> StoreFuture<'a, Vec<ServerRecord>> {
        self.inner.find_servers(epoch, page, filter)
    }

    fn count_servers<'a>(&'a self, epoch: i64, filter: &'a ServerFilter) -> StoreFuture<'a, u64> {
        self.inner.count_servers(epoch, filter)
    }

    fn remove_before(&self, cutoff: i64) -> StoreFuture<'_, RemovalSummary> {
        self.inner.remove_before(cutoff)
    }

    fn insert_rollup<'a>(&'a self, rollup: &'a StatisticRollup) -> StoreFuture<'a, ()> {
        self.inner.insert_rollup(rollup)
    }

    fn find_rollups<'a>(&'a self, range: &'a RollupRange) -> StoreFuture<'a, Vec<StatisticRollup>> {
        self.inner.find_rollups(range)
    }
}
