//! ClickHouse backend.
//!
//! `lobby_servers` is append only and ordered by `(created_at, row_id)`, so
//! every listing query touches a single epoch's parts. Epoch status lives in
//! `lobby_epochs`, a ReplacingMergeTree where the newest `updated_at` wins.
//! Rollups are keyed by `ts` in `lobby_statistics`.

use super::{
    RemovalSummary,
    SnapshotStore,
    StoreFuture,
};
use crate::{
    error::{
        Result,
        TrackerError,
    },
    model::{
        EpochStatus,
        ServerRecord,
        StatisticItem,
        StatisticRollup,
    },
    query::{
        PageRequest,
        RollupRange,
        ServerFilter,
        ServerType,
    },
};
use chrono::Utc;
use clickhouse::{
    query::Query,
    Client,
    Row,
};
use lobby_tracker_config::ClickHouseConfig;
use serde::{
    Deserialize,
    Serialize,
};

const SERVERS_TABLE: &str = "lobby_servers";
const EPOCHS_TABLE: &str = "lobby_epochs";
const STATISTICS_TABLE: &str = "lobby_statistics";

const CREATE_SERVERS: &str = "
    CREATE TABLE IF NOT EXISTS lobby_servers (
        row_id String,
        guid String,
        steam_id String,
        steam_clan_id String,
        owner_net_id String,
        steam_room String,
        session String,
        address String,
        port UInt32,
        host String,
        platform UInt8,
        name String,
        game_mode LowCardinality(String),
        intent LowCardinality(String),
        season LowCardinality(String),
        version UInt32,
        tags String,
        tag_names Array(String),
        max_connections UInt32,
        connected UInt32,
        has_password Bool,
        is_dedicated Bool,
        client_hosted Bool,
        pvp_enabled Bool,
        mod_enabled Bool,
        allow_new_players Bool,
        server_paused Bool,
        friend_only Bool,
        clan_only Bool,
        lan_only Bool,
        region LowCardinality(String),
        continent LowCardinality(String),
        area LowCardinality(String),
        city String,
        platform_name LowCardinality(String),
        created_at Int64,
        seq UInt32,
        INDEX idx_name lower(name) TYPE ngrambf_v1(3, 8192, 3, 0) GRANULARITY 4,
        INDEX idx_area area TYPE bloom_filter GRANULARITY 4,
        INDEX idx_platform_name platform_name TYPE bloom_filter GRANULARITY 4,
        INDEX idx_tag_names tag_names TYPE bloom_filter GRANULARITY 4,
        INDEX idx_game_mode game_mode TYPE bloom_filter GRANULARITY 4,
        INDEX idx_intent intent TYPE bloom_filter GRANULARITY 4
    )
    ENGINE = MergeTree
    ORDER BY (created_at, row_id)
";

const CREATE_EPOCHS: &str = "
    CREATE TABLE IF NOT EXISTS lobby_epochs (
        created_at Int64,
        status UInt8,
        updated_at Int64
    )
    ENGINE = ReplacingMergeTree(updated_at)
    ORDER BY created_at
";

const CREATE_STATISTICS: &str = "
    CREATE TABLE IF NOT EXISTS lobby_statistics (
        ts Int64,
        total_servers UInt64,
        online_players UInt64,
        platforms Array(Tuple(String, UInt64, UInt64)),
        areas Array(Tuple(String, UInt64, UInt64))
    )
    ENGINE = ReplacingMergeTree
    ORDER BY ts
";

#[derive(Debug, Serialize, Deserialize, Row)]
struct EpochRow {
    created_at: i64,
    status: EpochStatus,
    updated_at: i64,
}

impl EpochRow {
    fn new(created_at: i64, status: EpochStatus) -> Self {
        Self {
            created_at,
            status,
            updated_at: Utc::now().timestamp_nanos_opt().unwrap_or_default(),
        }
    }
}

type Breakdown = Vec<(String, u64, u64)>;

#[derive(Debug, Serialize, Deserialize, Row)]
struct RollupRow {
    ts: i64,
    total_servers: u64,
    online_players: u64,
    platforms: Breakdown,
    areas: Breakdown,
}

fn to_breakdown(items: &[StatisticItem]) -> Breakdown {
    items
        .iter()
        .map(|i| (i.label.clone(), i.total_servers, i.online_players))
        .collect()
}

fn from_breakdown(rows: Breakdown) -> Vec<StatisticItem> {
    rows.into_iter()
        .map(|(label, total_servers, online_players)| StatisticItem {
            label,
            total_servers,
            online_players,
        })
        .collect()
}

impl From<&StatisticRollup> for RollupRow {
    fn from(rollup: &StatisticRollup) -> Self {
        Self {
            ts: rollup.ts,
            total_servers: rollup.total_servers,
            online_players: rollup.online_players,
            platforms: to_breakdown(&rollup.platforms),
            areas: to_breakdown(&rollup.areas),
        }
    }
}

impl From<RollupRow> for StatisticRollup {
    fn from(row: RollupRow) -> Self {
        Self {
            ts: row.ts,
            total_servers: row.total_servers,
            online_players: row.online_players,
            platforms: from_breakdown(row.platforms),
            areas: from_breakdown(row.areas),
        }
    }
}

/// A value bound to one `?` of a filter clause.
enum Param {
    Int(i64),
    Str(String),
    Code(u8),
    Flag(bool),
    List(Vec<String>),
}

fn bind_all(query: Query, params: Vec<Param>) -> Query {
    params.into_iter().fold(query, |query, param| match param {
        Param::Int(v) => query.bind(v),
        Param::Str(v) => query.bind(v),
        Param::Code(v) => query.bind(v),
        Param::Flag(v) => query.bind(v),
        Param::List(v) => query.bind(v),
    })
}

/// `WHERE` clause selecting the epoch's rows that match `filter`.
fn filter_clause(epoch: i64, filter: &ServerFilter) -> (String, Vec<Param>) {
    let mut clauses = vec!["created_at = ?".to_string()];
    let mut params = vec![Param::Int(epoch)];

    if let Some(name) = &filter.name {
        clauses.push("positionCaseInsensitiveUTF8(name, ?) > 0".to_string());
        params.push(Param::Str(name.clone()));
    }
    for (column, value) in [
        ("address", &filter.address),
        ("area", &filter.area),
        ("intent", &filter.intent),
        ("game_mode", &filter.game_mode),
    ] {
        if let Some(value) = value {
            clauses.push(format!("{column} = ?"));
            params.push(Param::Str(value.clone()));
        }
    }
    if let Some(platform) = filter.platform {
        clauses.push("platform = ?".to_string());
        params.push(Param::Code(platform));
    }
    if let Some(server_type) = filter.server_type {
        clauses.push(
            match server_type {
                ServerType::Dedicated => "is_dedicated",
                ServerType::ClientHosted => "client_hosted",
                ServerType::SteamClan => "steam_clan_id != ''",
            }
            .to_string(),
        );
    }
    if !filter.tags.is_empty() {
        clauses.push("hasAny(tag_names, ?)".to_string());
        params.push(Param::List(filter.tags.clone()));
    }
    for (column, state) in [
        ("pvp_enabled", filter.pvp),
        ("has_password", filter.password),
        ("mod_enabled", filter.mods),
    ] {
        if let Some(wanted) = state.wanted() {
            clauses.push(format!("{column} = ?"));
            params.push(Param::Flag(wanted));
        }
    }

    (clauses.join(" AND "), params)
}

#[derive(Clone)]
pub struct ClickHouseStore {
    client: Client,
    database: String,
}

impl ClickHouseStore {
    pub fn new(config: &ClickHouseConfig) -> Self {
        let mut client = Client::default()
            .with_url(config.url.clone())
            .with_user(config.user.clone())
            .with_database(config.database.clone());

        if let Some(password) = &config.password {
            client = client.with_password(password.clone());
        }

        Self {
            client,
            database: config.database.clone(),
        }
    }

    /// Creates the database and tables when missing.
    pub async fn migrate(&self) -> Result<()> {
        self.client
            .clone()
            .with_database("default")
            .query(&format!("CREATE DATABASE IF NOT EXISTS {}", self.database))
            .execute()
            .await?;
        for ddl in [CREATE_SERVERS, CREATE_EPOCHS, CREATE_STATISTICS] {
            self.client.query(ddl).execute().await?;
        }
        info!(database = %self.database, "clickhouse schema is up to date");
        Ok(())
    }

    async fn write_epoch(&self, created_at: i64, status: EpochStatus) -> Result<()> {
        let mut insert = self.client.insert(EPOCHS_TABLE)?;
        insert.write(&EpochRow::new(created_at, status)).await?;
        insert.end().await?;
        Ok(())
    }

    async fn delete_epoch_rows(&self, created_at: i64) -> Result<()> {
        self.client
            .query("DELETE FROM lobby_servers WHERE created_at = ?")
            .bind(created_at)
            .execute()
            .await?;
        Ok(())
    }
}

impl SnapshotStore for ClickHouseStore {
    fn begin_epoch(&self, created_at: i64) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            // Check then write: two processes can still both pass within one round trip.
            let status = self
                .client
                .query("SELECT status FROM lobby_epochs FINAL WHERE created_at = ?")
                .bind(created_at)
                .fetch_optional::<u8>()
                .await?;
            if status == Some(EpochStatus::InProgress as u8) {
                return Err(TrackerError::EpochInProgress(created_at));
            }

            self.delete_epoch_rows(created_at).await?;
            self.write_epoch(created_at, EpochStatus::InProgress).await
        })
    }

    fn insert_servers<'a>(&'a self, records: &'a [ServerRecord]) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut insert = self.client.insert(SERVERS_TABLE)?;
            for record in records {
                insert.write(record).await?;
            }
            insert.end().await?;
            Ok(())
        })
    }

    fn complete_epoch(&self, created_at: i64) -> StoreFuture<'_, ()> {
        Box::pin(async move { self.write_epoch(created_at, EpochStatus::Complete).await })
    }

    fn discard_epoch(&self, created_at: i64) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.delete_epoch_rows(created_at).await?;
            self.client
                .query("DELETE FROM lobby_epochs WHERE created_at = ?")
                .bind(created_at)
                .execute()
                .await?;
            Ok(())
        })
    }

    fn latest_epoch(&self) -> StoreFuture<'_, Option<i64>> {
        Box::pin(async move {
            let latest = self
                .client
                .query(
                    "
                    SELECT created_at
                    FROM lobby_epochs FINAL
                    WHERE status = ?
                    ORDER BY created_at DESC
                    LIMIT 1
                ",
                )
                .bind(EpochStatus::Complete as u8)
                .fetch_optional::<i64>()
                .await?;
            Ok(latest)
        })
    }

    fn find_servers<'a>(
        &'a self,
        epoch: i64,
        page: &'a PageRequest,
        filter: &'a ServerFilter,
    ) -> StoreFuture<'a, Vec<ServerRecord>> {
        Box::pin(async move {
            let (clause, params) = filter_clause(epoch, filter);
            let direction = if page.sort.descending { "DESC" } else { "ASC" };
            let sql = format!(
                "
                SELECT ?fields
                FROM (
                    SELECT *
                    FROM {SERVERS_TABLE}
                    WHERE {clause}
                    ORDER BY seq
                    LIMIT 1 BY row_id
                )
                ORDER BY {column} {direction}, row_id ASC
                LIMIT ? OFFSET ?
            ",
                column = page.sort.field.column(),
            );

            let rows = bind_all(self.client.query(&sql), params)
                .bind(page.size)
                .bind(page.offset())
                .fetch_all::<ServerRecord>()
                .await?;
            Ok(rows)
        })
    }

    fn count_servers<'a>(&'a self, epoch: i64, filter: &'a ServerFilter) -> StoreFuture<'a, u64> {
        Box::pin(async move {
            let (clause, params) = filter_clause(epoch, filter);
            let sql = format!("SELECT uniqExact(row_id) FROM {SERVERS_TABLE} WHERE {clause}");
            let total = bind_all(self.client.query(&sql), params)
                .fetch_one::<u64>()
                .await?;
            Ok(total)
        })
    }

    fn remove_before(&self, cutoff: i64) -> StoreFuture<'_, RemovalSummary> {
        Box::pin(async move {
            let deleted = self
                .client
                .query("SELECT count() FROM lobby_servers WHERE created_at < ?")
                .bind(cutoff)
                .fetch_one::<u64>()
                .await?;
            if deleted > 0 {
                self.client
                    .query("DELETE FROM lobby_servers WHERE created_at < ?")
                    .bind(cutoff)
                    .execute()
                    .await?;
            }
            self.client
                .query("DELETE FROM lobby_epochs WHERE created_at < ?")
                .bind(cutoff)
                .execute()
                .await?;

            let remaining = self
                .client
                .query("SELECT count() FROM lobby_servers")
                .fetch_one::<u64>()
                .await?;

            Ok(RemovalSummary { deleted, remaining })
        })
    }

    fn insert_rollup<'a>(&'a self, rollup: &'a StatisticRollup) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut insert = self.client.insert(STATISTICS_TABLE)?;
            insert.write(&RollupRow::from(rollup)).await?;
            insert.end().await?;
            Ok(())
        })
    }

    fn find_rollups<'a>(&'a self, range: &'a RollupRange) -> StoreFuture<'a, Vec<StatisticRollup>> {
        Box::pin(async move {
            let rows = self
                .client
                .query(
                    "
                    SELECT ?fields
                    FROM lobby_statistics FINAL
                    WHERE ts >= ?
                    AND ts <= ?
                    AND ts % ? = 0
                    ORDER BY ts DESC
                    LIMIT ?
                ",
                )
                .bind(range.before)
                .bind(range.until)
                .bind(range.bucket_ms)
                .bind(range.tail)
                .fetch_all::<RollupRow>()
                .await?;

            Ok(rows.into_iter().map(StatisticRollup::from).collect())
        })
    }
}
