//! # Statistics Aggregator
//!
//! Reduces one epoch's batch into a [`StatisticRollup`] and resolves rollup
//! range queries against the configured defaults.

use crate::{
    error::{
        Result,
        TrackerError,
    },
    model::{
        ServerRecord,
        StatisticItem,
        StatisticRollup,
    },
    query::{
        RollupRange,
        StatisticsQuery,
    },
};
use lobby_tracker_config::StatisticsConfig;
use std::collections::BTreeMap;

#[derive(Default)]
struct Tally {
    servers: u64,
    players: u64,
}

impl Tally {
    fn add(&mut self, record: &ServerRecord) {
        self.servers += 1;
        self.players += u64::from(record.connected);
    }
}

/// Breakdown ordered by server count descending, then label ascending.
fn breakdown(tallies: BTreeMap<&str, Tally>) -> Vec<StatisticItem> {
    let mut items: Vec<StatisticItem> = tallies
        .into_iter()
        .map(|(label, tally)| StatisticItem {
            label: label.to_string(),
            total_servers: tally.servers,
            online_players: tally.players,
        })
        .collect();
    items.sort_by(|a, b| {
        b.total_servers
            .cmp(&a.total_servers)
            .then_with(|| a.label.cmp(&b.label))
    });
    items
}

/// Single pass over the batch. Every record counts, duplicates across
/// platforms included, so the breakdowns always add up to the totals.
pub fn summarize(ts: i64, batch: &[ServerRecord]) -> StatisticRollup {
    let mut total = Tally::default();
    let mut platforms: BTreeMap<&str, Tally> = BTreeMap::new();
    let mut areas: BTreeMap<&str, Tally> = BTreeMap::new();

    for record in batch {
        total.add(record);
        platforms.entry(record.platform_name.as_str()).or_default().add(record);
        areas.entry(record.area.as_str()).or_default().add(record);
    }

    StatisticRollup {
        ts,
        total_servers: total.servers,
        online_players: total.players,
        platforms: breakdown(platforms),
        areas: breakdown(areas),
    }
}

/// Applies defaults: `until` is `now`, `tail` and `bucket` come from the
/// configuration.
pub fn rollup_range(query: &StatisticsQuery, defaults: &StatisticsConfig, now: i64) -> Result<RollupRange> {
    let until = query.until.unwrap_or(now);
    if query.before > until {
        return Err(TrackerError::configuration(format!(
            "range start {} is after its end {until}",
            query.before
        )));
    }

    let tail = query.tail.unwrap_or(defaults.tail);
    if tail == 0 {
        return Err(TrackerError::configuration("tail must be at least 1"));
    }

    let bucket = query.bucket.unwrap_or(defaults.bucket);
    let bucket_ms = i64::try_from(bucket.as_millis()).unwrap_or(i64::MAX);
    if bucket_ms == 0 {
        return Err(TrackerError::configuration("bucket must be at least one millisecond"));
    }

    Ok(RollupRange {
        before: query.before,
        until,
        tail,
        bucket_ms,
    })
}
