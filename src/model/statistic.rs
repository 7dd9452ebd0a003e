use serde::{
    Deserialize,
    Serialize,
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticItem {
    pub label: String,
    pub total_servers: u64,
    pub online_players: u64,
}

/// Aggregate of one epoch. Breakdowns are ordered by `total_servers`
/// descending, then by `label` ascending.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticRollup {
    pub ts: i64,
    pub total_servers: u64,
    pub online_players: u64,
    pub platforms: Vec<StatisticItem>,
    pub areas: Vec<StatisticItem>,
}
