use clickhouse::Row;
use serde::{
    Deserialize,
    Serialize,
};

/// One lobby listing as seen by one collection run.
///
/// The upstream identity is `row_id`. It is unique per region and platform at
/// one epoch but a server visible under several platform credentials can show
/// up more than once in the same epoch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Row)]
pub struct ServerRecord {
    // network
    pub row_id: String,
    pub guid: String,
    pub steam_id: String,
    pub steam_clan_id: String,
    pub owner_net_id: String,
    pub steam_room: String,
    pub session: String,
    pub address: String,
    pub port: u32,
    pub host: String,
    pub platform: u8,

    // game
    pub name: String,
    pub game_mode: String,
    pub intent: String,
    pub season: String,
    pub version: u32,
    /// Comma joined, as delivered by the directory.
    pub tags: String,
    pub tag_names: Vec<String>,
    pub max_connections: u32,
    pub connected: u32,

    // flags
    pub has_password: bool,
    pub is_dedicated: bool,
    pub client_hosted: bool,
    pub pvp_enabled: bool,
    pub mod_enabled: bool,
    pub allow_new_players: bool,
    pub server_paused: bool,
    pub friend_only: bool,
    pub clan_only: bool,
    pub lan_only: bool,

    // enrichment
    pub region: String,
    pub continent: String,
    pub area: String,
    pub city: String,
    pub platform_name: String,

    /// Epoch timestamp in unix milliseconds, shared by the whole batch.
    pub created_at: i64,
    /// Position inside the inserted batch, assigned by the repository.
    pub seq: u32,
}
