use serde::{
    Deserialize,
    Serialize,
};
use std::collections::HashMap;

pub const GAME_ID: &str = "DontStarveTogether";

pub const US_EAST_1: &str = "us-east-1";
pub const AP_EAST_1: &str = "ap-east-1";

/// Platform codes used by the lobby directory. The `Display` form is the
/// spelling the directory accepts in listing URLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[repr(u8)]
pub enum Platform {
    Steam = 1,
    #[strum(serialize = "PSN")]
    Psn = 2,
    /// WeGame, only served from `ap-east-1`.
    Rail = 4,
    #[strum(serialize = "XBone")]
    XBone = 16,
    /// Shows up in listings but is not accepted as a query parameter.
    #[strum(serialize = "PS4Official")]
    Ps4Official = 19,
    Switch = 32,
}

/// Platforms that can be requested from the directory one by one.
pub const EXPLICIT_PLATFORMS: [Platform; 5] = [
    Platform::Steam,
    Platform::Psn,
    Platform::Rail,
    Platform::XBone,
    Platform::Switch,
];

impl Platform {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Steam),
            2 => Some(Self::Psn),
            4 => Some(Self::Rail),
            16 => Some(Self::XBone),
            19 => Some(Self::Ps4Official),
            32 => Some(Self::Switch),
            _ => None,
        }
    }
}

/// Human readable platform label. Rail is the directory's name for WeGame.
pub fn platform_display_name(code: u8) -> &'static str {
    match Platform::from_code(code) {
        Some(Platform::Steam) => "Steam",
        Some(Platform::Rail) => "WeGame",
        Some(Platform::Psn | Platform::Ps4Official) => "PlayStation",
        Some(Platform::XBone) => "Xbox",
        Some(Platform::Switch) => "Switch",
        None => "Unknown",
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegionsResponse {
    #[serde(rename = "LobbyRegions", default)]
    pub regions: Vec<RegionEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegionEntry {
    #[serde(rename = "Region")]
    pub region: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServersResponse<T> {
    #[serde(rename = "GET", default = "Vec::new")]
    pub list: Vec<T>,
}

/// A listing exactly as the directory returns it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LobbyServer {
    pub guid: String,
    #[serde(rename = "__rowId")]
    pub row_id: String,
    #[serde(rename = "steamid")]
    pub steam_id: String,
    #[serde(rename = "steamclanid")]
    pub steam_clan_id: String,
    #[serde(rename = "ownernetid")]
    pub owner_net_id: String,
    #[serde(rename = "steamroom")]
    pub steam_room: String,
    pub session: String,
    #[serde(rename = "__addr")]
    pub address: String,
    pub port: u32,
    pub host: String,
    pub platform: u8,
    #[serde(rename = "clanonly")]
    pub clan_only: bool,
    #[serde(rename = "lanonly")]
    pub lan_only: bool,
    pub secondaries: HashMap<String, Secondary>,

    pub name: String,
    #[serde(rename = "mode")]
    pub game_mode: String,
    pub intent: String,
    pub season: String,
    pub tags: String,
    #[serde(rename = "v")]
    pub version: u32,
    #[serde(rename = "maxconnections")]
    pub max_connections: u32,
    pub connected: u32,

    #[serde(rename = "mods")]
    pub mod_enabled: bool,
    #[serde(rename = "pvp")]
    pub pvp_enabled: bool,
    #[serde(rename = "password")]
    pub has_password: bool,
    #[serde(rename = "dedicated")]
    pub is_dedicated: bool,
    #[serde(rename = "clienthosted")]
    pub client_hosted: bool,
    #[serde(rename = "allownewplayers")]
    pub allow_new_players: bool,
    #[serde(rename = "serverpaused")]
    pub server_paused: bool,
    #[serde(rename = "fo")]
    pub friend_only: bool,
}

/// Secondary shard of a multi-shard server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Secondary {
    pub id: String,
    #[serde(rename = "steamid")]
    pub steam_id: String,
    #[serde(rename = "__addr")]
    pub address: String,
    pub port: u32,
}

/// Detail read for one row id. Repeats the listing fields and adds raw Lua
/// payloads that [`super::details`] decodes.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LobbyServerDetails {
    #[serde(flatten)]
    pub server: LobbyServer,
    pub tick: u32,
    #[serde(rename = "clientmodsoff")]
    pub client_mods_off: bool,
    pub nat: u32,
    pub data: String,
    #[serde(rename = "worldgen")]
    pub world_gen: String,
    pub players: String,
    pub mods_info: Vec<serde_json::Value>,
}
