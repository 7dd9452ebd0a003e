use super::{
    lua::{
        self,
        LuaValue,
    },
    types::LobbyServerDetails,
};
use crate::error::{
    Result,
    TrackerError,
};
use serde::{
    Deserialize,
    Serialize,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub name: String,
    pub prefab: String,
    pub net_id: String,
    /// Hex colour code.
    pub colour: String,
    pub event_level: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModInfo {
    pub id: String,
    pub name: String,
    pub version: String,
    pub version_compat: String,
    pub enabled: bool,
}

/// Decoded form of the Lua and array payloads of a detail read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerDetails {
    pub day: u32,
    pub days_elapsed_in_season: u32,
    pub days_left_in_season: u32,
    pub tick: u32,
    pub nat: u32,
    pub client_mods_off: bool,
    pub players: Vec<Player>,
    pub mods: Vec<ModInfo>,
}

impl ServerDetails {
    pub fn decode(raw: &LobbyServerDetails) -> Result<Self> {
        let mut details = ServerDetails {
            tick: raw.tick,
            nat: raw.nat,
            client_mods_off: raw.client_mods_off,
            ..Default::default()
        };

        if let LuaValue::Table(data) = lua::parse(&raw.data).map_err(TrackerError::upstream)? {
            details.day = data.get_number("day") as u32;
            details.days_elapsed_in_season = data.get_number("dayselapsedinseason") as u32;
            details.days_left_in_season = data.get_number("daysleftinseason") as u32;
        }

        if let LuaValue::Table(players) = lua::parse(&raw.players).map_err(TrackerError::upstream)? {
            details.players = players
                .array
                .iter()
                .filter_map(LuaValue::as_table)
                .map(|p| Player {
                    name: p.get_str("name"),
                    prefab: p.get_str("prefab"),
                    net_id: p.get_str("netid"),
                    colour: p.get_str("colour"),
                    event_level: p.get_number("eventlevel") as u32,
                })
                .collect();
        }

        details.mods = decode_mods(&raw.mods_info);
        Ok(details)
    }
}

/// `mods_info` is a flat array of `id, name, version, version_compat, enabled`
/// groups.
fn decode_mods(raw: &[serde_json::Value]) -> Vec<ModInfo> {
    let chunks = raw.chunks_exact(5);
    if !chunks.remainder().is_empty() {
        warn!(len = raw.len(), "mods_info is not a multiple of five entries, ignoring the tail");
    }
    chunks
        .map(|chunk| ModInfo {
            id: json_str(&chunk[0]),
            name: json_str(&chunk[1]),
            version: json_str(&chunk[2]),
            version_compat: json_str(&chunk[3]),
            enabled: chunk[4].as_bool().unwrap_or_default(),
        })
        .collect()
}

fn json_str(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn decodes_lua_and_mod_payloads() {
        let raw = LobbyServerDetails {
            tick: 15,
            data: "return {  day=31, dayselapsedinseason=10, daysleftinseason=5 }".to_string(),
            players: r#"return { { colour="E8E8E8", eventlevel=0, name="Max", netid="KU_1", prefab="wes" } }"#
                .to_string(),
            mods_info: vec![
                json!("workshop-378160973"),
                json!("Global Positions"),
                json!("1.7.3"),
                json!("1.7.3"),
                json!(true),
            ],
            ..Default::default()
        };

        let details = ServerDetails::decode(&raw).unwrap();
        assert_eq!(details.day, 31);
        assert_eq!(details.days_left_in_season, 5);
        assert_eq!(details.tick, 15);
        assert_eq!(details.players.len(), 1);
        assert_eq!(details.players[0].prefab, "wes");
        assert_eq!(
            details.mods,
            vec![ModInfo {
                id: "workshop-378160973".to_string(),
                name: "Global Positions".to_string(),
                version: "1.7.3".to_string(),
                version_compat: "1.7.3".to_string(),
                enabled: true,
            }]
        );
    }

    #[test]
    fn empty_payloads_decode_to_defaults() {
        let details = ServerDetails::decode(&LobbyServerDetails::default()).unwrap();
        assert_eq!(details, ServerDetails::default());
    }

    #[test]
    fn malformed_lua_is_an_upstream_error() {
        let raw = LobbyServerDetails {
            data: "return { day=".to_string(),
            ..Default::default()
        };
        assert!(matches!(ServerDetails::decode(&raw), Err(TrackerError::Upstream(_))));
    }
}
