use serde::{
    Deserialize,
    Serialize,
};
use std::path::PathBuf;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    ClickHouse,
    Memory,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClickHouseConfig {
    pub url: String,
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    pub database: String,
}

fn default_user() -> String {
    "default".to_string()
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    pub clickhouse: ClickHouseConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GeoIpConfig {
    /// MaxMind City database (`.mmdb`).
    pub database: PathBuf,
}
