#[macro_use]
extern crate tracing;

mod app_config;
mod args;
pub mod duration;
mod lobby_config;
mod storage_config;

use app_config::{
    get_config_dir,
    get_data_dir,
    AppConfig,
};
pub use args::{
    version,
    Args,
};
use color_eyre::Result;
use eyre::eyre;
pub use lobby_config::{
    parse_schedule,
    LobbyConfig,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    path::PathBuf,
    time::Duration,
};
pub use storage_config::{
    ClickHouseConfig,
    GeoIpConfig,
    StorageBackend,
    StorageConfig,
};

/// Paging defaults applied when a caller leaves page parameters out.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueryConfig {
    pub page_size: u32,
    pub max_page_size: u32,
    pub sort: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StatisticsConfig {
    #[serde(with = "crate::duration")]
    pub bucket: Duration,
    pub tail: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogConfig {
    pub filter: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    #[serde(flatten, skip_serializing)]
    app_config: AppConfig,
    pub lobby: LobbyConfig,
    pub query: QueryConfig,
    pub statistics: StatisticsConfig,
    pub storage: StorageConfig,
    pub geoip: GeoIpConfig,
    pub log: LogConfig,
}

const DEFAULT_CONFIG: &str = include_str!("default-config.yaml");

impl Default for Config {
    fn default() -> Self {
        serde_yml::from_str(DEFAULT_CONFIG).expect("Failed to parse default config")
    }
}

impl Config {
    /// Layers, lowest precedence first: embedded defaults, `config.yaml` in the
    /// config directory, the `--config` file, `LOBBY_TRACKER__*` environment
    /// variables and finally command line overrides.
    pub fn new(args: Args) -> Result<Self, config::ConfigError> {
        let data_dir = get_data_dir();
        let config_dir = get_config_dir();
        let mut builder = config::Config::builder()
            .set_default("data_dir", data_dir.display().to_string())?
            .add_source(config::File::from_str(DEFAULT_CONFIG, config::FileFormat::Yaml));

        let config_files = [("config.yaml", config::FileFormat::Yaml)];

        for (file, format) in &config_files {
            let source = config::File::from(config_dir.join(file))
                .format(*format)
                .required(false);
            builder = builder.add_source(source);
        }

        if let Some(path) = &args.config {
            debug!(path = %path.display(), "Adding explicit config file");
            builder = builder.add_source(config::File::from(path.as_path()).required(true));
        }

        builder = builder
            .add_source(
                config::Environment::with_prefix("LOBBY_TRACKER")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .add_source(args);

        let cfg: Self = builder.build()?.try_deserialize()?;

        Ok(cfg)
    }

    /// Checks the settings that cannot be expressed through types alone.
    pub fn validate(&self) -> Result<()> {
        self.lobby.validate()?;
        if self.query.page_size == 0 || self.query.max_page_size == 0 {
            return Err(eyre!("query page sizes must be greater than zero"));
        }
        if self.query.page_size > self.query.max_page_size {
            return Err(eyre!(
                "query.page_size ({}) exceeds query.max_page_size ({})",
                self.query.page_size,
                self.query.max_page_size
            ));
        }
        if self.statistics.bucket.as_millis() == 0 {
            return Err(eyre!("statistics.bucket must be at least one millisecond"));
        }
        if self.statistics.tail == 0 {
            return Err(eyre!("statistics.tail must be greater than zero"));
        }
        Ok(())
    }

    /// The geo database path. A relative path is looked up in the data
    /// directory.
    pub fn geoip_database(&self) -> PathBuf {
        self.app_config.data_dir.join(&self.geoip.database)
    }
}
