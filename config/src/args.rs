use std::path::PathBuf;

/// Global overrides shared by every `lobby-tracker` subcommand.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct Args {
    /// Additional configuration file, layered over the user config directory.
    #[clap(long, global = true, value_name = "FILE", env = "LOBBY_TRACKER_CONFIG_FILE")]
    pub config: Option<PathBuf>,

    /// ClickHouse connection URL (e.g., http://clickhouse:8123).
    #[clap(long, global = true, value_name = "URL", env = "LOBBY_TRACKER_CLICKHOUSE_URL")]
    pub clickhouse_url: Option<String>,

    /// Storage backend, `clickhouse` or `memory`.
    #[clap(long, global = true, value_name = "BACKEND")]
    pub backend: Option<String>,

    /// Path to the MaxMind City database.
    #[clap(long, global = true, value_name = "FILE")]
    pub geoip_db: Option<PathBuf>,

    /// Maximum number of concurrent directory requests during a collection.
    #[clap(long, global = true)]
    pub concurrency: Option<u64>,

    /// Enable debug logging for the tracker.
    #[clap(short, long, global = true, action)]
    pub verbose: bool,
}

mod config_ext {
    use super::*;
    use config::{
        Map,
        Source,
        Value,
    };
    use std::collections::HashMap;

    impl Source for Args {
        fn clone_into_box(&self) -> Box<dyn Source + Send + Sync> {
            Box::new((*self).clone())
        }

        fn collect(&self) -> Result<Map<String, Value>, config::ConfigError> {
            let mut cache = HashMap::<String, Value>::new();
            if let Some(url) = &self.clickhouse_url {
                cache.insert("storage.clickhouse.url".to_string(), url.clone().into());
            }
            if let Some(backend) = &self.backend {
                cache.insert("storage.backend".to_string(), backend.clone().into());
            }
            if let Some(path) = &self.geoip_db {
                cache.insert("geoip.database".to_string(), path.display().to_string().into());
            }
            if let Some(concurrency) = self.concurrency {
                cache.insert("lobby.concurrency".to_string(), concurrency.into());
            }
            if self.verbose {
                cache.insert(
                    "log.filter".to_string(),
                    "lobby_tracker=debug,clickhouse=warn,info".to_string().into(),
                );
            }
            Ok(cache)
        }
    }
}

pub fn version() -> String {
    let author = clap::crate_authors!();
    let config_dir_path = crate::get_config_dir().display().to_string();
    let data_dir_path = crate::get_data_dir().display().to_string();

    format!(
        "\
Authors: {author}

Config directory: {config_dir_path}
Data directory: {data_dir_path}"
    )
}
