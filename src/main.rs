//! # Lobby Tracker - Main Entry Point
//!
//! `serve` runs the collect and clear jobs on their cron schedules. The other
//! subcommands trigger a single run or query the stored snapshots and print
//! the result as a table, or as JSON with `--json`.

use chrono::{
    DateTime,
    Utc,
};
use clap::{
    Parser,
    Subcommand,
};
use color_eyre::Result;
use eyre::eyre;
use lobby_tracker::{
    collector::FanOutCollector,
    geo::{
        GeoEnricher,
        MaxMindGeo,
    },
    lobby::LobbyClient,
    logging,
    query::{
        ListServersQuery,
        ServerFilter,
        ServerType,
        StatisticsQuery,
        TriState,
    },
    report,
    scheduler::Scheduler,
    store::{
        ClickHouseStore,
        MemoryStore,
        SnapshotRepository,
        SnapshotStore,
    },
    Tracker,
};
use lobby_tracker_config::{
    version,
    Args,
    Config,
    StorageBackend,
};
use serde::Serialize;
use std::{
    sync::Arc,
    time::Duration,
};
use tracing::info;

#[derive(Parser)]
#[command(name = "lobby-tracker")]
#[command(about = "Don't Starve Together lobby snapshot tracker")]
#[command(version, long_version = version())]
struct Cli {
    #[command(flatten)]
    args: Args,

    /// Print JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the collect and clear jobs on their schedules until Ctrl-C
    Serve {
        /// Run one collection right away instead of waiting for the first tick
        #[arg(long)]
        collect_now: bool,
    },
    /// Collect one snapshot now
    Collect,
    /// Delete expired snapshots now
    Clear {
        /// Retention window (e.g., "72h"), defaults to `lobby.ttl`
        #[arg(long, value_parser = humantime::parse_duration)]
        ttl: Option<Duration>,
    },
    /// List servers of the current snapshot
    Servers(ServersArgs),
    /// Read one server live from the lobby directory
    Details {
        #[arg(long)]
        region: String,
        #[arg(long)]
        row_id: String,
    },
    /// Show snapshot rollups
    Stats {
        /// Range start (RFC 3339), defaults to the first rollup
        #[arg(long)]
        before: Option<DateTime<Utc>>,
        /// Range end (RFC 3339), defaults to now
        #[arg(long)]
        until: Option<DateTime<Utc>>,
        /// Maximum number of rollups
        #[arg(long)]
        tail: Option<u32>,
        /// Keep only rollups on multiples of this duration (e.g., "1h")
        #[arg(long, value_parser = humantime::parse_duration)]
        bucket: Option<Duration>,
    },
    /// Create the ClickHouse database and tables
    Migrate,
}

#[derive(clap::Args)]
struct ServersArgs {
    #[arg(long)]
    page: Option<u32>,
    #[arg(long)]
    size: Option<u32>,
    /// Sort field, prefix with `-` for descending (e.g., "-online")
    #[arg(long, allow_hyphen_values = true)]
    sort: Option<String>,
    /// Case-insensitive name substring
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    address: Option<String>,
    /// Country code
    #[arg(long)]
    area: Option<String>,
    #[arg(long)]
    intent: Option<String>,
    #[arg(long)]
    game_mode: Option<String>,
    /// Upstream platform code (1 Steam, 2 PSN, 4 Rail, 16 XBone, 32 Switch)
    #[arg(long)]
    platform: Option<u8>,
    /// `dedicated`, `client_hosted` or `steam_clan`
    #[arg(long)]
    server_type: Option<ServerType>,
    /// Comma separated, matches servers carrying any of them
    #[arg(long)]
    tags: Option<String>,
    /// 1 only pvp, -1 no pvp
    #[arg(long, allow_hyphen_values = true)]
    pvp: Option<i8>,
    /// 1 only password protected, -1 only open
    #[arg(long, allow_hyphen_values = true)]
    password: Option<i8>,
    /// 1 only modded, -1 only vanilla
    #[arg(long, allow_hyphen_values = true)]
    mods: Option<i8>,
}

impl From<ServersArgs> for ListServersQuery {
    fn from(args: ServersArgs) -> Self {
        let filter = ServerFilter {
            name: args.name,
            address: args.address,
            area: args.area,
            intent: args.intent,
            game_mode: args.game_mode,
            platform: args.platform,
            server_type: args.server_type,
            pvp: args.pvp.map_or(TriState::Any, TriState::from_flag),
            password: args.password.map_or(TriState::Any, TriState::from_flag),
            mods: args.mods.map_or(TriState::Any, TriState::from_flag),
            ..Default::default()
        };
        let filter = match args.tags.as_deref() {
            Some(tags) => filter.with_tag_list(tags),
            None => filter,
        };

        ListServersQuery {
            page: args.page,
            size: args.size,
            sort: args.sort,
            filter,
        }
    }
}

fn open_store(config: &Config) -> (Arc<dyn SnapshotStore>, Option<ClickHouseStore>) {
    match config.storage.backend {
        StorageBackend::ClickHouse => {
            let store = ClickHouseStore::new(&config.storage.clickhouse);
            (Arc::new(store.clone()), Some(store))
        }
        StorageBackend::Memory => (Arc::new(MemoryStore::default()), None),
    }
}

/// The directory client and geo database, for the commands that reach the
/// lobby directory.
fn open_collector(config: &Config) -> Result<FanOutCollector> {
    let directory = LobbyClient::new(config.lobby.clone())?;
    let geo = MaxMindGeo::open(&config.geoip_database())?;
    Ok(FanOutCollector::new(Arc::new(directory), GeoEnricher::new(Arc::new(geo))))
}

fn print<T: Serialize>(json: bool, value: &T, table: impl FnOnce(&T) -> String) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{}", table(value));
    }
    Ok(())
}

async fn serve(tracker: Tracker, collect_now: bool) -> Result<()> {
    let mut scheduler = Scheduler::new(tracker)?;
    scheduler.start();

    if collect_now {
        scheduler.run_now("collect").await;
    }

    tokio::signal::ctrl_c().await?;
    info!("Interrupted, waiting for running jobs");
    scheduler.stop().await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let config = Config::new(cli.args)?;
    config.validate()?;
    logging::init(&config.log.filter)?;

    info!(backend = %config.storage.backend, "Starting lobby tracker");

    let (store, clickhouse) = open_store(&config);
    let tracker = Tracker::new(SnapshotRepository::new(store), &config);
    let collecting = |tracker: Tracker| -> Result<Tracker> { Ok(tracker.with_collector(open_collector(&config)?)) };

    match cli.command {
        Command::Serve { collect_now } => serve(collecting(tracker)?, collect_now).await?,
        Command::Collect => {
            let tracker = collecting(tracker)?;
            let lobby = tracker.lobby_config();
            let inserted = tracker
                .collect_with_deadline(lobby.concurrency, lobby.collect_timeout)
                .await?;
            print(cli.json, &serde_json::json!({ "inserted": inserted }), |_| {
                format!("Collected {inserted} servers")
            })?;
        }
        Command::Clear { ttl } => {
            let ttl = ttl.unwrap_or(tracker.lobby_config().ttl);
            let summary = tracker.clear_expired(ttl).await?;
            print(cli.json, &summary, report::removal)?;
        }
        Command::Servers(args) => {
            let page = tracker.list_servers(&args.into()).await?;
            print(cli.json, &page, report::servers)?;
        }
        Command::Details { region, row_id } => {
            let view = collecting(tracker)?.server_details(&region, &row_id).await?;
            print(cli.json, &view, report::details)?;
        }
        Command::Stats {
            before,
            until,
            tail,
            bucket,
        } => {
            let query = StatisticsQuery {
                before: before.map_or(0, |t| t.timestamp_millis()),
                until: until.map(|t| t.timestamp_millis()),
                tail,
                bucket,
            };
            let rollups = tracker.statistics(&query).await?;
            print(cli.json, &rollups, |r| report::statistics(r))?;
        }
        Command::Migrate => {
            let clickhouse = clickhouse.ok_or_else(|| eyre!("migrate only applies to the clickhouse backend"))?;
            clickhouse.migrate().await?;
            println!("ClickHouse schema is up to date");
        }
    }

    Ok(())
}
