//! Filter, sort and paging model for listing queries, plus the validation
//! that runs before any storage access.

use crate::{
    error::{
        Result,
        TrackerError,
    },
    model::ServerRecord,
};
use lobby_tracker_config::QueryConfig;
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    cmp::Ordering,
    str::FromStr,
};

/// Optional boolean filter, `-1` off, `0` ignored, `1` on on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriState {
    #[default]
    Any,
    On,
    Off,
}

impl TriState {
    pub fn from_flag(flag: i8) -> Self {
        match flag.signum() {
            1 => TriState::On,
            -1 => TriState::Off,
            _ => TriState::Any,
        }
    }

    pub fn wanted(self) -> Option<bool> {
        match self {
            TriState::Any => None,
            TriState::On => Some(true),
            TriState::Off => Some(false),
        }
    }

    fn admits(self, value: bool) -> bool {
        self.wanted().is_none_or(|wanted| wanted == value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ServerType {
    Dedicated,
    ClientHosted,
    /// Bound to a steam group.
    SteamClan,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerFilter {
    /// Case-insensitive substring of the server name.
    pub name: Option<String>,
    pub address: Option<String>,
    pub area: Option<String>,
    pub intent: Option<String>,
    pub game_mode: Option<String>,
    /// Upstream platform code.
    pub platform: Option<u8>,
    pub server_type: Option<ServerType>,
    /// Matches records carrying any of these tags.
    pub tags: Vec<String>,
    pub pvp: TriState,
    pub password: TriState,
    pub mods: TriState,
}

impl ServerFilter {
    pub fn matches(&self, record: &ServerRecord) -> bool {
        let exact = |wanted: &Option<String>, actual: &str| wanted.as_deref().is_none_or(|w| w == actual);

        self.name
            .as_deref()
            .is_none_or(|n| record.name.to_lowercase().contains(&n.to_lowercase()))
            && exact(&self.address, &record.address)
            && exact(&self.area, &record.area)
            && exact(&self.intent, &record.intent)
            && exact(&self.game_mode, &record.game_mode)
            && self.platform.is_none_or(|p| p == record.platform)
            && self.server_type.is_none_or(|t| match t {
                ServerType::Dedicated => record.is_dedicated,
                ServerType::ClientHosted => record.client_hosted,
                ServerType::SteamClan => !record.steam_clan_id.is_empty(),
            })
            && (self.tags.is_empty() || self.tags.iter().any(|t| record.tag_names.contains(t)))
            && self.pvp.admits(record.pvp_enabled)
            && self.password.admits(record.has_password)
            && self.mods.admits(record.mod_enabled)
    }

    /// Splits the upstream comma separated tag syntax.
    pub fn with_tag_list(mut self, tags: &str) -> Self {
        self.tags = tags
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SortField {
    Name,
    Online,
    MaxPlayers,
    Area,
    PlatformName,
    Version,
    GameMode,
    Intent,
}

impl SortField {
    /// Column name in the record store.
    pub fn column(self) -> &'static str {
        match self {
            SortField::Name => "name",
            SortField::Online => "connected",
            SortField::MaxPlayers => "max_connections",
            SortField::Area => "area",
            SortField::PlatformName => "platform_name",
            SortField::Version => "version",
            SortField::GameMode => "game_mode",
            SortField::Intent => "intent",
        }
    }

    fn compare(self, a: &ServerRecord, b: &ServerRecord) -> Ordering {
        match self {
            SortField::Name => a.name.cmp(&b.name),
            SortField::Online => a.connected.cmp(&b.connected),
            SortField::MaxPlayers => a.max_connections.cmp(&b.max_connections),
            SortField::Area => a.area.cmp(&b.area),
            SortField::PlatformName => a.platform_name.cmp(&b.platform_name),
            SortField::Version => a.version.cmp(&b.version),
            SortField::GameMode => a.game_mode.cmp(&b.game_mode),
            SortField::Intent => a.intent.cmp(&b.intent),
        }
    }
}

/// A sort field with direction, written `online` or `-online`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortOrder {
    pub field: SortField,
    pub descending: bool,
}

impl FromStr for SortOrder {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self> {
        let (descending, name) = match s.trim().strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s.trim()),
        };
        let field = SortField::from_str(name).map_err(|_| TrackerError::configuration(format!("unknown sort field '{s}'")))?;
        Ok(Self { field, descending })
    }
}

impl SortOrder {
    /// Orders by the field, then by `row_id` so pages are stable.
    pub fn compare(&self, a: &ServerRecord, b: &ServerRecord) -> Ordering {
        let by_field = self.field.compare(a, b);
        let by_field = if self.descending { by_field.reverse() } else { by_field };
        by_field.then_with(|| a.row_id.cmp(&b.row_id))
    }
}

/// Validated paging parameters. `page` is one based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u32,
    pub size: u32,
    pub sort: SortOrder,
}

impl PageRequest {
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.size)
    }

    /// Rejects page zero and empty pages, which no store can answer.
    pub fn validate(&self) -> Result<()> {
        if self.page == 0 {
            return Err(TrackerError::configuration("page starts at 1"));
        }
        if self.size == 0 {
            return Err(TrackerError::configuration("page size must be at least 1"));
        }
        Ok(())
    }
}

/// A listing request as it arrives from a caller, before defaults apply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListServersQuery {
    pub page: Option<u32>,
    pub size: Option<u32>,
    pub sort: Option<String>,
    pub filter: ServerFilter,
}

impl ListServersQuery {
    pub fn page_request(&self, defaults: &QueryConfig) -> Result<PageRequest> {
        let page = self.page.unwrap_or(1);
        let size = self.size.unwrap_or(defaults.page_size);
        if size > defaults.max_page_size {
            return Err(TrackerError::configuration(format!(
                "page size must be between 1 and {}",
                defaults.max_page_size
            )));
        }
        let sort = self.sort.as_deref().unwrap_or(&defaults.sort).parse()?;
        let request = PageRequest { page, size, sort };
        request.validate()?;
        Ok(request)
    }
}

/// Rollup query after defaults, `[before, until]` inclusive in unix
/// milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollupRange {
    pub before: i64,
    pub until: i64,
    pub tail: u32,
    /// Only timestamps that are an exact multiple of this survive.
    pub bucket_ms: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatisticsQuery {
    pub before: i64,
    pub until: Option<i64>,
    pub tail: Option<u32>,
    pub bucket: Option<std::time::Duration>,
}
