//! # Geo Enricher
//!
//! Turns a raw directory listing into a [`ServerRecord`]: parsed tags, the
//! continent, country and city of its address and a display platform name.

use crate::{
    error::{
        Result,
        TrackerError,
    },
    lobby::{
        platform_display_name,
        LobbyServer,
    },
    model::ServerRecord,
};
use eyre::{
    eyre,
    Context as _,
};
use maxminddb::{
    geoip2,
    MaxMindDBError,
    Reader,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    net::IpAddr,
    path::Path,
    sync::Arc,
};

/// WeGame listings are only reachable from one region and upstream
/// geolocation for them is unreliable.
const WEGAME: &str = "WeGame";
const WEGAME_AREA: &str = "CN";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoInfo {
    pub continent: String,
    pub country: String,
    pub city: String,
}

pub trait GeoLookup: Send + Sync {
    fn lookup(&self, ip: IpAddr) -> Result<GeoInfo>;
}

/// City database loaded fully into memory.
pub struct MaxMindGeo {
    reader: Reader<Vec<u8>>,
}

impl MaxMindGeo {
    pub fn open(path: &Path) -> Result<Self> {
        let reader = Reader::open_readfile(path)
            .wrap_err_with(|| format!("opening geoip database {}", path.display()))
            .map_err(TrackerError::Upstream)?;
        info!(path = %path.display(), kind = %reader.metadata.database_type, "loaded geoip database");
        Ok(Self { reader })
    }
}

impl GeoLookup for MaxMindGeo {
    fn lookup(&self, ip: IpAddr) -> Result<GeoInfo> {
        let city: geoip2::City = match self.reader.lookup(ip) {
            Ok(city) => city,
            // Private and reserved ranges are absent from the database.
            Err(MaxMindDBError::AddressNotFoundError(_)) => return Ok(GeoInfo::default()),
            Err(e) => return Err(TrackerError::Upstream(eyre!("geoip lookup of {ip} failed: {e}"))),
        };

        Ok(GeoInfo {
            continent: city.continent.and_then(|c| c.code).unwrap_or_default().to_string(),
            country: city.country.and_then(|c| c.iso_code).unwrap_or_default().to_string(),
            city: city
                .city
                .and_then(|c| c.names)
                .and_then(|names| names.get("en").copied())
                .unwrap_or_default()
                .to_string(),
        })
    }
}

#[derive(Clone)]
pub struct GeoEnricher {
    geo: Arc<dyn GeoLookup>,
}

impl GeoEnricher {
    pub fn new(geo: Arc<dyn GeoLookup>) -> Self {
        Self { geo }
    }

    /// Fails when the address cannot be parsed or the lookup itself fails.
    pub fn enrich(&self, server: LobbyServer, region: &str, created_at: i64) -> Result<ServerRecord> {
        let ip: IpAddr = server
            .address
            .parse()
            .map_err(|e| TrackerError::Upstream(eyre!("invalid address '{}' for {}: {e}", server.address, server.row_id)))?;
        let geo = self.geo.lookup(ip)?;

        let platform_name = platform_display_name(server.platform).to_string();
        let area = if platform_name == WEGAME {
            WEGAME_AREA.to_string()
        } else {
            geo.country
        };

        let tag_names = if server.tags.is_empty() {
            Vec::new()
        } else {
            server.tags.split(',').map(str::to_string).collect()
        };

        Ok(ServerRecord {
            row_id: server.row_id,
            guid: server.guid,
            steam_id: server.steam_id,
            steam_clan_id: server.steam_clan_id,
            owner_net_id: server.owner_net_id,
            steam_room: server.steam_room,
            session: server.session,
            address: server.address,
            port: server.port,
            host: server.host,
            platform: server.platform,
            name: server.name,
            game_mode: server.game_mode,
            intent: server.intent,
            season: server.season,
            version: server.version,
            tags: server.tags,
            tag_names,
            max_connections: server.max_connections,
            connected: server.connected,
            has_password: server.has_password,
            is_dedicated: server.is_dedicated,
            client_hosted: server.client_hosted,
            pvp_enabled: server.pvp_enabled,
            mod_enabled: server.mod_enabled,
            allow_new_players: server.allow_new_players,
            server_paused: server.server_paused,
            friend_only: server.friend_only,
            clan_only: server.clan_only,
            lan_only: server.lan_only,
            region: region.to_string(),
            continent: geo.continent,
            area,
            city: geo.city,
            platform_name,
            created_at,
            seq: 0,
        })
    }

    /// Enriches a whole listing, failing on the first bad record.
    pub fn enrich_all(&self, servers: Vec<LobbyServer>, region: &str, created_at: i64) -> Result<Vec<ServerRecord>> {
        servers
            .into_iter()
            .map(|server| self.enrich(server, region, created_at))
            .collect()
    }
}
