use super::{
    types::{
        LobbyServer,
        LobbyServerDetails,
        Platform,
        RegionsResponse,
        ServersResponse,
        GAME_ID,
    },
    Directory,
    DirectoryFuture,
};
use crate::error::{
    Result,
    TrackerError,
};
use eyre::{
    eyre,
    Context as _,
};
use flate2::read::GzDecoder;
use lobby_tracker_config::LobbyConfig;
use reqwest::Client as HttpClient;
use serde::de::DeserializeOwned;
use std::io::Read as _;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// HTTP client for the Klei lobby directory.
#[derive(Clone)]
pub struct LobbyClient {
    http: HttpClient,
    config: LobbyConfig,
}

impl LobbyClient {
    pub fn new(config: LobbyConfig) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(TrackerError::upstream)?;
        Ok(Self { http, config })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .wrap_err_with(|| format!("GET {url}"))
            .map_err(TrackerError::Upstream)?;
        let body = response
            .bytes()
            .await
            .wrap_err_with(|| format!("reading body of {url}"))
            .map_err(TrackerError::Upstream)?;
        decode_body(&body).wrap_err_with(|| format!("decoding {url}")).map_err(TrackerError::Upstream)
    }
}

/// Listings are published as `.json.gz`; depending on the CDN the body arrives
/// either transparently decoded or as the raw gzip file.
fn decode_body<T: DeserializeOwned>(body: &[u8]) -> eyre::Result<T> {
    if body.starts_with(&GZIP_MAGIC) {
        let mut inflated = Vec::with_capacity(body.len() * 8);
        GzDecoder::new(body).read_to_end(&mut inflated)?;
        Ok(serde_json::from_slice(&inflated)?)
    } else {
        Ok(serde_json::from_slice(body)?)
    }
}

impl Directory for LobbyClient {
    fn capable_regions(&self) -> DirectoryFuture<'_, Vec<String>> {
        Box::pin(async move {
            let regions: RegionsResponse = self.get_json(&self.config.regions_url).await?;
            Ok(regions.regions.into_iter().map(|r| r.region).collect())
        })
    }

    fn list_servers<'a>(&'a self, region: &'a str, platform: Platform) -> DirectoryFuture<'a, Vec<LobbyServer>> {
        Box::pin(async move {
            let url = self.config.servers_url_for(region, &platform.to_string());
            let servers: ServersResponse<LobbyServer> = self.get_json(&url).await?;
            debug!(region, %platform, count = servers.list.len(), "fetched lobby listing");
            Ok(servers.list)
        })
    }

    fn server_details<'a>(
        &'a self,
        region: &'a str,
        row_id: &'a str,
    ) -> DirectoryFuture<'a, Option<LobbyServerDetails>> {
        Box::pin(async move {
            if self.config.token.is_empty() {
                return Err(TrackerError::Upstream(eyre!("lobby.token is required for detail reads")));
            }
            let url = self.config.details_url_for(region);
            let body = serde_json::json!({
                "__token": self.config.token,
                "__gameId": GAME_ID,
                "query": { "__rowId": row_id },
            });

            let response = self
                .http
                .post(&url)
                .json(&body)
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .wrap_err_with(|| format!("POST {url}"))
                .map_err(TrackerError::Upstream)?;
            let details: ServersResponse<LobbyServerDetails> = response
                .json()
                .await
                .wrap_err_with(|| format!("decoding details of {row_id}"))
                .map_err(TrackerError::Upstream)?;

            Ok(details.list.into_iter().next())
        })
    }
}
