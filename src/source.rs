//!
//! src/source.rs
//!
//! Source-side contract the sync driver consumes: health checks,
//! playlist metadata, and the fully-paginated track listing for one
//! playlist. Implemented for Spotify and Apple Music over the raw
//! clients in src/fetch.rs
//!

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::debug;

use crate::config::RetryConfig;
use crate::errors::SyncError;
use crate::fetch::{self, AppleMusicClient, SpotifyClient};
use crate::types::{PlaylistMeta, Source};

const PAGE_LIMIT: u32 = 100;
const TOKEN_EXPIRY_MARGIN_S: u64 = 60;

#[async_trait]
pub trait SourceApi: Send + Sync {
    fn source(&self) -> Source;
    async fn check_health(&self) -> Result<bool, SyncError>;
    async fn playlist_meta(&self, playlist_id: &str)
        -> Result<PlaylistMeta, SyncError>;
    /// Returns every raw item of the playlist, all pages walked internally
    async fn playlist_tracks(&self, playlist_id: &str)
        -> Result<Vec<serde_json::Value>, SyncError>;
}

///
/// Both catalog handles the driver can route a playlist to
///
#[derive(Clone)]
pub struct Sources {
    pub spotify: Arc<dyn SourceApi>,
    pub apple_music: Arc<dyn SourceApi>
}

impl Sources {
    pub fn new(spotify: Arc<dyn SourceApi>, apple_music: Arc<dyn SourceApi>)
        -> Self {
        Self { spotify, apple_music }
    }

    pub fn get(&self, source: Source) -> &Arc<dyn SourceApi> {
        match source {
            Source::Spotify    => &self.spotify,
            Source::AppleMusic => &self.apple_music
        }
    }
}

///
/// Owned bearer-token state for the client-credentials flow. Passed into
/// the source on construction so runs and tests get isolated state.
///
#[derive(Debug)]
pub struct TokenCache {
    bearer: Option<String>,
    expiry: Instant
}

impl TokenCache {
    pub fn new() -> Self {
        Self { bearer: None, expiry: Instant::now() }
    }
}

impl Default for TokenCache {
    fn default() -> Self { Self::new() }
}

pub struct SpotifySource {
    client: SpotifyClient,
    retry: RetryConfig,
    token: tokio::sync::Mutex<TokenCache>
}

impl SpotifySource {
    pub fn new(client: SpotifyClient, token: TokenCache, retry: RetryConfig)
        -> Self {
        Self {
            client,
            retry,
            token: tokio::sync::Mutex::new(token)
        }
    }

    /// Returns a valid bearer token, refreshing when missing or near expiry
    async fn bearer(&self) -> Result<String, SyncError> {
        let mut cache = self.token.lock().await;
        if let Some(token) = &cache.bearer {
            if Instant::now() < cache.expiry {
                return Ok(token.clone());
            }
        }

        let response = fetch::http_with_retry(
            self.client.token_request().basic_auth(
                &self.client.cfg.client_id,
                Some(&self.client.cfg.client_secret)
            ),
            &self.retry
        ).await?;

        let token = response["access_token"].as_str()
            .ok_or_else(|| SyncError::Http("no access_token in response".into()))?
            .to_string();
        let expires_in = response["expires_in"].as_u64().unwrap_or(3600);

        cache.expiry = Instant::now() + Duration::from_secs(
            expires_in.saturating_sub(TOKEN_EXPIRY_MARGIN_S)
        );
        cache.bearer = Some(token.clone());
        debug!(expires_in, "spotify.token.refreshed");
        Ok(token)
    }
}

#[async_trait]
impl SourceApi for SpotifySource {
    fn source(&self) -> Source { Source::Spotify }

    async fn check_health(&self) -> Result<bool, SyncError> {
        self.bearer().await.map(|_| true)
    }

    async fn playlist_meta(&self, playlist_id: &str)
        -> Result<PlaylistMeta, SyncError> {
        let bearer = self.bearer().await?;
        let value = fetch::http_with_retry(
            self.client.playlist(playlist_id, &bearer),
            &self.retry
        ).await?;

        let name = value.get("name")
            .and_then(|v| v.as_str())
            .ok_or_else(|| SyncError::Parse(
                format!("playlist {playlist_id} missing name")
            ))?
            .to_string();
        let track_count = value.pointer("/tracks/total").and_then(|v| v.as_i64());

        Ok( PlaylistMeta { name, track_count } )
    }

    async fn playlist_tracks(&self, playlist_id: &str)
        -> Result<Vec<serde_json::Value>, SyncError> {
        let bearer = self.bearer().await?;
        let mut items = Vec::new();
        let mut offset = 0_u32;
        loop {
            let value = fetch::http_with_retry(
                self.client.playlist_tracks(playlist_id, PAGE_LIMIT, offset, &bearer),
                &self.retry
            ).await?;

            let page = value.get("items")
                .and_then(|v| v.as_array())
                .cloned()
                .unwrap_or_default();
            let page_len = page.len();
            items.extend(page);

            if page_len < PAGE_LIMIT as usize {
                break;
            }
            offset += PAGE_LIMIT;
        }
        debug!(playlist = %playlist_id, count = items.len(), "spotify.tracks.fetched");
        Ok(items)
    }
}

pub struct AppleSource {
    client: AppleMusicClient,
    retry: RetryConfig
}

impl AppleSource {
    pub fn new(client: AppleMusicClient, retry: RetryConfig) -> Self {
        Self { client, retry }
    }
}

#[async_trait]
impl SourceApi for AppleSource {
    fn source(&self) -> Source { Source::AppleMusic }

    async fn check_health(&self) -> Result<bool, SyncError> {
        let response = self.client.test().send().await?;
        Ok(response.status().is_success())
    }

    async fn playlist_meta(&self, playlist_id: &str)
        -> Result<PlaylistMeta, SyncError> {
        let value = fetch::http_with_retry(
            self.client.playlist(playlist_id),
            &self.retry
        ).await?;

        let name = value.pointer("/data/0/attributes/name")
            .and_then(|v| v.as_str())
            .ok_or_else(|| SyncError::Parse(
                format!("playlist {playlist_id} missing name")
            ))?
            .to_string();

        // The catalog playlist object does not carry a track total
        Ok( PlaylistMeta { name, track_count: None } )
    }

    async fn playlist_tracks(&self, playlist_id: &str)
        -> Result<Vec<serde_json::Value>, SyncError> {
        let mut items = Vec::new();
        let mut offset = 0_u32;
        loop {
            let value = fetch::http_with_retry(
                self.client.playlist_tracks(playlist_id, PAGE_LIMIT, offset),
                &self.retry
            ).await?;

            let page = value.get("data")
                .and_then(|v| v.as_array())
                .cloned()
                .unwrap_or_default();
            let page_len = page.len();
            items.extend(page);

            let has_next = value.get("next").and_then(|v| v.as_str()).is_some();
            if !has_next || page_len < PAGE_LIMIT as usize {
                break;
            }
            offset += PAGE_LIMIT;
        }
        debug!(playlist = %playlist_id, count = items.len(), "apple.tracks.fetched");
        Ok(items)
    }
}

#[cfg(test)]
pub mod fake {
    //! In-memory source used by driver and cleanup tests

    use std::collections::HashMap;

    use async_trait::async_trait;
    use serde_json::{json, Value};

    use crate::errors::SyncError;
    use crate::types::{PlaylistMeta, Source};
    use super::SourceApi;

    pub struct FakeSource {
        source: Source,
        healthy: bool,
        fail_tracks: bool,
        meta: HashMap<String, PlaylistMeta>,
        playlists: HashMap<String, Vec<Value>>
    }

    impl FakeSource {
        pub fn new(source: Source) -> Self {
            Self {
                source,
                healthy: true,
                fail_tracks: false,
                meta: HashMap::new(),
                playlists: HashMap::new()
            }
        }

        pub fn with_playlist(mut self, id: &str, name: Option<&str>,
            items: Vec<Value>) -> Self {
            if let Some(name) = name {
                self.meta.insert(id.to_string(), PlaylistMeta {
                    name: name.to_string(),
                    track_count: Some(items.len() as i64)
                });
            }
            self.playlists.insert(id.to_string(), items);
            self
        }

        pub fn unhealthy(mut self) -> Self {
            self.healthy = false;
            self
        }

        pub fn failing_tracks(mut self) -> Self {
            self.fail_tracks = true;
            self
        }
    }

    #[async_trait]
    impl SourceApi for FakeSource {
        fn source(&self) -> Source { self.source }

        async fn check_health(&self) -> Result<bool, SyncError> {
            Ok(self.healthy)
        }

        async fn playlist_meta(&self, playlist_id: &str)
            -> Result<PlaylistMeta, SyncError> {
            self.meta.get(playlist_id)
                .cloned()
                .ok_or_else(|| SyncError::NotFound(
                    format!("no meta for {playlist_id}")
                ))
        }

        async fn playlist_tracks(&self, playlist_id: &str)
            -> Result<Vec<Value>, SyncError> {
            if self.fail_tracks {
                return Err(SyncError::Http("tracks fetch failed".into()));
            }
            Ok(self.playlists.get(playlist_id).cloned().unwrap_or_default())
        }
    }

    pub fn spotify_item(id: &str, title: &str, artist: &str, isrc: Option<&str>)
        -> Value {
        let mut track = json!({
            "id": id,
            "name": title,
            "artists": [{"name": artist}],
            "album": {"name": "Currents", "release_date": "2020-03-06"},
            "duration_ms": 215_000,
            "external_urls": {
                "spotify": format!("https://open.spotify.com/track/{id}")
            }
        });
        if let Some(isrc) = isrc {
            track["external_ids"] = json!({"isrc": isrc});
        }
        json!({"track": track})
    }

    pub fn apple_item(id: &str, title: &str, artist: &str, isrc: Option<&str>,
        composer: Option<&str>) -> Value {
        let mut attributes = json!({
            "name": title,
            "artistName": artist,
            "albumName": "Preludes",
            "trackNumber": 3,
            "releaseDate": "2019-09-13",
            "durationInMillis": 187_000,
            "url": format!("https://music.apple.com/us/song/{id}")
        });
        if let Some(isrc) = isrc {
            attributes["isrc"] = json!(isrc);
        }
        if let Some(composer) = composer {
            attributes["composerName"] = json!(composer);
        }
        json!({"id": id, "type": "songs", "attributes": attributes})
    }
}
