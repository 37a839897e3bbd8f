//!
//! src/config.rs
//!
//! Loads all configuration the sync job needs from the environment:
//! source API credentials, sink database coordinates, http behavior,
//! the playlist list and the upsert policy
//!

use serde::Deserialize;
use url::Url;
use std::time;

use crate::errors::SyncError;
use crate::types::PlaylistConfig;
use crate::upsert::UpsertMode;

/// Constants for HTTP Config
pub const HTTP_TIMEOUT: u64 = 8000;
pub const HTTP_CONNECT_TIMEOUT: u64 = 2000;
pub const HTTP_POOL_MAX_IDLE: usize = 16;
pub const HTTP_POOL_IDLE_TIMEOUT: u64 = 90000;
pub const HTTP_MAX_REDIRECTS: u8 = 4;

pub const RETRY_MAX_ATTEMPTS: u8 = 4;
pub const RETRY_BASE_BACKOFF: u64 = 250;
pub const RETRY_JITTER: bool = true;
pub const RETRYABLE_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// Pause between per-track sink writes, to stay under API rate limits
pub const SYNC_PACING_MS: u64 = 100;

pub const NOTION_VERSION: &str = "2022-06-28";

/// Wrapper over env::var to return an invalid environment var error
fn env_check(s: &str) -> Result<String, SyncError> {
    match std::env::var(s) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(SyncError::Config(format!("{s} was not set"))),
    }
}

fn env_flag(s: &str) -> bool {
    matches!(std::env::var(s).ok().as_deref(), Some("1") | Some("true"))
}

fn env_to_u64(s: &str, default: u64) -> u64 {
    std::env::var(s)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

/// Ensures that url is https
fn ensure_https(url: &Url) -> Result<(), String> {
    if url.scheme() == "https" {
        Ok(())
    } else {
        Err(format!("URL must be https: {url}"))
    }
}

fn ensure_host(url: &Url, expected_host: &str) -> Result<(), String> {
    match url.host_str() {
        Some(h) if h.eq_ignore_ascii_case(expected_host) => Ok(()),
        Some(h) => Err(
            format!("Unexpected host for {url} (got {h}, expected {expected_host})")
        ),
        None => Err(format!("URL missing host: {url}"))
    }
}

fn ensure_trailing_slash(url: &mut Url) {
    if !url.path().ends_with('/') {
        let mut path = url.path().to_string();
        path.push('/');
        url.set_path(&path);
    }
}

/// Parses an env var as a base url with scheme/host/path checks applied
fn build_base_url(var: &str, default: &str, expected_host: &str) ->
    Result<Url, SyncError> {

    let raw = std::env::var(var).unwrap_or_else(|_| default.to_string());
    let mut url = Url::parse(&raw)
        .map_err(|e| SyncError::Config(format!("{var} invalid {e}")))?;

    ensure_https(&url).map_err(SyncError::Config)?;
    ensure_host(&url, expected_host).map_err(SyncError::Config)?;
    ensure_trailing_slash(&mut url);
    Ok(url)
}

///
/// Configuration that Spotify expects when hitting endpoints
///
#[derive(Debug, Clone)]
pub struct SpotifyConfig {
    pub client_id: String,
    pub client_secret: String,
    pub token_url: Url,
    pub api_base: Url,
}

fn build_spotify() -> Result<SpotifyConfig, SyncError> {
    let client_id     = env_check("SPOTIFY_CLIENT_ID")?;
    let client_secret = env_check("SPOTIFY_CLIENT_SECRET")?;

    let token_url = build_base_url(
        "SPOTIFY_TOKEN_URL",
        "https://accounts.spotify.com/api/token",
        "accounts.spotify.com"
    )?;
    let api_base = build_base_url(
        "SPOTIFY_API_BASE",
        "https://api.spotify.com/v1/",
        "api.spotify.com"
    )?;

    Ok( SpotifyConfig { client_id, client_secret, token_url, api_base } )
}

///
/// Configuration for the Apple Music catalog api
///
#[derive(Debug, Clone)]
pub struct AppleMusicConfig {
    pub developer_token: String,   // pre-issued JWT, no refresh flow
    pub api_base: Url,
    pub storefront: String         // default "us"
}

fn build_apple_music() -> Result<AppleMusicConfig, SyncError> {
    let developer_token = env_check("APPLE_MUSIC_TOKEN")?;

    let api_base = build_base_url(
        "APPLE_API_BASE",
        "https://api.music.apple.com/v1/",
        "api.music.apple.com"
    )?;

    let storefront = std::env::var("APPLE_STOREFRONT")
        .unwrap_or_else(|_| "us".to_string());

    Ok( AppleMusicConfig { developer_token, api_base, storefront } )
}

///
/// Configuration for the Notion database the records live in
///
#[derive(Debug, Clone)]
pub struct NotionConfig {
    pub token: String,
    pub database_id: String,
    pub api_base: Url,
    pub version: String
}

fn build_notion() -> Result<NotionConfig, SyncError> {
    let token       = env_check("NOTION_TOKEN")?;
    let database_id = env_check("NOTION_DATABASE_ID")?;

    let api_base = build_base_url(
        "NOTION_API_BASE",
        "https://api.notion.com/v1/",
        "api.notion.com"
    )?;

    let version = std::env::var("NOTION_VERSION")
        .unwrap_or_else(|_| NOTION_VERSION.to_string());

    Ok( NotionConfig { token, database_id, api_base, version } )
}

///
/// Configuration for Http timeouts, retries, etc.
///
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u8,
    pub base_backoff: time::Duration,
    pub jitter: bool,
    pub retryable_statuses: Vec<u16>
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: RETRY_MAX_ATTEMPTS,
            base_backoff: time::Duration::from_millis(RETRY_BASE_BACKOFF),
            jitter: RETRY_JITTER,
            retryable_statuses: RETRYABLE_STATUSES.to_vec()
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub timeout: time::Duration,
    pub connect_timeout: time::Duration,
    pub pool_max_idle_per_host: usize,
    pub pool_idle_timeout: time::Duration,
    pub max_redirects: u8,
    pub retry: RetryConfig
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: time::Duration::from_millis(HTTP_TIMEOUT),
            connect_timeout: time::Duration::from_millis(HTTP_CONNECT_TIMEOUT),
            pool_max_idle_per_host: HTTP_POOL_MAX_IDLE,
            pool_idle_timeout: time::Duration::from_millis(HTTP_POOL_IDLE_TIMEOUT),
            max_redirects: HTTP_MAX_REDIRECTS,
            retry: RetryConfig::default()
        }
    }
}

///
/// Configuration for what the run does: which playlists, which upsert
/// policy, whether writes are suppressed, and which Source tags mark
/// hand-entered records that cleanup must never touch
///
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub dry_run: bool,
    pub mode: UpsertMode,
    pub pacing: time::Duration,
    pub playlists: Vec<PlaylistConfig>,
    pub manual_sources: Vec<String>
}

pub fn parse_playlists(raw: &str) -> Result<Vec<PlaylistConfig>, SyncError> {
    serde_json::from_str::<Vec<PlaylistConfig>>(raw)
        .map_err(|e| SyncError::Config(format!("SYNC_PLAYLISTS invalid: {e}")))
}

pub fn parse_manual_sources(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn build_sync() -> Result<SyncConfig, SyncError> {
    let dry_run = env_flag("SYNC_DRY_RUN");

    let mode = match std::env::var("SYNC_MODE") {
        Ok(raw) => UpsertMode::parse(&raw)
            .ok_or_else(|| SyncError::Config(
                format!("SYNC_MODE invalid: {raw}")
            ))?,
        Err(_) => UpsertMode::Update
    };

    let pacing = time::Duration::from_millis(
        env_to_u64("SYNC_PACING_MS", SYNC_PACING_MS)
    );

    let playlists = parse_playlists(&env_check("SYNC_PLAYLISTS")?)?;

    let manual_sources = parse_manual_sources(
        &std::env::var("SYNC_MANUAL_SOURCES")
            .unwrap_or_else(|_| "Manual,Shazam".to_string())
    );

    Ok( SyncConfig { dry_run, mode, pacing, playlists, manual_sources } )
}

///
/// Configuration for Logger
///

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum LogFormat {
    Pretty,
    Json
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub filter_directives: String,
    pub format: LogFormat,
    pub include_file_line: bool,
    pub include_target: bool
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter_directives: "info,playlist_sync=debug,reqwest=warn".to_string(),
            format: LogFormat::Json,
            include_file_line: true,
            include_target: true
        }
    }
}

///
/// AppConfig which holds everything the run needs
///
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub spotify: SpotifyConfig,
    pub apple_music: AppleMusicConfig,
    pub notion: NotionConfig,
    pub http: HttpConfig,
    pub sync: SyncConfig,
    pub logging: LoggingConfig
}

///
/// Return all environment variables to caller at program start.
///
pub fn load_config() -> Result<AppConfig, SyncError> {
    dotenvy::dotenv().ok();

    let spotify     = build_spotify()?;
    let apple_music = build_apple_music()?;
    let notion      = build_notion()?;
    let http        = HttpConfig::default();
    let sync        = build_sync()?;
    let logging     = LoggingConfig::default();

    Ok( AppConfig { spotify, apple_music, notion, http, sync, logging } )
}
