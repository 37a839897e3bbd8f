//!
//! src/fetch.rs
//!
//! Defines methods for hitting specified endpoints and
//! returning unparsed data, handling retries, etc.
//!

use std::time::Duration;

use rand::{rngs::SmallRng, Rng, SeedableRng};
use reqwest::{Client, header, redirect, RequestBuilder};
use tokio::time::sleep;
use tracing::warn;
use url::Url;

use crate::config::{
    AppleMusicConfig, HttpConfig, NotionConfig, RetryConfig, SpotifyConfig
};
use crate::errors::SyncError;

/// Client building functionality
fn client_helper(http: &HttpConfig) -> reqwest::ClientBuilder {
    Client::builder()
        .timeout(http.timeout)
        .connect_timeout(http.connect_timeout)
        .pool_max_idle_per_host(http.pool_max_idle_per_host)
        .pool_idle_timeout(Some(http.pool_idle_timeout))
        .redirect(redirect::Policy::limited(http.max_redirects as usize))
}

fn client_with_headers(http: &HttpConfig, headers: header::HeaderMap) ->
    Result<Client, SyncError> {
    client_helper(http)
        .default_headers(headers)
        .build()
        .map_err(|e| SyncError::Http(format!("build client: {e}")))
}

pub fn base_client(http: &HttpConfig) -> Result<Client, SyncError> {
    let mut h = header::HeaderMap::new();
    h.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));
    client_with_headers(http, h)
}

fn bearer_value(token: &str) -> Result<header::HeaderValue, SyncError> {
    header::HeaderValue::from_str(&format!("Bearer {token}"))
        .map_err(|e| SyncError::Config(format!("invalid bearer token: {e}")))
}

/// Simple function to generate random wait for http_with_retry
fn generate_backoff(base: Duration, attempt: usize, jitter: bool, rng: &mut SmallRng)
    -> Duration {
    let exp = (1_u64 << attempt.min(6)) * base.as_millis() as u64;
    let jitter_ms = if jitter { rng.gen_range(50..=200) } else { 0 };
    Duration::from_millis(exp + jitter_ms)
}

pub async fn http_with_retry(
    request: RequestBuilder,
    retry: &RetryConfig
) -> Result<serde_json::Value, SyncError> {
    let mut rng = SmallRng::from_entropy();
    let mut attempt = 0_usize;
    loop {
        let response = request.try_clone()
            .ok_or_else(|| SyncError::Http("non-cloneable request".to_string()))?
            .send()
            .await;
        match response {
            Ok(resp) => {
                if resp.status().is_success() {
                    let v = resp.json::<serde_json::Value>().await?;
                    return Ok(v);
                }
                let status = resp.status();
                let _body = resp.text().await.unwrap_or_default();
                let retryable = retry.retryable_statuses.contains(&status.as_u16());
                if !retryable || attempt >= retry.max_attempts as usize {
                    return Err(SyncError::Http(
                        format!("status {} after {} retries", status, attempt)
                    ));
                }
                let backoff = generate_backoff(
                    retry.base_backoff, attempt, retry.jitter, &mut rng
                );
                warn!(status = %status, backoff = ?backoff.as_millis(), "http.retry");
                sleep(backoff).await;
                attempt += 1;
            },
            Err(e) => {
                if attempt >= retry.max_attempts as usize {
                    return Err(e.into());
                }
                let backoff = generate_backoff(
                    retry.base_backoff, attempt, retry.jitter, &mut rng
                );
                warn!(backoff = ?backoff.as_millis(), "http.retry.error");
                sleep(backoff).await;
                attempt += 1;
            }
        }
    }
}

#[derive(Clone, Debug)]
pub struct SpotifyClient {
    pub http: Client,
    pub cfg: SpotifyConfig
}

impl SpotifyClient {
    pub fn new(http_config: &HttpConfig, cfg: &SpotifyConfig) ->
        Result<Self, SyncError> {

        let http = base_client(http_config)?;
        Ok( Self {
            http,
            cfg: cfg.clone()
        })
    }

    pub fn token_request(&self) -> RequestBuilder {
        self.http
            .post(self.cfg.token_url.clone())
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body("grant_type=client_credentials")
    }

    /// GET /v1/playlists/{id}?fields=name,tracks.total
    pub fn playlist(&self, playlist_id: &str, bearer: &str) -> RequestBuilder {
        let url = self.cfg.api_base
            .join(&format!("playlists/{playlist_id}"))
            .unwrap();
        self.http.get(url)
            .bearer_auth(bearer)
            .query(&[("fields", "name,tracks.total")])
    }

    /// GET /v1/playlists/{id}/tracks?limit=&offset=
    pub fn playlist_tracks(&self, playlist_id: &str, limit: u32, offset: u32,
        bearer: &str) -> RequestBuilder {
        let url = self.cfg.api_base
            .join(&format!("playlists/{playlist_id}/tracks"))
            .unwrap();
        self.http.get(url).bearer_auth(bearer).query(&[
            ("limit", &limit.to_string()),
            ("offset", &offset.to_string())
        ])
    }
}

#[derive(Clone, Debug)]
pub struct AppleMusicClient {
    pub http: Client,
    pub base: Url,
    pub storefront: String
}

impl AppleMusicClient {
    pub fn new(http_config: &HttpConfig, cfg: &AppleMusicConfig) ->
        Result<Self, SyncError> {

        let mut h = header::HeaderMap::new();
        h.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));
        h.insert(header::AUTHORIZATION, bearer_value(&cfg.developer_token)?);
        let http = client_with_headers(http_config, h)?;

        Ok( Self {
            http,
            base: cfg.api_base.clone(),
            storefront: cfg.storefront.clone()
        })
    }

    /// GET /v1/test
    pub fn test(&self) -> RequestBuilder {
        let url = self.base.join("test").unwrap();
        self.http.get(url)
    }

    /// GET /v1/catalog/{storefront}/playlists/{id}
    pub fn playlist(&self, playlist_id: &str) -> RequestBuilder {
        let url = self.base
            .join(&format!("catalog/{}/playlists/{playlist_id}", self.storefront))
            .unwrap();
        self.http.get(url)
    }

    /// GET /v1/catalog/{storefront}/playlists/{id}/tracks?limit=&offset=
    pub fn playlist_tracks(&self, playlist_id: &str, limit: u32, offset: u32)
        -> RequestBuilder {
        let url = self.base
            .join(&format!(
                "catalog/{}/playlists/{playlist_id}/tracks", self.storefront
            ))
            .unwrap();
        self.http.get(url).query(&[
            ("limit", &limit.to_string()),
            ("offset", &offset.to_string())
        ])
    }
}

#[derive(Clone, Debug)]
pub struct NotionClient {
    pub http: Client,
    pub base: Url,
    pub database_id: String
}

impl NotionClient {
    pub fn new(http_config: &HttpConfig, cfg: &NotionConfig) ->
        Result<Self, SyncError> {

        let mut h = header::HeaderMap::new();
        h.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));
        h.insert(header::AUTHORIZATION, bearer_value(&cfg.token)?);
        h.insert(
            "Notion-Version",
            header::HeaderValue::from_str(&cfg.version)
                .map_err(|e| SyncError::Config(format!("invalid notion version: {e}")))?
        );
        let http = client_with_headers(http_config, h)?;

        Ok( Self {
            http,
            base: cfg.api_base.clone(),
            database_id: cfg.database_id.clone()
        })
    }

    /// POST /v1/databases/{id}/query
    pub fn query_database(&self, body: &serde_json::Value) -> RequestBuilder {
        let url = self.base
            .join(&format!("databases/{}/query", self.database_id))
            .unwrap();
        self.http.post(url).json(body)
    }

    /// POST /v1/pages
    pub fn create_page(&self, body: &serde_json::Value) -> RequestBuilder {
        let url = self.base.join("pages").unwrap();
        self.http.post(url).json(body)
    }

    /// PATCH /v1/pages/{id}
    pub fn update_page(&self, page_id: &str, body: &serde_json::Value)
        -> RequestBuilder {
        let url = self.base.join(&format!("pages/{page_id}")).unwrap();
        self.http.patch(url).json(body)
    }
}
