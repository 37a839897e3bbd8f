//!
//! src/main.rs
//!
//! Wires configuration, clients and the sync driver together and
//! executes one reconciliation run
//!
//!

mod config;
mod errors;
mod logging;

mod fetch;
mod source;
mod store;

mod types;
mod normalize;
mod resolve;
mod upsert;
mod sync;
mod cleanup;

use std::sync::Arc;

use crate::errors::SyncError;
use crate::source::{AppleSource, Sources, SpotifySource, TokenCache};
use crate::store::{NotionStore, RecordStore};

#[tokio::main]
async fn main() -> Result<(), SyncError> {
    let cfgs = config::load_config()?;
    let _logging = logging::init_logging(&cfgs.logging)?;

    tracing::info!(
        service = "playlist-sync",
        version = %env!("CARGO_PKG_VERSION"),
        "starting"
    );

    let spotify = fetch::SpotifyClient::new(&cfgs.http, &cfgs.spotify)?;
    let apple   = fetch::AppleMusicClient::new(&cfgs.http, &cfgs.apple_music)?;
    let notion  = fetch::NotionClient::new(&cfgs.http, &cfgs.notion)?;

    let sources = Sources::new(
        Arc::new(SpotifySource::new(
            spotify, TokenCache::new(), cfgs.http.retry.clone()
        )),
        Arc::new(AppleSource::new(apple, cfgs.http.retry.clone()))
    );
    let store: Arc<dyn RecordStore> = Arc::new(
        NotionStore::new(notion, cfgs.http.retry.clone())
    );
    let resolver = Arc::new(resolve::ContainsResolver::new(store.clone()));

    let driver = sync::SyncDriver::new(sources, store, resolver, &cfgs.sync);
    let summary = driver.run().await;

    println!(
        "run {} finished at {} in {:.1}s", summary.run_id, summary.finished,
        summary.total_duration.as_secs_f64()
    );
    println!(
        "  spotify      created={} updated={} skipped={} errors={}",
        summary.spotify.created, summary.spotify.updated,
        summary.spotify.skipped, summary.spotify.errors
    );
    println!(
        "  apple music  created={} updated={} skipped={} errors={}",
        summary.apple_music.created, summary.apple_music.updated,
        summary.apple_music.skipped, summary.apple_music.errors
    );
    println!(
        "  cleanup      marked={} errors={}",
        summary.cleanup.marked, summary.cleanup.errors
    );

    Ok(())
}

/// Live testbenches against the real APIs, gated behind LIVE_HTTP=1
#[cfg(test)]
mod tests {
    use crate::errors::SyncError;
    use super::*;

    fn live() -> bool {
        std::env::var("LIVE_HTTP").ok().as_deref() == Some("1")
    }

    #[tokio::test]
    async fn spotify_client_testbench() -> Result<(), SyncError> {
        dotenvy::dotenv().ok();

        if !live() {
            eprintln!("Set LIVE_HTTP=1 to run");
            return Ok(())
        }

        let cfgs = config::load_config()?;
        let spotify = fetch::SpotifyClient::new(&cfgs.http, &cfgs.spotify)?;

        let token_response = spotify.token_request()
            .basic_auth(&cfgs.spotify.client_id, Some(&cfgs.spotify.client_secret))
            .send()
            .await?;
        assert!(token_response.status().is_success());

        let token: serde_json::Value = token_response.json().await?;
        let bearer = token["access_token"].as_str().unwrap();

        // Today's Top Hits
        let playlist_response = spotify
            .playlist_tracks("37i9dQZF1DXcBWIGoYBM5M", 5, 0, bearer)
            .send()
            .await?;
        assert!(playlist_response.status().is_success());

        let page: serde_json::Value = playlist_response.json().await?;
        println!("page: {}", serde_json::to_string_pretty(&page)?);

        Ok(())
    }

    #[tokio::test]
    async fn notion_client_testbench() -> Result<(), SyncError> {
        dotenvy::dotenv().ok();

        if !live() {
            eprintln!("Set LIVE_HTTP=1 to run");
            return Ok(())
        }

        let cfgs = config::load_config()?;
        let notion = fetch::NotionClient::new(&cfgs.http, &cfgs.notion)?;

        let body = serde_json::json!({"page_size": 3});
        let response = notion.query_database(&body).send().await?;
        assert!(response.status().is_success());

        let page: serde_json::Value = response.json().await?;
        println!("query: {}", serde_json::to_string_pretty(&page)?);

        Ok(())
    }
}
