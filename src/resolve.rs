//!
//! src/resolve.rs
//!
//! Finds the existing sink record for a canonical track, ISRC first
//! and title/artist containment as the fallback. Behind a trait so the
//! matching strategy can be swapped without touching the driver
//!

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::store::RecordStore;
use crate::types::{Record, Track};

#[async_trait]
pub trait Resolve: Send + Sync {
    /// Never errors: a failed lookup is reported as no match
    async fn resolve(&self, track: &Track) -> Option<Record>;
}

pub struct ContainsResolver {
    store: Arc<dyn RecordStore>
}

impl ContainsResolver {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    async fn by_isrc(&self, track: &Track) -> Option<Record> {
        let isrc = track.isrc.as_deref().filter(|s| !s.is_empty())?;
        // containment rather than equality, tolerating formatting noise
        // in stored values at the cost of prefix over-matching
        match self.store.query_isrc_contains(isrc).await {
            Ok(records) => records.into_iter().next(),
            Err(e) => {
                warn!(error = ?e, isrc = %isrc, "resolve.isrc.query_failed");
                None
            }
        }
    }

    async fn by_title_artist(&self, track: &Track) -> Option<Record> {
        let candidates = match self.store.query_title_contains(&track.title).await {
            Ok(records) => records,
            Err(e) => {
                warn!(error = ?e, title = %track.title,
                    "resolve.title.query_failed");
                return None;
            }
        };

        let artist = track.artist.as_deref().unwrap_or("").to_lowercase();
        // sink order is newest-created-first, so the first hit wins
        candidates.into_iter().find(|record| {
            record.artist.as_deref()
                .unwrap_or("")
                .to_lowercase()
                .contains(&artist)
        })
    }
}

#[async_trait]
impl Resolve for ContainsResolver {
    async fn resolve(&self, track: &Track) -> Option<Record> {
        if let Some(record) = self.by_isrc(track).await {
            return Some(record);
        }
        self.by_title_artist(track).await
    }
}
