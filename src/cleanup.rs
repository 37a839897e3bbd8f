//!
//! src/cleanup.rs
//!
//! After every playlist has synced, re-fetches the live track set and
//! soft-deletes records that no longer appear anywhere. Hand-entered
//! records are exempt; nothing is ever physically deleted
//!

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::normalize;
use crate::source::Sources;
use crate::store::RecordStore;
use crate::types::PlaylistConfig;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CleanupStats {
    pub marked: usize,
    pub errors: usize
}

pub struct CleanupReconciler {
    store: Arc<dyn RecordStore>,
    sources: Sources,
    playlists: Vec<PlaylistConfig>,
    exempt_sources: Vec<String>,
    dry_run: bool
}

impl CleanupReconciler {
    pub fn new(
        store: Arc<dyn RecordStore>,
        sources: Sources,
        playlists: Vec<PlaylistConfig>,
        exempt_sources: Vec<String>,
        dry_run: bool
    ) -> Self {
        Self { store, sources, playlists, exempt_sources, dry_run }
    }

    pub async fn reconcile(&self) -> CleanupStats {
        info!(playlists = self.playlists.len(), "cleanup.start");

        let records = match self.store.query_active().await {
            Ok(records) => records,
            Err(e) => {
                error!(error = ?e, "cleanup.fetch_records.failed");
                return CleanupStats { marked: 0, errors: 1 };
            }
        };

        let live = self.live_identity_set().await;
        debug!(records = records.len(), identities = live.len(),
            "cleanup.compare");

        let mut stats = CleanupStats::default();
        for record in &records {
            if self.exempt_sources.iter().any(|tag| *tag == record.source_tag) {
                debug!(record = %record.id, source = %record.source_tag,
                    "cleanup.exempt");
                continue;
            }

            let isrc_live = record.isrc.as_deref()
                .is_some_and(|isrc| live.contains(isrc));
            if isrc_live || live.contains(&record.composite_key()) {
                continue;
            }

            if self.dry_run {
                stats.marked += 1;
                info!(record = %record.id, title = %record.title,
                    "cleanup.marked.dry_run");
                continue;
            }
            match self.store.set_removed(&record.id).await {
                Ok(()) => {
                    stats.marked += 1;
                    info!(record = %record.id, title = %record.title,
                        "cleanup.marked");
                }
                Err(e) => {
                    stats.errors += 1;
                    error!(error = ?e, record = %record.id,
                        "cleanup.mark.failed");
                }
            }
        }

        info!(marked = stats.marked, errors = stats.errors, "cleanup.done");
        stats
    }

    /// Every identity currently live in any configured playlist: the ISRC
    /// when present plus the lowercased title:artist composite. A playlist
    /// whose re-fetch fails contributes nothing, which can over-mark.
    async fn live_identity_set(&self) -> HashSet<String> {
        let mut live = HashSet::new();
        for playlist in &self.playlists {
            let api = self.sources.get(playlist.source);
            let items = match api.playlist_tracks(&playlist.id).await {
                Ok(items) => items,
                Err(e) => {
                    warn!(error = ?e, playlist = %playlist.id,
                        source = playlist.source.as_str(),
                        "cleanup.refetch.failed");
                    continue;
                }
            };
            for raw in &items {
                let track = match normalize::normalize(
                    playlist.source, raw, &playlist.id, playlist.kind
                ) {
                    Ok(track) => track,
                    Err(e) => {
                        debug!(error = ?e, "cleanup.normalize.skipped");
                        continue;
                    }
                };
                if let Some(isrc) = &track.isrc {
                    live.insert(isrc.clone());
                }
                live.insert(track.composite_key());
            }
        }
        live
    }
}
