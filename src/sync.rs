//!
//! src/sync.rs
//!
//! Drives one run: every configured playlist through normalize,
//! resolve and upsert, one track at a time with pacing, then a single
//! cleanup pass. The run always finishes and reports a summary, even
//! when every item failed
//!

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::time::sleep;
use tracing::{error, info};
use uuid::Uuid;

use crate::cleanup::{CleanupReconciler, CleanupStats};
use crate::config::SyncConfig;
use crate::errors::SyncError;
use crate::normalize;
use crate::resolve::Resolve;
use crate::source::Sources;
use crate::store::RecordStore;
use crate::types::{PlaylistConfig, Source};
use crate::upsert::{UpsertOutcome, UpsertPolicy};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SourceStats {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub errors: usize
}

impl SourceStats {
    pub fn record(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Created => self.created += 1,
            UpsertOutcome::Updated => self.updated += 1,
            UpsertOutcome::Skipped => self.skipped += 1
        }
    }

    pub fn merge(&mut self, other: &SourceStats) {
        self.created += other.created;
        self.updated += other.updated;
        self.skipped += other.skipped;
        self.errors  += other.errors;
    }

    pub fn total(&self) -> usize {
        self.created + self.updated + self.skipped + self.errors
    }
}

#[derive(Debug, Clone)]
pub struct SyncSummary {
    pub run_id: Uuid,
    pub spotify: SourceStats,
    pub apple_music: SourceStats,
    pub cleanup: CleanupStats,
    pub total_duration: Duration,
    pub finished: DateTime<Utc>
}

impl SyncSummary {
    fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            spotify: SourceStats::default(),
            apple_music: SourceStats::default(),
            cleanup: CleanupStats::default(),
            total_duration: Duration::ZERO,
            finished: Utc::now()
        }
    }

    pub fn stats(&self, source: Source) -> &SourceStats {
        match source {
            Source::Spotify    => &self.spotify,
            Source::AppleMusic => &self.apple_music
        }
    }

    fn stats_mut(&mut self, source: Source) -> &mut SourceStats {
        match source {
            Source::Spotify    => &mut self.spotify,
            Source::AppleMusic => &mut self.apple_music
        }
    }
}

pub struct SyncDriver {
    sources: Sources,
    store: Arc<dyn RecordStore>,
    resolver: Arc<dyn Resolve>,
    policy: UpsertPolicy,
    playlists: Vec<PlaylistConfig>,
    pacing: Duration,
    cleanup: CleanupReconciler
}

impl SyncDriver {
    pub fn new(
        sources: Sources,
        store: Arc<dyn RecordStore>,
        resolver: Arc<dyn Resolve>,
        cfg: &SyncConfig
    ) -> Self {
        let cleanup = CleanupReconciler::new(
            store.clone(),
            sources.clone(),
            cfg.playlists.clone(),
            cfg.manual_sources.clone(),
            cfg.dry_run
        );
        Self {
            sources,
            store,
            resolver,
            policy: UpsertPolicy { mode: cfg.mode, dry_run: cfg.dry_run },
            playlists: cfg.playlists.clone(),
            pacing: cfg.pacing,
            cleanup
        }
    }

    pub async fn run(&self) -> SyncSummary {
        let run_id = Uuid::new_v4();
        let started = Instant::now();
        info!(
            run_id = %run_id,
            playlists = self.playlists.len(),
            mode = self.policy.mode.as_str(),
            dry_run = self.policy.dry_run,
            "sync.run.start"
        );

        let mut summary = SyncSummary::new(run_id);
        for playlist in &self.playlists {
            match self.sync_playlist(playlist).await {
                Ok(stats) => summary.stats_mut(playlist.source).merge(&stats),
                Err(e) => {
                    // fatal for this playlist only; the rest still run
                    error!(
                        error = ?e,
                        source = playlist.source.as_str(),
                        playlist = %playlist.id,
                        "sync.playlist.aborted"
                    );
                }
            }
        }

        summary.cleanup = self.cleanup.reconcile().await;
        summary.total_duration = started.elapsed();
        summary.finished = Utc::now();
        info!(
            run_id = %run_id,
            spotify = ?summary.spotify,
            apple_music = ?summary.apple_music,
            cleanup = ?summary.cleanup,
            duration_ms = summary.total_duration.as_millis() as u64,
            "sync.run.done"
        );
        summary
    }

    async fn sync_playlist(&self, playlist: &PlaylistConfig)
        -> Result<SourceStats, SyncError> {
        let api = self.sources.get(playlist.source);

        if !api.check_health().await? {
            return Err(SyncError::Http(format!(
                "{} health check failed", playlist.source.as_str()
            )));
        }

        // playlist display name is cosmetic, fall back to the raw id
        let name = match api.playlist_meta(&playlist.id).await {
            Ok(meta) => {
                info!(playlist = %meta.name, tracks = ?meta.track_count,
                    "sync.playlist.meta");
                meta.name
            }
            Err(e) => {
                info!(error = ?e, playlist = %playlist.id,
                    "sync.playlist.meta.fallback");
                playlist.id.clone()
            }
        };

        let items = api.playlist_tracks(&playlist.id).await?;
        info!(
            playlist = %name,
            source = playlist.source.as_str(),
            count = items.len(),
            "sync.playlist.start"
        );

        let mut stats = SourceStats::default();
        for raw in &items {
            match self.sync_item(playlist, raw, &name).await {
                Ok(outcome) => stats.record(outcome),
                Err(e) => {
                    let (id, title) = normalize::item_summary(playlist.source, raw);
                    error!(
                        error = ?e,
                        source = playlist.source.as_str(),
                        id = %id,
                        title = %title,
                        "sync.track.failed"
                    );
                    stats.errors += 1;
                }
            }
            if !self.pacing.is_zero() {
                sleep(self.pacing).await;
            }
        }

        info!(
            playlist = %name,
            created = stats.created,
            updated = stats.updated,
            skipped = stats.skipped,
            errors = stats.errors,
            "sync.playlist.done"
        );
        Ok(stats)
    }

    async fn sync_item(&self, playlist: &PlaylistConfig, raw: &serde_json::Value,
        playlist_name: &str) -> Result<UpsertOutcome, SyncError> {
        let track = normalize::normalize(
            playlist.source, raw, playlist_name, playlist.kind
        )?;
        let existing = self.resolver.resolve(&track).await;
        self.policy.apply(self.store.as_ref(), &track, existing.as_ref()).await
    }
}
