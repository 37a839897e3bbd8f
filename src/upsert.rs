//!
//! src/upsert.rs
//!
//! Decides create vs update vs skip for one resolved track, and does
//! the write unless the run is a dry run
//!

use tracing::{debug, info};

use crate::errors::SyncError;
use crate::store::RecordStore;
use crate::types::{Record, RecordFields, Track};

///
/// Deployment-wide policy for what happens when a track already has a
/// record. Update overwrites the automated fields; Preserve leaves the
/// record exactly as found so hand edits survive.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertMode {
    Update,
    Preserve
}

impl UpsertMode {
    pub fn as_str(self) -> &'static str {
        match self {
            UpsertMode::Update   => "update",
            UpsertMode::Preserve => "preserve"
        }
    }
    pub fn parse(s: &str) -> Option<UpsertMode> {
        match s {
            "update"   => Some(UpsertMode::Update),
            "preserve" => Some(UpsertMode::Preserve),
            _ => None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
    Skipped
}

#[derive(Debug, Clone, Copy)]
pub struct UpsertPolicy {
    pub mode: UpsertMode,
    pub dry_run: bool
}

impl UpsertPolicy {
    /// Write failures propagate; the driver counts them per track
    pub async fn apply(
        &self,
        store: &dyn RecordStore,
        track: &Track,
        existing: Option<&Record>
    ) -> Result<UpsertOutcome, SyncError> {
        match existing {
            None => {
                if !self.dry_run {
                    let created = store.create(&RecordFields::from_track(track))
                        .await?;
                    info!(
                        record = %created.id,
                        title = %track.title,
                        source = track.source.as_str(),
                        "upsert.created"
                    );
                } else {
                    info!(title = %track.title, "upsert.created.dry_run");
                }
                Ok(UpsertOutcome::Created)
            }
            Some(record) => match self.mode {
                UpsertMode::Update => {
                    if !self.dry_run {
                        // re-syncing always clears the removed flag
                        store.update(&record.id, &RecordFields::from_track(track))
                            .await?;
                        debug!(record = %record.id, title = %track.title,
                            "upsert.updated");
                    } else {
                        debug!(title = %track.title, "upsert.updated.dry_run");
                    }
                    Ok(UpsertOutcome::Updated)
                }
                UpsertMode::Preserve => {
                    debug!(record = %record.id, title = %track.title,
                        "upsert.skipped");
                    Ok(UpsertOutcome::Skipped)
                }
            }
        }
    }
}
