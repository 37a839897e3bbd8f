//!
//! src/types.rs
//!
//! Canonical track and record shapes shared across the sync pipeline,
//! plus the identity keys used for deduplication
//!

use serde::{Deserialize, Serialize};

///
/// Which streaming catalog a track or playlist came from. The string
/// form is what gets written into the sink's Source field.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Spotify,
    AppleMusic
}

impl Source {
    pub fn as_str(self) -> &'static str {
        match self {
            Source::Spotify    => "Spotify",
            Source::AppleMusic => "Apple Music"
        }
    }
    pub fn parse(s: &str) -> Option<Source> {
        match s {
            "Spotify"     => Some(Source::Spotify),
            "Apple Music" => Some(Source::AppleMusic),
            _ => None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaylistKind {
    Source,
    Score
}

impl PlaylistKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PlaylistKind::Source => "Source",
            PlaylistKind::Score  => "Score"
        }
    }
    pub fn parse(s: &str) -> Option<PlaylistKind> {
        match s {
            "Source" => Some(PlaylistKind::Source),
            "Score"  => Some(PlaylistKind::Score),
            _ => None
        }
    }
}

///
/// One configured playlist to sync, as given in SYNC_PLAYLISTS
///
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PlaylistConfig {
    pub source: Source,
    pub id: String,
    pub kind: PlaylistKind
}

#[derive(Debug, Clone)]
pub struct PlaylistMeta {
    pub name: String,
    pub track_count: Option<i64>
}

///
/// Canonical shape of one playlist entry, built fresh every run by the
/// per-source normalizers. Fields a source cannot provide stay None
/// rather than being defaulted.
///
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub source: Source,
    pub source_id: String,
    pub title: String,
    pub artist: Option<String>,
    pub performed_by: Option<String>,
    pub album: Option<String>,
    pub track_number: Option<i64>,
    pub release_date: Option<String>,
    pub duration_s: Option<i64>,
    pub isrc: Option<String>,
    pub url: Option<String>,
    pub composer: Option<String>,
    pub playlist_name: String,
    pub playlist_kind: PlaylistKind
}

impl Track {
    pub fn composite_key(&self) -> String {
        composite_key(&self.title, self.artist.as_deref().unwrap_or(""))
    }
}

///
/// One persisted page in the sink. Holds the automated fields this job
/// owns; any hand-entered properties live on the same page and are left
/// alone by updates. Records are only ever soft-deleted via `removed`.
///
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: String,
    pub title: String,
    pub artist: Option<String>,
    pub performed_by: Option<String>,
    pub album: Option<String>,
    pub track_number: Option<i64>,
    pub release_date: Option<String>,
    pub duration_s: Option<i64>,
    pub isrc: Option<String>,
    pub url: Option<String>,
    pub composer: Option<String>,
    pub playlist_name: Option<String>,
    pub playlist_kind: Option<PlaylistKind>,
    pub source_tag: String,
    pub removed: bool,
    pub created_time: Option<String>
}

impl Record {
    pub fn composite_key(&self) -> String {
        composite_key(&self.title, self.artist.as_deref().unwrap_or(""))
    }
}

///
/// The automated-field subset written on every create and update
///
#[derive(Debug, Clone, PartialEq)]
pub struct RecordFields {
    pub title: String,
    pub artist: Option<String>,
    pub performed_by: Option<String>,
    pub album: Option<String>,
    pub track_number: Option<i64>,
    pub release_date: Option<String>,
    pub duration_s: Option<i64>,
    pub isrc: Option<String>,
    pub url: Option<String>,
    pub composer: Option<String>,
    pub playlist_name: String,
    pub playlist_kind: PlaylistKind,
    pub source_tag: String,
    pub removed: bool
}

impl RecordFields {
    pub fn from_track(track: &Track) -> Self {
        Self {
            title: track.title.clone(),
            artist: track.artist.clone(),
            performed_by: track.performed_by.clone(),
            album: track.album.clone(),
            track_number: track.track_number,
            release_date: track.release_date.clone(),
            duration_s: track.duration_s,
            isrc: track.isrc.clone(),
            url: track.url.clone(),
            composer: track.composer.clone(),
            playlist_name: track.playlist_name.clone(),
            playlist_kind: track.playlist_kind,
            source_tag: track.source.as_str().to_string(),
            removed: false
        }
    }
}

/// Fallback identity key when no ISRC is available on either side
pub fn composite_key(title: &str, artist: &str) -> String {
    format!("{}:{}", title.to_lowercase(), artist.to_lowercase())
}
