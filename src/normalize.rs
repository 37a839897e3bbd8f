//!
//! src/normalize.rs
//!
//! Converts one raw playlist item from either catalog into the
//! canonical Track shape. Title and source id are required; every
//! other field is best-effort and a miss is only a logged gap
//!

use serde_json::Value;
use tracing::debug;

use crate::errors::SyncError;
use crate::types::{PlaylistKind, Source, Track};

pub fn normalize(source: Source, raw: &Value, playlist_name: &str,
    kind: PlaylistKind) -> Result<Track, SyncError> {
    let track = match source {
        Source::Spotify    => normalize_spotify(raw, playlist_name, kind)?,
        Source::AppleMusic => normalize_apple(raw, playlist_name, kind)?
    };
    log_gaps(&track);
    Ok(track)
}

/// Best-effort id and title for log lines when an item cannot be
/// normalized at all
pub fn item_summary(source: Source, raw: &Value) -> (String, String) {
    match source {
        Source::Spotify => {
            let item = raw.get("track").unwrap_or(raw);
            (str_at(item, "/id"), str_at(item, "/name"))
        }
        Source::AppleMusic => {
            (str_at(raw, "/id"), str_at(raw, "/attributes/name"))
        }
    }
}

fn str_at(v: &Value, pointer: &str) -> String {
    v.pointer(pointer)
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string()
}

fn opt_string(v: &Value, pointer: &str) -> Option<String> {
    v.pointer(pointer)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn normalize_spotify(raw: &Value, playlist_name: &str, kind: PlaylistKind)
    -> Result<Track, SyncError> {
    // playlist entries arrive wrapped as {"track": {...}}
    let item = raw.get("track").unwrap_or(raw);

    let source_id = item.get("id")
        .and_then(|v| v.as_str())
        .ok_or_else(|| SyncError::Parse("spotify item missing id".into()))?
        .to_string();
    let title = item.get("name")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| SyncError::Parse(
            format!("spotify item {source_id} missing name")
        ))?
        .to_string();

    let artists: Vec<String> = item.get("artists")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|a| a.get("name").and_then(|v| v.as_str()))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    let artist = artists.first().cloned();
    let performed_by = if artists.is_empty() {
        None
    } else {
        Some(artists.join(", "))
    };

    Ok( Track {
        source: Source::Spotify,
        source_id,
        title,
        artist,
        performed_by,
        album: opt_string(item, "/album/name"),
        track_number: item.get("track_number").and_then(|v| v.as_i64()),
        release_date: opt_string(item, "/album/release_date"),
        duration_s: item.get("duration_ms").and_then(|v| v.as_i64()).map(|ms| ms / 1000),
        isrc: opt_string(item, "/external_ids/isrc"),
        url: opt_string(item, "/external_urls/spotify"),
        composer: None,
        playlist_name: playlist_name.to_string(),
        playlist_kind: kind
    })
}

fn normalize_apple(raw: &Value, playlist_name: &str, kind: PlaylistKind)
    -> Result<Track, SyncError> {
    let source_id = raw.get("id")
        .and_then(|v| v.as_str())
        .ok_or_else(|| SyncError::Parse("apple item missing id".into()))?
        .to_string();
    let attributes = raw.get("attributes")
        .ok_or_else(|| SyncError::Parse(
            format!("apple item {source_id} missing attributes")
        ))?;
    let title = attributes.get("name")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| SyncError::Parse(
            format!("apple item {source_id} missing name")
        ))?
        .to_string();

    Ok( Track {
        source: Source::AppleMusic,
        source_id,
        title,
        artist: opt_string(attributes, "/artistName"),
        performed_by: None,
        album: opt_string(attributes, "/albumName"),
        track_number: attributes.get("trackNumber").and_then(|v| v.as_i64()),
        release_date: opt_string(attributes, "/releaseDate"),
        duration_s: attributes.get("durationInMillis")
            .and_then(|v| v.as_i64())
            .map(|ms| ms / 1000),
        isrc: opt_string(attributes, "/isrc"),
        url: opt_string(attributes, "/url"),
        composer: opt_string(attributes, "/composerName"),
        playlist_name: playlist_name.to_string(),
        playlist_kind: kind
    })
}

fn log_gaps(track: &Track) {
    let mut gaps: Vec<&str> = Vec::new();
    if track.artist.is_none()       { gaps.push("artist"); }
    if track.album.is_none()        { gaps.push("album"); }
    if track.track_number.is_none() { gaps.push("track_number"); }
    if track.release_date.is_none() { gaps.push("release_date"); }
    if track.duration_s.is_none()   { gaps.push("duration"); }
    if track.isrc.is_none()         { gaps.push("isrc"); }
    if track.url.is_none()          { gaps.push("url"); }
    if track.source == Source::AppleMusic && track.composer.is_none() {
        gaps.push("composer");
    }
    if !gaps.is_empty() {
        debug!(
            source = track.source.as_str(),
            id = %track.source_id,
            title = %track.title,
            gaps = ?gaps,
            "normalize.metadata.gap"
        );
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::source::fake::{apple_item, spotify_item};
    use super::*;

    #[test]
    fn spotify_item_maps_all_fields() {
        let raw = spotify_item("6GtOsEzN", "Breathe Deeper", "Tame Impala",
            Some("AUUM71900929"));
        let track = normalize(Source::Spotify, &raw, "Morning Mix",
            PlaylistKind::Source).unwrap();

        assert_eq!(track.source, Source::Spotify);
        assert_eq!(track.source_id, "6GtOsEzN");
        assert_eq!(track.title, "Breathe Deeper");
        assert_eq!(track.artist.as_deref(), Some("Tame Impala"));
        assert_eq!(track.isrc.as_deref(), Some("AUUM71900929"));
        assert_eq!(track.album.as_deref(), Some("Currents"));
        assert_eq!(track.playlist_name, "Morning Mix");
        assert_eq!(track.playlist_kind, PlaylistKind::Source);
        assert!(track.composer.is_none());
    }

    #[test]
    fn spotify_duration_is_whole_seconds() {
        let mut raw = spotify_item("id1", "Song", "Artist", None);
        raw["track"]["duration_ms"] = json!(201_999);
        let track = normalize(Source::Spotify, &raw, "P", PlaylistKind::Source)
            .unwrap();
        assert_eq!(track.duration_s, Some(201));
    }

    #[test]
    fn spotify_joins_all_artists_into_performed_by() {
        let mut raw = spotify_item("id1", "Breathe Deeper", "Tame Impala", None);
        raw["track"]["artists"] = json!([
            {"name": "Tame Impala"}, {"name": "Lil Yachty"}
        ]);
        let track = normalize(Source::Spotify, &raw, "P", PlaylistKind::Source)
            .unwrap();
        assert_eq!(track.artist.as_deref(), Some("Tame Impala"));
        assert_eq!(track.performed_by.as_deref(),
            Some("Tame Impala, Lil Yachty"));
    }

    #[test]
    fn apple_item_maps_composer_and_duration() {
        let raw = apple_item("1440833100", "Prelude in C", "Lang Lang",
            Some("DEF057300101"), Some("J.S. Bach"));
        let track = normalize(Source::AppleMusic, &raw, "Practice",
            PlaylistKind::Score).unwrap();

        assert_eq!(track.source, Source::AppleMusic);
        assert_eq!(track.composer.as_deref(), Some("J.S. Bach"));
        assert_eq!(track.duration_s, Some(187));
        assert_eq!(track.track_number, Some(3));
        assert_eq!(track.playlist_kind, PlaylistKind::Score);
    }

    #[test]
    fn missing_optional_fields_are_left_absent() {
        let raw = json!({"track": {"id": "id2", "name": "Untagged"}});
        let track = normalize(Source::Spotify, &raw, "P", PlaylistKind::Source)
            .unwrap();
        assert!(track.artist.is_none());
        assert!(track.album.is_none());
        assert!(track.duration_s.is_none());
        assert!(track.isrc.is_none());
        assert!(track.url.is_none());
    }

    #[test]
    fn missing_title_is_an_error() {
        let raw = json!({"track": {"id": "id3"}});
        assert!(normalize(Source::Spotify, &raw, "P", PlaylistKind::Source)
            .is_err());

        let raw = json!({"id": "id4", "attributes": {}});
        assert!(normalize(Source::AppleMusic, &raw, "P", PlaylistKind::Source)
            .is_err());
    }

    #[test]
    fn item_summary_survives_malformed_items() {
        let (id, title) = item_summary(Source::Spotify, &json!({"track": {}}));
        assert_eq!(id, "unknown");
        assert_eq!(title, "unknown");

        let raw = apple_item("a1", "Nocturne", "Someone", None, None);
        let (id, title) = item_summary(Source::AppleMusic, &raw);
        assert_eq!(id, "a1");
        assert_eq!(title, "Nocturne");
    }
}
