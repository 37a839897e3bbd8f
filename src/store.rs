//!
//! src/store.rs
//!
//! Sink-side contract for the record database, and its Notion
//! implementation. Queries use the database's `contains` filter
//! semantics and come back newest-created-first; updates patch only
//! the automated properties so hand-entered fields survive
//!

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::warn;

use crate::config::RetryConfig;
use crate::errors::SyncError;
use crate::fetch::{self, NotionClient};
use crate::types::{PlaylistKind, Record, RecordFields};

pub const PROP_TITLE: &str = "Title";
pub const PROP_ARTIST: &str = "Artist";
pub const PROP_PERFORMED_BY: &str = "Performed By";
pub const PROP_ALBUM: &str = "Album";
pub const PROP_TRACK_NUMBER: &str = "Track Number";
pub const PROP_RELEASE_DATE: &str = "Release Date";
pub const PROP_DURATION: &str = "Duration";
pub const PROP_ISRC: &str = "ISRC";
pub const PROP_URL: &str = "URL";
pub const PROP_COMPOSER: &str = "Composer";
pub const PROP_PLAYLIST: &str = "Playlist";
pub const PROP_KIND: &str = "Type";
pub const PROP_SOURCE: &str = "Source";
pub const PROP_REMOVED: &str = "Removed";

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn query_isrc_contains(&self, isrc: &str)
        -> Result<Vec<Record>, SyncError>;
    async fn query_title_contains(&self, title: &str)
        -> Result<Vec<Record>, SyncError>;
    /// Every record not yet marked removed
    async fn query_active(&self) -> Result<Vec<Record>, SyncError>;
    async fn create(&self, fields: &RecordFields) -> Result<Record, SyncError>;
    async fn update(&self, id: &str, fields: &RecordFields)
        -> Result<Record, SyncError>;
    async fn set_removed(&self, id: &str) -> Result<(), SyncError>;
}

pub struct NotionStore {
    client: NotionClient,
    retry: RetryConfig
}

impl NotionStore {
    pub fn new(client: NotionClient, retry: RetryConfig) -> Self {
        Self { client, retry }
    }

    async fn run_query(&self, filter: Value) -> Result<Vec<Record>, SyncError> {
        let mut records = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let mut body = json!({
                "filter": filter,
                "sorts": [{"timestamp": "created_time", "direction": "descending"}],
                "page_size": 100
            });
            if let Some(c) = &cursor {
                body["start_cursor"] = json!(c);
            }

            let value = fetch::http_with_retry(
                self.client.query_database(&body),
                &self.retry
            ).await.map_err(|e| SyncError::Sink(e.to_string()))?;

            let results = value.get("results")
                .and_then(|v| v.as_array())
                .cloned()
                .unwrap_or_default();
            for page in &results {
                match page_to_record(page) {
                    Ok(record) => records.push(record),
                    Err(e) => warn!(error = ?e, "store.page.unreadable")
                }
            }

            let has_more = value.get("has_more")
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
            if !has_more {
                break;
            }
            cursor = value.get("next_cursor")
                .and_then(|v| v.as_str())
                .map(str::to_string);
            if cursor.is_none() {
                break;
            }
        }
        Ok(records)
    }
}

#[async_trait]
impl RecordStore for NotionStore {
    async fn query_isrc_contains(&self, isrc: &str)
        -> Result<Vec<Record>, SyncError> {
        self.run_query(json!({
            "property": PROP_ISRC,
            "rich_text": {"contains": isrc}
        })).await
    }

    async fn query_title_contains(&self, title: &str)
        -> Result<Vec<Record>, SyncError> {
        self.run_query(json!({
            "property": PROP_TITLE,
            "title": {"contains": title}
        })).await
    }

    async fn query_active(&self) -> Result<Vec<Record>, SyncError> {
        self.run_query(json!({
            "property": PROP_REMOVED,
            "checkbox": {"equals": false}
        })).await
    }

    async fn create(&self, fields: &RecordFields) -> Result<Record, SyncError> {
        let body = json!({
            "parent": {"database_id": self.client.database_id},
            "properties": fields_to_properties(fields)
        });
        let value = fetch::http_with_retry(
            self.client.create_page(&body),
            &self.retry
        ).await.map_err(|e| SyncError::Sink(e.to_string()))?;
        page_to_record(&value)
    }

    async fn update(&self, id: &str, fields: &RecordFields)
        -> Result<Record, SyncError> {
        let body = json!({"properties": fields_to_properties(fields)});
        let value = fetch::http_with_retry(
            self.client.update_page(id, &body),
            &self.retry
        ).await.map_err(|e| SyncError::Sink(e.to_string()))?;
        page_to_record(&value)
    }

    async fn set_removed(&self, id: &str) -> Result<(), SyncError> {
        let body = json!({
            "properties": {PROP_REMOVED: {"checkbox": true}}
        });
        fetch::http_with_retry(
            self.client.update_page(id, &body),
            &self.retry
        ).await.map_err(|e| SyncError::Sink(e.to_string()))?;
        Ok(())
    }
}

fn rich_text(content: &str) -> Value {
    json!({"rich_text": [{"text": {"content": content}}]})
}

/// Builds the automated-property map; absent optional fields are simply
/// not included, so an update never clears a property this job has no
/// value for
fn fields_to_properties(fields: &RecordFields) -> Value {
    let mut props = serde_json::Map::new();
    props.insert(
        PROP_TITLE.to_string(),
        json!({"title": [{"text": {"content": fields.title}}]})
    );
    if let Some(artist) = &fields.artist {
        props.insert(PROP_ARTIST.to_string(), rich_text(artist));
    }
    if let Some(performed_by) = &fields.performed_by {
        props.insert(PROP_PERFORMED_BY.to_string(), rich_text(performed_by));
    }
    if let Some(album) = &fields.album {
        props.insert(PROP_ALBUM.to_string(), rich_text(album));
    }
    if let Some(track_number) = fields.track_number {
        props.insert(PROP_TRACK_NUMBER.to_string(), json!({"number": track_number}));
    }
    if let Some(release_date) = &fields.release_date {
        props.insert(
            PROP_RELEASE_DATE.to_string(),
            json!({"date": {"start": release_date}})
        );
    }
    if let Some(duration_s) = fields.duration_s {
        props.insert(PROP_DURATION.to_string(), json!({"number": duration_s}));
    }
    if let Some(isrc) = &fields.isrc {
        props.insert(PROP_ISRC.to_string(), rich_text(isrc));
    }
    if let Some(url) = &fields.url {
        props.insert(PROP_URL.to_string(), json!({"url": url}));
    }
    if let Some(composer) = &fields.composer {
        props.insert(PROP_COMPOSER.to_string(), rich_text(composer));
    }
    props.insert(PROP_PLAYLIST.to_string(), rich_text(&fields.playlist_name));
    props.insert(
        PROP_KIND.to_string(),
        json!({"select": {"name": fields.playlist_kind.as_str()}})
    );
    props.insert(
        PROP_SOURCE.to_string(),
        json!({"select": {"name": fields.source_tag}})
    );
    props.insert(PROP_REMOVED.to_string(), json!({"checkbox": fields.removed}));
    Value::Object(props)
}

fn text_value(prop: &Value, field: &str) -> Option<String> {
    let parts = prop.get(field)?.as_array()?;
    let text: String = parts.iter()
        .filter_map(|p| p.get("plain_text").and_then(|t| t.as_str()))
        .collect();
    if text.is_empty() { None } else { Some(text) }
}

fn number_value(prop: &Value) -> Option<i64> {
    prop.get("number").and_then(|v| v.as_i64())
}

fn date_value(prop: &Value) -> Option<String> {
    prop.pointer("/date/start").and_then(|v| v.as_str()).map(str::to_string)
}

fn url_value(prop: &Value) -> Option<String> {
    prop.get("url").and_then(|v| v.as_str()).map(str::to_string)
}

fn select_value(prop: &Value) -> Option<String> {
    prop.pointer("/select/name").and_then(|v| v.as_str()).map(str::to_string)
}

fn checkbox_value(prop: &Value) -> bool {
    prop.get("checkbox").and_then(|v| v.as_bool()).unwrap_or(false)
}

fn page_to_record(page: &Value) -> Result<Record, SyncError> {
    let id = page.get("id")
        .and_then(|v| v.as_str())
        .ok_or_else(|| SyncError::Parse("page missing id".into()))?
        .to_string();
    let props = page.get("properties")
        .ok_or_else(|| SyncError::Parse(format!("page {id} missing properties")))?;

    let get = |name: &str| props.get(name);

    Ok( Record {
        id,
        title: get(PROP_TITLE)
            .and_then(|p| text_value(p, "title"))
            .unwrap_or_default(),
        artist: get(PROP_ARTIST).and_then(|p| text_value(p, "rich_text")),
        performed_by: get(PROP_PERFORMED_BY).and_then(|p| text_value(p, "rich_text")),
        album: get(PROP_ALBUM).and_then(|p| text_value(p, "rich_text")),
        track_number: get(PROP_TRACK_NUMBER).and_then(number_value),
        release_date: get(PROP_RELEASE_DATE).and_then(date_value),
        duration_s: get(PROP_DURATION).and_then(number_value),
        isrc: get(PROP_ISRC).and_then(|p| text_value(p, "rich_text")),
        url: get(PROP_URL).and_then(url_value),
        composer: get(PROP_COMPOSER).and_then(|p| text_value(p, "rich_text")),
        playlist_name: get(PROP_PLAYLIST).and_then(|p| text_value(p, "rich_text")),
        playlist_kind: get(PROP_KIND)
            .and_then(select_value)
            .as_deref()
            .and_then(PlaylistKind::parse),
        source_tag: get(PROP_SOURCE).and_then(select_value).unwrap_or_default(),
        removed: get(PROP_REMOVED).map(checkbox_value).unwrap_or(false),
        created_time: page.get("created_time")
            .and_then(|v| v.as_str())
            .map(str::to_string)
    })
}

#[cfg(test)]
pub mod memory {
    //! In-memory record store used by resolver, policy, driver and
    //! cleanup tests. Insertion order emulates the sink's
    //! newest-created-first query ordering.

    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;

    use crate::errors::SyncError;
    use crate::types::{Record, RecordFields};
    use super::RecordStore;

    #[derive(Default)]
    pub struct MemoryStore {
        records: Mutex<Vec<Record>>,
        next_id: AtomicUsize,
        writes: AtomicUsize,
        fail_queries: AtomicBool,
        fail_create_titles: Mutex<HashSet<String>>,
        fail_remove_ids: Mutex<HashSet<String>>
    }

    impl MemoryStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn seeded(records: Vec<Record>) -> Self {
            let store = Self::new();
            *store.records.lock().unwrap() = records;
            store
        }

        pub fn writes(&self) -> usize {
            self.writes.load(Ordering::SeqCst)
        }

        pub fn records(&self) -> Vec<Record> {
            self.records.lock().unwrap().clone()
        }

        pub fn fail_queries(&self) {
            self.fail_queries.store(true, Ordering::SeqCst);
        }

        pub fn fail_create_for(&self, title: &str) {
            self.fail_create_titles.lock().unwrap().insert(title.to_string());
        }

        pub fn fail_remove_for(&self, id: &str) {
            self.fail_remove_ids.lock().unwrap().insert(id.to_string());
        }

        fn check_queries(&self) -> Result<(), SyncError> {
            if self.fail_queries.load(Ordering::SeqCst) {
                Err(SyncError::Sink("query failed".into()))
            } else {
                Ok(())
            }
        }
    }

    /// Record with sensible defaults for seeding test stores
    pub fn seed_record(id: &str, title: &str, artist: Option<&str>,
        isrc: Option<&str>, source_tag: &str) -> Record {
        Record {
            id: id.to_string(),
            title: title.to_string(),
            artist: artist.map(str::to_string),
            performed_by: None,
            album: None,
            track_number: None,
            release_date: None,
            duration_s: Some(200),
            isrc: isrc.map(str::to_string),
            url: None,
            composer: None,
            playlist_name: None,
            playlist_kind: None,
            source_tag: source_tag.to_string(),
            removed: false,
            created_time: None
        }
    }

    fn apply_fields(record: &mut Record, fields: &RecordFields) {
        record.title = fields.title.clone();
        record.artist = fields.artist.clone();
        record.performed_by = fields.performed_by.clone();
        record.album = fields.album.clone();
        record.track_number = fields.track_number;
        record.release_date = fields.release_date.clone();
        record.duration_s = fields.duration_s;
        record.isrc = fields.isrc.clone();
        record.url = fields.url.clone();
        record.composer = fields.composer.clone();
        record.playlist_name = Some(fields.playlist_name.clone());
        record.playlist_kind = Some(fields.playlist_kind);
        record.source_tag = fields.source_tag.clone();
        record.removed = fields.removed;
    }

    #[async_trait]
    impl RecordStore for MemoryStore {
        async fn query_isrc_contains(&self, isrc: &str)
            -> Result<Vec<Record>, SyncError> {
            self.check_queries()?;
            Ok(self.records.lock().unwrap().iter()
                .filter(|r| r.isrc.as_deref().is_some_and(|i| i.contains(isrc)))
                .cloned()
                .collect())
        }

        async fn query_title_contains(&self, title: &str)
            -> Result<Vec<Record>, SyncError> {
            self.check_queries()?;
            Ok(self.records.lock().unwrap().iter()
                .filter(|r| r.title.contains(title))
                .cloned()
                .collect())
        }

        async fn query_active(&self) -> Result<Vec<Record>, SyncError> {
            self.check_queries()?;
            Ok(self.records.lock().unwrap().iter()
                .filter(|r| !r.removed)
                .cloned()
                .collect())
        }

        async fn create(&self, fields: &RecordFields)
            -> Result<Record, SyncError> {
            if self.fail_create_titles.lock().unwrap().contains(&fields.title) {
                return Err(SyncError::Sink(
                    format!("create failed for {}", fields.title)
                ));
            }
            let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
            let mut record = seed_record(&format!("rec-{n}"), "", None, None, "");
            apply_fields(&mut record, fields);
            // newest first, matching sink query order
            self.records.lock().unwrap().insert(0, record.clone());
            self.writes.fetch_add(1, Ordering::SeqCst);
            Ok(record)
        }

        async fn update(&self, id: &str, fields: &RecordFields)
            -> Result<Record, SyncError> {
            let mut records = self.records.lock().unwrap();
            let record = records.iter_mut()
                .find(|r| r.id == id)
                .ok_or_else(|| SyncError::Sink(format!("no record {id}")))?;
            apply_fields(record, fields);
            let updated = record.clone();
            drop(records);
            self.writes.fetch_add(1, Ordering::SeqCst);
            Ok(updated)
        }

        async fn set_removed(&self, id: &str) -> Result<(), SyncError> {
            if self.fail_remove_ids.lock().unwrap().contains(id) {
                return Err(SyncError::Sink(format!("remove failed for {id}")));
            }
            let mut records = self.records.lock().unwrap();
            let record = records.iter_mut()
                .find(|r| r.id == id)
                .ok_or_else(|| SyncError::Sink(format!("no record {id}")))?;
            record.removed = true;
            drop(records);
            self.writes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }
}
