//!
//! src/errors.rs
//!
//! Defines enums and methods of error conversion
//! for errors the sync job uses
//!
//!

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("config error: {0}")]
    Config(String),
    #[error("http error: {0}")]
    Http(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("sink error: {0}")]
    Sink(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error)
}

impl From<reqwest::Error> for SyncError {
    fn from(e: reqwest::Error) -> Self { SyncError::Http(e.to_string()) }
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self { SyncError::Parse(e.to_string()) }
}
