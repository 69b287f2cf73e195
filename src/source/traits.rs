use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::engine::credentials::Credentials;

/// A catalogue search. Empty `languages`/`extensions` mean "no filter".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchRequest {
    pub message: String,
    pub languages: Vec<String>,
    pub extensions: Vec<String>,
}

impl SearchRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn language(mut self, lang: impl Into<String>) -> Self {
        self.languages.push(lang.into());
        self
    }

    pub fn extension(mut self, ext: impl Into<String>) -> Self {
        self.extensions.push(ext.into());
        self
    }
}

/// One search hit, kept exactly as the catalogue sent it.
///
/// The accessors read the handful of fields the gateway needs; everything
/// else (including nulls and numeric ids) is passed through untouched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct BookResult {
    raw: Value,
}

impl BookResult {
    pub fn new(id: impl Into<String>, hash: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            raw: json!({ "id": id.into(), "hash": hash.into(), "title": title.into() }),
        }
    }

    pub fn with_extension(mut self, ext: impl Into<String>) -> Self {
        if let Value::Object(map) = &mut self.raw {
            map.insert("extension".to_string(), Value::String(ext.into()));
        }
        self
    }

    /// Catalogue id as text; numeric ids are rendered in decimal.
    pub fn id(&self) -> String {
        match &self.raw["id"] {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => String::new(),
        }
    }

    pub fn hash(&self) -> &str {
        self.raw["hash"].as_str().unwrap_or_default()
    }

    /// Empty when missing or null.
    pub fn title(&self) -> &str {
        self.raw["title"].as_str().unwrap_or_default()
    }

    pub fn extension(&self) -> Option<&str> {
        self.raw["extension"].as_str()
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }
}

/// Bytes fetched from the catalogue plus the name it reported.
#[derive(Debug, Clone)]
pub struct DownloadedFile {
    pub filename: String,
    pub bytes: Bytes,
}

/// A logged-in (or login-attempted) catalogue handle.
#[async_trait]
pub trait LibraryClient: Send + Sync {
    fn is_logged_in(&self) -> bool;
    async fn search(&self, request: &SearchRequest) -> Result<Vec<BookResult>>;
    async fn download_book(&self, book: &BookResult) -> Result<DownloadedFile>;
    async fn download_by_id_and_hash(&self, id: &str, hash: &str) -> Result<DownloadedFile>;
}

/// Builds a catalogue handle from credentials.
///
/// Rejected credentials yield a handle whose `is_logged_in` is false;
/// `Err` is reserved for transport failures.
#[async_trait]
pub trait LibraryConnector: Send + Sync {
    async fn connect(&self, credentials: &Credentials) -> Result<Arc<dyn LibraryClient>>;
}
