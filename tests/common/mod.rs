//! Shared fixtures: an in-memory BookStack API.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use bookstack_export::adapters::{ApiClient, HttpError};
use bookstack_export::config::ApiUrls;
use serde_json::{json, Value};

pub const HOST: &str = "https://wiki.test";

/// Canned responses keyed by URL; unknown URLs answer 404
#[derive(Default)]
pub struct MockApi {
    json: HashMap<String, Value>,
    bytes: HashMap<String, Vec<u8>>,
    failing: HashSet<String>,
    calls: Mutex<Vec<String>>,
}

impl MockApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn urls() -> ApiUrls {
        ApiUrls::from_host(HOST)
    }

    pub fn with_json(mut self, url: impl Into<String>, body: Value) -> Self {
        self.json.insert(url.into(), body);
        self
    }

    pub fn with_bytes(mut self, url: impl Into<String>, body: &[u8]) -> Self {
        self.bytes.insert(url.into(), body.to_vec());
        self
    }

    /// Make a URL answer 500
    pub fn failing(mut self, url: impl Into<String>) -> Self {
        self.failing.insert(url.into());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, url: &str) -> Result<(), HttpError> {
        self.calls.lock().unwrap().push(url.to_string());
        if self.failing.contains(url) {
            return Err(HttpError::Status {
                status: 500,
                url: url.to_string(),
            });
        }
        Ok(())
    }

    fn not_found(url: &str) -> HttpError {
        HttpError::Status {
            status: 404,
            url: url.to_string(),
        }
    }
}

#[async_trait]
impl ApiClient for MockApi {
    async fn get_json(&self, url: &str) -> Result<Value, HttpError> {
        self.record(url)?;
        self.json.get(url).cloned().ok_or_else(|| Self::not_found(url))
    }

    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, HttpError> {
        self.record(url)?;
        if let Some(body) = self.bytes.get(url) {
            return Ok(body.clone());
        }
        match self.json.get(url) {
            Some(body) => Ok(serde_json::to_vec(body).unwrap()),
            None => Err(Self::not_found(url)),
        }
    }
}

pub fn api(path: &str) -> String {
    format!("{}/api/{}", HOST, path)
}

pub fn listing(ids: &[u64]) -> Value {
    json!({ "data": ids.iter().map(|id| json!({ "id": id })).collect::<Vec<_>>() })
}

/// Shelf `engineering` → book `handbook` → chapter `onboarding` → page `first-day`
pub fn single_chain() -> MockApi {
    MockApi::new()
        .with_json(api("shelves"), listing(&[1]))
        .with_json(
            api("shelves/1"),
            json!({"id": 1, "slug": "engineering", "name": "Engineering", "books": [{"id": 10}]}),
        )
        .with_json(api("books"), listing(&[10]))
        .with_json(
            api("books/10"),
            json!({
                "id": 10, "slug": "handbook", "name": "Handbook",
                "contents": [{"id": 20, "type": "chapter"}]
            }),
        )
        .with_json(api("chapters"), listing(&[20]))
        .with_json(
            api("chapters/20"),
            json!({
                "id": 20, "slug": "onboarding", "name": "Onboarding", "book_id": 10,
                "pages": [{"id": 30}]
            }),
        )
        .with_json(
            api("pages/30"),
            json!({"id": 30, "slug": "first-day", "name": "First Day", "book_id": 10, "chapter_id": 20}),
        )
        .with_bytes(api("pages/30/export/markdown"), b"# First Day\n")
}

/// Entry paths and contents of a `.tgz`
pub fn read_archive(path: &Path) -> Vec<(String, Vec<u8>)> {
    let file = File::open(path).unwrap();
    let mut archive = tar::Archive::new(flate2::read::GzDecoder::new(file));
    archive
        .entries()
        .unwrap()
        .map(|entry| {
            let mut entry = entry.unwrap();
            let path = entry.path().unwrap().to_string_lossy().to_string();
            let mut data = Vec::new();
            entry.read_to_end(&mut data).unwrap();
            (path, data)
        })
        .collect()
}
