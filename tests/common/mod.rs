#![allow(dead_code)]

use actix_web::test::TestRequest;
use actix_web::web;
use anonboard::gate::API_KEY_HEADER;
use anonboard::repo::Repo;
use anonboard::storage::{BlobStore, BlobStoreError};
use anonboard::{AppConfig, AppState};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub const API_KEY: &str = "test-api-key-0123456789";
pub const SITE_PASSWORD: &str = "open-sesame";
pub const BLOB_BASE: &str = "http://localhost:8080/blobs";

// ---------------- In-memory Mock BlobStore (tests only) ----------------
#[derive(Default)]
pub struct MockBlobStore {
    inner: Mutex<HashMap<String, (Vec<u8>, String)>>,
    delete_calls: Mutex<Vec<String>>,
    fail_deletes: bool,
}

impl MockBlobStore {
    /// Every delete errors, as an unreachable S3 endpoint would.
    pub fn failing_deletes() -> Self {
        Self { fail_deletes: true, ..Self::default() }
    }

    pub fn put(&self, key: &str, mime: &str) {
        self.inner.lock().unwrap().insert(key.to_string(), (vec![1, 2, 3], mime.to_string()));
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.lock().unwrap().contains_key(key)
    }

    pub fn delete_calls(&self) -> Vec<String> {
        self.delete_calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl BlobStore for MockBlobStore {
    async fn save(&self, key: &str, mime: &str, bytes: &[u8]) -> Result<(), BlobStoreError> {
        let mut map = self.inner.lock().unwrap();
        if map.contains_key(key) {
            return Err(BlobStoreError::Duplicate);
        }
        map.insert(key.to_string(), (bytes.to_vec(), mime.to_string()));
        Ok(())
    }
    async fn load(&self, key: &str) -> Result<(Vec<u8>, String), BlobStoreError> {
        let map = self.inner.lock().unwrap();
        map.get(key).cloned().ok_or(BlobStoreError::NotFound)
    }
    async fn delete(&self, key: &str) -> Result<(), BlobStoreError> {
        self.delete_calls.lock().unwrap().push(key.to_string());
        if self.fail_deletes {
            return Err(BlobStoreError::Other("connection refused".into()));
        }
        self.inner.lock().unwrap().remove(key);
        Ok(())
    }
}

pub fn test_config() -> AppConfig {
    AppConfig::from_lookup(|name| match name {
        "API_KEY" => Some(API_KEY.into()),
        "SITE_PASSWORD" => Some(SITE_PASSWORD.into()),
        "BLOB_PUBLIC_URL" => Some(BLOB_BASE.into()),
        _ => None,
    })
    .unwrap()
}

pub fn app_state(store: Arc<MockBlobStore>) -> web::Data<AppState> {
    app_state_with_repo(Arc::new(anonboard::repo::inmem::InMemRepo::new()), store)
}

pub fn app_state_with_repo(repo: Arc<dyn Repo>, store: Arc<MockBlobStore>) -> web::Data<AppState> {
    web::Data::new(AppState { repo, blob_store: store, config: Arc::new(test_config()) })
}

/// Builds the full app over `state`, the same way `main` does minus CORS/Swagger.
macro_rules! test_app {
    ($state:expr) => {
        actix_web::test::init_service(
            actix_web::App::new().app_data($state.clone()).configure(anonboard::config),
        )
        .await
    };
}

pub fn api_get(uri: &str) -> TestRequest {
    TestRequest::get().uri(uri).insert_header((API_KEY_HEADER, API_KEY))
}

pub fn api_post(uri: &str, body: serde_json::Value) -> TestRequest {
    TestRequest::post().uri(uri).insert_header((API_KEY_HEADER, API_KEY)).set_json(body)
}

pub fn new_post(title: &str, content: &str, pin: &str) -> serde_json::Value {
    serde_json::json!({
        "title": title,
        "content": content,
        "nickname": "anon",
        "password": pin,
    })
}

pub fn new_comment(content: &str, password: &str, parent_id: Option<&str>) -> serde_json::Value {
    serde_json::json!({
        "content": content,
        "nickname": "anon",
        "password": password,
        "parent_id": parent_id,
    })
}

/// POSTs `$body` to `$uri` and returns `data.id` of the 201 response.
macro_rules! create_entity {
    ($app:expr, $uri:expr, $body:expr) => {{
        let resp = actix_web::test::call_service(&$app, common::api_post($uri, $body).to_request()).await;
        assert_eq!(resp.status(), 201, "create at {}", $uri);
        let body: serde_json::Value = actix_web::test::read_body_json(resp).await;
        body["data"]["id"].as_str().unwrap().to_string()
    }};
}

/// Sends the request and returns `(status, json body)`.
macro_rules! call_json {
    ($app:expr, $req:expr) => {{
        let resp = actix_web::test::call_service(&$app, $req.to_request()).await;
        let status = resp.status().as_u16();
        let body: serde_json::Value = actix_web::test::read_body_json(resp).await;
        (status, body)
    }};
}
