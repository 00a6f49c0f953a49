//! Test utilities for ChatDroid
//!
//! Temporary caches, stores backed by the in-memory API, and assertion
//! helpers shared by unit tests.

use std::path::PathBuf;
use std::sync::Arc;

use tempfile::TempDir;

use crate::api::FakeChatApi;
use crate::error::ChatDroidError;
use crate::repository::OfflineChatStore;
use crate::storage::ChatCache;

/// Create a temporary directory for testing
pub fn temp_dir() -> TempDir {
    TempDir::new().expect("Failed to create temporary directory")
}

/// Create a test file with the given content
pub fn create_test_file(dir: &TempDir, name: &str, content: &[u8]) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).expect("Failed to write test file");
    path
}

/// Chat cache in a fresh temporary directory
pub fn temp_cache() -> (ChatCache, TempDir) {
    let dir = temp_dir();
    let cache = ChatCache::new_with_path(dir.path().join("cache.db"))
        .expect("Failed to create chat cache");
    (cache, dir)
}

/// Offline store over a temporary cache and a [`FakeChatApi`]
pub fn fake_store() -> (OfflineChatStore, Arc<FakeChatApi>, TempDir) {
    let (cache, dir) = temp_cache();
    let api = Arc::new(FakeChatApi::new());
    (OfflineChatStore::new(api.clone(), cache), api, dir)
}

/// Assert that an error contains the expected message
pub fn assert_error_contains<T>(result: Result<T, ChatDroidError>, expected: &str) {
    match result {
        Ok(_) => panic!("Expected error containing '{}' but got Ok", expected),
        Err(e) => {
            let error_msg = e.to_string();
            assert!(
                error_msg.contains(expected),
                "Error message '{}' does not contain '{}'",
                error_msg,
                expected
            );
        }
    }
}

/// YAML configuration pointing at a local test server
pub fn test_config_yaml() -> String {
    r#"
server:
  base_url: http://127.0.0.1:8080/api/v1/
  timeout_seconds: 5

chat:
  default_model: llama3
  default_title: Untitled
"#
    .to_string()
}
