use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use chatdroid::api::FakeChatApi;
use chatdroid::repository::OfflineChatStore;
use chatdroid::storage::ChatCache;
use tempfile::TempDir;

#[allow(dead_code)]
pub fn create_temp_cache() -> (ChatCache, TempDir) {
    let tmp = TempDir::new().expect("failed to create tempdir");
    let db_path = tmp.path().join("chatdroid.db");
    let cache = ChatCache::new_with_path(db_path).expect("failed to create chat cache with path");
    (cache, tmp)
}

/// Offline store over a fresh cache and an in-memory API
#[allow(dead_code)]
pub fn create_store() -> (OfflineChatStore, Arc<FakeChatApi>, TempDir) {
    let (cache, tmp) = create_temp_cache();
    let api = Arc::new(FakeChatApi::new());
    let store = OfflineChatStore::new(api.clone(), cache);
    (store, api, tmp)
}

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}
