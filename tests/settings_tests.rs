use std::time::Duration;

use comic_sync::settings::{self, Tunables};
use comic_sync::store::LocalStore;

#[tokio::test]
async fn test_tunables_use_seeded_values() {
    let store = LocalStore::open_in_memory().await.unwrap();

    let tunables = Tunables::load(store.pool()).await.unwrap();
    assert_eq!(tunables.progress_debounce, Duration::from_millis(400));
    assert_eq!(tunables.status_timeout, Duration::from_millis(3000));
    assert_eq!(tunables.library_stale_after, Duration::from_secs(300));
    assert_eq!(tunables.chunk_threshold, 1000);
}

#[tokio::test]
async fn test_tunables_follow_overrides() {
    let store = LocalStore::open_in_memory().await.unwrap();
    settings::set_setting(store.pool(), settings::PROGRESS_DEBOUNCE_MS, "250")
        .await
        .unwrap();
    settings::set_setting(store.pool(), settings::CHUNK_THRESHOLD, "not a number")
        .await
        .unwrap();

    let tunables = Tunables::load(store.pool()).await.unwrap();
    assert_eq!(tunables.progress_debounce, Duration::from_millis(250));
    assert_eq!(tunables.chunk_threshold, 1000);
}

#[tokio::test]
async fn test_device_id_is_stable() {
    let store = LocalStore::open_in_memory().await.unwrap();

    let first = settings::device_id(store.pool()).await.unwrap();
    assert!(first.starts_with("device-"));
    assert_eq!(first.len(), "device-".len() + 16);

    let second = settings::device_id(store.pool()).await.unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_validate_setting() {
    assert!(settings::validate_setting(settings::DEVICE_ID, "device-mine").is_err());
    assert!(settings::validate_setting(settings::STATUS_TIMEOUT_MS, "fast").is_err());
    assert!(settings::validate_setting(settings::CHUNK_THRESHOLD, "0").is_err());
    assert!(settings::validate_setting(settings::CHUNK_THRESHOLD, "-5").is_err());
    assert!(settings::validate_setting(settings::PROGRESS_DEBOUNCE_MS, "250").is_ok());
    assert!(settings::validate_setting("theme", "dark").is_ok());
}
