use blob_bus_storage::{
    domain::models::metadata::{format_timestamp, LENGTH, READ_TIME, SAVE_TIME},
    BlobName, BlobStore, BlobPayloadStore, ContainerName, InMemoryBlobStore, ManualClock,
    Metadata, ObjectStoreBlobStore, PayloadId, PayloadStore, PayloadStoreOptions, StorageError,
    TimeRange,
};
use bytes::Bytes;
use chrono::{DateTime, Duration, TimeZone, Utc};
use futures::TryStreamExt;
use object_store::memory::InMemory;
use std::sync::Arc;
use tokio::io::AsyncReadExt;

fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

fn blob_store() -> Arc<InMemoryBlobStore> {
    Arc::new(InMemoryBlobStore::new(ContainerName::new("payloads").unwrap()))
}

fn payload_store(
    blobs: Arc<dyn BlobStore>,
    clock: &ManualClock,
    options: PayloadStoreOptions,
) -> BlobPayloadStore {
    BlobPayloadStore::new(blobs, Arc::new(clock.clone()), options)
}

fn id(value: &str) -> PayloadId {
    PayloadId::new(value).unwrap()
}

async fn save_bytes(store: &BlobPayloadStore, payload_id: &str, data: &[u8], metadata: Option<Metadata>) {
    let mut source = data;
    store.save(&id(payload_id), &mut source, metadata).await.unwrap();
}

async fn read_bytes(store: &BlobPayloadStore, payload_id: &str) -> Vec<u8> {
    let mut reader = store.read(&id(payload_id)).await.unwrap();
    let mut buffer = Vec::new();
    reader.read_to_end(&mut buffer).await.unwrap();
    buffer
}

async fn query_ids(
    store: &BlobPayloadStore,
    read_time: Option<TimeRange>,
    save_time: Option<TimeRange>,
) -> Vec<String> {
    let mut ids: Vec<String> = store
        .query(read_time, save_time)
        .map_ok(|id| id.to_string())
        .try_collect()
        .await
        .unwrap();
    ids.sort();
    ids
}

/// The read time is written in the background; wait for it to land
async fn wait_for_read_time(store: &BlobPayloadStore, payload_id: &str) -> Option<String> {
    for _ in 0..100 {
        let metadata = store.read_metadata(&id(payload_id)).await.unwrap();
        if let Some(value) = metadata.get(READ_TIME) {
            return Some(value.clone());
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    None
}

#[tokio::test]
async fn save_then_read_returns_the_same_bytes() {
    let clock = ManualClock::new(start_time());
    let store = payload_store(blob_store(), &clock, PayloadStoreOptions::default());

    save_bytes(&store, "abc", &[0x01, 0x02, 0x03], None).await;

    assert_eq!(read_bytes(&store, "abc").await, vec![0x01, 0x02, 0x03]);
    let metadata = store.read_metadata(&id("abc")).await.unwrap();
    assert_eq!(metadata[LENGTH], "3");
}

#[tokio::test]
async fn large_payloads_survive_chunked_reads() {
    let clock = ManualClock::new(start_time());
    let store = payload_store(blob_store(), &clock, PayloadStoreOptions::default());
    let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();

    save_bytes(&store, "big", &data, None).await;

    assert_eq!(read_bytes(&store, "big").await, data);
}

#[tokio::test]
async fn payloads_are_stored_under_lowercased_blob_names() {
    let clock = ManualClock::new(start_time());
    let blobs = blob_store();
    let store = payload_store(blobs.clone(), &clock, PayloadStoreOptions::default());

    save_bytes(&store, "ABC123", b"data", None).await;

    let properties = blobs
        .get_properties(&BlobName::new("data-abc123.dat").unwrap())
        .await
        .unwrap();
    assert_eq!(properties.size, 4);
}

#[tokio::test]
async fn save_stamps_save_time_and_merges_caller_metadata() {
    let clock = ManualClock::new(start_time());
    let store = payload_store(blob_store(), &clock, PayloadStoreOptions::default());

    let mut metadata = Metadata::new();
    metadata.insert("Owner".to_string(), "billing".to_string());
    save_bytes(&store, "withmeta", b"x", Some(metadata)).await;

    let stored = store.read_metadata(&id("withmeta")).await.unwrap();
    assert_eq!(stored[SAVE_TIME], format_timestamp(start_time()));
    assert_eq!(stored["Owner"], "billing");
    assert_eq!(stored[LENGTH], "1");

    // Caller values are merged last
    let mut metadata = Metadata::new();
    metadata.insert(SAVE_TIME.to_string(), "caller supplied".to_string());
    save_bytes(&store, "override", b"x", Some(metadata)).await;

    let stored = store.read_metadata(&id("override")).await.unwrap();
    assert_eq!(stored[SAVE_TIME], "caller supplied");
}

#[tokio::test]
async fn reading_an_unknown_id_is_not_found() {
    let clock = ManualClock::new(start_time());
    let store = payload_store(blob_store(), &clock, PayloadStoreOptions::default());
    save_bytes(&store, "known", b"x", None).await;

    let err = store.read(&id("unknown")).await.err().unwrap();
    assert!(err.is_not_found());

    let err = store.read_metadata(&id("unknown")).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn delete_is_idempotent() {
    let clock = ManualClock::new(start_time());
    let store = payload_store(blob_store(), &clock, PayloadStoreOptions::default());
    save_bytes(&store, "gone", b"x", None).await;

    store.delete(&id("gone")).await.unwrap();
    store.delete(&id("gone")).await.unwrap();
    store.delete(&id("neversaved")).await.unwrap();

    assert!(store.read(&id("gone")).await.err().unwrap().is_not_found());
}

#[tokio::test]
async fn first_save_creates_the_container() {
    let clock = ManualClock::new(start_time());
    let blobs = blob_store();
    let store = payload_store(blobs.clone(), &clock, PayloadStoreOptions::default());

    assert!(!blobs.container_exists().await.unwrap());
    save_bytes(&store, "first", b"x", None).await;
    assert!(blobs.container_exists().await.unwrap());
}

#[tokio::test]
async fn save_without_container_creation_fails_with_io_error() {
    let clock = ManualClock::new(start_time());
    let options = PayloadStoreOptions::builder().create_container(false).build();
    let store = payload_store(blob_store(), &clock, options);

    let mut source: &[u8] = b"x";
    let err = store.save(&id("orphan"), &mut source, None).await.unwrap_err();

    match &err {
        StorageError::Io { container, name, .. } => {
            assert_eq!(container, "payloads");
            assert_eq!(name.as_deref(), Some("data-orphan.dat"));
        }
        other => panic!("expected an I/O error, got {other:?}"),
    }
    assert!(std::error::Error::source(&err).is_some());
}

#[tokio::test]
async fn read_updates_read_time_in_the_background() {
    let clock = ManualClock::new(start_time());
    let store = payload_store(blob_store(), &clock, PayloadStoreOptions::default());
    save_bytes(&store, "tracked", b"x", None).await;

    clock.advance(Duration::hours(1));
    read_bytes(&store, "tracked").await;

    let read_time = wait_for_read_time(&store, "tracked").await;
    assert_eq!(read_time, Some(format_timestamp(start_time() + Duration::hours(1))));

    let metadata = store.read_metadata(&id("tracked")).await.unwrap();
    assert_eq!(metadata[SAVE_TIME], format_timestamp(start_time()));
}

#[tokio::test]
async fn read_time_is_left_alone_when_tracking_is_disabled() {
    let clock = ManualClock::new(start_time());
    let options = PayloadStoreOptions::builder()
        .update_last_read_time(false)
        .build();
    let store = payload_store(blob_store(), &clock, options);
    save_bytes(&store, "untracked", b"x", None).await;

    read_bytes(&store, "untracked").await;
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let metadata = store.read_metadata(&id("untracked")).await.unwrap();
    assert!(!metadata.contains_key(READ_TIME));
}

#[tokio::test]
async fn query_without_ranges_lists_every_payload() {
    let clock = ManualClock::new(start_time());
    let store = payload_store(blob_store(), &clock, PayloadStoreOptions::default());
    for payload_id in ["one", "two", "three"] {
        save_bytes(&store, payload_id, b"x", None).await;
    }

    assert_eq!(query_ids(&store, None, None).await, vec!["one", "three", "two"]);
}

#[tokio::test]
async fn query_by_save_time_uses_half_open_ranges() {
    let clock = ManualClock::new(start_time());
    let blobs = blob_store();
    let store = payload_store(blobs.clone(), &clock, PayloadStoreOptions::default());

    save_bytes(&store, "early", b"x", None).await;
    clock.advance(Duration::hours(1));
    save_bytes(&store, "middle", b"x", None).await;
    clock.advance(Duration::hours(1));
    save_bytes(&store, "late", b"x", None).await;

    // Stored before save times were tracked
    blobs
        .put(
            &BlobName::new("data-legacy.dat").unwrap(),
            Bytes::from_static(b"x"),
            Metadata::new(),
            None,
        )
        .await
        .unwrap();

    let range = TimeRange::between(
        start_time() + Duration::hours(1),
        start_time() + Duration::hours(2),
    );
    let filtered = query_ids(&store, None, Some(range)).await;
    assert_eq!(filtered, vec!["legacy", "middle"]);

    let everything = query_ids(&store, None, None).await;
    assert_eq!(everything, vec!["early", "late", "legacy", "middle"]);
    assert!(filtered.iter().all(|id| everything.contains(id)));

    let since = query_ids(&store, None, Some(TimeRange::since(start_time() + Duration::hours(2)))).await;
    assert_eq!(since, vec!["late", "legacy"]);
}

#[tokio::test]
async fn query_by_read_time_keeps_payloads_that_were_never_read() {
    let clock = ManualClock::new(start_time());
    let store = payload_store(blob_store(), &clock, PayloadStoreOptions::default());
    save_bytes(&store, "read", b"x", None).await;
    save_bytes(&store, "unread", b"x", None).await;

    clock.advance(Duration::hours(3));
    read_bytes(&store, "read").await;
    assert!(wait_for_read_time(&store, "read").await.is_some());

    let range = TimeRange::until(start_time() + Duration::hours(1));
    assert_eq!(query_ids(&store, Some(range), None).await, vec!["unread"]);

    let range = TimeRange::since(start_time() + Duration::hours(3));
    assert_eq!(query_ids(&store, Some(range), None).await, vec!["read", "unread"]);
}

#[tokio::test]
async fn payload_store_works_on_the_object_store_adapter() {
    let clock = ManualClock::new(start_time());
    let blobs = Arc::new(ObjectStoreBlobStore::new(
        Arc::new(InMemory::new()),
        ContainerName::new("payloads").unwrap(),
    ));
    let store = payload_store(blobs, &clock, PayloadStoreOptions::default());

    save_bytes(&store, "abc", &[0x01, 0x02, 0x03], None).await;
    save_bytes(&store, "def", b"other", None).await;

    assert_eq!(read_bytes(&store, "abc").await, vec![0x01, 0x02, 0x03]);
    let metadata = store.read_metadata(&id("abc")).await.unwrap();
    assert_eq!(metadata[LENGTH], "3");
    assert_eq!(metadata[SAVE_TIME], format_timestamp(start_time()));

    assert!(wait_for_read_time(&store, "abc").await.is_some());
    assert_eq!(query_ids(&store, None, None).await, vec!["abc", "def"]);

    store.delete(&id("abc")).await.unwrap();
    store.delete(&id("abc")).await.unwrap();
    assert_eq!(query_ids(&store, None, None).await, vec!["def"]);
}

#[tokio::test]
async fn query_returns_ids_with_reserved_characters_on_the_object_store_adapter() {
    let clock = ManualClock::new(start_time());
    let blobs = Arc::new(ObjectStoreBlobStore::new(
        Arc::new(InMemory::new()),
        ContainerName::new("payloads").unwrap(),
    ));
    let store = payload_store(blobs, &clock, PayloadStoreOptions::default());

    save_bytes(&store, "a#b", b"x", None).await;

    assert_eq!(query_ids(&store, None, None).await, vec!["a#b"]);
    let range = TimeRange::since(start_time() - Duration::hours(1));
    assert_eq!(query_ids(&store, None, Some(range)).await, vec!["a#b"]);
    assert_eq!(read_bytes(&store, "a#b").await, b"x".to_vec());
}
