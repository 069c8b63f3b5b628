use blob_bus_storage::{
    domain::models::metadata::{ERROR_COUNT, IS_FINAL},
    BlobErrorTracker, BlobKind, BlobName, BlobStore, ContainerName, ErrorTracker,
    ErrorTrackerSettings, FailureInfo, InMemoryBlobStore, ManualClock, Metadata,
    ObjectStoreBlobStore, StorageError,
};
use bytes::Bytes;
use chrono::{DateTime, Duration, TimeZone, Utc};
use object_store::memory::InMemory;
use std::sync::Arc;

fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 10, 8, 30, 0).unwrap()
}

fn blob_store() -> Arc<InMemoryBlobStore> {
    Arc::new(InMemoryBlobStore::new(ContainerName::new("errors").unwrap()))
}

fn tracker(blobs: Arc<dyn BlobStore>, clock: &ManualClock, max_attempts: u32) -> BlobErrorTracker {
    BlobErrorTracker::new(
        blobs,
        Arc::new(clock.clone()),
        ErrorTrackerSettings::builder()
            .destination_address("orders-queue")
            .max_delivery_attempts(max_attempts)
            .build(),
    )
}

fn failure(message: &str) -> FailureInfo {
    FailureInfo::new("InvalidOperation", message).with_details(format!("{}\n   at handler", message))
}

fn log_name(message_id: &str) -> BlobName {
    BlobName::new(format!("orders-queue/{}-errors.jsonl", message_id)).unwrap()
}

#[tokio::test]
async fn two_failures_reach_a_limit_of_two() {
    let clock = ManualClock::new(start_time());
    let tracker = tracker(blob_store(), &clock, 2);

    tracker.register_error("msg-1", failure("err1")).await.unwrap();
    assert!(!tracker.has_exceeded_limit("msg-1").await.unwrap());

    clock.advance(Duration::seconds(5));
    tracker.register_error("msg-1", failure("err2")).await.unwrap();
    assert!(tracker.has_exceeded_limit("msg-1").await.unwrap());

    let description = tracker.get_full_description("msg-1").await.unwrap();
    let first = description.find("err1").unwrap();
    let second = description.find("err2").unwrap();
    assert!(first < second);
    assert_eq!(description.lines().filter(|l| l.contains("InvalidOperation")).count(), 2);
}

#[tokio::test]
async fn records_come_back_in_append_order() {
    let clock = ManualClock::new(start_time());
    let tracker = tracker(blob_store(), &clock, 10);

    for attempt in 1..=4 {
        tracker
            .register_error("msg-2", failure(&format!("failure {}", attempt)))
            .await
            .unwrap();
        clock.advance(Duration::seconds(1));
    }

    let records = tracker.get_failure_records("msg-2").await.unwrap();
    assert_eq!(records.len(), 4);
    for (index, record) in records.iter().enumerate() {
        let attempt = index as u32 + 1;
        assert_eq!(record.attempt, attempt);
        assert_eq!(record.info.message, format!("failure {}", attempt));
        assert_eq!(record.info.error_type, "InvalidOperation");
        assert_eq!(record.time, start_time() + Duration::seconds(index as i64));
    }
    assert_eq!(tracker.error_count("msg-2").await.unwrap(), 4);
}

#[tokio::test]
async fn log_is_an_append_blob_of_crlf_terminated_json_lines() {
    let clock = ManualClock::new(start_time());
    let blobs = blob_store();
    let tracker = tracker(blobs.clone(), &clock, 10);

    tracker
        .register_error("msg-3", failure("boom").with_source("payment-handler"))
        .await
        .unwrap();
    tracker.register_error("msg-3", failure("bang")).await.unwrap();

    let download = blobs.get(&log_name("msg-3")).await.unwrap();
    assert_eq!(download.properties.kind, BlobKind::Append);
    assert_eq!(download.properties.metadata[ERROR_COUNT], "2");

    let content = String::from_utf8(download.bytes().await.unwrap().to_vec()).unwrap();
    assert!(content.ends_with("\r\n"));
    let lines: Vec<&str> = content.split_terminator("\r\n").collect();
    assert_eq!(lines.len(), 2);

    let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(first["type"], "InvalidOperation");
    assert_eq!(first["message"], "boom");
    assert_eq!(first["source"], "payment-handler");
    assert_eq!(first["attempt"], 1);
    assert!(first["time"].is_string());
    assert!(first["details"].as_str().unwrap().contains("at handler"));
}

#[tokio::test]
async fn logs_are_namespaced_by_destination() {
    let clock = ManualClock::new(start_time());
    let blobs = blob_store();
    let orders = tracker(blobs.clone(), &clock, 2);
    let invoices = BlobErrorTracker::new(
        blobs.clone(),
        Arc::new(clock.clone()),
        ErrorTrackerSettings::builder()
            .destination_address("invoices-queue")
            .max_delivery_attempts(2)
            .build(),
    );

    orders.register_error("shared-id", failure("a")).await.unwrap();
    orders.register_error("shared-id", failure("b")).await.unwrap();
    invoices.register_error("shared-id", failure("c")).await.unwrap();

    assert!(orders.has_exceeded_limit("shared-id").await.unwrap());
    assert!(!invoices.has_exceeded_limit("shared-id").await.unwrap());
    assert_eq!(invoices.get_failure_records("shared-id").await.unwrap().len(), 1);
    assert!(blobs
        .get_properties(&BlobName::new("invoices-queue/shared-id-errors.jsonl").unwrap())
        .await
        .is_ok());
}

#[tokio::test]
async fn unknown_messages_have_no_history() {
    let clock = ManualClock::new(start_time());
    let tracker = tracker(blob_store(), &clock, 1);

    assert!(!tracker.has_exceeded_limit("never-failed").await.unwrap());
    assert!(tracker.get_failure_records("never-failed").await.unwrap().is_empty());
    assert_eq!(tracker.get_full_description("never-failed").await.unwrap(), "");
    assert_eq!(tracker.error_count("never-failed").await.unwrap(), 0);
    assert_eq!(tracker.recompute_error_count("never-failed").await.unwrap(), 0);
    tracker.clean_up("never-failed").await.unwrap();
}

#[tokio::test]
async fn clean_up_removes_the_log() {
    let clock = ManualClock::new(start_time());
    let tracker = tracker(blob_store(), &clock, 1);

    tracker.register_error("msg-4", failure("x")).await.unwrap();
    assert!(tracker.has_exceeded_limit("msg-4").await.unwrap());

    tracker.clean_up("msg-4").await.unwrap();
    tracker.clean_up("msg-4").await.unwrap();

    assert!(tracker.get_failure_records("msg-4").await.unwrap().is_empty());
    assert!(!tracker.has_exceeded_limit("msg-4").await.unwrap());
}

#[tokio::test]
async fn mark_as_final_on_an_existing_log_keeps_its_records() {
    let clock = ManualClock::new(start_time());
    let blobs = blob_store();
    let tracker = tracker(blobs.clone(), &clock, 5);

    tracker.register_error("msg-5", failure("x")).await.unwrap();
    assert!(!tracker.has_exceeded_limit("msg-5").await.unwrap());

    tracker.mark_as_final("msg-5").await.unwrap();

    assert!(tracker.has_exceeded_limit("msg-5").await.unwrap());
    assert_eq!(tracker.get_failure_records("msg-5").await.unwrap().len(), 1);

    let properties = blobs.get_properties(&log_name("msg-5")).await.unwrap();
    assert_eq!(properties.metadata[IS_FINAL], "true");
    assert_eq!(properties.metadata[ERROR_COUNT], "1");
}

#[tokio::test]
async fn mark_as_final_on_an_absent_log_creates_an_empty_final_log() {
    let clock = ManualClock::new(start_time());
    let blobs = blob_store();
    let tracker = tracker(blobs.clone(), &clock, 5);

    tracker.mark_as_final("msg-6").await.unwrap();

    assert!(tracker.has_exceeded_limit("msg-6").await.unwrap());
    assert!(tracker.get_failure_records("msg-6").await.unwrap().is_empty());
    assert_eq!(tracker.error_count("msg-6").await.unwrap(), 0);

    let properties = blobs.get_properties(&log_name("msg-6")).await.unwrap();
    assert_eq!(properties.kind, BlobKind::Append);
    assert_eq!(properties.size, 0);

    // Later failures still append to the same log
    tracker.register_error("msg-6", failure("late")).await.unwrap();
    assert_eq!(tracker.get_failure_records("msg-6").await.unwrap().len(), 1);
    assert!(tracker.has_exceeded_limit("msg-6").await.unwrap());
}

#[tokio::test]
async fn recompute_error_count_repairs_a_lagging_counter() {
    let clock = ManualClock::new(start_time());
    let blobs = blob_store();
    let tracker = tracker(blobs.clone(), &clock, 3);

    for message in ["a", "b", "c"] {
        tracker.register_error("msg-7", failure(message)).await.unwrap();
    }

    // Simulate an append whose counter update was lost
    let mut metadata = blobs.get_properties(&log_name("msg-7")).await.unwrap().metadata;
    metadata.insert(ERROR_COUNT.to_string(), "1".to_string());
    blobs.set_metadata(&log_name("msg-7"), metadata).await.unwrap();

    assert_eq!(tracker.error_count("msg-7").await.unwrap(), 1);
    assert!(!tracker.has_exceeded_limit("msg-7").await.unwrap());

    assert_eq!(tracker.recompute_error_count("msg-7").await.unwrap(), 3);
    assert_eq!(tracker.error_count("msg-7").await.unwrap(), 3);
    assert!(tracker.has_exceeded_limit("msg-7").await.unwrap());
}

#[tokio::test]
async fn a_malformed_line_fails_record_parsing() {
    let clock = ManualClock::new(start_time());
    let blobs = blob_store();
    let tracker = tracker(blobs.clone(), &clock, 5);

    tracker.register_error("msg-8", failure("fine")).await.unwrap();
    blobs
        .append_block(&log_name("msg-8"), Bytes::from_static(b"{not json\r\n"))
        .await
        .unwrap();

    let err = tracker.get_failure_records("msg-8").await.unwrap_err();
    assert!(matches!(err, StorageError::Malformed { .. }));

    // The description is the log as stored, bad lines included
    let description = tracker.get_full_description("msg-8").await.unwrap();
    assert!(description.contains("fine"));
    assert!(description.ends_with("{not json"));
}

#[tokio::test]
async fn full_description_keeps_details_and_source() {
    let clock = ManualClock::new(start_time());
    let tracker = tracker(blob_store(), &clock, 5);

    tracker
        .register_error(
            "msg-12",
            FailureInfo::new("Timeout", "boom")
                .with_details("boom\n   at checkout::handle")
                .with_source("checkout-worker"),
        )
        .await
        .unwrap();
    tracker.register_error("msg-12", failure("second")).await.unwrap();

    let description = tracker.get_full_description("msg-12").await.unwrap();
    let lines: Vec<&str> = description.split('\n').collect();
    assert_eq!(lines.len(), 2);

    let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(first["type"], "Timeout");
    assert_eq!(first["details"], "boom\n   at checkout::handle");
    assert_eq!(first["source"], "checkout-worker");
    assert!(description.contains("at checkout::handle"));
    assert!(lines[1].contains("second"));
}

#[tokio::test]
async fn error_count_saturates_instead_of_overflowing() {
    let clock = ManualClock::new(start_time());
    let blobs = blob_store();
    let tracker = tracker(blobs.clone(), &clock, 5);

    tracker.register_error("msg-13", failure("first")).await.unwrap();
    let mut metadata = Metadata::new();
    metadata.insert(ERROR_COUNT.to_string(), u32::MAX.to_string());
    blobs.set_metadata(&log_name("msg-13"), metadata).await.unwrap();

    tracker.register_error("msg-13", failure("again")).await.unwrap();

    assert_eq!(tracker.error_count("msg-13").await.unwrap(), u32::MAX);
    assert!(tracker.has_exceeded_limit("msg-13").await.unwrap());
    let records = tracker.get_failure_records("msg-13").await.unwrap();
    assert_eq!(records.last().unwrap().attempt, u32::MAX);
}

#[tokio::test]
async fn invalid_message_ids_are_rejected() {
    let clock = ManualClock::new(start_time());
    let tracker = tracker(blob_store(), &clock, 5);

    let err = tracker.register_error("", failure("x")).await.unwrap_err();
    assert!(matches!(err, StorageError::ValidationError { .. }));

    let err = tracker.has_exceeded_limit("a/b").await.unwrap_err();
    assert!(matches!(err, StorageError::ValidationError { .. }));
}

#[tokio::test]
async fn concurrent_failures_on_the_object_store_adapter_are_all_logged() {
    let clock = ManualClock::new(start_time());
    let blobs: Arc<dyn BlobStore> = Arc::new(ObjectStoreBlobStore::new(
        Arc::new(InMemory::new()),
        ContainerName::new("errors").unwrap(),
    ));
    let tracker = Arc::new(tracker(blobs, &clock, 3));

    let handles: Vec<_> = (0..3)
        .map(|i| {
            let tracker = tracker.clone();
            tokio::spawn(async move {
                tracker
                    .register_error("msg-9", failure(&format!("worker {}", i)))
                    .await
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    // Appends are never lost; the cached count may lag and is repaired on demand
    assert_eq!(tracker.get_failure_records("msg-9").await.unwrap().len(), 3);
    assert_eq!(tracker.recompute_error_count("msg-9").await.unwrap(), 3);
    assert!(tracker.has_exceeded_limit("msg-9").await.unwrap());

    tracker.clean_up("msg-9").await.unwrap();
    assert!(tracker.get_failure_records("msg-9").await.unwrap().is_empty());
}

#[tokio::test]
async fn error_tracker_preserves_unrelated_metadata() {
    let clock = ManualClock::new(start_time());
    let blobs = blob_store();
    let tracker = tracker(blobs.clone(), &clock, 5);

    tracker.register_error("msg-10", failure("x")).await.unwrap();
    let mut metadata: Metadata = blobs.get_properties(&log_name("msg-10")).await.unwrap().metadata;
    metadata.insert("Owner".to_string(), "ops".to_string());
    blobs.set_metadata(&log_name("msg-10"), metadata).await.unwrap();

    tracker.register_error("msg-10", failure("y")).await.unwrap();
    tracker.mark_as_final("msg-10").await.unwrap();

    let properties = blobs.get_properties(&log_name("msg-10")).await.unwrap();
    assert_eq!(properties.metadata["Owner"], "ops");
    assert_eq!(properties.metadata[ERROR_COUNT], "2");
    assert_eq!(properties.metadata[IS_FINAL], "true");
}
