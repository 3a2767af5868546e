//! End-to-end registry behavior against in-memory stores.

mod common;

use common::{harness, harness_with_keys, FixedKeyGenerator};
use files_service::{ObjectStore, RegistryError, StoreKind, UploadRequest};
use std::sync::atomic::Ordering;
use std::sync::Arc;

fn upload(filename: &str, data: &[u8]) -> UploadRequest {
    UploadRequest {
        filename: filename.to_string(),
        content_type: None,
        data: data.to_vec(),
    }
}

#[tokio::test]
async fn test_notes_scenario() {
    let h = harness().await;

    let outcome = h
        .registry
        .upload(upload("notes.txt", b"hello world"))
        .await
        .unwrap();
    assert_eq!(outcome.record.id, 1);
    assert_eq!(outcome.record.filename, "notes.txt");
    assert!(outcome.record.object_key.ends_with("_notes.txt"));

    let files = h.registry.list().await.unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].id, 1);

    let download = h.registry.download(1).await.unwrap();
    assert_eq!(download.data, b"hello world");
    assert_eq!(download.filename, "notes.txt");
    assert_eq!(download.content_type, "text/plain");

    h.registry.delete(1).await.unwrap();

    let err = h.registry.download(1).await.unwrap_err();
    assert_eq!(err, RegistryError::NotFound { id: 1 });
    assert!(h.registry.list().await.unwrap().is_empty());
    assert_eq!(h.objects.len(), 0);
}

#[tokio::test]
async fn test_round_trip_preserves_bytes_and_content_type() {
    let h = harness().await;

    let payloads: Vec<(&str, Option<&str>, Vec<u8>)> = vec![
        ("empty.bin", None, Vec::new()),
        ("data.json", Some("application/json"), br#"{"a":1}"#.to_vec()),
        ("raw", None, (0..=255u8).collect()),
    ];

    for (filename, declared, data) in payloads {
        let outcome = h
            .registry
            .upload(UploadRequest {
                filename: filename.to_string(),
                content_type: declared.map(str::to_string),
                data: data.clone(),
            })
            .await
            .unwrap();

        assert_eq!(outcome.record.size, data.len() as i64);
        assert_eq!(outcome.is_empty(), data.is_empty());

        let download = h.registry.download(outcome.record.id).await.unwrap();
        assert_eq!(download.data, data);
        assert_eq!(
            Some(download.content_type.clone()),
            h.objects.content_type(&outcome.record.object_key)
        );
        if let Some(declared) = declared {
            assert_eq!(download.content_type, declared);
        }
    }
}

#[tokio::test]
async fn test_list_is_stable_without_writes() {
    let h = harness().await;
    for name in ["a.txt", "b.txt", "c.txt"] {
        h.registry.upload(upload(name, b"x")).await.unwrap();
    }

    let first = h.registry.list().await.unwrap();
    let second = h.registry.list().await.unwrap();

    let ids: Vec<i64> = first.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_delete_removes_file_from_list() {
    let h = harness().await;
    for name in ["a.txt", "b.txt", "c.txt"] {
        h.registry.upload(upload(name, b"x")).await.unwrap();
    }

    let deleted = h.registry.delete(2).await.unwrap();
    assert_eq!(deleted.filename, "b.txt");

    let ids: Vec<i64> = h
        .registry
        .list()
        .await
        .unwrap()
        .iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(ids, vec![1, 3]);
    assert_eq!(
        h.registry.delete(2).await.unwrap_err(),
        RegistryError::NotFound { id: 2 }
    );

    // Ids are never reused
    let next = h.registry.upload(upload("d.txt", b"x")).await.unwrap();
    assert_eq!(next.record.id, 4);
}

#[tokio::test]
async fn test_failed_put_leaves_nothing_behind() {
    let h = harness().await;
    h.objects.fail_put.store(true, Ordering::SeqCst);

    let err = h
        .registry
        .upload(upload("notes.txt", b"hello"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RegistryError::StoreUnavailable {
            store: StoreKind::Object,
            ..
        }
    ));
    assert!(h.registry.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_insert_failure_removes_orphaned_object() {
    let h = harness_with_keys(Arc::new(FixedKeyGenerator("fixed_key"))).await;
    h.registry
        .upload(upload("first.txt", b"first"))
        .await
        .unwrap();

    // The second upload reuses the key, so its insert hits the unique
    // constraint and the compensating delete removes the shared object.
    let err = h
        .registry
        .upload(upload("second.txt", b"second"))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        RegistryError::DuplicateKey {
            object_key: "fixed_key".to_string()
        }
    );
    assert!(!h.objects.exists("fixed_key").await.unwrap());
    assert_eq!(h.registry.list().await.unwrap().len(), 1);

    let err = h.registry.download(1).await.unwrap_err();
    assert!(matches!(err, RegistryError::ContentMissing { id: 1, .. }));
}

#[tokio::test]
async fn test_failed_orphan_cleanup_reports_both_failures() {
    let h = harness_with_keys(Arc::new(FixedKeyGenerator("fixed_key"))).await;
    h.registry
        .upload(upload("first.txt", b"first"))
        .await
        .unwrap();
    h.objects.fail_delete.store(true, Ordering::SeqCst);

    let err = h
        .registry
        .upload(upload("second.txt", b"second"))
        .await
        .unwrap_err();

    match err {
        RegistryError::OrphanCleanupFailed {
            object_key,
            insert_error,
            cleanup_error,
        } => {
            assert_eq!(object_key, "fixed_key");
            assert!(matches!(
                insert_error,
                files_service::MetadataStoreError::DuplicateKey(_)
            ));
            assert!(matches!(
                cleanup_error,
                files_service::ObjectStoreError::Unavailable(_)
            ));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(h.objects.exists("fixed_key").await.unwrap());
}

#[tokio::test]
async fn test_out_of_band_removal_is_content_missing() {
    let h = harness().await;
    let outcome = h
        .registry
        .upload(upload("notes.txt", b"hello world"))
        .await
        .unwrap();

    h.objects.remove(&outcome.record.object_key);

    let err = h.registry.download(outcome.record.id).await.unwrap_err();
    assert_eq!(
        err,
        RegistryError::ContentMissing {
            id: outcome.record.id,
            object_key: outcome.record.object_key.clone()
        }
    );

    // The stale record can still be deleted
    h.registry.delete(outcome.record.id).await.unwrap();
    assert_eq!(
        h.registry.download(outcome.record.id).await.unwrap_err(),
        RegistryError::NotFound {
            id: outcome.record.id
        }
    );
}

#[tokio::test]
async fn test_failed_object_delete_keeps_file_available() {
    let h = harness().await;
    h.registry
        .upload(upload("notes.txt", b"hello world"))
        .await
        .unwrap();
    h.objects.fail_delete.store(true, Ordering::SeqCst);

    let err = h.registry.delete(1).await.unwrap_err();
    assert!(matches!(err, RegistryError::StoreUnavailable { .. }));

    let download = h.registry.download(1).await.unwrap();
    assert_eq!(download.data, b"hello world");

    h.objects.fail_delete.store(false, Ordering::SeqCst);
    h.registry.delete(1).await.unwrap();
    assert!(h.registry.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_dangling_record_is_cleared_by_retry() {
    let h = harness().await;
    h.registry
        .upload(upload("notes.txt", b"hello world"))
        .await
        .unwrap();
    h.metadata.fail_delete.store(true, Ordering::SeqCst);

    let err = h.registry.delete(1).await.unwrap_err();
    assert!(matches!(err, RegistryError::DanglingRecord { id: 1, .. }));
    assert!(matches!(
        h.registry.download(1).await.unwrap_err(),
        RegistryError::ContentMissing { id: 1, .. }
    ));

    h.metadata.fail_delete.store(false, Ordering::SeqCst);
    h.registry.delete(1).await.unwrap();
    assert!(h.registry.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_health_reports_ready() {
    let h = harness().await;
    assert!(h.registry.health().await.is_ready());
}
