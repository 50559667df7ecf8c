mod common;

use common::{DriveHarness, FakeProcessing, ts};
use docscan_gateway::db::{AccountStorage, FileStatus};
use docscan_gateway::error::GatewayError;
use std::collections::HashSet;
use std::sync::atomic::Ordering;

const USER: &str = "user-1";

fn seed(h: &DriveHarness) {
    h.drive
        .add("gdoc", "application/vnd.google-apps.document", ts(1), b"");
    h.drive.add("scan", "image/png", ts(1), b"\x89PNG");
    h.drive.add("report", "application/pdf", ts(1), b"%PDF-good");
    h.drive.add("notes", "text/plain", ts(1), "xin chào".as_bytes());
    h.drive.add("archive", "application/zip", ts(1), b"PK");
    h.drive.add("broken", "application/pdf", ts(1), b"%PDF-bad");
}

fn corrupt_pdf_processing() -> FakeProcessing {
    FakeProcessing {
        corrupt_pdfs: HashSet::from([b"%PDF-bad".to_vec()]),
        ..FakeProcessing::default()
    }
}

#[tokio::test]
async fn unlinked_user_fails_the_whole_pass() {
    let h = DriveHarness::new(FakeProcessing::default()).await;
    let err = h.engine.sync(USER).await.unwrap_err();
    assert!(matches!(err, GatewayError::NotLinked));
}

#[tokio::test]
async fn first_pass_indexes_each_file_independently() {
    let h = DriveHarness::new(corrupt_pdf_processing()).await;
    h.link(USER).await;
    seed(&h);

    let report = h.engine.sync(USER).await.unwrap();
    assert_eq!(report.folder_id, "folder-1");
    assert_eq!(report.counts.total, 6);
    assert_eq!(report.counts.indexed, 4);
    assert_eq!(report.counts.skipped, 1);
    assert_eq!(report.counts.errored, 1);

    let mut indexed = h.processing.upserted_doc_ids();
    indexed.sort();
    assert_eq!(
        indexed,
        vec!["drive:gdoc", "drive:notes", "drive:report", "drive:scan"]
    );
    assert!(h.processing.upserts.lock().unwrap().iter().all(|u| u.replace));

    let ocr = h.processing.ocr_calls.lock().unwrap();
    assert_eq!(ocr.len(), 1);
    assert_eq!(ocr[0].page_id, "drive_scan");
    assert!(!ocr[0].return_layout);
    assert_eq!(ocr[0].languages, vec!["vi", "en"]);
    drop(ocr);

    let report_pages = h
        .processing
        .upserts
        .lock()
        .unwrap()
        .iter()
        .find(|u| u.doc_id == "drive:report")
        .map(|u| u.pages.len());
    assert_eq!(report_pages, Some(2));

    let archive = h.files.get(USER, "archive").await.unwrap().unwrap();
    assert_eq!(archive.status, FileStatus::Skipped);
    assert!(archive.last_error.unwrap().contains("application/zip"));
    let outcome = report
        .results
        .iter()
        .find(|r| r.file_id == "archive")
        .unwrap();
    assert_eq!(
        outcome.detail.as_deref(),
        Some("unsupported mimeType: application/zip")
    );

    let broken = h.files.get(USER, "broken").await.unwrap().unwrap();
    assert_eq!(broken.status, FileStatus::Error);
    assert!(!broken.last_error.unwrap_or_default().is_empty());
    assert!(broken.indexed_modified_time.is_none());

    let notes = h.files.get(USER, "notes").await.unwrap().unwrap();
    assert_eq!(notes.status, FileStatus::Indexed);
    assert_eq!(notes.doc_id, "drive:notes");
    assert_eq!(notes.indexed_modified_time, Some(ts(1)));
    assert_eq!(notes.md5_checksum.as_deref(), Some("md5-notes"));
    assert!(notes.last_error.is_none());

    let account = AccountStorage::new(h.pool.clone())
        .get(USER)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(account.folder_id.as_deref(), Some("folder-1"));
}

#[tokio::test]
async fn second_pass_without_changes_indexes_nothing_new() {
    let h = DriveHarness::new(corrupt_pdf_processing()).await;
    h.link(USER).await;
    seed(&h);

    h.engine.sync(USER).await.unwrap();
    let upserts_after_first = h.processing.upserts.lock().unwrap().len();

    let report = h.engine.sync(USER).await.unwrap();
    assert_eq!(report.counts.indexed, 0);
    assert_eq!(h.processing.upserts.lock().unwrap().len(), upserts_after_first);

    let gdoc = h.files.get(USER, "gdoc").await.unwrap().unwrap();
    assert_eq!(gdoc.status, FileStatus::Indexed);
    let outcome = report.results.iter().find(|r| r.file_id == "gdoc").unwrap();
    assert_eq!(outcome.status, FileStatus::Skipped);

    // Failed files are retried on every pass.
    assert_eq!(report.counts.errored, 1);
    assert_eq!(h.drive.folder_creates.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn newer_modification_is_reindexed() {
    let h = DriveHarness::new(FakeProcessing::default()).await;
    h.link(USER).await;
    h.drive.add("notes", "text/plain", ts(1), b"v1");
    h.engine.sync(USER).await.unwrap();

    h.drive.touch("notes", ts(5));
    let report = h.engine.sync(USER).await.unwrap();
    assert_eq!(report.counts.indexed, 1);
    assert_eq!(h.processing.upserted_doc_ids(), vec!["drive:notes", "drive:notes"]);
    let notes = h.files.get(USER, "notes").await.unwrap().unwrap();
    assert_eq!(notes.indexed_modified_time, Some(ts(5)));
}

#[tokio::test]
async fn vanished_files_are_deleted_exactly_once() {
    let h = DriveHarness::new(FakeProcessing {
        fail_delete: true,
        ..FakeProcessing::default()
    })
    .await;
    h.link(USER).await;
    h.drive.add("keep", "text/plain", ts(1), b"k");
    h.drive.add("gone", "text/plain", ts(1), b"g");
    h.engine.sync(USER).await.unwrap();

    h.drive.remove("gone");
    let report = h.engine.sync(USER).await.unwrap();
    assert_eq!(report.counts.total, 1);
    assert_eq!(*h.processing.deletes.lock().unwrap(), vec!["drive:gone"]);

    // the index delete failed but the file is still marked deleted
    let gone = h.files.get(USER, "gone").await.unwrap().unwrap();
    assert_eq!(gone.status, FileStatus::Deleted);

    h.engine.sync(USER).await.unwrap();
    assert_eq!(h.processing.deletes.lock().unwrap().len(), 1);
    assert_eq!(
        h.files.get(USER, "keep").await.unwrap().unwrap().status,
        FileStatus::Indexed
    );
}

#[tokio::test]
async fn listing_follows_every_page() {
    let h = DriveHarness::new(FakeProcessing::default()).await;
    h.link(USER).await;
    for i in 0..5 {
        h.drive
            .add(&format!("f{i}"), "text/plain", ts(1), b"text");
    }
    let report = h.engine.sync(USER).await.unwrap();
    assert_eq!(report.counts.total, 5);
    assert_eq!(report.counts.indexed, 5);
    assert_eq!(h.files.list_for_user(USER).await.unwrap().len(), 5);
}

#[tokio::test]
async fn tracked_files_are_per_user() {
    let h = DriveHarness::new(FakeProcessing::default()).await;
    h.link("alice").await;
    h.link("bob").await;
    h.drive.add("shared", "text/plain", ts(1), b"x");

    h.engine.sync("alice").await.unwrap();
    assert!(h.files.list_for_user("bob").await.unwrap().is_empty());
    let report = h.engine.sync("bob").await.unwrap();
    assert_eq!(report.counts.indexed, 1);
    assert!(
        h.processing
            .user_ids
            .lock()
            .unwrap()
            .iter()
            .any(|u| u == "bob")
    );
}
