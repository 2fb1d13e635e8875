//! File ingestion through the repository

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tempfile::tempdir;
use vmg_thread_viewer::models::Direction;
use vmg_thread_viewer::repository::{LocalStoreRepo, MessageRepository};
use vmg_thread_viewer::service::{collect_vmg_files, parse_file, IngestService};
use vmg_thread_viewer::Store;

fn vmg(phone: &str, text: &str) -> String {
    format!(
        "BEGIN:VMSG\r\nX-NOK-DT:20240102T080910Z\r\nBEGIN:VCARD\r\nTEL:{phone}\r\nEND:VCARD\r\n\
         BEGIN:VENV\r\nBEGIN:VBODY\r\nDate:02.01.2024 08:09:10\r\n{text}\r\nEND:VBODY\r\nEND:VENV\r\nEND:VMSG\r\n"
    )
}

fn utf16le_with_bom(text: &str) -> Vec<u8> {
    let mut bytes = vec![0xFF, 0xFE];
    bytes.extend(text.encode_utf16().flat_map(u16::to_le_bytes));
    bytes
}

fn service() -> IngestService {
    IngestService::new(Box::new(LocalStoreRepo::new(Store::in_memory().expect("store"))))
}

#[tokio::test]
async fn test_ingest_directory_counts_failures_and_continues() {
    let dir = tempdir().expect("Failed to create temp directory");
    std::fs::write(dir.path().join("Alice_0001.vmg"), utf16le_with_bom(&vmg("+1", "one"))).expect("write");
    std::fs::write(dir.path().join("Alice_0002.VMG"), vmg("+1", "two")).expect("write");
    std::fs::write(dir.path().join("broken.vmg"), "not a vmg file").expect("write");
    std::fs::write(dir.path().join("notes.txt"), vmg("+9", "ignored")).expect("write");

    let service = service();
    let report = service
        .ingest(&[dir.path().to_path_buf()], Direction::Incoming)
        .await
        .expect("ingest");

    assert_eq!(report.loaded, 2);
    assert_eq!(report.failed, 1);
    assert!(report.failures[0].0.ends_with("broken.vmg"));

    let repo = service.repository();
    let thread = repo.messages_by_conversation("+1").expect("thread");
    assert_eq!(thread.len(), 2);
    assert_eq!(repo.contact("+1").expect("lookup").expect("contact").name, "Alice");
    assert!(repo.conversation("+9").expect("lookup").is_none());
}

#[tokio::test]
async fn test_ingest_reports_missing_file_and_progress() {
    let dir = tempdir().expect("Failed to create temp directory");
    let good = dir.path().join("b.vmg");
    std::fs::write(&good, vmg("+2", "hi")).expect("write");
    let missing = dir.path().join("missing.vmg");

    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);
    let service = service().with_progress(Box::new(move |current: usize, total: usize, _name: &str| {
        assert_eq!(total, 2);
        assert!(current >= 1 && current <= total);
        seen.fetch_add(1, Ordering::SeqCst);
    }));

    let report = service
        .ingest(&[missing, good], Direction::Outgoing)
        .await
        .expect("ingest");

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(report.loaded, 1);
    assert_eq!(report.failed, 1);
    let thread = service.repository().messages_by_conversation("+2").expect("thread");
    assert_eq!(thread[0].sender, "Me");
}

#[tokio::test]
async fn test_collect_vmg_files_sorted() {
    let dir = tempdir().expect("Failed to create temp directory");
    for name in ["c.vmg", "a.vmg", "b.vmg"] {
        std::fs::write(dir.path().join(name), "").expect("write");
    }
    std::fs::create_dir(dir.path().join("sub.vmg")).expect("mkdir");

    let files = collect_vmg_files(&[dir.path().to_path_buf()]).await.expect("collect");
    let names: Vec<PathBuf> = files.iter().map(|p| PathBuf::from(p.file_name().expect("name"))).collect();
    assert_eq!(names, vec![PathBuf::from("a.vmg"), PathBuf::from("b.vmg"), PathBuf::from("c.vmg")]);
}

#[tokio::test]
async fn test_parse_file_uses_file_name() {
    let dir = tempdir().expect("Failed to create temp directory");
    let path = dir.path().join("Dan_7.vmg");
    std::fs::write(&path, utf16le_with_bom(&vmg("+7", "yo"))).expect("write");

    let message = parse_file(&path, Direction::Incoming).await.expect("parse");
    assert_eq!(message.filename.as_deref(), Some("Dan_7.vmg"));
    assert_eq!(message.message, "yo");
}
