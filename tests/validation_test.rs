//! Unit tests for validation.rs module

use serde_json::json;
use std::path::Path;
use vmg_thread_viewer::validation::InputValidator;
use vmg_thread_viewer::VmgError;

#[test]
fn test_validate_contact_name_valid() {
    assert!(InputValidator::validate_contact_name("Alice Smith").is_ok());
}

#[test]
fn test_validate_contact_name_empty() {
    assert!(InputValidator::validate_contact_name("").is_err());
    assert!(InputValidator::validate_contact_name("   ").is_err());
}

#[test]
fn test_validate_contact_name_length_boundary() {
    assert!(InputValidator::validate_contact_name(&"a".repeat(100)).is_ok());
    assert!(InputValidator::validate_contact_name(&"a".repeat(101)).is_err());
}

#[test]
fn test_validate_contact_name_counts_characters_not_bytes() {
    assert!(InputValidator::validate_contact_name(&"é".repeat(100)).is_ok());
}

#[test]
fn test_validate_contact_name_control_characters() {
    assert!(InputValidator::validate_contact_name("Al\0ice").is_err());
    assert!(InputValidator::validate_contact_name("Al\nice").is_err());
    assert!(InputValidator::validate_contact_name("Al\rice").is_err());
}

#[test]
fn test_validate_phone_identifier_accepts_free_form() {
    assert!(InputValidator::validate_phone_identifier("+1234567890").is_ok());
    assert!(InputValidator::validate_phone_identifier("Voicemail").is_ok());
    assert!(InputValidator::validate_phone_identifier("(555) 010-0000").is_ok());
}

#[test]
fn test_validate_phone_identifier_rejects_self_and_empty() {
    assert!(InputValidator::validate_phone_identifier("Me").is_err());
    assert!(InputValidator::validate_phone_identifier(" ").is_err());
    assert!(InputValidator::validate_phone_identifier("+1\t2").is_err());
}

#[test]
fn test_validate_file_path() {
    assert!(InputValidator::validate_file_path(Path::new("inbox/a.vmg")).is_ok());
    assert!(InputValidator::validate_file_path(Path::new("")).is_err());
    let long = "a".repeat(4097);
    assert!(InputValidator::validate_file_path(Path::new(&long)).is_err());
}

#[test]
fn test_sanitize_text_keeps_line_breaks() {
    assert_eq!(InputValidator::sanitize_text("  a\u{7}b\nc\t "), "ab\nc");
}

#[test]
fn test_validate_snapshot_accepts_full_document() {
    let doc = json!({
        "exportInfo": {"timestamp": "2024-01-01T00:00:00Z", "version": "1.0", "source": "x"},
        "conversations": [],
        "contacts": [{"number": "+1"}, {"number": "+2"}],
        "messages": []
    });
    assert!(InputValidator::validate_snapshot(&doc).is_ok());
}

#[test]
fn test_validate_snapshot_rejects_missing_or_non_array_fields() {
    let missing = json!({"contacts": [], "messages": []});
    assert!(matches!(
        InputValidator::validate_snapshot(&missing),
        Err(VmgError::InvalidSnapshot(reason)) if reason.contains("conversations")
    ));

    let wrong_type = json!({"conversations": [], "contacts": {}, "messages": []});
    assert!(InputValidator::validate_snapshot(&wrong_type).is_err());

    assert!(InputValidator::validate_snapshot(&json!([1, 2])).is_err());
}

#[test]
fn test_validate_snapshot_rejects_duplicate_contacts() {
    let doc = json!({
        "conversations": [],
        "contacts": [{"number": "+1"}, {"number": "+1"}],
        "messages": []
    });
    assert!(InputValidator::validate_snapshot(&doc).is_err());
}

#[test]
fn test_validate_import_quota() {
    assert!(InputValidator::validate_import_quota(10, 90, 100).is_ok());
    assert!(matches!(
        InputValidator::validate_import_quota(10, 91, 100),
        Err(VmgError::QuotaExceeded { required: 101, limit: 100 })
    ));
    assert!(InputValidator::validate_import_quota(usize::MAX, 1, 100).is_err());
}
