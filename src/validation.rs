use anyhow::{anyhow, Result};
use serde_json::Value;
use std::path::Path;

use crate::error::VmgError;
use crate::models::SELF_IDENTIFIER;

/// Snapshot keys that must be present as arrays before an import
pub const REQUIRED_SNAPSHOT_KEYS: [&str; 3] = ["conversations", "contacts", "messages"];

/// Validation utilities for input sanitization and edge case handling
#[derive(Debug, Copy, Clone)]
pub struct InputValidator;

impl InputValidator {
    /// Check the shape of a snapshot document before it is imported
    pub fn validate_snapshot(document: &Value) -> crate::error::Result<()> {
        let object = document
            .as_object()
            .ok_or_else(|| VmgError::InvalidSnapshot("snapshot must be a JSON object".to_string()))?;

        for key in REQUIRED_SNAPSHOT_KEYS {
            match object.get(key) {
                None => return Err(VmgError::InvalidSnapshot(format!("missing `{key}`"))),
                Some(value) if !value.is_array() => {
                    return Err(VmgError::InvalidSnapshot(format!("`{key}` must be an array")));
                }
                Some(_) => {}
            }
        }

        // Contacts are keyed by number; a duplicate would make lookups ambiguous.
        if let Some(contacts) = object.get("contacts").and_then(Value::as_array) {
            let mut seen = std::collections::HashSet::new();
            for number in contacts.iter().filter_map(|c| c.get("number").and_then(Value::as_str)) {
                if !seen.insert(number) {
                    return Err(VmgError::InvalidSnapshot(format!(
                        "duplicate contact number `{number}`"
                    )));
                }
            }
        }

        Ok(())
    }

    /// Estimate whether an import fits the storage budget.
    ///
    /// `retained` is the serialized size of stored collections the import
    /// leaves in place; `incoming` is the size of the snapshot, both in bytes.
    pub fn validate_import_quota(retained: usize, incoming: usize, limit: usize) -> crate::error::Result<()> {
        let required = retained.saturating_add(incoming);
        if required > limit {
            return Err(VmgError::QuotaExceeded { required, limit });
        }
        Ok(())
    }

    /// Validate contact name
    pub fn validate_contact_name(name: &str) -> Result<()> {
        if name.trim().is_empty() {
            return Err(anyhow!("Contact name cannot be empty"));
        }

        if name.chars().count() > 100 {
            return Err(anyhow!("Contact name too long (max 100 characters)"));
        }

        if name.chars().any(char::is_control) {
            return Err(anyhow!("Contact name contains invalid characters"));
        }

        Ok(())
    }

    /// Validate a conversation partner identifier.
    ///
    /// VMG `TEL:` values are free-form, so only emptiness, control characters
    /// and the self-identifier are rejected.
    pub fn validate_phone_identifier(phone: &str) -> Result<()> {
        let phone = phone.trim();
        if phone.is_empty() {
            return Err(anyhow!("Phone number cannot be empty"));
        }

        if phone.chars().any(char::is_control) {
            return Err(anyhow!("Phone number contains invalid characters"));
        }

        if phone == SELF_IDENTIFIER {
            return Err(anyhow!("`{SELF_IDENTIFIER}` is reserved for the device owner"));
        }

        Ok(())
    }

    /// Validate file path
    pub fn validate_file_path(path: &Path) -> Result<()> {
        let path_str = path.to_string_lossy();
        if path_str.is_empty() {
            return Err(anyhow!("File path cannot be empty"));
        }

        if path_str.contains('\0') {
            return Err(anyhow!("File path contains a NUL byte"));
        }

        if path_str.len() > 4096 {
            return Err(anyhow!("File path too long (max 4096 characters)"));
        }

        Ok(())
    }

    /// Sanitize text input
    #[must_use]
    pub fn sanitize_text(text: &str) -> String {
        text.chars()
            .filter(|c| !c.is_control() || *c == '\n' || *c == '\t' || *c == '\r')
            .collect::<String>()
            .trim()
            .to_string()
    }
}
