//! VMG Thread Viewer - decode and browse phone message archives
//!
//! A Rust library for decoding VMG (vMessage) files exported by phones and
//! keeping them in a small persistent store grouped into conversations.
//!
//! # Features
//!
//! - Decode VMG text into messages (incoming or outgoing)
//! - Derived contacts and per-partner conversation aggregates
//! - Rebuild, delete, rename and snapshot export/import
//! - Thread transcripts in TXT, CSV or JSON

/// Configuration management
pub mod config;
/// Error types
pub mod error;
/// Thread transcript export
pub mod file_writer;
/// Logging setup and utilities
pub mod logging;
/// Metrics collection
pub mod metrics;
/// Data models and structures
pub mod models;
/// VMG decoder
pub mod parser;
/// Repository pattern for data access
pub mod repository;
/// File ingestion
pub mod service;
/// Collection storage and backends
pub mod store;
/// Input validation and sanitization
pub mod validation;

// Re-export key components for easier access
pub use error::{Result, VmgError};
pub use models::{Contact, Conversation, Direction, Message, OutputFormat, Snapshot, StorageStats};
pub use parser::parse as parse_vmg;
pub use repository::{LocalStoreRepo, MessageRepository};
pub use store::Store;
