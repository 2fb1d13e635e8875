//! File ingestion: read VMG files, decode their text, parse them and hand
//! each message to the repository in input order.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{Result, VmgError};
use crate::logging::OperationTimer;
use crate::metrics::MetricsCollector;
use crate::models::{Direction, Message};
use crate::parser;
use crate::repository::MessageRepository;

/// Per-file progress: (1-based index, total files, file name)
pub type ProgressCallback = Box<dyn Fn(usize, usize, &str) + Send + Sync>;

/// Outcome of an ingestion batch
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestReport {
    /// Files decoded and saved
    pub loaded: usize,
    /// Files skipped
    pub failed: usize,
    /// Skipped files with the reason
    pub failures: Vec<(PathBuf, String)>,
}

/// Decode raw file bytes into text.
///
/// Handles UTF-16 with either byte-order mark, UTF-16 LE without one (the
/// high byte of the first ASCII character is zero) and UTF-8 with or without
/// a BOM.
pub fn decode_text(bytes: &[u8]) -> Result<String> {
    match bytes {
        [0xFF, 0xFE, rest @ ..] => decode_utf16(rest, u16::from_le_bytes),
        [0xFE, 0xFF, rest @ ..] => decode_utf16(rest, u16::from_be_bytes),
        [0xEF, 0xBB, 0xBF, rest @ ..] => decode_utf8(rest),
        [_, 0, ..] => decode_utf16(bytes, u16::from_le_bytes),
        _ => decode_utf8(bytes),
    }
}

fn decode_utf8(bytes: &[u8]) -> Result<String> {
    String::from_utf8(bytes.to_vec()).map_err(|e| VmgError::Decode(format!("invalid UTF-8: {e}")))
}

fn decode_utf16(bytes: &[u8], unit: fn([u8; 2]) -> u16) -> Result<String> {
    if bytes.len() % 2 != 0 {
        return Err(VmgError::Decode("odd byte count for UTF-16 text".to_string()));
    }
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| unit([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&units).map_err(|e| VmgError::Decode(format!("invalid UTF-16: {e}")))
}

fn is_vmg(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.to_string_lossy().eq_ignore_ascii_case("vmg"))
}

/// Unreadable or undecodable files are not parse failures
fn is_parse_failure(error: &VmgError) -> bool {
    matches!(error, VmgError::Parse { .. })
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.display().to_string(), |name| name.to_string_lossy().into_owned())
}

/// Expand directories into their `*.vmg` files, sorted by path. Other paths
/// pass through unchanged so unreadable ones surface as per-file failures.
pub async fn collect_vmg_files(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for path in paths {
        let is_dir = tokio::fs::metadata(path)
            .await
            .map(|meta| meta.is_dir())
            .unwrap_or(false);
        if !is_dir {
            files.push(path.clone());
            continue;
        }

        let mut found = Vec::new();
        let mut entries = tokio::fs::read_dir(path).await?;
        while let Some(entry) = entries.next_entry().await? {
            let entry_path = entry.path();
            if is_vmg(&entry_path) && entry.file_type().await?.is_file() {
                found.push(entry_path);
            }
        }
        found.sort();
        debug!(directory = %path.display(), files = found.len(), "Expanded directory");
        files.extend(found);
    }

    Ok(files)
}

/// Read, decode and parse one file without saving it
pub async fn parse_file(path: &Path, direction: Direction) -> Result<Message> {
    let bytes = tokio::fs::read(path).await?;
    let text = decode_text(&bytes)?;
    parser::parse(&text, &display_name(path), direction)
}

/// Feeds decoded files into a [`MessageRepository`]
pub struct IngestService {
    repository: Box<dyn MessageRepository>,
    progress: Option<ProgressCallback>,
    metrics: MetricsCollector,
}

impl IngestService {
    /// Service saving into `repository`, without progress reporting
    #[must_use]
    pub fn new(repository: Box<dyn MessageRepository>) -> Self {
        Self {
            repository,
            progress: None,
            metrics: MetricsCollector::default(),
        }
    }

    /// Report progress before each file is processed
    #[must_use]
    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    /// The repository messages are saved into
    pub fn repository(&self) -> &dyn MessageRepository {
        self.repository.as_ref()
    }

    /// Ingest `paths` (files or directories) with one direction.
    ///
    /// Unreadable, undecodable and unparseable files are counted and skipped.
    /// A storage failure stops the batch; messages saved before it stay saved.
    pub async fn ingest(&self, paths: &[PathBuf], direction: Direction) -> Result<IngestReport> {
        let timer = OperationTimer::new("ingest");
        let files = collect_vmg_files(paths).await?;
        let total = files.len();
        let mut report = IngestReport::default();

        info!(files = total, %direction, "Starting ingestion");

        for (index, path) in files.iter().enumerate() {
            let name = display_name(path);
            if let Some(progress) = &self.progress {
                progress(index + 1, total, &name);
            }

            let outcome = match parse_file(path, direction).await {
                Ok(message) => self.repository.save_message(message).map(|_| ()),
                Err(e) => Err(e),
            };

            match outcome {
                Ok(()) => {
                    report.loaded += 1;
                    self.metrics.record_file_ingested(true);
                }
                Err(e) if e.is_per_file() || matches!(e, VmgError::Io(_)) => {
                    warn!(file = %name, error = %e, "Skipping file");
                    report.failed += 1;
                    report.failures.push((path.clone(), e.to_string()));
                    self.metrics.record_file_ingested(false);
                    if is_parse_failure(&e) {
                        self.metrics.record_parse_failure();
                    }
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            loaded = report.loaded,
            failed = report.failed,
            "Ingestion finished"
        );
        timer.finish();
        Ok(report)
    }
}
