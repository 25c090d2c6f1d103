use crate::error::{IngestError, Result, ResultExt};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

// ============================================================================
// Uploaded files
// ============================================================================

/// Tabular formats the pipeline understands, keyed by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileFormat {
    Csv,
    Txt,
    Xls,
    Xlsx,
}

impl FileFormat {
    /// Infer the format from the extension of `file_name` (case-insensitive).
    pub fn from_file_name(file_name: &str) -> Result<Self> {
        let extension = file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "csv" => Ok(Self::Csv),
            "txt" => Ok(Self::Txt),
            "xls" => Ok(Self::Xls),
            "xlsx" => Ok(Self::Xlsx),
            "" => Err(IngestError::UnsupportedFormat(format!(
                "'{file_name}' has no file extension"
            ))),
            other => Err(IngestError::UnsupportedFormat(other.to_string())),
        }
    }

    /// CSV and TXT are read as delimited text; XLS and XLSX as workbooks.
    pub fn is_delimited(&self) -> bool {
        matches!(self, Self::Csv | Self::Txt)
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Txt => "txt",
            Self::Xls => "xls",
            Self::Xlsx => "xlsx",
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// An uploaded file: immutable bytes plus the declared filename.
///
/// Cloning is cheap; the bytes are shared.
#[derive(Debug, Clone)]
pub struct TabularFile {
    file_name: String,
    bytes: Arc<[u8]>,
}

impl TabularFile {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes: Arc::from(bytes.into()),
        }
    }

    /// Read a file from disk, keeping only its final path component as the name.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).context(format!("Reading {}", path.display()))?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::new(file_name, bytes))
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Format inferred from the filename; fails for unsupported extensions.
    pub fn format(&self) -> Result<FileFormat> {
        FileFormat::from_file_name(&self.file_name)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

// ============================================================================
// Headers and mappings
// ============================================================================

/// Ordered column names of a file. Names are not guaranteed unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HeaderSet(Vec<String>);

impl HeaderSet {
    /// Wrap extracted headers; an empty list is an [`IngestError::EmptyDocument`].
    pub fn new(headers: Vec<String>) -> Result<Self> {
        if headers.is_empty() {
            return Err(IngestError::EmptyDocument(
                "no header row found".to_string(),
            ));
        }
        Ok(Self(headers))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Lowest index holding `name`.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.0.iter().position(|header| header == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }
}

/// Which physical columns hold the fax number and the optional "to" label.
///
/// `fax_number` is empty until a column is chosen.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub fax_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_header: Option<String>,
}

impl ColumnMapping {
    pub fn new(fax_number: impl Into<String>, to_header: Option<String>) -> Self {
        Self {
            fax_number: fax_number.into(),
            to_header,
        }
    }

    /// Mapping with only the fax column (block lists).
    pub fn fax_only(fax_number: impl Into<String>) -> Self {
        Self::new(fax_number, None)
    }

    pub fn has_fax_number(&self) -> bool {
        !self.fax_number.is_empty()
    }
}

// ============================================================================
// Lists and recipients
// ============================================================================

/// One materialized recipient row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaxRecipient {
    pub fax_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_header: Option<String>,
}

/// An accepted recipient list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListInfo {
    pub id: String,
    pub file_name: String,
    pub recipient_count: usize,
    pub mapping: ColumnMapping,
    pub has_international: bool,
}

/// An accepted block list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockListInfo {
    pub id: String,
    pub file_name: String,
    pub number_count: usize,
    /// Only `fax_number` is meaningful for block lists.
    pub mapping: ColumnMapping,
}

// ============================================================================
// Processing jobs
// ============================================================================

/// Lifecycle of a materialization job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Queued => "Queued",
            Self::Processing => "Processing",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
        }
    }
}

/// Snapshot of a materialization job as seen by subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingJob {
    pub id: String,
    pub file_name: String,
    pub status: JobStatus,
    /// Whole percent, 0 - 100.
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_records: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_records: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mapping: Option<ColumnMapping>,
    pub created_at: DateTime<Utc>,
}

impl ProcessingJob {
    pub fn new(id: impl Into<String>, file_name: impl Into<String>, mapping: ColumnMapping) -> Self {
        Self {
            id: id.into(),
            file_name: file_name.into(),
            status: JobStatus::Queued,
            progress: 0,
            total_records: None,
            processed_records: None,
            error: None,
            mapping: Some(mapping),
            created_at: Utc::now(),
        }
    }
}

/// Integer percentage, floored, of `processed` over `total`.
///
/// An empty job counts as done.
pub fn percent_complete(processed: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((processed.min(total) as u128 * 100) / total as u128) as u8
}
