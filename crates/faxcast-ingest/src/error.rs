//! Error types for the ingestion pipeline.
//!
//! Every failure the pipeline can surface lives in [`IngestError`]. Errors are
//! serializable as `{ code, message }` so an upload handler can forward them to
//! a notification channel unchanged.

use serde::Serialize;
use serde::ser::SerializeStruct;
use std::fmt;
use thiserror::Error;

/// Which kind of list already owns a filename.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ListKind {
    Recipient,
    Block,
}

impl fmt::Display for ListKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Recipient => f.write_str("contact"),
            Self::Block => f.write_str("block"),
        }
    }
}

/// The main error type for the ingestion pipeline.
#[derive(Error, Debug)]
pub enum IngestError {
    /// File extension is not one of csv, txt, xls, xlsx.
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    /// No header row, or a workbook without sheets.
    #[error("Empty document: {0}")]
    EmptyDocument(String),

    /// The underlying tabular decoder rejected the file.
    #[error("Corrupt document: {0}")]
    CorruptDocument(String),

    /// A required mapping field was left unset.
    #[error("Missing required field: {0}")]
    MissingRequiredField(String),

    /// File exceeds the configured upload limit.
    #[error("File '{file_name}' is {size} bytes, exceeding the {limit} byte limit")]
    FileTooLarge {
        file_name: String,
        size: u64,
        limit: u64,
    },

    /// Filename already taken by a recipient list or a block list.
    #[error("\"{file_name}\" is already being used as a {existing} list")]
    DuplicateFilename { file_name: String, existing: ListKind },

    /// Chunked materialization failed; the job carries the same message.
    #[error("Failed to process job: {0}")]
    JobDecodeFailure(String),

    /// A mapped column is not part of the header set.
    #[error("Column '{0}' not found in file headers")]
    ColumnNotFound(String),

    /// No job with this id is registered.
    #[error("Job '{0}' not found")]
    JobNotFound(String),

    /// No staged or accepted list with this id.
    #[error("List '{0}' not found")]
    ListNotFound(String),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Internal error (e.g., a worker task panicked).
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<IngestError>,
    },
}

impl IngestError {
    /// Add context to an error.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        IngestError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Stable error code for notification handling.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::UnsupportedFormat(_) => "UNSUPPORTED_FORMAT",
            Self::EmptyDocument(_) => "EMPTY_DOCUMENT",
            Self::CorruptDocument(_) => "CORRUPT_DOCUMENT",
            Self::MissingRequiredField(_) => "MISSING_REQUIRED_FIELD",
            Self::FileTooLarge { .. } => "FILE_TOO_LARGE",
            Self::DuplicateFilename { .. } => "DUPLICATE_FILENAME",
            Self::JobDecodeFailure(_) => "JOB_DECODE_FAILURE",
            Self::ColumnNotFound(_) => "COLUMN_NOT_FOUND",
            Self::JobNotFound(_) => "JOB_NOT_FOUND",
            Self::ListNotFound(_) => "LIST_NOT_FOUND",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::WithContext { source, .. } => source.error_code(),
        }
    }

    /// Errors that are shown as a dismissible warning rather than a failure.
    ///
    /// The user fixes these by picking another file; nothing was processed.
    pub fn is_warning(&self) -> bool {
        match self {
            Self::DuplicateFilename { .. }
            | Self::FileTooLarge { .. }
            | Self::UnsupportedFormat(_) => true,
            Self::WithContext { source, .. } => source.is_warning(),
            _ => false,
        }
    }

    /// Strip any context wrappers and return the underlying error.
    pub fn root(&self) -> &IngestError {
        match self {
            Self::WithContext { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Errors are serialized as a struct with `code` and `message` fields.
impl Serialize for IngestError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("IngestError", 2)?;
        state.serialize_field("code", &self.error_code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// Result type alias for ingestion operations.
pub type Result<T> = std::result::Result<T, IngestError>;

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| IngestError::Io(e).with_context(context))
    }
}
