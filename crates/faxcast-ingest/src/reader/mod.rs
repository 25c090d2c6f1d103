//! Header extraction and record decoding for uploaded tabular files.
//!
//! Delimited text (`.csv`, `.txt`) is decoded with Polars; workbooks (`.xls`,
//! `.xlsx`) with calamine, first sheet only. Everything goes through the
//! [`TabularDecoder`] trait so callers can substitute their own decoder.
//!
//! # Example
//!
//! ```rust,ignore
//! use faxcast_ingest::{TabularFile, reader};
//!
//! let file = TabularFile::from_path("clinics.csv")?;
//! let headers = reader::extract_headers(&file)?;
//! let approx = reader::estimate_record_count(&file)?;
//! println!("{} columns, about {} records", headers.len(), approx);
//! ```

mod delimited;
mod spreadsheet;

pub use delimited::sniff_delimiter;

use crate::error::{IngestError, Result};
use crate::types::{FileFormat, HeaderSet, TabularFile};
use tracing::debug;

/// A fully decoded file: header row plus every non-blank data row.
///
/// Rows are positional; `rows[i][c]` belongs to `headers[c]`. A row may be
/// shorter than the header set when the decoder could not fill trailing cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedTable {
    pub headers: HeaderSet,
    pub rows: Vec<Vec<String>>,
}

impl DecodedTable {
    pub fn record_count(&self) -> usize {
        self.rows.len()
    }
}

/// The decoding collaborator used by the pipeline.
///
/// Implementations must be deterministic: the same bytes always yield the same
/// headers in the same order.
pub trait TabularDecoder: Send + Sync {
    /// Read only the header row.
    fn extract_headers(&self, file: &TabularFile) -> Result<HeaderSet>;

    /// Best-effort record count for display. Not a commitment.
    fn estimate_record_count(&self, file: &TabularFile) -> Result<usize>;

    /// Materialize the whole file.
    fn decode(&self, file: &TabularFile) -> Result<DecodedTable>;
}

/// Default decoder dispatching on the file extension.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileDecoder;

impl TabularDecoder for FileDecoder {
    fn extract_headers(&self, file: &TabularFile) -> Result<HeaderSet> {
        let format = file.format()?;
        debug!("Extracting headers from {} ({})", file.file_name(), format);
        if format.is_delimited() {
            delimited::extract_headers(file.bytes())
        } else {
            spreadsheet::extract_headers(file.bytes(), format)
        }
    }

    fn estimate_record_count(&self, file: &TabularFile) -> Result<usize> {
        let format = file.format()?;
        if format.is_delimited() {
            delimited::count_records(file.bytes())
        } else {
            spreadsheet::estimate_records(file.bytes(), format)
        }
    }

    fn decode(&self, file: &TabularFile) -> Result<DecodedTable> {
        let format = file.format()?;
        debug!("Decoding {} ({})", file.file_name(), format);
        if format.is_delimited() {
            delimited::decode(file.bytes())
        } else {
            spreadsheet::decode(file.bytes(), format)
        }
    }
}

/// Extract the ordered header row of `file`.
pub fn extract_headers(file: &TabularFile) -> Result<HeaderSet> {
    FileDecoder.extract_headers(file)
}

/// Approximate number of data records in `file`.
pub fn estimate_record_count(file: &TabularFile) -> Result<usize> {
    FileDecoder.estimate_record_count(file)
}

/// Decode every record of `file`.
pub fn decode_records(file: &TabularFile) -> Result<DecodedTable> {
    FileDecoder.decode(file)
}

/// Admission check run before a file enters the pipeline.
///
/// Rejects unsupported extensions and files above `max_bytes`.
pub fn validate_file(file: &TabularFile, max_bytes: u64) -> Result<FileFormat> {
    let format = file.format()?;
    if file.size() > max_bytes {
        return Err(IngestError::FileTooLarge {
            file_name: file.file_name().to_string(),
            size: file.size(),
            limit: max_bytes,
        });
    }
    Ok(format)
}
