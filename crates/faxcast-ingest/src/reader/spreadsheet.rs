//! Workbook (`.xls`, `.xlsx`) decoding via calamine. Only the first sheet is read.

use crate::error::{IngestError, Result};
use crate::reader::DecodedTable;
use crate::types::{FileFormat, HeaderSet};
use crate::utils::is_blank_row;
use calamine::{Data, Range, Reader, Xls, Xlsx, open_workbook_from_rs};
use std::fmt::Display;
use std::io::{Cursor, Read, Seek};
use tracing::debug;

type WorkbookCursor = Cursor<Vec<u8>>;

pub(super) fn extract_headers(bytes: &[u8], format: FileFormat) -> Result<HeaderSet> {
    let range = first_sheet_range(bytes, format)?;
    let header_row = range
        .rows()
        .next()
        .ok_or_else(|| IngestError::EmptyDocument("First sheet is empty".to_string()))?;

    // One entry per used column; missing cells become empty labels.
    let headers = header_row
        .iter()
        .map(|cell| cell_text(cell).trim().to_string())
        .collect();
    HeaderSet::new(headers)
}

/// Last used row index of the first sheet, i.e. the row count minus a header
/// when the sheet starts at row 0.
pub(super) fn estimate_records(bytes: &[u8], format: FileFormat) -> Result<usize> {
    let range = first_sheet_range(bytes, format)?;
    Ok(range.end().map(|(row, _)| row as usize).unwrap_or(0))
}

pub(super) fn decode(bytes: &[u8], format: FileFormat) -> Result<DecodedTable> {
    let range = first_sheet_range(bytes, format)?;
    let mut rows = range.rows();

    let header_row = rows
        .next()
        .ok_or_else(|| IngestError::EmptyDocument("First sheet is empty".to_string()))?;
    let headers = HeaderSet::new(
        header_row
            .iter()
            .map(|cell| cell_text(cell).trim().to_string())
            .collect(),
    )?;

    let rows: Vec<Vec<String>> = rows
        .map(|row| row.iter().map(cell_text).collect::<Vec<_>>())
        .filter(|row| !is_blank_row(row))
        .collect();

    debug!("Decoded {} sheet rows across {} columns", rows.len(), headers.len());
    Ok(DecodedTable { headers, rows })
}

fn first_sheet_range(bytes: &[u8], format: FileFormat) -> Result<Range<Data>> {
    let cursor = Cursor::new(bytes.to_vec());
    match format {
        FileFormat::Xls => {
            let workbook: Xls<WorkbookCursor> = open_workbook_from_rs(cursor).map_err(excel_error)?;
            first_sheet::<_, WorkbookCursor>(workbook)
        }
        FileFormat::Xlsx => {
            let workbook: Xlsx<WorkbookCursor> = open_workbook_from_rs(cursor).map_err(excel_error)?;
            first_sheet::<_, WorkbookCursor>(workbook)
        }
        other => Err(IngestError::UnsupportedFormat(format!(
            "{other} is not a spreadsheet format"
        ))),
    }
}

fn first_sheet<R, RS>(mut workbook: R) -> Result<Range<Data>>
where
    R: Reader<RS>,
    R::Error: Display,
    RS: Read + Seek,
{
    match workbook.worksheet_range_at(0) {
        None => Err(IngestError::EmptyDocument(
            "Excel file contains no sheets".to_string(),
        )),
        Some(Err(e)) => Err(excel_error(e)),
        Some(Ok(range)) => Ok(range),
    }
}

fn excel_error(err: impl Display) -> IngestError {
    IngestError::CorruptDocument(format!("Excel parsing error: {err}"))
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        other => other.to_string(),
    }
}
