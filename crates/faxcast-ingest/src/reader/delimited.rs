//! Delimited text (`.csv`, `.txt`) decoding via Polars.
//!
//! Files are always read in no-header mode with every column typed as
//! `String`, so the first row comes back verbatim and duplicate or empty
//! header names never trip the reader.

use crate::error::{IngestError, Result};
use crate::reader::DecodedTable;
use crate::types::HeaderSet;
use crate::utils::{is_blank_row, strip_bom};
use polars::io::csv::read::{CsvParseOptions, CsvReadOptions};
use polars::prelude::*;
use std::io::Cursor;
use tracing::debug;

/// Candidate separators, in tie-break order.
const DELIMITERS: [u8; 4] = [b',', b'\t', b';', b'|'];

/// Pick the separator that occurs most often (outside quotes) in `line`.
///
/// Falls back to `,` when none of the candidates appear.
pub fn sniff_delimiter(line: &str) -> u8 {
    let mut counts = [0usize; DELIMITERS.len()];
    let mut in_quotes = false;

    for byte in line.bytes() {
        if byte == b'"' {
            in_quotes = !in_quotes;
            continue;
        }
        if in_quotes {
            continue;
        }
        if let Some(idx) = DELIMITERS.iter().position(|d| *d == byte) {
            counts[idx] += 1;
        }
    }

    let mut best = 0;
    for idx in 1..DELIMITERS.len() {
        if counts[idx] > counts[best] {
            best = idx;
        }
    }
    DELIMITERS[best]
}

pub(super) fn extract_headers(bytes: &[u8]) -> Result<HeaderSet> {
    let text = prepare_text(bytes)?;
    let df = read_frame(text, Some(1))?;
    let first = frame_rows(&df)?
        .into_iter()
        .next()
        .ok_or_else(|| IngestError::EmptyDocument("No headers found in CSV file".to_string()))?;
    HeaderSet::new(first)
}

pub(super) fn decode(bytes: &[u8]) -> Result<DecodedTable> {
    let text = prepare_text(bytes)?;
    let df = read_frame(text, None)?;
    let mut rows = frame_rows(&df)?.into_iter();

    let header_row = rows
        .next()
        .ok_or_else(|| IngestError::EmptyDocument("No headers found in CSV file".to_string()))?;
    let headers = HeaderSet::new(header_row)?;
    let rows: Vec<Vec<String>> = rows.filter(|row| !is_blank_row(row)).collect();

    debug!("Decoded {} delimited rows across {} columns", rows.len(), headers.len());
    Ok(DecodedTable { headers, rows })
}

/// Full non-blank row count, header excluded.
pub(super) fn count_records(bytes: &[u8]) -> Result<usize> {
    decode(bytes).map(|table| table.record_count())
}

/// Validate encoding, strip the BOM and skip leading blank lines.
fn prepare_text(bytes: &[u8]) -> Result<&str> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| IngestError::CorruptDocument(format!("unreadable encoding: {e}")))?;
    let text = skip_leading_blank_lines(strip_bom(text));

    if text.trim().is_empty() {
        return Err(IngestError::EmptyDocument(
            "No headers found in CSV file".to_string(),
        ));
    }
    Ok(text)
}

fn skip_leading_blank_lines(mut text: &str) -> &str {
    while let Some((line, rest)) = text.split_once('\n') {
        if !line.trim().is_empty() {
            break;
        }
        text = rest;
    }
    text
}

fn read_frame(text: &str, n_rows: Option<usize>) -> Result<DataFrame> {
    let first_line = text.lines().next().unwrap_or_default();
    let separator = sniff_delimiter(first_line);

    CsvReadOptions::default()
        .with_has_header(false)
        .with_infer_schema_length(Some(0))
        .with_n_rows(n_rows)
        .with_raise_if_empty(false)
        .with_parse_options(
            CsvParseOptions::default()
                .with_separator(separator)
                .with_quote_char(Some(b'"'))
                .with_truncate_ragged_lines(true),
        )
        .into_reader_with_file_handle(Cursor::new(text.as_bytes().to_vec()))
        .finish()
        .map_err(|e| IngestError::CorruptDocument(format!("CSV parsing error: {e}")))
}

/// Turn an all-`String` frame into positional rows; nulls become `""`.
fn frame_rows(df: &DataFrame) -> Result<Vec<Vec<String>>> {
    let columns = df
        .get_columns()
        .iter()
        .map(|column| column.as_materialized_series().str())
        .collect::<PolarsResult<Vec<_>>>()
        .map_err(|e| IngestError::CorruptDocument(e.to_string()))?;

    let rows = (0..df.height())
        .map(|idx| {
            columns
                .iter()
                .map(|values| values.get(idx).unwrap_or_default().to_string())
                .collect()
        })
        .collect();
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sniff_delimiter() {
        assert_eq!(sniff_delimiter("Name,Fax,Notes"), b',');
        assert_eq!(sniff_delimiter("Name\tFax\tNotes"), b'\t');
        assert_eq!(sniff_delimiter("Name;Fax;\"a,b\""), b';');
        assert_eq!(sniff_delimiter("Fax"), b',');
    }

    #[test]
    fn test_headers_keep_empty_columns() {
        let headers = extract_headers(b"Company,,Fax\nAcme,,555\n").unwrap();
        assert_eq!(headers.as_slice(), ["Company", "", "Fax"]);
    }

    #[test]
    fn test_headers_tab_separated_txt() {
        let headers = extract_headers(b"To\tFax Number\nDr. Lee\t555-0100\n").unwrap();
        assert_eq!(headers.as_slice(), ["To", "Fax Number"]);
    }

    #[test]
    fn test_headers_skip_bom_and_blank_lines() {
        let headers = extract_headers("\u{feff}\n\nFax,Name\n1,a\n".as_bytes()).unwrap();
        assert_eq!(headers.as_slice(), ["Fax", "Name"]);
    }

    #[test]
    fn test_headers_quoted_field() {
        let headers = extract_headers(b"\"Office, Main\",Fax\n").unwrap();
        assert_eq!(headers.as_slice(), ["Office, Main", "Fax"]);
    }

    #[test]
    fn test_empty_file_is_empty_document() {
        assert!(matches!(
            extract_headers(b"\n  \n"),
            Err(IngestError::EmptyDocument(_))
        ));
        assert!(matches!(decode(b""), Err(IngestError::EmptyDocument(_))));
    }

    #[test]
    fn test_invalid_utf8_is_corrupt() {
        assert!(matches!(
            extract_headers(&[0x46, 0x61, 0xff, 0xfe, 0x78]),
            Err(IngestError::CorruptDocument(_))
        ));
    }

    #[test]
    fn test_decode_skips_blank_rows() {
        let table = decode(b"Fax,Name\n555-0100,A\n,\n555-0101,B\n").unwrap();
        assert_eq!(table.headers.as_slice(), ["Fax", "Name"]);
        assert_eq!(
            table.rows,
            vec![
                vec!["555-0100".to_string(), "A".to_string()],
                vec!["555-0101".to_string(), "B".to_string()],
            ]
        );
    }

    #[test]
    fn test_count_records_excludes_header() {
        assert_eq!(count_records(b"Fax\n1\n2\n3\n").unwrap(), 3);
        assert_eq!(count_records(b"Fax\n").unwrap(), 0);
    }
}
