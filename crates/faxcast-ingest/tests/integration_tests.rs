//! Integration tests for the list ingestion pipeline.
//!
//! These tests drive the public API end to end with the CSV fixtures in
//! `tests/fixtures` and workbooks generated on the fly.

use faxcast_ingest::{
    BlockListStage, ColumnMapping, DecodedTable, FaxListProcessor, FaxRecipient, HeaderSet,
    IngestConfig, IngestError, IngestSession, JobEvent, JobEventKind, JobRegistry, JobStatus,
    ListInfo, ListKind, ListLedger, MappingField, MappingForm, TabularDecoder, TabularFile,
    classify, estimate_record_count, extract_headers,
};
use pretty_assertions::assert_eq;
use rust_xlsxwriter::Workbook;
use std::path::PathBuf;
use std::sync::Arc;

// ============================================================================
// Helper Functions
// ============================================================================

fn fixtures_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn load_fixture(filename: &str) -> TabularFile {
    TabularFile::from_path(fixtures_path().join(filename)).expect("Failed to read fixture")
}

fn headers(names: &[&str]) -> HeaderSet {
    HeaderSet::new(names.iter().map(|s| s.to_string()).collect()).unwrap()
}

fn fast_config() -> IngestConfig {
    IngestConfig::builder().batch_pause_ms(0).build().unwrap()
}

fn fax_csv(file_name: &str, rows: usize) -> TabularFile {
    let mut body = String::from("Fax,Name\n");
    for i in 0..rows {
        body.push_str(&format!("555-{:07},Recipient {}\n", i, i));
    }
    TabularFile::new(file_name, body.into_bytes())
}

fn xlsx_file(file_name: &str, rows: &[&[&str]]) -> TabularFile {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    for (r, row) in rows.iter().enumerate() {
        for (c, value) in row.iter().enumerate() {
            if !value.is_empty() {
                sheet.write_string(r as u32, c as u16, *value).unwrap();
            }
        }
    }
    TabularFile::new(file_name, workbook.save_to_buffer().unwrap())
}

/// Every `Progress` event of a job, as (processed, percent), in publish order.
fn progress_points(events: &[JobEvent]) -> Vec<(Option<usize>, u8)> {
    events
        .iter()
        .filter(|e| e.kind == JobEventKind::Progress)
        .map(|e| (e.job.processed_records, e.job.progress))
        .collect()
}

/// Decoder that yields `rows` fax rows and leaves record `broken` without cells.
struct BrokenRowDecoder {
    rows: usize,
    broken: usize,
}

impl TabularDecoder for BrokenRowDecoder {
    fn extract_headers(&self, _file: &TabularFile) -> faxcast_ingest::IngestResult<HeaderSet> {
        Ok(headers(&["Fax"]))
    }

    fn estimate_record_count(&self, _file: &TabularFile) -> faxcast_ingest::IngestResult<usize> {
        Ok(self.rows)
    }

    fn decode(&self, _file: &TabularFile) -> faxcast_ingest::IngestResult<DecodedTable> {
        let rows = (0..self.rows)
            .map(|i| {
                if i == self.broken {
                    Vec::new()
                } else {
                    vec![format!("555-{:07}", i)]
                }
            })
            .collect();
        Ok(DecodedTable {
            headers: headers(&["Fax"]),
            rows,
        })
    }
}

// ============================================================================
// Header Extraction
// ============================================================================

#[test]
fn test_extraction_is_deterministic_across_formats() {
    let csv = load_fixture("clinics.csv");
    assert_eq!(extract_headers(&csv).unwrap(), extract_headers(&csv).unwrap());

    let xlsx = xlsx_file(
        "clinics.xlsx",
        &[&["Company", "Fax", "Notes"], &["Acme Inc", "555-123-4567", "urgent"]],
    );
    let first = extract_headers(&xlsx).unwrap();
    assert_eq!(first, extract_headers(&xlsx).unwrap());
    assert_eq!(first, extract_headers(&csv).unwrap());
}

#[test]
fn test_tab_separated_txt_with_blank_row() {
    let file = load_fixture("physicians.txt");
    let headers = extract_headers(&file).unwrap();
    assert_eq!(headers.as_slice(), ["Physician", "Fax Number", "City"]);
    assert_eq!(estimate_record_count(&file).unwrap(), 3);

    let mapping = classify(&headers);
    assert_eq!(mapping.fax_number, "Fax Number");
    assert_eq!(mapping.to_header.as_deref(), Some("Physician"));
}

#[test]
fn test_bom_and_duplicate_like_headers() {
    let file = load_fixture("mixed_headers.csv");
    let headers = extract_headers(&file).unwrap();
    assert_eq!(headers.as_slice(), ["Name", "FaxNumber", "Fax", "Office"]);
}

#[test]
fn test_unsupported_and_empty_files() {
    let pdf = TabularFile::new("scan.pdf", b"%PDF-1.4".to_vec());
    assert!(matches!(
        extract_headers(&pdf),
        Err(IngestError::UnsupportedFormat(_))
    ));

    let empty = TabularFile::new("empty.csv", Vec::new());
    assert!(matches!(
        extract_headers(&empty),
        Err(IngestError::EmptyDocument(_))
    ));
}

// ============================================================================
// Classification and Confirmation
// ============================================================================

#[test]
fn test_classification_prefers_leftmost_fax_column() {
    let mapping = classify(&headers(&["Name", "FaxNumber", "Fax"]));
    assert_eq!(mapping.fax_number, "FaxNumber");
}

#[test]
fn test_confirm_requires_fax_column() {
    let mut form = MappingForm::seeded(headers(&["Company", "Notes", "Fax"]));
    form.set_column(MappingField::FaxNumber, None).unwrap();
    assert!(matches!(
        form.confirm(),
        Err(IngestError::MissingRequiredField(_))
    ));

    form.set_column(MappingField::FaxNumber, Some("Fax")).unwrap();
    assert_eq!(form.confirm().unwrap().mapping.fax_number, "Fax");
}

// ============================================================================
// Chunked Materialization
// ============================================================================

#[tokio::test]
async fn test_progress_is_reported_per_batch() {
    let registry = JobRegistry::new();
    let mut events = registry.subscribe();
    let processor = FaxListProcessor::new(fast_config(), registry.clone());

    let handle = processor
        .process_file(fax_csv("big.csv", 2500), ColumnMapping::fax_only("Fax"))
        .unwrap();
    let job_id = handle.id().to_string();
    let job_events = events.collect_job(&job_id).await.unwrap();

    assert_eq!(
        progress_points(&job_events),
        vec![(Some(1000), 40), (Some(2000), 80), (Some(2500), 100)]
    );
    assert_eq!(job_events.first().map(|e| e.kind), Some(JobEventKind::Queued));
    assert_eq!(job_events[1].job.status, JobStatus::Processing);

    let last = job_events.last().unwrap();
    assert_eq!(last.kind, JobEventKind::Completed);
    assert_eq!(last.job.progress, 100);
    assert_eq!(last.job.total_records, Some(2500));

    let recipients = handle.wait().await.unwrap();
    assert_eq!(recipients.len(), 2500);
    assert_eq!(recipients[2499].fax_number, "555-0002499");
    assert_eq!(registry.get_job(&job_id).unwrap().status, JobStatus::Completed);
}

#[tokio::test]
async fn test_paced_batches_complete() {
    let config = IngestConfig::builder()
        .batch_size(2)
        .batch_pause_ms(5)
        .build()
        .unwrap();
    let processor = FaxListProcessor::new(config, JobRegistry::new());

    let recipients = processor
        .process_file(fax_csv("small.csv", 5), ColumnMapping::fax_only("Fax"))
        .unwrap()
        .wait()
        .await
        .unwrap();
    assert_eq!(recipients.len(), 5);
}

#[tokio::test]
async fn test_failure_in_second_batch_discards_output() {
    let registry = JobRegistry::new();
    let mut events = registry.subscribe();
    let processor = FaxListProcessor::with_decoder(
        fast_config(),
        registry.clone(),
        Arc::new(BrokenRowDecoder {
            rows: 2500,
            broken: 1500,
        }),
    );

    let handle = processor
        .process_file(
            TabularFile::new("big.csv", b"Fax\n".to_vec()),
            ColumnMapping::fax_only("Fax"),
        )
        .unwrap();
    let job_id = handle.id().to_string();
    let job_events = events.collect_job(&job_id).await.unwrap();

    assert_eq!(progress_points(&job_events), vec![(Some(1000), 40)]);
    let last = job_events.last().unwrap();
    assert_eq!(last.kind, JobEventKind::Failed);
    assert_eq!(last.job.status, JobStatus::Failed);
    assert_eq!(last.job.processed_records, Some(1000));
    assert!(last.job.error.as_deref().unwrap().contains("1501"));

    assert!(matches!(
        handle.wait().await,
        Err(IngestError::JobDecodeFailure(_))
    ));

    assert!(registry.remove_job(&job_id));
    assert!(!registry.remove_job(&job_id));
}

#[tokio::test]
async fn test_header_only_file_completes_immediately() {
    let registry = JobRegistry::new();
    let processor = FaxListProcessor::new(fast_config(), registry.clone());

    let handle = processor
        .process_file(fax_csv("empty.csv", 0), ColumnMapping::fax_only("Fax"))
        .unwrap();
    let id = handle.id().to_string();
    assert!(handle.wait().await.unwrap().is_empty());

    let job = registry.get_job(&id).unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.progress, 100);
    assert_eq!(job.processed_records, Some(0));
}

#[tokio::test]
async fn test_unknown_mapped_column_fails_job() {
    let processor = FaxListProcessor::new(fast_config(), JobRegistry::new());
    let result = processor
        .process_file(fax_csv("list.csv", 3), ColumnMapping::fax_only("Fax Number"))
        .unwrap()
        .wait()
        .await;
    assert!(matches!(result, Err(IngestError::JobDecodeFailure(msg)) if msg.contains("Fax Number")));
}

// ============================================================================
// End-to-end Sessions
// ============================================================================

#[tokio::test]
async fn test_csv_to_recipient() {
    let session = IngestSession::new(fast_config(), JobRegistry::new());
    let staged = session
        .stage_recipient_list(load_fixture("clinics.csv"))
        .unwrap();
    assert_eq!(
        staged.form.confirm().unwrap().mapping,
        ColumnMapping::new("Fax", Some("Company".to_string()))
    );

    session
        .confirm_recipient_list(&staged.id, &staged.form)
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert_eq!(
        session.recipients(),
        vec![FaxRecipient {
            fax_number: "555-123-4567".to_string(),
            to_header: Some("Acme Inc".to_string()),
        }]
    );
}

#[tokio::test]
async fn test_xlsx_list_through_session() {
    let session = IngestSession::new(fast_config(), JobRegistry::new());
    let file = xlsx_file(
        "labs.xlsx",
        &[
            &["Office", "Fax #"],
            &["North Lab", "555-400-1000"],
            &["", ""],
            &["South Lab", "555-400-2000"],
        ],
    );

    let staged = session.stage_recipient_list(file).unwrap();
    assert_eq!(staged.form.column(MappingField::FaxNumber), Some("Fax #"));

    let list = session
        .confirm_recipient_list(&staged.id, &staged.form)
        .unwrap()
        .wait()
        .await
        .unwrap();
    assert_eq!(list.recipient_count, 2);
}

#[tokio::test]
async fn test_failed_job_leaves_ledger_untouched() {
    let session = IngestSession::with_decoder(
        fast_config(),
        JobRegistry::new(),
        Arc::new(BrokenRowDecoder {
            rows: 10,
            broken: 3,
        }),
    );
    let staged = session
        .stage_recipient_list(TabularFile::new("list.csv", b"Fax\n".to_vec()))
        .unwrap();

    let result = session
        .confirm_recipient_list(&staged.id, &staged.form)
        .unwrap()
        .wait()
        .await;
    assert!(result.is_err());
    assert_eq!(session.summary().total_recipients, 0);
    assert!(session.lists().is_empty());

    // Still staged, so it can be confirmed again.
    assert!(session.confirm_recipient_list(&staged.id, &staged.form).is_ok());
}

#[tokio::test]
async fn test_block_list_named_like_recipient_list_is_rejected() {
    let config = IngestConfig::builder()
        .batch_pause_ms(0)
        .toll_free_baseline(1250)
        .stored_baseline(551)
        .build()
        .unwrap();
    let session = IngestSession::new(config, JobRegistry::new());

    let staged = session
        .stage_recipient_list(load_fixture("clinics.csv"))
        .unwrap();
    session
        .confirm_recipient_list(&staged.id, &staged.form)
        .unwrap()
        .wait()
        .await
        .unwrap();

    let before = session.summary().total_blocked;
    let err = session
        .stage_block_list(TabularFile::new("clinics.csv", b"Fax\n555-1\n".to_vec()))
        .unwrap_err();
    assert!(matches!(
        err,
        IngestError::DuplicateFilename {
            existing: ListKind::Recipient,
            ..
        }
    ));
    assert_eq!(session.summary().total_blocked, before);
    assert_eq!(before, 1801);
}

#[tokio::test]
async fn test_block_list_auto_maps_and_counts() {
    let session = IngestSession::new(fast_config(), JobRegistry::new());

    let BlockListStage::AutoMapped(job) = session
        .stage_block_list(load_fixture("optout.csv"))
        .unwrap()
    else {
        panic!("optout.csv has a Fax Number column");
    };
    let info = job.wait().await.unwrap();
    assert_eq!(info.number_count, 3);
    assert_eq!(info.mapping.fax_number, "Fax Number");

    let BlockListStage::NeedsMapping(staged) = session
        .stage_block_list(load_fixture("optout_unlabeled.csv"))
        .unwrap()
    else {
        panic!("optout_unlabeled.csv has no fax header");
    };
    let mut form = staged.form.clone();
    form.set_fax_column(Some("Number")).unwrap();
    session
        .confirm_block_list(&staged.id, &form)
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert_eq!(session.summary().total_blocked, 4);
    assert_eq!(session.blocked_numbers().len(), 4);

    // Same name again is a block-vs-block collision.
    assert!(matches!(
        session.stage_block_list(load_fixture("optout.csv")),
        Err(IngestError::DuplicateFilename {
            existing: ListKind::Block,
            ..
        })
    ));
}

#[tokio::test]
async fn test_oversized_upload_is_a_warning() {
    let config = IngestConfig::builder()
        .max_file_size_bytes(16)
        .batch_pause_ms(0)
        .build()
        .unwrap();
    let session = IngestSession::new(config, JobRegistry::new());

    let err = session
        .stage_recipient_list(load_fixture("physicians.txt"))
        .unwrap_err();
    assert!(matches!(err, IngestError::FileTooLarge { .. }));
    assert!(err.is_warning());
    assert_eq!(
        serde_json::to_value(&err).unwrap()["code"],
        "FILE_TOO_LARGE"
    );
}

// ============================================================================
// Reconciliation
// ============================================================================

#[test]
fn test_replacing_a_list_keeps_totals() {
    let mut ledger = ListLedger::new(0, 0);
    let info = ListInfo {
        id: "list1".to_string(),
        file_name: "clinics.csv".to_string(),
        recipient_count: 2,
        mapping: ColumnMapping::fax_only("Fax"),
        has_international: false,
    };
    let recipients = vec![
        FaxRecipient {
            fax_number: "1".to_string(),
            to_header: None,
        },
        FaxRecipient {
            fax_number: "2".to_string(),
            to_header: None,
        },
    ];

    ledger.add_or_replace_list(info.clone(), recipients.clone());
    let total = ledger.total_recipients();
    ledger.add_or_replace_list(info, recipients);
    assert_eq!(ledger.total_recipients(), total);
    assert_eq!(ledger.lists().count(), 1);
}

#[tokio::test]
async fn test_remove_and_reset() {
    let session = IngestSession::new(fast_config(), JobRegistry::new());
    for name in ["a.csv", "b.csv"] {
        let staged = session.stage_recipient_list(fax_csv(name, 3)).unwrap();
        session
            .confirm_recipient_list(&staged.id, &staged.form)
            .unwrap()
            .wait()
            .await
            .unwrap();
    }
    assert_eq!(session.summary().total_recipients, 6);

    let first = session.lists()[0].id.clone();
    session.remove_recipient_list(&first).unwrap();
    assert_eq!(session.summary().total_recipients, 3);
    assert_eq!(session.lists()[0].file_name, "b.csv");

    // The name is free again once removed.
    assert!(session.stage_recipient_list(fax_csv("a.csv", 1)).is_ok());

    session.reset();
    assert_eq!(session.summary().list_count, 0);
}
