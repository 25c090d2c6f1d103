//! Fax Broadcast List Ingestion
//!
//! Turns uploaded recipient spreadsheets into fax recipients for a broadcast.
//!
//! # Overview
//!
//! - **Header Extraction**: ordered column names from CSV, TXT, XLS and XLSX files
//! - **Column Classification**: pattern-based guess of the fax and "to" columns
//! - **Mapping Confirmation**: editable mapping with a required fax column
//! - **Chunked Materialization**: rows become recipients in batches, with
//!   progress published to subscribers
//! - **List Reconciliation**: recipient lists and block lists with consistent
//!   totals and filename collision checks
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use faxcast_ingest::{IngestConfig, IngestSession, JobRegistry, TabularFile};
//!
//! let session = IngestSession::new(IngestConfig::from_env()?, JobRegistry::new());
//! let mut events = session.subscribe();
//!
//! let staged = session.stage_recipient_list(TabularFile::from_path("clinics.csv")?)?;
//! println!("Headers: {:?}", staged.headers);
//!
//! let job = session.confirm_recipient_list(&staged.id, &staged.form)?;
//! for event in events.collect_job(job.job_id()).await? {
//!     println!("[{:>3}%] {:?}", event.job.progress, event.kind);
//! }
//! let list = job.wait().await?;
//! println!("{} recipients", list.recipient_count);
//! ```
//!
//! # Lower-level building blocks
//!
//! Each stage is usable on its own:
//!
//! ```rust,ignore
//! use faxcast_ingest::{reader, mapping, FaxListProcessor, IngestConfig, JobRegistry};
//!
//! let headers = reader::extract_headers(&file)?;
//! let form = mapping::MappingForm::seeded(headers);
//! let confirmed = form.confirm()?;
//!
//! let processor = FaxListProcessor::new(IngestConfig::default(), JobRegistry::new());
//! let recipients = processor.process_file(file, confirmed.mapping)?.wait().await?;
//! ```

pub mod config;
pub mod error;
pub mod mapping;
pub mod processor;
pub mod reader;
pub mod reconcile;
pub mod session;
pub mod types;
pub mod utils;

// Re-exports for convenient access
pub use config::{ConfigValidationError, IngestConfig, IngestConfigBuilder};
pub use error::{IngestError, ListKind, Result as IngestResult, ResultExt};
pub use mapping::{
    BlockListMappingForm, ConfirmedMapping, MappingField, MappingForm, classify,
    classify_block_list,
};
pub use processor::{
    ClosureJobReporter, FaxListProcessor, JobEvent, JobEventKind, JobHandle, JobRegistry,
    JobReporter, Subscription,
};
pub use reader::{
    DecodedTable, FileDecoder, TabularDecoder, decode_records, estimate_record_count,
    extract_headers, validate_file,
};
pub use reconcile::{LedgerSummary, ListLedger};
pub use session::{BlockListStage, IngestSession, ListJob, StagedBlockList, StagedList};
pub use types::{
    BlockListInfo, ColumnMapping, FaxRecipient, FileFormat, HeaderSet, JobStatus, ListInfo,
    ProcessingJob, TabularFile,
};
