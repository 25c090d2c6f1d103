//! Chunked materialization of recipient rows.

use super::events::JobEventKind;
use super::registry::JobRegistry;
use crate::config::IngestConfig;
use crate::error::{IngestError, Result};
use crate::reader::{DecodedTable, FileDecoder, TabularDecoder, validate_file};
use crate::types::{
    ColumnMapping, FaxRecipient, JobStatus, ProcessingJob, TabularFile, percent_complete,
};
use crate::utils::generate_id;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Turns confirmed files into recipients in fixed-size batches, publishing
/// progress through the injected [`JobRegistry`].
#[derive(Clone)]
pub struct FaxListProcessor {
    config: IngestConfig,
    registry: JobRegistry,
    decoder: Arc<dyn TabularDecoder>,
}

static_assertions::assert_impl_all!(FaxListProcessor: Send, Sync);

impl FaxListProcessor {
    pub fn new(config: IngestConfig, registry: JobRegistry) -> Self {
        Self::with_decoder(config, registry, Arc::new(FileDecoder))
    }

    pub fn with_decoder(
        config: IngestConfig,
        registry: JobRegistry,
        decoder: Arc<dyn TabularDecoder>,
    ) -> Self {
        Self {
            config,
            registry,
            decoder,
        }
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    pub fn decoder(&self) -> &Arc<dyn TabularDecoder> {
        &self.decoder
    }

    /// Register a job for `file` and start materializing it in the background.
    ///
    /// The job is visible in the registry as `queued` when this returns.
    /// Must be called from within a Tokio runtime.
    pub fn process_file(&self, file: TabularFile, mapping: ColumnMapping) -> Result<JobHandle> {
        validate_file(&file, self.config.max_file_size_bytes)?;
        let runtime = Handle::try_current()
            .map_err(|e| IngestError::Internal(format!("no async runtime available: {e}")))?;

        let job = ProcessingJob::new(generate_id(), file.file_name(), mapping.clone());
        let id = job.id.clone();
        self.registry.insert(job);
        info!("Queued job {} for '{}'", id, file.file_name());

        let run = JobRun {
            id: id.clone(),
            file,
            mapping,
            config: self.config.clone(),
            registry: self.registry.clone(),
            decoder: Arc::clone(&self.decoder),
        };
        let join = runtime.spawn(run.execute());
        Ok(JobHandle { id, join })
    }
}

/// Handle to a running job.
#[derive(Debug)]
pub struct JobHandle {
    id: String,
    join: JoinHandle<Result<Vec<FaxRecipient>>>,
}

impl JobHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the job to finish. On failure the error message matches the
    /// one stored on the job.
    pub async fn wait(self) -> Result<Vec<FaxRecipient>> {
        self.join
            .await
            .map_err(|e| IngestError::Internal(format!("job {} panicked: {e}", self.id)))?
    }
}

struct JobRun {
    id: String,
    file: TabularFile,
    mapping: ColumnMapping,
    config: IngestConfig,
    registry: JobRegistry,
    decoder: Arc<dyn TabularDecoder>,
}

impl JobRun {
    async fn execute(self) -> Result<Vec<FaxRecipient>> {
        self.registry.update(&self.id, JobEventKind::Started, |job| {
            job.status = JobStatus::Processing;
        });

        match self.materialize().await {
            Ok(recipients) => {
                self.registry.update(&self.id, JobEventKind::Completed, |job| {
                    job.status = JobStatus::Completed;
                    job.progress = 100;
                    // Header-only files never publish a batch.
                    job.total_records.get_or_insert(recipients.len());
                    job.processed_records.get_or_insert(recipients.len());
                });
                info!(
                    "Job {} completed with {} recipients",
                    self.id,
                    recipients.len()
                );
                Ok(recipients)
            }
            Err(e) => {
                let message = e.to_string();
                error!("Job {} failed: {}", self.id, message);
                self.registry.update(&self.id, JobEventKind::Failed, |job| {
                    job.status = JobStatus::Failed;
                    job.error = Some(message.clone());
                });
                Err(IngestError::JobDecodeFailure(message))
            }
        }
    }

    async fn materialize(&self) -> Result<Vec<FaxRecipient>> {
        let table = self.decode().await?;
        let columns = MappedColumns::resolve(&table, &self.mapping)?;
        let total = table.record_count();

        let batch_size = self.config.batch_size.max(1);
        let batch_count = total.div_ceil(batch_size);
        let pause = self.config.batch_pause();
        let mut recipients = Vec::with_capacity(total);
        let mut processed = 0;

        for (batch_idx, batch) in table.rows.chunks(batch_size).enumerate() {
            for (offset, row) in batch.iter().enumerate() {
                recipients.push(columns.recipient(row, processed + offset)?);
            }
            processed += batch.len();

            debug!(
                "Job {} batch {}/{}: {} of {} records",
                self.id,
                batch_idx + 1,
                batch_count,
                processed,
                total
            );
            self.registry.update(&self.id, JobEventKind::Progress, |job| {
                job.total_records = Some(total);
                job.processed_records = Some(processed);
                job.progress = percent_complete(processed, total);
            });

            if batch_idx + 1 < batch_count && !pause.is_zero() {
                tokio::time::sleep(pause).await;
            }
        }

        Ok(recipients)
    }

    async fn decode(&self) -> Result<DecodedTable> {
        let decoder = Arc::clone(&self.decoder);
        let file = self.file.clone();
        tokio::task::spawn_blocking(move || decoder.decode(&file))
            .await
            .map_err(|e| IngestError::Internal(format!("decode task failed: {e}")))?
    }
}

/// Column indices of a mapping within a decoded table.
struct MappedColumns<'a> {
    fax: usize,
    fax_name: &'a str,
    to: Option<usize>,
}

impl<'a> MappedColumns<'a> {
    fn resolve(table: &DecodedTable, mapping: &'a ColumnMapping) -> Result<Self> {
        let locate = |name: &str| {
            table
                .headers
                .position(name)
                .ok_or_else(|| IngestError::ColumnNotFound(name.to_string()))
        };

        if !mapping.has_fax_number() {
            return Err(IngestError::MissingRequiredField("fax_number".to_string()));
        }
        let fax = locate(&mapping.fax_number)?;
        let to = mapping.to_header.as_deref().map(locate).transpose()?;

        Ok(Self {
            fax,
            fax_name: &mapping.fax_number,
            to,
        })
    }

    /// `record` is zero-based among data rows.
    fn recipient(&self, row: &[String], record: usize) -> Result<FaxRecipient> {
        let fax_number = row.get(self.fax).ok_or_else(|| {
            IngestError::CorruptDocument(format!(
                "record {} has no value for column '{}'",
                record + 1,
                self.fax_name
            ))
        })?;

        let to_header = self
            .to
            .and_then(|idx| row.get(idx))
            .map(|cell| cell.trim())
            .filter(|cell| !cell.is_empty())
            .map(str::to_string);

        Ok(FaxRecipient {
            fax_number: fax_number.trim().to_string(),
            to_header,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::HeaderSet;
    use pretty_assertions::assert_eq;

    fn headers(names: &[&str]) -> HeaderSet {
        HeaderSet::new(names.iter().map(|s| s.to_string()).collect()).unwrap()
    }

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_mapped_columns_use_first_duplicate() {
        let table = DecodedTable {
            headers: headers(&["Fax", "Company", "Fax"]),
            rows: vec![row(&["1", "Acme", "2"])],
        };
        let mapping = ColumnMapping::new("Fax", Some("Company".to_string()));
        let columns = MappedColumns::resolve(&table, &mapping).unwrap();
        assert_eq!(
            columns.recipient(&table.rows[0], 0).unwrap(),
            FaxRecipient {
                fax_number: "1".to_string(),
                to_header: Some("Acme".to_string()),
            }
        );
    }

    #[test]
    fn test_missing_mapped_column_fails() {
        let table = DecodedTable {
            headers: headers(&["Fax"]),
            rows: Vec::new(),
        };
        let mapping = ColumnMapping::new("Fax", Some("Office".to_string()));
        assert!(matches!(
            MappedColumns::resolve(&table, &mapping),
            Err(IngestError::ColumnNotFound(name)) if name == "Office"
        ));
    }

    #[test]
    fn test_short_row_fails_but_missing_to_cell_is_blank() {
        let table = DecodedTable {
            headers: headers(&["Name", "Fax", "Office"]),
            rows: Vec::new(),
        };
        let mapping = ColumnMapping::new("Fax", Some("Office".to_string()));
        let columns = MappedColumns::resolve(&table, &mapping).unwrap();

        assert!(columns.recipient(&row(&["Lee"]), 4).is_err());
        assert_eq!(
            columns.recipient(&row(&["Lee", " 555 "]), 5).unwrap().to_header,
            None
        );
    }

    #[tokio::test]
    async fn test_process_file_rejects_oversized_file() {
        let config = IngestConfig::builder().max_file_size_bytes(4).build().unwrap();
        let processor = FaxListProcessor::new(config, JobRegistry::new());
        let file = TabularFile::new("list.csv", b"Fax\n1\n".to_vec());

        let result = processor.process_file(file, ColumnMapping::fax_only("Fax"));
        assert!(matches!(result, Err(IngestError::FileTooLarge { .. })));
        assert!(processor.registry().jobs().is_empty());
    }
}
