//! Upload handling: admission, staging, confirmation and ledger updates.
//!
//! An [`IngestSession`] ties the reader, the classifier, the processor and
//! the [`ListLedger`] together. Recipient lists go through a staged
//! confirmation step; block lists are processed straight away when their fax
//! column is unambiguous.
//!
//! ```rust,ignore
//! let session = IngestSession::new(IngestConfig::from_env()?, JobRegistry::new());
//!
//! let staged = session.stage_recipient_list(TabularFile::from_path("clinics.csv")?)?;
//! let job = session.confirm_recipient_list(&staged.id, &staged.form)?;
//! let list = job.wait().await?;
//! println!("{} recipients from {}", list.recipient_count, list.file_name);
//! ```

use crate::config::IngestConfig;
use crate::error::{IngestError, ListKind, Result};
use crate::mapping::{BlockListMappingForm, ConfirmedMapping, MappingForm};
use crate::processor::{FaxListProcessor, JobRegistry, Subscription};
use crate::reader::{TabularDecoder, validate_file};
use crate::reconcile::{LedgerSummary, ListLedger};
use crate::types::{
    BlockListInfo, ColumnMapping, FaxRecipient, HeaderSet, ListInfo, TabularFile,
};
use crate::utils::generate_id;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// A recipient list waiting for the user to confirm its mapping.
#[derive(Debug, Clone)]
pub struct StagedList {
    /// Becomes the list id once accepted.
    pub id: String,
    pub file_name: String,
    pub headers: HeaderSet,
    pub estimated_records: usize,
    pub form: MappingForm,
}

/// A block list whose fax column could not be detected.
#[derive(Debug, Clone)]
pub struct StagedBlockList {
    pub id: String,
    pub file_name: String,
    pub headers: HeaderSet,
    pub form: BlockListMappingForm,
}

/// Outcome of [`IngestSession::stage_block_list`].
#[derive(Debug)]
pub enum BlockListStage {
    /// Processing already started.
    AutoMapped(ListJob<BlockListInfo>),
    NeedsMapping(StagedBlockList),
}

/// A running job whose result is applied to the ledger when it completes.
#[derive(Debug)]
pub struct ListJob<T> {
    job_id: String,
    list_id: String,
    join: JoinHandle<Result<T>>,
}

impl<T> ListJob<T> {
    /// Id of the job in the [`JobRegistry`].
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn list_id(&self) -> &str {
        &self.list_id
    }

    /// Wait until the list was accepted into the ledger, or the job failed.
    pub async fn wait(self) -> Result<T> {
        self.join
            .await
            .map_err(|e| IngestError::Internal(format!("list job {} panicked: {e}", self.job_id)))?
    }
}

#[derive(Debug, Clone)]
struct StagedSource {
    file: TabularFile,
    headers: HeaderSet,
    estimated_records: usize,
}

/// What an accepted list was built from, kept for re-editing.
#[derive(Debug, Clone)]
struct AcceptedSource {
    file: TabularFile,
    headers: HeaderSet,
    confirmed: ConfirmedMapping,
}

#[derive(Default)]
struct SessionState {
    ledger: RwLock<ListLedger>,
    staged: Mutex<HashMap<String, StagedSource>>,
    staged_blocks: Mutex<HashMap<String, StagedSource>>,
    accepted: Mutex<HashMap<String, AcceptedSource>>,
}

/// Cloneable handle to one user's ingestion state.
#[derive(Clone)]
pub struct IngestSession {
    config: IngestConfig,
    processor: FaxListProcessor,
    state: Arc<SessionState>,
}

static_assertions::assert_impl_all!(IngestSession: Send, Sync);

impl IngestSession {
    pub fn new(config: IngestConfig, registry: JobRegistry) -> Self {
        let processor = FaxListProcessor::new(config.clone(), registry);
        Self::with_processor(processor)
    }

    pub fn with_decoder(
        config: IngestConfig,
        registry: JobRegistry,
        decoder: Arc<dyn TabularDecoder>,
    ) -> Self {
        Self::with_processor(FaxListProcessor::with_decoder(config, registry, decoder))
    }

    pub fn with_processor(processor: FaxListProcessor) -> Self {
        let config = processor.config().clone();
        let state = SessionState {
            ledger: RwLock::new(ListLedger::from_config(&config)),
            ..SessionState::default()
        };
        Self {
            config,
            processor,
            state: Arc::new(state),
        }
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    pub fn registry(&self) -> &JobRegistry {
        self.processor.registry()
    }

    pub fn subscribe(&self) -> Subscription {
        self.registry().subscribe()
    }

    // ------------------------------------------------------------------------
    // Recipient lists
    // ------------------------------------------------------------------------

    /// Admit `file`, read its headers and pre-fill a mapping form.
    pub fn stage_recipient_list(&self, file: TabularFile) -> Result<StagedList> {
        validate_file(&file, self.config.max_file_size_bytes).inspect_err(log_rejection)?;
        self.check_recipient_file_name(file.file_name())
            .inspect_err(log_rejection)?;

        let source = self.read_source(file)?;
        let id = generate_id();
        let staged = StagedList {
            id: id.clone(),
            file_name: source.file.file_name().to_string(),
            headers: source.headers.clone(),
            estimated_records: source.estimated_records,
            form: MappingForm::seeded(source.headers.clone()),
        };
        info!(
            "Staged recipient list '{}' as {} (~{} records, auto-mapped: {})",
            staged.file_name,
            id,
            staged.estimated_records,
            staged.form.auto_mapped()
        );
        self.state.staged.lock().insert(id, source);
        Ok(staged)
    }

    /// Confirm `form` for a staged list and start materializing it.
    ///
    /// On success the list is added to the ledger (or replaces the list with
    /// the same id). On failure the ledger is untouched and the list stays
    /// staged, so it can be confirmed again. A list removed while its job
    /// runs is not added, and the job resolves to
    /// [`IngestError::ListNotFound`].
    pub fn confirm_recipient_list(
        &self,
        staged_id: &str,
        form: &MappingForm,
    ) -> Result<ListJob<ListInfo>> {
        let source = self
            .state
            .staged
            .lock()
            .get(staged_id)
            .cloned()
            .ok_or_else(|| IngestError::ListNotFound(staged_id.to_string()))?;
        let confirmed = form.confirm()?;

        let handle = self
            .processor
            .process_file(source.file.clone(), confirmed.mapping.clone())?;
        let job_id = handle.id().to_string();
        let list_id = staged_id.to_string();
        let state = Arc::clone(&self.state);

        let task_list_id = list_id.clone();
        let join = tokio::spawn(async move {
            let recipients = handle.wait().await?;
            let info = ListInfo {
                id: task_list_id.clone(),
                file_name: source.file.file_name().to_string(),
                recipient_count: recipients.len(),
                mapping: confirmed.mapping.clone(),
                has_international: confirmed.has_international,
            };

            let mut ledger = state.ledger.write();
            let mut staged = state.staged.lock();
            if !staged.contains_key(&task_list_id) {
                debug!("Recipient list {} was removed while processing", task_list_id);
                return Err(IngestError::ListNotFound(task_list_id));
            }
            ledger.accept_list(info.clone(), recipients)?;
            staged.remove(&task_list_id);
            state.accepted.lock().insert(
                task_list_id,
                AcceptedSource {
                    file: source.file,
                    headers: source.headers,
                    confirmed,
                },
            );
            Ok(info)
        });

        Ok(ListJob {
            job_id,
            list_id,
            join,
        })
    }

    /// Re-open an accepted list with its confirmed mapping.
    pub fn edit_recipient_list(&self, list_id: &str) -> Result<StagedList> {
        let accepted = self
            .state
            .accepted
            .lock()
            .get(list_id)
            .cloned()
            .ok_or_else(|| IngestError::ListNotFound(list_id.to_string()))?;
        let estimated_records = self
            .state
            .ledger
            .read()
            .get_list(list_id)
            .map(|info| info.recipient_count)
            .unwrap_or_default();

        let staged = StagedList {
            id: list_id.to_string(),
            file_name: accepted.file.file_name().to_string(),
            headers: accepted.headers.clone(),
            estimated_records,
            form: MappingForm::reopen(accepted.headers.clone(), &accepted.confirmed),
        };
        self.state.staged.lock().insert(
            list_id.to_string(),
            StagedSource {
                file: accepted.file,
                headers: accepted.headers,
                estimated_records,
            },
        );
        debug!("Re-opened recipient list {} for editing", list_id);
        Ok(staged)
    }

    /// Remove an accepted list, or drop a list that is still staged.
    pub fn remove_recipient_list(&self, list_id: &str) -> Result<()> {
        let was_staged = self.state.staged.lock().remove(list_id).is_some();
        self.state.accepted.lock().remove(list_id);
        match self.state.ledger.write().remove_list(list_id) {
            Ok(_) => Ok(()),
            Err(_) if was_staged => Ok(()),
            Err(e) => Err(e),
        }
    }

    // ------------------------------------------------------------------------
    // Block lists
    // ------------------------------------------------------------------------

    /// Admit a block list. When a header is clearly the fax column the list is
    /// processed immediately; otherwise a single-field form is returned.
    pub fn stage_block_list(&self, file: TabularFile) -> Result<BlockListStage> {
        validate_file(&file, self.config.max_file_size_bytes).inspect_err(log_rejection)?;
        self.check_block_file_name(file.file_name())
            .inspect_err(log_rejection)?;

        let source = self.read_source(file)?;
        let form = BlockListMappingForm::seeded(source.headers.clone());
        let id = generate_id();

        if let Some(fax_column) = form.fax_column() {
            info!(
                "Block list '{}' auto-mapped to column '{}'",
                source.file.file_name(),
                fax_column
            );
            let file = source.file.clone();
            let mapping = ColumnMapping::fax_only(fax_column);
            self.state.staged_blocks.lock().insert(id.clone(), source);
            return match self.start_block_job(id.clone(), file, mapping) {
                Ok(job) => Ok(BlockListStage::AutoMapped(job)),
                Err(e) => {
                    self.state.staged_blocks.lock().remove(&id);
                    Err(e)
                }
            };
        }

        let staged = StagedBlockList {
            id: id.clone(),
            file_name: source.file.file_name().to_string(),
            headers: source.headers.clone(),
            form,
        };
        info!("Block list '{}' needs a fax column", staged.file_name);
        self.state.staged_blocks.lock().insert(id, source);
        Ok(BlockListStage::NeedsMapping(staged))
    }

    pub fn confirm_block_list(
        &self,
        staged_id: &str,
        form: &BlockListMappingForm,
    ) -> Result<ListJob<BlockListInfo>> {
        let source = self
            .state
            .staged_blocks
            .lock()
            .get(staged_id)
            .cloned()
            .ok_or_else(|| IngestError::ListNotFound(staged_id.to_string()))?;
        let mapping = form.confirm()?;
        self.start_block_job(staged_id.to_string(), source.file, mapping)
    }

    pub fn remove_block_list(&self, id: &str) -> Result<()> {
        if self.state.staged_blocks.lock().remove(id).is_some() {
            return Ok(());
        }
        self.state.ledger.write().remove_block_list(id).map(|_| ())
    }

    fn start_block_job(
        &self,
        id: String,
        file: TabularFile,
        mapping: ColumnMapping,
    ) -> Result<ListJob<BlockListInfo>> {
        let handle = self.processor.process_file(file.clone(), mapping.clone())?;
        let job_id = handle.id().to_string();
        let state = Arc::clone(&self.state);
        let list_id = id.clone();

        let join = tokio::spawn(async move {
            let numbers: Vec<String> = handle
                .wait()
                .await?
                .into_iter()
                .map(|recipient| recipient.fax_number)
                .filter(|number| !number.is_empty())
                .collect();
            let info = BlockListInfo {
                id: id.clone(),
                file_name: file.file_name().to_string(),
                number_count: numbers.len(),
                mapping,
            };

            let mut ledger = state.ledger.write();
            let mut staged = state.staged_blocks.lock();
            if !staged.contains_key(&id) {
                debug!("Block list {} was removed while processing", id);
                return Err(IngestError::ListNotFound(id));
            }
            ledger.add_block_list(info.clone(), numbers)?;
            staged.remove(&id);
            Ok(info)
        });

        Ok(ListJob {
            job_id,
            list_id,
            join,
        })
    }

    // ------------------------------------------------------------------------
    // Ledger views
    // ------------------------------------------------------------------------

    pub fn summary(&self) -> LedgerSummary {
        self.state.ledger.read().summary()
    }

    pub fn lists(&self) -> Vec<ListInfo> {
        self.state.ledger.read().lists().cloned().collect()
    }

    pub fn block_lists(&self) -> Vec<BlockListInfo> {
        self.state.ledger.read().block_lists().cloned().collect()
    }

    pub fn recipients(&self) -> Vec<FaxRecipient> {
        self.state.ledger.read().recipients().cloned().collect()
    }

    pub fn blocked_numbers(&self) -> Vec<String> {
        self.state
            .ledger
            .read()
            .blocked_numbers()
            .map(str::to_string)
            .collect()
    }

    /// Run `f` against the ledger under its read lock.
    pub fn with_ledger<R>(&self, f: impl FnOnce(&ListLedger) -> R) -> R {
        f(&self.state.ledger.read())
    }

    /// Start over: forget staged and accepted lists. Jobs are left alone.
    pub fn reset(&self) {
        self.state.staged.lock().clear();
        self.state.staged_blocks.lock().clear();
        self.state.accepted.lock().clear();
        self.state.ledger.write().reset();
    }

    // ------------------------------------------------------------------------

    fn read_source(&self, file: TabularFile) -> Result<StagedSource> {
        let decoder = self.processor.decoder();
        let headers = decoder.extract_headers(&file)?;
        let estimated_records = decoder.estimate_record_count(&file).unwrap_or_else(|e| {
            warn!("Could not estimate records for '{}': {}", file.file_name(), e);
            0
        });
        Ok(StagedSource {
            file,
            headers,
            estimated_records,
        })
    }

    fn check_recipient_file_name(&self, file_name: &str) -> Result<()> {
        self.state
            .ledger
            .read()
            .check_recipient_file_name(file_name, None)?;
        self.check_staged_file_names(file_name)
    }

    fn check_block_file_name(&self, file_name: &str) -> Result<()> {
        self.state.ledger.read().check_block_file_name(file_name, None)?;
        self.check_staged_file_names(file_name)
    }

    /// Lists waiting for a mapping or still processing hold their names too.
    fn check_staged_file_names(&self, file_name: &str) -> Result<()> {
        let uses = |staged: &HashMap<String, StagedSource>| {
            staged.values().any(|s| s.file.file_name() == file_name)
        };
        let existing = if uses(&*self.state.staged.lock()) {
            ListKind::Recipient
        } else if uses(&*self.state.staged_blocks.lock()) {
            ListKind::Block
        } else {
            return Ok(());
        };
        Err(IngestError::DuplicateFilename {
            file_name: file_name.to_string(),
            existing,
        })
    }
}

fn log_rejection(err: &IngestError) {
    if err.is_warning() {
        warn!("Upload rejected: {}", err);
    }
}
