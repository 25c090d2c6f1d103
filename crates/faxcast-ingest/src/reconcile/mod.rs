//! Reconciliation of recipient lists and block lists.
//!
//! The [`ListLedger`] owns every accepted list. It only changes in response
//! to a completed job, and it is where filename collisions between lists are
//! detected.

mod block_lists;
mod recipients;

pub use block_lists::BlockListLedger;
pub use recipients::RecipientLedger;

use crate::config::IngestConfig;
use crate::error::{IngestError, ListKind, Result};
use crate::types::{BlockListInfo, FaxRecipient, ListInfo};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Totals for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSummary {
    pub list_count: usize,
    pub total_recipients: usize,
    pub has_international: bool,
    pub block_list_count: usize,
    pub toll_free_blocked: usize,
    pub stored_blocked: usize,
    pub total_blocked: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ListLedger {
    recipients: RecipientLedger,
    blocks: BlockListLedger,
}

impl ListLedger {
    pub fn new(toll_free_baseline: usize, stored_baseline: usize) -> Self {
        Self {
            recipients: RecipientLedger::new(),
            blocks: BlockListLedger::new(toll_free_baseline, stored_baseline),
        }
    }

    pub fn from_config(config: &IngestConfig) -> Self {
        Self::new(config.toll_free_baseline, config.stored_baseline)
    }

    // ------------------------------------------------------------------------
    // Recipient side
    // ------------------------------------------------------------------------

    /// Fails with [`IngestError::DuplicateFilename`] when a block list, or a
    /// recipient list other than `replacing`, already uses `file_name`.
    pub fn check_recipient_file_name(&self, file_name: &str, replacing: Option<&str>) -> Result<()> {
        if let Some(existing) = self.recipients.find_by_file_name(file_name)
            && Some(existing.id.as_str()) != replacing
        {
            return Err(duplicate(file_name, ListKind::Recipient));
        }
        if self.blocks.find_by_file_name(file_name).is_some() {
            return Err(duplicate(file_name, ListKind::Block));
        }
        Ok(())
    }

    /// Accept a confirmed recipient list, replacing the list with the same id.
    /// A filename collision leaves the ledger untouched and is logged as a
    /// warning.
    pub fn accept_list(&mut self, info: ListInfo, recipients: Vec<FaxRecipient>) -> Result<()> {
        if let Err(e) = self.check_recipient_file_name(&info.file_name, Some(&info.id)) {
            warn!("Recipient list rejected: {}", e);
            return Err(e);
        }
        self.add_or_replace_list(info, recipients);
        Ok(())
    }

    pub fn add_or_replace_list(&mut self, info: ListInfo, recipients: Vec<FaxRecipient>) {
        let id = info.id.clone();
        let replaced = self.recipients.add_or_replace_list(info, recipients);
        info!(
            "{} recipient list {} ({} recipients in pool)",
            if replaced { "Replaced" } else { "Added" },
            id,
            self.recipients.total_recipients()
        );
    }

    pub fn remove_list(&mut self, id: &str) -> Result<ListInfo> {
        let removed = self
            .recipients
            .remove_list(id)
            .ok_or_else(|| IngestError::ListNotFound(id.to_string()))?;
        info!("Removed recipient list {} ('{}')", id, removed.file_name);
        Ok(removed)
    }

    pub fn get_list(&self, id: &str) -> Option<&ListInfo> {
        self.recipients.get_list(id)
    }

    pub fn lists(&self) -> impl Iterator<Item = &ListInfo> {
        self.recipients.lists()
    }

    pub fn recipients(&self) -> impl Iterator<Item = &FaxRecipient> {
        self.recipients.recipients()
    }

    pub fn recipients_of(&self, id: &str) -> Option<&[FaxRecipient]> {
        self.recipients.recipients_of(id)
    }

    pub fn total_recipients(&self) -> usize {
        self.recipients.total_recipients()
    }

    pub fn has_international(&self) -> bool {
        self.recipients.has_international()
    }

    // ------------------------------------------------------------------------
    // Block side
    // ------------------------------------------------------------------------

    /// Fails when `file_name` is used by a recipient list, or by a block list
    /// other than `replacing`.
    pub fn check_block_file_name(&self, file_name: &str, replacing: Option<&str>) -> Result<()> {
        if self.recipients.find_by_file_name(file_name).is_some() {
            return Err(duplicate(file_name, ListKind::Recipient));
        }
        if let Some(existing) = self.blocks.find_by_file_name(file_name)
            && Some(existing.id.as_str()) != replacing
        {
            return Err(duplicate(file_name, ListKind::Block));
        }
        Ok(())
    }

    /// Accept a block list. A filename collision leaves the ledger untouched
    /// and is logged as a warning.
    pub fn add_block_list(&mut self, info: BlockListInfo, numbers: Vec<String>) -> Result<()> {
        if let Err(e) = self.check_block_file_name(&info.file_name, Some(&info.id)) {
            warn!("Block list rejected: {}", e);
            return Err(e);
        }
        let id = info.id.clone();
        self.blocks.insert(info, numbers);
        info!(
            "Added block list {} (total blocked {})",
            id,
            self.blocks.total_blocked()
        );
        Ok(())
    }

    pub fn remove_block_list(&mut self, id: &str) -> Result<BlockListInfo> {
        let removed = self
            .blocks
            .remove(id)
            .ok_or_else(|| IngestError::ListNotFound(id.to_string()))?;
        info!(
            "Removed block list {} (total blocked {})",
            id,
            self.blocks.total_blocked()
        );
        Ok(removed)
    }

    pub fn get_block_list(&self, id: &str) -> Option<&BlockListInfo> {
        self.blocks.get(id)
    }

    pub fn block_lists(&self) -> impl Iterator<Item = &BlockListInfo> {
        self.blocks.lists()
    }

    pub fn total_blocked(&self) -> usize {
        self.blocks.total_blocked()
    }

    pub fn blocked_numbers(&self) -> impl Iterator<Item = &str> {
        self.blocks.blocked_numbers()
    }

    // ------------------------------------------------------------------------

    pub fn summary(&self) -> LedgerSummary {
        LedgerSummary {
            list_count: self.recipients.list_count(),
            total_recipients: self.recipients.total_recipients(),
            has_international: self.recipients.has_international(),
            block_list_count: self.blocks.lists().count(),
            toll_free_blocked: self.blocks.toll_free_baseline(),
            stored_blocked: self.blocks.stored_baseline(),
            total_blocked: self.blocks.total_blocked(),
        }
    }

    /// Forget every uploaded list. Baselines are kept.
    pub fn reset(&mut self) {
        self.recipients.clear();
        self.blocks.clear();
        info!("List ledger reset");
    }
}

fn duplicate(file_name: &str, existing: ListKind) -> IngestError {
    IngestError::DuplicateFilename {
        file_name: file_name.to_string(),
        existing,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ColumnMapping;
    use pretty_assertions::assert_eq;

    fn list(id: &str, file_name: &str) -> ListInfo {
        ListInfo {
            id: id.to_string(),
            file_name: file_name.to_string(),
            recipient_count: 0,
            mapping: ColumnMapping::fax_only("Fax"),
            has_international: false,
        }
    }

    fn block(id: &str, file_name: &str) -> BlockListInfo {
        BlockListInfo {
            id: id.to_string(),
            file_name: file_name.to_string(),
            number_count: 0,
            mapping: ColumnMapping::fax_only("Fax"),
        }
    }

    #[test]
    fn test_block_list_colliding_with_recipient_list() {
        let mut ledger = ListLedger::new(10, 20);
        ledger.add_or_replace_list(list("r1", "clinics.csv"), Vec::new());

        let err = ledger
            .add_block_list(block("b1", "clinics.csv"), vec!["1".to_string()])
            .unwrap_err();
        assert!(matches!(
            err,
            IngestError::DuplicateFilename { existing: ListKind::Recipient, .. }
        ));
        assert!(err.is_warning());
        assert_eq!(ledger.total_blocked(), 30);
    }

    #[test]
    fn test_block_list_colliding_with_block_list() {
        let mut ledger = ListLedger::new(0, 0);
        ledger
            .add_block_list(block("b1", "optout.csv"), vec!["1".to_string()])
            .unwrap();
        assert!(matches!(
            ledger.add_block_list(block("b2", "optout.csv"), vec!["2".to_string()]),
            Err(IngestError::DuplicateFilename { existing: ListKind::Block, .. })
        ));

        // Same id is a replacement, not a collision.
        ledger
            .add_block_list(block("b1", "optout.csv"), vec!["3".to_string(), "4".to_string()])
            .unwrap();
        assert_eq!(ledger.total_blocked(), 2);
    }

    #[test]
    fn test_remove_unknown_list() {
        let mut ledger = ListLedger::default();
        assert!(matches!(ledger.remove_list("nope"), Err(IngestError::ListNotFound(_))));
        assert!(matches!(
            ledger.remove_block_list("nope"),
            Err(IngestError::ListNotFound(_))
        ));
    }

    #[test]
    fn test_summary_and_reset() {
        let mut ledger = ListLedger::new(3, 4);
        ledger.add_or_replace_list(
            list("r1", "a.csv"),
            vec![FaxRecipient {
                fax_number: "1".to_string(),
                to_header: None,
            }],
        );
        ledger
            .add_block_list(block("b1", "b.csv"), vec!["9".to_string()])
            .unwrap();

        assert_eq!(
            ledger.summary(),
            LedgerSummary {
                list_count: 1,
                total_recipients: 1,
                has_international: false,
                block_list_count: 1,
                toll_free_blocked: 3,
                stored_blocked: 4,
                total_blocked: 8,
            }
        );

        ledger.reset();
        assert_eq!(ledger.summary().total_recipients, 0);
        assert_eq!(ledger.total_blocked(), 7);
        assert!(ledger.check_recipient_file_name("a.csv", None).is_ok());
    }

    #[test]
    fn test_recipient_list_colliding_with_block_list() {
        let mut ledger = ListLedger::new(0, 0);
        ledger
            .add_block_list(block("b1", "optout.csv"), vec!["1".to_string()])
            .unwrap();

        let err = ledger
            .accept_list(list("r1", "optout.csv"), Vec::new())
            .unwrap_err();
        assert!(matches!(
            err,
            IngestError::DuplicateFilename { existing: ListKind::Block, .. }
        ));
        assert_eq!(ledger.lists().count(), 0);

        ledger.accept_list(list("r1", "clinics.csv"), Vec::new()).unwrap();
        ledger.accept_list(list("r1", "clinics.csv"), Vec::new()).unwrap();
        assert!(matches!(
            ledger.accept_list(list("r2", "clinics.csv"), Vec::new()),
            Err(IngestError::DuplicateFilename { existing: ListKind::Recipient, .. })
        ));
        assert_eq!(ledger.lists().count(), 1);
    }
}
