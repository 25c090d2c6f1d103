//! Accepted recipient lists and their recipients, keyed by list id.

use crate::types::{FaxRecipient, ListInfo};
use std::collections::HashMap;

#[derive(Debug, Clone)]
struct ListEntry {
    info: ListInfo,
    recipients: Vec<FaxRecipient>,
}

/// Arena of recipient lists. The recipient pool is always derived from the
/// arena, so replacing or removing a list can never leave stale recipients.
#[derive(Debug, Clone, Default)]
pub struct RecipientLedger {
    entries: HashMap<String, ListEntry>,
    /// Insertion order of list ids.
    order: Vec<String>,
}

impl RecipientLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a list, or replace the list with the same id in place.
    ///
    /// `recipient_count` is taken from `recipients`. Returns `true` when an
    /// existing list was replaced.
    pub fn add_or_replace_list(&mut self, mut info: ListInfo, recipients: Vec<FaxRecipient>) -> bool {
        info.recipient_count = recipients.len();
        let id = info.id.clone();
        let replaced = self
            .entries
            .insert(id.clone(), ListEntry { info, recipients })
            .is_some();
        if !replaced {
            self.order.push(id);
        }
        replaced
    }

    pub fn remove_list(&mut self, id: &str) -> Option<ListInfo> {
        let entry = self.entries.remove(id)?;
        self.order.retain(|existing| existing != id);
        Some(entry.info)
    }

    pub fn get_list(&self, id: &str) -> Option<&ListInfo> {
        self.entries.get(id).map(|entry| &entry.info)
    }

    pub fn find_by_file_name(&self, file_name: &str) -> Option<&ListInfo> {
        self.lists().find(|info| info.file_name == file_name)
    }

    /// Lists in insertion order.
    pub fn lists(&self) -> impl Iterator<Item = &ListInfo> {
        self.order
            .iter()
            .filter_map(|id| self.entries.get(id))
            .map(|entry| &entry.info)
    }

    pub fn list_count(&self) -> usize {
        self.order.len()
    }

    /// The aggregate pool, list by list. Numbers are not de-duplicated.
    pub fn recipients(&self) -> impl Iterator<Item = &FaxRecipient> {
        self.order
            .iter()
            .filter_map(|id| self.entries.get(id))
            .flat_map(|entry| entry.recipients.iter())
    }

    pub fn recipients_of(&self, id: &str) -> Option<&[FaxRecipient]> {
        self.entries.get(id).map(|entry| entry.recipients.as_slice())
    }

    pub fn total_recipients(&self) -> usize {
        self.entries.values().map(|entry| entry.recipients.len()).sum()
    }

    /// True when any accepted list was flagged as containing international
    /// numbers.
    pub fn has_international(&self) -> bool {
        self.entries.values().any(|entry| entry.info.has_international)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}
