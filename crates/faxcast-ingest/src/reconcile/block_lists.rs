//! Uploaded block lists plus the two baseline block sources.

use crate::types::BlockListInfo;

#[derive(Debug, Clone)]
struct BlockEntry {
    info: BlockListInfo,
    numbers: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct BlockListLedger {
    toll_free_baseline: usize,
    stored_baseline: usize,
    /// Upload order.
    entries: Vec<BlockEntry>,
}

impl BlockListLedger {
    pub fn new(toll_free_baseline: usize, stored_baseline: usize) -> Self {
        Self {
            toll_free_baseline,
            stored_baseline,
            entries: Vec::new(),
        }
    }

    /// Insert or, for a known id, replace. `number_count` is taken from
    /// `numbers`. Filename checks are the caller's job.
    pub fn insert(&mut self, mut info: BlockListInfo, numbers: Vec<String>) {
        info.number_count = numbers.len();
        let entry = BlockEntry { info, numbers };
        match self.entries.iter().position(|e| e.info.id == entry.info.id) {
            Some(idx) => self.entries[idx] = entry,
            None => self.entries.push(entry),
        }
    }

    pub fn remove(&mut self, id: &str) -> Option<BlockListInfo> {
        let idx = self.entries.iter().position(|e| e.info.id == id)?;
        Some(self.entries.remove(idx).info)
    }

    pub fn get(&self, id: &str) -> Option<&BlockListInfo> {
        self.lists().find(|info| info.id == id)
    }

    pub fn find_by_file_name(&self, file_name: &str) -> Option<&BlockListInfo> {
        self.lists().find(|info| info.file_name == file_name)
    }

    pub fn lists(&self) -> impl Iterator<Item = &BlockListInfo> {
        self.entries.iter().map(|e| &e.info)
    }

    pub fn toll_free_baseline(&self) -> usize {
        self.toll_free_baseline
    }

    pub fn stored_baseline(&self) -> usize {
        self.stored_baseline
    }

    /// `toll_free + stored + sum of uploaded counts`.
    pub fn total_blocked(&self) -> usize {
        self.toll_free_baseline
            + self.stored_baseline
            + self.entries.iter().map(|e| e.info.number_count).sum::<usize>()
    }

    /// Numbers from uploaded block lists, in upload order.
    pub fn blocked_numbers(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .flat_map(|e| e.numbers.iter().map(String::as_str))
    }

    /// Drop uploads; baselines stay.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
