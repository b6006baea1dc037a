use super::types::{PlayableRecord, RecordEdit, RecordId};
use crate::{Result, WordcastError};
use parking_lot::RwLock;
use std::sync::Arc;

/// Owner of the word list. The player only requests mutations and re-reads.
pub trait VocabularyStore: Send + Sync {
    /// Records not yet marked learned, in list order
    fn active_records(&self) -> Vec<PlayableRecord>;

    fn mark_learned(&self, id: RecordId) -> Result<()>;

    fn edit_record(&self, id: RecordId, edit: RecordEdit) -> Result<()>;

    fn delete_record(&self, id: RecordId) -> Result<()>;
}

/// Active list snapshot, optionally capped to the first `max` entries
pub fn active_list(store: &dyn VocabularyStore, max: Option<usize>) -> Vec<PlayableRecord> {
    let mut records = store.active_records();
    if let Some(max) = max {
        records.truncate(max);
    }
    records
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryVocabulary {
    records: Arc<RwLock<Vec<PlayableRecord>>>,
}

impl InMemoryVocabulary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<PlayableRecord>) -> Self {
        Self {
            records: Arc::new(RwLock::new(records)),
        }
    }

    /// Load from a JSON array of records
    pub fn from_json_str(json: &str) -> Result<Self> {
        let records: Vec<PlayableRecord> = serde_json::from_str(json)?;
        Ok(Self::with_records(records))
    }

    pub fn add(&self, record: PlayableRecord) {
        self.records.write().push(record);
    }

    pub fn get_all(&self) -> Vec<PlayableRecord> {
        self.records.read().clone()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    fn with_record<F>(&self, id: RecordId, f: F) -> Result<()>
    where
        F: FnOnce(&mut PlayableRecord),
    {
        let mut records = self.records.write();
        let record = records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| WordcastError::Vocabulary(format!("No record with id {}", id)))?;
        f(record);
        Ok(())
    }
}

impl VocabularyStore for InMemoryVocabulary {
    fn active_records(&self) -> Vec<PlayableRecord> {
        self.records
            .read()
            .iter()
            .filter(|r| !r.learned)
            .cloned()
            .collect()
    }

    fn mark_learned(&self, id: RecordId) -> Result<()> {
        self.with_record(id, |r| r.learned = true)
    }

    fn edit_record(&self, id: RecordId, edit: RecordEdit) -> Result<()> {
        self.with_record(id, |r| edit.apply_to(r))
    }

    fn delete_record(&self, id: RecordId) -> Result<()> {
        let mut records = self.records.write();
        let before = records.len();
        records.retain(|r| r.id != id);
        if records.len() == before {
            return Err(WordcastError::Vocabulary(format!("No record with id {}", id)));
        }
        Ok(())
    }
}
