pub mod store;
pub mod types;

pub use store::{active_list, InMemoryVocabulary, VocabularyStore};
pub use types::{PlayableRecord, RecordEdit, RecordId};
