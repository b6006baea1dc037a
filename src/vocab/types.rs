use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type RecordId = Uuid;

/// One vocabulary entry as narrated by the player
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayableRecord {
    #[serde(default = "Uuid::new_v4")]
    pub id: RecordId,
    pub foreign_text: String,
    pub translation_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tip_text: Option<String>,
    #[serde(default)]
    pub learned: bool,
}

impl PlayableRecord {
    pub fn new(foreign_text: impl Into<String>, translation_text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            foreign_text: foreign_text.into(),
            translation_text: translation_text.into(),
            tip_text: None,
            learned: false,
        }
    }

    pub fn with_tip(mut self, tip: impl Into<String>) -> Self {
        self.tip_text = Some(tip.into());
        self
    }

    /// Tip text if present and not blank
    pub fn tip(&self) -> Option<&str> {
        self.tip_text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

/// Replacement field values for an existing record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordEdit {
    pub foreign_text: String,
    pub translation_text: String,
    #[serde(default)]
    pub tip_text: Option<String>,
}

impl RecordEdit {
    pub fn apply_to(&self, record: &mut PlayableRecord) {
        record.foreign_text = self.foreign_text.clone();
        record.translation_text = self.translation_text.clone();
        record.tip_text = self.tip_text.clone();
    }
}

impl From<&PlayableRecord> for RecordEdit {
    fn from(record: &PlayableRecord) -> Self {
        Self {
            foreign_text: record.foreign_text.clone(),
            translation_text: record.translation_text.clone(),
            tip_text: record.tip_text.clone(),
        }
    }
}
