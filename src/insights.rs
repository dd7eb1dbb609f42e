use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::conversation::{Message, Sender};
use crate::db::{Store, StoreError};
use crate::logging;

/// A chat message the user chose to keep, with enough context to show
/// where it came from.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SavedInsight {
    pub id: String,
    pub message: String,
    pub source: Sender,
    pub entry_id: Option<String>,
    pub entry_date: Option<String>,
    pub timestamp: String,
    pub tags: Option<Vec<String>>,
}

impl SavedInsight {
    /// Capture a chat message as a fresh insight. Saving the same message
    /// twice produces two insights with distinct ids.
    pub fn from_message(
        message: &Message,
        entry_id: Option<&str>,
        entry_date: Option<&str>,
    ) -> Self {
        SavedInsight {
            id: Uuid::new_v4().to_string(),
            message: message.text.clone(),
            source: message.sender,
            entry_id: entry_id.map(str::to_string),
            entry_date: entry_date.map(str::to_string),
            timestamp: Utc::now().to_rfc3339(),
            tags: None,
        }
    }
}

/// Editable fields of a saved insight; None leaves a field as it is.
#[derive(Debug, Deserialize, Default, Clone)]
pub struct InsightPatch {
    pub message: Option<String>,
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Error)]
pub enum InsightError {
    #[error("I couldn't find that saved insight.")]
    NotFound,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The user's collection of saved insights.
///
/// The whole collection is stored as one value, so every mutation is a
/// load, edit, save-in-full cycle.
pub struct InsightStore {
    store: Arc<Store>,
    user_id: String,
}

impl InsightStore {
    pub fn new(store: Arc<Store>, user_id: impl Into<String>) -> Self {
        InsightStore { store, user_id: user_id.into() }
    }

    /// Add an insight at the front of the collection (newest first).
    pub fn save(&self, insight: SavedInsight) -> Result<SavedInsight, InsightError> {
        let mut insights = self.store.load_insights(&self.user_id)?;
        insights.insert(0, insight.clone());
        self.store.save_insights(&self.user_id, &insights)?;
        logging::log_insight(Some(&self.user_id), &format!("Saved insight {}", insight.id));
        Ok(insight)
    }

    /// Remove an insight. Deleting an id that is already gone is a no-op.
    pub fn delete(&self, insight_id: &str) -> Result<(), InsightError> {
        let mut insights = self.store.load_insights(&self.user_id)?;
        let before = insights.len();
        insights.retain(|i| i.id != insight_id);
        if insights.len() == before {
            return Ok(());
        }

        self.store.save_insights(&self.user_id, &insights)?;
        logging::log_insight(Some(&self.user_id), &format!("Deleted insight {}", insight_id));
        Ok(())
    }

    pub fn update(&self, insight_id: &str, patch: InsightPatch) -> Result<SavedInsight, InsightError> {
        let mut insights = self.store.load_insights(&self.user_id)?;
        let insight = insights
            .iter_mut()
            .find(|i| i.id == insight_id)
            .ok_or(InsightError::NotFound)?;

        if let Some(message) = patch.message {
            insight.message = message;
        }
        if let Some(tags) = patch.tags {
            insight.tags = Some(tags);
        }
        let updated = insight.clone();

        self.store.save_insights(&self.user_id, &insights)?;
        logging::log_insight(Some(&self.user_id), &format!("Updated insight {}", insight_id));
        Ok(updated)
    }

    pub fn list(&self) -> Result<Vec<SavedInsight>, InsightError> {
        Ok(self.store.load_insights(&self.user_id)?)
    }
}
