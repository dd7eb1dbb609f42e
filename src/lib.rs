//! Solace core: the AI companion side of a personal journaling app.
//!
//! Three services share one SQLite store and one completion gateway:
//!
//! - [`ConversationManager`] - chat with Sol about a single journal entry
//!   or about the journal as a whole, with bookmarking and migration when
//!   entries disappear.
//! - [`ReflectionOrchestrator`] - guided 10-question reflection interviews
//!   on a theme, closed out by a structured analysis.
//! - [`InsightStore`] - chat messages the user chose to keep.
//!
//! Journal entries themselves live outside this crate; operations that
//! need them take a snapshot of [`JournalEntry`] values.

pub mod conversation;
pub mod db;
pub mod gateway;
pub mod insights;
pub mod logging;
pub mod parser;
pub mod prompts;
pub mod reflection;

pub use conversation::{
    ChatError, Conversation, ConversationBinding, ConversationManager, JournalEntry, Message,
    Sender,
};
pub use db::{Store, StoreError};
pub use gateway::{CompletionGateway, GatewayConfig, GatewayError};
pub use insights::{InsightError, InsightPatch, InsightStore, SavedInsight};
pub use parser::{parse_analysis, Analysis};
pub use reflection::{
    theme_catalog, ReflectionError, ReflectionOrchestrator, ReflectionQuestion, ReflectionSession,
    ReflectionTheme, SessionStatus,
};

use std::path::Path;
use std::sync::Arc;

/// One user's Solace instance: shared store and gateway, plus constructors
/// for the three services.
pub struct Solace {
    store: Arc<Store>,
    gateway: CompletionGateway,
    user_id: String,
}

impl Solace {
    /// Open (or create) the database at `db_path` and set up logging.
    pub fn new(
        db_path: impl AsRef<Path>,
        config: GatewayConfig,
        user_id: impl Into<String>,
    ) -> Result<Self, StoreError> {
        if let Err(e) = logging::init_logging() {
            eprintln!("Failed to initialize logging: {}", e);
        }
        if let Err(e) = logging::cleanup_old_logs() {
            eprintln!("Failed to clean up old logs: {}", e);
        }

        let store = Arc::new(Store::open(db_path)?);
        Ok(Solace {
            store,
            gateway: CompletionGateway::new(config),
            user_id: user_id.into(),
        })
    }

    /// In-memory instance; nothing survives the process.
    pub fn in_memory(
        config: GatewayConfig,
        user_id: impl Into<String>,
    ) -> Result<Self, StoreError> {
        let store = Arc::new(Store::open_in_memory()?);
        Ok(Solace {
            store,
            gateway: CompletionGateway::new(config),
            user_id: user_id.into(),
        })
    }

    pub fn conversations(&self) -> ConversationManager {
        ConversationManager::new(self.store.clone(), self.gateway.clone(), self.user_id.clone())
    }

    pub fn reflections(&self) -> ReflectionOrchestrator {
        ReflectionOrchestrator::new(self.store.clone(), self.gateway.clone(), self.user_id.clone())
    }

    pub fn insights(&self) -> InsightStore {
        InsightStore::new(self.store.clone(), self.user_id.clone())
    }

    pub fn gateway(&self) -> &CompletionGateway {
        &self.gateway
    }

    pub fn store(&self) -> Arc<Store> {
        self.store.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_services_share_one_store() {
        let solace = Solace::in_memory(GatewayConfig::new("test-key"), "user-1").unwrap();

        let saved = solace
            .insights()
            .save(SavedInsight::from_message(&Message::ai("kept"), None, None))
            .unwrap();

        // A second handle sees the same data.
        let listed = solace.insights().list().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, saved.id);
    }
}
