use chrono::Utc;
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::db::{Store, StoreError};
use crate::gateway::{CompletionGateway, RoleMessage};
use crate::logging;
use crate::prompts;

// How much history rides along on each completion request.
const HISTORY_LIMIT: usize = 30;
// Per-entry cap when condensing the journal into a prompt.
const SUMMARY_MAX_CHARS: usize = 300;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Ai,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Message {
    pub id: String,
    pub text: String,
    pub sender: Sender,
    pub timestamp: String,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Message::new(text, Sender::User)
    }

    pub fn ai(text: impl Into<String>) -> Self {
        Message::new(text, Sender::Ai)
    }

    fn new(text: impl Into<String>, sender: Sender) -> Self {
        Message {
            id: Uuid::new_v4().to_string(),
            text: text.into(),
            sender,
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

/// What a conversation is talking about: one journal entry, or the journal
/// as a whole.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "kind", content = "entry_id", rename_all = "snake_case")]
pub enum ConversationBinding {
    SingleEntry(String),
    AllEntries,
}

/// Message arrays as they appear in storage. Current rows hold the JSON
/// array directly; rows written by an earlier release hold a JSON string
/// containing the array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum StoredMessages {
    Native(Vec<Message>),
    Serialized(String),
}

impl StoredMessages {
    /// Decode a raw column value. Anything unreadable becomes an empty
    /// list rather than an error.
    pub fn decode(raw: &str) -> Vec<Message> {
        match serde_json::from_str::<StoredMessages>(raw) {
            Ok(stored) => stored.into_messages(),
            Err(e) => {
                logging::log_error(None, &format!("Unreadable stored messages, starting empty: {}", e));
                Vec::new()
            }
        }
    }

    pub fn into_messages(self) -> Vec<Message> {
        match self {
            StoredMessages::Native(messages) => messages,
            StoredMessages::Serialized(inner) => {
                serde_json::from_str(&inner).unwrap_or_else(|e| {
                    logging::log_error(None, &format!("Unreadable serialized messages, starting empty: {}", e));
                    Vec::new()
                })
            }
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Conversation {
    pub id: String,
    pub user_id: String,
    pub binding: ConversationBinding,
    pub messages: Vec<Message>,
    pub last_updated: String,
    pub is_bookmarked: bool,
    pub title: Option<String>,
}

impl Conversation {
    fn new(user_id: &str, binding: ConversationBinding) -> Self {
        Conversation {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            binding,
            messages: Vec::new(),
            last_updated: Utc::now().to_rfc3339(),
            is_bookmarked: false,
            title: None,
        }
    }
}

/// A journal entry as the caller sees it. Entries live outside this crate;
/// operations that need journal context take a snapshot of them.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JournalEntry {
    pub id: String,
    pub date: String,
    pub mood: Option<String>,
    pub content: String,
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("There's no active conversation yet. Open an entry or your journal to start chatting.")]
    NoActiveConversation,
    #[error("I couldn't find that conversation.")]
    ConversationNotFound,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Chat sessions between the user and Sol, bound to an entry or to the
/// whole journal.
///
/// One conversation is active at a time. Every operation takes the same
/// async lock, so overlapping sends queue up instead of interleaving their
/// reads and writes.
pub struct ConversationManager {
    store: Arc<Store>,
    gateway: CompletionGateway,
    user_id: String,
    active: Mutex<Option<Conversation>>,
}

impl ConversationManager {
    pub fn new(store: Arc<Store>, gateway: CompletionGateway, user_id: impl Into<String>) -> Self {
        ConversationManager {
            store,
            gateway,
            user_id: user_id.into(),
            active: Mutex::new(None),
        }
    }

    /// Open a conversation about one entry. If the active conversation is
    /// already bound to this entry it is kept and its persisted history
    /// reloaded; otherwise a fresh one starts (earlier chats about the same
    /// entry are not resumed).
    pub async fn select_entry(&self, entry: &JournalEntry) -> Result<Conversation, ChatError> {
        let mut active = self.active.lock().await;

        if let Some(conversation) = active.as_ref() {
            if matches!(&conversation.binding, ConversationBinding::SingleEntry(id) if id == &entry.id)
            {
                let reloaded = self
                    .store
                    .get_conversation(&conversation.id)?
                    .unwrap_or_else(|| conversation.clone());
                *active = Some(reloaded.clone());
                return Ok(reloaded);
            }
        }

        let conversation =
            Conversation::new(&self.user_id, ConversationBinding::SingleEntry(entry.id.clone()));
        self.store.upsert_conversation(&conversation)?;
        logging::log_conversation(
            Some(&conversation.id),
            &format!("Started conversation for entry {}", entry.id),
        );

        *active = Some(conversation.clone());
        Ok(conversation)
    }

    /// Open the journal-wide conversation: resume the most recently touched
    /// one, or create it (with a greeting from Sol) if none exists.
    pub async fn select_all_entries(&self) -> Result<Conversation, ChatError> {
        let mut active = self.active.lock().await;

        if let Some(conversation) = active.as_ref() {
            if matches!(conversation.binding, ConversationBinding::AllEntries) {
                return Ok(conversation.clone());
            }
        }

        if let Some(existing) = self.store.latest_all_entries_conversation(&self.user_id)? {
            logging::log_conversation(Some(&existing.id), "Resumed journal-wide conversation");
            *active = Some(existing.clone());
            return Ok(existing);
        }

        let mut conversation = Conversation::new(&self.user_id, ConversationBinding::AllEntries);
        let greeting = prompts::ALL_ENTRIES_GREETINGS
            .choose(&mut rand::rng())
            .copied()
            .unwrap_or(prompts::ALL_ENTRIES_GREETINGS[0]);
        conversation.messages.push(Message::ai(greeting));
        self.store.upsert_conversation(&conversation)?;
        logging::log_conversation(Some(&conversation.id), "Started journal-wide conversation");

        *active = Some(conversation.clone());
        Ok(conversation)
    }

    /// Send a user message and get Sol's reply.
    ///
    /// The user message is appended and persisted before the completion
    /// call, so it survives a gateway failure; the failure itself turns
    /// into a fixed apology message rather than an error. Blank input is
    /// ignored and returns None.
    pub async fn send_message(
        &self,
        text: &str,
        entries: &[JournalEntry],
    ) -> Result<Option<Message>, ChatError> {
        if text.trim().is_empty() {
            return Ok(None);
        }

        let mut active = self.active.lock().await;
        let conversation = active.as_mut().ok_or(ChatError::NoActiveConversation)?;

        conversation.messages.push(Message::user(text));
        if let Err(e) = self.store.replace_messages(&conversation.id, &conversation.messages) {
            logging::log_error(
                Some(&conversation.id),
                &format!("Failed to persist user message: {}", e),
            );
        }

        let mut request = vec![RoleMessage::system(self.system_prompt(conversation, entries))];
        for message in recent_history(&conversation.messages) {
            request.push(match message.sender {
                Sender::User => RoleMessage::user(message.text.clone()),
                Sender::Ai => RoleMessage::assistant(message.text.clone()),
            });
        }

        let ai_message = match self.gateway.complete(&request).await {
            Ok(reply) => Message::ai(reply),
            Err(e) => {
                logging::log_error(
                    Some(&conversation.id),
                    &format!("Completion failed, substituting apology: {}", e),
                );
                Message::ai(prompts::CHAT_APOLOGY)
            }
        };

        conversation.messages.push(ai_message.clone());
        conversation.last_updated = Utc::now().to_rfc3339();
        if let Err(e) = self.store.replace_messages(&conversation.id, &conversation.messages) {
            logging::log_error(
                Some(&conversation.id),
                &format!("Failed to persist AI message: {}", e),
            );
        }

        Ok(Some(ai_message))
    }

    /// Reset the active conversation to an empty history in memory. The
    /// persisted row keeps its messages until the next send replaces them.
    pub async fn clear_chat(&self) -> Result<Conversation, ChatError> {
        let mut active = self.active.lock().await;
        let conversation = active.as_mut().ok_or(ChatError::NoActiveConversation)?;

        conversation.messages.clear();
        logging::log_conversation(Some(&conversation.id), "Cleared chat history");

        Ok(conversation.clone())
    }

    /// Re-sync the active conversation with the journal after entries may
    /// have changed underneath it.
    ///
    /// If the bound entry still exists the conversation reloads from disk
    /// and Sol notes the reconnect. If the entry was deleted, the history
    /// migrates into a fresh journal-wide conversation and Sol explains
    /// the switch. Journal-wide conversations just reload.
    pub async fn refresh_conversation(
        &self,
        entries: &[JournalEntry],
    ) -> Result<Conversation, ChatError> {
        let mut active = self.active.lock().await;
        let conversation = active.as_mut().ok_or(ChatError::NoActiveConversation)?;

        match conversation.binding.clone() {
            ConversationBinding::AllEntries => {
                if let Some(reloaded) = self.store.get_conversation(&conversation.id)? {
                    *conversation = reloaded;
                }
                Ok(conversation.clone())
            }
            ConversationBinding::SingleEntry(entry_id) => {
                if entries.iter().any(|e| e.id == entry_id) {
                    if let Some(reloaded) = self.store.get_conversation(&conversation.id)? {
                        *conversation = reloaded;
                    }
                    conversation.messages.push(Message::ai(prompts::RECONNECT_NOTICE));
                    if let Err(e) =
                        self.store.replace_messages(&conversation.id, &conversation.messages)
                    {
                        logging::log_error(
                            Some(&conversation.id),
                            &format!("Failed to persist reconnect notice: {}", e),
                        );
                    }
                    logging::log_conversation(Some(&conversation.id), "Reconnected entry conversation");
                    Ok(conversation.clone())
                } else {
                    let mut migrated = Conversation::new(&self.user_id, ConversationBinding::AllEntries);
                    migrated.messages = conversation.messages.clone();
                    migrated.messages.push(Message::ai(prompts::MIGRATION_NOTICE));
                    if let Err(e) = self.store.upsert_conversation(&migrated) {
                        logging::log_error(
                            Some(&migrated.id),
                            &format!("Failed to persist migrated conversation: {}", e),
                        );
                    }
                    logging::log_conversation(
                        Some(&migrated.id),
                        &format!(
                            "Migrated conversation {} to journal-wide after entry {} was deleted",
                            conversation.id, entry_id
                        ),
                    );

                    *conversation = migrated;
                    Ok(conversation.clone())
                }
            }
        }
    }

    /// Set or clear the bookmark on a persisted conversation. The first
    /// bookmark stamps a human-readable title; later toggles keep it.
    pub async fn bookmark_conversation(
        &self,
        conversation_id: &str,
        bookmarked: bool,
    ) -> Result<Conversation, ChatError> {
        let mut active = self.active.lock().await;

        let mut target = match active.as_ref() {
            Some(c) if c.id == conversation_id => c.clone(),
            _ => self
                .store
                .get_conversation(conversation_id)?
                .ok_or(ChatError::ConversationNotFound)?,
        };

        target.is_bookmarked = bookmarked;
        if bookmarked && target.title.is_none() {
            target.title = Some(Utc::now().format("%B %d, %Y").to_string());
        }
        self.store
            .update_bookmark(conversation_id, bookmarked, target.title.as_deref())?;
        logging::log_conversation(
            Some(conversation_id),
            if bookmarked { "Bookmarked conversation" } else { "Removed bookmark" },
        );

        if let Some(c) = active.as_mut() {
            if c.id == conversation_id {
                c.is_bookmarked = target.is_bookmarked;
                c.title = target.title.clone();
            }
        }

        Ok(target)
    }

    pub async fn active_conversation(&self) -> Option<Conversation> {
        self.active.lock().await.clone()
    }

    pub fn list_bookmarked(&self) -> Result<Vec<Conversation>, ChatError> {
        Ok(self.store.list_bookmarked_conversations(&self.user_id)?)
    }

    fn system_prompt(&self, conversation: &Conversation, entries: &[JournalEntry]) -> String {
        match &conversation.binding {
            ConversationBinding::SingleEntry(entry_id) => {
                match entries.iter().find(|e| &e.id == entry_id) {
                    Some(entry) => prompts::chat_with_entry_system(
                        &entry.date,
                        entry.mood.as_deref(),
                        &entry.content,
                    ),
                    None => {
                        // Entry no longer in the snapshot; fall back to
                        // journal-wide context for this reply.
                        logging::log_conversation(
                            Some(&conversation.id),
                            &format!("Bound entry {} missing from snapshot, using journal-wide context", entry_id),
                        );
                        prompts::chat_with_all_entries_system(&summarize_entries(entries))
                    }
                }
            }
            ConversationBinding::AllEntries => {
                prompts::chat_with_all_entries_system(&summarize_entries(entries))
            }
        }
    }
}

fn recent_history(messages: &[Message]) -> &[Message] {
    let start = messages.len().saturating_sub(HISTORY_LIMIT);
    &messages[start..]
}

/// Condense entries into prompt context, newest first, one block per entry.
fn summarize_entries(entries: &[JournalEntry]) -> String {
    if entries.is_empty() {
        return "The journal has no entries yet.".to_string();
    }

    let mut sorted: Vec<&JournalEntry> = entries.iter().collect();
    sorted.sort_by(|a, b| b.date.cmp(&a.date));

    sorted
        .iter()
        .map(|entry| {
            let mood = entry
                .mood
                .as_deref()
                .map(|m| format!(" (mood: {})", m))
                .unwrap_or_default();
            format!(
                "[{}]{}\n{}",
                entry.date,
                mood,
                truncate_for_summary(&entry.content, SUMMARY_MAX_CHARS)
            )
        })
        .collect::<Vec<_>>()
        .join("\n---\n")
}

fn truncate_for_summary(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let truncated: String = text.chars().take(max_chars).collect();
    format!("{}...", truncated)
}
