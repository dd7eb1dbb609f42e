use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;

use crate::conversation::{Conversation, ConversationBinding, Message, StoredMessages};
use crate::insights::SavedInsight;
use crate::reflection::{ReflectionSession, SessionStatus};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("database lock poisoned")]
    Poisoned,
}

/// SQLite-backed persistence for conversations, reflection sessions, and
/// saved insights. All mutations are whole-value writes: message arrays and
/// insight collections are serialized to JSON and replaced in full.
pub struct Store {
    conn: Mutex<Connection>,
}

fn encode_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "[]".to_string())
}

fn row_to_conversation(row: &rusqlite::Row) -> rusqlite::Result<Conversation> {
    let entry_id: Option<String> = row.get(2)?;
    let is_all_entries: bool = row.get(3)?;
    let raw_messages: String = row.get(4)?;

    Ok(Conversation {
        id: row.get(0)?,
        user_id: row.get(1)?,
        binding: if is_all_entries {
            ConversationBinding::AllEntries
        } else {
            ConversationBinding::SingleEntry(entry_id.unwrap_or_default())
        },
        messages: StoredMessages::decode(&raw_messages),
        last_updated: row.get(5)?,
        is_bookmarked: row.get(6)?,
        title: row.get(7)?,
    })
}

fn row_to_session(row: &rusqlite::Row) -> rusqlite::Result<ReflectionSession> {
    let raw_questions: String = row.get(4)?;
    let status: String = row.get(6)?;
    let raw_analysis: Option<String> = row.get(9)?;

    Ok(ReflectionSession {
        id: row.get(0)?,
        user_id: row.get(1)?,
        theme_id: row.get(2)?,
        theme_name: row.get(3)?,
        questions: serde_json::from_str(&raw_questions).unwrap_or_default(),
        current_question_index: row.get(5)?,
        status: SessionStatus::parse(&status),
        started_at: row.get(7)?,
        completed_at: row.get(8)?,
        analysis: raw_analysis.and_then(|raw| serde_json::from_str(&raw).ok()),
    })
}

impl Store {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;
        Ok(Store { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Store { conn: Mutex::new(conn) })
    }

    fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS conversations (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                entry_id TEXT,
                is_all_entries INTEGER NOT NULL DEFAULT 0,
                messages TEXT NOT NULL DEFAULT '[]',
                last_updated TEXT NOT NULL,
                is_bookmarked INTEGER NOT NULL DEFAULT 0,
                title TEXT
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS reflection_sessions (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                theme_id TEXT NOT NULL,
                theme_name TEXT NOT NULL,
                questions TEXT NOT NULL DEFAULT '[]',
                current_question_index INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL DEFAULT 'in_progress',
                started_at TEXT NOT NULL,
                completed_at TEXT,
                analysis TEXT
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS saved_insights (
                user_id TEXT PRIMARY KEY,
                insights TEXT NOT NULL DEFAULT '[]'
            )",
            [],
        )?;

        Ok(())
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> Result<T, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        f(&conn).map_err(StoreError::from)
    }

    // ============ Conversations ============

    pub fn upsert_conversation(&self, conversation: &Conversation) -> Result<(), StoreError> {
        let (entry_id, is_all_entries) = match &conversation.binding {
            ConversationBinding::SingleEntry(entry_id) => (Some(entry_id.as_str()), false),
            ConversationBinding::AllEntries => (None, true),
        };

        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO conversations
                 (id, user_id, entry_id, is_all_entries, messages, last_updated, is_bookmarked, title)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    conversation.id,
                    conversation.user_id,
                    entry_id,
                    is_all_entries,
                    encode_json(&conversation.messages),
                    conversation.last_updated,
                    conversation.is_bookmarked,
                    conversation.title,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_conversation(&self, conversation_id: &str) -> Result<Option<Conversation>, StoreError> {
        self.with_conn(|conn| {
            let result = conn.query_row(
                "SELECT id, user_id, entry_id, is_all_entries, messages, last_updated, is_bookmarked, title
                 FROM conversations WHERE id = ?1",
                params![conversation_id],
                row_to_conversation,
            );

            match result {
                Ok(conversation) => Ok(Some(conversation)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
    }

    /// Most recently touched journal-wide conversation for this user, if any.
    pub fn latest_all_entries_conversation(
        &self,
        user_id: &str,
    ) -> Result<Option<Conversation>, StoreError> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, user_id, entry_id, is_all_entries, messages, last_updated, is_bookmarked, title
                 FROM conversations
                 WHERE user_id = ?1 AND is_all_entries = 1
                 ORDER BY last_updated DESC LIMIT 1",
                params![user_id],
                row_to_conversation,
            )
            .optional()
        })
    }

    /// Replace the full message array and touch last_updated.
    pub fn replace_messages(
        &self,
        conversation_id: &str,
        messages: &[Message],
    ) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE conversations SET messages = ?1, last_updated = ?2 WHERE id = ?3",
                params![encode_json(messages), Utc::now().to_rfc3339(), conversation_id],
            )?;
            Ok(())
        })
    }

    /// Set the bookmark flag. A title passed here is written; None keeps
    /// whatever title the row already has.
    pub fn update_bookmark(
        &self,
        conversation_id: &str,
        is_bookmarked: bool,
        title: Option<&str>,
    ) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE conversations
                 SET is_bookmarked = ?1, title = COALESCE(?2, title)
                 WHERE id = ?3",
                params![is_bookmarked, title, conversation_id],
            )?;
            Ok(())
        })
    }

    pub fn list_bookmarked_conversations(
        &self,
        user_id: &str,
    ) -> Result<Vec<Conversation>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, entry_id, is_all_entries, messages, last_updated, is_bookmarked, title
                 FROM conversations
                 WHERE user_id = ?1 AND is_bookmarked = 1
                 ORDER BY last_updated DESC",
            )?;

            let conversations = stmt
                .query_map(params![user_id], row_to_conversation)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(conversations)
        })
    }

    // ============ Reflection Sessions ============

    pub fn upsert_reflection_session(&self, session: &ReflectionSession) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO reflection_sessions
                 (id, user_id, theme_id, theme_name, questions, current_question_index, status, started_at, completed_at, analysis)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    session.id,
                    session.user_id,
                    session.theme_id,
                    session.theme_name,
                    encode_json(&session.questions),
                    session.current_question_index,
                    session.status.as_str(),
                    session.started_at,
                    session.completed_at,
                    session.analysis.as_ref().map(|a| encode_json(a)),
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_reflection_session(
        &self,
        session_id: &str,
    ) -> Result<Option<ReflectionSession>, StoreError> {
        self.with_conn(|conn| {
            let result = conn.query_row(
                "SELECT id, user_id, theme_id, theme_name, questions, current_question_index, status, started_at, completed_at, analysis
                 FROM reflection_sessions WHERE id = ?1",
                params![session_id],
                row_to_session,
            );

            match result {
                Ok(session) => Ok(Some(session)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
    }

    pub fn list_reflection_sessions(
        &self,
        user_id: &str,
    ) -> Result<Vec<ReflectionSession>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, theme_id, theme_name, questions, current_question_index, status, started_at, completed_at, analysis
                 FROM reflection_sessions
                 WHERE user_id = ?1
                 ORDER BY started_at DESC",
            )?;

            let sessions = stmt
                .query_map(params![user_id], row_to_session)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(sessions)
        })
    }

    // ============ Saved Insights ============

    pub fn load_insights(&self, user_id: &str) -> Result<Vec<SavedInsight>, StoreError> {
        self.with_conn(|conn| {
            let raw: Option<String> = conn
                .query_row(
                    "SELECT insights FROM saved_insights WHERE user_id = ?1",
                    params![user_id],
                    |row| row.get(0),
                )
                .optional()?;

            Ok(raw
                .map(|raw| serde_json::from_str(&raw).unwrap_or_default())
                .unwrap_or_default())
        })
    }

    pub fn save_insights(&self, user_id: &str, insights: &[SavedInsight]) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO saved_insights (user_id, insights) VALUES (?1, ?2)",
                params![user_id, encode_json(insights)],
            )?;
            Ok(())
        })
    }

    /// Run raw SQL against the store, for tests that need to shape or break
    /// the underlying tables.
    #[cfg(test)]
    pub(crate) fn execute_raw(&self, sql: &str) -> Result<usize, StoreError> {
        self.with_conn(|conn| conn.execute(sql, []))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::Sender;
    use crate::reflection::ReflectionQuestion;

    fn sample_conversation(id: &str, binding: ConversationBinding) -> Conversation {
        Conversation {
            id: id.to_string(),
            user_id: "user-1".to_string(),
            binding,
            messages: Vec::new(),
            last_updated: Utc::now().to_rfc3339(),
            is_bookmarked: false,
            title: None,
        }
    }

    fn sample_message(text: &str, sender: Sender) -> Message {
        Message {
            id: format!("msg-{}", text.len()),
            text: text.to_string(),
            sender,
            timestamp: "2026-03-14T09:00:00Z".to_string(),
        }
    }

    #[test]
    fn test_conversation_roundtrip() {
        let store = Store::open_in_memory().unwrap();

        let mut conversation =
            sample_conversation("conv-1", ConversationBinding::SingleEntry("entry-9".into()));
        conversation.messages = vec![
            sample_message("hello", Sender::User),
            sample_message("hi there", Sender::Ai),
        ];
        store.upsert_conversation(&conversation).unwrap();

        let loaded = store.get_conversation("conv-1").unwrap().unwrap();
        assert_eq!(loaded.id, "conv-1");
        assert_eq!(loaded.user_id, "user-1");
        assert!(matches!(loaded.binding, ConversationBinding::SingleEntry(ref e) if e == "entry-9"));
        assert_eq!(loaded.messages.len(), 2);
        assert_eq!(loaded.messages[0].text, "hello");
        assert_eq!(loaded.messages[1].text, "hi there");
        assert!(!loaded.is_bookmarked);
    }

    #[test]
    fn test_get_conversation_missing_is_none() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.get_conversation("nope").unwrap().is_none());
    }

    #[test]
    fn test_latest_all_entries_picks_most_recent() {
        let store = Store::open_in_memory().unwrap();

        let mut older = sample_conversation("conv-old", ConversationBinding::AllEntries);
        older.last_updated = "2026-01-01T00:00:00Z".to_string();
        let mut newer = sample_conversation("conv-new", ConversationBinding::AllEntries);
        newer.last_updated = "2026-02-01T00:00:00Z".to_string();
        let mut bound = sample_conversation("conv-entry", ConversationBinding::SingleEntry("e".into()));
        bound.last_updated = "2026-03-01T00:00:00Z".to_string();

        store.upsert_conversation(&older).unwrap();
        store.upsert_conversation(&newer).unwrap();
        store.upsert_conversation(&bound).unwrap();

        let latest = store.latest_all_entries_conversation("user-1").unwrap().unwrap();
        assert_eq!(latest.id, "conv-new");
        assert!(matches!(latest.binding, ConversationBinding::AllEntries));
    }

    #[test]
    fn test_replace_messages_touches_last_updated() {
        let store = Store::open_in_memory().unwrap();

        let mut conversation = sample_conversation("conv-1", ConversationBinding::AllEntries);
        conversation.last_updated = "2020-01-01T00:00:00Z".to_string();
        store.upsert_conversation(&conversation).unwrap();

        store
            .replace_messages("conv-1", &[sample_message("first", Sender::User)])
            .unwrap();

        let loaded = store.get_conversation("conv-1").unwrap().unwrap();
        assert_eq!(loaded.messages.len(), 1);
        assert_ne!(loaded.last_updated, "2020-01-01T00:00:00Z");
    }

    #[test]
    fn test_double_encoded_messages_still_decode() {
        let store = Store::open_in_memory().unwrap();
        store
            .upsert_conversation(&sample_conversation("conv-1", ConversationBinding::AllEntries))
            .unwrap();

        // Rows written by an earlier release hold a JSON *string* containing
        // the array, not the array itself.
        let inner = serde_json::to_string(&vec![sample_message("legacy", Sender::Ai)]).unwrap();
        let double = serde_json::to_string(&inner).unwrap();
        store
            .conn
            .lock()
            .unwrap()
            .execute(
                "UPDATE conversations SET messages = ?1 WHERE id = ?2",
                params![double, "conv-1"],
            )
            .unwrap();

        let loaded = store.get_conversation("conv-1").unwrap().unwrap();
        assert_eq!(loaded.messages.len(), 1);
        assert_eq!(loaded.messages[0].text, "legacy");
    }

    #[test]
    fn test_corrupt_messages_decode_to_empty() {
        let store = Store::open_in_memory().unwrap();
        store
            .upsert_conversation(&sample_conversation("conv-1", ConversationBinding::AllEntries))
            .unwrap();

        store
            .conn
            .lock()
            .unwrap()
            .execute(
                "UPDATE conversations SET messages = 'not json at all' WHERE id = ?1",
                params!["conv-1"],
            )
            .unwrap();

        let loaded = store.get_conversation("conv-1").unwrap().unwrap();
        assert!(loaded.messages.is_empty());
    }

    #[test]
    fn test_bookmark_update_keeps_title_when_none() {
        let store = Store::open_in_memory().unwrap();
        store
            .upsert_conversation(&sample_conversation("conv-1", ConversationBinding::AllEntries))
            .unwrap();

        store.update_bookmark("conv-1", true, Some("March 14, 2026")).unwrap();
        store.update_bookmark("conv-1", false, None).unwrap();

        let loaded = store.get_conversation("conv-1").unwrap().unwrap();
        assert!(!loaded.is_bookmarked);
        assert_eq!(loaded.title.as_deref(), Some("March 14, 2026"));

        let bookmarked = store.list_bookmarked_conversations("user-1").unwrap();
        assert!(bookmarked.is_empty());
    }

    #[test]
    fn test_list_bookmarked_conversations() {
        let store = Store::open_in_memory().unwrap();

        for id in ["conv-a", "conv-b", "conv-c"] {
            store
                .upsert_conversation(&sample_conversation(id, ConversationBinding::AllEntries))
                .unwrap();
        }
        store.update_bookmark("conv-a", true, Some("First")).unwrap();
        store.update_bookmark("conv-c", true, Some("Second")).unwrap();

        let bookmarked = store.list_bookmarked_conversations("user-1").unwrap();
        assert_eq!(bookmarked.len(), 2);
        assert!(bookmarked.iter().all(|c| c.is_bookmarked));
    }

    #[test]
    fn test_reflection_session_roundtrip() {
        let store = Store::open_in_memory().unwrap();

        let session = ReflectionSession {
            id: "sess-1".to_string(),
            user_id: "user-1".to_string(),
            theme_id: "gratitude".to_string(),
            theme_name: "Gratitude".to_string(),
            questions: vec![ReflectionQuestion {
                id: "q-1".to_string(),
                question: "What made you smile today?".to_string(),
                theme_id: "gratitude".to_string(),
                order: 1,
                created_at: "2026-03-14T09:00:00Z".to_string(),
                answer: Some("Coffee with a friend.".to_string()),
            }],
            current_question_index: 0,
            status: SessionStatus::InProgress,
            started_at: "2026-03-14T09:00:00Z".to_string(),
            completed_at: None,
            analysis: None,
        };
        store.upsert_reflection_session(&session).unwrap();

        let loaded = store.get_reflection_session("sess-1").unwrap().unwrap();
        assert_eq!(loaded.theme_name, "Gratitude");
        assert_eq!(loaded.questions.len(), 1);
        assert_eq!(loaded.questions[0].order, 1);
        assert_eq!(loaded.questions[0].answer.as_deref(), Some("Coffee with a friend."));
        assert!(matches!(loaded.status, SessionStatus::InProgress));
        assert!(loaded.analysis.is_none());
    }

    #[test]
    fn test_completed_session_persists_analysis() {
        let store = Store::open_in_memory().unwrap();

        let session = ReflectionSession {
            id: "sess-2".to_string(),
            user_id: "user-1".to_string(),
            theme_id: "growth".to_string(),
            theme_name: "Growth".to_string(),
            questions: Vec::new(),
            current_question_index: 9,
            status: SessionStatus::Completed,
            started_at: "2026-03-14T09:00:00Z".to_string(),
            completed_at: Some("2026-03-14T09:40:00Z".to_string()),
            analysis: Some(crate::parser::Analysis::default()),
        };
        store.upsert_reflection_session(&session).unwrap();

        let loaded = store.get_reflection_session("sess-2").unwrap().unwrap();
        assert!(matches!(loaded.status, SessionStatus::Completed));
        assert!(loaded.completed_at.is_some());
        let analysis = loaded.analysis.unwrap();
        assert!(!analysis.encouragement.is_empty());
    }

    #[test]
    fn test_list_reflection_sessions_newest_first() {
        let store = Store::open_in_memory().unwrap();

        for (id, started_at) in [("sess-old", "2026-01-01T00:00:00Z"), ("sess-new", "2026-02-01T00:00:00Z")] {
            let session = ReflectionSession {
                id: id.to_string(),
                user_id: "user-1".to_string(),
                theme_id: "gratitude".to_string(),
                theme_name: "Gratitude".to_string(),
                questions: Vec::new(),
                current_question_index: 0,
                status: SessionStatus::InProgress,
                started_at: started_at.to_string(),
                completed_at: None,
                analysis: None,
            };
            store.upsert_reflection_session(&session).unwrap();
        }

        let sessions = store.list_reflection_sessions("user-1").unwrap();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].id, "sess-new");
    }

    #[test]
    fn test_insights_roundtrip_and_default_empty() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.load_insights("user-1").unwrap().is_empty());

        let insight = SavedInsight {
            id: "ins-1".to_string(),
            message: "You write more on hard days.".to_string(),
            source: Sender::Ai,
            entry_id: Some("entry-3".to_string()),
            entry_date: Some("2026-03-10".to_string()),
            timestamp: "2026-03-14T09:00:00Z".to_string(),
            tags: Some(vec!["patterns".to_string()]),
        };
        store.save_insights("user-1", &[insight]).unwrap();

        let loaded = store.load_insights("user-1").unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].message, "You write more on hard days.");
        assert_eq!(loaded[0].tags.as_deref(), Some(&["patterns".to_string()][..]));
    }
}
