use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::storage::{CHATS_KEY, Storage};

pub const DEFAULT_TITLE: &str = "New Chat";
const TITLE_MAX_CHARS: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    pub id: String,
    pub title: String,
    pub messages: Vec<Message>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

/// Derive a chat title from the first user message: the first 30
/// characters, with an ellipsis when truncated.
pub fn derive_title(text: &str) -> String {
    if text.chars().count() > TITLE_MAX_CHARS {
        let head: String = text.chars().take(TITLE_MAX_CHARS).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

/// Owns the list of chats and the currently active chat id.
///
/// The active chat's messages are mirrored into a transient `current`
/// view used for rendering and streaming. The mirror is reconciled with
/// the canonical record whenever a message is appended or a stream
/// commits. The full chat list is persisted under one storage key every
/// time it changes; a malformed persisted list loads as empty.
pub struct ChatStore {
    chats: Vec<Chat>,
    active_id: Option<String>,
    current: Vec<Message>,
    last_issued_id: i64,
    storage: Storage,
}

impl ChatStore {
    pub fn load(storage: Storage) -> Self {
        let chats = match storage.get(CHATS_KEY) {
            Some(raw) => match serde_json::from_str(&raw) {
                Ok(chats) => chats,
                Err(e) => {
                    warn!("discarding malformed chat list: {}", e);
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        Self {
            chats,
            active_id: None,
            current: Vec::new(),
            last_issued_id: 0,
            storage,
        }
    }

    pub fn chats(&self) -> &[Chat] {
        &self.chats
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active_id.as_deref()
    }

    pub fn active_chat(&self) -> Option<&Chat> {
        let id = self.active_id.as_deref()?;
        self.chats.iter().find(|c| c.id == id)
    }

    /// The transient message view for the active chat, including any
    /// in-flight assistant message.
    pub fn current_messages(&self) -> &[Message] {
        &self.current
    }

    /// Ids derive from wall-clock milliseconds. Two sends inside the
    /// same millisecond would collide, so an id never repeats the
    /// previously issued one.
    pub fn next_id(&mut self) -> String {
        let mut id = Utc::now().timestamp_millis();
        if id <= self.last_issued_id {
            id = self.last_issued_id + 1;
        }
        self.last_issued_id = id;
        id.to_string()
    }

    /// Creates an empty chat, prepends it (most-recent-first), makes it
    /// active and clears the current view. Returns the new chat id.
    pub fn create_chat(&mut self) -> String {
        let id = self.next_id();
        self.chats.insert(
            0,
            Chat {
                id: id.clone(),
                title: DEFAULT_TITLE.to_string(),
                messages: Vec::new(),
                created_at: Utc::now(),
            },
        );
        self.active_id = Some(id.clone());
        self.current.clear();
        self.persist();
        id
    }

    /// Makes `id` the active chat and replaces the current view with a
    /// copy of its messages. Returns false when no chat matches.
    pub fn select_chat(&mut self, id: &str) -> bool {
        match self.chats.iter().find(|c| c.id == id) {
            Some(chat) => {
                self.current = chat.messages.clone();
                self.active_id = Some(id.to_string());
                true
            }
            None => false,
        }
    }

    /// Removes the chat. If it was active, the selection and the
    /// current view are cleared as well.
    pub fn delete_chat(&mut self, id: &str) {
        self.chats.retain(|c| c.id != id);
        if self.active_id.as_deref() == Some(id) {
            self.active_id = None;
            self.current.clear();
        }
        self.persist();
    }

    /// Empties the current view and, if a chat is active, its canonical
    /// message list. Confirmation happens at the UI boundary.
    pub fn clear_active_chat(&mut self) {
        self.current.clear();
        if let Some(id) = self.active_id.clone() {
            if let Some(chat) = self.chat_mut(&id) {
                chat.messages.clear();
            }
            self.persist();
        }
    }

    /// Appends to the canonical chat record and, when the chat is
    /// active, to the current view. A user message landing in an empty
    /// chat sets the title.
    pub fn append_message(&mut self, chat_id: &str, message: Message) {
        let active = self.active_id.as_deref() == Some(chat_id);
        if let Some(chat) = self.chat_mut(chat_id) {
            if chat.messages.is_empty() && message.role == Role::User {
                chat.title = derive_title(&message.content);
            }
            chat.messages.push(message.clone());
            if active {
                self.current.push(message);
            }
            self.persist();
        }
    }

    /// Pushes the in-flight assistant placeholder into the current
    /// view. The placeholder lives only in the view until the stream
    /// commits.
    pub fn begin_stream(&mut self, message: Message) {
        self.current.push(message);
    }

    /// Replaces the in-flight message's visible content with the
    /// accumulated text. Only renders into the view when the
    /// originating chat is still active; re-adds the placeholder if the
    /// user switched away and back mid-stream.
    pub fn update_stream(&mut self, chat_id: &str, message_id: &str, content: &str) {
        if self.active_id.as_deref() != Some(chat_id) {
            return;
        }
        match self.current.last_mut() {
            Some(last) if last.id == message_id => {
                last.content = content.to_string();
            }
            _ => self.current.push(Message {
                id: message_id.to_string(),
                role: Role::Assistant,
                content: content.to_string(),
            }),
        }
    }

    /// Commits the finished assistant message into the originating chat
    /// record. Returns false (discarding the result) when that chat no
    /// longer exists. The view is reconciled when the chat is active.
    pub fn commit_stream(&mut self, chat_id: &str, message: Message) -> bool {
        let active = self.active_id.as_deref() == Some(chat_id);
        let Some(chat) = self.chat_mut(chat_id) else {
            return false;
        };
        chat.messages.push(message.clone());
        if active {
            match self.current.last_mut() {
                Some(last) if last.id == message.id => *last = message,
                _ => self.current.push(message),
            }
        }
        self.persist();
        true
    }

    /// Shows a synthetic assistant message in place of the in-flight
    /// one. Transport errors are displayed, not persisted, so they do
    /// not survive reloading the chat.
    pub fn fail_stream(&mut self, chat_id: &str, message_id: &str, error_text: &str) {
        self.update_stream(chat_id, message_id, error_text);
    }

    fn chat_mut(&mut self, id: &str) -> Option<&mut Chat> {
        self.chats.iter_mut().find(|c| c.id == id)
    }

    fn persist(&self) {
        let serialized = match serde_json::to_string(&self.chats) {
            Ok(s) => s,
            Err(e) => {
                warn!("failed to serialize chat list: {}", e);
                return;
            }
        };
        if let Err(e) = self.storage.set(CHATS_KEY, &serialized) {
            warn!("failed to persist chat list: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, ChatStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ChatStore::load(Storage::with_root(dir.path().to_path_buf()));
        (dir, store)
    }

    fn user_message(store: &mut ChatStore, content: &str) -> Message {
        Message {
            id: store.next_id(),
            role: Role::User,
            content: content.to_string(),
        }
    }

    #[test]
    fn create_chat_prepends_and_activates() {
        let (_dir, mut store) = store();
        let first = store.create_chat();
        let second = store.create_chat();
        assert_eq!(store.chats()[0].id, second);
        assert_eq!(store.chats()[1].id, first);
        assert_eq!(store.active_id(), Some(second.as_str()));
        assert!(store.current_messages().is_empty());
    }

    #[test]
    fn ids_are_unique_under_rapid_issue() {
        let (_dir, mut store) = store();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..100 {
            assert!(seen.insert(store.next_id()));
        }
    }

    #[test]
    fn select_chat_copies_messages_and_rejects_unknown_id() {
        let (_dir, mut store) = store();
        let id = store.create_chat();
        let msg = user_message(&mut store, "hello");
        store.append_message(&id, msg.clone());
        store.create_chat();

        assert!(store.select_chat(&id));
        assert_eq!(store.current_messages(), &[msg]);

        assert!(!store.select_chat("no-such-chat"));
        assert_eq!(store.active_id(), Some(id.as_str()));
    }

    #[test]
    fn first_user_message_sets_title() {
        let (_dir, mut store) = store();
        let id = store.create_chat();
        let msg = user_message(&mut store, "What is the capital of Assyria?");
        store.append_message(&id, msg);
        // 31 chars, so truncated to 30 plus ellipsis.
        assert_eq!(store.chats()[0].title, "What is the capital of Assyria...");
    }

    #[test]
    fn short_first_message_becomes_title_verbatim() {
        let (_dir, mut store) = store();
        let id = store.create_chat();
        let msg = user_message(&mut store, "hi there");
        store.append_message(&id, msg);
        assert_eq!(store.chats()[0].title, "hi there");
    }

    #[test]
    fn later_messages_leave_title_alone() {
        let (_dir, mut store) = store();
        let id = store.create_chat();
        let first = user_message(&mut store, "first");
        store.append_message(&id, first);
        let second = user_message(&mut store, "second");
        store.append_message(&id, second);
        assert_eq!(store.chats()[0].title, "first");
    }

    #[test]
    fn delete_active_chat_clears_selection_and_view() {
        let (_dir, mut store) = store();
        let id = store.create_chat();
        let msg = user_message(&mut store, "hello");
        store.append_message(&id, msg);
        store.delete_chat(&id);
        assert!(store.chats().is_empty());
        assert_eq!(store.active_id(), None);
        assert!(store.current_messages().is_empty());
    }

    #[test]
    fn delete_inactive_chat_leaves_selection_and_view() {
        let (_dir, mut store) = store();
        let other = store.create_chat();
        let active = store.create_chat();
        let msg = user_message(&mut store, "keep me");
        store.append_message(&active, msg);
        store.delete_chat(&other);
        assert_eq!(store.active_id(), Some(active.as_str()));
        assert_eq!(store.current_messages().len(), 1);
        assert_eq!(store.chats().len(), 1);
    }

    #[test]
    fn clear_active_chat_empties_canonical_record() {
        let (_dir, mut store) = store();
        let id = store.create_chat();
        let msg = user_message(&mut store, "hello");
        store.append_message(&id, msg);
        store.clear_active_chat();
        assert!(store.current_messages().is_empty());
        assert!(store.chats()[0].messages.is_empty());
    }

    #[test]
    fn chat_list_round_trips_through_storage() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::with_root(dir.path().to_path_buf());

        let mut store = ChatStore::load(storage.clone());
        let id = store.create_chat();
        store.append_message(&id, Message {
            id: "1".to_string(),
            role: Role::User,
            content: "hello".to_string(),
        });
        store.append_message(&id, Message {
            id: "2".to_string(),
            role: Role::Assistant,
            content: "hi!".to_string(),
        });
        store.create_chat();
        let before = store.chats().to_vec();

        let reloaded = ChatStore::load(storage);
        assert_eq!(reloaded.chats(), &before[..]);
    }

    #[test]
    fn malformed_persisted_chats_load_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::with_root(dir.path().to_path_buf());
        storage.set(CHATS_KEY, "{not json").unwrap();

        let store = ChatStore::load(storage);
        assert!(store.chats().is_empty());
    }

    #[test]
    fn commit_stream_targets_originating_chat() {
        let (_dir, mut store) = store();
        let origin = store.create_chat();
        let msg = user_message(&mut store, "question");
        store.append_message(&origin, msg);
        let elsewhere = store.create_chat();

        let committed = store.commit_stream(&origin, Message {
            id: "m".to_string(),
            role: Role::Assistant,
            content: "answer".to_string(),
        });
        assert!(committed);

        // The reply landed in the chat that initiated the stream, not
        // the one that happens to be active.
        assert_eq!(store.active_id(), Some(elsewhere.as_str()));
        assert!(store.current_messages().is_empty());
        let origin_chat = store.chats().iter().find(|c| c.id == origin).unwrap();
        assert_eq!(origin_chat.messages.last().unwrap().content, "answer");
    }

    #[test]
    fn commit_stream_discards_result_for_deleted_chat() {
        let (_dir, mut store) = store();
        let id = store.create_chat();
        store.delete_chat(&id);
        let committed = store.commit_stream(&id, Message {
            id: "m".to_string(),
            role: Role::Assistant,
            content: "orphan".to_string(),
        });
        assert!(!committed);
        assert!(store.chats().is_empty());
    }

    #[test]
    fn update_stream_ignores_inactive_chat() {
        let (_dir, mut store) = store();
        let origin = store.create_chat();
        store.begin_stream(Message {
            id: "m".to_string(),
            role: Role::Assistant,
            content: String::new(),
        });
        store.create_chat();

        store.update_stream(&origin, "m", "partial");
        assert!(store.current_messages().is_empty());
    }
}
