//! Chat store
//!
//! Owns the conversation collection and the active-chat pointer. Every
//! mutation rewrites the whole collection to disk through a temp file and
//! an atomic rename, so no partial-write state is ever observable.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::warn;

use crate::core::chat::{Chat, Feedback, StoredMessage};

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredCollection {
    #[serde(default)]
    chats: Vec<Chat>,
    #[serde(default)]
    active_id: Option<i64>,
}

pub struct ChatStore {
    chats: Vec<Chat>,
    active_id: Option<i64>,
    path: PathBuf,
}

impl ChatStore {
    /// Load the collection from the default data location.
    pub fn load() -> Result<ChatStore, Box<dyn std::error::Error>> {
        Ok(Self::load_from_path(Self::default_path()?))
    }

    /// Load the collection from `path`. Missing or corrupt files fall
    /// back to an empty collection; a fresh empty chat is created when
    /// none survive, and the most recently updated chat becomes active.
    pub fn load_from_path(path: impl Into<PathBuf>) -> ChatStore {
        let path = path.into();
        let collection = match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<StoredCollection>(&contents) {
                Ok(collection) => collection,
                Err(err) => {
                    warn!(path = %path.display(), "discarding corrupt chat collection: {err}");
                    StoredCollection::default()
                }
            },
            Err(_) => StoredCollection::default(),
        };

        let mut store = ChatStore {
            chats: collection.chats,
            active_id: None,
            path,
        };

        if store.chats.is_empty() {
            store.create_chat_in_memory();
        } else {
            let saved_active = collection
                .active_id
                .filter(|id| store.chats.iter().any(|chat| chat.id == *id));
            let most_recent = store
                .chats
                .iter()
                .max_by_key(|chat| chat.last_updated)
                .map(|chat| chat.id);
            store.active_id = saved_active.or(most_recent);
        }

        store
    }

    fn default_path() -> Result<PathBuf, Box<dyn std::error::Error>> {
        let proj_dirs = ProjectDirs::from("org", "permacommons", "relais")
            .ok_or("Failed to determine data directory")?;
        Ok(proj_dirs.data_dir().join("chats.json"))
    }

    fn now_millis() -> i64 {
        Utc::now().timestamp_millis()
    }

    fn unique_id(&self) -> i64 {
        let mut id = Self::now_millis();
        while self.chats.iter().any(|chat| chat.id == id) {
            id += 1;
        }
        id
    }

    fn create_chat_in_memory(&mut self) -> i64 {
        let chat = Chat::new(self.unique_id());
        let id = chat.id;
        self.chats.insert(0, chat);
        self.active_id = Some(id);
        id
    }

    /// Create a fresh chat, make it active, and persist.
    pub fn create_chat(&mut self) -> Result<i64, Box<dyn std::error::Error>> {
        let id = self.create_chat_in_memory();
        self.persist()?;
        Ok(id)
    }

    pub fn chats(&self) -> &[Chat] {
        &self.chats
    }

    pub fn active_id(&self) -> Option<i64> {
        self.active_id
    }

    pub fn active(&self) -> Option<&Chat> {
        self.active_id
            .and_then(|id| self.chats.iter().find(|chat| chat.id == id))
    }

    pub fn active_mut(&mut self) -> Option<&mut Chat> {
        let id = self.active_id?;
        self.chats.iter_mut().find(|chat| chat.id == id)
    }

    pub fn chat(&self, id: i64) -> Option<&Chat> {
        self.chats.iter().find(|chat| chat.id == id)
    }

    pub fn chat_mut(&mut self, id: i64) -> Option<&mut Chat> {
        self.chats.iter_mut().find(|chat| chat.id == id)
    }

    pub fn set_active(&mut self, id: i64) -> bool {
        if self.chats.iter().any(|chat| chat.id == id) {
            self.active_id = Some(id);
            true
        } else {
            false
        }
    }

    pub fn rename_chat(
        &mut self,
        id: i64,
        title: impl Into<String>,
    ) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(chat) = self.chat_mut(id) {
            chat.title = title.into();
            self.persist()?;
        }
        Ok(())
    }

    pub fn toggle_pin(&mut self, id: i64) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(chat) = self.chat_mut(id) {
            chat.pinned = !chat.pinned;
            self.persist()?;
        }
        Ok(())
    }

    /// Delete a chat. When the active chat goes away, the first remaining
    /// chat takes over; when none remain, a fresh empty chat is created.
    pub fn delete_chat(&mut self, id: i64) -> Result<(), Box<dyn std::error::Error>> {
        self.chats.retain(|chat| chat.id != id);

        if self.chats.is_empty() {
            self.create_chat_in_memory();
        } else if self.active_id == Some(id) {
            self.active_id = self.chats.first().map(|chat| chat.id);
        }

        self.persist()
    }

    /// Hard-remove one message and bump the chat's last-updated stamp.
    pub fn delete_message(
        &mut self,
        chat_id: i64,
        message_id: &str,
    ) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(chat) = self.chat_mut(chat_id) {
            let before = chat.messages.len();
            chat.messages.retain(|message| message.id != message_id);
            if chat.messages.len() != before {
                chat.last_updated = Self::now_millis();
                self.persist()?;
            }
        }
        Ok(())
    }

    pub fn toggle_feedback(
        &mut self,
        chat_id: i64,
        message_id: &str,
        feedback: Feedback,
    ) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(message) = self
            .chat_mut(chat_id)
            .and_then(|chat| chat.message_mut(message_id))
        {
            message.toggle_feedback(feedback);
            self.persist()?;
        }
        Ok(())
    }

    /// Delete every chat and start over with a single fresh one.
    pub fn clear_history(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.chats.clear();
        self.create_chat_in_memory();
        self.persist()
    }

    /// Sidebar ordering: pinned chats first, then last-updated descending.
    pub fn ordered(&self) -> Vec<&Chat> {
        let mut ordered: Vec<&Chat> = self.chats.iter().collect();
        ordered.sort_by(|a, b| {
            b.pinned
                .cmp(&a.pinned)
                .then_with(|| b.last_updated.cmp(&a.last_updated))
        });
        ordered
    }

    /// Write the whole collection through a temp file in the target
    /// directory, then atomically rename over the previous file.
    pub fn persist(&self) -> Result<(), Box<dyn std::error::Error>> {
        let parent = self.path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)?;

        let collection = StoredCollection {
            chats: self.chats.clone(),
            active_id: self.active_id,
        };

        let mut temp_file = NamedTempFile::new_in(parent)?;
        serde_json::to_writer(&mut temp_file, &collection)?;
        temp_file.flush()?;
        temp_file.as_file().sync_all()?;
        temp_file.persist(&self.path)?;
        Ok(())
    }

    /// Append `message` to the active chat and bump its freshness stamp.
    /// Used by the turn loop; persistence happens at terminal states.
    pub fn push_to_active(&mut self, message: StoredMessage) {
        if let Some(chat) = self.active_mut() {
            chat.push(message);
            chat.last_updated = Self::now_millis();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> ChatStore {
        ChatStore::load_from_path(dir.path().join("chats.json"))
    }

    #[test]
    fn loading_a_missing_file_creates_a_fresh_chat() {
        let dir = TempDir::new().expect("temp dir");
        let store = store_in(&dir);
        assert_eq!(store.chats().len(), 1);
        assert!(store.active().is_some());
        assert!(store.active().unwrap().messages.is_empty());
    }

    #[test]
    fn loading_a_corrupt_file_falls_back_to_empty() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("chats.json");
        fs::write(&path, "{not json").expect("write corrupt file");

        let store = ChatStore::load_from_path(&path);
        assert_eq!(store.chats().len(), 1);
    }

    #[test]
    fn persistence_round_trips_the_collection() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("chats.json");

        let mut store = ChatStore::load_from_path(&path);
        let id = store.active_id().unwrap();
        store.push_to_active(StoredMessage::user("hello", Vec::new()));
        store.rename_chat(id, "greetings").expect("rename");

        let reloaded = ChatStore::load_from_path(&path);
        assert_eq!(reloaded.chats().len(), 1);
        assert_eq!(reloaded.active().unwrap().title, "greetings");
        assert_eq!(reloaded.active().unwrap().messages.len(), 1);
    }

    #[test]
    fn most_recently_updated_chat_is_selected_on_load() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("chats.json");

        let mut store = ChatStore::load_from_path(&path);
        let first = store.active_id().unwrap();
        let second = store.create_chat().expect("create");
        store.chat_mut(first).unwrap().last_updated = i64::MAX;
        store.set_active(second);
        // Drop the remembered pointer so the freshness rule decides.
        store.active_id = None;
        store.persist().expect("persist");

        let reloaded = ChatStore::load_from_path(&path);
        assert_eq!(reloaded.active_id(), Some(first));
    }

    #[test]
    fn deleting_the_active_chat_activates_the_first_remaining() {
        let dir = TempDir::new().expect("temp dir");
        let mut store = store_in(&dir);
        let first = store.active_id().unwrap();
        let second = store.create_chat().expect("create");
        assert_eq!(store.active_id(), Some(second));

        store.delete_chat(second).expect("delete");
        assert_eq!(store.active_id(), Some(first));
    }

    #[test]
    fn deleting_the_last_chat_creates_a_fresh_one() {
        let dir = TempDir::new().expect("temp dir");
        let mut store = store_in(&dir);
        let only = store.active_id().unwrap();

        store.delete_chat(only).expect("delete");
        assert_eq!(store.chats().len(), 1);
        assert_ne!(store.active_id(), Some(only));
    }

    #[test]
    fn deleting_a_message_bumps_last_updated() {
        let dir = TempDir::new().expect("temp dir");
        let mut store = store_in(&dir);
        let chat_id = store.active_id().unwrap();
        store.push_to_active(StoredMessage::user("hello", Vec::new()));
        let message_id = store.active().unwrap().messages[0].id.clone();
        store.chat_mut(chat_id).unwrap().last_updated = 0;

        store.delete_message(chat_id, &message_id).expect("delete");

        let chat = store.chat(chat_id).unwrap();
        assert!(chat.messages.is_empty());
        assert!(chat.last_updated > 0);
    }

    #[test]
    fn ordered_lists_pinned_chats_first() {
        let dir = TempDir::new().expect("temp dir");
        let mut store = store_in(&dir);
        let first = store.active_id().unwrap();
        let second = store.create_chat().expect("create");
        store.chat_mut(first).unwrap().last_updated = 10;
        store.chat_mut(second).unwrap().last_updated = 20;
        store.toggle_pin(first).expect("pin");

        let ordered: Vec<i64> = store.ordered().iter().map(|chat| chat.id).collect();
        assert_eq!(ordered, vec![first, second]);
    }

    #[test]
    fn chat_ids_stay_unique_under_rapid_creation() {
        let dir = TempDir::new().expect("temp dir");
        let mut store = store_in(&dir);
        let mut ids: Vec<i64> = vec![store.active_id().unwrap()];
        for _ in 0..5 {
            ids.push(store.create_chat().expect("create"));
        }
        let mut deduped = ids.clone();
        deduped.sort_unstable();
        deduped.dedup();
        assert_eq!(ids.len(), deduped.len());
    }
}
