//! Session shell
//!
//! [`ChatSession`] owns the pieces a running client needs: the settings
//! snapshot, the chat store, the current strategy, and the in-flight
//! state (thinking flag plus cancellation handle). The turn loop and
//! selectors stay pure; this is the layer that feeds them snapshots and
//! persists the results.

use std::error::Error;
use std::fmt;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::api::RankedModel;
use crate::core::catalog::build_catalog;
use crate::core::chat::{derive_title, AttachedFile, Feedback, MessageRole, StoredMessage};
use crate::core::config::Settings;
use crate::core::dispatch::Dispatcher;
use crate::core::orchestrator::{run_turn, TurnContext, TurnOutcome};
use crate::core::store::ChatStore;
use crate::core::strategy::{select_strategy, ModelStrategy, SwitchDirection};

/// Appended exactly once when the user explicitly stops generation.
pub const STOPPED_MESSAGE: &str = "Generation stopped by user.";

#[derive(Debug)]
pub enum SessionError {
    /// A turn is already in flight for this conversation.
    Busy,
    /// The message cannot be regenerated (missing, or not preceded by a
    /// user message).
    InvalidTarget,
    Storage(Box<dyn Error>),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Busy => write!(f, "a turn is already in flight for this conversation"),
            SessionError::InvalidTarget => write!(f, "message cannot be regenerated"),
            SessionError::Storage(err) => write!(f, "{err}"),
        }
    }
}

impl Error for SessionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SessionError::Storage(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

pub struct ChatSession<D> {
    dispatcher: D,
    settings: Settings,
    store: ChatStore,
    strategy: ModelStrategy,
    thinking: Option<String>,
    cancel: Option<CancellationToken>,
}

impl<D: Dispatcher> ChatSession<D> {
    pub fn new(dispatcher: D, settings: Settings, store: ChatStore) -> Self {
        Self {
            dispatcher,
            settings,
            store,
            strategy: ModelStrategy::default(),
            thinking: None,
            cancel: None,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn store(&self) -> &ChatStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut ChatStore {
        &mut self.store
    }

    pub fn strategy(&self) -> &ModelStrategy {
        &self.strategy
    }

    pub fn is_thinking(&self) -> bool {
        self.thinking.is_some()
    }

    /// The model currently being tried, while a turn is in flight.
    pub fn thinking_model(&self) -> Option<&str> {
        self.thinking.as_deref()
    }

    /// Replace the settings snapshot. The caller must follow up with
    /// [`rebuild_strategy`](Self::rebuild_strategy); a reselection fully
    /// replaces the prior strategy and resets its index.
    pub fn update_settings(&mut self, settings: Settings) {
        self.settings = settings;
    }

    /// Rebuild catalog and strategy from the current settings and the
    /// given remote feeds.
    pub fn rebuild_strategy(&mut self, remote: &[RankedModel], whitelist: &[String]) {
        let catalog = build_catalog(
            &self.settings.credentials,
            &self.settings.local_server,
            remote,
            whitelist,
        );
        self.strategy = select_strategy(
            &catalog,
            self.settings.intelligence,
            &self.settings.credentials,
            &self.settings.local_server,
        );
    }

    /// Send one user message: append it (deriving the title on a first
    /// message), persist, then drive the dispatch/failover loop to a
    /// terminal state and persist again.
    pub async fn send(
        &mut self,
        text: impl Into<String>,
        files: Vec<AttachedFile>,
    ) -> Result<TurnOutcome, SessionError> {
        if self.thinking.is_some() {
            return Err(SessionError::Busy);
        }
        let text = text.into();

        let now = Utc::now().timestamp_millis();
        match self.store.active_mut() {
            Some(chat) => {
                if chat.messages.is_empty() {
                    chat.title = derive_title(&text, files.first());
                }
                chat.push(StoredMessage::user(text, files.clone()));
                chat.last_updated = now;
            }
            None => {
                return Err(SessionError::Storage(
                    "no active conversation".to_string().into(),
                ))
            }
        }
        self.store.persist().map_err(SessionError::Storage)?;

        let token = CancellationToken::new();
        self.cancel = Some(token.clone());
        self.thinking = self.strategy.current().map(|model| model.id.clone());

        let start_index = self.strategy.index();
        let files = (!files.is_empty()).then_some(files.as_slice());
        let outcome = match self.store.active_mut() {
            Some(chat) => {
                let ctx = TurnContext {
                    dispatcher: &self.dispatcher,
                    credentials: &self.settings.credentials,
                    local: &self.settings.local_server,
                    models: self.strategy.models(),
                };
                run_turn(&ctx, chat, start_index, files, &token).await
            }
            None => TurnOutcome::Stopped,
        };

        if let TurnOutcome::Completed { model_index } = outcome {
            self.strategy.set_index(model_index);
        }
        self.thinking = None;
        self.cancel = None;
        self.store.persist().map_err(SessionError::Storage)?;
        Ok(outcome)
    }

    /// Regenerate a target assistant message: truncate the conversation
    /// to just before the preceding user message, then replay a fresh
    /// send with that message's original text and attachments.
    pub async fn regenerate(&mut self, message_id: &str) -> Result<TurnOutcome, SessionError> {
        if self.thinking.is_some() {
            return Err(SessionError::Busy);
        }

        let (text, files) = {
            let chat = self
                .store
                .active_mut()
                .ok_or(SessionError::InvalidTarget)?;
            let index = chat
                .messages
                .iter()
                .position(|message| message.id == message_id)
                .ok_or(SessionError::InvalidTarget)?;
            if index < 1 || chat.messages[index - 1].role != MessageRole::User {
                return Err(SessionError::InvalidTarget);
            }
            let user_message = &chat.messages[index - 1];
            let text = user_message.content.clone().unwrap_or_default();
            let files = user_message.files.clone();
            chat.messages.truncate(index - 1);
            (text, files)
        };
        self.store.persist().map_err(SessionError::Storage)?;

        self.send(text, files).await
    }

    /// Explicit user stop: abort the in-flight dispatch and append the
    /// stop note. Returns whether anything was actually in flight;
    /// cancellation itself stays silent, only this path writes the note.
    pub fn stop_generation(&mut self) -> Result<bool, SessionError> {
        let Some(token) = self.cancel.take() else {
            return Ok(false);
        };
        token.cancel();
        self.thinking = None;
        self.store
            .push_to_active(StoredMessage::assistant_note(STOPPED_MESSAGE));
        self.store.persist().map_err(SessionError::Storage)?;
        Ok(true)
    }

    /// User-forced model switch. Takes effect on the next dispatch; an
    /// in-flight dispatch is not aborted.
    pub fn switch_model(&mut self, direction: SwitchDirection) {
        self.strategy.switch(direction);
    }

    /// Toggle feedback on a message of the active conversation.
    pub fn set_feedback(
        &mut self,
        message_id: &str,
        feedback: Feedback,
    ) -> Result<(), SessionError> {
        if let Some(chat_id) = self.store.active_id() {
            self.store
                .toggle_feedback(chat_id, message_id, feedback)
                .map_err(SessionError::Storage)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::catalog::ModelDescriptor;
    use crate::core::dispatch::{DispatchError, ProviderReply};
    use crate::core::providers::{Credentials, LocalServerConfig, Provider};
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct FixedDispatcher {
        reply: String,
    }

    #[async_trait]
    impl Dispatcher for FixedDispatcher {
        async fn dispatch(
            &self,
            _model: &ModelDescriptor,
            _credentials: &Credentials,
            _local: &LocalServerConfig,
            _history: &[StoredMessage],
            _files: Option<&[AttachedFile]>,
            _cancel: &CancellationToken,
        ) -> Result<ProviderReply, DispatchError> {
            Ok(ProviderReply {
                text: self.reply.clone(),
                tool_calls: Vec::new(),
            })
        }
    }

    fn catalog_model(id: &str) -> RankedModel {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "context_length": 8000,
            "architecture": { "modality": "multimodal" },
        }))
        .expect("ranked model")
    }

    fn session_in(dir: &TempDir, reply: &str) -> ChatSession<FixedDispatcher> {
        let mut settings = Settings::default();
        settings.credentials.set(Provider::OpenRouter, "sk-or-test");
        let store = ChatStore::load_from_path(dir.path().join("chats.json"));
        let mut session = ChatSession::new(
            FixedDispatcher {
                reply: reply.to_string(),
            },
            settings,
            store,
        );
        session.rebuild_strategy(
            &[catalog_model("acme/alpha-chat"), catalog_model("acme/beta-chat")],
            &[],
        );
        session
    }

    #[tokio::test]
    async fn send_appends_user_and_assistant_messages() {
        let dir = TempDir::new().expect("temp dir");
        let mut session = session_in(&dir, "bonjour");

        let outcome = session.send("salut", Vec::new()).await.expect("send");
        assert!(matches!(outcome, TurnOutcome::Completed { .. }));

        let chat = session.store().active().unwrap();
        assert_eq!(chat.messages.len(), 2);
        assert_eq!(chat.messages[0].role, MessageRole::User);
        assert_eq!(chat.messages[1].content.as_deref(), Some("bonjour"));
        assert_eq!(chat.title, "salut");
        assert!(!session.is_thinking());
    }

    #[tokio::test]
    async fn send_persists_the_conversation() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("chats.json");
        let mut session = session_in(&dir, "bonjour");

        session.send("salut", Vec::new()).await.expect("send");

        let reloaded = ChatStore::load_from_path(&path);
        assert_eq!(reloaded.active().unwrap().messages.len(), 2);
    }

    #[tokio::test]
    async fn a_session_already_thinking_rejects_sends() {
        let dir = TempDir::new().expect("temp dir");
        let mut session = session_in(&dir, "bonjour");
        session.thinking = Some("acme/alpha-chat".to_string());

        let err = session.send("salut", Vec::new()).await.expect_err("busy");
        assert!(matches!(err, SessionError::Busy));
    }

    #[tokio::test]
    async fn regenerate_truncates_to_the_first_pair_and_replays() {
        let dir = TempDir::new().expect("temp dir");
        let mut session = session_in(&dir, "third reply");

        session.send("first question", Vec::new()).await.expect("send");
        session.send("second question", Vec::new()).await.expect("send");
        let (first_pair, target_id) = {
            let chat = session.store().active().unwrap();
            assert_eq!(chat.messages.len(), 4);
            let ids: Vec<String> = chat.messages[..2].iter().map(|m| m.id.clone()).collect();
            (ids, chat.messages[3].id.clone())
        };

        session.regenerate(&target_id).await.expect("regenerate");

        let chat = session.store().active().unwrap();
        assert_eq!(chat.messages.len(), 4);
        assert_eq!(chat.messages[0].id, first_pair[0]);
        assert_eq!(chat.messages[1].id, first_pair[1]);
        assert_eq!(
            chat.messages[2].content.as_deref(),
            Some("second question")
        );
        assert_eq!(chat.messages[3].content.as_deref(), Some("third reply"));
    }

    #[tokio::test]
    async fn regenerate_rejects_messages_without_a_preceding_user_turn() {
        let dir = TempDir::new().expect("temp dir");
        let mut session = session_in(&dir, "bonjour");
        session.send("salut", Vec::new()).await.expect("send");
        let first_id = session.store().active().unwrap().messages[0].id.clone();

        let err = session.regenerate(&first_id).await.expect_err("invalid");
        assert!(matches!(err, SessionError::InvalidTarget));
    }

    #[tokio::test]
    async fn stop_appends_the_note_exactly_once() {
        let dir = TempDir::new().expect("temp dir");
        let mut session = session_in(&dir, "bonjour");
        session.cancel = Some(CancellationToken::new());

        assert!(session.stop_generation().expect("stop"));
        assert!(!session.stop_generation().expect("stop again"));

        let notes = session
            .store()
            .active()
            .unwrap()
            .messages
            .iter()
            .filter(|m| m.content.as_deref() == Some(STOPPED_MESSAGE))
            .count();
        assert_eq!(notes, 1);
    }

    #[tokio::test]
    async fn successful_sends_remember_the_model_index() {
        let dir = TempDir::new().expect("temp dir");
        let mut session = session_in(&dir, "bonjour");
        session.switch_model(SwitchDirection::Next);
        let index = session.strategy().index();

        session.send("salut", Vec::new()).await.expect("send");
        assert_eq!(session.strategy().index(), index);
        let label = session.store().active().unwrap().messages[1]
            .model
            .clone()
            .unwrap();
        assert_eq!(
            label,
            session.strategy().models()[index].id
        );
    }

    #[test]
    fn rebuilding_resets_the_strategy_index() {
        let dir = TempDir::new().expect("temp dir");
        let mut session = session_in(&dir, "bonjour");
        session.switch_model(SwitchDirection::Next);
        assert_ne!(session.strategy().index(), 0);

        let mut settings = Settings::default();
        settings.credentials.set(Provider::OpenRouter, "sk-or-test");
        settings.set_intelligence(80);
        session.update_settings(settings);
        session.rebuild_strategy(
            &[catalog_model("acme/alpha-chat"), catalog_model("acme/beta-chat")],
            &[],
        );
        assert_eq!(session.strategy().index(), 0);
    }

    #[tokio::test]
    async fn feedback_toggles_through_the_session() {
        let dir = TempDir::new().expect("temp dir");
        let mut session = session_in(&dir, "bonjour");
        session.send("salut", Vec::new()).await.expect("send");
        let message_id = session.store().active().unwrap().messages[1].id.clone();

        session
            .set_feedback(&message_id, Feedback::Like)
            .expect("feedback");
        let feedback = session
            .store()
            .active()
            .unwrap()
            .message(&message_id)
            .unwrap()
            .feedback;
        assert_eq!(feedback, Some(Feedback::Like));
    }
}
