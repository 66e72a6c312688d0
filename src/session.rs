//! Session context - the state one signed-in user carries between turns
//!
//! A session owns who is signed in, which conversation is open, the messages
//! currently shown, the profile that was loaded and the chart being discussed.
//! `logout` resets all of it.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::model::{ChatTurn, Conversation, ConversationId, Profile, Role};
use crate::storage::Store;
use crate::{Error, Result};

/// Longest prompt prefix used as an automatic conversation title
const TITLE_CHARS: usize = 30;

/// Answers questions about a chart (the LLM service).
#[async_trait]
pub trait Advisor: Send + Sync {
    /// The answer text, or a reason the answer could not be produced.
    async fn answer(&self, chart: &Value, question: &str) -> std::result::Result<String, String>;
}

/// Title for a conversation started by `prompt`
pub fn derive_title(prompt: &str) -> String {
    let prompt = prompt.trim();
    if prompt.chars().count() > TITLE_CHARS {
        format!("{}..", prompt.chars().take(TITLE_CHARS).collect::<String>())
    } else {
        prompt.to_string()
    }
}

/// Replies that must not be written to the store
fn is_error_reply(text: &str) -> bool {
    text.starts_with("Error")
}

pub struct Session {
    store: Store,
    advisor: Option<Arc<dyn Advisor>>,
    username: Option<String>,
    current_conversation: Option<ConversationId>,
    messages: Vec<ChatTurn>,
    loaded_profile: Option<Profile>,
    chart: Option<Value>,
    subject_name: Option<String>,
}

impl Session {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            advisor: None,
            username: None,
            current_conversation: None,
            messages: Vec::new(),
            loaded_profile: None,
            chart: None,
            subject_name: None,
        }
    }

    /// Enable chat. Without an advisor `ask` fails with `Error::ChatDisabled`.
    pub fn with_advisor(mut self, advisor: Arc<dyn Advisor>) -> Self {
        self.advisor = Some(advisor);
        self
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn current_conversation(&self) -> Option<&ConversationId> {
        self.current_conversation.as_ref()
    }

    pub fn messages(&self) -> &[ChatTurn] {
        &self.messages
    }

    pub fn loaded_profile(&self) -> Option<&Profile> {
        self.loaded_profile.as_ref()
    }

    pub fn chart(&self) -> Option<&Value> {
        self.chart.as_ref()
    }

    pub fn subject_name(&self) -> Option<&str> {
        self.subject_name.as_deref()
    }

    pub fn chat_enabled(&self) -> bool {
        self.advisor.is_some()
    }

    fn require_user(&self) -> Result<String> {
        self.username.clone().ok_or(Error::NotSignedIn)
    }

    // ========== Account ==========

    pub async fn sign_up(&self, username: &str, password: &str) -> Result<bool> {
        self.store.add_user(username, password).await
    }

    /// Sign in. Returns `false` on bad credentials without saying which part was wrong.
    pub async fn log_in(&mut self, username: &str, password: &str) -> Result<bool> {
        match self.store.login(username, password).await? {
            Some(user) => {
                self.logout();
                tracing::info!("Signed in as {}", user.username);
                self.username = Some(user.username);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Forget everything tied to the signed-in user.
    pub fn logout(&mut self) {
        self.username = None;
        self.current_conversation = None;
        self.messages.clear();
        self.loaded_profile = None;
        self.chart = None;
        self.subject_name = None;
    }

    // ========== Profiles & Chart ==========

    pub async fn save_profile(&self, profile: &Profile) -> Result<()> {
        let username = self.require_user()?;
        self.store.save_profile(&username, profile).await
    }

    pub async fn profiles(&self) -> Result<Vec<Profile>> {
        let username = self.require_user()?;
        self.store.list_profiles(&username).await
    }

    /// Load the first saved profile called `name`.
    pub async fn load_profile(&mut self, name: &str) -> Result<Option<&Profile>> {
        let found = self.profiles().await?.into_iter().find(|p| p.name == name);
        self.loaded_profile = found;
        Ok(self.loaded_profile.as_ref())
    }

    /// Keep the chart produced by the chart generator.
    ///
    /// A document carrying an `error` key is a failed generation and is rejected.
    pub fn set_chart(&mut self, subject: impl Into<String>, document: Value) -> Result<()> {
        if let Some(reason) = document.get("error") {
            let reason = reason.as_str().map(str::to_string).unwrap_or_else(|| reason.to_string());
            return Err(Error::Chart(reason));
        }
        self.chart = Some(document);
        self.subject_name = Some(subject.into());
        Ok(())
    }

    // ========== Conversations ==========

    pub async fn conversations(&self) -> Result<Vec<Conversation>> {
        let username = self.require_user()?;
        self.store.list_conversations(&username).await
    }

    /// Start an empty conversation with the default title and make it current.
    pub async fn new_conversation(&mut self) -> Result<ConversationId> {
        let username = self.require_user()?;
        let id = self.store.create_conversation(&username, None).await?;
        self.current_conversation = Some(id.clone());
        self.messages.clear();
        Ok(id)
    }

    /// Make `id` current and load its history.
    pub async fn select_conversation(&mut self, id: ConversationId) -> Result<&[ChatTurn]> {
        self.messages = self.store.get_chat_history(&id).await?;
        self.current_conversation = Some(id);
        Ok(self.messages.as_slice())
    }

    /// Open the most recent conversation when none is current.
    pub async fn resume_latest(&mut self) -> Result<Option<ConversationId>> {
        if self.current_conversation.is_none() {
            if let Some(latest) = self.conversations().await?.into_iter().next() {
                self.select_conversation(latest.id).await?;
            }
        }
        Ok(self.current_conversation.clone())
    }

    pub async fn delete_current_conversation(&mut self) -> Result<()> {
        if let Some(id) = self.current_conversation.take() {
            self.store.delete_conversation(&id).await?;
        }
        self.messages.clear();
        Ok(())
    }

    pub async fn clear_history(&mut self) -> Result<()> {
        let username = self.require_user()?;
        self.store.clear_chat_history(&username).await?;
        self.messages.clear();
        Ok(())
    }

    // ========== Chat ==========

    /// Run one chat turn and return the assistant's reply.
    ///
    /// The user turn is always persisted. The reply is persisted only when the
    /// advisor succeeded with a non-error text; either way it is shown.
    pub async fn ask(&mut self, prompt: &str) -> Result<ChatTurn> {
        let username = self.require_user()?;
        let advisor = self.advisor.clone().ok_or(Error::ChatDisabled)?;
        let chart = self.chart.clone().ok_or(Error::NoChart)?;

        let conversation = match &self.current_conversation {
            Some(id) => id.clone(),
            None => {
                let title = derive_title(prompt);
                let id = self.store.create_conversation(&username, Some(title.as_str())).await?;
                self.current_conversation = Some(id.clone());
                id
            }
        };

        self.store.save_chat(&username, Role::User, prompt, &conversation).await?;
        self.messages.push(ChatTurn::user(prompt));

        let text = match advisor.answer(&chart, prompt).await {
            Ok(text) => {
                if is_error_reply(&text) {
                    tracing::warn!("Advisor returned an error reply; not saving it");
                } else {
                    self.store.save_chat(&username, Role::Assistant, &text, &conversation).await?;
                }
                text
            }
            Err(reason) => {
                tracing::warn!("Advisor failed: {}", reason);
                format!("Error: {}", reason)
            }
        };

        let reply = ChatTurn::assistant(text);
        self.messages.push(reply.clone());
        Ok(reply)
    }
}
