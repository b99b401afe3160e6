//! Per-user session state
//!
//! A `Session` owns its conversation history, portfolio, goals and
//! preferences. The message list is append-only; a turn (user message plus
//! assistant message plus any structured update) commits as one unit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::error::AssistantError;
use crate::models::{Citation, Goal, IntentKind, Portfolio};
use crate::Result;

/// Role of a message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_lowercase().as_str() {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MessageMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<IntentKind>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub citations: Vec<Citation>,
}

/// A single message in the conversation history
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: Uuid,
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: MessageMetadata,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text.into(), MessageMetadata::default())
    }

    pub fn assistant(text: impl Into<String>, metadata: MessageMetadata) -> Self {
        Self::new(Role::Assistant, text.into(), metadata)
    }

    fn new(role: Role, text: String, metadata: MessageMetadata) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            text,
            timestamp: Utc::now(),
            metadata,
        }
    }
}

/// Structured changes a handler asks to apply together with its turn.
#[derive(Debug, Clone, Default)]
pub struct SessionUpdate {
    pub portfolio: Option<Portfolio>,
    pub new_goal: Option<Goal>,
}

impl SessionUpdate {
    pub fn is_empty(&self) -> bool {
        self.portfolio.is_none() && self.new_goal.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    id: String,
    messages: Vec<Message>,
    portfolio: Portfolio,
    goals: Vec<Goal>,
    preferences: BTreeMap<String, String>,
    created_at: DateTime<Utc>,
    last_active: DateTime<Utc>,
    #[serde(skip)]
    hydrated: bool,
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            messages: Vec::new(),
            portfolio: Portfolio::new(),
            goals: Vec::new(),
            preferences: BTreeMap::new(),
            created_at: now,
            last_active: now,
            hydrated: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// The last `count` messages, oldest first.
    pub fn recent_messages(&self, count: usize) -> &[Message] {
        let start = self.messages.len().saturating_sub(count);
        &self.messages[start..]
    }

    pub fn portfolio(&self) -> &Portfolio {
        &self.portfolio
    }

    pub fn goals(&self) -> &[Goal] {
        &self.goals
    }

    pub fn preferences(&self) -> &BTreeMap<String, String> {
        &self.preferences
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_active(&self) -> DateTime<Utc> {
        self.last_active
    }

    /// Intent recorded on the most recent assistant message.
    pub fn last_intent(&self) -> Option<IntentKind> {
        self.messages
            .iter()
            .rev()
            .find_map(|m| m.metadata.intent)
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.last_active {
            self.last_active = now;
        }
    }

    /// Append one message. Timestamps never go backwards within a session.
    pub fn append(&mut self, mut message: Message) {
        if let Some(last) = self.messages.last() {
            if message.timestamp < last.timestamp {
                message.timestamp = last.timestamp;
            }
        }
        self.touch(message.timestamp);
        self.messages.push(message);
    }

    /// Commit a full turn: both messages and the structured update, or
    /// nothing if the update is rejected.
    pub fn commit_turn(
        &mut self,
        user: Message,
        assistant: Message,
        update: SessionUpdate,
    ) -> Result<()> {
        if user.role != Role::User || assistant.role != Role::Assistant {
            return Err(AssistantError::Validation(
                "A turn is one user message followed by one assistant message".to_string(),
            ));
        }

        if let Some(portfolio) = update.portfolio {
            self.portfolio = portfolio;
        }
        if let Some(goal) = update.new_goal {
            self.goals.push(goal);
        }
        self.append(user);
        self.append(assistant);
        Ok(())
    }

    pub fn set_portfolio(&mut self, portfolio: Portfolio) {
        self.portfolio = portfolio;
        self.touch(Utc::now());
    }

    pub fn add_goal(&mut self, goal: Goal) {
        self.goals.push(goal);
        self.touch(Utc::now());
    }

    pub fn remove_goal(&mut self, index: usize) -> Result<Goal> {
        if index >= self.goals.len() {
            return Err(AssistantError::Validation(format!(
                "No goal at index {} (session has {})",
                index,
                self.goals.len()
            )));
        }
        self.touch(Utc::now());
        Ok(self.goals.remove(index))
    }

    pub fn set_preference(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.preferences.insert(key.into(), value.into());
        self.touch(Utc::now());
    }

    pub(crate) fn is_hydrated(&self) -> bool {
        self.hydrated
    }

    /// Seed a fresh session with journaled history. Only the first call has
    /// an effect, and only while the session has no messages of its own.
    pub(crate) fn hydrate(&mut self, history: Vec<Message>) {
        if self.hydrated {
            return;
        }
        self.hydrated = true;
        if self.messages.is_empty() {
            for message in history {
                self.append(message);
            }
        }
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.id.clone(),
            message_count: self.messages.len(),
            portfolio: self.portfolio.clone(),
            goals: self.goals.clone(),
            preferences: self.preferences.clone(),
            last_intent: self.last_intent(),
            created_at: self.created_at,
            last_active: self.last_active,
        }
    }
}

/// Read-only view returned to front ends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub message_count: usize,
    pub portfolio: Portfolio,
    pub goals: Vec<Goal>,
    pub preferences: BTreeMap<String, String>,
    pub last_intent: Option<IntentKind>,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}
