//! Platform capability surfaces.
//!
//! The dispatch core never touches serenity types directly; inbound
//! interactions are normalized into the structs below and every outbound
//! effect goes through one of the traits. The Discord implementations live
//! in [`crate::discord`], the recording fakes used by tests in
//! [`crate::test_utils`].

use crate::errors::Result;
use crate::registry::{Audience, CommandSchema};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// The user behind an interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRef {
    pub id: u64,
    /// Display name, used only for operator logs.
    pub name: String,
}

/// Address of a message this bot sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageRef {
    pub channel_id: u64,
    pub message_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    pub id: u64,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ButtonSpec {
    pub custom_id: String,
    pub label: String,
}

/// Outbound message content: plain text plus optional buttons.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reply {
    pub content: String,
    pub ephemeral: bool,
    pub buttons: Vec<ButtonSpec>,
}

impl Reply {
    pub fn plain(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn ephemeral(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ephemeral: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_button(mut self, custom_id: impl Into<String>, label: impl Into<String>) -> Self {
        self.buttons.push(ButtonSpec {
            custom_id: custom_id.into(),
            label: label.into(),
        });
        self
    }
}

/// One text input of a modal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModalField {
    pub id: String,
    pub label: String,
    /// Pre-filled value, used when replaying a captured submission.
    pub value: Option<String>,
    pub required: bool,
    pub paragraph: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModalDefinition {
    pub custom_id: String,
    pub title: String,
    pub fields: Vec<ModalField>,
}

/// A typed slash-command option value.
#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    String(String),
    Integer(i64),
    Boolean(bool),
    Number(f64),
}

impl OptionValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }
}

/// A slash-command invocation, normalized.
pub struct CommandInvocation {
    pub audience: Audience,
    pub name: String,
    pub user: UserRef,
    pub options: HashMap<String, OptionValue>,
    pub responder: Arc<dyn Responder>,
}

/// A modal submission, normalized. `custom_id` is a correlation id; `fields`
/// keeps submission order so a replayed modal shows inputs in the same order.
pub struct ModalSubmission {
    pub custom_id: String,
    pub user: UserRef,
    pub fields: Vec<(String, String)>,
    pub responder: Arc<dyn Responder>,
}

/// A button or select-menu interaction, normalized.
pub struct ComponentClick {
    pub custom_id: String,
    pub user: UserRef,
    /// The message the component lives on.
    pub message: MessageRef,
    pub responder: Arc<dyn Responder>,
}

/// Any inbound interaction the gate can route.
pub enum Interaction {
    Command(CommandInvocation),
    Modal(ModalSubmission),
    Component(ComponentClick),
}

impl Interaction {
    pub fn user(&self) -> &UserRef {
        match self {
            Self::Command(c) => &c.user,
            Self::Modal(m) => &m.user,
            Self::Component(c) => &c.user,
        }
    }

    pub fn responder(&self) -> &Arc<dyn Responder> {
        match self {
            Self::Command(c) => &c.responder,
            Self::Modal(m) => &m.responder,
            Self::Component(c) => &c.responder,
        }
    }
}

/// Per-interaction reply channel. Implementations track whether the
/// interaction was already acknowledged and pick initial-response vs
/// follow-up accordingly, so every dispatch branch can just call [`send`].
///
/// [`send`]: Responder::send
#[async_trait]
pub trait Responder: Send + Sync {
    async fn send(&self, reply: Reply) -> Result<()>;

    /// Acknowledge now, answer later.
    async fn defer(&self) -> Result<()>;

    /// Replace the deferred or initial reply.
    async fn edit(&self, reply: Reply) -> Result<()>;

    /// Only valid as the first response to a command or component
    /// interaction; Discord rejects it elsewhere.
    async fn open_modal(&self, modal: &ModalDefinition) -> Result<()>;
}

/// Process-wide outbound messaging, independent of any one interaction.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn direct_message(&self, user_id: u64, reply: Reply) -> Result<MessageRef>;

    async fn delete_message(&self, message: &MessageRef) -> Result<()>;

    async fn fetch_user(&self, user_id: u64) -> Result<UserProfile>;
}

/// Bulk replace of one audience's published command surface. Idempotent.
#[async_trait]
pub trait CommandPublisher: Send + Sync {
    async fn replace_commands(&self, audience: Audience, schemas: Vec<CommandSchema>)
    -> Result<()>;
}
