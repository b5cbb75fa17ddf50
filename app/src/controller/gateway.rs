//! The chat runtime, as seen by the controller.
//!
//! Nothing here knows about a particular chat service. A binding for a real
//! service turns its events into [`super::Event`]s and implements
//! [`InteractionGateway`] on top of its HTTP api.
use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("gateway request failed: {0}")]
    Request(String),
    #[error("interaction {0} is no longer valid")]
    Expired(String),
    #[error("message {0} not found")]
    MessageNotFound(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    /// Stable, globally unique id.
    pub id: String,
    /// Display name, for logs only.
    pub name: String,
}

impl User {
    /// The chat-side mention markup.
    pub fn mention(&self) -> String {
        format!("<@{}>", self.id)
    }
}

/// A message that already exists in a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRef {
    pub id: String,
    pub channel_id: String,
    pub author_id: String,
    pub content: String,
}

/// One inbound interaction: who, where, and for components, on which
/// message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interaction {
    pub id: String,
    pub user: User,
    pub channel_id: String,
    /// The message a button or modal was attached to.
    pub message: Option<MessageRef>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonStyle {
    Primary,
    Secondary,
    Success,
    Danger,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub custom_id: String,
    pub label: String,
    pub style: ButtonStyle,
    pub disabled: bool,
}

pub type ButtonRow = Vec<Button>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reply {
    pub content: String,
    pub ephemeral: bool,
    pub attachment: Option<Attachment>,
    pub components: Vec<ButtonRow>,
}

impl Reply {
    pub fn ephemeral(content: impl Into<String>) -> Reply {
        Reply {
            content: content.into(),
            ephemeral: true,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModalField {
    pub id: String,
    pub label: String,
    pub value: String,
    pub multiline: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Modal {
    pub custom_id: String,
    pub title: String,
    pub fields: Vec<ModalField>,
}

/// An autocomplete suggestion. Both parts are limited to 100 characters by
/// most gateways.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Choice {
    pub name: String,
    pub value: String,
}

/// Outbound calls. Each interaction gets exactly one initial response
/// (`autocomplete`, `reply`, `update` or `open_modal`), after which
/// `edit_reply` and `followup` may be used.
#[async_trait]
pub trait InteractionGateway: Send + Sync {
    async fn autocomplete(
        &self,
        interaction: &Interaction,
        choices: Vec<Choice>,
    ) -> Result<(), GatewayError>;

    /// Respond with a new message.
    async fn reply(&self, interaction: &Interaction, reply: Reply) -> Result<(), GatewayError>;

    /// Respond by replacing the message a component was attached to.
    async fn update(&self, interaction: &Interaction, reply: Reply) -> Result<(), GatewayError>;

    /// Edit the message produced by the initial response.
    async fn edit_reply(&self, interaction: &Interaction, reply: Reply)
        -> Result<(), GatewayError>;

    /// An additional message after the initial response.
    async fn followup(
        &self,
        interaction: &Interaction,
        reply: Reply,
    ) -> Result<MessageRef, GatewayError>;

    async fn open_modal(&self, interaction: &Interaction, modal: Modal)
        -> Result<(), GatewayError>;

    async fn delete_message(&self, message: &MessageRef) -> Result<(), GatewayError>;
}
