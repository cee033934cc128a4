use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

pub const TITLE_MAX_CHARS: usize = 200;
pub const TEXT_MAX_CHARS: usize = 5000;

/// Field-name to message map returned as the body of a 400 response.
pub type FieldErrors = BTreeMap<&'static str, String>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

impl Chat {
    /// Build a chat from an already-validated (trimmed) title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub chat_id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Build a message from an already-validated (trimmed) text.
    pub fn new(chat_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            chat_id: chat_id.into(),
            text: text.into(),
            created_at: Utc::now(),
        }
    }
}

// -----------------------------------------------------------------------------
// Request payloads
// -----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct NewChat {
    #[serde(default)]
    pub title: String,
}

impl NewChat {
    /// Returns the trimmed title, or a field-error map.
    ///
    /// Surrounding whitespace is trimmed first; length is counted in
    /// characters on the trimmed value.
    pub fn validate(&self) -> Result<String, FieldErrors> {
        validate_field("title", &self.title, TITLE_MAX_CHARS, "Chat title")
    }
}

#[derive(Debug, Deserialize)]
pub struct NewMessage {
    #[serde(default)]
    pub text: String,
}

impl NewMessage {
    pub fn validate(&self) -> Result<String, FieldErrors> {
        validate_field("text", &self.text, TEXT_MAX_CHARS, "Message text")
    }
}

fn validate_field(
    field: &'static str,
    raw: &str,
    max_chars: usize,
    label: &str,
) -> Result<String, FieldErrors> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        let mut errors = FieldErrors::new();
        errors.insert(field, format!("{label} must not be empty."));
        return Err(errors);
    }
    if trimmed.chars().count() > max_chars {
        let mut errors = FieldErrors::new();
        errors.insert(
            field,
            format!("{label} must not exceed {max_chars} characters."),
        );
        return Err(errors);
    }
    Ok(trimmed.to_string())
}

// -----------------------------------------------------------------------------
// Wire representations
// -----------------------------------------------------------------------------
// Two named message shapes instead of conditionally dropping the `chat`
// field during serialization: the full shape for messages nested under a
// chat, and a chat-omitted shape for the create-message response (the
// caller already supplied the chat id in the path).

#[derive(Debug, Serialize)]
pub struct ChatView {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub messages: Vec<MessageView>,
}

impl ChatView {
    pub fn from_chat(chat: Chat, messages: Vec<Message>) -> Self {
        Self {
            id: chat.id,
            title: chat.title,
            created_at: chat.created_at,
            messages: messages.into_iter().map(MessageView::from).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessageView {
    pub id: String,
    pub chat: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl From<Message> for MessageView {
    fn from(msg: Message) -> Self {
        Self {
            id: msg.id,
            chat: msg.chat_id,
            text: msg.text,
            created_at: msg.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessageCreatedView {
    pub id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl From<Message> for MessageCreatedView {
    fn from(msg: Message) -> Self {
        Self {
            id: msg.id,
            text: msg.text,
            created_at: msg.created_at,
        }
    }
}
