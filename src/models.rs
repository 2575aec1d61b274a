// src/models.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Assistant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageKind {
    Text,
    Image,
}

/// One turn in a conversation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub sender: Sender,
    pub kind: MessageKind,
    pub text: String,
    /// Image reference, either a `file://` URI or a local path.
    pub image_path: Option<String>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            sender: Sender::User,
            kind: MessageKind::Text,
            text: text.into(),
            image_path: None,
            timestamp: Utc::now(),
        }
    }

    pub fn user_image(image_path: impl Into<String>) -> Self {
        Self {
            sender: Sender::User,
            kind: MessageKind::Image,
            text: String::new(),
            image_path: Some(image_path.into()),
            timestamp: Utc::now(),
        }
    }

    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self {
            sender: Sender::Assistant,
            kind: MessageKind::Text,
            text: text.into(),
            image_path: None,
            timestamp: Utc::now(),
        }
    }
}

/// Append-only, in-memory chat history for one session.
#[derive(Debug, Default, Clone)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Grows the trailing assistant turn with a streamed fragment, starting a
    /// new one if the last turn came from the user.
    pub fn append_to_last_assistant(&mut self, fragment: &str) {
        match self.messages.last_mut() {
            Some(last) if last.sender == Sender::Assistant && last.kind == MessageKind::Text => {
                last.text.push_str(fragment);
            }
            _ => self.messages.push(Message::assistant_text(fragment)),
        }
    }
}

/// Logs details of each API call.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiCallLog {
    pub timestamp: DateTime<Utc>,
    pub endpoint: String,
    pub request_summary: String,
    pub response_status: u16,
    pub response_time_ms: u128,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_to_last_assistant_grows_turn() {
        let mut conversation = Conversation::new();
        conversation.push(Message::user_text("hi"));
        conversation.append_to_last_assistant("Hel");
        conversation.append_to_last_assistant("lo");

        assert_eq!(conversation.len(), 2);
        assert_eq!(conversation.messages()[1].text, "Hello");
        assert_eq!(conversation.messages()[1].sender, Sender::Assistant);
    }

    #[test]
    fn test_clear() {
        let mut conversation = Conversation::new();
        conversation.push(Message::user_image("/tmp/a.png"));
        conversation.clear();
        assert!(conversation.is_empty());
    }
}
