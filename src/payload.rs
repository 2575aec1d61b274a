// src/payload.rs

use crate::config::Config;
use crate::errors::InferenceResult;
use crate::media::{encode_image_to_data_url, ImageResolver};
use crate::models::{Message, MessageKind, Sender};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    ImageUrl { image_url: ImageUrl },
    Text { text: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TurnContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: TurnContent,
}

impl ChatTurn {
    fn text(role: Role, text: &str) -> Self {
        Self {
            role,
            content: TurnContent::Text(text.to_string()),
        }
    }
}

/// Sampling parameters sent with every completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatParams {
    pub model: String,
    pub temperature: f32,
    pub top_p: f32,
    pub repetition_penalty: f32,
    pub max_completion_tokens: u32,
}

impl From<&Config> for ChatParams {
    fn from(config: &Config) -> Self {
        Self {
            model: config.model.clone(),
            temperature: config.temperature,
            top_p: config.top_p,
            repetition_penalty: config.repetition_penalty,
            max_completion_tokens: config.max_completion_tokens,
        }
    }
}

/// Body of `POST /v1/chat/completions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    pub messages: Vec<ChatTurn>,
    pub model: String,
    pub repetition_penalty: f32,
    pub temperature: f32,
    pub top_p: f32,
    pub max_completion_tokens: u32,
    pub stream: bool,
}

fn image_part(message: &Message, resolver: &dyn ImageResolver) -> InferenceResult<ContentPart> {
    let reference = message.image_path.as_deref().unwrap_or_default();
    let url = match resolver.resolve(reference) {
        Some(path) => Some(encode_image_to_data_url(&path)?),
        None => {
            warn!("Could not resolve image '{}' to a local file", reference);
            None
        }
    };
    Ok(ContentPart::ImageUrl {
        image_url: ImageUrl { url },
    })
}

/// Serializes a conversation into the turns expected by the remote.
///
/// Images sent by the user are held back and attached to the next user text
/// turn as a multi-part content array. Images with no text after them are
/// dropped. The system prompt always comes first.
pub fn build_messages(
    history: &[Message],
    system_prompt: &str,
    resolver: &dyn ImageResolver,
) -> InferenceResult<Vec<ChatTurn>> {
    let mut turns = vec![ChatTurn::text(Role::System, system_prompt)];
    let mut pending_images: Vec<ContentPart> = Vec::new();

    for message in history {
        match (message.sender, message.kind) {
            (Sender::User, MessageKind::Image) => {
                pending_images.push(image_part(message, resolver)?);
            }
            (Sender::User, MessageKind::Text) => {
                if pending_images.is_empty() {
                    turns.push(ChatTurn::text(Role::User, &message.text));
                } else {
                    let mut parts = std::mem::take(&mut pending_images);
                    parts.push(ContentPart::Text {
                        text: message.text.clone(),
                    });
                    turns.push(ChatTurn {
                        role: Role::User,
                        content: TurnContent::Parts(parts),
                    });
                }
            }
            // Assistant replies are text only.
            (Sender::Assistant, _) => {
                turns.push(ChatTurn::text(Role::Assistant, &message.text));
            }
        }
    }

    if !pending_images.is_empty() {
        debug!(
            "Dropping {} trailing image(s) with no prompt",
            pending_images.len()
        );
    }

    Ok(turns)
}

pub fn build_chat_request(
    history: &[Message],
    system_prompt: &str,
    params: &ChatParams,
    resolver: &dyn ImageResolver,
) -> InferenceResult<ChatCompletionRequest> {
    Ok(ChatCompletionRequest {
        messages: build_messages(history, system_prompt, resolver)?,
        model: params.model.clone(),
        repetition_penalty: params.repetition_penalty,
        temperature: params.temperature,
        top_p: params.top_p,
        max_completion_tokens: params.max_completion_tokens,
        stream: true,
    })
}
