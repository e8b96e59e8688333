//! Conversational replies for `chat` and annoying mode.

use async_trait::async_trait;
use tracing::debug;

use crate::claude::{Client, Message, Model, Role};

/// Produces a chat reply for arbitrary text.
#[async_trait]
pub trait Responder: Send + Sync {
    async fn get_response(&self, text: &str) -> Result<String, String>;
}

/// Max tokens per reply. Replies are chat lines, not essays.
const MAX_REPLY_TOKENS: u32 = 200;

/// Responder backed by the Anthropic Messages API.
pub struct ClaudeResponder {
    client: Client,
    persona: String,
}

impl ClaudeResponder {
    pub fn new(client: Client, bot_name: &str) -> Self {
        Self { client, persona: persona(bot_name) }
    }
}

fn persona(bot_name: &str) -> String {
    format!(
        "You are {bot_name}, a friendly chat bot hanging out in a group chat. \
         Reply with one or two short, casual sentences. Never use markdown."
    )
}

#[async_trait]
impl Responder for ClaudeResponder {
    async fn get_response(&self, text: &str) -> Result<String, String> {
        let messages = [
            Message { role: Role::User, content: format!("{}\n\nMessage: {text}", self.persona) },
        ];
        let reply = self
            .client
            .message(Model::Haiku, &messages, MAX_REPLY_TOKENS)
            .await
            .map_err(|e| e.to_string())?;
        debug!("Responder: {:?} -> {:?}", text, reply);
        Ok(reply.trim().to_string())
    }
}
