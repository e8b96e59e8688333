//! Outbound chat capabilities used by commands and the jukebox.

use async_trait::async_trait;

/// What handlers may do to the chat platform.
///
/// Errors are plain strings: callers only log them or relay them.
#[async_trait]
pub trait ChatSink: Send + Sync {
    /// Send `text` to a chat. With `tts` set the text is also spoken
    /// where the platform supports it. Returns the new message id.
    async fn send_message(&self, chat_id: i64, text: &str, tts: bool) -> Result<i64, String>;

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<(), String>;

    /// Replace the bot's public status text.
    async fn set_presence(&self, text: &str) -> Result<(), String>;
}
