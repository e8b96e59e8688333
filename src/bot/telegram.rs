//! Telegram chat sink using teloxide.

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{ChatMemberKind, InputFile, MessageId};
use tracing::{info, warn};

use super::sink::ChatSink;
use super::tts::TtsClient;

/// Telegram API client.
pub struct TelegramClient {
    bot: Bot,
    owner_ids: Vec<i64>,
    tts: Option<TtsClient>,
}

impl TelegramClient {
    pub fn new(bot: Bot, owner_ids: Vec<i64>, tts: Option<TtsClient>) -> Self {
        Self { bot, owner_ids, tts }
    }

    /// Configured owners everywhere; otherwise the chat's creator or admins.
    pub async fn is_admin(&self, chat_id: i64, user_id: i64) -> bool {
        if self.owner_ids.contains(&user_id) {
            return true;
        }
        match self.bot.get_chat_member(ChatId(chat_id), UserId(user_id as u64)).await {
            Ok(member) => matches!(
                member.kind,
                ChatMemberKind::Owner(_) | ChatMemberKind::Administrator(_)
            ),
            Err(e) => {
                warn!("Failed to get chat member {} in {}: {}", user_id, chat_id, e);
                false
            }
        }
    }

    async fn send_voice(&self, chat_id: i64, voice_data: Vec<u8>) -> Result<i64, String> {
        info!("🔊 Sending voice to chat {} ({} bytes)", chat_id, voice_data.len());
        let input_file = InputFile::memory(voice_data).file_name("voice.ogg");
        self.bot
            .send_voice(ChatId(chat_id), input_file)
            .await
            .map(|msg| msg.id.0 as i64)
            .map_err(|e| format!("Failed to send voice: {e}"))
    }
}

#[async_trait]
impl ChatSink for TelegramClient {
    /// Plain text; with `tts` the text is followed by a spoken copy when a
    /// speech server is configured.
    async fn send_message(&self, chat_id: i64, text: &str, tts: bool) -> Result<i64, String> {
        let id = self
            .bot
            .send_message(ChatId(chat_id), text)
            .await
            .map(|msg| msg.id.0 as i64)
            .map_err(|e| format!("Failed to send: {e}"))?;

        if tts && let Some(client) = &self.tts {
            match client.synthesize(text).await {
                Ok(audio) => {
                    if let Err(e) = self.send_voice(chat_id, audio).await {
                        warn!("{}", e);
                    }
                }
                Err(e) => warn!("TTS failed: {}", e),
            }
        }
        Ok(id)
    }

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<(), String> {
        info!("🗑️ Deleting message {} in chat {}", message_id, chat_id);
        self.bot
            .delete_message(ChatId(chat_id), MessageId(message_id as i32))
            .await
            .map(|_| ())
            .map_err(|e| format!("Failed to delete message: {e}"))
    }

    /// Presence is the bot's short description (shown on its profile).
    async fn set_presence(&self, text: &str) -> Result<(), String> {
        info!("📛 Presence: {}", text);
        self.bot
            .set_my_short_description()
            .short_description(text)
            .await
            .map(|_| ())
            .map_err(|e| format!("Failed to set short description: {e}"))
    }
}
