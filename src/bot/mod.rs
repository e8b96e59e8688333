//! Moby: chat commands, a shared jukebox, and the collaborators behind them.

pub mod commands;
pub mod dispatcher;
pub mod error;
pub mod jokes;
pub mod jukebox;
pub mod mail;
pub mod media;
pub mod mpv;
pub mod responder;
pub mod shutdown;
pub mod sink;
pub mod state;
pub mod telegram;
pub mod tts;
pub mod ytdlp;

#[cfg(test)]
mod fakes;

pub use dispatcher::{Collaborators, Dispatcher, DispatcherSettings, Inbound};
pub use jukebox::Jukebox;
pub use mail::{Mailer, SmtpMailer};
pub use mpv::MpvGateway;
pub use responder::{ClaudeResponder, Responder};
pub use shutdown::{ExitReason, Shutdown};
pub use state::SharedState;
pub use telegram::TelegramClient;
pub use tts::TtsClient;
pub use ytdlp::YtDlpResolver;
