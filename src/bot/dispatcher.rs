//! Command dispatcher: routes one inbound chat message to at most one handler
//! and turns its outcome into chat replies.

use std::path::PathBuf;
use std::sync::Arc;

use rand::seq::IndexedRandom;
use tracing::{debug, info, warn};

use super::commands::{self, Command, Invocation, Registry};
use super::error::{CommandError, CommandResult};
use super::jokes::JokeBook;
use super::jukebox::{publish_presence, start_track};
use super::mail::{MailError, Mailer, OutgoingMail, TextBody};
use super::media::{MediaResolver, Track, VoiceConnection, VoiceGateway};
use super::responder::Responder;
use super::shutdown::{ExitReason, Shutdown};
use super::sink::ChatSink;
use super::state::{Claim, Playback, SharedState};

pub const LOCKED_MESSAGE: &str = "Only admins can issue commands right now.";

/// A chat message as the dispatcher sees it.
#[derive(Debug, Clone, Default)]
pub struct Inbound {
    pub message_id: i64,
    pub chat_id: i64,
    pub user_id: i64,
    /// Telegram username (without `@`), or the first name when unset.
    pub username: String,
    pub text: String,
    /// Owner or chat administrator. Only computed for commands.
    pub is_admin: bool,
    /// Group chat whose voice session the author can reach.
    pub voice_channel: Option<i64>,
    pub from_self: bool,
}

impl Inbound {
    pub fn mention(&self) -> String {
        format!("@{}", self.username)
    }
}

/// What the dispatcher did with a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Not a command for us and no annoying-mode reply.
    Ignored,
    /// Annoying mode answered the message.
    Chatted,
    /// Admin lock rejected the command.
    Denied,
    Ran(Command),
    Failed(Command, CommandError),
}

/// Static dispatcher settings taken from the config.
#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    pub bot_name: String,
    /// Our Telegram username, for `/cmd@bot` addressing.
    pub bot_username: Option<String>,
    pub source_url: String,
    pub jokes_path: PathBuf,
    /// Address that turns email into an SMS, for `tellcowan`.
    pub text_gateway: Option<String>,
}

/// Everything the handlers talk to.
pub struct Collaborators {
    pub sink: Arc<dyn ChatSink>,
    pub gateway: Arc<dyn VoiceGateway>,
    pub resolver: Arc<dyn MediaResolver>,
    pub responder: Option<Arc<dyn Responder>>,
    pub mailer: Option<Arc<dyn Mailer>>,
}

pub struct Dispatcher {
    state: Arc<SharedState>,
    registry: Registry,
    settings: DispatcherSettings,
    deps: Collaborators,
    shutdown: Shutdown,
}

impl Dispatcher {
    pub fn new(
        state: Arc<SharedState>,
        settings: DispatcherSettings,
        deps: Collaborators,
        shutdown: Shutdown,
    ) -> Self {
        Self { state, registry: Registry::new(), settings, deps, shutdown }
    }

    /// Handle one message. Sends every reply itself; the return value is
    /// for logging and tests.
    pub async fn handle(&self, msg: &Inbound) -> Dispatch {
        if !commands::is_command(&msg.text) {
            return self.handle_chatter(msg).await;
        }
        let Some(invocation) = commands::parse(&msg.text, self.settings.bot_username.as_deref())
        else {
            return Dispatch::Ignored;
        };

        if self.state.is_locked().await && !msg.is_admin {
            info!(
                "🔒 {} ({}) blocked by admin lock: {}",
                msg.username, msg.user_id, invocation.name
            );
            self.say(msg.chat_id, LOCKED_MESSAGE, false).await;
            return Dispatch::Denied;
        }

        let Some(command) = self.registry.lookup(&invocation.name) else {
            debug!("Unknown command '{}' from {}", invocation.name, msg.username);
            return Dispatch::Ignored;
        };

        info!("[Command] ({}) {} {}", msg.username, invocation.name, invocation.rest);
        match self.run(command, msg, &invocation).await {
            Ok(()) => Dispatch::Ran(command),
            Err(e) => {
                warn!("Command '{}' from {} failed: {}", invocation.name, msg.username, e);
                self.reply(msg, &e.to_string()).await;
                Dispatch::Failed(command, e)
            }
        }
    }

    async fn handle_chatter(&self, msg: &Inbound) -> Dispatch {
        if msg.from_self || msg.text.trim().is_empty() || !self.state.is_annoying().await {
            return Dispatch::Ignored;
        }
        let Some(responder) = &self.deps.responder else {
            debug!("Annoying mode is on but no responder is configured");
            return Dispatch::Ignored;
        };
        match responder.get_response(&msg.text).await {
            Ok(response) => {
                self.say(msg.chat_id, &response, false).await;
                Dispatch::Chatted
            }
            Err(e) => {
                warn!("Responder failed: {}", e);
                Dispatch::Ignored
            }
        }
    }

    async fn run(&self, command: Command, msg: &Inbound, inv: &Invocation) -> CommandResult {
        match command {
            Command::AnnoyingMode => self.annoying_mode(msg).await,
            Command::Chat => self.chat(msg, inv).await,
            Command::Choose => self.choose(msg, inv).await,
            Command::Email => self.email(msg, inv).await,
            Command::Hello => {
                self.say(msg.chat_id, &format!("Hello {}", msg.mention()), false).await;
                Ok(())
            }
            Command::Joke => self.joke(msg).await,
            Command::Lock => self.lock(msg).await,
            Command::Pause => self.pause(msg).await,
            Command::Playlist => self.playlist(msg).await,
            Command::Restart => self.restart(msg).await,
            Command::Resume => self.resume(msg).await,
            Command::Say => self.repeat(msg, inv).await,
            Command::Source => {
                let text = format!("Here is my source code: {}", self.settings.source_url);
                self.reply(msg, &text).await;
                Ok(())
            }
            Command::Stop => self.stop(msg).await,
            Command::TellCowan => self.tell_cowan(msg, inv).await,
            Command::Volume => self.volume(msg, inv).await,
            Command::YtPlay => self.ytplay(msg, &inv.rest).await,
            Command::Clip(url) => self.ytplay(msg, url).await,
        }
    }

    async fn annoying_mode(&self, msg: &Inbound) -> CommandResult {
        let on = self.state.toggle_annoying().await;
        info!("Annoying mode: {}", on);
        let text = if on { "Annoying mode on." } else { "Annoying mode off." };
        self.say(msg.chat_id, text, false).await;
        Ok(())
    }

    async fn chat(&self, msg: &Inbound, inv: &Invocation) -> CommandResult {
        if inv.rest.is_empty() {
            return Err(CommandError::InvalidArgument("Usage: !chat <message>".into()));
        }
        let responder = self
            .deps
            .responder
            .as_ref()
            .ok_or_else(|| CommandError::TransportFailure("Chat is not configured.".into()))?;
        let response = responder.get_response(&inv.rest).await.map_err(|e| {
            warn!("Responder failed: {}", e);
            CommandError::TransportFailure("I couldn't think of a reply.".into())
        })?;
        self.say(msg.chat_id, &response, false).await;
        Ok(())
    }

    async fn choose(&self, msg: &Inbound, inv: &Invocation) -> CommandResult {
        let options = inv.args();
        let choice = options.choose(&mut rand::rng()).ok_or_else(|| {
            CommandError::InvalidArgument("Usage: !choose <option> <option> ...".into())
        })?;
        self.say(msg.chat_id, choice, false).await;
        Ok(())
    }

    async fn email(&self, msg: &Inbound, inv: &Invocation) -> CommandResult {
        let mailer = self
            .deps
            .mailer
            .as_ref()
            .ok_or_else(|| CommandError::TransportFailure("Email is not configured.".into()))?;
        let (to, words) = match inv.rest.split_once(char::is_whitespace) {
            Some((to, words)) if !words.trim().is_empty() => (to, words.trim()),
            _ => {
                return Err(CommandError::InvalidArgument(
                    "Usage: !email <address> <message>".into(),
                ));
            }
        };

        let mail = OutgoingMail::relayed(to, words, &self.settings.bot_name, &msg.username);
        match mailer.send(mail).await {
            Ok(()) => {
                self.reply(msg, "Email sent.").await;
                Ok(())
            }
            Err(e @ MailError::InvalidAddress(_)) => Err(e.into()),
            Err(e) => {
                warn!("Email to {} failed: {}", to, e);
                Err(CommandError::TransportFailure("Failed to send email.".into()))
            }
        }
    }

    async fn joke(&self, msg: &Inbound) -> CommandResult {
        let out_of_jokes = || CommandError::TransportFailure("I'm all out of jokes.".into());
        let book = JokeBook::load(&self.settings.jokes_path).await.map_err(|e| {
            warn!("Failed to load jokes: {}", e);
            out_of_jokes()
        })?;
        let joke = book.pick().ok_or_else(out_of_jokes)?;
        let text = format!("{}, here's one for ya!:\n{}", msg.mention(), joke);
        self.say(msg.chat_id, &text, true).await;
        Ok(())
    }

    async fn lock(&self, msg: &Inbound) -> CommandResult {
        if !msg.is_admin {
            return Err(CommandError::PermissionDenied("You don't have permissions.".into()));
        }
        let locked = self.state.toggle_locked().await;
        info!("🔒 Admin lock: {}", locked);
        self.reply(msg, &format!("Admin lock changed to: {locked}.")).await;
        Ok(())
    }

    async fn pause(&self, msg: &Inbound) -> CommandResult {
        let player = self
            .state
            .player_if(Playback::Playing)
            .await
            .ok_or_else(|| CommandError::NotPlayable("Nothing is playing.".into()))?;
        player.pause().await?;
        info!("⏸️ Paused {}", player.title());
        self.reply(msg, "Paused playback.").await;
        Ok(())
    }

    async fn resume(&self, msg: &Inbound) -> CommandResult {
        let player = self
            .state
            .player_if(Playback::Paused)
            .await
            .ok_or_else(|| CommandError::NotPlayable("Nothing is paused.".into()))?;
        player.resume().await?;
        info!("▶️ Resumed {}", player.title());
        self.reply(msg, "Resumed playback.").await;
        Ok(())
    }

    async fn stop(&self, msg: &Inbound) -> CommandResult {
        let player = self
            .state
            .take_active_player()
            .await
            .ok_or_else(|| CommandError::NotPlayable("Nothing is playing.".into()))?;
        player.stop().await?;
        info!("⏹️ Stopped {}", player.title());
        self.reply(msg, "Playback stopped.").await;
        Ok(())
    }

    async fn playlist(&self, msg: &Inbound) -> CommandResult {
        let n = self.state.queue_len().await;
        let noun = if n == 1 { "song" } else { "songs" };
        self.reply(msg, &format!("{n} {noun} in queue.")).await;
        Ok(())
    }

    async fn restart(&self, msg: &Inbound) -> CommandResult {
        if !msg.is_admin {
            return Err(CommandError::PermissionDenied("Insufficient privileges.".into()));
        }
        info!("🔄 Restart requested by {}", msg.username);
        self.reply(msg, "Restarting.").await;
        self.shutdown.trigger(ExitReason::Restart);
        Ok(())
    }

    async fn repeat(&self, msg: &Inbound, inv: &Invocation) -> CommandResult {
        if inv.rest.is_empty() {
            return Err(CommandError::InvalidArgument("Usage: !say <words>".into()));
        }
        self.delete(msg).await;
        self.say(msg.chat_id, &inv.rest, false).await;
        Ok(())
    }

    async fn tell_cowan(&self, msg: &Inbound, inv: &Invocation) -> CommandResult {
        let (Some(mailer), Some(gateway)) = (&self.deps.mailer, &self.settings.text_gateway)
        else {
            return Err(CommandError::TransportFailure("Texting is not configured.".into()));
        };
        if inv.rest.is_empty() {
            return Err(CommandError::InvalidArgument("Usage: !tellcowan <message>".into()));
        }
        let body = TextBody::new(&inv.rest)?;

        if let Err(e) = mailer.send(OutgoingMail::text(gateway, body)).await {
            warn!("Text to gateway failed: {}", e);
            return Err(CommandError::TransportFailure("Failed to send text/email.".into()));
        }
        self.reply(msg, "Text sent.").await;
        Ok(())
    }

    async fn volume(&self, msg: &Inbound, inv: &Invocation) -> CommandResult {
        let invalid = || CommandError::InvalidArgument("Volume must be between 1 and 100.".into());
        let n: u32 = inv
            .args()
            .first()
            .and_then(|arg| arg.parse().ok())
            .ok_or_else(invalid)?;
        if !(1..=100).contains(&n) {
            return Err(invalid());
        }
        let previous = self.state.volume().await;
        self.state.set_volume(n as f32 / 100.0).await?;
        info!("🔊 Volume {} → {}", previous, n as f32 / 100.0);
        self.reply(msg, &format!("Set volume to {n}.")).await;
        Ok(())
    }

    async fn ytplay(&self, msg: &Inbound, reference: &str) -> CommandResult {
        if reference.trim().is_empty() {
            return Err(CommandError::InvalidArgument(
                "Usage: !ytplay <link or search terms>".into(),
            ));
        }
        let channel = msg.voice_channel.ok_or_else(|| {
            CommandError::InvalidArgument("You have to be in a voice chat.".into())
        })?;
        let track = Track::new(reference);
        let voice = self.voice_for(channel).await?;

        match self.state.claim_or_enqueue(track.clone(), voice).await {
            Claim::Queued(position) => {
                info!("➕ Queued {} at position {}", track, position);
                self.delete(msg).await;
                self.reply(msg, &format!("Queued - <{track}>.")).await;
            }
            Claim::Start(promotion) => {
                let player = start_track(&self.state, self.deps.resolver.as_ref(), promotion).await?;
                let title = player.title().to_string();
                info!("▶️ Now playing {} ({})", title, track);
                self.delete(msg).await;
                self.reply(msg, &format!("Now playing - {title}.")).await;
                publish_presence(&self.state, self.deps.sink.as_ref(), &title).await;
            }
        }
        Ok(())
    }

    /// The connection to play through: the current one if it serves `channel`
    /// or is busy elsewhere, otherwise a fresh join.
    async fn voice_for(&self, channel: i64) -> Result<Arc<dyn VoiceConnection>, CommandError> {
        if let Some(voice) = self.state.voice().await
            && (voice.channel() == channel || self.state.session_active().await)
        {
            return Ok(voice);
        }
        info!("🔊 Joining voice channel {}", channel);
        Ok(self.deps.gateway.join(channel).await?)
    }

    /// Reply addressed to the author.
    async fn reply(&self, msg: &Inbound, text: &str) {
        self.say(msg.chat_id, &format!("{} {}", msg.mention(), text), false).await;
    }

    async fn say(&self, chat_id: i64, text: &str, tts: bool) {
        if let Err(e) = self.deps.sink.send_message(chat_id, text, tts).await {
            warn!("Failed to send message to {}: {}", chat_id, e);
        }
    }

    async fn delete(&self, msg: &Inbound) {
        if let Err(e) = self.deps.sink.delete_message(msg.chat_id, msg.message_id).await {
            warn!("Failed to delete message {}: {}", msg.message_id, e);
        }
    }
}
