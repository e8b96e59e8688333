//! In-memory collaborators for tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::mail::{MailError, Mailer, OutgoingMail};
use super::media::{
    MediaError, MediaResolver, Playable, Player, Track, VoiceConnection, VoiceGateway,
};
use super::responder::Responder;
use super::sink::ChatSink;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sent {
    pub chat_id: i64,
    pub text: String,
    pub tts: bool,
}

/// Chat sink that records everything.
#[derive(Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<Sent>>,
    deleted: Mutex<Vec<(i64, i64)>>,
    presences: Mutex<Vec<String>>,
    fail_presence: AtomicBool,
    next_id: AtomicI64,
}

impl RecordingSink {
    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.sent().into_iter().map(|s| s.text).collect()
    }

    pub fn deleted(&self) -> Vec<(i64, i64)> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn presences(&self) -> Vec<String> {
        self.presences.lock().unwrap().clone()
    }

    pub fn fail_presence(&self, fail: bool) {
        self.fail_presence.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ChatSink for RecordingSink {
    async fn send_message(&self, chat_id: i64, text: &str, tts: bool) -> Result<i64, String> {
        self.sent.lock().unwrap().push(Sent { chat_id, text: text.to_string(), tts });
        Ok(self.next_id.fetch_add(1, Ordering::SeqCst) + 1000)
    }

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<(), String> {
        self.deleted.lock().unwrap().push((chat_id, message_id));
        Ok(())
    }

    async fn set_presence(&self, text: &str) -> Result<(), String> {
        if self.fail_presence.load(Ordering::SeqCst) {
            return Err("presence unavailable".to_string());
        }
        self.presences.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

/// Player whose lifecycle tests drive by hand.
pub struct FakePlayer {
    title: String,
    volume: f32,
    started: AtomicBool,
    paused: AtomicBool,
    done: AtomicBool,
}

impl FakePlayer {
    fn new(title: &str, volume: f32) -> Self {
        Self {
            title: title.to_string(),
            volume,
            started: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            done: AtomicBool::new(false),
        }
    }

    /// An already started player.
    pub fn arc(title: &str, volume: f32) -> Arc<Self> {
        let player = Self::new(title, volume);
        player.started.store(true, Ordering::SeqCst);
        Arc::new(player)
    }

    /// Simulate the track ending on its own.
    pub fn finish(&self) {
        self.done.store(true, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Player for FakePlayer {
    fn title(&self) -> &str {
        &self.title
    }

    fn is_done(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }

    fn is_playing(&self) -> bool {
        self.started.load(Ordering::SeqCst) && !self.is_paused() && !self.is_done()
    }

    fn volume(&self) -> f32 {
        self.volume
    }

    async fn start(&self) -> Result<(), MediaError> {
        self.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn pause(&self) -> Result<(), MediaError> {
        self.paused.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn resume(&self) -> Result<(), MediaError> {
        self.paused.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> Result<(), MediaError> {
        self.done.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Voice connection that hands out fake players and keeps them.
pub struct FakeVoice {
    channel: i64,
    players: Mutex<Vec<Arc<FakePlayer>>>,
}

impl FakeVoice {
    pub fn arc(channel: i64) -> Arc<Self> {
        Arc::new(Self { channel, players: Mutex::new(Vec::new()) })
    }

    pub fn players(&self) -> Vec<Arc<FakePlayer>> {
        self.players.lock().unwrap().clone()
    }
}

#[async_trait]
impl VoiceConnection for FakeVoice {
    fn channel(&self) -> i64 {
        self.channel
    }

    async fn create_player(
        &self,
        playable: Playable,
        volume: f32,
    ) -> Result<Arc<dyn Player>, MediaError> {
        let player = Arc::new(FakePlayer::new(&playable.title, volume));
        self.players.lock().unwrap().push(player.clone());
        Ok(player)
    }
}

/// Gateway that records joins.
#[derive(Default)]
pub struct FakeGateway {
    voices: Mutex<Vec<Arc<FakeVoice>>>,
}

impl FakeGateway {
    pub fn joins(&self) -> Vec<i64> {
        self.voices.lock().unwrap().iter().map(|v| v.channel).collect()
    }

    /// Every player created on any joined connection, in creation order.
    pub fn players(&self) -> Vec<Arc<FakePlayer>> {
        self.voices.lock().unwrap().iter().flat_map(|v| v.players()).collect()
    }
}

#[async_trait]
impl VoiceGateway for FakeGateway {
    async fn join(&self, channel: i64) -> Result<Arc<dyn VoiceConnection>, MediaError> {
        let voice = FakeVoice::arc(channel);
        self.voices.lock().unwrap().push(voice.clone());
        Ok(voice)
    }
}

/// Resolver that titles every track "Title of {track}".
#[derive(Default)]
pub struct FakeResolver {
    failing: Mutex<HashSet<String>>,
}

impl FakeResolver {
    pub fn fail_on(&self, track: &str) {
        self.failing.lock().unwrap().insert(track.to_string());
    }
}

#[async_trait]
impl MediaResolver for FakeResolver {
    async fn resolve(&self, track: &Track) -> Result<Playable, MediaError> {
        if self.failing.lock().unwrap().contains(track.as_str()) {
            return Err(MediaError::NotFound(track.to_string()));
        }
        Ok(Playable {
            title: format!("Title of {track}"),
            stream_url: format!("https://stream.example/{track}"),
            source: track.to_string(),
        })
    }
}

/// Responder that echoes with a prefix.
#[derive(Default)]
pub struct EchoResponder {
    calls: AtomicUsize,
}

impl EchoResponder {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Responder for EchoResponder {
    async fn get_response(&self, text: &str) -> Result<String, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("echo: {text}"))
    }
}

/// Mailer that records mail, optionally failing.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<OutgoingMail>>,
    fail: AtomicBool,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<OutgoingMail> {
        self.sent.lock().unwrap().clone()
    }

    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(MailError::Transport("connection refused".to_string()));
        }
        self.sent.lock().unwrap().push(mail);
        Ok(())
    }
}
