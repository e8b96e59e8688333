//! Media collaborators: resolving tracks, voice connections and players.
//!
//! The jukebox and the playback commands only talk to these traits. The
//! production implementations live in `ytdlp` (resolution) and `mpv`
//! (voice output and players).

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

/// A user-supplied track reference: a URL or a free-text search query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track(String);

impl Track {
    /// Normalise a reference. URLs lose everything from the first `&`
    /// (playlist index, start time, ...).
    pub fn new(reference: &str) -> Self {
        let reference = reference.trim();
        let reference = if reference.starts_with("http") {
            reference.split('&').next().unwrap_or(reference)
        } else {
            reference
        };
        Self(reference.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A resolved, streamable track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Playable {
    pub title: String,
    pub stream_url: String,
    /// Page the stream was resolved from.
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaError {
    /// Resolver found nothing playable.
    NotFound(String),
    /// Joining a voice channel failed.
    Voice(String),
    /// A helper process (yt-dlp, mpv) failed.
    Process(String),
    /// Unexpected output from a helper process.
    Parse(String),
}

impl fmt::Display for MediaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(q) => write!(f, "nothing found for '{q}'"),
            Self::Voice(e) => write!(f, "voice connection failed: {e}"),
            Self::Process(e) => write!(f, "player process failed: {e}"),
            Self::Parse(e) => write!(f, "unexpected media metadata: {e}"),
        }
    }
}

impl std::error::Error for MediaError {}

/// Turns a track reference into something a player can stream.
#[async_trait]
pub trait MediaResolver: Send + Sync {
    async fn resolve(&self, track: &Track) -> Result<Playable, MediaError>;
}

/// One active playback session.
#[async_trait]
pub trait Player: Send + Sync {
    fn title(&self) -> &str;
    /// The track ended or the session was stopped.
    fn is_done(&self) -> bool;
    /// Audio is currently flowing (started, not paused, not done).
    fn is_playing(&self) -> bool;
    fn volume(&self) -> f32;
    async fn start(&self) -> Result<(), MediaError>;
    async fn pause(&self) -> Result<(), MediaError>;
    async fn resume(&self) -> Result<(), MediaError>;
    async fn stop(&self) -> Result<(), MediaError>;
}

/// A joined voice channel that can host players.
#[async_trait]
pub trait VoiceConnection: Send + Sync {
    /// Channel (chat) this connection belongs to; "now playing" notices go here.
    fn channel(&self) -> i64;
    async fn create_player(
        &self,
        playable: Playable,
        volume: f32,
    ) -> Result<Arc<dyn Player>, MediaError>;
}

/// Joins voice channels.
#[async_trait]
pub trait VoiceGateway: Send + Sync {
    async fn join(&self, channel: i64) -> Result<Arc<dyn VoiceConnection>, MediaError>;
}
