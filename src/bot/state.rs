//! Shared bot state.
//!
//! One record, one async mutex. Every read-modify-write is a single lock
//! scope; nothing here awaits I/O while the lock is held. Starting a track
//! is split in two: a reservation taken under the lock (`try_promote_next`,
//! `claim_or_enqueue`), the resolve/start I/O done by the caller, and then
//! `install_player` or `abandon_promotion` under the lock again.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use super::media::{Player, Track, VoiceConnection};

/// Default playback volume when none is configured.
pub const DEFAULT_VOLUME: f32 = 0.5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    InvalidArgument(String),
}

impl fmt::Display for StateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
        }
    }
}

impl std::error::Error for StateError {}

/// Derived playback state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Playback {
    Idle,
    /// A reservation is out; a track is being resolved and started.
    Starting,
    Playing,
    Paused,
    /// The player finished its track and has not been replaced yet.
    Finished,
}

/// Everything needed to start a reserved track outside the lock.
pub struct Promotion {
    pub track: Track,
    pub voice: Arc<dyn VoiceConnection>,
    pub volume: f32,
}

/// Outcome of a play request.
pub enum Claim {
    /// A session is active; the track was appended at this 1-based position.
    Queued(usize),
    /// The slot was free and is now reserved for this track.
    Start(Promotion),
}

struct BotState {
    annoying_mode: bool,
    locked: bool,
    voice: Option<Arc<dyn VoiceConnection>>,
    player: Option<Arc<dyn Player>>,
    volume: f32,
    queue: VecDeque<Track>,
    starting: bool,
    /// Last presence text published.
    presence: Option<String>,
}

impl BotState {
    fn enqueue(&mut self, track: Track) -> usize {
        self.queue.push_back(track);
        self.queue.len()
    }

    fn session_active(&self) -> bool {
        self.starting || self.player.as_ref().is_some_and(|p| !p.is_done())
    }

    fn playback(&self) -> Playback {
        match &self.player {
            _ if self.starting => Playback::Starting,
            None => Playback::Idle,
            Some(p) if p.is_done() => Playback::Finished,
            Some(p) if p.is_playing() => Playback::Playing,
            Some(_) => Playback::Paused,
        }
    }
}

/// The single shared state record, injected into the dispatcher and jukebox.
pub struct SharedState {
    inner: Mutex<BotState>,
}

impl SharedState {
    pub fn new(volume: f32) -> Self {
        let volume = if (0.0..=1.0).contains(&volume) { volume } else { DEFAULT_VOLUME };
        Self {
            inner: Mutex::new(BotState {
                annoying_mode: false,
                locked: false,
                voice: None,
                player: None,
                volume,
                queue: VecDeque::new(),
                starting: false,
                presence: None,
            }),
        }
    }

    /// Append a track to the queue without claiming the player slot.
    /// Returns the new queue length.
    #[cfg(test)]
    pub async fn enqueue(&self, track: Track) -> usize {
        self.inner.lock().await.enqueue(track)
    }

    /// Dequeue the head of the queue if the player slot is free.
    ///
    /// The slot is free when no player exists or the current one is done,
    /// and no other promotion is in flight. A returned promotion holds the
    /// slot until `install_player` or `abandon_promotion`.
    pub async fn try_promote_next(&self) -> Option<Promotion> {
        let mut state = self.inner.lock().await;
        if state.session_active() {
            return None;
        }
        let voice = state.voice.clone()?;
        let track = state.queue.pop_front()?;
        state.starting = true;
        debug!("Promoted {} ({} left in queue)", track, state.queue.len());
        Some(Promotion { track, voice, volume: state.volume })
    }

    /// Reserve the slot for `track`, or queue it behind the active session
    /// and any tracks already waiting.
    ///
    /// Without an active session `voice` becomes the state's connection, so
    /// waiting tracks are promoted there.
    pub async fn claim_or_enqueue(&self, track: Track, voice: Arc<dyn VoiceConnection>) -> Claim {
        let mut state = self.inner.lock().await;
        if state.session_active() {
            return Claim::Queued(state.enqueue(track));
        }
        state.voice = Some(voice.clone());
        if !state.queue.is_empty() {
            return Claim::Queued(state.enqueue(track));
        }
        state.starting = true;
        Claim::Start(Promotion { track, voice, volume: state.volume })
    }

    /// Complete a reservation with a started player.
    pub async fn install_player(&self, player: Arc<dyn Player>) {
        let mut state = self.inner.lock().await;
        state.starting = false;
        info!("▶️ Now playing: {}", player.title());
        state.player = Some(player);
    }

    /// Release a reservation whose track could not be started.
    pub async fn abandon_promotion(&self) {
        self.inner.lock().await.starting = false;
    }

    /// Take the active (playing or paused) player out of the state.
    pub async fn take_active_player(&self) -> Option<Arc<dyn Player>> {
        let mut state = self.inner.lock().await;
        if state.player.as_ref().is_some_and(|p| !p.is_done()) {
            state.player.take()
        } else {
            None
        }
    }

    /// Drop a finished player (Finished → Idle). Returns whether one was dropped.
    pub async fn clear_finished(&self) -> bool {
        let mut state = self.inner.lock().await;
        if state.player.as_ref().is_some_and(|p| p.is_done()) {
            state.player = None;
            true
        } else {
            false
        }
    }

    /// Store the volume for the next started player.
    pub async fn set_volume(&self, volume: f32) -> Result<(), StateError> {
        if !(0.0..=1.0).contains(&volume) {
            return Err(StateError::InvalidArgument(format!(
                "volume {volume} outside 0.0..=1.0"
            )));
        }
        self.inner.lock().await.volume = volume;
        Ok(())
    }

    pub async fn toggle_annoying(&self) -> bool {
        let mut state = self.inner.lock().await;
        state.annoying_mode = !state.annoying_mode;
        state.annoying_mode
    }

    pub async fn toggle_locked(&self) -> bool {
        let mut state = self.inner.lock().await;
        state.locked = !state.locked;
        state.locked
    }

    /// Record `text` as the published presence. Returns false if unchanged.
    pub async fn swap_presence(&self, text: &str) -> bool {
        let mut state = self.inner.lock().await;
        if state.presence.as_deref() == Some(text) {
            return false;
        }
        state.presence = Some(text.to_string());
        true
    }

    /// Forget the published presence so the next swap always publishes.
    pub async fn reset_presence(&self) {
        self.inner.lock().await.presence = None;
    }

    pub async fn volume(&self) -> f32 {
        self.inner.lock().await.volume
    }

    pub async fn queue_len(&self) -> usize {
        self.inner.lock().await.queue.len()
    }

    #[cfg(test)]
    pub async fn queued(&self) -> Vec<Track> {
        self.inner.lock().await.queue.iter().cloned().collect()
    }

    pub async fn is_locked(&self) -> bool {
        self.inner.lock().await.locked
    }

    pub async fn is_annoying(&self) -> bool {
        self.inner.lock().await.annoying_mode
    }

    pub async fn voice(&self) -> Option<Arc<dyn VoiceConnection>> {
        self.inner.lock().await.voice.clone()
    }

    #[cfg(test)]
    pub async fn player(&self) -> Option<Arc<dyn Player>> {
        self.inner.lock().await.player.clone()
    }

    #[cfg(test)]
    pub async fn playback(&self) -> Playback {
        self.inner.lock().await.playback()
    }

    /// The current player, if playback is in `wanted`; one lock scope.
    pub async fn player_if(&self, wanted: Playback) -> Option<Arc<dyn Player>> {
        let state = self.inner.lock().await;
        if state.playback() == wanted { state.player.clone() } else { None }
    }

    /// Queue length and playback state read in one lock scope.
    pub async fn poll(&self) -> (usize, Playback) {
        let state = self.inner.lock().await;
        (state.queue.len(), state.playback())
    }

    /// Whether a session (playing, paused or starting) is active.
    pub async fn session_active(&self) -> bool {
        self.inner.lock().await.session_active()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::fakes::{FakePlayer, FakeVoice};

    fn track(s: &str) -> Track {
        Track::new(s)
    }

    #[tokio::test]
    async fn test_initial_state() {
        let state = SharedState::new(DEFAULT_VOLUME);
        assert!(!state.is_locked().await);
        assert!(!state.is_annoying().await);
        assert!(state.voice().await.is_none());
        assert!(state.player().await.is_none());
        assert_eq!(state.volume().await, 0.5);
        assert_eq!(state.queue_len().await, 0);
        assert_eq!(state.playback().await, Playback::Idle);
    }

    #[tokio::test]
    async fn test_out_of_range_default_volume_falls_back() {
        let state = SharedState::new(3.0);
        assert_eq!(state.volume().await, DEFAULT_VOLUME);
    }

    #[tokio::test]
    async fn test_set_volume_rejects_out_of_range() {
        let state = SharedState::new(0.5);
        for v in [-0.01, 1.01, 1.5, -3.0, f32::NAN, f32::INFINITY] {
            let result = state.set_volume(v).await;
            assert!(matches!(result, Err(StateError::InvalidArgument(_))), "accepted {v}");
            assert_eq!(state.volume().await, 0.5);
        }
    }

    #[tokio::test]
    async fn test_set_volume_accepts_bounds() {
        let state = SharedState::new(0.5);
        state.set_volume(0.0).await.unwrap();
        assert_eq!(state.volume().await, 0.0);
        state.set_volume(1.0).await.unwrap();
        assert_eq!(state.volume().await, 1.0);
    }

    #[tokio::test]
    async fn test_set_volume_does_not_touch_running_player() {
        let state = SharedState::new(0.5);
        let voice = FakeVoice::arc(1);
        let Claim::Start(p) = state.claim_or_enqueue(track("a"), voice).await else {
            panic!("expected start");
        };
        let player = FakePlayer::arc("a", p.volume);
        state.install_player(player.clone()).await;

        state.set_volume(0.9).await.unwrap();
        assert_eq!(player.volume(), 0.5);
    }

    #[tokio::test]
    async fn test_toggles_return_new_value() {
        let state = SharedState::new(0.5);
        assert!(state.toggle_locked().await);
        assert!(state.is_locked().await);
        assert!(!state.toggle_locked().await);
        assert!(state.toggle_annoying().await);
        assert!(!state.toggle_annoying().await);
    }

    #[tokio::test]
    async fn test_promote_requires_voice() {
        let state = SharedState::new(0.5);
        state.enqueue(track("a")).await;
        assert!(state.try_promote_next().await.is_none());
        assert_eq!(state.queue_len().await, 1);
    }

    #[tokio::test]
    async fn test_promote_is_fifo() {
        let state = SharedState::new(0.5);
        let voice = FakeVoice::arc(1);
        let Claim::Start(_) = state.claim_or_enqueue(track("first"), voice).await else {
            panic!("expected start");
        };
        let current = FakePlayer::arc("first", 0.5);
        state.install_player(current.clone()).await;

        for t in ["a", "b", "c"] {
            state.enqueue(track(t)).await;
        }

        let mut order = Vec::new();
        let mut playing = current;
        loop {
            playing.finish();
            let Some(p) = state.try_promote_next().await else { break };
            order.push(p.track.as_str().to_string());
            playing = FakePlayer::arc(p.track.as_str(), p.volume);
            state.install_player(playing.clone()).await;
        }
        assert_eq!(order, vec!["a", "b", "c"]);
        assert_eq!(state.queue_len().await, 0);
    }

    #[tokio::test]
    async fn test_promote_blocked_while_playing_or_paused() {
        let state = SharedState::new(0.5);
        let Claim::Start(_) = state.claim_or_enqueue(track("x"), FakeVoice::arc(1)).await else {
            panic!("expected start");
        };
        let player = FakePlayer::arc("x", 0.5);
        state.install_player(player.clone()).await;
        state.enqueue(track("y")).await;

        assert!(state.try_promote_next().await.is_none());
        player.pause().await.unwrap();
        assert!(state.try_promote_next().await.is_none());
        assert_eq!(state.queue_len().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_promotion_dequeues_once() {
        let state = Arc::new(SharedState::new(0.5));
        let Claim::Start(_) = state.claim_or_enqueue(track("x"), FakeVoice::arc(1)).await else {
            panic!("expected start");
        };
        let player = FakePlayer::arc("x", 0.5);
        state.install_player(player.clone()).await;
        for t in ["a", "b", "c"] {
            state.enqueue(track(t)).await;
        }
        player.finish();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let state = state.clone();
            handles.push(tokio::spawn(async move {
                state.try_promote_next().await.map(|p| p.track)
            }));
        }
        let mut won = Vec::new();
        for h in handles {
            if let Some(t) = h.await.unwrap() {
                won.push(t);
            }
        }
        assert_eq!(won, vec![track("a")]);
        assert_eq!(state.queue_len().await, 2);
        assert_eq!(state.playback().await, Playback::Starting);
    }

    #[tokio::test]
    async fn test_claim_queues_behind_active_session() {
        let state = SharedState::new(0.5);
        let voice = FakeVoice::arc(7);
        let Claim::Start(p) = state.claim_or_enqueue(track("one"), voice.clone()).await else {
            panic!("expected start");
        };
        assert_eq!(p.voice.channel(), 7);
        assert_eq!(state.voice().await.map(|v| v.channel()), Some(7));

        // Reservation alone is enough to queue the next request.
        let Claim::Queued(pos) = state.claim_or_enqueue(track("two"), voice.clone()).await else {
            panic!("expected queue");
        };
        assert_eq!(pos, 1);

        state.install_player(FakePlayer::arc("one", 0.5)).await;
        let Claim::Queued(pos) = state.claim_or_enqueue(track("three"), voice).await else {
            panic!("expected queue");
        };
        assert_eq!(pos, 2);
        assert_eq!(state.queued().await, vec![track("two"), track("three")]);
    }

    #[tokio::test]
    async fn test_abandon_frees_slot() {
        let state = SharedState::new(0.5);
        let Claim::Start(_) = state.claim_or_enqueue(track("bad"), FakeVoice::arc(1)).await else {
            panic!("expected start");
        };
        state.abandon_promotion().await;
        assert_eq!(state.playback().await, Playback::Idle);
        assert!(matches!(
            state.claim_or_enqueue(track("good"), FakeVoice::arc(1)).await,
            Claim::Start(_)
        ));
    }

    #[tokio::test]
    async fn test_take_active_player_and_clear_finished() {
        let state = SharedState::new(0.5);
        let Claim::Start(_) = state.claim_or_enqueue(track("x"), FakeVoice::arc(1)).await else {
            panic!("expected start");
        };
        let player = FakePlayer::arc("x", 0.5);
        state.install_player(player.clone()).await;

        assert!(!state.clear_finished().await);
        player.finish();
        assert_eq!(state.playback().await, Playback::Finished);
        assert!(state.take_active_player().await.is_none());
        assert!(state.clear_finished().await);
        assert_eq!(state.playback().await, Playback::Idle);
        // Voice outlives the player.
        assert!(state.voice().await.is_some());
    }

    #[tokio::test]
    async fn test_player_if_matches_playback() {
        let state = SharedState::new(0.5);
        assert!(state.player_if(Playback::Idle).await.is_none());

        let Claim::Start(_) = state.claim_or_enqueue(track("x"), FakeVoice::arc(1)).await else {
            panic!("expected start");
        };
        let player = FakePlayer::arc("x", 0.5);
        state.install_player(player.clone()).await;

        assert_eq!(state.player_if(Playback::Playing).await.unwrap().title(), "x");
        assert!(state.player_if(Playback::Paused).await.is_none());
        player.pause().await.unwrap();
        assert!(state.player_if(Playback::Playing).await.is_none());
        assert!(state.player_if(Playback::Paused).await.is_some());
    }

    #[tokio::test]
    async fn test_claim_waits_behind_queue_after_stop() {
        let state = SharedState::new(0.5);
        let Claim::Start(_) = state.claim_or_enqueue(track("a"), FakeVoice::arc(1)).await else {
            panic!("expected start");
        };
        state.install_player(FakePlayer::arc("a", 0.5)).await;
        let Claim::Queued(1) = state.claim_or_enqueue(track("b"), FakeVoice::arc(1)).await else {
            panic!("expected queued");
        };
        state.take_active_player().await.unwrap().stop().await.unwrap();

        let Claim::Queued(pos) = state.claim_or_enqueue(track("c"), FakeVoice::arc(2)).await else {
            panic!("expected queued behind b");
        };
        assert_eq!(pos, 2);
        assert_eq!(state.queued().await, vec![track("b"), track("c")]);
        // The idle slot moved to the requester's connection.
        assert_eq!(state.voice().await.unwrap().channel(), 2);
        assert_eq!(state.try_promote_next().await.unwrap().track, track("b"));
    }

    #[tokio::test]
    async fn test_swap_presence_only_reports_changes() {
        let state = SharedState::new(0.5);
        assert!(state.swap_presence("Brainpop.com").await);
        assert!(!state.swap_presence("Brainpop.com").await);
        assert!(state.swap_presence("Song").await);
        state.reset_presence().await;
        assert!(state.swap_presence("Song").await);
    }
}
