//! Jukebox: the background task that advances the playback queue.
//!
//! Each tick looks at the shared state once and does at most one of:
//! publish the idle presence, promote the next queued track, or nothing.
//! Ticks run in their own task so a failing collaborator only costs that
//! tick.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::media::{MediaError, MediaResolver, Player};
use super::shutdown::Shutdown;
use super::sink::ChatSink;
use super::state::{Playback, Promotion, SharedState};

/// What a tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing queued, nothing playing.
    Idle,
    /// Started the next track; carries its title.
    Promoted(String),
    /// The promoted track could not be started and was dropped.
    Skipped(String),
    /// A session is running or starting, or queued tracks have no voice connection.
    Waiting,
}

pub struct Jukebox {
    state: Arc<SharedState>,
    sink: Arc<dyn ChatSink>,
    resolver: Arc<dyn MediaResolver>,
    idle_presence: String,
    interval: Duration,
}

impl Jukebox {
    pub fn new(
        state: Arc<SharedState>,
        sink: Arc<dyn ChatSink>,
        resolver: Arc<dyn MediaResolver>,
        idle_presence: String,
        interval: Duration,
    ) -> Self {
        Self { state, sink, resolver, idle_presence, interval }
    }

    /// Start the loop. It runs until `shutdown` fires.
    pub fn spawn(self, shutdown: Shutdown) -> JoinHandle<()> {
        tokio::spawn(Arc::new(self).run(shutdown))
    }

    async fn run(self: Arc<Self>, shutdown: Shutdown) {
        info!("🎵 Jukebox started (every {:?})", self.interval);
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately; sleep a full period before acting.
        interval.tick().await;

        loop {
            tokio::select! {
                biased;

                _ = shutdown.wait() => break,
                _ = interval.tick() => {
                    let this = self.clone();
                    let mut tick = tokio::spawn(async move { this.tick().await });
                    // A tick may be stuck resolving; shutdown must not wait on it.
                    tokio::select! {
                        biased;

                        _ = shutdown.wait() => {
                            tick.abort();
                            break;
                        }
                        joined = &mut tick => match joined {
                            Ok(outcome) => debug!("Jukebox tick: {:?}", outcome),
                            Err(e) => error!("Jukebox tick failed: {}", e),
                        },
                    }
                }
            }
        }
        info!("🎵 Jukebox stopped");
    }

    /// One poll of the queue.
    pub async fn tick(&self) -> TickOutcome {
        let (queue_len, playback) = self.state.poll().await;
        match playback {
            Playback::Idle | Playback::Finished if queue_len == 0 => {
                if self.state.clear_finished().await {
                    info!("⏹️ Queue finished");
                }
                publish_presence(&self.state, self.sink.as_ref(), &self.idle_presence).await;
                TickOutcome::Idle
            }
            // After `stop` the slot is idle with tracks still waiting.
            Playback::Idle | Playback::Finished => self.promote().await,
            _ => TickOutcome::Waiting,
        }
    }

    async fn promote(&self) -> TickOutcome {
        let Some(promotion) = self.state.try_promote_next().await else {
            return TickOutcome::Waiting;
        };
        let channel = promotion.voice.channel();
        let track = promotion.track.clone();

        match start_track(&self.state, self.resolver.as_ref(), promotion).await {
            Ok(player) => {
                let title = player.title().to_string();
                let text = format!("Now playing - {title}.");
                if let Err(e) = self.sink.send_message(channel, &text, false).await {
                    warn!("Failed to announce track: {}", e);
                }
                publish_presence(&self.state, self.sink.as_ref(), &title).await;
                TickOutcome::Promoted(title)
            }
            Err(e) => {
                warn!("Skipping queued track {}: {}", track, e);
                let text = format!("Couldn't play <{track}>: {e}");
                if let Err(e) = self.sink.send_message(channel, &text, false).await {
                    warn!("Failed to report skipped track: {}", e);
                }
                TickOutcome::Skipped(track.to_string())
            }
        }
    }
}

/// Resolve, create and start the reserved track, then install it.
///
/// On any failure the reservation is released and the error returned.
pub async fn start_track(
    state: &SharedState,
    resolver: &dyn MediaResolver,
    promotion: Promotion,
) -> Result<Arc<dyn Player>, MediaError> {
    let started = async {
        let playable = resolver.resolve(&promotion.track).await?;
        let player = promotion.voice.create_player(playable, promotion.volume).await?;
        player.start().await?;
        Ok::<_, MediaError>(player)
    }
    .await;

    match started {
        Ok(player) => {
            state.install_player(player.clone()).await;
            Ok(player)
        }
        Err(e) => {
            state.abandon_promotion().await;
            Err(e)
        }
    }
}

/// Publish `text` as presence unless it is already showing.
pub async fn publish_presence(state: &SharedState, sink: &dyn ChatSink, text: &str) {
    if !state.swap_presence(text).await {
        return;
    }
    if let Err(e) = sink.set_presence(text).await {
        warn!("Failed to set presence: {}", e);
        // Retry on the next publish.
        state.reset_presence().await;
    }
}
