//! Voice output through `mpv` on the bot host.
//!
//! A voice "channel" is the group chat that owns the session; joining it is
//! just bookkeeping. Each player is one `mpv` process streaming one track,
//! controlled over mpv's JSON IPC socket.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::process::Command;
use tokio::sync::{Mutex, oneshot};
use tracing::{debug, info, warn};

use super::media::{MediaError, Playable, Player, VoiceConnection, VoiceGateway};

/// mpv creates its socket shortly after launch.
const IPC_CONNECT_ATTEMPTS: u32 = 20;
const IPC_RETRY_DELAY: Duration = Duration::from_millis(100);

static NEXT_SOCKET: AtomicU64 = AtomicU64::new(0);

pub struct MpvGateway {
    binary: String,
    socket_dir: PathBuf,
}

impl MpvGateway {
    pub fn new(binary: String, socket_dir: PathBuf) -> Self {
        Self { binary, socket_dir }
    }
}

#[async_trait]
impl VoiceGateway for MpvGateway {
    async fn join(&self, channel: i64) -> Result<Arc<dyn VoiceConnection>, MediaError> {
        tokio::fs::create_dir_all(&self.socket_dir)
            .await
            .map_err(|e| MediaError::Voice(format!("{}: {e}", self.socket_dir.display())))?;
        info!("🔊 Voice session opened for chat {}", channel);
        Ok(Arc::new(MpvConnection {
            channel,
            binary: self.binary.clone(),
            socket_dir: self.socket_dir.clone(),
        }))
    }
}

pub struct MpvConnection {
    channel: i64,
    binary: String,
    socket_dir: PathBuf,
}

#[async_trait]
impl VoiceConnection for MpvConnection {
    fn channel(&self) -> i64 {
        self.channel
    }

    async fn create_player(
        &self,
        playable: Playable,
        volume: f32,
    ) -> Result<Arc<dyn Player>, MediaError> {
        let id = NEXT_SOCKET.fetch_add(1, Ordering::Relaxed);
        let socket = self.socket_dir.join(format!("mpv-{}-{}.sock", self.channel, id));
        debug!("New player for '{}' from {}", playable.title, playable.source);
        Ok(Arc::new(MpvPlayer {
            title: playable.title,
            stream_url: playable.stream_url,
            volume,
            binary: self.binary.clone(),
            socket,
            started: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            done: Arc::new(AtomicBool::new(false)),
            kill: Mutex::new(None),
        }))
    }
}

pub struct MpvPlayer {
    title: String,
    stream_url: String,
    volume: f32,
    binary: String,
    socket: PathBuf,
    started: AtomicBool,
    paused: AtomicBool,
    /// Set by the reaper task when mpv exits.
    done: Arc<AtomicBool>,
    kill: Mutex<Option<oneshot::Sender<()>>>,
}

impl MpvPlayer {
    async fn set_pause(&self, pause: bool) -> Result<(), MediaError> {
        if self.is_done() {
            return Err(MediaError::Process("player already finished".to_string()));
        }
        ipc(&self.socket, json!(["set_property", "pause", pause])).await?;
        self.paused.store(pause, Ordering::SeqCst);
        Ok(())
    }
}

/// mpv takes volume on a 0-100 scale.
fn mpv_volume(volume: f32) -> u32 {
    (volume.clamp(0.0, 1.0) * 100.0).round() as u32
}

#[async_trait]
impl Player for MpvPlayer {
    fn title(&self) -> &str {
        &self.title
    }

    fn is_done(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }

    fn is_playing(&self) -> bool {
        self.started.load(Ordering::SeqCst)
            && !self.paused.load(Ordering::SeqCst)
            && !self.is_done()
    }

    fn volume(&self) -> f32 {
        self.volume
    }

    async fn start(&self) -> Result<(), MediaError> {
        let mut kill = self.kill.lock().await;
        if self.started.load(Ordering::SeqCst) {
            return Ok(());
        }
        if self.is_done() {
            return Err(MediaError::Process("player was stopped".to_string()));
        }

        let mut child = Command::new(&self.binary)
            .arg("--no-video")
            .arg("--no-terminal")
            .arg(format!("--volume={}", mpv_volume(self.volume)))
            .arg(format!("--input-ipc-server={}", self.socket.display()))
            .arg("--")
            .arg(&self.stream_url)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| MediaError::Process(format!("failed to run {}: {e}", self.binary)))?;

        let (kill_tx, kill_rx) = oneshot::channel();
        let done = self.done.clone();
        let title = self.title.clone();
        let socket = self.socket.clone();
        tokio::spawn(async move {
            tokio::select! {
                status = child.wait() => match status {
                    Ok(status) => debug!("mpv for '{}' exited: {}", title, status),
                    Err(e) => warn!("Failed to wait for mpv: {}", e),
                },
                _ = kill_rx => {
                    if let Err(e) = child.kill().await {
                        warn!("Failed to kill mpv: {}", e);
                    }
                }
            }
            done.store(true, Ordering::SeqCst);
            let _ = tokio::fs::remove_file(&socket).await;
        });

        *kill = Some(kill_tx);
        self.started.store(true, Ordering::SeqCst);
        info!("▶️ mpv playing '{}' at volume {}", self.title, mpv_volume(self.volume));
        Ok(())
    }

    async fn pause(&self) -> Result<(), MediaError> {
        self.set_pause(true).await
    }

    async fn resume(&self) -> Result<(), MediaError> {
        self.set_pause(false).await
    }

    async fn stop(&self) -> Result<(), MediaError> {
        self.done.store(true, Ordering::SeqCst);
        if let Some(kill) = self.kill.lock().await.take() {
            // The reaper may already have seen mpv exit.
            let _ = kill.send(());
        }
        Ok(())
    }
}

/// Send one IPC command and wait for its reply.
async fn ipc(socket: &Path, command: Value) -> Result<(), MediaError> {
    let mut stream = connect(socket).await?;
    let mut line = ipc_line(command);
    line.push('\n');
    stream
        .write_all(line.as_bytes())
        .await
        .map_err(|e| MediaError::Process(format!("mpv IPC write: {e}")))?;

    let mut lines = BufReader::new(stream).lines();
    while let Some(reply) = lines
        .next_line()
        .await
        .map_err(|e| MediaError::Process(format!("mpv IPC read: {e}")))?
    {
        // Events share the socket; the reply is the line with an "error" field.
        let Ok(reply) = serde_json::from_str::<Value>(&reply) else {
            continue;
        };
        if let Some(status) = reply.get("error").and_then(Value::as_str) {
            return if status == "success" {
                Ok(())
            } else {
                Err(MediaError::Process(format!("mpv IPC: {status}")))
            };
        }
    }
    Err(MediaError::Process("mpv IPC closed without reply".to_string()))
}

async fn connect(socket: &Path) -> Result<UnixStream, MediaError> {
    let mut last_error = None;
    for _ in 0..IPC_CONNECT_ATTEMPTS {
        match UnixStream::connect(socket).await {
            Ok(stream) => return Ok(stream),
            Err(e) => last_error = Some(e),
        }
        tokio::time::sleep(IPC_RETRY_DELAY).await;
    }
    Err(MediaError::Process(format!(
        "mpv IPC socket {} unavailable: {}",
        socket.display(),
        last_error.map(|e| e.to_string()).unwrap_or_default()
    )))
}

fn ipc_line(command: Value) -> String {
    json!({ "command": command }).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn playable() -> Playable {
        Playable {
            title: "Airhorn".to_string(),
            stream_url: "https://stream.example/airhorn".to_string(),
            source: "airhorn".to_string(),
        }
    }

    #[test]
    fn test_ipc_line() {
        assert_eq!(
            ipc_line(json!(["set_property", "pause", true])),
            r#"{"command":["set_property","pause",true]}"#
        );
    }

    #[test]
    fn test_mpv_volume_scale() {
        assert_eq!(mpv_volume(0.5), 50);
        assert_eq!(mpv_volume(0.07), 7);
        assert_eq!(mpv_volume(1.5), 100);
    }

    #[tokio::test]
    async fn test_join_keeps_channel() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = MpvGateway::new("mpv".to_string(), dir.path().join("sockets"));
        let voice = gateway.join(-1001).await.unwrap();
        assert_eq!(voice.channel(), -1001);
        assert!(dir.path().join("sockets").is_dir());
    }

    #[tokio::test]
    async fn test_missing_binary_fails_start() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = MpvGateway::new("/nonexistent/mpv".to_string(), dir.path().to_path_buf());
        let voice = gateway.join(1).await.unwrap();
        let player = voice.create_player(playable(), 0.5).await.unwrap();

        assert!(matches!(player.start().await, Err(MediaError::Process(_))));
        assert!(!player.is_playing());
        assert!(!player.is_done());
    }

    #[tokio::test]
    async fn test_stop_before_start_is_done() {
        let dir = tempfile::tempdir().unwrap();
        let voice = MpvGateway::new("mpv".to_string(), dir.path().to_path_buf())
            .join(1)
            .await
            .unwrap();
        let player = voice.create_player(playable(), 0.5).await.unwrap();
        player.stop().await.unwrap();
        assert!(player.is_done());
        assert!(player.pause().await.is_err());
    }
}
