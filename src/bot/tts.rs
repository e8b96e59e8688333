//! Spoken jokes: text-to-speech through a Fish Speech compatible server.
//!
//! The server returns WAV; Telegram voice messages want OGG Opus, so the
//! audio is piped through `ffmpeg` before sending.

use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

/// Reference voice on the speech server.
const VOICE: &str = "xtts_female";

pub struct TtsClient {
    endpoint: String,
    client: reqwest::Client,
}

impl TtsClient {
    /// `endpoint` is the server base URL, e.g. `http://localhost:8880`.
    pub fn new(endpoint: String) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn tts_url(&self) -> String {
        format!("{}/v1/tts", self.endpoint)
    }

    /// OGG Opus audio for `text`.
    pub async fn synthesize(&self, text: &str) -> Result<Vec<u8>, String> {
        let preview: String = text.chars().take(50).collect();
        info!("TTS: \"{}\"", preview);

        let response = self
            .client
            .post(self.tts_url())
            .json(&serde_json::json!({
                "text": text,
                "format": "wav",
                "reference_id": VOICE,
            }))
            .send()
            .await
            .map_err(|e| format!("TTS request failed: {e}"))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(format!("TTS error {status}: {body}"));
        }

        let wav = response
            .bytes()
            .await
            .map_err(|e| format!("Failed to read TTS response: {e}"))?;
        debug!("Got {} bytes of WAV audio", wav.len());

        wav_to_ogg(wav.to_vec()).await
    }
}

/// Transcode through `ffmpeg` over pipes, with 300ms of leading silence
/// (Telegram clips the start of voice messages).
async fn wav_to_ogg(wav: Vec<u8>) -> Result<Vec<u8>, String> {
    let mut child = Command::new("ffmpeg")
        .args([
            "-hide_banner", "-loglevel", "error",
            "-f", "lavfi", "-i", "anullsrc=r=44100:cl=mono",
            "-i", "pipe:0",
            "-filter_complex", "[0]atrim=0:0.3[silence];[silence][1:a]concat=n=2:v=0:a=1",
            "-c:a", "libopus", "-b:a", "64k",
            "-f", "ogg", "pipe:1",
        ])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| format!("Failed to run ffmpeg: {e}"))?;

    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| "ffmpeg stdin unavailable".to_string())?;
    let writer = tokio::spawn(async move {
        // ffmpeg may close its input early on bad audio; the exit status reports it.
        let _ = stdin.write_all(&wav).await;
    });

    let output = child
        .wait_with_output()
        .await
        .map_err(|e| format!("ffmpeg failed: {e}"))?;
    let _ = writer.await;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!("ffmpeg conversion failed: {}", stderr.trim()));
    }
    debug!("Converted to {} bytes of OGG", output.stdout.len());
    Ok(output.stdout)
}
