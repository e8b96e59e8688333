//! Track resolution through the `yt-dlp` command line tool.

use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, info};

use super::media::{MediaError, MediaResolver, Playable, Track};

/// Subset of `yt-dlp --dump-single-json` output. Searches come back as a
/// playlist whose `entries` hold the hits.
#[derive(Debug, Deserialize)]
struct Info {
    title: Option<String>,
    /// Direct stream URL of the selected format.
    url: Option<String>,
    webpage_url: Option<String>,
    #[serde(default)]
    entries: Vec<Info>,
}

pub struct YtDlpResolver {
    binary: String,
}

impl YtDlpResolver {
    pub fn new(binary: String) -> Self {
        Self { binary }
    }
}

#[async_trait]
impl MediaResolver for YtDlpResolver {
    async fn resolve(&self, track: &Track) -> Result<Playable, MediaError> {
        debug!("Resolving {} with {}", track, self.binary);
        let output = Command::new(&self.binary)
            .args([
                "--dump-single-json",
                "--no-playlist",
                "--no-warnings",
                "--format", "bestaudio/best",
                "--default-search", "auto",
                "--",
                track.as_str(),
            ])
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| MediaError::Process(format!("failed to run {}: {e}", self.binary)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!("yt-dlp failed for {}: {}", track, stderr.trim());
            return Err(MediaError::NotFound(track.to_string()));
        }

        let playable = parse_info(&output.stdout, track)?;
        info!("🔎 Resolved {} → {}", track, playable.title);
        Ok(playable)
    }
}

fn parse_info(json: &[u8], track: &Track) -> Result<Playable, MediaError> {
    let info: Info =
        serde_json::from_slice(json).map_err(|e| MediaError::Parse(e.to_string()))?;
    let info = if info.url.is_none() {
        info.entries
            .into_iter()
            .find(|entry| entry.url.is_some())
            .ok_or_else(|| MediaError::NotFound(track.to_string()))?
    } else {
        info
    };

    let stream_url = info.url.unwrap_or_default();
    Ok(Playable {
        title: info.title.unwrap_or_else(|| track.to_string()),
        source: info.webpage_url.unwrap_or_else(|| track.to_string()),
        stream_url,
    })
}
