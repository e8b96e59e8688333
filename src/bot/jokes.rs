//! Joke file: a JSON array of `{"body": "..."}` objects.

use std::path::Path;

use rand::seq::IndexedRandom;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct Joke {
    #[serde(default)]
    body: String,
}

pub struct JokeBook {
    jokes: Vec<String>,
}

impl JokeBook {
    /// Read the joke file. Re-read on every `joke` so edits apply live.
    pub async fn load(path: &Path) -> Result<Self, String> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("failed to read '{}': {e}", path.display()))?;
        Self::parse(&content).map_err(|e| format!("failed to parse '{}': {e}", path.display()))
    }

    fn parse(content: &str) -> Result<Self, serde_json::Error> {
        let jokes: Vec<Joke> = serde_json::from_str(content)?;
        let jokes = jokes
            .into_iter()
            .map(|j| j.body.trim().to_string())
            .filter(|b| !b.is_empty())
            .collect();
        Ok(Self { jokes })
    }

    /// A random non-blank joke.
    pub fn pick(&self) -> Option<&str> {
        self.jokes.choose(&mut rand::rng()).map(String::as_str)
    }
}
