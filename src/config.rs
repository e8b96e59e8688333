use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Keys written to a fresh settings file, with their defaults.
const TEMPLATE: &[(&str, &str)] = &[
    ("chat_bot_name", "Moby"),
    ("bot_token", ""),
    ("email_username", ""),
    ("email_password", ""),
    ("email_address", ""),
    ("email_smtp", ""),
    ("email_port", "587"),
    ("cowan_text_gateway", ""),
    ("client_email", ""),
    ("client_password", ""),
    ("owner_ids", ""),
    ("anthropic_api_key", ""),
    ("tts_endpoint", ""),
    ("jokes_path", "jokes.json"),
    ("data_dir", "."),
    ("default_volume", "50"),
    ("jukebox_interval_ms", "1000"),
    ("idle_presence", "Brainpop.com"),
    ("source_url", "https://github.com/patthomasrick/moby-bot"),
    ("ytdlp_path", "yt-dlp"),
    ("mpv_path", "mpv"),
];

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read (or create) the settings file.
    ReadFile { path: PathBuf, source: std::io::Error },
    /// The file was missing and a template has been written in its place.
    Created { path: PathBuf },
    /// A non-blank, non-comment line without `=`.
    Parse { path: PathBuf, line: usize },
    /// Validation error.
    Validation(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFile { path, source } => {
                write!(f, "failed to read settings file '{}': {}", path.display(), source)
            }
            Self::Created { path } => {
                write!(f, "created settings template '{}'", path.display())
            }
            Self::Parse { path, line } => {
                write!(f, "{}:{}: expected key=value", path.display(), line)
            }
            Self::Validation(msg) => write!(f, "config validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ReadFile { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// SMTP account used by `email` and `tellcowan`.
#[derive(Debug, Clone)]
pub struct EmailSettings {
    pub username: String,
    pub password: String,
    /// Sender address.
    pub address: String,
    pub smtp_host: String,
    pub smtp_port: u16,
}

pub struct Config {
    pub bot_name: String,
    pub bot_token: String,
    /// Administrators in every chat.
    pub owner_ids: Vec<i64>,
    /// `None` unless `email_smtp` is set.
    pub email: Option<EmailSettings>,
    pub cowan_text_gateway: Option<String>,
    pub anthropic_api_key: Option<String>,
    /// Fish Speech server for spoken jokes (e.g., "http://localhost:8880").
    pub tts_endpoint: Option<String>,
    pub jokes_path: PathBuf,
    /// Directory for state files (logs, mpv sockets).
    pub data_dir: PathBuf,
    /// Initial playback volume in `[0.01, 1.0]`.
    pub default_volume: f32,
    pub jukebox_interval: Duration,
    pub idle_presence: String,
    pub source_url: String,
    pub ytdlp_path: String,
    pub mpv_path: String,
    /// Non-fatal problems, logged once tracing is up.
    pub warnings: Vec<String>,
}

impl Config {
    /// Load `key=value` settings. A missing file is replaced by a template
    /// and reported as [`ConfigError::Created`].
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref().to_path_buf();
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                write_template(&path)?;
                return Err(ConfigError::Created { path });
            }
            Err(e) => return Err(ConfigError::ReadFile { path, source: e }),
        };
        let values = parse(&content).map_err(|line| ConfigError::Parse { path, line })?;
        Self::from_values(values)
    }

    fn from_values(mut values: HashMap<String, String>) -> Result<Self, ConfigError> {
        let mut take = |key: &str| values.remove(key).filter(|v| !v.is_empty());
        let mut warnings = Vec::new();

        let bot_token = take("bot_token")
            .ok_or_else(|| ConfigError::Validation("bot_token is required".into()))?;
        // Telegram tokens are formatted as {bot_id}:{secret} where bot_id is numeric
        let token_parts: Vec<&str> = bot_token.split(':').collect();
        if token_parts.len() != 2 || token_parts[0].parse::<u64>().is_err() || token_parts[1].is_empty() {
            return Err(ConfigError::Validation(
                "bot_token appears invalid (expected format: 123456789:ABCdefGHI...)".into(),
            ));
        }

        let owner_ids = match take("owner_ids") {
            Some(ids) => ids
                .split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(|id| {
                    id.parse::<i64>().map_err(|_| {
                        ConfigError::Validation(format!("owner_ids: '{id}' is not a user id"))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };

        let smtp_port = match take("email_port") {
            Some(port) => port.parse::<u16>().map_err(|_| {
                ConfigError::Validation(format!("email_port: '{port}' is not a port number"))
            })?,
            None => 587,
        };
        let username = take("email_username").unwrap_or_default();
        let password = take("email_password").unwrap_or_default();
        let address = take("email_address").unwrap_or_default();
        let email = take("email_smtp").map(|smtp_host| EmailSettings {
            username,
            password,
            address,
            smtp_host,
            smtp_port,
        });
        if let Some(email) = &email
            && email.address.is_empty()
        {
            return Err(ConfigError::Validation(
                "email_address is required when email_smtp is set".into(),
            ));
        }

        let default_volume = match take("default_volume") {
            Some(v) => match v.parse::<u32>() {
                Ok(n) if (1..=100).contains(&n) => n as f32 / 100.0,
                _ => {
                    return Err(ConfigError::Validation(format!(
                        "default_volume must be between 1 and 100, got '{v}'"
                    )));
                }
            },
            None => 0.5,
        };

        let jukebox_interval = match take("jukebox_interval_ms") {
            Some(ms) => match ms.parse::<u64>() {
                Ok(n) if n > 0 => Duration::from_millis(n),
                _ => {
                    return Err(ConfigError::Validation(format!(
                        "jukebox_interval_ms must be a positive number, got '{ms}'"
                    )));
                }
            },
            None => Duration::from_secs(1),
        };

        for key in ["client_email", "client_password"] {
            if take(key).is_some() {
                warnings.push(format!("{key} is a legacy account login and is ignored"));
            }
        }

        let mut config = Self {
            bot_name: take("chat_bot_name").unwrap_or_else(|| "Moby".to_string()),
            bot_token,
            owner_ids,
            email,
            cowan_text_gateway: take("cowan_text_gateway"),
            anthropic_api_key: take("anthropic_api_key"),
            tts_endpoint: take("tts_endpoint"),
            jokes_path: take("jokes_path").map(PathBuf::from).unwrap_or_else(|| "jokes.json".into()),
            data_dir: take("data_dir").map(PathBuf::from).unwrap_or_else(|| ".".into()),
            default_volume,
            jukebox_interval,
            idle_presence: take("idle_presence").unwrap_or_else(|| "Brainpop.com".to_string()),
            source_url: take("source_url")
                .unwrap_or_else(|| "https://github.com/patthomasrick/moby-bot".to_string()),
            ytdlp_path: take("ytdlp_path").unwrap_or_else(|| "yt-dlp".to_string()),
            mpv_path: take("mpv_path").unwrap_or_else(|| "mpv".to_string()),
            warnings,
        };

        let mut unknown: Vec<_> = values.into_keys().collect();
        unknown.sort();
        config
            .warnings
            .extend(unknown.into_iter().map(|key| format!("unknown setting '{key}' ignored")));
        Ok(config)
    }

    /// The text-gateway address, when texting is possible at all.
    pub fn text_gateway(&self) -> Option<&str> {
        self.email.as_ref().and(self.cowan_text_gateway.as_deref())
    }
}

/// Split at the first `=`; blank lines and `#` comments are skipped.
/// On failure returns the 1-based line number.
fn parse(content: &str) -> Result<HashMap<String, String>, usize> {
    let mut values = HashMap::new();
    for (i, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (key, value) = line.split_once('=').ok_or(i + 1)?;
        values.insert(key.trim().to_string(), value.trim().to_string());
    }
    Ok(values)
}

fn write_template(path: &Path) -> Result<(), ConfigError> {
    let content: String = TEMPLATE.iter().map(|(k, v)| format!("{k}={v}\n")).collect();
    std::fs::write(path, content)
        .map_err(|e| ConfigError::ReadFile { path: path.to_path_buf(), source: e })
}
