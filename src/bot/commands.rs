//! Command parsing and the static command registry.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

/// Every command the bot understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    AnnoyingMode,
    Chat,
    Choose,
    Email,
    Hello,
    Joke,
    Lock,
    Pause,
    Playlist,
    Restart,
    Resume,
    Say,
    Source,
    Stop,
    TellCowan,
    Volume,
    YtPlay,
    /// Sound-clip shortcut: `ytplay` with a fixed URL.
    Clip(&'static str),
}

/// Sound-clip shortcuts.
const CLIPS: &[(&str, &str)] = &[
    ("airhorn", "https://www.youtube.com/watch?v=N30MkO2KcWc"),
    ("yee", "https://www.youtube.com/watch?v=q6EoRBvdVPQ"),
    ("windows", "https://www.youtube.com/watch?v=6Joyj0dmkug"),
];

/// Name → command lookup, built once at startup.
pub struct Registry {
    commands: HashMap<&'static str, Command>,
}

impl Registry {
    pub fn new() -> Self {
        let mut commands = HashMap::from([
            ("annoyingmode", Command::AnnoyingMode),
            ("chat", Command::Chat),
            ("choose", Command::Choose),
            ("email", Command::Email),
            ("hello", Command::Hello),
            ("joke", Command::Joke),
            ("lock", Command::Lock),
            ("pause", Command::Pause),
            ("playlist", Command::Playlist),
            ("restart", Command::Restart),
            ("resume", Command::Resume),
            ("say", Command::Say),
            ("source", Command::Source),
            ("stop", Command::Stop),
            ("tellcowan", Command::TellCowan),
            ("volume", Command::Volume),
            ("ytplay", Command::YtPlay),
        ]);
        for &(name, url) in CLIPS {
            commands.insert(name, Command::Clip(url));
        }
        Self { commands }
    }

    pub fn lookup(&self, name: &str) -> Option<Command> {
        self.commands.get(name).copied()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// `!name args`, `/name args` or `/name@bot args`.
static COMMAND_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^[!/]([A-Za-z]+)(?:@([A-Za-z0-9_]+))?(?:\s+(.*))?$").unwrap()
});

/// A command invocation split into name and arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Lowercased command name.
    pub name: String,
    /// Raw text after the name, trimmed.
    pub rest: String,
}

impl Invocation {
    /// Whitespace-separated arguments.
    pub fn args(&self) -> Vec<&str> {
        self.rest.split_whitespace().collect()
    }
}

/// Whether `text` is a command at all (may still be unknown or misaddressed).
pub fn is_command(text: &str) -> bool {
    text.starts_with('!') || text.starts_with('/')
}

/// Parse a command. Commands addressed to a different bot
/// (`/ytplay@otherbot`) yield `None`.
pub fn parse(text: &str, bot_username: Option<&str>) -> Option<Invocation> {
    let caps = COMMAND_RE.captures(text.trim())?;
    if let (Some(target), Some(me)) = (caps.get(2), bot_username)
        && !target.as_str().eq_ignore_ascii_case(me)
    {
        return None;
    }
    Some(Invocation {
        name: caps[1].to_lowercase(),
        rest: caps.get(3).map(|m| m.as_str().trim().to_string()).unwrap_or_default(),
    })
}
