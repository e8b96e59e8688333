//! Errors surfaced to chat users.
//!
//! Every variant renders as the short text the author sees; the dispatcher
//! prefixes it with a mention and sends it as the single reply to a rejected
//! command.

use std::fmt;

use super::mail::MailError;
use super::media::MediaError;
use super::state::StateError;

/// Why a command was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Missing or malformed arguments.
    InvalidArgument(String),
    /// Author lacks administrator capability.
    PermissionDenied(String),
    /// Playback control with no matching session.
    NotPlayable(String),
    /// A collaborator (mail, media, voice, responder) failed.
    TransportFailure(String),
    /// Text-gateway body of 160 characters or more.
    MessageTooLong,
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument(msg)
            | Self::PermissionDenied(msg)
            | Self::NotPlayable(msg)
            | Self::TransportFailure(msg) => write!(f, "{msg}"),
            Self::MessageTooLong => write!(f, "That message is too long."),
        }
    }
}

impl std::error::Error for CommandError {}

impl From<StateError> for CommandError {
    fn from(e: StateError) -> Self {
        match e {
            StateError::InvalidArgument(msg) => Self::InvalidArgument(msg),
        }
    }
}

impl From<MediaError> for CommandError {
    fn from(e: MediaError) -> Self {
        Self::TransportFailure(format!("Couldn't play that: {e}"))
    }
}

impl From<MailError> for CommandError {
    fn from(e: MailError) -> Self {
        match e {
            MailError::TooLong { .. } => Self::MessageTooLong,
            MailError::InvalidAddress(addr) => {
                Self::InvalidArgument(format!("'{addr}' is not an email address."))
            }
            other => Self::TransportFailure(other.to_string()),
        }
    }
}

pub type CommandResult = Result<(), CommandError>;
