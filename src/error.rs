//! Error type shared by the whole crate

use std::fmt;
use std::path::PathBuf;

/// Errors surfaced by midifx
///
/// Decode, ordering and lateness anomalies are not errors: they are logged
/// where they happen and processing continues.
#[derive(Debug)]
pub enum MidiFxError {
    /// Control number outside 0..=127
    InvalidControlNumber(i64),
    /// Inconsistent chain or node configuration
    InvalidConfig(String),
    /// IO error
    Io(std::io::Error),
    /// A MIDI file could not be decoded
    MidiFile(String),
    /// A MIDI file could not be written
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    /// A MIDI port could not be opened or used
    MidiPort(String),
    /// A node task panicked or was cancelled outside of a shutdown
    Task(String),
}

impl fmt::Display for MidiFxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MidiFxError::InvalidControlNumber(n) => write!(
                f,
                "Control number must be an integer in (0, 127) but got {}",
                n
            ),
            MidiFxError::InvalidConfig(msg) => write!(f, "Invalid configuration: {}", msg),
            MidiFxError::Io(e) => write!(f, "IO error: {}", e),
            MidiFxError::MidiFile(msg) => write!(f, "Failed to read MIDI file: {}", msg),
            MidiFxError::Write { path, source } => {
                write!(f, "Failed to write MIDI file {}: {}", path.display(), source)
            }
            MidiFxError::MidiPort(msg) => write!(f, "MIDI port error: {}", msg),
            MidiFxError::Task(msg) => write!(f, "Node task failed: {}", msg),
        }
    }
}

impl std::error::Error for MidiFxError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MidiFxError::Io(e) => Some(e),
            MidiFxError::Write { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<std::io::Error> for MidiFxError {
    fn from(e: std::io::Error) -> Self {
        MidiFxError::Io(e)
    }
}

impl From<midly::Error> for MidiFxError {
    fn from(e: midly::Error) -> Self {
        MidiFxError::MidiFile(e.to_string())
    }
}

impl From<toml::de::Error> for MidiFxError {
    fn from(e: toml::de::Error) -> Self {
        MidiFxError::InvalidConfig(e.to_string())
    }
}

/// Result type for midifx operations
pub type Result<T> = std::result::Result<T, MidiFxError>;
