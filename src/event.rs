//! Timestamped performance events and their wire encoding
//!
//! Three kinds of events flow through a chain:
//! - [`Note`]: a complete note (note-on and note-off folded into one event with a duration)
//! - [`ControlChange`]: a `(number, value)` pair, used both musically and to steer parameters
//! - [`SystemMessage`]: passed through opaquely
//!
//! Queues order events by `start` only; see [`crate::queue`].

use std::fmt;

/// Status nibble of a note-off message, channel 0
pub const NOTE_OFF: u8 = 0x80;
/// Status nibble of a note-on message, channel 0
pub const NOTE_ON: u8 = 0x90;
/// Status nibble of a control change message, channel 0
pub const CONTROL_CHANGE: u8 = 0xB0;
/// Status nibble of a system message
pub const SYSTEM_MESSAGE: u8 = 0xF0;

/// A note with a known duration
///
/// `pitch` and `velocity` are kept as signed integers: effects may push them
/// past the MIDI range before a clipping stage brings them back.
#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    /// Start time in seconds
    pub start: f64,
    /// Note number, nominally 0-127
    pub pitch: i32,
    /// Velocity, nominally 0-127
    pub velocity: i32,
    /// Duration in seconds
    pub duration: f64,
    /// Time since the previous note of the same source (informational)
    pub ioi: f64,
    /// Channel (0-15)
    pub channel: u8,
}

impl Note {
    pub fn new(start: f64, pitch: i32, velocity: i32, duration: f64) -> Self {
        Self {
            start,
            pitch,
            velocity,
            duration,
            ioi: 0.0,
            channel: 0,
        }
    }

    pub fn with_channel(mut self, channel: u8) -> Self {
        self.channel = channel;
        self
    }
}

/// Control change message
#[derive(Debug, Clone, PartialEq)]
pub struct ControlChange {
    pub start: f64,
    pub number: u8,
    pub value: u8,
    pub channel: u8,
}

impl ControlChange {
    pub fn new(start: f64, number: u8, value: u8) -> Self {
        Self {
            start,
            number,
            value,
            channel: 0,
        }
    }

    /// Same message, moved to `start`
    pub fn at(&self, start: f64) -> Self {
        Self {
            start,
            ..self.clone()
        }
    }

    /// Whether `other` carries the same control number and value
    pub fn matches(&self, other: &ControlChange) -> bool {
        self.number == other.number && self.value == other.value
    }
}

/// System message, identified by the low nibble of its status byte
#[derive(Debug, Clone, PartialEq)]
pub struct SystemMessage {
    pub start: f64,
    pub number: u8,
}

/// Any event that can travel through a chain
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Note(Note),
    ControlChange(ControlChange),
    System(SystemMessage),
}

impl Event {
    /// Start time in seconds
    pub fn start(&self) -> f64 {
        match self {
            Event::Note(note) => note.start,
            Event::ControlChange(cc) => cc.start,
            Event::System(msg) => msg.start,
        }
    }

    /// Move the event by `delta` seconds
    pub fn shift(&mut self, delta: f64) {
        match self {
            Event::Note(note) => note.start += delta,
            Event::ControlChange(cc) => cc.start += delta,
            Event::System(msg) => msg.start += delta,
        }
    }

    /// Channel, for the event kinds that carry one
    pub fn channel(&self) -> Option<u8> {
        match self {
            Event::Note(note) => Some(note.channel),
            Event::ControlChange(cc) => Some(cc.channel),
            Event::System(_) => None,
        }
    }

    /// Replace the channel; no-op for system messages
    pub fn set_channel(&mut self, channel: u8) {
        match self {
            Event::Note(note) => note.channel = channel,
            Event::ControlChange(cc) => cc.channel = channel,
            Event::System(_) => {}
        }
    }

    pub fn as_control_change(&self) -> Option<&ControlChange> {
        match self {
            Event::ControlChange(cc) => Some(cc),
            _ => None,
        }
    }

    pub fn is_note(&self) -> bool {
        matches!(self, Event::Note(_))
    }

    /// Convert to raw MIDI messages, each with its own due time
    ///
    /// A note becomes a note-on at `start` and a note-off at `start + duration`.
    /// Data bytes are clamped into the 7-bit range.
    pub fn to_raw(&self) -> Vec<RawMessage> {
        match self {
            Event::Note(note) => {
                let status_channel = note.channel & 0x0F;
                let pitch = data_byte(note.pitch);
                let velocity = data_byte(note.velocity);
                vec![
                    RawMessage {
                        due: note.start,
                        bytes: vec![NOTE_ON | status_channel, pitch, velocity],
                    },
                    RawMessage {
                        due: note.start + note.duration,
                        bytes: vec![NOTE_OFF | status_channel, pitch, velocity],
                    },
                ]
            }
            Event::ControlChange(cc) => vec![RawMessage {
                due: cc.start,
                bytes: vec![
                    CONTROL_CHANGE | (cc.channel & 0x0F),
                    cc.number & 0x7F,
                    cc.value & 0x7F,
                ],
            }],
            Event::System(msg) => vec![RawMessage {
                due: msg.start,
                bytes: vec![SYSTEM_MESSAGE | (msg.number & 0x0F)],
            }],
        }
    }
}

impl From<Note> for Event {
    fn from(note: Note) -> Self {
        Event::Note(note)
    }
}

impl From<ControlChange> for Event {
    fn from(cc: ControlChange) -> Self {
        Event::ControlChange(cc)
    }
}

impl From<SystemMessage> for Event {
    fn from(msg: SystemMessage) -> Self {
        Event::System(msg)
    }
}

/// Seconds within the current day, which keeps wall-clock timestamps readable in logs
fn time_of_day(t: f64) -> f64 {
    if t > 0.0 {
        t % 86400.0
    } else {
        t
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Note(n) => write!(
                f,
                "Note(start={:.3}, pitch={}, velocity={}, duration={:.3}, ioi={:.3}, channel={})",
                time_of_day(n.start),
                n.pitch,
                n.velocity,
                n.duration,
                n.ioi,
                n.channel
            ),
            Event::ControlChange(cc) => write!(
                f,
                "ControlChange(start={:.3}, number={}, value={}, channel={})",
                time_of_day(cc.start),
                cc.number,
                cc.value,
                cc.channel
            ),
            Event::System(msg) => write!(
                f,
                "SystemMessage(start={:.3}, number={})",
                time_of_day(msg.start),
                msg.number
            ),
        }
    }
}

fn data_byte(value: i32) -> u8 {
    value.clamp(0, 127) as u8
}

/// Wire bytes with the instant they must be transmitted
#[derive(Debug, Clone, PartialEq)]
pub struct RawMessage {
    /// Due time in seconds
    pub due: f64,
    pub bytes: Vec<u8>,
}
