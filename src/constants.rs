//! Process-wide defaults
//!
//! Every value here can be overridden per node at construction time.

use std::time::Duration;

/// Default capacity of the queue in front of every node
pub const MAX_QUEUE_SIZE: usize = 100;

/// Programs kept when loading a MIDI file (General MIDI pianos, chromatic percussion)
pub const PROGRAMS: [u8; 10] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9];

/// Whether a freshly built node processes events
pub const DEFAULT_ENABLED: bool = true;

/// Seconds between a start message and the first note, and between the last note and the end message
pub const PADDING: f64 = 0.05;

/// Poll interval of the MIDI receive loop and the output scheduler, in seconds
pub const DEFAULT_RESOLUTION: f64 = 0.001;

/// How long a freshly opened MIDI port needs before it reliably exchanges bytes
pub const PORT_WARMUP: Duration = Duration::from_secs(2);

/// Pause before a chain is restarted after an interrupt
pub const RESTART_DELAY: Duration = Duration::from_secs(2);

/// Control numbers used for phrase boundary messages
pub mod control_numbers {
    /// 4 is also the convention for "foot pedal"
    pub const START_MESSAGE: u8 = 4;
    pub const END_MESSAGE: u8 = 4;
}
