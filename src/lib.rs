//! # midifx - MIDI effect chains
//!
//! midifx runs MIDI events through a chain of concurrently running nodes.
//! Every node owns a bounded, timestamp-ordered input queue and forwards
//! what it produces to the queues of the nodes after it. A chain can be
//! looped so its output feeds back into its input.
//!
//! ## Core Features
//!
//! - **Live and file I/O**: read from MIDI ports or Standard MIDI Files, send to ports
//! - **Output scheduling**: events carry absolute times and go out when they fall due
//! - **Modulated parameters**: effect parameters follow control changes, linearly or at random
//! - **Feedback**: looped chains with phrase buffering
//! - **Logging**: everything that passes a logger is written to a MIDI file on shutdown
//!
//! ## Quick Start
//!
//! ```no_run
//! use midifx::{Chain, Effect, EventLog, Node, Parameter, PitchShift, ReceiveMidi, SendMidi};
//!
//! # async fn run() -> midifx::Result<()> {
//! let nodes: Vec<Box<dyn Node>> = vec![
//!     Box::new(ReceiveMidi::open("MidiFX in")?),
//!     Box::new(Effect::new(PitchShift::new(Parameter::constant(7.0)))),
//!     Box::new(SendMidi::open("MidiFX out")?),
//! ];
//! let outcome = Chain::new(nodes, false)?.run().await?;
//! println!("{:?}", outcome);
//! # Ok(())
//! # }
//! ```
//!
//! Chains can also be described in TOML, see [`config`].

pub mod chain;
pub mod clock;
pub mod config;
pub mod constants;
pub mod demo;
pub mod error;
pub mod event;
pub mod logger;
pub mod midi_file;
pub mod midi_input;
pub mod midi_output;
pub mod node;
pub mod nodes;
pub mod parameter;
pub mod parser;
pub mod pulse;
pub mod queue;

pub use chain::{run_with_restart, Chain, RestartPolicy, RunOutcome};
pub use config::ChainConfig;
pub use error::{MidiFxError, Result};
pub use event::{ControlChange, Event, Note, RawMessage, SystemMessage};
pub use logger::{EventLog, MidiLogger};
pub use midi_file::{write_midi, ReadMidi, ReadOptions};
pub use midi_input::ReceiveMidi;
pub use midi_output::SendMidi;
pub use node::{Completion, Effect, Node, Processor};
pub use nodes::{BufferDelay, Delay, Dropout, Mirror, PitchShift, VelocityShift};
pub use parameter::Parameter;
pub use parser::NoteParser;
pub use pulse::SendPulse;
pub use queue::{EventQueue, PriorityQueue};
