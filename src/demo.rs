//! Generative feedback demo
//!
//! A phrase is read from a MIDI file, pushed through a set of effects whose
//! parameters are rerolled at the start of every phrase, buffered until the
//! phrase ends, and fed back into the top of the chain. Every pass through
//! the loop varies the phrase a little further.

use crate::chain::Chain;
use crate::constants::control_numbers;
use crate::error::Result;
use crate::event::ControlChange;
use crate::logger::{EventLog, MidiLogger};
use crate::midi_file::{ReadMidi, ReadOptions};
use crate::midi_output::SendMidi;
use crate::node::{Effect, Node};
use crate::nodes::{BufferDelay, Delay, Mirror, PitchShift, VelocityShift};
use crate::parameter::Parameter;
use std::path::PathBuf;

/// Marks the start of a phrase and rerolls every random parameter
pub fn phrase_start() -> ControlChange {
    ControlChange::new(0.0, control_numbers::START_MESSAGE, 120)
}

/// Marks the end of a phrase and releases the buffer
pub fn phrase_end() -> ControlChange {
    ControlChange::new(0.0, control_numbers::END_MESSAGE, 0)
}

#[derive(Clone, Debug, Default)]
pub struct DemoOptions {
    /// MIDI file with the seed phrase
    pub in_path: PathBuf,
    /// Output port name; nothing is sent when unset
    pub send: Option<String>,
    /// Where the log is written; nothing is logged when unset
    pub out_dir: Option<PathBuf>,
    /// Stop after logging this many events
    pub max_out: Option<usize>,
}

/// Build the looped demo chain
pub fn build_demo(options: &DemoOptions, log: &EventLog) -> Result<Chain> {
    let control = Some(i64::from(control_numbers::START_MESSAGE));

    let pitch = Parameter::random("Pitch shift", Some(0.0), control, -5.0, 5.0)?;
    let velocity = Parameter::random("Velocity shift", Some(0.0), control, -0.5, 0.5)?;
    let mirror_on = Parameter::random_switch("Mirror (on/off)", false, control, 0.2)?;
    let gap = Parameter::exponential_random("Gap (s)", None, control, 0.5, 0.0, 128.0)?;

    let read_options = ReadOptions {
        start_message: Some(phrase_start()),
        end_message: Some(phrase_end()),
        ..ReadOptions::default()
    };

    let mut nodes: Vec<Box<dyn Node>> = vec![
        Box::new(Effect::new(PitchShift::new(pitch))),
        Box::new(Effect::new(VelocityShift::new(velocity))),
        Box::new(Effect::new(Mirror::default()).with_enabled(mirror_on)),
        Box::new(Effect::new(Delay::new(gap))),
        Box::new(Effect::new(BufferDelay::new(phrase_end(), Parameter::constant(0.0)))),
        Box::new(ReadMidi::open(&options.in_path, read_options)?),
    ];
    if let Some(port) = &options.send {
        nodes.push(Box::new(SendMidi::open(port)?));
    }
    if options.out_dir.is_some() {
        let mut logger = MidiLogger::new(log.clone()).with_channel(1);
        if let Some(max) = options.max_out {
            logger = logger.with_max_messages(max);
        }
        nodes.push(Box::new(Effect::new(logger)));
    }

    Ok(Chain::new(nodes, true)?.with_log(log.clone(), options.out_dir.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Event, Note};
    use crate::midi_file::write_midi;
    use crate::error::MidiFxError;

    fn scale(dir: &std::path::Path) -> PathBuf {
        let path = dir.join("scale.mid");
        let events: Vec<Event> = (0..4)
            .map(|i| Note::new(0.5 * i as f64, 60 + 2 * i, 80, 0.4).into())
            .collect();
        assert!(write_midi(&path, &events, 0).unwrap());
        path
    }

    #[test]
    fn test_phrase_markers_share_a_control_number() {
        assert_eq!(phrase_start().number, phrase_end().number);
        assert_eq!(phrase_start().value, 120);
        assert_eq!(phrase_end().value, 0);
    }

    #[test]
    fn test_demo_chain_layout() {
        let dir = tempfile::tempdir().unwrap();
        let options = DemoOptions {
            in_path: scale(dir.path()),
            out_dir: Some(dir.path().to_path_buf()),
            max_out: Some(10),
            ..DemoOptions::default()
        };
        let chain = build_demo(&options, &EventLog::new()).unwrap();
        assert!(chain.is_looped());
        assert_eq!(
            chain.node_names(),
            vec![
                "PitchShift",
                "VelocityShift",
                "Mirror",
                "Delay",
                "Buffer delay",
                "Read MIDI",
                "Logger"
            ]
        );
    }

    #[test]
    fn test_demo_without_outputs_has_no_logger() {
        let dir = tempfile::tempdir().unwrap();
        let options = DemoOptions {
            in_path: scale(dir.path()),
            ..DemoOptions::default()
        };
        let chain = build_demo(&options, &EventLog::new()).unwrap();
        assert_eq!(chain.len(), 6);
    }

    #[test]
    fn test_demo_needs_an_input_file() {
        let options = DemoOptions {
            in_path: PathBuf::from("/no/such/scale.mid"),
            ..DemoOptions::default()
        };
        assert!(matches!(
            build_demo(&options, &EventLog::new()),
            Err(MidiFxError::Io(_))
        ));
    }
}
