//! Incremental MIDI byte-stream parser
//!
//! Implements the subset of the MIDI wire protocol the chain needs: notes,
//! control changes and system messages. Note-on and note-off bytes are paired
//! into single [`Note`] events whose duration is the time between the two calls
//! that delivered them, so the parser can be fed small chunks from a live port.
//!
//! Decoding anomalies (note-off without note-on, unknown status bytes, messages
//! cut off at the end of a chunk) are logged and skipped.

use crate::event::{ControlChange, Event, Note, SystemMessage};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Stateful MIDI decoder
///
/// Holds the notes that are currently on, keyed by `(channel, pitch)`. One
/// parser should be used per input source for the lifetime of that source.
#[derive(Debug, Default)]
pub struct NoteParser {
    notes_on: HashMap<(u8, u8), Note>,
}

impl NoteParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode `bytes`, received at time `t`, into events
    ///
    /// Decoding is lazy: bytes are consumed as the returned iterator is
    /// advanced. Notes only appear once their note-off has been seen.
    pub fn parse_stream<I>(&mut self, t: f64, bytes: I) -> ParseStream<'_, I::IntoIter>
    where
        I: IntoIterator<Item = u8>,
    {
        ParseStream {
            parser: self,
            bytes: bytes.into_iter(),
            t,
            exhausted: false,
        }
    }

    /// Number of notes waiting for their note-off
    pub fn pending_notes(&self) -> usize {
        self.notes_on.len()
    }
}

/// Lazy sequence of events decoded from one chunk of bytes
pub struct ParseStream<'a, I> {
    parser: &'a mut NoteParser,
    bytes: I,
    t: f64,
    exhausted: bool,
}

impl<'a, I: Iterator<Item = u8>> ParseStream<'a, I> {
    fn next_byte(&mut self) -> Option<u8> {
        let byte = self.bytes.next();
        if byte.is_none() {
            self.exhausted = true;
        }
        byte
    }

    fn data_byte(&mut self, status: u8) -> Option<u8> {
        let byte = self.next_byte();
        if byte.is_none() {
            warn!("Truncated message with status {}", status);
        }
        byte
    }

    fn data_pair(&mut self, status: u8) -> Option<(u8, u8)> {
        let first = self.data_byte(status)?;
        let second = self.data_byte(status)?;
        Some((first, second))
    }
}

impl<'a, I: Iterator<Item = u8>> Iterator for ParseStream<'a, I> {
    type Item = Event;

    fn next(&mut self) -> Option<Event> {
        while !self.exhausted {
            let status = self.next_byte()?;
            match (status >> 4, status & 0x0F) {
                (9, channel) => {
                    let (pitch, velocity) = self.data_pair(status)?;
                    let note = Note {
                        start: self.t,
                        pitch: pitch as i32,
                        velocity: velocity as i32,
                        duration: 0.0,
                        ioi: 0.0,
                        channel,
                    };
                    self.parser.notes_on.insert((channel, pitch), note);
                }
                (8, channel) => {
                    let (pitch, _release) = self.data_pair(status)?;
                    match self.parser.notes_on.remove(&(channel, pitch)) {
                        Some(mut note) => {
                            note.duration = self.t - note.start;
                            return Some(Event::Note(note));
                        }
                        None => warn!("Note off for pitch {} that isn't on", pitch),
                    }
                }
                (11, channel) => {
                    let (number, value) = self.data_pair(status)?;
                    return Some(Event::ControlChange(ControlChange {
                        start: self.t,
                        number,
                        value,
                        channel,
                    }));
                }
                (10 | 14, _) => {
                    let data = self.data_pair(status)?;
                    debug!("Unparsed bytes with number {} and data {:?}", status, data);
                }
                (12 | 13, _) => {
                    let data = self.data_byte(status)?;
                    debug!("Unparsed bytes with number {} and data {}", status, data);
                }
                (15, number) => {
                    return Some(Event::System(SystemMessage {
                        start: self.t,
                        number,
                    }));
                }
                _ => warn!("Unparsed bytes with number {}", status),
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(parser: &mut NoteParser, t: f64, bytes: &[u8]) -> Vec<Event> {
        parser.parse_stream(t, bytes.iter().copied()).collect()
    }

    #[test]
    fn test_note_on_then_off_yields_one_note() {
        let mut parser = NoteParser::new();
        assert!(parse(&mut parser, 1.0, &[0x91, 60, 90]).is_empty());
        assert_eq!(parser.pending_notes(), 1);

        let events = parse(&mut parser, 1.75, &[0x81, 60, 0]);
        assert_eq!(events.len(), 1);
        match &events[0] {
            Event::Note(note) => {
                assert_eq!(note.start, 1.0);
                assert_eq!(note.pitch, 60);
                assert_eq!(note.velocity, 90);
                assert_eq!(note.channel, 1);
                assert!((note.duration - 0.75).abs() < 1e-9);
            }
            other => panic!("expected a note, got {:?}", other),
        }
        assert_eq!(parser.pending_notes(), 0);
    }

    #[test]
    fn test_note_off_on_other_channel_does_not_match() {
        let mut parser = NoteParser::new();
        parse(&mut parser, 0.0, &[0x90, 60, 90]);
        assert!(parse(&mut parser, 1.0, &[0x83, 60, 0]).is_empty());
        assert_eq!(parser.pending_notes(), 1);
    }

    #[test]
    fn test_unmatched_note_off_is_ignored() {
        let mut parser = NoteParser::new();
        let events = parse(&mut parser, 0.0, &[0x80, 64, 0, 0xB0, 4, 120]);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            Event::ControlChange(ControlChange { number: 4, value: 120, .. })
        ));
    }

    #[test]
    fn test_control_change_and_system_message() {
        let mut parser = NoteParser::new();
        let events = parse(&mut parser, 2.0, &[0xB5, 7, 100, 0xF8]);
        assert_eq!(
            events,
            vec![
                Event::ControlChange(ControlChange {
                    start: 2.0,
                    number: 7,
                    value: 100,
                    channel: 5,
                }),
                Event::System(SystemMessage { start: 2.0, number: 8 }),
            ]
        );
    }

    #[test]
    fn test_one_and_two_data_byte_families_are_consumed() {
        let mut parser = NoteParser::new();
        // pitch bend (2 data bytes), program change (1), channel pressure (1), aftertouch (2)
        let bytes = [0xE0, 0, 64, 0xC0, 5, 0xD0, 30, 0xA0, 60, 10, 0xB0, 1, 2];
        let events = parse(&mut parser, 0.0, &bytes);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            Event::ControlChange(ControlChange { number: 1, value: 2, .. })
        ));
    }

    #[test]
    fn test_stray_data_byte_is_skipped() {
        let mut parser = NoteParser::new();
        let events = parse(&mut parser, 0.0, &[0x40, 0xB0, 10, 20]);
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_truncated_message_stops_the_call_only() {
        let mut parser = NoteParser::new();
        assert!(parse(&mut parser, 0.0, &[0xB0, 10]).is_empty());

        let events = parse(&mut parser, 0.1, &[0xB0, 10, 20]);
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_decoding_is_lazy() {
        let mut parser = NoteParser::new();
        let bytes = [0xB0, 1, 1, 0xB0, 2, 2, 0xB0, 3, 3];
        let mut stream = parser.parse_stream(0.0, bytes.iter().copied());
        let first = stream.next();
        assert!(matches!(
            first,
            Some(Event::ControlChange(ControlChange { number: 1, .. }))
        ));
        assert_eq!(stream.count(), 2);
    }

    #[test]
    fn test_chunks_across_calls_pair_up() {
        let mut parser = NoteParser::new();
        parse(&mut parser, 0.0, &[0x90, 60, 80, 0x90, 64, 80]);
        let first = parse(&mut parser, 0.5, &[0x80, 64, 0]);
        let second = parse(&mut parser, 1.0, &[0x80, 60, 0]);
        assert!(matches!(&first[0], Event::Note(n) if n.pitch == 64 && (n.duration - 0.5).abs() < 1e-9));
        assert!(matches!(&second[0], Event::Note(n) if n.pitch == 60 && (n.duration - 1.0).abs() < 1e-9));
    }
}
