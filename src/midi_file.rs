//! Standard MIDI File reading and writing
//!
//! Reading flattens a file into a sorted list of [`FileNote`]s (seconds from
//! the start of the file, full tempo map applied); [`events_from_notes`] then
//! places them on the wall clock as [`Note`] events. Writing goes the other
//! way: one track per channel plus a tempo track, at a fixed 120 BPM.

use crate::clock;
use crate::constants::{PADDING, PROGRAMS};
use crate::error::{MidiFxError, Result};
use crate::event::{ControlChange, Event, Note};
use crate::node::{Completion, Effect, Node, NodeTask, Passthrough, Ports};
use crate::queue::EventQueue;
use midly::num::{u15, u24, u28, u4, u7};
use midly::{
    Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind,
};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Ticks per quarter note in written files
pub const TICKS_PER_BEAT: u16 = 220;
/// Tempo of written files, in microseconds per quarter note (120 BPM)
pub const TEMPO: u32 = 500_000;

const DEFAULT_TEMPO: u32 = 500_000;

/// A note as found in a file, in seconds from the start of the file
#[derive(Debug, Clone, PartialEq)]
pub struct FileNote {
    pub start: f64,
    pub end: f64,
    pub pitch: u8,
    pub velocity: u8,
    pub program: u8,
    pub channel: u8,
}

/// Tick-to-seconds conversion for one file
struct TempoMap {
    /// `(tick, seconds at tick, seconds per tick from there on)`
    segments: Vec<(u64, f64, f64)>,
}

impl TempoMap {
    fn new(smf: &Smf) -> Self {
        let ticks_per_beat = match smf.header.timing {
            Timing::Metrical(tpb) => tpb.as_int().max(1) as f64,
            Timing::Timecode(fps, subframe) => {
                let seconds_per_tick = 1.0 / (fps.as_f32() as f64 * subframe.max(1) as f64);
                return Self {
                    segments: vec![(0, 0.0, seconds_per_tick)],
                };
            }
        };

        let mut changes: Vec<(u64, u32)> = vec![(0, DEFAULT_TEMPO)];
        for track in &smf.tracks {
            let mut tick = 0u64;
            for event in track {
                tick += event.delta.as_int() as u64;
                if let TrackEventKind::Meta(MetaMessage::Tempo(tempo)) = event.kind {
                    changes.push((tick, tempo.as_int()));
                }
            }
        }
        changes.sort_by_key(|&(tick, _)| tick);

        let mut segments: Vec<(u64, f64, f64)> = Vec::with_capacity(changes.len());
        for (tick, tempo) in changes {
            let seconds_per_tick = tempo as f64 / 1_000_000.0 / ticks_per_beat;
            let seconds = match segments.last() {
                Some(&(last_tick, last_seconds, last_rate)) => {
                    last_seconds + (tick - last_tick) as f64 * last_rate
                }
                None => 0.0,
            };
            // a later change at the same tick replaces the earlier one
            if let Some(last) = segments.last_mut() {
                if last.0 == tick {
                    *last = (tick, seconds, seconds_per_tick);
                    continue;
                }
            }
            segments.push((tick, seconds, seconds_per_tick));
        }
        Self { segments }
    }

    fn seconds(&self, tick: u64) -> f64 {
        let segment = self
            .segments
            .iter()
            .rev()
            .find(|(start, _, _)| *start <= tick)
            .or_else(|| self.segments.first());
        match segment {
            Some(&(start, seconds, rate)) => seconds + tick.saturating_sub(start) as f64 * rate,
            None => 0.0,
        }
    }
}

/// Decode the notes of an in-memory MIDI file
///
/// Note-ons are paired with note-offs first-in-first-out per track, channel
/// and key; a note-on with velocity 0 counts as a note-off. Only notes whose
/// program is in `programs` are kept (`None` keeps all). The result is sorted
/// by start time, then pitch.
pub fn parse_notes(bytes: &[u8], programs: Option<&[u8]>) -> Result<Vec<FileNote>> {
    let smf = Smf::parse(bytes)?;
    let tempo_map = TempoMap::new(&smf);
    let mut notes = Vec::new();

    for track in &smf.tracks {
        let mut tick = 0u64;
        let mut current_program = [0u8; 16];
        let mut pending: HashMap<(u8, u8), VecDeque<(u64, u8, u8)>> = HashMap::new();

        for event in track {
            tick += event.delta.as_int() as u64;
            let (channel, message) = match event.kind {
                TrackEventKind::Midi { channel, message } => (channel.as_int(), message),
                _ => continue,
            };
            match message {
                MidiMessage::ProgramChange { program } => {
                    current_program[channel as usize] = program.as_int();
                }
                MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                    pending.entry((channel, key.as_int())).or_default().push_back((
                        tick,
                        vel.as_int(),
                        current_program[channel as usize],
                    ));
                }
                MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                    let opened = pending
                        .get_mut(&(channel, key.as_int()))
                        .and_then(VecDeque::pop_front);
                    if let Some((start_tick, velocity, program)) = opened {
                        notes.push(FileNote {
                            start: tempo_map.seconds(start_tick),
                            end: tempo_map.seconds(tick),
                            pitch: key.as_int(),
                            velocity,
                            program,
                            channel,
                        });
                    }
                }
                _ => {}
            }
        }
    }

    notes.retain(|note| {
        note.end >= note.start && programs.map_or(true, |keep| keep.contains(&note.program))
    });
    notes.sort_by(|a, b| a.start.total_cmp(&b.start).then(a.pitch.cmp(&b.pitch)));
    Ok(notes)
}

/// Load the notes of a MIDI file, see [`parse_notes`]
pub fn load_notes(path: impl AsRef<Path>, programs: Option<&[u8]>) -> Result<Vec<FileNote>> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)?;
    let notes = parse_notes(&bytes, programs)?;
    debug!("Loaded {} notes from {}", notes.len(), path.display());
    Ok(notes)
}

/// How file notes become events
#[derive(Debug, Clone)]
pub struct ReadOptions {
    /// Emitted at the start time, `PADDING` before the first note
    pub start_message: Option<ControlChange>,
    /// Emitted `PADDING` after the last note has ended
    pub end_message: Option<ControlChange>,
    /// Keep only the first notes
    pub max_notes: Option<usize>,
    /// Velocity scale factor
    pub level: f64,
    /// Repeat the sequence in every transposition from -6 to +5 semitones
    pub all_keys: bool,
    /// Programs to keep, `None` for all
    pub programs: Option<Vec<u8>>,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            start_message: None,
            end_message: None,
            max_notes: None,
            level: 1.0,
            all_keys: false,
            programs: Some(PROGRAMS.to_vec()),
        }
    }
}

/// Place file notes on the timeline, with the first note `PADDING` after `t_start`
pub fn events_from_notes(notes: &[FileNote], t_start: f64, options: &ReadOptions) -> Vec<Event> {
    let notes = match options.max_notes {
        Some(max) => &notes[..max.min(notes.len())],
        None => notes,
    };
    let transpositions: Vec<i32> = if options.all_keys {
        (-6..6).collect()
    } else {
        vec![0]
    };
    let first_start = notes.first().map_or(0.0, |note| note.start);

    let mut events = Vec::new();
    for transpose in transpositions {
        if let Some(start_message) = &options.start_message {
            events.push(Event::ControlChange(start_message.at(t_start)));
        }
        let mut t_last = t_start;
        let mut t_end = t_start;
        for file_note in notes {
            let t = t_start + file_note.start - first_start + PADDING;
            let duration = file_note.end - file_note.start;
            let mut note = Note::new(
                t,
                file_note.pitch as i32 + transpose,
                (file_note.velocity as f64 * options.level) as i32,
                duration,
            );
            note.ioi = t - t_last;
            events.push(Event::Note(note));
            t_last = t;
            t_end = t_end.max(t + duration);
        }
        if let Some(end_message) = &options.end_message {
            events.push(Event::ControlChange(end_message.at(t_end + PADDING)));
        }
    }
    events
}

/// Load a file and place its notes on the timeline starting at `t_start`
pub fn notes_from_file(
    path: impl AsRef<Path>,
    t_start: f64,
    options: &ReadOptions,
) -> Result<Vec<Event>> {
    let notes = load_notes(path, options.programs.as_deref())?;
    Ok(events_from_notes(&notes, t_start, options))
}

fn data_byte(value: i32) -> u7 {
    u7::new(value.clamp(0, 127) as u8)
}

fn seconds_to_ticks(seconds: f64) -> u64 {
    let ticks_per_second = TICKS_PER_BEAT as f64 * 1_000_000.0 / TEMPO as f64;
    (seconds * ticks_per_second).round().max(0.0) as u64
}

/// Sort key for events sharing a tick
const ORDER_NOTE_OFF: u8 = 0;
const ORDER_CONTROLLER: u8 = 1;
const ORDER_NOTE_ON: u8 = 2;

/// Write events to a MIDI file
///
/// Times are written relative to the earliest event. Every channel gets its
/// own track starting with a program change to `program`. System messages
/// are not written. Returns `Ok(false)` without touching the file system
/// when there is nothing to write.
pub fn write_midi(path: impl AsRef<Path>, events: &[Event], program: u8) -> Result<bool> {
    let path = path.as_ref();
    let mut events = events.to_vec();
    events.sort_by(|a, b| a.start().total_cmp(&b.start()));
    let start_time = match events.first() {
        Some(event) => event.start(),
        None => {
            info!("No events were logged... Skipping writing MIDI file.");
            return Ok(false);
        }
    };

    let mut channels: BTreeMap<u8, Vec<(u64, u8, TrackEventKind<'static>)>> = BTreeMap::new();
    for event in &events {
        match event {
            Event::Note(note) => {
                if note.pitch >= 127 || note.pitch < 0 || note.velocity > 127 || note.velocity < 0 {
                    info!("Note with out-of-range pitch/velocity in write_midi: {}", event);
                }
                let channel = note.channel & 0x0F;
                let (key, vel) = (data_byte(note.pitch), data_byte(note.velocity));
                let on = seconds_to_ticks(note.start - start_time);
                let off = seconds_to_ticks(note.start + note.duration - start_time).max(on);
                let midi = |message| TrackEventKind::Midi {
                    channel: u4::new(channel),
                    message,
                };
                let track = channels.entry(channel).or_default();
                track.push((on, ORDER_NOTE_ON, midi(MidiMessage::NoteOn { key, vel })));
                track.push((off, ORDER_NOTE_OFF, midi(MidiMessage::NoteOff { key, vel })));
            }
            Event::ControlChange(cc) => {
                let channel = cc.channel & 0x0F;
                let tick = seconds_to_ticks(cc.start - start_time);
                channels.entry(channel).or_default().push((
                    tick,
                    ORDER_CONTROLLER,
                    TrackEventKind::Midi {
                        channel: u4::new(channel),
                        message: MidiMessage::Controller {
                            controller: u7::new(cc.number & 0x7F),
                            value: u7::new(cc.value & 0x7F),
                        },
                    },
                ));
            }
            Event::System(_) => continue,
        }
    }

    let mut smf = Smf::new(Header::new(
        Format::Parallel,
        Timing::Metrical(u15::new(TICKS_PER_BEAT)),
    ));
    smf.tracks.push(vec![
        TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(TEMPO))),
        },
        end_of_track(),
    ]);

    for (channel, mut timed) in channels {
        timed.sort_by_key(|&(tick, order, _)| (tick, order));
        let mut track = Vec::with_capacity(timed.len() + 2);
        track.push(TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Midi {
                channel: u4::new(channel),
                message: MidiMessage::ProgramChange {
                    program: u7::new(program & 0x7F),
                },
            },
        });
        let mut last_tick = 0u64;
        for (tick, _, kind) in timed {
            let delta = (tick - last_tick).min(0x0FFF_FFFF) as u32;
            track.push(TrackEvent {
                delta: u28::new(delta),
                kind,
            });
            last_tick = tick;
        }
        track.push(end_of_track());
        smf.tracks.push(track);
    }

    smf.save(path).map_err(|source| MidiFxError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(true)
}

fn end_of_track() -> TrackEvent<'static> {
    TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    }
}

/// Plays a MIDI file into the chain once, starting when the chain starts
pub struct ReadMidi {
    core: Effect<Passthrough>,
    path: PathBuf,
    notes: Vec<FileNote>,
    options: ReadOptions,
}

impl ReadMidi {
    /// Load the file now, so a missing or broken file fails at construction
    pub fn open(path: impl AsRef<Path>, options: ReadOptions) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let notes = load_notes(&path, options.programs.as_deref())?;
        Ok(Self {
            core: Effect::new(Passthrough::new("Read MIDI")),
            path,
            notes,
            options,
        })
    }

    pub fn notes(&self) -> &[FileNote] {
        &self.notes
    }
}

impl Node for ReadMidi {
    fn name(&self) -> &str {
        self.core.name()
    }

    fn input(&self) -> EventQueue {
        self.core.input()
    }

    fn connect(&mut self, output: EventQueue) {
        self.core.connect(output);
    }

    fn into_tasks(self: Box<Self>) -> Vec<NodeTask> {
        let ReadMidi {
            core,
            path,
            notes,
            options,
        } = *self;
        let ports = core.ports().clone();
        vec![
            Box::pin(read(ports, path, notes, options)),
            Box::pin(core.run()),
        ]
    }
}

async fn read(
    ports: Ports,
    path: PathBuf,
    notes: Vec<FileNote>,
    options: ReadOptions,
) -> Result<Completion> {
    let events = events_from_notes(&notes, clock::now(), &options);
    info!("Reading {} events from {}", events.len(), path.display());
    ports.send(events).await;
    Ok(Completion::Finished)
}
