//! MIDI input
//!
//! midir delivers bytes on its own thread through a callback; the callback
//! pushes them into a crossbeam channel that [`ReceiveMidi`] polls at a
//! fixed resolution and feeds through a [`NoteParser`].

use crate::clock;
use crate::constants::{DEFAULT_RESOLUTION, PORT_WARMUP};
use crate::error::{MidiFxError, Result};
use crate::event::Event;
use crate::node::{Completion, Effect, Node, NodeTask, Passthrough, Ports};
use crate::parser::NoteParser;
use crate::queue::EventQueue;
use crossbeam::channel::{unbounded, Receiver, Sender};
use midir::{Ignore, MidiInput, MidiInputConnection};
use std::time::Duration;
use tracing::{debug, info};

/// Polled source of raw MIDI bytes
pub trait MidiSource: Send {
    /// Everything received since the last call, or `None`; never blocks
    fn receive(&mut self) -> Option<Vec<u8>>;
}

/// Input port backed by midir
pub struct MidirSource {
    _connection: MidiInputConnection<()>,
    receiver: Receiver<Vec<u8>>,
}

impl MidirSource {
    /// Connect to the first input port whose name contains `name`
    ///
    /// When there is no such port, a virtual port called `name` is created
    /// instead where the platform supports it.
    pub fn open(name: &str) -> Result<Self> {
        let mut midi_in = MidiInput::new("midifx").map_err(port_error)?;
        midi_in.ignore(Ignore::Sysex);
        let (sender, receiver) = unbounded();

        let port = midi_in.ports().into_iter().find(|port| {
            midi_in
                .port_name(port)
                .map_or(false, |port_name| port_name.contains(name))
        });
        let connection = match port {
            Some(port) => {
                info!("Connecting to MIDI input {}", name);
                midi_in
                    .connect(&port, name, forward(sender), ())
                    .map_err(port_error)?
            }
            None => create_virtual(midi_in, name, sender)?,
        };
        Ok(Self {
            _connection: connection,
            receiver,
        })
    }
}

fn forward(sender: Sender<Vec<u8>>) -> impl FnMut(u64, &[u8], &mut ()) + Send + 'static {
    move |_timestamp, message, _| {
        let _ = sender.send(message.to_vec());
    }
}

#[cfg(unix)]
fn create_virtual(
    midi_in: MidiInput,
    name: &str,
    sender: Sender<Vec<u8>>,
) -> Result<MidiInputConnection<()>> {
    use midir::os::unix::VirtualInput;
    debug!("Creating virtual MIDI input with name {}", name);
    midi_in
        .create_virtual(name, forward(sender), ())
        .map_err(port_error)
}

#[cfg(not(unix))]
fn create_virtual(
    _midi_in: MidiInput,
    name: &str,
    _sender: Sender<Vec<u8>>,
) -> Result<MidiInputConnection<()>> {
    Err(MidiFxError::MidiPort(format!("MIDI input '{}' not found", name)))
}

fn port_error(e: impl std::fmt::Display) -> MidiFxError {
    MidiFxError::MidiPort(e.to_string())
}

impl MidiSource for MidirSource {
    fn receive(&mut self) -> Option<Vec<u8>> {
        let bytes: Vec<u8> = self.receiver.try_iter().flatten().collect();
        if bytes.is_empty() {
            None
        } else {
            Some(bytes)
        }
    }
}

/// Names of the available MIDI input ports
pub fn list_input_ports() -> Result<Vec<String>> {
    let midi_in = MidiInput::new("midifx scanner").map_err(port_error)?;
    Ok(midi_in
        .ports()
        .iter()
        .filter_map(|port| midi_in.port_name(port).ok())
        .collect())
}

/// Source node reading a live MIDI port
pub struct ReceiveMidi {
    core: Effect<Passthrough>,
    source: Box<dyn MidiSource>,
    resolution: f64,
    warmup: Duration,
}

impl ReceiveMidi {
    pub fn new(source: Box<dyn MidiSource>) -> Self {
        Self {
            core: Effect::new(Passthrough::new("Receive MIDI")),
            source,
            resolution: DEFAULT_RESOLUTION,
            warmup: PORT_WARMUP,
        }
    }

    /// Read from the port called `port_name`, see [`MidirSource::open`]
    pub fn open(port_name: &str) -> Result<Self> {
        Ok(Self::new(Box::new(MidirSource::open(port_name)?)))
    }

    /// Poll interval in seconds; non-finite values leave it unchanged
    pub fn with_resolution(mut self, resolution: f64) -> Self {
        if resolution.is_finite() {
            self.resolution = resolution.max(0.0);
        }
        self
    }

    pub fn with_warmup(mut self, warmup: Duration) -> Self {
        self.warmup = warmup;
        self
    }
}

impl Node for ReceiveMidi {
    fn name(&self) -> &str {
        self.core.name()
    }

    fn input(&self) -> EventQueue {
        self.core.input()
    }

    fn connect(&mut self, output: EventQueue) {
        self.core.connect(output);
    }

    fn warmup(&self) -> Duration {
        self.warmup
    }

    fn into_tasks(self: Box<Self>) -> Vec<NodeTask> {
        let ReceiveMidi {
            core,
            source,
            resolution,
            ..
        } = *self;
        let ports = core.ports().clone();
        vec![
            Box::pin(receive(ports, source, resolution)),
            Box::pin(core.run()),
        ]
    }
}

async fn receive(
    ports: Ports,
    mut source: Box<dyn MidiSource>,
    resolution: f64,
) -> Result<Completion> {
    let poll = Duration::from_secs_f64(resolution);
    let mut parser = NoteParser::new();
    loop {
        let t = clock::now();
        if let Some(bytes) = source.receive() {
            let events: Vec<Event> = parser.parse_stream(t, bytes).collect();
            ports.send(events).await;
        }
        tokio::time::sleep(poll).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Hands out one scripted chunk per poll
    #[derive(Clone, Default)]
    struct ScriptedSource {
        chunks: Arc<Mutex<VecDeque<Vec<u8>>>>,
    }

    impl MidiSource for ScriptedSource {
        fn receive(&mut self) -> Option<Vec<u8>> {
            self.chunks.lock().unwrap().pop_front()
        }
    }

    #[tokio::test]
    async fn test_received_bytes_become_events() {
        let source = ScriptedSource::default();
        source
            .chunks
            .lock()
            .unwrap()
            .extend([vec![0xB0, 4, 120, 0x92, 64, 90], vec![0x82, 64, 0]]);

        let mut node = ReceiveMidi::new(Box::new(source.clone())).with_warmup(Duration::ZERO);
        let downstream = EventQueue::new(8);
        node.connect(downstream.clone());
        let handles: Vec<_> = Box::new(node)
            .into_tasks()
            .into_iter()
            .map(tokio::spawn)
            .collect();

        let first = tokio::time::timeout(Duration::from_secs(1), downstream.get())
            .await
            .unwrap();
        assert!(matches!(first, Event::ControlChange(cc) if cc.number == 4 && cc.value == 120));

        let second = tokio::time::timeout(Duration::from_secs(1), downstream.get())
            .await
            .unwrap();
        match second {
            Event::Note(note) => {
                assert_eq!((note.pitch, note.velocity, note.channel), (64, 90, 2));
                assert!(note.duration > 0.0);
            }
            other => panic!("expected a note, got {:?}", other),
        }
        for handle in handles {
            handle.abort();
        }
    }
}
