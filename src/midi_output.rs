//! MIDI output and the output scheduler
//!
//! [`SendMidi`] turns events into raw messages with absolute due times and
//! transmits each one when its time comes. The transmit task polls at a
//! fixed resolution, so a message goes out at most about one resolution
//! interval after it is due. Late messages are still sent; lateness is
//! only logged, loudly when it is the worst seen so far.

use crate::clock;
use crate::constants::{DEFAULT_ENABLED, DEFAULT_RESOLUTION, MAX_QUEUE_SIZE, PORT_WARMUP};
use crate::error::{MidiFxError, Result};
use crate::event::{Event, RawMessage};
use crate::node::{Completion, Node, NodeTask, Ports};
use crate::parameter::Parameter;
use crate::queue::{EventQueue, PriorityQueue};
use midir::{MidiOutput, MidiOutputConnection};
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// Something that can put raw MIDI bytes on a wire
pub trait MidiSink: Send {
    fn send(&mut self, bytes: &[u8]) -> Result<()>;
}

/// Output port backed by midir
pub struct MidirSink {
    connection: MidiOutputConnection,
}

impl MidirSink {
    /// Connect to the first output port whose name contains `name`
    ///
    /// When there is no such port, a virtual port called `name` is created
    /// instead where the platform supports it.
    pub fn open(name: &str) -> Result<Self> {
        let midi_out = MidiOutput::new("midifx").map_err(port_error)?;
        let port = midi_out.ports().into_iter().find(|port| {
            midi_out
                .port_name(port)
                .map_or(false, |port_name| port_name.contains(name))
        });
        let connection = match port {
            Some(port) => {
                info!("Connecting to MIDI output {}", name);
                midi_out.connect(&port, name).map_err(port_error)?
            }
            None => create_virtual(midi_out, name)?,
        };
        Ok(Self { connection })
    }
}

#[cfg(unix)]
fn create_virtual(midi_out: MidiOutput, name: &str) -> Result<MidiOutputConnection> {
    use midir::os::unix::VirtualOutput;
    debug!("Creating virtual MIDI output with name {}", name);
    midi_out.create_virtual(name).map_err(port_error)
}

#[cfg(not(unix))]
fn create_virtual(_midi_out: MidiOutput, name: &str) -> Result<MidiOutputConnection> {
    Err(MidiFxError::MidiPort(format!(
        "MIDI output '{}' not found",
        name
    )))
}

fn port_error(e: impl std::fmt::Display) -> MidiFxError {
    MidiFxError::MidiPort(e.to_string())
}

impl MidiSink for MidirSink {
    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.connection.send(bytes).map_err(port_error)
    }
}

/// Names of the available MIDI output ports
pub fn list_output_ports() -> Result<Vec<String>> {
    let midi_out = MidiOutput::new("midifx scanner").map_err(port_error)?;
    Ok(midi_out
        .ports()
        .iter()
        .filter_map(|port| midi_out.port_name(port).ok())
        .collect())
}

/// Output scheduler node
///
/// Runs two tasks: one converts incoming events into raw messages and
/// forwards the original events downstream, the other transmits raw
/// messages as they fall due.
pub struct SendMidi {
    name: String,
    ports: Ports,
    enabled: Parameter,
    sink: Box<dyn MidiSink>,
    resolution: f64,
    override_channel: Option<u8>,
    warmup: Duration,
}

impl SendMidi {
    pub fn new(sink: Box<dyn MidiSink>) -> Self {
        let name = "Send MIDI".to_string();
        Self {
            ports: Ports::new(&name, MAX_QUEUE_SIZE),
            name,
            enabled: Parameter::always(DEFAULT_ENABLED),
            sink,
            resolution: DEFAULT_RESOLUTION,
            override_channel: None,
            warmup: PORT_WARMUP,
        }
    }

    /// Send to the port called `port_name`, see [`MidirSink::open`]
    pub fn open(port_name: &str) -> Result<Self> {
        Ok(Self::new(Box::new(MidirSink::open(port_name)?)))
    }

    /// Poll interval in seconds; non-finite values leave it unchanged
    pub fn with_resolution(mut self, resolution: f64) -> Self {
        if resolution.is_finite() {
            self.resolution = resolution.max(0.0);
        }
        self
    }

    /// Transmit everything on this channel; forwarded events keep theirs
    pub fn with_channel(mut self, channel: u8) -> Self {
        self.override_channel = Some(channel & 0x0F);
        self
    }

    pub fn with_warmup(mut self, warmup: Duration) -> Self {
        self.warmup = warmup;
        self
    }

    /// When the switch is off events are forwarded but not transmitted
    pub fn with_enabled(mut self, enabled: Parameter) -> Self {
        self.enabled = enabled;
        self
    }
}

async fn convert(
    ports: Ports,
    bytes: PriorityQueue<RawMessage>,
    mut enabled: Parameter,
    override_channel: Option<u8>,
) -> Result<Completion> {
    loop {
        let event = ports.input().get().await;
        if let Event::ControlChange(cc) = &event {
            enabled.control_change(cc.number, cc.value);
        }
        if enabled.is_on() {
            let mut copy = event.clone();
            if let Some(channel) = override_channel {
                copy.set_channel(channel);
            }
            for raw in copy.to_raw() {
                debug!("Queuing bytes {:?} from {}", raw.bytes, copy);
                bytes.put(raw).await;
            }
        }
        ports.send(vec![event]).await;
    }
}

/// Worst lateness seen so far by one transmit task
#[derive(Debug, Default)]
struct Lateness {
    worst: f64,
}

impl Lateness {
    /// Record `late` seconds; true when it is the worst so far
    fn record(&mut self, late: f64) -> bool {
        if late > self.worst {
            self.worst = late;
            true
        } else {
            false
        }
    }
}

async fn transmit(
    name: String,
    bytes: PriorityQueue<RawMessage>,
    mut sink: Box<dyn MidiSink>,
    resolution: f64,
) -> Result<Completion> {
    info!("Running {}/send_bytes", name);
    let poll = Duration::from_secs_f64(resolution);
    let mut lateness = Lateness::default();
    loop {
        let due = bytes.next_timestamp().await;
        let late = clock::now() - due;
        if late <= -resolution / 2.0 {
            tokio::time::sleep(poll).await;
            continue;
        }
        let message = match bytes.try_get() {
            Some(message) => message,
            None => continue,
        };
        if lateness.record(late) {
            warn!("Sending event {:?}, {:.1}ms late", message.bytes, 1000.0 * late);
        } else {
            trace!("Sending event {:?}, {:.1}ms late", message.bytes, 1000.0 * late);
        }
        if let Err(e) = sink.send(&message.bytes) {
            error!("Failed to send {:?}: {}", message.bytes, e);
        }
    }
}

impl Node for SendMidi {
    fn name(&self) -> &str {
        &self.name
    }

    fn input(&self) -> EventQueue {
        self.ports.input().clone()
    }

    fn connect(&mut self, output: EventQueue) {
        self.ports.connect(output);
    }

    fn warmup(&self) -> Duration {
        self.warmup
    }

    fn into_tasks(self: Box<Self>) -> Vec<NodeTask> {
        let bytes = PriorityQueue::new(2 * MAX_QUEUE_SIZE);
        vec![
            Box::pin(convert(
                self.ports,
                bytes.clone(),
                self.enabled,
                self.override_channel,
            )),
            Box::pin(transmit(self.name, bytes, self.sink, self.resolution)),
        ]
    }
}
