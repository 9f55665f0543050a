//! Metronome source
//!
//! [`SendPulse`] emits the same note every `ioi` seconds, forever. Notes are
//! scheduled ahead of time; downstream backpressure is what keeps the
//! producer from running arbitrarily far ahead of the clock.

use crate::clock;
use crate::error::Result;
use crate::event::Note;
use crate::node::{Completion, Effect, Node, NodeTask, Passthrough, Ports};
use crate::queue::EventQueue;
use tracing::info;

pub struct SendPulse {
    core: Effect<Passthrough>,
    ioi: f64,
    pitch: i32,
    velocity: i32,
    duration: f64,
}

impl SendPulse {
    /// One note every `ioi` seconds
    pub fn new(ioi: f64) -> Self {
        Self {
            core: Effect::new(Passthrough::new("Send pulse")),
            ioi,
            pitch: 69,
            velocity: 64,
            duration: 0.1,
        }
    }

    pub fn with_note(mut self, pitch: i32, velocity: i32, duration: f64) -> Self {
        self.pitch = pitch;
        self.velocity = velocity;
        self.duration = duration;
        self
    }

    fn note(&self, start: f64) -> Note {
        let mut note = Note::new(start, self.pitch, self.velocity, self.duration);
        note.ioi = self.ioi;
        note
    }
}

impl Default for SendPulse {
    fn default() -> Self {
        Self::new(0.25)
    }
}

impl Node for SendPulse {
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
        let pulse = *self;
        let ports = pulse.core.ports().clone();
        let template = pulse.note(0.0);
        vec![
            Box::pin(generate(ports, template)),
            Box::pin(pulse.core.run()),
        ]
    }
}

async fn generate(ports: Ports, template: Note) -> Result<Completion> {
    info!("Sending a pulse every {:.3}s", template.ioi);
    let mut t = clock::now();
    // the first note is due one ioi from now
    loop {
        t += template.ioi;
        let note = Note {
            start: t,
            ..template.clone()
        };
        ports.send(vec![note.into()]).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;
    use std::time::Duration;

    #[tokio::test]
    async fn test_pulse_is_evenly_spaced_and_throttled() {
        let mut pulse = SendPulse::new(0.5).with_note(60, 100, 0.2);
        let downstream = EventQueue::new(3);
        pulse.connect(downstream.clone());
        let before = clock::now();
        let handles: Vec<_> = Box::new(pulse)
            .into_tasks()
            .into_iter()
            .map(tokio::spawn)
            .collect();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(downstream.len(), 3, "the producer waits on a full queue");

        let mut starts = Vec::new();
        for _ in 0..3 {
            match downstream.get().await {
                Event::Note(note) => {
                    assert_eq!((note.pitch, note.velocity), (60, 100));
                    assert_eq!(note.ioi, 0.5);
                    starts.push(note.start);
                }
                other => panic!("expected a note, got {:?}", other),
            }
        }
        assert!(starts[0] >= before + 0.5);
        assert!((starts[1] - starts[0] - 0.5).abs() < 1e-6);
        assert!((starts[2] - starts[1] - 0.5).abs() < 1e-6);
        for handle in handles {
            handle.abort();
        }
    }
}
