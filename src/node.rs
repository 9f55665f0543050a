//! Node runtime
//!
//! A node is a stage of a chain: it owns one input queue, a list of output
//! queues, an enable switch and the parameters of its transformation. At run
//! time it turns into one or more [`NodeTask`]s that the chain drives
//! concurrently.
//!
//! Most nodes are an [`Effect`] around a [`Processor`]. The effect does the
//! plumbing every node shares:
//! 1. dequeue the earliest event
//! 2. offer control changes to the enable switch and to every parameter the processor lists
//! 3. run the processor, unless the node is disabled
//! 4. forward the results to every output queue
//!
//! Nodes that talk to ports or files add their own producer or consumer
//! tasks next to that loop.

use crate::constants::{DEFAULT_ENABLED, MAX_QUEUE_SIZE};
use crate::error::Result;
use crate::event::Event;
use crate::parameter::Parameter;
use crate::queue::EventQueue;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tracing::{debug, info};

/// One concurrently scheduled responsibility of a node
pub type NodeTask = Pin<Box<dyn Future<Output = Result<Completion>> + Send>>;

/// How a node task ended without failing
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    /// The task has nothing more to do; the rest of the chain keeps running
    Finished,
    /// The whole chain should stop
    Stop(String),
}

/// Input queue and output edges of a node
#[derive(Clone)]
pub struct Ports {
    name: String,
    input: EventQueue,
    outputs: Vec<EventQueue>,
}

impl Ports {
    pub fn new(name: &str, capacity: usize) -> Self {
        Self {
            name: name.to_string(),
            input: EventQueue::new(capacity),
            outputs: Vec::new(),
        }
    }

    pub fn input(&self) -> &EventQueue {
        &self.input
    }

    pub fn outputs(&self) -> &[EventQueue] {
        &self.outputs
    }

    pub fn connect(&mut self, output: EventQueue) {
        self.outputs.push(output);
    }

    /// Offer every event to every output, in order
    ///
    /// Waits while any output queue is full.
    pub async fn send(&self, events: Vec<Event>) {
        for event in events {
            debug!("Queuing message from {}: {}", self.name, event);
            for output in &self.outputs {
                output.put(event.clone()).await;
            }
        }
    }
}

/// A stage of a chain, before it is started
pub trait Node: Send {
    fn name(&self) -> &str;

    /// Handle to the queue this node reads from
    fn input(&self) -> EventQueue;

    /// Add an outgoing edge
    fn connect(&mut self, output: EventQueue);

    /// Time the node needs after construction before it can exchange bytes
    fn warmup(&self) -> Duration {
        Duration::ZERO
    }

    /// Consume the node into the tasks that run it
    fn into_tasks(self: Box<Self>) -> Vec<NodeTask>;
}

/// The transformation carried by an [`Effect`]
pub trait Processor: Send + 'static {
    /// Name used in logs when the node is not named explicitly
    fn name(&self) -> &str;

    /// Transform a batch of events; identity by default
    fn process(&mut self, events: Vec<Event>) -> Vec<Event> {
        events
    }

    /// Every parameter a control change should be offered to
    fn parameters_mut(&mut self) -> Vec<&mut Parameter> {
        Vec::new()
    }

    /// Reason to stop the chain, checked after every processed event
    fn halted(&self) -> Option<String> {
        None
    }
}

/// Processor that forwards everything unchanged
#[derive(Debug, Clone)]
pub struct Passthrough {
    name: String,
}

impl Passthrough {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

impl Processor for Passthrough {
    fn name(&self) -> &str {
        &self.name
    }
}

/// Generic node: queue plumbing, enable switch and control routing around a processor
pub struct Effect<P> {
    name: String,
    enabled: Parameter,
    ports: Ports,
    processor: P,
}

impl<P: Processor> Effect<P> {
    pub fn new(processor: P) -> Self {
        let name = processor.name().to_string();
        Self {
            ports: Ports::new(&name, MAX_QUEUE_SIZE),
            enabled: Parameter::always(DEFAULT_ENABLED),
            name,
            processor,
        }
    }

    /// Rename the node
    pub fn named(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self.ports.name = name.to_string();
        self
    }

    /// Replace the enable switch, e.g. with one bound to a control number
    pub fn with_enabled(mut self, enabled: Parameter) -> Self {
        self.enabled = enabled;
        self
    }

    /// Replace the input queue with one of another capacity
    ///
    /// Must happen before the node is connected to its upstream.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.ports.input = EventQueue::new(capacity);
        self
    }

    pub fn processor(&self) -> &P {
        &self.processor
    }

    pub fn processor_mut(&mut self) -> &mut P {
        &mut self.processor
    }

    pub fn ports(&self) -> &Ports {
        &self.ports
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.is_on()
    }

    /// Route one dequeued event through the node
    pub fn handle(&mut self, event: Event) -> Vec<Event> {
        if let Event::ControlChange(cc) = &event {
            let (number, value) = (cc.number, cc.value);
            self.enabled.control_change(number, value);
            for parameter in self.processor.parameters_mut() {
                parameter.control_change(number, value);
            }
        }
        if self.enabled.is_on() {
            self.processor.process(vec![event])
        } else {
            vec![event]
        }
    }

    /// Dequeue, process and forward until the processor halts
    pub async fn run(mut self) -> Result<Completion> {
        loop {
            let event = self.ports.input.get().await;
            let events = self.handle(event);
            if let Some(reason) = self.processor.halted() {
                info!("{} stopping the chain: {}", self.name, reason);
                return Ok(Completion::Stop(reason));
            }
            self.ports.send(events).await;
        }
    }
}

impl<P: Processor> Node for Effect<P> {
    fn name(&self) -> &str {
        &self.name
    }

    fn input(&self) -> EventQueue {
        self.ports.input.clone()
    }

    fn connect(&mut self, output: EventQueue) {
        self.ports.connect(output);
    }

    fn into_tasks(self: Box<Self>) -> Vec<NodeTask> {
        vec![Box::pin(self.run())]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{ControlChange, Note};

    struct Transpose {
        amount: Parameter,
        seen: usize,
        limit: Option<usize>,
    }

    impl Transpose {
        fn new(control_number: Option<i64>) -> Self {
            Self {
                amount: Parameter::new("amount", Some(1.0), control_number, 0.0, 128.0).unwrap(),
                seen: 0,
                limit: None,
            }
        }
    }

    impl Processor for Transpose {
        fn name(&self) -> &str {
            "transpose"
        }

        fn process(&mut self, events: Vec<Event>) -> Vec<Event> {
            self.seen += events.len();
            events
                .into_iter()
                .map(|event| match event {
                    Event::Note(mut note) => {
                        note.pitch += self.amount.value() as i32;
                        Event::Note(note)
                    }
                    other => other,
                })
                .collect()
        }

        fn parameters_mut(&mut self) -> Vec<&mut Parameter> {
            vec![&mut self.amount]
        }

        fn halted(&self) -> Option<String> {
            match self.limit {
                Some(limit) if self.seen >= limit => Some("limit reached".to_string()),
                _ => None,
            }
        }
    }

    fn pitch_of(events: &[Event]) -> i32 {
        match &events[0] {
            Event::Note(note) => note.pitch,
            other => panic!("expected a note, got {:?}", other),
        }
    }

    #[test]
    fn test_enabled_effect_processes() {
        let mut effect = Effect::new(Transpose::new(None));
        let out = effect.handle(Note::new(0.0, 60, 64, 1.0).into());
        assert_eq!(pitch_of(&out), 61);
    }

    #[test]
    fn test_control_change_reaches_parameters_and_is_forwarded() {
        let mut effect = Effect::new(Transpose::new(Some(20)));
        let out = effect.handle(ControlChange::new(0.0, 20, 12).into());
        assert_eq!(out.len(), 1, "control changes travel downstream");
        assert_eq!(effect.processor().amount.value(), 12.0);

        let out = effect.handle(Note::new(0.0, 60, 64, 1.0).into());
        assert_eq!(pitch_of(&out), 72);
    }

    #[test]
    fn test_disabled_effect_forwards_unchanged_but_tracks_controls() {
        let enabled = Parameter::switch("enabled", false, Some(21), 0.5).unwrap();
        let mut effect = Effect::new(Transpose::new(Some(20))).with_enabled(enabled);
        assert!(!effect.is_enabled());

        effect.handle(ControlChange::new(0.0, 20, 5).into());
        let out = effect.handle(Note::new(0.0, 60, 64, 1.0).into());
        assert_eq!(pitch_of(&out), 60);
        assert_eq!(effect.processor().amount.value(), 5.0);

        effect.handle(ControlChange::new(0.0, 21, 127).into());
        assert!(effect.is_enabled());
        let out = effect.handle(Note::new(0.0, 60, 64, 1.0).into());
        assert_eq!(pitch_of(&out), 65);
    }

    #[tokio::test]
    async fn test_run_fans_out_to_every_output() {
        let mut effect = Effect::new(Transpose::new(None)).named("fan");
        let (a, b) = (EventQueue::new(4), EventQueue::new(4));
        Node::connect(&mut effect, a.clone());
        Node::connect(&mut effect, b.clone());
        let input = Node::input(&effect);
        assert_eq!(Node::name(&effect), "fan");

        let handle = tokio::spawn(effect.run());
        input.put(Note::new(0.0, 60, 64, 1.0).into()).await;

        for queue in [a, b] {
            let event = tokio::time::timeout(Duration::from_secs(1), queue.get())
                .await
                .unwrap();
            assert!(matches!(event, Event::Note(n) if n.pitch == 61));
        }
        handle.abort();
    }

    #[tokio::test]
    async fn test_halted_processor_stops_before_forwarding() {
        let mut processor = Transpose::new(None);
        processor.limit = Some(2);
        let mut effect = Effect::new(processor);
        let out = EventQueue::new(4);
        Node::connect(&mut effect, out.clone());
        let input = Node::input(&effect);

        for start in [0.0, 1.0] {
            input.put(Note::new(start, 60, 64, 1.0).into()).await;
        }
        let completion = tokio::time::timeout(Duration::from_secs(1), effect.run())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(completion, Completion::Stop("limit reached".to_string()));
        assert_eq!(out.len(), 1);
    }
}
