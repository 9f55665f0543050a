//! Event logging sink
//!
//! [`EventLog`] is the one structure in a chain with several concurrent
//! writers. Appends go through a mutex in arrival order; the chain sorts the
//! log by start time when it flushes it to a file.

use crate::event::Event;
use crate::node::Processor;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Shared append-only list of events
#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<Event>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Event>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an event and return the new length of the log
    pub fn append(&self, event: Event) -> usize {
        let mut events = self.lock();
        events.push(event);
        events.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Drain the log, sorted by start time
    pub fn take_sorted(&self) -> Vec<Event> {
        let mut events = std::mem::take(&mut *self.lock());
        events.sort_by(|a, b| a.start().total_cmp(&b.start()));
        events
    }
}

/// Copies every event it sees into an [`EventLog`]
///
/// With `max_messages` set, the chain is stopped as soon as the log holds that many events.
pub struct MidiLogger {
    log: EventLog,
    override_channel: Option<u8>,
    max_messages: Option<usize>,
    logged: usize,
}

impl MidiLogger {
    pub fn new(log: EventLog) -> Self {
        Self {
            log,
            override_channel: None,
            max_messages: None,
            logged: 0,
        }
    }

    /// Log copies on this channel instead of their own
    pub fn with_channel(mut self, channel: u8) -> Self {
        self.override_channel = Some(channel);
        self
    }

    pub fn with_max_messages(mut self, max_messages: usize) -> Self {
        self.max_messages = Some(max_messages);
        self
    }
}

impl Processor for MidiLogger {
    fn name(&self) -> &str {
        "Logger"
    }

    fn process(&mut self, events: Vec<Event>) -> Vec<Event> {
        for event in &events {
            let mut copy = event.clone();
            if let Some(channel) = self.override_channel {
                copy.set_channel(channel);
            }
            debug!("Logging {}", copy);
            self.logged = self.log.append(copy);
        }
        events
    }

    fn halted(&self) -> Option<String> {
        match self.max_messages {
            Some(max) if self.logged >= max => {
                Some(format!("logged the maximum of {} messages", max))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{ControlChange, Note};

    #[test]
    fn test_take_sorted_drains_in_start_order() {
        let log = EventLog::new();
        for start in [3.0, 1.0, 2.0] {
            log.append(ControlChange::new(start, 1, 1).into());
        }
        let starts: Vec<f64> = log.take_sorted().iter().map(Event::start).collect();
        assert_eq!(starts, vec![1.0, 2.0, 3.0]);
        assert!(log.is_empty());
    }

    #[test]
    fn test_concurrent_appends_are_all_kept() {
        let log = EventLog::new();
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let log = log.clone();
                std::thread::spawn(move || {
                    for i in 0..250 {
                        log.append(Note::new((t * 1000 + i) as f64, 60, 64, 0.1).into());
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(log.len(), 2000);
    }

    #[test]
    fn test_logger_overrides_channel_of_the_copy_only() {
        let log = EventLog::new();
        let mut logger = MidiLogger::new(log.clone()).with_channel(9);
        let out = logger.process(vec![Note::new(0.0, 60, 64, 1.0).into()]);
        assert_eq!(out[0].channel(), Some(0));
        assert_eq!(log.take_sorted()[0].channel(), Some(9));
    }

    #[test]
    fn test_logger_halts_at_max_messages() {
        let log = EventLog::new();
        let mut logger = MidiLogger::new(log).with_max_messages(2);
        logger.process(vec![Note::new(0.0, 60, 64, 1.0).into()]);
        assert_eq!(logger.halted(), None);
        logger.process(vec![Note::new(1.0, 62, 64, 1.0).into()]);
        assert!(logger.halted().is_some());
    }
}
