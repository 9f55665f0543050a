/// Buffer delay node - records events and replays them after a trigger
///
/// Every incoming event, the trigger included, goes into a buffer. When a
/// control change matching the trigger's number and value arrives at time
/// `T`, the whole buffer is released with every start shifted by
/// `T - first_start + gap`, i.e. the recorded phrase is replayed starting
/// `gap` seconds after the trigger. Nothing is emitted between triggers.
use crate::event::{ControlChange, Event};
use crate::node::Processor;
use crate::parameter::Parameter;
use tracing::{debug, warn};

pub struct BufferDelay {
    trigger: ControlChange,
    gap: Parameter,
    buffer: Vec<Event>,
}

impl BufferDelay {
    pub fn new(trigger: ControlChange, gap: Parameter) -> Self {
        Self {
            trigger,
            gap,
            buffer: Vec::new(),
        }
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    fn flush(&mut self, trigger_start: f64) -> Vec<Event> {
        debug!("Emptying buffer of length {}", self.buffer.len());
        let first_start = match self.buffer.first() {
            Some(event) => event.start(),
            None => return Vec::new(),
        };
        let delay = trigger_start - first_start + self.gap.value();
        let mut flushed = std::mem::take(&mut self.buffer);
        for event in &mut flushed {
            event.shift(delay);
        }
        flushed
    }
}

impl Processor for BufferDelay {
    fn name(&self) -> &str {
        "Buffer delay"
    }

    fn process(&mut self, events: Vec<Event>) -> Vec<Event> {
        let mut out = Vec::new();
        for event in events {
            if let Some(last) = self.buffer.last() {
                if event.start() < last.start() {
                    warn!("Buffer encountered message with non-monotonic start time");
                }
            }
            let trigger_start = match &event {
                Event::ControlChange(cc) if cc.matches(&self.trigger) => Some(cc.start),
                _ => None,
            };
            self.buffer.push(event);
            if let Some(start) = trigger_start {
                out.extend(self.flush(start));
            }
        }
        out
    }

    fn parameters_mut(&mut self) -> Vec<&mut Parameter> {
        vec![&mut self.gap]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Note;

    fn phrase_end() -> ControlChange {
        ControlChange::new(0.0, 4, 0)
    }

    #[test]
    fn test_buffers_until_trigger() {
        let mut node = BufferDelay::new(phrase_end(), Parameter::constant(0.0));
        let out = node.process(vec![
            Note::new(1.0, 60, 64, 0.5).into(),
            ControlChange::new(1.5, 4, 120).into(),
            Note::new(2.0, 62, 64, 0.5).into(),
        ]);
        assert!(out.is_empty());
        assert_eq!(node.buffered(), 3);
    }

    #[test]
    fn test_flush_preserves_order_and_shifts() {
        let gap = 0.25;
        let mut node = BufferDelay::new(phrase_end(), Parameter::constant(gap));
        let starts = [10.0, 10.5, 11.25, 12.0];
        let events: Vec<Event> = starts
            .iter()
            .enumerate()
            .map(|(i, &s)| Note::new(s, 60 + i as i32, 64, 0.2).into())
            .collect();
        assert!(node.process(events).is_empty());

        let trigger_time = 13.0;
        let out = node.process(vec![ControlChange::new(trigger_time, 4, 0).into()]);
        assert_eq!(out.len(), starts.len() + 1, "the trigger is replayed too");
        for (i, &s) in starts.iter().enumerate() {
            let expected = trigger_time - starts[0] + gap + s;
            assert!((out[i].start() - expected).abs() < 1e-9);
            assert!(matches!(&out[i], Event::Note(n) if n.pitch == 60 + i as i32));
        }
        assert_eq!(node.buffered(), 0);
    }

    #[test]
    fn test_non_monotonic_input_is_kept() {
        let mut node = BufferDelay::new(phrase_end(), Parameter::constant(0.0));
        node.process(vec![
            Note::new(2.0, 60, 64, 0.5).into(),
            Note::new(1.0, 61, 64, 0.5).into(),
        ]);
        let out = node.process(vec![ControlChange::new(3.0, 4, 0).into()]);
        assert_eq!(out.len(), 3);
        assert!(matches!(&out[1], Event::Note(n) if n.pitch == 61 && n.start == 2.0));
    }

    #[test]
    fn test_other_control_values_do_not_trigger() {
        let mut node = BufferDelay::new(phrase_end(), Parameter::constant(0.0));
        let out = node.process(vec![
            Note::new(0.0, 60, 64, 0.5).into(),
            ControlChange::new(1.0, 4, 1).into(),
            ControlChange::new(1.0, 5, 0).into(),
        ]);
        assert!(out.is_empty());
    }
}
