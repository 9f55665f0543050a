/// Delay node - shifts every event later in time
///
/// All event kinds are moved, control changes included, so a delayed
/// phrase keeps its boundary markers.
use crate::event::Event;
use crate::node::Processor;
use crate::parameter::Parameter;

pub struct Delay {
    delay: Parameter,
}

impl Delay {
    /// Delay by `delay` seconds
    pub fn new(delay: Parameter) -> Self {
        Self { delay }
    }

    pub fn delay(&self) -> f64 {
        self.delay.value()
    }
}

impl Default for Delay {
    fn default() -> Self {
        Self::new(Parameter::constant(2.0))
    }
}

impl Processor for Delay {
    fn name(&self) -> &str {
        "Delay"
    }

    fn process(&mut self, events: Vec<Event>) -> Vec<Event> {
        let delay = self.delay.value();
        events
            .into_iter()
            .map(|mut event| {
                event.shift(delay);
                event
            })
            .collect()
    }

    fn parameters_mut(&mut self) -> Vec<&mut Parameter> {
        vec![&mut self.delay]
    }
}
