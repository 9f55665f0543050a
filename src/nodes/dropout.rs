/// Dropout node - drops each note with probability `amount`
use crate::event::Event;
use crate::node::Processor;
use crate::parameter::Parameter;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub struct Dropout {
    amount: Parameter,
    rng: StdRng,
}

impl Dropout {
    pub fn new(amount: Parameter) -> Self {
        Self {
            amount,
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }
}

impl Default for Dropout {
    fn default() -> Self {
        Self::new(Parameter::constant(0.5))
    }
}

impl Processor for Dropout {
    fn name(&self) -> &str {
        "Dropout"
    }

    fn process(&mut self, events: Vec<Event>) -> Vec<Event> {
        let amount = self.amount.value();
        events
            .into_iter()
            .filter(|event| !event.is_note() || self.rng.gen::<f64>() > amount)
            .collect()
    }

    fn parameters_mut(&mut self) -> Vec<&mut Parameter> {
        vec![&mut self.amount]
    }
}
