/// Pitch shift node - transposes notes by a rounded number of semitones
use super::clip_pitch;
use crate::event::Event;
use crate::node::Processor;
use crate::parameter::Parameter;

pub struct PitchShift {
    amount: Parameter,
}

impl PitchShift {
    pub fn new(amount: Parameter) -> Self {
        Self { amount }
    }

    pub fn amount(&self) -> f64 {
        self.amount.value()
    }
}

impl Default for PitchShift {
    fn default() -> Self {
        Self::new(Parameter::constant(2.0))
    }
}

impl Processor for PitchShift {
    fn name(&self) -> &str {
        "PitchShift"
    }

    fn process(&mut self, events: Vec<Event>) -> Vec<Event> {
        let semitones = self.amount.value().round() as i32;
        events
            .into_iter()
            .map(|event| match event {
                Event::Note(mut note) => {
                    note.pitch = clip_pitch(note.pitch + semitones);
                    Event::Note(note)
                }
                other => other,
            })
            .collect()
    }

    fn parameters_mut(&mut self) -> Vec<&mut Parameter> {
        vec![&mut self.amount]
    }
}
