/// Mirror node - reflects note pitches around a center pitch
use super::clip_pitch;
use crate::event::Event;
use crate::node::Processor;
use crate::parameter::Parameter;

/// Pitch `p` becomes `2 * round(center) - p`, clipped back into range by octaves
pub struct Mirror {
    center_pitch: Parameter,
}

impl Mirror {
    pub fn new(center_pitch: Parameter) -> Self {
        Self { center_pitch }
    }

    /// Fixed center pitch, bounded to the two octaves around A4
    pub fn around(center_pitch: f64) -> Self {
        Self::new(Parameter::fixed("center_pitch", center_pitch, 57.0, 81.0))
    }

    pub fn center_pitch(&self) -> f64 {
        self.center_pitch.value()
    }
}

impl Default for Mirror {
    fn default() -> Self {
        Self::around(69.0)
    }
}

impl Processor for Mirror {
    fn name(&self) -> &str {
        "Mirror"
    }

    fn process(&mut self, events: Vec<Event>) -> Vec<Event> {
        let axis = 2 * self.center_pitch.value().round() as i32;
        events
            .into_iter()
            .map(|event| match event {
                Event::Note(mut note) => {
                    note.pitch = clip_pitch(axis - note.pitch);
                    Event::Note(note)
                }
                other => other,
            })
            .collect()
    }

    fn parameters_mut(&mut self) -> Vec<&mut Parameter> {
        vec![&mut self.center_pitch]
    }
}
