/// Velocity shift node - pushes note velocities toward the loud or soft end
///
/// For `amount > 0` a velocity moves that fraction of the way toward 128,
/// otherwise that fraction of the way toward 0. Amounts are meant to lie in
/// the open interval (-1, 1), which keeps the result in range without clamping.
use crate::event::Event;
use crate::node::Processor;
use crate::parameter::Parameter;

pub struct VelocityShift {
    amount: Parameter,
}

impl VelocityShift {
    pub fn new(amount: Parameter) -> Self {
        Self { amount }
    }
}

impl Default for VelocityShift {
    fn default() -> Self {
        Self::new(Parameter::constant(0.2))
    }
}

fn shift_velocity(velocity: i32, amount: f64) -> i32 {
    let headroom = if amount > 0.0 {
        128 - velocity
    } else {
        velocity
    };
    velocity + (amount * headroom as f64) as i32
}

impl Processor for VelocityShift {
    fn name(&self) -> &str {
        "VelocityShift"
    }

    fn process(&mut self, events: Vec<Event>) -> Vec<Event> {
        let amount = self.amount.value();
        events
            .into_iter()
            .map(|event| match event {
                Event::Note(mut note) => {
                    note.velocity = shift_velocity(note.velocity, amount);
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positive_amount_moves_toward_128() {
        assert_eq!(shift_velocity(64, 0.5), 96);
        assert_eq!(shift_velocity(100, 0.2), 105);
    }

    #[test]
    fn test_negative_amount_moves_toward_zero() {
        assert_eq!(shift_velocity(64, -0.5), 32);
        // truncation toward zero: -0.3 * 10 = -3
        assert_eq!(shift_velocity(10, -0.3), 7);
    }

    #[test]
    fn test_stays_in_range_for_open_unit_interval() {
        for velocity in 0..128 {
            for amount in [-0.99, -0.5, 0.0, 0.5, 0.99] {
                let shifted = shift_velocity(velocity, amount);
                assert!((0..=128).contains(&shifted));
            }
        }
    }
}
