//! Remotely controllable node parameters
//!
//! A [`Parameter`] holds the current value of one knob of a node. When it is
//! bound to a control number, every control change with that number updates it:
//!
//! - [`Modulation::Linear`]: the control value is mapped onto `minimum..maximum`
//! - [`Modulation::Random`]: any non-zero control value rerolls a random value in that range
//! - [`Modulation::ExponentialRandom`]: any non-zero control value draws from an
//!   exponential distribution with the configured median, clamped into the range
//! - [`Modulation::Switch`]: on iff `value / 128 >= threshold`
//! - [`Modulation::RandomSwitch`]: any non-zero control value turns the switch on
//!   with the configured probability
//!
//! A control value of 0 never triggers the random variants, so a single shared
//! "phrase boundary" message can reroll many parameters at once while its
//! closing message (value 0) leaves them alone.

use crate::error::{MidiFxError, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;

/// How a parameter reacts to a matching control change
#[derive(Debug, Clone, PartialEq)]
pub enum Modulation {
    Linear,
    Random,
    ExponentialRandom { median: f64 },
    Switch { threshold: f64 },
    RandomSwitch { threshold: f64, probability: f64 },
}

/// A bounded value, optionally bound to a MIDI control number
#[derive(Debug, Clone)]
pub struct Parameter {
    name: String,
    value: f64,
    minimum: f64,
    range: f64,
    control_number: Option<u8>,
    modulation: Modulation,
    rng: StdRng,
}

/// Check that a control number fits in 7 bits
pub fn validate_control_number(number: Option<i64>) -> Result<Option<u8>> {
    match number {
        None => Ok(None),
        Some(n) if (0..=127).contains(&n) => Ok(Some(n as u8)),
        Some(n) => Err(MidiFxError::InvalidControlNumber(n)),
    }
}

impl Parameter {
    fn build(
        name: &str,
        value: f64,
        control_number: Option<i64>,
        minimum: f64,
        maximum: f64,
        modulation: Modulation,
    ) -> Result<Self> {
        Ok(Self {
            name: name.to_string(),
            value,
            minimum,
            range: maximum - minimum,
            control_number: validate_control_number(control_number)?,
            modulation,
            rng: StdRng::from_entropy(),
        })
    }

    /// Linear parameter mapping control values onto `minimum..maximum`
    ///
    /// Starts at `initial`, or at `minimum` when no initial value is given.
    pub fn new(
        name: &str,
        initial: Option<f64>,
        control_number: Option<i64>,
        minimum: f64,
        maximum: f64,
    ) -> Result<Self> {
        let value = initial.unwrap_or(minimum);
        Self::build(name, value, control_number, minimum, maximum, Modulation::Linear)
    }

    /// Fixed value that no control change can reach
    pub fn constant(value: f64) -> Self {
        Self {
            name: "parameter".to_string(),
            value,
            minimum: 0.0,
            range: 128.0,
            control_number: None,
            modulation: Modulation::Linear,
            rng: StdRng::from_entropy(),
        }
    }

    /// Named value with bounds but no control binding
    pub fn fixed(name: &str, value: f64, minimum: f64, maximum: f64) -> Self {
        Self {
            name: name.to_string(),
            minimum,
            range: maximum - minimum,
            ..Self::constant(value)
        }
    }

    /// Parameter rerolled uniformly in `minimum..maximum` by non-zero control values
    pub fn random(
        name: &str,
        initial: Option<f64>,
        control_number: Option<i64>,
        minimum: f64,
        maximum: f64,
    ) -> Result<Self> {
        let value = initial.unwrap_or(minimum);
        Self::build(name, value, control_number, minimum, maximum, Modulation::Random)
    }

    /// Parameter rerolled from an exponential distribution with the given median
    ///
    /// Starts at the median unless an initial value is given.
    pub fn exponential_random(
        name: &str,
        initial: Option<f64>,
        control_number: Option<i64>,
        median: f64,
        minimum: f64,
        maximum: f64,
    ) -> Result<Self> {
        let value = initial.unwrap_or(median);
        Self::build(
            name,
            value,
            control_number,
            minimum,
            maximum,
            Modulation::ExponentialRandom { median },
        )
    }

    /// On/off switch, on iff `control_value / 128 >= threshold`
    pub fn switch(
        name: &str,
        initial: bool,
        control_number: Option<i64>,
        threshold: f64,
    ) -> Result<Self> {
        Self::build(
            name,
            bool_value(initial),
            control_number,
            0.0,
            128.0,
            Modulation::Switch { threshold },
        )
    }

    /// Switch that turns on with `probability` on every non-zero control value
    pub fn random_switch(
        name: &str,
        initial: bool,
        control_number: Option<i64>,
        probability: f64,
    ) -> Result<Self> {
        Self::build(
            name,
            bool_value(initial),
            control_number,
            0.0,
            128.0,
            Modulation::RandomSwitch {
                threshold: 0.5,
                probability,
            },
        )
    }

    /// Switch fixed in one position
    pub fn always(on: bool) -> Self {
        Self {
            name: "switch".to_string(),
            value: bool_value(on),
            minimum: 0.0,
            range: 128.0,
            control_number: None,
            modulation: Modulation::Switch { threshold: 0.5 },
            rng: StdRng::from_entropy(),
        }
    }

    /// Replace the random source, for reproducible rerolls
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    /// Switch position; for numeric parameters, whether the value is non-zero
    pub fn is_on(&self) -> bool {
        self.value != 0.0
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn minimum(&self) -> f64 {
        self.minimum
    }

    pub fn maximum(&self) -> f64 {
        self.minimum + self.range
    }

    pub fn control_number(&self) -> Option<u8> {
        self.control_number
    }

    pub fn modulation(&self) -> &Modulation {
        &self.modulation
    }

    /// Apply a control change; a no-op unless `number` is this parameter's control number
    pub fn control_change(&mut self, number: u8, value: u8) {
        if self.control_number != Some(number) {
            return;
        }
        match self.modulation.clone() {
            Modulation::Linear => self.remap(value as f64),
            Modulation::Switch { threshold } => self.flip(value as f64, threshold),
            _ if value == 0 => {}
            Modulation::Random => {
                let draw = self.rng.gen_range(0..128u8);
                self.remap(draw as f64);
            }
            Modulation::ExponentialRandom { median } => {
                let rate = std::f64::consts::LN_2 / median;
                let u: f64 = self.rng.gen();
                let draw = -(1.0 - u).ln() / rate;
                let new_value = draw.min(self.maximum()).max(self.minimum);
                self.update(new_value);
            }
            Modulation::RandomSwitch {
                threshold,
                probability,
            } => {
                let synthetic = if self.rng.gen::<f64>() < probability {
                    127.0
                } else {
                    0.0
                };
                self.flip(synthetic, threshold);
            }
        }
    }

    fn remap(&mut self, control_value: f64) {
        let new_value = self.minimum + control_value / 128.0 * self.range;
        self.update(new_value);
    }

    fn update(&mut self, new_value: f64) {
        info!(
            "Updating parameter '{}' from {:.3} to {:.3}",
            self.name, self.value, new_value
        );
        self.value = new_value;
    }

    fn flip(&mut self, control_value: f64, threshold: f64) {
        let on = control_value / 128.0 >= threshold;
        self.value = bool_value(on);
        info!(
            "Updating switch '{}' to {}",
            self.name,
            if on { "ON" } else { "OFF" }
        );
    }
}

fn bool_value(on: bool) -> f64 {
    if on {
        1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_reroll_with_inverted_bounds_settles_on_minimum() {
        let mut gap = Parameter::exponential_random("gap", None, Some(4), 0.5, 5.0, 1.0)
            .unwrap()
            .with_seed(3);
        for _ in 0..20 {
            gap.control_change(4, 120);
            assert_eq!(gap.value(), 5.0);
        }
    }

    #[test]
    fn test_invalid_control_number_is_rejected() {
        let err = Parameter::new("p", None, Some(128), 0.0, 1.0).unwrap_err();
        assert!(matches!(err, MidiFxError::InvalidControlNumber(128)));
        assert!(Parameter::switch("s", true, Some(-1), 0.5).is_err());
        assert!(Parameter::new("p", None, Some(127), 0.0, 1.0).is_ok());
    }

    #[test]
    fn test_linear_remap_boundaries() {
        let mut p = Parameter::new("p", Some(0.5), Some(10), -5.0, 5.0).unwrap();
        assert_eq!(p.value(), 0.5);

        p.control_change(10, 0);
        assert_eq!(p.value(), -5.0);

        p.control_change(10, 127);
        let quantum = 10.0 / 128.0;
        assert!((p.maximum() - p.value()).abs() <= quantum + 1e-12);

        p.control_change(10, 64);
        assert_eq!(p.value(), 0.0);
    }

    #[test]
    fn test_other_control_numbers_are_ignored() {
        let mut p = Parameter::new("p", Some(3.0), Some(10), 0.0, 128.0).unwrap();
        p.control_change(11, 100);
        assert_eq!(p.value(), 3.0);

        let mut unbound = Parameter::constant(2.0);
        for number in 0..128 {
            unbound.control_change(number, 64);
        }
        assert_eq!(unbound.value(), 2.0);
    }

    #[test]
    fn test_initial_value_defaults() {
        let p = Parameter::new("p", None, None, 3.0, 4.0).unwrap();
        assert_eq!(p.value(), 3.0);
        let e = Parameter::exponential_random("e", None, None, 0.5, 0.0, 128.0).unwrap();
        assert_eq!(e.value(), 0.5);
    }

    #[test]
    fn test_switch_threshold() {
        let mut s = Parameter::switch("s", false, Some(4), 0.5).unwrap();
        assert!(!s.is_on());
        s.control_change(4, 64);
        assert!(s.is_on());
        s.control_change(4, 63);
        assert!(!s.is_on());
    }

    #[test]
    fn test_random_parameter_rerolls_once_per_nonzero_value() {
        let seed = 7;
        let mut p = Parameter::random("p", Some(0.0), Some(4), -5.0, 5.0)
            .unwrap()
            .with_seed(seed);

        p.control_change(4, 0);
        assert_eq!(p.value(), 0.0, "value 0 never rerolls");

        let mut reference = StdRng::seed_from_u64(seed);
        for trigger in [1u8, 120, 127] {
            p.control_change(4, trigger);
            let draw = reference.gen_range(0..128u8) as f64;
            assert_eq!(p.value(), -5.0 + draw / 128.0 * 10.0);
        }
    }

    #[test]
    fn test_exponential_random_stays_in_range() {
        let mut p = Parameter::exponential_random("gap", None, Some(4), 0.5, 0.1, 2.0)
            .unwrap()
            .with_seed(3);
        let before = p.value();
        p.control_change(4, 0);
        assert_eq!(p.value(), before);

        for _ in 0..500 {
            p.control_change(4, 120);
            assert!(p.value() >= 0.1 && p.value() <= 2.0);
        }
    }

    #[test]
    fn test_exponential_random_median() {
        let mut p = Parameter::exponential_random("gap", None, Some(4), 0.5, 0.0, 1000.0)
            .unwrap()
            .with_seed(11);
        let mut draws: Vec<f64> = (0..4001)
            .map(|_| {
                p.control_change(4, 1);
                p.value()
            })
            .collect();
        draws.sort_by(|a, b| a.total_cmp(b));
        let median = draws[2000];
        assert!((median - 0.5).abs() < 0.05, "median was {}", median);
    }

    #[test]
    fn test_random_switch() {
        let mut always = Parameter::random_switch("m", false, Some(4), 1.0).unwrap();
        always.control_change(4, 0);
        assert!(!always.is_on());
        always.control_change(4, 1);
        assert!(always.is_on());

        let mut never = Parameter::random_switch("m", true, Some(4), 0.0).unwrap();
        never.control_change(4, 0);
        assert!(never.is_on());
        never.control_change(4, 90);
        assert!(!never.is_on());
    }
}
