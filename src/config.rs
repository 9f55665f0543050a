//! Run configuration
//!
//! A chain can be described in a TOML file:
//!
//! ```toml
//! looped = true
//! log_dir = "logs"
//! restart_on_interrupt = false
//!
//! [[nodes]]
//! type = "receive_midi"
//! port = "MidiFX in"
//!
//! [[nodes]]
//! type = "pitch_shift"
//! amount = { min = -5, max = 5, control = 4, mode = "random" }
//!
//! [[nodes]]
//! type = "buffer_delay"
//! gap = { control = 4, mode = "exponential", median = 0.5, max = 10 }
//!
//! [[nodes]]
//! type = "send_midi"
//! port = "MidiFX out"
//! ```
//!
//! A parameter is either a plain number or a table; a switch is either a
//! plain boolean or a table. Control numbers are checked when the chain is
//! built, before anything runs.

use crate::chain::{Chain, RestartPolicy};
use crate::constants::{control_numbers, DEFAULT_ENABLED, MAX_QUEUE_SIZE};
use crate::error::{MidiFxError, Result};
use crate::event::ControlChange;
use crate::logger::{EventLog, MidiLogger};
use crate::midi_file::{ReadMidi, ReadOptions};
use crate::midi_input::ReceiveMidi;
use crate::midi_output::SendMidi;
use crate::node::{Effect, Node, Processor};
use crate::nodes::{BufferDelay, Delay, Dropout, Mirror, PitchShift, VelocityShift};
use crate::parameter::{validate_control_number, Parameter};
use crate::pulse::SendPulse;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Everything needed to build and run one chain
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChainConfig {
    /// Feed the last node back into the first
    #[serde(default)]
    pub looped: bool,
    /// Where logged events are written when the chain stops
    pub log_dir: Option<PathBuf>,
    #[serde(default)]
    pub restart_on_interrupt: bool,
    /// Seconds to wait before a restart
    pub restart_delay: Option<f64>,
    /// Input queue capacity of effect nodes
    pub queue_capacity: Option<usize>,
    pub nodes: Vec<NodeConfig>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
pub enum NodeConfig {
    PitchShift {
        amount: Option<ParameterConfig>,
        enabled: Option<SwitchConfig>,
    },
    VelocityShift {
        amount: Option<ParameterConfig>,
        enabled: Option<SwitchConfig>,
    },
    Mirror {
        center_pitch: Option<ParameterConfig>,
        enabled: Option<SwitchConfig>,
    },
    Delay {
        delay: Option<ParameterConfig>,
        enabled: Option<SwitchConfig>,
    },
    Dropout {
        amount: Option<ParameterConfig>,
        enabled: Option<SwitchConfig>,
        seed: Option<u64>,
    },
    BufferDelay {
        trigger: Option<TriggerConfig>,
        gap: Option<ParameterConfig>,
        enabled: Option<SwitchConfig>,
    },
    ReadMidi {
        path: PathBuf,
        start_message: Option<TriggerConfig>,
        end_message: Option<TriggerConfig>,
        max_notes: Option<usize>,
        level: Option<f64>,
        #[serde(default)]
        all_keys: bool,
        programs: Option<Vec<u8>>,
        #[serde(default)]
        all_programs: bool,
    },
    ReceiveMidi {
        port: String,
        resolution: Option<f64>,
        warmup: Option<f64>,
    },
    SendMidi {
        port: String,
        resolution: Option<f64>,
        channel: Option<u8>,
        warmup: Option<f64>,
        enabled: Option<SwitchConfig>,
    },
    Logger {
        channel: Option<u8>,
        max_messages: Option<usize>,
    },
    Pulse {
        ioi: Option<f64>,
        pitch: Option<i32>,
        velocity: Option<i32>,
        duration: Option<f64>,
    },
}

/// A number, or a table describing a controllable parameter
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum ParameterConfig {
    Constant(f64),
    Controlled(ControlledParameter),
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ControlledParameter {
    pub name: Option<String>,
    pub initial: Option<f64>,
    #[serde(default)]
    pub min: f64,
    #[serde(default = "default_maximum")]
    pub max: f64,
    pub control: Option<i64>,
    #[serde(default)]
    pub mode: ParameterMode,
    /// Median of the exponential mode
    pub median: Option<f64>,
    pub seed: Option<u64>,
}

fn default_maximum() -> f64 {
    128.0
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterMode {
    #[default]
    Linear,
    Random,
    Exponential,
}

/// A boolean, or a table describing a controllable switch
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum SwitchConfig {
    Fixed(bool),
    Controlled(ControlledSwitch),
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ControlledSwitch {
    pub name: Option<String>,
    #[serde(default)]
    pub on: bool,
    pub control: Option<i64>,
    pub threshold: Option<f64>,
    /// Makes this a random switch, turned on with this probability
    pub probability: Option<f64>,
    pub seed: Option<u64>,
}

/// A control change used as a phrase marker or trigger
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TriggerConfig {
    pub number: i64,
    #[serde(default)]
    pub value: u8,
    #[serde(default)]
    pub channel: u8,
}

impl ParameterConfig {
    pub fn build(&self, default_name: &str) -> Result<Parameter> {
        let p = match self {
            ParameterConfig::Constant(value) => {
                return Ok(Parameter::fixed(default_name, *value, 0.0, default_maximum()))
            }
            ParameterConfig::Controlled(p) => p,
        };
        let name = p.name.as_deref().unwrap_or(default_name);
        let parameter = match p.mode {
            ParameterMode::Linear => Parameter::new(name, p.initial, p.control, p.min, p.max)?,
            ParameterMode::Random => Parameter::random(name, p.initial, p.control, p.min, p.max)?,
            ParameterMode::Exponential => Parameter::exponential_random(
                name,
                p.initial,
                p.control,
                p.median.unwrap_or(1.0),
                p.min,
                p.max,
            )?,
        };
        Ok(match p.seed {
            Some(seed) => parameter.with_seed(seed),
            None => parameter,
        })
    }
}

impl SwitchConfig {
    pub fn build(&self, default_name: &str) -> Result<Parameter> {
        let s = match self {
            SwitchConfig::Fixed(on) => return Ok(Parameter::always(*on)),
            SwitchConfig::Controlled(s) => s,
        };
        let name = s.name.as_deref().unwrap_or(default_name);
        let switch = match s.probability {
            Some(probability) => Parameter::random_switch(name, s.on, s.control, probability)?,
            None => Parameter::switch(name, s.on, s.control, s.threshold.unwrap_or(0.5))?,
        };
        Ok(match s.seed {
            Some(seed) => switch.with_seed(seed),
            None => switch,
        })
    }
}

impl TriggerConfig {
    pub fn build(&self) -> Result<ControlChange> {
        let number = validate_control_number(Some(self.number))?.unwrap_or_default();
        if self.value > 127 || self.channel > 15 {
            return Err(MidiFxError::InvalidConfig(format!(
                "trigger value must be in 0..=127 and channel in 0..=15, got {} and {}",
                self.value, self.channel
            )));
        }
        let mut cc = ControlChange::new(0.0, number, self.value);
        cc.channel = self.channel;
        Ok(cc)
    }
}

fn parameter(
    config: &Option<ParameterConfig>,
    name: &str,
    default: Parameter,
) -> Result<Parameter> {
    match config {
        Some(config) => config.build(name),
        None => Ok(default),
    }
}

fn switch(config: &Option<SwitchConfig>) -> Result<Parameter> {
    match config {
        Some(config) => config.build("enabled"),
        None => Ok(Parameter::always(DEFAULT_ENABLED)),
    }
}

fn effect<P: Processor>(
    processor: P,
    enabled: &Option<SwitchConfig>,
    capacity: usize,
) -> Result<Box<dyn Node>> {
    Ok(Box::new(
        Effect::new(processor)
            .with_enabled(switch(enabled)?)
            .with_queue_capacity(capacity),
    ))
}

/// Seconds from the file as a duration; negative values count as zero
fn seconds(field: &str, value: Option<f64>) -> Result<Option<Duration>> {
    value
        .map(|s| {
            Duration::try_from_secs_f64(s.max(0.0)).map_err(|_| {
                MidiFxError::InvalidConfig(format!(
                    "{} must be a finite number of seconds, got {}",
                    field, s
                ))
            })
        })
        .transpose()
}

impl NodeConfig {
    /// Build the node; `log` is the sink for logger nodes
    pub fn build(&self, log: &EventLog, capacity: usize) -> Result<Box<dyn Node>> {
        match self {
            NodeConfig::PitchShift { amount, enabled } => {
                let amount = parameter(amount, "amount", Parameter::constant(2.0))?;
                effect(PitchShift::new(amount), enabled, capacity)
            }
            NodeConfig::VelocityShift { amount, enabled } => {
                let amount = parameter(amount, "amount", Parameter::constant(0.2))?;
                effect(VelocityShift::new(amount), enabled, capacity)
            }
            NodeConfig::Mirror {
                center_pitch,
                enabled,
            } => {
                let mirror = match center_pitch {
                    Some(config) => Mirror::new(config.build("center_pitch")?),
                    None => Mirror::default(),
                };
                effect(mirror, enabled, capacity)
            }
            NodeConfig::Delay { delay, enabled } => {
                let delay = parameter(delay, "delay", Parameter::constant(2.0))?;
                effect(Delay::new(delay), enabled, capacity)
            }
            NodeConfig::Dropout {
                amount,
                enabled,
                seed,
            } => {
                let amount = parameter(amount, "amount", Parameter::constant(0.5))?;
                let dropout = match seed {
                    Some(seed) => Dropout::new(amount).with_seed(*seed),
                    None => Dropout::new(amount),
                };
                effect(dropout, enabled, capacity)
            }
            NodeConfig::BufferDelay {
                trigger,
                gap,
                enabled,
            } => {
                let trigger = match trigger {
                    Some(trigger) => trigger.build()?,
                    None => ControlChange::new(0.0, control_numbers::END_MESSAGE, 0),
                };
                let gap = parameter(gap, "gap", Parameter::constant(0.0))?;
                effect(BufferDelay::new(trigger, gap), enabled, capacity)
            }
            NodeConfig::ReadMidi {
                path,
                start_message,
                end_message,
                max_notes,
                level,
                all_keys,
                programs,
                all_programs,
            } => {
                let defaults = ReadOptions::default();
                let options = ReadOptions {
                    start_message: start_message.as_ref().map(TriggerConfig::build).transpose()?,
                    end_message: end_message.as_ref().map(TriggerConfig::build).transpose()?,
                    max_notes: *max_notes,
                    level: level.unwrap_or(defaults.level),
                    all_keys: *all_keys,
                    programs: if *all_programs {
                        None
                    } else {
                        programs.clone().or(defaults.programs)
                    },
                };
                Ok(Box::new(ReadMidi::open(path, options)?))
            }
            NodeConfig::ReceiveMidi {
                port,
                resolution,
                warmup,
            } => {
                let resolution = seconds("resolution", *resolution)?;
                let warmup = seconds("warmup", *warmup)?;
                let mut node = ReceiveMidi::open(port)?;
                if let Some(resolution) = resolution {
                    node = node.with_resolution(resolution.as_secs_f64());
                }
                if let Some(warmup) = warmup {
                    node = node.with_warmup(warmup);
                }
                Ok(Box::new(node))
            }
            NodeConfig::SendMidi {
                port,
                resolution,
                channel,
                warmup,
                enabled,
            } => {
                let resolution = seconds("resolution", *resolution)?;
                let warmup = seconds("warmup", *warmup)?;
                let enabled = switch(enabled)?;
                let mut node = SendMidi::open(port)?.with_enabled(enabled);
                if let Some(resolution) = resolution {
                    node = node.with_resolution(resolution.as_secs_f64());
                }
                if let Some(channel) = channel {
                    node = node.with_channel(*channel);
                }
                if let Some(warmup) = warmup {
                    node = node.with_warmup(warmup);
                }
                Ok(Box::new(node))
            }
            NodeConfig::Logger {
                channel,
                max_messages,
            } => {
                let mut logger = MidiLogger::new(log.clone());
                if let Some(channel) = channel {
                    logger = logger.with_channel(*channel);
                }
                if let Some(max) = max_messages {
                    logger = logger.with_max_messages(*max);
                }
                Ok(Box::new(Effect::new(logger).with_queue_capacity(capacity)))
            }
            NodeConfig::Pulse {
                ioi,
                pitch,
                velocity,
                duration,
            } => {
                let pulse = SendPulse::new(ioi.unwrap_or(0.25)).with_note(
                    pitch.unwrap_or(69),
                    velocity.unwrap_or(64),
                    duration.unwrap_or(0.1),
                );
                Ok(Box::new(pulse))
            }
        }
    }
}

impl ChainConfig {
    /// Load from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse from TOML content
    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Build a fresh chain, logging into `log`
    ///
    /// Every call opens new ports and reloads files, so a chain can be
    /// rebuilt after each run.
    pub fn build(&self, log: &EventLog) -> Result<Chain> {
        let capacity = self.queue_capacity.unwrap_or(MAX_QUEUE_SIZE);
        let nodes = self
            .nodes
            .iter()
            .map(|node| node.build(log, capacity))
            .collect::<Result<Vec<_>>>()?;
        let chain = Chain::new(nodes, self.looped)?.with_log(log.clone(), self.log_dir.clone());
        info!("Built chain: {}", chain.node_names().join(" -> "));
        Ok(chain)
    }

    pub fn restart_policy(&self) -> Result<RestartPolicy> {
        let defaults = RestartPolicy::default();
        Ok(RestartPolicy {
            restart_on_interrupt: self.restart_on_interrupt,
            delay: seconds("restart_delay", self.restart_delay)?.unwrap_or(defaults.delay),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EFFECTS: &str = r#"
        looped = true
        queue_capacity = 16
        restart_delay = 0.5

        [[nodes]]
        type = "pitch_shift"
        amount = 12

        [[nodes]]
        type = "velocity_shift"
        amount = { initial = 0.1, min = -0.5, max = 0.5, control = 7 }
        enabled = { on = true, control = 8, threshold = 0.25 }

        [[nodes]]
        type = "buffer_delay"
        gap = { control = 4, mode = "exponential", median = 0.5, max = 10 }

        [[nodes]]
        type = "mirror"
        enabled = { control = 4, probability = 0.3 }

        [[nodes]]
        type = "logger"
        max_messages = 100
    "#;

    #[test]
    fn test_parse_and_build() {
        let config = ChainConfig::parse(EFFECTS).unwrap();
        assert!(config.looped);
        assert_eq!(config.nodes.len(), 5);
        let policy = config.restart_policy().unwrap();
        assert_eq!(policy.delay, Duration::from_millis(500));
        assert!(!policy.restart_on_interrupt);

        let chain = config.build(&EventLog::new()).unwrap();
        assert_eq!(
            chain.node_names(),
            vec!["PitchShift", "VelocityShift", "Buffer delay", "Mirror", "Logger"]
        );
        assert!(chain.is_looped());
    }

    #[test]
    fn test_parameter_forms() {
        let constant = ParameterConfig::Constant(3.0).build("x").unwrap();
        assert_eq!(constant.value(), 3.0);
        assert_eq!(constant.control_number(), None);

        #[derive(Deserialize)]
        struct Holder {
            p: ParameterConfig,
        }
        let holder: Holder =
            toml::from_str("p = { min = -5, max = 5, control = 4, mode = \"random\" }").unwrap();
        let random = holder.p.build("amount").unwrap();
        assert_eq!(random.name(), "amount");
        assert_eq!(random.control_number(), Some(4));
        assert_eq!(random.value(), -5.0);
        assert_eq!(random.maximum(), 5.0);
    }

    #[test]
    fn test_switch_forms() {
        assert!(!SwitchConfig::Fixed(false).build("enabled").unwrap().is_on());
        let controlled = SwitchConfig::Controlled(ControlledSwitch {
            name: None,
            on: true,
            control: Some(9),
            threshold: None,
            probability: None,
            seed: None,
        })
        .build("enabled")
        .unwrap();
        assert!(controlled.is_on());
        assert_eq!(controlled.control_number(), Some(9));
    }

    #[test]
    fn test_invalid_control_number_fails_the_build() {
        let config = ChainConfig::parse(
            r#"
            [[nodes]]
            type = "pitch_shift"
            amount = { control = 200 }
            "#,
        )
        .unwrap();
        assert!(matches!(
            config.build(&EventLog::new()),
            Err(MidiFxError::InvalidControlNumber(200))
        ));
    }

    #[test]
    fn test_invalid_trigger_fails_the_build() {
        let config = ChainConfig::parse(
            r#"
            [[nodes]]
            type = "buffer_delay"
            trigger = { number = 4, value = 200 }
            "#,
        )
        .unwrap();
        assert!(matches!(
            config.build(&EventLog::new()),
            Err(MidiFxError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_infinite_durations_are_config_errors() {
        let config = ChainConfig::parse("restart_delay = inf\nnodes = []\n").unwrap();
        assert!(matches!(
            config.restart_policy(),
            Err(MidiFxError::InvalidConfig(_))
        ));

        let config = ChainConfig::parse(
            r#"
            [[nodes]]
            type = "send_midi"
            port = "nowhere"
            resolution = inf
            "#,
        )
        .unwrap();
        let node = &config.nodes[0];
        assert!(matches!(
            node.build(&EventLog::new(), MAX_QUEUE_SIZE),
            Err(MidiFxError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_negative_durations_count_as_zero() {
        assert_eq!(seconds("warmup", Some(-1.0)).unwrap(), Some(Duration::ZERO));
        assert_eq!(seconds("warmup", None).unwrap(), None);
        assert!(seconds("warmup", Some(f64::NEG_INFINITY)).unwrap().is_some());
    }

    #[test]
    fn test_unknown_node_type_is_a_config_error() {
        let err = ChainConfig::parse("[[nodes]]\ntype = \"reverb\"\n").unwrap_err();
        assert!(matches!(err, MidiFxError::InvalidConfig(_)));
    }

    #[test]
    fn test_empty_chain_is_a_config_error() {
        let config = ChainConfig::parse("nodes = []\n").unwrap();
        assert!(matches!(
            config.build(&EventLog::new()),
            Err(MidiFxError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_missing_midi_file_fails_the_build() {
        let config = ChainConfig::parse(
            r#"
            [[nodes]]
            type = "read_midi"
            path = "/definitely/not/here.mid"
            "#,
        )
        .unwrap();
        assert!(matches!(
            config.build(&EventLog::new()),
            Err(MidiFxError::Io(_))
        ));
    }
}
