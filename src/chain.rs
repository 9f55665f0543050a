//! Chain orchestration
//!
//! A [`Chain`] wires its nodes in order (each node's output feeds the next
//! node's input, optionally the last node feeds the first) and then runs
//! every task of every node concurrently until one of these happens:
//!
//! - the interrupt signal fires (Ctrl-C for [`Chain::run`]) → [`RunOutcome::Interrupted`]
//! - a node asks to stop → [`RunOutcome::Stopped`]
//! - every task finishes → [`RunOutcome::Finished`]
//! - a task fails → the error is returned
//!
//! In every case the remaining tasks are aborted and the event log, when
//! there is one, is written to the log directory before `run` returns.

use crate::constants::RESTART_DELAY;
use crate::error::{MidiFxError, Result};
use crate::logger::EventLog;
use crate::midi_file::write_midi;
use crate::node::{Completion, Node};
use chrono::Local;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Connect each node to the next one, and the last one to the first if `looped`
pub fn connect_nodes(nodes: &mut [Box<dyn Node>], looped: bool) {
    for i in 1..nodes.len() {
        let input = nodes[i].input();
        nodes[i - 1].connect(input);
    }
    if looped {
        if let Some(first) = nodes.first() {
            let input = first.input();
            if let Some(last) = nodes.last_mut() {
                last.connect(input);
            }
        }
    }
}

/// Why a run ended
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Interrupted,
    Stopped(String),
    Finished,
}

/// A wired graph of nodes, ready to run once
pub struct Chain {
    nodes: Vec<Box<dyn Node>>,
    looped: bool,
    log: Option<EventLog>,
    log_dir: Option<PathBuf>,
}

impl Chain {
    pub fn new(nodes: Vec<Box<dyn Node>>, looped: bool) -> Result<Self> {
        if nodes.is_empty() {
            return Err(MidiFxError::InvalidConfig(
                "a chain needs at least one node".to_string(),
            ));
        }
        let mut nodes = nodes;
        connect_nodes(&mut nodes, looped);
        Ok(Self {
            nodes,
            looped,
            log: None,
            log_dir: None,
        })
    }

    /// Clear `log` when the run starts and write it to a file in `log_dir` when it ends
    pub fn with_log(mut self, log: EventLog, log_dir: Option<PathBuf>) -> Self {
        self.log = Some(log);
        self.log_dir = log_dir;
        self
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn is_looped(&self) -> bool {
        self.looped
    }

    pub fn node_names(&self) -> Vec<&str> {
        self.nodes.iter().map(|node| node.name()).collect()
    }

    /// Run until Ctrl-C, a stop request, completion or failure
    pub async fn run(self) -> Result<RunOutcome> {
        self.run_until(tokio::signal::ctrl_c()).await
    }

    /// Run with `interrupt` standing in for Ctrl-C
    pub async fn run_until<F>(self, interrupt: F) -> Result<RunOutcome>
    where
        F: Future<Output = std::io::Result<()>>,
    {
        let Chain {
            nodes,
            log,
            log_dir,
            ..
        } = self;
        if let Some(log) = &log {
            log.clear();
        }

        let warmup = nodes
            .iter()
            .map(|node| node.warmup())
            .max()
            .unwrap_or(Duration::ZERO);
        if !warmup.is_zero() {
            info!("Waiting {:.1}s for MIDI ports to start", warmup.as_secs_f64());
            tokio::time::sleep(warmup).await;
        }

        let mut tasks = JoinSet::new();
        for node in nodes {
            debug!("Starting {}", node.name());
            for task in node.into_tasks() {
                tasks.spawn(task);
            }
        }

        tokio::pin!(interrupt);
        let mut listening = true;
        let result = loop {
            tokio::select! {
                signal = &mut interrupt, if listening => match signal {
                    Ok(()) => {
                        info!("Interrupted...");
                        break Ok(RunOutcome::Interrupted);
                    }
                    Err(e) => {
                        warn!("Unable to listen for interrupts: {}", e);
                        listening = false;
                    }
                },
                joined = tasks.join_next() => match joined {
                    None => break Ok(RunOutcome::Finished),
                    Some(Ok(Ok(Completion::Finished))) => {}
                    Some(Ok(Ok(Completion::Stop(reason)))) => {
                        info!("Stopping: {}", reason);
                        break Ok(RunOutcome::Stopped(reason));
                    }
                    Some(Ok(Err(e))) => break Err(e),
                    Some(Err(e)) => break Err(MidiFxError::Task(e.to_string())),
                },
            }
        };
        tasks.shutdown().await;

        if let (Some(log), Some(dir)) = (&log, &log_dir) {
            if let Err(e) = flush_log(log, dir) {
                if result.is_ok() {
                    return Err(e);
                }
                warn!("Failed to write the MIDI log: {}", e);
            }
        }
        if result.is_ok() {
            info!("Stopped.");
        }
        result
    }
}

/// Write the sorted log to `<dir>/<YYYYmmdd-HHMMSS>.mid`
///
/// Returns the path written, or `None` when the log was empty.
pub fn flush_log(log: &EventLog, dir: &Path) -> Result<Option<PathBuf>> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("{}.mid", Local::now().format("%Y%m%d-%H%M%S")));
    info!("Writing MIDI to {}", path.display());
    let events = log.take_sorted();
    if write_midi(&path, &events, 0)? {
        Ok(Some(path))
    } else {
        Ok(None)
    }
}

/// What to do after an interrupted or stopped run
#[derive(Debug, Clone)]
pub struct RestartPolicy {
    pub restart_on_interrupt: bool,
    /// Pause before the chain is rebuilt; Ctrl-C during the pause stops for good
    pub delay: Duration,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            restart_on_interrupt: false,
            delay: RESTART_DELAY,
        }
    }
}

/// Build and run a chain, rebuilding it after every interrupt or stop if the policy says so
pub async fn run_with_restart<B>(build: B, policy: RestartPolicy) -> Result<RunOutcome>
where
    B: FnMut() -> Result<Chain>,
{
    run_with_restart_until(build, policy, || tokio::signal::ctrl_c()).await
}

/// [`run_with_restart`] with `interrupt` producing the stand-in for each Ctrl-C
pub async fn run_with_restart_until<B, I, F>(
    mut build: B,
    policy: RestartPolicy,
    mut interrupt: I,
) -> Result<RunOutcome>
where
    B: FnMut() -> Result<Chain>,
    I: FnMut() -> F,
    F: Future<Output = std::io::Result<()>>,
{
    loop {
        let outcome = build()?.run_until(interrupt()).await?;
        if outcome == RunOutcome::Finished || !policy.restart_on_interrupt {
            return Ok(outcome);
        }
        info!("Restarting... Press Ctrl-C again now to stop.");
        tokio::select! {
            _ = tokio::time::sleep(policy.delay) => {}
            signal = interrupt() => {
                if signal.is_ok() {
                    return Ok(outcome);
                }
            }
        }
    }
}
