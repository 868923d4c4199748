use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::time::Duration;

use anyhow::{anyhow, Context as _};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::error::ThreadError;
use super::registry::ScriptRegistry;
use super::scheduler::{Scheduler, ThreadStats};
use super::thread::Thread;
use crate::config::Config;
use crate::host::Host;

/// Default tick rate for scripts (50ms = 20Hz)
const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(50);

/// Why a script session stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Every thread finished or was killed
    Idle,
    /// Threads remain, but all of them are paused or waiting on paused threads
    Stalled,
    /// The configured round limit was reached
    RoundLimit,
    /// The shutdown signal fired
    Interrupted,
}

impl fmt::Display for SessionEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            SessionEnd::Idle => "all threads done",
            SessionEnd::Stalled => "no runnable threads left",
            SessionEnd::RoundLimit => "round limit reached",
            SessionEnd::Interrupted => "interrupted",
        };
        f.write_str(reason)
    }
}

/// Outcome of a script session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Rounds run by this runner
    pub rounds: u64,
    /// Host ticks advanced by the scheduler
    pub ticks: u64,
    pub stats: ThreadStats,
    pub end: SessionEnd,
}

/// Launches scripts as root threads and drives the scheduler
pub struct ScriptRunner<H: Host> {
    scheduler: Scheduler<H>,
    registry: ScriptRegistry<H>,
    /// Per-script configuration (script ID -> config values)
    script_config: HashMap<String, toml::Value>,
    /// Root thread of every launched script
    launched: Vec<(&'static str, Thread<H>)>,
    /// Interval between rounds when paced (default 50ms for 20Hz)
    tick_interval: Duration,
    max_rounds: Option<u64>,
    rounds: u64,
}

impl<H: Host> ScriptRunner<H> {
    /// Create a new script runner with default tick rate (20Hz)
    pub fn new(host: H, registry: ScriptRegistry<H>) -> Self {
        Self::new_with_tick_rate(host, registry, DEFAULT_TICK_INTERVAL)
    }

    /// Create a new script runner with custom tick rate
    pub fn new_with_tick_rate(
        host: H,
        registry: ScriptRegistry<H>,
        tick_interval: Duration,
    ) -> Self {
        Self {
            scheduler: Scheduler::new(host),
            registry,
            script_config: HashMap::new(),
            launched: Vec::new(),
            tick_interval,
            max_rounds: None,
            rounds: 0,
        }
    }

    /// Create a script runner using the scheduler and scripting settings
    pub fn from_config(host: H, registry: ScriptRegistry<H>, config: &Config) -> Self {
        let mut runner =
            Self::new_with_tick_rate(host, registry, config.scheduler.tick_interval());
        runner.max_rounds = config.scheduler.max_rounds;
        runner.script_config = config.scripting.config.clone();
        runner
    }

    /// Stop sessions after `max_rounds` rounds
    pub fn with_max_rounds(mut self, max_rounds: Option<u64>) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    pub fn scheduler(&self) -> &Scheduler<H> {
        &self.scheduler
    }

    pub fn registry(&self) -> &ScriptRegistry<H> {
        &self.registry
    }

    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    /// Launch a registered script as a new root thread.
    ///
    /// The script runs until its first tick before this returns.
    pub fn launch(&mut self, id: &str) -> anyhow::Result<Thread<H>> {
        let mut script = self
            .registry
            .create(id)
            .ok_or_else(|| anyhow!("unknown script: {}", id))?;

        if let Some(config) = self.script_config.get(id) {
            script
                .configure(config)
                .with_context(|| format!("invalid config for script {}", id))?;
        }

        let (script_id, name) = (script.id(), script.name());
        let thread = self.scheduler.spawn_root(move |ctx| script.main(ctx))?;
        info!(target: "scripting", "Launched script {} ({}) as {}", name, script_id, thread);

        self.launched.push((script_id, thread.clone()));
        Ok(thread)
    }

    /// Launch each script in `ids`, skipping unknown or misconfigured ones.
    /// Returns how many were launched.
    pub fn launch_enabled(&mut self, ids: &[String]) -> usize {
        let mut launched = 0;
        for id in ids {
            match self.launch(id) {
                Ok(_) => launched += 1,
                Err(e) => warn!(target: "scripting", "Could not launch script {}: {:#}", id, e),
            }
        }
        launched
    }

    /// Get the number of launched scripts
    pub fn script_count(&self) -> usize {
        self.launched.len()
    }

    /// Get the IDs of all launched scripts
    pub fn script_ids(&self) -> Vec<&str> {
        self.launched.iter().map(|(id, _)| *id).collect()
    }

    /// Root thread of the first launched script with this id
    pub fn script_thread(&self, id: &str) -> Option<&Thread<H>> {
        self.launched
            .iter()
            .find(|(script_id, _)| *script_id == id)
            .map(|(_, thread)| thread)
    }

    /// Run one round unless the session is over
    pub fn step(&mut self) -> Result<Option<SessionEnd>, ThreadError> {
        if self.scheduler.is_idle() {
            return Ok(Some(SessionEnd::Idle));
        }
        if self.scheduler.is_stalled() {
            return Ok(Some(SessionEnd::Stalled));
        }
        if self.max_rounds.is_some_and(|max| self.rounds >= max) {
            return Ok(Some(SessionEnd::RoundLimit));
        }

        self.scheduler.run_round()?;
        self.rounds += 1;
        Ok(None)
    }

    /// Run rounds back to back until the session ends
    pub fn run_until_idle(&mut self) -> Result<RunSummary, ThreadError> {
        loop {
            if let Some(end) = self.step()? {
                return Ok(self.finish(end));
            }
        }
    }

    /// Run one round per tick interval until the session ends or `shutdown` completes
    pub async fn run_paced<F>(&mut self, shutdown: F) -> Result<RunSummary, ThreadError>
    where
        F: Future<Output = ()>,
    {
        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    debug!(
                        target: "scripting",
                        "Shutdown requested after {} round(s)",
                        self.rounds
                    );
                    return Ok(self.finish(SessionEnd::Interrupted));
                }
                _ = interval.tick() => {
                    if let Some(end) = self.step()? {
                        return Ok(self.finish(end));
                    }
                }
            }
        }
    }

    fn finish(&self, end: SessionEnd) -> RunSummary {
        let summary = RunSummary {
            rounds: self.rounds,
            ticks: self.scheduler.ticks(),
            stats: self.scheduler.stats(),
            end,
        };

        info!(
            target: "scripting",
            "Session ended ({}): {} round(s), {} finished, {} killed, {} faulted",
            end,
            summary.rounds,
            summary.stats.finished,
            summary.stats.killed,
            summary.stats.faulted
        );
        if end == SessionEnd::Stalled {
            warn!(
                target: "scripting",
                "{} thread(s) paused with nothing left to unpause them",
                summary.stats.paused
            );
        }

        summary
    }
}
