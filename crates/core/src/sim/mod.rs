//! Simulation driver: owns the fabric and the traffic manager side-by-side.

use std::path::PathBuf;

use crate::common::{Cycle, SimError};
use crate::config::Config;
use crate::network::Network;
use crate::stats::{RouterActivity, StatsReport};
use crate::traffic::TrafficManager;

/// Top-level simulator: network fabric + traffic manager.
///
/// Each [`Simulator::step`] advances one cycle in the fixed phase order:
/// channel reads (with handshake evaluation), retirement, injection, power
/// evaluation, pipeline evaluation, channel writes, then monitoring.
#[derive(Debug)]
pub struct Simulator {
    /// The mesh fabric.
    pub net: Network,
    /// Workload, retirement, and policy engine.
    pub traffic: TrafficManager,
    cycle: Cycle,
    outdir: Option<PathBuf>,
}

impl Simulator {
    /// Builds a simulator from a validated configuration.
    ///
    /// # Errors
    ///
    /// Configuration errors are fatal at construction.
    pub fn new(config: &Config) -> Result<Self, SimError> {
        let net = Network::new(config)?;
        let traffic = TrafficManager::new(config, &net);
        Ok(Self {
            net,
            traffic,
            cycle: 0,
            outdir: config.sim.outdir.clone().map(PathBuf::from),
        })
    }

    /// Current simulation cycle.
    #[must_use]
    pub const fn cycle(&self) -> Cycle {
        self.cycle
    }

    /// Advances the simulation by one cycle.
    ///
    /// # Errors
    ///
    /// Invariant violations terminate the run; the caller logs and may
    /// dump state before exiting.
    pub fn step(&mut self) -> Result<(), SimError> {
        let cycle = self.cycle;
        self.net.read_inputs(cycle)?;
        self.traffic.eject(&mut self.net, cycle)?;
        self.traffic.inject(&mut self.net, cycle)?;
        self.net.power_state_evaluate(cycle)?;
        self.net.evaluate(cycle)?;
        self.net.write_outputs(cycle)?;
        self.traffic.monitor(&mut self.net, cycle);
        self.cycle += 1;
        Ok(())
    }

    /// Runs for `cycles` cycles.
    ///
    /// # Errors
    ///
    /// Stops at the first invariant violation.
    pub fn run(&mut self, cycles: u64) -> Result<(), SimError> {
        for _ in 0..cycles {
            self.step()?;
        }
        Ok(())
    }

    /// Steps until no events remain in flight or `limit` cycles pass.
    ///
    /// # Errors
    ///
    /// Stops at the first invariant violation.
    pub fn drain(&mut self, limit: u64) -> Result<(), SimError> {
        for _ in 0..limit {
            if !self.events_outstanding() {
                break;
            }
            self.step()?;
        }
        Ok(())
    }

    /// Whether any flit, credit, or handshake is in flight, any router is
    /// mid-transition, or any generated packet awaits injection.
    #[must_use]
    pub fn events_outstanding(&self) -> bool {
        self.net.events_outstanding() || self.traffic.has_pending_work()
    }

    /// Earliest future cycle a power-state timer fires, enabling
    /// discrete-event skipping in a quiescent network.
    #[must_use]
    pub fn next_power_event_cycle(&self) -> Option<Cycle> {
        self.net.next_power_event_cycle(self.cycle)
    }

    /// Assembles the end-of-run report.
    #[must_use]
    pub fn report(&self) -> StatsReport {
        let activities: Vec<RouterActivity> = self
            .net
            .routers()
            .iter()
            .map(|r| r.activity().clone())
            .collect();
        StatsReport::new(
            self.traffic.measure_start(),
            self.cycle,
            &self.traffic.stats,
            activities,
        )
    }

    /// Writes the JSON report to the configured output directory (or the
    /// working directory) and returns its path.
    ///
    /// # Errors
    ///
    /// Propagates report serialization and filesystem failures.
    pub fn write_report(&self) -> Result<PathBuf, SimError> {
        let outdir = self.outdir.clone().unwrap_or_else(|| PathBuf::from("."));
        self.report().write_json(&outdir)
    }
}
