//! Simulation statistics collection and reporting.
//!
//! This module tracks performance metrics for the mesh simulator. It provides:
//! 1. **Histograms:** Packet, network, queueing, and flit latency; fragmentation;
//!    hop and bypass-hop counts.
//! 2. **Per-router activity:** Buffer reads/writes, crossbar switches, power-off
//!    cycles, drain attempts/timeouts, and bypass counters.
//! 3. **Reporting:** A JSON report written to `outdir/meshstats[.N].json` and a
//!    human-readable section dump.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::common::{Cycle, SimError};

/// Sample accumulator tracking count, sum, and extrema.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Histogram {
    count: u64,
    sum: u64,
    min: Option<u64>,
    max: Option<u64>,
}

impl Histogram {
    /// Creates an empty histogram.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            count: 0,
            sum: 0,
            min: None,
            max: None,
        }
    }

    /// Adds one sample.
    pub fn add(&mut self, sample: u64) {
        self.count += 1;
        self.sum += sample;
        self.min = Some(self.min.map_or(sample, |m| m.min(sample)));
        self.max = Some(self.max.map_or(sample, |m| m.max(sample)));
    }

    /// Drops all samples.
    pub fn clear(&mut self) {
        *self = Self::new();
    }

    /// Number of samples.
    #[must_use]
    pub const fn count(&self) -> u64 {
        self.count
    }

    /// Mean of the samples, or zero when empty.
    #[must_use]
    pub fn average(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum as f64 / self.count as f64
        }
    }

    /// Smallest sample, if any.
    #[must_use]
    pub const fn minimum(&self) -> Option<u64> {
        self.min
    }

    /// Largest sample, if any.
    #[must_use]
    pub const fn maximum(&self) -> Option<u64> {
        self.max
    }
}

/// Per-router activity counters surfaced in the report.
#[derive(Debug, Clone, Default)]
pub struct RouterActivity {
    /// Flits read out of input buffers.
    pub buffer_reads: u64,
    /// Flits written into input buffers.
    pub buffer_writes: u64,
    /// Crossbar traversals granted.
    pub crossbar_switches: u64,
    /// Cycles spent in the off state.
    pub power_off_cycles: u64,
    /// Drain attempts started.
    pub drain_attempts: u64,
    /// Drains aborted by timeout.
    pub drain_timeouts: u64,
    /// Completed off-to-waking transitions.
    pub wake_events: u64,
    /// Flits forwarded on the bypass path.
    pub bypassed_flits: u64,
    /// VC watchdog / transition recoveries back to route compute.
    pub vc_recoveries: u64,
    /// Speculative grants discarded against non-speculative ones.
    pub crossbar_conflicts: u64,
    drain_time_sum: u64,
    drain_time_count: u64,
    drain_time_min: Option<u64>,
    drain_time_max: Option<u64>,
}

impl RouterActivity {
    /// Records the length of a finished (or aborted) drain.
    pub fn record_drain_time(&mut self, cycles: u64) {
        self.drain_time_sum += cycles;
        self.drain_time_count += 1;
        self.drain_time_min = Some(self.drain_time_min.map_or(cycles, |m| m.min(cycles)));
        self.drain_time_max = Some(self.drain_time_max.map_or(cycles, |m| m.max(cycles)));
    }

    /// Mean drain length in cycles.
    #[must_use]
    pub fn drain_time_average(&self) -> f64 {
        if self.drain_time_count == 0 {
            0.0
        } else {
            self.drain_time_sum as f64 / self.drain_time_count as f64
        }
    }
}

/// Aggregate latency and throughput statistics for one run.
#[derive(Debug, Clone, Default)]
pub struct NetStats {
    /// Packet latency: retirement minus generation.
    pub packet_latency: Histogram,
    /// Network latency: retirement minus injection.
    pub network_latency: Histogram,
    /// Queueing latency: injection minus generation.
    pub queueing_latency: Histogram,
    /// Per-flit latency.
    pub flit_latency: Histogram,
    /// Fragmentation: tail retirement minus head retirement per packet.
    pub fragmentation: Histogram,
    /// Hops per retired packet.
    pub hops: Histogram,
    /// Bypass hops per retired packet.
    pub flov_hops: Histogram,
    /// Flits injected into the network.
    pub flits_injected: u64,
    /// Flits retired from the network.
    pub flits_retired: u64,
    /// Packets generated at the sources.
    pub packets_generated: u64,
    /// Packets fully retired.
    pub packets_retired: u64,
    /// Set when any packet exceeded the slow-packet threshold.
    pub slow_packet_flagged: bool,
}

impl NetStats {
    /// Clears every histogram and counter (end of warm-up).
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Latency summary of one histogram in the JSON report.
#[derive(Debug, Serialize)]
pub struct LatencySummary {
    /// Mean in cycles.
    pub average: f64,
    /// Smallest sample.
    pub minimum: u64,
    /// Largest sample.
    pub maximum: u64,
}

impl From<&Histogram> for LatencySummary {
    fn from(h: &Histogram) -> Self {
        Self {
            average: h.average(),
            minimum: h.minimum().unwrap_or(0),
            maximum: h.maximum().unwrap_or(0),
        }
    }
}

/// Per-router entry of the JSON report.
#[derive(Debug, Serialize)]
pub struct RouterReport {
    /// Flits read out of input buffers.
    pub reads: u64,
    /// Flits written into input buffers.
    pub writes: u64,
    /// Crossbar traversals.
    pub switches: u64,
    /// Cycles spent off.
    #[serde(rename = "power-off-cycles")]
    pub power_off_cycles: u64,
    /// Drain attempts started.
    #[serde(rename = "drain-attempts")]
    pub drain_attempts: u64,
    /// Drains aborted by timeout.
    #[serde(rename = "drain-timeouts")]
    pub drain_timeouts: u64,
    /// Flits forwarded on the bypass path.
    #[serde(rename = "bypassed-flits")]
    pub bypassed_flits: u64,
}

/// The persisted end-of-run report.
#[derive(Debug, Serialize)]
pub struct StatsReport {
    /// First measured cycle.
    pub start: Cycle,
    /// Last simulated cycle.
    pub end: Cycle,
    /// Total cycles simulated.
    pub cycles: Cycle,
    /// Per-router activity, indexed by router id.
    pub routers: Vec<RouterReport>,
    /// Packet latency summary.
    #[serde(rename = "packet-latency")]
    pub packet_latency: LatencySummary,
    /// Network latency summary.
    #[serde(rename = "network-latency")]
    pub network_latency: LatencySummary,
    /// Mean hops per packet.
    #[serde(rename = "hops-average")]
    pub hops_average: f64,
    /// Mean bypass hops per packet.
    #[serde(rename = "flov-hops-average")]
    pub flov_hops_average: f64,
    /// Whether a packet exceeded the slow-packet threshold.
    #[serde(rename = "slow-packets")]
    pub slow_packets: bool,
}

impl StatsReport {
    /// Assembles the report from run statistics.
    #[must_use]
    pub fn new(
        start: Cycle,
        end: Cycle,
        stats: &NetStats,
        routers: impl IntoIterator<Item = RouterActivity>,
    ) -> Self {
        Self {
            start,
            end,
            cycles: end.saturating_sub(start),
            routers: routers
                .into_iter()
                .map(|a| RouterReport {
                    reads: a.buffer_reads,
                    writes: a.buffer_writes,
                    switches: a.crossbar_switches,
                    power_off_cycles: a.power_off_cycles,
                    drain_attempts: a.drain_attempts,
                    drain_timeouts: a.drain_timeouts,
                    bypassed_flits: a.bypassed_flits,
                })
                .collect(),
            packet_latency: LatencySummary::from(&stats.packet_latency),
            network_latency: LatencySummary::from(&stats.network_latency),
            hops_average: stats.hops.average(),
            flov_hops_average: stats.flov_hops.average(),
            slow_packets: stats.slow_packet_flagged,
        }
    }

    /// Writes the report as JSON under `outdir`, never overwriting: the
    /// first run lands in `meshstats.json`, later runs in
    /// `meshstats.N.json`.
    ///
    /// # Errors
    ///
    /// Propagates serialization and filesystem failures as
    /// [`SimError::Report`].
    pub fn write_json(&self, outdir: &Path) -> Result<PathBuf, SimError> {
        std::fs::create_dir_all(outdir).map_err(|e| SimError::Report(e.to_string()))?;
        let mut path = outdir.join("meshstats.json");
        let mut n = 0u32;
        while path.exists() {
            n += 1;
            path = outdir.join(format!("meshstats.{n}.json"));
        }
        let json =
            serde_json::to_string_pretty(self).map_err(|e| SimError::Report(e.to_string()))?;
        let mut file =
            std::fs::File::create(&path).map_err(|e| SimError::Report(e.to_string()))?;
        file.write_all(json.as_bytes())
            .map_err(|e| SimError::Report(e.to_string()))?;
        Ok(path)
    }

    /// Prints the requested report sections to stdout.
    ///
    /// Valid names: `"summary"`, `"latency"`, `"routers"`. An empty slice
    /// prints everything.
    pub fn print_sections(&self, sections: &[String]) {
        let want = |s: &str| sections.is_empty() || sections.iter().any(|x| x == s);

        if want("summary") {
            println!("\n==========================================================");
            println!("MESH NETWORK SIMULATION STATISTICS");
            println!("==========================================================");
            println!("sim_cycles               {}", self.cycles);
            println!("measured                 [{}, {}]", self.start, self.end);
            println!("----------------------------------------------------------");
        }
        if want("latency") {
            println!("LATENCY");
            println!(
                "  packet.average         {:.4}",
                self.packet_latency.average
            );
            println!("  packet.minimum         {}", self.packet_latency.minimum);
            println!("  packet.maximum         {}", self.packet_latency.maximum);
            println!(
                "  network.average        {:.4}",
                self.network_latency.average
            );
            println!("  hops.average           {:.4}", self.hops_average);
            println!("  flov_hops.average      {:.4}", self.flov_hops_average);
            if self.slow_packets {
                println!("  WARNING: slow packets exceeded the latency threshold");
            }
            println!("----------------------------------------------------------");
        }
        if want("routers") {
            println!("ROUTERS (reads/writes/switches/off-cycles)");
            for (id, r) in self.routers.iter().enumerate() {
                println!(
                    "  router[{id:3}]  {:8} {:8} {:8} {:8}",
                    r.reads, r.writes, r.switches, r.power_off_cycles
                );
            }
            println!("----------------------------------------------------------");
        }
    }
}

/// Section names accepted by [`StatsReport::print_sections`].
pub const STATS_SECTIONS: &[&str] = &["summary", "latency", "routers"];
