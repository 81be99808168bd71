//! Configuration system for the mesh simulator.
//!
//! This module defines all configuration structures and enums used to parameterize
//! the simulator. It provides:
//! 1. **Defaults:** Baseline constants (mesh geometry, buffering, stage delays, thresholds).
//! 2. **Structures:** Hierarchical config for topology, router, power gating, traffic, and run control.
//! 3. **Enums:** Allocator kinds, power-gating disciplines, traffic patterns, injection processes.
//!
//! Configuration is supplied as JSON (e.g. from the CLI's `--config` file) or built
//! with `Config::default()`; `Config::validate` rejects contradictory option sets
//! before any hardware is constructed.

use serde::Deserialize;

use crate::common::ConfigError;

/// Default configuration constants for the simulator.
///
/// These values define the baseline network when not explicitly overridden.
mod defaults {
    /// Mesh side (k routers per dimension).
    pub const K: usize = 8;

    /// Mesh dimension (n = 2 is a 2-D mesh).
    pub const N: usize = 2;

    /// Virtual channels per physical channel.
    pub const NUM_VCS: usize = 4;

    /// Flit slots per VC buffer.
    pub const VC_BUF_SIZE: usize = 4;

    /// Link traversal latency in cycles.
    pub const LINK_DELAY: u64 = 1;

    /// Credit return latency in cycles.
    pub const CREDIT_DELAY: u64 = 1;

    /// Route-compute stage delay in cycles.
    pub const ROUTING_DELAY: u64 = 1;

    /// VC-allocation stage delay in cycles.
    pub const VC_ALLOC_DELAY: u64 = 1;

    /// Switch-allocation stage delay in cycles.
    pub const SW_ALLOC_DELAY: u64 = 1;

    /// Crossbar setup delay in cycles.
    pub const ST_PREPARE_DELAY: u64 = 0;

    /// Crossbar traversal delay in cycles.
    pub const ST_FINAL_DELAY: u64 = 1;

    /// Cycles a head flit may sit in VA/SA before being forced back to
    /// route compute to re-evaluate its route set.
    pub const VC_STALL_THRESHOLD: u64 = 300;

    /// Consecutive idle cycles before a router attempts to drain.
    pub const IDLE_THRESHOLD: u64 = 100;

    /// Cycles a drain may run before it aborts back to on.
    pub const DRAIN_THRESHOLD: u64 = 100;

    /// Minimum off time needed to amortize a gating transition.
    pub const BET_THRESHOLD: u64 = 30;

    /// Cycles of re-energizing before a waking router returns to on.
    pub const WAKEUP_THRESHOLD: u64 = 10;

    /// Latency watermark multipliers over the zero-load latency.
    pub const HIGH_WATERMARK: f64 = 1.5;
    /// See [`HIGH_WATERMARK`].
    pub const LOW_WATERMARK: f64 = 1.1;

    /// Zero-load packet latency used to scale the watermarks.
    pub const ZEROLOAD_LATENCY: f64 = 20.0;

    /// Cycles per adaptive-policy monitoring epoch.
    pub const FLOV_MONITOR_EPOCH: u64 = 1000;

    /// Flits per generated packet.
    pub const PACKET_SIZE: usize = 4;

    /// Packet classes (QoS levels).
    pub const NUM_CLASSES: usize = 1;

    /// Injection rate in packets per node per cycle.
    pub const INJECTION_RATE: f64 = 0.05;

    /// Warm-up cycles before measurement starts.
    pub const WARMUP_PERIODS: u64 = 3;

    /// Cycles per measurement sample period.
    pub const SAMPLE_PERIOD: u64 = 1000;

    /// Maximum number of sample periods per run.
    pub const MAX_SAMPLES: u64 = 10;

    /// Idle flit-in-flight cycles before a deadlock warning is emitted.
    pub const DEADLOCK_WARN_TIMEOUT: u64 = 4096;

    /// Packet latency above which the end-of-run record is flagged.
    pub const SLOW_PACKET_THRESHOLD: u64 = 10_000;
}

/// Allocator implementations selectable for VC and switch allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocatorKind {
    /// Single-pass round-robin matching.
    #[default]
    RoundRobin,
    /// Separable allocator with input-first arbitration.
    SeparableInputFirst,
}

/// Power-gating disciplines.
///
/// Selects the per-router gating policy and which bypass the gated routers
/// provide, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowergateType {
    /// No gating: every router stays on.
    #[default]
    None,
    /// Fly-over bypass with the adaptive watermark policy.
    Flov,
    /// Fly-over bypass on all non-anchor routers, no adaptive policy.
    Gflov,
    /// Fly-over bypass restricted to row (x-dimension) channels.
    Rflov,
    /// Router parking: gate routers with idle cores; no bypass, routing
    /// must avoid parked routers.
    Rp,
    /// One-slot latch bypass over a fixed unidirectional ring overlay.
    Nord,
}

impl PowergateType {
    /// Whether gated routers forward flits on the straight-through path.
    #[must_use]
    pub const fn has_bypass(self) -> bool {
        matches!(self, Self::Flov | Self::Gflov | Self::Rflov | Self::Nord)
    }

    /// Whether any router is ever allowed to leave the on state.
    #[must_use]
    pub const fn gates(self) -> bool {
        !matches!(self, Self::None)
    }
}

/// Synthetic traffic patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrafficPatternKind {
    /// Uniform random destination.
    #[default]
    Uniform,
    /// Fixed offset of `k/2 - 1` along each dimension.
    Tornado,
    /// Matrix transpose of the node coordinates.
    Transpose,
    /// Bit complement of the node index.
    Bitcomp,
    /// Nearest neighbor (+1 in the lowest dimension).
    Neighbor,
    /// Seeded random permutation, fixed for the whole run.
    Randperm,
}

/// Packet injection processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InjectionProcessKind {
    /// Independent Bernoulli trial each cycle.
    #[default]
    Bernoulli,
    /// Two-state Markov (bursty) process.
    OnOff,
}

/// Root configuration structure containing all simulator settings.
///
/// # Examples
///
/// ```
/// use meshsim_core::config::Config;
///
/// let config = Config::default();
/// assert_eq!(config.topology.k, 8);
/// assert!(config.validate().is_ok());
/// ```
///
/// Deserializing from JSON:
///
/// ```
/// use meshsim_core::config::{Config, PowergateType};
///
/// let json = r#"{
///     "topology": { "k": 4, "n": 2 },
///     "router": { "num_vcs": 2, "vc_buf_size": 8 },
///     "power": { "powergate_type": "flov", "idle_threshold": 10 },
///     "traffic": { "injection_rate": 0.1 }
/// }"#;
/// let config: Config = serde_json::from_str(json).unwrap();
/// assert_eq!(config.topology.k, 4);
/// assert_eq!(config.power.powergate_type, PowergateType::Flov);
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Mesh geometry and node attachment.
    #[serde(default)]
    pub topology: TopologyConfig,
    /// Router microarchitecture.
    #[serde(default)]
    pub router: RouterConfig,
    /// Power gating discipline and timers.
    #[serde(default)]
    pub power: PowerConfig,
    /// Workload generation.
    #[serde(default)]
    pub traffic: TrafficConfig,
    /// Run control, watchdogs, and watch lists.
    #[serde(default)]
    pub sim: SimControlConfig,
}

impl Config {
    /// Rejects contradictory or out-of-range option combinations.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] naming the offending option(s). A network
    /// is never constructed from a configuration that fails validation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.topology.k < 2 {
            return Err(ConfigError::InvalidValue {
                option: "k",
                value: self.topology.k.to_string(),
            });
        }
        if self.topology.n == 0 {
            return Err(ConfigError::InvalidValue {
                option: "n",
                value: self.topology.n.to_string(),
            });
        }
        if self.router.num_vcs == 0 {
            return Err(ConfigError::InvalidValue {
                option: "num_vcs",
                value: self.router.num_vcs.to_string(),
            });
        }
        if self.router.vc_buf_size == 0 {
            return Err(ConfigError::InvalidValue {
                option: "vc_buf_size",
                value: self.router.vc_buf_size.to_string(),
            });
        }
        if self.router.noq && !self.router.lookahead_routing {
            return Err(ConfigError::Contradiction {
                reason: "noq requires lookahead_routing".into(),
            });
        }
        if self.router.internal_speedup < 1.0 {
            return Err(ConfigError::InvalidValue {
                option: "internal_speedup",
                value: self.router.internal_speedup.to_string(),
            });
        }
        if self.router.input_speedup == 0 || self.router.output_speedup == 0 {
            return Err(ConfigError::InvalidValue {
                option: "input_speedup/output_speedup",
                value: "0".into(),
            });
        }
        if self.power.powergate_type == PowergateType::Nord && self.router.num_vcs < 2 {
            return Err(ConfigError::Contradiction {
                reason: "nord needs at least two VCs: one ring escape VC plus one regular VC"
                    .into(),
            });
        }
        if self.power.low_watermark > self.power.high_watermark {
            return Err(ConfigError::Contradiction {
                reason: format!(
                    "low_watermark {} exceeds high_watermark {}",
                    self.power.low_watermark, self.power.high_watermark
                ),
            });
        }
        if !(0.0..=1.0).contains(&self.traffic.injection_rate) {
            return Err(ConfigError::InvalidValue {
                option: "injection_rate",
                value: self.traffic.injection_rate.to_string(),
            });
        }
        if self.traffic.packet_size == 0 {
            return Err(ConfigError::InvalidValue {
                option: "packet_size",
                value: "0".into(),
            });
        }
        if self.traffic.num_classes == 0 {
            return Err(ConfigError::InvalidValue {
                option: "num_classes",
                value: "0".into(),
            });
        }
        if let Some(map) = &self.topology.node_router_map {
            let routers = self.topology.num_routers();
            if map.len() != routers {
                return Err(ConfigError::BadNodeRouterMap(format!(
                    "map covers {} nodes, mesh has {routers} routers",
                    map.len()
                )));
            }
            if let Some(&bad) = map.iter().find(|&&r| r >= routers) {
                return Err(ConfigError::BadNodeRouterMap(format!(
                    "router {bad} outside mesh of {routers} routers"
                )));
            }
        }
        Ok(())
    }
}

/// Mesh geometry and node attachment.
#[derive(Debug, Clone, Deserialize)]
pub struct TopologyConfig {
    /// Routers per dimension.
    #[serde(default = "TopologyConfig::default_k")]
    pub k: usize,

    /// Number of dimensions.
    #[serde(default = "TopologyConfig::default_n")]
    pub n: usize,

    /// Node-to-router attachment; identity when absent.
    #[serde(default)]
    pub node_router_map: Option<Vec<usize>>,
}

impl TopologyConfig {
    fn default_k() -> usize {
        defaults::K
    }

    fn default_n() -> usize {
        defaults::N
    }

    /// Total router count, `k^n`.
    #[must_use]
    pub fn num_routers(&self) -> usize {
        self.k.pow(self.n as u32)
    }

    /// Router attached to `node`, honouring `node_router_map`.
    #[must_use]
    pub fn router_of(&self, node: usize) -> usize {
        self.node_router_map
            .as_ref()
            .map_or(node, |map| map[node])
    }
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            k: defaults::K,
            n: defaults::N,
            node_router_map: None,
        }
    }
}

/// Router microarchitecture: buffering, pipeline options, and stage delays.
#[derive(Debug, Clone, Deserialize)]
pub struct RouterConfig {
    /// Virtual channels per physical channel.
    #[serde(default = "RouterConfig::default_num_vcs")]
    pub num_vcs: usize,

    /// Flit slots per VC buffer.
    #[serde(default = "RouterConfig::default_vc_buf_size")]
    pub vc_buf_size: usize,

    /// Registered routing function to use for route compute.
    #[serde(default = "RouterConfig::default_routing_function")]
    pub routing_function: String,

    /// Retain a VC reservation until the tail's credit returns.
    #[serde(default)]
    pub wait_for_tail_credit: bool,

    /// Hold a granted switch connection for the remainder of a packet.
    #[serde(default)]
    pub hold_switch_for_packet: bool,

    /// Enable speculative switch allocation alongside VC allocation.
    #[serde(default)]
    pub speculative: bool,

    /// Filter speculative requests by downstream VC availability.
    #[serde(default = "RouterConfig::default_true")]
    pub spec_check_elig: bool,

    /// Filter speculative requests by downstream credit.
    #[serde(default = "RouterConfig::default_true")]
    pub spec_check_cred: bool,

    /// Discard speculative grants on outputs that also carry a
    /// non-speculative request, regardless of allocator outcome.
    #[serde(default)]
    pub spec_mask_by_reqs: bool,

    /// Treat a full (but available) downstream VC as reserved rather than
    /// requesting it this cycle.
    #[serde(default)]
    pub vc_busy_when_full: bool,

    /// Demote requests whose downstream buffer is non-empty.
    #[serde(default)]
    pub vc_prioritize_empty: bool,

    /// Invoke the routing function one hop ahead so the downstream router
    /// finds a ready route on arrival.
    #[serde(default)]
    pub lookahead_routing: bool,

    /// No-output-queueing: narrow the downstream VC range via lookahead.
    #[serde(default)]
    pub noq: bool,

    /// VC allocator implementation.
    #[serde(default)]
    pub vc_allocator: AllocatorKind,

    /// Switch allocator implementation.
    #[serde(default)]
    pub sw_allocator: AllocatorKind,

    /// Speculative switch allocator implementation.
    #[serde(default)]
    pub spec_sw_allocator: AllocatorKind,

    /// Crossbar input radix multiplier.
    #[serde(default = "RouterConfig::default_speedup")]
    pub input_speedup: usize,

    /// Crossbar output radix multiplier.
    #[serde(default = "RouterConfig::default_speedup")]
    pub output_speedup: usize,

    /// Internal clock multiplier (router steps per network cycle).
    #[serde(default = "RouterConfig::default_internal_speedup")]
    pub internal_speedup: f64,

    /// Route-compute delay in cycles.
    #[serde(default = "RouterConfig::default_routing_delay")]
    pub routing_delay: u64,

    /// VC-allocation delay in cycles.
    #[serde(default = "RouterConfig::default_vc_alloc_delay")]
    pub vc_alloc_delay: u64,

    /// Switch-allocation delay in cycles.
    #[serde(default = "RouterConfig::default_sw_alloc_delay")]
    pub sw_alloc_delay: u64,

    /// Crossbar setup delay in cycles.
    #[serde(default = "RouterConfig::default_st_prepare_delay")]
    pub st_prepare_delay: u64,

    /// Crossbar traversal delay in cycles.
    #[serde(default = "RouterConfig::default_st_final_delay")]
    pub st_final_delay: u64,

    /// Credit return delay in cycles.
    #[serde(default = "RouterConfig::default_credit_delay")]
    pub credit_delay: u64,

    /// Link traversal delay in cycles.
    #[serde(default = "RouterConfig::default_link_delay")]
    pub link_delay: u64,

    /// Cycles a head flit may stall in VA/SA before its VC is forced back
    /// to route compute.
    #[serde(default = "RouterConfig::default_vc_stall_threshold")]
    pub vc_stall_threshold: u64,
}

impl RouterConfig {
    fn default_num_vcs() -> usize {
        defaults::NUM_VCS
    }

    fn default_vc_buf_size() -> usize {
        defaults::VC_BUF_SIZE
    }

    fn default_routing_function() -> String {
        "dor".into()
    }

    fn default_true() -> bool {
        true
    }

    fn default_speedup() -> usize {
        1
    }

    fn default_internal_speedup() -> f64 {
        1.0
    }

    fn default_routing_delay() -> u64 {
        defaults::ROUTING_DELAY
    }

    fn default_vc_alloc_delay() -> u64 {
        defaults::VC_ALLOC_DELAY
    }

    fn default_sw_alloc_delay() -> u64 {
        defaults::SW_ALLOC_DELAY
    }

    fn default_st_prepare_delay() -> u64 {
        defaults::ST_PREPARE_DELAY
    }

    fn default_st_final_delay() -> u64 {
        defaults::ST_FINAL_DELAY
    }

    fn default_credit_delay() -> u64 {
        defaults::CREDIT_DELAY
    }

    fn default_link_delay() -> u64 {
        defaults::LINK_DELAY
    }

    fn default_vc_stall_threshold() -> u64 {
        defaults::VC_STALL_THRESHOLD
    }

    /// Sum of the per-stage delays a single flit pays inside one router.
    #[must_use]
    pub const fn pipeline_delay(&self) -> u64 {
        self.routing_delay
            + self.vc_alloc_delay
            + self.sw_alloc_delay
            + self.st_prepare_delay
            + self.st_final_delay
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            num_vcs: defaults::NUM_VCS,
            vc_buf_size: defaults::VC_BUF_SIZE,
            routing_function: "dor".into(),
            wait_for_tail_credit: false,
            hold_switch_for_packet: false,
            speculative: false,
            spec_check_elig: true,
            spec_check_cred: true,
            spec_mask_by_reqs: false,
            vc_busy_when_full: false,
            vc_prioritize_empty: false,
            lookahead_routing: false,
            noq: false,
            vc_allocator: AllocatorKind::default(),
            sw_allocator: AllocatorKind::default(),
            spec_sw_allocator: AllocatorKind::default(),
            input_speedup: 1,
            output_speedup: 1,
            internal_speedup: 1.0,
            routing_delay: defaults::ROUTING_DELAY,
            vc_alloc_delay: defaults::VC_ALLOC_DELAY,
            sw_alloc_delay: defaults::SW_ALLOC_DELAY,
            st_prepare_delay: defaults::ST_PREPARE_DELAY,
            st_final_delay: defaults::ST_FINAL_DELAY,
            credit_delay: defaults::CREDIT_DELAY,
            link_delay: defaults::LINK_DELAY,
            vc_stall_threshold: defaults::VC_STALL_THRESHOLD,
        }
    }
}

/// Power gating discipline, transition timers, and the adaptive policy.
#[derive(Debug, Clone, Deserialize)]
pub struct PowerConfig {
    /// Gating discipline.
    #[serde(default)]
    pub powergate_type: PowergateType,

    /// Consecutive idle cycles before a router attempts to drain.
    #[serde(default = "PowerConfig::default_idle_threshold")]
    pub idle_threshold: u64,

    /// Cycles a drain may run before aborting back to on.
    #[serde(default = "PowerConfig::default_drain_threshold")]
    pub drain_threshold: u64,

    /// Minimum off time before a wake signal is honoured (break-even).
    #[serde(default = "PowerConfig::default_bet_threshold")]
    pub bet_threshold: u64,

    /// Re-energizing time before a waking router returns to on.
    #[serde(default = "PowerConfig::default_wakeup_threshold")]
    pub wakeup_threshold: u64,

    /// Upper latency watermark as a multiple of the zero-load latency.
    #[serde(default = "PowerConfig::default_high_watermark")]
    pub high_watermark: f64,

    /// Lower latency watermark as a multiple of the zero-load latency.
    #[serde(default = "PowerConfig::default_low_watermark")]
    pub low_watermark: f64,

    /// Zero-load packet latency the watermarks scale against.
    #[serde(default = "PowerConfig::default_zeroload_latency")]
    pub zeroload_latency: f64,

    /// Cycles per adaptive-policy monitor epoch.
    #[serde(default = "PowerConfig::default_monitor_epoch")]
    pub flov_monitor_epoch: u64,
}

impl PowerConfig {
    fn default_idle_threshold() -> u64 {
        defaults::IDLE_THRESHOLD
    }

    fn default_drain_threshold() -> u64 {
        defaults::DRAIN_THRESHOLD
    }

    fn default_bet_threshold() -> u64 {
        defaults::BET_THRESHOLD
    }

    fn default_wakeup_threshold() -> u64 {
        defaults::WAKEUP_THRESHOLD
    }

    fn default_high_watermark() -> f64 {
        defaults::HIGH_WATERMARK
    }

    fn default_low_watermark() -> f64 {
        defaults::LOW_WATERMARK
    }

    fn default_zeroload_latency() -> f64 {
        defaults::ZEROLOAD_LATENCY
    }

    fn default_monitor_epoch() -> u64 {
        defaults::FLOV_MONITOR_EPOCH
    }
}

impl Default for PowerConfig {
    fn default() -> Self {
        Self {
            powergate_type: PowergateType::default(),
            idle_threshold: defaults::IDLE_THRESHOLD,
            drain_threshold: defaults::DRAIN_THRESHOLD,
            bet_threshold: defaults::BET_THRESHOLD,
            wakeup_threshold: defaults::WAKEUP_THRESHOLD,
            high_watermark: defaults::HIGH_WATERMARK,
            low_watermark: defaults::LOW_WATERMARK,
            zeroload_latency: defaults::ZEROLOAD_LATENCY,
            flov_monitor_epoch: defaults::FLOV_MONITOR_EPOCH,
        }
    }
}

/// Workload generation.
#[derive(Debug, Clone, Deserialize)]
pub struct TrafficConfig {
    /// Destination pattern.
    #[serde(default)]
    pub pattern: TrafficPatternKind,

    /// Packet injection process.
    #[serde(default)]
    pub injection_process: InjectionProcessKind,

    /// Packets per node per cycle offered to the network.
    #[serde(default = "TrafficConfig::default_injection_rate")]
    pub injection_rate: f64,

    /// Flits per packet.
    #[serde(default = "TrafficConfig::default_packet_size")]
    pub packet_size: usize,

    /// Packet classes (QoS levels).
    #[serde(default = "TrafficConfig::default_num_classes")]
    pub num_classes: usize,

    /// Generate read/write request–reply pairs instead of one-way packets.
    #[serde(default)]
    pub use_read_write: bool,

    /// PRNG seed for patterns and injection processes.
    #[serde(default = "TrafficConfig::default_seed")]
    pub seed: u64,
}

impl TrafficConfig {
    fn default_injection_rate() -> f64 {
        defaults::INJECTION_RATE
    }

    fn default_packet_size() -> usize {
        defaults::PACKET_SIZE
    }

    fn default_num_classes() -> usize {
        defaults::NUM_CLASSES
    }

    fn default_seed() -> u64 {
        0x5eed_cafe
    }
}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self {
            pattern: TrafficPatternKind::default(),
            injection_process: InjectionProcessKind::default(),
            injection_rate: defaults::INJECTION_RATE,
            packet_size: defaults::PACKET_SIZE,
            num_classes: defaults::NUM_CLASSES,
            use_read_write: false,
            seed: Self::default_seed(),
        }
    }
}

/// Run control, watchdogs, and watch lists.
#[derive(Debug, Clone, Deserialize)]
pub struct SimControlConfig {
    /// Warm-up sample periods before measurement begins.
    #[serde(default = "SimControlConfig::default_warmup_periods")]
    pub warmup_periods: u64,

    /// Cycles per sample period.
    #[serde(default = "SimControlConfig::default_sample_period")]
    pub sample_period: u64,

    /// Maximum sample periods per run.
    #[serde(default = "SimControlConfig::default_max_samples")]
    pub max_samples: u64,

    /// Cycles without flit progress before a deadlock warning.
    #[serde(default = "SimControlConfig::default_deadlock_warn_timeout")]
    pub deadlock_warn_timeout: u64,

    /// Packet latency that flags the end-of-run record.
    #[serde(default = "SimControlConfig::default_slow_packet_threshold")]
    pub slow_packet_threshold: u64,

    /// Packet identifiers whose stage events are traced.
    #[serde(default)]
    pub watch_packets: Vec<u64>,

    /// Flit identifiers whose stage events are traced.
    #[serde(default)]
    pub watch_flits: Vec<u64>,

    /// Output directory for the JSON report.
    #[serde(default)]
    pub outdir: Option<String>,
}

impl SimControlConfig {
    fn default_warmup_periods() -> u64 {
        defaults::WARMUP_PERIODS
    }

    fn default_sample_period() -> u64 {
        defaults::SAMPLE_PERIOD
    }

    fn default_max_samples() -> u64 {
        defaults::MAX_SAMPLES
    }

    fn default_deadlock_warn_timeout() -> u64 {
        defaults::DEADLOCK_WARN_TIMEOUT
    }

    fn default_slow_packet_threshold() -> u64 {
        defaults::SLOW_PACKET_THRESHOLD
    }
}

impl Default for SimControlConfig {
    fn default() -> Self {
        Self {
            warmup_periods: defaults::WARMUP_PERIODS,
            sample_period: defaults::SAMPLE_PERIOD,
            max_samples: defaults::MAX_SAMPLES,
            deadlock_warn_timeout: defaults::DEADLOCK_WARN_TIMEOUT,
            slow_packet_threshold: defaults::SLOW_PACKET_THRESHOLD,
            watch_packets: Vec::new(),
            watch_flits: Vec::new(),
            outdir: None,
        }
    }
}
