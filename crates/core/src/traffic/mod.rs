//! The traffic manager: the top-level tick driver of a simulation.
//!
//! This module owns everything outside the fabric. It provides:
//! 1. **Retirement:** Pulls ejected flits, returns ejection credits, retires
//!    tails, and accumulates packet/network/queueing/flit latencies,
//!    fragmentation, and hop counts.
//! 2. **Injection:** Generates packets from the workload source and pattern —
//!    never toward a node whose core is off — and injects heads only while the
//!    attached router is on, latching a wake signal otherwise.
//! 3. **Policy:** The rolling row/column latency monitor voting per-router
//!    gating aggressiveness, and the deadlock watchdog diagnostics.

pub mod injection;
pub mod pattern;

pub use injection::{InjectionProcess, SyntheticSource, WorkloadMessage, WorkloadSource};
pub use pattern::TrafficPattern;

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::{debug, warn};

use crate::common::{Cycle, InvariantError, NodeId, PacketId};
use crate::config::{Config, PowergateType};
use crate::buffer::BufferState;
use crate::message::{Credit, Flit, FlitKind};
use crate::network::Network;
use crate::router::PowerState;
use crate::routing::{self, RouteCtx, RoutingFunction};
use crate::stats::{Histogram, NetStats};

/// Cycles a destination takes to compose a reply in request–reply mode.
const REPLY_SERVE_DELAY: u64 = 1;

/// Per-packet bookkeeping between generation and retirement.
#[derive(Debug, Clone, Copy)]
struct PacketInfo {
    ctime: Cycle,
    itime: Option<Cycle>,
    head_atime: Option<Cycle>,
}

/// The cycle-driven workload and statistics engine.
#[derive(Debug)]
pub struct TrafficManager {
    nodes: usize,
    classes: usize,
    use_read_write: bool,
    powergate: PowergateType,
    rf: RoutingFunction,
    num_vcs: usize,
    k: usize,
    n: usize,

    pattern: Box<dyn TrafficPattern>,
    source: Box<dyn WorkloadSource>,

    /// Flits generated but not yet injected, per node and class.
    partial_packets: Vec<Vec<VecDeque<Flit>>>,
    /// Source-side mirror of each node's injection buffer.
    inj_buf: Vec<BufferState>,
    /// Round-robin VC pointer per node.
    last_inj_vc: Vec<usize>,
    /// VC carrying the packet currently being injected, per node.
    current_inj_vc: Vec<Option<usize>>,
    /// One-cycle wake handshake latency per node.
    wake_pending: Vec<bool>,
    packet_size: usize,

    next_pid: PacketId,
    next_fid: u64,
    pkt_info: HashMap<PacketId, PacketInfo>,
    in_flight: u64,

    /// Aggregate statistics (cleared at end of warm-up).
    pub stats: NetStats,
    per_node_plat: Vec<Histogram>,
    votes: Vec<i64>,
    monitor_epoch: u64,
    plat_high: f64,
    plat_low: f64,

    warmup_cycles: Cycle,
    measure_start: Cycle,
    deadlock_timer: u64,
    deadlock_warn_timeout: u64,
    slow_packet_threshold: u64,

    watch_packets: HashSet<u64>,
    watch_flits: HashSet<u64>,
}

impl TrafficManager {
    /// Creates the manager for a fabric built from the same `config`.
    #[must_use]
    pub fn new(config: &Config, net: &Network) -> Self {
        let nodes = net.num_nodes();
        let classes = config.traffic.num_classes;
        let rf = routing::lookup(&config.router.routing_function)
            .unwrap_or(routing::dor::dor_mesh);
        Self {
            nodes,
            classes,
            use_read_write: config.traffic.use_read_write,
            powergate: config.power.powergate_type,
            rf,
            num_vcs: config.router.num_vcs,
            k: config.topology.k,
            n: config.topology.n,
            pattern: pattern::build(
                config.traffic.pattern,
                nodes,
                config.topology.k,
                config.topology.n,
                config.traffic.seed,
            ),
            source: Box::new(SyntheticSource::new(&config.traffic, nodes)),
            partial_packets: vec![vec![VecDeque::new(); classes]; nodes],
            inj_buf: (0..nodes)
                .map(|node| {
                    BufferState::new(
                        net.router_of(node),
                        2 * config.topology.n,
                        config.router.num_vcs,
                        config.router.vc_buf_size,
                        config.router.wait_for_tail_credit,
                    )
                })
                .collect(),
            last_inj_vc: vec![0; nodes],
            current_inj_vc: vec![None; nodes],
            wake_pending: vec![false; nodes],
            packet_size: config.traffic.packet_size,
            next_pid: 0,
            next_fid: 0,
            pkt_info: HashMap::new(),
            in_flight: 0,
            stats: NetStats::default(),
            per_node_plat: vec![Histogram::new(); nodes],
            votes: vec![0; nodes],
            monitor_epoch: config.power.flov_monitor_epoch,
            plat_high: config.power.zeroload_latency * config.power.high_watermark,
            plat_low: config.power.zeroload_latency * config.power.low_watermark,
            warmup_cycles: config.sim.warmup_periods * config.sim.sample_period,
            measure_start: 0,
            deadlock_timer: 0,
            deadlock_warn_timeout: config.sim.deadlock_warn_timeout,
            slow_packet_threshold: config.sim.slow_packet_threshold,
            watch_packets: config.sim.watch_packets.iter().copied().collect(),
            watch_flits: config.sim.watch_flits.iter().copied().collect(),
        }
    }

    /// Replaces the workload source (host-simulator embedding).
    pub fn set_workload_source(&mut self, source: Box<dyn WorkloadSource>) {
        self.source = source;
    }

    /// Flits currently inside the network.
    #[must_use]
    pub const fn in_flight(&self) -> u64 {
        self.in_flight
    }

    /// Whether generated-but-uninjected flits remain at any node.
    #[must_use]
    pub fn has_pending_work(&self) -> bool {
        self.in_flight > 0
            || self
                .partial_packets
                .iter()
                .any(|per_class| per_class.iter().any(|q| !q.is_empty()))
    }

    /// First measured cycle (end of warm-up).
    #[must_use]
    pub const fn measure_start(&self) -> Cycle {
        self.measure_start
    }

    // ------------------------------------------------------------------
    // retirement
    // ------------------------------------------------------------------

    /// Pulls ejected flits and injection-side credits from every node.
    ///
    /// # Errors
    ///
    /// Propagates flow-control violations on the node interfaces.
    pub fn eject(&mut self, net: &mut Network, cycle: Cycle) -> Result<(), InvariantError> {
        for node in 0..self.nodes {
            if let Some(mut flit) = net.take_ejected_flit(node) {
                let vc = flit.vc.unwrap_or(0);
                net.return_ejection_credit(node, Credit::for_vc(vc), cycle)?;
                flit.atime = cycle;
                self.retire_flit(node, flit, cycle);
            }
            if let Some(credit) = net.take_injection_credit(node) {
                self.inj_buf[node].process_credit(&credit, cycle)?;
            }
        }
        Ok(())
    }

    fn retire_flit(&mut self, node: NodeId, flit: Flit, cycle: Cycle) {
        self.in_flight = self.in_flight.saturating_sub(1);
        self.deadlock_timer = 0;
        self.stats.flits_retired += 1;
        self.stats
            .flit_latency
            .add(flit.atime.saturating_sub(flit.itime));

        if flit.watch {
            tracing::trace!(
                target: "meshsim::watch",
                cycle,
                node,
                flit = flit.id,
                packet = flit.pid,
                "| node {node} | retiring flit"
            );
        }

        let info = self.pkt_info.entry(flit.pid).or_insert(PacketInfo {
            ctime: flit.ctime,
            itime: Some(flit.itime),
            head_atime: None,
        });
        if flit.head {
            info.head_atime = Some(flit.atime);
        }
        if !flit.tail {
            return;
        }

        // Tail: the packet is done.
        let info = self.pkt_info.remove(&flit.pid).unwrap_or(PacketInfo {
            ctime: flit.ctime,
            itime: Some(flit.itime),
            head_atime: Some(flit.atime),
        });
        let itime = info.itime.unwrap_or(flit.itime);
        let plat = flit.atime.saturating_sub(info.ctime);
        self.stats.packet_latency.add(plat);
        self.stats
            .network_latency
            .add(flit.atime.saturating_sub(itime));
        self.stats
            .queueing_latency
            .add(itime.saturating_sub(info.ctime));
        if let Some(head_atime) = info.head_atime {
            self.stats
                .fragmentation
                .add(flit.atime.saturating_sub(head_atime));
        }
        self.stats.hops.add(u64::from(flit.hops));
        self.stats.flov_hops.add(u64::from(flit.flov_hops));
        self.stats.packets_retired += 1;
        self.per_node_plat[node].add(plat);
        if plat > self.slow_packet_threshold {
            self.stats.slow_packet_flagged = true;
            warn!(packet = flit.pid, plat, "slow packet exceeded latency threshold");
        }

        if self.use_read_write && flit.expects_reply() {
            let reply_kind = match flit.kind {
                FlitKind::ReadRequest => FlitKind::ReadReply,
                _ => FlitKind::WriteReply,
            };
            self.source.enqueue(
                node,
                WorkloadMessage {
                    dest: Some(flit.src),
                    size: self.packet_size,
                    class: flit.class,
                    kind: reply_kind,
                    payload: flit.payload,
                },
                REPLY_SERVE_DELAY,
                cycle,
            );
        }
    }

    // ------------------------------------------------------------------
    // injection
    // ------------------------------------------------------------------

    /// Generates new packets and injects at most one flit per node.
    ///
    /// # Errors
    ///
    /// Propagates flow-control violations on the node interfaces.
    pub fn inject(&mut self, net: &mut Network, cycle: Cycle) -> Result<(), InvariantError> {
        self.generate(net, cycle);

        for node in 0..self.nodes {
            let router_id = net.router_of(node);
            let router_on = net.router(router_id).power_state() == PowerState::On;

            // Finish the packet already on the wire before starting a head
            // from another class; its flits own the node's injection VC.
            let in_progress = (0..self.classes)
                .find(|&c| self.partial_packets[node][c].front().is_some_and(|f| !f.head));
            let Some(class) = in_progress.or_else(|| {
                (0..self.classes).find(|&c| !self.partial_packets[node][c].is_empty())
            }) else {
                continue;
            };

            if !router_on {
                // Injection is forbidden; assert a wake signal with one
                // handshake cycle of latency.
                if self.wake_pending[node] {
                    net.wake_router(router_id);
                    self.wake_pending[node] = false;
                } else {
                    self.wake_pending[node] = true;
                }
                continue;
            }
            self.wake_pending[node] = false;

            let front_is_head = self.partial_packets[node][class]
                .front()
                .is_some_and(|f| f.head);
            let vc = if front_is_head {
                let Some(vc) = self.select_injection_vc(node, router_id, class) else {
                    continue;
                };
                self.inj_buf[node].take_buffer(vc, node, cycle)?;
                self.last_inj_vc[node] = vc;
                self.current_inj_vc[node] = Some(vc);
                vc
            } else {
                // Body and tail inherit the head's VC.
                let Some(vc) = self.current_inj_vc[node] else {
                    continue;
                };
                if self.inj_buf[node].is_full_for(vc) {
                    continue;
                }
                vc
            };

            let Some(mut flit) = self.partial_packets[node][class].pop_front() else {
                continue;
            };
            flit.vc = Some(vc);
            if flit.tail {
                self.current_inj_vc[node] = None;
            }
            flit.itime = cycle;
            if flit.head {
                if let Some(info) = self.pkt_info.get_mut(&flit.pid) {
                    info.itime = Some(cycle);
                }
            }
            self.inj_buf[node].sending_flit(&flit, cycle)?;
            self.stats.flits_injected += 1;
            self.in_flight += 1;
            if flit.watch {
                tracing::trace!(
                    target: "meshsim::watch",
                    cycle,
                    node,
                    flit = flit.id,
                    packet = flit.pid,
                    "| node {node} | injecting flit"
                );
            }
            net.inject_flit(node, flit, cycle)?;
        }
        Ok(())
    }

    /// Asks the workload source for new packets at idle nodes.
    fn generate(&mut self, net: &Network, cycle: Cycle) {
        for node in 0..self.nodes {
            if !net.core_state(node) {
                continue;
            }
            for class in 0..self.classes {
                if !self.partial_packets[node][class].is_empty() {
                    continue;
                }
                if !self.source.is_ready(node, class, cycle) {
                    continue;
                }
                let Some(msg) = self.source.dequeue(node, class, cycle) else {
                    continue;
                };
                let dest = msg.dest.or_else(|| self.draw_destination(net, node));
                let Some(dest) = dest else {
                    continue;
                };
                self.build_packet(net, node, dest, &msg, cycle);
            }
        }
    }

    /// Draws a destination whose core is on, retrying per the pattern's
    /// discipline until the search space is exhausted.
    fn draw_destination(&mut self, net: &Network, source: NodeId) -> Option<NodeId> {
        let mut attempt = 0;
        loop {
            let dest = self.pattern.dest(source, attempt)?;
            if net.core_state(dest) {
                return Some(dest);
            }
            attempt += 1;
        }
    }

    /// Builds the flits of one packet into the node's partial queue.
    fn build_packet(
        &mut self,
        net: &Network,
        src: NodeId,
        dest: NodeId,
        msg: &WorkloadMessage,
        cycle: Cycle,
    ) {
        let pid = self.next_pid;
        self.next_pid += 1;
        let size = msg.size.max(1);
        let dest_router = net.router_of(dest);
        let watch_packet = self.watch_packets.contains(&pid);

        let _ = self.pkt_info.insert(
            pid,
            PacketInfo {
                ctime: cycle,
                itime: None,
                head_atime: None,
            },
        );
        self.stats.packets_generated += 1;

        for i in 0..size {
            let fid = self.next_fid;
            self.next_fid += 1;
            let mut flit = Flit::new(fid, pid, src, dest);
            flit.dest_router = dest_router;
            flit.head = i == 0;
            flit.tail = i == size - 1;
            flit.class = msg.class;
            flit.kind = msg.kind;
            flit.payload = msg.payload;
            flit.ctime = cycle;
            flit.watch = watch_packet || self.watch_flits.contains(&fid);
            self.partial_packets[src][msg.class].push_back(flit);
        }
    }

    /// Round-robin pick of a free injection VC from the head's route set.
    fn select_injection_vc(
        &mut self,
        node: NodeId,
        router_id: usize,
        class: usize,
    ) -> Option<usize> {
        let flit = self.partial_packets[node][class].front()?;
        let ctx = RouteCtx {
            id: router_id,
            k: self.k,
            n: self.n,
            num_vcs: self.num_vcs,
            powergate: self.powergate,
            neighbor_states: &[],
        };
        let set = (self.rf)(Some(&ctx), flit, None, true);
        let cand = set.iter().next()?;
        let span = cand.vc_end - cand.vc_start + 1;
        for i in 1..=span {
            let vc = cand.vc_start + (self.last_inj_vc[node] + i) % span;
            if self.inj_buf[node].is_available_for(vc) && !self.inj_buf[node].is_full_for(vc) {
                return Some(vc);
            }
        }
        None
    }

    // ------------------------------------------------------------------
    // monitoring
    // ------------------------------------------------------------------

    /// End-of-cycle housekeeping: warm-up reset, the adaptive watermark
    /// monitor, and the deadlock watchdog.
    pub fn monitor(&mut self, net: &mut Network, cycle: Cycle) {
        if cycle == self.warmup_cycles && cycle != 0 {
            self.stats.clear();
            self.measure_start = cycle;
            debug!(cycle, "warm-up complete; statistics cleared");
        }

        if self.powergate == PowergateType::Flov && self.monitor_epoch > 0 && cycle > 0 {
            self.watermark_monitor(net, cycle);
        }

        if self.in_flight > 0 {
            self.deadlock_timer += 1;
            if self.deadlock_timer >= self.deadlock_warn_timeout {
                self.deadlock_timer = 0;
                warn!(cycle, in_flight = self.in_flight, "possible network deadlock");
                let states: Vec<&'static str> = net
                    .routers()
                    .iter()
                    .map(|r| r.power_state().name())
                    .collect();
                debug!(?states, "router power states at deadlock warning");
            }
        } else {
            self.deadlock_timer = 0;
        }
    }

    /// Rolling row/column latency sampling with per-node votes, applied
    /// once per node per epoch.
    fn watermark_monitor(&mut self, net: &mut Network, cycle: Cycle) {
        // The rolling row/column schedule is defined on 2-D meshes.
        if self.n != 2 || cycle < self.monitor_epoch {
            return;
        }
        let turn = (cycle % self.monitor_epoch) as usize;
        let k = self.k;
        if turn < k {
            for row in 0..k {
                for col in 0..k {
                    if row != turn && col != turn {
                        continue;
                    }
                    let node = row * k + col;
                    if self.per_node_plat[node].count() == 0 {
                        continue;
                    }
                    let avg = self.per_node_plat[node].average();
                    let vote = if avg < self.plat_low {
                        1
                    } else if avg > self.plat_high {
                        -1
                    } else {
                        0
                    };
                    if row == turn {
                        for c in 0..k {
                            if c != col {
                                self.votes[row * k + c] += vote;
                            }
                        }
                    }
                    if col == turn {
                        for r in 0..k {
                            if r != row {
                                self.votes[r * k + col] += vote;
                            }
                        }
                    }
                    self.votes[node] += vote;
                    self.per_node_plat[node].clear();
                }
            }
        } else if turn == k {
            let anchors_from = self.nodes - k;
            for node in 0..self.nodes {
                if node >= anchors_from {
                    self.votes[node] = 0;
                    continue;
                }
                let router = net.router_of(node);
                if self.votes[node] > 0 {
                    net.router_mut(router).aggress_power_gating_policy();
                } else if self.votes[node] < 0 {
                    net.router_mut(router).regress_power_gating_policy();
                }
                self.votes[node] = 0;
            }
        }
    }
}
