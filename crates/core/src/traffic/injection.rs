//! Injection processes and workload sources.
//!
//! This module decides *when* a node offers a packet and *what* that packet
//! is. It provides:
//! 1. **[`InjectionProcess`]:** Bernoulli and bursty on-off arrival processes.
//! 2. **[`WorkloadSource`]:** The message-buffer contract an embedding
//!    simulator implements: readiness, peek, dequeue, and delayed enqueue of
//!    replies.
//! 3. **[`SyntheticSource`]:** The built-in source driving an injection
//!    process, with a delayed reply queue for request–reply workloads.

use std::collections::BinaryHeap;
use std::cmp::Reverse;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::common::{Cycle, NodeId};
use crate::config::{InjectionProcessKind, TrafficConfig};
use crate::message::FlitKind;

/// Packet arrival process at one node.
pub trait InjectionProcess: std::fmt::Debug {
    /// Whether `node` offers a packet this cycle.
    fn fire(&mut self, node: NodeId) -> bool;
}

/// Builds the configured injection process over `nodes` terminals.
#[must_use]
pub fn build_process(
    kind: InjectionProcessKind,
    nodes: usize,
    rate: f64,
    seed: u64,
) -> Box<dyn InjectionProcess> {
    match kind {
        InjectionProcessKind::Bernoulli => Box::new(Bernoulli {
            rate,
            rng: StdRng::seed_from_u64(seed),
        }),
        InjectionProcessKind::OnOff => Box::new(OnOff {
            rate,
            alpha: ON_OFF_ALPHA,
            beta: ON_OFF_BETA,
            on: vec![false; nodes],
            rng: StdRng::seed_from_u64(seed),
        }),
    }
}

/// Burst start probability of the on-off process.
const ON_OFF_ALPHA: f64 = 0.01;
/// Burst end probability of the on-off process.
const ON_OFF_BETA: f64 = 0.1;

/// Independent Bernoulli trial each cycle.
#[derive(Debug)]
struct Bernoulli {
    rate: f64,
    rng: StdRng,
}

impl InjectionProcess for Bernoulli {
    fn fire(&mut self, _node: NodeId) -> bool {
        self.rate > 0.0 && self.rng.gen_bool(self.rate.min(1.0))
    }
}

/// Two-state Markov process producing bursty arrivals at the same mean
/// rate as the Bernoulli process.
#[derive(Debug)]
struct OnOff {
    rate: f64,
    alpha: f64,
    beta: f64,
    on: Vec<bool>,
    rng: StdRng,
}

impl InjectionProcess for OnOff {
    fn fire(&mut self, node: NodeId) -> bool {
        let state = &mut self.on[node];
        if *state {
            if self.rng.gen_bool(self.beta) {
                *state = false;
            }
        } else if self.rng.gen_bool(self.alpha) {
            *state = true;
        }
        if !*state || self.rate <= 0.0 {
            return false;
        }
        // Scale the on-state rate so the long-run mean matches `rate`.
        let duty = self.alpha / (self.alpha + self.beta);
        self.rng.gen_bool((self.rate / duty).min(1.0))
    }
}

/// One message a workload source hands to the traffic manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadMessage {
    /// Destination node; `None` lets the traffic pattern choose.
    pub dest: Option<NodeId>,
    /// Packet size in flits.
    pub size: usize,
    /// Packet class.
    pub class: usize,
    /// Transaction kind.
    pub kind: FlitKind,
    /// Opaque payload reference carried end to end.
    pub payload: Option<u64>,
}

/// Message-buffer contract between a workload and the traffic manager.
///
/// A host simulator embeds the core by implementing this trait; the
/// synthetic generator below implements the same operations.
pub trait WorkloadSource: std::fmt::Debug {
    /// Whether `node` has a message available this cycle.
    fn is_ready(&mut self, node: NodeId, class: usize, cycle: Cycle) -> bool;

    /// The message that would be dequeued next, if any.
    fn peek(&self, node: NodeId, class: usize) -> Option<&WorkloadMessage>;

    /// Removes and returns the next message.
    fn dequeue(&mut self, node: NodeId, class: usize, cycle: Cycle) -> Option<WorkloadMessage>;

    /// Schedules `msg` at `node` after `delay` cycles (reply generation).
    fn enqueue(&mut self, node: NodeId, msg: WorkloadMessage, delay: u64, cycle: Cycle);
}

/// Reply queue entry ordered by ready cycle.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct Scheduled {
    ready: Cycle,
    seq: u64,
    node: NodeId,
    msg_index: usize,
}

/// The built-in synthetic workload source.
///
/// New requests arrive per the injection process; replies enqueued at
/// retirement become ready after their delay and take precedence over
/// fresh requests.
#[derive(Debug)]
pub struct SyntheticSource {
    process: Box<dyn InjectionProcess>,
    packet_size: usize,
    use_read_write: bool,
    rng: StdRng,
    /// Delayed messages, smallest ready cycle first.
    schedule: BinaryHeap<Reverse<Scheduled>>,
    stored: Vec<WorkloadMessage>,
    /// Heads ready for dequeue, per (node, class).
    ready: Vec<Vec<Vec<WorkloadMessage>>>,
    seq: u64,
}

impl SyntheticSource {
    /// Creates the source for `nodes` terminals from the traffic config.
    #[must_use]
    pub fn new(cfg: &TrafficConfig, nodes: usize) -> Self {
        Self {
            process: build_process(
                cfg.injection_process,
                nodes,
                cfg.injection_rate,
                cfg.seed ^ 0x9e37_79b9,
            ),
            packet_size: cfg.packet_size,
            use_read_write: cfg.use_read_write,
            rng: StdRng::seed_from_u64(cfg.seed ^ 0x7f4a_7c15),
            schedule: BinaryHeap::new(),
            stored: Vec::new(),
            ready: vec![vec![Vec::new(); cfg.num_classes]; nodes],
            seq: 0,
        }
    }

    /// Moves scheduled messages whose delay elapsed into the ready queues.
    fn release(&mut self, cycle: Cycle) {
        while let Some(Reverse(top)) = self.schedule.peek() {
            if top.ready > cycle {
                break;
            }
            let Some(Reverse(item)) = self.schedule.pop() else {
                break;
            };
            let msg = self.stored[item.msg_index].clone();
            let class = msg.class;
            self.ready[item.node][class].push(msg);
        }
    }
}

impl WorkloadSource for SyntheticSource {
    fn is_ready(&mut self, node: NodeId, class: usize, cycle: Cycle) -> bool {
        self.release(cycle);
        if !self.ready[node][class].is_empty() {
            return true;
        }
        if class != 0 {
            // Fresh synthetic traffic is generated on class 0 only.
            return false;
        }
        if self.process.fire(node) {
            let kind = if self.use_read_write {
                if self.rng.gen_bool(0.5) {
                    FlitKind::ReadRequest
                } else {
                    FlitKind::WriteRequest
                }
            } else {
                FlitKind::Any
            };
            self.ready[node][class].push(WorkloadMessage {
                dest: None,
                size: self.packet_size,
                class,
                kind,
                payload: None,
            });
            return true;
        }
        false
    }

    fn peek(&self, node: NodeId, class: usize) -> Option<&WorkloadMessage> {
        self.ready[node][class].first()
    }

    fn dequeue(&mut self, node: NodeId, class: usize, cycle: Cycle) -> Option<WorkloadMessage> {
        self.release(cycle);
        if self.ready[node][class].is_empty() {
            None
        } else {
            Some(self.ready[node][class].remove(0))
        }
    }

    fn enqueue(&mut self, node: NodeId, msg: WorkloadMessage, delay: u64, cycle: Cycle) {
        let msg_index = self.stored.len();
        self.stored.push(msg);
        self.seq += 1;
        self.schedule.push(Reverse(Scheduled {
            ready: cycle + delay,
            seq: self.seq,
            node,
            msg_index,
        }));
    }
}
