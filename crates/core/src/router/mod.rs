//! Input-queued virtual-channel router with power gating.
//!
//! This module implements the per-router state machine. It provides:
//! 1. **[`Router`]:** Input buffers, downstream mirrors, allocator state, the
//!    four pipeline work queues, and the power controller.
//! 2. **Phases:** `receive_*` ingestion during the read phase,
//!    [`Router::power_state_evaluate`] and [`Router::internal_step`] during the
//!    evaluate phase, and `pop_outgoing_*` during the write phase — no router
//!    observes another's writes inside a cycle.
//! 3. **Dispatch:** One router type covers every gating discipline; the power
//!    controller and bypass engine switch behavior per cycle instead of a
//!    type-per-variant hierarchy.
//!
//! The pipeline stages themselves live in [`stages`]; the power-state machine
//! and handshake protocol in [`power`]; the bypass engine in [`bypass`].

pub mod bypass;
pub mod power;
pub mod stages;

pub use power::{PowerController, PowerState};

use std::collections::{BTreeMap, VecDeque};

use crate::alloc::{self, Allocator};
use crate::buffer::{Buffer, BufferState, VcState};
use crate::common::{Cycle, InvariantError, RouterId};
use crate::config::{Config, PowergateType, RouterConfig};
use crate::message::{Credit, Flit, Handshake};
use crate::routing::{self, RouteCtx, RoutingFunction};
use crate::stats::RouterActivity;

/// Outcome slot of a pipeline work-queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum StageOutcome {
    /// Not yet evaluated this pass.
    #[default]
    Pending,
    /// Granted; carries the expanded output for the switch stages.
    Granted(usize),
    /// Stalled; retried next cycle.
    Stall(StallKind),
}

/// Why an allocation request did not produce a grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StallKind {
    /// Every candidate downstream VC is owned by another input.
    BufferBusy,
    /// The allocator matched the input to a different VC's request.
    BufferConflict,
    /// Credit exhausted on every candidate VC.
    BufferFull,
    /// Full but held VCs exist (`vc_busy_when_full`).
    BufferReserved,
    /// A speculative grant lost to a non-speculative one.
    CrossbarConflict,
}

/// One entry of the VA/SA work queues: a (input, VC) pair moving through a
/// stage, with its ready time and outcome.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PipeEntry {
    /// Cycle the stage result applies; `None` while awaiting evaluation.
    pub ready: Option<Cycle>,
    /// Input port.
    pub input: usize,
    /// VC at that input.
    pub vc: usize,
    /// Stage outcome.
    pub outcome: StageOutcome,
}

impl PipeEntry {
    pub(crate) const fn pending(input: usize, vc: usize) -> Self {
        Self {
            ready: None,
            input,
            vc,
            outcome: StageOutcome::Pending,
        }
    }
}

/// A flit crossing the crossbar, with its landing time.
#[derive(Debug)]
pub(crate) struct CrossbarFlit {
    pub ready: Cycle,
    pub flit: Flit,
    pub expanded_output: usize,
}

/// An input-queued VC router with a power controller and bypass engine.
#[derive(Debug)]
pub struct Router {
    pub(crate) id: RouterId,
    pub(crate) k: usize,
    pub(crate) n: usize,
    pub(crate) cfg: RouterConfig,
    pub(crate) inputs: usize,
    pub(crate) outputs: usize,
    /// Neighbor router per directional port; `None` on mesh edges.
    pub(crate) neighbors: Vec<Option<RouterId>>,
    /// Bottom-row anchors never leave the on state.
    pub(crate) anchor: bool,
    pub(crate) rf: RoutingFunction,

    pub(crate) buf: Vec<Buffer>,
    pub(crate) next_buf: Vec<BufferState>,

    pub(crate) route_vcs: VecDeque<PipeEntry>,
    pub(crate) vc_alloc_vcs: VecDeque<PipeEntry>,
    pub(crate) sw_hold_vcs: VecDeque<PipeEntry>,
    pub(crate) sw_alloc_vcs: VecDeque<PipeEntry>,
    pub(crate) crossbar_flits: VecDeque<CrossbarFlit>,

    /// Flits staged by the read phase, one per input at most.
    pub(crate) in_queue_flits: BTreeMap<usize, Flit>,
    /// Credits awaiting their processing delay, per output port.
    pub(crate) proc_credits: VecDeque<(Cycle, Credit, usize)>,
    /// Handshakes staged by the read phase, per input port.
    pub(crate) proc_handshakes: VecDeque<(usize, Handshake)>,

    /// Credits to emit this cycle, per input port.
    pub(crate) out_queue_credits: BTreeMap<usize, Credit>,
    /// Handshakes to emit this cycle, per directional output port.
    pub(crate) out_queue_handshakes: BTreeMap<usize, Handshake>,

    pub(crate) output_buffer: Vec<VecDeque<Flit>>,
    pub(crate) credit_buffer: Vec<VecDeque<Credit>>,
    pub(crate) handshake_buffer: Vec<VecDeque<Handshake>>,

    pub(crate) vc_allocator: Box<dyn Allocator>,
    pub(crate) sw_allocator: Box<dyn Allocator>,
    pub(crate) spec_sw_allocator: Option<Box<dyn Allocator>>,

    /// Held crossbar connections, expanded input -> (expanded output, VC).
    pub(crate) switch_hold_in: Vec<Option<(usize, usize)>>,
    /// Held crossbar connections, expanded output -> expanded input.
    pub(crate) switch_hold_out: Vec<Option<usize>>,

    pub(crate) power: PowerController,
    pub(crate) powergate: PowergateType,
    /// Ring ports when the node-router decoupling overlay is active.
    pub(crate) ring_ports: Option<(usize, usize)>,

    pub(crate) active: bool,
    partial_internal: f64,
    pub(crate) stats: RouterActivity,
}

impl Router {
    /// Builds one router of the mesh.
    ///
    /// `neighbors` lists the adjacent router per directional port (`None`
    /// on edges); `anchor` pins the router to the on state.
    ///
    /// # Errors
    ///
    /// Fails when an allocator kind cannot be constructed.
    pub fn new(
        id: RouterId,
        config: &Config,
        neighbors: Vec<Option<RouterId>>,
        anchor: bool,
        rf: RoutingFunction,
    ) -> Result<Self, crate::common::ConfigError> {
        let cfg = config.router.clone();
        let n = config.topology.n;
        let inputs = 2 * n + 1;
        let outputs = 2 * n + 1;
        let vcs = cfg.num_vcs;

        let buf = (0..inputs)
            .map(|p| Buffer::new(id, p, vcs, cfg.vc_buf_size))
            .collect();
        let next_buf = (0..outputs)
            .map(|p| BufferState::new(id, p, vcs, cfg.vc_buf_size, cfg.wait_for_tail_credit))
            .collect();

        let vc_allocator = alloc::create(
            cfg.vc_allocator,
            inputs * vcs,
            outputs * vcs,
            vcs,
        )?;
        let exp_in = inputs * cfg.input_speedup;
        let exp_out = outputs * cfg.output_speedup;
        let sw_allocator = alloc::create(cfg.sw_allocator, exp_in, exp_out, vcs)?;
        let spec_sw_allocator = if cfg.speculative {
            Some(alloc::create(cfg.spec_sw_allocator, exp_in, exp_out, vcs)?)
        } else {
            None
        };

        let powergate = config.power.powergate_type;
        let ring_ports = (powergate == PowergateType::Nord)
            .then(|| routing::dor::nord_ring_ports(id, config.topology.k));

        let mut power = PowerController::new(2 * n, &config.power, anchor);
        power.logical_neighbor_ids.clone_from(&neighbors);

        Ok(Self {
            id,
            k: config.topology.k,
            n,
            inputs,
            outputs,
            neighbors,
            anchor,
            rf,
            buf,
            next_buf,
            route_vcs: VecDeque::new(),
            vc_alloc_vcs: VecDeque::new(),
            sw_hold_vcs: VecDeque::new(),
            sw_alloc_vcs: VecDeque::new(),
            crossbar_flits: VecDeque::new(),
            in_queue_flits: BTreeMap::new(),
            proc_credits: VecDeque::new(),
            proc_handshakes: VecDeque::new(),
            out_queue_credits: BTreeMap::new(),
            out_queue_handshakes: BTreeMap::new(),
            output_buffer: (0..outputs).map(|_| VecDeque::new()).collect(),
            credit_buffer: (0..inputs).map(|_| VecDeque::new()).collect(),
            handshake_buffer: (0..outputs).map(|_| VecDeque::new()).collect(),
            vc_allocator,
            sw_allocator,
            spec_sw_allocator,
            switch_hold_in: vec![None; exp_in],
            switch_hold_out: vec![None; exp_out],
            power,
            powergate,
            ring_ports,
            active: false,
            partial_internal: 0.0,
            stats: RouterActivity::default(),
            cfg,
        })
    }

    /// Router identifier.
    #[must_use]
    pub const fn id(&self) -> RouterId {
        self.id
    }

    /// Current power state.
    #[must_use]
    pub const fn power_state(&self) -> PowerState {
        self.power.state
    }

    /// Ejection/injection port index.
    #[must_use]
    pub const fn ejection_port(&self) -> usize {
        2 * self.n
    }

    /// Latches a wake signal; honoured once the break-even time elapses.
    pub fn wake_up(&mut self) {
        self.power.wake_signal = true;
    }

    /// Activity counters for reporting.
    #[must_use]
    pub const fn activity(&self) -> &RouterActivity {
        &self.stats
    }

    /// Read-only routing view of this router.
    #[must_use]
    pub fn route_ctx(&self) -> RouteCtx<'_> {
        RouteCtx {
            id: self.id,
            k: self.k,
            n: self.n,
            num_vcs: self.cfg.num_vcs,
            powergate: self.powergate,
            neighbor_states: &self.power.neighbor_states,
        }
    }

    // ------------------------------------------------------------------
    // read phase
    // ------------------------------------------------------------------

    /// Stages a flit arriving on `input` this cycle.
    ///
    /// # Errors
    ///
    /// Two flits on one input in one cycle violate the link contract.
    pub fn receive_flit(
        &mut self,
        input: usize,
        flit: Flit,
        cycle: Cycle,
    ) -> Result<(), InvariantError> {
        if self.in_queue_flits.contains_key(&input) {
            return Err(InvariantError::BadFlit {
                router: self.id,
                port: input,
                vc: flit.vc.unwrap_or(0),
                reason: format!("second flit {} staged on one input in one cycle", flit.id),
                cycle,
            });
        }
        self.stats.buffer_writes += 1;
        let _ = self.in_queue_flits.insert(input, flit);
        self.active = true;
        Ok(())
    }

    /// Stages a credit arriving for `output`; applied after the credit
    /// processing delay.
    pub fn receive_credit(&mut self, output: usize, credit: Credit, cycle: Cycle) {
        self.proc_credits
            .push_back((cycle + self.cfg.credit_delay, credit, output));
        self.active = true;
    }

    /// Stages a handshake arriving on `input`.
    pub fn receive_handshake(&mut self, input: usize, handshake: Handshake) {
        self.proc_handshakes.push_back((input, handshake));
    }

    // ------------------------------------------------------------------
    // evaluate phase
    // ------------------------------------------------------------------

    /// Applies staged handshakes to the power mirrors and relays them.
    ///
    /// Runs before [`Self::power_state_evaluate`] each cycle.
    ///
    /// # Errors
    ///
    /// Propagates power-protocol invariant violations.
    pub fn handshake_evaluate(&mut self, cycle: Cycle) -> Result<(), InvariantError> {
        power::handshake_evaluate(self, cycle)
    }

    /// Advances the power-state machine by one cycle.
    ///
    /// # Errors
    ///
    /// Propagates power-protocol invariant violations.
    pub fn power_state_evaluate(&mut self, cycle: Cycle) -> Result<(), InvariantError> {
        power::power_state_evaluate(self, cycle)
    }

    /// Advances the router's internal pipeline for one network cycle,
    /// honouring the internal speedup multiplier.
    ///
    /// # Errors
    ///
    /// Propagates invariant violations out of the pipeline stages.
    pub fn internal_step(&mut self, cycle: Cycle) -> Result<(), InvariantError> {
        self.partial_internal += self.cfg.internal_speedup;
        while self.partial_internal >= 1.0 {
            self.partial_internal -= 1.0;
            self.internal_step_once(cycle)?;
        }
        Ok(())
    }

    fn internal_step_once(&mut self, cycle: Cycle) -> Result<(), InvariantError> {
        if matches!(self.power.state, PowerState::Off | PowerState::Waking) {
            bypass::flov_step(self, cycle)?;
            self.output_queuing();
            self.active = !self.proc_credits.is_empty() || !self.in_queue_flits.is_empty();
            return Ok(());
        }

        if !self.active {
            power::handshake_response(self, cycle);
            self.output_queuing();
            self.power.idle_tick();
            return Ok(());
        }

        stages::input_queuing(self, cycle)?;
        let mut activity = !self.proc_credits.is_empty();

        stages::route_evaluate(self, cycle);
        self.vc_allocator.clear();
        stages::vc_alloc_evaluate(self, cycle);
        if self.cfg.hold_switch_for_packet {
            stages::sw_hold_evaluate(self, cycle);
        }
        self.sw_allocator.clear();
        if let Some(spec) = self.spec_sw_allocator.as_mut() {
            spec.clear();
        }
        stages::sw_alloc_evaluate(self, cycle);

        stages::route_update(self, cycle)?;
        activity |= !self.route_vcs.is_empty();
        stages::vc_alloc_update(self, cycle)?;
        activity |= !self.vc_alloc_vcs.is_empty();
        if self.cfg.hold_switch_for_packet {
            stages::sw_hold_update(self, cycle)?;
            activity |= !self.sw_hold_vcs.is_empty();
        }
        stages::sw_alloc_update(self, cycle)?;
        activity |= !self.sw_alloc_vcs.is_empty();
        stages::switch_update(self, cycle)?;
        activity |= !self.crossbar_flits.is_empty();

        power::handshake_response(self, cycle);

        // Flits sent back to route compute keep the router active.
        self.active = activity || !self.route_vcs.is_empty();
        if self.active {
            self.power.idle_reset();
        } else {
            self.power.idle_tick();
        }

        self.output_queuing();
        Ok(())
    }

    /// Moves per-cycle credit/handshake accumulations into the send FIFOs.
    fn output_queuing(&mut self) {
        for (input, credit) in std::mem::take(&mut self.out_queue_credits) {
            debug_assert!(!credit.is_empty());
            self.credit_buffer[input].push_back(credit);
        }
        for (output, handshake) in std::mem::take(&mut self.out_queue_handshakes) {
            debug_assert!(handshake.is_meaningful());
            self.handshake_buffer[output].push_back(handshake);
        }
    }

    // ------------------------------------------------------------------
    // write phase
    // ------------------------------------------------------------------

    /// Takes the flit leaving through `output` this cycle, if any.
    pub fn pop_outgoing_flit(&mut self, output: usize) -> Option<Flit> {
        let flit = self.output_buffer[output].pop_front()?;
        self.stats.buffer_reads += 1;
        Some(flit)
    }

    /// Takes the credit leaving through `input` this cycle, if any.
    pub fn pop_outgoing_credit(&mut self, input: usize) -> Option<Credit> {
        self.credit_buffer[input].pop_front()
    }

    /// Takes the handshake leaving through `output` this cycle, if any.
    pub fn pop_outgoing_handshake(&mut self, output: usize) -> Option<Handshake> {
        self.handshake_buffer[output].pop_front()
    }

    // ------------------------------------------------------------------
    // queries
    // ------------------------------------------------------------------

    /// Whether any flit, credit, or transition is still in flight here.
    ///
    /// A stable off state is quiescent, not busy.
    #[must_use]
    pub fn busy(&self) -> bool {
        self.power.state.is_transitioning()
            || !self.in_queue_flits.is_empty()
            || !self.proc_credits.is_empty()
            || !self.route_vcs.is_empty()
            || !self.vc_alloc_vcs.is_empty()
            || !self.sw_hold_vcs.is_empty()
            || !self.sw_alloc_vcs.is_empty()
            || !self.crossbar_flits.is_empty()
            || self.buf.iter().any(|b| !b.all_idle())
            || self.output_buffer.iter().any(|q| !q.is_empty())
            || self.credit_buffer.iter().any(|q| !q.is_empty())
            || self.handshake_buffer.iter().any(|q| !q.is_empty())
    }

    /// Earliest future cycle a power timer of this router can fire, if any.
    #[must_use]
    pub fn next_power_event_cycle(&self, cycle: Cycle) -> Option<Cycle> {
        self.power.next_event_cycle(cycle)
    }

    /// Whether the router's pipeline holds no flits at all.
    #[must_use]
    pub(crate) fn pipeline_empty(&self) -> bool {
        self.in_queue_flits.is_empty()
            && self.crossbar_flits.is_empty()
            && self.buf.iter().all(Buffer::all_idle)
            && self.output_buffer.iter().all(VecDeque::is_empty)
    }

    /// Whether `p` is a directional port with an attached neighbor.
    #[must_use]
    pub(crate) fn neighbor_exists(&self, p: usize) -> bool {
        p < 2 * self.n && self.neighbors[p].is_some()
    }

    /// Expanded crossbar input for (input, VC).
    #[must_use]
    pub(crate) fn expand_input(&self, input: usize, vc: usize) -> usize {
        input * self.cfg.input_speedup + vc % self.cfg.input_speedup
    }

    /// Expanded crossbar output for (output, input).
    #[must_use]
    pub(crate) fn expand_output(&self, output: usize, input: usize) -> usize {
        output * self.cfg.output_speedup + input % self.cfg.output_speedup
    }

    /// Queues one VC's worth of credit toward the upstream on `input`.
    pub(crate) fn queue_credit(&mut self, input: usize, vc: usize) {
        let _ = self
            .out_queue_credits
            .entry(input)
            .or_default()
            .push_vc(vc);
    }

    /// Emits a watch-trace event for a flit when it is on the watch list.
    pub(crate) fn watch_event(&self, flit: &Flit, cycle: Cycle, event: &str) {
        if flit.watch {
            tracing::trace!(
                target: "meshsim::watch",
                cycle,
                router = self.id,
                flit = flit.id,
                packet = flit.pid,
                "| node {} | {event}",
                self.id
            );
        }
    }

    /// The flit staged on `input` this cycle (bypass/test visibility).
    #[must_use]
    pub fn staged_flit(&self, input: usize) -> Option<&Flit> {
        self.in_queue_flits.get(&input)
    }

    /// Receive-side buffer of `input` (test visibility).
    #[must_use]
    pub fn input_buffer(&self, input: usize) -> &Buffer {
        &self.buf[input]
    }

    /// Downstream mirror of `output` (test visibility).
    #[must_use]
    pub fn downstream_mirror(&self, output: usize) -> &BufferState {
        &self.next_buf[output]
    }

    /// Whether every VC on every input port is idle.
    #[must_use]
    pub fn all_vcs_idle(&self) -> bool {
        self.buf.iter().all(Buffer::all_idle)
    }

    /// Mirrored power state of the neighbor on directional port `p`.
    #[must_use]
    pub fn neighbor_state(&self, p: usize) -> PowerState {
        self.power.neighbor_states[p]
    }

    /// Checks that no VC holds flits while claiming to be idle: an idle VC
    /// is always empty (an active VC may transiently drain empty while its
    /// packet's remaining flits are still upstream).
    #[must_use]
    pub fn vc_state_consistent(&self) -> bool {
        self.buf.iter().all(|b| {
            (0..b.num_vcs()).all(|v| b.state(v) != VcState::Idle || b.is_empty(v))
        })
    }
}
