//! Power-state machine and the neighbor handshake protocol.
//!
//! This module implements per-router power gating. It provides:
//! 1. **[`PowerState`] / [`PowerController`]:** The {on, draining, off, waking}
//!    machine with its timers, drain tags, and neighbor mirrors.
//! 2. **`power_state_evaluate`:** The per-cycle transition function, including
//!    the neighbor-serialization invariant, drain timeout, and break-even gate.
//! 3. **`handshake_evaluate` / `handshake_response`:** Receiving, applying,
//!    and relaying handshakes; acknowledging drains with `drain_done` once no
//!    local traffic targets the transitioning neighbor.
//!
//! Gated routers stay on the handshake plane: they relay state changes along
//! the straight-through path so flow control stays correct across the gap, and
//! they relay drain tags toward routers waking up at the same time.

use tracing::{debug, warn};

use super::Router;
use crate::common::{Cycle, InvariantError, port};
use crate::config::{PowerConfig, PowergateType};
use crate::message::Handshake;

/// Power state of a router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PowerState {
    /// Pipeline active; the only state that accepts new packets.
    #[default]
    On,
    /// No new work; waiting for in-flight flits to clear.
    Draining,
    /// Pipeline dark; only the bypass engine runs.
    Off,
    /// Re-energizing; collects drain tags before returning to on.
    Waking,
}

impl PowerState {
    /// Short display name used in diagnostics.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::On => "on",
            Self::Draining => "draining",
            Self::Off => "off",
            Self::Waking => "waking",
        }
    }

    /// Whether this state is one of the two transitional states.
    #[must_use]
    pub const fn is_transitioning(self) -> bool {
        matches!(self, Self::Draining | Self::Waking)
    }
}

/// Per-router power control state.
#[derive(Debug)]
pub struct PowerController {
    /// Current state.
    pub state: PowerState,
    /// Latched wake request, honoured after the break-even time.
    pub(crate) wake_signal: bool,
    /// Consecutive idle cycles while on.
    pub(crate) idle_timer: u64,
    /// Cycles spent in the current drain attempt.
    pub(crate) drain_timer: u64,
    /// Cycles spent off since the last transition.
    pub(crate) off_timer: u64,
    /// Cycles spent waking since the last transition.
    pub(crate) wake_timer: u64,
    /// Effective idle threshold, nudged by the adaptive policy.
    pub(crate) idle_threshold: u64,
    /// Whether this router may gate at all (anchors and parked-core policy).
    pub(crate) gating_allowed: bool,
    /// Drain acknowledgments collected, per directional port.
    pub(crate) drain_tags: Vec<bool>,
    /// Whether a drain acknowledgment was sent, per directional port.
    pub(crate) drain_done_sent: Vec<bool>,
    /// Direct neighbor states, per directional port.
    pub(crate) neighbor_states: Vec<PowerState>,
    /// Logical downstream states (through gated gaps), per directional port.
    pub(crate) downstream_states: Vec<PowerState>,
    /// First awake router per directional port; the direct neighbor until
    /// gating opens a gap, `None` past a mesh edge or an all-dark run.
    pub(crate) logical_neighbor_ids: Vec<Option<usize>>,
    /// Metered credits owed upstream after going off, per port per VC.
    pub(crate) credit_counter: Vec<Vec<usize>>,
    cfg: PowerConfig,
    hid: u64,
}

impl PowerController {
    /// Creates the controller for a router with `dir_ports` directional
    /// ports. Anchors never leave the on state.
    #[must_use]
    pub fn new(dir_ports: usize, cfg: &PowerConfig, anchor: bool) -> Self {
        Self {
            state: PowerState::On,
            wake_signal: false,
            idle_timer: 0,
            drain_timer: 0,
            off_timer: 0,
            wake_timer: 0,
            idle_threshold: cfg.idle_threshold,
            gating_allowed: cfg.powergate_type.gates()
                && cfg.powergate_type != PowergateType::Rp
                && !anchor,
            drain_tags: vec![false; dir_ports],
            drain_done_sent: vec![false; dir_ports],
            neighbor_states: vec![PowerState::On; dir_ports],
            downstream_states: vec![PowerState::On; dir_ports],
            logical_neighbor_ids: vec![None; dir_ports],
            credit_counter: vec![Vec::new(); dir_ports],
            cfg: cfg.clone(),
            hid: 0,
        }
    }

    /// Marks a directional port as edge (no neighbor): permanently off in
    /// the mirrors, so drains never wait on it.
    pub fn mark_edge(&mut self, p: usize) {
        self.neighbor_states[p] = PowerState::Off;
        self.downstream_states[p] = PowerState::Off;
    }

    /// One idle cycle observed while on.
    pub(crate) fn idle_tick(&mut self) {
        self.idle_timer += 1;
    }

    /// Activity observed; restart the idle countdown.
    pub(crate) fn idle_reset(&mut self) {
        self.idle_timer = 0;
    }

    /// Next handshake identifier.
    pub(crate) fn next_hid(&mut self) -> u64 {
        self.hid += 1;
        self.hid
    }

    /// Lowers the idle threshold: gate more aggressively.
    pub(crate) fn aggress(&mut self) {
        self.idle_threshold = (self.idle_threshold / 2).max(1);
    }

    /// Raises the idle threshold: gate more conservatively.
    pub(crate) fn regress(&mut self) {
        self.idle_threshold = (self.idle_threshold * 2).min(self.cfg.idle_threshold * 8);
    }

    /// Whether any directional mirror shows a transitioning downstream.
    fn any_downstream_transitioning(&self) -> bool {
        self.downstream_states
            .iter()
            .any(|s| s.is_transitioning())
    }

    /// Earliest future cycle one of the power timers can fire.
    #[must_use]
    pub fn next_event_cycle(&self, cycle: Cycle) -> Option<Cycle> {
        match self.state {
            PowerState::On => {
                if self.gating_allowed {
                    Some(cycle + self.idle_threshold.saturating_sub(self.idle_timer).max(1))
                } else {
                    None
                }
            }
            PowerState::Draining => Some(
                cycle + self
                    .cfg
                    .drain_threshold
                    .saturating_sub(self.drain_timer)
                    .max(1),
            ),
            PowerState::Off => self.wake_signal.then(|| {
                cycle + self
                    .cfg
                    .bet_threshold
                    .saturating_sub(self.off_timer)
                    .max(1)
            }),
            PowerState::Waking => Some(
                cycle + self
                    .cfg
                    .wakeup_threshold
                    .saturating_sub(self.wake_timer)
                    .max(1),
            ),
        }
    }
}

/// Queues a state-change announcement toward every attached neighbor.
///
/// `src_state` is the router's state after the transition; receivers
/// disambiguate the transition with their own mirrors.
fn announce(r: &mut Router, new_state: PowerState) {
    for p in 0..2 * r.n {
        if !r.neighbor_exists(p) {
            continue;
        }
        let hid = r.power.next_hid();
        let entry = r
            .out_queue_handshakes
            .entry(p)
            .or_insert_with(|| Handshake::new(r.id, hid));
        entry.src = r.id;
        entry.src_state = Some(r.power.state);
        entry.new_state = Some(new_state);
    }
}

/// Like [`announce`], but each port carries the state mirrored on the
/// opposite port: when going off, neighbors learn who now sits beyond the
/// gap.
fn announce_off(r: &mut Router) {
    for p in 0..2 * r.n {
        if !r.neighbor_exists(p) {
            continue;
        }
        let beyond = r.power.downstream_states[port::opposite(p)];
        let beyond_id = r.power.logical_neighbor_ids[port::opposite(p)];
        let hid = r.power.next_hid();
        let entry = r
            .out_queue_handshakes
            .entry(p)
            .or_insert_with(|| Handshake::new(r.id, hid));
        entry.src = r.id;
        entry.src_state = Some(PowerState::Off);
        entry.new_state = Some(beyond);
        entry.logical_neighbor = beyond_id;
    }
}

/// Checkerboard symmetry breaker for transition entry.
///
/// Adjacent routers differ in coordinate-sum parity, so gating entry to
/// cycles matching the router's parity makes same-cycle transitions of two
/// neighbors impossible; with unit-delay handshakes the announcement then
/// always lands before the neighbor's next eligible cycle.
fn transition_slot(r: &Router, cycle: Cycle) -> bool {
    let digit_sum: usize = (0..r.n)
        .map(|dim| crate::routing::dor::coord(r.id, r.k, dim))
        .sum();
    (digit_sum % 2) as u64 == cycle % 2
}

/// Whether the drain of this router has fully completed.
fn drain_complete(r: &Router) -> bool {
    let tags_ok = (0..2 * r.n).all(|p| !r.neighbor_exists(p) || r.power.drain_tags[p]);
    tags_ok && r.pipeline_empty() && r.vc_alloc_vcs.is_empty() && r.sw_alloc_vcs.is_empty()
}

/// Advances the power-state machine by one cycle.
///
/// # Errors
///
/// Returns an invariant error when the machine observes an impossible
/// configuration (e.g. buffered flits on an off router).
pub(crate) fn power_state_evaluate(r: &mut Router, cycle: Cycle) -> Result<(), InvariantError> {
    match r.power.state {
        PowerState::On => {
            r.power.drain_tags.fill(false);
            if r.power.wake_signal {
                // A wake aimed at an on router just resets the idle clock.
                r.power.wake_signal = false;
                r.power.idle_reset();
                return Ok(());
            }
            if !r.power.gating_allowed || r.anchor {
                return Ok(());
            }
            if r.power.idle_timer < r.power.idle_threshold || !r.pipeline_empty() {
                return Ok(());
            }
            // Neighbor serialization: defer while any neighbor transitions,
            // and only enter on this router's parity slot so two neighbors
            // can never start draining in the same cycle.
            if r.power.any_downstream_transitioning() || !transition_slot(r, cycle) {
                return Ok(());
            }
            r.power.state = PowerState::Draining;
            r.power.idle_reset();
            r.power.drain_timer = 0;
            r.stats.drain_attempts += 1;
            for p in 0..2 * r.n {
                if r.power.downstream_states[p] == PowerState::Off {
                    r.power.drain_tags[p] = true;
                }
            }
            debug!(router = r.id, cycle, "power: on -> draining");
            announce(r, PowerState::Draining);
        }

        PowerState::Draining => {
            r.power.drain_timer += 1;
            let mut neighbor_waking = false;
            let mut neighbor_draining_pri = false;
            for p in 0..2 * r.n {
                match r.power.downstream_states[p] {
                    PowerState::Waking => neighbor_waking = true,
                    // West/north neighbors win same-cycle drain races.
                    PowerState::Draining if p == port::WEST || p == port::NORTH => {
                        neighbor_draining_pri = true;
                    }
                    _ => {}
                }
            }
            if r.power.wake_signal || neighbor_waking || neighbor_draining_pri {
                r.power.wake_signal = false;
                r.power.state = PowerState::On;
                r.power.drain_tags.fill(false);
                r.power.idle_reset();
                r.power.drain_timer = 0;
                debug!(router = r.id, cycle, "power: drain aborted, back to on");
                announce(r, PowerState::On);
            } else if drain_complete(r) {
                for p in 0..2 * r.n {
                    if !r.neighbor_exists(p) {
                        continue;
                    }
                    r.power.credit_counter[p] = (0..r.cfg.num_vcs)
                        .map(|vc| r.next_buf[p].free_slots_for(vc))
                        .collect();
                }
                r.power.state = PowerState::Off;
                r.power.drain_tags.fill(false);
                r.power.off_timer = 0;
                r.stats.record_drain_time(r.power.drain_timer);
                r.power.drain_timer = 0;
                if let Some((ring_in, ring_out)) = r.ring_ports {
                    // Repurpose the ring-out VCs as one-slot bypass latches.
                    r.next_buf[ring_out].set_vc_buf_size(1);
                    r.buf[ring_in].set_vc_buf_size(1);
                }
                debug!(router = r.id, cycle, "power: draining -> off");
                announce_off(r);
            } else if r.power.drain_timer > r.cfg_drain_threshold() {
                r.power.state = PowerState::On;
                r.power.drain_tags.fill(false);
                r.power.idle_reset();
                r.stats.drain_timeouts += 1;
                r.stats.record_drain_time(r.power.drain_timer);
                r.power.drain_timer = 0;
                warn!(router = r.id, cycle, "power: drain timed out, back to on");
                announce(r, PowerState::On);
            }
        }

        PowerState::Off => {
            for (p, b) in r.buf.iter().enumerate() {
                if !b.all_idle() {
                    return Err(InvariantError::PowerState {
                        router: r.id,
                        reason: format!("off router holds buffered flits on input {p}"),
                        cycle,
                    });
                }
            }
            r.stats.power_off_cycles += 1;
            r.power.off_timer += 1;
            if !r.power.wake_signal {
                return Ok(());
            }
            let neighbor_transitioning = r.power.any_downstream_transitioning();
            if r.power.off_timer >= r.cfg_bet_threshold()
                && !neighbor_transitioning
                && transition_slot(r, cycle)
                && r.out_queue_handshakes.is_empty()
            {
                r.power.wake_signal = false;
                r.power.state = PowerState::Waking;
                r.power.wake_timer = 0;
                r.power.off_timer = 0;
                r.stats.wake_events += 1;
                r.power.drain_tags.fill(false);
                for p in 0..2 * r.n {
                    if r.power.downstream_states[p] == PowerState::Off {
                        r.power.drain_tags[p] = true;
                    }
                }
                debug!(router = r.id, cycle, "power: off -> waking");
                announce(r, PowerState::Waking);
            }
        }

        PowerState::Waking => {
            r.power.wake_timer += 1;
            for p in 0..2 * r.n {
                if r.power.downstream_states[p] == PowerState::Off {
                    r.power.drain_tags[p] = true;
                }
            }
            let tags_ok = (0..2 * r.n).all(|p| !r.neighbor_exists(p) || r.power.drain_tags[p]);
            let drained = tags_ok && r.in_queue_flits.is_empty();
            if drained
                && r.power.wake_timer >= r.cfg_wakeup_threshold()
                && r.out_queue_handshakes.is_empty()
            {
                r.power.wake_signal = false;
                r.power.wake_timer = 0;
                r.power.idle_reset();
                r.power.state = PowerState::On;
                r.power.drain_tags.fill(false);
                if let Some((ring_in, ring_out)) = r.ring_ports {
                    r.next_buf[ring_out].set_vc_buf_size(r.cfg.vc_buf_size);
                    r.buf[ring_in].set_vc_buf_size(r.cfg.vc_buf_size);
                }
                debug!(router = r.id, cycle, "power: waking -> on");
                announce(r, PowerState::On);
                // Simultaneous wakers exchanged drain tags through the
                // relays; remember which acknowledgments already went out.
                for p in 0..2 * r.n {
                    if r.power.downstream_states[p].is_transitioning()
                        && r.power.downstream_states[port::opposite(p)] == PowerState::Off
                    {
                        r.power.drain_done_sent[p] = true;
                    }
                }
            }
        }
    }
    Ok(())
}

/// Applies staged handshakes to the mirrors, collecting drain tags and
/// relaying along the straight-through path when gated.
pub(crate) fn handshake_evaluate(r: &mut Router, cycle: Cycle) -> Result<(), InvariantError> {
    let mut new_downstream = r.power.downstream_states.clone();

    while let Some((input, mut h)) = r.proc_handshakes.pop_front() {
        let output = port::opposite(input);

        // Wake requests are addressed: latch ours, relay through gated
        // routers, drop the rest as stale.
        if let Some(target) = h.wake {
            if target == r.id {
                r.power.wake_signal = true;
                h.wake = None;
            } else if matches!(r.power.state, PowerState::On | PowerState::Draining) {
                h.wake = None;
            }
        }

        // Track where bypassed flits will land: an off announcement points
        // past the emitter, anything else names the emitter itself.
        let logical_update = if h.src_state == Some(PowerState::Off) {
            h.logical_neighbor
        } else {
            Some(h.src)
        };

        match r.power.state {
            PowerState::On | PowerState::Draining => {
                match h.src_state {
                    Some(PowerState::Off) => {
                        if r.power.state == PowerState::Draining
                            && r.power.downstream_states[input] == PowerState::Draining
                        {
                            return Err(InvariantError::PowerState {
                                router: r.id,
                                reason: format!(
                                    "neighbor on port {input} went off while this router drains"
                                ),
                                cycle,
                            });
                        }
                        r.next_buf[input].clear_credits();
                        r.power.drain_done_sent[input] = false;
                    }
                    Some(PowerState::On) => {
                        if r.power.downstream_states[input] == PowerState::Waking {
                            r.next_buf[input].full_credits();
                        }
                        r.power.drain_done_sent[input] = false;
                    }
                    Some(PowerState::Draining | PowerState::Waking) => {
                        r.power.drain_done_sent[input] = false;
                    }
                    None => {}
                }
                if h.drain_done && r.power.state == PowerState::Draining {
                    if r.power.drain_tags[input] {
                        warn!(
                            router = r.id,
                            input, cycle, "duplicate drain tag; keeping the first"
                        );
                    }
                    r.power.drain_tags[input] = true;
                }
                // Consumed; awake routers never relay.
            }

            PowerState::Off => {
                match h.src_state {
                    Some(PowerState::Off) => {
                        r.power.credit_counter[input].fill(0);
                        r.next_buf[input].clear_credits();
                    }
                    Some(PowerState::On) => {
                        if r.power.downstream_states[input] == PowerState::Waking {
                            r.power.credit_counter[input].fill(0);
                            r.next_buf[input].full_credits();
                        }
                    }
                    _ => {}
                }
                // A drain tag travelling toward a router that is no longer
                // transitioning is stale; drop it before relaying.
                if h.drain_done && !r.power.downstream_states[output].is_transitioning() {
                    h.drain_done = false;
                }
                if let Some(ns) = h.new_state {
                    new_downstream[input] = ns;
                    r.power.logical_neighbor_ids[input] = logical_update;
                }
                if r.neighbors[input] == Some(h.src) {
                    if let Some(ss) = h.src_state {
                        r.power.neighbor_states[input] = ss;
                    }
                }
                if r.neighbor_exists(output) && h.is_meaningful() {
                    relay(r, output, h);
                }
                continue;
            }

            PowerState::Waking => {
                match h.src_state {
                    Some(PowerState::Off) => {
                        r.power.credit_counter[input].fill(0);
                        r.next_buf[input].clear_credits();
                        // The off announcement must keep travelling for
                        // credit correctness even while waking.
                        if r.neighbor_exists(output) {
                            let mut fwd = h.clone();
                            fwd.new_state = None;
                            fwd.drain_done = false;
                            relay(r, output, fwd);
                        }
                    }
                    Some(PowerState::On) => {
                        if r.power.downstream_states[input] == PowerState::Waking {
                            r.power.credit_counter[input].fill(0);
                            r.next_buf[input].full_credits();
                        }
                    }
                    Some(PowerState::Waking) => {
                        // Simultaneous wake on the same line: hand our tag
                        // across so both sides can finish.
                        if r.power.drain_tags[output]
                            && r.power.downstream_states[output] != PowerState::Off
                            && r.neighbor_exists(input)
                        {
                            let hid = r.power.next_hid();
                            let entry = r
                                .out_queue_handshakes
                                .entry(input)
                                .or_insert_with(|| Handshake::new(r.id, hid));
                            entry.drain_done = true;
                            r.power.drain_done_sent[input] = true;
                        }
                    }
                    _ => {}
                }
                if h.drain_done {
                    r.power.drain_tags[input] = true;
                    if r.power.downstream_states[output] == PowerState::Waking
                        && r.neighbor_exists(output)
                    {
                        let hid = r.power.next_hid();
                        let entry = r
                            .out_queue_handshakes
                            .entry(output)
                            .or_insert_with(|| Handshake::new(r.id, hid));
                        entry.drain_done = true;
                        r.power.drain_done_sent[output] = true;
                    }
                }
            }
        }

        if let Some(ns) = h.new_state {
            new_downstream[input] = ns;
            r.power.logical_neighbor_ids[input] = logical_update;
        }
        if r.neighbors[input] == Some(h.src) {
            if let Some(ss) = h.src_state {
                r.power.neighbor_states[input] = ss;
            }
        }
        // A waking router still relays wake requests addressed further on.
        if r.power.state == PowerState::Waking
            && h.wake.is_some()
            && r.neighbor_exists(output)
        {
            relay(r, output, h);
        }
    }

    r.power.downstream_states = new_downstream;
    Ok(())
}

/// Merges a relayed handshake into the outgoing slot for `output`.
fn relay(r: &mut Router, output: usize, h: Handshake) {
    match r.out_queue_handshakes.entry(output) {
        std::collections::btree_map::Entry::Vacant(slot) => {
            let _ = slot.insert(h);
        }
        std::collections::btree_map::Entry::Occupied(mut slot) => {
            let entry = slot.get_mut();
            entry.drain_done |= h.drain_done;
            entry.wake = entry.wake.or(h.wake);
            if entry.src_state.is_none() && entry.new_state.is_none() {
                entry.src = h.src;
                entry.src_state = h.src_state;
                entry.new_state = h.new_state;
                entry.logical_neighbor = h.logical_neighbor;
            } else if h.src_state == Some(PowerState::Off) {
                entry.src_state = Some(PowerState::Off);
                entry.logical_neighbor = h.logical_neighbor;
            }
        }
    }
}

/// Sends `drain_done` toward every transitioning neighbor this router has
/// no remaining traffic for.
///
/// Only on/draining routers respond; gated routers relay instead.
pub(crate) fn handshake_response(r: &mut Router, _cycle: Cycle) {
    debug_assert!(matches!(
        r.power.state,
        PowerState::On | PowerState::Draining
    ));

    for out in 0..2 * r.n {
        if !r.neighbor_exists(out)
            || !r.power.downstream_states[out].is_transitioning()
            || r.power.drain_done_sent[out]
        {
            continue;
        }
        let mut done = true;
        'check: for b in &r.buf {
            for vc in 0..b.num_vcs() {
                if b.out_port(vc) == Some(out) && b.state(vc) == crate::buffer::VcState::Active {
                    done = false;
                    break 'check;
                }
            }
        }
        if done {
            done = !r
                .crossbar_flits
                .iter()
                .any(|cf| cf.expanded_output / r.cfg.output_speedup == out);
        }
        if done {
            done = r.output_buffer[out].is_empty();
        }
        if done {
            let hid = r.power.next_hid();
            let entry = r
                .out_queue_handshakes
                .entry(out)
                .or_insert_with(|| Handshake::new(r.id, hid));
            entry.drain_done = true;
            r.power.drain_done_sent[out] = true;
        }
    }
}

impl Router {
    /// Adaptive policy hook: gate more aggressively.
    pub fn aggress_power_gating_policy(&mut self) {
        self.power.aggress();
    }

    /// Adaptive policy hook: gate more conservatively.
    pub fn regress_power_gating_policy(&mut self) {
        self.power.regress();
    }

    /// Router-parking hook: a parked core permits gating, an active core
    /// forbids it (and wakes the router).
    pub fn set_core_parked(&mut self, parked: bool) {
        if self.powergate == PowergateType::Rp && !self.anchor {
            self.power.gating_allowed = parked;
            if !parked {
                self.wake_up();
            }
        }
    }

    pub(crate) fn cfg_drain_threshold(&self) -> u64 {
        self.power_cfg().drain_threshold
    }

    pub(crate) fn cfg_bet_threshold(&self) -> u64 {
        self.power_cfg().bet_threshold
    }

    pub(crate) fn cfg_wakeup_threshold(&self) -> u64 {
        self.power_cfg().wakeup_threshold
    }

    fn power_cfg(&self) -> &PowerConfig {
        &self.power.cfg
    }
}
