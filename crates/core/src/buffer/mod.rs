//! Receive-side buffering and the downstream occupancy mirror.
//!
//! This module implements both ends of credit-based flow control. It provides:
//! 1. **[`VirtualChannel`] / [`VcState`]:** One bounded FIFO with its allocation
//!    state machine.
//! 2. **[`Buffer`]:** The per-input-port collection of VCs a router buffers
//!    arriving flits in, with validated state transitions.
//! 3. **[`BufferState`]:** The per-output-port mirror of the downstream router's
//!    occupancy that gates VC and switch allocation.

pub mod state;
pub mod vc;

pub use state::BufferState;
pub use vc::{VcState, VirtualChannel};

use crate::common::{Cycle, InvariantError, RouterId};
use crate::message::Flit;
use crate::routing::{OutputSet, RouteCtx, RoutingFunction};

/// Per-input-port VC buffers on the receive side of a router.
#[derive(Debug)]
pub struct Buffer {
    router: RouterId,
    input: usize,
    vc_buf_size: usize,
    vcs: Vec<VirtualChannel>,
}

impl Buffer {
    /// Creates `num_vcs` idle VCs of `vc_buf_size` flit slots each.
    #[must_use]
    pub fn new(router: RouterId, input: usize, num_vcs: usize, vc_buf_size: usize) -> Self {
        Self {
            router,
            input,
            vc_buf_size,
            vcs: (0..num_vcs).map(|_| VirtualChannel::new()).collect(),
        }
    }

    /// Number of VCs on this port.
    #[must_use]
    pub fn num_vcs(&self) -> usize {
        self.vcs.len()
    }

    /// Repurposes every VC as an `n`-slot buffer (one-slot bypass latch).
    pub fn set_vc_buf_size(&mut self, n: usize) {
        self.vc_buf_size = n;
    }

    /// Appends an arriving flit to `vc`.
    ///
    /// # Errors
    ///
    /// Overflowing the VC depth or landing a body flit on an idle VC are
    /// flow-control violations by the upstream router.
    pub fn add(&mut self, vc: usize, flit: Flit, cycle: Cycle) -> Result<(), InvariantError> {
        let ch = &mut self.vcs[vc];
        if ch.occupancy() >= self.vc_buf_size {
            return Err(InvariantError::BufferOverflow {
                router: self.router,
                port: self.input,
                vc,
                cycle,
            });
        }
        if !flit.head && ch.state() == VcState::Idle {
            return Err(InvariantError::BadFlit {
                router: self.router,
                port: self.input,
                vc,
                reason: format!("body flit {} arrived at an idle VC", flit.id),
                cycle,
            });
        }
        ch.push(flit);
        Ok(())
    }

    /// The flit at the front of `vc`.
    #[must_use]
    pub fn front(&self, vc: usize) -> Option<&Flit> {
        self.vcs[vc].front()
    }

    /// Mutable front flit of `vc`.
    pub fn front_mut(&mut self, vc: usize) -> Option<&mut Flit> {
        self.vcs[vc].front_mut()
    }

    /// Removes and returns the front flit of `vc`.
    pub fn remove(&mut self, vc: usize) -> Option<Flit> {
        self.vcs[vc].pop()
    }

    /// Whether `vc` holds no flits.
    #[must_use]
    pub fn is_empty(&self, vc: usize) -> bool {
        self.vcs[vc].is_empty()
    }

    /// Buffered flit count of `vc`.
    #[must_use]
    pub fn occupancy(&self, vc: usize) -> usize {
        self.vcs[vc].occupancy()
    }

    /// Allocation state of `vc`.
    #[must_use]
    pub fn state(&self, vc: usize) -> VcState {
        self.vcs[vc].state()
    }

    /// Transitions `vc` to `to`, validating against the VC state machine.
    ///
    /// # Errors
    ///
    /// An illegal predecessor state is an invariant violation; legal
    /// transitions are listed at [`VcState::can_transition_to`].
    pub fn set_state(&mut self, vc: usize, to: VcState, cycle: Cycle) -> Result<(), InvariantError> {
        let from = self.vcs[vc].state();
        if !from.can_transition_to(to) {
            return Err(InvariantError::IllegalVcTransition {
                router: self.router,
                port: self.input,
                vc,
                from: from.name(),
                to: to.name(),
                cycle,
            });
        }
        self.vcs[vc].set_state_raw(to);
        Ok(())
    }

    /// Runs the routing function for the head flit of `vc` and stores the
    /// resulting route set.
    pub fn route(&mut self, vc: usize, rf: RoutingFunction, ctx: &RouteCtx<'_>, flit: &Flit) {
        let set = rf(Some(ctx), flit, Some(self.input), false);
        self.vcs[vc].set_route_set(set);
    }

    /// Stores a precomputed route set (lookahead routing).
    pub fn set_route_set(&mut self, vc: usize, set: OutputSet) {
        self.vcs[vc].set_route_set(set);
    }

    /// The stored route set of `vc`.
    #[must_use]
    pub fn route_set(&self, vc: usize) -> Option<&OutputSet> {
        self.vcs[vc].route_set()
    }

    /// Mutable route set of `vc`.
    pub fn route_set_mut(&mut self, vc: usize) -> Option<&mut OutputSet> {
        self.vcs[vc].route_set_mut()
    }

    /// Drops the stored route set of `vc`.
    pub fn clear_route_set(&mut self, vc: usize) {
        self.vcs[vc].clear_route_set();
    }

    /// Records the granted (output port, output VC) for `vc`.
    pub fn set_output(&mut self, vc: usize, port: usize, out_vc: usize) {
        self.vcs[vc].set_output(port, out_vc);
    }

    /// Clears the output assignment of `vc`.
    pub fn clear_output(&mut self, vc: usize) {
        self.vcs[vc].clear_output();
    }

    /// Assigned output port of `vc`.
    #[must_use]
    pub fn out_port(&self, vc: usize) -> Option<usize> {
        self.vcs[vc].out_port()
    }

    /// Assigned output VC of `vc`.
    #[must_use]
    pub fn out_vc(&self, vc: usize) -> Option<usize> {
        self.vcs[vc].out_vc()
    }

    /// Output-side priority of `vc`.
    #[must_use]
    pub fn priority(&self, vc: usize) -> i64 {
        self.vcs[vc].priority()
    }

    /// Whether every VC on this port is idle.
    #[must_use]
    pub fn all_idle(&self) -> bool {
        self.vcs.iter().all(|vc| vc.state() == VcState::Idle)
    }

    /// Total flits buffered across all VCs.
    #[must_use]
    pub fn total_occupancy(&self) -> usize {
        self.vcs.iter().map(VirtualChannel::occupancy).sum()
    }
}
