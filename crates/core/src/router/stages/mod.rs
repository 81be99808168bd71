//! The four pipeline stages of the input-queued router.
//!
//! Each stage is a pair of free functions over the router, mirroring the
//! evaluate/update split of the global phase discipline: `*_evaluate` issues
//! requests and stamps ready times, `*_update` applies outcomes whose delay has
//! elapsed. Head flits traverse route compute, VC allocation, switch
//! allocation, and switch traversal; body and tail flits inherit the head's
//! assignment and only arbitrate for the switch.

mod route;
mod sw_alloc;
mod switch;
mod vc_alloc;

pub(crate) use route::{route_evaluate, route_update};
pub(crate) use sw_alloc::{sw_alloc_evaluate, sw_alloc_update, sw_hold_evaluate, sw_hold_update};
pub(crate) use switch::switch_update;
pub(crate) use vc_alloc::{vc_alloc_evaluate, vc_alloc_update};

use super::{PipeEntry, Router};
use crate::buffer::VcState;
use crate::common::{Cycle, InvariantError};
use crate::routing::RouteCtx;

/// Moves flits staged by the read phase into their VC buffers and applies
/// credits whose processing delay has elapsed.
///
/// A head flit landing on an idle VC starts the pipeline: into route
/// compute, or straight to VC allocation when it carries a lookahead
/// route. A flit landing at the front of an active VC re-arms switch
/// allocation for that VC.
pub(crate) fn input_queuing(r: &mut Router, cycle: Cycle) -> Result<(), InvariantError> {
    let staged: Vec<(usize, crate::message::Flit)> =
        std::mem::take(&mut r.in_queue_flits).into_iter().collect();

    for (input, mut flit) in staged {
        let vc = flit.vc.unwrap_or(0);
        flit.etime = cycle;
        if input < 2 * r.n {
            flit.hops += 1;
        }
        let head = flit.head;
        let lookahead = if r.cfg.lookahead_routing {
            flit.lookahead.take()
        } else {
            None
        };
        let was_idle = r.buf[input].state(vc) == VcState::Idle;
        let lands_at_front = r.buf[input].is_empty(vc);
        r.watch_event(&flit, cycle, "adding flit to input buffer");
        r.buf[input].add(vc, flit, cycle)?;

        if was_idle {
            if let Some(set) = lookahead {
                // Lookahead routing skips route compute entirely.
                r.buf[input].set_route_set(vc, set);
                if let Some(f) = r.buf[input].front_mut(vc) {
                    f.rtime = cycle;
                }
                r.buf[input].set_state(vc, VcState::VcAlloc, cycle)?;
                r.vc_alloc_vcs.push_back(PipeEntry::pending(input, vc));
                if r.cfg.speculative {
                    r.sw_alloc_vcs.push_back(PipeEntry::pending(input, vc));
                }
            } else {
                debug_assert!(head, "buffer admitted a body flit to an idle VC");
                r.buf[input].set_state(vc, VcState::Routing, cycle)?;
                r.route_vcs.push_back(PipeEntry::pending(input, vc));
            }
        } else if r.buf[input].state(vc) == VcState::Active && lands_at_front {
            // The VC was drained mid-packet; the new front flit must
            // arbitrate for the switch again.
            let exp_in = r.expand_input(input, vc);
            if r.cfg.hold_switch_for_packet && r.switch_hold_in[exp_in].is_some() {
                r.sw_hold_vcs.push_back(PipeEntry::pending(input, vc));
            } else {
                r.sw_alloc_vcs.push_back(PipeEntry::pending(input, vc));
            }
        }
    }

    while let Some(&(ready, _, _)) = r.proc_credits.front() {
        if ready > cycle {
            break;
        }
        let Some((_, credit, output)) = r.proc_credits.pop_front() else {
            break;
        };
        r.next_buf[output].process_credit(&credit, cycle)?;
    }
    Ok(())
}

/// Builds the routing view of the downstream router on `out`, used to
/// precompute the lookahead route as a flit departs.
///
/// Geometry is exact; the power mirrors are this router's own, which is
/// all a route-compute unit can see one hop early.
pub(crate) fn lookahead_route(r: &Router, flit: &crate::message::Flit, out: usize) -> Option<crate::routing::OutputSet> {
    let neighbor = r.neighbors.get(out).copied().flatten()?;
    let states = r.power.neighbor_states.clone();
    let ctx = RouteCtx {
        id: neighbor,
        k: r.k,
        n: r.n,
        num_vcs: r.cfg.num_vcs,
        powergate: r.powergate,
        neighbor_states: &states,
    };
    Some((r.rf)(Some(&ctx), flit, Some(crate::common::port::opposite(out)), false))
}

/// VC range a no-output-queueing router may request downstream, derived
/// from the next hop's output port.
pub(crate) fn noq_vc_range(next_out: usize, num_vcs: usize, outputs: usize) -> (usize, usize) {
    let per = (num_vcs / outputs).max(1);
    let start = (next_out * per).min(num_vcs - 1);
    let end = (start + per - 1).min(num_vcs - 1);
    (start, end)
}
