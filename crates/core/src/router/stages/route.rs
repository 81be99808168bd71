//! Route compute (RC) stage.

use crate::buffer::VcState;
use crate::common::{Cycle, InvariantError};
use crate::router::{PipeEntry, Router, StageOutcome};
use crate::routing::RouteCtx;

/// Stamps ready times on VCs newly entered into route compute.
pub(crate) fn route_evaluate(r: &mut Router, cycle: Cycle) {
    for entry in &mut r.route_vcs {
        if entry.ready.is_some() {
            break;
        }
        entry.ready = Some(cycle + r.cfg.routing_delay);
        entry.outcome = StageOutcome::Pending;
    }
}

/// Runs the routing function for VCs whose route delay has elapsed and
/// advances them to VC allocation.
pub(crate) fn route_update(r: &mut Router, cycle: Cycle) -> Result<(), InvariantError> {
    while let Some(entry) = r.route_vcs.front().copied() {
        let Some(ready) = entry.ready else { break };
        if ready > cycle {
            break;
        }
        let PipeEntry { input, vc, .. } = entry;

        let Some(front) = r.buf[input].front(vc) else {
            return Err(InvariantError::BadFlit {
                router: r.id,
                port: input,
                vc,
                reason: "route compute on an empty VC".into(),
                cycle,
            });
        };
        debug_assert!(front.head);
        debug_assert_eq!(r.buf[input].state(vc), VcState::Routing);

        let flit = front.clone();
        let states = r.power.neighbor_states.clone();
        let ctx = RouteCtx {
            id: r.id,
            k: r.k,
            n: r.n,
            num_vcs: r.cfg.num_vcs,
            powergate: r.powergate,
            neighbor_states: &states,
        };
        let set = (r.rf)(Some(&ctx), &flit, Some(input), false);
        r.watch_event(&flit, cycle, "completed route compute");
        r.buf[input].set_route_set(vc, set);
        r.buf[input].set_state(vc, VcState::VcAlloc, cycle)?;
        if let Some(f) = r.buf[input].front_mut(vc) {
            f.rtime = cycle;
        }

        if r.cfg.speculative {
            r.sw_alloc_vcs.push_back(PipeEntry::pending(input, vc));
        }
        r.vc_alloc_vcs.push_back(PipeEntry::pending(input, vc));

        let _ = r.route_vcs.pop_front();
    }
    Ok(())
}
