//! VC allocation (VA) stage.
//!
//! Head flits whose route is known request a downstream VC here. Requests are
//! filtered by downstream availability and by the power state of the chosen
//! neighbor: transitioning neighbors are skipped for the cycle, and a gated
//! neighbor the flit would have to turn or eject at gets a wake request
//! instead of a reservation. Two recovery paths return a VC to route compute:
//! an emptied candidate set, and the stall watchdog.

use std::collections::VecDeque;

use crate::buffer::VcState;
use crate::common::{Cycle, InvariantError, port, vc_owner_key};
use crate::config::PowergateType;
use crate::message::Handshake;
use crate::router::{PipeEntry, PowerState, Router, StageOutcome, StallKind};
use crate::routing::dor;

/// Decision for a route candidate whose direct neighbor is gated.
enum GatedVerdict {
    /// Send the flit in; it flies over the dark run and lands awake.
    Transit,
    /// The flit would have to stop inside the dark run: wake that router.
    Wake(usize),
    /// Someone along the run is mid-transition; retry next cycle.
    Defer,
}

/// Whether a flit may be sent through the gated run behind port `p`.
///
/// A bypassed flit flies until the first awake router in that direction
/// (the logical neighbor), so transit is safe only when that landing point
/// is at or before the router where the flit's route turns or ejects. On
/// the decoupling ring, a flit that has already missed its route too many
/// times wakes its stop-over point instead of circling again.
fn gated_verdict(
    r: &Router,
    p: usize,
    neighbor: usize,
    dest_router: usize,
    flit_hops: u32,
) -> GatedVerdict {
    let Some(terminal) = dor::terminal_router(r.id, dest_router, r.k, r.n, p) else {
        return GatedVerdict::Defer;
    };

    match r.powergate {
        PowergateType::Flov | PowergateType::Gflov | PowergateType::Rflov => {
            if r.powergate == PowergateType::Rflov && port::dimension(p) != 0 {
                return GatedVerdict::Wake(neighbor);
            }
            if neighbor == terminal {
                return GatedVerdict::Wake(terminal);
            }
            if r.power.downstream_states[p] != PowerState::On {
                // The first awake router in this direction is transitioning
                // or the whole run is dark; wake the stop-over point.
                return if r.power.downstream_states[p] == PowerState::Off {
                    GatedVerdict::Wake(terminal)
                } else {
                    GatedVerdict::Defer
                };
            }
            let dim = port::dimension(p);
            match r.power.logical_neighbor_ids[p] {
                Some(landing)
                    if dor::axis_distance(r.id, landing, r.k, dim)
                        <= dor::axis_distance(r.id, terminal, r.k, dim) =>
                {
                    GatedVerdict::Transit
                }
                Some(_) => GatedVerdict::Wake(terminal),
                None => GatedVerdict::Wake(terminal),
            }
        }
        PowergateType::Nord => {
            let miss_route_limit = (4 * r.k * r.n) as u32;
            let (ring_in, _) = dor::nord_ring_ports(neighbor, r.k);
            if flit_hops > miss_route_limit {
                GatedVerdict::Wake(terminal)
            } else if ring_in == port::opposite(p) && neighbor != dest_router {
                GatedVerdict::Transit
            } else {
                GatedVerdict::Wake(neighbor)
            }
        }
        PowergateType::None | PowergateType::Rp => GatedVerdict::Wake(neighbor),
    }
}

/// Issues VC requests for pending entries, runs the allocator, and stamps
/// outcomes and ready times.
pub(crate) fn vc_alloc_evaluate(r: &mut Router, cycle: Cycle) {
    let num_vcs = r.cfg.num_vcs;
    let mut wake_ports: Vec<(usize, usize)> = Vec::new();

    for i in 0..r.vc_alloc_vcs.len() {
        let PipeEntry { ready, input, vc, .. } = r.vc_alloc_vcs[i];
        if ready.is_some() {
            break;
        }
        debug_assert_eq!(r.buf[input].state(vc), VcState::VcAlloc);
        let Some(front) = r.buf[input].front(vc) else {
            continue;
        };
        let dest_router = front.dest_router;
        let front_hops = front.hops;
        let lookahead_out = front
            .lookahead
            .as_ref()
            .and_then(|la| la.single())
            .and_then(|c| c.output_port);
        let out_pri = r.buf[input].priority(vc);
        let Some(set) = r.buf[input].route_set(vc) else {
            continue;
        };
        let candidates: Vec<_> = set.iter().copied().collect();

        let mut elig = false;
        let mut cred = false;
        let mut reserved = false;

        for cand in candidates {
            let Some(p) = cand.output_port else { continue };
            if p < 2 * r.n {
                match r.power.neighbor_states[p] {
                    PowerState::On => {}
                    PowerState::Draining | PowerState::Waking => continue,
                    PowerState::Off => {
                        let Some(neighbor) = r.neighbors[p] else { continue };
                        match gated_verdict(r, p, neighbor, dest_router, front_hops) {
                            GatedVerdict::Transit => {}
                            GatedVerdict::Wake(target) => {
                                wake_ports.push((p, target));
                                continue;
                            }
                            GatedVerdict::Defer => continue,
                        }
                    }
                }
            }

            let (vc_start, vc_end) = if r.cfg.noq && p < 2 * r.n {
                // NOQ narrows the downstream range to the slice feeding
                // the next hop's output, known from the lookahead route.
                lookahead_out.map_or((cand.vc_start, cand.vc_end), |next_out| {
                    super::noq_vc_range(next_out, num_vcs, r.outputs)
                })
            } else {
                (cand.vc_start, cand.vc_end)
            };

            for out_vc in vc_start..=vc_end {
                if !r.next_buf[p].is_available_for(out_vc) {
                    continue;
                }
                elig = true;
                if r.cfg.vc_busy_when_full && r.next_buf[p].is_full_for(out_vc) {
                    reserved |= !r.next_buf[p].is_full();
                } else {
                    cred = true;
                    let mut in_pri = cand.priority;
                    if r.cfg.vc_prioritize_empty && !r.next_buf[p].is_empty_for(out_vc) {
                        in_pri = in_pri.saturating_add(i64::MIN / 2);
                    }
                    r.vc_allocator.add_request(
                        vc_owner_key(input, num_vcs, vc),
                        p * num_vcs + out_vc,
                        vc as i64,
                        in_pri,
                        out_pri,
                    );
                }
            }
        }

        r.vc_alloc_vcs[i].outcome = if !elig {
            StageOutcome::Stall(StallKind::BufferBusy)
        } else if r.cfg.vc_busy_when_full && !cred {
            StageOutcome::Stall(if reserved {
                StallKind::BufferReserved
            } else {
                StallKind::BufferFull
            })
        } else {
            StageOutcome::Pending
        };
    }

    for (p, target) in wake_ports {
        let hid = r.power.next_hid();
        let id = r.id;
        let entry = r
            .out_queue_handshakes
            .entry(p)
            .or_insert_with(|| Handshake::wake_request(id, target, hid));
        entry.wake = entry.wake.or(Some(target));
    }

    r.vc_allocator.allocate();

    for i in 0..r.vc_alloc_vcs.len() {
        let PipeEntry { ready, input, vc, .. } = r.vc_alloc_vcs[i];
        if ready.is_some() {
            break;
        }
        if let Some(out_and_vc) = r.vc_allocator.output_assigned(vc_owner_key(input, num_vcs, vc))
        {
            r.vc_alloc_vcs[i].outcome = StageOutcome::Granted(out_and_vc);
        }
        r.vc_alloc_vcs[i].ready = Some(cycle + r.cfg.vc_alloc_delay);
    }
}

/// Applies VA outcomes whose delay has elapsed: grants reserve the
/// downstream VC and activate the packet; stalls retry, prune, or recover
/// back to route compute.
pub(crate) fn vc_alloc_update(r: &mut Router, cycle: Cycle) -> Result<(), InvariantError> {
    let num_vcs = r.cfg.num_vcs;
    while let Some(entry) = r.vc_alloc_vcs.front().copied() {
        let Some(ready) = entry.ready else { break };
        if ready > cycle {
            break;
        }
        let PipeEntry {
            input, vc, outcome, ..
        } = entry;
        let _ = r.vc_alloc_vcs.pop_front();

        match outcome {
            StageOutcome::Granted(out_and_vc) => {
                let out = out_and_vc / num_vcs;
                let out_vc = out_and_vc % num_vcs;
                r.next_buf[out].take_buffer(out_vc, vc_owner_key(input, num_vcs, vc), cycle)?;
                r.buf[input].set_output(vc, out, out_vc);
                r.buf[input].set_state(vc, VcState::Active, cycle)?;
                if let Some(front) = r.buf[input].front(vc) {
                    r.watch_event(front, cycle, "granted output VC");
                }
                if !r.cfg.speculative {
                    r.sw_alloc_vcs.push_back(PipeEntry::pending(input, vc));
                }
            }
            StageOutcome::Pending | StageOutcome::Stall(_) => {
                let rtime = r.buf[input].front(vc).map_or(cycle, |f| f.rtime);

                // Candidates whose neighbor began transitioning since
                // route compute are dead; drop them.
                let states = r.power.neighbor_states.clone();
                let dir_ports = 2 * r.n;
                if let Some(set) = r.buf[input].route_set_mut(vc) {
                    set.retain(|c| {
                        c.output_port.is_none_or(|p| {
                            p >= dir_ports || !states[p].is_transitioning()
                        })
                    });
                }
                let set_empty = r.buf[input]
                    .route_set(vc)
                    .is_none_or(crate::routing::OutputSet::is_empty);
                let timed_out = cycle.saturating_sub(rtime) >= r.cfg.vc_stall_threshold;

                if set_empty || timed_out {
                    if set_empty {
                        r.buf[input].clear_route_set(vc);
                    }
                    r.buf[input].set_state(vc, VcState::Routing, cycle)?;
                    r.route_vcs.push_back(PipeEntry::pending(input, vc));
                    if r.cfg.speculative {
                        remove_entry(&mut r.sw_alloc_vcs, input, vc);
                    }
                    r.stats.vc_recoveries += 1;
                    if let Some(front) = r.buf[input].front(vc) {
                        r.watch_event(front, cycle, "returned to route compute");
                    }
                } else {
                    r.vc_alloc_vcs.push_back(PipeEntry::pending(input, vc));
                }
            }
        }
    }
    Ok(())
}

/// Removes the first queued entry matching (input, vc).
pub(crate) fn remove_entry(queue: &mut VecDeque<PipeEntry>, input: usize, vc: usize) {
    if let Some(pos) = queue
        .iter()
        .position(|e| e.input == input && e.vc == vc)
    {
        let _ = queue.remove(pos);
    }
}
