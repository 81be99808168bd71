//! Switch allocation (SA) stage, speculative SA, and switch holding.
//!
//! Active VCs request crossbar bandwidth; with speculation enabled, VCs still
//! in VC allocation request in parallel through a second allocator and lose
//! any conflict against non-speculative grants. A held switch connection lets
//! the rest of a packet stream through without re-arbitrating, released on
//! tail or on any cycle the held VC cannot make progress.

use crate::buffer::VcState;
use crate::common::{Cycle, InvariantError};
use crate::router::{CrossbarFlit, PipeEntry, PowerState, Router, StageOutcome, StallKind};

use super::vc_alloc::remove_entry;

/// Issues switch requests for pending entries, runs both allocators, and
/// stamps outcomes and ready times.
pub(crate) fn sw_alloc_evaluate(r: &mut Router, cycle: Cycle) {
    let num_vcs = r.cfg.num_vcs;

    for i in 0..r.sw_alloc_vcs.len() {
        let PipeEntry { ready, input, vc, .. } = r.sw_alloc_vcs[i];
        if ready.is_some() {
            break;
        }
        if r.buf[input].is_empty(vc) {
            r.sw_alloc_vcs[i].outcome = StageOutcome::Stall(StallKind::BufferBusy);
            continue;
        }
        let exp_in = r.expand_input(input, vc);

        match r.buf[input].state(vc) {
            VcState::Active => {
                let Some(out) = r.buf[input].out_port(vc) else {
                    continue;
                };
                let Some(out_vc) = r.buf[input].out_vc(vc) else {
                    continue;
                };
                let exp_out = r.expand_output(out, input);
                let held = r.switch_hold_in[exp_in].is_some()
                    || r.switch_hold_out[exp_out].is_some();
                if held {
                    r.sw_alloc_vcs[i].outcome =
                        StageOutcome::Stall(StallKind::CrossbarConflict);
                } else if r.next_buf[out].is_full_for(out_vc) {
                    r.sw_alloc_vcs[i].outcome = StageOutcome::Stall(StallKind::BufferFull);
                } else {
                    let pri = r.buf[input].priority(vc);
                    r.sw_allocator
                        .add_request(exp_in, exp_out, vc as i64, pri, pri);
                    r.sw_alloc_vcs[i].outcome = StageOutcome::Pending;
                }
            }
            VcState::VcAlloc if r.cfg.speculative => {
                let Some(front) = r.buf[input].front(vc) else {
                    continue;
                };
                debug_assert!(front.head);
                let out_pri = r.buf[input].priority(vc);
                let Some(set) = r.buf[input].route_set(vc) else {
                    continue;
                };
                let candidates: Vec<_> = set.iter().copied().collect();
                for cand in candidates {
                    let Some(p) = cand.output_port else { continue };
                    if p < 2 * r.n && r.power.neighbor_states[p] != PowerState::On {
                        // Speculation never crosses a gated or
                        // transitioning neighbor.
                        continue;
                    }
                    let mut wants = false;
                    for out_vc in cand.vc_start..=cand.vc_end {
                        if r.cfg.spec_check_elig && !r.next_buf[p].is_available_for(out_vc) {
                            continue;
                        }
                        if r.cfg.spec_check_cred && r.next_buf[p].is_full_for(out_vc) {
                            continue;
                        }
                        wants = true;
                        break;
                    }
                    if wants {
                        let exp_out = r.expand_output(p, input);
                        if let Some(spec) = r.spec_sw_allocator.as_mut() {
                            spec.add_request(exp_in, exp_out, vc as i64, cand.priority, out_pri);
                        }
                    }
                }
                r.sw_alloc_vcs[i].outcome = StageOutcome::Pending;
            }
            _ => {
                // The VC recovered to route compute after this entry was
                // queued; it retires without a grant.
                r.sw_alloc_vcs[i].outcome = StageOutcome::Stall(StallKind::BufferBusy);
            }
        }
    }

    r.sw_allocator.allocate();
    if let Some(spec) = r.spec_sw_allocator.as_mut() {
        spec.allocate();
    }

    for i in 0..r.sw_alloc_vcs.len() {
        let PipeEntry { ready, input, vc, .. } = r.sw_alloc_vcs[i];
        if ready.is_some() {
            break;
        }
        let exp_in = r.expand_input(input, vc);

        match r.buf[input].state(vc) {
            VcState::Active => {
                if let Some(out) = r.buf[input].out_port(vc) {
                    let exp_out = r.expand_output(out, input);
                    let granted = r.sw_allocator.output_assigned(exp_in) == Some(exp_out)
                        && r.sw_allocator
                            .request(exp_in, exp_out)
                            .is_some_and(|req| req.label == vc as i64);
                    if granted {
                        r.sw_alloc_vcs[i].outcome = StageOutcome::Granted(exp_out);
                    } else if r.sw_alloc_vcs[i].outcome == StageOutcome::Pending {
                        r.sw_alloc_vcs[i].outcome =
                            StageOutcome::Stall(StallKind::BufferConflict);
                    }
                }
            }
            VcState::VcAlloc if r.cfg.speculative => {
                if let Some(spec) = r.spec_sw_allocator.as_ref() {
                    if let Some(exp_out) = spec.output_assigned(exp_in) {
                        let label_ok = spec
                            .request(exp_in, exp_out)
                            .is_some_and(|req| req.label == vc as i64);
                        let beaten = r.sw_allocator.input_assigned(exp_out).is_some()
                            || (r.cfg.spec_mask_by_reqs
                                && r.sw_allocator.has_requests_for(exp_out));
                        if label_ok {
                            r.sw_alloc_vcs[i].outcome = if beaten {
                                r.stats.crossbar_conflicts += 1;
                                StageOutcome::Stall(StallKind::CrossbarConflict)
                            } else {
                                StageOutcome::Granted(exp_out)
                            };
                        }
                    }
                }
            }
            _ => {}
        }
        r.sw_alloc_vcs[i].ready = Some(cycle + r.cfg.sw_alloc_delay);
    }
}

/// Applies SA outcomes: grants dispatch a flit across the crossbar, stalls
/// retry or trip the watchdog recovery back to route compute.
pub(crate) fn sw_alloc_update(r: &mut Router, cycle: Cycle) -> Result<(), InvariantError> {
    while let Some(entry) = r.sw_alloc_vcs.front().copied() {
        let Some(ready) = entry.ready else { break };
        if ready > cycle {
            break;
        }
        let PipeEntry {
            input, vc, outcome, ..
        } = entry;
        let _ = r.sw_alloc_vcs.pop_front();

        match outcome {
            StageOutcome::Granted(exp_out) => {
                if r.buf[input].state(vc) != VcState::Active {
                    // Speculative grant whose VC allocation did not land
                    // this cycle: the speculation is retried.
                    r.sw_alloc_vcs.push_back(PipeEntry::pending(input, vc));
                    continue;
                }
                let out = exp_out / r.cfg.output_speedup;
                let assigned = r.buf[input].out_port(vc);
                let out_vc = r.buf[input].out_vc(vc).unwrap_or(0);
                if assigned != Some(out)
                    || r.buf[input].is_empty(vc)
                    || r.next_buf[out].is_full_for(out_vc)
                {
                    r.sw_alloc_vcs.push_back(PipeEntry::pending(input, vc));
                    continue;
                }
                dispatch_flit(r, input, vc, out, exp_out, cycle)?;
            }
            StageOutcome::Pending | StageOutcome::Stall(_) => {
                let state = r.buf[input].state(vc);
                let relevant = state == VcState::Active
                    || (state == VcState::VcAlloc && r.cfg.speculative);
                if !relevant {
                    // The VC moved on without this entry; let it retire so
                    // route compute can re-arm the stage cleanly.
                    continue;
                }
                let Some(front) = r.buf[input].front(vc) else {
                    continue;
                };
                let head = front.head;
                let rtime = front.rtime;
                if head && cycle.saturating_sub(rtime) >= r.cfg.vc_stall_threshold {
                    watchdog_recover(r, input, vc, cycle)?;
                } else {
                    r.sw_alloc_vcs.push_back(PipeEntry::pending(input, vc));
                }
            }
        }
    }
    Ok(())
}

/// Stall watchdog: returns a head flit's VC to route compute, releasing
/// any downstream reservation it already holds.
fn watchdog_recover(
    r: &mut Router,
    input: usize,
    vc: usize,
    cycle: Cycle,
) -> Result<(), InvariantError> {
    match r.buf[input].state(vc) {
        VcState::Active => {
            if let (Some(out), Some(out_vc)) =
                (r.buf[input].out_port(vc), r.buf[input].out_vc(vc))
            {
                r.next_buf[out].return_buffer(out_vc);
            }
            r.buf[input].clear_output(vc);
            r.buf[input].set_state(vc, VcState::Routing, cycle)?;
            r.route_vcs.push_back(PipeEntry::pending(input, vc));
        }
        VcState::VcAlloc => {
            remove_entry(&mut r.vc_alloc_vcs, input, vc);
            r.buf[input].set_state(vc, VcState::Routing, cycle)?;
            r.route_vcs.push_back(PipeEntry::pending(input, vc));
        }
        _ => return Ok(()),
    }
    r.stats.vc_recoveries += 1;
    if let Some(front) = r.buf[input].front(vc) {
        r.watch_event(front, cycle, "switch watchdog returned VC to route compute");
    }
    Ok(())
}

/// Sends the front flit of (input, vc) across the crossbar toward `out`,
/// updating flow control, lookahead, credits, holds, and the VC state.
pub(crate) fn dispatch_flit(
    r: &mut Router,
    input: usize,
    vc: usize,
    out: usize,
    exp_out: usize,
    cycle: Cycle,
) -> Result<(), InvariantError> {
    let exp_in = r.expand_input(input, vc);
    let out_vc = r.buf[input].out_vc(vc).unwrap_or(vc);
    let Some(mut flit) = r.buf[input].remove(vc) else {
        return Err(InvariantError::BadFlit {
            router: r.id,
            port: input,
            vc,
            reason: "switch dispatch on an empty VC".into(),
            cycle,
        });
    };
    flit.vc = Some(out_vc);
    r.stats.crossbar_switches += 1;
    if out < 2 * r.n && r.cfg.lookahead_routing && flit.head {
        flit.lookahead = super::lookahead_route(r, &flit, out);
    }
    r.watch_event(&flit, cycle, "traversing crossbar");
    r.next_buf[out].sending_flit(&flit, cycle)?;
    r.queue_credit(input, vc);

    let tail = flit.tail;
    let ready = cycle + r.cfg.st_prepare_delay + r.cfg.st_final_delay;
    r.crossbar_flits.push_back(CrossbarFlit {
        ready,
        flit,
        expanded_output: exp_out,
    });

    if tail {
        r.buf[input].clear_output(vc);
        if r.cfg.hold_switch_for_packet && r.switch_hold_in[exp_in] == Some((exp_out, vc)) {
            r.switch_hold_in[exp_in] = None;
            r.switch_hold_out[exp_out] = None;
        }
        if r.buf[input].is_empty(vc) {
            r.buf[input].set_state(vc, VcState::Idle, cycle)?;
        } else {
            // The next packet's head is already queued behind the tail.
            let lookahead = if r.cfg.lookahead_routing {
                r.buf[input].front_mut(vc).and_then(|f| f.lookahead.take())
            } else {
                None
            };
            if let Some(set) = lookahead {
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
                r.buf[input].set_state(vc, VcState::Routing, cycle)?;
                r.route_vcs.push_back(PipeEntry::pending(input, vc));
            }
        }
    } else {
        if r.cfg.hold_switch_for_packet {
            r.switch_hold_in[exp_in] = Some((exp_out, vc));
            r.switch_hold_out[exp_out] = Some(exp_in);
        }
        if !r.buf[input].is_empty(vc) {
            if r.cfg.hold_switch_for_packet {
                r.sw_hold_vcs.push_back(PipeEntry::pending(input, vc));
            } else {
                r.sw_alloc_vcs.push_back(PipeEntry::pending(input, vc));
            }
        }
    }
    Ok(())
}

/// Evaluates held connections: the held VC proceeds if its downstream VC
/// has room, otherwise the hold is released this cycle.
pub(crate) fn sw_hold_evaluate(r: &mut Router, cycle: Cycle) {
    for i in 0..r.sw_hold_vcs.len() {
        let PipeEntry { ready, input, vc, .. } = r.sw_hold_vcs[i];
        if ready.is_some() {
            break;
        }
        let exp_in = r.expand_input(input, vc);
        let outcome = match (r.buf[input].state(vc), r.switch_hold_in[exp_in]) {
            (VcState::Active, Some((exp_out, held_vc))) if held_vc == vc => {
                let out = exp_out / r.cfg.output_speedup;
                let out_vc = r.buf[input].out_vc(vc).unwrap_or(vc);
                if r.buf[input].is_empty(vc) || r.next_buf[out].is_full_for(out_vc) {
                    StageOutcome::Stall(StallKind::BufferFull)
                } else {
                    StageOutcome::Granted(exp_out)
                }
            }
            _ => StageOutcome::Stall(StallKind::CrossbarConflict),
        };
        r.sw_hold_vcs[i].outcome = outcome;
        // A held switch needs no re-arbitration delay.
        r.sw_hold_vcs[i].ready = Some(cycle);
    }
}

/// Applies hold outcomes: progress keeps the hold, a blocked cycle
/// releases it and sends the VC back through switch allocation.
pub(crate) fn sw_hold_update(r: &mut Router, cycle: Cycle) -> Result<(), InvariantError> {
    while let Some(entry) = r.sw_hold_vcs.front().copied() {
        let Some(ready) = entry.ready else { break };
        if ready > cycle {
            break;
        }
        let PipeEntry {
            input, vc, outcome, ..
        } = entry;
        let _ = r.sw_hold_vcs.pop_front();

        match outcome {
            StageOutcome::Granted(exp_out) => {
                let out = exp_out / r.cfg.output_speedup;
                dispatch_flit(r, input, vc, out, exp_out, cycle)?;
            }
            StageOutcome::Pending | StageOutcome::Stall(_) => {
                let exp_in = r.expand_input(input, vc);
                if let Some((exp_out, held_vc)) = r.switch_hold_in[exp_in] {
                    if held_vc == vc {
                        r.switch_hold_in[exp_in] = None;
                        r.switch_hold_out[exp_out] = None;
                    }
                }
                if !r.buf[input].is_empty(vc) {
                    r.sw_alloc_vcs.push_back(PipeEntry::pending(input, vc));
                }
            }
        }
    }
    Ok(())
}
