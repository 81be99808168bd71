//! Bypass engine for gated routers.
//!
//! While a router is off or waking its pipeline is quiescent, but two duties
//! remain each cycle:
//! 1. **Flit bypass:** Arriving flits are forwarded on the straight-through
//!    port of their dimension (or along the decoupling ring) without entering
//!    a VC; bypassed heads reserve downstream space under the bypass sentinel
//!    so flow control stays exact across the gap.
//! 2. **Credit mirroring:** Credits from downstream are consumed into the
//!    local shadow and relayed upstream, topped up by the free-slot snapshot
//!    metered out since the router went dark.

use crate::common::{Cycle, InvariantError, flov_sentinel, port};
use crate::config::PowergateType;
use crate::message::Credit;
use crate::router::{PowerState, Router};

/// Runs the per-cycle bypass duties of an off or waking router.
///
/// # Errors
///
/// A flit arriving on a port the active discipline does not bypass, or any
/// pipeline work found on a dark router, is an invariant violation.
pub(crate) fn flov_step(r: &mut Router, cycle: Cycle) -> Result<(), InvariantError> {
    debug_assert!(matches!(
        r.power.state,
        PowerState::Off | PowerState::Waking
    ));
    if !(r.route_vcs.is_empty()
        && r.vc_alloc_vcs.is_empty()
        && r.sw_hold_vcs.is_empty()
        && r.sw_alloc_vcs.is_empty()
        && r.crossbar_flits.is_empty())
    {
        return Err(InvariantError::PowerState {
            router: r.id,
            reason: "gated router still holds pipeline work".into(),
            cycle,
        });
    }

    // Straight-through flit bypass.
    let staged: Vec<_> = std::mem::take(&mut r.in_queue_flits).into_iter().collect();
    for (input, mut flit) in staged {
        let vc = flit.vc.unwrap_or(0);
        let output = bypass_port(r, input)
            .filter(|&out| r.neighbor_exists(out))
            .ok_or_else(|| InvariantError::BadFlit {
                router: r.id,
                port: input,
                vc,
                reason: format!(
                    "flit {} arrived on a port the {:?} bypass does not serve",
                    flit.id, r.powergate
                ),
                cycle,
            })?;

        if flit.head {
            r.next_buf[output].take_buffer(vc, flov_sentinel(r.inputs, r.cfg.num_vcs), cycle)?;
        }
        r.next_buf[output].sending_flit(&flit, cycle)?;
        flit.hops += 1;
        flit.flov_hops += 1;
        r.stats.bypassed_flits += 1;
        r.watch_event(&flit, cycle, "bypassing flit straight through");
        r.output_buffer[output].push_back(flit);
    }

    // Credit mirroring: consume locally, then relay upstream.
    while let Some(&(ready, _, _)) = r.proc_credits.front() {
        if ready > cycle {
            break;
        }
        let Some((_, credit, output)) = r.proc_credits.pop_front() else {
            break;
        };
        r.next_buf[output].process_credit(&credit, cycle)?;

        if output == r.ejection_port() {
            continue;
        }
        let Some(upstream) = relay_port(r, output) else {
            continue;
        };
        if !r.neighbor_exists(upstream) {
            continue;
        }
        if r.power.state == PowerState::Waking
            && r.power.downstream_states[upstream] == PowerState::Off
        {
            continue;
        }
        let entry = r.out_queue_credits.entry(upstream).or_insert_with(Credit::new);
        for vcx in credit.vcs {
            let _ = entry.push_vc(vcx);
        }
    }

    // Meter out the free-slot snapshot taken when the router went dark.
    for in_port in 0..2 * r.n {
        if !r.neighbor_exists(in_port) {
            continue;
        }
        let out = port::opposite(in_port);
        if r.powergate == PowergateType::Nord {
            // The ring is the only live path; nothing else is advertised.
            let (ring_in, ring_out) = r.ring_ports.unwrap_or((0, 0));
            if in_port != ring_in || out != ring_out {
                continue;
            }
        }
        for vc in 0..r.cfg.num_vcs {
            if r.power.credit_counter[out].get(vc).copied().unwrap_or(0) == 0 {
                continue;
            }
            let entry = r.out_queue_credits.entry(in_port).or_insert_with(Credit::new);
            if entry.push_vc(vc) {
                r.power.credit_counter[out][vc] -= 1;
            }
        }
    }
    Ok(())
}

/// The output a flit arriving on `input` leaves through while gated, or
/// `None` when the discipline does not bypass that port.
fn bypass_port(r: &Router, input: usize) -> Option<usize> {
    if input >= 2 * r.n {
        return None;
    }
    match r.powergate {
        PowergateType::Flov | PowergateType::Gflov => Some(port::opposite(input)),
        PowergateType::Rflov => (port::dimension(input) == 0).then(|| port::opposite(input)),
        PowergateType::Nord => {
            let (ring_in, ring_out) = r.ring_ports?;
            (input == ring_in).then_some(ring_out)
        }
        PowergateType::None | PowergateType::Rp => None,
    }
}

/// The input port a credit received on `output` is relayed to, keeping the
/// true upstream's view of credit flow unchanged.
fn relay_port(r: &Router, output: usize) -> Option<usize> {
    if output >= 2 * r.n {
        return None;
    }
    match r.powergate {
        PowergateType::Nord => {
            let (ring_in, ring_out) = r.ring_ports?;
            (output == ring_out).then_some(ring_in)
        }
        _ => Some(port::opposite(output)),
    }
}
