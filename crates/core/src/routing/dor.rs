//! Dimension-order routing for k-ary n-mesh fabrics.
//!
//! Two registered functions live here:
//! 1. **`dor_mesh`:** Strict dimension-order (x first) routing with the full VC
//!    range and VC 0 as the deterministic escape class.
//! 2. **`nord_mesh`:** Dimension-order routing that detours onto the node-router
//!    decoupling ring when the next hop is gated, using the escape VC only.
//!
//! Both share the coordinate helpers, which the allocation stages also use to
//! decide whether a flit would have to turn or eject at a gated neighbor.

use super::{OutputSet, RouteCtx, RoutingFunction};
use crate::common::{RouterId, port};
use crate::message::Flit;
use crate::router::PowerState;

/// Coordinate of `id` along `dim` in a k-ary n-mesh.
#[inline]
#[must_use]
pub fn coord(id: RouterId, k: usize, dim: usize) -> usize {
    (id / k.pow(dim as u32)) % k
}

/// Next dimension-order hop from `cur` toward `dest`, or `None` on arrival.
///
/// Dimension 0 (x) is always resolved first; within a dimension the port is
/// the positive direction for a larger destination coordinate.
#[must_use]
pub fn next_port(cur: RouterId, dest: RouterId, k: usize, n: usize) -> Option<usize> {
    for dim in 0..n {
        let c = coord(cur, k, dim);
        let d = coord(dest, k, dim);
        if c < d {
            return Some(2 * dim);
        }
        if c > d {
            return Some(2 * dim + 1);
        }
    }
    None
}

/// Whether a flit forwarded to `neighbor` through `via_port` would have to
/// turn or eject there rather than continue straight through.
///
/// A gated router only forwards in the arrival dimension, so a flit whose
/// route changes dimension (or terminates) at a gated neighbor must wait for
/// that neighbor to wake instead.
#[must_use]
pub fn terminal_at(neighbor: RouterId, dest: RouterId, k: usize, n: usize, via_port: usize) -> bool {
    match next_port(neighbor, dest, k, n) {
        None => true,
        Some(next) => port::dimension(next) != port::dimension(via_port),
    }
}

/// The router where a flit leaving `cur` through `via_port` must stop
/// flying straight: the point its dimension-order route turns or ejects.
///
/// `None` when the route makes no progress along that port's dimension.
#[must_use]
pub fn terminal_router(
    cur: RouterId,
    dest: RouterId,
    k: usize,
    n: usize,
    via_port: usize,
) -> Option<RouterId> {
    let dim = port::dimension(via_port);
    if dim >= n {
        return None;
    }
    let stride = k.pow(dim as u32);
    let c = coord(cur, k, dim);
    let d = coord(dest, k, dim);
    if c == d {
        return None;
    }
    Some(if d > c {
        cur + (d - c) * stride
    } else {
        cur - (c - d) * stride
    })
}

/// Hop distance between two routers along one dimension.
#[must_use]
pub fn axis_distance(a: RouterId, b: RouterId, k: usize, dim: usize) -> usize {
    coord(a, k, dim).abs_diff(coord(b, k, dim))
}

/// Ring-in and ring-out directional ports of a router on the node-router
/// decoupling ring, derived from its mesh position.
///
/// The ring is a boustrophedon Hamiltonian cycle: the top row runs east,
/// the columns snake between rows 1 and k-1, and the far column returns.
#[must_use]
pub fn nord_ring_ports(id: RouterId, k: usize) -> (usize, usize) {
    let row = id / k;
    let col = id % k;

    if id == 0 {
        (port::SOUTH, port::EAST)
    } else if id == k - 1 {
        (port::WEST, port::SOUTH)
    } else if row == 1 && col % 2 == 1 && col < k - 1 {
        (port::EAST, port::SOUTH)
    } else if row == 1 && col % 2 == 0 && col > 0 {
        (port::SOUTH, port::WEST)
    } else if row == k - 1 && col % 2 == 0 {
        (port::EAST, port::NORTH)
    } else if row == k - 1 && col % 2 == 1 {
        (port::NORTH, port::WEST)
    } else if row == 0 {
        (port::WEST, port::EAST)
    } else if col % 2 == 0 {
        (port::SOUTH, port::NORTH)
    } else {
        (port::NORTH, port::SOUTH)
    }
}

/// Injection-time output set: one candidate on the local injection port
/// spanning the full VC range.
fn injection_set(num_vcs: usize) -> OutputSet {
    let mut out = OutputSet::new();
    out.add(None, 0, num_vcs - 1, 0);
    out
}

/// Strict dimension-order routing (x first), full VC range, VC 0 escape.
///
/// Registered as `"dor"`. See [`RoutingFunction`] for the contract.
pub fn dor_mesh(
    ctx: Option<&RouteCtx<'_>>,
    flit: &Flit,
    in_port: Option<usize>,
    inject: bool,
) -> OutputSet {
    if inject || in_port.is_none() {
        return injection_set(ctx.map_or(1, |c| c.num_vcs));
    }
    let Some(ctx) = ctx else {
        return OutputSet::new();
    };

    let mut out = OutputSet::new();
    match next_port(ctx.id, flit.dest_router, ctx.k, ctx.n) {
        None => out.add(Some(ctx.ejection_port()), 0, ctx.num_vcs - 1, 0),
        Some(p) => out.add(Some(p), 0, ctx.num_vcs - 1, 0),
    }
    out
}

/// Dimension-order routing with a ring detour around gated routers.
///
/// Registered as `"nord"`. When the dimension-order hop leads to a neighbor
/// that is not on, the flit is steered onto this router's ring-out port on
/// the escape VC; route compute at the next awake router resumes dimension
/// order.
pub fn nord_mesh(
    ctx: Option<&RouteCtx<'_>>,
    flit: &Flit,
    in_port: Option<usize>,
    inject: bool,
) -> OutputSet {
    if inject || in_port.is_none() {
        return injection_set(ctx.map_or(1, |c| c.num_vcs));
    }
    let Some(ctx) = ctx else {
        return OutputSet::new();
    };

    let mut out = OutputSet::new();
    match next_port(ctx.id, flit.dest_router, ctx.k, ctx.n) {
        None => out.add(Some(ctx.ejection_port()), 0, ctx.num_vcs - 1, 0),
        Some(p) => {
            if ctx.neighbor_states[p] == PowerState::On {
                // Regular hops keep VC 0 free for ring traffic.
                out.add(Some(p), 1, ctx.num_vcs - 1, 0);
            } else {
                let (_, ring_out) = nord_ring_ports(ctx.id, ctx.k);
                out.add(Some(ring_out), 0, 0, 0);
            }
        }
    }
    out
}

// Keep the registry's function items checked against the contract type.
const _: RoutingFunction = dor_mesh;
const _: RoutingFunction = nord_mesh;
