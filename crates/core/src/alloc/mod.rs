//! Two-phase arbitration primitives for VC and switch allocation.
//!
//! This module implements the request/grant machinery shared by the allocation
//! stages. It provides:
//! 1. **[`Allocator`]:** The two-phase contract — callers add prioritized
//!    requests during an evaluation window, `allocate` computes a matching,
//!    grants are read back per input or per output.
//! 2. **[`RoundRobinArbiter`]:** The priority-plus-rotating-pointer primitive
//!    both allocator variants are built from.
//! 3. **Variants:** [`round_robin::RoundRobinAllocator`] and
//!    [`separable::SeparableInputFirst`], selectable per allocation stage.
//!
//! Requests colliding on one (input, output) pair supersede each other by
//! output priority, ties broken by label distance to the round-robin offset
//! modulo the VC count.

pub mod round_robin;
pub mod separable;

use std::collections::BTreeMap;
use std::fmt;

use crate::common::ConfigError;
use crate::config::AllocatorKind;

/// A single arbitration request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Request {
    /// Requesting input (expanded input index).
    pub input: usize,
    /// Requested output (expanded output index).
    pub output: usize,
    /// Caller-chosen tag, typically the requesting VC.
    pub label: i64,
    /// Input-side priority (from the route set).
    pub in_pri: i64,
    /// Output-side priority (from the competing packet).
    pub out_pri: i64,
}

/// Two-phase allocator contract.
///
/// All implementations are deterministic: identical request sequences from
/// identical arbiter states produce identical matchings.
pub trait Allocator: fmt::Debug {
    /// Drops all requests and grants, keeping arbiter pointers.
    fn clear(&mut self);

    /// Adds a request during the evaluation window.
    ///
    /// A request on an (input, output) pair already holding one supersedes
    /// it if its output priority is strictly higher, or equal with a label
    /// strictly closer to the round-robin offset modulo the VC count.
    fn add_request(&mut self, input: usize, output: usize, label: i64, in_pri: i64, out_pri: i64);

    /// Computes a maximal matching respecting both priorities.
    fn allocate(&mut self);

    /// Output granted to `input`, if any.
    fn output_assigned(&self, input: usize) -> Option<usize>;

    /// Input granted `output`, if any.
    fn input_assigned(&self, output: usize) -> Option<usize>;

    /// Whether any request names `output` this window.
    fn has_requests_for(&self, output: usize) -> bool;

    /// The live request on (input, output), if present.
    fn request(&self, input: usize, output: usize) -> Option<Request>;
}

/// Creates an allocator of the configured kind.
///
/// `num_vcs` parameterizes the label-distance tie-break of the
/// supersession rule.
///
/// # Errors
///
/// Present for registry symmetry; every [`AllocatorKind`] is constructible.
pub fn create(
    kind: AllocatorKind,
    inputs: usize,
    outputs: usize,
    num_vcs: usize,
) -> Result<Box<dyn Allocator>, ConfigError> {
    Ok(match kind {
        AllocatorKind::RoundRobin => {
            Box::new(round_robin::RoundRobinAllocator::new(inputs, outputs, num_vcs))
        }
        AllocatorKind::SeparableInputFirst => {
            Box::new(separable::SeparableInputFirst::new(inputs, outputs, num_vcs))
        }
    })
}

/// Priority arbiter with a rotating tie-break pointer.
///
/// The highest-priority candidate wins; equal priorities go to the first
/// candidate at or after the pointer. The pointer advances one past the
/// winner, giving each position a fair share under sustained contention.
#[derive(Debug, Clone)]
pub struct RoundRobinArbiter {
    size: usize,
    pointer: usize,
}

impl RoundRobinArbiter {
    /// Creates an arbiter over `size` positions.
    #[must_use]
    pub const fn new(size: usize) -> Self {
        Self { size, pointer: 0 }
    }

    /// Current tie-break pointer.
    #[must_use]
    pub const fn pointer(&self) -> usize {
        self.pointer
    }

    /// Picks a winner among `(position, priority)` candidates, advancing
    /// the pointer past it.
    pub fn arbitrate(&mut self, candidates: &[(usize, i64)]) -> Option<usize> {
        let winner = self.pick(candidates)?;
        self.pointer = (winner + 1) % self.size;
        Some(winner)
    }

    /// Advances the pointer by one position.
    pub const fn advance(&mut self) {
        self.pointer = (self.pointer + 1) % self.size;
    }

    /// Picks a winner without advancing the pointer.
    #[must_use]
    pub fn pick(&self, candidates: &[(usize, i64)]) -> Option<usize> {
        let best_pri = candidates.iter().map(|&(_, pri)| pri).max()?;
        candidates
            .iter()
            .filter(|&&(_, pri)| pri == best_pri)
            .map(|&(pos, _)| pos)
            .min_by_key(|&pos| (pos + self.size - self.pointer) % self.size)
    }
}

/// Request store shared by the allocator variants.
///
/// Keyed by (input, output) with the supersession rule applied on insert;
/// `BTreeMap` keeps iteration deterministic.
#[derive(Debug, Default)]
pub(crate) struct RequestStore {
    num_vcs: usize,
    rr_offset: usize,
    map: BTreeMap<(usize, usize), Request>,
}

impl RequestStore {
    pub(crate) fn new(num_vcs: usize) -> Self {
        Self {
            num_vcs,
            rr_offset: 0,
            map: BTreeMap::new(),
        }
    }

    pub(crate) fn clear(&mut self) {
        self.map.clear();
    }

    /// Distance of `label` from the round-robin offset modulo the VC count.
    fn label_distance(&self, label: i64) -> usize {
        let vcs = self.num_vcs.max(1);
        let l = (label.rem_euclid(vcs as i64)) as usize;
        (l + vcs - self.rr_offset % vcs) % vcs
    }

    pub(crate) fn insert(&mut self, req: Request) {
        let key = (req.input, req.output);
        match self.map.get(&key) {
            Some(prev)
                if req.out_pri < prev.out_pri
                    || (req.out_pri == prev.out_pri
                        && self.label_distance(req.label) >= self.label_distance(prev.label)) => {}
            _ => {
                let _ = self.map.insert(key, req);
            }
        }
    }

    pub(crate) fn advance_offset(&mut self) {
        let vcs = self.num_vcs.max(1);
        self.rr_offset = (self.rr_offset + 1) % vcs;
    }

    pub(crate) fn get(&self, input: usize, output: usize) -> Option<Request> {
        self.map.get(&(input, output)).copied()
    }

    pub(crate) fn requests_of(&self, input: usize) -> impl Iterator<Item = &Request> {
        self.map
            .range((input, 0)..(input + 1, 0))
            .map(|(_, req)| req)
    }

    pub(crate) fn names_output(&self, output: usize) -> bool {
        self.map.values().any(|req| req.output == output)
    }
}
