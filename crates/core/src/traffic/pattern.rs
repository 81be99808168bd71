//! Synthetic traffic patterns.
//!
//! A pattern maps a source node to a destination, possibly randomized. The
//! manager calls [`TrafficPattern::dest`] with an increasing attempt counter
//! while the drawn destination's core is off: random patterns redraw, tornado
//! advances its per-source offset, and fixed permutations give up after the
//! first attempt.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::common::NodeId;
use crate::config::TrafficPatternKind;

/// Source-to-destination mapping of a synthetic workload.
pub trait TrafficPattern: std::fmt::Debug {
    /// Destination for `source` on the given retry `attempt`, or `None`
    /// when the pattern has no further candidates.
    fn dest(&mut self, source: NodeId, attempt: usize) -> Option<NodeId>;
}

/// Builds the configured pattern over `nodes` terminals of a k-ary n-mesh.
#[must_use]
pub fn build(
    kind: TrafficPatternKind,
    nodes: usize,
    k: usize,
    n: usize,
    seed: u64,
) -> Box<dyn TrafficPattern> {
    match kind {
        TrafficPatternKind::Uniform => Box::new(Uniform {
            nodes,
            rng: StdRng::seed_from_u64(seed),
        }),
        TrafficPatternKind::Tornado => Box::new(Tornado {
            k,
            n,
            extra: vec![0; nodes],
        }),
        TrafficPatternKind::Transpose => Box::new(Transpose { k, n }),
        TrafficPatternKind::Bitcomp => Box::new(Bitcomp { nodes }),
        TrafficPatternKind::Neighbor => Box::new(Neighbor { k }),
        TrafficPatternKind::Randperm => {
            let mut perm: Vec<NodeId> = (0..nodes).collect();
            let mut rng = StdRng::seed_from_u64(seed);
            for i in (1..nodes).rev() {
                perm.swap(i, rng.gen_range(0..=i));
            }
            Box::new(Randperm { perm })
        }
    }
}

/// Uniform random destinations, excluding the source itself.
#[derive(Debug)]
struct Uniform {
    nodes: usize,
    rng: StdRng,
}

impl TrafficPattern for Uniform {
    fn dest(&mut self, source: NodeId, attempt: usize) -> Option<NodeId> {
        // Bounded retries: a mostly-gated mesh must not spin forever.
        if attempt > 4 * self.nodes {
            return None;
        }
        loop {
            let d = self.rng.gen_range(0..self.nodes);
            if d != source {
                return Some(d);
            }
        }
    }
}

/// Tornado: a fixed offset of `k/2 - 1` along every dimension, advanced
/// per source while destinations are rejected.
#[derive(Debug)]
struct Tornado {
    k: usize,
    n: usize,
    extra: Vec<usize>,
}

impl TrafficPattern for Tornado {
    fn dest(&mut self, source: NodeId, attempt: usize) -> Option<NodeId> {
        if attempt >= self.k.pow(self.n as u32) {
            return None;
        }
        if attempt > 0 {
            self.extra[source] = (self.extra[source] + 1) % self.k;
        }
        let offset = (self.k / 2 - 1 + self.extra[source]) % self.k;
        let mut dest = 0;
        let mut stride = 1;
        let mut rest = source;
        for _ in 0..self.n {
            let coord = rest % self.k;
            dest += ((coord + offset) % self.k) * stride;
            rest /= self.k;
            stride *= self.k;
        }
        Some(dest)
    }
}

/// Digit-reversal (matrix transpose for n = 2).
#[derive(Debug)]
struct Transpose {
    k: usize,
    n: usize,
}

impl TrafficPattern for Transpose {
    fn dest(&mut self, source: NodeId, attempt: usize) -> Option<NodeId> {
        if attempt > 0 {
            return None;
        }
        let mut digits = Vec::with_capacity(self.n);
        let mut rest = source;
        for _ in 0..self.n {
            digits.push(rest % self.k);
            rest /= self.k;
        }
        let mut dest = 0;
        for &d in &digits {
            dest = dest * self.k + d;
        }
        Some(dest)
    }
}

/// Bit complement of the node index.
#[derive(Debug)]
struct Bitcomp {
    nodes: usize,
}

impl TrafficPattern for Bitcomp {
    fn dest(&mut self, source: NodeId, attempt: usize) -> Option<NodeId> {
        if attempt > 0 {
            return None;
        }
        Some(if self.nodes.is_power_of_two() {
            source ^ (self.nodes - 1)
        } else {
            self.nodes - 1 - source
        })
    }
}

/// Nearest neighbor: one hop in the lowest dimension, wrapping at the
/// mesh edge.
#[derive(Debug)]
struct Neighbor {
    k: usize,
}

impl TrafficPattern for Neighbor {
    fn dest(&mut self, source: NodeId, attempt: usize) -> Option<NodeId> {
        if attempt > 0 {
            return None;
        }
        let row = source / self.k;
        let col = (source + 1) % self.k;
        Some(row * self.k + col)
    }
}

/// A fixed random permutation drawn once per run.
#[derive(Debug)]
struct Randperm {
    perm: Vec<NodeId>,
}

impl TrafficPattern for Randperm {
    fn dest(&mut self, source: NodeId, attempt: usize) -> Option<NodeId> {
        (attempt == 0).then(|| self.perm[source])
    }
}
