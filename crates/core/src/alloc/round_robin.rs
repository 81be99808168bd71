//! Single-pass round-robin allocator.

use super::{Allocator, Request, RequestStore, RoundRobinArbiter};

/// Round-robin maximal matching in one input-major pass.
///
/// Inputs are visited starting from a rotating pointer; each input claims
/// its best-priority request whose output is still free. Simple, fast, and
/// fair under symmetric load; it does not backtrack, so a later input never
/// steals an output an earlier input claimed.
#[derive(Debug)]
pub struct RoundRobinAllocator {
    inputs: usize,
    outputs: usize,
    requests: RequestStore,
    input_arb: RoundRobinArbiter,
    grant_out: Vec<Option<usize>>,
    grant_in: Vec<Option<usize>>,
}

impl RoundRobinAllocator {
    /// Creates an allocator over `inputs` × `outputs` ports.
    #[must_use]
    pub fn new(inputs: usize, outputs: usize, num_vcs: usize) -> Self {
        Self {
            inputs,
            outputs,
            requests: RequestStore::new(num_vcs),
            input_arb: RoundRobinArbiter::new(inputs),
            grant_out: vec![None; inputs],
            grant_in: vec![None; outputs],
        }
    }
}

impl Allocator for RoundRobinAllocator {
    fn clear(&mut self) {
        self.requests.clear();
        self.grant_out.fill(None);
        self.grant_in.fill(None);
    }

    fn add_request(&mut self, input: usize, output: usize, label: i64, in_pri: i64, out_pri: i64) {
        debug_assert!(input < self.inputs && output < self.outputs);
        self.requests.insert(Request {
            input,
            output,
            label,
            in_pri,
            out_pri,
        });
    }

    fn allocate(&mut self) {
        let start = self.input_arb.pointer();
        let mut granted_any = false;
        for i in 0..self.inputs {
            let input = (start + i) % self.inputs;
            let mut best: Option<Request> = None;
            for req in self.requests.requests_of(input) {
                if self.grant_in[req.output].is_some() {
                    continue;
                }
                let better = best.is_none_or(|b| {
                    (req.out_pri, req.in_pri) > (b.out_pri, b.in_pri)
                });
                if better {
                    best = Some(*req);
                }
            }
            if let Some(req) = best {
                self.grant_out[input] = Some(req.output);
                self.grant_in[req.output] = Some(input);
                granted_any = true;
            }
        }
        if granted_any {
            self.input_arb.advance();
            self.requests.advance_offset();
        }
    }

    fn output_assigned(&self, input: usize) -> Option<usize> {
        self.grant_out[input]
    }

    fn input_assigned(&self, output: usize) -> Option<usize> {
        self.grant_in[output]
    }

    fn has_requests_for(&self, output: usize) -> bool {
        self.requests.names_output(output)
    }

    fn request(&self, input: usize, output: usize) -> Option<Request> {
        self.requests.get(input, output)
    }
}
