//! Separable input-first allocator.

use super::{Allocator, Request, RequestStore, RoundRobinArbiter};

/// Two-stage separable allocator, input arbitration first.
///
/// Stage one: every input picks one of its requests with a per-input
/// round-robin arbiter. Stage two: every output picks among the surviving
/// requests with a per-output arbiter. One iteration, no backtracking —
/// the hardware-faithful shape of a separable switch allocator.
#[derive(Debug)]
pub struct SeparableInputFirst {
    inputs: usize,
    outputs: usize,
    requests: RequestStore,
    input_arbs: Vec<RoundRobinArbiter>,
    output_arbs: Vec<RoundRobinArbiter>,
    grant_out: Vec<Option<usize>>,
    grant_in: Vec<Option<usize>>,
}

impl SeparableInputFirst {
    /// Creates an allocator over `inputs` × `outputs` ports.
    #[must_use]
    pub fn new(inputs: usize, outputs: usize, num_vcs: usize) -> Self {
        Self {
            inputs,
            outputs,
            requests: RequestStore::new(num_vcs),
            input_arbs: (0..inputs).map(|_| RoundRobinArbiter::new(outputs)).collect(),
            output_arbs: (0..outputs).map(|_| RoundRobinArbiter::new(inputs)).collect(),
            grant_out: vec![None; inputs],
            grant_in: vec![None; outputs],
        }
    }
}

impl Allocator for SeparableInputFirst {
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
        // Stage one: each input selects a single surviving request.
        let mut survivors: Vec<Option<Request>> = vec![None; self.inputs];
        for input in 0..self.inputs {
            let candidates: Vec<(usize, i64)> = self
                .requests
                .requests_of(input)
                .map(|req| (req.output, req.in_pri))
                .collect();
            if let Some(output) = self.input_arbs[input].arbitrate(&candidates) {
                survivors[input] = self.requests.get(input, output);
            }
        }

        // Stage two: each output selects among the surviving inputs.
        for output in 0..self.outputs {
            let candidates: Vec<(usize, i64)> = survivors
                .iter()
                .flatten()
                .filter(|req| req.output == output)
                .map(|req| (req.input, req.out_pri))
                .collect();
            if let Some(input) = self.output_arbs[output].arbitrate(&candidates) {
                self.grant_out[input] = Some(output);
                self.grant_in[output] = Some(input);
            }
        }
        self.requests.advance_offset();
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
