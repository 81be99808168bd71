//! Downstream buffer mirror driving credit-based flow control.

use crate::common::{Cycle, InvariantError, RouterId};
use crate::message::{Credit, Flit};

/// Per-output-port mirror of the downstream router's VC occupancy.
///
/// The sending side reserves a slot for every flit it puts on the wire
/// (`sending_flit`) and frees slots as credits return (`process_credit`);
/// VC ownership is tracked so a grant can only be given to one upstream
/// packet at a time. Invariants:
///
/// - occupancy never exceeds the configured VC depth and never goes
///   negative;
/// - an owned VC is never simultaneously advertised as available;
/// - a VC becomes available again only after its tail has been accounted
///   for (immediately on send, or on the tail's credit when
///   `wait_for_tail_credit` is set).
#[derive(Debug)]
pub struct BufferState {
    router: RouterId,
    output: usize,
    wait_for_tail_credit: bool,
    size: Vec<usize>,
    occupancy: Vec<usize>,
    owner: Vec<Option<usize>>,
    tail_sent: Vec<bool>,
}

impl BufferState {
    /// Creates a mirror of `num_vcs` VCs with `vc_buf_size` slots each.
    #[must_use]
    pub fn new(
        router: RouterId,
        output: usize,
        num_vcs: usize,
        vc_buf_size: usize,
        wait_for_tail_credit: bool,
    ) -> Self {
        Self {
            router,
            output,
            wait_for_tail_credit,
            size: vec![vc_buf_size; num_vcs],
            occupancy: vec![0; num_vcs],
            owner: vec![None; num_vcs],
            tail_sent: vec![false; num_vcs],
        }
    }

    /// Number of mirrored VCs.
    #[must_use]
    pub fn num_vcs(&self) -> usize {
        self.size.len()
    }

    /// Re-sizes every mirrored VC (one-slot bypass latch repurposing).
    pub fn set_vc_buf_size(&mut self, n: usize) {
        for s in &mut self.size {
            *s = n;
        }
    }

    /// Whether `vc` is unowned and may be granted.
    #[must_use]
    pub fn is_available_for(&self, vc: usize) -> bool {
        self.owner[vc].is_none()
    }

    /// The reservation key currently owning `vc`, if any.
    #[must_use]
    pub fn used_by(&self, vc: usize) -> Option<usize> {
        self.owner[vc]
    }

    /// Whether `vc` has no free slot.
    #[must_use]
    pub fn is_full_for(&self, vc: usize) -> bool {
        self.occupancy[vc] >= self.size[vc]
    }

    /// Whether `vc` has no outstanding flits.
    #[must_use]
    pub fn is_empty_for(&self, vc: usize) -> bool {
        self.occupancy[vc] == 0
    }

    /// Whether every VC is full.
    #[must_use]
    pub fn is_full(&self) -> bool {
        (0..self.size.len()).all(|vc| self.is_full_for(vc))
    }

    /// Free slots on `vc`.
    #[must_use]
    pub fn free_slots_for(&self, vc: usize) -> usize {
        self.size[vc].saturating_sub(self.occupancy[vc])
    }

    /// Reserves `vc` for the packet keyed by `by`.
    ///
    /// # Errors
    ///
    /// Granting an owned VC is a double booking.
    pub fn take_buffer(&mut self, vc: usize, by: usize, cycle: Cycle) -> Result<(), InvariantError> {
        if let Some(prev) = self.owner[vc] {
            if prev != by {
                return Err(InvariantError::VcDoubleBooked {
                    router: self.router,
                    port: self.output,
                    vc,
                    by,
                    owner: prev,
                    cycle,
                });
            }
        }
        self.owner[vc] = Some(by);
        self.tail_sent[vc] = false;
        Ok(())
    }

    /// Cancels a reservation without sending a flit.
    pub fn return_buffer(&mut self, vc: usize) {
        self.owner[vc] = None;
        self.tail_sent[vc] = false;
    }

    /// Accounts one flit put on the wire toward `flit.vc`.
    ///
    /// # Errors
    ///
    /// Reserving past the configured VC depth is a flow-control violation.
    pub fn sending_flit(&mut self, flit: &Flit, cycle: Cycle) -> Result<(), InvariantError> {
        let vc = flit.vc.unwrap_or(0);
        if self.occupancy[vc] >= self.size[vc] {
            return Err(InvariantError::BufferOverflow {
                router: self.router,
                port: self.output,
                vc,
                cycle,
            });
        }
        self.occupancy[vc] += 1;
        if flit.tail {
            if self.wait_for_tail_credit {
                self.tail_sent[vc] = true;
            } else {
                self.owner[vc] = None;
            }
        }
        Ok(())
    }

    /// Frees the slots named by a returning credit.
    ///
    /// # Errors
    ///
    /// A credit for a VC with zero occupancy frees a slot that was never
    /// reserved.
    pub fn process_credit(&mut self, credit: &Credit, cycle: Cycle) -> Result<(), InvariantError> {
        for &vc in &credit.vcs {
            if self.occupancy[vc] == 0 {
                return Err(InvariantError::CreditUnderflow {
                    router: self.router,
                    port: self.output,
                    vc,
                    cycle,
                });
            }
            self.occupancy[vc] -= 1;
            if self.wait_for_tail_credit && self.tail_sent[vc] && self.occupancy[vc] == 0 {
                self.owner[vc] = None;
                self.tail_sent[vc] = false;
            }
        }
        Ok(())
    }

    /// Zeroes the credit view: every VC reads full and unowned.
    ///
    /// Used when the downstream router powers off; the mirror is rebuilt
    /// from relayed credits as the bypass path re-advertises space.
    pub fn clear_credits(&mut self) {
        for vc in 0..self.size.len() {
            self.occupancy[vc] = self.size[vc];
            self.owner[vc] = None;
            self.tail_sent[vc] = false;
        }
    }

    /// Restores the full credit view: every VC reads empty and unowned.
    ///
    /// Used when the downstream router finishes waking.
    pub fn full_credits(&mut self) {
        for vc in 0..self.size.len() {
            self.occupancy[vc] = 0;
            self.owner[vc] = None;
            self.tail_sent[vc] = false;
        }
    }
}
