//! Delay-line channels connecting routers.
//!
//! This module implements the physical links of the fabric. It provides:
//! 1. **`Channel<T>`:** A FIFO delay line of configurable integer latency,
//!    shared by flits, credits, and handshakes.
//! 2. **Phase split:** `send` stages an item, `write_outputs` commits it,
//!    `read_inputs` surfaces it after the delay — matching the global
//!    evaluate/write barrier of the simulation.
//! 3. **Endpoints:** Channels know their source and sink routers by index so
//!    the fabric can raise an implicit wake when a flit arrives at a gated sink.

use std::collections::VecDeque;

use crate::common::{Cycle, InvariantError, RouterId};
use crate::message::{Credit, Flit, Handshake};

/// A FIFO delay line modeling a physical link.
///
/// At most one item enters and at most one item leaves per cycle. An item
/// sent at cycle `t` on a channel of delay `d` becomes readable at `t + d`
/// and not before.
#[derive(Debug)]
pub struct Channel<T> {
    index: usize,
    delay: u64,
    source: Option<(RouterId, usize)>,
    sink: Option<(RouterId, usize)>,
    input: Option<T>,
    queue: VecDeque<(Cycle, T)>,
    output: Option<T>,
}

impl<T> Channel<T> {
    /// Creates a channel with the given arena index and latency.
    ///
    /// A latency of zero is promoted to one: the evaluate/write barrier
    /// makes same-cycle delivery unobservable.
    #[must_use]
    pub fn new(index: usize, delay: u64) -> Self {
        Self {
            index,
            delay: delay.max(1),
            source: None,
            sink: None,
            input: None,
            queue: VecDeque::new(),
            output: None,
        }
    }

    /// Arena index of this channel.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Link latency in cycles.
    #[must_use]
    pub const fn delay(&self) -> u64 {
        self.delay
    }

    /// Records the router and port feeding this channel.
    pub fn set_source(&mut self, router: RouterId, port: usize) {
        self.source = Some((router, port));
    }

    /// Records the router and port this channel drains into.
    pub fn set_sink(&mut self, router: RouterId, port: usize) {
        self.sink = Some((router, port));
    }

    /// Router and port feeding this channel, if attached.
    #[must_use]
    pub const fn source(&self) -> Option<(RouterId, usize)> {
        self.source
    }

    /// Router and port this channel drains into, if attached.
    #[must_use]
    pub const fn sink(&self) -> Option<(RouterId, usize)> {
        self.sink
    }

    /// Deposits one item at the current tick.
    ///
    /// # Errors
    ///
    /// Sending a second item in the same tick violates the link's
    /// single-item precondition.
    pub fn send(&mut self, item: T, cycle: Cycle) -> Result<(), InvariantError> {
        if self.input.is_some() {
            return Err(InvariantError::ChannelOverrun {
                channel: self.index,
                cycle,
            });
        }
        self.input = Some(item);
        Ok(())
    }

    /// Commits the staged item into the delay queue.
    ///
    /// Called once per cycle after every component has evaluated.
    pub fn write_outputs(&mut self, cycle: Cycle) {
        if let Some(item) = self.input.take() {
            self.queue.push_back((cycle + self.delay, item));
        }
    }

    /// Surfaces the item whose delay has elapsed, if any.
    ///
    /// Called once per cycle before any component evaluates. At most one
    /// item becomes readable per tick.
    pub fn read_inputs(&mut self, cycle: Cycle) {
        debug_assert!(self.output.is_none(), "unread channel output overwritten");
        if let Some(&(ready, _)) = self.queue.front() {
            if ready <= cycle {
                self.output = self.queue.pop_front().map(|(_, item)| item);
            }
        }
    }

    /// The item readable this cycle, without consuming it.
    #[must_use]
    pub const fn peek(&self) -> Option<&T> {
        self.output.as_ref()
    }

    /// Consumes the item readable this cycle.
    pub fn receive(&mut self) -> Option<T> {
        self.output.take()
    }

    /// Whether nothing is staged, queued, or readable.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.input.is_none() && self.queue.is_empty() && self.output.is_none()
    }
}

/// Channel carrying flits.
pub type FlitChannel = Channel<Flit>;

/// Channel carrying credits.
pub type CreditChannel = Channel<Credit>;

/// Channel carrying power-state handshakes.
pub type HandshakeChannel = Channel<Handshake>;
