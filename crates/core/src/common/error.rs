//! Error taxonomy for the simulator.
//!
//! This module defines the error types surfaced by the simulation core. It provides:
//! 1. **Configuration errors:** Unknown or contradictory options, rejected at construction.
//! 2. **Invariant errors:** Flow-control and state-machine precondition violations,
//!    carrying enough context (router, port, VC, cycle) to dump state.
//! 3. **Simulation errors:** The top-level error the run loop logs and terminates on.

use thiserror::Error;

use super::Cycle;

/// Configuration errors detected while constructing a network.
///
/// These are fatal: a network is never built from a contradictory or
/// unknown configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// An option was set to a value outside its accepted set.
    #[error("invalid value `{value}` for option `{option}`")]
    InvalidValue {
        /// Option name as it appears in the configuration.
        option: &'static str,
        /// The rejected value, rendered for diagnostics.
        value: String,
    },

    /// Two options contradict each other (e.g. NOQ without lookahead routing).
    #[error("contradictory options: {reason}")]
    Contradiction {
        /// Human-readable description of the conflict.
        reason: String,
    },

    /// A routing function name that is not registered.
    #[error("unknown routing function `{0}`")]
    UnknownRoutingFunction(String),

    /// An allocator kind that is not registered.
    #[error("unknown allocator `{0}`")]
    UnknownAllocator(String),

    /// The node-to-router map does not cover every node or names a
    /// router outside the mesh.
    #[error("bad node_router_map: {0}")]
    BadNodeRouterMap(String),
}

/// Invariant violations detected during simulation.
///
/// These correspond to the assertions of a hardware model: a sink already
/// holding an item, a credit freeing an empty slot, an illegal VC state
/// transition. They are returned rather than panicking so an embedding
/// simulator can catch them, log, and dump state before terminating.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantError {
    /// A channel was sent two items in a single cycle.
    #[error("cycle {cycle}: channel {channel} received a second item this cycle")]
    ChannelOverrun {
        /// Offending channel index.
        channel: usize,
        /// Cycle of the violation.
        cycle: Cycle,
    },

    /// A credit arrived for a VC whose occupancy is already zero.
    #[error("cycle {cycle}: router {router} output {port} VC {vc}: credit for an empty slot")]
    CreditUnderflow {
        /// Router observing the violation.
        router: usize,
        /// Output port of the downstream mirror.
        port: usize,
        /// Virtual channel index.
        vc: usize,
        /// Cycle of the violation.
        cycle: Cycle,
    },

    /// A reservation or arrival would push occupancy past the VC depth.
    #[error("cycle {cycle}: router {router} port {port} VC {vc}: buffer overflow")]
    BufferOverflow {
        /// Router observing the violation.
        router: usize,
        /// Port of the violation (input buffer or downstream mirror).
        port: usize,
        /// Virtual channel index.
        vc: usize,
        /// Cycle of the violation.
        cycle: Cycle,
    },

    /// A downstream VC was granted while another packet still owned it.
    #[error(
        "cycle {cycle}: router {router} output {port} VC {vc}: granted to {by} while owned by {owner}"
    )]
    VcDoubleBooked {
        /// Router observing the violation.
        router: usize,
        /// Output port of the downstream mirror.
        port: usize,
        /// Virtual channel index.
        vc: usize,
        /// Reservation key of the new grant.
        by: usize,
        /// Reservation key already holding the VC.
        owner: usize,
        /// Cycle of the violation.
        cycle: Cycle,
    },

    /// A VC state transition from an illegal predecessor state.
    #[error(
        "cycle {cycle}: router {router} input {port} VC {vc}: illegal transition {from} -> {to}"
    )]
    IllegalVcTransition {
        /// Router observing the violation.
        router: usize,
        /// Input port owning the VC.
        port: usize,
        /// Virtual channel index.
        vc: usize,
        /// State the VC was in.
        from: &'static str,
        /// State the transition attempted to reach.
        to: &'static str,
        /// Cycle of the violation.
        cycle: Cycle,
    },

    /// A flit arrived at a VC that cannot accept it (e.g. a body flit at
    /// an idle VC).
    #[error("cycle {cycle}: router {router} input {port} VC {vc}: {reason}")]
    BadFlit {
        /// Router observing the violation.
        router: usize,
        /// Input port the flit arrived on.
        port: usize,
        /// Virtual channel index.
        vc: usize,
        /// What was wrong with the arrival.
        reason: String,
        /// Cycle of the violation.
        cycle: Cycle,
    },

    /// The power-state machine observed a state it can never legally hold.
    #[error("cycle {cycle}: router {router}: power-state violation: {reason}")]
    PowerState {
        /// Router observing the violation.
        router: usize,
        /// What went wrong.
        reason: String,
        /// Cycle of the violation.
        cycle: Cycle,
    },
}

/// Top-level simulation error.
///
/// Configuration errors abort before the first cycle; invariant errors
/// propagate out of [`step`](crate::sim::Simulator::step) and terminate
/// the run loop.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimError {
    /// Rejected configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A hardware-model invariant failed mid-simulation.
    #[error(transparent)]
    Invariant(#[from] InvariantError),

    /// The statistics report could not be written.
    #[error("failed to write report: {0}")]
    Report(String),
}
