//! Cycle-accurate simulator for power-gated on-chip mesh networks.
//!
//! This crate implements a k-ary n-mesh of input-queued virtual-channel
//! routers with the following:
//! 1. **Router pipeline:** Route compute, VC allocation, switch allocation
//!    (optionally speculative, optionally held per packet), and switch
//!    traversal, with credit-based flow control.
//! 2. **Power gating:** A per-router {on, draining, off, waking} state machine
//!    with a neighbor handshake protocol that keeps flow control and routing
//!    correct across transitions.
//! 3. **Bypass:** Fly-over forwarding through gated routers (all-port, row-only)
//!    and a one-slot-latch ring overlay variant, with credit mirroring.
//! 4. **Workloads:** Synthetic traffic patterns, injection processes, and a
//!    message-buffer contract for embedding, driven by a cycle-driven traffic
//!    manager with an adaptive gating policy.
//! 5. **Statistics:** Latency/hop histograms, per-router activity counters, and
//!    a JSON report.

/// Two-phase allocators for VC and switch allocation.
pub mod alloc;
/// Receive-side buffering and the downstream occupancy mirror.
pub mod buffer;
/// Delay-line channels for flits, credits, and handshakes.
pub mod channel;
/// Common identifiers, port arithmetic, and the error taxonomy.
pub mod common;
/// Configuration structures, enums, and validation.
pub mod config;
/// Flit, credit, and handshake datagram types.
pub mod message;
/// The mesh fabric and per-cycle phase driver.
pub mod network;
/// The router: pipeline stages, power controller, bypass engine.
pub mod router;
/// Route compute contracts and dimension-order routing.
pub mod routing;
/// The top-level simulation driver.
pub mod sim;
/// Statistics collection and reporting.
pub mod stats;
/// Traffic generation, retirement, and adaptive policy.
pub mod traffic;

/// Root configuration type; use `Config::default()` or deserialize from JSON.
pub use crate::config::Config;
/// The mesh fabric; construct with `Network::new`.
pub use crate::network::Network;
/// Top-level simulator; owns the fabric and traffic manager side-by-side.
pub use crate::sim::Simulator;
/// Top-level error type of the simulation core.
pub use crate::common::SimError;
