//! Datagram types moving on the three kinds of channels.
//!
//! This module defines the units of transport between routers. It provides:
//! 1. **Flits:** Payload-carrying flow-control units with head/body/tail roles.
//! 2. **Credits:** Buffer-occupancy returns driving credit-based flow control.
//! 3. **Handshakes:** Power-state announcements and drain acknowledgments
//!    exchanged between neighboring routers.

pub mod credit;
pub mod flit;
pub mod handshake;

pub use credit::Credit;
pub use flit::{Flit, FlitKind};
pub use handshake::Handshake;
