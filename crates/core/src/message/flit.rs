//! Flit: the unit of network transport.

use crate::common::{Cycle, FlitId, NodeId, PacketId, RouterId};
use crate::routing::OutputSet;

/// Transaction kind carried by a packet.
///
/// One-way workloads use [`FlitKind::Any`]; request–reply workloads pair
/// read/write requests with their replies so a round trip returns to the
/// original requester.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlitKind {
    /// Plain one-way traffic.
    #[default]
    Any,
    /// Read request; the destination answers with a read reply.
    ReadRequest,
    /// Reply to a read request.
    ReadReply,
    /// Write request; the destination answers with a write reply.
    WriteRequest,
    /// Reply to a write request.
    WriteReply,
}

/// A flow-control unit.
///
/// Flits of one packet share a packet identifier and contiguous flit
/// identifiers; exactly one carries `head` and exactly one carries `tail`
/// (a single-flit packet carries both). Timestamps record creation,
/// injection, router entry, and ejection for the latency statistics.
#[derive(Debug, Clone)]
pub struct Flit {
    /// Stable flit identifier.
    pub id: FlitId,
    /// Identifier of the packet this flit belongs to.
    pub pid: PacketId,
    /// This flit opens its packet.
    pub head: bool,
    /// This flit closes its packet.
    pub tail: bool,
    /// Packet class (QoS level).
    pub class: usize,
    /// Subnetwork the flit travels on.
    pub subnet: usize,
    /// Transaction kind.
    pub kind: FlitKind,
    /// Source node.
    pub src: NodeId,
    /// Destination node.
    pub dest: NodeId,
    /// Router the destination node is attached to.
    pub dest_router: RouterId,
    /// Assigned VC on the current link; `None` before injection.
    pub vc: Option<usize>,
    /// Routers entered through their pipelines.
    pub hops: u32,
    /// Gated routers transited on the bypass path.
    pub flov_hops: u32,
    /// Packet priority used by the allocators.
    pub priority: i64,
    /// Cycle the packet was generated at the source queue.
    pub ctime: Cycle,
    /// Cycle the head entered the network.
    pub itime: Cycle,
    /// Cycle this flit last entered a router.
    pub etime: Cycle,
    /// Cycle route compute last finished for this flit (watchdog base).
    pub rtime: Cycle,
    /// Cycle the flit was ejected; meaningful only after retirement.
    pub atime: Cycle,
    /// Route precomputed one hop ahead, when lookahead routing is on.
    pub lookahead: Option<OutputSet>,
    /// Trace per-stage events for this flit.
    pub watch: bool,
    /// Opaque payload reference for embedding simulators.
    pub payload: Option<u64>,
}

impl Flit {
    /// Creates a flit with all timestamps cleared.
    #[must_use]
    pub fn new(id: FlitId, pid: PacketId, src: NodeId, dest: NodeId) -> Self {
        Self {
            id,
            pid,
            head: false,
            tail: false,
            class: 0,
            subnet: 0,
            kind: FlitKind::Any,
            src,
            dest,
            dest_router: dest,
            vc: None,
            hops: 0,
            flov_hops: 0,
            priority: 0,
            ctime: 0,
            itime: 0,
            etime: 0,
            rtime: 0,
            atime: 0,
            lookahead: None,
            watch: false,
            payload: None,
        }
    }

    /// Whether this transaction kind expects a reply at the destination.
    #[must_use]
    pub const fn expects_reply(&self) -> bool {
        matches!(self.kind, FlitKind::ReadRequest | FlitKind::WriteRequest)
    }
}
