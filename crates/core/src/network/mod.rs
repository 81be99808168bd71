//! The mesh fabric: routers, channels, and the per-cycle phase driver.
//!
//! This module composes routers and channels into a k-ary n-mesh. It provides:
//! 1. **Construction:** [`Network::new`] builds the router arena, one flit,
//!    credit, and handshake channel per directed link, and the node-side
//!    injection/ejection interfaces — all cross-references are integer indices.
//! 2. **Phases:** `read_inputs` → `power_state_evaluate` → `evaluate` →
//!    `write_outputs`, called in that order once per cycle; no component sees
//!    another's writes until the global barrier.
//! 3. **Node interface:** Injection and ejection endpoints with their credit
//!    loops, plus per-node core states the traffic manager consults.

use crate::channel::{CreditChannel, FlitChannel, HandshakeChannel};
use crate::common::{ConfigError, Cycle, InvariantError, NodeId, RouterId, port};
use crate::config::{Config, PowergateType};
use crate::message::{Credit, Flit};
use crate::router::{PowerState, Router};
use crate::routing;

/// One directed router-to-router link: a flit channel, the credit channel
/// running back, and the handshake channel alongside.
#[derive(Debug, Clone, Copy)]
struct Link {
    src: RouterId,
    src_port: usize,
    dst: RouterId,
    dst_port: usize,
    flit: usize,
    credit: usize,
    handshake: usize,
}

/// Node-side interface of one terminal: injection and ejection channels
/// with their credit returns.
#[derive(Debug, Clone, Copy)]
struct NodeIf {
    router: RouterId,
    inject_flit: usize,
    inject_credit: usize,
    eject_flit: usize,
    eject_credit: usize,
}

/// A k-ary n-mesh of power-gated routers.
#[derive(Debug)]
pub struct Network {
    k: usize,
    n: usize,
    routers: Vec<Router>,
    flit_channels: Vec<FlitChannel>,
    credit_channels: Vec<CreditChannel>,
    handshake_channels: Vec<HandshakeChannel>,
    links: Vec<Link>,
    nodes: Vec<NodeIf>,
    core_states: Vec<bool>,
}

impl Network {
    /// Builds the fabric described by `config`.
    ///
    /// # Errors
    ///
    /// Rejects invalid configurations before any hardware is built.
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        config.validate()?;
        let k = config.topology.k;
        let n = config.topology.n;
        let num_routers = config.topology.num_routers();
        let rf = routing::lookup(&config.router.routing_function)?;
        let link_delay = config.router.link_delay;
        let gates = config.power.powergate_type.gates();

        let mut routers = Vec::with_capacity(num_routers);
        for id in 0..num_routers {
            let neighbors = Self::neighbor_table(id, k, n);
            // The last row stays on so memory traffic always has a live path.
            let anchor = gates && id >= num_routers - k.pow((n - 1) as u32);
            let mut router = Router::new(id, config, neighbors.clone(), anchor, rf)?;
            for (p, nb) in neighbors.iter().enumerate() {
                if nb.is_none() {
                    router.power.mark_edge(p);
                }
            }
            routers.push(router);
        }

        let mut flit_channels = Vec::new();
        let mut credit_channels = Vec::new();
        let mut handshake_channels = Vec::new();
        let mut links = Vec::new();

        for src in 0..num_routers {
            for p in 0..2 * n {
                let Some(dst) = Self::neighbor_table(src, k, n)[p] else {
                    continue;
                };
                let dst_port = port::opposite(p);

                let flit = flit_channels.len();
                let mut fc = FlitChannel::new(flit, link_delay);
                fc.set_source(src, p);
                fc.set_sink(dst, dst_port);
                flit_channels.push(fc);

                let credit = credit_channels.len();
                let mut cc = CreditChannel::new(credit, link_delay);
                cc.set_source(dst, dst_port);
                cc.set_sink(src, p);
                credit_channels.push(cc);

                let handshake = handshake_channels.len();
                let mut hc = HandshakeChannel::new(handshake, link_delay);
                hc.set_source(src, p);
                hc.set_sink(dst, dst_port);
                handshake_channels.push(hc);

                links.push(Link {
                    src,
                    src_port: p,
                    dst,
                    dst_port,
                    flit,
                    credit,
                    handshake,
                });
            }
        }

        let mut nodes = Vec::with_capacity(num_routers);
        for node in 0..num_routers {
            let router = config.topology.router_of(node);
            let ni = 2 * n;

            let inject_flit = flit_channels.len();
            let mut fc = FlitChannel::new(inject_flit, link_delay);
            fc.set_sink(router, ni);
            flit_channels.push(fc);

            let inject_credit = credit_channels.len();
            let mut cc = CreditChannel::new(inject_credit, link_delay);
            cc.set_source(router, ni);
            credit_channels.push(cc);

            let eject_flit = flit_channels.len();
            let mut fc = FlitChannel::new(eject_flit, link_delay);
            fc.set_source(router, ni);
            flit_channels.push(fc);

            let eject_credit = credit_channels.len();
            let mut cc = CreditChannel::new(eject_credit, link_delay);
            cc.set_sink(router, ni);
            credit_channels.push(cc);

            nodes.push(NodeIf {
                router,
                inject_flit,
                inject_credit,
                eject_flit,
                eject_credit,
            });
        }

        Ok(Self {
            k,
            n,
            routers,
            flit_channels,
            credit_channels,
            handshake_channels,
            links,
            nodes,
            core_states: vec![true; num_routers],
        })
    }

    /// Neighbor router per directional port for `id`.
    fn neighbor_table(id: RouterId, k: usize, n: usize) -> Vec<Option<RouterId>> {
        let mut table = Vec::with_capacity(2 * n);
        for dim in 0..n {
            let stride = k.pow(dim as u32);
            let coord = (id / stride) % k;
            table.push((coord + 1 < k).then(|| id + stride));
            table.push((coord > 0).then(|| id - stride));
        }
        table
    }

    /// Mesh side.
    #[must_use]
    pub const fn k(&self) -> usize {
        self.k
    }

    /// Mesh dimension.
    #[must_use]
    pub const fn n(&self) -> usize {
        self.n
    }

    /// Number of terminal nodes.
    #[must_use]
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Number of routers.
    #[must_use]
    pub fn num_routers(&self) -> usize {
        self.routers.len()
    }

    /// The router a node's terminal is attached to.
    #[must_use]
    pub fn router_of(&self, node: NodeId) -> RouterId {
        self.nodes[node].router
    }

    /// Shared view of a router.
    #[must_use]
    pub fn router(&self, id: RouterId) -> &Router {
        &self.routers[id]
    }

    /// Exclusive view of a router (policy hooks, tests).
    pub fn router_mut(&mut self, id: RouterId) -> &mut Router {
        &mut self.routers[id]
    }

    /// All routers, for statistics collection.
    #[must_use]
    pub fn routers(&self) -> &[Router] {
        &self.routers
    }

    /// Whether `node`'s compute core is powered.
    #[must_use]
    pub fn core_state(&self, node: NodeId) -> bool {
        self.core_states[node]
    }

    /// Powers a node's compute core on or off. Parked cores unlock
    /// router-parking gating on their attached router.
    pub fn set_core_state(&mut self, node: NodeId, on: bool) {
        self.core_states[node] = on;
        let router = self.nodes[node].router;
        self.routers[router].set_core_parked(!on);
    }

    /// Latches a wake signal on a router.
    pub fn wake_router(&mut self, id: RouterId) {
        self.routers[id].wake_up();
    }

    // ------------------------------------------------------------------
    // phase driver
    // ------------------------------------------------------------------

    /// Phase 1: surfaces channel items whose delay elapsed, delivers them
    /// to the routers, and evaluates handshakes.
    ///
    /// # Errors
    ///
    /// Propagates invariant violations from delivery.
    pub fn read_inputs(&mut self, cycle: Cycle) -> Result<(), InvariantError> {
        for ch in &mut self.flit_channels {
            ch.read_inputs(cycle);
        }
        for ch in &mut self.credit_channels {
            ch.read_inputs(cycle);
        }
        for ch in &mut self.handshake_channels {
            ch.read_inputs(cycle);
        }

        for link in &self.links {
            if let Some(flit) = self.flit_channels[link.flit].receive() {
                // A flit bound for a dark router is an implicit wake request.
                if flit.dest_router == link.dst
                    && self.routers[link.dst].power_state() != PowerState::On
                {
                    self.routers[link.dst].wake_up();
                }
                self.routers[link.dst].receive_flit(link.dst_port, flit, cycle)?;
            }
            if let Some(credit) = self.credit_channels[link.credit].receive() {
                self.routers[link.src].receive_credit(link.src_port, credit, cycle);
            }
            if let Some(hs) = self.handshake_channels[link.handshake].receive() {
                self.routers[link.dst].receive_handshake(link.dst_port, hs);
            }
        }

        let ni = 2 * self.n;
        for node in 0..self.nodes.len() {
            let iface = self.nodes[node];
            if let Some(flit) = self.flit_channels[iface.inject_flit].receive() {
                if self.routers[iface.router].power_state() != PowerState::On {
                    self.routers[iface.router].wake_up();
                }
                self.routers[iface.router].receive_flit(ni, flit, cycle)?;
            }
            if let Some(credit) = self.credit_channels[iface.eject_credit].receive() {
                self.routers[iface.router].receive_credit(ni, credit, cycle);
            }
        }

        for r in &mut self.routers {
            r.handshake_evaluate(cycle)?;
        }
        Ok(())
    }

    /// Phase 2: advances every router's power-state machine.
    ///
    /// # Errors
    ///
    /// Propagates power-protocol violations.
    pub fn power_state_evaluate(&mut self, cycle: Cycle) -> Result<(), InvariantError> {
        for r in &mut self.routers {
            r.power_state_evaluate(cycle)?;
        }
        Ok(())
    }

    /// Phase 3: advances every router's internal pipeline.
    ///
    /// # Errors
    ///
    /// Propagates pipeline invariant violations.
    pub fn evaluate(&mut self, cycle: Cycle) -> Result<(), InvariantError> {
        for r in &mut self.routers {
            r.internal_step(cycle)?;
        }
        Ok(())
    }

    /// Phase 4: moves router outputs onto the channels and commits every
    /// channel's staged item.
    ///
    /// # Errors
    ///
    /// A double-send onto one channel in one cycle is a link violation.
    pub fn write_outputs(&mut self, cycle: Cycle) -> Result<(), InvariantError> {
        for link in &self.links {
            if let Some(flit) = self.routers[link.src].pop_outgoing_flit(link.src_port) {
                self.flit_channels[link.flit].send(flit, cycle)?;
            }
            if let Some(credit) = self.routers[link.dst].pop_outgoing_credit(link.dst_port) {
                self.credit_channels[link.credit].send(credit, cycle)?;
            }
            if let Some(hs) = self.routers[link.src].pop_outgoing_handshake(link.src_port) {
                self.handshake_channels[link.handshake].send(hs, cycle)?;
            }
        }

        let ni = 2 * self.n;
        for iface in &self.nodes {
            if let Some(flit) = self.routers[iface.router].pop_outgoing_flit(ni) {
                self.flit_channels[iface.eject_flit].send(flit, cycle)?;
            }
            if let Some(credit) = self.routers[iface.router].pop_outgoing_credit(ni) {
                self.credit_channels[iface.inject_credit].send(credit, cycle)?;
            }
        }

        for ch in &mut self.flit_channels {
            ch.write_outputs(cycle);
        }
        for ch in &mut self.credit_channels {
            ch.write_outputs(cycle);
        }
        for ch in &mut self.handshake_channels {
            ch.write_outputs(cycle);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // node interface
    // ------------------------------------------------------------------

    /// Sends a flit from `node` into its injection channel.
    ///
    /// # Errors
    ///
    /// Two injections from one node in one cycle violate the link
    /// contract.
    pub fn inject_flit(&mut self, node: NodeId, flit: Flit, cycle: Cycle) -> Result<(), InvariantError> {
        let idx = self.nodes[node].inject_flit;
        self.flit_channels[idx].send(flit, cycle)
    }

    /// Takes the flit ejected toward `node` this cycle, if any.
    pub fn take_ejected_flit(&mut self, node: NodeId) -> Option<Flit> {
        let idx = self.nodes[node].eject_flit;
        self.flit_channels[idx].receive()
    }

    /// Takes the injection-side credit returned toward `node`, if any.
    pub fn take_injection_credit(&mut self, node: NodeId) -> Option<Credit> {
        let idx = self.nodes[node].inject_credit;
        self.credit_channels[idx].receive()
    }

    /// Returns an ejection credit from `node` toward its router.
    ///
    /// # Errors
    ///
    /// Two returns from one node in one cycle violate the link contract.
    pub fn return_ejection_credit(
        &mut self,
        node: NodeId,
        credit: Credit,
        cycle: Cycle,
    ) -> Result<(), InvariantError> {
        let idx = self.nodes[node].eject_credit;
        self.credit_channels[idx].send(credit, cycle)
    }

    // ------------------------------------------------------------------
    // run-loop queries
    // ------------------------------------------------------------------

    /// Whether any flit, credit, or handshake is in flight, or any router
    /// is mid-transition.
    #[must_use]
    pub fn events_outstanding(&self) -> bool {
        self.routers.iter().any(Router::busy)
            || self.flit_channels.iter().any(|c| !c.is_idle())
            || self.credit_channels.iter().any(|c| !c.is_idle())
            || self.handshake_channels.iter().any(|c| !c.is_idle())
    }

    /// Earliest future cycle any router's power timer fires.
    #[must_use]
    pub fn next_power_event_cycle(&self, cycle: Cycle) -> Option<Cycle> {
        self.routers
            .iter()
            .filter_map(|r| r.next_power_event_cycle(cycle))
            .min()
    }

    /// Gating discipline active in this fabric.
    #[must_use]
    pub fn powergate_type(&self) -> PowergateType {
        self.routers
            .first()
            .map_or(PowergateType::None, |r| r.powergate)
    }
}
