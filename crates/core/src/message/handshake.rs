//! Handshake: power-state signalling between neighbors.

use crate::common::RouterId;
use crate::router::PowerState;

/// A power-state handshake exchanged between neighboring routers.
///
/// State transitions announce `(src_state, new_state)`; a drain
/// acknowledgment travels as `drain_done`; a wake request names its target
/// so gated routers can relay it along the row or column. Gated routers
/// relay handshakes on the straight-through path, stripping or rewriting
/// fields as they go, so any subset of the fields may be populated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    /// Router that (last) emitted this handshake.
    pub src: RouterId,
    /// The emitter's power state at send time.
    pub src_state: Option<PowerState>,
    /// Announced new state, for transitions.
    pub new_state: Option<PowerState>,
    /// Drain acknowledgment: the emitter has no traffic left toward the
    /// transitioning router.
    pub drain_done: bool,
    /// Wake request aimed at the named router; relayed until it arrives.
    pub wake: Option<RouterId>,
    /// First awake router beyond the emitter when it goes dark; receivers
    /// track it to know where bypassed flits will land.
    pub logical_neighbor: Option<RouterId>,
    /// Correlating identifier, unique per emitting router.
    pub hid: u64,
}

impl Handshake {
    /// Creates an empty handshake from `src`.
    #[must_use]
    pub const fn new(src: RouterId, hid: u64) -> Self {
        Self {
            src,
            src_state: None,
            new_state: None,
            drain_done: false,
            wake: None,
            logical_neighbor: None,
            hid,
        }
    }

    /// Creates a wake request aimed at `target`.
    #[must_use]
    pub const fn wake_request(src: RouterId, target: RouterId, hid: u64) -> Self {
        Self {
            src,
            src_state: None,
            new_state: None,
            drain_done: false,
            wake: Some(target),
            logical_neighbor: None,
            hid,
        }
    }

    /// Creates a state-transition announcement.
    #[must_use]
    pub const fn transition(
        src: RouterId,
        hid: u64,
        src_state: PowerState,
        new_state: PowerState,
    ) -> Self {
        Self {
            src,
            src_state: Some(src_state),
            new_state: Some(new_state),
            drain_done: false,
            wake: None,
            logical_neighbor: None,
            hid,
        }
    }

    /// Whether the handshake still carries any information worth relaying.
    #[must_use]
    pub const fn is_meaningful(&self) -> bool {
        self.src_state.is_some() || self.new_state.is_some() || self.drain_done || self.wake.is_some()
    }
}
