//! Switch traversal (ST) stage.

use crate::common::Cycle;
use crate::common::InvariantError;
use crate::router::Router;

/// Lands crossbar flits whose traversal delay has elapsed in their output
/// buffers.
pub(crate) fn switch_update(r: &mut Router, cycle: Cycle) -> Result<(), InvariantError> {
    while let Some(cf) = r.crossbar_flits.front() {
        if cf.ready > cycle {
            break;
        }
        let Some(cf) = r.crossbar_flits.pop_front() else {
            break;
        };
        let output = cf.expanded_output / r.cfg.output_speedup;
        r.watch_event(&cf.flit, cycle, "buffering flit at output");
        r.output_buffer[output].push_back(cf.flit);
    }
    Ok(())
}
