//! # Routing Tests
//!
//! Unit tests for the routing registry and the dimension-order functions:
//! the injection contract, ejection on arrival, and gated-run geometry.

use meshsim_core::common::ConfigError;
use meshsim_core::config::PowergateType;
use meshsim_core::message::Flit;
use meshsim_core::router::PowerState;
use meshsim_core::routing::{self, RouteCtx, dor};

fn ctx<'a>(id: usize, states: &'a [PowerState]) -> RouteCtx<'a> {
    RouteCtx {
        id,
        k: 4,
        n: 2,
        num_vcs: 4,
        powergate: PowergateType::None,
        neighbor_states: states,
    }
}

fn flit_to(dest: usize) -> Flit {
    let mut f = Flit::new(0, 0, 0, dest);
    f.dest_router = dest;
    f
}

#[test]
fn test_lookup_registered_functions() {
    assert!(routing::lookup("dor").is_ok());
    assert!(routing::lookup("nord").is_ok());
    assert_eq!(
        routing::lookup("adaptive_west_first"),
        Err(ConfigError::UnknownRoutingFunction("adaptive_west_first".into()))
    );
}

#[test]
fn test_injection_returns_single_injection_candidate() {
    let states = [PowerState::On; 4];
    let c = ctx(0, &states);
    let set = dor::dor_mesh(Some(&c), &flit_to(5), None, true);
    let cand = set.single().unwrap();
    assert_eq!(cand.output_port, None);
    assert_eq!((cand.vc_start, cand.vc_end), (0, 3));
}

#[test]
fn test_dor_routes_x_then_y() {
    let states = [PowerState::On; 4];
    // Router 0 toward router 15: east first.
    let set = dor::dor_mesh(Some(&ctx(0, &states)), &flit_to(15), Some(4), false);
    assert_eq!(set.single().unwrap().output_port, Some(0));
    // Router 3 (same column as 15): south.
    let set = dor::dor_mesh(Some(&ctx(3, &states)), &flit_to(15), Some(1), false);
    assert_eq!(set.single().unwrap().output_port, Some(2));
}

#[test]
fn test_dor_ejects_on_arrival() {
    let states = [PowerState::On; 4];
    let set = dor::dor_mesh(Some(&ctx(15, &states)), &flit_to(15), Some(1), false);
    assert_eq!(set.single().unwrap().output_port, Some(4));
}

#[test]
fn test_nord_detours_to_ring_when_next_hop_is_gated() {
    let mut states = [PowerState::On; 4];
    states[0] = PowerState::Off;
    let mut c = ctx(5, &states);
    c.powergate = PowergateType::Nord;
    // Router 5 toward 7 would go east (port 0), but that neighbor is off:
    // the flit detours onto router 5's ring-out port on the escape VC.
    let set = dor::nord_mesh(Some(&c), &flit_to(7), Some(1), false);
    let cand = set.single().unwrap();
    let (_, ring_out) = dor::nord_ring_ports(5, 4);
    assert_eq!(cand.output_port, Some(ring_out));
    assert_eq!((cand.vc_start, cand.vc_end), (0, 0));
}

#[test]
fn test_nord_reserves_escape_vc_on_regular_hops() {
    let states = [PowerState::On; 4];
    let mut c = ctx(5, &states);
    c.powergate = PowergateType::Nord;
    let set = dor::nord_mesh(Some(&c), &flit_to(7), Some(1), false);
    let cand = set.single().unwrap();
    assert_eq!(cand.output_port, Some(0));
    assert_eq!(cand.vc_start, 1, "VC 0 belongs to ring traffic");
}

#[test]
fn test_terminal_router_is_the_turn_point() {
    // Router 4 (1,0) toward 14 (3,2): x-terminal is (1,2) = 6.
    assert_eq!(dor::terminal_router(4, 14, 4, 2, 0), Some(6));
    // Moving in y from 6 toward 14: terminal is the destination.
    assert_eq!(dor::terminal_router(6, 14, 4, 2, 2), Some(14));
    // No x distance left: no terminal along x.
    assert_eq!(dor::terminal_router(6, 14, 4, 2, 1), None);
}

#[test]
fn test_axis_distance() {
    assert_eq!(dor::axis_distance(4, 6, 4, 0), 2);
    assert_eq!(dor::axis_distance(6, 14, 4, 1), 2);
    assert_eq!(dor::axis_distance(5, 5, 4, 0), 0);
}

#[rstest::rstest]
#[case(0, 15, Some(0))] // corner to corner: east first
#[case(12, 0, Some(3))] // same column: north
#[case(7, 4, Some(1))] // same row: west
#[case(9, 9, None)] // arrived
fn test_next_port_cases(#[case] cur: usize, #[case] dest: usize, #[case] expected: Option<usize>) {
    assert_eq!(dor::next_port(cur, dest, 4, 2), expected);
}
