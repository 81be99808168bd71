//! # Traffic Manager Tests
//!
//! The workload engine end to end: scripted delivery through the full
//! manager, off-core destination filtering, request–reply round trips,
//! and wake-on-injection.

use meshsim_core::Simulator;
use meshsim_core::config::TrafficPatternKind;
use meshsim_core::message::FlitKind;
use meshsim_core::router::PowerState;
use meshsim_core::traffic::{WorkloadMessage, pattern};

use crate::common::{ScriptedSource, base_config, flov_config, msg_to};

#[test]
fn test_scripted_packets_all_deliver() {
    let cfg = base_config(4);
    let mut sim = Simulator::new(&cfg).unwrap();
    let script = ScriptedSource::new()
        .at(0, 0, msg_to(15, 4))
        .at(0, 5, msg_to(10, 4))
        .at(10, 12, msg_to(3, 2))
        .at(25, 7, msg_to(8, 1));
    sim.traffic.set_workload_source(Box::new(script));

    sim.run(600).unwrap();
    assert_eq!(sim.traffic.stats.packets_retired, 4);
    assert_eq!(sim.traffic.stats.flits_retired, 11);
    assert_eq!(sim.traffic.in_flight(), 0);
    assert!(!sim.traffic.has_pending_work());
}

#[test]
fn test_synthetic_uniform_load_drains_after_injection_stops() {
    let mut cfg = base_config(4);
    cfg.traffic.injection_rate = 0.05;
    cfg.traffic.packet_size = 2;
    let mut sim = Simulator::new(&cfg).unwrap();
    sim.run(300).unwrap();
    assert!(sim.traffic.stats.packets_generated > 0, "no load generated");

    // Cut injection over to an empty script; everything in flight retires.
    sim.traffic.set_workload_source(Box::new(ScriptedSource::new()));
    sim.drain(2000).unwrap();
    assert_eq!(sim.traffic.in_flight(), 0);
    assert_eq!(
        sim.traffic.stats.flits_retired, sim.traffic.stats.flits_injected,
        "delivery: every injected flit must eventually retire"
    );
}

#[test]
fn test_pattern_redraw_avoids_off_cores() {
    // Odd-indexed cores are off; the tornado offset advances until an
    // awake destination is found.
    let cores: Vec<bool> = (0..64).map(|n| n % 2 == 0).collect();
    let mut p = pattern::build(TrafficPatternKind::Tornado, 64, 8, 2, 1);
    for src in 0..64 {
        let mut attempt = 0;
        let dest = loop {
            match p.dest(src, attempt) {
                None => break None,
                Some(d) if cores[d] => break Some(d),
                Some(_) => attempt += 1,
            }
        };
        let dest = dest.expect("tornado exhausted with half the cores on");
        assert!(cores[dest], "targeted an off core");
    }
}

#[test]
fn test_tornado_with_half_cores_off_retires_traffic() {
    let mut cfg = base_config(8);
    cfg.traffic.injection_rate = 0.1;
    cfg.traffic.pattern = TrafficPatternKind::Tornado;
    cfg.traffic.packet_size = 1;
    let mut sim = Simulator::new(&cfg).unwrap();
    for node in (1..64).step_by(2) {
        sim.net.set_core_state(node, false);
    }
    sim.run(400).unwrap();
    assert!(sim.traffic.stats.packets_retired > 0);

    sim.traffic.set_workload_source(Box::new(ScriptedSource::new()));
    sim.drain(2000).unwrap();
    assert_eq!(sim.traffic.in_flight(), 0);
}

#[test]
fn test_read_request_round_trips_to_the_requester() {
    let mut cfg = base_config(4);
    cfg.traffic.use_read_write = true;
    cfg.traffic.packet_size = 1;
    let mut sim = Simulator::new(&cfg).unwrap();
    let script = ScriptedSource::new().at(
        0,
        0,
        WorkloadMessage {
            dest: Some(15),
            size: 1,
            class: 0,
            kind: FlitKind::ReadRequest,
            payload: Some(0xbeef),
        },
    );
    sim.traffic.set_workload_source(Box::new(script));

    sim.run(400).unwrap();
    // The request and its reply both retired, covering at least twice the
    // Manhattan distance in hops.
    assert_eq!(sim.traffic.stats.packets_retired, 2);
    let total_hops = sim.traffic.stats.hops.average() * sim.traffic.stats.hops.count() as f64;
    assert!(total_hops >= 12.0, "round trip covered only {total_hops} hops");
}

#[test]
fn test_injection_wakes_a_gated_router() {
    let cfg = flov_config(4, 8);
    let mut sim = Simulator::new(&cfg).unwrap();
    // Let the interior gate, then ask node 5 to send.
    sim.run(80).unwrap();
    assert_eq!(sim.net.router(5).power_state(), PowerState::Off);

    let script = ScriptedSource::new().at(80, 5, msg_to(13, 1));
    sim.traffic.set_workload_source(Box::new(script));
    sim.run(400).unwrap();

    assert_eq!(sim.traffic.stats.packets_retired, 1, "packet from a gated node");
    assert!(sim.net.router(5).activity().wake_events >= 1);
}

#[test]
fn test_latency_statistics_are_consistent() {
    let cfg = base_config(4);
    let mut sim = Simulator::new(&cfg).unwrap();
    let script = ScriptedSource::new()
        .at(0, 0, msg_to(15, 2))
        .at(3, 3, msg_to(12, 2));
    sim.traffic.set_workload_source(Box::new(script));
    sim.run(500).unwrap();

    let stats = &sim.traffic.stats;
    assert_eq!(stats.packets_retired, 2);
    // plat = qlat + nlat for every packet, so the averages add up too.
    let plat = stats.packet_latency.average();
    let sum = stats.queueing_latency.average() + stats.network_latency.average();
    assert!((plat - sum).abs() < 1e-9, "plat {plat} != qlat+nlat {sum}");
    assert!(stats.hops.average() >= 1.0);
}
