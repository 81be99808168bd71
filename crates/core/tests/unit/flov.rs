//! # Fly-Over Bypass Tests
//!
//! Bypass behavior of gated routers: straight-through forwarding with
//! correct hop accounting, flow control across the gap, dark-router
//! invariants, and wake chains for flits that must stop inside a gated
//! run.

use meshsim_core::common::PacketId;
use meshsim_core::router::PowerState;

use crate::common::{TestBed, flov_config};

/// Queues one round of keep-alive traffic so routers 8, 9 and 11 never
/// idle off while (2,2) = 10 does.
fn keep_alive(bed: &mut TestBed) {
    let _ = bed.queue_packet(8, 9, 1);
    let _ = bed.queue_packet(11, 15, 1);
}

/// Runs keep-alive rounds until router 10 is dark.
fn gate_router_10(bed: &mut TestBed) {
    for round in 0..60 {
        keep_alive(bed);
        for _ in 0..4 {
            bed.step().unwrap();
        }
        if bed.net.router(10).power_state() == PowerState::Off && round > 2 {
            return;
        }
    }
    panic!("router 10 never powered off");
}

/// Steps with keep-alive traffic until all `want` flits of `probe` retire.
fn run_probe(bed: &mut TestBed, probe: PacketId, want: usize, limit: u64) {
    for i in 0..limit {
        if i % 4 == 0 {
            keep_alive(bed);
        }
        bed.step().unwrap();
        if bed.net.router(10).power_state() == PowerState::Off {
            assert!(
                bed.net.router(10).all_vcs_idle(),
                "dark router buffered a flit at cycle {}",
                bed.cycle
            );
        }
        if bed.retired.iter().filter(|f| f.pid == probe).count() == want {
            return;
        }
    }
    panic!("probe packet never fully delivered");
}

#[test]
fn test_bypass_through_one_gated_router() {
    let cfg = flov_config(4, 5);
    let mut bed = TestBed::new(&cfg);
    gate_router_10(&mut bed);

    let probe = bed.queue_packet(8, 11, 1);
    run_probe(&mut bed, probe, 1, 400);

    let flit = bed.retired.iter().find(|f| f.pid == probe).unwrap();
    assert_eq!(flit.flov_hops, 1, "exactly one fly-over leg");
    assert_eq!(flit.hops, 3, "total hops equal the Manhattan distance");
    assert!(bed.net.router(10).activity().bypassed_flits >= 1);
}

#[test]
fn test_bypass_preserves_multi_flit_packets() {
    let cfg = flov_config(4, 5);
    let mut bed = TestBed::new(&cfg);
    gate_router_10(&mut bed);

    let probe = bed.queue_packet(8, 11, 4);
    run_probe(&mut bed, probe, 4, 600);

    let flits: Vec<_> = bed.retired.iter().filter(|f| f.pid == probe).collect();
    assert_eq!(flits.len(), 4);
    assert!(flits[0].head && flits[3].tail);
    for f in &flits {
        assert_eq!(f.flov_hops, 1);
        assert_eq!(f.hops, 3);
    }
    for pair in flits.windows(2) {
        assert_eq!(pair[1].id, pair[0].id + 1);
    }
}

#[test]
fn test_rflov_bypasses_rows_only() {
    let mut cfg = flov_config(4, 5);
    cfg.power.powergate_type = meshsim_core::config::PowergateType::Rflov;
    let mut bed = TestBed::new(&cfg);
    gate_router_10(&mut bed);

    // Row traffic flies over router 10 exactly as under full fly-over.
    let probe = bed.queue_packet(8, 11, 1);
    run_probe(&mut bed, probe, 1, 400);
    let flit = bed.retired.iter().find(|f| f.pid == probe).unwrap();
    assert_eq!(flit.flov_hops, 1);
    assert_eq!(flit.hops, 3);
}

#[test]
fn test_wake_chain_revives_a_dark_destination_path() {
    // A roomy idle threshold keeps freshly woken routers from re-draining
    // under the probe's feet.
    let cfg = flov_config(4, 16);
    let mut bed = TestBed::new(&cfg);
    // Let the whole interior go dark.
    bed.run(120).unwrap();
    assert_eq!(bed.net.router(10).power_state(), PowerState::Off);
    assert_eq!(bed.net.router(2).power_state(), PowerState::Off);

    // Node 0 sends to node 10 ((2,2)): the injection router, the x-turn
    // router (0,2) and the destination all have to be woken along the way.
    let probe = bed.queue_packet(0, 10, 1);
    for _ in 0..800 {
        bed.step().unwrap();
        if bed.retired.iter().any(|f| f.pid == probe) {
            break;
        }
    }
    let flit = bed
        .retired
        .iter()
        .find(|f| f.pid == probe)
        .expect("flit stranded behind dark routers");
    assert_eq!(flit.hops, 4, "Manhattan distance from (0,0) to (2,2)");
    assert!(flit.flov_hops >= 1, "some leg must fly over a dark router");
    assert_eq!(bed.net.router(10).power_state(), PowerState::On);
}

#[test]
fn test_nord_anchor_row_traffic_unaffected() {
    let mut cfg = flov_config(4, 5);
    cfg.power.powergate_type = meshsim_core::config::PowergateType::Nord;
    let mut bed = TestBed::new(&cfg);
    bed.run(60).unwrap();

    // The always-on bottom row still delivers normally.
    let probe = bed.queue_packet(13, 14, 2);
    for _ in 0..200 {
        bed.step().unwrap();
        if bed.retired.iter().filter(|f| f.pid == probe).count() == 2 {
            break;
        }
    }
    assert_eq!(bed.retired.iter().filter(|f| f.pid == probe).count(), 2);
    for f in bed.retired.iter().filter(|f| f.pid == probe) {
        assert_eq!(f.hops, 1);
        assert_eq!(f.flov_hops, 0);
    }
}
