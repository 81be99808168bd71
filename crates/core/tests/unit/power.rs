//! # Power Gating Tests
//!
//! The power-state machine end to end: idle-driven draining, the off
//! dwell, wake-up, anchors, and the neighbor serialization invariant.

use meshsim_core::Simulator;
use meshsim_core::router::PowerState;

use crate::common::flov_config;

/// Directional neighbors of `id` in a k x k mesh.
fn neighbors(id: usize, k: usize) -> Vec<usize> {
    let (row, col) = (id / k, id % k);
    let mut out = Vec::new();
    if col + 1 < k {
        out.push(id + 1);
    }
    if col > 0 {
        out.push(id - 1);
    }
    if row + 1 < k {
        out.push(id + k);
    }
    if row > 0 {
        out.push(id - k);
    }
    out
}

/// Asserts that no two adjacent routers are simultaneously transitioning.
fn assert_serialized(sim: &Simulator, k: usize) {
    for id in 0..k * k {
        if !sim.net.router(id).power_state().is_transitioning() {
            continue;
        }
        for nb in neighbors(id, k) {
            assert!(
                !sim.net.router(nb).power_state().is_transitioning(),
                "routers {id} and {nb} transition together at cycle {}",
                sim.cycle()
            );
        }
    }
}

#[test]
fn test_idle_router_drains_then_powers_off() {
    let cfg = flov_config(4, 10);
    let mut sim = Simulator::new(&cfg).unwrap();

    // Nothing moves: router (1,1) reaches its idle threshold at cycle 10.
    sim.run(10).unwrap();
    assert_eq!(sim.net.router(5).power_state(), PowerState::On);
    sim.run(2).unwrap();
    assert_eq!(sim.net.router(5).power_state(), PowerState::Draining);

    // The drain completes well inside the drain threshold.
    let mut off_at = None;
    for _ in 0..cfg.power.drain_threshold + 20 {
        sim.step().unwrap();
        if sim.net.router(5).power_state() == PowerState::Off {
            off_at = Some(sim.cycle());
            break;
        }
    }
    let off_at = off_at.expect("router 5 never powered off");
    assert!(off_at <= 10 + cfg.power.drain_threshold + 2);

    // It stays off while nobody needs it.
    sim.run(30).unwrap();
    assert_eq!(sim.net.router(5).power_state(), PowerState::Off);
    assert!(sim.net.router(5).activity().power_off_cycles >= 30);
}

#[test]
fn test_wake_signal_honours_break_even_and_wakeup_thresholds() {
    let cfg = flov_config(4, 10);
    let mut sim = Simulator::new(&cfg).unwrap();

    // Let the mesh settle into the gated state.
    sim.run(60).unwrap();
    assert_eq!(sim.net.router(5).power_state(), PowerState::Off);

    sim.net.wake_router(5);
    let mut waking_at = None;
    let mut on_at = None;
    for _ in 0..200 {
        sim.step().unwrap();
        match sim.net.router(5).power_state() {
            PowerState::Waking if waking_at.is_none() => waking_at = Some(sim.cycle()),
            PowerState::On => {
                on_at = Some(sim.cycle());
            }
            _ => {}
        }
        if on_at.is_some() {
            break;
        }
    }
    let waking_at = waking_at.expect("wake signal never honoured");
    let on_at = on_at.expect("router never returned to on");
    assert!(
        on_at - waking_at >= cfg.power.wakeup_threshold,
        "woke in {} cycles, threshold is {}",
        on_at - waking_at,
        cfg.power.wakeup_threshold
    );
}

#[test]
fn test_neighbor_serialization_invariant_holds_throughout() {
    let cfg = flov_config(4, 10);
    let mut sim = Simulator::new(&cfg).unwrap();
    for _ in 0..80 {
        sim.step().unwrap();
        assert_serialized(&sim, 4);
    }
    // Wake a few routers and keep checking through the wake storm.
    for id in [5usize, 6, 9] {
        sim.net.wake_router(id);
    }
    for _ in 0..120 {
        sim.step().unwrap();
        assert_serialized(&sim, 4);
    }
}

#[test]
fn test_bottom_row_anchors_never_gate() {
    let cfg = flov_config(4, 5);
    let mut sim = Simulator::new(&cfg).unwrap();
    for _ in 0..150 {
        sim.step().unwrap();
        for id in 12..16 {
            assert_eq!(
                sim.net.router(id).power_state(),
                PowerState::On,
                "anchor {id} left the on state"
            );
        }
    }
    // Meanwhile the interior actually gated.
    assert_eq!(sim.net.router(5).power_state(), PowerState::Off);
}

#[test]
fn test_gating_disabled_keeps_everything_on() {
    let mut cfg = flov_config(4, 5);
    cfg.power.powergate_type = meshsim_core::config::PowergateType::None;
    let mut sim = Simulator::new(&cfg).unwrap();
    sim.run(100).unwrap();
    for id in 0..16 {
        assert_eq!(sim.net.router(id).power_state(), PowerState::On);
    }
}

#[test]
fn test_off_routers_report_off_cycles() {
    let cfg = flov_config(4, 5);
    let mut sim = Simulator::new(&cfg).unwrap();
    sim.run(120).unwrap();
    let report = sim.report();
    let gated: u64 = report.routers[..12].iter().map(|r| r.power_off_cycles).sum();
    assert!(gated > 0, "no gated cycles recorded in the report");
    for anchor in &report.routers[12..] {
        assert_eq!(anchor.power_off_cycles, 0);
    }
}
