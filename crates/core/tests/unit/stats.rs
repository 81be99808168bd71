//! # Statistics Tests
//!
//! Histogram arithmetic, the report structure, and the persisted JSON
//! format.

use meshsim_core::Simulator;
use meshsim_core::stats::{Histogram, NetStats, RouterActivity, StatsReport};

use crate::common::{ScriptedSource, base_config, msg_to};

#[test]
fn test_histogram_tracks_extrema_and_average() {
    let mut h = Histogram::new();
    assert_eq!(h.count(), 0);
    assert_eq!(h.minimum(), None);
    assert!((h.average() - 0.0).abs() < f64::EPSILON);

    for sample in [4u64, 10, 1] {
        h.add(sample);
    }
    assert_eq!(h.count(), 3);
    assert_eq!(h.minimum(), Some(1));
    assert_eq!(h.maximum(), Some(10));
    assert!((h.average() - 5.0).abs() < f64::EPSILON);

    h.clear();
    assert_eq!(h.count(), 0);
    assert_eq!(h.maximum(), None);
}

#[test]
fn test_router_activity_drain_times() {
    let mut a = RouterActivity::default();
    a.record_drain_time(4);
    a.record_drain_time(10);
    assert!((a.drain_time_average() - 7.0).abs() < f64::EPSILON);
}

#[test]
fn test_report_json_keys() {
    let mut stats = NetStats::default();
    stats.packet_latency.add(12);
    stats.hops.add(6);
    stats.flov_hops.add(1);
    let report = StatsReport::new(100, 400, &stats, vec![RouterActivity::default(); 2]);

    let value = serde_json::to_value(&report).unwrap();
    assert_eq!(value["start"], 100);
    assert_eq!(value["end"], 400);
    assert_eq!(value["cycles"], 300);
    assert_eq!(value["routers"].as_array().unwrap().len(), 2);
    assert!(value["routers"][0]["reads"].is_u64());
    assert!(value["routers"][0]["writes"].is_u64());
    assert!(value["routers"][0]["switches"].is_u64());
    assert!(value["routers"][0]["power-off-cycles"].is_u64());
    assert_eq!(value["packet-latency"]["average"], 12.0);
    assert_eq!(value["packet-latency"]["minimum"], 12);
    assert_eq!(value["packet-latency"]["maximum"], 12);
    assert_eq!(value["hops-average"], 6.0);
    assert_eq!(value["flov-hops-average"], 1.0);
}

#[test]
fn test_report_files_never_overwrite() {
    let dir = tempfile::tempdir().unwrap();
    let stats = NetStats::default();
    let report = StatsReport::new(0, 10, &stats, Vec::new());

    let first = report.write_json(dir.path()).unwrap();
    assert!(first.ends_with("meshstats.json"));
    let second = report.write_json(dir.path()).unwrap();
    assert!(second.ends_with("meshstats.1.json"));
    assert!(first.exists() && second.exists());
}

#[test]
fn test_simulator_report_reflects_the_run() {
    let cfg = base_config(4);
    let mut sim = Simulator::new(&cfg).unwrap();
    let script = ScriptedSource::new().at(0, 0, msg_to(15, 2));
    sim.traffic.set_workload_source(Box::new(script));
    sim.run(300).unwrap();

    let report = sim.report();
    assert_eq!(report.routers.len(), 16);
    assert!(report.packet_latency.average > 0.0);
    assert!(report.hops_average >= 6.0);
    assert!(!report.slow_packets);
    // Every router the packet crossed saw buffer activity.
    let total_writes: u64 = report.routers.iter().map(|r| r.writes).sum();
    assert!(total_writes >= 7, "expected writes along the route, saw {total_writes}");
}
