//! # Configuration Tests
//!
//! Defaults, JSON deserialization, and validation of contradictory option
//! sets.

use pretty_assertions::assert_eq;

use meshsim_core::common::ConfigError;
use meshsim_core::config::{AllocatorKind, Config, PowergateType, TrafficPatternKind};

#[test]
fn test_defaults_validate() {
    let cfg = Config::default();
    assert_eq!(cfg.topology.k, 8);
    assert_eq!(cfg.topology.n, 2);
    assert_eq!(cfg.router.num_vcs, 4);
    assert_eq!(cfg.router.vc_stall_threshold, 300);
    assert_eq!(cfg.power.powergate_type, PowergateType::None);
    cfg.validate().unwrap();
}

#[test]
fn test_json_deserialization() {
    let json = r#"{
        "topology": { "k": 4, "n": 2 },
        "router": {
            "num_vcs": 2,
            "vc_buf_size": 8,
            "speculative": true,
            "vc_allocator": "separable_input_first"
        },
        "power": {
            "powergate_type": "rflov",
            "idle_threshold": 32
        },
        "traffic": { "pattern": "tornado", "injection_rate": 0.25 }
    }"#;
    let cfg: Config = serde_json::from_str(json).unwrap();
    assert_eq!(cfg.topology.k, 4);
    assert_eq!(cfg.router.num_vcs, 2);
    assert!(cfg.router.speculative);
    assert_eq!(cfg.router.vc_allocator, AllocatorKind::SeparableInputFirst);
    assert_eq!(cfg.power.powergate_type, PowergateType::Rflov);
    assert_eq!(cfg.power.idle_threshold, 32);
    assert_eq!(cfg.traffic.pattern, TrafficPatternKind::Tornado);
    cfg.validate().unwrap();
}

#[test]
fn test_degenerate_mesh_is_rejected() {
    let mut cfg = Config::default();
    cfg.topology.k = 1;
    assert_eq!(
        cfg.validate(),
        Err(ConfigError::InvalidValue { option: "k", value: "1".into() })
    );
}

#[test]
fn test_noq_without_lookahead_is_contradictory() {
    let mut cfg = Config::default();
    cfg.router.noq = true;
    cfg.router.lookahead_routing = false;
    assert!(matches!(cfg.validate(), Err(ConfigError::Contradiction { .. })));
}

#[test]
fn test_noq_with_lookahead_is_accepted() {
    let mut cfg = Config::default();
    cfg.router.noq = true;
    cfg.router.lookahead_routing = true;
    cfg.validate().unwrap();
}

#[test]
fn test_injection_rate_bounds() {
    let mut cfg = Config::default();
    cfg.traffic.injection_rate = 1.5;
    assert!(matches!(cfg.validate(), Err(ConfigError::InvalidValue { option: "injection_rate", .. })));
}

#[test]
fn test_internal_speedup_below_one_is_rejected() {
    let mut cfg = Config::default();
    cfg.router.internal_speedup = 0.5;
    assert!(matches!(
        cfg.validate(),
        Err(ConfigError::InvalidValue { option: "internal_speedup", .. })
    ));
}

#[test]
fn test_nord_needs_two_vcs() {
    let mut cfg = Config::default();
    cfg.power.powergate_type = PowergateType::Nord;
    cfg.router.num_vcs = 1;
    assert!(matches!(cfg.validate(), Err(ConfigError::Contradiction { .. })));
}

#[test]
fn test_node_router_map_must_cover_every_node() {
    let mut cfg = Config::default();
    cfg.topology.k = 4;
    cfg.topology.node_router_map = Some(vec![0; 3]);
    assert!(matches!(cfg.validate(), Err(ConfigError::BadNodeRouterMap(_))));

    cfg.topology.node_router_map = Some(vec![99; 16]);
    assert!(matches!(cfg.validate(), Err(ConfigError::BadNodeRouterMap(_))));

    cfg.topology.node_router_map = Some((0..16).collect());
    cfg.validate().unwrap();
}

#[test]
fn test_watermark_ordering_is_validated() {
    let mut cfg = Config::default();
    cfg.power.low_watermark = 2.0;
    cfg.power.high_watermark = 1.0;
    assert!(matches!(cfg.validate(), Err(ConfigError::Contradiction { .. })));
}
