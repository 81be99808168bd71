//! # Allocator Tests
//!
//! Unit tests for the two-phase allocators: grant uniqueness, priority
//! handling, round-robin fairness, and the request supersession rule.

use meshsim_core::alloc::{self, Allocator};
use meshsim_core::config::AllocatorKind;

fn round_robin(inputs: usize, outputs: usize) -> Box<dyn Allocator> {
    alloc::create(AllocatorKind::RoundRobin, inputs, outputs, 4).unwrap()
}

fn separable(inputs: usize, outputs: usize) -> Box<dyn Allocator> {
    alloc::create(AllocatorKind::SeparableInputFirst, inputs, outputs, 4).unwrap()
}

#[test]
fn test_single_request_is_granted() {
    let mut a = round_robin(4, 4);
    a.add_request(1, 2, 0, 0, 0);
    a.allocate();
    assert_eq!(a.output_assigned(1), Some(2));
    assert_eq!(a.input_assigned(2), Some(1));
}

#[test]
fn test_outputs_are_granted_at_most_once() {
    for mut a in [round_robin(4, 4), separable(4, 4)] {
        a.add_request(0, 3, 0, 0, 0);
        a.add_request(1, 3, 1, 0, 0);
        a.add_request(2, 3, 2, 0, 0);
        a.allocate();
        let winners: Vec<_> = (0..4).filter(|&i| a.output_assigned(i) == Some(3)).collect();
        assert_eq!(winners.len(), 1, "output 3 granted {} times", winners.len());
        assert_eq!(a.input_assigned(3), Some(winners[0]));
    }
}

#[test]
fn test_disjoint_requests_all_match() {
    for mut a in [round_robin(4, 4), separable(4, 4)] {
        a.add_request(0, 1, 0, 0, 0);
        a.add_request(1, 2, 0, 0, 0);
        a.add_request(2, 3, 0, 0, 0);
        a.allocate();
        assert_eq!(a.output_assigned(0), Some(1));
        assert_eq!(a.output_assigned(1), Some(2));
        assert_eq!(a.output_assigned(2), Some(3));
    }
}

#[test]
fn test_separable_output_priority_wins() {
    let mut a = separable(4, 4);
    a.add_request(0, 2, 0, 0, 1);
    a.add_request(1, 2, 0, 0, 5);
    a.allocate();
    assert_eq!(a.input_assigned(2), Some(1));
    assert_eq!(a.output_assigned(0), None);
}

#[test]
fn test_round_robin_rotates_under_contention() {
    let mut a = round_robin(2, 1);
    let mut wins = [0u32; 2];
    for _ in 0..10 {
        a.clear();
        a.add_request(0, 0, 0, 0, 0);
        a.add_request(1, 0, 0, 0, 0);
        a.allocate();
        for input in 0..2 {
            if a.output_assigned(input) == Some(0) {
                wins[input] += 1;
            }
        }
    }
    assert!(wins[0] > 0 && wins[1] > 0, "starvation under contention: {wins:?}");
}

#[test]
fn test_supersession_prefers_higher_output_priority() {
    let mut a = round_robin(2, 2);
    a.add_request(0, 1, 0, 0, 1);
    a.add_request(0, 1, 2, 0, 7);
    let req = a.request(0, 1).unwrap();
    assert_eq!(req.out_pri, 7);
    assert_eq!(req.label, 2);
}

#[test]
fn test_supersession_keeps_higher_priority_request() {
    let mut a = round_robin(2, 2);
    a.add_request(0, 1, 2, 0, 7);
    a.add_request(0, 1, 0, 0, 1);
    let req = a.request(0, 1).unwrap();
    assert_eq!(req.out_pri, 7, "lower priority must not supersede");
}

#[test]
fn test_has_requests_for_tracks_outputs() {
    let mut a = separable(2, 2);
    assert!(!a.has_requests_for(0));
    a.add_request(1, 0, 0, 0, 0);
    assert!(a.has_requests_for(0));
    a.clear();
    assert!(!a.has_requests_for(0));
}

#[test]
fn test_clear_preserves_rotation_but_drops_grants() {
    let mut a = round_robin(2, 2);
    a.add_request(0, 0, 0, 0, 0);
    a.allocate();
    assert_eq!(a.output_assigned(0), Some(0));
    a.clear();
    assert_eq!(a.output_assigned(0), None);
    assert_eq!(a.input_assigned(0), None);
}
