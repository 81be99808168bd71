//! # Buffer Tests
//!
//! Unit tests for the receive-side VC buffers and the downstream mirror:
//! the VC state machine, credit conservation, and reservation ownership.

use meshsim_core::buffer::{Buffer, BufferState, VcState};
use meshsim_core::common::InvariantError;
use meshsim_core::message::{Credit, Flit};

fn head_flit(id: u64, vc: usize) -> Flit {
    let mut f = Flit::new(id, 0, 0, 1);
    f.head = true;
    f.vc = Some(vc);
    f
}

fn tail_flit(id: u64, vc: usize) -> Flit {
    let mut f = Flit::new(id, 0, 0, 1);
    f.tail = true;
    f.vc = Some(vc);
    f
}

#[test]
fn test_vc_starts_idle_and_empty() {
    let buf = Buffer::new(0, 0, 4, 4);
    for vc in 0..4 {
        assert_eq!(buf.state(vc), VcState::Idle);
        assert!(buf.is_empty(vc));
    }
}

#[test]
fn test_head_arrival_then_routing() {
    let mut buf = Buffer::new(0, 0, 2, 4);
    buf.add(0, head_flit(1, 0), 0).unwrap();
    buf.set_state(0, VcState::Routing, 0).unwrap();
    assert_eq!(buf.state(0), VcState::Routing);
    assert!(!buf.is_empty(0));
}

#[test]
fn test_body_flit_at_idle_vc_is_a_violation() {
    let mut buf = Buffer::new(3, 1, 2, 4);
    let mut body = Flit::new(9, 0, 0, 1);
    body.vc = Some(0);
    let err = buf.add(0, body, 5).unwrap_err();
    assert!(matches!(
        err,
        InvariantError::BadFlit { router: 3, port: 1, vc: 0, cycle: 5, .. }
    ));
}

#[test]
fn test_buffer_overflow_is_a_violation() {
    let mut buf = Buffer::new(0, 0, 1, 2);
    buf.add(0, head_flit(0, 0), 0).unwrap();
    buf.add(0, head_flit(1, 0), 0).unwrap();
    let err = buf.add(0, head_flit(2, 0), 0).unwrap_err();
    assert!(matches!(err, InvariantError::BufferOverflow { .. }));
}

#[test]
fn test_illegal_vc_transition_is_rejected() {
    let mut buf = Buffer::new(0, 0, 1, 4);
    buf.add(0, head_flit(1, 0), 0).unwrap();
    buf.set_state(0, VcState::Routing, 0).unwrap();
    // Routing can only advance to vc-alloc.
    let err = buf.set_state(0, VcState::Active, 1).unwrap_err();
    assert!(matches!(
        err,
        InvariantError::IllegalVcTransition { from: "routing", to: "active", .. }
    ));
}

#[test]
fn test_vc_transition_cycle_through_packet() {
    let mut buf = Buffer::new(0, 0, 1, 4);
    buf.add(0, head_flit(1, 0), 0).unwrap();
    buf.set_state(0, VcState::Routing, 0).unwrap();
    buf.set_state(0, VcState::VcAlloc, 1).unwrap();
    buf.set_state(0, VcState::Active, 2).unwrap();
    let _ = buf.remove(0);
    buf.set_state(0, VcState::Idle, 3).unwrap();
    assert!(buf.all_idle());
}

#[test]
fn test_recovery_transition_back_to_routing() {
    let mut buf = Buffer::new(0, 0, 1, 4);
    buf.add(0, head_flit(1, 0), 0).unwrap();
    buf.set_state(0, VcState::Routing, 0).unwrap();
    buf.set_state(0, VcState::VcAlloc, 1).unwrap();
    // The stall watchdog path.
    buf.set_state(0, VcState::Routing, 2).unwrap();
    assert_eq!(buf.state(0), VcState::Routing);
}

#[test]
fn test_mirror_credit_conservation() {
    let mut bs = BufferState::new(0, 0, 2, 3, false);
    assert!(bs.is_empty_for(0));

    for id in 0..3 {
        bs.sending_flit(&head_flit(id, 0), 0).unwrap();
    }
    assert!(bs.is_full_for(0));
    assert_eq!(bs.free_slots_for(0), 0);

    // A fourth reservation overflows.
    let err = bs.sending_flit(&head_flit(3, 0), 1).unwrap_err();
    assert!(matches!(err, InvariantError::BufferOverflow { .. }));

    bs.process_credit(&Credit::for_vc(0), 2).unwrap();
    assert!(!bs.is_full_for(0));
    bs.process_credit(&Credit::for_vc(0), 3).unwrap();
    bs.process_credit(&Credit::for_vc(0), 4).unwrap();
    assert!(bs.is_empty_for(0));

    // Occupancy never goes negative.
    let err = bs.process_credit(&Credit::for_vc(0), 5).unwrap_err();
    assert!(matches!(err, InvariantError::CreditUnderflow { .. }));
}

#[test]
fn test_mirror_take_and_return() {
    let mut bs = BufferState::new(0, 0, 2, 4, false);
    assert!(bs.is_available_for(1));
    bs.take_buffer(1, 7, 0).unwrap();
    assert!(!bs.is_available_for(1));
    assert_eq!(bs.used_by(1), Some(7));

    // A competing reservation is a double booking.
    let err = bs.take_buffer(1, 9, 1).unwrap_err();
    assert!(matches!(err, InvariantError::VcDoubleBooked { by: 9, owner: 7, .. }));

    bs.return_buffer(1);
    assert!(bs.is_available_for(1));
}

#[test]
fn test_mirror_tail_releases_immediately_without_tail_credit_wait() {
    let mut bs = BufferState::new(0, 0, 1, 4, false);
    bs.take_buffer(0, 3, 0).unwrap();
    bs.sending_flit(&tail_flit(1, 0), 0).unwrap();
    assert!(bs.is_available_for(0));
}

#[test]
fn test_mirror_tail_credit_wait_holds_reservation() {
    let mut bs = BufferState::new(0, 0, 1, 4, true);
    bs.take_buffer(0, 3, 0).unwrap();
    bs.sending_flit(&head_flit(0, 0), 0).unwrap();
    bs.sending_flit(&tail_flit(1, 0), 1).unwrap();
    assert!(!bs.is_available_for(0));

    bs.process_credit(&Credit::for_vc(0), 2).unwrap();
    assert!(!bs.is_available_for(0), "released before the tail credit");
    bs.process_credit(&Credit::for_vc(0), 3).unwrap();
    assert!(bs.is_available_for(0), "tail credit must release the VC");
}

#[test]
fn test_mirror_clear_and_full_credits() {
    let mut bs = BufferState::new(0, 0, 2, 4, false);
    bs.sending_flit(&head_flit(0, 0), 0).unwrap();

    bs.clear_credits();
    for vc in 0..2 {
        assert!(bs.is_full_for(vc));
        assert!(bs.is_available_for(vc));
    }

    bs.full_credits();
    for vc in 0..2 {
        assert!(bs.is_empty_for(vc));
        assert!(bs.is_available_for(vc));
    }
}

#[test]
fn test_mirror_one_slot_latch_resize() {
    let mut bs = BufferState::new(0, 0, 2, 4, false);
    bs.set_vc_buf_size(1);
    bs.sending_flit(&head_flit(0, 0), 0).unwrap();
    assert!(bs.is_full_for(0));
}
