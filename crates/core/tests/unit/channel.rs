//! # Channel Tests
//!
//! Unit tests for the delay-line channel: latency semantics, the
//! single-item-per-tick contract, and idleness tracking.

use meshsim_core::channel::Channel;
use meshsim_core::common::InvariantError;

#[test]
fn test_channel_delivers_after_delay() {
    let mut ch: Channel<u32> = Channel::new(0, 2);
    ch.send(7, 0).unwrap();
    ch.write_outputs(0);

    ch.read_inputs(1);
    assert_eq!(ch.receive(), None);

    ch.read_inputs(2);
    assert_eq!(ch.receive(), Some(7));
}

#[test]
fn test_channel_never_delivers_early() {
    let mut ch: Channel<u32> = Channel::new(0, 5);
    ch.send(1, 10).unwrap();
    ch.write_outputs(10);
    for cycle in 11..15 {
        ch.read_inputs(cycle);
        assert_eq!(ch.receive(), None, "delivered early at cycle {cycle}");
    }
    ch.read_inputs(15);
    assert_eq!(ch.receive(), Some(1));
}

#[test]
fn test_channel_double_send_is_a_violation() {
    let mut ch: Channel<u32> = Channel::new(3, 1);
    ch.send(1, 0).unwrap();
    let err = ch.send(2, 0).unwrap_err();
    assert_eq!(err, InvariantError::ChannelOverrun { channel: 3, cycle: 0 });
}

#[test]
fn test_channel_one_item_per_tick() {
    let mut ch: Channel<u32> = Channel::new(0, 1);
    ch.send(1, 0).unwrap();
    ch.write_outputs(0);
    ch.send(2, 1).unwrap();
    ch.write_outputs(1);

    ch.read_inputs(1);
    assert_eq!(ch.receive(), Some(1));
    ch.read_inputs(2);
    assert_eq!(ch.receive(), Some(2));
}

#[test]
fn test_channel_zero_delay_is_promoted_to_one() {
    let ch: Channel<u32> = Channel::new(0, 0);
    assert_eq!(ch.delay(), 1);
}

#[test]
fn test_channel_idle_tracking() {
    let mut ch: Channel<u32> = Channel::new(0, 1);
    assert!(ch.is_idle());
    ch.send(9, 0).unwrap();
    assert!(!ch.is_idle());
    ch.write_outputs(0);
    assert!(!ch.is_idle());
    ch.read_inputs(1);
    assert!(!ch.is_idle());
    assert_eq!(ch.receive(), Some(9));
    assert!(ch.is_idle());
}

#[test]
fn test_channel_endpoints() {
    let mut ch: Channel<u32> = Channel::new(0, 1);
    ch.set_source(4, 0);
    ch.set_sink(5, 1);
    assert_eq!(ch.source(), Some((4, 0)));
    assert_eq!(ch.sink(), Some((5, 1)));
}
