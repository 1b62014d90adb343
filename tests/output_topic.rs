#![allow(missing_docs)]
//! Host-level tests for the `output_pwm` topic and its device loop.

use embassy_futures::block_on;
use embassy_futures::select::{Either, select};
use pwm_output_envoy::Error;
use pwm_output_envoy::pwm_output::PwmOutput;
use pwm_output_envoy::pwm_output::channel_table::ChannelMask;
use pwm_output_envoy::pwm_output::mock_timer_port::MockTimerPort;
use pwm_output_envoy::pwm_output::output_topic::{PwmOutputTopic, device_loop};
use pwm_output_envoy::pwm_output::output_values::PwmOutputValues;

fn armed_output() -> PwmOutput<MockTimerPort> {
    let (port, _probe) = MockTimerPort::new();
    let output = PwmOutput::new(port);
    output.initialize(ChannelMask::from_bits(0b0011)).unwrap();
    output.arm().unwrap();
    output
}

#[test]
fn apply_next_bulk_writes_the_published_record() {
    let topic = PwmOutputTopic::new();
    let output = armed_output();

    topic.publish(PwmOutputValues::new(100).with_value(0, 1500));
    let report = block_on(topic.apply_next(&output)).unwrap();

    assert!(report.is_clean());
    assert_eq!(output.update_rate_hz(), 100);
    assert_eq!(output.get_channel(0), Ok(1500));
}

#[test]
fn latest_record_wins() {
    let topic = PwmOutputTopic::new();
    let output = armed_output();

    topic.publish(PwmOutputValues::new(50).with_value(0, 1100));
    topic.publish(PwmOutputValues::new(50).with_value(0, 1200));
    topic.publish(PwmOutputValues::new(50).with_value(0, 1300));
    assert_eq!(topic.superseded(), 2);

    block_on(topic.apply_next(&output)).unwrap();
    assert_eq!(output.get_channel(0), Ok(1300));
    assert!(topic.try_apply(&output).is_none());
}

#[test]
fn consumed_records_are_not_counted_as_superseded() {
    let topic = PwmOutputTopic::new();
    let output = armed_output();

    topic.publish(PwmOutputValues::new(50).with_value(1, 1000));
    assert!(topic.try_apply(&output).is_some());
    topic.publish(PwmOutputValues::new(50).with_value(1, 1100));
    assert!(topic.try_apply(&output).is_some());

    assert_eq!(topic.superseded(), 0);
    assert_eq!(output.get_channel(1), Ok(1100));
}

#[test]
fn rejected_record_leaves_widths_alone() {
    let topic = PwmOutputTopic::new();
    let output = armed_output();
    output.set_channel(0, 1500).unwrap();

    topic.publish(PwmOutputValues::new(75).with_value(0, 1000));
    assert_eq!(
        topic.try_apply(&output),
        Some(Err(Error::UnsupportedRate(75)))
    );
    assert_eq!(output.get_channel(0), Ok(1500));
}

#[test]
fn device_loop_applies_pending_record_then_waits() {
    static TOPIC: PwmOutputTopic = PwmOutputTopic::new();
    let output = armed_output();

    TOPIC.publish(PwmOutputValues::new(200).with_value(0, 1400).with_value(9, 1000));

    // The loop drains the pending record on its first poll, then parks on the topic.
    let outcome = block_on(select(device_loop(&TOPIC, &output), core::future::ready(())));

    assert!(matches!(outcome, Either::Second(())));
    assert_eq!(output.update_rate_hz(), 200);
    assert_eq!(output.get_channel(0), Ok(1400));
}
