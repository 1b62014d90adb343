#![allow(missing_docs)]
//! Stress test: callers on different threads share one `PwmOutput`.

use std::thread;

use pwm_output_envoy::pwm_output::channel_table::{ChannelMask, max_pulse_width_us};
use pwm_output_envoy::pwm_output::mock_timer_port::MockTimerPort;
use pwm_output_envoy::pwm_output::{MAX_CHANNELS, PwmOutput};

const WRITERS: u8 = 8;
const ITERATIONS: u16 = 2_000;

fn width_for(channel: u8, iteration: u16) -> u16 {
    1_000 + (u16::from(channel) * 37 + iteration) % 1_000
}

#[test]
fn disjoint_channel_writers_never_lose_updates() {
    let (port, probe) = MockTimerPort::new();
    let output = PwmOutput::new(port);
    output.initialize(ChannelMask::ALL).unwrap();
    output.arm().unwrap();
    let writes_before = probe.width_writes();

    thread::scope(|scope| {
        // Each writer owns two channels: 2w and 2w + 1.
        for writer in 0..WRITERS {
            let output = &output;
            scope.spawn(move || {
                for iteration in 0..ITERATIONS {
                    for channel in [writer * 2, writer * 2 + 1] {
                        output.set_channel(channel, width_for(channel, iteration)).unwrap();
                    }
                }
            });
        }

        // A reader that only ever sees widths some writer actually wrote.
        let output = &output;
        scope.spawn(move || {
            for _ in 0..ITERATIONS {
                for channel in 0..MAX_CHANNELS as u8 {
                    let width_us = output.get_channel(channel).unwrap();
                    assert!(width_us == 0 || (1_000..2_000).contains(&width_us));
                }
            }
        });
    });

    for channel in 0..MAX_CHANNELS as u8 {
        let expected = width_for(channel, ITERATIONS - 1);
        assert_eq!(output.get_channel(channel), Ok(expected));
        assert_eq!(output.channel(channel).unwrap().pulse_width_us(), expected);
        assert_eq!(probe.width_us(channel), expected);
    }
    assert_eq!(
        probe.width_writes() - writes_before,
        u32::from(WRITERS) * 2 * u32::from(ITERATIONS)
    );
}

#[test]
fn arm_toggling_does_not_disturb_stored_widths() {
    let (port, probe) = MockTimerPort::new();
    let output = PwmOutput::new(port);
    output.initialize(ChannelMask::from_bits(0x00ff)).unwrap();

    thread::scope(|scope| {
        let output = &output;
        scope.spawn(move || {
            for _ in 0..ITERATIONS {
                output.arm().unwrap();
                output.disarm().unwrap();
            }
        });
        for writer in 0..4u8 {
            scope.spawn(move || {
                for iteration in 0..ITERATIONS {
                    for channel in [writer * 2, writer * 2 + 1] {
                        output.set_channel(channel, width_for(channel, iteration)).unwrap();
                    }
                }
            });
        }
        scope.spawn(move || {
            for _ in 0..ITERATIONS {
                let rate_hz = output.update_rate_hz();
                assert_eq!(rate_hz, 50);
                assert!(max_pulse_width_us(rate_hz) >= 2_000);
            }
        });
    });

    assert!(!output.is_armed());
    output.arm().unwrap();
    for channel in 0..8u8 {
        let expected = width_for(channel, ITERATIONS - 1);
        assert_eq!(output.get_channel(channel), Ok(expected));
        assert_eq!(probe.emitted_widths_us()[usize::from(channel)], expected);
    }
}
