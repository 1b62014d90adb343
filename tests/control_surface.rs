#![allow(missing_docs)]
//! Host-level tests for the control surface: commands, control codes and bulk writes.

use pwm_output_envoy::Error;
use pwm_output_envoy::pwm_output::channel_table::ChannelMask;
use pwm_output_envoy::pwm_output::mock_timer_port::{MockTimerPort, MockTimerProbe};
use pwm_output_envoy::pwm_output::output_values::PwmOutputValues;
use pwm_output_envoy::pwm_output::pulse_engine::EngineState;
use pwm_output_envoy::pwm_output::{
    ChannelFault, Command, MAX_CHANNELS, PWM_SERVO_ARM, PWM_SERVO_BASE, PWM_SERVO_DISARM,
    PWM_SERVO_SET_UPDATE_RATE, PwmOutput, pwm_servo_get, pwm_servo_set,
};

fn armed_output(bits: u16) -> (PwmOutput<MockTimerPort>, MockTimerProbe) {
    let (port, probe) = MockTimerPort::new();
    let output = PwmOutput::new(port);
    output.initialize(ChannelMask::from_bits(bits)).unwrap();
    output.arm().unwrap();
    (output, probe)
}

fn stored_width(output: &PwmOutput<MockTimerPort>, channel: u8) -> u16 {
    output.channel(channel).unwrap().pulse_width_us()
}

#[test]
fn control_codes_match_the_servo_protocol() {
    assert_eq!(PWM_SERVO_BASE, 0x2a00);
    assert_eq!(PWM_SERVO_ARM, 0x2a00);
    assert_eq!(PWM_SERVO_DISARM, 0x2a01);
    assert_eq!(PWM_SERVO_SET_UPDATE_RATE, 0x2a02);
    assert_eq!(pwm_servo_set(0), 0x2a20);
    assert_eq!(pwm_servo_set(15), 0x2a2f);
    assert_eq!(pwm_servo_get(0), 0x2a40);
    assert_eq!(pwm_servo_get(15), 0x2a4f);
}

#[test]
fn from_ioctl_decodes_every_command() {
    assert_eq!(Command::from_ioctl(PWM_SERVO_ARM, 0), Ok(Command::Arm));
    assert_eq!(Command::from_ioctl(PWM_SERVO_DISARM, 0), Ok(Command::Disarm));
    assert_eq!(
        Command::from_ioctl(PWM_SERVO_SET_UPDATE_RATE, 200),
        Ok(Command::SetUpdateRate(200))
    );
    assert_eq!(
        Command::from_ioctl(pwm_servo_set(7), 1500),
        Ok(Command::Set {
            channel: 7,
            width_us: 1500
        })
    );
    assert_eq!(
        Command::from_ioctl(pwm_servo_get(15), 0),
        Ok(Command::Get { channel: 15 })
    );
}

#[test]
fn from_ioctl_saturates_wide_set_arguments() {
    assert_eq!(
        Command::from_ioctl(pwm_servo_set(3), 70_000),
        Ok(Command::Set {
            channel: 3,
            width_us: u16::MAX
        })
    );
}

#[test]
fn from_ioctl_rejects_unknown_codes() {
    for cmd in [0, 0x1234, 0x29ff, 0x2a03, 0x2a1f, 0x2a30, 0x2a3f, 0x2a50, u32::MAX] {
        assert_eq!(Command::from_ioctl(cmd, 0), Err(Error::UnknownCommand(cmd)));
    }
}

#[test]
fn command_code_inverts_from_ioctl() {
    for command in [
        Command::Arm,
        Command::Disarm,
        Command::SetUpdateRate(100),
        Command::Set {
            channel: 4,
            width_us: 1200,
        },
        Command::Get { channel: 9 },
    ] {
        let arg = match command {
            Command::SetUpdateRate(rate_hz) => rate_hz,
            Command::Set { width_us, .. } => u32::from(width_us),
            _ => 0,
        };
        let code = command.code().expect("in-range command has a code");
        assert_eq!(Command::from_ioctl(code, arg), Ok(command));
    }
}

#[test]
fn command_past_last_channel_has_no_code() {
    let set = Command::Set {
        channel: MAX_CHANNELS as u8 * 2,
        width_us: 1500,
    };
    assert_eq!(set.code(), None);
    assert_eq!(Command::Get { channel: 16 }.code(), None);
    assert_ne!(set.code(), Some(pwm_servo_get(0)));
    assert_eq!(Command::Get { channel: 15 }.code(), Some(pwm_servo_get(15)));
}

#[test]
fn ioctl_drives_the_device() {
    let (port, probe) = MockTimerPort::new();
    let output = PwmOutput::new(port);
    output.initialize(ChannelMask::from_bits(0b0001)).unwrap();

    assert_eq!(output.ioctl(pwm_servo_set(0), 1500), Ok(0));
    assert_eq!(output.ioctl(pwm_servo_get(0), 0), Ok(0));
    assert_eq!(output.ioctl(PWM_SERVO_ARM, 0), Ok(0));
    assert_eq!(output.ioctl(pwm_servo_get(0), 0), Ok(1500));
    assert_eq!(probe.emitted_widths_us()[0], 1500);

    assert_eq!(output.ioctl(PWM_SERVO_SET_UPDATE_RATE, 100), Ok(0));
    assert_eq!(output.update_rate_hz(), 100);
    assert_eq!(
        output.ioctl(PWM_SERVO_SET_UPDATE_RATE, 75),
        Err(Error::UnsupportedRate(75))
    );
    assert_eq!(output.update_rate_hz(), 100);

    assert_eq!(output.ioctl(pwm_servo_get(1), 0), Err(Error::InvalidChannel(1)));
    assert_eq!(output.ioctl(0x2a10, 0), Err(Error::UnknownCommand(0x2a10)));

    assert_eq!(output.ioctl(PWM_SERVO_DISARM, 0), Ok(0));
    assert!(!output.is_armed());
    assert!(!probe.output_enabled());
}

#[test]
fn execute_returns_width_for_get_only() {
    let (output, _probe) = armed_output(0b0011);

    assert_eq!(
        output.execute(Command::Set {
            channel: 1,
            width_us: 1100
        }),
        Ok(0)
    );
    assert_eq!(output.execute(Command::Get { channel: 1 }), Ok(1100));
}

#[test]
fn snapshots_follow_the_lifecycle() {
    let (port, _probe) = MockTimerPort::new();
    let output = PwmOutput::new(port);
    assert_eq!(output.state(), EngineState::Uninitialized);
    assert_eq!(output.update_rate_hz(), 0);
    assert_eq!(output.channel_mask(), ChannelMask::EMPTY);

    output.initialize(ChannelMask::from_bits(0b0101)).unwrap();
    output.set_channel(2, 1700).unwrap();
    assert_eq!(output.state(), EngineState::Initialized);
    assert_eq!(output.channel_mask(), ChannelMask::from_bits(0b0101));
    assert_eq!(output.update_rate_hz(), 50);

    let channel = output.channel(2).unwrap();
    assert!(channel.is_configured());
    assert_eq!(channel.pulse_width_us(), 1700);
    assert_eq!(output.get_channel(2), Ok(0));
    assert!(output.channel(16).is_none());

    output.arm().unwrap();
    assert_eq!(output.state(), EngineState::Armed);
    assert!(output.is_armed());

    output.deinitialize();
    assert_eq!(output.state(), EngineState::Uninitialized);
}

#[test]
fn requested_mask_wider_than_sixteen_channels_is_unavailable() {
    assert_eq!(ChannelMask::try_from(0b11u32), Ok(ChannelMask::from_bits(0b11)));
    assert_eq!(ChannelMask::try_from(0x1_0000u32), Err(Error::ResourceUnavailable));
}

#[test]
fn bulk_write_applies_rate_then_widths() {
    let (output, probe) = armed_output(0b0011);
    let values = PwmOutputValues::new(100).with_value(0, 1500).with_value(1, 1000);

    let report = output.write(&values).unwrap();

    assert!(report.is_clean());
    assert_eq!(report.applied(), ChannelMask::from_bits(0b0011));
    assert_eq!(output.update_rate_hz(), 100);
    assert_eq!(probe.rate_hz(), 100);
    assert_eq!(output.get_channel(0), Ok(1500));
    assert_eq!(output.get_channel(1), Ok(1000));
    assert_eq!(&probe.emitted_widths_us()[..2], &[1500, 1000]);
}

#[test]
fn bulk_write_with_invalid_rate_touches_no_width() {
    let (output, probe) = armed_output(0b0011);
    output.set_channel(0, 1200).unwrap();
    output.set_channel(1, 1300).unwrap();
    let writes = probe.width_writes();

    let values = PwmOutputValues::new(75).with_value(0, 1500).with_value(1, 1000);
    assert_eq!(output.write(&values), Err(Error::UnsupportedRate(75)));

    assert_eq!(output.update_rate_hz(), 50);
    assert_eq!(stored_width(&output, 0), 1200);
    assert_eq!(stored_width(&output, 1), 1300);
    assert_eq!(probe.width_writes(), writes);
}

#[test]
fn bulk_write_reports_faults_without_rolling_back() {
    let (output, _probe) = armed_output(0b0011);
    let values = PwmOutputValues::new(50)
        .with_value(0, 1500)
        .with_value(5, 1200)
        .with_value(1, 1000);

    let report = output.write(&values).unwrap();

    assert!(!report.is_clean());
    assert_eq!(
        report.faults(),
        &[ChannelFault {
            channel: 5,
            error: Error::InvalidChannel(5)
        }]
    );
    assert_eq!(report.applied(), ChannelMask::from_bits(0b0011));
    assert_eq!(output.get_channel(0), Ok(1500));
    assert_eq!(output.get_channel(1), Ok(1000));
}

#[test]
fn bulk_write_zero_on_unconfigured_channel_is_skipped() {
    let (output, _probe) = armed_output(0b0001);

    let report = output.write(&PwmOutputValues::new(50).with_value(0, 900)).unwrap();

    assert!(report.is_clean());
    assert_eq!(report.applied(), ChannelMask::from_bits(0b0001));
}

#[test]
fn bulk_write_while_disarmed_stages_widths() {
    let (port, probe) = MockTimerPort::new();
    let output = PwmOutput::new(port);
    output.initialize(ChannelMask::from_bits(0b0001)).unwrap();

    output.write(&PwmOutputValues::new(50).with_value(0, 1600)).unwrap();
    assert_eq!(output.get_channel(0), Ok(0));
    assert_eq!(probe.emitted_widths_us()[0], 0);

    output.arm().unwrap();
    assert_eq!(output.get_channel(0), Ok(1600));
}

#[test]
fn bulk_write_before_initialize_is_not_initialized() {
    let (port, _probe) = MockTimerPort::new();
    let output = PwmOutput::new(port);

    assert_eq!(
        output.write(&PwmOutputValues::new(50).with_value(0, 1500)),
        Err(Error::NotInitialized)
    );
}

#[test]
fn write_bytes_decodes_and_applies() {
    let (output, _probe) = armed_output(0b0011);
    let values = PwmOutputValues::new(200).with_value(1, 1750);
    let mut buffer = [0u8; PwmOutputValues::MAX_ENCODED_LEN];
    let bytes = values.to_bytes(&mut buffer).unwrap();

    let report = output.write_bytes(bytes).unwrap();

    assert!(report.is_clean());
    assert_eq!(output.update_rate_hz(), 200);
    assert_eq!(output.get_channel(1), Ok(1750));
}

#[test]
fn write_bytes_rejects_malformed_input_before_touching_state() {
    let (output, _probe) = armed_output(0b0011);
    output.set_channel(0, 1500).unwrap();

    assert_eq!(output.write_bytes(&[]), Err(Error::MalformedValues));
    assert_eq!(output.write_bytes(&[50, 0xff, 0xff]), Err(Error::MalformedValues));

    assert_eq!(output.update_rate_hz(), 50);
    assert_eq!(output.get_channel(0), Ok(1500));
}

#[test]
fn encoding_into_a_short_buffer_fails() {
    let values = PwmOutputValues::new(50).with_value(0, 1500);
    let mut buffer = [0u8; 4];
    assert_eq!(values.to_bytes(&mut buffer).map(|bytes| bytes.len()), Err(Error::MalformedValues));
}
