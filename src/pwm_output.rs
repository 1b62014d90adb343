//! A device abstraction for up to 16 PWM servo/ESC outputs.
//!
//! [`PwmOutput`] is the control surface: a `const`-constructible, `Sync`
//! wrapper around a [`PulseEngine`] that serializes every caller behind one
//! lock. Drive it with direct methods, with [`Command`]s (or their raw
//! [`ioctl`](PwmOutput::ioctl) codes), with bulk [`PwmOutputValues`] writes,
//! or through the latest-value [`PwmOutputTopic`](output_topic::PwmOutputTopic).
//!
//! The hardware sits behind [`TimerPort`]: on the Pico boards that is
//! `rp_timer_port::RpTimerPort`; host builds get
//! [`MockTimerPort`](mock_timer_port::MockTimerPort).
//!
//! # Example
//!
//! ```rust
//! use pwm_output_envoy::pwm_output::{
//!     PwmOutput, channel_table::ChannelMask, mock_timer_port::MockTimerPort,
//! };
//!
//! let (port, probe) = MockTimerPort::new();
//! let pwm_output = PwmOutput::new(port);
//!
//! pwm_output.initialize(ChannelMask::from_bits(0b0011))?;
//! pwm_output.set_channel(0, 1500)?; // staged; nothing is emitted yet
//! assert_eq!(probe.emitted_widths_us()[0], 0);
//!
//! pwm_output.arm()?;
//! assert_eq!(probe.emitted_widths_us()[0], 1500);
//! assert_eq!(pwm_output.get_channel(0)?, 1500);
//!
//! pwm_output.disarm()?;
//! assert_eq!(pwm_output.get_channel(0)?, 0);
//! # Ok::<(), pwm_output_envoy::Error>(())
//! ```

pub mod channel_table;
#[cfg(feature = "host")]
pub mod mock_timer_port;
pub mod output_topic;
pub mod output_values;
pub mod pulse_engine;
#[cfg(all(not(feature = "host"), any(feature = "pico1", feature = "pico2")))]
pub mod rp_timer_port;
pub mod timer_port;

use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use heapless::Vec;

use channel_table::{Channel, ChannelMask};
use output_values::PwmOutputValues;
use pulse_engine::{EngineState, PulseEngine, PwmOutputConfig};
use timer_port::TimerPort;

use crate::{Error, Result};

/// Number of addressable channels.
pub const MAX_CHANNELS: usize = 16;

/// Base of the PWM output control codes.
pub const PWM_SERVO_BASE: u32 = 0x2a00;
/// Control code: start emitting pulses.
pub const PWM_SERVO_ARM: u32 = PWM_SERVO_BASE;
/// Control code: stop emitting pulses.
pub const PWM_SERVO_DISARM: u32 = PWM_SERVO_BASE + 1;
/// Control code: change the update rate; the argument is the rate in Hz.
pub const PWM_SERVO_SET_UPDATE_RATE: u32 = PWM_SERVO_BASE + 2;

const SET_OFFSET: u32 = 0x20;
const GET_OFFSET: u32 = 0x40;

/// Control code that sets the width of `channel`; the argument is the width in µs.
///
/// Only meaningful for `channel < MAX_CHANNELS`; larger channels run into the
/// get range. [`Command::code`] checks this.
#[must_use]
pub const fn pwm_servo_set(channel: u8) -> u32 {
    PWM_SERVO_BASE + SET_OFFSET + channel as u32
}

/// Control code that reads the width of `channel`.
///
/// Only meaningful for `channel < MAX_CHANNELS`.
#[must_use]
pub const fn pwm_servo_get(channel: u8) -> u32 {
    PWM_SERVO_BASE + GET_OFFSET + channel as u32
}

/// One control operation, decoded.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    /// Start emitting pulses.
    Arm,
    /// Stop emitting pulses.
    Disarm,
    /// Change the update rate (Hz).
    SetUpdateRate(u32),
    /// Set one channel's pulse width.
    Set {
        /// Channel index.
        channel: u8,
        /// Pulse width in µs; 0 suppresses the channel.
        width_us: u16,
    },
    /// Read one channel's pulse width.
    Get {
        /// Channel index.
        channel: u8,
    },
}

impl Command {
    /// Decode a raw control code and its argument.
    ///
    /// A `Set` argument wider than 16 bits saturates; it is clamped to the
    /// period when applied anyway.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownCommand`] for codes outside the PWM output range,
    /// including set/get codes for channels past [`MAX_CHANNELS`].
    pub fn from_ioctl(cmd: u32, arg: u32) -> Result<Self> {
        let channels = MAX_CHANNELS as u32;
        match cmd.wrapping_sub(PWM_SERVO_BASE) {
            0 => Ok(Self::Arm),
            1 => Ok(Self::Disarm),
            2 => Ok(Self::SetUpdateRate(arg)),
            offset if (SET_OFFSET..SET_OFFSET + channels).contains(&offset) => Ok(Self::Set {
                channel: u8::try_from(offset - SET_OFFSET).map_err(|_| Error::UnknownCommand(cmd))?,
                width_us: u16::try_from(arg).unwrap_or(u16::MAX),
            }),
            offset if (GET_OFFSET..GET_OFFSET + channels).contains(&offset) => Ok(Self::Get {
                channel: u8::try_from(offset - GET_OFFSET).map_err(|_| Error::UnknownCommand(cmd))?,
            }),
            _ => Err(Error::UnknownCommand(cmd)),
        }
    }

    /// The raw control code for this command.
    ///
    /// `None` for a `Set` or `Get` on a channel past [`MAX_CHANNELS`], which
    /// has no code of its own.
    #[must_use]
    pub const fn code(self) -> Option<u32> {
        match self {
            Self::Arm => Some(PWM_SERVO_ARM),
            Self::Disarm => Some(PWM_SERVO_DISARM),
            Self::SetUpdateRate(_) => Some(PWM_SERVO_SET_UPDATE_RATE),
            Self::Set { channel, .. } if (channel as usize) < MAX_CHANNELS => {
                Some(pwm_servo_set(channel))
            }
            Self::Get { channel } if (channel as usize) < MAX_CHANNELS => {
                Some(pwm_servo_get(channel))
            }
            Self::Set { .. } | Self::Get { .. } => None,
        }
    }
}

/// A channel a bulk write could not apply, and why.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelFault {
    /// Channel index.
    pub channel: u8,
    /// Why the width was not applied.
    pub error: Error,
}

/// Outcome of a bulk write whose rate was accepted.
///
/// Channel writes are independent: a fault on one channel does not undo the
/// channels applied before it.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BulkWriteReport {
    applied: ChannelMask,
    faults: Vec<ChannelFault, MAX_CHANNELS>,
}

impl BulkWriteReport {
    /// Channels whose width was stored.
    #[must_use]
    pub const fn applied(&self) -> ChannelMask {
        self.applied
    }

    /// Channels whose width was rejected, lowest first.
    #[must_use]
    pub fn faults(&self) -> &[ChannelFault] {
        &self.faults
    }

    /// Whether every channel in the record was applied or skipped cleanly.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.faults.is_empty()
    }
}

impl TryFrom<u32> for ChannelMask {
    type Error = Error;

    /// Accept a 32-bit requested mask; channels past [`MAX_CHANNELS`] cannot be claimed.
    fn try_from(bits: u32) -> Result<Self> {
        Self::from_u32(bits).ok_or(Error::ResourceUnavailable)
    }
}

/// The PWM output device: a [`PulseEngine`] behind a critical-section lock.
///
/// Every method takes `&self` and holds the lock for one bounded engine call,
/// so a `static PwmOutput` can be shared by tasks, threads and interrupt
/// handlers. No operation waits for anything but the lock.
pub struct PwmOutput<P> {
    engine: Mutex<CriticalSectionRawMutex, RefCell<PulseEngine<P>>>,
}

impl<P: TimerPort> PwmOutput<P> {
    /// An uninitialized device around `port` with the default rate configuration.
    #[must_use]
    pub const fn new(port: P) -> Self {
        Self::with_config(port, PwmOutputConfig::new())
    }

    /// An uninitialized device around `port` with a custom rate configuration.
    #[must_use]
    pub const fn with_config(port: P, config: PwmOutputConfig) -> Self {
        Self {
            engine: Mutex::new(RefCell::new(PulseEngine::new(port, config))),
        }
    }

    fn with_engine<R>(&self, f: impl FnOnce(&mut PulseEngine<P>) -> R) -> R {
        self.engine.lock(|cell| f(&mut cell.borrow_mut()))
    }

    /// Claim the timer for `channel_mask`. See [`PulseEngine::initialize`].
    ///
    /// # Errors
    ///
    /// See [`PulseEngine::initialize`].
    pub fn initialize(&self, channel_mask: ChannelMask) -> Result<()> {
        self.with_engine(|engine| engine.initialize(channel_mask))
    }

    /// Release the timer. Safe in any state.
    pub fn deinitialize(&self) {
        self.with_engine(PulseEngine::deinitialize);
    }

    /// Start emitting pulses.
    ///
    /// # Errors
    ///
    /// [`Error::NotInitialized`] before `initialize`.
    pub fn arm(&self) -> Result<()> {
        self.with_engine(PulseEngine::arm)
    }

    /// Stop emitting pulses; see the [disarm caveat](PulseEngine#disarm-caveat).
    ///
    /// # Errors
    ///
    /// [`Error::NotInitialized`] before `initialize`.
    pub fn disarm(&self) -> Result<()> {
        self.with_engine(PulseEngine::disarm)
    }

    /// Change the update rate.
    ///
    /// # Errors
    ///
    /// See [`PulseEngine::set_rate`].
    pub fn set_rate(&self, rate_hz: u32) -> Result<()> {
        self.with_engine(|engine| engine.set_rate(rate_hz))
    }

    /// Set one channel's pulse width.
    ///
    /// # Errors
    ///
    /// See [`PulseEngine::set_channel`].
    pub fn set_channel(&self, channel: u8, width_us: u16) -> Result<()> {
        self.with_engine(|engine| engine.set_channel(channel, width_us))
    }

    /// Read one channel's pulse width: the stored width while armed, else 0.
    ///
    /// # Errors
    ///
    /// See [`PulseEngine::get_channel`].
    pub fn get_channel(&self, channel: u8) -> Result<u16> {
        self.with_engine(|engine| engine.get_channel(channel))
    }

    /// Run one decoded command. Returns the width for `Get`, 0 otherwise.
    ///
    /// # Errors
    ///
    /// Whatever the underlying operation returns.
    pub fn execute(&self, command: Command) -> Result<u16> {
        debug!("pwm command {}", command);
        match command {
            Command::Arm => self.arm().map(|()| 0),
            Command::Disarm => self.disarm().map(|()| 0),
            Command::SetUpdateRate(rate_hz) => self.set_rate(rate_hz).map(|()| 0),
            Command::Set { channel, width_us } => self.set_channel(channel, width_us).map(|()| 0),
            Command::Get { channel } => self.get_channel(channel),
        }
    }

    /// Decode and run a raw control code.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownCommand`] for unrecognized codes, else whatever the
    /// operation returns.
    pub fn ioctl(&self, cmd: u32, arg: u32) -> Result<u32> {
        let command = Command::from_ioctl(cmd, arg)?;
        self.execute(command).map(u32::from)
    }

    /// Apply a whole [`PwmOutputValues`] record under one lock acquisition.
    ///
    /// The rate goes first and gates the batch: if it is rejected, no width
    /// is touched. Then each channel is written in index order. A zero for an
    /// unconfigured channel is skipped; a non-zero value there is reported as
    /// [`Error::InvalidChannel`] in the returned [`BulkWriteReport`] without
    /// undoing the other channels.
    ///
    /// # Errors
    ///
    /// - [`Error::NotInitialized`] before `initialize`.
    /// - [`Error::UnsupportedRate`] or [`Error::Hardware`] if the rate is rejected.
    pub fn write(&self, values: &PwmOutputValues) -> Result<BulkWriteReport> {
        self.with_engine(|engine| {
            engine.set_rate(values.update_rate)?;

            let mask = engine.table().mask();
            let mut report = BulkWriteReport::default();
            for (channel, &width_us) in (0u8..).zip(values.values.iter()) {
                if width_us == 0 && !mask.contains(channel) {
                    continue;
                }
                match engine.set_channel(channel, width_us) {
                    Ok(()) => report.applied = report.applied.with(channel),
                    Err(err) => {
                        if report.faults.push(ChannelFault { channel, error: err }).is_err() {
                            error!("bulk write fault list full at channel {}", channel);
                        }
                    }
                }
            }
            Ok(report)
        })
    }

    /// Decode a postcard-encoded [`PwmOutputValues`] and [`write`](Self::write) it.
    ///
    /// # Errors
    ///
    /// [`Error::MalformedValues`] if the bytes do not decode, else as [`write`](Self::write).
    pub fn write_bytes(&self, bytes: &[u8]) -> Result<BulkWriteReport> {
        let values = PwmOutputValues::from_bytes(bytes)?;
        self.write(&values)
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> EngineState {
        self.with_engine(|engine| engine.state())
    }

    /// Current update rate in Hz (0 while uninitialized).
    #[must_use]
    pub fn update_rate_hz(&self) -> u32 {
        self.with_engine(|engine| engine.table().update_rate_hz())
    }

    /// Whether outputs are armed.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.with_engine(|engine| engine.table().is_armed())
    }

    /// The channel mask fixed at initialization (empty while uninitialized).
    #[must_use]
    pub fn channel_mask(&self) -> ChannelMask {
        self.with_engine(|engine| engine.table().mask())
    }

    /// A copy of one channel's table entry, or `None` past [`MAX_CHANNELS`].
    ///
    /// Unlike [`get_channel`](Self::get_channel) this shows the stored width
    /// even while disarmed.
    #[must_use]
    pub fn channel(&self, channel: u8) -> Option<Channel> {
        self.with_engine(|engine| engine.table().channel(channel).copied())
    }
}
