//! The hardware timer port: the only seam between the pulse engine and a PWM peripheral.
//!
//! A port programs a repeating period and, for each of up to
//! [`MAX_CHANNELS`](super::MAX_CHANNELS) channels, a pulse width within that
//! period. Concrete peripherals implement [`TimerPort`]; the pulse engine never
//! touches registers directly.

use derive_more::{Display, Error};

use super::channel_table::ChannelMask;

/// Faults reported by a [`TimerPort`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HardwareError {
    /// One or more channels are already claimed by another subsystem.
    #[display("timer channels already claimed")]
    AlreadyClaimed,
    /// The channel mask names outputs this platform does not have.
    #[display("channel mask not supported by this platform")]
    UnsupportedMask,
    /// The timer cannot produce the requested period.
    #[display("timer cannot produce the requested rate")]
    RateOutOfRange,
    /// Any other lower-layer fault.
    #[display("timer fault")]
    Fault,
}

/// Capability set the pulse engine needs from a PWM timer peripheral.
///
/// Implementations must apply period and width changes at a cycle boundary so
/// that a pulse in flight is never truncated by a reprogram.
pub trait TimerPort {
    /// Whether [`enable_output(false)`](Self::enable_output) lets a pulse that is
    /// already being emitted finish before output stops.
    ///
    /// Ports that cannot promise this leave the default `false`; disarm on such
    /// hardware may cut a pulse short.
    const COMPLETES_PULSE_ON_DISABLE: bool = false;

    /// Claim the timer resources for `channel_mask`.
    ///
    /// # Errors
    ///
    /// [`HardwareError::AlreadyClaimed`] if another subsystem owns one of the
    /// channels, [`HardwareError::UnsupportedMask`] if the mask names outputs the
    /// platform does not have.
    fn configure(&mut self, channel_mask: ChannelMask) -> Result<(), HardwareError>;

    /// Return all claimed resources to the platform. Calling it again is a no-op.
    fn release(&mut self);

    /// Change the pulse repetition rate, effective no earlier than the next cycle.
    ///
    /// # Errors
    ///
    /// [`HardwareError::RateOutOfRange`] if the timer cannot produce the period.
    fn set_rate(&mut self, rate_hz: u32) -> Result<(), HardwareError>;

    /// Program the pulse width for `channel`, effective from the next cycle.
    ///
    /// A width of 0 suppresses the pulse without giving up the channel's slot.
    fn set_channel_width(&mut self, channel: u8, width_us: u16);

    /// Start or stop pulse emission on every claimed channel.
    fn enable_output(&mut self, enabled: bool);
}
