//! Errors returned by the PWM output driver.

use derive_more::{Display, Error, From};

use crate::pwm_output::timer_port::HardwareError;

/// Result type for the PWM output driver.
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Errors returned by [`PwmOutput`](crate::pwm_output::PwmOutput) and
/// [`PulseEngine`](crate::pwm_output::pulse_engine::PulseEngine).
///
/// Every error is returned synchronously to the caller. Nothing is retried and
/// invalid input never panics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Error, From)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// `initialize` was called while the driver was already initialized.
    #[display("PWM output already initialized")]
    AlreadyInitialized,

    /// The driver has not been initialized (or was deinitialized).
    #[display("PWM output not initialized")]
    NotInitialized,

    /// The timer hardware for the requested channel mask could not be claimed.
    ///
    /// Recoverable: release the conflicting claim and call `initialize` again.
    #[display("PWM timer resources unavailable")]
    ResourceUnavailable,

    /// The update rate is not in the supported rate set.
    #[display("unsupported PWM update rate {_0} Hz")]
    UnsupportedRate(#[error(not(source))] u32),

    /// The channel is out of range or not in the configured channel mask.
    #[display("invalid PWM channel {_0}")]
    InvalidChannel(#[error(not(source))] u8),

    /// An ioctl command code outside the PWM servo protocol.
    #[display("unknown PWM servo command {_0:#06x}")]
    UnknownCommand(#[error(not(source))] u32),

    /// Bytes written to the device did not decode to a `PwmOutputValues` record.
    #[display("malformed pwm_output_values record")]
    MalformedValues,

    /// Opaque fault from the hardware timer port.
    #[display("PWM hardware error: {_0}")]
    #[from]
    Hardware(HardwareError),
}
