//! The `pwm_output_values` record carried by bulk writes and the `output_pwm` topic.

use serde::{Deserialize, Serialize};

use super::MAX_CHANNELS;
use crate::{Error, Result};

/// Servo output value: pulse width in microseconds, 0 suppresses the channel.
pub type ServoPosition = u16;

/// Update rate plus one pulse width per channel, applied as one bulk write.
///
/// The same record is published on [`PwmOutputTopic`](super::output_topic::PwmOutputTopic)
/// or written as bytes with [`PwmOutput::write_bytes`](super::PwmOutput::write_bytes).
///
/// # Example
///
/// ```rust
/// use pwm_output_envoy::pwm_output::output_values::PwmOutputValues;
///
/// let values = PwmOutputValues::new(50).with_value(0, 1500).with_value(1, 1000);
/// let mut buffer = [0u8; PwmOutputValues::MAX_ENCODED_LEN];
/// let bytes = values.to_bytes(&mut buffer).expect("buffer holds any record");
/// assert_eq!(PwmOutputValues::from_bytes(bytes), Ok(values));
/// ```
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PwmOutputValues {
    /// Desired servo update rate in Hz.
    pub update_rate: u32,
    /// Desired pulse widths for each of the supported channels.
    pub values: [ServoPosition; MAX_CHANNELS],
}

impl PwmOutputValues {
    /// Largest postcard encoding of a record (varint `u32` + 16 varint `u16`).
    pub const MAX_ENCODED_LEN: usize = 5 + 3 * MAX_CHANNELS;

    /// A record at `update_rate` with every channel suppressed.
    #[must_use]
    pub const fn new(update_rate: u32) -> Self {
        Self {
            update_rate,
            values: [0; MAX_CHANNELS],
        }
    }

    /// This record with `channel` set to `width_us`. Out-of-range channels are ignored.
    #[must_use]
    pub fn with_value(mut self, channel: u8, width_us: ServoPosition) -> Self {
        if let Some(value) = self.values.get_mut(usize::from(channel)) {
            *value = width_us;
        }
        self
    }

    /// Encode into `buffer`, returning the used prefix.
    ///
    /// # Errors
    ///
    /// [`Error::MalformedValues`] if `buffer` is shorter than the encoding;
    /// a buffer of [`MAX_ENCODED_LEN`](Self::MAX_ENCODED_LEN) bytes always fits.
    pub fn to_bytes<'b>(&self, buffer: &'b mut [u8]) -> Result<&'b mut [u8]> {
        postcard::to_slice(self, buffer).map_err(|_| Error::MalformedValues)
    }

    /// Decode a record written to the device.
    ///
    /// # Errors
    ///
    /// [`Error::MalformedValues`] if the bytes are not a complete record.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        postcard::from_bytes(bytes).map_err(|_| Error::MalformedValues)
    }
}
