//! The authoritative per-channel state behind the pulse engine.
//!
//! See [`ChannelTable`].

use super::MAX_CHANNELS;
use crate::{Error, Result};

/// Bitmask of managed channels, bit `i` ↔ channel `i`.
///
/// Fixed at initialization and never changed while the driver is initialized.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelMask(u16);

impl ChannelMask {
    /// No channels.
    pub const EMPTY: Self = Self(0);

    /// All [`MAX_CHANNELS`] channels.
    pub const ALL: Self = Self(u16::MAX);

    /// Create a mask from its raw bits.
    #[must_use]
    pub const fn from_bits(bits: u16) -> Self {
        Self(bits)
    }

    /// Create a mask from a 32-bit protocol value (LSB = channel 0).
    ///
    /// Returns `None` if any bit at or above [`MAX_CHANNELS`] is set.
    #[must_use]
    pub const fn from_u32(bits: u32) -> Option<Self> {
        if bits > u16::MAX as u32 {
            None
        } else {
            Some(Self(bits as u16))
        }
    }

    /// Raw bits.
    #[must_use]
    pub const fn bits(self) -> u16 {
        self.0
    }

    /// Whether `channel` is in the mask. Channels at or above [`MAX_CHANNELS`] never are.
    #[must_use]
    pub const fn contains(self, channel: u8) -> bool {
        match self.0.checked_shr(channel as u32) {
            Some(shifted) => shifted & 1 == 1,
            None => false,
        }
    }

    /// This mask with `channel` added. Out-of-range channels are ignored.
    #[must_use]
    pub const fn with(self, channel: u8) -> Self {
        match 1u16.checked_shl(channel as u32) {
            Some(bit) => Self(self.0 | bit),
            None => self,
        }
    }

    /// Whether the two masks share any channel.
    #[must_use]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Number of channels in the mask.
    #[must_use]
    pub const fn len(self) -> u32 {
        self.0.count_ones()
    }

    /// Whether the mask is empty.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Channel indices in the mask, lowest first.
    pub fn iter(self) -> impl Iterator<Item = u8> {
        (0..MAX_CHANNELS as u8).filter(move |&channel| self.contains(channel))
    }
}

impl FromIterator<u8> for ChannelMask {
    fn from_iter<I: IntoIterator<Item = u8>>(iter: I) -> Self {
        iter.into_iter().fold(Self::EMPTY, Self::with)
    }
}

/// Widest pulse (µs) that fits in one period at `rate_hz`.
///
/// One microsecond short of the full period so that a pulse always ends
/// before the next one starts.
#[must_use]
pub const fn max_pulse_width_us(rate_hz: u32) -> u16 {
    let Some(period_us) = 1_000_000u32.checked_div(rate_hz) else {
        return 0;
    };
    let max = period_us.saturating_sub(1);
    if max > u16::MAX as u32 {
        u16::MAX
    } else {
        max as u16
    }
}

/// One PWM output line as seen by the driver.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Channel {
    configured: bool,
    pulse_width_us: u16,
    last_commanded_width_us: u16,
}

impl Channel {
    const UNCONFIGURED: Self = Self {
        configured: false,
        pulse_width_us: 0,
        last_commanded_width_us: 0,
    };

    /// Whether this index maps to an enabled output (is in the channel mask).
    #[must_use]
    pub const fn is_configured(&self) -> bool {
        self.configured
    }

    /// Programmed pulse width in µs; 0 means the pulse is suppressed.
    ///
    /// Held even while disarmed, so re-arming resumes at this width.
    #[must_use]
    pub const fn pulse_width_us(&self) -> u16 {
        self.pulse_width_us
    }

    /// Most recent non-zero width commanded for this channel.
    #[must_use]
    pub const fn last_commanded_width_us(&self) -> u16 {
        self.last_commanded_width_us
    }
}

/// Per-channel widths plus the global update rate and armed flag.
///
/// Owned by the [`PulseEngine`](super::pulse_engine::PulseEngine). Invariants:
/// `pulse_width_us` of every channel is 0 or at most
/// [`max_pulse_width_us`] for the current rate, and only channels in the mask
/// are ever configured.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ChannelTable {
    channels: [Channel; MAX_CHANNELS],
    mask: ChannelMask,
    update_rate_hz: u32,
    armed: bool,
}

impl ChannelTable {
    pub(crate) const fn new() -> Self {
        Self {
            channels: [Channel::UNCONFIGURED; MAX_CHANNELS],
            mask: ChannelMask::EMPTY,
            update_rate_hz: 0,
            armed: false,
        }
    }

    /// Configure the channels in `mask`, zero every width and set the rate.
    pub(crate) fn reset(&mut self, mask: ChannelMask, update_rate_hz: u32) {
        for (index, channel) in (0u8..).zip(self.channels.iter_mut()) {
            *channel = Channel {
                configured: mask.contains(index),
                ..Channel::UNCONFIGURED
            };
        }
        self.mask = mask;
        self.update_rate_hz = update_rate_hz;
        self.armed = false;
    }

    /// The fixed channel mask.
    #[must_use]
    pub const fn mask(&self) -> ChannelMask {
        self.mask
    }

    /// Current update rate in Hz (0 before initialization).
    #[must_use]
    pub const fn update_rate_hz(&self) -> u32 {
        self.update_rate_hz
    }

    /// Whether outputs are armed.
    #[must_use]
    pub const fn is_armed(&self) -> bool {
        self.armed
    }

    /// A channel by index, or `None` past [`MAX_CHANNELS`].
    #[must_use]
    pub fn channel(&self, channel: u8) -> Option<&Channel> {
        self.channels.get(usize::from(channel))
    }

    /// A configured channel by index.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidChannel`] if the index is out of range or not in the mask.
    pub fn configured_channel(&self, channel: u8) -> Result<&Channel> {
        self.channel(channel)
            .filter(|entry| entry.configured)
            .ok_or(Error::InvalidChannel(channel))
    }

    /// Configured channels with their indices.
    pub fn configured(&self) -> impl Iterator<Item = (u8, &Channel)> {
        (0u8..)
            .zip(self.channels.iter())
            .filter(|(_, channel)| channel.configured)
    }

    pub(crate) fn set_update_rate(&mut self, update_rate_hz: u32) {
        self.update_rate_hz = update_rate_hz;
    }

    pub(crate) fn set_armed(&mut self, armed: bool) {
        self.armed = armed;
    }

    /// Store `width_us` for a configured channel, clamped to the current rate.
    ///
    /// Returns the width actually stored.
    pub(crate) fn store_width(&mut self, channel: u8, width_us: u16) -> Result<u16> {
        let max = max_pulse_width_us(self.update_rate_hz);
        let entry = self
            .channels
            .get_mut(usize::from(channel))
            .filter(|entry| entry.configured)
            .ok_or(Error::InvalidChannel(channel))?;
        let stored = width_us.min(max);
        entry.pulse_width_us = stored;
        if width_us != 0 {
            entry.last_commanded_width_us = width_us;
        }
        Ok(stored)
    }

    /// Refit every active width to the current rate from its last commanded width.
    ///
    /// A channel clamped by a faster rate gets its commanded width back when
    /// the rate drops again. Suppressed channels stay at 0. Returns the
    /// channels whose stored width changed.
    pub(crate) fn fit_to_rate(&mut self) -> ChannelMask {
        let max = max_pulse_width_us(self.update_rate_hz);
        let mut changed = ChannelMask::EMPTY;
        for (index, channel) in (0u8..).zip(self.channels.iter_mut()) {
            if channel.pulse_width_us == 0 {
                continue;
            }
            let fitted = channel.last_commanded_width_us.min(max);
            if fitted != channel.pulse_width_us {
                channel.pulse_width_us = fitted;
                changed = changed.with(index);
            }
        }
        changed
    }
}
