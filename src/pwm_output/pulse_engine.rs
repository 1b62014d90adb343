//! The arm/disarm/rate state machine that turns channel-table changes into timer programming.
//!
//! See [`PulseEngine`].

use super::channel_table::{ChannelMask, ChannelTable, max_pulse_width_us};
use super::timer_port::TimerPort;
use crate::{Error, Result};

/// Lifecycle state of a [`PulseEngine`].
///
/// `Uninitialized → Initialized ⇄ Armed`, and back to `Uninitialized` on
/// [`deinitialize`](PulseEngine::deinitialize).
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EngineState {
    /// No timer resources are claimed.
    #[default]
    Uninitialized,
    /// Timer claimed, outputs disabled. Widths may be staged.
    Initialized,
    /// Configured channels emit pulses at their programmed widths.
    Armed,
}

/// Supported update rates and the rate applied at initialization.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PwmOutputConfig {
    supported_rates_hz: &'static [u32],
    default_rate_hz: u32,
}

impl PwmOutputConfig {
    /// Rates accepted unless configured otherwise.
    pub const DEFAULT_SUPPORTED_RATES_HZ: &'static [u32] = &[50, 100, 200, 300, 400];

    /// Rate applied by `initialize` unless configured otherwise.
    pub const DEFAULT_RATE_HZ: u32 = 50;

    /// The default configuration: 50 Hz, accepting 50/100/200/300/400 Hz.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            supported_rates_hz: Self::DEFAULT_SUPPORTED_RATES_HZ,
            default_rate_hz: Self::DEFAULT_RATE_HZ,
        }
    }

    /// Replace the supported rate set.
    #[must_use]
    pub const fn with_supported_rates(self, supported_rates_hz: &'static [u32]) -> Self {
        Self {
            supported_rates_hz,
            ..self
        }
    }

    /// Replace the rate applied at initialization. It must be in the supported set.
    #[must_use]
    pub const fn with_default_rate(self, default_rate_hz: u32) -> Self {
        Self {
            default_rate_hz,
            ..self
        }
    }

    /// The supported rate set in Hz.
    #[must_use]
    pub const fn supported_rates_hz(&self) -> &'static [u32] {
        self.supported_rates_hz
    }

    /// The rate applied at initialization.
    #[must_use]
    pub const fn default_rate_hz(&self) -> u32 {
        self.default_rate_hz
    }

    /// Whether `rate_hz` is in the supported set.
    #[must_use]
    pub fn supports_rate(&self, rate_hz: u32) -> bool {
        self.supported_rates_hz.contains(&rate_hz)
    }
}

impl Default for PwmOutputConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Owns the [`ChannelTable`] and the [`TimerPort`] and keeps them in step.
///
/// Every method completes in bounded time (at most one pass over the
/// channels) and never waits on another thread. Serializing callers is the
/// job of [`PwmOutput`](super::PwmOutput); use the engine directly only from a
/// single owner.
///
/// # Disarm caveat
///
/// [`disarm`](Self::disarm) stops output with `enable_output(false)`. Unless
/// the port sets [`TimerPort::COMPLETES_PULSE_ON_DISABLE`], a pulse that is
/// mid-emission at that moment is not guaranteed to complete cleanly.
pub struct PulseEngine<P> {
    port: P,
    config: PwmOutputConfig,
    table: ChannelTable,
    state: EngineState,
}

impl<P: TimerPort> PulseEngine<P> {
    /// Create an uninitialized engine around `port`.
    #[must_use]
    pub const fn new(port: P, config: PwmOutputConfig) -> Self {
        Self {
            port,
            config,
            table: ChannelTable::new(),
            state: EngineState::Uninitialized,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> EngineState {
        self.state
    }

    /// The channel table (read-only).
    #[must_use]
    pub const fn table(&self) -> &ChannelTable {
        &self.table
    }

    /// The rate configuration.
    #[must_use]
    pub const fn config(&self) -> &PwmOutputConfig {
        &self.config
    }

    /// Claim the timer for `channel_mask`, zero every width and apply the default rate.
    ///
    /// # Errors
    ///
    /// - [`Error::AlreadyInitialized`] if not `Uninitialized`; existing state is untouched.
    /// - [`Error::UnsupportedRate`] if the configured default rate is not supported.
    /// - [`Error::ResourceUnavailable`] if the port cannot be claimed.
    /// - [`Error::Hardware`] if the claimed timer rejects the default rate.
    pub fn initialize(&mut self, channel_mask: ChannelMask) -> Result<()> {
        if self.state != EngineState::Uninitialized {
            return Err(Error::AlreadyInitialized);
        }
        let rate_hz = self.config.default_rate_hz;
        if !self.config.supports_rate(rate_hz) {
            return Err(Error::UnsupportedRate(rate_hz));
        }

        self.port.configure(channel_mask).map_err(|err| {
            warn!("pwm claim for mask {:#x} failed: {}", channel_mask.bits(), err);
            Error::ResourceUnavailable
        })?;
        if let Err(err) = self.port.set_rate(rate_hz) {
            self.port.release();
            return Err(err.into());
        }
        self.port.enable_output(false);
        for channel in channel_mask.iter() {
            self.port.set_channel_width(channel, 0);
        }

        self.table.reset(channel_mask, rate_hz);
        self.state = EngineState::Initialized;
        info!(
            "pwm output initialized: mask={:#x} rate={}Hz",
            channel_mask.bits(),
            rate_hz
        );
        Ok(())
    }

    /// Disarm if armed, release the timer and return to `Uninitialized`.
    ///
    /// Safe to call in any state, any number of times.
    pub fn deinitialize(&mut self) {
        if self.state == EngineState::Armed {
            self.stop_output();
        }
        self.port.release();
        if self.state != EngineState::Uninitialized {
            info!("pwm output deinitialized");
        }
        self.table = ChannelTable::new();
        self.state = EngineState::Uninitialized;
    }

    /// Start emitting pulses, restoring the widths held in the table.
    ///
    /// Arming an armed engine is a no-op.
    ///
    /// # Errors
    ///
    /// [`Error::NotInitialized`] before `initialize`.
    pub fn arm(&mut self) -> Result<()> {
        match self.state {
            EngineState::Uninitialized => Err(Error::NotInitialized),
            EngineState::Armed => Ok(()),
            EngineState::Initialized => {
                for (channel, entry) in self.table.configured() {
                    self.port.set_channel_width(channel, entry.pulse_width_us());
                }
                self.port.enable_output(true);
                self.table.set_armed(true);
                self.state = EngineState::Armed;
                info!("pwm output armed");
                Ok(())
            }
        }
    }

    /// Stop emitting pulses. Widths stay in the table for the next [`arm`](Self::arm).
    ///
    /// See the [disarm caveat](Self#disarm-caveat). Disarming a disarmed engine is a no-op.
    ///
    /// # Errors
    ///
    /// [`Error::NotInitialized`] before `initialize`.
    pub fn disarm(&mut self) -> Result<()> {
        match self.state {
            EngineState::Uninitialized => Err(Error::NotInitialized),
            EngineState::Initialized => Ok(()),
            EngineState::Armed => {
                self.stop_output();
                self.state = EngineState::Initialized;
                info!("pwm output disarmed");
                Ok(())
            }
        }
    }

    fn stop_output(&mut self) {
        self.port.enable_output(false);
        self.table.set_armed(false);
        if !P::COMPLETES_PULSE_ON_DISABLE {
            debug!("output disabled without waiting for the cycle boundary");
        }
    }

    /// Change the update rate shared by all channels.
    ///
    /// Every active width is refitted to the new period from its last
    /// commanded width: clamped when the period shrinks, restored when it
    /// grows back.
    ///
    /// Widths never exceed the period the timer is running: when the period
    /// shrinks the narrowed widths go to the port before the rate, and when
    /// it grows the rate goes first.
    ///
    /// # Errors
    ///
    /// - [`Error::NotInitialized`] before `initialize`.
    /// - [`Error::UnsupportedRate`] if `rate_hz` is not in the supported set; the
    ///   previous rate and every width stay as they were.
    /// - [`Error::Hardware`] if the port rejects the rate; the previous rate
    ///   and widths are restored.
    pub fn set_rate(&mut self, rate_hz: u32) -> Result<()> {
        if self.state == EngineState::Uninitialized {
            return Err(Error::NotInitialized);
        }
        if !self.config.supports_rate(rate_hz) {
            return Err(Error::UnsupportedRate(rate_hz));
        }

        let previous_rate_hz = self.table.update_rate_hz();
        if max_pulse_width_us(rate_hz) < max_pulse_width_us(previous_rate_hz) {
            let narrowed = self.refit_widths(rate_hz);
            if let Err(err) = self.port.set_rate(rate_hz) {
                self.refit_widths(previous_rate_hz);
                return Err(err.into());
            }
            if !narrowed.is_empty() {
                warn!(
                    "rate {}Hz clamped widths on channels {:#x}",
                    rate_hz,
                    narrowed.bits()
                );
            }
        } else {
            self.port.set_rate(rate_hz)?;
            let widened = self.refit_widths(rate_hz);
            if !widened.is_empty() {
                debug!(
                    "rate {}Hz restored widths on channels {:#x}",
                    rate_hz,
                    widened.bits()
                );
            }
        }
        debug!("update rate set to {}Hz", rate_hz);
        Ok(())
    }

    /// Move the table to `rate_hz`, refit widths and forward the changed ones while armed.
    fn refit_widths(&mut self, rate_hz: u32) -> ChannelMask {
        self.table.set_update_rate(rate_hz);
        let changed = self.table.fit_to_rate();
        if self.state == EngineState::Armed {
            for channel in changed.iter() {
                let width_us = self
                    .table
                    .channel(channel)
                    .map_or(0, |entry| entry.pulse_width_us());
                self.port.set_channel_width(channel, width_us);
            }
        }
        changed
    }

    /// Store the pulse width for one channel; forward it to the timer only while armed.
    ///
    /// A disarmed write is staged and emitted on the next [`arm`](Self::arm).
    /// Writing 0 suppresses the channel without unconfiguring it. Widths longer
    /// than the current period are clamped.
    ///
    /// # Errors
    ///
    /// - [`Error::NotInitialized`] before `initialize`.
    /// - [`Error::InvalidChannel`] if `channel` is out of range or not in the mask.
    pub fn set_channel(&mut self, channel: u8, width_us: u16) -> Result<()> {
        if self.state == EngineState::Uninitialized {
            return Err(Error::NotInitialized);
        }
        let stored = self.table.store_width(channel, width_us)?;
        if stored != width_us {
            warn!(
                "channel {} width {}us clamped to {}us",
                channel, width_us, stored
            );
        }
        if self.state == EngineState::Armed {
            self.port.set_channel_width(channel, stored);
        }
        Ok(())
    }

    /// Width of one channel as seen from outside: the stored width while armed, else 0.
    ///
    /// # Errors
    ///
    /// - [`Error::NotInitialized`] before `initialize`.
    /// - [`Error::InvalidChannel`] if `channel` is out of range or not in the mask.
    pub fn get_channel(&self, channel: u8) -> Result<u16> {
        if self.state == EngineState::Uninitialized {
            return Err(Error::NotInitialized);
        }
        let entry = self.table.configured_channel(channel)?;
        Ok(if self.state == EngineState::Armed {
            entry.pulse_width_us()
        } else {
            0
        })
    }
}
