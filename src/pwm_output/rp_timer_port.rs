//! [`TimerPort`] on the RP2040 / RP235x PWM slices.
//!
//! Channel `2s` is output A of slice `s` and channel `2s + 1` is output B, so
//! slices 0 through 7 cover all 16 channels. Every claimed slice counts in
//! 1 µs ticks, which makes a compare value equal to a pulse width in µs.
//!
//! `TOP` and the compare registers are double-buffered and latch when the
//! counter wraps, so rate and width changes never cut a pulse short. Output is
//! stopped by writing a zero compare and leaving the counter running; the pulse
//! in flight still completes.

use embassy_rp::clocks::clk_sys_freq;
use embassy_rp::pwm::{Config, Pwm};
use fixed::FixedU16;
use fixed::types::extra::U4;

use super::MAX_CHANNELS;
use super::channel_table::ChannelMask;
use super::timer_port::{HardwareError, TimerPort};

const SLICE_COUNT: usize = MAX_CHANNELS / 2;
const TICK_HZ: u64 = 1_000_000;

/// Which outputs of a slice are wired to pins.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SliceOutputs {
    /// Output A only (`Pwm::new_output_a`).
    A,
    /// Output B only (`Pwm::new_output_b`).
    B,
    /// Both outputs (`Pwm::new_output_ab`).
    AB,
}

impl SliceOutputs {
    const fn has_a(self) -> bool {
        matches!(self, Self::A | Self::AB)
    }

    const fn has_b(self) -> bool {
        matches!(self, Self::B | Self::AB)
    }
}

struct Slice<'d> {
    pwm: Pwm<'d>,
    // Kept so every reprogram reuses the divider instead of the default.
    config: Config,
    outputs: SliceOutputs,
}

/// The Pico PWM slices as a [`TimerPort`].
///
/// Build it from already-constructed [`Pwm`] drivers:
///
/// ```rust,ignore
/// let port = RpTimerPort::new()
///     .with_slice(0, Pwm::new_output_ab(p.PWM_SLICE0, p.PIN_0, p.PIN_1, Config::default()), SliceOutputs::AB)
///     .with_slice(1, Pwm::new_output_a(p.PWM_SLICE1, p.PIN_2, Config::default()), SliceOutputs::A);
/// ```
pub struct RpTimerPort<'d> {
    slices: [Option<Slice<'d>>; SLICE_COUNT],
    claimed: ChannelMask,
    widths_us: [u16; MAX_CHANNELS],
    enabled: bool,
}

impl<'d> RpTimerPort<'d> {
    /// A port with no slices attached.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slices: [const { None }; SLICE_COUNT],
            claimed: ChannelMask::EMPTY,
            widths_us: [0; MAX_CHANNELS],
            enabled: false,
        }
    }

    /// Attach slice `index` (0..8) with the outputs its pins provide.
    ///
    /// An out-of-range index is ignored and the `pwm` is dropped.
    #[must_use]
    pub fn with_slice(mut self, index: usize, pwm: Pwm<'d>, outputs: SliceOutputs) -> Self {
        if let Some(slot) = self.slices.get_mut(index) {
            *slot = Some(Slice {
                pwm,
                config: Config::default(),
                outputs,
            });
        }
        self
    }

    /// Channels that have a pin behind them.
    #[must_use]
    pub fn available(&self) -> ChannelMask {
        let mut mask = ChannelMask::EMPTY;
        for (slice_index, slot) in (0u8..).zip(self.slices.iter()) {
            if let Some(slice) = slot {
                let channel_a = slice_index.saturating_mul(2);
                if slice.outputs.has_a() {
                    mask = mask.with(channel_a);
                }
                if slice.outputs.has_b() {
                    mask = mask.with(channel_a.saturating_add(1));
                }
            }
        }
        mask
    }

    fn emitted_width(&self, channel: u8) -> u16 {
        if self.enabled && self.claimed.contains(channel) {
            self.widths_us
                .get(usize::from(channel))
                .copied()
                .unwrap_or(0)
        } else {
            0
        }
    }

    /// Write compares for one slice; they latch at its next wrap.
    fn program_slice(&mut self, slice_index: u8) {
        let channel_a = slice_index.saturating_mul(2);
        let compare_a = self.emitted_width(channel_a);
        let compare_b = self.emitted_width(channel_a.saturating_add(1));
        if let Some(Some(slice)) = self.slices.get_mut(usize::from(slice_index)) {
            slice.config.compare_a = compare_a;
            slice.config.compare_b = compare_b;
            slice.pwm.set_config(&slice.config);
        }
    }

    fn claimed_slices(&self) -> impl Iterator<Item = u8> + use<> {
        let claimed = self.claimed;
        (0u8..SLICE_COUNT as u8).filter(move |slice_index| {
            let channel_a = slice_index.saturating_mul(2);
            claimed.contains(channel_a) || claimed.contains(channel_a.saturating_add(1))
        })
    }
}

impl Default for RpTimerPort<'_> {
    fn default() -> Self {
        Self::new()
    }
}

/// Clock divider for 1 µs ticks, in 1/16ths, limited to the hardware's 1.0..=255.9375.
fn tick_divider() -> (u32, FixedU16<U4>) {
    let clk_hz = clk_sys_freq();
    let sixteenths = u64::from(clk_hz)
        .saturating_mul(16)
        .saturating_add(TICK_HZ / 2)
        .checked_div(TICK_HZ)
        .unwrap_or(0);
    let bits = u16::try_from(sixteenths.clamp(16, 0x0fff)).unwrap_or(0x0fff);
    (clk_hz, FixedU16::<U4>::from_bits(bits))
}

/// `TOP` for `rate_hz` at 1 µs ticks, if the period fits the 16-bit counter.
fn top_for_rate(rate_hz: u32) -> Option<u16> {
    let period_us = 1_000_000u32.checked_div(rate_hz)?;
    u16::try_from(period_us.checked_sub(1)?).ok()
}

impl TimerPort for RpTimerPort<'_> {
    const COMPLETES_PULSE_ON_DISABLE: bool = true;

    fn configure(&mut self, channel_mask: ChannelMask) -> Result<(), HardwareError> {
        if !self.claimed.is_empty() {
            return Err(HardwareError::AlreadyClaimed);
        }
        if channel_mask.bits() & !self.available().bits() != 0 {
            return Err(HardwareError::UnsupportedMask);
        }
        self.claimed = channel_mask;
        self.widths_us = [0; MAX_CHANNELS];
        self.enabled = false;

        let (clk_hz, divider) = tick_divider();
        for slice_index in self.claimed_slices() {
            if let Some(Some(slice)) = self.slices.get_mut(usize::from(slice_index)) {
                slice.config.divider = divider;
                slice.config.phase_correct = false; // edge-aligned => exact 1 µs steps
                slice.config.compare_a = 0;
                slice.config.compare_b = 0;
                slice.config.enable = true;
                slice.pwm.set_config(&slice.config);
            }
        }
        info!(
            "pwm slices claimed: mask={:#x} clk={}Hz divider={}/16",
            channel_mask.bits(),
            clk_hz,
            divider.to_bits()
        );
        Ok(())
    }

    fn release(&mut self) {
        for slice_index in self.claimed_slices() {
            if let Some(Some(slice)) = self.slices.get_mut(usize::from(slice_index)) {
                slice.config.compare_a = 0;
                slice.config.compare_b = 0;
                slice.config.enable = false;
                slice.pwm.set_config(&slice.config);
            }
        }
        self.claimed = ChannelMask::EMPTY;
        self.enabled = false;
    }

    fn set_rate(&mut self, rate_hz: u32) -> Result<(), HardwareError> {
        let top = top_for_rate(rate_hz).ok_or(HardwareError::RateOutOfRange)?;
        for slice_index in self.claimed_slices() {
            if let Some(Some(slice)) = self.slices.get_mut(usize::from(slice_index)) {
                slice.config.top = top;
                slice.pwm.set_config(&slice.config);
            }
        }
        debug!("pwm top={} for {}Hz", top, rate_hz);
        Ok(())
    }

    fn set_channel_width(&mut self, channel: u8, width_us: u16) {
        if let Some(width) = self.widths_us.get_mut(usize::from(channel)) {
            *width = width_us;
            self.program_slice(channel / 2);
        }
    }

    fn enable_output(&mut self, enabled: bool) {
        self.enabled = enabled;
        for slice_index in self.claimed_slices() {
            self.program_slice(slice_index);
        }
    }
}
