//! A recording [`TimerPort`] for host builds.
//!
//! [`MockTimerPort::new`] returns the port together with a [`MockTimerProbe`]
//! that shares its state, so a test can hand the port to a
//! [`PwmOutput`](super::PwmOutput) and still observe what was programmed.

use core::cell::RefCell;
use std::sync::Arc;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use heapless::Vec;

use super::MAX_CHANNELS;
use super::channel_table::ChannelMask;
use super::timer_port::{HardwareError, TimerPort};

/// How many rates [`MockTimerProbe::reject_rate`] can hold.
pub const REJECTED_RATE_CAPACITY: usize = 8;

#[derive(Debug, Default)]
struct MockTimerState {
    claimed: ChannelMask,
    claimed_elsewhere: ChannelMask,
    rate_hz: u32,
    widths_us: [u16; MAX_CHANNELS],
    output_enabled: bool,
    rejected_rates: Vec<u32, REJECTED_RATE_CAPACITY>,
    width_writes: u32,
    release_count: u32,
}

type SharedState = Arc<Mutex<CriticalSectionRawMutex, RefCell<MockTimerState>>>;

/// Host stand-in for a PWM timer peripheral with all [`MAX_CHANNELS`] outputs.
pub struct MockTimerPort {
    state: SharedState,
}

/// Observer (and fault injector) for a [`MockTimerPort`].
#[derive(Clone)]
pub struct MockTimerProbe {
    state: SharedState,
}

impl MockTimerPort {
    /// Create a port and the probe that watches it.
    #[must_use]
    pub fn new() -> (Self, MockTimerProbe) {
        let state: SharedState = Arc::new(Mutex::new(RefCell::new(MockTimerState::default())));
        (
            Self {
                state: Arc::clone(&state),
            },
            MockTimerProbe { state },
        )
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut MockTimerState) -> R) -> R {
        self.state.lock(|cell| f(&mut cell.borrow_mut()))
    }
}

impl TimerPort for MockTimerPort {
    fn configure(&mut self, channel_mask: ChannelMask) -> Result<(), HardwareError> {
        self.with_state(|state| {
            if channel_mask.intersects(state.claimed_elsewhere) {
                return Err(HardwareError::AlreadyClaimed);
            }
            state.claimed = channel_mask;
            Ok(())
        })
    }

    fn release(&mut self) {
        self.with_state(|state| {
            state.claimed = ChannelMask::EMPTY;
            state.output_enabled = false;
            state.release_count = state.release_count.saturating_add(1);
        });
    }

    fn set_rate(&mut self, rate_hz: u32) -> Result<(), HardwareError> {
        self.with_state(|state| {
            if rate_hz == 0 || state.rejected_rates.contains(&rate_hz) {
                return Err(HardwareError::RateOutOfRange);
            }
            state.rate_hz = rate_hz;
            Ok(())
        })
    }

    fn set_channel_width(&mut self, channel: u8, width_us: u16) {
        self.with_state(|state| {
            if let Some(width) = state.widths_us.get_mut(usize::from(channel)) {
                *width = width_us;
                state.width_writes = state.width_writes.saturating_add(1);
            }
        });
    }

    fn enable_output(&mut self, enabled: bool) {
        self.with_state(|state| state.output_enabled = enabled);
    }
}

impl MockTimerProbe {
    fn with_state<R>(&self, f: impl FnOnce(&mut MockTimerState) -> R) -> R {
        self.state.lock(|cell| f(&mut cell.borrow_mut()))
    }

    /// Pretend another subsystem owns `channel_mask`; `configure` on an overlapping mask fails.
    pub fn claim_elsewhere(&self, channel_mask: ChannelMask) {
        self.with_state(|state| state.claimed_elsewhere = channel_mask);
    }

    /// Make `set_rate(rate_hz)` fail with [`HardwareError::RateOutOfRange`].
    ///
    /// # Panics
    ///
    /// If more than [`REJECTED_RATE_CAPACITY`] rates are rejected.
    pub fn reject_rate(&self, rate_hz: u32) {
        let stored = self.with_state(|state| state.rejected_rates.push(rate_hz).is_ok());
        assert!(
            stored,
            "mock timer rejects at most {REJECTED_RATE_CAPACITY} rates"
        );
    }

    /// Channels currently claimed.
    #[must_use]
    pub fn claimed(&self) -> ChannelMask {
        self.with_state(|state| state.claimed)
    }

    /// Last rate programmed.
    #[must_use]
    pub fn rate_hz(&self) -> u32 {
        self.with_state(|state| state.rate_hz)
    }

    /// Last width programmed for `channel` (0 past the last channel).
    #[must_use]
    pub fn width_us(&self, channel: u8) -> u16 {
        self.with_state(|state| {
            state
                .widths_us
                .get(usize::from(channel))
                .copied()
                .unwrap_or(0)
        })
    }

    /// Whether pulse emission is enabled.
    #[must_use]
    pub fn output_enabled(&self) -> bool {
        self.with_state(|state| state.output_enabled)
    }

    /// What each output line is physically doing: its width if enabled and claimed, else 0.
    #[must_use]
    pub fn emitted_widths_us(&self) -> [u16; MAX_CHANNELS] {
        self.with_state(|state| {
            let mut emitted = [0; MAX_CHANNELS];
            if state.output_enabled {
                for (index, (out, width)) in
                    (0u8..).zip(emitted.iter_mut().zip(state.widths_us.iter()))
                {
                    if state.claimed.contains(index) {
                        *out = *width;
                    }
                }
            }
            emitted
        })
    }

    /// Number of `set_channel_width` calls so far.
    #[must_use]
    pub fn width_writes(&self) -> u32 {
        self.with_state(|state| state.width_writes)
    }

    /// Number of `release` calls so far.
    #[must_use]
    pub fn release_count(&self) -> u32 {
        self.with_state(|state| state.release_count)
    }
}
