//! A PWM servo/ESC output driver for up to 16 channels on Pico 1 and 2.
//!
//! Start at [`pwm_output`]: [`PwmOutput`](pwm_output::PwmOutput) is the
//! control surface (initialize, arm/disarm, update rate, per-channel widths,
//! raw control codes and bulk writes), and
//! [`PwmOutputTopic`](pwm_output::output_topic::PwmOutputTopic) carries
//! `pwm_output_values` records from publishers to it.
//!
//! # Glossary
//!
//! - **PWM ([Pulse Width Modulation](https://en.wikipedia.org/wiki/Pulse-width_modulation)) Slices:** Both Pico 1 and 2 have 8 slices (& 16 channels) in the
//!   range used here. These "slices" are unrelated to Rust slices.
//! - **Update rate:** how many pulses per second every channel emits (50 Hz for classic servos).
//! - **Pulse width:** how long the line stays high each period, in µs. 0 means "no pulse".
//! - **Armed:** pulses are actually emitted. Disarmed outputs keep their widths for the next arm.
#![cfg_attr(not(feature = "host"), no_std)]
#![cfg_attr(not(feature = "host"), no_main)]

// Compile-time checks: exactly one board must be selected (unless testing with host feature)
#[cfg(all(not(any(feature = "pico1", feature = "pico2")), not(feature = "host")))]
compile_error!("Must enable exactly one board feature: 'pico1' or 'pico2'");

#[cfg(all(feature = "pico1", feature = "pico2"))]
compile_error!("Cannot enable both 'pico1' and 'pico2' features simultaneously");

// The host build swaps the RP timer port for the mock one.
#[cfg(all(feature = "host", any(feature = "pico1", feature = "pico2")))]
compile_error!("'host' cannot be combined with a board feature; use --no-default-features");

#[macro_use]
mod log;
mod error;
pub mod pwm_output;

// Re-export error types and result (used throughout)
pub use crate::error::{Error, Result};
