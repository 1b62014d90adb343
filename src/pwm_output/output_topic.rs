//! The `output_pwm` publication channel.
//!
//! Publishers post whole [`PwmOutputValues`] records; a single consumer
//! applies each one to a [`PwmOutput`] as a bulk write. The most recent
//! record always wins: publishing again before the consumer runs replaces the
//! pending record.
//!
//! Do not mix this path with direct commands on the same output. Both are
//! serialized by the output's lock, but their relative order is undefined.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use portable_atomic::{AtomicU32, Ordering};

use super::output_values::PwmOutputValues;
use super::timer_port::TimerPort;
use super::{BulkWriteReport, PwmOutput};
use crate::Result;

/// Latest-value topic carrying [`PwmOutputValues`].
///
/// `const`-constructible so it can live in a `static`.
///
/// # Example
///
/// ```rust
/// use embassy_futures::block_on;
/// use pwm_output_envoy::pwm_output::{
///     PwmOutput, channel_table::ChannelMask, mock_timer_port::MockTimerPort,
///     output_topic::PwmOutputTopic, output_values::PwmOutputValues,
/// };
///
/// static OUTPUT_PWM: PwmOutputTopic = PwmOutputTopic::new();
///
/// let (port, _probe) = MockTimerPort::new();
/// let output = PwmOutput::new(port);
/// output.initialize(ChannelMask::from_bits(0b11)).unwrap();
/// output.arm().unwrap();
///
/// OUTPUT_PWM.publish(PwmOutputValues::new(50).with_value(0, 1500));
/// block_on(OUTPUT_PWM.apply_next(&output)).unwrap();
/// assert_eq!(output.get_channel(0), Ok(1500));
/// ```
pub struct PwmOutputTopic {
    latest: Signal<CriticalSectionRawMutex, PwmOutputValues>,
    superseded: AtomicU32,
}

impl PwmOutputTopic {
    /// Create an empty topic.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            latest: Signal::new(),
            superseded: AtomicU32::new(0),
        }
    }

    /// Publish a record, replacing any record the consumer has not taken yet.
    pub fn publish(&self, values: PwmOutputValues) {
        if self.latest.signaled() {
            let count = self.superseded.fetch_add(1, Ordering::Relaxed);
            debug!("output_pwm record superseded ({} so far)", count);
        }
        self.latest.signal(values);
    }

    /// How many published records were replaced before being applied.
    ///
    /// Best effort under concurrent publishers.
    #[must_use]
    pub fn superseded(&self) -> u32 {
        self.superseded.load(Ordering::Relaxed)
    }

    /// Wait for the next record and bulk-write it to `output`.
    ///
    /// # Errors
    ///
    /// Whatever [`PwmOutput::write`] rejects the record with.
    pub async fn apply_next<P: TimerPort>(&self, output: &PwmOutput<P>) -> Result<BulkWriteReport> {
        let values = self.latest.wait().await;
        output.write(&values)
    }

    /// Bulk-write the pending record, if any, without waiting.
    pub fn try_apply<P: TimerPort>(&self, output: &PwmOutput<P>) -> Option<Result<BulkWriteReport>> {
        self.latest.try_take().map(|values| output.write(&values))
    }
}

impl Default for PwmOutputTopic {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply every record published on `topic` to `output`, forever.
///
/// Run it from an executor task. Rejected records and per-channel faults are
/// logged and otherwise dropped, since publishers get no reply.
pub async fn device_loop<P: TimerPort>(topic: &PwmOutputTopic, output: &PwmOutput<P>) -> ! {
    loop {
        match topic.apply_next(output).await {
            Ok(report) => {
                for fault in report.faults() {
                    warn!("output_pwm channel {} rejected: {}", fault.channel, fault.error);
                }
            }
            Err(err) => warn!("output_pwm record rejected: {}", err),
        }
    }
}
