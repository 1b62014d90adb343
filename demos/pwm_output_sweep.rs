#![no_std]
#![no_main]
#![cfg(not(feature = "host"))]

use core::{convert::Infallible, panic};
use embassy_executor::Spawner;
use embassy_rp::pwm::{Config, Pwm};
use embassy_time::Timer;
use pwm_output_envoy::{
    Result,
    pwm_output::{
        PwmOutput,
        channel_table::ChannelMask,
        output_topic::{PwmOutputTopic, device_loop},
        output_values::PwmOutputValues,
        rp_timer_port::{RpTimerPort, SliceOutputs},
    },
};
use static_cell::StaticCell;
use {defmt::info, defmt_rtt as _, panic_probe as _};

type DemoOutput = PwmOutput<RpTimerPort<'static>>;

static PWM_OUTPUT: StaticCell<DemoOutput> = StaticCell::new();
static OUTPUT_PWM: PwmOutputTopic = PwmOutputTopic::new();

#[embassy_executor::main]
async fn main(spawner: Spawner) -> ! {
    let err = inner_main(spawner).await.unwrap_err();
    panic!("{err}");
}

async fn inner_main(spawner: Spawner) -> Result<Infallible> {
    let p = embassy_rp::init(Default::default());

    // Servos on GPIO 0 and 1: slice 0, outputs A and B → channels 0 and 1.
    let port = RpTimerPort::new().with_slice(
        0,
        Pwm::new_output_ab(p.PWM_SLICE0, p.PIN_0, p.PIN_1, Config::default()),
        SliceOutputs::AB,
    );
    let pwm_output: &'static DemoOutput = PWM_OUTPUT.init(PwmOutput::new(port));

    pwm_output.initialize(ChannelMask::from_bits(0b11))?;
    pwm_output.set_channel(0, 1500)?;
    pwm_output.set_channel(1, 1500)?;
    pwm_output.arm()?;
    info!("armed at {}Hz", pwm_output.update_rate_hz());
    Timer::after_millis(500).await;

    defmt::unwrap!(spawner.spawn(output_pwm_task(pwm_output)));

    // Sweep the two servos in opposite directions, 1000..=2000 µs.
    loop {
        for width_us in (1000u16..=2000).step_by(50).chain((1000u16..2000).step_by(50).rev()) {
            let mirrored = 3000 - width_us;
            OUTPUT_PWM.publish(
                PwmOutputValues::new(50)
                    .with_value(0, width_us)
                    .with_value(1, mirrored),
            );
            Timer::after_millis(40).await;
        }
        info!("sweep done, {} records superseded", OUTPUT_PWM.superseded());
    }
}

#[embassy_executor::task]
async fn output_pwm_task(pwm_output: &'static DemoOutput) -> ! {
    device_loop(&OUTPUT_PWM, pwm_output).await
}
