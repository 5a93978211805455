use embassy_executor::task;
use embassy_futures::select::select;
use embassy_stm32::exti::ExtiInput;
use embassy_stm32::gpio::AnyPin;

use balance_bot::drivers::encoder::{QuadratureDecoder, WheelTicks};
use balance_bot::hal::Side;

/// One per wheel: decodes every edge on either channel into the shared
/// tick counter.
#[task(pool_size = 2)]
pub async fn encoder_task(
    side: Side,
    mut a: ExtiInput<'static, AnyPin>,
    mut b: ExtiInput<'static, AnyPin>,
    ticks: &'static WheelTicks,
) {
    let mut decoder = QuadratureDecoder::with_levels(a.is_high(), b.is_high());
    loop {
        select(a.wait_for_any_edge(), b.wait_for_any_edge()).await;
        let delta = decoder.step(a.is_high(), b.is_high());
        if delta != 0 {
            ticks.add(side, delta);
        }
    }
}
