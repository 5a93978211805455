use core::convert::Infallible;

use embassy_stm32::gpio::{AnyPin, Output};
use embassy_stm32::peripherals::TIM3;
use embassy_stm32::timer::simple_pwm::SimplePwm;
use embassy_stm32::timer::Channel;

use balance_bot::drivers::motor::bridge_command;
use balance_bot::hal::{MotorDriver, Side};

/// Direction inputs of one H-bridge half.
pub struct BridgePins {
    pub in1: Output<'static, AnyPin>,
    pub in2: Output<'static, AnyPin>,
}

/// Dual H-bridge: TIM3 CH1 drives the left enable line, CH2 the right.
pub struct Motors {
    pwm: SimplePwm<'static, TIM3>,
    left: BridgePins,
    right: BridgePins,
}

impl Motors {
    /// Starts with both bridges coasting at zero duty.
    pub fn new(mut pwm: SimplePwm<'static, TIM3>, left: BridgePins, right: BridgePins) -> Self {
        for ch in [Channel::Ch1, Channel::Ch2] {
            pwm.set_duty(ch, 0);
            pwm.enable(ch);
        }
        let mut motors = Self { pwm, left, right };
        let _ = motors.set_motor_duty(Side::Left, 0);
        let _ = motors.set_motor_duty(Side::Right, 0);
        motors
    }
}

impl MotorDriver for Motors {
    type Error = Infallible;

    fn set_motor_duty(&mut self, side: Side, duty: i16) -> Result<(), Infallible> {
        let (state, compare) = bridge_command(duty, self.pwm.get_max_duty());
        let (pins, ch) = match side {
            Side::Left => (&mut self.left, Channel::Ch1),
            Side::Right => (&mut self.right, Channel::Ch2),
        };
        let (in1, in2) = state.inputs();
        pins.in1.set_level(in1.into());
        pins.in2.set_level(in2.into());
        self.pwm.set_duty(ch, compare);
        Ok(())
    }
}
