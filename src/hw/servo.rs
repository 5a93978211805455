use embassy_stm32::peripherals::TIM4;
use embassy_stm32::timer::simple_pwm::SimplePwm;
use embassy_stm32::timer::Channel;

use balance_bot::drivers::standup::{servo_pulse_us, SERVO_PERIOD_US};

/// Stand-up arm servo on TIM4 CH1, 50 Hz frame.
pub struct Servo {
    pwm: SimplePwm<'static, TIM4>,
    angle: Option<u8>,
}

impl Servo {
    pub fn new(mut pwm: SimplePwm<'static, TIM4>) -> Self {
        pwm.enable(Channel::Ch1);
        Self { pwm, angle: None }
    }

    /// Only touches the compare register when the angle changes.
    pub fn set_angle(&mut self, angle: u8) {
        if self.angle == Some(angle) {
            return;
        }
        let max = self.pwm.get_max_duty() as u32;
        let compare = max * servo_pulse_us(angle) / SERVO_PERIOD_US;
        self.pwm.set_duty(Channel::Ch1, compare as u16);
        self.angle = Some(angle);
    }
}
