#![no_std]
#![no_main]

mod board;
mod hw;
mod tasks;
mod usb;

use embassy_executor::Spawner;
use embassy_stm32::exti::{Channel as _, ExtiInput};
use embassy_stm32::gpio::{Input, Level, Output, OutputType, Pin, Pull, Speed};
use embassy_stm32::i2c::I2c;
use embassy_stm32::time::{hz, khz, Hertz};
use embassy_stm32::timer::simple_pwm::{PwmPin, SimplePwm};
use embassy_stm32::timer::CountingMode;
use embassy_stm32::usart::{Config as UsartConfig, Uart};
use embassy_stm32::{bind_interrupts, peripherals};
use embassy_time::{block_for, Duration, Timer};
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

use balance_bot::activity::{GyroCalibrator, SensingActivity};
use balance_bot::config::GYRO_CALIBRATION_SAMPLES;
use balance_bot::drivers::standup::StandupLink;
use balance_bot::hal::{Side, TiltSensor};
use balance_bot::health::{ComponentPriority, HealthRegistry, RetryPolicy};
use balance_bot::state::{ControlCoordinator, FAULT_DEGRADED, FAULT_GPS, FAULT_LINK};
use balance_bot::supervisor::on_startup;

use crate::board::Board;
use crate::hw::motor::{BridgePins, Motors};
use crate::hw::mpu6050::Mpu6050;
use crate::hw::servo::Servo;
use crate::tasks::control_task::control_task;
use crate::tasks::encoder_task::encoder_task;
use crate::tasks::gps_task::gps_task;
use crate::tasks::link_task::{link_task, radio_tx_task};
use crate::tasks::sensor_task::sensor_task;
use crate::tasks::standup_task::standup_task;
use crate::tasks::telemetry_task::telemetry_task;

// ── Shared robot state ────────────────────────────────────────────────────────
/// Everything the periodic tasks share. Lives for the whole program.
pub struct Robot {
    pub coordinator: ControlCoordinator,
    pub standup: StandupLink,
}

static ROBOT: StaticCell<Robot> = StaticCell::new();

// ── Interrupt bindings ────────────────────────────────────────────────────────
bind_interrupts!(struct Irqs {
    I2C1_EV  => embassy_stm32::i2c::EventInterruptHandler<peripherals::I2C1>;
    I2C1_ER  => embassy_stm32::i2c::ErrorInterruptHandler<peripherals::I2C1>;
    UART4    => embassy_stm32::usart::InterruptHandler<peripherals::UART4>;
    USART3   => embassy_stm32::usart::InterruptHandler<peripherals::USART3>;
});

// ── Main ──────────────────────────────────────────────────────────────────────
#[embassy_executor::main]
async fn main(spawner: Spawner) {
    // 1. Board init (168 MHz PLL)
    let board = Board::init();
    let p = board.p;

    let robot: &'static Robot = ROBOT.init(Robot {
        coordinator: ControlCoordinator::new(),
        standup: StandupLink::new(),
    });
    let mut health = HealthRegistry::new();
    let retry = RetryPolicy::new();

    // 2. USB (CDC-ACM debug console)
    let (usb_dev, usb_serial) = usb::init(p.USB_OTG_FS, p.PA12, p.PA11);
    spawner.spawn(usb::usb_task(usb_dev)).unwrap();

    // 3. Heartbeat LED (PC13)
    let mut led = Output::new(p.PC13, Level::High, Speed::Low);

    // 4. I2C1 @ 400 kHz: MPU6050 (SCL=PB8, SDA=PB9)
    let i2c = I2c::new(
        p.I2C1,
        p.PB8, p.PB9,
        Irqs,
        p.DMA1_CH7,
        p.DMA1_CH0,
        Hertz(400_000),
        Default::default(),
    );
    let mut imu = Mpu6050::new(i2c);
    Timer::after(Duration::from_millis(100)).await;
    let imu_init = retry.run("imu", || imu.init(), |ms| block_for(Duration::from_millis(ms)));
    health.record_outcome("imu", ComponentPriority::Critical, &imu_init);

    // 5. Wheel encoders on EXTI (left A/B = PC6/PC7, right A/B = PC8/PC9)
    let enc = |pin: embassy_stm32::gpio::AnyPin, ch: embassy_stm32::exti::AnyChannel| {
        ExtiInput::new(Input::new(pin, Pull::Up), ch)
    };
    let left_a = enc(p.PC6.degrade(), p.EXTI6.degrade());
    let left_b = enc(p.PC7.degrade(), p.EXTI7.degrade());
    let right_a = enc(p.PC8.degrade(), p.EXTI8.degrade());
    let right_b = enc(p.PC9.degrade(), p.EXTI9.degrade());
    let ticks = robot.coordinator.wheel_ticks();
    spawner.spawn(encoder_task(Side::Left, left_a, left_b, ticks)).unwrap();
    spawner.spawn(encoder_task(Side::Right, right_a, right_b, ticks)).unwrap();
    health.record("encoders", ComponentPriority::Critical, true, 0);

    // 6. Motors: TIM3 @ 20 kHz on PA6/PA7, direction on PC0..PC3
    let motor_pwm = SimplePwm::new(
        p.TIM3,
        Some(PwmPin::new_ch1(p.PA6, OutputType::PushPull)),
        Some(PwmPin::new_ch2(p.PA7, OutputType::PushPull)),
        None,
        None,
        khz(20),
        CountingMode::EdgeAlignedUp,
    );
    let bridge = |a: embassy_stm32::gpio::AnyPin, b: embassy_stm32::gpio::AnyPin| BridgePins {
        in1: Output::new(a, Level::Low, Speed::Low),
        in2: Output::new(b, Level::Low, Speed::Low),
    };
    let motors = Motors::new(
        motor_pwm,
        bridge(p.PC0.degrade(), p.PC1.degrade()),
        bridge(p.PC2.degrade(), p.PC3.degrade()),
    );
    health.record("motors", ComponentPriority::Important, true, 0);

    // 7. Stand-up servo: TIM4 CH1 @ 50 Hz on PB6
    let servo_pwm = SimplePwm::new(
        p.TIM4,
        Some(PwmPin::new_ch1(p.PB6, OutputType::PushPull)),
        None,
        None,
        None,
        hz(50),
        CountingMode::EdgeAlignedUp,
    );
    let servo = Servo::new(servo_pwm);
    health.record("servo", ComponentPriority::Important, true, 0);

    // 8. Radio UART4 @ 115200 to the BLE bridge (TX=PA0, RX=PA1)
    //    Split into Tx (→ radio_tx_task) and Rx (→ link_task)
    let mut radio_config = UsartConfig::default();
    radio_config.baudrate = 115_200;
    let radio = Uart::new(
        p.UART4, p.PA1, p.PA0,
        Irqs,
        p.DMA1_CH4, p.DMA1_CH2,
        radio_config,
    );
    health.record("radio", ComponentPriority::Important, radio.is_ok(), 0);

    // 9. GPS USART3 @ 9600 (TX=PB10, RX=PB11)
    let mut gps_config = UsartConfig::default();
    gps_config.baudrate = 9_600;
    let gps_uart = Uart::new(
        p.USART3, p.PB11, p.PB10,
        Irqs,
        p.DMA1_CH3, p.DMA1_CH1,
        gps_config,
    );
    health.record("gps", ComponentPriority::Optional, gps_uart.is_ok(), 0);

    // 10. Leave Init
    health.log_report();
    if health.degraded() {
        robot.coordinator.raise_fault(FAULT_DEGRADED);
    }
    robot
        .coordinator
        .apply_transition(|mode| on_startup(mode, health.halted()));

    // 11. Static gyro calibration: 100 samples × 10 ms = 1 s, robot held still
    let mut sensing = SensingActivity::new();
    if imu_init.result.is_ok() {
        let mut calibrator = GyroCalibrator::new();
        for i in 0..GYRO_CALIBRATION_SAMPLES {
            if let Ok(reading) = imu.read_tilt() {
                calibrator.push(&reading);
            }
            if i % 10 == 0 {
                led.toggle();
            }
            Timer::after(Duration::from_millis(10)).await;
        }
        let bias = calibrator.bias();
        defmt::info!(
            "gyro bias ({} samples): {} {} {}",
            calibrator.count(),
            bias[0],
            bias[1],
            bias[2]
        );
        sensing.set_gyro_bias(bias);
        led.set_high(); // Calibration done
    }

    // 12. Spawn all tasks
    if imu_init.result.is_ok() {
        spawner.spawn(sensor_task(imu, sensing, robot)).unwrap();
    }
    spawner.spawn(control_task(motors, robot)).unwrap();
    spawner.spawn(standup_task(servo, robot)).unwrap();

    match radio {
        Ok(uart) => {
            let (radio_tx, radio_rx) = uart.split();
            spawner.spawn(radio_tx_task(radio_tx)).unwrap();
            spawner.spawn(link_task(radio_rx, robot)).unwrap();
        }
        Err(_) => robot.coordinator.raise_fault(FAULT_LINK),
    }
    spawner.spawn(telemetry_task(usb_serial, robot)).unwrap();

    match gps_uart {
        Ok(uart) => spawner.spawn(gps_task(uart, robot)).unwrap(),
        Err(_) => robot.coordinator.raise_fault(FAULT_GPS),
    }

    // 13. Main task: LED heartbeat, 1 Hz when running, 5 Hz after a halt
    let blink = if health.halted() { 100 } else { 500 };
    loop {
        led.toggle();
        Timer::after(Duration::from_millis(blink)).await;
    }
}
