use embassy_stm32::i2c::{Error, I2c};
use embassy_stm32::peripherals::{DMA1_CH0, DMA1_CH7, I2C1};
use embassy_time::{block_for, Duration};

use balance_bot::hal::{TiltReading, TiltSensor};

// ── I2C address & registers ───────────────────────────────────────────────────
const ADDR: u8 = 0x68;

const REG_SMPLRT_DIV: u8 = 0x19;
const REG_CONFIG: u8 = 0x1A;
const REG_GYRO_CONFIG: u8 = 0x1B;
const REG_ACCEL_CONFIG: u8 = 0x1C;
const REG_ACCEL_XOUT_H: u8 = 0x3B;
const REG_PWR_MGMT_1: u8 = 0x6B;
const REG_WHO_AM_I: u8 = 0x75;

const WHO_AM_I_VALUE: u8 = 0x68;
const PWR_RESET: u8 = 0x80;
/// Wake, clocked from the X gyro PLL
const PWR_CLK_PLL_X: u8 = 0x01;

/// ±2 g
const ACCEL_LSB_PER_G: f32 = 16384.0;
/// ±250 °/s
const GYRO_LSB_PER_DPS: f32 = 131.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum ImuError {
    Bus,
    WrongId(u8),
}

impl From<Error> for ImuError {
    fn from(_: Error) -> Self {
        ImuError::Bus
    }
}

pub type ImuBus = I2c<'static, I2C1, DMA1_CH7, DMA1_CH0>;

/// MPU6050 on I2C1. All accesses are blocking: a 14-byte burst at 400 kHz
/// takes well under half a millisecond.
pub struct Mpu6050 {
    i2c: ImuBus,
}

impl Mpu6050 {
    pub fn new(i2c: ImuBus) -> Self {
        Self { i2c }
    }

    /// Check identity, reset, wake and set ranges (±2 g, ±250 °/s, DLPF 44 Hz).
    pub fn init(&mut self) -> Result<(), ImuError> {
        let id = self.read_reg(REG_WHO_AM_I)?;
        if id != WHO_AM_I_VALUE {
            return Err(ImuError::WrongId(id));
        }

        self.write_reg(REG_PWR_MGMT_1, PWR_RESET)?;
        block_for(Duration::from_millis(100));
        self.write_reg(REG_PWR_MGMT_1, PWR_CLK_PLL_X)?;
        block_for(Duration::from_millis(10));

        self.write_reg(REG_CONFIG, 0x03)?;
        // 1 kHz / (1 + 9) = 100 Hz, twice the sensing rate
        self.write_reg(REG_SMPLRT_DIV, 9)?;
        self.write_reg(REG_GYRO_CONFIG, 0x00)?;
        self.write_reg(REG_ACCEL_CONFIG, 0x00)?;

        defmt::info!("MPU6050 ready");
        Ok(())
    }

    fn write_reg(&mut self, reg: u8, val: u8) -> Result<(), Error> {
        self.i2c.blocking_write(ADDR, &[reg, val])
    }

    fn read_reg(&mut self, reg: u8) -> Result<u8, Error> {
        let mut buf = [0u8; 1];
        self.i2c.blocking_write_read(ADDR, &[reg], &mut buf)?;
        Ok(buf[0])
    }
}

impl TiltSensor for Mpu6050 {
    type Error = ImuError;

    fn read_tilt(&mut self) -> Result<TiltReading, ImuError> {
        // accel xyz, temperature, gyro xyz; big-endian
        let mut raw = [0u8; 14];
        self.i2c.blocking_write_read(ADDR, &[REG_ACCEL_XOUT_H], &mut raw)?;
        Ok(scale(&raw))
    }
}

fn scale(raw: &[u8; 14]) -> TiltReading {
    let word = |i: usize| i16::from_be_bytes([raw[i], raw[i + 1]]) as f32;
    TiltReading {
        accel: [
            word(0) / ACCEL_LSB_PER_G,
            word(2) / ACCEL_LSB_PER_G,
            word(4) / ACCEL_LSB_PER_G,
        ],
        gyro: [
            word(8) / GYRO_LSB_PER_DPS,
            word(10) / GYRO_LSB_PER_DPS,
            word(12) / GYRO_LSB_PER_DPS,
        ],
    }
}
