use core::f32::consts::PI;
use core::sync::atomic::{AtomicI32, Ordering};

use crate::config::{ENCODER_PPR, SPEED_WINDOW_MS, WHEEL_DIAMETER_CM};
use crate::hal::{Side, WheelEncoders};

/// Gray-code transition decoder for one A/B channel pair.
///
/// Fed the pin levels after every edge; invalid transitions (both pins
/// changed, i.e. a missed edge) count as zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct QuadratureDecoder {
    last: u8,
}

impl QuadratureDecoder {
    pub const fn new() -> Self {
        Self { last: 0 }
    }

    /// Seed with the current pin levels so the first edge decodes correctly.
    pub fn with_levels(a: bool, b: bool) -> Self {
        Self { last: encode(a, b) }
    }

    /// Returns +1, -1 or 0.
    pub fn step(&mut self, a: bool, b: bool) -> i32 {
        let current = encode(a, b);
        let transition = (self.last << 2) | current;
        self.last = current;

        match transition {
            0b1101 | 0b0100 | 0b0010 | 0b1011 => 1,
            0b1110 | 0b0111 | 0b0001 | 0b1000 => -1,
            _ => 0,
        }
    }
}

fn encode(a: bool, b: bool) -> u8 {
    ((a as u8) << 1) | b as u8
}

/// Tick counters shared between the encoder interrupts and the sensing loop.
pub struct WheelTicks {
    left: AtomicI32,
    right: AtomicI32,
}

impl WheelTicks {
    pub const fn new() -> Self {
        Self {
            left: AtomicI32::new(0),
            right: AtomicI32::new(0),
        }
    }

    /// Interrupt side. Never blocks.
    pub fn add(&self, side: Side, delta: i32) {
        if delta != 0 {
            self.counter(side).fetch_add(delta, Ordering::Relaxed);
        }
    }

    /// Both counters taken in the same critical section.
    pub fn snapshot(&self) -> (i32, i32) {
        critical_section::with(|_| {
            (
                self.left.load(Ordering::Relaxed),
                self.right.load(Ordering::Relaxed),
            )
        })
    }

    fn counter(&self, side: Side) -> &AtomicI32 {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }
}

impl Default for WheelTicks {
    fn default() -> Self {
        Self::new()
    }
}

impl WheelEncoders for WheelTicks {
    fn read_wheel_ticks(&self, side: Side) -> i32 {
        self.counter(side).load(Ordering::Relaxed)
    }
}

/// Ticks to centimetres travelled at the wheel rim.
pub fn ticks_to_cm(ticks: i32) -> f32 {
    ticks as f32 / ENCODER_PPR as f32 * PI * WHEEL_DIAMETER_CM
}

/// Windowed speed estimate from a cumulative tick count.
///
/// The speed is only re-estimated once [`SPEED_WINDOW_MS`] has elapsed, so
/// a 50 Hz caller sees it change every fifth cycle.
#[derive(Debug, Clone, Copy, Default)]
pub struct WheelSpeed {
    last_ticks: i32,
    last_ms: u64,
    speed: f32,
    primed: bool,
}

impl WheelSpeed {
    pub const fn new() -> Self {
        Self {
            last_ticks: 0,
            last_ms: 0,
            speed: 0.0,
            primed: false,
        }
    }

    /// Feed the current tick count; returns the speed in cm/s.
    pub fn update(&mut self, ticks: i32, now_ms: u64) -> f32 {
        if !self.primed {
            self.last_ticks = ticks;
            self.last_ms = now_ms;
            self.primed = true;
            return self.speed;
        }

        let elapsed = now_ms.saturating_sub(self.last_ms);
        if elapsed >= SPEED_WINDOW_MS as u64 {
            let distance = ticks_to_cm(ticks.wrapping_sub(self.last_ticks));
            self.speed = distance / (elapsed as f32 / 1000.0);
            self.last_ticks = ticks;
            self.last_ms = now_ms;
        }
        self.speed
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    // A leads B: 00 -> 10 -> 11 -> 01 -> 00
    const FORWARD: [(bool, bool); 4] = [(true, false), (true, true), (false, true), (false, false)];
    const REVERSE: [(bool, bool); 4] = [(false, true), (true, true), (true, false), (false, false)];

    #[test]
    fn quadrature_counts_both_directions() {
        let mut dec = QuadratureDecoder::new();
        let fwd: i32 = FORWARD.iter().cycle().take(40).map(|&(a, b)| dec.step(a, b)).sum();

        let mut dec = QuadratureDecoder::new();
        let rev: i32 = REVERSE.iter().cycle().take(40).map(|&(a, b)| dec.step(a, b)).sum();

        assert_eq!(fwd, 40);
        assert_eq!(rev, -fwd);
    }

    #[test]
    fn quadrature_ignores_skipped_and_repeated_states() {
        let mut dec = QuadratureDecoder::with_levels(false, false);
        assert_eq!(dec.step(false, false), 0);
        // 00 -> 11 skips a state
        assert_eq!(dec.step(true, true), 0);
    }

    #[test]
    fn ticks_snapshot() {
        let ticks = WheelTicks::new();
        ticks.add(Side::Left, 5);
        ticks.add(Side::Right, -3);
        ticks.add(Side::Left, -1);
        assert_eq!(ticks.snapshot(), (4, -3));
        assert_eq!(ticks.read_wheel_ticks(Side::Right), -3);
    }

    #[test]
    fn one_revolution_is_one_circumference() {
        let d = ticks_to_cm(ENCODER_PPR);
        assert!((d - PI * WHEEL_DIAMETER_CM).abs() < 1e-4);
    }

    #[test]
    fn speed_updates_once_per_window() {
        let mut speed = WheelSpeed::new();
        assert_eq!(speed.update(0, 1000), 0.0);
        // inside the window: unchanged
        assert_eq!(speed.update(100, 1050), 0.0);

        // one revolution in 200 ms
        let v = speed.update(ENCODER_PPR, 1200);
        let expected = PI * WHEEL_DIAMETER_CM / 0.2;
        assert!((v - expected).abs() < 1e-2, "v = {v}");

        let v = speed.update(0, 1400);
        assert!((v + expected).abs() < 1e-2, "v = {v}");
    }
}
