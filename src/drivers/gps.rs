use core::str::FromStr;
use micromath::F32Ext;

use crate::hal::{GpsFix, GpsReceiver};

const SENTENCE_MAX: usize = 128;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NmeaStats {
    pub sentences_rx: u16,
    pub checksum_errors: u16,
    /// Overlong or malformed sentences
    pub frame_errors: u16,
    pub gga_count: u16,
    pub rmc_count: u16,
}

/// Position from `$xxGGA`, validity from `$xxGGA` quality and `$xxRMC` status.
///
/// Sentences without a valid `*hh` checksum are dropped.
pub struct NmeaGga {
    buffer: heapless::String<SENTENCE_MAX>,
    fix: GpsFix,
    fix_valid: bool,
    stats: NmeaStats,
}

impl NmeaGga {
    pub fn new() -> Self {
        Self {
            buffer: heapless::String::new(),
            fix: GpsFix::default(),
            fix_valid: false,
            stats: NmeaStats::default(),
        }
    }

    /// Feed raw UART bytes.
    pub fn push_data(&mut self, data: &[u8]) {
        for &b in data {
            if b == b'$' {
                self.buffer.clear();
            }

            if self.buffer.push(b as char).is_err() {
                self.stats.frame_errors = self.stats.frame_errors.wrapping_add(1);
                self.buffer.clear();
                continue;
            }

            if b == b'\n' {
                self.parse_sentence();
                self.buffer.clear();
            }
        }
    }

    pub fn has_fix(&self) -> bool {
        self.fix_valid
    }

    pub fn stats(&self) -> NmeaStats {
        self.stats
    }

    fn parse_sentence(&mut self) {
        let mut local: heapless::String<SENTENCE_MAX> = heapless::String::new();
        let _ = local.push_str(self.buffer.as_str().trim());
        let s = local.as_str();

        if s.len() < 6 || !s.starts_with('$') {
            self.stats.frame_errors = self.stats.frame_errors.wrapping_add(1);
            return;
        }

        if !verify_checksum(s) {
            self.stats.checksum_errors = self.stats.checksum_errors.wrapping_add(1);
            return;
        }
        self.stats.sentences_rx = self.stats.sentences_rx.wrapping_add(1);

        // strip "*hh" so the last field parses
        let body = s.split('*').next().unwrap_or(s);
        match body.get(3..6) {
            Some("GGA") => self.parse_gga(body),
            Some("RMC") => self.parse_rmc(body),
            _ => {}
        }
    }

    // $xxGGA,time,lat,NS,lon,EW,qual,sats,hdop,alt,M,...
    fn parse_gga(&mut self, s: &str) {
        self.stats.gga_count = self.stats.gga_count.wrapping_add(1);
        let mut parts = s.split(',');
        parts.next(); // ID
        parts.next(); // time

        let lat_raw = parts.next().unwrap_or("");
        let ns = parts.next().unwrap_or("");
        let lon_raw = parts.next().unwrap_or("");
        let ew = parts.next().unwrap_or("");
        let quality = u8::from_str(parts.next().unwrap_or("")).unwrap_or(0);
        let sats = parts.next().unwrap_or("");
        parts.next(); // hdop
        let alt = parts.next().unwrap_or("");

        if let Ok(n) = u8::from_str(sats) {
            self.fix.satellites = n;
        }
        if let Ok(a) = f32::from_str(alt) {
            self.fix.altitude = a;
        }

        let lat = f32::from_str(lat_raw).ok().filter(|v| *v != 0.0);
        let lon = f32::from_str(lon_raw).ok().filter(|v| *v != 0.0);

        match (quality, lat, lon) {
            (q, Some(lat), Some(lon)) if q > 0 => {
                let lat = deg_min_to_degrees(lat);
                let lon = deg_min_to_degrees(lon);
                self.fix.latitude = if ns == "S" { -lat } else { lat };
                self.fix.longitude = if ew == "W" { -lon } else { lon };
                self.fix_valid = true;
            }
            _ => self.fix_valid = false,
        }
    }

    // $xxRMC,time,status,... ; only the A/V status is used
    fn parse_rmc(&mut self, s: &str) {
        self.stats.rmc_count = self.stats.rmc_count.wrapping_add(1);
        let status = s.split(',').nth(2).unwrap_or("");
        if status != "A" {
            self.fix_valid = false;
        }
    }
}

impl Default for NmeaGga {
    fn default() -> Self {
        Self::new()
    }
}

impl GpsReceiver for NmeaGga {
    fn read_gps_fix(&mut self) -> Option<GpsFix> {
        self.fix_valid.then_some(self.fix)
    }
}

/// ddmm.mmmm to decimal degrees.
fn deg_min_to_degrees(raw: f32) -> f32 {
    let degrees = (raw / 100.0).floor();
    let minutes = raw - degrees * 100.0;
    degrees + minutes / 60.0
}

fn verify_checksum(s: &str) -> bool {
    if let Some((content, check_str)) = s.split_once('*') {
        let content = content.strip_prefix('$').unwrap_or(content);
        let calc = content.bytes().fold(0u8, |acc, b| acc ^ b);
        let hex = check_str.get(..2).unwrap_or(check_str);
        if let Ok(val) = u8::from_str_radix(hex.trim(), 16) {
            return calc == val;
        }
    }
    false
}
