//! Packet timestamps (year + day-of-year + time of day, millisecond
//! resolution).
//!
//! [`PacketTime`] is decoded from the BCD fields of the 16-byte packet
//! header and from the 16-character ASCII timestamps carried in event
//! header and trailer payloads.

use std::fmt;

/// Millisecond-precision timestamp as carried in RT-130 packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketTime {
    pub year: u16,
    pub doy: u16,         // 1-366
    pub hour: u8,         // 0-23
    pub minute: u8,       // 0-59
    pub second: u8,       // 0-59
    pub millisecond: u16, // 0-999
}

impl PacketTime {
    /// All-zero timestamp, used when an ASCII time field is blank.
    pub fn zero() -> Self {
        Self {
            year: 0,
            doy: 0,
            hour: 0,
            minute: 0,
            second: 0,
            millisecond: 0,
        }
    }

    /// Parse a 16-character `YYYYDDDHHMMSSTTT` ASCII timestamp.
    ///
    /// A leading space or any unparsable digit group yields the zero
    /// timestamp, matching how recorders pad unset time fields.
    pub fn from_ascii(s: &str) -> Self {
        if s.len() < 16 || s.starts_with(' ') {
            return Self::zero();
        }
        let parse = |range: std::ops::Range<usize>| s.get(range).and_then(|t| t.parse().ok());
        match (
            parse(0..4),
            parse(4..7),
            parse(7..9),
            parse(9..11),
            parse(11..13),
            parse(13..16),
        ) {
            (Some(year), Some(doy), Some(hour), Some(minute), Some(second), Some(millisecond)) => {
                Self {
                    year,
                    doy,
                    hour: hour as u8,
                    minute: minute as u8,
                    second: second as u8,
                    millisecond,
                }
            }
            _ => Self::zero(),
        }
    }

    /// Render as the compact `YYYYDDDHHMMSSTTT` form used in ASCII fields.
    pub fn to_compact(self) -> String {
        format!(
            "{:04}{:03}{:02}{:02}{:02}{:03}",
            self.year, self.doy, self.hour, self.minute, self.second, self.millisecond
        )
    }

    /// Seconds since the Unix epoch, with millisecond fraction.
    pub fn epoch_seconds(self) -> f64 {
        let mut days: i64 = 0;
        if self.year >= 1970 {
            for y in 1970..self.year {
                days += if is_leap(y) { 366 } else { 365 };
            }
        }
        days += i64::from(self.doy).saturating_sub(1);
        let secs = days * 86_400
            + i64::from(self.hour) * 3_600
            + i64::from(self.minute) * 60
            + i64::from(self.second);
        secs as f64 + f64::from(self.millisecond) / 1_000.0
    }
}

fn is_leap(year: u16) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

impl Default for PacketTime {
    fn default() -> Self {
        Self::zero()
    }
}

impl fmt::Display for PacketTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}:{:03}:{:02}:{:02}:{:02}:{:03}",
            self.year, self.doy, self.hour, self.minute, self.second, self.millisecond
        )
    }
}
