//! Environment readings shown on the status display and reported upstream.
//!
//! The room sensor is a DHT11 on a single GPIO data line, driven through
//! `rppal` behind the `gpio` feature. [`ThermalZoneSource`] reads the board's
//! own thermal zone and only stands in where no room sensor is wired.

use crate::error::{Result, SystemError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Data bits in one DHT11 frame: humidity, temperature, checksum.
pub const DHT11_FRAME_BITS: usize = 40;

/// High pulses longer than this encode a `1` bit (26-28 us is `0`, 70 us is `1`).
pub const DHT11_ONE_THRESHOLD: Duration = Duration::from_micros(50);

/// Latest temperature/humidity reading; either value may be missing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentReading {
    /// Temperature in degrees Celsius
    pub temperature_c: Option<f32>,
    /// Relative humidity in percent
    pub humidity_pct: Option<f32>,
}

/// Read-only source of environment data.
pub trait EnvironmentSource: Send + Sync {
    fn read(&self) -> Result<EnvironmentReading>;
}

/// Board temperature from a Linux thermal zone (the SoC sensor on a Raspberry Pi).
///
/// This is the chip's temperature, not the room's. Thermal zones report
/// millidegrees Celsius and no humidity.
#[derive(Debug, Clone)]
pub struct ThermalZoneSource {
    path: PathBuf,
}

impl Default for ThermalZoneSource {
    fn default() -> Self {
        Self::new("/sys/class/thermal/thermal_zone0/temp")
    }
}

impl ThermalZoneSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl EnvironmentSource for ThermalZoneSource {
    fn read(&self) -> Result<EnvironmentReading> {
        let raw = fs::read_to_string(&self.path)?;
        let millicelsius = raw.trim().parse::<i32>().map_err(|e| {
            SystemError::system_error(format!(
                "Invalid thermal reading in {}: {}",
                self.path.display(),
                e
            ))
        })?;

        Ok(EnvironmentReading {
            temperature_c: Some(millicelsius as f32 / 1000.0),
            humidity_pct: None,
        })
    }
}

/// Decode the widths of the 40 data high pulses of a DHT11 frame.
///
/// Fails on a short frame or a checksum mismatch.
pub fn decode_dht11(high_pulses: &[Duration]) -> Result<EnvironmentReading> {
    if high_pulses.len() < DHT11_FRAME_BITS {
        return Err(SystemError::system_error(format!(
            "DHT11 frame truncated after {} bits",
            high_pulses.len()
        )));
    }

    let mut bytes = [0u8; 5];
    for (i, pulse) in high_pulses.iter().take(DHT11_FRAME_BITS).enumerate() {
        if *pulse > DHT11_ONE_THRESHOLD {
            bytes[i / 8] |= 0x80 >> (i % 8);
        }
    }

    let sum = bytes[..4]
        .iter()
        .fold(0u8, |acc, byte| acc.wrapping_add(*byte));
    if sum != bytes[4] {
        return Err(SystemError::system_error(format!(
            "DHT11 checksum mismatch: {:#04x} != {:#04x}",
            sum, bytes[4]
        )));
    }

    let humidity = f32::from(bytes[0]) + f32::from(bytes[1]) / 10.0;
    let magnitude = f32::from(bytes[2]) + f32::from(bytes[3] & 0x7f) / 10.0;
    let temperature = if bytes[3] & 0x80 != 0 {
        -magnitude
    } else {
        magnitude
    };

    Ok(EnvironmentReading {
        temperature_c: Some(temperature),
        humidity_pct: Some(humidity),
    })
}

#[cfg(feature = "gpio")]
mod dht11 {
    use super::*;
    use crate::lock_unpoisoned;
    use rppal::gpio::{Gpio, IoPin, Level, Mode, PullUpDown};
    use std::sync::Mutex;
    use std::thread;
    use std::time::Instant;

    /// Bound on any single edge wait while reading a frame.
    const EDGE_TIMEOUT: Duration = Duration::from_micros(200);

    /// The sensor needs this long between two conversions.
    const MIN_READ_SPACING: Duration = Duration::from_secs(2);

    /// DHT11 room sensor on one bidirectional data pin.
    ///
    /// The display and the monitor both poll it; reads closer together than
    /// the sensor allows are served from the last good reading.
    pub struct Dht11Source {
        pin: Mutex<IoPin>,
        last: Mutex<Option<(Instant, EnvironmentReading)>>,
    }

    impl Dht11Source {
        pub fn new(pin: u8) -> Result<Self> {
            let mut pin = Gpio::new()
                .and_then(|gpio| gpio.get(pin))
                .map_err(|e| {
                    SystemError::gpio_error(format!("Failed to claim DHT11 pin {}: {}", pin, e))
                })?
                .into_io(Mode::Input);
            pin.set_pullupdown(PullUpDown::PullUp);

            Ok(Self {
                pin: Mutex::new(pin),
                last: Mutex::new(None),
            })
        }

        fn wait_while(pin: &IoPin, level: Level) -> Result<Duration> {
            let started = Instant::now();
            while pin.read() == level {
                if started.elapsed() > EDGE_TIMEOUT {
                    return Err(SystemError::system_error(format!(
                        "DHT11 stuck {:?}",
                        level
                    )));
                }
            }
            Ok(started.elapsed())
        }

        fn read_frame(pin: &mut IoPin) -> Result<Vec<Duration>> {
            // Start signal: hold the line low for 18 ms, then release it.
            pin.set_mode(Mode::Output);
            pin.set_low();
            thread::sleep(Duration::from_millis(18));
            pin.set_high();
            pin.set_mode(Mode::Input);

            // Release, then the 80 us low/high response.
            Self::wait_while(pin, Level::High)?;
            Self::wait_while(pin, Level::Low)?;
            Self::wait_while(pin, Level::High)?;

            let mut pulses = Vec::with_capacity(DHT11_FRAME_BITS);
            for _ in 0..DHT11_FRAME_BITS {
                Self::wait_while(pin, Level::Low)?;
                pulses.push(Self::wait_while(pin, Level::High)?);
            }
            Ok(pulses)
        }
    }

    impl EnvironmentSource for Dht11Source {
        fn read(&self) -> Result<EnvironmentReading> {
            let mut last = lock_unpoisoned(&self.last);
            if let Some((at, reading)) = *last {
                if at.elapsed() < MIN_READ_SPACING {
                    return Ok(reading);
                }
            }

            let pulses = Self::read_frame(&mut lock_unpoisoned(&self.pin))?;
            let reading = decode_dht11(&pulses)?;
            *last = Some((Instant::now(), reading));
            Ok(reading)
        }
    }
}

#[cfg(feature = "gpio")]
pub use dht11::Dht11Source;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_thermal_zone_parsing() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "47250").unwrap();

        let reading = ThermalZoneSource::new(file.path()).read().unwrap();
        assert_eq!(reading.temperature_c, Some(47.25));
        assert_eq!(reading.humidity_pct, None);
    }

    fn frame(bytes: [u8; 5]) -> Vec<Duration> {
        bytes
            .iter()
            .flat_map(|byte| (0..8).map(move |bit| byte & (0x80 >> bit) != 0))
            .map(|one| Duration::from_micros(if one { 70 } else { 27 }))
            .collect()
    }

    #[test]
    fn test_dht11_decoding() {
        let reading = decode_dht11(&frame([40, 0, 23, 5, 68])).unwrap();
        assert_eq!(reading.temperature_c, Some(23.5));
        assert_eq!(reading.humidity_pct, Some(40.0));

        let below_zero = decode_dht11(&frame([55, 0, 1, 0x82, 0xba])).unwrap();
        assert_eq!(below_zero.temperature_c, Some(-1.2));
    }

    #[test]
    fn test_dht11_rejects_bad_frames() {
        let err = decode_dht11(&frame([40, 0, 23, 5, 69])).unwrap_err();
        assert!(err.to_string().contains("checksum"));

        let short = &frame([40, 0, 23, 5, 68])[..39];
        assert!(decode_dht11(short).is_err());
    }

    #[test]
    fn test_thermal_zone_errors() {
        let missing = ThermalZoneSource::new("/nonexistent/thermal_zone/temp");
        assert!(matches!(missing.read(), Err(SystemError::Io(_))));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "warm").unwrap();
        assert!(matches!(
            ThermalZoneSource::new(file.path()).read(),
            Err(SystemError::System(_))
        ));
    }
}
