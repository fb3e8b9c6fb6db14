//! # DS18B20 Temperature Sensor
//!
//! The sensor is read through the kernel's 1-Wire driver (`w1-gpio` overlay), which exposes each
//! device as `/sys/bus/w1/devices/28-*/w1_slave`. Reading that file triggers a conversion and
//! returns two lines:
//!
//! ```text
//! 72 01 4b 46 7f ff 0e 10 57 : crc=57 YES
//! 72 01 4b 46 7f ff 0e 10 57 t=23125
//! ```
//!
//! The first line ends in `YES` when the CRC matched, the second carries the temperature in
//! thousandths of a degree.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    fmt,
    fs,
    path::{Path, PathBuf},
    time::Duration
};
use log::{debug, trace};
use util::poll::{poll_until, PollOutcome};

use crate::Sensor;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Family code prefix of DS18B20 device directories.
const DS18B20_FAMILY_PREFIX: &str = "28";

/// Name of the data file inside a device directory.
const SLAVE_FILE_NAME: &str = "w1_slave";

/// Interval between looking for the device directory during discovery.
const DISCOVERY_INTERVAL: Duration = Duration::from_millis(500);

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A DS18B20 attached to the 1-Wire bus.
pub struct Ds18b20 {
    device_file: PathBuf,

    /// Time between reads while the CRC is bad
    crc_retry_interval: Duration,

    /// Time after which a sample with a bad CRC is abandoned
    crc_timeout: Duration,
}

/// A temperature reading.
///
/// Units: degrees Celsius
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Temperature(pub f64);

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(thiserror::Error, Debug)]
pub enum TemperatureError {
    #[error("No DS18B20 appeared in {0:?} before the timeout")]
    DeviceNotFound(PathBuf),

    #[error("Could not read {0:?}: {1}")]
    ReadError(PathBuf, std::io::Error),

    #[error("The sensor did not return a valid CRC before the timeout")]
    CrcTimeout,

    #[error("Sensor data is malformed: {0:?}")]
    Malformed(String),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Ds18b20 {
    /// Wait for the first DS18B20 to appear in `devices_dir` and open it.
    ///
    /// The 1-Wire driver takes a moment to enumerate the bus after the pull-up is enabled, so the
    /// directory is checked every 0.5 s until `timeout`. A blind first read is made once the
    /// device is found, the first conversion after power up is not reliable.
    pub fn discover<P: AsRef<Path>>(
        devices_dir: P,
        timeout: Duration,
        crc_retry_interval: Duration,
        crc_timeout: Duration
    ) -> Result<Self, TemperatureError> {
        let devices_dir = devices_dir.as_ref();
        let mut device_dir = None;

        let found = util::poll::wait_for(timeout, DISCOVERY_INTERVAL, || {
            device_dir = find_device_dir(devices_dir);
            device_dir.is_some()
        });

        let device_dir = match (found, device_dir) {
            (true, Some(d)) => d,
            _ => return Err(TemperatureError::DeviceNotFound(devices_dir.to_path_buf()))
        };

        debug!("Found DS18B20 at {:?}", device_dir);

        let sensor = Self::open(device_dir.join(SLAVE_FILE_NAME), crc_retry_interval, crc_timeout);
        sensor.read_raw()?;

        Ok(sensor)
    }

    /// Use an explicit data file.
    pub fn open<P: AsRef<Path>>(
        device_file: P,
        crc_retry_interval: Duration,
        crc_timeout: Duration
    ) -> Self {
        Self {
            device_file: device_file.as_ref().to_path_buf(),
            crc_retry_interval,
            crc_timeout
        }
    }

    /// Read the temperature, re-reading the device while its CRC is bad.
    pub fn read_temperature(&self) -> Result<Temperature, TemperatureError> {
        let mut value = None;

        let outcome = poll_until(
            self.crc_timeout,
            self.crc_retry_interval,
            || -> Result<bool, TemperatureError> {
                let contents = self.read_raw()?;
                value = parse_w1_slave(&contents)?;
                if value.is_none() {
                    trace!("Bad CRC, retrying");
                }
                Ok(value.is_some())
            },
            || false
        )?;

        match (outcome, value) {
            (PollOutcome::Complete, Some(t)) => Ok(Temperature(t)),
            _ => Err(TemperatureError::CrcTimeout)
        }
    }

    fn read_raw(&self) -> Result<String, TemperatureError> {
        fs::read_to_string(&self.device_file)
            .map_err(|e| TemperatureError::ReadError(self.device_file.clone(), e))
    }
}

impl Sensor for Ds18b20 {
    type Reading = Temperature;
    type Error = TemperatureError;

    fn name(&self) -> &'static str {
        "DS18B20"
    }

    fn sample(&mut self) -> Result<Temperature, TemperatureError> {
        self.read_temperature()
    }
}

impl fmt::Display for Temperature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Temperature: {:.3} °C", self.0)
    }
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Parse the contents of a `w1_slave` file.
///
/// Returns `Ok(None)` if the CRC check failed and the file should be read again.
pub fn parse_w1_slave(contents: &str) -> Result<Option<f64>, TemperatureError> {
    let mut lines = contents.lines();

    let crc_line = lines.next()
        .ok_or_else(|| TemperatureError::Malformed(contents.to_string()))?;
    if !crc_line.trim().ends_with("YES") {
        return Ok(None)
    }

    let data_line = lines.next()
        .ok_or_else(|| TemperatureError::Malformed(contents.to_string()))?;
    let millis = data_line
        .find("t=")
        .map(|i| data_line[i + 2..].trim())
        .and_then(|s| s.parse::<f64>().ok())
        .ok_or_else(|| TemperatureError::Malformed(data_line.to_string()))?;

    Ok(Some(millis / 1000.0))
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Find the first DS18B20 directory, sorted by name so the choice is stable.
fn find_device_dir(devices_dir: &Path) -> Option<PathBuf> {
    let mut dirs: Vec<PathBuf> = fs::read_dir(devices_dir).ok()?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().starts_with(DS18B20_FAMILY_PREFIX))
        .map(|entry| entry.path())
        .collect();
    dirs.sort();

    dirs.into_iter().next()
}
