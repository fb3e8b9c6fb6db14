//! # ADS1x15 Analog to Digital Converter
//!
//! Single-shot, single-ended reads from an ADS1015 (12 bit) or ADS1115 (16 bit) over I2C.
//!
//! Each read writes the config register to start a conversion on one input, waits one sample
//! period, then reads the conversion register back.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{fmt, thread, time::Duration};
use embedded_hal::blocking::i2c::{Write, WriteRead};
use log::warn;
use serde::Deserialize;

use crate::Sensor;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Default I2C address (ADDR pin to GND).
pub const DEFAULT_ADDRESS: u8 = 0x48;

/// Number of single-ended inputs.
pub const NUM_CHANNELS: u8 = 4;

const REG_CONVERSION: u8 = 0x00;
const REG_CONFIG: u8 = 0x01;

/// Start a single conversion
const CONFIG_OS_SINGLE: u16 = 0x8000;

/// Single-ended input mux for AIN0, each following input adds `0x1000`
const CONFIG_MUX_SINGLE_0: u16 = 0x4000;

/// Single-shot mode
const CONFIG_MODE_SINGLE: u16 = 0x0100;

/// Comparator disabled, which also leaves the ALERT pin high impedance
const CONFIG_COMP_QUE_DISABLE: u16 = 0x0003;

/// Programmable gain settings as (full scale range in mV, config bits)
const PGA_BITS: [(u16, u16); 6] = [
    (6144, 0x0000),
    (4096, 0x0200),
    (2048, 0x0400),
    (1024, 0x0600),
    (512, 0x0800),
    (256, 0x0A00),
];

/// Full scale used when the requested gain isn't supported
const DEFAULT_GAIN_MV: u16 = 6144;

/// ADS1015 data rates as (samples per second, config bits)
const ADS1015_DR_BITS: [(u16, u16); 7] = [
    (128, 0x0000),
    (250, 0x0020),
    (490, 0x0040),
    (920, 0x0060),
    (1600, 0x0080),
    (2400, 0x00A0),
    (3300, 0x00C0),
];

/// ADS1115 data rates as (samples per second, config bits)
const ADS1115_DR_BITS: [(u16, u16); 8] = [
    (8, 0x0000),
    (16, 0x0020),
    (32, 0x0040),
    (64, 0x0060),
    (128, 0x0080),
    (250, 0x00A0),
    (475, 0x00C0),
    (860, 0x00E0),
];

/// Margin added to the sample period before reading back the conversion.
const CONVERSION_MARGIN: Duration = Duration::from_micros(100);

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct Ads1x15<I2C> {
    i2c: I2C,
    address: u8,
    ic: AdcIc,

    /// Full scale range actually in use.
    ///
    /// Units: millivolts
    gain_mv: u16,

    /// Sample rate actually in use.
    sps: u16,

    /// Inputs read by each sample
    channels: Vec<u8>,
}

/// One sample of every configured input.
#[derive(Debug, Clone, PartialEq)]
pub struct AdcReading {
    /// Pairs of (input, millivolts)
    pub millivolts: Vec<(u8, f64)>
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Supported converter chips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum AdcIc {
    Ads1015,
    Ads1115
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum AdcError<E: fmt::Debug> {
    #[error("Input {0} does not exist, must be 0-3")]
    InvalidChannel(u8),

    #[error("I2C error: {0:?}")]
    I2c(E)
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<I2C, E> Ads1x15<I2C>
where
    I2C: Write<Error = E> + WriteRead<Error = E>,
    E: fmt::Debug
{
    /// Create the converter.
    ///
    /// A gain the chip doesn't support falls back to ±6.144 V, a sample rate it doesn't support
    /// falls back to the chip's default (1600 SPS for the ADS1015, 250 SPS for the ADS1115).
    /// Both fallbacks are logged.
    pub fn new(
        i2c: I2C,
        address: u8,
        ic: AdcIc,
        gain_mv: u16,
        sps: u16,
        channels: Vec<u8>
    ) -> Result<Self, AdcError<E>> {
        if let Some(&c) = channels.iter().find(|&&c| c >= NUM_CHANNELS) {
            return Err(AdcError::InvalidChannel(c))
        }

        let gain_mv = if pga_bits(gain_mv).is_some() {
            gain_mv
        }
        else {
            warn!("Gain of {} mV not supported, using {} mV", gain_mv, DEFAULT_GAIN_MV);
            DEFAULT_GAIN_MV
        };

        let sps = if data_rate_bits(ic, sps).is_some() {
            sps
        }
        else {
            let default = ic.default_sps();
            warn!("{} SPS not supported by the {:?}, using {} SPS", sps, ic, default);
            default
        };

        Ok(Self {
            i2c,
            address,
            ic,
            gain_mv,
            sps,
            channels
        })
    }

    /// The config register value which starts a conversion on `channel`.
    pub fn config_word(&self, channel: u8) -> u16 {
        CONFIG_OS_SINGLE
            | (CONFIG_MUX_SINGLE_0 + ((channel as u16) << 12))
            | pga_bits(self.gain_mv).unwrap_or(0)
            | CONFIG_MODE_SINGLE
            | data_rate_bits(self.ic, self.sps).unwrap_or(0)
            | CONFIG_COMP_QUE_DISABLE
    }

    /// Read one input, in millivolts.
    pub fn read_single_ended(&mut self, channel: u8) -> Result<f64, AdcError<E>> {
        if channel >= NUM_CHANNELS {
            return Err(AdcError::InvalidChannel(channel))
        }

        let config = self.config_word(channel).to_be_bytes();
        self.i2c.write(self.address, &[REG_CONFIG, config[0], config[1]])
            .map_err(AdcError::I2c)?;

        thread::sleep(Duration::from_secs_f64(1.0 / self.sps as f64) + CONVERSION_MARGIN);

        let mut buf = [0u8; 2];
        self.i2c.write_read(self.address, &[REG_CONVERSION], &mut buf)
            .map_err(AdcError::I2c)?;

        Ok(raw_to_millivolts(self.ic, buf, self.gain_mv))
    }

    pub fn gain_mv(&self) -> u16 {
        self.gain_mv
    }

    pub fn sps(&self) -> u16 {
        self.sps
    }
}

impl<I2C, E> Sensor for Ads1x15<I2C>
where
    I2C: Write<Error = E> + WriteRead<Error = E>,
    E: fmt::Debug
{
    type Reading = AdcReading;
    type Error = AdcError<E>;

    fn name(&self) -> &'static str {
        match self.ic {
            AdcIc::Ads1015 => "ADS1015",
            AdcIc::Ads1115 => "ADS1115"
        }
    }

    fn sample(&mut self) -> Result<AdcReading, AdcError<E>> {
        let mut millivolts = Vec::with_capacity(self.channels.len());

        for channel in self.channels.clone() {
            millivolts.push((channel, self.read_single_ended(channel)?));
        }

        Ok(AdcReading { millivolts })
    }
}

impl AdcIc {
    fn default_sps(&self) -> u16 {
        match self {
            AdcIc::Ads1015 => 1600,
            AdcIc::Ads1115 => 250
        }
    }
}

impl Default for AdcIc {
    fn default() -> Self {
        AdcIc::Ads1015
    }
}

impl fmt::Display for AdcReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (channel, mv)) in self.millivolts.iter().enumerate() {
            if i > 0 {
                write!(f, " | ")?;
            }
            write!(f, "Channel {}: {:.1} mV", channel, mv)?;
        }
        Ok(())
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn pga_bits(gain_mv: u16) -> Option<u16> {
    PGA_BITS.iter().find(|(g, _)| *g == gain_mv).map(|(_, b)| *b)
}

fn data_rate_bits(ic: AdcIc, sps: u16) -> Option<u16> {
    let table: &[(u16, u16)] = match ic {
        AdcIc::Ads1015 => &ADS1015_DR_BITS,
        AdcIc::Ads1115 => &ADS1115_DR_BITS
    };

    table.iter().find(|(s, _)| *s == sps).map(|(_, b)| *b)
}

/// Convert the conversion register into millivolts.
///
/// The ADS1015 result is left aligned in the 16 bit register.
fn raw_to_millivolts(ic: AdcIc, buf: [u8; 2], gain_mv: u16) -> f64 {
    let raw = i16::from_be_bytes(buf);

    match ic {
        AdcIc::Ads1015 => (raw >> 4) as f64 * gain_mv as f64 / 2048.0,
        AdcIc::Ads1115 => raw as f64 * gain_mv as f64 / 32768.0
    }
}
