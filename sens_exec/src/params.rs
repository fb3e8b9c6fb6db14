//! # Sensor Executable Parameters

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::Deserialize;

use crate::adc::AdcIc;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Parameters for `sens_exec`, one section per device.
#[derive(Debug, Deserialize, Default)]
pub struct SensExecParams {
    pub temperature: TemperatureParams,
    pub ultrasonic: UltrasonicParams,
    pub light: LightParams,
    pub relay: RelayParams,
    pub adc: AdcParams,
}

#[derive(Debug, Deserialize, Default)]
pub struct TemperatureParams {
    /// BCM pin the 1-Wire bus is on. Informational, the bus is configured by the `w1-gpio`
    /// device tree overlay.
    pub one_wire_pin: u8,

    /// Directory the kernel lists 1-Wire devices in
    pub devices_dir: String,

    /// Units: seconds
    pub period_s: f64,

    /// Time between re-reads while the CRC is bad.
    ///
    /// Units: seconds
    pub crc_retry_interval_s: f64,

    /// Units: seconds
    pub crc_timeout_s: f64,

    /// Maximum time to wait for the device to be enumerated at startup.
    ///
    /// Units: seconds
    pub device_wait_timeout_s: f64,
}

#[derive(Debug, Deserialize, Default)]
pub struct UltrasonicParams {
    /// BCM pin
    pub trigger_pin: u8,

    /// BCM pin
    pub echo_pin: u8,

    /// Units: seconds
    pub period_s: f64,

    /// Maximum time to wait for each edge of the echo.
    ///
    /// Units: seconds
    pub echo_timeout_s: f64,

    /// Units: centimeters
    pub min_range_cm: f64,

    /// Units: centimeters
    pub max_range_cm: f64,
}

#[derive(Debug, Deserialize, Default)]
pub struct LightParams {
    /// BCM pin
    pub pin: u8,

    /// Units: seconds
    pub period_s: f64,

    /// Units: seconds
    pub discharge_time_s: f64,

    /// Units: seconds
    pub charge_timeout_s: f64,
}

#[derive(Debug, Deserialize, Default)]
pub struct RelayParams {
    /// BCM pin
    pub pin: u8,

    /// Time between toggles.
    ///
    /// Units: seconds
    pub period_s: f64,
}

#[derive(Debug, Deserialize, Default)]
pub struct AdcParams {
    pub i2c_bus: u8,

    /// 7 bit I2C address
    pub address: u8,

    pub ic: AdcIc,

    /// Full scale range, one of 6144, 4096, 2048, 1024, 512 or 256.
    ///
    /// Units: millivolts
    pub gain_mv: u16,

    /// Samples per second
    pub sps: u16,

    /// Inputs to read each cycle
    pub channels: Vec<u8>,

    /// Units: seconds
    pub period_s: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        let params: SensExecParams = toml::from_str(r#"
            [temperature]
            one_wire_pin = 4
            devices_dir = "/sys/bus/w1/devices"
            period_s = 1.0
            crc_retry_interval_s = 0.2
            crc_timeout_s = 5.0
            device_wait_timeout_s = 10.0

            [ultrasonic]
            trigger_pin = 17
            echo_pin = 27
            period_s = 0.8
            echo_timeout_s = 0.1
            min_range_cm = 2.0
            max_range_cm = 300.0

            [light]
            pin = 26
            period_s = 1.0
            discharge_time_s = 0.1
            charge_timeout_s = 2.0

            [relay]
            pin = 10
            period_s = 1.0

            [adc]
            i2c_bus = 1
            address = 0x48
            ic = "Ads1115"
            gain_mv = 4096
            sps = 64
            channels = [0, 1, 2, 3]
            period_s = 0.5
        "#).unwrap();

        assert_eq!(params.ultrasonic.echo_pin, 27);
        assert_eq!(params.adc.address, 0x48);
        assert_eq!(params.adc.ic, AdcIc::Ads1115);
        assert_eq!(params.adc.channels, vec![0, 1, 2, 3]);
    }
}
