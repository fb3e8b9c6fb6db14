//! # Channel Configuration
//!
//! Each channel is described by two XML files read at startup:
//!
//! - The settings file exported by the Maestro Control Center, holding the hardware limits of each
//!   channel in quarter-microseconds:
//!
//!   ```xml
//!   <Channel name="head" mode="Servo" min="2432" max="8832" homemode="Goto" home="5600"
//!            speed="11" acceleration="0" neutral="6000" range="1905" />
//!   ```
//!
//! - The limits file, holding the user facing limits of the channel at the same position:
//!
//!   ```xml
//!   <Channel user_min_radians="-0.7" user_max_radians="0.7" range_degrees="180"
//!            default_speed="20" default_acceleration="0" pololu_vel_min="5"
//!            pololu_vel_max="150" />
//!   ```
//!
//! Channels with an empty name are not in use and are skipped, the channel number is the position
//! of the element in the settings file.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{fs, path::{Path, PathBuf}, str::FromStr};
use roxmltree::{Document, Node};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

const CHANNEL_TAG: &str = "Channel";

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Static description of one servo channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelConfig {
    /// Name of the joint, used to address the channel
    pub id: String,

    /// Physical channel on the board
    pub channel: u8,

    /// Home position.
    ///
    /// Units: quarter-microseconds
    pub home_us: u16,

    /// Lowest position the servo can reach.
    ///
    /// Units: quarter-microseconds
    pub min_possible_us: u16,

    /// Highest position the servo can reach.
    ///
    /// Units: quarter-microseconds
    pub max_possible_us: u16,

    /// Lowest angle the user allows. Always negative or zero.
    ///
    /// Units: radians
    pub user_min_rad: f64,

    /// Highest angle the user allows.
    ///
    /// Units: radians
    pub user_max_rad: f64,

    /// Full travel of the servo between `min_possible_us` and `max_possible_us`.
    ///
    /// Units: degrees
    pub range_deg: f64,

    /// Speed used when a command gives none, 0-100
    pub default_velocity: f64,

    /// Acceleration used when a command gives none, in Maestro units
    pub default_acceleration: u16,

    /// Maestro speed at 0 %
    pub vel_min: u16,

    /// Maestro speed at 100 %
    pub vel_max: u16,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read {0:?}: {1}")]
    ReadError(PathBuf, std::io::Error),

    #[error("Invalid XML: {0}")]
    XmlError(#[from] roxmltree::Error),

    #[error("Channel {channel}: the {attribute:?} attribute is missing")]
    MissingAttribute {
        channel: usize,
        attribute: &'static str
    },

    #[error("Channel {channel}: cannot parse {attribute:?} from {value:?}")]
    InvalidAttribute {
        channel: usize,
        attribute: &'static str,
        value: String
    },

    #[error("Channel {0} has no entry in the limits file")]
    MissingLimits(usize),

    #[error("Channel {0} is out of the range of the controller")]
    TooManyChannels(usize),

    #[error("Two channels are named {0:?}")]
    DuplicateName(String),

    #[error("Channel {id:?} is inconsistent: {reason}")]
    Inconsistent {
        id: String,
        reason: String
    }
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ChannelConfig {
    /// Half of the servo's travel.
    ///
    /// Units: radians
    pub fn halfrange_rad(&self) -> f64 {
        self.range_deg.to_radians() / 2.0
    }

    /// Check the invariants between the hardware and user limits.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fail = |reason: String| Err(ConfigError::Inconsistent {
            id: self.id.clone(),
            reason
        });

        if self.min_possible_us >= self.max_possible_us {
            return fail(format!(
                "min {} is not below max {}", self.min_possible_us, self.max_possible_us
            ))
        }
        if self.home_us < self.min_possible_us || self.home_us > self.max_possible_us {
            return fail(format!(
                "home {} is outside [{}, {}]",
                self.home_us, self.min_possible_us, self.max_possible_us
            ))
        }
        if !(self.range_deg > 0.0) {
            return fail(format!("range of {} degrees is not positive", self.range_deg))
        }

        let halfrange = self.halfrange_rad();
        if self.user_min_rad < -halfrange || self.user_max_rad > halfrange {
            return fail(format!(
                "user range [{:.4}, {:.4}] rad exceeds the servo range [{:.4}, {:.4}] rad",
                self.user_min_rad, self.user_max_rad, -halfrange, halfrange
            ))
        }
        if self.user_max_rad < 0.0 {
            return fail(format!("user max {:.4} rad is negative", self.user_max_rad))
        }
        if self.vel_min > self.vel_max {
            return fail(format!(
                "speed bounds [{}, {}] are reversed", self.vel_min, self.vel_max
            ))
        }
        if !(0.0..=100.0).contains(&self.default_velocity) {
            return fail(format!(
                "default speed {} is not a percentage", self.default_velocity
            ))
        }

        Ok(())
    }
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Load the configuration of every named channel from the settings and limits files.
pub fn load<P: AsRef<Path>, Q: AsRef<Path>>(
    settings_path: P,
    limits_path: Q
) -> Result<Vec<ChannelConfig>, ConfigError> {
    let settings = read(settings_path.as_ref())?;
    let limits = read(limits_path.as_ref())?;

    parse(&settings, &limits)
}

/// Parse the contents of the settings and limits files.
pub fn parse(settings_xml: &str, limits_xml: &str) -> Result<Vec<ChannelConfig>, ConfigError> {
    let settings_doc = Document::parse(settings_xml)?;
    let limits_doc = Document::parse(limits_xml)?;

    let limits: Vec<Node> = channel_nodes(&limits_doc).collect();
    let mut configs: Vec<ChannelConfig> = Vec::new();

    for (index, settings) in channel_nodes(&settings_doc).enumerate() {
        let id = settings.attribute("name").unwrap_or("").trim();
        if id.is_empty() {
            continue
        }

        if configs.iter().any(|c| c.id == id) {
            return Err(ConfigError::DuplicateName(id.to_string()))
        }

        let channel = match index <= u8::MAX as usize {
            true => index as u8,
            false => return Err(ConfigError::TooManyChannels(index))
        };

        let limit = limits.get(index)
            .ok_or(ConfigError::MissingLimits(index))?;

        let config = ChannelConfig {
            id: id.to_string(),
            channel,
            home_us: attr(settings, index, "home")?,
            min_possible_us: attr(settings, index, "min")?,
            max_possible_us: attr(settings, index, "max")?,
            // The limits files use both signed and unsigned lower bounds
            user_min_rad: -attr::<f64>(*limit, index, "user_min_radians")?.abs(),
            user_max_rad: attr(*limit, index, "user_max_radians")?,
            range_deg: attr(*limit, index, "range_degrees")?,
            default_velocity: attr(*limit, index, "default_speed")?,
            default_acceleration: attr(*limit, index, "default_acceleration")?,
            vel_min: attr(*limit, index, "pololu_vel_min")?,
            vel_max: attr(*limit, index, "pololu_vel_max")?,
        };
        config.validate()?;

        configs.push(config);
    }

    Ok(configs)
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn read(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|e| ConfigError::ReadError(path.to_path_buf(), e))
}

fn channel_nodes<'a, 'input>(
    doc: &'a Document<'input>
) -> impl Iterator<Item = Node<'a, 'input>> {
    doc.descendants().filter(|n| n.has_tag_name(CHANNEL_TAG))
}

fn attr<T: FromStr>(node: Node, channel: usize, attribute: &'static str) -> Result<T, ConfigError> {
    let value = node.attribute(attribute)
        .ok_or(ConfigError::MissingAttribute { channel, attribute })?;

    value.trim().parse().map_err(|_| ConfigError::InvalidAttribute {
        channel,
        attribute,
        value: value.to_string()
    })
}
