use std::{path::PathBuf, time::Duration};

use clap::{Args, Parser, ValueEnum};
use common::frame::FrameGeometry;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::{
    controls::DISTANCE_THRESHOLD_CM,
    sensing::{frame_acquirer::FRAME_TIMEOUT, range_sensor::ECHO_TIMEOUT},
    tasks::control_loop::ControlSettings,
};

const DATA_ROLES: [&str; 8] = ["d0", "d1", "d2", "d3", "d4", "d5", "d6", "d7"];

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Pin {pin} is assigned to both {first} and {second}.")]
    DuplicatePin {
        pin: u8,
        first: &'static str,
        second: &'static str,
    },

    #[error("Expected 8 data pins, got {0}.")]
    DataPinCount(usize),

    #[error("Invalid frame geometry '{0}'. Expected WIDTHxHEIGHTxBYTES with non-zero values.")]
    InvalidGeometry(String),

    #[error("Distance threshold must be a positive number of centimeters, got {0}.")]
    InvalidThreshold(f32),

    #[error("Cycle interval must be non-zero.")]
    ZeroInterval,

    #[error("Simulated distance schedule is empty.")]
    EmptyDistanceSchedule,

    #[error("Simulated distance {0} is not a valid distance.")]
    InvalidDistance(f32),
}

/// Where the lines come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// Simulated ranging bench and synthetic camera. No hardware needed.
    Simulated,

    /// Raspberry Pi GPIO. Requires the `rpi` feature.
    Rpi,
}

/// BCM pin numbers for every line role.
#[derive(Debug, Clone, Args)]
pub struct PinAssignment {
    #[arg(long, default_value_t = 17)]
    pub trigger_pin: u8,

    #[arg(long, default_value_t = 27)]
    pub echo_pin: u8,

    #[arg(long, default_value_t = 22)]
    pub fan_pin: u8,

    #[arg(long, default_value_t = 23)]
    pub light_pin: u8,

    /// Master clock output for the camera.
    #[arg(long, default_value_t = 4)]
    pub xclk_pin: u8,

    #[arg(long, default_value_t = 5)]
    pub vsync_pin: u8,

    #[arg(long, default_value_t = 6)]
    pub href_pin: u8,

    #[arg(long, default_value_t = 13)]
    pub pclk_pin: u8,

    /// Camera data pins D0 to D7, comma separated.
    #[arg(long, value_delimiter = ',', default_value = "12,16,20,21,19,26,25,24")]
    pub data_pins: Vec<u8>,
}

impl PinAssignment {
    /// Every role and its pin.
    pub fn roles(&self) -> Vec<(&'static str, u8)> {
        let mut roles = vec![
            ("trigger", self.trigger_pin),
            ("echo", self.echo_pin),
            ("fan", self.fan_pin),
            ("light", self.light_pin),
            ("xclk", self.xclk_pin),
            ("vsync", self.vsync_pin),
            ("href", self.href_pin),
            ("pclk", self.pclk_pin),
        ];
        roles.extend(DATA_ROLES.iter().copied().zip(self.data_pins.iter().copied()));
        roles
    }

    pub fn data(&self) -> Result<[u8; 8], ConfigError> {
        self.data_pins
            .as_slice()
            .try_into()
            .map_err(|_| ConfigError::DataPinCount(self.data_pins.len()))
    }

    /// Reject a wrong data pin count and any pin used by two roles.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.data()?;
        let roles = self.roles();
        for (i, (first, pin)) in roles.iter().enumerate() {
            if let Some((second, _)) = roles[i + 1..].iter().find(|(_, other)| other == pin) {
                return Err(ConfigError::DuplicatePin {
                    pin: *pin,
                    first: *first,
                    second: *second,
                });
            }
        }
        Ok(())
    }
}

pub fn parse_geometry(text: &str) -> Result<FrameGeometry, ConfigError> {
    let invalid = || ConfigError::InvalidGeometry(text.to_string());
    let parts: Vec<&str> = text.trim().split('x').collect();
    let [width, height, bytes] = parts.as_slice() else {
        return Err(invalid());
    };
    FrameGeometry::new(
        width.parse().map_err(|_| invalid())?,
        height.parse().map_err(|_| invalid())?,
        bytes.parse().map_err(|_| invalid())?,
    )
    .map_err(|_| invalid())
}

/// Presence-triggered relay control and frame capture.
#[derive(Debug, Clone, Parser)]
#[command(version, about)]
pub struct Cli {
    #[arg(long, value_enum, default_value_t = Backend::Simulated)]
    pub backend: Backend,

    /// Presence threshold in centimeters (exclusive).
    #[arg(long, default_value_t = DISTANCE_THRESHOLD_CM)]
    pub threshold_cm: f32,

    /// Delay between control cycles.
    #[arg(long, default_value_t = 2000)]
    pub interval_ms: u64,

    /// Bound on each echo wait.
    #[arg(long, default_value_t = ECHO_TIMEOUT.as_millis() as u64)]
    pub echo_timeout_ms: u64,

    /// Bound on each wait during frame capture.
    #[arg(long, default_value_t = FRAME_TIMEOUT.as_millis() as u64)]
    pub frame_timeout_ms: u64,

    /// Frame geometry as WIDTHxHEIGHTxBYTES_PER_PIXEL.
    #[arg(long, default_value = "320x240x2", value_parser = parse_geometry)]
    pub geometry: FrameGeometry,

    /// Directory captured frames are archived to.
    #[arg(long)]
    pub capture_dir: Option<PathBuf>,

    /// Classification service endpoint frames are posted to.
    #[arg(long)]
    pub classifier_url: Option<String>,

    #[arg(long, default_value_t = 5000)]
    pub classifier_timeout_ms: u64,

    /// Address of the liveness endpoint.
    #[arg(long, default_value = "0.0.0.0:8080")]
    pub liveness_addr: String,

    /// Hand partial frames to the sinks instead of discarding them.
    #[arg(long)]
    pub forward_partial_frames: bool,

    /// Distances in centimeters replayed by the simulated backend.
    #[arg(long, value_delimiter = ',', default_value = "300,180,180,220")]
    pub sim_distances: Vec<f32>,

    #[arg(long, default_value = "info")]
    pub log_level: LevelFilter,

    #[command(flatten)]
    pub pins: PinAssignment,
}

impl Cli {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.pins.validate()?;
        if !self.threshold_cm.is_finite() || self.threshold_cm <= 0f32 {
            return Err(ConfigError::InvalidThreshold(self.threshold_cm));
        }
        if self.interval_ms == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        if self.sim_distances.is_empty() {
            return Err(ConfigError::EmptyDistanceSchedule);
        }
        if let Some(bad) = self
            .sim_distances
            .iter()
            .find(|d| !d.is_finite() || **d < 0f32)
        {
            return Err(ConfigError::InvalidDistance(*bad));
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn classifier_timeout(&self) -> Duration {
        Duration::from_millis(self.classifier_timeout_ms)
    }

    pub fn control_settings(&self) -> ControlSettings {
        ControlSettings {
            threshold_cm: self.threshold_cm,
            echo_timeout: Duration::from_millis(self.echo_timeout_ms),
            frame_timeout: Duration::from_millis(self.frame_timeout_ms),
            geometry: self.geometry,
            forward_partial_frames: self.forward_partial_frames,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("occupancy_sentinel").chain(args.iter().copied()))
            .expect("Failed to parse arguments.")
    }

    #[test]
    fn test_defaults() {
        let cli = parse(&[]);
        cli.validate().expect("Defaults should be valid.");

        assert_eq!(cli.backend, Backend::Simulated);
        assert_eq!(cli.threshold_cm, 200f32);
        assert_eq!(cli.interval(), Duration::from_secs(2));
        assert_eq!(cli.geometry.frame_bytes(), 153_600);
        assert_eq!(cli.sim_distances, vec![300f32, 180f32, 180f32, 220f32]);
        assert_eq!(cli.pins.data().expect("Failed to get data pins."), [12, 16, 20, 21, 19, 26, 25, 24]);
        assert_eq!(cli.liveness_addr, "0.0.0.0:8080");
        assert!(!cli.forward_partial_frames);
        assert_eq!(cli.log_level, LevelFilter::INFO);

        let settings = cli.control_settings();
        assert_eq!(settings.echo_timeout, ECHO_TIMEOUT);
        assert_eq!(settings.frame_timeout, FRAME_TIMEOUT);
        assert_eq!(settings.echo_timeout, Duration::from_secs(1));
        assert_eq!(settings.frame_timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_overrides() {
        let cli = parse(&[
            "--backend",
            "rpi",
            "--geometry",
            "160x120x1",
            "--sim-distances",
            "50,60",
            "--forward-partial-frames",
            "--capture-dir",
            "/tmp/frames",
        ]);
        assert_eq!(cli.backend, Backend::Rpi);
        assert_eq!(cli.geometry.row_bytes(), 160);
        assert_eq!(cli.sim_distances, vec![50f32, 60f32]);
        assert!(cli.forward_partial_frames);
        assert_eq!(cli.capture_dir, Some(PathBuf::from("/tmp/frames")));
    }

    #[test]
    fn test_duplicate_pin_is_rejected() {
        let cli = parse(&["--light-pin", "13"]);
        assert_eq!(
            cli.validate(),
            Err(ConfigError::DuplicatePin {
                pin: 13,
                first: "light",
                second: "pclk"
            })
        );
    }

    #[test]
    fn test_duplicate_data_pin_is_rejected() {
        let cli = parse(&["--data-pins", "12,16,20,21,19,26,25,17"]);
        assert!(matches!(
            cli.validate(),
            Err(ConfigError::DuplicatePin { pin: 17, .. })
        ));
    }

    #[test]
    fn test_wrong_data_pin_count_is_rejected() {
        let cli = parse(&["--data-pins", "12,16,20"]);
        assert_eq!(cli.validate(), Err(ConfigError::DataPinCount(3)));
    }

    #[test]
    fn test_invalid_geometry_is_rejected() {
        assert!(parse_geometry("320x240").is_err());
        assert!(parse_geometry("0x240x2").is_err());
        assert!(parse_geometry("axbxc").is_err());
        assert!(Cli::try_parse_from(["occupancy_sentinel", "--geometry", "1x1"]).is_err());
        assert_eq!(
            parse_geometry(" 4x2x2 ").expect("Failed to parse geometry.").frame_bytes(),
            16
        );
    }

    #[test]
    fn test_bad_values_are_rejected() {
        assert_eq!(
            parse(&["--threshold-cm", "0"]).validate(),
            Err(ConfigError::InvalidThreshold(0f32))
        );
        assert_eq!(
            parse(&["--interval-ms", "0"]).validate(),
            Err(ConfigError::ZeroInterval)
        );
        assert_eq!(
            parse(&["--sim-distances=-5"]).validate(),
            Err(ConfigError::InvalidDistance(-5f32))
        );
    }
}
