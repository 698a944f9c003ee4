//! Configuration file management for cpr-decode.
//!
//! Reads/writes `~/.cpr-decode/config.yaml` with the receiver location and
//! range plus the decoder tuning knobs.

use std::path::{Path, PathBuf};

use crate::cpr::{FreshnessWindows, AIRBORNE_WINDOW, SURFACE_WINDOW};
use crate::geo::METERS_PER_NM;
use crate::resolve::{ResolverConfig, DEFAULT_MAX_RANGE_NM, FIX_MAX_AGE, LAST_FIX_RANGE_M};
use crate::types::{CprError, Position, Result};

/// Full configuration structure.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub receiver: ReceiverConfig,
    pub cpr: CprConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReceiverConfig {
    pub name: String,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    /// `None` disables receiver range checks.
    pub max_range_nm: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CprConfig {
    /// Seconds an airborne frame may wait for its partner.
    pub airborne_window: f64,
    /// Seconds a surface frame may wait for its partner.
    pub surface_window: f64,
    /// Range limit around the last fix for local decoding.
    pub local_range_km: f64,
    pub speed_check: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            receiver: ReceiverConfig {
                name: "default".into(),
                lat: None,
                lon: None,
                max_range_nm: Some(DEFAULT_MAX_RANGE_NM),
            },
            cpr: CprConfig {
                airborne_window: AIRBORNE_WINDOW,
                surface_window: SURFACE_WINDOW,
                local_range_km: LAST_FIX_RANGE_M / 1000.0,
                speed_check: true,
            },
        }
    }
}

impl Config {
    /// Receiver location, when both coordinates are set.
    pub fn receiver_position(&self) -> Option<Position> {
        match (self.receiver.lat, self.receiver.lon) {
            (Some(lat), Some(lon)) => Some(Position::new(lat, lon)),
            _ => None,
        }
    }

    pub fn resolver_config(&self) -> ResolverConfig {
        ResolverConfig {
            receiver: self.receiver_position(),
            max_range_m: self.receiver.max_range_nm.map(|nm| nm * METERS_PER_NM),
            windows: FreshnessWindows {
                airborne: self.cpr.airborne_window,
                surface: self.cpr.surface_window,
            },
            last_fix_range_m: self.cpr.local_range_km * 1000.0,
            fix_max_age: FIX_MAX_AGE,
            speed_check: self.cpr.speed_check,
        }
    }

    /// Reject settings the resolver cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.receiver.name.contains(['"', '\n', '\r']) {
            return Err(CprError::Config(format!(
                "receiver.name may not contain quotes or line breaks: {:?}",
                self.receiver.name
            )));
        }
        if let Some(lat) = self.receiver.lat {
            if !(-90.0..=90.0).contains(&lat) {
                return Err(CprError::Config(format!("receiver.lat out of range: {lat}")));
            }
        }
        if let Some(lon) = self.receiver.lon {
            if !(-180.0..=180.0).contains(&lon) {
                return Err(CprError::Config(format!("receiver.lon out of range: {lon}")));
            }
        }
        if let Some(nm) = self.receiver.max_range_nm {
            if !nm.is_finite() || nm <= 0.0 {
                return Err(CprError::Config(format!(
                    "receiver.max_range_nm must be positive, got {nm}"
                )));
            }
        }
        for (key, val) in [
            ("cpr.airborne_window", self.cpr.airborne_window),
            ("cpr.surface_window", self.cpr.surface_window),
            ("cpr.local_range_km", self.cpr.local_range_km),
        ] {
            if !val.is_finite() || val <= 0.0 {
                return Err(CprError::Config(format!("{key} must be positive, got {val}")));
            }
        }
        Ok(())
    }
}

/// Get the config directory path (`~/.cpr-decode/`).
pub fn config_dir() -> PathBuf {
    dirs_home().join(".cpr-decode")
}

/// Get the config file path.
pub fn config_file() -> PathBuf {
    config_dir().join("config.yaml")
}

fn dirs_home() -> PathBuf {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// Load config from `~/.cpr-decode/config.yaml`.
///
/// Returns default config if the file doesn't exist.
pub fn load_config() -> Result<Config> {
    load_config_from(&config_file())
}

pub fn load_config_from(path: &Path) -> Result<Config> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        return Ok(Config::default());
    }
    let text = std::fs::read_to_string(path)?;
    parse_config(&text)
}

/// Save config to `~/.cpr-decode/config.yaml`.
pub fn save_config(config: &Config) -> Result<PathBuf> {
    let path = config_file();
    save_config_to(config, &path)?;
    Ok(path)
}

pub fn save_config_to(config: &Config, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(path, serialize_config(config))?;
    Ok(())
}

/// Parse simple YAML-like config text.
pub fn parse_config(text: &str) -> Result<Config> {
    let mut config = Config::default();
    let mut current_section: Option<String> = None;

    for (n, line) in text.lines().enumerate() {
        let stripped = line.trim();
        if stripped.is_empty() || stripped.starts_with('#') {
            continue;
        }

        let is_indented = line.starts_with("  ") || line.starts_with('\t');

        let Some((key, val)) = stripped.split_once(':') else {
            return Err(CprError::Config(format!("line {}: expected `key: value`", n + 1)));
        };
        let key = key.trim();
        let val = val.trim();

        if !is_indented {
            current_section = val.is_empty().then(|| key.to_string());
            continue;
        }

        let bad = |what: &str| CprError::Config(format!("line {}: invalid {what}: {val}", n + 1));
        match (current_section.as_deref(), key) {
            (Some("receiver"), "name") => {
                if let Some(v) = parse_string_value(val) {
                    config.receiver.name = v;
                }
            }
            (Some("receiver"), "lat") => {
                config.receiver.lat = parse_float_value(val).map_err(|_| bad("lat"))?
            }
            (Some("receiver"), "lon") => {
                config.receiver.lon = parse_float_value(val).map_err(|_| bad("lon"))?
            }
            (Some("receiver"), "max_range_nm") => {
                config.receiver.max_range_nm =
                    parse_float_value(val).map_err(|_| bad("max_range_nm"))?
            }
            (Some("cpr"), "airborne_window") => {
                if let Some(v) = parse_float_value(val).map_err(|_| bad("airborne_window"))? {
                    config.cpr.airborne_window = v;
                }
            }
            (Some("cpr"), "surface_window") => {
                if let Some(v) = parse_float_value(val).map_err(|_| bad("surface_window"))? {
                    config.cpr.surface_window = v;
                }
            }
            (Some("cpr"), "local_range_km") => {
                if let Some(v) = parse_float_value(val).map_err(|_| bad("local_range_km"))? {
                    config.cpr.local_range_km = v;
                }
            }
            (Some("cpr"), "speed_check") => {
                config.cpr.speed_check = parse_bool_value(val).ok_or_else(|| bad("speed_check"))?
            }
            (section, key) => {
                tracing::warn!(?section, key, "ignoring unknown config key");
            }
        }
    }

    config.validate()?;
    Ok(config)
}

fn parse_string_value(val: &str) -> Option<String> {
    if val == "null" || val == "~" || val.is_empty() {
        return None;
    }
    // Strip quotes
    if val.len() >= 2
        && ((val.starts_with('"') && val.ends_with('"'))
            || (val.starts_with('\'') && val.ends_with('\'')))
    {
        return Some(val[1..val.len() - 1].to_string());
    }
    Some(val.to_string())
}

fn parse_float_value(val: &str) -> std::result::Result<Option<f64>, std::num::ParseFloatError> {
    if val == "null" || val == "~" || val.is_empty() {
        return Ok(None);
    }
    val.parse().map(Some)
}

fn parse_bool_value(val: &str) -> Option<bool> {
    match val {
        "true" | "yes" | "on" => Some(true),
        "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Serialize config to YAML-like text.
pub fn serialize_config(config: &Config) -> String {
    let opt = |v: Option<f64>| v.map_or_else(|| "null".to_string(), |v| v.to_string());

    let mut lines = vec!["# cpr-decode configuration".to_string(), String::new()];

    lines.push("receiver:".into());
    lines.push(format!("  name: \"{}\"", config.receiver.name));
    lines.push(format!("  lat: {}", opt(config.receiver.lat)));
    lines.push(format!("  lon: {}", opt(config.receiver.lon)));
    lines.push(format!("  max_range_nm: {}", opt(config.receiver.max_range_nm)));
    lines.push(String::new());

    lines.push("cpr:".into());
    lines.push(format!("  airborne_window: {}", config.cpr.airborne_window));
    lines.push(format!("  surface_window: {}", config.cpr.surface_window));
    lines.push(format!("  local_range_km: {}", config.cpr.local_range_km));
    lines.push(format!("  speed_check: {}", config.cpr.speed_check));

    lines.join("\n") + "\n"
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
