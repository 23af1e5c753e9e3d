//! Controller configuration
//!
//! Everything here is fixed at startup. The file is TOML; a missing file
//! means "use the defaults", which reproduce the stock gesture console layout:
//!
//! | Channel | Key(s) | Policy |
//! |---|---|---|
//! | 1-3, 7 | 1-3, 7 | plain, 2000 µs |
//! | 4 | 4 | gated pulse train, 1700 µs every 100 ms (vibration) |
//! | 5 | 5 / 6 | gated multi-level, 1000 / 2000 µs (drop pin left / right) |
//! | 6 | 6 | gated, 2000 µs (drop pin right) |
//! | 8 | - | pinned neutral |
//!
//! A `selector` channel (several ungated keys, one level each, latest press
//! wins) is also available for custom layouts.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::frame::{CHANNEL_COUNT, NEUTRAL_US};
use crate::keys::KeyId;
use crate::policy::{ChannelPolicy, Level, Side};

/// Startup-fatal configuration problems
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Expected 8 channels, found {0}")]
    ChannelCount(usize),
    #[error("Channel {channel}: {value} µs is outside {min}-{max} µs")]
    ValueOutOfRange {
        channel: usize,
        value: u16,
        min: u16,
        max: u16,
    },
    #[error("Channel {channel}: key 0 is reserved for arming")]
    ArmKeyAsChannel { channel: usize },
    #[error("Channel {channel}: key {key} selects more than one level")]
    DuplicateLevelKey { channel: usize, key: KeyId },
    #[error("Channel {channel}: selector has no levels")]
    EmptySelector { channel: usize },
    #[error("Key {0} drives both plain and protected channels")]
    MixedProtection(KeyId),
    #[error("Invalid pulse range {min}-{max} µs")]
    InvalidRange { min: u16, max: u16 },
    #[error("Neutral {neutral} µs is outside {min}-{max} µs")]
    NeutralOutOfRange { neutral: u16, min: u16, max: u16 },
    #[error("{0} must be greater than zero")]
    ZeroInterval(&'static str),
}

/// What happens to the last-sent snapshot when a write fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Advance the snapshot anyway; the change is lost until the next one
    #[default]
    Drop,
    /// Keep the old snapshot so the next tick sends again
    Retry,
}

/// Serial link settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Port to open; auto-detected when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Write timeout (ms)
    #[serde(default = "default_serial_timeout")]
    pub timeout_ms: u64,
}

fn default_baud_rate() -> u32 {
    keyppm_link::DEFAULT_BAUD_RATE
}
fn default_serial_timeout() -> u64 {
    100
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: default_baud_rate(),
            timeout_ms: default_serial_timeout(),
        }
    }
}

/// Valid pulse widths; also the scale of the bar display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PulseRange {
    pub min_us: u16,
    pub max_us: u16,
}

impl Default for PulseRange {
    fn default() -> Self {
        Self {
            min_us: 1000,
            max_us: 2000,
        }
    }
}

impl PulseRange {
    pub fn contains(&self, us: u16) -> bool {
        (self.min_us..=self.max_us).contains(&us)
    }

    /// Position of `us` within the range as 0.0-1.0, clamped
    pub fn ratio(&self, us: u16) -> f64 {
        if self.max_us <= self.min_us {
            return 0.0;
        }
        let clamped = us.clamp(self.min_us, self.max_us);
        f64::from(clamped - self.min_us) / f64::from(self.max_us - self.min_us)
    }
}

/// One output channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Shown in the status text while the channel's key is held
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(flatten)]
    pub policy: ChannelPolicy,
}

impl ChannelConfig {
    fn new(policy: ChannelPolicy, label: Option<&str>) -> Self {
        Self {
            label: label.map(str::to_string),
            policy,
        }
    }
}

/// Complete controller configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerConfig {
    #[serde(default)]
    pub serial: SerialConfig,
    /// Generator period (ms)
    #[serde(default = "default_tick")]
    pub tick_interval_ms: u64,
    /// Display refresh period (ms)
    #[serde(default = "default_render")]
    pub render_interval_ms: u64,
    /// Wait between stopping the generator and closing the link (ms)
    #[serde(default = "default_grace")]
    pub shutdown_grace_ms: u64,
    #[serde(default = "default_neutral")]
    pub neutral_us: u16,
    #[serde(default)]
    pub range: PulseRange,
    #[serde(default)]
    pub on_failure: FailurePolicy,
    #[serde(default = "default_channels")]
    pub channels: Vec<ChannelConfig>,
}

fn default_tick() -> u64 {
    20
}
fn default_render() -> u64 {
    50
}
fn default_grace() -> u64 {
    50
}
fn default_neutral() -> u16 {
    NEUTRAL_US
}

fn key(digit: u8) -> KeyId {
    KeyId::new(digit).unwrap_or(KeyId::ARM)
}

fn default_channels() -> Vec<ChannelConfig> {
    let plain = |k| ChannelPolicy::Plain {
        key: key(k),
        active_us: 2000,
    };
    vec![
        ChannelConfig::new(plain(1), None),
        ChannelConfig::new(plain(2), None),
        ChannelConfig::new(plain(3), None),
        ChannelConfig::new(
            ChannelPolicy::Oscillating {
                key: key(4),
                high_us: 1700,
                interval_ms: 100,
            },
            Some("Vibration"),
        ),
        ChannelConfig::new(
            ChannelPolicy::MultiLevel {
                left: Level {
                    key: key(5),
                    us: 1000,
                    label: Some("Drop Pin · Left".to_string()),
                },
                right: Level {
                    key: key(6),
                    us: 2000,
                    label: Some("Drop Pin · Right".to_string()),
                },
                idle_us: NEUTRAL_US,
                precedence: Side::Right,
            },
            Some("Drop Pin"),
        ),
        ChannelConfig::new(
            ChannelPolicy::Gated {
                key: key(6),
                active_us: 2000,
            },
            Some("Drop Pin · Right"),
        ),
        ChannelConfig::new(plain(7), None),
        ChannelConfig::new(ChannelPolicy::Pinned, None),
    ]
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            serial: SerialConfig::default(),
            tick_interval_ms: default_tick(),
            render_interval_ms: default_render(),
            shutdown_grace_ms: default_grace(),
            neutral_us: default_neutral(),
            range: PulseRange::default(),
            on_failure: FailurePolicy::default(),
            channels: default_channels(),
        }
    }
}

impl ControllerConfig {
    /// Get the default config file path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("keyppm")
            .join("keyppm.toml")
    }

    /// Load and validate config from a file, or the defaults if not found
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config = if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            Self::from_toml(&content)?
        } else {
            Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Save config to a file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(write_err)?;
        Ok(())
    }

    /// Check every cross-field invariant
    pub fn validate(&self) -> Result<(), ConfigError> {
        let PulseRange { min_us, max_us } = self.range;
        if min_us >= max_us {
            return Err(ConfigError::InvalidRange {
                min: min_us,
                max: max_us,
            });
        }
        if !self.range.contains(self.neutral_us) {
            return Err(ConfigError::NeutralOutOfRange {
                neutral: self.neutral_us,
                min: min_us,
                max: max_us,
            });
        }
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::ZeroInterval("tick_interval_ms"));
        }
        if self.render_interval_ms == 0 {
            return Err(ConfigError::ZeroInterval("render_interval_ms"));
        }
        if self.channels.len() != CHANNEL_COUNT {
            return Err(ConfigError::ChannelCount(self.channels.len()));
        }

        for (i, ch) in self.channels.iter().enumerate() {
            let channel = i + 1;
            for value in ch.policy.output_values() {
                if !self.range.contains(value) {
                    return Err(ConfigError::ValueOutOfRange {
                        channel,
                        value,
                        min: min_us,
                        max: max_us,
                    });
                }
            }
            if ch.policy.keys().iter().any(|(k, _)| k.is_arm()) {
                return Err(ConfigError::ArmKeyAsChannel { channel });
            }
            match &ch.policy {
                ChannelPolicy::Oscillating { interval_ms: 0, .. } => {
                    return Err(ConfigError::ZeroInterval("interval_ms"));
                }
                ChannelPolicy::Selector { levels, .. } if levels.is_empty() => {
                    return Err(ConfigError::EmptySelector { channel });
                }
                _ => {}
            }
            let keys = ch.policy.keys();
            for (n, (key, _)) in keys.iter().enumerate() {
                if keys[..n].iter().any(|(k, _)| k == key) {
                    return Err(ConfigError::DuplicateLevelKey {
                        channel,
                        key: *key,
                    });
                }
            }
        }

        let protected = self.protected_keys();
        for ch in self.channels.iter().filter(|ch| !ch.policy.is_gated()) {
            let shared = ch
                .policy
                .keys()
                .into_iter()
                .find(|(k, _)| protected.contains(k));
            if let Some((key, _)) = shared {
                return Err(ConfigError::MixedProtection(key));
            }
        }

        Ok(())
    }

    /// The per-channel policies as a fixed array
    pub fn channel_policies(&self) -> Result<[ChannelPolicy; CHANNEL_COUNT], ConfigError> {
        let policies: Vec<ChannelPolicy> =
            self.channels.iter().map(|ch| ch.policy.clone()).collect();
        policies
            .try_into()
            .map_err(|rest: Vec<ChannelPolicy>| ConfigError::ChannelCount(rest.len()))
    }

    /// Keys that need the arm gesture
    pub fn protected_keys(&self) -> BTreeSet<KeyId> {
        self.channels
            .iter()
            .filter(|ch| ch.policy.is_gated())
            .flat_map(|ch| ch.policy.keys().into_iter().map(|(k, _)| k))
            .collect()
    }

    /// Display label for each key, first channel mentioning it wins
    pub fn key_labels(&self) -> Vec<(KeyId, String)> {
        let mut labels: Vec<(KeyId, String)> = Vec::new();
        for ch in &self.channels {
            for (key, level_label) in ch.policy.keys() {
                if labels.iter().any(|(k, _)| *k == key) {
                    continue;
                }
                if let Some(label) = level_label.or(ch.label.as_deref()) {
                    labels.push((key, label.to_string()));
                }
            }
        }
        labels
    }

    /// Channel keys that need no arming, ascending
    pub fn plain_keys(&self) -> Vec<KeyId> {
        let protected = self.protected_keys();
        let keys: BTreeSet<KeyId> = self
            .channels
            .iter()
            .flat_map(|ch| ch.policy.keys().into_iter().map(|(k, _)| k))
            .filter(|k| !protected.contains(k))
            .collect();
        keys.into_iter().collect()
    }

    /// One-line key summary for the display footer
    pub fn help_text(&self) -> String {
        let labels = self.key_labels();
        let mut parts = Vec::new();
        let plain = self.plain_keys();
        if !plain.is_empty() {
            parts.push(format!("{}: gestures", key_list(&plain)));
        }
        for key in self.protected_keys() {
            let label = labels
                .iter()
                .find(|(k, _)| *k == key)
                .map_or_else(|| format!("Gesture {key}"), |(_, l)| l.clone());
            parts.push(format!("0 → {key}: {label}"));
        }
        parts.push("Esc/Q: exit".to_string());
        parts.join(" • ")
    }

    /// Status subtitle while no key is held
    pub fn waiting_hint(&self) -> String {
        let plain = self.plain_keys();
        let protected: Vec<KeyId> = self.protected_keys().into_iter().collect();
        let protected = protected
            .iter()
            .map(|k| k.to_string())
            .collect::<Vec<_>>()
            .join("/");
        match (plain.is_empty(), protected.is_empty()) {
            (false, false) => format!(
                "Press {}  ·  0 then {} for actions",
                key_list(&plain),
                protected
            ),
            (false, true) => format!("Press {}", key_list(&plain)),
            (true, false) => format!("0 then {protected} for actions"),
            (true, true) => "No keys configured".to_string(),
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn render_interval(&self) -> Duration {
        Duration::from_millis(self.render_interval_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn serial_timeout(&self) -> Duration {
        Duration::from_millis(self.serial.timeout_ms)
    }
}

/// Ascending keys with consecutive runs collapsed: `1–3,7`
fn key_list(keys: &[KeyId]) -> String {
    let mut runs: Vec<(u8, u8)> = Vec::new();
    for d in keys.iter().map(|k| k.digit()) {
        match runs.last_mut() {
            Some((_, end)) if *end + 1 == d => *end = d,
            _ => runs.push((d, d)),
        }
    }
    runs.iter()
        .map(|&(start, end)| match end - start {
            0 => start.to_string(),
            1 => format!("{start},{end}"),
            _ => format!("{start}–{end}"),
        })
        .collect::<Vec<_>>()
        .join(",")
}
