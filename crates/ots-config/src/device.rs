use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// Module ids the binary knows how to build.
pub const KNOWN_MODULES: [&str; 6] = ["nuke", "alert", "link", "status", "troops", "sound"];

const MAX_QUEUE_CAPACITY: usize = 1024;
const MAX_REGISTRY_CAPACITY: usize = 8;

/// Device configuration loaded from `ots.toml`. Every section is optional.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeviceConfig {
    pub device: DeviceSection,
    pub runtime: RuntimeConfig,
    pub timing: TimingConfig,
    pub channels: ChannelsConfig,
    pub modules: ModulesConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeviceSection {
    /// Sent in the handshake.
    pub client_type: String,
    pub serial_number: Option<String>,
}

impl Default for DeviceSection {
    fn default() -> Self {
        Self {
            client_type: "firmware".into(),
            serial_number: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    pub queue_capacity: usize,
    pub loop_interval_ms: u64,
    pub max_modules: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 32,
            loop_interval_ms: 50,
            max_modules: 8,
        }
    }
}

/// Durations and blink periods, all in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimingConfig {
    pub nuke_duration_ms: u64,
    pub nuke_blink_ms: u64,
    pub alert_nuke_duration_ms: u64,
    pub alert_surface_duration_ms: u64,
    pub alert_blink_ms: u64,
    pub warning_blink_ms: u64,
    pub link_blink_ms: u64,
    pub link_error_blink_ms: u64,
    pub update_blink_ms: u64,
    pub debounce_ms: u64,
    pub slider_poll_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            nuke_duration_ms: 10_000,
            nuke_blink_ms: 500,
            alert_nuke_duration_ms: 10_000,
            alert_surface_duration_ms: 15_000,
            alert_blink_ms: 500,
            warning_blink_ms: 250,
            link_blink_ms: 500,
            link_error_blink_ms: 200,
            update_blink_ms: 100,
            debounce_ms: 50,
            slider_poll_ms: 100,
        }
    }
}

/// One expander pin, written `{ board = 1, pin = 7 }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Pin {
    pub board: u8,
    pub pin: u8,
}

impl Pin {
    pub const fn new(board: u8, pin: u8) -> Self {
        Self { board, pin }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChannelsConfig {
    pub atom_button: Pin,
    pub hydro_button: Pin,
    pub mirv_button: Pin,
    pub atom_led: Pin,
    pub hydro_led: Pin,
    pub mirv_led: Pin,
    pub warning_led: Pin,
    pub alert_atom_led: Pin,
    pub alert_hydro_led: Pin,
    pub alert_mirv_led: Pin,
    pub alert_land_led: Pin,
    pub alert_naval_led: Pin,
    pub link_led: Pin,
    /// Analog channel of the troop slider.
    pub slider: u8,
}

impl Default for ChannelsConfig {
    fn default() -> Self {
        Self {
            atom_button: Pin::new(0, 1),
            hydro_button: Pin::new(0, 2),
            mirv_button: Pin::new(0, 3),
            atom_led: Pin::new(1, 8),
            hydro_led: Pin::new(1, 9),
            mirv_led: Pin::new(1, 10),
            warning_led: Pin::new(1, 0),
            alert_atom_led: Pin::new(1, 1),
            alert_hydro_led: Pin::new(1, 2),
            alert_mirv_led: Pin::new(1, 3),
            alert_land_led: Pin::new(1, 4),
            alert_naval_led: Pin::new(1, 5),
            link_led: Pin::new(1, 7),
            slider: 0,
        }
    }
}

impl ChannelsConfig {
    pub fn inputs(&self) -> [(&'static str, Pin); 3] {
        [
            ("atom_button", self.atom_button),
            ("hydro_button", self.hydro_button),
            ("mirv_button", self.mirv_button),
        ]
    }

    pub fn outputs(&self) -> [(&'static str, Pin); 10] {
        [
            ("atom_led", self.atom_led),
            ("hydro_led", self.hydro_led),
            ("mirv_led", self.mirv_led),
            ("warning_led", self.warning_led),
            ("alert_atom_led", self.alert_atom_led),
            ("alert_hydro_led", self.alert_hydro_led),
            ("alert_mirv_led", self.alert_mirv_led),
            ("alert_land_led", self.alert_land_led),
            ("alert_naval_led", self.alert_naval_led),
            ("link_led", self.link_led),
        ]
    }
}

/// Which modules to register, in registration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModulesConfig {
    pub enabled: Vec<String>,
}

impl Default for ModulesConfig {
    fn default() -> Self {
        Self {
            enabled: KNOWN_MODULES.iter().map(|id| id.to_string()).collect(),
        }
    }
}

impl ModulesConfig {
    pub fn is_enabled(&self, id: &str) -> bool {
        self.enabled.iter().any(|enabled| enabled == id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// Default filter when `OTS_LOG` and `RUST_LOG` are unset.
    pub level: String,
    pub file: bool,
    pub dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            file: false,
            dir: None,
        }
    }
}

impl DeviceConfig {
    /// Parse and validate config TOML.
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let config: Self = toml::from_str(input).context("failed to parse device config TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a config file from disk.
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read device config at {}", path.display()))?;

        Self::from_toml_str(&raw)
            .with_context(|| format!("invalid device config at {}", path.display()))
    }

    /// Load `path` if given, otherwise the built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_path(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_nonempty("device.client_type", &self.device.client_type)?;
        if let Some(serial) = &self.device.serial_number {
            validate_nonempty("device.serial_number", serial)?;
        }

        validate_range(
            "runtime.queue_capacity",
            self.runtime.queue_capacity,
            1,
            MAX_QUEUE_CAPACITY,
        )?;
        validate_range(
            "runtime.max_modules",
            self.runtime.max_modules,
            1,
            MAX_REGISTRY_CAPACITY,
        )?;
        validate_nonzero("runtime.loop_interval_ms", self.runtime.loop_interval_ms)?;

        let t = &self.timing;
        for (field, value) in [
            ("timing.nuke_duration_ms", t.nuke_duration_ms),
            ("timing.nuke_blink_ms", t.nuke_blink_ms),
            ("timing.alert_nuke_duration_ms", t.alert_nuke_duration_ms),
            ("timing.alert_surface_duration_ms", t.alert_surface_duration_ms),
            ("timing.alert_blink_ms", t.alert_blink_ms),
            ("timing.warning_blink_ms", t.warning_blink_ms),
            ("timing.link_blink_ms", t.link_blink_ms),
            ("timing.link_error_blink_ms", t.link_error_blink_ms),
            ("timing.update_blink_ms", t.update_blink_ms),
            ("timing.slider_poll_ms", t.slider_poll_ms),
        ] {
            validate_nonzero(field, value)?;
        }

        validate_unique_pins("channels (inputs)", &self.channels.inputs())?;
        validate_unique_pins("channels (outputs)", &self.channels.outputs())?;

        validate_allowlist("modules.enabled", &self.modules.enabled)?;
        for id in &self.modules.enabled {
            if !KNOWN_MODULES.contains(&id.as_str()) {
                bail!(
                    "modules.enabled entry {:?} is not one of {:?}",
                    id,
                    KNOWN_MODULES
                );
            }
        }
        if self.modules.enabled.len() > self.runtime.max_modules {
            bail!(
                "modules.enabled lists {} modules but runtime.max_modules is {}",
                self.modules.enabled.len(),
                self.runtime.max_modules
            );
        }

        validate_nonempty("logging.level", &self.logging.level)?;

        Ok(())
    }
}

fn validate_nonempty(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        bail!("{field} must not be empty")
    }
    Ok(())
}

fn validate_nonzero(field: &str, value: u64) -> Result<()> {
    if value == 0 {
        bail!("{field} must be greater than zero")
    }
    Ok(())
}

fn validate_range(field: &str, value: usize, min: usize, max: usize) -> Result<()> {
    if value < min || value > max {
        bail!("{field} must be between {min} and {max}, got {value}")
    }
    Ok(())
}

fn validate_unique_pins(group: &str, pins: &[(&'static str, Pin)]) -> Result<()> {
    let mut seen = BTreeSet::new();
    for (name, pin) in pins {
        if !seen.insert(*pin) {
            bail!(
                "{group}: {name} reuses board {} pin {}",
                pin.board,
                pin.pin
            );
        }
    }
    Ok(())
}

fn validate_allowlist(field: &str, values: &[String]) -> Result<()> {
    let mut seen = BTreeSet::new();

    for value in values {
        if value.trim().is_empty() {
            bail!("{field} entries must not be empty");
        }
        if value.trim() != value {
            bail!("{field} entry {:?} has leading/trailing whitespace", value);
        }
        if !seen.insert(value.as_str()) {
            bail!("{field} contains duplicate entry {:?}", value);
        }
    }

    Ok(())
}
