#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema for the synchronization loop.
//!
//! - `Config` and its sections are deserialized from TOML and validated.
//! - Every section has defaults, so an empty file is a valid config.
//! - Decimal parameters keep their written text (`"0.05"`, `110.00`, `55`)
//!   and are parsed into fixed-point values by `lockstep_core::conversions`.
use serde::Deserialize;
use serde::de::Deserializer;

/// A decimal parameter as written in the config.
///
/// Accepts a TOML string (`"110.00"`), integer (`55`) or float (`0.05`).
/// Strings keep trailing zeros; floats use their shortest representation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecimalText(pub String);

impl DecimalText {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        self.0.trim()
    }

    /// `[+-]digits[.digits]` with at least one digit.
    pub fn is_well_formed(&self) -> bool {
        let s = self.as_str();
        let body = s.strip_prefix(['-', '+']).unwrap_or(s);
        let (int, frac) = body.split_once('.').unwrap_or((body, ""));
        !(int.is_empty() && frac.is_empty())
            && int.bytes().chain(frac.bytes()).all(|b| b.is_ascii_digit())
    }

    /// Negative and non-zero (`"-0.0"` is not negative).
    pub fn is_negative(&self) -> bool {
        self.as_str().starts_with('-') && !self.is_zero()
    }

    pub fn is_zero(&self) -> bool {
        self.as_str()
            .bytes()
            .filter(u8::is_ascii_digit)
            .all(|b| b == b'0')
    }

    /// Approximate value for range checks only; never used in the loop.
    fn approx(&self) -> Option<f64> {
        self.as_str().parse::<f64>().ok()
    }
}

impl Default for DecimalText {
    fn default() -> Self {
        Self::new("0")
    }
}

impl std::fmt::Display for DecimalText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DecimalToml {
    Text(String),
    Int(i64),
    Float(f64),
}

impl<'de> Deserialize<'de> for DecimalText {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match DecimalToml::deserialize(deserializer)? {
            DecimalToml::Text(s) => Self(s),
            DecimalToml::Int(i) => Self(i.to_string()),
            DecimalToml::Float(f) => Self(format!("{f}")),
        })
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ControlCfg {
    /// Encoder pulses per revolution; values below 1 are treated as 1.
    pub wheel_steps: u32,
    /// Proportional gain ("enhancement"), >= 0.
    pub gain: DecimalText,
    /// Saturation limit for axis A, in [0, 1].
    pub limit_a: DecimalText,
    /// Saturation limit for axis B, in [0, 1].
    pub limit_b: DecimalText,
    pub closed_loop: bool,
    /// Rpm mapped to full output 1.0; > 0.
    pub output_relation: DecimalText,
    /// Initial commanded velocity for axis A (rpm).
    pub velocity_a: DecimalText,
    /// Initial commanded velocity for axis B (rpm).
    pub velocity_b: DecimalText,
    /// Apply a velocity command for either axis to both.
    pub simultaneous: bool,
}

impl Default for ControlCfg {
    fn default() -> Self {
        Self {
            wheel_steps: 6,
            gain: DecimalText::default(),
            limit_a: DecimalText::default(),
            limit_b: DecimalText::default(),
            closed_loop: false,
            output_relation: DecimalText::new("110.00"),
            velocity_a: DecimalText::default(),
            velocity_b: DecimalText::default(),
            simultaneous: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Bus {
    /// I2C bus number (`/dev/i2c-N`).
    pub i2c_bus: u8,
    /// 7-bit address of the microcontroller.
    pub peer_address: u16,
    /// Per-exchange timeout (ms).
    pub timeout_ms: u64,
}

impl Default for Bus {
    fn default() -> Self {
        Self {
            i2c_bus: 1,
            peer_address: 0x08,
            timeout_ms: 50,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MotorDriver {
    /// 7-bit address of the PCA9685 on the motor HAT.
    pub address: u16,
    /// PWM frequency; the PCA9685 supports 24..=1526 Hz.
    pub pwm_hz: u32,
}

impl Default for MotorDriver {
    fn default() -> Self {
        Self {
            address: 0x40,
            pwm_hz: 100,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Pins {
    /// BCM pin carrying the tick signal from the microcontroller.
    pub tick_in: u8,
}

impl Default for Pins {
    fn default() -> Self {
        Self { tick_in: 23 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Timeouts {
    /// Longest wait for a tick edge before re-checking commands (ms).
    pub tick_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self { tick_ms: 500 }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SimCfg {
    /// Period of the simulated tick signal (ms).
    pub tick_ms: u64,
    /// Encoder pulses per tick at full output.
    pub pulses_per_tick: u32,
}

impl Default for SimCfg {
    fn default() -> Self {
        Self {
            tick_ms: 10,
            pulses_per_tick: 2,
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Config {
    pub control: ControlCfg,
    pub bus: Bus,
    pub motor_driver: MotorDriver,
    pub pins: Pins,
    pub timeouts: Timeouts,
    pub logging: Logging,
    pub sim: SimCfg,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

fn check_decimal(name: &str, v: &DecimalText) -> eyre::Result<()> {
    if !v.is_well_formed() {
        eyre::bail!("{name} must be a decimal number, got {:?}", v.as_str());
    }
    Ok(())
}

fn check_limit(name: &str, v: &DecimalText) -> eyre::Result<()> {
    check_decimal(name, v)?;
    if v.is_negative() {
        eyre::bail!("{name} must be >= 0");
    }
    if v.approx().is_some_and(|x| x > 1.0) {
        eyre::bail!("{name} must be <= 1");
    }
    Ok(())
}

/// Largest accepted |velocity| and output relation, in rpm.
const MAX_RPM: f64 = 100_000.0;
const MAX_GAIN: f64 = 1_000.0;

fn check_at_most(name: &str, v: &DecimalText, max: f64) -> eyre::Result<()> {
    if v.approx().is_some_and(|x| x.abs() > max) {
        eyre::bail!("{name} must be within ±{max}");
    }
    Ok(())
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Control
        let c = &self.control;
        check_decimal("control.gain", &c.gain)?;
        if c.gain.is_negative() {
            eyre::bail!("control.gain must be >= 0");
        }
        check_at_most("control.gain", &c.gain, MAX_GAIN)?;
        check_limit("control.limit_a", &c.limit_a)?;
        check_limit("control.limit_b", &c.limit_b)?;
        check_decimal("control.output_relation", &c.output_relation)?;
        if c.output_relation.is_negative() || c.output_relation.is_zero() {
            eyre::bail!("control.output_relation must be > 0");
        }
        check_at_most("control.output_relation", &c.output_relation, MAX_RPM)?;
        check_decimal("control.velocity_a", &c.velocity_a)?;
        check_decimal("control.velocity_b", &c.velocity_b)?;
        check_at_most("control.velocity_a", &c.velocity_a, MAX_RPM)?;
        check_at_most("control.velocity_b", &c.velocity_b, MAX_RPM)?;

        // Bus
        if self.bus.peer_address > 0x7F {
            eyre::bail!("bus.peer_address must be a 7-bit address (<= 0x7F)");
        }
        if self.bus.timeout_ms == 0 {
            eyre::bail!("bus.timeout_ms must be >= 1");
        }

        // Motor driver
        if self.motor_driver.address > 0x7F {
            eyre::bail!("motor_driver.address must be a 7-bit address (<= 0x7F)");
        }
        if !(24..=1526).contains(&self.motor_driver.pwm_hz) {
            eyre::bail!("motor_driver.pwm_hz must be in 24..=1526");
        }
        if self.motor_driver.address == self.bus.peer_address {
            eyre::bail!("motor_driver.address and bus.peer_address must differ");
        }

        // Timeouts
        if self.timeouts.tick_ms == 0 {
            eyre::bail!("timeouts.tick_ms must be >= 1");
        }

        // Simulation
        if self.sim.tick_ms == 0 {
            eyre::bail!("sim.tick_ms must be >= 1");
        }

        // Logging
        if let Some(rot) = self.logging.rotation.as_deref() {
            let ok = matches!(rot, "never" | "daily" | "hourly");
            if !ok {
                eyre::bail!("logging.rotation must be one of: never, daily, hourly");
            }
        }
        Ok(())
    }
}
