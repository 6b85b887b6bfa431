use std::fmt;

use serde_json::Value;

use crate::{Error, Result};

/// Hub-wide unit setting. The wire encodes it as either a boolean
/// (`TEMPERATURE_FORMAT`: false = Celsius) or a string (`CORF`: "C"/"F"),
/// depending on firmware generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TemperatureUnit {
    #[default]
    Celsius,
    Fahrenheit,
}

impl TemperatureUnit {
    /// `false` or the literal string "C" (case-insensitive) means Celsius;
    /// anything else means Fahrenheit.
    pub fn from_wire(value: &Value) -> Self {
        match value {
            Value::Bool(false) => TemperatureUnit::Celsius,
            Value::Bool(true) => TemperatureUnit::Fahrenheit,
            Value::String(s) if s.eq_ignore_ascii_case("c") => TemperatureUnit::Celsius,
            _ => TemperatureUnit::Fahrenheit,
        }
    }
}

/// Hub-native heat/cool mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HcMode {
    Heat,
    Cool,
    Auto,
    Vent,
}

impl HcMode {
    pub fn as_wire_str(&self) -> &'static str {
        match self {
            HcMode::Heat => "HEATING",
            HcMode::Cool => "COOLING",
            HcMode::Auto => "AUTO",
            HcMode::Vent => "VENT",
        }
    }

    /// Firmware variously reports "HEAT"/"HEATING" etc.
    pub fn from_wire_str(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "HEAT" | "HEATING" => Some(HcMode::Heat),
            "COOL" | "COOLING" => Some(HcMode::Cool),
            "AUTO" => Some(HcMode::Auto),
            "VENT" => Some(HcMode::Vent),
            _ => None,
        }
    }
}

/// Platform-facing mode vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HvacMode {
    Off,
    Heat,
    Cool,
    HeatCool,
    FanOnly,
}

/// Current actuation state, distinct from the configured mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HvacAction {
    #[default]
    Idle,
    Heating,
    Cooling,
}

/// Device category, derived from `device_type` plus the time-clock flag.
/// Modeled as a tagged variant: callers switch on the kind rather than
/// relying on dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Thermostat,
    TimeClock,
    Plug,
    Sensor,
    Unknown,
}

/// Device types that are thermostats when not running in time-clock mode.
const THERMOSTAT_TYPES: &[u8] = &[1, 2, 7, 12, 13];
/// Device types that accept hold commands.
const HOLD_CAPABLE_TYPES: &[u8] = &[1, 2, 6, 7, 12, 13];
const PLUG_TYPE: u8 = 6;
const CONTACT_SENSOR_TYPE: u8 = 5;

impl DeviceKind {
    pub fn for_type(device_type: u8, time_clock_mode: bool) -> Self {
        if device_type == PLUG_TYPE {
            DeviceKind::Plug
        } else if device_type == CONTACT_SENSOR_TYPE {
            DeviceKind::Sensor
        } else if THERMOSTAT_TYPES.contains(&device_type) {
            if time_clock_mode {
                DeviceKind::TimeClock
            } else {
                DeviceKind::Thermostat
            }
        } else {
            DeviceKind::Unknown
        }
    }
}

/// Hub NTP synchronization state, from the system-info reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NtpStatus {
    Running,
    Stopped,
    #[default]
    Unknown,
}

impl NtpStatus {
    pub fn from_wire(value: &Value) -> Self {
        match value.as_str() {
            Some(s) if s.eq_ignore_ascii_case("running") => NtpStatus::Running,
            Some(_) => NtpStatus::Stopped,
            None => NtpStatus::Unknown,
        }
    }
}

/// A bounded hold/boost duration, normalized to hours 0..=99 and
/// minutes 0..=59.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HoldDuration {
    pub hours: u8,
    pub minutes: u8,
}

const MAX_HOLD_HOURS: u32 = 99;

impl HoldDuration {
    /// Overflowed minutes are carried into hours; hours cap at 99.
    pub fn new(hours: u32, minutes: u32) -> Self {
        let total_hours = (hours + minutes / 60).min(MAX_HOLD_HOURS);
        Self {
            hours: total_hours as u8,
            minutes: (minutes % 60) as u8,
        }
    }

    /// Accept the three observed duration shapes: a plain integer (total
    /// minutes), a colon-delimited "H:M" or "H:M:S" string, or a structured
    /// `{hours, minutes}` map. Anything else is a validation error, raised
    /// before any socket is opened.
    pub fn parse(value: &Value) -> Result<Self> {
        match value {
            Value::Number(n) => {
                let minutes = n
                    .as_u64()
                    .ok_or_else(|| Error::Validation(format!("duration minutes not a whole number: {n}")))?;
                Ok(Self::new(0, minutes as u32))
            }
            Value::String(s) => Self::parse_clock(s),
            Value::Object(map) => {
                let hours = duration_component(map.get("hours"), "hours")?;
                let minutes = duration_component(map.get("minutes"), "minutes")?;
                Ok(Self::new(hours, minutes))
            }
            other => Err(Error::Validation(format!("unsupported duration shape: {other}"))),
        }
    }

    fn parse_clock(s: &str) -> Result<Self> {
        let mut parts = s.split(':');
        let hours = clock_part(parts.next(), s)?;
        let minutes = match parts.next() {
            Some(m) => clock_part(Some(m), s)?,
            None => 0,
        };
        // A trailing seconds component is accepted and ignored.
        if let Some(seconds) = parts.next() {
            clock_part(Some(seconds), s)?;
        }
        if parts.next().is_some() {
            return Err(Error::Validation(format!("unparseable duration: {s:?}")));
        }
        Ok(Self::new(hours, minutes))
    }
}

fn clock_part(part: Option<&str>, whole: &str) -> Result<u32> {
    part.and_then(|p| p.trim().parse::<u32>().ok())
        .ok_or_else(|| Error::Validation(format!("unparseable duration: {whole:?}")))
}

fn duration_component(value: Option<&Value>, field: &str) -> Result<u32> {
    match value {
        None => Ok(0),
        Some(v) => v
            .as_u64()
            .map(|n| n as u32)
            .ok_or_else(|| Error::Validation(format!("duration {field} not a whole number: {v}"))),
    }
}

impl fmt::Display for HoldDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:02}", self.hours, self.minutes)
    }
}

/// Normalized snapshot of one zone device, uniform across firmware
/// generations and device types. Sensor-like fields are `None` when the
/// probe is absent or the device is offline.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceRecord {
    pub name: String,
    /// Stable id in later protocol generations; preferred over `name` for
    /// correlation when present.
    pub device_id: Option<i64>,
    pub serial_number: Option<String>,
    pub device_type: u8,
    pub kind: DeviceKind,

    pub temperature: Option<f64>,
    pub floor_temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub target_temperature: Option<f64>,
    pub cool_temp: Option<f64>,

    pub hc_mode: Option<HcMode>,
    pub available_modes: Vec<HcMode>,
    pub standby: bool,
    pub away: bool,

    pub heat_on: bool,
    pub cool_on: bool,
    pub fan_speed: Option<String>,

    pub hold_on: bool,
    pub hold_time: Option<HoldDuration>,
    pub hold_temp: Option<f64>,

    pub timer_on: bool,
    pub manual_off: bool,

    pub low_battery: bool,
    pub offline: bool,
    /// Only meaningful for contact sensors (device type 5).
    pub window_open: bool,

    pub firmware: Option<String>,
}

impl DeviceRecord {
    /// Platform mode derived from hub state. Standby or an absent `hc_mode`
    /// always wins as Off; the mapping is total, so an oddball `hc_mode`
    /// never raises.
    pub fn hvac_mode(&self) -> HvacMode {
        if self.standby {
            return HvacMode::Off;
        }
        match self.hc_mode {
            None => HvacMode::Off,
            Some(HcMode::Auto) => HvacMode::HeatCool,
            Some(HcMode::Vent) => HvacMode::FanOnly,
            Some(HcMode::Cool) => HvacMode::Cool,
            Some(HcMode::Heat) => HvacMode::Heat,
        }
    }

    pub fn hvac_action(&self) -> HvacAction {
        if self.heat_on {
            HvacAction::Heating
        } else if self.cool_on {
            HvacAction::Cooling
        } else {
            HvacAction::Idle
        }
    }

    /// Modes a caller may set: derived from `available_modes` only, so a
    /// reported `hc_mode` outside that list is displayed but never offered
    /// back. Off (standby) is always settable.
    pub fn settable_modes(&self) -> Vec<HvacMode> {
        let mut modes = vec![HvacMode::Off];
        for hc in &self.available_modes {
            let mode = match hc {
                HcMode::Heat => HvacMode::Heat,
                HcMode::Cool => HvacMode::Cool,
                HcMode::Auto => HvacMode::HeatCool,
                HcMode::Vent => HvacMode::FanOnly,
            };
            if !modes.contains(&mode) {
                modes.push(mode);
            }
        }
        modes
    }

    pub fn hold_hours(&self) -> u8 {
        self.hold_time.map(|h| h.hours).unwrap_or(0)
    }

    pub fn hold_mins(&self) -> u8 {
        self.hold_time.map(|h| h.minutes).unwrap_or(0)
    }

    pub fn accepts_hold(&self) -> bool {
        HOLD_CAPABLE_TYPES.contains(&self.device_type)
    }
}

/// Hub-wide settings from the system-info reply.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SystemRecord {
    pub unit: TemperatureUnit,
    pub ntp: NtpStatus,
    pub hub_type: Option<i64>,
    pub hub_version: Option<String>,
    pub temperature_step: Option<f64>,
    pub serial_number: Option<String>,
}
