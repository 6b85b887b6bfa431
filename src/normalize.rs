//! Turns raw hub JSON into uniform [`DeviceRecord`]s and a [`SystemRecord`].
//!
//! The fleet is heterogeneous: multiple firmware generations report the same
//! facts under different field names and encodings (booleans as strings,
//! temperatures as numeric strings, durations in three shapes). Every
//! ambiguous field gets an explicit parser that enumerates the observed
//! shapes instead of coercing silently.

use serde_json::Value;
use tracing::debug;

use crate::types::{
    DeviceKind, DeviceRecord, HcMode, HoldDuration, NtpStatus, SystemRecord, TemperatureUnit,
};
use crate::{Error, Result};

/// Readings at these values mean "no probe / hub link lost", not a
/// temperature.
const SENTINEL_TEMPERATURES: &[f64] = &[127.0, 127.5, 255.0];

/// Serial reported for devices missing from the serial-number query.
pub const UNKNOWN_SERIAL: &str = "UNKNOWN";

/// Keys under which different firmware generations nest their device lists.
const DEVICE_LIST_KEYS: &[&str] = &[
    "devices",
    "neo_devices",
    "thermostats",
    "timeclocks",
    "plugs",
    "sensors",
];

/// Normalize a live-data reply plus a system-info reply (and, when queried,
/// the serial-number listing) into one coherent snapshot.
pub fn normalize(
    live: &Value,
    system: &Value,
    serials: Option<&Value>,
) -> Result<(Vec<DeviceRecord>, SystemRecord)> {
    let raw_devices = collect_devices(live)?;

    let mut devices: Vec<DeviceRecord> = raw_devices
        .iter()
        .filter_map(|raw| normalize_device(raw))
        .collect();

    let mut names_seen = std::collections::HashSet::new();
    devices.retain(|d| {
        let fresh = names_seen.insert(d.name.clone());
        if !fresh {
            debug!(name = %d.name, "dropping duplicate device name from snapshot");
        }
        fresh
    });

    if let Some(serials) = serials {
        join_serials(&mut devices, serials);
    }

    let system_record = normalize_system(system, &raw_devices);
    Ok((devices, system_record))
}

/// Flatten whichever list shape this firmware generation uses: one flat
/// `devices`/`neo_devices` list, or per-category buckets.
fn collect_devices(live: &Value) -> Result<Vec<&Value>> {
    let mut raw = Vec::new();
    for key in DEVICE_LIST_KEYS {
        if let Some(Value::Array(list)) = live.get(key) {
            raw.extend(list.iter());
        }
    }
    if raw.is_empty() && DEVICE_LIST_KEYS.iter().all(|k| live.get(k).is_none()) {
        return Err(Error::MalformedResponse(
            "live data reply has no device list".to_string(),
        ));
    }
    Ok(raw)
}

fn normalize_device(raw: &Value) -> Option<DeviceRecord> {
    let name = field(raw, &["ZONE_NAME", "device"])?.as_str()?.to_string();
    // Legacy INFO records carry no DEVICE_TYPE; they are thermostats.
    let legacy = raw.get("ZONE_NAME").is_none();
    let device_type = field(raw, &["DEVICE_TYPE"])
        .and_then(Value::as_u64)
        .map(|t| t as u8)
        .unwrap_or(if legacy { 1 } else { 0 });

    let time_clock_mode = bool_field(raw, &["TIMECLOCK_MODE", "TIME_CLOCK_MODE"])
        .or_else(|| field(raw, &["THERMOSTAT"]).and_then(parse_bool).map(|t| !t))
        .unwrap_or(false);

    let heat_on = bool_field(raw, &["HEAT_ON", "HEATING"]).unwrap_or(false);
    let cool_on = bool_field(raw, &["COOL_ON", "COOLING"]).unwrap_or(false);

    let hc_mode = match field(raw, &["HC_MODE"]).and_then(Value::as_str) {
        Some(s) => HcMode::from_wire_str(s),
        // Legacy records never report a mode; they are heat devices unless
        // the cooling relay says otherwise.
        None if legacy => Some(if cool_on { HcMode::Cool } else { HcMode::Heat }),
        None => None,
    };

    let available_modes = match field(raw, &["AVAILABLE_MODES"]) {
        Some(Value::Array(modes)) => modes
            .iter()
            .filter_map(Value::as_str)
            .filter_map(HcMode::from_wire_str)
            .collect(),
        _ => legacy_available_modes(raw),
    };

    let offline = bool_field(raw, &["OFFLINE"]).unwrap_or(false);

    let mut record = DeviceRecord {
        name,
        device_id: field(raw, &["DEVICE_ID"]).and_then(Value::as_i64),
        serial_number: None,
        device_type,
        kind: DeviceKind::for_type(device_type, time_clock_mode),
        temperature: temp_field(raw, &["ACTUAL_TEMP", "CURRENT_TEMPERATURE"]),
        floor_temperature: temp_field(raw, &["CURRENT_FLOOR_TEMPERATURE"]),
        humidity: field(raw, &["RELATIVE_HUMIDITY", "HUMIDITY"]).and_then(parse_number),
        target_temperature: temp_field(raw, &["SET_TEMP", "CURRENT_SET_TEMPERATURE"]),
        cool_temp: temp_field(raw, &["COOL_TEMP"]),
        hc_mode,
        available_modes,
        standby: bool_field(raw, &["STANDBY"]).unwrap_or(false),
        away: bool_field(raw, &["AWAY"]).unwrap_or(false),
        heat_on,
        cool_on,
        fan_speed: field(raw, &["FAN_SPEED"])
            .and_then(Value::as_str)
            .map(str::to_string),
        hold_on: bool_field(raw, &["HOLD_ON"]).unwrap_or(false),
        hold_time: field(raw, &["HOLD_TIME"]).and_then(|v| HoldDuration::parse(v).ok()),
        hold_temp: temp_field(raw, &["HOLD_TEMP"]),
        timer_on: bool_field(raw, &["TIMER_ON", "TIMER"]).unwrap_or(false),
        manual_off: bool_field(raw, &["MANUAL_OFF"]).unwrap_or(false),
        low_battery: bool_field(raw, &["LOW_BATTERY"]).unwrap_or(false),
        offline,
        window_open: bool_field(raw, &["WINDOW_OPEN"]).unwrap_or(false),
        firmware: field(raw, &["STAT_VERSION"]).map(stringify),
    };

    if record.offline {
        // Stale last-seen readings must not be mistaken for live values.
        record.temperature = None;
        record.floor_temperature = None;
        record.humidity = None;
    }

    Some(record)
}

fn legacy_available_modes(raw: &Value) -> Vec<HcMode> {
    match bool_field(raw, &["COOLING_ENABLED"]) {
        Some(true) => vec![HcMode::Heat, HcMode::Cool, HcMode::Auto],
        _ => vec![HcMode::Heat],
    }
}

fn normalize_system(system: &Value, raw_devices: &[&Value]) -> SystemRecord {
    let unit = field(system, &["CORF", "TEMPERATURE_FORMAT"])
        .or_else(|| {
            raw_devices
                .iter()
                .find_map(|d| field(d, &["TEMPERATURE_FORMAT", "CORF"]))
        })
        .map(TemperatureUnit::from_wire)
        .unwrap_or_default();

    SystemRecord {
        unit,
        ntp: field(system, &["NTP_ON"])
            .map(NtpStatus::from_wire)
            .unwrap_or_default(),
        hub_type: field(system, &["HUB_TYPE"]).and_then(Value::as_i64),
        hub_version: field(system, &["HUB_VERSION"]).map(stringify),
        temperature_step: field(system, &["TEMP_STEP", "TEMPERATURE_STEP"]).and_then(parse_number),
        serial_number: field(system, &["HUB_SERIAL", "SERIAL_NO"]).map(stringify),
    }
}

/// Left-join the serial-number listing (keyed by device id) onto the device
/// list. Unmatched devices get the `UNKNOWN` sentinel rather than failing
/// the snapshot.
fn join_serials(devices: &mut [DeviceRecord], serials: &Value) {
    for device in devices.iter_mut() {
        device.serial_number = Some(
            device
                .device_id
                .and_then(|id| serials.get(id.to_string()))
                .and_then(extract_serial)
                .unwrap_or_else(|| UNKNOWN_SERIAL.to_string()),
        );
    }
}

/// The listing's values are tuples like `[name, serial]`, but bare strings
/// have been seen too.
fn extract_serial(entry: &Value) -> Option<String> {
    match entry {
        Value::String(s) => Some(s.clone()),
        Value::Array(parts) => parts
            .iter()
            .rev()
            .find_map(|p| p.as_str())
            .map(str::to_string),
        _ => None,
    }
}

fn field<'a>(raw: &'a Value, names: &[&str]) -> Option<&'a Value> {
    names
        .iter()
        .find_map(|name| raw.get(name))
        .filter(|v| !v.is_null())
}

fn bool_field(raw: &Value, names: &[&str]) -> Option<bool> {
    field(raw, names).and_then(parse_bool)
}

fn temp_field(raw: &Value, names: &[&str]) -> Option<f64> {
    field(raw, names).and_then(parse_temperature)
}

/// Booleans arrive as JSON booleans, as "true"/"false" strings, or as 0/1.
fn parse_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.to_ascii_lowercase().as_str() {
            "true" | "on" | "1" => Some(true),
            "false" | "off" | "0" => Some(false),
            _ => None,
        },
        Value::Number(n) => n.as_i64().map(|n| n != 0),
        _ => None,
    }
}

/// Numbers arrive as JSON numbers or as numeric strings.
fn parse_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn parse_temperature(value: &Value) -> Option<f64> {
    let t = parse_number(value)?;
    if SENTINEL_TEMPERATURES.contains(&t) {
        return None;
    }
    Some(t)
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{HvacAction, HvacMode};
    use serde_json::json;

    fn empty_system() -> Value {
        json!({})
    }

    #[test]
    fn legacy_info_record() {
        let live = json!({"devices": [{
            "device": "Lounge",
            "TEMPERATURE_FORMAT": false,
            "AWAY": false,
            "CURRENT_TEMPERATURE": "21.5",
            "CURRENT_SET_TEMPERATURE": "20",
            "HUMIDITY": "45",
            "COOLING_ENABLED": false,
            "HEATING": true,
            "COOLING": false,
        }]});

        let (devices, system) = normalize(&live, &empty_system(), None).unwrap();
        assert_eq!(devices.len(), 1);
        let dev = &devices[0];
        assert_eq!(dev.name, "Lounge");
        assert_eq!(dev.temperature, Some(21.5));
        assert_eq!(dev.target_temperature, Some(20.0));
        assert_eq!(dev.humidity, Some(45.0));
        assert_eq!(system.unit, TemperatureUnit::Celsius);
        assert_eq!(dev.hvac_mode(), HvacMode::Heat);
        assert!(dev.settable_modes().contains(&HvacMode::Heat));
        assert_eq!(dev.hvac_action(), HvacAction::Heating);
        assert_eq!(dev.kind, DeviceKind::Thermostat);
    }

    #[test]
    fn sentinel_temperatures_become_absent() {
        for sentinel in [json!(127), json!(127.0), json!(127.5), json!(255), json!(255.0), json!("127.5")] {
            let live = json!({"devices": [{
                "ZONE_NAME": "Hall",
                "DEVICE_TYPE": 1,
                "ACTUAL_TEMP": sentinel.clone(),
            }]});
            let (devices, _) = normalize(&live, &empty_system(), None).unwrap();
            assert_eq!(devices[0].temperature, None, "sentinel {sentinel} must be absent");
        }
    }

    #[test]
    fn real_reading_survives() {
        let live = json!({"devices": [{"ZONE_NAME": "Hall", "DEVICE_TYPE": 1, "ACTUAL_TEMP": "22.5"}]});
        let (devices, _) = normalize(&live, &empty_system(), None).unwrap();
        assert_eq!(devices[0].temperature, Some(22.5));
    }

    #[test]
    fn offline_masks_sensor_fields() {
        let live = json!({"devices": [{
            "ZONE_NAME": "Attic",
            "DEVICE_TYPE": 1,
            "ACTUAL_TEMP": "19.0",
            "CURRENT_FLOOR_TEMPERATURE": 18.0,
            "RELATIVE_HUMIDITY": 40,
            "OFFLINE": true,
        }]});
        let (devices, _) = normalize(&live, &empty_system(), None).unwrap();
        let dev = &devices[0];
        assert!(dev.offline);
        assert_eq!(dev.temperature, None);
        assert_eq!(dev.floor_temperature, None);
        assert_eq!(dev.humidity, None);
    }

    #[test]
    fn modern_record_full_shape() {
        let live = json!({"devices": [{
            "ZONE_NAME": "Kitchen",
            "DEVICE_ID": 4,
            "DEVICE_TYPE": 12,
            "ACTUAL_TEMP": "20.5",
            "SET_TEMP": "21.0",
            "COOL_TEMP": 24.0,
            "HC_MODE": "AUTO",
            "AVAILABLE_MODES": ["HEATING", "COOLING", "AUTO"],
            "STANDBY": false,
            "HEAT_ON": false,
            "COOL_ON": true,
            "HOLD_ON": true,
            "HOLD_TIME": "1:30",
            "HOLD_TEMP": 23.0,
            "LOW_BATTERY": true,
            "STAT_VERSION": 2105,
        }]});
        let (devices, _) = normalize(&live, &empty_system(), None).unwrap();
        let dev = &devices[0];
        assert_eq!(dev.device_id, Some(4));
        assert_eq!(dev.kind, DeviceKind::Thermostat);
        assert_eq!(dev.hc_mode, Some(HcMode::Auto));
        assert_eq!(dev.hvac_mode(), HvacMode::HeatCool);
        assert_eq!(dev.hvac_action(), HvacAction::Cooling);
        assert_eq!(dev.cool_temp, Some(24.0));
        assert!(dev.hold_on);
        assert_eq!((dev.hold_hours(), dev.hold_mins()), (1, 30));
        assert_eq!(dev.hold_temp, Some(23.0));
        assert!(dev.low_battery);
        assert_eq!(dev.firmware.as_deref(), Some("2105"));
    }

    #[test]
    fn bucketed_lists_flatten() {
        let live = json!({
            "thermostats": [{"ZONE_NAME": "Lounge", "DEVICE_TYPE": 1}],
            "timeclocks": [{"ZONE_NAME": "Towel Rail", "DEVICE_TYPE": 1, "TIMECLOCK_MODE": true}],
            "plugs": [{"ZONE_NAME": "Lamp", "DEVICE_TYPE": 6}],
            "sensors": [{"ZONE_NAME": "Back Door", "DEVICE_TYPE": 5, "WINDOW_OPEN": true}],
        });
        let (devices, _) = normalize(&live, &empty_system(), None).unwrap();
        assert_eq!(devices.len(), 4);
        assert_eq!(devices[0].kind, DeviceKind::Thermostat);
        assert_eq!(devices[1].kind, DeviceKind::TimeClock);
        assert_eq!(devices[2].kind, DeviceKind::Plug);
        assert_eq!(devices[3].kind, DeviceKind::Sensor);
        assert!(devices[3].window_open);
    }

    #[test]
    fn stringly_booleans() {
        let live = json!({"devices": [{
            "ZONE_NAME": "Hall",
            "DEVICE_TYPE": 1,
            "STANDBY": "true",
            "HEAT_ON": "False",
            "LOW_BATTERY": 1,
        }]});
        let (devices, _) = normalize(&live, &empty_system(), None).unwrap();
        let dev = &devices[0];
        assert!(dev.standby);
        assert!(!dev.heat_on);
        assert!(dev.low_battery);
    }

    #[test]
    fn unit_from_system_corf_string() {
        let live = json!({"devices": []});
        let (_, system) = normalize(&live, &json!({"CORF": "F"}), None).unwrap();
        assert_eq!(system.unit, TemperatureUnit::Fahrenheit);
        let (_, system) = normalize(&live, &json!({"CORF": "c"}), None).unwrap();
        assert_eq!(system.unit, TemperatureUnit::Celsius);
    }

    #[test]
    fn ntp_status_parsed() {
        let live = json!({"devices": []});
        let (_, system) = normalize(&live, &json!({"NTP_ON": "Running"}), None).unwrap();
        assert_eq!(system.ntp, NtpStatus::Running);
        let (_, system) = normalize(&live, &json!({"NTP_ON": "Stopped"}), None).unwrap();
        assert_eq!(system.ntp, NtpStatus::Stopped);
        let (_, system) = normalize(&live, &empty_system(), None).unwrap();
        assert_eq!(system.ntp, NtpStatus::Unknown);
    }

    #[test]
    fn serial_left_join_with_unknown_default() {
        let live = json!({"devices": [
            {"ZONE_NAME": "Lounge", "DEVICE_ID": 1, "DEVICE_TYPE": 1},
            {"ZONE_NAME": "Hall", "DEVICE_ID": 2, "DEVICE_TYPE": 1},
            {"ZONE_NAME": "Orphan", "DEVICE_TYPE": 1},
        ]});
        let serials = json!({"1": ["Lounge", "SN-001"]});
        let (devices, _) = normalize(&live, &empty_system(), Some(&serials)).unwrap();
        assert_eq!(devices[0].serial_number.as_deref(), Some("SN-001"));
        assert_eq!(devices[1].serial_number.as_deref(), Some(UNKNOWN_SERIAL));
        assert_eq!(devices[2].serial_number.as_deref(), Some(UNKNOWN_SERIAL));
    }

    #[test]
    fn duplicate_names_keep_first() {
        let live = json!({"devices": [
            {"ZONE_NAME": "Lounge", "DEVICE_TYPE": 1, "ACTUAL_TEMP": 20.0},
            {"ZONE_NAME": "Lounge", "DEVICE_TYPE": 1, "ACTUAL_TEMP": 10.0},
        ]});
        let (devices, _) = normalize(&live, &empty_system(), None).unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].temperature, Some(20.0));
    }

    #[test]
    fn missing_device_list_is_malformed() {
        let err = normalize(&json!({"result": "ok"}), &empty_system(), None).unwrap_err();
        assert!(matches!(err, Error::MalformedResponse(_)));
    }

    #[test]
    fn system_details() {
        let live = json!({"devices": []});
        let system = json!({
            "CORF": "C",
            "NTP_ON": "Running",
            "HUB_TYPE": 2,
            "HUB_VERSION": 2134,
            "TEMP_STEP": 0.5,
        });
        let (_, record) = normalize(&live, &system, None).unwrap();
        assert_eq!(record.hub_type, Some(2));
        assert_eq!(record.hub_version.as_deref(), Some("2134"));
        assert_eq!(record.temperature_step, Some(0.5));
    }
}
