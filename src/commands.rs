use serde_json::{json, Value};

use crate::types::{HcMode, HoldDuration};
use crate::{Error, Result};

pub fn info() -> Value {
    json!({"INFO": 0})
}

pub fn get_live_data() -> Value {
    json!({"GET_LIVE_DATA": 0})
}

pub fn get_system() -> Value {
    json!({"GET_SYSTEM": 0})
}

/// Device-id / serial-number listing, keyed by device id.
pub fn device_ids() -> Value {
    json!({"DEVICE_ID": 0})
}

pub fn ntp_on() -> Value {
    json!({"NTP_ON": 0})
}

pub fn set_temp(temp: f64, zone: &str) -> Value {
    json!({"SET_TEMP": [temp, zone]})
}

pub fn set_cool_temp(temp: f64, zone: &str) -> Value {
    json!({"SET_COOL_TEMP": [temp, zone]})
}

pub fn set_hc_mode(mode: HcMode, zone: &str) -> Value {
    json!({"SET_HC_MODE": [mode.as_wire_str(), zone]})
}

pub fn frost(on: bool, zone: &str) -> Value {
    if on {
        json!({"FROST_ON": [zone]})
    } else {
        json!({"FROST_OFF": [zone]})
    }
}

pub fn away(on: bool, zone: &str) -> Value {
    if on {
        json!({"AWAY_ON": [zone]})
    } else {
        json!({"AWAY_OFF": [zone]})
    }
}

pub fn hold(temp: f64, duration: HoldDuration, zone: &str) -> Value {
    json!({"HOLD": [
        {
            "temp": temp,
            "hours": duration.hours,
            "minutes": duration.minutes,
            "id": zone,
        },
        [zone],
    ]})
}

pub fn timer(on: bool, zone: &str) -> Value {
    if on {
        json!({"TIMER_ON": [zone]})
    } else {
        json!({"TIMER_OFF": [zone]})
    }
}

pub fn timer_hold(on: bool, minutes: u32, zone: &str) -> Value {
    if on {
        json!({"TIMER_HOLD_ON": [minutes, zone]})
    } else {
        json!({"TIMER_HOLD_OFF": [0, zone]})
    }
}

pub fn manual(on: bool, zone: &str) -> Value {
    if on {
        json!({"MANUAL_ON": [zone]})
    } else {
        json!({"MANUAL_OFF": [zone]})
    }
}

/// Interpret a write-command reply: `{"result": ...}` is success,
/// `{"error": ...}` is a hub-side rejection.
pub fn parse_reply(reply: &Value) -> Result<String> {
    if let Some(err) = reply.get("error") {
        let msg = err.as_str().map(str::to_string).unwrap_or_else(|| err.to_string());
        return Err(Error::HubError(msg));
    }
    match reply.get("result") {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Ok(other.to_string()),
        None => Err(Error::MalformedResponse(
            "reply has neither result nor error key".to_string(),
        )),
    }
}
