// commands/handler.rs: operator command requests: parse + range-check
use crate::errors::{GatewayError, Result};
use crate::ids::parse_id;
use gateway_protocol::{CommandType, DeviceId};
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

const INTERVAL_SECS: RangeInclusive<f64> = 5.0..=3600.0;
const SLEEP_SECS: RangeInclusive<f64> = 0.0..=3600.0;
const BASELINE_HPA: RangeInclusive<f64> = 300.0..=1100.0;

/// Shape accepted from the HTTP API / command topic / console.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRequest {
    pub device_id: String,
    pub action: String,
    #[serde(default)]
    pub value: Option<f64>,
}

/// A request that passed validation; params are ASCII decimal text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidCommand {
    pub device_id: DeviceId,
    pub command: CommandType,
    pub params: Vec<u8>,
}

fn whole(action: &str, value: f64, range: RangeInclusive<f64>) -> Result<Vec<u8>> {
    if !value.is_finite() || value.fract() != 0.0 || !range.contains(&value) {
        return Err(GatewayError::InvalidCommand(format!(
            "{action}: {value} outside {}..={} seconds",
            range.start(),
            range.end()
        )));
    }
    Ok(format!("{}", value as u32).into_bytes())
}

impl CommandRequest {
    pub fn validate(&self) -> Result<ValidCommand> {
        let device_id = parse_id(&self.device_id).ok_or_else(|| {
            GatewayError::InvalidCommand(format!("bad device id {:?}", self.device_id))
        })?;
        let action = self.action.trim().to_ascii_lowercase();

        let (command, params) = match action.as_str() {
            "set_interval" => {
                (CommandType::SetInterval, whole(&action, self.value.unwrap_or(90.0), INTERVAL_SECS)?)
            }
            "set_sleep" => {
                (CommandType::SetSleep, whole(&action, self.value.unwrap_or(900.0), SLEEP_SECS)?)
            }
            "set_baseline" => {
                let hpa = self.value.unwrap_or(1013.25);
                if !hpa.is_finite() || !BASELINE_HPA.contains(&hpa) {
                    return Err(GatewayError::InvalidCommand(format!(
                        "set_baseline: {hpa} hPa outside 300..=1100"
                    )));
                }
                (CommandType::SetBaseline, format!("{hpa:.2}").into_bytes())
            }
            "calibrate" => (CommandType::Calibrate, Vec::new()),
            "clear_baseline" => (CommandType::ClearBaseline, Vec::new()),
            "restart" => (CommandType::Restart, Vec::new()),
            "status" => (CommandType::StatusRequest, Vec::new()),
            other => {
                return Err(GatewayError::InvalidCommand(format!("unknown action {other:?}")));
            }
        };
        Ok(ValidCommand { device_id, command, params })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(action: &str, value: Option<f64>) -> CommandRequest {
        CommandRequest { device_id: "AABBCCDDEEFF0011".into(), action: action.into(), value }
    }

    #[test]
    fn interval_defaults_and_bounds() {
        let v = req("set_interval", None).validate().unwrap();
        assert_eq!(v.command, CommandType::SetInterval);
        assert_eq!(v.params, b"90");
        assert_eq!(v.device_id, 0xAABB_CCDD_EEFF_0011);
        assert_eq!(req("set_interval", Some(5.0)).validate().unwrap().params, b"5");
        assert!(req("set_interval", Some(4.0)).validate().is_err());
        assert!(req("set_interval", Some(3601.0)).validate().is_err());
        assert!(req("set_interval", Some(30.5)).validate().is_err());
    }

    #[test]
    fn sleep_allows_zero() {
        assert_eq!(req("set_sleep", Some(0.0)).validate().unwrap().params, b"0");
        assert_eq!(req("set_sleep", None).validate().unwrap().params, b"900");
        assert!(req("set_sleep", Some(-1.0)).validate().is_err());
    }

    #[test]
    fn baseline_uses_two_decimals() {
        assert_eq!(req("set_baseline", None).validate().unwrap().params, b"1013.25");
        assert_eq!(req("set_baseline", Some(998.5)).validate().unwrap().params, b"998.50");
        assert!(req("set_baseline", Some(1200.0)).validate().is_err());
        assert!(req("set_baseline", Some(f64::NAN)).validate().is_err());
    }

    #[test]
    fn parameterless_actions_ignore_value() {
        for (action, cmd) in [
            ("calibrate", CommandType::Calibrate),
            ("clear_baseline", CommandType::ClearBaseline),
            ("restart", CommandType::Restart),
            ("status", CommandType::StatusRequest),
        ] {
            let v = req(action, Some(12.0)).validate().unwrap();
            assert_eq!(v.command, cmd);
            assert!(v.params.is_empty());
        }
    }

    #[test]
    fn unknown_action_and_bad_id_are_rejected() {
        assert!(matches!(req("self_destruct", None).validate(), Err(GatewayError::InvalidCommand(_))));
        let bad = CommandRequest { device_id: "nope".into(), ..req("restart", None) };
        assert!(matches!(bad.validate(), Err(GatewayError::InvalidCommand(_))));
    }

    #[test]
    fn parses_from_json() {
        let r: CommandRequest =
            serde_json::from_str(r#"{"device_id":"0x11","action":"SET_SLEEP","value":600}"#).unwrap();
        let v = r.validate().unwrap();
        assert_eq!(v.device_id, 0x11);
        assert_eq!(v.params, b"600");
    }
}
