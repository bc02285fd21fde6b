//! Device listing, optimizer stats and active power control.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::fusion_solar::{FusionSolarError, FusionSolarResult};
use crate::session::{PortalEndpoints, PortalRequest, PortalResponse, SessionStore, now_millis};

use super::{PortalOperation, data_member, ensure_success, json_payload};

const DEVICE_LIST_PATH: &str = "/rest/neteco/web/config/device/v1/device-list";
const SET_CONFIG_SIGNALS_PATH: &str = "/rest/pvms/web/device/v1/deviceExt/set-config-signals";
const OPTIMIZER_INFO_PATH: &str = "/rest/pvms/web/station/v1/layout/optimizer-info";

/// Device types requested from the device list.
const DEVICE_MOC_TYPES: &str = "20814,20815,20816,20819,20822,50017,60066,60014,60015,23037";

/// Signal id of "Active Power Control" on the dongle.
const ACTIVE_POWER_CONTROL_SIGNAL: &str = "230190032";

/// Device type that accepts power control commands.
pub const DONGLE_DEVICE: &str = "Dongle";

/// Devices below the account's company, keyed by type name (`Dongle`,
/// `Inverter`, ...).
#[derive(Debug, Clone, Copy, Default)]
pub struct DeviceListQuery;

impl PortalOperation for DeviceListQuery {
    type Output = HashMap<String, String>;

    fn name(&self) -> &'static str {
        "get_device_ids"
    }

    fn request(&self, session: &SessionStore, endpoints: &PortalEndpoints) -> FusionSolarResult<PortalRequest> {
        let company_id = session.company_id().ok_or(FusionSolarError::NotAuthenticated)?;
        Ok(PortalRequest::get(endpoints.public(DEVICE_LIST_PATH)?)
            .with_query("conditionParams.parentDn", company_id)
            .with_query("conditionParams.mocTypes", DEVICE_MOC_TYPES)
            .with_query("_", now_millis()))
    }

    fn parse(&self, response: PortalResponse) -> FusionSolarResult<HashMap<String, String>> {
        let payload = json_payload(response)?;
        let Some(Value::Array(devices)) = payload.get("data") else {
            return Err(FusionSolarError::MissingData("device list: data".into()));
        };

        devices
            .iter()
            .map(|device| {
                let kind = device.get("mocTypeName").and_then(Value::as_str);
                let dn = device.get("dn").and_then(Value::as_str);
                match (kind, dn) {
                    (Some(kind), Some(dn)) => Ok((kind.to_string(), dn.to_string())),
                    _ => Err(FusionSolarError::MissingData(
                        "device list: mocTypeName/dn".into(),
                    )),
                }
            })
            .collect()
    }
}

/// Export limitation modes of the dongle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PowerSetting {
    NoLimit,
    ZeroExportLimitation,
    LimitedPowerGridKw,
    LimitedPowerGridPercent,
}

impl PowerSetting {
    pub const ALL: [PowerSetting; 4] = [
        PowerSetting::NoLimit,
        PowerSetting::ZeroExportLimitation,
        PowerSetting::LimitedPowerGridKw,
        PowerSetting::LimitedPowerGridPercent,
    ];

    pub fn label(self) -> &'static str {
        match self {
            PowerSetting::NoLimit => "No limit",
            PowerSetting::ZeroExportLimitation => "Zero Export Limitation",
            PowerSetting::LimitedPowerGridKw => "Limited Power Grid (kW)",
            PowerSetting::LimitedPowerGridPercent => "Limited Power Grid (%)",
        }
    }

    /// Value written to the active power control signal.
    pub fn signal_value(self) -> u8 {
        match self {
            PowerSetting::NoLimit => 0,
            PowerSetting::ZeroExportLimitation => 5,
            PowerSetting::LimitedPowerGridKw => 6,
            PowerSetting::LimitedPowerGridPercent => 7,
        }
    }
}

impl fmt::Display for PowerSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for PowerSetting {
    type Err = FusionSolarError;

    fn from_str(label: &str) -> Result<Self, Self::Err> {
        PowerSetting::ALL
            .into_iter()
            .find(|setting| setting.label() == label)
            .ok_or_else(|| FusionSolarError::InvalidArgument(format!("Unknown power setting: {label}")))
    }
}

/// Writes the active power control signal of a dongle.
#[derive(Debug, Clone)]
pub struct ActivePowerControl {
    pub dongle_dn: String,
    pub setting: PowerSetting,
}

impl ActivePowerControl {
    pub fn new(dongle_dn: impl Into<String>, setting: PowerSetting) -> Self {
        Self {
            dongle_dn: dongle_dn.into(),
            setting,
        }
    }

    fn change_values(&self) -> String {
        format!(
            r#"[{{"id":"{ACTIVE_POWER_CONTROL_SIGNAL}","value":"{}"}}]"#,
            self.setting.signal_value()
        )
    }
}

impl PortalOperation for ActivePowerControl {
    type Output = ();

    fn name(&self) -> &'static str {
        "active_power_control"
    }

    fn request(&self, _session: &SessionStore, endpoints: &PortalEndpoints) -> FusionSolarResult<PortalRequest> {
        Ok(PortalRequest::post(endpoints.public(SET_CONFIG_SIGNALS_PATH)?).with_form([
            ("dn", self.dongle_dn.clone()),
            ("changeValues", self.change_values()),
        ]))
    }

    fn parse(&self, response: PortalResponse) -> FusionSolarResult<()> {
        response.error_for_status()?;
        Ok(())
    }
}

/// Real-time stats of the optimizers behind one inverter.
#[derive(Debug, Clone)]
pub struct OptimizerStatsQuery {
    pub inverter_id: String,
}

impl OptimizerStatsQuery {
    pub fn new(inverter_id: impl Into<String>) -> Self {
        Self {
            inverter_id: inverter_id.into(),
        }
    }
}

impl PortalOperation for OptimizerStatsQuery {
    type Output = Value;

    fn name(&self) -> &'static str {
        "get_optimizer_stats"
    }

    fn request(&self, _session: &SessionStore, endpoints: &PortalEndpoints) -> FusionSolarResult<PortalRequest> {
        Ok(PortalRequest::get(endpoints.public(OPTIMIZER_INFO_PATH)?)
            .with_query("inverterDn", &self.inverter_id)
            .with_query("_", now_millis()))
    }

    fn parse(&self, response: PortalResponse) -> FusionSolarResult<Value> {
        let payload = json_payload(response)?;
        ensure_success(&payload, || {
            format!("Failed to retrieve optimizer stats for {}", self.inverter_id)
        })?;
        data_member(payload, "optimizer stats")
    }
}
