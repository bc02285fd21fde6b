//! Typed portal operations executed through the
//! [`RequestGateway`](crate::gateway::RequestGateway).
//!
//! Each operation builds one request from the current session and parses the
//! response. Parsing a body that is not JSON, or a 4xx/5xx status, counts as
//! an expired session; everything else is reported as is.

pub mod device;
pub mod plant_data;
pub mod station;

pub use device::{ActivePowerControl, DeviceListQuery, OptimizerStatsQuery, PowerSetting};
pub use plant_data::{LastValue, PlantValue, get_last_plant_data};
pub use station::{PlantFlowQuery, PlantStatsQuery, PowerStatus, PowerStatusQuery, StationListQuery};

use chrono::Utc;
use serde_json::Value;

use crate::fusion_solar::{FusionSolarError, FusionSolarResult};
use crate::session::{PortalEndpoints, PortalRequest, PortalResponse, SessionStore};

/// A request/response pair against the portal.
pub trait PortalOperation: Sync {
    type Output: Send;

    fn name(&self) -> &'static str;

    fn request(
        &self,
        session: &SessionStore,
        endpoints: &PortalEndpoints,
    ) -> FusionSolarResult<PortalRequest>;

    fn parse(&self, response: PortalResponse) -> FusionSolarResult<Self::Output>;
}

/// Status check plus JSON decoding.
pub(crate) fn json_payload(response: PortalResponse) -> FusionSolarResult<Value> {
    let response = response.error_for_status()?;
    Ok(response.json()?)
}

/// Portal payloads carry `"success": true` and a `data` member when the call
/// worked.
pub(crate) fn ensure_success(payload: &Value, context: impl FnOnce() -> String) -> FusionSolarResult<()> {
    let success = payload
        .get("success")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    if !success || payload.get("data").is_none() {
        return Err(FusionSolarError::Portal(context()));
    }
    Ok(())
}

pub(crate) fn data_member(mut payload: Value, context: &str) -> FusionSolarResult<Value> {
    match payload.get_mut("data") {
        Some(data) => Ok(data.take()),
        None => Err(FusionSolarError::MissingData(format!("{context}: data"))),
    }
}

/// Numbers arrive either as JSON numbers or as numeric strings.
pub(crate) fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        Value::Bool(flag) => Some(if *flag { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// Start of the current UTC day in milliseconds, the portal's default
/// `queryTime`.
pub fn day_start_millis() -> i64 {
    Utc::now()
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|midnight| midnight.and_utc().timestamp_millis())
        .unwrap_or_default()
}
