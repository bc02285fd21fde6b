//! Station (plant) level queries.

use serde::Serialize;
use serde_json::{Value, json};

use crate::fusion_solar::{FusionSolarError, FusionSolarResult};
use crate::session::{PortalEndpoints, PortalRequest, PortalResponse, SessionStore, now_millis};

use super::{PortalOperation, as_number, data_member, day_start_millis, ensure_success, json_payload};

const TOTAL_REAL_KPI_PATH: &str = "/rest/pvms/web/station/v1/station/total-real-kpi";
const STATION_LIST_PATH: &str = "/rest/pvms/web/station/v1/station/station-list";
const ENERGY_FLOW_PATH: &str = "/rest/pvms/web/station/v1/overview/energy-flow";
const ENERGY_BALANCE_PATH: &str = "/rest/pvms/web/station/v1/overview/energy-balance";

/// Power summary across all stations of the account.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PowerStatus {
    pub current_power_kw: f64,
    pub total_power_today_kwh: f64,
    pub total_power_kwh: f64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PowerStatusQuery;

impl PortalOperation for PowerStatusQuery {
    type Output = PowerStatus;

    fn name(&self) -> &'static str {
        "get_power_status"
    }

    fn request(&self, _session: &SessionStore, endpoints: &PortalEndpoints) -> FusionSolarResult<PortalRequest> {
        let now = now_millis();
        Ok(PortalRequest::get(endpoints.public(TOTAL_REAL_KPI_PATH)?)
            .with_query("queryTime", now)
            .with_query("timeZone", 1)
            .with_query("_", now))
    }

    fn parse(&self, response: PortalResponse) -> FusionSolarResult<PowerStatus> {
        let payload = json_payload(response)?;
        let number = |field: &str| {
            payload
                .get("data")
                .and_then(|data| data.get(field))
                .and_then(as_number)
                .ok_or_else(|| FusionSolarError::MissingData(format!("power status: data.{field}")))
        };

        Ok(PowerStatus {
            current_power_kw: number("currentPower")?,
            total_power_today_kwh: number("dailyEnergy")?,
            total_power_kwh: number("cumulativeEnergy")?,
        })
    }
}

/// First page of the account's PV stations, newest first.
#[derive(Debug, Clone)]
pub struct StationListQuery {
    pub query_time: i64,
}

impl Default for StationListQuery {
    fn default() -> Self {
        Self {
            query_time: day_start_millis(),
        }
    }
}

impl PortalOperation for StationListQuery {
    type Output = Vec<Value>;

    fn name(&self) -> &'static str {
        "get_station_list"
    }

    fn request(&self, _session: &SessionStore, endpoints: &PortalEndpoints) -> FusionSolarResult<PortalRequest> {
        Ok(PortalRequest::post(endpoints.public(STATION_LIST_PATH)?).with_json(json!({
            "curPage": 1,
            "pageSize": 10,
            "gridConnectedTime": "",
            "queryTime": self.query_time,
            "timeZone": 2,
            "sortId": "createTime",
            "sortDir": "DESC",
            "locale": "en_US",
        })))
    }

    fn parse(&self, response: PortalResponse) -> FusionSolarResult<Vec<Value>> {
        let payload = json_payload(response)?;
        ensure_success(&payload, || "Failed to retrieve station list".to_string())?;

        match payload.pointer("/data/list") {
            Some(Value::Array(stations)) => Ok(stations.clone()),
            _ => Err(FusionSolarError::MissingData("station list: data.list".into())),
        }
    }
}

/// Energy flow diagram data of one plant. Returns the full payload.
#[derive(Debug, Clone)]
pub struct PlantFlowQuery {
    pub plant_id: String,
}

impl PlantFlowQuery {
    pub fn new(plant_id: impl Into<String>) -> Self {
        Self {
            plant_id: plant_id.into(),
        }
    }
}

impl PortalOperation for PlantFlowQuery {
    type Output = Value;

    fn name(&self) -> &'static str {
        "get_plant_flow"
    }

    fn request(&self, _session: &SessionStore, endpoints: &PortalEndpoints) -> FusionSolarResult<PortalRequest> {
        Ok(PortalRequest::get(endpoints.public(ENERGY_FLOW_PATH)?)
            .with_query("stationDn", &self.plant_id)
            .with_query("_", now_millis()))
    }

    fn parse(&self, response: PortalResponse) -> FusionSolarResult<Value> {
        let payload = json_payload(response)?;
        ensure_success(&payload, || {
            format!("Failed to retrieve plant flow for {}", self.plant_id)
        })?;
        Ok(payload)
    }
}

/// Usage statistics of one plant for a day.
#[derive(Debug, Clone)]
pub struct PlantStatsQuery {
    pub plant_id: String,
    /// Midnight of the requested day in milliseconds; today when unset.
    pub query_time: Option<i64>,
}

impl PlantStatsQuery {
    pub fn new(plant_id: impl Into<String>, query_time: Option<i64>) -> Self {
        Self {
            plant_id: plant_id.into(),
            query_time,
        }
    }
}

impl PortalOperation for PlantStatsQuery {
    type Output = Value;

    fn name(&self) -> &'static str {
        "get_plant_stats"
    }

    fn request(&self, _session: &SessionStore, endpoints: &PortalEndpoints) -> FusionSolarResult<PortalRequest> {
        let query_time = self.query_time.unwrap_or_else(day_start_millis);
        Ok(PortalRequest::get(endpoints.public(ENERGY_BALANCE_PATH)?)
            .with_query("stationDn", &self.plant_id)
            .with_query("timeDim", 2)
            .with_query("queryTime", query_time)
            // 1 outside daylight saving time
            .with_query("timeZone", 2)
            .with_query("timeZoneStr", "Europe/Vienna")
            .with_query("_", now_millis()))
    }

    fn parse(&self, response: PortalResponse) -> FusionSolarResult<Value> {
        let payload = json_payload(response)?;
        ensure_success(&payload, || {
            format!("Failed to retrieve plant status for {}", self.plant_id)
        })?;
        data_member(payload, "plant stats")
    }
}
