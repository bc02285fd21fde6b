//! High level client orchestration.
//!
//! Wires the transport, the captcha solver and the authenticator together
//! behind one mutex, and exposes the portal's queries and commands as async
//! methods that log in again by themselves when the session expires.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::api::device::DONGLE_DEVICE;
use crate::api::{
	ActivePowerControl, DeviceListQuery, OptimizerStatsQuery, PlantFlowQuery, PlantStatsQuery,
	PlantValue, PowerSetting, PowerStatus, PowerStatusQuery, StationListQuery,
	get_last_plant_data,
};
use crate::auth::{AuthError, AuthState, Authenticator, Credentials};
use crate::external_deps::captcha::{
	CaptchaSolver, LazyCaptchaSolver, ModelFileLoader, SolverLoader, SolverSettings,
};
use crate::gateway::RequestGateway;
use crate::modules::events::{EventDispatcher, EventHandler, LoggingHandler};
use crate::session::{
	DEFAULT_PORTAL_DOMAIN, DEFAULT_REQUEST_TIMEOUT, DEFAULT_SUBDOMAIN, PortalEndpoints,
	PortalHttpClient, ReqwestPortalClient, TransportError,
};

/// Result alias used across the client.
pub type FusionSolarResult<T> = Result<T, FusionSolarError>;

/// High-level error surfaced by the client.
#[derive(Debug, Error)]
pub enum FusionSolarError {
	#[error("authentication failed: {0}")]
	Authentication(#[from] AuthError),
	#[error("{0}")]
	Transport(#[from] TransportError),
	#[error("unexpected response payload: {0}")]
	Json(#[from] serde_json::Error),
	#[error("url parse error: {0}")]
	Url(#[from] url::ParseError),
	#[error("{0}")]
	Portal(String),
	#[error("missing data in portal response: {0}")]
	MissingData(String),
	#[error("invalid argument: {0}")]
	InvalidArgument(String),
	#[error("not logged into FusionSolar")]
	NotAuthenticated,
}

impl FusionSolarError {
	/// Failures that mean the portal no longer recognises the session: an
	/// unparseable payload, an HTTP error status, or no identity at all.
	pub fn is_session_expiry(&self) -> bool {
		matches!(
			self,
			FusionSolarError::Json(_)
				| FusionSolarError::Transport(TransportError::Status { .. })
				| FusionSolarError::NotAuthenticated
		)
	}
}

fn default_subdomain() -> String {
	DEFAULT_SUBDOMAIN.to_string()
}

fn default_portal_domain() -> String {
	DEFAULT_PORTAL_DOMAIN.to_string()
}

fn default_timeout_secs() -> u64 {
	DEFAULT_REQUEST_TIMEOUT.as_secs()
}

/// Client configuration used by the builder.
#[derive(Clone, Deserialize)]
pub struct FusionSolarConfig {
	pub username: String,
	pub password: String,
	/// First label of the portal URL, e.g. `region01eu5`.
	#[serde(default = "default_subdomain")]
	pub subdomain: String,
	#[serde(default = "default_portal_domain")]
	pub portal_domain: String,
	/// Captcha model; without it captchas cannot be answered.
	#[serde(default)]
	pub captcha: Option<SolverSettings>,
	#[serde(default = "default_timeout_secs")]
	pub request_timeout_secs: u64,
}

impl FusionSolarConfig {
	pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
		Self {
			username: username.into(),
			password: password.into(),
			subdomain: default_subdomain(),
			portal_domain: default_portal_domain(),
			captcha: None,
			request_timeout_secs: default_timeout_secs(),
		}
	}

	pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
		serde_json::from_str(raw)
	}

	/// Configured timeout, never below one second.
	pub fn request_timeout(&self) -> Duration {
		Duration::from_secs(self.request_timeout_secs.max(1))
	}
}

impl fmt::Debug for FusionSolarConfig {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("FusionSolarConfig")
			.field("username", &self.username)
			.field("password", &"<redacted>")
			.field("subdomain", &self.subdomain)
			.field("portal_domain", &self.portal_domain)
			.field("captcha", &self.captcha)
			.field("request_timeout_secs", &self.request_timeout_secs)
			.finish()
	}
}

/// Fluent builder for [`FusionSolarClient`].
pub struct FusionSolarBuilder {
	config: FusionSolarConfig,
	transport: Option<Arc<dyn PortalHttpClient>>,
	solver: Option<Arc<dyn CaptchaSolver>>,
	loader: Option<Arc<dyn SolverLoader>>,
	handlers: Vec<Arc<dyn EventHandler>>,
}

impl FusionSolarBuilder {
	pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
		Self::from_config(FusionSolarConfig::new(username, password))
	}

	pub fn from_config(config: FusionSolarConfig) -> Self {
		Self {
			config,
			transport: None,
			solver: None,
			loader: None,
			handlers: Vec::new(),
		}
	}

	pub fn with_subdomain(mut self, subdomain: impl Into<String>) -> Self {
		self.config.subdomain = subdomain.into();
		self
	}

	pub fn with_portal_domain(mut self, domain: impl Into<String>) -> Self {
		self.config.portal_domain = domain.into();
		self
	}

	/// Captcha model loaded lazily the first time the portal shows a captcha.
	/// Needs a loader from [`Self::with_solver_loader`] that can run it.
	pub fn with_captcha_model(mut self, settings: SolverSettings) -> Self {
		self.config.captcha = Some(settings);
		self
	}

	/// Ready-made solver; takes precedence over a configured model.
	pub fn with_captcha_solver(mut self, solver: Arc<dyn CaptchaSolver>) -> Self {
		self.solver = Some(solver);
		self
	}

	/// Loader used to turn the configured model into a solver.
	pub fn with_solver_loader(mut self, loader: Arc<dyn SolverLoader>) -> Self {
		self.loader = Some(loader);
		self
	}

	/// Replaces the reqwest transport. The client still logs in through it
	/// before the first operation.
	pub fn with_transport(mut self, transport: Arc<dyn PortalHttpClient>) -> Self {
		self.transport = Some(transport);
		self
	}

	pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
		self.config.request_timeout_secs = timeout.as_secs();
		self
	}

	pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
		self.handlers.push(handler);
		self
	}

	/// Builds the client without contacting the portal. The first operation
	/// logs in on demand.
	pub fn build(self) -> FusionSolarResult<FusionSolarClient> {
		FusionSolarClient::from_builder(self)
	}

	/// Builds the client and logs in right away, so bad credentials surface
	/// here.
	pub async fn connect(self) -> FusionSolarResult<FusionSolarClient> {
		let client = self.build()?;
		client.authenticate().await?;
		Ok(client)
	}
}

/// Client for one FusionSolar account.
///
/// All methods take `&self`; calls are serialised so that a login in
/// progress is never observed half-done.
pub struct FusionSolarClient {
	config: FusionSolarConfig,
	gateway: Mutex<RequestGateway>,
}

impl FusionSolarClient {
	/// Obtain a builder to customise the client instance.
	pub fn builder(username: impl Into<String>, password: impl Into<String>) -> FusionSolarBuilder {
		FusionSolarBuilder::new(username, password)
	}

	/// Builds a client from configuration and logs in.
	pub async fn connect(config: FusionSolarConfig) -> FusionSolarResult<Self> {
		FusionSolarBuilder::from_config(config).connect().await
	}

	fn from_builder(builder: FusionSolarBuilder) -> FusionSolarResult<Self> {
		let FusionSolarBuilder {
			config,
			transport,
			solver,
			loader,
			handlers,
		} = builder;

		let endpoints = PortalEndpoints::new(&config.subdomain, &config.portal_domain)?;

		let transport: Arc<dyn PortalHttpClient> = match transport {
			Some(transport) => transport,
			None => Arc::new(ReqwestPortalClient::new(config.request_timeout())?),
		};

		let solver = match (solver, &config.captcha) {
			(Some(solver), _) => LazyCaptchaSolver::ready(solver),
			(None, Some(settings)) => LazyCaptchaSolver::deferred(
				settings.clone(),
				loader.unwrap_or_else(|| Arc::new(ModelFileLoader)),
			),
			(None, None) => LazyCaptchaSolver::disabled(),
		};

		let mut events = EventDispatcher::new();
		events.register_handler(Arc::new(LoggingHandler));
		for handler in handlers {
			events.register_handler(handler);
		}

		let authenticator = Authenticator::new(
			transport,
			Credentials::new(config.username.clone(), config.password.clone()),
			endpoints,
			solver,
			Arc::new(events),
		);

		Ok(Self {
			config,
			gateway: Mutex::new(RequestGateway::new(authenticator)),
		})
	}

	pub fn config(&self) -> &FusionSolarConfig {
		&self.config
	}

	/// Logs in (again), replacing the current identity.
	pub async fn authenticate(&self) -> FusionSolarResult<()> {
		self.gateway.lock().await.authenticate().await
	}

	/// Best-effort logout from the portal.
	pub async fn log_out(&self) -> FusionSolarResult<()> {
		self.gateway.lock().await.log_out().await
	}

	pub async fn auth_state(&self) -> AuthState {
		self.gateway.lock().await.state().clone()
	}

	/// Company (account) id established by the last login.
	pub async fn company_id(&self) -> Option<String> {
		self.gateway
			.lock()
			.await
			.store()
			.company_id()
			.map(str::to_string)
	}

	/// Current power status summed over all stations.
	pub async fn get_power_status(&self) -> FusionSolarResult<PowerStatus> {
		self.gateway.lock().await.execute(&PowerStatusQuery).await
	}

	/// Raw station objects of the account.
	pub async fn get_station_list(&self) -> FusionSolarResult<Vec<Value>> {
		self.gateway
			.lock()
			.await
			.execute(&StationListQuery::default())
			.await
	}

	/// Ids (`dn`) of all stations linked to the account.
	pub async fn get_plant_ids(&self) -> FusionSolarResult<Vec<String>> {
		let stations = self.get_station_list().await?;
		stations
			.iter()
			.map(|station| {
				station
					.get("dn")
					.and_then(Value::as_str)
					.map(str::to_string)
					.ok_or_else(|| FusionSolarError::MissingData("station list: dn".into()))
			})
			.collect()
	}

	/// Device type name to device id for the account's devices.
	pub async fn get_device_ids(&self) -> FusionSolarResult<HashMap<String, String>> {
		self.gateway.lock().await.execute(&DeviceListQuery).await
	}

	/// Limits what the plant exports to the grid, via the dongle.
	pub async fn active_power_control(&self, setting: PowerSetting) -> FusionSolarResult<()> {
		let mut gateway = self.gateway.lock().await;
		let devices = gateway.execute(&DeviceListQuery).await?;
		let dongle = devices.get(DONGLE_DEVICE).cloned().ok_or_else(|| {
			FusionSolarError::MissingData(format!("no {DONGLE_DEVICE} device found"))
		})?;

		log::info!("setting active power control of {dongle} to {setting}");
		gateway
			.execute(&ActivePowerControl::new(dongle, setting))
			.await
	}

	/// Energy flow diagram payload of a plant.
	pub async fn get_plant_flow(&self, plant_id: &str) -> FusionSolarResult<Value> {
		self.gateway
			.lock()
			.await
			.execute(&PlantFlowQuery::new(plant_id))
			.await
	}

	/// Usage statistics of a plant. `query_time` must be midnight of the
	/// requested day in milliseconds; today when `None`.
	pub async fn get_plant_stats(
		&self,
		plant_id: &str,
		query_time: Option<i64>,
	) -> FusionSolarResult<Value> {
		self.gateway
			.lock()
			.await
			.execute(&PlantStatsQuery::new(plant_id, query_time))
			.await
	}

	/// Latest measurement per key of a `get_plant_stats` result.
	pub fn get_last_plant_data(
		&self,
		plant_data: &Value,
	) -> FusionSolarResult<BTreeMap<String, PlantValue>> {
		get_last_plant_data(plant_data)
	}

	/// Real-time optimizer stats of an inverter.
	pub async fn get_optimizer_stats(&self, inverter_id: &str) -> FusionSolarResult<Value> {
		self.gateway
			.lock()
			.await
			.execute(&OptimizerStatsQuery::new(inverter_id))
			.await
	}
}
