//! # fusion-solar-rs
//!
//! An async client for the Huawei FusionSolar web portal.
//!
//! The portal has no public API for end users. This crate logs in the way the
//! browser does, answering the login captcha with a caller-provided model
//! when one is shown. It keeps the session alive by logging in again when a
//! request comes back as expired.
//!
//! ## Example
//!
//! ```no_run
//! use fusion_solar_rs::FusionSolarClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = FusionSolarClient::builder("owner@example.com", "secret")
//!         .with_subdomain("region01eu5")
//!         .connect()
//!         .await?;
//!     let status = client.get_power_status().await?;
//!     println!("Current power: {} kW", status.current_power_kw);
//!     Ok(())
//! }
//! ```

mod fusion_solar;

pub mod api;
pub mod auth;
pub mod external_deps;
pub mod gateway;
pub mod modules;
pub mod session;

pub use crate::fusion_solar::{
    FusionSolarBuilder,
    FusionSolarClient,
    FusionSolarConfig,
    FusionSolarError,
    FusionSolarResult,
};

pub use crate::api::{
    LastValue,
    PlantValue,
    PortalOperation,
    PowerSetting,
    PowerStatus,
    get_last_plant_data,
};

pub use crate::auth::{AuthError, AuthOutcome, AuthState, Credentials, VerificationChallenge};

pub use crate::external_deps::captcha::{
    CaptchaError,
    CaptchaSolver,
    LazyCaptchaSolver,
    ModelFileLoader,
    SolverLoader,
    SolverRuntime,
    SolverSettings,
};

pub use crate::gateway::RequestGateway;

pub use crate::modules::{
    AuthenticatedEvent,
    CaptchaEvent,
    ErrorEvent,
    EventDispatcher,
    EventHandler,
    LoggingHandler,
    LoginAttemptEvent,
    ReauthenticateEvent,
    SessionEvent,
};

pub use crate::session::{
    PortalEndpoints,
    PortalHttpClient,
    PortalRequest,
    PortalResponse,
    ReqwestPortalClient,
    RequestBody,
    SessionStore,
    TransportError,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
