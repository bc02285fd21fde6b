//! Session plumbing shared by the authenticator, the gateway and the
//! portal operations.

pub mod endpoints;
pub mod reqwest_client;
pub mod store;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use endpoints::{DEFAULT_PORTAL_DOMAIN, DEFAULT_SUBDOMAIN, PortalEndpoints, login_subdomain};
pub use reqwest_client::{DEFAULT_REQUEST_TIMEOUT, ReqwestPortalClient};
pub use store::{CSRF_HEADER, SessionStore};
pub use transport::{
    PortalHttpClient, PortalRequest, PortalResponse, RequestBody, TransportError,
};

/// Milliseconds since the epoch, used for the portal's cache-busting `_` and
/// `timestamp` parameters.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
