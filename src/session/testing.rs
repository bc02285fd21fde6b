//! Scripted portal used by unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use http::Method;

use super::transport::{PortalHttpClient, PortalRequest, PortalResponse, TransportError};

/// Replays queued responses per `(method, path)`. The last queued response of
/// a route keeps being served once the others are used up.
pub(crate) struct StubPortal {
    routes: Mutex<HashMap<(Method, String), VecDeque<(u16, Vec<u8>)>>>,
    requests: Mutex<Vec<PortalRequest>>,
}

impl StubPortal {
    pub(crate) fn new() -> Self {
        Self {
            routes: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn on(self, method: Method, path: &str, status: u16, body: impl AsRef<[u8]>) -> Self {
        self.routes
            .lock()
            .unwrap()
            .entry((method, path.to_string()))
            .or_default()
            .push_back((status, body.as_ref().to_vec()));
        self
    }

    /// Replaces whatever was queued for the route.
    pub(crate) fn set(self, method: Method, path: &str, status: u16, body: impl AsRef<[u8]>) -> Self {
        self.routes
            .lock()
            .unwrap()
            .remove(&(method.clone(), path.to_string()));
        self.on(method, path, status, body)
    }

    /// Portal with no captcha, accepted credentials and a valid identity.
    pub(crate) fn happy() -> Self {
        Self::new()
            .on(Method::GET, "/", 200, "<html><input id=\"username\"/></html>")
            .on(Method::POST, "/unisso/v2/validateUser.action", 200, r#"{"errorMsg": ""}"#)
            .on(
                Method::GET,
                "/rest/neteco/web/organization/v2/company/current",
                200,
                r#"{"data": {"moDn": "NE=1"}}"#,
            )
            .on(Method::GET, "/unisess/v1/auth/session", 200, r#"{"csrfToken": "abc"}"#)
    }

    pub(crate) fn requests(&self) -> Vec<PortalRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn count(&self, method: Method, path: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|request| request.method == method && request.url.path() == path)
            .count()
    }
}

#[async_trait]
impl PortalHttpClient for StubPortal {
    async fn execute(&self, request: PortalRequest) -> Result<PortalResponse, TransportError> {
        let key = (request.method.clone(), request.url.path().to_string());
        let url = request.url.clone();
        self.requests.lock().unwrap().push(request);

        let mut routes = self.routes.lock().unwrap();
        let reply = match routes.get_mut(&key) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        };

        Ok(match reply {
            Some((status, body)) => PortalResponse::new(status, url, body),
            None => PortalResponse::new(404, url, "not found"),
        })
    }
}
