use std::sync::Arc;

use http::header::HeaderValue;
use serde_json::Value;

use crate::external_deps::captcha::LazyCaptchaSolver;
use crate::modules::events::{AuthenticatedEvent, ErrorEvent, EventDispatcher, SessionEvent};
use crate::session::endpoints::{COMPANY_PATH, SESSION_PATH};
use crate::session::{
    PortalEndpoints, PortalHttpClient, PortalRequest, PortalResponse, SessionStore, now_millis,
};

use super::{AuthError, AuthState, Credentials};

/// Prefix of a well-formed company response. A wrong subdomain yields an HTML
/// redirect page instead; this literal check is all that tells them apart and
/// breaks if the portal ever reorders its envelope.
const COMPANY_ENVELOPE: &str = "{\"data\":";

/// Drives the login sequence for one portal identity.
pub struct Authenticator {
    pub(super) transport: Arc<dyn PortalHttpClient>,
    pub(super) credentials: Credentials,
    pub(super) endpoints: PortalEndpoints,
    pub(super) solver: LazyCaptchaSolver,
    pub(super) events: Arc<EventDispatcher>,
    state: AuthState,
}

impl Authenticator {
    pub fn new(
        transport: Arc<dyn PortalHttpClient>,
        credentials: Credentials,
        endpoints: PortalEndpoints,
        solver: LazyCaptchaSolver,
        events: Arc<EventDispatcher>,
    ) -> Self {
        Self {
            transport,
            credentials,
            endpoints,
            solver,
            events,
            state: AuthState::Unauthenticated,
        }
    }

    pub fn state(&self) -> &AuthState {
        &self.state
    }

    pub fn endpoints(&self) -> &PortalEndpoints {
        &self.endpoints
    }

    pub fn transport(&self) -> &Arc<dyn PortalHttpClient> {
        &self.transport
    }

    pub fn events(&self) -> &Arc<EventDispatcher> {
        &self.events
    }

    pub fn solver(&self) -> &LazyCaptchaSolver {
        &self.solver
    }

    /// Logs in from scratch and fills `store` with the new identity.
    ///
    /// On error the store is left empty; calling again restarts the whole
    /// sequence.
    pub async fn authenticate(&mut self, store: &mut SessionStore) -> Result<(), AuthError> {
        log::debug!("Logging into FusionSolar as {}", self.credentials.username);
        store.invalidate();

        match self.run(store).await {
            Ok(company_id) => {
                self.transition(AuthState::Authenticated);
                self.events.dispatch(SessionEvent::Authenticated(AuthenticatedEvent {
                    company_id,
                    timestamp: chrono::Utc::now(),
                }));
                Ok(())
            }
            Err(err) => {
                self.events.dispatch(SessionEvent::Error(ErrorEvent {
                    stage: self.state.to_string(),
                    error: err.to_string(),
                    timestamp: chrono::Utc::now(),
                }));
                self.transition(AuthState::Failed(err.to_string()));
                Err(err)
            }
        }
    }

    /// Marks the identity as gone, e.g. after logging out.
    pub fn reset(&mut self) {
        self.transition(AuthState::Unauthenticated);
    }

    async fn run(&mut self, store: &mut SessionStore) -> Result<String, AuthError> {
        self.transition(AuthState::CheckingCaptcha);
        self.probe_captcha(store).await?;

        self.transition(AuthState::Authenticating);
        self.login(store).await?;

        self.transition(AuthState::FetchingIdentity);
        let company_id = self.fetch_company_id().await?;

        self.transition(AuthState::FetchingToken);
        let csrf_token = self.fetch_csrf_token().await?;

        store.establish(company_id.clone(), csrf_token);
        Ok(company_id)
    }

    async fn fetch_company_id(&self) -> Result<String, AuthError> {
        let url = self.endpoints.public(COMPANY_PATH)?;
        let response = self
            .send(PortalRequest::get(url).with_query("_", now_millis()))
            .await?;
        company_id_from_body(&response.body)
    }

    async fn fetch_csrf_token(&self) -> Result<HeaderValue, AuthError> {
        let url = self.endpoints.public(SESSION_PATH)?;
        let response = self.send(PortalRequest::get(url)).await?;
        let payload: Value = response
            .json()
            .map_err(|_| AuthError::MissingField("csrfToken"))?;
        let token = payload
            .get("csrfToken")
            .and_then(Value::as_str)
            .ok_or(AuthError::MissingField("csrfToken"))?;
        HeaderValue::from_str(token).map_err(|_| AuthError::InvalidToken)
    }

    pub(super) async fn send(&self, request: PortalRequest) -> Result<PortalResponse, AuthError> {
        Ok(self.transport.execute(request).await?.error_for_status()?)
    }

    fn transition(&mut self, next: AuthState) {
        log::debug!("auth state: {} -> {}", self.state, next);
        self.state = next;
    }
}

fn company_id_from_body(body: &[u8]) -> Result<String, AuthError> {
    let text = String::from_utf8_lossy(body);
    if !text.trim_start().starts_with(COMPANY_ENVELOPE) {
        return Err(AuthError::InvalidSubdomain);
    }

    let payload: Value = serde_json::from_str(&text).map_err(|_| AuthError::InvalidSubdomain)?;
    let data = payload.get("data").ok_or(AuthError::MissingField("data"))?;
    data.get("moDn")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or(AuthError::MissingField("data.moDn"))
}
