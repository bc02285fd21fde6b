//! Transparent re-authentication around portal operations.
//!
//! Without an identity the gateway logs in before the first attempt.
//! Every operation gets at most one retry: if the first attempt looks like an
//! expired session, the gateway logs in again and replays the operation once.
//! Whatever the replay returns is final.

use crate::api::PortalOperation;
use crate::auth::{AuthState, Authenticator};
use crate::fusion_solar::FusionSolarResult;
use crate::modules::events::{ReauthenticateEvent, SessionEvent};
use crate::session::endpoints::LOGOUT_PATH;
use crate::session::{PortalRequest, SessionStore};

/// Owns the authenticator and the session it maintains.
pub struct RequestGateway {
    authenticator: Authenticator,
    store: SessionStore,
}

impl RequestGateway {
    pub fn new(authenticator: Authenticator) -> Self {
        Self {
            authenticator,
            store: SessionStore::new(),
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn authenticator(&self) -> &Authenticator {
        &self.authenticator
    }

    pub fn state(&self) -> &AuthState {
        self.authenticator.state()
    }

    pub async fn authenticate(&mut self) -> FusionSolarResult<()> {
        self.authenticator.authenticate(&mut self.store).await?;
        Ok(())
    }

    /// Runs `operation`, logging in first when no identity is held, and
    /// logging in again and retrying once on session expiry.
    pub async fn execute<O: PortalOperation>(&mut self, operation: &O) -> FusionSolarResult<O::Output> {
        if !self.store.is_authenticated() {
            self.authenticate().await?;
        }

        match self.attempt(operation).await {
            Err(err) if err.is_session_expiry() => {
                self.authenticator
                    .events()
                    .dispatch(SessionEvent::Reauthenticate(ReauthenticateEvent {
                        operation: operation.name(),
                        reason: err.to_string(),
                        timestamp: chrono::Utc::now(),
                    }));
                self.authenticator.authenticate(&mut self.store).await?;
                self.attempt(operation).await
            }
            result => result,
        }
    }

    async fn attempt<O: PortalOperation>(&self, operation: &O) -> FusionSolarResult<O::Output> {
        let request = operation.request(&self.store, self.authenticator.endpoints())?;
        let response = self
            .authenticator
            .transport()
            .execute(self.store.decorate(request))
            .await?;
        operation.parse(response)
    }

    /// Best-effort logout. The response is not inspected; the local identity
    /// is dropped either way.
    pub async fn log_out(&mut self) -> FusionSolarResult<()> {
        let endpoints = self.authenticator.endpoints();
        let request = PortalRequest::get(endpoints.public(LOGOUT_PATH)?)
            .with_query("service", endpoints.public_origin());
        let result = self
            .authenticator
            .transport()
            .execute(self.store.decorate(request))
            .await;

        self.store.invalidate();
        self.authenticator.reset();
        result?;
        Ok(())
    }
}
