//! Credential submission and the single captcha escalation around it.

use std::fmt;

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::modules::events::{LoginAttemptEvent, SessionEvent};
use crate::session::endpoints::VALIDATE_USER_PATH;
use crate::session::{PortalRequest, PortalResponse, SessionStore};

use super::{AuthError, AuthOutcome, Authenticator};

static INCORRECT_CODE_RE: Lazy<Regex> = Lazy::new(|| {
    RegexBuilder::new(r"incorrect verification code")
        .case_insensitive(true)
        .build()
        .unwrap()
});

/// Account used to log into the portal. The portal subdomain is not part of
/// it; hosts come from [`PortalEndpoints`](crate::session::PortalEndpoints).
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct ValidateUserResponse {
    #[serde(rename = "errorMsg", default)]
    error_msg: Option<String>,
}

/// Classifies the body of `validateUser.action`.
pub fn classify_login_response(body: &[u8]) -> AuthOutcome {
    let Ok(response) = serde_json::from_slice::<ValidateUserResponse>(body) else {
        return AuthOutcome::InvalidEndpoint;
    };

    match response.error_msg.filter(|message| !message.is_empty()) {
        None => AuthOutcome::Success,
        Some(message) if INCORRECT_CODE_RE.is_match(&message) => {
            AuthOutcome::CaptchaRequired(message)
        }
        Some(message) => AuthOutcome::InvalidCredentials(message),
    }
}

impl Authenticator {
    /// Submits the credentials, escalating to a captcha solve at most once.
    pub(super) async fn login(&self, store: &mut SessionStore) -> Result<(), AuthError> {
        match self.submit_credentials(store, 1).await? {
            AuthOutcome::CaptchaRequired(message) => {
                log::info!("solving captcha and retrying login ({message})");
                store.clear_verify_code();

                if !self.probe_captcha(store).await? {
                    return Err(AuthError::CaptchaNotPresent);
                }
                if !store.has_verify_code() {
                    return Err(AuthError::MissingVerifyCode);
                }

                self.submit_credentials(store, 2).await?.into_result()
            }
            outcome => outcome.into_result(),
        }
    }

    /// One POST to `validateUser.action`. Any pending verification code is
    /// taken out of the store before the request leaves.
    async fn submit_credentials(
        &self,
        store: &mut SessionStore,
        attempt: u8,
    ) -> Result<AuthOutcome, AuthError> {
        let url = self.endpoints.login(VALIDATE_USER_PATH)?;

        let mut payload = json!({
            "organizationName": "",
            "username": self.credentials.username,
            "password": self.credentials.password,
        });
        let code = store.take_verify_code();
        if let Some(code) = &code {
            payload["verifycode"] = Value::String(code.clone());
        }

        self.events.dispatch(SessionEvent::LoginAttempt(LoginAttemptEvent {
            attempt,
            with_verify_code: code.is_some(),
            timestamp: chrono::Utc::now(),
        }));

        let request = PortalRequest::post(url)
            .with_query("decision", 1)
            .with_query("service", self.endpoints.login_service())
            .with_json(payload);

        let outcome = match self
            .transport
            .execute(request)
            .await
            .and_then(PortalResponse::error_for_status)
        {
            Ok(response) => classify_login_response(&response.body),
            Err(err) => AuthOutcome::TransientFailure(err),
        };
        Ok(outcome)
    }
}
