//! Captcha detection on the pre-login page and the solve/prevalidate round.

use bytes::Bytes;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};

use crate::modules::events::{CaptchaEvent, SessionEvent};
use crate::session::endpoints::{CAPTCHA_PROBE_SERVICE, PREVALIDATE_PATH, VERIFY_CODE_PATH};
use crate::session::{PortalRequest, SessionStore, now_millis};

use super::{AuthError, Authenticator};

const PREVALIDATE_SUCCESS: &str = "success";

static VERIFICATION_INPUT: Lazy<Selector> =
    Lazy::new(|| Selector::parse("#verificationCodeInput").unwrap());

/// Returns `true` when the login page asks for a verification code.
pub fn has_verification_input(html: &str) -> bool {
    Html::parse_document(html)
        .select(&VERIFICATION_INPUT)
        .next()
        .is_some()
}

/// One captcha image and, once solved, its code. Tied to a single server
/// nonce, so it is never reused.
#[derive(Debug, Clone)]
pub struct VerificationChallenge {
    image: Bytes,
    code: Option<String>,
}

impl VerificationChallenge {
    pub fn new(image: impl Into<Bytes>) -> Self {
        Self {
            image: image.into(),
            code: None,
        }
    }

    pub fn image(&self) -> &[u8] {
        &self.image
    }

    pub fn is_solved(&self) -> bool {
        self.code.is_some()
    }

    fn solved(mut self, code: String) -> Self {
        self.code = Some(code);
        self
    }

    fn into_code(self) -> Option<String> {
        self.code
    }
}

impl Authenticator {
    /// Loads the pre-login page and answers the captcha if one is shown.
    ///
    /// Returns whether a challenge was present. When it was, the
    /// prevalidated code is left in the store for the next submission.
    pub(super) async fn probe_captcha(&self, store: &mut SessionStore) -> Result<bool, AuthError> {
        log::debug!("Checking if captcha is required");

        let url = self.endpoints.login("/")?;
        let page = self
            .send(PortalRequest::get(url).with_query("service", CAPTCHA_PROBE_SERVICE))
            .await?;
        if !has_verification_input(&page.text()) {
            return Ok(false);
        }

        let solver = self.solver.resolve()?.ok_or(AuthError::SolverUnavailable)?;

        let url = self.endpoints.login(VERIFY_CODE_PATH)?;
        let image = self
            .send(PortalRequest::get(url).with_query("timestamp", now_millis()))
            .await?
            .body;
        let challenge = VerificationChallenge::new(image);

        let code = solver.solve(challenge.image()).await?;
        let code = challenge
            .solved(code.trim().to_string())
            .into_code()
            .filter(|code| !code.is_empty())
            .ok_or(AuthError::MissingVerifyCode)?;

        let accepted = self.prevalidate(&code).await?;
        self.events.dispatch(SessionEvent::Captcha(CaptchaEvent {
            solver: solver.name().to_string(),
            accepted,
            timestamp: chrono::Utc::now(),
        }));
        if !accepted {
            return Err(AuthError::PrevalidationFailed);
        }

        store.set_verify_code(code);
        Ok(true)
    }

    async fn prevalidate(&self, code: &str) -> Result<bool, AuthError> {
        let url = self.endpoints.login(PREVALIDATE_PATH)?;
        let response = self
            .send(PortalRequest::post(url).with_form([("verifycode", code), ("index", "0")]))
            .await?;
        Ok(response.text() == PREVALIDATE_SUCCESS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_verification_input_by_id() {
        let page = r#"<html><body><form>
            <input id="username"/>
            <input id="verificationCodeInput" type="text"/>
        </form></body></html>"#;
        assert!(has_verification_input(page));
    }

    #[test]
    fn ignores_pages_without_verification_input() {
        let page = r#"<html><body><input id="username"/><div class="verificationCodeInput"></div></body></html>"#;
        assert!(!has_verification_input(page));
    }

    #[test]
    fn challenge_starts_unsolved() {
        let challenge = VerificationChallenge::new(vec![0x89, b'P', b'N', b'G']);
        assert!(!challenge.is_solved());
        assert_eq!(challenge.image().len(), 4);
        assert!(challenge.solved("k3x9".into()).is_solved());
    }
}
