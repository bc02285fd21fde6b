//! The single authenticated identity held by a client.

use http::header::{HeaderName, HeaderValue};

use super::transport::PortalRequest;

/// Header carrying the anti-forgery token on every authenticated request.
pub const CSRF_HEADER: HeaderName = HeaderName::from_static("roarand");

/// Company id and anti-forgery token of the logged-in account, plus the
/// verification code waiting for the next credential submission.
///
/// Cookies live in the transport; everything else about the identity lives
/// here. Only the authenticator mutates it.
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    company_id: Option<String>,
    csrf_token: Option<HeaderValue>,
    verify_code: Option<String>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn company_id(&self) -> Option<&str> {
        self.company_id.as_deref()
    }

    pub fn csrf_token(&self) -> Option<&str> {
        self.csrf_token
            .as_ref()
            .and_then(|value| value.to_str().ok())
    }

    pub fn is_authenticated(&self) -> bool {
        self.company_id.is_some() && self.csrf_token.is_some()
    }

    /// Commits identity and token together.
    pub(crate) fn establish(&mut self, company_id: String, csrf_token: HeaderValue) {
        self.company_id = Some(company_id);
        self.csrf_token = Some(csrf_token);
    }

    pub(crate) fn invalidate(&mut self) {
        self.company_id = None;
        self.csrf_token = None;
        self.verify_code = None;
    }

    pub(crate) fn set_verify_code(&mut self, code: String) {
        self.verify_code = Some(code);
    }

    /// Removes the pending code. Whoever takes it must submit it.
    pub(crate) fn take_verify_code(&mut self) -> Option<String> {
        self.verify_code.take()
    }

    pub(crate) fn clear_verify_code(&mut self) {
        self.verify_code = None;
    }

    pub fn has_verify_code(&self) -> bool {
        self.verify_code.is_some()
    }

    /// Attaches the anti-forgery token, when one is held.
    pub fn decorate(&self, mut request: PortalRequest) -> PortalRequest {
        if let Some(token) = &self.csrf_token {
            request.headers.insert(CSRF_HEADER, token.clone());
        }
        request
    }
}
