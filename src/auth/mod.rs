//! Portal login state machine.
//!
//! [`Authenticator::authenticate`] walks
//! `CheckingCaptcha → Authenticating → FetchingIdentity → FetchingToken`
//! and commits the company id and anti-forgery token to the
//! [`SessionStore`](crate::session::SessionStore) only once both are known.
//! A captcha demanded by the login endpoint is answered at most once per
//! run.

mod authenticator;
mod captcha;
mod login;

pub use authenticator::Authenticator;
pub use captcha::{VerificationChallenge, has_verification_input};
pub use login::{Credentials, classify_login_response};

use std::fmt;

use thiserror::Error;

use crate::external_deps::captcha::CaptchaError;
use crate::session::TransportError;

/// Where the authenticator currently is.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AuthState {
    #[default]
    Unauthenticated,
    CheckingCaptcha,
    Authenticating,
    FetchingIdentity,
    FetchingToken,
    Authenticated,
    Failed(String),
}

impl fmt::Display for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthState::Unauthenticated => f.write_str("unauthenticated"),
            AuthState::CheckingCaptcha => f.write_str("checking captcha"),
            AuthState::Authenticating => f.write_str("authenticating"),
            AuthState::FetchingIdentity => f.write_str("fetching identity"),
            AuthState::FetchingToken => f.write_str("fetching token"),
            AuthState::Authenticated => f.write_str("authenticated"),
            AuthState::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// Result of one credential submission.
#[derive(Debug)]
pub enum AuthOutcome {
    Success,
    /// The portal rejected (or wanted) a verification code.
    CaptchaRequired(String),
    InvalidCredentials(String),
    /// The login endpoint answered with something that is not the login API.
    InvalidEndpoint,
    TransientFailure(TransportError),
}

impl AuthOutcome {
    /// Maps every outcome but `Success` to its error. `CaptchaRequired`
    /// arriving here means escalation was already spent.
    pub fn into_result(self) -> Result<(), AuthError> {
        match self {
            AuthOutcome::Success => Ok(()),
            AuthOutcome::CaptchaRequired(message) => Err(AuthError::CaptchaUnresolved(message)),
            AuthOutcome::InvalidCredentials(message) => Err(AuthError::Rejected(message)),
            AuthOutcome::InvalidEndpoint => Err(AuthError::InvalidSubdomain),
            AuthOutcome::TransientFailure(err) => Err(AuthError::Transport(err)),
        }
    }
}

/// Failures that abort an `authenticate()` run.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("failed to login into FusionSolar: {0}")]
    Rejected(String),
    #[error("login failed: verification code still rejected after solving captcha: {0}")]
    CaptchaUnresolved(String),
    #[error("login failed: captcha required but not present")]
    CaptchaNotPresent,
    #[error("login failed: no verify code found")]
    MissingVerifyCode,
    #[error("login failed: captcha prevalidation failed")]
    PrevalidationFailed,
    #[error("captcha required but no solver configured")]
    SolverUnavailable,
    #[error("captcha solver error: {0}")]
    Solver(#[from] CaptchaError),
    #[error("invalid response received, please check the configured FusionSolar subdomain")]
    InvalidSubdomain,
    #[error("failed to login into FusionSolar: response lacks {0}")]
    MissingField(&'static str),
    #[error("failed to login into FusionSolar: unusable csrf token")]
    InvalidToken,
    #[error("invalid portal url: {0}")]
    Url(#[from] url::ParseError),
    #[error("transport failure during login: {0}")]
    Transport(#[from] TransportError),
}

impl AuthError {
    /// Everything except transport and url trouble is a rejection of the
    /// identity itself.
    pub fn is_rejection(&self) -> bool {
        !matches!(self, AuthError::Transport(_) | AuthError::Url(_))
    }
}
