//! Event system for the session lifecycle.
//!
//! Provides hooks for logging and custom reactions around login, captcha
//! handling and re-authentication.

use chrono::{DateTime, Utc};
use std::sync::Arc;

/// A credential submission is about to be sent.
#[derive(Debug, Clone)]
pub struct LoginAttemptEvent {
    pub attempt: u8,
    pub with_verify_code: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CaptchaEvent {
    pub solver: String,
    pub accepted: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct AuthenticatedEvent {
    pub company_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ReauthenticateEvent {
    pub operation: &'static str,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ErrorEvent {
    pub stage: String,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum SessionEvent {
    LoginAttempt(LoginAttemptEvent),
    Captcha(CaptchaEvent),
    Authenticated(AuthenticatedEvent),
    Reauthenticate(ReauthenticateEvent),
    Error(ErrorEvent),
}

/// Trait implemented by event handlers.
pub trait EventHandler: Send + Sync {
    fn handle(&self, event: &SessionEvent);
}

/// Dispatcher that broadcasts events to registered handlers.
#[derive(Default)]
pub struct EventDispatcher {
    handlers: Vec<Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self { handlers: Vec::new() }
    }

    pub fn register_handler(&mut self, handler: Arc<dyn EventHandler>) {
        self.handlers.push(handler);
    }

    pub fn dispatch(&self, event: SessionEvent) {
        for handler in &self.handlers {
            handler.handle(&event);
        }
    }
}

/// Logs events using the `log` crate.
#[derive(Debug)]
pub struct LoggingHandler;

impl EventHandler for LoggingHandler {
    fn handle(&self, event: &SessionEvent) {
        match event {
            SessionEvent::LoginAttempt(attempt) => {
                log::debug!(
                    "login attempt {} (verify code: {})",
                    attempt.attempt,
                    attempt.with_verify_code
                );
            }
            SessionEvent::Captcha(captcha) => {
                log::info!("captcha solved by {} accepted={}", captcha.solver, captcha.accepted);
            }
            SessionEvent::Authenticated(done) => {
                log::info!("logged into FusionSolar as company {}", done.company_id);
            }
            SessionEvent::Reauthenticate(reauth) => {
                log::info!("session expired during {} ({}), logging in", reauth.operation, reauth.reason);
            }
            SessionEvent::Error(error) => {
                log::warn!("{} failed -> {}", error.stage, error.error);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingHandler(std::sync::Mutex<usize>);

    impl EventHandler for CountingHandler {
        fn handle(&self, _event: &SessionEvent) {
            *self.0.lock().unwrap() += 1;
        }
    }

    #[test]
    fn dispatches_to_handlers() {
        let mut dispatcher = EventDispatcher::new();
        let counter = Arc::new(CountingHandler(std::sync::Mutex::new(0)));
        dispatcher.register_handler(counter.clone());
        dispatcher.register_handler(Arc::new(LoggingHandler));
        dispatcher.dispatch(SessionEvent::Error(ErrorEvent {
            stage: "login".into(),
            error: "timeout".into(),
            timestamp: Utc::now(),
        }));
        assert_eq!(*counter.0.lock().unwrap(), 1);
    }
}
