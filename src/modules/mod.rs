//! Cross-cutting services module
//!
//! Session lifecycle events and their handlers.

pub mod events;

pub use events::{
    AuthenticatedEvent, CaptchaEvent, ErrorEvent, EventDispatcher, EventHandler, LoggingHandler,
    LoginAttemptEvent, ReauthenticateEvent, SessionEvent,
};
