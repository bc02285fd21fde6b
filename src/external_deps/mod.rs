//! Integrations that rely on capabilities outside this crate.
//!
//! Today that is the captcha solver, whose recognition model is provided by
//! the caller.

pub mod captcha;

pub use captcha::{CaptchaSolver, LazyCaptchaSolver, SolverLoader, SolverSettings};
