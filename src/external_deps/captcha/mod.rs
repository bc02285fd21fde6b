//! Captcha solver integrations.
//!
//! The portal occasionally demands an image verification code during login.
//! Recognition is delegated to a [`CaptchaSolver`]; model-backed solvers are
//! only constructed the first time a challenge actually shows up.
//!
//! No inference runtime ships with the crate. Model settings are turned into
//! a solver by a caller-provided [`SolverLoader`].

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::OnceCell;
use serde::Deserialize;
use thiserror::Error;

/// Shared interface implemented by verification-code solvers.
#[async_trait]
pub trait CaptchaSolver: Send + Sync {
    fn name(&self) -> &'static str;
    async fn solve(&self, image: &[u8]) -> Result<String, CaptchaError>;
}

/// Errors surfaced by captcha solvers.
#[derive(Debug, Error)]
pub enum CaptchaError {
    #[error("captcha solver misconfigured: {0}")]
    Configuration(String),
    #[error("captcha solver failed: {0}")]
    Solver(String),
    #[error("captcha error: {0}")]
    Other(String),
}

/// Inference runtime used for the captcha model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SolverRuntime {
    #[default]
    Onnx,
    Keras,
}

fn default_devices() -> Vec<String> {
    vec!["CPUExecutionProvider".to_string()]
}

/// Where the captcha model lives and how to run it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SolverSettings {
    pub model_path: PathBuf,
    #[serde(default)]
    pub runtime: SolverRuntime,
    #[serde(default = "default_devices")]
    pub device: Vec<String>,
}

impl SolverSettings {
    pub fn new(model_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            runtime: SolverRuntime::default(),
            device: default_devices(),
        }
    }

    pub fn with_runtime(mut self, runtime: SolverRuntime) -> Self {
        self.runtime = runtime;
        self
    }

    pub fn with_device<I, S>(mut self, device: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.device = device.into_iter().map(Into::into).collect();
        self
    }
}

/// Builds a solver from its settings. Called at most once per successful load.
pub trait SolverLoader: Send + Sync {
    fn load(&self, settings: &SolverSettings) -> Result<Arc<dyn CaptchaSolver>, CaptchaError>;
}

/// Loader used when model settings come without a loader. It validates the
/// model file and then reports that no runtime is available to run it.
#[derive(Debug, Default)]
pub struct ModelFileLoader;

impl SolverLoader for ModelFileLoader {
    fn load(&self, settings: &SolverSettings) -> Result<Arc<dyn CaptchaSolver>, CaptchaError> {
        if !settings.model_path.is_file() {
            return Err(CaptchaError::Configuration(format!(
                "model file {} not found",
                settings.model_path.display()
            )));
        }

        Err(CaptchaError::Configuration(format!(
            "no {:?} inference runtime bundled for {}; register a SolverLoader",
            settings.runtime,
            settings.model_path.display()
        )))
    }
}

enum SolverSource {
    Disabled,
    Ready(Arc<dyn CaptchaSolver>),
    Deferred {
        settings: SolverSettings,
        loader: Arc<dyn SolverLoader>,
        solver: OnceCell<Arc<dyn CaptchaSolver>>,
    },
}

/// Optional solver capability, resolved on first use.
pub struct LazyCaptchaSolver {
    source: SolverSource,
}

impl LazyCaptchaSolver {
    /// No model configured: challenges cannot be answered.
    pub fn disabled() -> Self {
        Self {
            source: SolverSource::Disabled,
        }
    }

    pub fn ready(solver: Arc<dyn CaptchaSolver>) -> Self {
        Self {
            source: SolverSource::Ready(solver),
        }
    }

    pub fn deferred(settings: SolverSettings, loader: Arc<dyn SolverLoader>) -> Self {
        Self {
            source: SolverSource::Deferred {
                settings,
                loader,
                solver: OnceCell::new(),
            },
        }
    }

    pub fn is_configured(&self) -> bool {
        !matches!(self.source, SolverSource::Disabled)
    }

    /// Whether a deferred solver has been constructed yet.
    pub fn is_loaded(&self) -> bool {
        match &self.source {
            SolverSource::Disabled => false,
            SolverSource::Ready(_) => true,
            SolverSource::Deferred { solver, .. } => solver.get().is_some(),
        }
    }

    /// Returns the solver, loading it if needed. `Ok(None)` means disabled.
    pub fn resolve(&self) -> Result<Option<Arc<dyn CaptchaSolver>>, CaptchaError> {
        match &self.source {
            SolverSource::Disabled => Ok(None),
            SolverSource::Ready(solver) => Ok(Some(solver.clone())),
            SolverSource::Deferred {
                settings,
                loader,
                solver,
            } => solver
                .get_or_try_init(|| {
                    log::debug!(
                        "loading {:?} captcha model from {}",
                        settings.runtime,
                        settings.model_path.display()
                    );
                    loader.load(settings)
                })
                .map(|solver| Some(solver.clone())),
        }
    }
}

impl fmt::Debug for LazyCaptchaSolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.source {
            SolverSource::Disabled => "disabled",
            SolverSource::Ready(_) => "ready",
            SolverSource::Deferred { solver, .. } if solver.get().is_some() => "loaded",
            SolverSource::Deferred { .. } => "deferred",
        };
        f.debug_struct("LazyCaptchaSolver").field("state", &state).finish()
    }
}
