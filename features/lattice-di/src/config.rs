use std::{env, time::Duration};

/// Bootstrap behaviour of [`crate::ApplicationBuilder`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationConfig {
    /// Abort the process when bootstrapping fails instead of returning the error
    pub abort_on_error: bool,
    /// Give up creating the static instances after this long
    pub init_timeout: Option<Duration>,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        ApplicationConfig {
            abort_on_error: true,
            init_timeout: None,
        }
    }
}

impl ApplicationConfig {
    pub const ABORT_ON_ERROR_VAR: &'static str = "LATTICE_ABORT_ON_ERROR";
    pub const INIT_TIMEOUT_VAR: &'static str = "LATTICE_INIT_TIMEOUT_MS";

    /// Defaults overridden by `LATTICE_ABORT_ON_ERROR` and `LATTICE_INIT_TIMEOUT_MS`
    ///
    /// Unparsable values are ignored with a warning.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = ApplicationConfig::default();

        if let Some(value) = lookup(Self::ABORT_ON_ERROR_VAR) {
            match value.trim().parse::<bool>() {
                Ok(abort_on_error) => config.abort_on_error = abort_on_error,
                Err(_) => tracing::warn!("Ignoring {}={value}, expected true or false", Self::ABORT_ON_ERROR_VAR),
            }
        }

        if let Some(value) = lookup(Self::INIT_TIMEOUT_VAR) {
            match value.trim().parse::<u64>() {
                Ok(millis) => config.init_timeout = Some(Duration::from_millis(millis)),
                Err(_) => tracing::warn!("Ignoring {}={value}, expected milliseconds", Self::INIT_TIMEOUT_VAR),
            }
        }

        config
    }

    pub fn abort_on_error(mut self, abort_on_error: bool) -> Self {
        self.abort_on_error = abort_on_error;
        self
    }

    pub fn init_timeout(mut self, timeout: Duration) -> Self {
        self.init_timeout = Some(timeout);
        self
    }
}
