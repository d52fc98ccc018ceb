//! Error types for the output device layer

use thiserror::Error;

/// Failures reported by an output backend
#[derive(Debug, Error)]
pub enum DeviceError {
    /// The backend could not be created (driver missing, no permission, ...)
    #[error("{backend} backend unavailable: {reason}")]
    Unavailable {
        backend: &'static str,
        reason: String,
    },

    /// A write to an already created device failed
    #[error("{backend} write failed: {source}")]
    Write {
        backend: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// The device handle is gone (unplugged, driver restarted)
    #[error("{0} device handle lost")]
    HandleLost(&'static str),
}

impl DeviceError {
    pub fn unavailable(backend: &'static str, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            backend,
            reason: reason.into(),
        }
    }

    pub fn write(backend: &'static str, source: std::io::Error) -> Self {
        Self::Write { backend, source }
    }
}
