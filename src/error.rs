use thiserror::Error;

/// Failures that can occur while building the audio pipeline.
///
/// Once constructed, the pipeline itself is infallible: `update()` and the
/// ring buffer operations always succeed, and callback-side anomalies are
/// counted in [`crate::capture::AudioStats`] rather than reported.
#[derive(Error, Debug)]
pub enum Error {
    /// A configuration value was rejected, e.g. a non-power-of-two FFT size.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// No usable audio input device.
    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),

    /// A collaborator failed to allocate or open a resource.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),
}

pub type Result<T> = std::result::Result<T, Error>;
