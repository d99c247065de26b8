// Error taxonomy for the narration audio engine
use thiserror::Error;

/// Failure while turning a base64 narration payload into samples.
///
/// Fatal to the current audio session; the payload will not become valid
/// by retrying.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("narration payload is empty")]
    Empty,

    #[error("narration payload is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("narration payload has {0} bytes, not a whole number of 16-bit samples")]
    OddLength(usize),
}

/// Failure while building the WAV download artifact.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("cannot encode an empty sample buffer")]
    EmptyBuffer,
}

/// Failure in the audio output device layer.
///
/// Non-fatal to the rest of the application: playback is disabled but the
/// decoded script and the download artifact stay usable.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("no audio output device available")]
    NoDevice,

    #[error("failed to query output config: {0}")]
    Config(String),

    #[error("unsupported output sample format: {0}")]
    UnsupportedFormat(String),

    #[error("failed to build output stream: {0}")]
    Stream(String),

    #[error("failed to start output stream: {0}")]
    Start(String),

    #[error("sample rate conversion failed: {0}")]
    Resample(String),
}

/// Umbrella error for the engine surface.
#[derive(Debug, Error)]
pub enum AudioError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Device(#[from] DeviceError),
}
