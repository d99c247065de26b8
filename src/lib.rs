// Papervoice - audio engine for document narration
// Module declarations
pub mod audio;
pub mod download;
pub mod engine;
pub mod error;
pub mod settings;

pub use audio::{decode_base64_pcm, AudioSink, PcmBuffer, PlaybackState, NARRATION_SAMPLE_RATE};
pub use download::DownloadArtifact;
pub use engine::AudioEngine;
pub use error::{AudioError, DecodeError, DeviceError, EncodeError};
pub use settings::EngineSettings;
