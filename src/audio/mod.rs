// Audio core
// Decodes narration PCM, encodes the WAV artifact, and plays through cpal

pub mod decoder;
pub mod output;
pub mod player;
pub mod sink;
pub mod wav;

pub use decoder::{decode_base64_pcm, PcmBuffer, NARRATION_SAMPLE_RATE};
pub use player::{PlaybackController, PlaybackState};
pub use sink::AudioSink;
