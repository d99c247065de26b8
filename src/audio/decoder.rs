// PCM decoder for synthesized narration payloads
// Decodes base64-encoded little-endian 16-bit PCM to normalized f32 samples

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::error::DecodeError;

/// Sample rate of every narration payload emitted by the synthesis service.
/// This is a fixed system constant, not negotiated.
pub const NARRATION_SAMPLE_RATE: u32 = 24000;

/// A decoded narration waveform: mono, normalized samples in [-1.0, 1.0].
///
/// Created once per successful decode and immutable afterwards. The playback
/// session and the WAV encoder both read from the same buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct PcmBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl PcmBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self { samples, sample_rate }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Narration audio is always single-channel.
    pub fn channels(&self) -> u16 {
        1
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration in seconds: sample count over sample rate.
    pub fn duration(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Decode a base64 narration payload into a normalized sample buffer.
///
/// The wire format is fixed: little-endian signed 16-bit PCM, mono, 24 kHz.
/// Each output sample is `i16 / 32768`, so the result lies in [-1.0, 1.0].
pub fn decode_base64_pcm(payload: &str) -> Result<PcmBuffer, DecodeError> {
    if payload.is_empty() {
        return Err(DecodeError::Empty);
    }

    let bytes = BASE64.decode(payload)?;

    if bytes.len() % 2 != 0 {
        return Err(DecodeError::OddLength(bytes.len()));
    }

    let mut samples = Vec::with_capacity(bytes.len() / 2);
    for chunk in bytes.chunks_exact(2) {
        let value = i16::from_le_bytes([chunk[0], chunk[1]]);
        samples.push(value as f32 / 32768.0);
    }

    Ok(PcmBuffer::new(samples, NARRATION_SAMPLE_RATE))
}
