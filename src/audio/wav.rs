// WAV container encoder for the download artifact
// Produces a byte-exact RIFF/WAVE blob: 44-byte header + 16-bit PCM data

use crate::audio::decoder::PcmBuffer;
use crate::error::EncodeError;

const HEADER_LEN: usize = 44;
const BITS_PER_SAMPLE: u16 = 16;
const NUM_CHANNELS: u16 = 1;

/// Encode a narration buffer as a mono 16-bit PCM WAV file in memory.
///
/// The layout is fixed: `RIFF` chunk, `fmt ` subchunk of size 16 (PCM,
/// 1 channel, the buffer's sample rate), then a `data` subchunk holding each
/// sample re-quantized as `round(clamp(s, -1, 1) * 32767)` little-endian.
/// Identical input always yields byte-identical output.
pub fn encode_wav(buffer: &PcmBuffer) -> Result<Vec<u8>, EncodeError> {
    if buffer.is_empty() {
        return Err(EncodeError::EmptyBuffer);
    }

    let sample_rate = buffer.sample_rate();
    let block_align = NUM_CHANNELS * BITS_PER_SAMPLE / 8;
    let byte_rate = sample_rate * u32::from(block_align);
    let data_size = (buffer.len() * 2) as u32;
    let file_size = 36 + data_size;

    let mut out = Vec::with_capacity(HEADER_LEN + buffer.len() * 2);

    // RIFF header
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&file_size.to_le_bytes());
    out.extend_from_slice(b"WAVE");

    // fmt sub-chunk
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes()); // PCM format
    out.extend_from_slice(&NUM_CHANNELS.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&BITS_PER_SAMPLE.to_le_bytes());

    // data sub-chunk
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_size.to_le_bytes());
    for &s in buffer.samples() {
        out.extend_from_slice(&quantize(s).to_le_bytes());
    }

    Ok(out)
}

/// Re-quantize a normalized sample to 16-bit PCM.
fn quantize(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * 32767.0).round() as i16
}
