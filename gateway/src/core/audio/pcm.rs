use base64::DecodeError;
use base64::prelude::*;

use super::resample::downsample;

const PCM_TO_FLOAT_SCALE: f32 = 1.0 / 32768.0;

/// Convert float samples to signed 16-bit PCM.
///
/// Samples are clamped to `[-1, 1]`; negative values scale by 32768 and
/// positive values by 32767 so both ends of the integer range are reachable.
pub fn f32_to_pcm16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&sample| {
            let s = sample.clamp(-1.0, 1.0);
            if s < 0.0 {
                (s * 32768.0) as i16
            } else {
                (s * 32767.0) as i16
            }
        })
        .collect()
}

/// Serialize PCM samples as little-endian bytes.
pub fn pcm16_to_bytes(samples: &[i16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    bytes
}

/// Reinterpret little-endian 16-bit PCM bytes as float samples in `[-1, 1)`.
///
/// A trailing odd byte is ignored.
pub fn pcm16_bytes_to_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]) as f32 * PCM_TO_FLOAT_SCALE)
        .collect()
}

pub fn encode_base64(bytes: &[u8]) -> String {
    BASE64_STANDARD.encode(bytes)
}

pub fn decode_base64(data: &str) -> Result<Vec<u8>, DecodeError> {
    BASE64_STANDARD.decode(data)
}

/// Outbound path: resample a captured frame to `output_rate`, quantize to
/// PCM16 and base64-encode it for an `audio_chunk` message.
pub fn samples_to_wire(samples: &[f32], input_rate: u32, output_rate: u32) -> String {
    let resampled = downsample(samples, input_rate, output_rate);
    encode_base64(&pcm16_to_bytes(&f32_to_pcm16(&resampled)))
}

/// Inbound path: decode a base64 PCM16 payload into float samples.
pub fn wire_to_samples(data: &str) -> Result<Vec<f32>, DecodeError> {
    decode_base64(data).map(|bytes| pcm16_bytes_to_f32(&bytes))
}
