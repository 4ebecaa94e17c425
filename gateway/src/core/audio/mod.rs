//! Raw PCM audio helpers shared by the relay and the client bridge.
//!
//! The wire format between client and relay is base64-encoded, signed
//! 16-bit little-endian mono PCM. Microphone audio travels at
//! [`CAPTURE_WIRE_SAMPLE_RATE`], model speech comes back at
//! [`PLAYBACK_SAMPLE_RATE`]. The two rates are independent.

mod pcm;
mod resample;

pub use pcm::{
    decode_base64, encode_base64, f32_to_pcm16, pcm16_bytes_to_f32, pcm16_to_bytes,
    samples_to_wire, wire_to_samples,
};
pub use resample::downsample;

/// Sample rate the upstream model expects for microphone input.
pub const CAPTURE_WIRE_SAMPLE_RATE: u32 = 16_000;

/// Sample rate of synthesized model speech.
pub const PLAYBACK_SAMPLE_RATE: u32 = 24_000;

/// MIME descriptor for raw PCM at the given sample rate, e.g. `audio/pcm;rate=16000`.
pub fn pcm_mime_type(sample_rate: u32) -> String {
    format!("audio/pcm;rate={sample_rate}")
}

/// Extract the `rate` parameter from a PCM MIME descriptor.
///
/// Returns `None` when the descriptor is not `audio/pcm` or carries no
/// parseable rate.
pub fn parse_pcm_rate(mime_type: &str) -> Option<u32> {
    let mut parts = mime_type.split(';').map(str::trim);
    let essence = parts.next()?;
    if !essence.eq_ignore_ascii_case("audio/pcm") {
        return None;
    }
    parts
        .filter_map(|param| param.split_once('='))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("rate"))
        .and_then(|(_, value)| value.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pcm_mime_type() {
        assert_eq!(pcm_mime_type(CAPTURE_WIRE_SAMPLE_RATE), "audio/pcm;rate=16000");
        assert_eq!(pcm_mime_type(PLAYBACK_SAMPLE_RATE), "audio/pcm;rate=24000");
    }

    #[test]
    fn test_parse_pcm_rate() {
        assert_eq!(parse_pcm_rate("audio/pcm;rate=24000"), Some(24000));
        assert_eq!(parse_pcm_rate("audio/PCM; rate=16000"), Some(16000));
        assert_eq!(parse_pcm_rate("audio/pcm"), None);
        assert_eq!(parse_pcm_rate("audio/wav;rate=16000"), None);
        assert_eq!(parse_pcm_rate("audio/pcm;rate=abc"), None);
    }
}
