/// Resample `samples` from `input_rate` to `output_rate` by nearest-index decimation.
///
/// Output length is `round(len / (input_rate / output_rate))`. Output sample
/// `i` is the input sample at `round(i * input_rate / output_rate)`, or
/// silence when that index falls past the end of the input. Equal rates
/// return the input unchanged.
pub fn downsample(samples: &[f32], input_rate: u32, output_rate: u32) -> Vec<f32> {
    if input_rate == output_rate {
        return samples.to_vec();
    }
    if input_rate == 0 || output_rate == 0 {
        return Vec::new();
    }

    let ratio = input_rate as f64 / output_rate as f64;
    let output_len = (samples.len() as f64 / ratio).round() as usize;

    (0..output_len)
        .map(|i| {
            let source = (i as f64 * ratio).round() as usize;
            samples.get(source).copied().unwrap_or(0.0)
        })
        .collect()
}
