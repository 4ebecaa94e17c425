//! Performance benchmarks for Parlons Gateway
//!
//! Run with: cargo bench
//! Or for specific benchmarks: cargo bench -- <filter>

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use std::time::Duration;

use parlons_gateway::client::{FRAME_SIZE, FrameCapturer, PlaybackCursor};
use parlons_gateway::core::audio::{
    CAPTURE_WIRE_SAMPLE_RATE, decode_base64, downsample, encode_base64, f32_to_pcm16,
    pcm16_bytes_to_f32, pcm16_to_bytes, samples_to_wire, wire_to_samples,
};
use parlons_gateway::protocol::{ClientMessage, ServerMessage};

/// A 440 Hz tone, one capture frame long
fn tone(len: usize, rate: u32) -> Vec<f32> {
    (0..len)
        .map(|i| (i as f32 * 440.0 * std::f32::consts::TAU / rate as f32).sin() * 0.8)
        .collect()
}

/// Outbound path: native frame -> 16 kHz -> PCM16 -> base64
fn bench_capture_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("capture_encode");
    group.measurement_time(Duration::from_secs(5));

    for rate in [44_100u32, 48_000] {
        let frame = tone(FRAME_SIZE, rate);
        group.throughput(Throughput::Elements(frame.len() as u64));

        group.bench_with_input(BenchmarkId::new("downsample", rate), &frame, |b, frame| {
            b.iter(|| downsample(black_box(frame), rate, CAPTURE_WIRE_SAMPLE_RATE));
        });

        group.bench_with_input(
            BenchmarkId::new("samples_to_wire", rate),
            &frame,
            |b, frame| {
                b.iter(|| samples_to_wire(black_box(frame), rate, CAPTURE_WIRE_SAMPLE_RATE));
            },
        );
    }

    let frame = tone(FRAME_SIZE, 48_000);
    group.bench_function("f32_to_pcm16", |b| {
        b.iter(|| f32_to_pcm16(black_box(&frame)));
    });

    group.finish();
}

/// Inbound path: base64 -> PCM16 -> f32
fn bench_playback_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("playback_decode");
    group.measurement_time(Duration::from_secs(5));

    // 40 ms, 200 ms and 1 s of 24 kHz model speech
    for samples in [960usize, 4_800, 24_000] {
        let pcm = pcm16_to_bytes(&f32_to_pcm16(&tone(samples, 24_000)));
        let data = encode_base64(&pcm);
        group.throughput(Throughput::Bytes(pcm.len() as u64));

        group.bench_with_input(BenchmarkId::new("decode_base64", samples), &data, |b, d| {
            b.iter(|| decode_base64(black_box(d)));
        });

        group.bench_with_input(BenchmarkId::new("pcm16_to_f32", samples), &pcm, |b, p| {
            b.iter(|| pcm16_bytes_to_f32(black_box(p)));
        });

        group.bench_with_input(BenchmarkId::new("wire_to_samples", samples), &data, |b, d| {
            b.iter(|| wire_to_samples(black_box(d)));
        });
    }

    group.finish();
}

fn bench_frame_capture(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_capture");
    group.measurement_time(Duration::from_secs(5));

    // Device callbacks usually deliver 128-sample render quanta
    let quantum = tone(128, 48_000);
    group.throughput(Throughput::Elements(quantum.len() as u64));
    group.bench_function("process_128", |b| {
        let mut capturer = FrameCapturer::new(FRAME_SIZE);
        capturer.start();
        b.iter(|| capturer.process(black_box(&quantum)));
    });

    group.bench_function("cursor_schedule", |b| {
        let mut cursor = PlaybackCursor::new();
        let mut now = 0.0;
        b.iter(|| {
            now += 0.01;
            cursor.schedule(black_box(now), 0.2)
        });
    });

    group.finish();
}

fn bench_protocol(c: &mut Criterion) {
    let mut group = c.benchmark_group("protocol");
    group.measurement_time(Duration::from_secs(5));

    let chunk = serde_json::to_string(&ClientMessage::AudioChunk {
        mime_type: "audio/pcm;rate=16000".to_string(),
        data: samples_to_wire(&tone(FRAME_SIZE, 48_000), 48_000, CAPTURE_WIRE_SAMPLE_RATE),
    })
    .unwrap_or_default();
    let setup = r#"{"type":"setup","voice":"Kore","systemInstruction":"Tu es un tuteur de français."}"#;
    let model_audio = serde_json::to_string(&ServerMessage::ModelAudio {
        mime_type: "audio/pcm;rate=24000".to_string(),
        data: encode_base64(&pcm16_to_bytes(&f32_to_pcm16(&tone(4_800, 24_000)))),
    })
    .unwrap_or_default();

    group.throughput(Throughput::Bytes(chunk.len() as u64));
    group.bench_function("parse_audio_chunk", |b| {
        b.iter(|| ClientMessage::parse(black_box(&chunk)));
    });

    group.throughput(Throughput::Bytes(setup.len() as u64));
    group.bench_function("parse_setup", |b| {
        b.iter(|| ClientMessage::parse(black_box(setup)));
    });

    group.throughput(Throughput::Bytes(model_audio.len() as u64));
    group.bench_function("parse_model_audio", |b| {
        b.iter(|| ServerMessage::parse(black_box(&model_audio)));
    });

    let message = ServerMessage::ModelText {
        text: "Très bien ! On continue ?".to_string(),
    };
    group.bench_function("serialize_model_text", |b| {
        b.iter(|| serde_json::to_string(black_box(&message)));
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_capture_encode,
    bench_playback_decode,
    bench_frame_capture,
    bench_protocol,
);
criterion_main!(benches);
