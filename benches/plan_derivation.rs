//! Benchmarks for probe parsing and encode planning
//!
//! Both run once per job, so they sit on the per-job critical path ahead of
//! the ffmpeg spawn.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::path::Path;
use tb_av::plan;
use tb_av::probe::parse_ffprobe_output;
use tb_core::config::EncodeLimits;
use tb_core::{HwCapabilities, MediaInfo};

/// ffprobe report for a 1080p clip with one audio track
const FFPROBE_SIMPLE: &str = r#"{
    "streams": [
        {
            "index": 0,
            "codec_type": "video",
            "codec_name": "h264",
            "width": 1920,
            "height": 1080,
            "avg_frame_rate": "30000/1001",
            "bit_rate": "4000000"
        },
        {
            "index": 1,
            "codec_type": "audio",
            "codec_name": "aac",
            "bit_rate": "128000"
        }
    ],
    "format": {
        "filename": "input.mp4",
        "duration": "92.480000",
        "bit_rate": "4150000"
    }
}"#;

/// ffprobe report with several video and audio streams
const FFPROBE_MULTI: &str = r#"{
    "streams": [
        {"index": 0, "codec_type": "video", "codec_name": "h264", "width": 3840, "height": 2160, "avg_frame_rate": "60/1", "bit_rate": "25000000"},
        {"index": 1, "codec_type": "video", "codec_name": "mjpeg", "width": 640, "height": 360, "avg_frame_rate": "0/0"},
        {"index": 2, "codec_type": "audio", "codec_name": "aac", "bit_rate": "256000"},
        {"index": 3, "codec_type": "audio", "codec_name": "ac3", "bit_rate": "448000"},
        {"index": 4, "codec_type": "audio", "codec_name": "aac", "bit_rate": "N/A"},
        {"index": 5, "codec_type": "subtitle", "codec_name": "mov_text"}
    ],
    "format": {"filename": "input.mp4", "duration": "3600.0"}
}"#;

fn media(width: u32, height: u32, duration: f64) -> MediaInfo {
    MediaInfo {
        width,
        height,
        video_codec: Some("h264".into()),
        audio_codec: Some("aac".into()),
        frame_rate: Some(30.0),
        video_bitrate: Some(4_000_000),
        audio_bitrate: Some(128_000),
        duration,
    }
}

fn bench_probe_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("probe_parsing");
    let path = Path::new("input.mp4");

    for (name, json) in [("simple", FFPROBE_SIMPLE), ("multi_stream", FFPROBE_MULTI)] {
        group.bench_with_input(BenchmarkId::from_parameter(name), json, |b, json| {
            b.iter(|| parse_ffprobe_output(black_box(path), black_box(json)))
        });
    }

    group.finish();
}

fn bench_planning(c: &mut Criterion) {
    let mut group = c.benchmark_group("plan");
    let limits = EncodeLimits::default();
    let hw = HwCapabilities::software();

    let cases = [
        ("landscape_short", media(1920, 1080, 30.0)),
        ("landscape_long", media(1920, 1080, 90.0)),
        ("square_small", media(384, 384, 10.0)),
        ("portrait_4k", media(2160, 3840, 45.0)),
    ];

    for (name, info) in &cases {
        group.bench_with_input(BenchmarkId::from_parameter(name), info, |b, info| {
            b.iter(|| plan(black_box(info), black_box(&limits), black_box(&hw)))
        });
    }

    group.finish();
}

fn bench_argument_rendering(c: &mut Criterion) {
    let limits = EncodeLimits::default();
    let nvidia = HwCapabilities {
        nvidia: true,
        apple_silicon: false,
    };
    let Ok(encode_plan) = plan(&media(1920, 1080, 90.0), &limits, &nvidia) else {
        panic!("plan derivation failed");
    };
    let input = Path::new("input.mp4");
    let output = Path::new("output/conversion_0.mp4");

    c.bench_function("ffmpeg_args", |b| {
        b.iter(|| black_box(&encode_plan).ffmpeg_args(black_box(input), black_box(output)))
    });
}

criterion_group!(
    benches,
    bench_probe_parsing,
    bench_planning,
    bench_argument_rendering
);
criterion_main!(benches);
