use criterion::{black_box, criterion_group, criterion_main, Criterion};
use skyinfer::sse::SseDecoder;

fn bench_frame_decoding(c: &mut Criterion) {
    let mut lines = Vec::with_capacity(2_000);
    for i in 0..1_000 {
        lines.push(format!(
            "data: {{\"status\": 200, \"output_data\": {{\"token\": {i}}}}}"
        ));
        lines.push(String::new());
    }

    c.bench_function("decode_1000_frames", |b| {
        b.iter(|| {
            let mut decoder = SseDecoder::new();
            let mut frames = 0usize;
            for line in &lines {
                if decoder.decode_line(line).is_some() {
                    frames += 1;
                }
            }
            black_box(frames)
        })
    });

    c.bench_function("decode_and_parse_json", |b| {
        b.iter(|| {
            let mut decoder = SseDecoder::new();
            let mut statuses = 0u64;
            for line in &lines {
                if let Some(record) = decoder.decode_line(line) {
                    if let Ok(body) = record.json() {
                        statuses += body["status"].as_u64().unwrap_or(0);
                    }
                }
            }
            black_box(statuses)
        })
    });
}

criterion_group!(benches, bench_frame_decoding);
criterion_main!(benches);
