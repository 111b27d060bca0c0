//! Benchmarks for output interpretation hot paths

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use taskforge_providers::interpreter;

fn noisy_output(lines: usize) -> String {
    let mut out = String::new();
    for i in 0..lines {
        match i % 4 {
            0 => out.push_str("Loading...\n"),
            1 => out.push_str(&format!("[{}/{}] compiling\n", i, lines)),
            2 => out.push_str("45% complete\n"),
            _ => out.push_str(&format!("useful line {i}\n")),
        }
    }
    out
}

fn event_stream(lines: usize) -> String {
    let mut out = String::new();
    for i in 0..lines {
        out.push_str(&format!(
            "{{\"type\":\"text\",\"text\":\"fragment {i} \"}}\n"
        ));
    }
    out.push_str("{\"type\":\"step_finish\"}\n");
    out
}

fn bench_interpret(c: &mut Criterion) {
    let noisy = noisy_output(500);
    c.bench_function("strip_noise_500_lines", |b| {
        b.iter(|| interpreter::strip_noise(black_box(&noisy)))
    });

    let stream = event_stream(200);
    c.bench_function("parse_event_stream_200_events", |b| {
        b.iter(|| interpreter::parse_event_stream(black_box(&stream)))
    });

    c.bench_function("interpret_mixed_output", |b| {
        b.iter(|| interpreter::interpret(black_box(&noisy)))
    });
}

criterion_group!(benches, bench_interpret);
criterion_main!(benches);
