// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Criterion benchmarks for boundary detection and perspective correction on a
// synthetic capture.

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use scanwerk_core::{DetectionConfig, DetectionStrategy};
use scanwerk_imaging::{BoundaryDetector, PixelBuffer, detect_boundary, rectify};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// 800x1000 dark desk with a white page from (100, 250) to (700, 750).
fn capture() -> PixelBuffer {
    let mut buf = PixelBuffer::from_pixel(800, 1000, [25, 25, 25, 255]);
    for y in 250..750 {
        for x in 100..700 {
            buf.put_pixel(x, y, [245, 245, 245, 255]);
        }
    }
    buf
}

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

fn bench_detection(c: &mut Criterion) {
    let buf = capture();
    let config = DetectionConfig::default();

    c.bench_function("detect_boundary chain (800x1000)", |b| {
        b.iter(|| black_box(detect_boundary(black_box(&buf), &config).ok()));
    });

    let hough = BoundaryDetector::new(DetectionStrategy::HoughBased, config.clone());
    c.bench_function("hough only (800x1000)", |b| {
        b.iter(|| black_box(hough.detect(black_box(&buf)).ok()));
    });
}

fn bench_rectify(c: &mut Criterion) {
    let buf = capture();
    let quad = match detect_boundary(&buf, &DetectionConfig::default()) {
        Ok(detection) => detection.quad,
        Err(_) => scanwerk_core::Quad::full_frame(buf.width(), buf.height()),
    };

    c.bench_function("rectify (600x500 region)", |b| {
        b.iter(|| black_box(rectify(black_box(&buf), &quad).ok()));
    });
}

criterion_group!(benches, bench_detection, bench_rectify);
criterion_main!(benches);
