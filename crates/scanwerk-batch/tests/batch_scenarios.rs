// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// End-to-end scenarios: captures in, outcomes and an assembled PDF out.

use std::sync::Mutex;

use lopdf::{Document, Object};
use scanwerk_batch::{BatchOrchestrator, NoProgress};
use scanwerk_core::{
    BatchJob, DetectionStrategy, ErrorKind, PageLayout, PageOutcome, PageStatus, ScanConfig,
    SourceImage,
};
use scanwerk_imaging::perspective::Homography;
use scanwerk_imaging::{DocumentAssembler, PixelBuffer, warp};

/// A dark desk with a white page.
fn capture(w: u32, h: u32, page: (u32, u32, u32, u32)) -> SourceImage {
    let (x0, y0, x1, y1) = page;
    let mut buf = PixelBuffer::from_pixel(w, h, [12, 12, 12, 255]);
    for y in y0..y1 {
        for x in x0..x1 {
            buf.put_pixel(x, y, [250, 250, 250, 255]);
        }
    }
    SourceImage::new(buf.to_png_bytes().expect("png"), "image/png")
}

fn small_capture(width: u32) -> SourceImage {
    capture(width, 60, (width / 5, 10, width - width / 5, 50))
}

fn orchestrator(batch_size: usize) -> BatchOrchestrator {
    let config = ScanConfig {
        batch_size,
        worker_threads: Some(4),
        ..ScanConfig::default()
    };
    BatchOrchestrator::new(config).expect("orchestrator")
}

#[test]
fn synthetic_page_is_found_and_rectified() {
    let (src_w, src_h) = (800u32, 1000u32);
    let job = BatchJob::from_sources([capture(src_w, src_h, (100, 250, 700, 750))], 5);
    let report = orchestrator(5).process(job, &NoProgress);

    let page = report.outcomes[0].as_processed().expect("processed");
    assert_eq!(page.meta.status, PageStatus::Processed);
    assert_eq!(page.strategy, Some(DetectionStrategy::ContourBased));
    assert!(page.corrected);

    let quad = page.quad.expect("quad");
    let ratio = quad.area() / (src_w as f64 * src_h as f64);
    assert!((0.1..=0.95).contains(&ratio), "area ratio {ratio}");

    let within = |got: u32, want: f64| ((got as f64) - want).abs() / want <= 0.10;
    assert!(within(page.width, 600.0), "width {}", page.width);
    assert!(within(page.height, 500.0), "height {}", page.height);
    assert_eq!(page.output_size, page.output.len());
}

#[test]
fn thirteen_pages_in_groups_of_five_report_three_times() {
    let job = BatchJob::from_sources((0..13).map(|_| small_capture(80)), 5);
    let seen = Mutex::new(Vec::new());
    let report = orchestrator(5).process(job, &|done: usize, total: usize| {
        seen.lock().expect("lock").push((done, total));
    });

    assert_eq!(report.total(), 13);
    assert_eq!(
        seen.into_inner().expect("lock"),
        vec![(5, 13), (10, 13), (13, 13)]
    );
}

#[test]
fn every_page_reaches_a_terminal_state() {
    for batch_size in [1usize, 3, 5] {
        for n in [0usize, 1, 4, 7] {
            let sources = (0..n).map(|i| {
                if i % 3 == 2 {
                    SourceImage::new(vec![0x00, 0x01, 0x02], "image/jpeg")
                } else {
                    small_capture(80 + i as u32 * 10)
                }
            });
            let job = BatchJob::from_sources(sources, batch_size);
            let report = orchestrator(batch_size).process(job, &NoProgress);

            assert_eq!(report.total(), n, "n={n} b={batch_size}");
            for (i, outcome) in report.outcomes.iter().enumerate() {
                assert_eq!(outcome.index(), i);
                assert!(outcome.status().is_terminal());
                if let PageOutcome::Failed(failed) = outcome {
                    assert_eq!(failed.kind, ErrorKind::DecodeFailure);
                    assert!(failed.meta.error.is_some());
                }
            }
            assert_eq!(report.failed_count(), n / 3);
        }
    }
}

#[test]
fn assembled_pages_follow_capture_order() {
    let widths = [90u32, 150, 210];
    let job = BatchJob::from_sources(widths.iter().map(|w| small_capture(*w)), 2);
    let report = orchestrator(2).process(job, &NoProgress);
    assert_eq!(report.processed_count(), 3);

    let output_widths: Vec<u32> = report.processed_pages().map(|p| p.width).collect();
    let document = DocumentAssembler::new("Ordered", PageLayout::ImageSized { dpi: 72.0 })
        .assemble_outcomes(&report.outcomes)
        .expect("assemble");
    assert_eq!(document.page_count, 3);

    let parsed = Document::load_mem(&document.bytes).expect("parse");
    let media_widths: Vec<f64> = parsed
        .get_pages()
        .values()
        .map(|id| {
            let dict = parsed.get_dictionary(*id).expect("page");
            let media_box = dict.get(b"MediaBox").and_then(Object::as_array).expect("media box");
            match &media_box[2] {
                Object::Integer(v) => *v as f64,
                Object::Real(v) => *v as f64,
                other => panic!("unexpected {:?}", other),
            }
        })
        .collect();

    // At 72 dpi a page is as many points wide as the image is pixels.
    for (media, px) in media_widths.iter().zip(&output_widths) {
        assert!((media - *px as f64).abs() < 1.0, "{media_widths:?} vs {output_widths:?}");
    }
    assert!(output_widths.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn zero_middle_row_homography_is_refused() {
    let buf = PixelBuffer::from_pixel(16, 16, [1, 2, 3, 255]);
    let h = Homography::from_rows([1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0]);
    assert!(warp(&buf, &h, 16, 16).is_err());
}
