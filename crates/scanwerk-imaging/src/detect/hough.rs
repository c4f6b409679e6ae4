// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Hough strategy: dominant straight lines, classified as horizontal or
// vertical, intersected into four corners.
//
// A line is stored in normal form `x * cos(theta) + y * sin(theta) = rho`
// with theta in whole degrees [0, 180).

use scanwerk_core::error::{Result, ScanError};
use scanwerk_core::{DetectionConfig, Point, Quad};
use tracing::{debug, warn};

use crate::edges::EdgeMap;

const THETA_BUCKETS: usize = 180;
/// Upper bound on extraction rounds for one edge map.
const MAX_ROUNDS: usize = 32;
/// Pixels within this distance of a peak cell refine its rho.
const REFINE_BAND: f64 = 2.5;

/// One accumulator peak.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolarLine {
    /// Signed distance from the origin, in pixels.
    pub rho: f64,
    /// Normal angle in degrees, 0..180.
    pub theta_deg: usize,
    /// Votes in the 3 x 3 window around the peak cell.
    pub votes: u32,
}

impl PolarLine {
    /// Direction of the line itself (normal + 90), in degrees 0..180.
    pub fn direction_deg(&self) -> f64 {
        ((self.theta_deg + 90) % 180) as f64
    }

    /// Signed distance of a point from the line along its normal.
    fn offset(&self, (x, y): (f64, f64)) -> f64 {
        let t = (self.theta_deg as f64).to_radians();
        x * t.cos() + y * t.sin() - self.rho
    }
}

/// Theta x rho vote counts. Row `t` holds the rho bins for `t` degrees.
struct Accumulator {
    votes: Vec<u32>,
    rho_bins: usize,
    diagonal: f64,
    trig: Vec<(f64, f64)>,
}

impl Accumulator {
    fn new(width: usize, height: usize) -> Self {
        let diagonal = ((width * width + height * height) as f64).sqrt().ceil();
        let rho_bins = 2 * diagonal as usize + 1;
        let trig = (0..THETA_BUCKETS)
            .map(|t| {
                let r = (t as f64).to_radians();
                (r.cos(), r.sin())
            })
            .collect();
        Self {
            votes: vec![0; THETA_BUCKETS * rho_bins],
            rho_bins,
            diagonal,
            trig,
        }
    }

    fn cell(&self, t: usize, (x, y): (f64, f64)) -> usize {
        let (cos, sin) = self.trig[t];
        let bin = (x * cos + y * sin + self.diagonal).round() as usize;
        t * self.rho_bins + bin
    }

    fn add(&mut self, pixel: (f64, f64)) {
        for t in 0..THETA_BUCKETS {
            let i = self.cell(t, pixel);
            self.votes[i] += 1;
        }
    }

    fn remove(&mut self, pixel: (f64, f64)) {
        for t in 0..THETA_BUCKETS {
            let i = self.cell(t, pixel);
            self.votes[i] = self.votes[i].saturating_sub(1);
        }
    }

    /// Cell index one theta step away. Crossing 0/180 degrees mirrors rho.
    fn theta_neighbour(&self, index: usize, up: bool) -> usize {
        let n = self.rho_bins;
        let (t, b) = (index / n, index % n);
        match (t, up) {
            (0, false) => (THETA_BUCKETS - 1) * n + (n - 1 - b),
            (t, true) if t == THETA_BUCKETS - 1 => n - 1 - b,
            (t, true) => (t + 1) * n + b,
            (t, false) => (t - 1) * n + b,
        }
    }

    /// The (theta ±1, rho ±1) cells around `index`, centre first.
    fn window(&self, index: usize) -> Vec<usize> {
        let n = self.rho_bins;
        let bases = [
            index,
            self.theta_neighbour(index, false),
            self.theta_neighbour(index, true),
        ];
        let mut cells = Vec::with_capacity(9);
        for base in bases {
            let b = base % n;
            cells.push(base);
            if b > 0 {
                cells.push(base - 1);
            }
            if b + 1 < n {
                cells.push(base + 1);
            }
        }
        cells
    }

    /// Cell with the highest window sum, ties broken by its own count.
    fn strongest_window(&self) -> Option<(usize, u32)> {
        let n = self.rho_bins;
        let mut rows = vec![0u32; self.votes.len()];
        for (row_votes, row_sums) in self.votes.chunks(n).zip(rows.chunks_mut(n)) {
            for (b, sum) in row_sums.iter_mut().enumerate() {
                let lo = b.saturating_sub(1);
                let hi = (b + 1).min(n - 1);
                *sum = row_votes[lo..=hi].iter().sum();
            }
        }

        let mut best: Option<(usize, u32, u32)> = None;
        for (i, &row) in rows.iter().enumerate() {
            let score = row + rows[self.theta_neighbour(i, false)] + rows[self.theta_neighbour(i, true)];
            let raw = self.votes[i];
            if best.is_none_or(|(_, s, r)| (score, raw) > (s, r)) {
                best = Some((i, score, raw));
            }
        }
        best.map(|(i, score, _)| (i, score))
    }
}

/// Extract lines from the strong pixels, strongest first.
///
/// Each round takes the accumulator cell with the highest windowed vote sum,
/// so a line whose angle falls between buckets still clears the threshold.
/// The line is fitted to the pixels near that cell, and every pixel within
/// the suppression radius of it is withdrawn from the accumulator before the
/// next round.
pub fn detect_lines(edges: &EdgeMap, config: &DetectionConfig) -> Vec<PolarLine> {
    let (w, h) = (edges.width, edges.height);
    let mut acc = Accumulator::new(w, h);
    let mut pixels: Vec<(f64, f64)> = edges.strong_pixels().map(|(x, y)| (x as f64, y as f64)).collect();
    for &pixel in &pixels {
        acc.add(pixel);
    }

    let threshold = (config.hough_vote_ratio * w.min(h) as f64).max(1.0) as u32;
    let radius = (config.hough_suppression_radius as f64).max(REFINE_BAND);
    let mut peaks: Vec<PolarLine> = Vec::new();

    for _ in 0..MAX_ROUNDS {
        let Some((centre, score)) = acc.strongest_window() else {
            break;
        };
        if score < threshold {
            break;
        }

        let peak = acc
            .window(centre)
            .into_iter()
            .fold(centre, |best, cell| if acc.votes[cell] > acc.votes[best] { cell } else { best });
        let cell_line = PolarLine {
            rho: (peak % acc.rho_bins) as f64 - acc.diagonal,
            theta_deg: peak / acc.rho_bins,
            votes: score,
        };
        let support: Vec<f64> = pixels
            .iter()
            .map(|&p| cell_line.offset(p))
            .filter(|offset| offset.abs() <= REFINE_BAND)
            .collect();
        let line = if support.is_empty() {
            cell_line
        } else {
            PolarLine {
                rho: cell_line.rho + support.iter().sum::<f64>() / support.len() as f64,
                ..cell_line
            }
        };

        let before = pixels.len();
        pixels.retain(|&p| {
            let keep = line.offset(p).abs() > radius;
            if !keep {
                acc.remove(p);
            }
            keep
        });
        if pixels.len() == before {
            break;
        }

        if !peaks.iter().any(|p| near(p, &line, radius)) {
            peaks.push(line);
        }
    }

    debug!(threshold, peaks = peaks.len(), remaining = pixels.len(), "Hough lines extracted");
    peaks
}

/// Whether two peaks fall in each other's suppression window. Theta wraps
/// at 180 degrees, where rho changes sign.
fn near(a: &PolarLine, b: &PolarLine, radius: f64) -> bool {
    let dt = (a.theta_deg as f64 - b.theta_deg as f64).abs();
    let direct = dt <= radius && (a.rho - b.rho).abs() <= radius;
    let wrapped = THETA_BUCKETS as f64 - dt <= radius && (a.rho + b.rho).abs() <= radius;
    direct || wrapped
}

/// Split lines into (horizontal, vertical) by direction. Lines further than
/// `tolerance_deg` from both axes are dropped.
pub fn classify_lines(lines: &[PolarLine], tolerance_deg: f64) -> (Vec<PolarLine>, Vec<PolarLine>) {
    let mut horizontal = Vec::new();
    let mut vertical = Vec::new();
    for line in lines {
        let dir = line.direction_deg();
        if dir <= tolerance_deg || dir >= 180.0 - tolerance_deg {
            horizontal.push(*line);
        } else if (dir - 90.0).abs() <= tolerance_deg {
            vertical.push(*line);
        }
    }
    (horizontal, vertical)
}

/// Intersection of two polar lines, `None` when (nearly) parallel.
pub fn intersect(a: &PolarLine, b: &PolarLine) -> Option<Point> {
    let (ta, tb) = ((a.theta_deg as f64).to_radians(), (b.theta_deg as f64).to_radians());
    let (cos_a, sin_a) = (ta.cos(), ta.sin());
    let (cos_b, sin_b) = (tb.cos(), tb.sin());

    let denom = cos_a * sin_b - sin_a * cos_b;
    if denom.abs() < 1e-6 {
        return None;
    }
    let x = (a.rho * sin_b - b.rho * sin_a) / denom;
    let y = (b.rho * cos_a - a.rho * cos_b) / denom;
    Some(Point::new(x, y))
}

fn extremes(lines: &[PolarLine]) -> Option<(PolarLine, PolarLine)> {
    let near = lines.iter().min_by(|a, b| a.rho.abs().total_cmp(&b.rho.abs()))?;
    let far = lines.iter().max_by(|a, b| a.rho.abs().total_cmp(&b.rho.abs()))?;
    (near != far).then_some((*near, *far))
}

/// Build the page quad from the outermost horizontal and vertical lines.
pub fn locate(edges: &EdgeMap, config: &DetectionConfig) -> Result<Quad> {
    let lines = detect_lines(edges, config);
    if lines.len() < 4 {
        debug!(lines = lines.len(), "Too few lines for a quadrilateral");
        return Err(ScanError::BoundaryNotFound);
    }

    let (horizontal, vertical) = classify_lines(&lines, config.hough_angle_tolerance_deg);
    let (Some((top, bottom)), Some((left, right))) = (extremes(&horizontal), extremes(&vertical)) else {
        debug!(
            horizontal = horizontal.len(),
            vertical = vertical.len(),
            "Need two distinct lines in each direction"
        );
        return Err(ScanError::BoundaryNotFound);
    };

    let corners = [
        intersect(&top, &left),
        intersect(&top, &right),
        intersect(&bottom, &right),
        intersect(&bottom, &left),
    ];
    let [Some(a), Some(b), Some(c), Some(d)] = corners else {
        return Err(ScanError::BoundaryNotFound);
    };
    let quad = Quad::from_unordered([a, b, c, d]);
    if !quad.is_finite() {
        return Err(ScanError::BoundaryNotFound);
    }

    let image_area = edges.width as f64 * edges.height as f64;
    let estimate = quad.mean_width() * quad.mean_height();
    if estimate < config.hough_min_area_ratio * image_area {
        warn!(estimate, image_area, "Hough quadrilateral too small");
        return Err(ScanError::BoundaryNotFound);
    }

    Ok(quad.clamped(edges.width as u32, edges.height as u32))
}
