// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Contour tracing and polygon simplification over a Canny edge map.

use scanwerk_core::Point;
use scanwerk_core::geometry::polygon_area;
use tracing::debug;

use crate::edges::EdgeMap;

/// One connected group of strong edge pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct Contour {
    /// Outer boundary of the group, ordered counter-clockwise (image axes).
    pub points: Vec<Point>,
    /// Area enclosed by `points` (shoelace).
    pub area: f64,
    /// Number of edge pixels in the group.
    pub pixel_count: usize,
}

impl Contour {
    /// Closed-polygon perimeter of the boundary.
    pub fn perimeter(&self) -> f64 {
        closed_perimeter(&self.points)
    }
}

/// Flood-fill 8-connected strong pixels into contours, largest area first.
///
/// Groups with fewer than `min_pixels` pixels are dropped. Filling uses an
/// explicit stack, so deep edge chains cannot overflow the call stack.
pub fn trace_contours(edges: &EdgeMap, min_pixels: usize) -> Vec<Contour> {
    let (w, h) = (edges.width, edges.height);
    let mut visited = vec![false; w * h];
    let mut contours = Vec::new();
    let mut stack = Vec::new();

    for start in 0..w * h {
        if visited[start] || edges.data[start] != crate::edges::STRONG {
            continue;
        }

        // Row extremes are enough to recover the outer boundary.
        let mut row_min: Vec<Option<(usize, usize)>> = Vec::new();
        let mut first_row = usize::MAX;
        let mut pixel_count = 0usize;

        visited[start] = true;
        stack.push(start);
        while let Some(i) = stack.pop() {
            pixel_count += 1;
            let (x, y) = (i % w, i / w);
            if first_row == usize::MAX {
                first_row = y;
            }
            if y < first_row {
                let shift = first_row - y;
                let mut grown = vec![None; shift];
                grown.append(&mut row_min);
                row_min = grown;
                first_row = y;
            }
            let row = y - first_row;
            if row >= row_min.len() {
                row_min.resize(row + 1, None);
            }
            row_min[row] = Some(match row_min[row] {
                Some((lo, hi)) => (lo.min(x), hi.max(x)),
                None => (x, x),
            });

            for dy in -1..=1isize {
                for dx in -1..=1isize {
                    let (nx, ny) = (x as isize + dx, y as isize + dy);
                    if nx < 0 || ny < 0 || nx >= w as isize || ny >= h as isize {
                        continue;
                    }
                    let j = ny as usize * w + nx as usize;
                    if !visited[j] && edges.data[j] == crate::edges::STRONG {
                        visited[j] = true;
                        stack.push(j);
                    }
                }
            }
        }

        if pixel_count < min_pixels {
            continue;
        }

        let mut extremes = Vec::with_capacity(row_min.len() * 2);
        for (row, span) in row_min.iter().enumerate() {
            if let Some((lo, hi)) = span {
                let y = (first_row + row) as f64;
                extremes.push(Point::new(*lo as f64, y));
                if hi != lo {
                    extremes.push(Point::new(*hi as f64, y));
                }
            }
        }
        let points = convex_hull(&extremes);
        let area = polygon_area(&points);
        contours.push(Contour {
            points,
            area,
            pixel_count,
        });
    }

    contours.sort_by(|a, b| b.area.total_cmp(&a.area));
    debug!(count = contours.len(), "Contours traced");
    contours
}

/// Convex hull (Andrew's monotone chain). Collinear points are dropped.
pub fn convex_hull(points: &[Point]) -> Vec<Point> {
    let mut pts = points.to_vec();
    pts.sort_by(|a, b| a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y)));
    pts.dedup();
    if pts.len() < 3 {
        return pts;
    }

    let cross = |o: &Point, a: &Point, b: &Point| (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x);

    let mut lower: Vec<Point> = Vec::new();
    for p in &pts {
        while lower.len() >= 2 && cross(&lower[lower.len() - 2], &lower[lower.len() - 1], p) <= 0.0 {
            lower.pop();
        }
        lower.push(*p);
    }
    let mut upper: Vec<Point> = Vec::new();
    for p in pts.iter().rev() {
        while upper.len() >= 2 && cross(&upper[upper.len() - 2], &upper[upper.len() - 1], p) <= 0.0 {
            upper.pop();
        }
        upper.push(*p);
    }
    lower.pop();
    upper.pop();
    lower.extend(upper);
    lower
}

/// Perpendicular distance from `p` to the segment `a`-`b` (to `a` when the
/// segment is degenerate).
fn perpendicular_distance(p: &Point, a: &Point, b: &Point) -> f64 {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let len = dx.hypot(dy);
    if len < 1e-12 {
        return p.distance(a);
    }
    ((p.x - a.x) * dy - (p.y - a.y) * dx).abs() / len
}

/// Douglas–Peucker on an open chain. Endpoints are always kept.
pub fn simplify_chain(points: &[Point], epsilon: f64) -> Vec<Point> {
    let n = points.len();
    if n < 3 {
        return points.to_vec();
    }
    let mut keep = vec![false; n];
    keep[0] = true;
    keep[n - 1] = true;

    let mut stack = vec![(0usize, n - 1)];
    while let Some((start, end)) = stack.pop() {
        if end <= start + 1 {
            continue;
        }
        let (mut best, mut best_dist) = (start, 0.0);
        for i in start + 1..end {
            let d = perpendicular_distance(&points[i], &points[start], &points[end]);
            if d > best_dist {
                best = i;
                best_dist = d;
            }
        }
        if best_dist > epsilon {
            keep[best] = true;
            stack.push((start, best));
            stack.push((best, end));
        }
    }

    points
        .iter()
        .zip(keep)
        .filter_map(|(p, k)| k.then_some(*p))
        .collect()
}

/// Douglas–Peucker on a closed polygon.
///
/// The ring is split at the vertex farthest from the first one, both halves
/// are simplified, and a final pass drops any vertex (including the split
/// anchors) that lies within `epsilon` of the line through its neighbours.
pub fn simplify_polygon(points: &[Point], epsilon: f64) -> Vec<Point> {
    let n = points.len();
    if n < 4 {
        return points.to_vec();
    }

    let far = (1..n)
        .max_by(|&a, &b| {
            points[0]
                .distance(&points[a])
                .total_cmp(&points[0].distance(&points[b]))
        })
        .unwrap_or(n / 2);

    let first = simplify_chain(&points[..=far], epsilon);
    let mut second_input: Vec<Point> = points[far..].to_vec();
    second_input.push(points[0]);
    let second = simplify_chain(&second_input, epsilon);

    let mut ring = first;
    ring.extend_from_slice(&second[1..second.len() - 1]);

    loop {
        if ring.len() <= 3 {
            break;
        }
        let m = ring.len();
        let removable = (0..m).find(|&i| {
            let prev = &ring[(i + m - 1) % m];
            let next = &ring[(i + 1) % m];
            perpendicular_distance(&ring[i], prev, next) <= epsilon
        });
        match removable {
            Some(i) => {
                ring.remove(i);
            }
            None => break,
        }
    }
    ring
}

fn closed_perimeter(points: &[Point]) -> f64 {
    let n = points.len();
    if n < 2 {
        return 0.0;
    }
    (0..n).map(|i| points[i].distance(&points[(i + 1) % n])).sum()
}
