// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Contour strategy: the largest edge contour that simplifies to four corners.

use scanwerk_core::error::{Result, ScanError};
use scanwerk_core::geometry::polygon_area;
use scanwerk_core::{DetectionConfig, Quad};
use tracing::debug;

use crate::contour::{simplify_polygon, trace_contours};
use crate::edges::EdgeMap;

/// Accept the first contour (largest area first) whose simplified polygon has
/// exactly four vertices and covers at least `min_area_ratio` of the image.
pub fn locate(edges: &EdgeMap, config: &DetectionConfig) -> Result<Quad> {
    let image_area = edges.width as f64 * edges.height as f64;
    let min_area = config.min_area_ratio * image_area;

    for (rank, contour) in trace_contours(edges, config.min_contour_pixels)
        .iter()
        .enumerate()
    {
        // Sorted by area, so nothing after this can pass either.
        if contour.area < min_area {
            break;
        }
        let epsilon = config.simplify_epsilon_ratio * contour.perimeter();
        let polygon = simplify_polygon(&contour.points, epsilon);
        debug!(rank, vertices = polygon.len(), epsilon, "Contour simplified");

        if let [a, b, c, d] = polygon[..] {
            if polygon_area(&polygon) >= min_area {
                return Ok(Quad::from_unordered([a, b, c, d]));
            }
        }
    }

    Err(ScanError::BoundaryNotFound)
}
