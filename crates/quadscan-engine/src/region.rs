// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scan region derivation and mapping into the caller's view.

use quadscan_core::{Rect, ScanRegion};

/// Largest centred rectangle of the requested aspect ratio that fits inside
/// `coverage` of the upright frame, grown to at least `min_side` per side.
pub fn derive_scan_region(
    frame_width: u32,
    frame_height: u32,
    aspect_ratio: f64,
    label: &str,
    coverage: f64,
    min_side: f64,
) -> ScanRegion {
    let (frame_w, frame_h) = (frame_width as f64, frame_height as f64);
    let max_w = frame_w * coverage;
    let max_h = frame_h * coverage;

    let (mut width, mut height) = if max_w / aspect_ratio <= max_h {
        (max_w, max_w / aspect_ratio)
    } else {
        (max_h * aspect_ratio, max_h)
    };
    width = width.max(min_side);
    height = height.max(min_side);

    ScanRegion {
        rect: Rect::new((frame_w - width) / 2.0, (frame_h - height) / 2.0, width, height),
        aspect_ratio,
        label: label.to_string(),
    }
}

/// Map a frame-space rectangle into view space. Identity without a view size.
pub fn to_view(rect: Rect, frame: (u32, u32), view: Option<(u32, u32)>) -> Rect {
    match view {
        Some((view_w, view_h)) if frame.0 > 0 && frame.1 > 0 => rect.scaled(
            view_w as f64 / frame.0 as f64,
            view_h as f64 / frame.1 as f64,
        ),
        _ => rect,
    }
}
