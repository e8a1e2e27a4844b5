// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Mask cleanup and grey-level rank filters.

use image::{GrayImage, Luma, imageops};
use imageproc::distance_transform::Norm;
use imageproc::morphology;

/// Close then open a binary mask with square kernels of the given radii.
///
/// Closing bridges small gaps along the document outline, opening removes
/// isolated specks. A radius of 1 is a 3x3 kernel, 2 is 5x5. Pixels outside
/// the mask count as background.
pub fn clean_mask(mask: &GrayImage, close_radius: u8, open_radius: u8) -> GrayImage {
    let pad = u32::from(close_radius.max(open_radius)) + 1;
    with_margin(mask, pad, |padded| {
        let closed = if close_radius > 0 {
            morphology::close(padded, Norm::LInf, close_radius)
        } else {
            padded.clone()
        };
        if open_radius > 0 {
            morphology::open(&closed, Norm::LInf, open_radius)
        } else {
            closed
        }
    })
}

/// Thicken edge maps so one-pixel breaks do not split an outline.
pub fn bridge_edges(edges: &GrayImage, radius: u8) -> GrayImage {
    if radius == 0 {
        return edges.clone();
    }
    with_margin(edges, u32::from(radius) + 1, |padded| {
        morphology::close(padded, Norm::LInf, radius)
    })
}

/// Run `op` on a copy of `mask` framed by `pad` black pixels and crop the
/// result back. `imageproc` erosion treats the outside of the image as
/// foreground, which would otherwise let specks touching the border grow.
fn with_margin(mask: &GrayImage, pad: u32, op: impl FnOnce(&GrayImage) -> GrayImage) -> GrayImage {
    let (width, height) = mask.dimensions();
    let mut canvas = GrayImage::new(width + 2 * pad, height + 2 * pad);
    imageops::replace(&mut canvas, mask, i64::from(pad), i64::from(pad));
    let out = op(&canvas);
    imageops::crop_imm(&out, pad, pad, width, height).to_image()
}

/// Grey-level dilation with a square window of side `2 * radius + 1`.
pub fn max_filter(gray: &GrayImage, radius: u32) -> GrayImage {
    rank_filter(gray, radius, u8::max)
}

/// Grey-level erosion with a square window of side `2 * radius + 1`.
pub fn min_filter(gray: &GrayImage, radius: u32) -> GrayImage {
    rank_filter(gray, radius, u8::min)
}

/// Separable window filter: a horizontal pass then a vertical pass. The
/// window is clipped at the image border.
fn rank_filter(gray: &GrayImage, radius: u32, pick: fn(u8, u8) -> u8) -> GrayImage {
    let (width, height) = gray.dimensions();
    if width == 0 || height == 0 || radius == 0 {
        return gray.clone();
    }

    let mut horizontal = GrayImage::new(width, height);
    for y in 0..height {
        for x in 0..width {
            let lo = x.saturating_sub(radius);
            let hi = (x + radius).min(width - 1);
            let mut acc = gray.get_pixel(lo, y).0[0];
            for xx in lo + 1..=hi {
                acc = pick(acc, gray.get_pixel(xx, y).0[0]);
            }
            horizontal.put_pixel(x, y, Luma([acc]));
        }
    }

    let mut out = GrayImage::new(width, height);
    for y in 0..height {
        let lo = y.saturating_sub(radius);
        let hi = (y + radius).min(height - 1);
        for x in 0..width {
            let mut acc = horizontal.get_pixel(x, lo).0[0];
            for yy in lo + 1..=hi {
                acc = pick(acc, horizontal.get_pixel(x, yy).0[0]);
            }
            out.put_pixel(x, y, Luma([acc]));
        }
    }
    out
}
