// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image processor: upright rotation, crop, resize, flip, grayscale and PNG
// export for camera frames. Operates on in-memory RGB images using the `image`
// crate.

use std::io::Cursor;

use image::imageops::{self, FilterType};
use image::{GrayImage, ImageFormat, RgbImage};
use quadscan_core::error::{Result, ScanError};
use quadscan_core::{Frame, Rotation};
use tracing::{debug, instrument};

/// Image processing pipeline operating on a single in-memory RGB image.
///
/// Each transformation consumes `self` and returns a new `ImageProcessor`,
/// enabling method chaining.
///
/// ```ignore
/// let upright = ImageProcessor::from_frame(frame)?
///     .rotate(Rotation::Deg90)
///     .crop(40, 40, 600, 400)
///     .into_rgb();
/// ```
pub struct ImageProcessor {
    /// The current working image.
    image: RgbImage,
}

impl ImageProcessor {
    // -- Construction ---------------------------------------------------------

    /// Take ownership of a camera frame's pixel buffer.
    ///
    /// The frame's rotation is not applied; call [`ImageProcessor::rotate`]
    /// with `frame.rotation` to bring it upright.
    pub fn from_frame(frame: Frame) -> Result<Self> {
        frame.validate()?;
        let Frame {
            width,
            height,
            pixels,
            ..
        } = frame;
        let image = RgbImage::from_raw(width, height, pixels).ok_or_else(|| {
            ScanError::AcquisitionEmpty(format!("pixel buffer does not fit {width}x{height}"))
        })?;
        Ok(Self { image })
    }

    /// Load an image from a file path.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let img = image::open(path.as_ref()).map_err(|err| {
            ScanError::ImageError(format!(
                "failed to open {}: {}",
                path.as_ref().display(),
                err
            ))
        })?;
        debug!(width = img.width(), height = img.height(), "Image loaded");
        Ok(Self {
            image: img.to_rgb8(),
        })
    }

    /// Wrap an already-decoded RGB image.
    pub fn from_rgb(image: RgbImage) -> Self {
        Self { image }
    }

    // -- Accessors ------------------------------------------------------------

    /// Current image width in pixels.
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Current image height in pixels.
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Borrow the underlying image.
    pub fn as_rgb(&self) -> &RgbImage {
        &self.image
    }

    /// Consume the processor and return the underlying image.
    pub fn into_rgb(self) -> RgbImage {
        self.image
    }

    /// Luma conversion of the current image.
    pub fn grayscale(&self) -> GrayImage {
        imageops::grayscale(&self.image)
    }

    // -- Transformations (consume self, return new Self) -----------------------

    /// Rotate clockwise by a right angle. Lossless.
    pub fn rotate(self, rotation: Rotation) -> Self {
        let image = match rotation {
            Rotation::Deg0 => return self,
            Rotation::Deg90 => imageops::rotate90(&self.image),
            Rotation::Deg180 => imageops::rotate180(&self.image),
            Rotation::Deg270 => imageops::rotate270(&self.image),
        };
        Self { image }
    }

    /// Crop a rectangular region from the image.
    ///
    /// `x` and `y` are the top-left corner; `width` and `height` define the
    /// size of the crop rectangle. Values are clamped to image bounds.
    pub fn crop(self, x: u32, y: u32, width: u32, height: u32) -> Self {
        let img_w = self.image.width();
        let img_h = self.image.height();

        let safe_x = x.min(img_w.saturating_sub(1));
        let safe_y = y.min(img_h.saturating_sub(1));
        let safe_w = width.min(img_w - safe_x);
        let safe_h = height.min(img_h - safe_y);

        debug!(safe_x, safe_y, safe_w, safe_h, "Cropping image");

        let cropped = imageops::crop_imm(&self.image, safe_x, safe_y, safe_w, safe_h).to_image();
        Self { image: cropped }
    }

    /// Resize to exactly `width` x `height` with the given filter.
    pub fn resize_exact(self, width: u32, height: u32, filter: FilterType) -> Self {
        if width == self.image.width() && height == self.image.height() {
            return self;
        }
        Self {
            image: imageops::resize(&self.image, width.max(1), height.max(1), filter),
        }
    }

    /// Mirror left to right.
    pub fn flip_horizontal(self) -> Self {
        Self {
            image: imageops::flip_horizontal(&self.image),
        }
    }

    /// Rotate 90 degrees counter-clockwise.
    pub fn rotate_counter_clockwise(self) -> Self {
        Self {
            image: imageops::rotate270(&self.image),
        }
    }

    // -- Export ---------------------------------------------------------------

    /// Encode the current image as PNG bytes.
    pub fn to_png_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Cursor::new(Vec::new());
        self.image
            .write_to(&mut buf, ImageFormat::Png)
            .map_err(|err| ScanError::ImageError(format!("PNG encoding failed: {err}")))?;
        Ok(buf.into_inner())
    }

    /// Write the current image to `path`; the format follows the extension.
    pub fn save(&self, path: impl AsRef<std::path::Path>) -> Result<()> {
        self.image.save(path.as_ref()).map_err(|err| {
            ScanError::ImageError(format!("failed to save {}: {}", path.as_ref().display(), err))
        })
    }
}
