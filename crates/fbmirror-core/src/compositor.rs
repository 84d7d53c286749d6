//! Two-pass frame compositor: full-frame BGRX -> RGB565 conversion, then
//! an alpha-blended cursor overlay limited to the cursor's bounding box.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use fbmirror_platform::cursor::CursorSnapshot;
use fbmirror_platform::screen::{SourceFrame, SOURCE_BYTES_PER_PIXEL};

use crate::config::ConfigError;
use crate::pixel::{
    argb_channels, blend_premultiplied, blend_straight, rgb565, write_pixel, DEST_BYTES_PER_PIXEL,
};
use crate::region::CopyRegion;

/// How cursor color channels relate to their alpha
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CursorAlpha {
    /// Color channels are independent of alpha
    #[default]
    Straight,
    /// Color channels are already scaled by alpha
    Premultiplied,
}

impl CursorAlpha {
    #[inline]
    fn blend(self, cursor: u8, source: u8, alpha: u8) -> u8 {
        match self {
            CursorAlpha::Straight => blend_straight(cursor, source, alpha),
            CursorAlpha::Premultiplied => blend_premultiplied(cursor, source, alpha),
        }
    }
}

impl FromStr for CursorAlpha {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "straight" => Ok(CursorAlpha::Straight),
            "premultiplied" => Ok(CursorAlpha::Premultiplied),
            _ => Err(ConfigError::UnknownCursorAlpha(s.to_string())),
        }
    }
}

/// Writes frames into a destination buffer with a fixed stride.
///
/// Holds no per-frame state: the output is a function of the current source
/// frame and cursor snapshot only.
#[derive(Debug, Clone, Copy)]
pub struct Compositor {
    region: CopyRegion,
    /// Destination bytes per row
    dest_stride: usize,
    alpha: CursorAlpha,
}

impl Compositor {
    pub fn new(region: CopyRegion, dest_stride: usize, alpha: CursorAlpha) -> Self {
        Self {
            region,
            dest_stride,
            alpha,
        }
    }

    pub fn region(&self) -> CopyRegion {
        self.region
    }

    /// Run both passes. Returns the number of pixels the cursor pass wrote.
    pub fn compose(
        &self,
        frame: &SourceFrame<'_>,
        dest: &mut [u8],
        cursor: Option<&CursorSnapshot>,
    ) -> usize {
        self.convert_frame(frame, dest);
        match cursor {
            Some(cursor) => self.overlay_cursor(frame, dest, cursor),
            None => 0,
        }
    }

    /// Pass 1: convert every pixel of the copy region, alpha ignored.
    pub fn convert_frame(&self, frame: &SourceFrame<'_>, dest: &mut [u8]) {
        let width = self.region.width as usize;
        let row_bytes = width * DEST_BYTES_PER_PIXEL;

        for y in 0..self.region.height as usize {
            let src = &frame.row(y)[..width * SOURCE_BYTES_PER_PIXEL];
            let start = y * self.dest_stride;
            let dst = &mut dest[start..start + row_bytes];

            for (px, out) in src
                .chunks_exact(SOURCE_BYTES_PER_PIXEL)
                .zip(dst.chunks_exact_mut(DEST_BYTES_PER_PIXEL))
            {
                out.copy_from_slice(&rgb565(px[0], px[1], px[2]).to_ne_bytes());
            }
        }
    }

    /// Pass 2: blend the cursor over the converted frame.
    ///
    /// Partial alpha is blended against the original 8-bit source pixel,
    /// never the already quantized destination value. Fully transparent
    /// cursor pixels are not written.
    pub fn overlay_cursor(
        &self,
        frame: &SourceFrame<'_>,
        dest: &mut [u8],
        cursor: &CursorSnapshot,
    ) -> usize {
        let expected = cursor.width as usize * cursor.height as usize;
        if cursor.pixels.len() < expected {
            debug!(
                "cursor image has {} pixels, expected {}; skipping overlay",
                cursor.pixels.len(),
                expected
            );
            return 0;
        }

        let Some(rect) = self.region.clip_cursor(cursor) else {
            return 0;
        };

        let mut written = 0;
        for y in rect.start_y..rect.end_y {
            let cy = (y as i64 - cursor.y as i64) as usize;
            let row = y * self.dest_stride;

            for x in rect.start_x..rect.end_x {
                let cx = (x as i64 - cursor.x as i64) as usize;
                let (ca, cr, cg, cb) = argb_channels(cursor.pixel(cx, cy));

                let value = match ca {
                    0 => continue,
                    255 => rgb565(cb, cg, cr),
                    _ => {
                        let (b, g, r) = frame.bgr(x, y);
                        rgb565(
                            self.alpha.blend(cb, b, ca),
                            self.alpha.blend(cg, g, ca),
                            self.alpha.blend(cr, r, ca),
                        )
                    }
                };

                write_pixel(dest, row + x * DEST_BYTES_PER_PIXEL, value);
                written += 1;
            }
        }

        written
    }
}
