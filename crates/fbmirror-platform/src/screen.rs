use anyhow::Result;

/// Bytes per pixel of every captured frame (B, G, R, X)
pub const SOURCE_BYTES_PER_PIXEL: usize = 4;

/// Full extent of the capturable surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceExtent {
    pub width: u32,
    pub height: u32,
    /// Color depth reported by the display server
    pub depth: u8,
}

/// Read view of the most recent capture
#[derive(Debug, Clone, Copy)]
pub struct SourceFrame<'a> {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Stride (bytes per row), at least `width * 4`
    pub stride: usize,
    /// Raw BGRX pixel data
    pub data: &'a [u8],
}

impl<'a> SourceFrame<'a> {
    /// Blue, green and red bytes of the pixel at `(x, y)`.
    #[inline]
    pub fn bgr(&self, x: usize, y: usize) -> (u8, u8, u8) {
        let offset = y * self.stride + x * SOURCE_BYTES_PER_PIXEL;
        (self.data[offset], self.data[offset + 1], self.data[offset + 2])
    }

    /// One row of pixel bytes, trimmed to `width` pixels.
    #[inline]
    pub fn row(&self, y: usize) -> &'a [u8] {
        let start = y * self.stride;
        &self.data[start..start + self.width as usize * SOURCE_BYTES_PER_PIXEL]
    }
}

/// A surface that can be snapshotted into a pre-allocated buffer.
pub trait SurfaceSource {
    /// Size and depth of the surface
    fn extent(&self) -> SurfaceExtent;

    /// Copy the current surface contents into the shared buffer.
    /// Overwrites the previous frame in place.
    fn capture(&mut self) -> Result<()>;

    /// The buffer as filled by the last `capture`
    fn frame(&self) -> SourceFrame<'_>;
}
