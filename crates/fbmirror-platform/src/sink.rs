/// Pixel geometry of the destination device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkGeometry {
    pub width: u32,
    pub height: u32,
    pub bits_per_pixel: u32,
    /// Bytes per row, may exceed `width * bits_per_pixel / 8`
    pub stride: usize,
}

impl SinkGeometry {
    /// Size of the full pixel buffer in bytes
    pub fn buffer_len(&self) -> usize {
        self.stride * self.height as usize
    }
}

/// A directly writeable linear framebuffer.
///
/// Writes are not synchronized with the device's scan-out; a frame may be
/// displayed half-written.
pub trait PixelSink {
    fn geometry(&self) -> SinkGeometry;

    /// The whole pixel buffer, `geometry().buffer_len()` bytes long.
    fn mapped_buffer(&mut self) -> &mut [u8];
}
