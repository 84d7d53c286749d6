/// Cursor image for a single frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorSnapshot {
    /// Top-left x, hotspot already subtracted
    pub x: i32,
    /// Top-left y, hotspot already subtracted
    pub y: i32,
    pub width: u32,
    pub height: u32,
    /// Row-major ARGB pixels, alpha in the high byte
    pub pixels: Vec<u32>,
}

impl CursorSnapshot {
    /// Pixel at cursor-local `(cx, cy)`.
    #[inline]
    pub fn pixel(&self, cx: usize, cy: usize) -> u32 {
        self.pixels[cy * self.width as usize + cx]
    }
}

pub trait CursorSource {
    /// Current cursor image, or `None` when no cursor is obtainable.
    /// Absence is not an error.
    fn cursor(&self) -> Option<CursorSnapshot>;
}
