//! Copy-region clamping and cursor clipping.

use fbmirror_platform::cursor::CursorSnapshot;
use fbmirror_platform::screen::SurfaceExtent;
use fbmirror_platform::sink::SinkGeometry;

/// Rectangle shared by the source surface and the destination, anchored at (0, 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyRegion {
    pub width: u32,
    pub height: u32,
}

impl CopyRegion {
    pub fn new(source: SurfaceExtent, dest: SinkGeometry) -> Self {
        Self {
            width: source.width.min(dest.width),
            height: source.height.min(dest.height),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Clip a cursor against this region. `None` when nothing overlaps.
    pub fn clip_cursor(&self, cursor: &CursorSnapshot) -> Option<CursorRect> {
        let x = cursor.x as i64;
        let y = cursor.y as i64;

        let start_x = x.max(0);
        let start_y = y.max(0);
        let end_x = (x + cursor.width as i64).min(self.width as i64);
        let end_y = (y + cursor.height as i64).min(self.height as i64);

        if start_x >= end_x || start_y >= end_y {
            return None;
        }

        Some(CursorRect {
            start_x: start_x as usize,
            start_y: start_y as usize,
            end_x: end_x as usize,
            end_y: end_y as usize,
        })
    }
}

/// Half-open destination rectangle covered by the cursor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorRect {
    pub start_x: usize,
    pub start_y: usize,
    pub end_x: usize,
    pub end_y: usize,
}

impl CursorRect {
    pub fn width(&self) -> usize {
        self.end_x - self.start_x
    }

    pub fn height(&self) -> usize {
        self.end_y - self.start_y
    }
}
