//! The steady-state mirror loop: capture, convert, overlay cursor, sleep.

use anyhow::{bail, Context, Result};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use fbmirror_platform::cursor::CursorSource;
use fbmirror_platform::screen::SurfaceSource;
use fbmirror_platform::sink::PixelSink;

use crate::compositor::Compositor;
use crate::config::MirrorConfig;
use crate::pacer::{FrameInterval, Pacer};
use crate::pixel::DEST_BYTES_PER_PIXEL;
use crate::region::CopyRegion;

/// Frames between measured-rate log lines
const STATS_WINDOW: u64 = 300;

/// Mirrors a surface onto a pixel sink, one frame at a time.
pub struct Mirror<S, K> {
    surface: S,
    sink: K,
    compositor: Compositor,
    pacer: Pacer,
    draw_cursor: bool,
    frames: u64,
    window_start: Instant,
}

impl<S, K> Mirror<S, K>
where
    S: SurfaceSource + CursorSource,
    K: PixelSink,
{
    /// Validate the destination and fix the copy region and frame interval
    /// for the lifetime of the mirror.
    pub fn new(surface: S, mut sink: K, config: &MirrorConfig) -> Result<Self> {
        let interval = FrameInterval::from_fps(config.fps)?;
        let extent = surface.extent();
        let geometry = sink.geometry();

        info!("source: {}x{}, depth={}", extent.width, extent.height, extent.depth);
        info!(
            "destination: {}x{}, {} bpp, stride={}",
            geometry.width, geometry.height, geometry.bits_per_pixel, geometry.stride
        );

        if geometry.bits_per_pixel as usize != DEST_BYTES_PER_PIXEL * 8 {
            bail!(
                "destination uses {} bits per pixel, only 16 (RGB565) is supported",
                geometry.bits_per_pixel
            );
        }
        if geometry.stride < geometry.width as usize * DEST_BYTES_PER_PIXEL {
            bail!(
                "destination stride {} is shorter than a {}-pixel row",
                geometry.stride,
                geometry.width
            );
        }
        let mapped = sink.mapped_buffer().len();
        if mapped < geometry.buffer_len() {
            bail!(
                "destination mapping is {} bytes, geometry needs {}",
                mapped,
                geometry.buffer_len()
            );
        }

        let region = CopyRegion::new(extent, geometry);
        info!(
            "copying {}x{} @ {} fps (cursor {})",
            region.width,
            region.height,
            config.fps,
            if config.draw_cursor { "on" } else { "off" }
        );
        if region.is_empty() {
            warn!("copy region is empty, nothing will be mirrored");
        }

        Ok(Self {
            surface,
            sink,
            compositor: Compositor::new(region, geometry.stride, config.cursor_alpha),
            pacer: Pacer::new(interval),
            draw_cursor: config.draw_cursor,
            frames: 0,
            window_start: Instant::now(),
        })
    }

    pub fn region(&self) -> CopyRegion {
        self.compositor.region()
    }

    pub fn interval(&self) -> FrameInterval {
        self.pacer.interval()
    }

    /// Produce one frame in the sink. Returns the number of cursor pixels drawn.
    pub fn render_frame(&mut self) -> Result<usize> {
        self.surface.capture().context("surface capture failed")?;

        let frame = self.surface.frame();
        let region = self.compositor.region();
        if frame.width < region.width || frame.height < region.height {
            bail!(
                "captured frame {}x{} is smaller than the copy region {}x{}",
                frame.width,
                frame.height,
                region.width,
                region.height
            );
        }

        let dest = self.sink.mapped_buffer();
        self.compositor.convert_frame(&frame, dest);

        if !self.draw_cursor {
            return Ok(0);
        }
        // the snapshot is dropped (and its memory released) at the end of this frame
        let written = match self.surface.cursor() {
            Some(cursor) => self.compositor.overlay_cursor(&frame, dest, &cursor),
            None => 0,
        };
        Ok(written)
    }

    /// Run forever. Only returns when a capture fails.
    pub async fn run(&mut self) -> Result<()> {
        self.window_start = Instant::now();
        loop {
            let frame_start = Instant::now();
            self.render_frame()?;
            self.record_frame();
            self.pacer.pace(frame_start).await;
        }
    }

    fn record_frame(&mut self) {
        self.frames += 1;
        if self.frames % STATS_WINDOW == 0 {
            let elapsed = self.window_start.elapsed().as_secs_f64();
            if elapsed > 0.0 {
                debug!(
                    "{} frames, {:.1} fps over the last {} frames",
                    self.frames,
                    STATS_WINDOW as f64 / elapsed,
                    STATS_WINDOW
                );
            }
            self.window_start = Instant::now();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;
    use std::time::Duration;

    use fbmirror_platform::cursor::CursorSnapshot;
    use fbmirror_platform::screen::{SourceFrame, SurfaceExtent};
    use fbmirror_platform::sink::SinkGeometry;

    use crate::pixel::{read_pixel, rgb565};

    struct FakeSurface {
        width: u32,
        height: u32,
        data: Vec<u8>,
        cursor: Option<CursorSnapshot>,
        captures: Rc<Cell<usize>>,
        fail_after: Option<usize>,
    }

    impl FakeSurface {
        fn solid(width: u32, height: u32, bgr: [u8; 3]) -> Self {
            let data = [bgr[0], bgr[1], bgr[2], 0].repeat((width * height) as usize);
            Self {
                width,
                height,
                data,
                cursor: None,
                captures: Rc::new(Cell::new(0)),
                fail_after: None,
            }
        }
    }

    impl SurfaceSource for FakeSurface {
        fn extent(&self) -> SurfaceExtent {
            SurfaceExtent {
                width: self.width,
                height: self.height,
                depth: 24,
            }
        }

        fn capture(&mut self) -> Result<()> {
            let n = self.captures.get();
            if self.fail_after.is_some_and(|limit| n >= limit) {
                bail!("connection lost");
            }
            self.captures.set(n + 1);
            Ok(())
        }

        fn frame(&self) -> SourceFrame<'_> {
            SourceFrame {
                width: self.width,
                height: self.height,
                stride: self.width as usize * 4,
                data: &self.data,
            }
        }
    }

    impl CursorSource for FakeSurface {
        fn cursor(&self) -> Option<CursorSnapshot> {
            self.cursor.clone()
        }
    }

    struct MemorySink {
        geometry: SinkGeometry,
        buffer: Vec<u8>,
    }

    impl MemorySink {
        fn rgb565(width: u32, height: u32, stride: usize) -> Self {
            let geometry = SinkGeometry {
                width,
                height,
                bits_per_pixel: 16,
                stride,
            };
            Self {
                geometry,
                buffer: vec![0; geometry.buffer_len()],
            }
        }
    }

    impl PixelSink for MemorySink {
        fn geometry(&self) -> SinkGeometry {
            self.geometry
        }

        fn mapped_buffer(&mut self) -> &mut [u8] {
            &mut self.buffer
        }
    }

    fn config(fps: u32) -> MirrorConfig {
        MirrorConfig {
            fps,
            ..MirrorConfig::default()
        }
    }

    #[test]
    fn test_region_and_interval_fixed_at_setup() {
        let surface = FakeSurface::solid(1920, 1080, [0, 0, 0]);
        let sink = MemorySink::rgb565(480, 320, 960);
        let mirror = Mirror::new(surface, sink, &config(30)).unwrap();

        assert_eq!(
            mirror.region(),
            CopyRegion {
                width: 480,
                height: 320
            }
        );
        assert_eq!(mirror.interval().as_nanos(), 1_000_000_000 / 30);
    }

    #[test]
    fn test_rejects_zero_fps() {
        let surface = FakeSurface::solid(8, 8, [0, 0, 0]);
        let sink = MemorySink::rgb565(8, 8, 16);
        assert!(Mirror::new(surface, sink, &config(0)).is_err());
    }

    #[test]
    fn test_rejects_non_rgb565_sink() {
        let surface = FakeSurface::solid(8, 8, [0, 0, 0]);
        let mut sink = MemorySink::rgb565(8, 8, 32);
        sink.geometry.bits_per_pixel = 32;
        let err = Mirror::new(surface, sink, &config(30)).err().unwrap();
        assert!(err.to_string().contains("32 bits per pixel"));
    }

    #[test]
    fn test_rejects_short_mapping() {
        let surface = FakeSurface::solid(8, 8, [0, 0, 0]);
        let mut sink = MemorySink::rgb565(8, 8, 16);
        sink.buffer.truncate(100);
        assert!(Mirror::new(surface, sink, &config(30)).is_err());
    }

    #[test]
    fn test_render_frame_with_cursor() {
        let mut surface = FakeSurface::solid(64, 48, [0x20, 0x40, 0x80]);
        surface.cursor = Some(CursorSnapshot {
            x: 60,
            y: 2,
            width: 8,
            height: 8,
            pixels: vec![0xFFFF_FFFF; 64],
        });
        let sink = MemorySink::rgb565(64, 48, 140);
        let mut mirror = Mirror::new(surface, sink, &config(30)).unwrap();

        // clipped to 4 columns by the right edge
        assert_eq!(mirror.render_frame().unwrap(), 32);

        let buffer = &mirror.sink.buffer;
        assert_eq!(read_pixel(buffer, 2 * 140 + 61 * 2), 0xFFFF);
        assert_eq!(read_pixel(buffer, 2 * 140 + 59 * 2), rgb565(0x20, 0x40, 0x80));
        assert_eq!(read_pixel(buffer, 47 * 140 + 63 * 2), rgb565(0x20, 0x40, 0x80));
    }

    #[test]
    fn test_missing_cursor_is_not_an_error() {
        let surface = FakeSurface::solid(16, 16, [1, 2, 3]);
        let sink = MemorySink::rgb565(16, 16, 32);
        let mut mirror = Mirror::new(surface, sink, &config(30)).unwrap();

        assert_eq!(mirror.render_frame().unwrap(), 0);
        assert_eq!(read_pixel(&mirror.sink.buffer, 0), rgb565(1, 2, 3));
    }

    #[test]
    fn test_cursor_disabled() {
        let mut surface = FakeSurface::solid(16, 16, [0, 0, 0]);
        surface.cursor = Some(CursorSnapshot {
            x: 0,
            y: 0,
            width: 2,
            height: 2,
            pixels: vec![0xFFFF_FFFF; 4],
        });
        let sink = MemorySink::rgb565(16, 16, 32);
        let cfg = MirrorConfig {
            draw_cursor: false,
            ..config(30)
        };
        let mut mirror = Mirror::new(surface, sink, &cfg).unwrap();

        assert_eq!(mirror.render_frame().unwrap(), 0);
        assert!(mirror.sink.buffer.iter().all(|&v| v == 0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_paces_frames() {
        let surface = FakeSurface::solid(8, 8, [0, 0, 0]);
        let captures = surface.captures.clone();
        let sink = MemorySink::rgb565(8, 8, 16);
        let mut mirror = Mirror::new(surface, sink, &config(10)).unwrap();

        let result = tokio::time::timeout(Duration::from_millis(1050), mirror.run()).await;
        assert!(result.is_err(), "run() must not return while capture succeeds");

        // never faster than 10 fps
        let frames = captures.get();
        assert!((10..=11).contains(&frames), "rendered {} frames", frames);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_capture_failure() {
        let mut surface = FakeSurface::solid(8, 8, [0, 0, 0]);
        surface.fail_after = Some(3);
        let sink = MemorySink::rgb565(8, 8, 16);
        let mut mirror = Mirror::new(surface, sink, &config(30)).unwrap();

        let err = mirror.run().await.unwrap_err();
        assert!(format!("{:#}", err).contains("connection lost"));
    }
}
