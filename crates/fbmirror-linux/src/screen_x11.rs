//! X11 root window capture using xcb with the SHM extension, plus the
//! XFixes cursor image.

use anyhow::{anyhow, bail, Context, Result};
use tracing::{debug, info};
use xcb::{shm, x, xfixes};

use fbmirror_platform::cursor::{CursorSnapshot, CursorSource};
use fbmirror_platform::screen::{SourceFrame, SurfaceExtent, SurfaceSource, SOURCE_BYTES_PER_PIXEL};

/// SysV shared memory segment, attached to this process
struct ShmSegment {
    id: i32,
    ptr: *mut u8,
    size: usize,
}

impl ShmSegment {
    fn create(size: usize) -> Result<Self> {
        let id = unsafe { libc::shmget(libc::IPC_PRIVATE, size, libc::IPC_CREAT | 0o600) };
        if id < 0 {
            bail!("shmget failed: {}", std::io::Error::last_os_error());
        }

        let ptr = unsafe { libc::shmat(id, std::ptr::null(), 0) };
        if ptr == (-1isize) as *mut libc::c_void {
            unsafe { libc::shmctl(id, libc::IPC_RMID, std::ptr::null_mut()) };
            bail!("shmat failed: {}", std::io::Error::last_os_error());
        }

        // Removed once the last attachment goes away, including the X server's
        unsafe { libc::shmctl(id, libc::IPC_RMID, std::ptr::null_mut()) };

        Ok(Self {
            id,
            ptr: ptr as *mut u8,
            size,
        })
    }

    fn as_slice(&self) -> &[u8] {
        // SAFETY: ptr is a live attachment of exactly `size` bytes until drop
        unsafe { std::slice::from_raw_parts(self.ptr, self.size) }
    }
}

impl Drop for ShmSegment {
    fn drop(&mut self) {
        unsafe { libc::shmdt(self.ptr as *const libc::c_void) };
    }
}

/// The X11 root window as a capture source and cursor provider
pub struct X11Surface {
    conn: xcb::Connection,
    root: x::Window,
    extent: SurfaceExtent,
    /// Bytes per ZPixmap row as the server lays it out
    stride: usize,
    shm_seg: shm::Seg,
    shm: ShmSegment,
}

/// Row length in bytes of a ZPixmap image, padded to `scanline_pad` bits.
///
/// Only 32 bits per pixel is accepted; the pipeline reads B, G, R, X.
fn zpixmap_stride(width: u32, bits_per_pixel: u8, scanline_pad: u8) -> Result<usize> {
    if bits_per_pixel as usize != SOURCE_BYTES_PER_PIXEL * 8 {
        bail!("X server stores this depth at {} bits per pixel, need 32", bits_per_pixel);
    }
    if scanline_pad == 0 || scanline_pad % 8 != 0 {
        bail!("unsupported X11 scanline pad of {} bits", scanline_pad);
    }

    let pad = scanline_pad as usize;
    let row_bits = width as usize * bits_per_pixel as usize;
    Ok(row_bits.div_ceil(pad) * pad / 8)
}

impl X11Surface {
    /// Connect to `display` (or `$DISPLAY`), check SHM and XFixes, and
    /// register a shared buffer covering the whole root window.
    pub fn connect(display: Option<&str>) -> Result<Self> {
        let (conn, screen_num) = xcb::Connection::connect_with_extensions(
            display,
            &[xcb::Extension::Shm, xcb::Extension::XFixes],
            &[],
        )
        .map_err(|e| anyhow!("cannot open X display: {}", e))?;

        let setup = conn.get_setup();
        let screen = setup
            .roots()
            .nth(screen_num as usize)
            .context("no X11 screen found")?;

        let extent = SurfaceExtent {
            width: screen.width_in_pixels() as u32,
            height: screen.height_in_pixels() as u32,
            depth: screen.root_depth(),
        };
        let root = screen.root();

        if extent.depth != 24 && extent.depth != 32 {
            bail!("unsupported X11 root depth {}, need 24 or 32", extent.depth);
        }

        let format = setup
            .pixmap_formats()
            .iter()
            .find(|f| f.depth() == extent.depth)
            .with_context(|| format!("no pixmap format for depth {}", extent.depth))?;
        let stride = zpixmap_stride(extent.width, format.bits_per_pixel(), format.scanline_pad())?;

        let shm_version = conn
            .wait_for_reply(conn.send_request(&shm::QueryVersion {}))
            .map_err(|e| anyhow!("X11 SHM extension not available: {}", e))?;

        // XFixes refuses requests until the client announces its version
        let xfixes_version = conn
            .wait_for_reply(conn.send_request(&xfixes::QueryVersion {
                client_major_version: 4,
                client_minor_version: 0,
            }))
            .map_err(|e| anyhow!("XFixes not available: {}", e))?;

        debug!(
            "SHM {}.{}, XFixes {}.{}",
            shm_version.major_version(),
            shm_version.minor_version(),
            xfixes_version.major_version(),
            xfixes_version.minor_version()
        );

        let size = stride * extent.height as usize;
        let segment = ShmSegment::create(size).context("failed to allocate capture buffer")?;

        let shm_seg: shm::Seg = conn.generate_id();
        conn.send_and_check_request(&shm::Attach {
            shmseg: shm_seg,
            shmid: segment.id as u32,
            read_only: false,
        })
        .map_err(|e| anyhow!("xcb::shm::attach failed: {}", e))?;

        info!(
            "X11 capture initialized: {}x{}, depth={}, stride={} on screen {}",
            extent.width, extent.height, extent.depth, stride, screen_num
        );

        Ok(Self {
            conn,
            root,
            extent,
            stride,
            shm_seg,
            shm: segment,
        })
    }
}

impl Drop for X11Surface {
    fn drop(&mut self) {
        let _ = self.conn.send_and_check_request(&shm::Detach {
            shmseg: self.shm_seg,
        });
    }
}

impl SurfaceSource for X11Surface {
    fn extent(&self) -> SurfaceExtent {
        self.extent
    }

    fn capture(&mut self) -> Result<()> {
        let cookie = self.conn.send_request(&shm::GetImage {
            drawable: x::Drawable::Window(self.root),
            x: 0,
            y: 0,
            width: self.extent.width as u16,
            height: self.extent.height as u16,
            plane_mask: !0u32,
            format: x::ImageFormat::ZPixmap as u8,
            shmseg: self.shm_seg,
            offset: 0,
        });

        self.conn
            .wait_for_reply(cookie)
            .map_err(|e| anyhow!("xcb::shm::get_image failed: {}", e))?;

        Ok(())
    }

    fn frame(&self) -> SourceFrame<'_> {
        SourceFrame {
            width: self.extent.width,
            height: self.extent.height,
            stride: self.stride,
            data: self.shm.as_slice(),
        }
    }
}

impl CursorSource for X11Surface {
    fn cursor(&self) -> Option<CursorSnapshot> {
        let cookie = self.conn.send_request(&xfixes::GetCursorImage {});
        let reply = match self.conn.wait_for_reply(cookie) {
            Ok(reply) => reply,
            Err(e) => {
                debug!("cursor image unavailable: {}", e);
                return None;
            }
        };

        let width = reply.width() as u32;
        let height = reply.height() as u32;
        if width == 0 || height == 0 {
            return None;
        }

        Some(CursorSnapshot {
            x: reply.x() as i32 - reply.xhot() as i32,
            y: reply.y() as i32 - reply.yhot() as i32,
            width,
            height,
            pixels: reply.cursor_image().to_vec(),
        })
    }
}
