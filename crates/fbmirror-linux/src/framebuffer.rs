//! Linux fbdev output: geometry via ioctl, pixels via a shared mmap.

use std::fs::{File, OpenOptions};
use std::num::NonZeroUsize;
use std::os::fd::AsRawFd;
use std::path::Path;
use std::ptr::NonNull;

use anyhow::{Context, Result};
use nix::sys::mman::{mmap, munmap, MapFlags, ProtFlags};
use tracing::{info, warn};

use fbmirror_platform::sink::{PixelSink, SinkGeometry};

mod sys {
    //! Subset of <linux/fb.h>

    const FBIOGET_VSCREENINFO: u32 = 0x4600;
    const FBIOGET_FSCREENINFO: u32 = 0x4602;

    #[repr(C)]
    #[derive(Debug, Default, Clone, Copy)]
    pub struct FbBitfield {
        pub offset: u32,
        pub length: u32,
        pub msb_right: u32,
    }

    #[repr(C)]
    #[derive(Debug, Default, Clone, Copy)]
    pub struct FbVarScreeninfo {
        pub xres: u32,
        pub yres: u32,
        pub xres_virtual: u32,
        pub yres_virtual: u32,
        pub xoffset: u32,
        pub yoffset: u32,
        pub bits_per_pixel: u32,
        pub grayscale: u32,
        pub red: FbBitfield,
        pub green: FbBitfield,
        pub blue: FbBitfield,
        pub transp: FbBitfield,
        pub nonstd: u32,
        pub activate: u32,
        pub height: u32,
        pub width: u32,
        pub accel_flags: u32,
        pub pixclock: u32,
        pub left_margin: u32,
        pub right_margin: u32,
        pub upper_margin: u32,
        pub lower_margin: u32,
        pub hsync_len: u32,
        pub vsync_len: u32,
        pub sync: u32,
        pub vmode: u32,
        pub rotate: u32,
        pub colorspace: u32,
        pub reserved: [u32; 4],
    }

    #[repr(C)]
    #[derive(Debug, Default, Clone, Copy)]
    pub struct FbFixScreeninfo {
        pub id: [u8; 16],
        pub smem_start: libc::c_ulong,
        pub smem_len: u32,
        pub type_: u32,
        pub type_aux: u32,
        pub visual: u32,
        pub xpanstep: u16,
        pub ypanstep: u16,
        pub ywrapstep: u16,
        pub line_length: u32,
        pub mmio_start: libc::c_ulong,
        pub mmio_len: u32,
        pub accel: u32,
        pub capabilities: u16,
        pub reserved: [u16; 2],
    }

    nix::ioctl_read_bad!(get_vscreeninfo, FBIOGET_VSCREENINFO, FbVarScreeninfo);
    nix::ioctl_read_bad!(get_fscreeninfo, FBIOGET_FSCREENINFO, FbFixScreeninfo);
}

/// A framebuffer device mapped read/write for the lifetime of the value.
///
/// The panel scans this memory out on its own schedule; nothing orders our
/// writes against that read, so partially updated frames can be visible.
pub struct FramebufferSink {
    _file: File,
    ptr: NonNull<libc::c_void>,
    len: usize,
    geometry: SinkGeometry,
}

impl FramebufferSink {
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .with_context(|| format!("cannot open {}", path.display()))?;
        let fd = file.as_raw_fd();

        let mut var = sys::FbVarScreeninfo::default();
        let mut fix = sys::FbFixScreeninfo::default();
        // SAFETY: fd is open for the whole call and var matches struct fb_var_screeninfo
        unsafe { sys::get_vscreeninfo(fd, &mut var) }
            .with_context(|| format!("FBIOGET_VSCREENINFO failed on {}", path.display()))?;
        // SAFETY: as above, fix matches struct fb_fix_screeninfo
        unsafe { sys::get_fscreeninfo(fd, &mut fix) }
            .with_context(|| format!("FBIOGET_FSCREENINFO failed on {}", path.display()))?;

        let geometry = SinkGeometry {
            width: var.xres,
            height: var.yres,
            bits_per_pixel: var.bits_per_pixel,
            stride: fix.line_length as usize,
        };

        let id_len = fix.id.iter().position(|&b| b == 0).unwrap_or(fix.id.len());
        let id = String::from_utf8_lossy(&fix.id[..id_len]);
        info!(
            "{} ({}): {}x{}, {} bpp, line_length={}",
            path.display(),
            id,
            geometry.width,
            geometry.height,
            geometry.bits_per_pixel,
            geometry.stride
        );
        let channels = (var.red.length, var.green.length, var.blue.length);
        if var.bits_per_pixel == 16 && channels != (5, 6, 5) {
            warn!(
                "16 bpp framebuffer reports r{}g{}b{} channels, colors will be wrong",
                channels.0, channels.1, channels.2
            );
        }

        let len = geometry.buffer_len();
        let map_len = NonZeroUsize::new(len).context("framebuffer reports an empty pixel buffer")?;
        let ptr = unsafe {
            mmap(
                None,
                map_len,
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                MapFlags::MAP_SHARED,
                &file,
                0,
            )
        }
        .with_context(|| format!("mmap of {} failed", path.display()))?;

        Ok(Self {
            _file: file,
            ptr,
            len,
            geometry,
        })
    }
}

impl Drop for FramebufferSink {
    fn drop(&mut self) {
        let _ = unsafe { munmap(self.ptr, self.len) };
    }
}

impl PixelSink for FramebufferSink {
    fn geometry(&self) -> SinkGeometry {
        self.geometry
    }

    fn mapped_buffer(&mut self) -> &mut [u8] {
        // SAFETY: the mapping is `len` bytes and lives until drop
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr() as *mut u8, self.len) }
    }
}

#[cfg(test)]
mod tests {
    use super::sys::{FbBitfield, FbFixScreeninfo, FbVarScreeninfo};
    use std::mem::size_of;

    #[test]
    fn test_var_screeninfo_matches_kernel_layout() {
        assert_eq!(size_of::<FbBitfield>(), 12);
        assert_eq!(size_of::<FbVarScreeninfo>(), 160);
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn test_fix_screeninfo_matches_kernel_layout() {
        assert_eq!(size_of::<FbFixScreeninfo>(), 80);
    }

    #[cfg(target_pointer_width = "32")]
    #[test]
    fn test_fix_screeninfo_matches_kernel_layout() {
        assert_eq!(size_of::<FbFixScreeninfo>(), 68);
    }
}
