// Linux collaborators: X11 surface capture and fbdev output

#[cfg(target_os = "linux")]
pub mod screen_x11;

#[cfg(target_os = "linux")]
pub mod framebuffer;
