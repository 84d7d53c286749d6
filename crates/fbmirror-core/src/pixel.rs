//! 8-bit BGR to packed RGB565 conversion.

/// Bytes per destination pixel
pub const DEST_BYTES_PER_PIXEL: usize = 2;

/// Pack an 8-bit triplet into RGB565 by truncation (no rounding, no dithering).
#[inline]
pub fn rgb565(b: u8, g: u8, r: u8) -> u16 {
    ((r as u16 >> 3) << 11) | ((g as u16 >> 2) << 5) | (b as u16 >> 3)
}

/// Split an ARGB word into (alpha, red, green, blue).
#[inline]
pub fn argb_channels(pixel: u32) -> (u8, u8, u8, u8) {
    (
        (pixel >> 24) as u8,
        (pixel >> 16) as u8,
        (pixel >> 8) as u8,
        pixel as u8,
    )
}

/// Convert an ARGB word, ignoring alpha.
#[inline]
pub fn rgb565_from_argb(pixel: u32) -> u16 {
    let (_, r, g, b) = argb_channels(pixel);
    rgb565(b, g, r)
}

/// Straight-alpha "over": `(c * a + s * (255 - a)) / 255`, truncating.
#[inline]
pub fn blend_straight(cursor: u8, source: u8, alpha: u8) -> u8 {
    let a = alpha as u32;
    ((cursor as u32 * a + source as u32 * (255 - a)) / 255) as u8
}

/// Premultiplied-alpha "over": `c + s * (255 - a) / 255`, saturating.
#[inline]
pub fn blend_premultiplied(cursor: u8, source: u8, alpha: u8) -> u8 {
    let rest = source as u32 * (255 - alpha as u32) / 255;
    (cursor as u32 + rest).min(255) as u8
}

/// Store a pixel at byte offset `offset` of a destination row buffer.
#[inline]
pub fn write_pixel(dest: &mut [u8], offset: usize, value: u16) {
    dest[offset..offset + DEST_BYTES_PER_PIXEL].copy_from_slice(&value.to_ne_bytes());
}

/// Load a pixel from byte offset `offset`.
#[inline]
pub fn read_pixel(dest: &[u8], offset: usize) -> u16 {
    u16::from_ne_bytes([dest[offset], dest[offset + 1]])
}
