//! CPU raster surfaces
//!
//! `Surface` is a straight-alpha RGBA8 buffer with the handful of operations
//! the painter needs: coverage-masked source-over, subtractive alpha
//! (destination-out), fill-beneath (destination-over) and rectangle blits.
//! `AlphaMask` is a single-channel coverage buffer used for atlas sheets and
//! grain.

use crate::coordinates::PixelRect;

pub type Rgba = [u8; 4];

pub const TRANSPARENT: Rgba = [0, 0, 0, 0];
pub const PAPER_WHITE: Rgba = [0xff, 0xff, 0xff, 0xff];

/// Single-channel 8-bit coverage
#[derive(Debug, Clone, PartialEq)]
pub struct AlphaMask {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl AlphaMask {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; width as usize * height as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn bounds(&self) -> PixelRect {
        PixelRect::new(0, 0, self.width as i32, self.height as i32)
    }

    pub fn get(&self, x: i32, y: i32) -> u8 {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return 0;
        }
        self.data[y as usize * self.width as usize + x as usize]
    }

    pub fn set(&mut self, x: i32, y: i32, value: u8) {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return;
        }
        self.data[y as usize * self.width as usize + x as usize] = value;
    }

    /// Screen-combine a coverage bitmap at `(x, y)`, clipped to `clip`.
    ///
    /// Overlapping strikes darken like repeated hammer blows instead of
    /// saturating abruptly.
    pub fn stamp(&mut self, bitmap: &[u8], width: usize, x: i32, y: i32, clip: PixelRect) {
        if width == 0 {
            return;
        }
        let clip = clip.intersect(&self.bounds());
        for (row, line) in bitmap.chunks(width).enumerate() {
            let dy = y + row as i32;
            if dy < clip.y || dy >= clip.bottom() {
                continue;
            }
            for (col, &value) in line.iter().enumerate() {
                let dx = x + col as i32;
                if dx < clip.x || dx >= clip.right() || value == 0 {
                    continue;
                }
                let idx = dy as usize * self.width as usize + dx as usize;
                let dst = self.data[idx] as u32;
                let src = value as u32;
                self.data[idx] = (dst + src - dst * src / 255).min(255) as u8;
            }
        }
    }
}

/// Straight-alpha RGBA8 surface
#[derive(Debug, Clone, PartialEq)]
pub struct Surface {
    width: u32,
    height: u32,
    pixels: Vec<Rgba>,
}

impl Surface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![TRANSPARENT; width as usize * height as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn bounds(&self) -> PixelRect {
        PixelRect::new(0, 0, self.width as i32, self.height as i32)
    }

    pub fn pixel(&self, x: u32, y: u32) -> Rgba {
        if x >= self.width || y >= self.height {
            return TRANSPARENT;
        }
        self.pixels[y as usize * self.width as usize + x as usize]
    }

    /// Raw RGBA bytes, row-major
    pub fn to_rgba_bytes(&self) -> Vec<u8> {
        self.pixels.iter().flatten().copied().collect()
    }

    pub fn fill_rect(&mut self, rect: PixelRect, color: Rgba) {
        let rect = rect.intersect(&self.bounds());
        for y in rect.y..rect.bottom() {
            let start = y as usize * self.width as usize;
            self.pixels[start + rect.x as usize..start + rect.right() as usize].fill(color);
        }
    }

    pub fn clear_rect(&mut self, rect: PixelRect) {
        self.fill_rect(rect, TRANSPARENT);
    }

    /// Source-over a coloured region of a coverage mask.
    ///
    /// `src` selects the mask region, which lands with its top-left at
    /// `(dst_x, dst_y)`; `alpha` scales the coverage; `clip` bounds the write.
    #[allow(clippy::too_many_arguments)]
    pub fn draw_mask(
        &mut self,
        mask: &AlphaMask,
        src: PixelRect,
        dst_x: i32,
        dst_y: i32,
        rgb: [u8; 3],
        alpha: f32,
        clip: PixelRect,
    ) {
        let alpha = alpha.clamp(0.0, 1.0);
        if alpha <= 0.0 {
            return;
        }
        let target = PixelRect::new(dst_x, dst_y, src.width, src.height)
            .intersect(&clip)
            .intersect(&self.bounds());
        for y in target.y..target.bottom() {
            let sy = src.y + (y - dst_y);
            for x in target.x..target.right() {
                let sx = src.x + (x - dst_x);
                let coverage = mask.get(sx, sy);
                if coverage == 0 {
                    continue;
                }
                let a = coverage as f32 / 255.0 * alpha;
                let idx = y as usize * self.width as usize + x as usize;
                self.pixels[idx] = source_over(self.pixels[idx], rgb, a);
            }
        }
    }

    /// Destination-out: remove `mask × strength` of alpha inside `rect`.
    ///
    /// The mask is sampled in surface coordinates scaled by `mask_scale`
    /// (surface px per mask px), so one mask serves every render scale.
    pub fn subtract_alpha(&mut self, mask: &AlphaMask, strength: f32, mask_scale: f32, rect: PixelRect) {
        let strength = strength.clamp(0.0, 1.0);
        if strength <= 0.0 || mask_scale <= 0.0 {
            return;
        }
        let rect = rect.intersect(&self.bounds());
        for y in rect.y..rect.bottom() {
            let my = (y as f32 / mask_scale) as i32;
            for x in rect.x..rect.right() {
                let mx = (x as f32 / mask_scale) as i32;
                let erase = mask.get(mx, my) as f32 / 255.0 * strength;
                if erase <= 0.0 {
                    continue;
                }
                let idx = y as usize * self.width as usize + x as usize;
                let px = &mut self.pixels[idx];
                px[3] = (px[3] as f32 * (1.0 - erase)).round() as u8;
            }
        }
    }

    /// Destination-over: fill whatever is transparent beneath with `color`
    pub fn fill_beneath(&mut self, rect: PixelRect, color: Rgba) {
        let rect = rect.intersect(&self.bounds());
        let back_a = color[3] as f32 / 255.0;
        for y in rect.y..rect.bottom() {
            for x in rect.x..rect.right() {
                let idx = y as usize * self.width as usize + x as usize;
                let front = self.pixels[idx];
                let fa = front[3] as f32 / 255.0;
                let out_a = fa + back_a * (1.0 - fa);
                if out_a <= 0.0 {
                    self.pixels[idx] = TRANSPARENT;
                    continue;
                }
                let mut out = [0u8; 4];
                for c in 0..3 {
                    let v = (front[c] as f32 * fa + color[c] as f32 * back_a * (1.0 - fa)) / out_a;
                    out[c] = v.round().clamp(0.0, 255.0) as u8;
                }
                out[3] = (out_a * 255.0).round() as u8;
                self.pixels[idx] = out;
            }
        }
    }

    /// Copy a rectangle of `src` into the same place on `self`
    pub fn blit_from(&mut self, src: &Surface, rect: PixelRect) {
        let rect = rect.intersect(&self.bounds()).intersect(&src.bounds());
        for y in rect.y..rect.bottom() {
            let dst_start = y as usize * self.width as usize;
            let src_start = y as usize * src.width as usize;
            let (x0, x1) = (rect.x as usize, rect.right() as usize);
            self.pixels[dst_start + x0..dst_start + x1]
                .copy_from_slice(&src.pixels[src_start + x0..src_start + x1]);
        }
    }
}

fn source_over(dst: Rgba, rgb: [u8; 3], a: f32) -> Rgba {
    let da = dst[3] as f32 / 255.0;
    let out_a = a + da * (1.0 - a);
    if out_a <= 0.0 {
        return TRANSPARENT;
    }
    let mut out = [0u8; 4];
    for c in 0..3 {
        let v = (rgb[c] as f32 * a + dst[c] as f32 * da * (1.0 - a)) / out_a;
        out[c] = v.round().clamp(0.0, 255.0) as u8;
    }
    out[3] = (out_a * 255.0).round() as u8;
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_mask(w: u32, h: u32) -> AlphaMask {
        let mut mask = AlphaMask::new(w, h);
        for y in 0..h as i32 {
            for x in 0..w as i32 {
                mask.set(x, y, 255);
            }
        }
        mask
    }

    #[test]
    fn test_draw_mask_respects_clip_and_alpha() {
        let mut surface = Surface::new(8, 8);
        let mask = solid_mask(4, 4);
        surface.draw_mask(&mask, mask.bounds(), 2, 2, [0, 0, 0], 1.0, PixelRect::new(0, 0, 8, 3));

        assert_eq!(surface.pixel(2, 2), [0, 0, 0, 255]);
        assert_eq!(surface.pixel(2, 3), TRANSPARENT); // clipped
        assert_eq!(surface.pixel(1, 2), TRANSPARENT);

        let mut half = Surface::new(2, 2);
        half.draw_mask(&solid_mask(2, 2), PixelRect::new(0, 0, 2, 2), 0, 0, [255, 0, 0], 0.5, half.bounds());
        assert_eq!(half.pixel(0, 0), [255, 0, 0, 128]);
    }

    #[test]
    fn test_subtract_then_fill_beneath() {
        let mut surface = Surface::new(4, 1);
        surface.fill_rect(surface.bounds(), [0, 0, 0, 255]);
        let mut mask = AlphaMask::new(4, 1);
        mask.set(1, 0, 255);
        surface.subtract_alpha(&mask, 1.0, 1.0, surface.bounds());

        assert_eq!(surface.pixel(0, 0)[3], 255);
        assert_eq!(surface.pixel(1, 0)[3], 0);

        surface.fill_beneath(surface.bounds(), PAPER_WHITE);
        assert_eq!(surface.pixel(0, 0), [0, 0, 0, 255]);
        assert_eq!(surface.pixel(1, 0), PAPER_WHITE);
    }

    #[test]
    fn test_blit_copies_only_rect() {
        let mut back = Surface::new(4, 4);
        back.fill_rect(back.bounds(), [9, 9, 9, 255]);
        let mut visible = Surface::new(4, 4);
        visible.blit_from(&back, PixelRect::new(0, 1, 4, 2));
        assert_eq!(visible.pixel(0, 0), TRANSPARENT);
        assert_eq!(visible.pixel(3, 2), [9, 9, 9, 255]);
        assert_eq!(visible.pixel(3, 3), TRANSPARENT);
    }

    #[test]
    fn test_stamp_screens_overlaps() {
        let mut mask = AlphaMask::new(2, 1);
        mask.stamp(&[128, 0], 2, 0, 0, mask.bounds());
        mask.stamp(&[128, 0], 2, 0, 0, mask.bounds());
        assert!(mask.get(0, 0) > 128 && mask.get(0, 0) < 255);
        assert_eq!(mask.get(1, 0), 0);
    }
}
