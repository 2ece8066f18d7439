pub type ColorIdx = u8; // Index into a 16-entry palette (0-15)

/// Largest sprite edge the editor supports.
pub const MAX_SPRITE_SIZE: usize = 40;
pub const PALETTE_SIZE: usize = 16;

#[derive(Copy, Clone, PartialEq, Eq, Hash, Default, Debug)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const TRANSPARENT: Color = Color::new(0, 0, 0, 0);
    pub const BLACK: Color = Color::new(0, 0, 0, 255);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Color { r, g, b, a }
    }

    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Color { r, g, b, a: 255 }
    }
}

pub type Palette16 = [Color; PALETTE_SIZE];

/// Palette indices 0 and 1 are fixed by convention: transparent black and
/// opaque black. Compact containers never store them.
pub fn default_palette() -> Palette16 {
    let mut palette = [Color::TRANSPARENT; PALETTE_SIZE];
    palette[1] = Color::BLACK;
    for i in 2..PALETTE_SIZE {
        let gray = ((i - 2) * 255 / 13) as u8;
        palette[i] = Color::opaque(gray, gray, gray);
    }
    palette
}

/// An indexed sprite: row-major palette indices plus a 16-color palette.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct SpriteCanvas {
    width: usize,
    height: usize,
    pixels: Vec<ColorIdx>,
    palette: Palette16,
}

impl Default for SpriteCanvas {
    fn default() -> Self {
        SpriteCanvas::new(8, 8)
    }
}

impl SpriteCanvas {
    pub fn new(width: usize, height: usize) -> Self {
        let width = width.clamp(1, MAX_SPRITE_SIZE);
        let height = height.clamp(1, MAX_SPRITE_SIZE);
        SpriteCanvas {
            width,
            height,
            pixels: vec![0; width * height],
            palette: default_palette(),
        }
    }

    /// Resize the canvas, clearing all pixels and restoring the default
    /// palette. Dimensions are clamped to 1..=40.
    pub fn resize(&mut self, width: usize, height: usize) {
        *self = SpriteCanvas::new(width, height);
    }

    pub fn clear(&mut self) {
        self.pixels.fill(0);
        self.palette = default_palette();
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn pixel(&self, x: usize, y: usize) -> ColorIdx {
        if x >= self.width || y >= self.height {
            return 0;
        }
        self.pixels[y * self.width + x]
    }

    /// Out-of-bounds coordinates are ignored; an out-of-range color index
    /// falls back to 0.
    pub fn set_pixel(&mut self, x: usize, y: usize, color_idx: ColorIdx) {
        if x >= self.width || y >= self.height {
            return;
        }
        let color_idx = if (color_idx as usize) < PALETTE_SIZE {
            color_idx
        } else {
            0
        };
        self.pixels[y * self.width + x] = color_idx;
    }

    pub fn pixels(&self) -> &[ColorIdx] {
        &self.pixels
    }

    pub fn palette(&self) -> &Palette16 {
        &self.palette
    }

    pub fn palette_color(&self, index: usize) -> Color {
        if index < PALETTE_SIZE {
            self.palette[index]
        } else {
            Color::TRANSPARENT
        }
    }

    pub fn set_palette_color(&mut self, index: usize, color: Color) {
        if index < PALETTE_SIZE {
            self.palette[index] = color;
        }
    }

    pub fn set_palette(&mut self, palette: Palette16) {
        self.palette = palette;
    }

    /// Construct a canvas from raw parts. Used by the container decoders,
    /// which validate dimensions and indices before calling this.
    pub(crate) fn from_parts(
        width: usize,
        height: usize,
        pixels: Vec<ColorIdx>,
        palette: Palette16,
    ) -> Self {
        debug_assert_eq!(pixels.len(), width * height);
        SpriteCanvas {
            width,
            height,
            pixels,
            palette,
        }
    }

    /// Expand the indexed pixels to an RGBA buffer for display or export.
    pub fn rgba_pixels(&self) -> Vec<u8> {
        let mut rgba = Vec::with_capacity(self.pixels.len() * 4);
        for &idx in &self.pixels {
            let color = self.palette_color(idx as usize);
            rgba.extend_from_slice(&[color.r, color.g, color.b, color.a]);
        }
        rgba
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_palette_reserved_entries() {
        let palette = default_palette();
        assert_eq!(palette[0], Color::TRANSPARENT);
        assert_eq!(palette[1], Color::BLACK);
        assert_eq!(palette[15], Color::opaque(255, 255, 255));
    }

    #[test]
    fn dimensions_are_clamped() {
        let canvas = SpriteCanvas::new(0, 100);
        assert_eq!(canvas.width(), 1);
        assert_eq!(canvas.height(), MAX_SPRITE_SIZE);
    }

    #[test]
    fn set_pixel_rejects_bad_input() {
        let mut canvas = SpriteCanvas::new(8, 8);
        canvas.set_pixel(100, 0, 5);
        assert!(canvas.pixels().iter().all(|&p| p == 0));
        canvas.set_pixel(2, 2, 200);
        assert_eq!(canvas.pixel(2, 2), 0);
        canvas.set_pixel(2, 2, 15);
        assert_eq!(canvas.pixel(2, 2), 15);
    }

    #[test]
    fn rgba_expansion_uses_palette() {
        let mut canvas = SpriteCanvas::new(2, 1);
        canvas.set_palette_color(2, Color::opaque(10, 20, 30));
        canvas.set_pixel(1, 0, 2);
        let rgba = canvas.rgba_pixels();
        assert_eq!(&rgba[0..4], &[0, 0, 0, 0]);
        assert_eq!(&rgba[4..8], &[10, 20, 30, 255]);
    }
}
