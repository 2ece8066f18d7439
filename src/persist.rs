use std::path::Path;

use log::info;

use crate::codec;
use crate::error::{Error, Result};
use crate::import::ImportSession;
use crate::library::PaletteLibrary;
use crate::raster;
use crate::state::{Palette16, SpriteCanvas};

pub fn save_sprite(path: &Path, canvas: &SpriteCanvas) -> Result<()> {
    std::fs::write(path, codec::encode_sprite(canvas))?;
    info!(
        "Saved {}x{} sprite to {}",
        canvas.width(),
        canvas.height(),
        path.display()
    );
    Ok(())
}

pub fn load_sprite(path: &Path) -> Result<SpriteCanvas> {
    let bytes = std::fs::read(path)?;
    let canvas = codec::decode_sprite(&bytes)?;
    info!(
        "Loaded {}x{} sprite from {}",
        canvas.width(),
        canvas.height(),
        path.display()
    );
    Ok(canvas)
}

pub fn save_palette(path: &Path, palette: &Palette16) -> Result<()> {
    std::fs::write(path, codec::encode_palette(palette))?;
    info!("Saved palette to {}", path.display());
    Ok(())
}

pub fn load_palette(path: &Path) -> Result<Palette16> {
    let bytes = std::fs::read(path)?;
    let palette = codec::decode_palette(&bytes)?;
    info!("Loaded palette from {}", path.display());
    Ok(palette)
}

pub fn save_sprtz_v1(path: &Path, canvas: &SpriteCanvas) -> Result<()> {
    let bytes = codec::encode_sprtz_v1(canvas);
    info!(
        "Saved compressed sprite to {} ({} bytes)",
        path.display(),
        bytes.len()
    );
    std::fs::write(path, bytes)?;
    Ok(())
}

pub fn save_sprtz_v2_custom(path: &Path, canvas: &SpriteCanvas) -> Result<()> {
    let bytes = codec::encode_sprtz_v2_custom(canvas);
    info!(
        "Saved compressed sprite (custom palette) to {} ({} bytes)",
        path.display(),
        bytes.len()
    );
    std::fs::write(path, bytes)?;
    Ok(())
}

pub fn save_sprtz_v2_standard(path: &Path, canvas: &SpriteCanvas, palette_id: u8) -> Result<()> {
    let bytes = codec::encode_sprtz_v2_standard(canvas, palette_id)?;
    info!(
        "Saved compressed sprite (standard palette {palette_id}) to {} ({} bytes)",
        path.display(),
        bytes.len()
    );
    std::fs::write(path, bytes)?;
    Ok(())
}

pub fn load_sprtz(
    path: &Path,
    library: Option<&PaletteLibrary>,
) -> Result<(SpriteCanvas, codec::PaletteSource)> {
    let bytes = std::fs::read(path)?;
    let (canvas, source) = codec::decode_sprtz(&bytes, library)?;
    info!(
        "Loaded {}x{} compressed sprite from {} ({:?} palette)",
        canvas.width(),
        canvas.height(),
        path.display(),
        source
    );
    Ok((canvas, source))
}

/// Export a canvas as a PNG, upscaled by an integer factor with nearest
/// neighbor so pixels stay crisp.
pub fn export_png(path: &Path, canvas: &SpriteCanvas, scale: usize) -> Result<()> {
    if scale == 0 {
        return Err(Error::Validation("export scale must be at least 1".to_string()));
    }
    let rgba = canvas.rgba_pixels();
    let (width, height) = (canvas.width(), canvas.height());
    let out_w = width * scale;
    let out_h = height * scale;
    let mut scaled = Vec::with_capacity(out_w * out_h * 4);
    for y in 0..out_h {
        for x in 0..out_w {
            let o = ((y / scale) * width + x / scale) * 4;
            scaled.extend_from_slice(&rgba[o..o + 4]);
        }
    }
    let bytes = raster::encode_png(&scaled, out_w, out_h)?;
    std::fs::write(path, bytes)?;
    info!(
        "Exported {}x{} sprite to {} at {scale}x scale",
        width,
        height,
        path.display()
    );
    Ok(())
}

/// One-shot PNG import: run the staged pipeline start-to-commit with no
/// interactive adjustment.
pub fn import_png(path: &Path, max_width: usize, max_height: usize) -> Result<SpriteCanvas> {
    let bytes = std::fs::read(path)?;
    let (rgba, width, height) = raster::decode_png(&bytes)?;
    let mut canvas = SpriteCanvas::default();
    let session = ImportSession::start(rgba, width, height, max_width, max_height, &mut canvas)?;
    session.commit();
    info!(
        "Imported {} as a {}x{} sprite",
        path.display(),
        canvas.width(),
        canvas.height()
    );
    Ok(canvas)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{default_palette, Color};

    #[test]
    fn sprite_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.spr");
        let mut canvas = SpriteCanvas::new(5, 3);
        canvas.set_pixel(1, 1, 7);
        save_sprite(&path, &canvas).unwrap();
        assert_eq!(load_sprite(&path).unwrap(), canvas);
    }

    #[test]
    fn palette_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.stpal");
        let mut palette = default_palette();
        palette[3] = Color::opaque(9, 8, 7);
        save_palette(&path, &palette).unwrap();
        assert_eq!(load_palette(&path).unwrap(), palette);
    }

    #[test]
    fn export_png_scales_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.png");
        let mut canvas = SpriteCanvas::new(4, 4);
        canvas.set_pixel(0, 0, 1);
        export_png(&path, &canvas, 3).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        let (rgba, w, h) = raster::decode_png(&bytes).unwrap();
        assert_eq!((w, h), (12, 12));
        // The top-left sprite pixel covers a 3x3 block of opaque black.
        assert_eq!(&rgba[0..4], &[0, 0, 0, 255]);
        assert_eq!(&rgba[(2 * 12 + 2) * 4 + 3], &255);
        assert_eq!(&rgba[(0 * 12 + 3) * 4 + 3], &0);
    }

    #[test]
    fn export_png_rejects_zero_scale() {
        let dir = tempfile::tempdir().unwrap();
        let canvas = SpriteCanvas::new(4, 4);
        assert!(export_png(&dir.path().join("x.png"), &canvas, 0).is_err());
    }

    #[test]
    fn import_png_produces_indexed_sprite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.png");
        // Red square centered on a white background.
        let mut rgba = vec![255u8; 16 * 16 * 4];
        for y in 4..12 {
            for x in 4..12 {
                let o = (y * 16 + x) * 4;
                rgba[o] = 200;
                rgba[o + 1] = 0;
                rgba[o + 2] = 0;
            }
        }
        std::fs::write(&path, raster::encode_png(&rgba, 16, 16).unwrap()).unwrap();
        let canvas = import_png(&path, 16, 16).unwrap();
        assert_eq!((canvas.width(), canvas.height()), (16, 16));
        assert!(canvas.pixels().iter().any(|&p| p >= 2));
    }
}
