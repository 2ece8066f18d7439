use crate::error::{Error, Result};
use crate::library::{PaletteLibrary, STANDARD_PALETTE_COUNT};
use crate::state::{Color, Palette16, SpriteCanvas, MAX_SPRITE_SIZE, PALETTE_SIZE};

pub const SPRITE_MAGIC: &[u8; 5] = b"SPRED";
pub const PALETTE_MAGIC: &[u8; 5] = b"STPAL";
pub const SPRTZ_MAGIC: &[u8; 4] = b"SPTZ";

/// SPRTZ v2 palette-mode byte for an embedded custom palette. Values 0-31
/// reference a standard palette instead.
pub const PALETTE_MODE_CUSTOM: u8 = 0xFF;

/// How a decoded SPRTZ container carried its palette.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum PaletteSource {
    Custom,
    Standard(u8),
}

// Bounds-checked little-endian reader over a byte slice. Mixing up field
// widths is the classic way to corrupt a binary loader, so every read goes
// through here.
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Reader { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.pos + n > self.data.len() {
            return Err(Error::Format("unexpected end of data".to_string()));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16_le(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32_le(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn i32_le(&mut self) -> Result<i32> {
        let b = self.take(4)?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }
}

fn check_dimensions(width: usize, height: usize) -> Result<()> {
    if width < 1 || width > MAX_SPRITE_SIZE || height < 1 || height > MAX_SPRITE_SIZE {
        return Err(Error::Dimension(format!(
            "sprite dimensions {width}x{height} outside 1..={MAX_SPRITE_SIZE}"
        )));
    }
    Ok(())
}

fn check_indices(pixels: &[u8]) -> Result<()> {
    if let Some(&bad) = pixels.iter().find(|&&p| p as usize >= PALETTE_SIZE) {
        return Err(Error::Validation(format!(
            "pixel index {bad} outside 0..={}",
            PALETTE_SIZE - 1
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// SPRED sprite file: magic + version + i32 dimensions + raw indices + RGBA
// palette. The uncompressed editor format.
// ---------------------------------------------------------------------------

pub fn encode_sprite(canvas: &SpriteCanvas) -> Vec<u8> {
    let mut out = Vec::with_capacity(14 + canvas.pixels().len() + 64);
    out.extend_from_slice(SPRITE_MAGIC);
    out.push(1);
    out.extend_from_slice(&(canvas.width() as i32).to_le_bytes());
    out.extend_from_slice(&(canvas.height() as i32).to_le_bytes());
    out.extend_from_slice(canvas.pixels());
    for color in canvas.palette() {
        out.extend_from_slice(&[color.r, color.g, color.b, color.a]);
    }
    out
}

pub fn decode_sprite(bytes: &[u8]) -> Result<SpriteCanvas> {
    let mut r = Reader::new(bytes);
    if r.take(5)? != SPRITE_MAGIC {
        return Err(Error::Format("bad sprite magic".to_string()));
    }
    let version = r.u8()?;
    if version != 1 {
        return Err(Error::Format(format!("unsupported sprite version {version}")));
    }
    let width = r.i32_le()?;
    let height = r.i32_le()?;
    if width < 1 || height < 1 {
        return Err(Error::Dimension(format!(
            "sprite dimensions {width}x{height} must be positive"
        )));
    }
    let (width, height) = (width as usize, height as usize);
    check_dimensions(width, height)?;
    let pixels = r.take(width * height)?.to_vec();
    check_indices(&pixels)?;
    let palette = read_rgba_palette(&mut r)?;
    Ok(SpriteCanvas::from_parts(width, height, pixels, palette))
}

fn read_rgba_palette(r: &mut Reader) -> Result<Palette16> {
    let mut palette = [Color::TRANSPARENT; PALETTE_SIZE];
    for entry in &mut palette {
        let b = r.take(4)?;
        *entry = Color::new(b[0], b[1], b[2], b[3]);
    }
    Ok(palette)
}

// ---------------------------------------------------------------------------
// STPAL palette file: magic + version + 64-byte RGBA palette.
// ---------------------------------------------------------------------------

pub fn encode_palette(palette: &Palette16) -> Vec<u8> {
    let mut out = Vec::with_capacity(6 + 64);
    out.extend_from_slice(PALETTE_MAGIC);
    out.push(1);
    for color in palette {
        out.extend_from_slice(&[color.r, color.g, color.b, color.a]);
    }
    out
}

pub fn decode_palette(bytes: &[u8]) -> Result<Palette16> {
    let mut r = Reader::new(bytes);
    if r.take(5)? != PALETTE_MAGIC {
        return Err(Error::Format("bad palette magic".to_string()));
    }
    let version = r.u8()?;
    if version != 1 {
        return Err(Error::Format(format!(
            "unsupported palette version {version}"
        )));
    }
    read_rgba_palette(&mut r)
}

// ---------------------------------------------------------------------------
// Run-length coding for 4-bit pixel indices.
//
// Short run:  count (1-15) in the high nibble, value in the low nibble.
// Long run:   0xF0 marker, then an 8-bit count (1-255), then the value in
//             the high nibble of the third byte.
//
// A short run of fifteen zeros would collide with the marker byte, so that
// one case is always emitted in long form.
// ---------------------------------------------------------------------------

const LONG_RUN_MARKER: u8 = 0xF0;

pub fn compress_indices(pixels: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < pixels.len() {
        let value = pixels[i] & 0x0F;
        let mut run = 1usize;
        while i + run < pixels.len() && pixels[i + run] & 0x0F == value && run < 255 {
            run += 1;
        }
        let short = (run as u8) << 4 | value;
        if run <= 15 && short != LONG_RUN_MARKER {
            out.push(short);
        } else {
            out.extend_from_slice(&[LONG_RUN_MARKER, run as u8, value << 4]);
        }
        i += run;
    }
    out
}

pub fn decompress_indices(data: &[u8], expected: usize) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(expected);
    let mut r = Reader::new(data);
    while r.pos < data.len() {
        let b = r.u8()?;
        let (count, value) = if b == LONG_RUN_MARKER {
            let count = r.u8()?;
            let value = r.u8()? >> 4;
            (count as usize, value)
        } else {
            ((b >> 4) as usize, b & 0x0F)
        };
        if count == 0 {
            return Err(Error::Format("zero-length run".to_string()));
        }
        out.extend(std::iter::repeat(value).take(count));
        if out.len() > expected {
            return Err(Error::SizeMismatch(format!(
                "run-length data expands past {expected} pixels"
            )));
        }
    }
    if out.len() != expected {
        return Err(Error::SizeMismatch(format!(
            "run-length data yields {} pixels, expected {expected}",
            out.len()
        )));
    }
    Ok(out)
}

/// Size of the compressed pixel stream for a canvas, without encoding the
/// surrounding container.
pub fn estimate_compressed_size(pixels: &[u8]) -> usize {
    compress_indices(pixels).len()
}

// ---------------------------------------------------------------------------
// SPRTZ containers.
//
// 16-byte header: "SPTZ", u16 version, u8 width, u8 height, u32 uncompressed
// size, u32 compressed size. v1 follows with 42 bytes of RGB for palette
// entries 2-15 and the compressed pixel stream. v2 inserts a palette-mode
// byte after the header: 0-31 references the standard palette library (no
// embedded palette), 0xFF embeds a custom palette as in v1.
// ---------------------------------------------------------------------------

fn write_sprtz_header(out: &mut Vec<u8>, version: u16, canvas: &SpriteCanvas, compressed: &[u8]) {
    out.extend_from_slice(SPRTZ_MAGIC);
    out.extend_from_slice(&version.to_le_bytes());
    out.push(canvas.width() as u8);
    out.push(canvas.height() as u8);
    out.extend_from_slice(&(canvas.pixels().len() as u32).to_le_bytes());
    out.extend_from_slice(&(compressed.len() as u32).to_le_bytes());
}

fn write_rgb_palette(out: &mut Vec<u8>, palette: &Palette16) {
    // Entries 0 and 1 are implicit.
    for color in &palette[2..] {
        out.extend_from_slice(&[color.r, color.g, color.b]);
    }
}

pub fn encode_sprtz_v1(canvas: &SpriteCanvas) -> Vec<u8> {
    let compressed = compress_indices(canvas.pixels());
    let mut out = Vec::with_capacity(16 + 42 + compressed.len());
    write_sprtz_header(&mut out, 1, canvas, &compressed);
    write_rgb_palette(&mut out, canvas.palette());
    out.extend_from_slice(&compressed);
    out
}

pub fn encode_sprtz_v2_custom(canvas: &SpriteCanvas) -> Vec<u8> {
    let compressed = compress_indices(canvas.pixels());
    let mut out = Vec::with_capacity(17 + 42 + compressed.len());
    write_sprtz_header(&mut out, 2, canvas, &compressed);
    out.push(PALETTE_MODE_CUSTOM);
    write_rgb_palette(&mut out, canvas.palette());
    out.extend_from_slice(&compressed);
    out
}

/// Encode with a standard-palette reference instead of an embedded palette.
/// The canvas palette itself is not stored; decoding reproduces the library
/// entry, which is intentionally lossy when the two have diverged.
pub fn encode_sprtz_v2_standard(canvas: &SpriteCanvas, palette_id: u8) -> Result<Vec<u8>> {
    if palette_id as usize >= STANDARD_PALETTE_COUNT {
        return Err(Error::Validation(format!(
            "standard palette id {palette_id} outside 0..={}",
            STANDARD_PALETTE_COUNT - 1
        )));
    }
    let compressed = compress_indices(canvas.pixels());
    let mut out = Vec::with_capacity(17 + compressed.len());
    write_sprtz_header(&mut out, 2, canvas, &compressed);
    out.push(palette_id);
    out.extend_from_slice(&compressed);
    Ok(out)
}

fn read_rgb_palette(r: &mut Reader) -> Result<Palette16> {
    let mut palette = [Color::TRANSPARENT; PALETTE_SIZE];
    palette[1] = Color::BLACK;
    for entry in &mut palette[2..] {
        let b = r.take(3)?;
        *entry = Color::opaque(b[0], b[1], b[2]);
    }
    Ok(palette)
}

/// Decode a SPRTZ container, either generation. A v1 stream decodes as a
/// custom palette; a v2 stream with a standard palette mode requires a
/// loaded [`PaletteLibrary`].
pub fn decode_sprtz(
    bytes: &[u8],
    library: Option<&PaletteLibrary>,
) -> Result<(SpriteCanvas, PaletteSource)> {
    let mut r = Reader::new(bytes);
    if r.take(4)? != SPRTZ_MAGIC {
        return Err(Error::Format("bad SPRTZ magic".to_string()));
    }
    let version = r.u16_le()?;
    if version != 1 && version != 2 {
        return Err(Error::Format(format!("unsupported SPRTZ version {version}")));
    }

    let width = r.u8()? as usize;
    let height = r.u8()? as usize;
    check_dimensions(width, height)?;
    let uncompressed_size = r.u32_le()? as usize;
    let compressed_size = r.u32_le()? as usize;
    if uncompressed_size != width * height {
        return Err(Error::SizeMismatch(format!(
            "declared uncompressed size {uncompressed_size} != {width}x{height}"
        )));
    }

    let (palette, source) = if version == 1 {
        (read_rgb_palette(&mut r)?, PaletteSource::Custom)
    } else {
        let mode = r.u8()?;
        if mode == PALETTE_MODE_CUSTOM {
            (read_rgb_palette(&mut r)?, PaletteSource::Custom)
        } else if (mode as usize) < STANDARD_PALETTE_COUNT {
            let library = library.ok_or(Error::LibraryNotLoaded)?;
            let palette = library
                .palette(mode)
                .ok_or_else(|| Error::Validation(format!("standard palette {mode} not found")))?;
            (*palette, PaletteSource::Standard(mode))
        } else {
            return Err(Error::Validation(format!(
                "palette mode {mode:#04x} outside 0..={} and not custom",
                STANDARD_PALETTE_COUNT - 1
            )));
        }
    };

    let compressed = r.take(compressed_size)?;
    let pixels = decompress_indices(compressed, uncompressed_size)?;
    check_indices(&pixels)?;
    Ok((
        SpriteCanvas::from_parts(width, height, pixels, palette),
        source,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::default_palette;

    fn patterned_canvas(width: usize, height: usize) -> SpriteCanvas {
        let mut canvas = SpriteCanvas::new(width, height);
        for y in 0..height {
            for x in 0..width {
                canvas.set_pixel(x, y, ((x / 3 + y / 2) % 16) as u8);
            }
        }
        let mut palette = default_palette();
        palette[5] = Color::opaque(200, 40, 10);
        canvas.set_palette(palette);
        canvas
    }

    #[test]
    fn rle_round_trip() {
        let pixels: Vec<u8> = (0..1600).map(|i| ((i / 17) % 16) as u8).collect();
        let compressed = compress_indices(&pixels);
        let restored = decompress_indices(&compressed, pixels.len()).unwrap();
        assert_eq!(restored, pixels);
    }

    #[test]
    fn rle_long_runs() {
        let pixels = vec![7u8; 300];
        let compressed = compress_indices(&pixels);
        // 255 + 45, both long form.
        assert_eq!(compressed, vec![0xF0, 255, 0x70, 0xF0, 45, 0x70]);
        assert_eq!(decompress_indices(&compressed, 300).unwrap(), pixels);
    }

    #[test]
    fn rle_fifteen_zeros_avoids_marker() {
        let pixels = vec![0u8; 15];
        let compressed = compress_indices(&pixels);
        assert_eq!(compressed, vec![0xF0, 15, 0x00]);
        assert_eq!(decompress_indices(&compressed, 15).unwrap(), pixels);
    }

    #[test]
    fn rle_rejects_length_mismatch() {
        let compressed = compress_indices(&[1, 1, 1]);
        assert!(matches!(
            decompress_indices(&compressed, 4),
            Err(Error::SizeMismatch(_))
        ));
        assert!(matches!(
            decompress_indices(&compressed, 2),
            Err(Error::SizeMismatch(_))
        ));
    }

    #[test]
    fn sprite_file_round_trip() {
        let canvas = patterned_canvas(11, 7);
        let decoded = decode_sprite(&encode_sprite(&canvas)).unwrap();
        assert_eq!(decoded, canvas);
    }

    #[test]
    fn sprite_file_rejects_bad_magic() {
        let mut bytes = encode_sprite(&patterned_canvas(4, 4));
        bytes[0] = b'X';
        assert!(matches!(decode_sprite(&bytes), Err(Error::Format(_))));
    }

    #[test]
    fn palette_file_round_trip() {
        let mut palette = default_palette();
        palette[9] = Color::new(1, 2, 3, 200);
        let decoded = decode_palette(&encode_palette(&palette)).unwrap();
        assert_eq!(decoded, palette);
    }

    #[test]
    fn sprtz_v1_round_trip() {
        for size in [8, 16, 40] {
            let canvas = patterned_canvas(size, size);
            let (decoded, source) = decode_sprtz(&encode_sprtz_v1(&canvas), None).unwrap();
            assert_eq!(source, PaletteSource::Custom);
            assert_eq!(decoded.pixels(), canvas.pixels());
            assert_eq!(decoded.palette()[2..], canvas.palette()[2..]);
        }
    }

    #[test]
    fn sprtz_v2_custom_round_trip() {
        let canvas = patterned_canvas(16, 9);
        let (decoded, source) = decode_sprtz(&encode_sprtz_v2_custom(&canvas), None).unwrap();
        assert_eq!(source, PaletteSource::Custom);
        assert_eq!(decoded, canvas);
    }

    #[test]
    fn sprtz_rejects_size_mismatch() {
        let mut bytes = encode_sprtz_v1(&patterned_canvas(8, 8));
        // Corrupt the uncompressed-size field.
        bytes[8] = 63;
        assert!(matches!(
            decode_sprtz(&bytes, None),
            Err(Error::SizeMismatch(_))
        ));
    }

    #[test]
    fn sprtz_v2_standard_requires_library() {
        let canvas = patterned_canvas(8, 8);
        let bytes = encode_sprtz_v2_standard(&canvas, 5).unwrap();
        assert!(matches!(
            decode_sprtz(&bytes, None),
            Err(Error::LibraryNotLoaded)
        ));
    }

    #[test]
    fn sprtz_v2_standard_rejects_out_of_range_id() {
        let canvas = patterned_canvas(8, 8);
        assert!(matches!(
            encode_sprtz_v2_standard(&canvas, 32),
            Err(Error::Validation(_))
        ));
    }
}
