use std::io::Cursor;

use crate::error::{Error, Result};

/// Decode a PNG into an RGBA8 buffer. Paletted, grayscale, and 16-bit
/// images are normalized by the decoder.
pub fn decode_png(bytes: &[u8]) -> Result<(Vec<u8>, usize, usize)> {
    let mut decoder = png::Decoder::new(Cursor::new(bytes));
    decoder.set_transformations(
        png::Transformations::EXPAND | png::Transformations::STRIP_16 | png::Transformations::ALPHA,
    );
    let mut reader = decoder
        .read_info()
        .map_err(|e| Error::Format(format!("png decode: {e}")))?;
    let mut buf = vec![0u8; reader.output_buffer_size()];
    let info = reader
        .next_frame(&mut buf)
        .map_err(|e| Error::Format(format!("png decode: {e}")))?;
    buf.truncate(info.buffer_size());

    let width = info.width as usize;
    let height = info.height as usize;
    let rgba = match info.color_type {
        png::ColorType::Rgba => buf,
        png::ColorType::GrayscaleAlpha => {
            let mut rgba = Vec::with_capacity(width * height * 4);
            for px in buf.chunks_exact(2) {
                rgba.extend_from_slice(&[px[0], px[0], px[0], px[1]]);
            }
            rgba
        }
        other => {
            return Err(Error::Format(format!(
                "unexpected color type after expansion: {other:?}"
            )))
        }
    };
    Ok((rgba, width, height))
}

/// Encode an RGBA8 buffer as a PNG.
pub fn encode_png(rgba: &[u8], width: usize, height: usize) -> Result<Vec<u8>> {
    check_buffer(rgba, width, height)?;
    let mut out = Vec::new();
    let mut encoder = png::Encoder::new(&mut out, width as u32, height as u32);
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder
        .write_header()
        .map_err(|e| Error::Format(format!("png encode: {e}")))?;
    writer
        .write_image_data(rgba)
        .map_err(|e| Error::Format(format!("png encode: {e}")))?;
    writer
        .finish()
        .map_err(|e| Error::Format(format!("png encode: {e}")))?;
    Ok(out)
}

fn check_buffer(rgba: &[u8], width: usize, height: usize) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(Error::Dimension(format!(
            "image dimensions must be positive, got {width}x{height}"
        )));
    }
    if rgba.len() != width * height * 4 {
        return Err(Error::Validation(format!(
            "RGBA buffer is {} bytes, expected {} for {width}x{height}",
            rgba.len(),
            width * height * 4
        )));
    }
    Ok(())
}

/// Resize the source region starting at (offset_x, offset_y) to the target
/// dimensions with an alpha-aware box filter. Color channels are weighted by
/// alpha so transparent source pixels do not bleed halos into the result.
/// Integer arithmetic only, so output is deterministic across platforms.
pub fn resize_rgba(
    src: &[u8],
    src_width: usize,
    src_height: usize,
    offset_x: usize,
    offset_y: usize,
    dst_width: usize,
    dst_height: usize,
) -> Result<Vec<u8>> {
    check_buffer(src, src_width, src_height)?;
    if dst_width == 0 || dst_height == 0 {
        return Err(Error::Dimension(format!(
            "target dimensions must be positive, got {dst_width}x{dst_height}"
        )));
    }
    if offset_x >= src_width || offset_y >= src_height {
        return Err(Error::Dimension(format!(
            "offset ({offset_x},{offset_y}) outside {src_width}x{src_height} source"
        )));
    }

    let region_w = src_width - offset_x;
    let region_h = src_height - offset_y;
    let mut dst = Vec::with_capacity(dst_width * dst_height * 4);

    for dy in 0..dst_height {
        let sy0 = offset_y + dy * region_h / dst_height;
        let sy1 = (offset_y + (dy + 1) * region_h / dst_height).max(sy0 + 1);
        for dx in 0..dst_width {
            let sx0 = offset_x + dx * region_w / dst_width;
            let sx1 = (offset_x + (dx + 1) * region_w / dst_width).max(sx0 + 1);

            let mut sum = [0u64; 3];
            let mut alpha_sum = 0u64;
            let mut samples = 0u64;
            for sy in sy0..sy1.min(src_height) {
                for sx in sx0..sx1.min(src_width) {
                    let o = (sy * src_width + sx) * 4;
                    let a = src[o + 3] as u64;
                    sum[0] += src[o] as u64 * a;
                    sum[1] += src[o + 1] as u64 * a;
                    sum[2] += src[o + 2] as u64 * a;
                    alpha_sum += a;
                    samples += 1;
                }
            }
            if alpha_sum == 0 {
                dst.extend_from_slice(&[0, 0, 0, 0]);
            } else {
                dst.extend_from_slice(&[
                    (sum[0] / alpha_sum) as u8,
                    (sum[1] / alpha_sum) as u8,
                    (sum[2] / alpha_sum) as u8,
                    (alpha_sum / samples) as u8,
                ]);
            }
        }
    }
    Ok(dst)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn png_round_trip() {
        let rgba: Vec<u8> = (0..4 * 4).flat_map(|i| [i as u8 * 16, 0, 255, 255]).collect();
        let bytes = encode_png(&rgba, 4, 4).unwrap();
        let (decoded, w, h) = decode_png(&bytes).unwrap();
        assert_eq!((w, h), (4, 4));
        assert_eq!(decoded, rgba);
    }

    #[test]
    fn resize_solid_color_stays_solid() {
        let src = vec![200u8, 100, 50, 255].repeat(8 * 8);
        let dst = resize_rgba(&src, 8, 8, 0, 0, 3, 3).unwrap();
        for px in dst.chunks_exact(4) {
            assert_eq!(px, &[200, 100, 50, 255]);
        }
    }

    #[test]
    fn resize_preserves_full_transparency() {
        let src = vec![0u8; 6 * 6 * 4];
        let dst = resize_rgba(&src, 6, 6, 0, 0, 2, 2).unwrap();
        assert!(dst.iter().all(|&b| b == 0));
    }

    #[test]
    fn resize_is_deterministic() {
        let src: Vec<u8> = (0..10 * 10 * 4).map(|i| (i * 31 % 256) as u8).collect();
        let a = resize_rgba(&src, 10, 10, 0, 0, 4, 7).unwrap();
        let b = resize_rgba(&src, 10, 10, 0, 0, 4, 7).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn resize_rejects_undersized_buffer() {
        let src = vec![0u8; 10];
        assert!(resize_rgba(&src, 4, 4, 0, 0, 2, 2).is_err());
    }
}
