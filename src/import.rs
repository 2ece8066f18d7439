use log::{debug, info};

use crate::error::{Error, Result};
use crate::quantize::{extract_palette, nearest_index};
use crate::raster;
use crate::state::{Color, SpriteCanvas, MAX_SPRITE_SIZE, PALETTE_SIZE};

/// Colors extracted by the quantizer; indices 0 and 1 stay reserved for
/// transparent and opaque black.
pub const EXTRACTED_COLORS: usize = PALETTE_SIZE - 2;

/// Filler for palette slots the quantizer could not populate.
const FILLER_GRAY: Color = Color::opaque(128, 128, 128);

/// A pending image import. The session holds the decoded source and the pan
/// and trim state; while it exists the target canvas shows a preview built
/// by [`resample`](Self::resample). The session ends with [`commit`]
/// (keeping the canvas) or [`cancel`] (clearing it).
///
/// [`commit`]: Self::commit
/// [`cancel`]: Self::cancel
pub struct ImportSession {
    source: Vec<u8>,
    source_width: usize,
    source_height: usize,
    offset_x: i32,
    offset_y: i32,
    target_width: usize,
    target_height: usize,
}

impl ImportSession {
    /// Start an import: fit the source into the bounding box preserving
    /// aspect ratio, resize the canvas to the fitted size, and run the
    /// first resample.
    pub fn start(
        source: Vec<u8>,
        source_width: usize,
        source_height: usize,
        box_width: usize,
        box_height: usize,
        canvas: &mut SpriteCanvas,
    ) -> Result<ImportSession> {
        if source_width == 0 || source_height == 0 {
            return Err(Error::Dimension(format!(
                "source dimensions must be positive, got {source_width}x{source_height}"
            )));
        }
        if source.len() != source_width * source_height * 4 {
            return Err(Error::Validation(format!(
                "source buffer is {} bytes, expected {} for {source_width}x{source_height}",
                source.len(),
                source_width * source_height * 4
            )));
        }
        if box_width == 0 || box_height == 0 || box_width > MAX_SPRITE_SIZE || box_height > MAX_SPRITE_SIZE {
            return Err(Error::Dimension(format!(
                "bounding box must be within 1..={MAX_SPRITE_SIZE}, got {box_width}x{box_height}"
            )));
        }

        let aspect = source_width as f32 / source_height as f32;
        let (mut target_width, mut target_height);
        if source_width > source_height {
            target_width = box_width;
            target_height = (box_width as f32 / aspect) as usize;
            if target_height > box_height {
                target_height = box_height;
                target_width = (box_height as f32 * aspect) as usize;
            }
        } else {
            target_height = box_height;
            target_width = (box_height as f32 * aspect) as usize;
            if target_width > box_width {
                target_width = box_width;
                target_height = (box_width as f32 / aspect) as usize;
            }
        }
        target_width = target_width.max(1);
        target_height = target_height.max(1);

        info!(
            "Starting import: source {source_width}x{source_height}, \
             target {target_width}x{target_height}"
        );
        canvas.resize(target_width, target_height);

        let session = ImportSession {
            source,
            source_width,
            source_height,
            offset_x: 0,
            offset_y: 0,
            target_width,
            target_height,
        };
        session.resample(canvas)?;
        Ok(session)
    }

    pub fn source_size(&self) -> (usize, usize) {
        (self.source_width, self.source_height)
    }

    pub fn target_size(&self) -> (usize, usize) {
        (self.target_width, self.target_height)
    }

    pub fn offset(&self) -> (i32, i32) {
        (self.offset_x, self.offset_y)
    }

    /// Pan by a sprite-space delta. The delta is scaled into source space
    /// by the source/target ratio and the resulting offset clamped to keep
    /// the target window inside the source.
    pub fn shift(&mut self, dx: i32, dy: i32, canvas: &mut SpriteCanvas) -> Result<()> {
        let scale_x = self.source_width as f32 / self.target_width as f32;
        let scale_y = self.source_height as f32 / self.target_height as f32;
        let src_dx = (dx as f32 * scale_x) as i32;
        let src_dy = (dy as f32 * scale_y) as i32;
        debug!("shift ({dx},{dy}) sprite space -> ({src_dx},{src_dy}) source space");

        self.offset_x = self.offset_x.saturating_add(src_dx);
        self.offset_y = self.offset_y.saturating_add(src_dy);
        self.clamp_offset();
        self.resample(canvas)
    }

    /// Cut a fixed number of pixels off each edge of the source image. The
    /// trim is rejected, leaving the session unchanged, if it would reduce
    /// either source dimension below 1.
    pub fn trim(
        &mut self,
        left: usize,
        right: usize,
        top: usize,
        bottom: usize,
        canvas: &mut SpriteCanvas,
    ) -> Result<()> {
        let new_width = left
            .checked_add(right)
            .and_then(|cut| self.source_width.checked_sub(cut))
            .filter(|&w| w >= 1);
        let new_height = top
            .checked_add(bottom)
            .and_then(|cut| self.source_height.checked_sub(cut))
            .filter(|&h| h >= 1);
        let (Some(new_width), Some(new_height)) = (new_width, new_height) else {
            return Err(Error::Dimension(format!(
                "trim L{left} R{right} T{top} B{bottom} leaves nothing of a \
                 {}x{} image",
                self.source_width, self.source_height
            )));
        };

        let mut trimmed = Vec::with_capacity(new_width * new_height * 4);
        for y in 0..new_height {
            let row_start = ((top + y) * self.source_width + left) * 4;
            trimmed.extend_from_slice(&self.source[row_start..row_start + new_width * 4]);
        }
        self.source = trimmed;
        self.source_width = new_width;
        self.source_height = new_height;
        self.clamp_offset();
        debug!("trimmed source to {new_width}x{new_height}");
        self.resample(canvas)
    }

    /// Finish the import, keeping the resampled canvas.
    pub fn commit(self) {
        info!("import committed");
    }

    /// Abandon the import. The canvas is cleared to its empty default, not
    /// reverted to its previous content.
    pub fn cancel(self, canvas: &mut SpriteCanvas) {
        canvas.clear();
        info!("import cancelled");
    }

    fn clamp_offset(&mut self) {
        let max_x = self.source_width.saturating_sub(self.target_width) as i32;
        let max_y = self.source_height.saturating_sub(self.target_height) as i32;
        self.offset_x = self.offset_x.clamp(0, max_x);
        self.offset_y = self.offset_y.clamp(0, max_y);
    }

    /// Rebuild the canvas from the current session state. The full pipeline
    /// reruns on every pan or trim; nothing is cached between runs.
    pub fn resample(&self, canvas: &mut SpriteCanvas) -> Result<()> {
        // Step 1: quantize a copy of the source to 4 bits per channel.
        let mut work = self.source.clone();
        quantize_channels(&mut work);
        debug!("resample step 1: quantized {} source pixels", work.len() / 4);

        // Step 2: the top-left pixel picks the background color; every
        // pixel matching it (alpha ignored) becomes transparent black. This
        // is a global key, not a flood fill.
        let bg = [work[0], work[1], work[2]];
        let mut keyed = 0usize;
        for px in work.chunks_exact_mut(4) {
            if px[0] == bg[0] && px[1] == bg[1] && px[2] == bg[2] {
                px.copy_from_slice(&[0, 0, 0, 0]);
                keyed += 1;
            }
        }
        debug!(
            "resample step 2: background ({},{},{}) keyed {keyed} pixels",
            bg[0], bg[1], bg[2]
        );

        // Step 3: tight bounding box of the remaining content. An entirely
        // transparent image falls back to the full frame.
        let (crop_x, crop_y, crop_w, crop_h) =
            content_bounds(&work, self.source_width, self.source_height);
        let mut cropped = Vec::with_capacity(crop_w * crop_h * 4);
        for y in 0..crop_h {
            let row_start = ((crop_y + y) * self.source_width + crop_x) * 4;
            cropped.extend_from_slice(&work[row_start..row_start + crop_w * 4]);
        }
        debug!("resample step 3: cropped to {crop_w}x{crop_h} at ({crop_x},{crop_y})");

        // Step 4: resize the cropped content to the target dimensions.
        let resized = raster::resize_rgba(
            &cropped,
            crop_w,
            crop_h,
            0,
            0,
            self.target_width,
            self.target_height,
        )?;
        debug!(
            "resample step 4: resized to {}x{}",
            self.target_width, self.target_height
        );

        // Step 5: the resize filter reintroduces intermediate values, so
        // quantize again.
        let mut resized = resized;
        quantize_channels(&mut resized);
        debug!("resample step 5: re-quantized {} pixels", resized.len() / 4);

        // Step 6: extract up to 14 representative colors.
        let extracted = extract_palette(&resized, EXTRACTED_COLORS);
        debug!("resample step 6: extracted {} colors", extracted.len());

        // Step 7: build the final palette. Canvas dimensions are forced to
        // the target size in case they drifted.
        if canvas.width() != self.target_width || canvas.height() != self.target_height {
            canvas.resize(self.target_width, self.target_height);
        }
        canvas.set_palette_color(0, Color::TRANSPARENT);
        canvas.set_palette_color(1, Color::BLACK);
        for i in 0..EXTRACTED_COLORS {
            let color = extracted.get(i).copied().unwrap_or(FILLER_GRAY);
            canvas.set_palette_color(i + 2, color);
        }
        debug!("resample step 7: built 16-color palette");

        // Step 8: map every pixel to its nearest palette index. Transparent
        // pixels take index 0; opaque pixels match against entries 1..15 so
        // opaque black cannot lose a tie to the transparent slot.
        let opaque_entries: Vec<Color> = canvas.palette()[1..].to_vec();
        for y in 0..self.target_height {
            for x in 0..self.target_width {
                let o = (y * self.target_width + x) * 4;
                let idx = if resized[o + 3] < 128 {
                    0
                } else {
                    let color = Color::opaque(resized[o], resized[o + 1], resized[o + 2]);
                    1 + nearest_index(color, &opaque_entries) as u8
                };
                canvas.set_pixel(x, y, idx);
            }
        }
        debug!(
            "resample step 8: mapped {} pixels",
            self.target_width * self.target_height
        );
        Ok(())
    }
}

/// Drop each channel to its top 4 bits. Alpha is untouched.
fn quantize_channels(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        px[0] &= 0xF0;
        px[1] &= 0xF0;
        px[2] &= 0xF0;
    }
}

/// Bounding box (x, y, w, h) of pixels with non-zero alpha; the full frame
/// when everything is transparent.
fn content_bounds(rgba: &[u8], width: usize, height: usize) -> (usize, usize, usize, usize) {
    let mut min_x = width;
    let mut min_y = height;
    let mut max_x = 0usize;
    let mut max_y = 0usize;
    let mut found = false;
    for y in 0..height {
        for x in 0..width {
            if rgba[(y * width + x) * 4 + 3] != 0 {
                min_x = min_x.min(x);
                min_y = min_y.min(y);
                max_x = max_x.max(x);
                max_y = max_y.max(y);
                found = true;
            }
        }
    }
    if !found {
        return (0, 0, width, height);
    }
    (min_x, min_y, max_x - min_x + 1, max_y - min_y + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Solid `fill` image with a centered `content` rectangle.
    fn framed_source(
        width: usize,
        height: usize,
        fill: [u8; 4],
        content: [u8; 4],
        inset: usize,
    ) -> Vec<u8> {
        let mut rgba = Vec::with_capacity(width * height * 4);
        for y in 0..height {
            for x in 0..width {
                let inside = x >= inset && x < width - inset && y >= inset && y < height - inset;
                rgba.extend_from_slice(if inside { &content } else { &fill });
            }
        }
        rgba
    }

    #[test]
    fn start_fits_aspect_ratio() {
        let source = framed_source(32, 16, [255, 255, 255, 255], [200, 0, 0, 255], 4);
        let mut canvas = SpriteCanvas::default();
        let session = ImportSession::start(source, 32, 16, 16, 16, &mut canvas).unwrap();
        assert_eq!(session.target_size(), (16, 8));
        assert_eq!((canvas.width(), canvas.height()), (16, 8));
    }

    #[test]
    fn background_is_keyed_transparent() {
        let source = framed_source(16, 16, [255, 255, 255, 255], [200, 0, 0, 255], 4);
        let mut canvas = SpriteCanvas::default();
        let session = ImportSession::start(source, 16, 16, 16, 16, &mut canvas).unwrap();
        // The white frame is keyed out and cropped away; the red content
        // fills the target, so no pixel should be transparent.
        assert!(canvas.pixels().iter().all(|&p| p != 0));
        session.commit();
    }

    #[test]
    fn shift_zero_is_idempotent() {
        let source = framed_source(24, 24, [0, 0, 255, 255], [255, 200, 0, 255], 6);
        let mut canvas = SpriteCanvas::default();
        let mut session = ImportSession::start(source, 24, 24, 12, 12, &mut canvas).unwrap();
        session.shift(0, 0, &mut canvas).unwrap();
        let first = canvas.clone();
        session.shift(0, 0, &mut canvas).unwrap();
        assert_eq!(canvas, first);
    }

    #[test]
    fn offset_stays_clamped() {
        let source = framed_source(40, 40, [255, 255, 255, 255], [10, 10, 10, 255], 2);
        let mut canvas = SpriteCanvas::default();
        let mut session = ImportSession::start(source, 40, 40, 10, 10, &mut canvas).unwrap();
        session.shift(1000, -1000, &mut canvas).unwrap();
        let (ox, oy) = session.offset();
        assert_eq!(oy, 0);
        assert_eq!(ox, 30);
    }

    #[test]
    fn trim_guard_rejects_and_preserves_session() {
        let source = framed_source(8, 8, [255, 255, 255, 255], [0, 200, 0, 255], 2);
        let mut canvas = SpriteCanvas::default();
        let mut session = ImportSession::start(source, 8, 8, 8, 8, &mut canvas).unwrap();
        let before = canvas.clone();
        let err = session.trim(4, 4, 0, 0, &mut canvas).unwrap_err();
        assert!(matches!(err, Error::Dimension(_)));
        assert_eq!(session.source_size(), (8, 8));
        assert_eq!(canvas, before);
    }

    #[test]
    fn trim_guard_handles_huge_amounts() {
        let source = framed_source(8, 8, [255, 255, 255, 255], [0, 200, 0, 255], 2);
        let mut canvas = SpriteCanvas::default();
        let mut session = ImportSession::start(source, 8, 8, 8, 8, &mut canvas).unwrap();
        let before = canvas.clone();
        let err = session.trim(usize::MAX, 1, 0, 0, &mut canvas).unwrap_err();
        assert!(matches!(err, Error::Dimension(_)));
        let err = session.trim(0, 0, usize::MAX, usize::MAX, &mut canvas).unwrap_err();
        assert!(matches!(err, Error::Dimension(_)));
        assert_eq!(session.source_size(), (8, 8));
        assert_eq!(canvas, before);
    }

    #[test]
    fn repeated_extreme_shifts_stay_clamped() {
        let source = framed_source(40, 40, [255, 255, 255, 255], [10, 10, 10, 255], 2);
        let mut canvas = SpriteCanvas::default();
        let mut session = ImportSession::start(source, 40, 40, 10, 10, &mut canvas).unwrap();
        session.shift(i32::MAX, i32::MAX, &mut canvas).unwrap();
        session.shift(i32::MAX, 0, &mut canvas).unwrap();
        assert_eq!(session.offset(), (30, 30));
        session.shift(i32::MIN, i32::MIN, &mut canvas).unwrap();
        assert_eq!(session.offset(), (0, 0));
    }

    #[test]
    fn trim_shrinks_source_and_resamples() {
        let source = framed_source(16, 16, [255, 255, 255, 255], [0, 200, 0, 255], 2);
        let mut canvas = SpriteCanvas::default();
        let mut session = ImportSession::start(source, 16, 16, 8, 8, &mut canvas).unwrap();
        session.trim(2, 2, 2, 2, &mut canvas).unwrap();
        assert_eq!(session.source_size(), (12, 12));
    }

    #[test]
    fn cancel_clears_canvas() {
        let source = framed_source(16, 16, [255, 255, 255, 255], [200, 0, 0, 255], 4);
        let mut canvas = SpriteCanvas::default();
        let session = ImportSession::start(source, 16, 16, 16, 16, &mut canvas).unwrap();
        session.cancel(&mut canvas);
        assert!(canvas.pixels().iter().all(|&p| p == 0));
    }

    #[test]
    fn all_transparent_source_maps_to_empty_canvas() {
        // Solid color: the key wipes everything, the crop falls back to the
        // full frame, and every output pixel is transparent.
        let source = vec![90u8, 90, 90, 255].repeat(16 * 16);
        let mut canvas = SpriteCanvas::default();
        ImportSession::start(source, 16, 16, 16, 16, &mut canvas).unwrap();
        assert!(canvas.pixels().iter().all(|&p| p == 0));
    }
}
