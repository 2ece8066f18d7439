use hashbrown::hash_map::Entry;
use hashbrown::HashMap;
use itertools::Itertools;

use crate::state::Color;

/// A distinct color and how many pixels carry it.
#[derive(Copy, Clone, Debug)]
pub struct HistogramEntry {
    pub color: Color,
    pub count: u32,
}

/// Count distinct opaque colors in an RGBA buffer. Pixels with alpha below
/// 128 are skipped; transparency is handled by the reserved palette index 0,
/// not by the quantizer. Entries keep first-seen order so quantization is
/// deterministic.
pub fn build_histogram(rgba: &[u8]) -> Vec<HistogramEntry> {
    let mut slot: HashMap<Color, usize> = HashMap::new();
    let mut entries: Vec<HistogramEntry> = Vec::new();
    for px in rgba.chunks_exact(4) {
        if px[3] < 128 {
            continue;
        }
        let color = Color::opaque(px[0], px[1], px[2]);
        match slot.entry(color) {
            Entry::Occupied(occupied) => entries[*occupied.get()].count += 1,
            Entry::Vacant(vacant) => {
                vacant.insert(entries.len());
                entries.push(HistogramEntry { color, count: 1 });
            }
        }
    }
    entries
}

fn channel(color: Color, axis: usize) -> u8 {
    match axis {
        0 => color.r,
        1 => color.g,
        _ => color.b,
    }
}

/// Widest channel range across a bucket: (range, axis).
fn widest_axis(bucket: &[HistogramEntry]) -> (u8, usize) {
    let mut best = (0u8, 0usize);
    for axis in 0..3 {
        let (min, max) = bucket
            .iter()
            .map(|e| channel(e.color, axis))
            .minmax()
            .into_option()
            .unwrap_or((0, 0));
        let range = max - min;
        if range > best.0 {
            best = (range, axis);
        }
    }
    best
}

/// Count-weighted channel average of a bucket.
fn representative(bucket: &[HistogramEntry]) -> Color {
    let mut sums = [0u64; 3];
    let mut total = 0u64;
    for entry in bucket {
        let w = entry.count as u64;
        sums[0] += entry.color.r as u64 * w;
        sums[1] += entry.color.g as u64 * w;
        sums[2] += entry.color.b as u64 * w;
        total += w;
    }
    if total == 0 {
        return Color::BLACK;
    }
    Color::opaque(
        (sums[0] / total) as u8,
        (sums[1] / total) as u8,
        (sums[2] / total) as u8,
    )
}

/// Reduce a histogram to at most `max_colors` representative colors by
/// median cut. Buckets are kept on an explicit worklist rather than split
/// recursively; each step splits the bucket with the widest channel range at
/// its count-weighted median, so each half carries roughly equal pixel
/// weight. A bucket with fewer than two distinct colors is a finished leaf.
///
/// The result has at most `max_colors` entries and never more than the
/// number of distinct colors in the histogram.
pub fn median_cut(histogram: Vec<HistogramEntry>, max_colors: usize) -> Vec<Color> {
    if histogram.is_empty() || max_colors == 0 {
        return Vec::new();
    }

    let mut buckets: Vec<Vec<HistogramEntry>> = vec![histogram];
    while buckets.len() < max_colors {
        // Split the splittable bucket with the widest channel range.
        let candidate = buckets
            .iter()
            .enumerate()
            .filter(|(_, b)| b.len() >= 2)
            .max_by_key(|(i, b)| (widest_axis(b).0, usize::MAX - i))
            .map(|(i, _)| i);
        let Some(idx) = candidate else {
            break;
        };

        let mut bucket = buckets.remove(idx);
        let (_, axis) = widest_axis(&bucket);
        bucket.sort_by_key(|e| {
            let c = e.color;
            (channel(c, axis), c.r, c.g, c.b)
        });

        let total: u64 = bucket.iter().map(|e| e.count as u64).sum();
        let half = total / 2;
        let mut accumulated = 0u64;
        let mut split_at = 1;
        for (i, entry) in bucket.iter().enumerate() {
            accumulated += entry.count as u64;
            if accumulated >= half && i + 1 < bucket.len() {
                split_at = i + 1;
                break;
            }
        }
        split_at = split_at.clamp(1, bucket.len() - 1);

        let right = bucket.split_off(split_at);
        buckets.insert(idx, bucket);
        buckets.insert(idx + 1, right);
    }

    buckets.iter().map(|b| representative(b)).collect()
}

/// Quantize an RGBA buffer straight to at most `max_colors` colors.
pub fn extract_palette(rgba: &[u8], max_colors: usize) -> Vec<Color> {
    median_cut(build_histogram(rgba), max_colors)
}

/// Squared Euclidean distance over RGB; alpha is ignored.
pub fn color_distance(a: Color, b: Color) -> i32 {
    let dr = a.r as i32 - b.r as i32;
    let dg = a.g as i32 - b.g as i32;
    let db = a.b as i32 - b.b as i32;
    dr * dr + dg * dg + db * db
}

/// Index of the palette entry nearest to `color`. Ties resolve to the
/// lowest index. Returns 0 for an empty palette.
pub fn nearest_index(color: Color, palette: &[Color]) -> usize {
    let mut best_idx = 0;
    let mut best_dist = i32::MAX;
    for (i, &entry) in palette.iter().enumerate() {
        let dist = color_distance(color, entry);
        if dist < best_dist {
            best_dist = dist;
            best_idx = i;
        }
    }
    best_idx
}

// Scoring constants tuned against the standard palette catalog. Kept
// byte-compatible with existing stored choices; adjust here first if
// matching feels too strict or too loose.
pub(crate) const EXACT_MATCH_BONUS: i64 = 10_000;
pub(crate) const CLOSE_MATCH_BONUS: i64 = 1_000;
pub(crate) const CLOSE_MATCH_THRESHOLD: i32 = 100;

/// How well `candidate` covers the colors of a custom palette.
#[derive(Copy, Clone, Debug)]
pub struct PaletteScore {
    pub total_distance: i64,
    pub exact_matches: u32,
    pub close_matches: u32,
    pub unique_colors: u32,
    /// Lower is better; exact and close matches are rewarded heavily so
    /// palettes that already contain the needed colors win.
    pub score: i64,
}

/// Score how well `candidate` represents `custom_colors`. Input colors are
/// deduplicated by exact equality first, so the score is invariant under
/// reordering and duplication of the input.
pub fn score_palette_match(custom_colors: &[Color], candidate: &[Color]) -> PaletteScore {
    let unique: Vec<Color> = custom_colors.iter().copied().unique().collect();

    let mut total_distance = 0i64;
    let mut exact_matches = 0u32;
    let mut close_matches = 0u32;
    for &color in &unique {
        let min_dist = candidate
            .iter()
            .map(|&c| color_distance(color, c))
            .min()
            .unwrap_or(i32::MAX);
        total_distance += min_dist as i64;
        if min_dist == 0 {
            exact_matches += 1;
        } else if min_dist < CLOSE_MATCH_THRESHOLD {
            close_matches += 1;
        }
    }

    let score = total_distance
        - exact_matches as i64 * EXACT_MATCH_BONUS
        - close_matches as i64 * CLOSE_MATCH_BONUS;
    PaletteScore {
        total_distance,
        exact_matches,
        close_matches,
        unique_colors: unique.len() as u32,
        score,
    }
}
