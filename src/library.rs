use std::path::Path;

use log::info;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::quantize::score_palette_match;
use crate::state::{Color, Palette16, PALETTE_SIZE};

pub const STANDARD_PALETTE_COUNT: usize = 32;

// Acceptance gate for closest-match lookups. A candidate is reported only
// when the average per-color distance is decent or the total distance is
// small relative to the number of distinct input colors.
const GOOD_MATCH_AVG_DISTANCE: i64 = 200;
const GREAT_MATCH_PER_COLOR: i64 = 50;

const CATEGORY_NAMES: [&str; 4] = ["retro", "biome", "themed", "utility"];

/// Descriptive metadata for one standard palette.
#[derive(Clone, Debug)]
pub struct PaletteInfo {
    pub id: u8,
    pub name: String,
    pub description: String,
    pub category: String,
}

/// Result of a closest-match query against the library.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PaletteMatch {
    pub id: u8,
    pub total_distance: i64,
}

/// The catalog of 32 standard 16-color palettes. Loaded once and passed by
/// reference wherever a standard-palette lookup is needed.
#[derive(Clone, Debug)]
pub struct PaletteLibrary {
    palettes: Vec<Palette16>,
    info: Vec<PaletteInfo>,
}

#[derive(Deserialize)]
struct LibraryDoc {
    palettes: Vec<PaletteDoc>,
}

#[derive(Deserialize)]
struct PaletteDoc {
    id: i64,
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    category: String,
    colors: Option<Vec<ColorDoc>>,
}

#[derive(Deserialize)]
struct ColorDoc {
    r: u8,
    g: u8,
    b: u8,
    a: Option<u8>,
}

impl PaletteLibrary {
    /// Load the library from a file, dispatching on extension. Files with an
    /// unrecognized extension are tried as JSON first, then binary.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        let library = match ext.as_deref() {
            Some("json") => Self::from_json_slice(&bytes)?,
            Some("pal") => Self::from_binary_slice(&bytes)?,
            _ => Self::from_json_slice(&bytes)
                .or_else(|_| Self::from_binary_slice(&bytes))?,
        };
        info!(
            "Loaded standard palette library from {}",
            path.display()
        );
        Ok(library)
    }

    /// Parse the JSON catalog. Validation is all-or-nothing: any problem
    /// leaves no partially loaded library behind.
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self> {
        let doc: LibraryDoc = serde_json::from_slice(bytes)
            .map_err(|e| Error::Format(format!("palette library JSON: {e}")))?;

        if doc.palettes.len() != STANDARD_PALETTE_COUNT {
            return Err(Error::Validation(format!(
                "palette library has {} palettes, expected {STANDARD_PALETTE_COUNT}",
                doc.palettes.len()
            )));
        }

        let mut palettes = vec![[Color::TRANSPARENT; PALETTE_SIZE]; STANDARD_PALETTE_COUNT];
        let mut info: Vec<Option<PaletteInfo>> = vec![None; STANDARD_PALETTE_COUNT];
        for palette_doc in doc.palettes {
            let id = palette_doc.id;
            if id < 0 || id >= STANDARD_PALETTE_COUNT as i64 {
                return Err(Error::Validation(format!(
                    "palette id {id} outside 0..={}",
                    STANDARD_PALETTE_COUNT - 1
                )));
            }
            let id = id as usize;
            if info[id].is_some() {
                return Err(Error::Validation(format!("duplicate palette id {id}")));
            }

            let colors = palette_doc
                .colors
                .ok_or_else(|| Error::Validation(format!("palette {id} is missing colors")))?;
            if colors.len() != PALETTE_SIZE {
                return Err(Error::Validation(format!(
                    "palette {id} has {} colors, expected {PALETTE_SIZE}",
                    colors.len()
                )));
            }
            for (slot, doc) in palettes[id].iter_mut().zip(&colors) {
                // In this schema alpha 0 (or omitted) means fully opaque;
                // transparency comes from the reserved index convention.
                let a = match doc.a {
                    None | Some(0) => 255,
                    Some(a) => a,
                };
                *slot = Color::new(doc.r, doc.g, doc.b, a);
            }
            info[id] = Some(PaletteInfo {
                id: id as u8,
                name: palette_doc.name,
                description: palette_doc.description,
                category: palette_doc.category,
            });
        }

        let info = info.into_iter().flatten().collect();
        Ok(PaletteLibrary { palettes, info })
    }

    /// Parse the raw binary catalog: 32 palettes of 16 RGBA colors back to
    /// back, 2048 bytes. The binary form carries no metadata, so names and
    /// categories are synthesized.
    pub fn from_binary_slice(bytes: &[u8]) -> Result<Self> {
        let expected = STANDARD_PALETTE_COUNT * PALETTE_SIZE * 4;
        if bytes.len() != expected {
            return Err(Error::SizeMismatch(format!(
                "binary palette library is {} bytes, expected {expected}",
                bytes.len()
            )));
        }

        let mut palettes = Vec::with_capacity(STANDARD_PALETTE_COUNT);
        let mut info = Vec::with_capacity(STANDARD_PALETTE_COUNT);
        for (id, chunk) in bytes.chunks_exact(PALETTE_SIZE * 4).enumerate() {
            let mut palette = [Color::TRANSPARENT; PALETTE_SIZE];
            for (slot, px) in palette.iter_mut().zip(chunk.chunks_exact(4)) {
                *slot = Color::new(px[0], px[1], px[2], px[3]);
            }
            palettes.push(palette);
            info.push(PaletteInfo {
                id: id as u8,
                name: "Standard Palette".to_string(),
                description: "Binary loaded palette".to_string(),
                category: CATEGORY_NAMES[id / 8].to_string(),
            });
        }
        Ok(PaletteLibrary { palettes, info })
    }

    pub fn palette(&self, id: u8) -> Option<&Palette16> {
        self.palettes.get(id as usize)
    }

    pub fn info(&self, id: u8) -> Option<&PaletteInfo> {
        self.info.get(id as usize)
    }

    pub fn len(&self) -> usize {
        self.palettes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.palettes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PaletteInfo, &Palette16)> {
        self.info.iter().zip(self.palettes.iter())
    }

    pub fn ids_in_category<'a>(&'a self, category: &'a str) -> impl Iterator<Item = u8> + 'a {
        self.info
            .iter()
            .filter(move |i| i.category == category)
            .map(|i| i.id)
    }

    /// Find the standard palette best covering `colors`, or None when no
    /// candidate passes the acceptance gate. Ties resolve to the lowest id.
    pub fn find_closest(&self, colors: &[Color]) -> Option<PaletteMatch> {
        let mut best: Option<(i64, PaletteMatch, i64)> = None;
        for (id, palette) in self.palettes.iter().enumerate() {
            let score = score_palette_match(colors, palette);
            let entry = (
                score.score,
                PaletteMatch {
                    id: id as u8,
                    total_distance: score.total_distance,
                },
                score.unique_colors as i64,
            );
            if best.as_ref().map_or(true, |b| entry.0 < b.0) {
                best = Some(entry);
            }
        }
        let (_, matched, unique_colors) = best?;
        if unique_colors == 0 {
            return None;
        }
        let avg = matched.total_distance / unique_colors;
        if avg < GOOD_MATCH_AVG_DISTANCE
            || matched.total_distance < GREAT_MATCH_PER_COLOR * unique_colors
        {
            Some(matched)
        } else {
            None
        }
    }
}
