//! Core of a small indexed-sprite editor: a 16-color canvas model, a
//! median-cut quantizer, a staged PNG import pipeline, a catalog of standard
//! palettes, and binary container codecs with run-length compression.

pub mod codec;
pub mod error;
pub mod import;
pub mod library;
pub mod persist;
pub mod quantize;
pub mod raster;
pub mod state;

pub use codec::PaletteSource;
pub use error::{Error, Result};
pub use import::ImportSession;
pub use library::{PaletteInfo, PaletteLibrary, PaletteMatch, STANDARD_PALETTE_COUNT};
pub use state::{Color, ColorIdx, Palette16, SpriteCanvas, MAX_SPRITE_SIZE, PALETTE_SIZE};
