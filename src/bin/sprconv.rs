use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use directories::ProjectDirs;
use log::info;

use sprite_lab::{persist, PaletteLibrary, SpriteCanvas, MAX_SPRITE_SIZE};

#[derive(Parser)]
#[command(name = "sprconv", about = "Convert between PNG images and sprite containers")]
struct Args {
    /// Standard palette library file (.json or .pal). Defaults to
    /// standard_palettes.json in the user data directory.
    #[arg(long, global = true)]
    library: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Import a PNG and write a sprite container.
    Import {
        input: PathBuf,
        output: PathBuf,
        /// Maximum sprite width.
        #[arg(long, default_value_t = MAX_SPRITE_SIZE)]
        max_width: usize,
        /// Maximum sprite height.
        #[arg(long, default_value_t = MAX_SPRITE_SIZE)]
        max_height: usize,
        /// Encode the output as a compressed container referencing this
        /// standard palette instead of embedding one.
        #[arg(long)]
        standard_palette: Option<u8>,
    },
    /// Export a sprite container as a PNG.
    Export {
        input: PathBuf,
        output: PathBuf,
        /// Integer upscale factor.
        #[arg(long, default_value_t = 1)]
        scale: usize,
    },
    /// Report the closest standard palette to a sprite's colors.
    Closest { input: PathBuf },
}

fn default_library_path() -> Option<PathBuf> {
    let dirs = ProjectDirs::from("", "", "sprite-lab")?;
    Some(dirs.data_dir().join("standard_palettes.json"))
}

fn load_library(explicit: Option<&Path>) -> Result<Option<PaletteLibrary>> {
    let path = match explicit {
        Some(p) => p.to_path_buf(),
        None => match default_library_path() {
            Some(p) if p.is_file() => p,
            _ => return Ok(None),
        },
    };
    let library = PaletteLibrary::load(&path)
        .with_context(|| format!("loading palette library {}", path.display()))?;
    Ok(Some(library))
}

fn load_any_sprite(path: &Path, library: Option<&PaletteLibrary>) -> Result<SpriteCanvas> {
    let canvas = match path.extension().and_then(|e| e.to_str()) {
        Some("sprtz") => persist::load_sprtz(path, library)?.0,
        _ => persist::load_sprite(path)?,
    };
    Ok(canvas)
}

fn main() -> Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();
    let args = Args::parse();
    let library = load_library(args.library.as_deref())?;

    match args.command {
        Command::Import {
            input,
            output,
            max_width,
            max_height,
            standard_palette,
        } => {
            let canvas = persist::import_png(&input, max_width, max_height)
                .with_context(|| format!("importing {}", input.display()))?;
            match (
                output.extension().and_then(|e| e.to_str()),
                standard_palette,
            ) {
                (Some("sprtz"), Some(id)) => {
                    persist::save_sprtz_v2_standard(&output, &canvas, id)?
                }
                (Some("sprtz"), None) => persist::save_sprtz_v2_custom(&output, &canvas)?,
                (_, Some(_)) => bail!("--standard-palette requires a .sprtz output"),
                _ => persist::save_sprite(&output, &canvas)?,
            }
        }
        Command::Export {
            input,
            output,
            scale,
        } => {
            let canvas = load_any_sprite(&input, library.as_ref())?;
            persist::export_png(&output, &canvas, scale)?;
        }
        Command::Closest { input } => {
            let library = match library {
                Some(l) => l,
                None => bail!("no standard palette library found; pass --library"),
            };
            let canvas = load_any_sprite(&input, Some(&library))?;
            match library.find_closest(&canvas.palette()[1..]) {
                Some(m) => {
                    let name = library
                        .info(m.id)
                        .map(|i| i.name.as_str())
                        .unwrap_or("?");
                    info!(
                        "closest standard palette: {} ({name}), total distance {}",
                        m.id, m.total_distance
                    );
                    println!("{}", m.id);
                }
                None => println!("no acceptable match"),
            }
        }
    }
    Ok(())
}
