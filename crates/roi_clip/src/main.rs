mod clip;
mod retile;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use roi_engine::{Catalog, EngineConfig};
use std::fs::File;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "roi_clip", version, about = "Tile point clouds and clip regions of interest")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Bucket .xyz/.txt/.csv/.obj/.zip point files onto a grid of .ptile tiles.
    Retile {
        #[arg(long, default_value = "points")]
        input_dir: PathBuf,

        #[arg(long, default_value = "tiles")]
        output_dir: PathBuf,

        /// Edge length of a grid cell, in metres.
        #[arg(long, default_value_t = 100.0)]
        tile_size: f64,

        /// Units per meter for the integer lattice (1000 = millimetres)
        #[arg(long, default_value_t = 1000)]
        units_per_meter: u32,

        #[arg(long, default_value_t = false)]
        overwrite: bool,
    },

    /// Write a FeatureCollection index for an existing tile directory.
    Index {
        #[arg(long, default_value = "tiles")]
        tiles_dir: PathBuf,

        /// Defaults to `catalog.json` inside the tile directory.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Extract ROIs from a catalog directory, a feature index or a single tile.
    Clip {
        #[arg(long, default_value = "tiles")]
        catalog: PathBuf,

        /// CSV of `name,x,y,r[,r2]` rows.
        #[arg(long)]
        queries: Option<PathBuf>,

        /// Extra ROI as `x,y,r[,r2]`; may be repeated.
        #[arg(long = "roi")]
        rois: Vec<clip::RoiSpec>,

        #[arg(long, default_value = "rois")]
        output_dir: PathBuf,

        /// Worker threads; defaults to the available cores.
        #[arg(long, env = "ROI_CLIP_PARALLELISM")]
        parallelism: Option<usize>,

        /// Run every ROI on the calling thread.
        #[arg(long, default_value_t = false)]
        serial: bool,

        /// Log completed ROIs while the batch runs.
        #[arg(long, default_value_t = false)]
        progress: bool,

        /// Stop starting new ROIs after this many seconds.
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Lattice resolution of the written ROI tiles.
        #[arg(long, default_value_t = 1000)]
        units_per_meter: u32,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match Args::parse().command {
        Command::Retile {
            input_dir,
            output_dir,
            tile_size,
            units_per_meter,
            overwrite,
        } => {
            retile::run(&retile::RetileOptions {
                input_dir: &input_dir,
                output_dir: &output_dir,
                tile_size,
                units_per_meter,
                overwrite,
            })?;
        }

        Command::Index { tiles_dir, output } => {
            let catalog = Catalog::scan(&tiles_dir)?;
            let output = output.unwrap_or_else(|| tiles_dir.join("catalog.json"));
            catalog
                .write_feature_index(&output)
                .with_context(|| format!("writing {}", output.display()))?;
            info!("Indexed {} tiles into {}", catalog.len(), output.display());
        }

        Command::Clip {
            catalog,
            queries,
            rois,
            output_dir,
            parallelism,
            serial,
            progress,
            timeout_secs,
            units_per_meter,
        } => {
            let mut all = match &queries {
                Some(path) => clip::parse_query_csv(
                    File::open(path).with_context(|| format!("opening {}", path.display()))?,
                )?,
                None => Vec::new(),
            };
            all.extend(rois);
            if all.is_empty() {
                bail!("no ROIs given (use --queries or --roi)");
            }

            let mut config = EngineConfig::default()
                .with_force_serial(serial)
                .with_progress(progress)
                .with_timeout(timeout_secs.map(Duration::from_secs));
            if let Some(n) = parallelism {
                config = config.with_parallelism(n);
            }

            let out = clip::run(clip::ClipOptions {
                source: &catalog,
                rois: all,
                output_dir: &output_dir,
                config,
                units_per_meter,
            })?;

            if out.has_errors() {
                log::warn!("Some ROIs are partial; see summary.json");
            }
        }
    }

    Ok(())
}
