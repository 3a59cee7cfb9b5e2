//! `retile`: bucket loose point files onto a regular grid of `.ptile` tiles.

use anyhow::{bail, Context, Result};
use log::{debug, info, warn};
use ptile::{Extent, PtileTile};
use rayon::prelude::*;
use roi_engine::{BBox, Catalog, Tile, TILE_EXTENSION};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A point in metres plus its class label.
pub type LabelledPoint = ([f64; 3], u8);

pub struct RetileOptions<'a> {
    pub input_dir: &'a Path,
    pub output_dir: &'a Path,
    pub tile_size: f64,
    pub units_per_meter: u32,
    pub overwrite: bool,
}

/// Input files under `dir`: `.xyz`/`.txt`/`.csv` point lists, `.obj` meshes,
/// and `.zip` archives holding one of those.
pub fn find_inputs(dir: &Path) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| input_kind(p).is_some())
        .collect();
    paths.sort();
    paths
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputKind {
    Xyz,
    Obj,
    Zip,
}

fn input_kind(path: &Path) -> Option<InputKind> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "xyz" | "txt" | "csv" => Some(InputKind::Xyz),
        "obj" => Some(InputKind::Obj),
        "zip" => Some(InputKind::Zip),
        _ => None,
    }
}

/// Read whitespace- or comma-separated `x y z [label]` records.
/// Blank lines, `#` comments and lines that do not start with a number are skipped.
pub fn parse_xyz_points<R: Read>(reader: R) -> Result<Vec<LabelledPoint>> {
    let mut points = Vec::new();

    for (lineno, line) in BufReader::new(reader).lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let fields: Vec<&str> = trimmed
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|s| !s.is_empty())
            .collect();

        // Separator-only and header rows.
        let Some(first) = fields.first() else {
            continue;
        };
        if first.parse::<f64>().is_err() {
            continue;
        }

        if fields.len() < 3 {
            bail!("line {}: expected at least 3 coordinates", lineno + 1);
        }

        let coord = |i: usize| -> Result<f64> {
            fields[i]
                .parse()
                .with_context(|| format!("line {}: bad number '{}'", lineno + 1, fields[i]))
        };
        let (x, y, z) = (coord(0)?, coord(1)?, coord(2)?);

        let label = match fields.get(3) {
            Some(s) => s
                .parse::<u8>()
                .with_context(|| format!("line {}: bad label '{}'", lineno + 1, s))?,
            None => 0,
        };

        if x.is_finite() && y.is_finite() && z.is_finite() {
            points.push(([x, y, z], label));
        }
    }

    Ok(points)
}

/// Read the vertex records of an OBJ file.
pub fn parse_obj_vertices<R: Read>(reader: R) -> Result<Vec<LabelledPoint>> {
    let mut vertices = Vec::new();

    for line_result in BufReader::new(reader).lines() {
        let line = line_result?;
        let trimmed = line.trim();

        if !trimmed.starts_with("v ") {
            continue;
        }

        let mut parts = trimmed.split_whitespace();
        parts.next(); // "v"

        let x: f64 = parts.next().context("Missing x coordinate")?.parse()?;
        let y: f64 = parts.next().context("Missing y coordinate")?.parse()?;
        let z: f64 = parts.next().context("Missing z coordinate")?.parse()?;

        if x.is_finite() && y.is_finite() && z.is_finite() {
            vertices.push(([x, y, z], 0));
        }
    }

    Ok(vertices)
}

fn load_points(path: &Path) -> Result<Vec<LabelledPoint>> {
    match input_kind(path) {
        Some(InputKind::Xyz) => parse_xyz_points(File::open(path)?),
        Some(InputKind::Obj) => parse_obj_vertices(File::open(path)?),
        Some(InputKind::Zip) => {
            let mut archive = zip::ZipArchive::new(File::open(path)?)?;

            let inner = archive
                .file_names()
                .find(|n| matches!(input_kind(Path::new(n)), Some(InputKind::Xyz | InputKind::Obj)))
                .context("No point or .obj file found in zip archive")?
                .to_owned();

            debug!("Found {} in {}", inner, path.display());
            let entry = archive.by_name(&inner)?;
            match input_kind(Path::new(&inner)) {
                Some(InputKind::Obj) => parse_obj_vertices(entry),
                _ => parse_xyz_points(entry),
            }
        }
        None => bail!("unsupported input {}", path.display()),
    }
}

/// Grid cell of a coordinate; cells are half-open `[origin + i*size, origin + (i+1)*size)`.
#[inline]
pub fn cell_of(v: f64, origin: f64, size: f64) -> i64 {
    ((v - origin) / size).floor() as i64
}

/// Group points by grid cell, keyed `(col, row)`.
pub fn bucket(
    points: Vec<LabelledPoint>,
    origin: (f64, f64),
    size: f64,
) -> HashMap<(i64, i64), Vec<LabelledPoint>> {
    let mut cells: HashMap<(i64, i64), Vec<LabelledPoint>> = HashMap::new();
    for p in points {
        let key = (cell_of(p.0[0], origin.0, size), cell_of(p.0[1], origin.1, size));
        cells.entry(key).or_default().push(p);
    }
    cells
}

pub fn tile_name(col: i64, row: i64) -> String {
    format!("c{col}_r{row}")
}

/// Retile every input under `opts.input_dir`, returning the written catalog.
pub fn run(opts: &RetileOptions<'_>) -> Result<Catalog> {
    if !(opts.tile_size.is_finite() && opts.tile_size > 0.0) {
        bail!("--tile-size must be a positive number");
    }

    let inputs = find_inputs(opts.input_dir);
    if inputs.is_empty() {
        bail!("no point files found in '{}'", opts.input_dir.display());
    }

    info!("Reading {} input file(s)...", inputs.len());

    let loaded: Vec<Vec<LabelledPoint>> = inputs
        .par_iter()
        .filter_map(|path| match load_points(path) {
            Ok(points) => {
                debug!("{}: {} points", path.display(), points.len());
                Some(points)
            }
            Err(err) => {
                warn!("Error reading {}: {:#}", path.display(), err);
                None
            }
        })
        .collect();

    let points: Vec<LabelledPoint> = loaded.into_iter().flatten().collect();
    if points.is_empty() {
        bail!("inputs contain no points");
    }

    let xyz: Vec<[f64; 3]> = points.iter().map(|p| p.0).collect();
    let extent = Extent::from_points(&xyz);
    let size = opts.tile_size;
    let origin = (
        (extent.xmin / size).floor() * size,
        (extent.ymin / size).floor() * size,
    );

    let cells = bucket(points, origin, size);
    info!(
        "{} points over {} non-empty {} m cells",
        xyz.len(),
        cells.len(),
        size
    );

    fs::create_dir_all(opts.output_dir)?;

    let mut cells: Vec<((i64, i64), Vec<LabelledPoint>)> = cells.into_iter().collect();
    cells.sort_by_key(|(key, _)| *key);

    let tiles = cells
        .par_iter()
        .map(|((col, row), pts)| write_cell(opts, origin, *col, *row, pts))
        .collect::<Result<Vec<Tile>>>()?;

    let catalog = Catalog::from_tiles(tiles)?;
    let index_path = opts.output_dir.join("catalog.json");
    catalog
        .write_feature_index(&index_path)
        .with_context(|| format!("writing {}", index_path.display()))?;

    info!("Wrote {} tiles and {}", catalog.len(), index_path.display());
    Ok(catalog)
}

fn write_cell(
    opts: &RetileOptions<'_>,
    origin: (f64, f64),
    col: i64,
    row: i64,
    pts: &[LabelledPoint],
) -> Result<Tile> {
    let name = tile_name(col, row);
    let out_path = opts.output_dir.join(format!("{name}.{TILE_EXTENSION}"));

    let x0 = origin.0 + col as f64 * opts.tile_size;
    let y0 = origin.1 + row as f64 * opts.tile_size;
    let bbox = BBox::new(x0, y0, x0 + opts.tile_size, y0 + opts.tile_size);

    if out_path.exists() && !opts.overwrite {
        bail!("{} exists (use --overwrite)", out_path.display());
    }

    let xyz: Vec<[f64; 3]> = pts.iter().map(|p| p.0).collect();
    let labels = pts.iter().any(|p| p.1 != 0).then(|| pts.iter().map(|p| p.1).collect());

    let mut tile = PtileTile::from_points_m(&xyz, labels, opts.units_per_meter)
        .with_context(|| format!("quantizing {name}"))?;
    if tile.units_per_meter != opts.units_per_meter {
        warn!(
            "{}: units_per_meter reduced {} -> {}",
            name, opts.units_per_meter, tile.units_per_meter
        );
    }
    tile.extent = Extent::new(bbox.xmin, bbox.ymin, bbox.xmax, bbox.ymax);
    tile.tile_key = Some(ptile::tilekey_from_name(&name));

    ptile::write_file(&out_path, &tile)?;
    debug!("OK {} ({} pts)", out_path.display(), pts.len());

    Ok(Tile::new(out_path, bbox))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xyz_parsing_skips_headers_and_comments() {
        let text = "x,y,z,class\n# comment\n1,2,3,5\n\n4 5 6\n";
        let pts = parse_xyz_points(text.as_bytes()).unwrap();
        assert_eq!(pts, vec![([1.0, 2.0, 3.0], 5), ([4.0, 5.0, 6.0], 0)]);
    }

    #[test]
    fn test_xyz_parsing_skips_separator_only_lines() {
        let pts = parse_xyz_points(",\n, ,\n1,2,3\n".as_bytes()).unwrap();
        assert_eq!(pts, vec![([1.0, 2.0, 3.0], 0)]);
    }

    #[test]
    fn test_xyz_parsing_rejects_short_rows() {
        assert!(parse_xyz_points("1 2\n".as_bytes()).is_err());
    }

    #[test]
    fn test_obj_vertices() {
        let text = "o mesh\nv 1 2 3\nvn 0 0 1\nv 4 5 6\nf 1 2 3\n";
        let pts = parse_obj_vertices(text.as_bytes()).unwrap();
        assert_eq!(pts.len(), 2);
        assert_eq!(pts[1].0, [4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_cells_are_half_open() {
        assert_eq!(cell_of(99.999, 0.0, 100.0), 0);
        assert_eq!(cell_of(100.0, 0.0, 100.0), 1);
        assert_eq!(cell_of(-0.5, 0.0, 100.0), -1);
    }

    #[test]
    fn test_retile_writes_grid_and_index() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();

        let mut text = String::new();
        for i in 0..=20 {
            for j in 0..=20 {
                text.push_str(&format!("{} {} 1.0 2\n", i * 10, j * 10));
            }
        }
        fs::write(input.path().join("cloud.xyz"), text).unwrap();

        let catalog = run(&RetileOptions {
            input_dir: input.path(),
            output_dir: output.path(),
            tile_size: 100.0,
            units_per_meter: 1000,
            overwrite: false,
        })
        .unwrap();

        // 0..=200 over 100 m cells: columns/rows 0, 1 and the 200 edge in 2.
        assert_eq!(catalog.len(), 9);
        assert!(output.path().join("catalog.json").exists());

        let scanned = Catalog::scan(output.path()).unwrap();
        assert_eq!(scanned.len(), 9);

        let total: usize = scanned
            .tiles()
            .iter()
            .map(|t| ptile::read_file(&t.path).unwrap().points_units.len())
            .sum();
        assert_eq!(total, 21 * 21);
    }
}
