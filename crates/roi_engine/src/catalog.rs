//! Catalog construction: directory scans, feature-index files, explicit tile lists.

use crate::error::{Error, Result};
use crate::shape::BBox;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// File extension of catalog tiles.
pub const TILE_EXTENSION: &str = "ptile";

/// One file covering a rectangular part of the catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct Tile {
    pub path: PathBuf,
    pub bbox: BBox,
}

impl Tile {
    pub fn new(path: impl Into<PathBuf>, bbox: BBox) -> Self {
        Self {
            path: path.into(),
            bbox,
        }
    }

    /// Build a tile from the header of a tile file.
    pub fn from_file(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        let header = ptile::read_header(&path)?;
        Ok(Self {
            bbox: header.extent.into(),
            path,
        })
    }
}

/// Ordered, read-only collection of tiles. Never empty.
#[derive(Debug, Clone)]
pub struct Catalog {
    tiles: Vec<Tile>,
}

impl Catalog {
    pub fn from_tiles(tiles: Vec<Tile>) -> Result<Self> {
        if tiles.is_empty() {
            return Err(Error::catalog("catalog has no tiles"));
        }

        if let Some(bad) = tiles.iter().find(|t| !t.bbox.is_valid()) {
            return Err(Error::catalog(format!(
                "tile {} has an invalid bounding box {:?}",
                bad.path.display(),
                bad.bbox
            )));
        }

        Ok(Self { tiles })
    }

    /// Walk `dir` (following symlinks) and read the header of every tile file.
    ///
    /// Tiles are ordered by path. Tiles without points are skipped.
    pub fn scan(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(Error::catalog(format!("{} is not a directory", dir.display())));
        }

        let mut paths: Vec<PathBuf> = WalkDir::new(dir)
            .follow_links(true)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| {
                p.extension()
                    .and_then(|s| s.to_str())
                    .is_some_and(|s| s.eq_ignore_ascii_case(TILE_EXTENSION))
            })
            .collect();
        paths.sort();

        let mut tiles = Vec::with_capacity(paths.len());
        for path in paths {
            let tile = Tile::from_file(&path).map_err(|e| {
                Error::catalog(format!("unreadable tile header {}: {}", path.display(), e))
            })?;

            if !tile.bbox.is_valid() {
                warn!("{}: empty tile, skipping", path.display());
                continue;
            }

            debug!("Tile {}: {:?}", tile.path.display(), tile.bbox);
            tiles.push(tile);
        }

        if tiles.is_empty() {
            return Err(Error::catalog(format!(
                "no .{} tiles found in '{}'",
                TILE_EXTENSION,
                dir.display()
            )));
        }

        info!("Catalog of {} tiles from {}", tiles.len(), dir.display());
        Self::from_tiles(tiles)
    }

    /// Load a feature-index file: one polygon feature per tile with a `url`
    /// property, relative urls being resolved against the index's directory.
    pub fn from_feature_index(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| Error::catalog(format!("cannot open {}: {}", path.display(), e)))?;
        let root: FeatureCollection = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| Error::catalog(format!("malformed feature index {}: {}", path.display(), e)))?;

        let base = path.parent().unwrap_or_else(|| Path::new(""));
        let tiles = root
            .features
            .into_iter()
            .map(|feature| {
                let bbox = bbox_from_polygon(&feature.geometry).ok_or_else(|| {
                    Error::catalog(format!("feature {} has no coordinates", feature.properties.url))
                })?;
                Ok(Tile::new(base.join(&feature.properties.url), bbox))
            })
            .collect::<Result<Vec<_>>>()?;

        info!("Catalog of {} tiles from index {}", tiles.len(), path.display());
        Self::from_tiles(tiles)
    }

    /// Write the catalog as a feature-index file, with urls relative to the
    /// index's directory where possible.
    pub fn write_feature_index(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let path = path.as_ref();
        let base = path.parent().unwrap_or_else(|| Path::new(""));

        let features = self
            .tiles
            .iter()
            .map(|tile| {
                let url = tile.path.strip_prefix(base).unwrap_or(&tile.path);
                let b = tile.bbox;
                Feature {
                    kind: "Feature".into(),
                    geometry: Geometry {
                        kind: "Polygon".into(),
                        coordinates: vec![vec![
                            [b.xmin, b.ymin],
                            [b.xmax, b.ymin],
                            [b.xmax, b.ymax],
                            [b.xmin, b.ymax],
                            [b.xmin, b.ymin],
                        ]],
                    },
                    properties: Properties {
                        url: url.to_string_lossy().into_owned(),
                    },
                }
            })
            .collect();

        let root = FeatureCollection {
            kind: "FeatureCollection".into(),
            features,
        };

        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, &root)?;
        writer.flush()
    }

    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// Union of all tile boxes.
    pub fn extent(&self) -> BBox {
        self.tiles.iter().skip(1).fold(self.tiles[0].bbox, |acc, t| {
            BBox::new(
                acc.xmin.min(t.bbox.xmin),
                acc.ymin.min(t.bbox.ymin),
                acc.xmax.max(t.bbox.xmax),
                acc.ymax.max(t.bbox.ymax),
            )
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct FeatureCollection {
    #[serde(rename = "type", default)]
    kind: String,
    features: Vec<Feature>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Feature {
    #[serde(rename = "type", default)]
    kind: String,
    geometry: Geometry,
    properties: Properties,
}

#[derive(Debug, Serialize, Deserialize)]
struct Geometry {
    #[serde(rename = "type", default)]
    kind: String,
    coordinates: Vec<Vec<[f64; 2]>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Properties {
    url: String,
}

/// Bounds of the outer ring, ignoring non-finite vertices.
fn bbox_from_polygon(poly: &Geometry) -> Option<BBox> {
    let ring = poly.coordinates.first()?;

    let (mut xmin, mut ymin) = (f64::INFINITY, f64::INFINITY);
    let (mut xmax, mut ymax) = (f64::NEG_INFINITY, f64::NEG_INFINITY);

    for &[x, y] in ring {
        if x.is_finite() && y.is_finite() {
            xmin = xmin.min(x);
            xmax = xmax.max(x);
            ymin = ymin.min(y);
            ymax = ymax.max(y);
        }
    }

    let bbox = BBox::new(xmin, ymin, xmax, ymax);
    bbox.is_valid().then_some(bbox)
}
