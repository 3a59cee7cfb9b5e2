//! Shared fixtures: small on-disk grid catalogs.

#![allow(dead_code)]

use ptile::{Extent, PtileTile};
use roi_engine::Catalog;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const CELL: f64 = 100.0;

/// A `cols`×`rows` grid of `CELL`-sized tiles with one point per `step` units.
///
/// Points are assigned to cells half-open (`[x0, x0 + CELL)`), except on the
/// outer max edges, so every point lives in exactly one file.
pub struct GridCatalog {
    pub dir: TempDir,
    pub paths: Vec<PathBuf>,
}

impl GridCatalog {
    pub fn new(cols: usize, rows: usize, step: f64) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let per_axis = |n: usize| (0..=((n as f64 * CELL) / step) as usize).map(move |i| i as f64 * step);

        let mut cells: Vec<Vec<[f64; 3]>> = vec![Vec::new(); cols * rows];
        for x in per_axis(cols) {
            for y in per_axis(rows) {
                let col = ((x / CELL) as usize).min(cols - 1);
                let row = ((y / CELL) as usize).min(rows - 1);
                cells[row * cols + col].push([x, y, (x + y) * 0.01]);
            }
        }

        let mut paths = Vec::new();
        for row in 0..rows {
            for col in 0..cols {
                let pts = &cells[row * cols + col];
                let mut tile = PtileTile::from_points_m(pts, None, 1000).unwrap();
                let (x0, y0) = (col as f64 * CELL, row as f64 * CELL);
                tile.extent = Extent::new(x0, y0, x0 + CELL, y0 + CELL);
                tile.tile_key = Some(ptile::tilekey_from_name(&format!("r{row}_c{col}")));

                let path = dir.path().join(format!("r{row}_c{col}.ptile"));
                ptile::write_file(&path, &tile).unwrap();
                paths.push(path);
            }
        }

        Self { dir, paths }
    }

    pub fn catalog(&self) -> Catalog {
        Catalog::scan(self.dir.path()).unwrap()
    }

    pub fn path(&self, row: usize, col: usize) -> &Path {
        self.paths
            .iter()
            .find(|p| p.file_stem().and_then(|s| s.to_str()) == Some(&format!("r{row}_c{col}")))
            .unwrap()
    }
}
