//! Broad-phase tile lookup.

use crate::catalog::{Catalog, Tile};
use crate::shape::{BBox, Shape};
use rstar::{RTree, RTreeObject, AABB};

#[derive(Debug, Clone)]
struct TileBox {
    idx: u32,
    env: AABB<[f64; 2]>,
}

impl RTreeObject for TileBox {
    type Envelope = AABB<[f64; 2]>;

    #[inline]
    fn envelope(&self) -> Self::Envelope {
        self.env
    }
}

/// R-tree over a catalog's tile boxes. Owns the catalog; read-only after build.
pub struct TileIndex {
    catalog: Catalog,
    tree: RTree<TileBox>,
}

impl std::fmt::Debug for TileIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileIndex")
            .field("tiles", &self.catalog.len())
            .field("extent", &self.catalog.extent())
            .finish()
    }
}

impl TileIndex {
    pub fn build(catalog: Catalog) -> Self {
        let boxes: Vec<TileBox> = catalog
            .tiles()
            .iter()
            .enumerate()
            .map(|(idx, tile)| TileBox {
                idx: idx as u32,
                env: tile.bbox.envelope(),
            })
            .collect();

        Self {
            tree: RTree::bulk_load(boxes),
            catalog,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Tiles whose box overlaps the shape's box (edges inclusive), in catalog order.
    pub fn intersecting(&self, shape: &Shape) -> Vec<&Tile> {
        self.intersecting_bbox(&shape.bbox())
    }

    pub fn intersecting_bbox(&self, bbox: &BBox) -> Vec<&Tile> {
        let mut hits: Vec<u32> = self
            .tree
            .locate_in_envelope_intersecting(&bbox.envelope())
            .map(|tb| tb.idx)
            .collect();
        hits.sort_unstable();

        let tiles = self.catalog.tiles();
        hits.into_iter().map(|i| &tiles[i as usize]).collect()
    }
}

/// What a batch runs against: one file, or a catalog of tiles.
#[derive(Debug)]
pub enum PointSource {
    Single(Tile),
    Catalog(TileIndex),
}

impl PointSource {
    pub fn catalog(catalog: Catalog) -> Self {
        PointSource::Catalog(TileIndex::build(catalog))
    }

    /// Tiles that may hold points of `shape`. Empty means the ROI has no data.
    pub fn resolve(&self, shape: &Shape) -> Vec<&Tile> {
        match self {
            PointSource::Single(tile) => {
                if tile.bbox.intersects(&shape.bbox()) {
                    vec![tile]
                } else {
                    Vec::new()
                }
            }
            PointSource::Catalog(index) => index.intersecting(shape),
        }
    }

    pub fn tile_count(&self) -> usize {
        match self {
            PointSource::Single(_) => 1,
            PointSource::Catalog(index) => index.catalog().len(),
        }
    }
}
