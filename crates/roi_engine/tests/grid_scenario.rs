mod common;

use common::GridCatalog;
use roi_engine::{
    EngineConfig, PointSource, QueryStatus, RoiEngine, RoiRequest, Shape, TileIndex,
};
use std::collections::HashSet;

fn key(x: f64, y: f64) -> (i64, i64) {
    ((x * 1000.0).round() as i64, (y * 1000.0).round() as i64)
}

#[test]
fn test_four_tile_scenario() {
    let grid = GridCatalog::new(2, 2, 1.0);
    let engine = RoiEngine::new(PointSource::catalog(grid.catalog()), EngineConfig::default());

    let request = RoiRequest::new(vec![100.0, 10.0, 500.0], vec![100.0, 10.0, 500.0], 5.0)
        .with_names(["A", "B", "C"]);
    let out = engine.clip(&request).unwrap();

    assert_eq!(out.names(), ["A", "B"]);
    assert_eq!(out.unresolved, ["C"]);
    assert!(out.skipped.is_empty());
    assert!(!out.has_errors());

    // 81 lattice points lie within radius 5 of a lattice point.
    let a = out.get("A").unwrap();
    assert_eq!(a.status(), QueryStatus::Complete);
    assert_eq!(a.len(), 81);
    assert!(a
        .points
        .iter()
        .all(|p| (p.x - 100.0).powi(2) + (p.y - 100.0).powi(2) <= 25.0));

    let quadrants: HashSet<(bool, bool)> =
        a.points.iter().map(|p| (p.x >= 100.0, p.y >= 100.0)).collect();
    assert_eq!(quadrants.len(), 4, "ROI A must stitch all four tiles");

    let b = out.get("B").unwrap();
    assert_eq!(b.len(), 81);

    let index = TileIndex::build(grid.catalog());
    let b_tiles = index.intersecting(&Shape::Circle { x: 10.0, y: 10.0, r: 5.0 });
    assert_eq!(b_tiles.len(), 1);
    assert_eq!(b_tiles[0].path, grid.path(0, 0));
}

#[test]
fn test_shared_edge_point_appears_once() {
    let grid = GridCatalog::new(2, 2, 1.0);
    let engine = RoiEngine::new(PointSource::catalog(grid.catalog()), EngineConfig::default());

    // (100, 50) sits on the edge shared by r0_c0 and r0_c1.
    let out = engine
        .clip(&RoiRequest::new(vec![100.0], vec![50.0], 0.5))
        .unwrap();
    let roi = &out.results[0];

    let hits: Vec<_> = roi
        .points
        .iter()
        .filter(|p| p.x == 100.0 && p.y == 50.0)
        .collect();
    assert_eq!(hits.len(), 1);
    assert_eq!(roi.len(), 1);
}

#[test]
fn test_rectangle_roi_across_tiles_matches_box_count() {
    let grid = GridCatalog::new(2, 2, 2.5);
    let engine = RoiEngine::new(PointSource::catalog(grid.catalog()), EngineConfig::serial());

    let out = engine
        .clip(&RoiRequest::new(vec![100.0], vec![100.0], 10.0).with_r2(5.0))
        .unwrap();
    let roi = &out.results[0];

    // x in [90, 110] and y in [95, 105] on a 2.5 lattice: 9 × 5 points.
    assert_eq!(roi.len(), 45);

    let unique: HashSet<_> = roi.points.iter().map(|p| key(p.x, p.y)).collect();
    assert_eq!(unique.len(), roi.len());
}

#[test]
fn test_single_file_source() {
    let grid = GridCatalog::new(1, 1, 5.0);
    let tile = roi_engine::Tile::from_file(grid.path(0, 0)).unwrap();
    let engine = RoiEngine::new(PointSource::Single(tile), EngineConfig::default());

    let out = engine
        .clip(&RoiRequest::new(vec![50.0, 300.0], vec![50.0, 300.0], 5.0))
        .unwrap();

    assert_eq!(out.names(), ["ROI1"]);
    assert_eq!(out.unresolved, ["ROI2"]);
    // (50,50) ± 5 on a 5-unit lattice: the centre and its four neighbours.
    assert_eq!(out.results[0].len(), 5);
}

#[test]
fn test_feature_index_catalog_gives_same_results() {
    let grid = GridCatalog::new(2, 2, 2.0);
    let index_path = grid.dir.path().join("catalog.json");
    grid.catalog().write_feature_index(&index_path).unwrap();

    let from_index = roi_engine::Catalog::from_feature_index(&index_path).unwrap();
    assert_eq!(from_index.tiles(), grid.catalog().tiles());

    let request = RoiRequest::new(vec![99.0, 150.0], vec![101.0, 20.0], vec![6.0, 3.0]);
    let scanned = RoiEngine::new(PointSource::catalog(grid.catalog()), EngineConfig::serial())
        .clip(&request)
        .unwrap();
    let indexed = RoiEngine::new(PointSource::catalog(from_index), EngineConfig::serial())
        .clip(&request)
        .unwrap();

    for (a, b) in scanned.iter().zip(indexed.iter()) {
        assert_eq!(a.name, b.name);
        assert_eq!(a.points, b.points);
    }
}
