//! `clip`: extract ROIs from a catalog and write one tile per ROI plus a summary.

use anyhow::{bail, Context, Result};
use log::{info, warn};
use ptile::PtileTile;
use roi_engine::{
    Catalog, EngineConfig, LogProgress, OutputCollection, PointSource, QueryResult, QueryStatus,
    RoiEngine, RoiRequest, Tile, TILE_EXTENSION,
};
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Read};
use std::path::Path;
use std::str::FromStr;

/// One ROI as given on the command line or in a query file.
#[derive(Debug, Clone, PartialEq)]
pub struct RoiSpec {
    pub name: Option<String>,
    pub x: f64,
    pub y: f64,
    pub r: f64,
    pub r2: Option<f64>,
}

/// `x,y,r[,r2]`
impl FromStr for RoiSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let nums = s
            .split(',')
            .map(|f| f.trim().parse::<f64>())
            .collect::<Result<Vec<f64>, _>>()
            .map_err(|e| format!("'{s}': {e}"))?;

        match nums[..] {
            [x, y, r] => Ok(RoiSpec { name: None, x, y, r, r2: None }),
            [x, y, r, r2] => Ok(RoiSpec { name: None, x, y, r, r2: Some(r2) }),
            _ => Err(format!("'{s}': expected x,y,r[,r2]")),
        }
    }
}

/// Read `name,x,y,r[,r2]` rows. A first row whose `x` is not a number is a header.
pub fn parse_query_csv<R: Read>(reader: R) -> Result<Vec<RoiSpec>> {
    let mut rois = Vec::new();

    for (lineno, line) in BufReader::new(reader).lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let (name, rest) = trimmed
            .split_once(',')
            .with_context(|| format!("line {}: expected name,x,y,r[,r2]", lineno + 1))?;

        let is_header = rest
            .split(',')
            .next()
            .map_or(true, |x| x.trim().parse::<f64>().is_err());
        if lineno == 0 && is_header {
            continue;
        }

        let mut roi: RoiSpec = rest
            .parse()
            .map_err(|e| anyhow::anyhow!("line {}: {}", lineno + 1, e))?;
        let name = name.trim();
        if !is_file_stem(name) {
            bail!("line {}: ROI name '{}' is not usable as a file name", lineno + 1, name);
        }
        roi.name = Some(name.to_owned());
        rois.push(roi);
    }

    Ok(rois)
}

/// ROI names become output file names, so they must stay inside the output directory.
fn is_file_stem(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(|c: char| c == '/' || c == '\\' || c == '\0')
}

/// Turn parsed ROIs into a request. Names are all-or-nothing, as is `r2`.
pub fn build_request(rois: &[RoiSpec]) -> Result<RoiRequest> {
    let x = rois.iter().map(|q| q.x).collect();
    let y = rois.iter().map(|q| q.y).collect();
    let r: Vec<f64> = rois.iter().map(|q| q.r).collect();

    let mut request = RoiRequest::new(x, y, r);

    let r2: Vec<f64> = rois.iter().filter_map(|q| q.r2).collect();
    if !r2.is_empty() {
        if r2.len() != rois.len() {
            bail!("either every ROI gives r2 or none does");
        }
        request = request.with_r2(r2);
    }

    if rois.iter().all(|q| q.name.is_some()) && !rois.is_empty() {
        request = request.with_names(rois.iter().filter_map(|q| q.name.clone()));
    }

    Ok(request)
}

/// A catalog directory, a feature-index `.json`, or a single `.ptile`.
pub fn open_source(path: &Path) -> Result<PointSource> {
    if path.is_dir() {
        return Ok(PointSource::catalog(Catalog::scan(path)?));
    }

    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => Ok(PointSource::catalog(Catalog::from_feature_index(path)?)),
        Some(TILE_EXTENSION) => {
            let tile = Tile::from_file(path)
                .with_context(|| format!("reading header of {}", path.display()))?;
            Ok(PointSource::Single(tile))
        }
        _ => bail!(
            "'{}' is neither a directory, a .json index nor a .{} tile",
            path.display(),
            TILE_EXTENSION
        ),
    }
}

pub struct ClipOptions<'a> {
    pub source: &'a Path,
    pub rois: Vec<RoiSpec>,
    pub output_dir: &'a Path,
    pub config: EngineConfig,
    pub units_per_meter: u32,
}

#[derive(Debug, Serialize)]
struct RoiSummary<'a> {
    name: &'a str,
    points: usize,
    status: &'static str,
    output: Option<String>,
    errors: Vec<String>,
}

#[derive(Debug, Serialize)]
struct Summary<'a> {
    requested: usize,
    total_points: usize,
    results: Vec<RoiSummary<'a>>,
    unresolved: &'a [String],
    skipped: &'a [String],
}

pub fn run(opts: ClipOptions<'_>) -> Result<OutputCollection> {
    let request = build_request(&opts.rois)?;
    let source = open_source(opts.source)?;
    let progress = opts.config.progress;
    let engine = RoiEngine::new(source, opts.config);

    let out = if progress {
        engine.clip_with_progress(&request, &LogProgress::default())?
    } else {
        engine.clip(&request)?
    };

    fs::create_dir_all(opts.output_dir)?;

    let mut results = Vec::with_capacity(out.len());
    for roi in out.iter() {
        let output = write_roi(roi, opts.output_dir, opts.units_per_meter)?;
        results.push(RoiSummary {
            name: &roi.name,
            points: roi.len(),
            status: match roi.status() {
                QueryStatus::Complete => "complete",
                QueryStatus::Partial => "partial",
            },
            output,
            errors: roi.errors.iter().map(ToString::to_string).collect(),
        });
    }

    for name in &out.unresolved {
        info!("{name}: no tile intersects this ROI");
    }
    for name in &out.skipped {
        warn!("{name}: skipped, batch timed out");
    }

    let summary = Summary {
        requested: opts.rois.len(),
        total_points: out.total_points(),
        results,
        unresolved: &out.unresolved,
        skipped: &out.skipped,
    };
    let summary_path = opts.output_dir.join("summary.json");
    serde_json::to_writer_pretty(BufWriter::new(File::create(&summary_path)?), &summary)
        .with_context(|| format!("writing {}", summary_path.display()))?;

    info!(
        "Wrote {} ROI(s), {} points, summary at {}",
        out.len(),
        out.total_points(),
        summary_path.display()
    );
    Ok(out)
}

/// Write one ROI as a `.ptile`; empty results produce no file.
fn write_roi(roi: &QueryResult, dir: &Path, units_per_meter: u32) -> Result<Option<String>> {
    if roi.is_empty() {
        return Ok(None);
    }

    let xyz: Vec<[f64; 3]> = roi.points.iter().map(|p| [p.x, p.y, p.z]).collect();
    let labels = roi
        .points
        .iter()
        .any(|p| p.label != 0)
        .then(|| roi.points.iter().map(|p| p.label).collect());

    let mut tile = PtileTile::from_points_m(&xyz, labels, units_per_meter)
        .with_context(|| format!("quantizing ROI {}", roi.name))?;
    tile.tile_key = Some(ptile::tilekey_from_name(&roi.name));

    let file_name = format!("{}.{}", roi.name, TILE_EXTENSION);
    ptile::write_file(dir.join(&file_name), &tile)?;
    Ok(Some(file_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roi_spec_parsing() {
        assert_eq!(
            "1.5, 2, 3".parse::<RoiSpec>().unwrap(),
            RoiSpec { name: None, x: 1.5, y: 2.0, r: 3.0, r2: None }
        );
        assert_eq!("1,2,3,4".parse::<RoiSpec>().unwrap().r2, Some(4.0));
        assert!("1,2".parse::<RoiSpec>().is_err());
        assert!("1,2,x".parse::<RoiSpec>().is_err());
    }

    #[test]
    fn test_query_csv_with_header() {
        let text = "name,x,y,r\nplot_a,100,100,5\n# skipped\nplot_b,10,10,2.5\n";
        let rois = parse_query_csv(text.as_bytes()).unwrap();
        assert_eq!(rois.len(), 2);
        assert_eq!(rois[0].name.as_deref(), Some("plot_a"));
        assert_eq!(rois[1].r, 2.5);
    }

    #[test]
    fn test_query_csv_rejects_path_like_names() {
        for bad in ["../escape,1,2,3\n", "sub/dir,1,2,3\n", "..,1,2,3\n", ",1,2,3\n"] {
            assert!(parse_query_csv(bad.as_bytes()).is_err(), "{bad:?}");
        }
        let ok = parse_query_csv("plot.v2,1,2,3\n".as_bytes()).unwrap();
        assert_eq!(ok[0].name.as_deref(), Some("plot.v2"));
    }

    #[test]
    fn test_build_request_names_and_r2() {
        let rois = parse_query_csv("a,1,2,3,4\nb,5,6,7,8\n".as_bytes()).unwrap();
        let request = build_request(&rois).unwrap();
        assert_eq!(request.names.as_deref(), Some(&["a".to_owned(), "b".to_owned()][..]));
        assert!(request.r2.is_some());

        let mixed = vec![
            "1,2,3".parse::<RoiSpec>().unwrap(),
            "1,2,3,4".parse::<RoiSpec>().unwrap(),
        ];
        assert!(build_request(&mixed).is_err());
    }

    #[test]
    fn test_unknown_source_kind() {
        assert!(open_source(Path::new("/nonexistent/tiles.las")).is_err());
    }
}
