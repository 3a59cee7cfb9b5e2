//! PTIL: dependency-light point-cloud tile format for planar (projected) catalogs.
//!
//! - Stores an i64 anchor (integer "units") and i32 offsets per point.
//! - Default units: 1000 units/meter (millimetres).
//! - Optional per-point class labels (u8).
//! - The tile's planar extent lives in the fixed header so a catalog can be
//!   built from header-only reads.
//!
//! File layout (little-endian):
//!   00  : [u8;4]  magic = b"PTIL"
//!   04  : u32     version = 1
//!   08  : u32     flags (bitfield)
//!                 bit 0 => tile key present (32 bytes)
//!                 bit 1 => per-point labels present
//!   0C  : u32     points_count
//!   10  : u32     units_per_meter
//!   14  : i64[3]  anchor_units
//!   2C  : f64[4]  extent xmin, ymin, xmax, ymax (metres)
//!   ..  : [u8;32] tile_key            (if bit0)
//!   ..  : for each point: i32 dx, i32 dy, i32 dz, [u8 label]? (if bit1)

use std::fs::File;
use std::io::{self, BufWriter, ErrorKind, Read, Write};
use std::path::Path;

pub const PTILE_MAGIC: [u8; 4] = *b"PTIL";
pub const PTILE_VERSION: u32 = 1;

/// Size of the fixed header, without the optional tile key.
pub const FIXED_HEADER_LEN: usize = 0x4C;

const FLAG_KEY: u32 = 1 << 0;
const FLAG_LABELS: u32 = 1 << 1;

/// Planar bounding box of a tile, in metres.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extent {
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
}

impl Extent {
    #[inline]
    pub fn new(xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Self {
        Self { xmin, ymin, xmax, ymax }
    }

    /// Tight XY bounds of a point set. Empty input yields an inverted (empty) extent.
    pub fn from_points(points_m: &[[f64; 3]]) -> Self {
        let mut e = Extent::new(
            f64::INFINITY,
            f64::INFINITY,
            f64::NEG_INFINITY,
            f64::NEG_INFINITY,
        );

        for &[x, y, _] in points_m {
            e.xmin = e.xmin.min(x);
            e.ymin = e.ymin.min(y);
            e.xmax = e.xmax.max(x);
            e.ymax = e.ymax.max(y);
        }

        e
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        !(self.xmin <= self.xmax && self.ymin <= self.ymax)
    }
}

/// A decoded point in metres.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointM {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub label: u8,
}

/// Everything in a tile up to (not including) the point records.
#[derive(Debug, Clone)]
pub struct TileHeader {
    pub points_count: u32,
    pub units_per_meter: u32,
    pub anchor_units: [i64; 3],
    pub extent: Extent,
    pub tile_key: Option<[u8; 32]>,
    pub has_labels: bool,
}

impl TileHeader {
    /// Size of one point record in bytes.
    #[inline]
    pub fn record_len(&self) -> usize {
        12 + usize::from(self.has_labels)
    }

    /// Decode one record's offsets into metres.
    #[inline]
    pub fn to_meters(&self, d: [i32; 3]) -> [f64; 3] {
        let upm = self.units_per_meter as f64;
        [
            (self.anchor_units[0] + d[0] as i64) as f64 / upm,
            (self.anchor_units[1] + d[1] as i64) as f64 / upm,
            (self.anchor_units[2] + d[2] as i64) as f64 / upm,
        ]
    }
}

#[derive(Debug, Clone)]
pub struct PtileTile {
    pub units_per_meter: u32,
    pub anchor_units: [i64; 3],
    pub extent: Extent,
    pub tile_key: Option<[u8; 32]>,
    pub points_units: Vec<[i32; 3]>,
    pub labels: Option<Vec<u8>>,
}

impl PtileTile {
    /// Quantize metre coordinates around their centroid, down-scaling
    /// `requested_upm` until every offset fits into an `i32`.
    ///
    /// The extent is the tight bounds of the input; callers writing grid
    /// cells usually overwrite it with the cell bounds.
    pub fn from_points_m(
        points_m: &[[f64; 3]],
        labels: Option<Vec<u8>>,
        requested_upm: u32,
    ) -> io::Result<Self> {
        if requested_upm == 0 {
            return Err(bad("units_per_meter must be > 0"));
        }

        if let Some(ls) = labels.as_ref() {
            if ls.len() != points_m.len() {
                return Err(bad("labels length != points length"));
            }
        }

        let anchor_m = if points_m.is_empty() {
            [0.0; 3]
        } else {
            let inv_n = 1.0 / points_m.len() as f64;
            let (sx, sy, sz) = points_m
                .iter()
                .fold((0.0_f64, 0.0_f64, 0.0_f64), |(ax, ay, az), p| {
                    (ax + p[0], ay + p[1], az + p[2])
                });
            [sx * inv_n, sy * inv_n, sz * inv_n]
        };

        let max_off_m = points_m
            .iter()
            .map(|p| {
                (p[0] - anchor_m[0])
                    .abs()
                    .max((p[1] - anchor_m[1]).abs())
                    .max((p[2] - anchor_m[2]).abs())
            })
            .fold(0.0_f64, f64::max);

        // 5% head-room below i32::MAX.
        let mut upm = if max_off_m <= 1e-12 {
            requested_upm
        } else {
            ((i32::MAX as f64) / (max_off_m * 1.05))
                .floor()
                .clamp(1.0, requested_upm as f64) as u32
        };

        loop {
            let anchor_units = [
                quantize_units(anchor_m[0], upm),
                quantize_units(anchor_m[1], upm),
                quantize_units(anchor_m[2], upm),
            ];

            if let Some(points_units) = try_quantize(points_m, upm, anchor_units) {
                return Ok(PtileTile {
                    units_per_meter: upm,
                    anchor_units,
                    extent: Extent::from_points(points_m),
                    tile_key: None,
                    points_units,
                    labels,
                });
            }

            if upm == 1 {
                return Err(bad("tile span too large for i32 offsets"));
            }

            upm = ((upm as f64) * 0.5).floor().max(1.0) as u32;
        }
    }

    pub fn header(&self) -> TileHeader {
        TileHeader {
            points_count: self.points_units.len() as u32,
            units_per_meter: self.units_per_meter,
            anchor_units: self.anchor_units,
            extent: self.extent,
            tile_key: self.tile_key,
            has_labels: self.labels.is_some(),
        }
    }

    /// All points decoded to metres.
    pub fn points_m(&self) -> Vec<PointM> {
        let header = self.header();
        let labels = self.labels.as_deref();

        self.points_units
            .iter()
            .enumerate()
            .map(|(i, &d)| {
                let [x, y, z] = header.to_meters(d);
                PointM {
                    x,
                    y,
                    z,
                    label: labels.map_or(0, |ls| ls[i]),
                }
            })
            .collect()
    }
}

fn try_quantize(points_m: &[[f64; 3]], upm: u32, anchor_units: [i64; 3]) -> Option<Vec<[i32; 3]>> {
    let mut out = Vec::with_capacity(points_m.len());

    for p in points_m {
        let ux = i32::try_from(quantize_units(p[0], upm) - anchor_units[0]).ok()?;
        let uy = i32::try_from(quantize_units(p[1], upm) - anchor_units[1]).ok()?;
        let uz = i32::try_from(quantize_units(p[2], upm) - anchor_units[2]).ok()?;
        out.push([ux, uy, uz]);
    }

    Some(out)
}

#[inline(always)]
fn need(buf: &[u8], want: usize) -> io::Result<()> {
    if buf.len() < want {
        Err(io::Error::new(ErrorKind::UnexpectedEof, "truncated PTIL"))
    } else {
        Ok(())
    }
}

#[inline(always)]
fn take<'a>(buf: &mut &'a [u8], n: usize) -> io::Result<&'a [u8]> {
    need(buf, n)?;
    let (head, tail) = buf.split_at(n);
    *buf = tail;
    Ok(head)
}

#[inline(always)]
fn le_u8(buf: &mut &[u8]) -> io::Result<u8> {
    Ok(take(buf, 1)?[0])
}

#[inline(always)]
fn le_u32(buf: &mut &[u8]) -> io::Result<u32> {
    let b = take(buf, 4)?;
    Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

#[inline(always)]
fn le_i32(buf: &mut &[u8]) -> io::Result<i32> {
    let b = take(buf, 4)?;
    Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

#[inline(always)]
fn le_i64(buf: &mut &[u8]) -> io::Result<i64> {
    let b = take(buf, 8)?;
    Ok(i64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
}

#[inline(always)]
fn le_f64(buf: &mut &[u8]) -> io::Result<f64> {
    Ok(f64::from_bits(le_i64(buf)? as u64))
}

#[cold]
fn bad(msg: &str) -> io::Error {
    io::Error::new(ErrorKind::InvalidData, msg)
}

/// Parse the header and advance `p` to the first point record.
pub fn parse_header(p: &mut &[u8]) -> io::Result<TileHeader> {
    if take(p, 4)? != PTILE_MAGIC {
        return Err(bad("bad PTIL magic"));
    }

    if le_u32(p)? != PTILE_VERSION {
        return Err(bad("unsupported PTIL version"));
    }

    let flags = le_u32(p)?;
    let points_count = le_u32(p)?;
    let units_per_meter = le_u32(p)?;
    if units_per_meter == 0 {
        return Err(bad("units_per_meter must be > 0"));
    }

    let anchor_units = [le_i64(p)?, le_i64(p)?, le_i64(p)?];
    let extent = Extent::new(le_f64(p)?, le_f64(p)?, le_f64(p)?, le_f64(p)?);
    if [extent.xmin, extent.ymin, extent.xmax, extent.ymax]
        .iter()
        .any(|v| v.is_nan())
    {
        return Err(bad("NaN in PTIL extent"));
    }

    let tile_key = if flags & FLAG_KEY != 0 {
        let mut k = [0u8; 32];
        k.copy_from_slice(take(p, 32)?);
        Some(k)
    } else {
        None
    };

    Ok(TileHeader {
        points_count,
        units_per_meter,
        anchor_units,
        extent,
        tile_key,
        has_labels: flags & FLAG_LABELS != 0,
    })
}

/// Parse a whole PTIL tile from a contiguous byte slice.
pub fn parse_ptile_bytes(mut p: &[u8]) -> io::Result<PtileTile> {
    let header = parse_header(&mut p)?;
    let count = header.points_count as usize;
    let pts_bytes = count
        .checked_mul(header.record_len())
        .ok_or_else(|| bad("points size overflow"))?;
    need(p, pts_bytes)?;

    let (points_units, labels) = if header.has_labels {
        let mut pts = Vec::<[i32; 3]>::with_capacity(count);
        let mut ls = Vec::<u8>::with_capacity(count);

        for _ in 0..count {
            pts.push([le_i32(&mut p)?, le_i32(&mut p)?, le_i32(&mut p)?]);
            ls.push(le_u8(&mut p)?);
        }

        (pts, Some(ls))
    } else {
        let raw = take(&mut p, count * 12)?;

        // Header is 76 or 108 bytes (both %4 == 0), so aligned sources stay aligned.
        // Unaligned sources fall back to a portable decode.
        match bytemuck::try_cast_slice::<u8, [i32; 3]>(raw) {
            Ok(as_i32x3) if cfg!(target_endian = "little") => (as_i32x3.to_vec(), None),
            _ => {
                let mut pts = Vec::<[i32; 3]>::with_capacity(count);
                let mut rest = raw;
                for _ in 0..count {
                    pts.push([le_i32(&mut rest)?, le_i32(&mut rest)?, le_i32(&mut rest)?]);
                }
                (pts, None)
            }
        }
    };

    Ok(PtileTile {
        units_per_meter: header.units_per_meter,
        anchor_units: header.anchor_units,
        extent: header.extent,
        tile_key: header.tile_key,
        points_units,
        labels,
    })
}

/// Decode only the points for which `keep(x, y)` holds; rejected records are
/// never materialized.
pub fn decode_filtered<F>(mut p: &[u8], mut keep: F) -> io::Result<Vec<PointM>>
where
    F: FnMut(f64, f64) -> bool,
{
    let header = parse_header(&mut p)?;
    let count = header.points_count as usize;
    let rec = header.record_len();
    let pts_bytes = count
        .checked_mul(rec)
        .ok_or_else(|| bad("points size overflow"))?;
    need(p, pts_bytes)?;

    let mut out = Vec::new();
    for record in p[..pts_bytes].chunks_exact(rec) {
        let mut r = record;
        let d = [le_i32(&mut r)?, le_i32(&mut r)?, le_i32(&mut r)?];
        let [x, y, z] = header.to_meters(d);
        if !keep(x, y) {
            continue;
        }
        let label = if header.has_labels { le_u8(&mut r)? } else { 0 };
        out.push(PointM { x, y, z, label });
    }

    Ok(out)
}

#[cfg(feature = "mmap")]
fn with_bytes<P: AsRef<Path>, T>(path: P, f: impl FnOnce(&[u8]) -> io::Result<T>) -> io::Result<T> {
    let file = File::open(path)?;
    let map = unsafe { memmap2::MmapOptions::new().map(&file)? };
    f(&map)
}

#[cfg(not(feature = "mmap"))]
fn with_bytes<P: AsRef<Path>, T>(path: P, f: impl FnOnce(&[u8]) -> io::Result<T>) -> io::Result<T> {
    let bytes = std::fs::read(path)?;
    f(&bytes)
}

pub fn read_file<P: AsRef<Path>>(path: P) -> io::Result<PtileTile> {
    with_bytes(path, parse_ptile_bytes)
}

/// Read a tile with a push-down XY filter.
pub fn read_file_filtered<P, F>(path: P, keep: F) -> io::Result<Vec<PointM>>
where
    P: AsRef<Path>,
    F: FnMut(f64, f64) -> bool,
{
    with_bytes(path, |bytes| decode_filtered(bytes, keep))
}

/// Read just the header; the point block is not touched.
pub fn read_header<P: AsRef<Path>>(path: P) -> io::Result<TileHeader> {
    let mut file = File::open(path)?;
    let mut buf = vec![0u8; FIXED_HEADER_LEN];
    file.read_exact(&mut buf)?;

    let flags = u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]);
    if flags & FLAG_KEY != 0 {
        let mut key = [0u8; 32];
        file.read_exact(&mut key)?;
        buf.extend_from_slice(&key);
    }

    parse_header(&mut buf.as_slice())
}

pub fn write_file<P: AsRef<Path>>(path: P, tile: &PtileTile) -> io::Result<()> {
    let mut file = BufWriter::new(File::create(path)?);
    write_to(&mut file, tile)?;
    file.flush()
}

pub fn write_to<W: Write>(w: &mut W, tile: &PtileTile) -> io::Result<()> {
    let mut flags = 0u32;

    if tile.tile_key.is_some() {
        flags |= FLAG_KEY;
    }

    if tile.labels.is_some() {
        flags |= FLAG_LABELS;
    }

    let count = u32::try_from(tile.points_units.len()).map_err(|_| bad("too many points"))?;

    w.write_all(&PTILE_MAGIC)?;

    write_u32(w, PTILE_VERSION)?;
    write_u32(w, flags)?;
    write_u32(w, count)?;
    write_u32(w, tile.units_per_meter)?;

    for a in tile.anchor_units {
        write_i64(w, a)?;
    }

    for v in [tile.extent.xmin, tile.extent.ymin, tile.extent.xmax, tile.extent.ymax] {
        w.write_all(&v.to_le_bytes())?;
    }

    if let Some(key) = tile.tile_key {
        w.write_all(&key)?;
    }

    match tile.labels.as_ref() {
        Some(labels) => {
            if labels.len() != tile.points_units.len() {
                return Err(bad("labels length != points length"));
            }

            for (point, &label) in tile.points_units.iter().zip(labels) {
                write_i32(w, point[0])?;
                write_i32(w, point[1])?;
                write_i32(w, point[2])?;
                w.write_all(&[label])?;
            }
        }
        None => {
            for point in &tile.points_units {
                write_i32(w, point[0])?;
                write_i32(w, point[1])?;
                write_i32(w, point[2])?;
            }
        }
    }

    Ok(())
}

#[inline]
pub fn quantize_units(meters: f64, units_per_meter: u32) -> i64 {
    (meters * (units_per_meter as f64)).round() as i64
}

/// Produce a fixed-size 32-byte tile key from a name (zero-padded or truncated).
pub fn tilekey_from_name(name: &str) -> [u8; 32] {
    let mut key = [0u8; 32];
    let bytes = name.as_bytes();
    let len = bytes.len().min(key.len());
    key[..len].copy_from_slice(&bytes[..len]);
    key
}

/// Inverse of [`tilekey_from_name`], dropping the zero padding.
pub fn tilekey_to_name(key: &[u8; 32]) -> String {
    String::from_utf8_lossy(key).trim_end_matches('\0').to_string()
}

#[inline]
fn write_u32<W: Write>(w: &mut W, v: u32) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

#[inline]
fn write_i32<W: Write>(w: &mut W, v: i32) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

#[inline]
fn write_i64<W: Write>(w: &mut W, v: i64) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}
