//! SRTM `.hgt` tiles and the sample lattice they share.
//!
//! Tiles are 1° x 1°, named after their south-west corner, and store
//! `samples x samples` big-endian `i16` values whose edge rows and columns
//! overlap with the neighbouring tiles.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;

use rayon::prelude::*;

use crate::bbox::GeographicBoundingBox;
use crate::error::{DemError, Result};
use crate::geotransform::GeoTransform;

/// Void value used by SRTM and by the clipped output.
pub const SRTM_VOID: i16 = -32768;

/// South-west corner of a 1° tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileId {
    pub lat: i32,
    pub lon: i32,
}

impl TileId {
    /// `N35` / `S12` style latitude directory name.
    pub fn lat_dir(&self) -> String {
        let prefix = if self.lat >= 0 { 'N' } else { 'S' };
        format!("{}{:02}", prefix, self.lat.abs())
    }
}

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lon_prefix = if self.lon >= 0 { 'E' } else { 'W' };
        write!(f, "{}{}{:03}", self.lat_dir(), lon_prefix, self.lon.abs())
    }
}

#[derive(Debug, Clone)]
pub struct HgtTile {
    pub id: TileId,
    pub samples: usize,
    data: Vec<i16>,
}

impl HgtTile {
    pub fn from_bytes(id: TileId, bytes: &[u8]) -> Result<Self> {
        let samples = match bytes.len() {
            n if n == 3601 * 3601 * 2 => 3601,
            n if n == 1201 * 1201 * 2 => 1201,
            size => return Err(DemError::InvalidTileSize { size }),
        };
        let data = bytes
            .chunks_exact(2)
            .map(|pair| i16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        Ok(Self { id, samples, data })
    }

    pub fn from_file(id: TileId, path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        Self::from_bytes(id, &bytes)
    }

    /// Row 0 is the northern edge, column 0 the western edge.
    pub fn get(&self, row: usize, col: usize) -> i16 {
        self.data[row * self.samples + col]
    }
}

/// Sample-aligned grid covering a bounding box.
///
/// Lattice point `(iy, ix)` sits at `(iy / per, ix / per)` degrees, where
/// `per` is the number of sample intervals per degree. Output pixels are
/// centred on lattice points, which is how `.hgt` samples are registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleGrid {
    pub per: i64,
    pub top: i64,
    pub left: i64,
    pub rows: usize,
    pub cols: usize,
}

impl SampleGrid {
    pub fn covering(bbox: &GeographicBoundingBox, samples: usize) -> Self {
        let per = samples as i64 - 1;
        let perf = per as f64;
        let left = (bbox.lon_min * perf).floor() as i64;
        let right = (bbox.lon_max * perf).ceil() as i64;
        let bottom = (bbox.lat_min * perf).floor() as i64;
        let top = (bbox.lat_max * perf).ceil() as i64;

        Self {
            per,
            top,
            left,
            rows: (top - bottom + 1) as usize,
            cols: (right - left + 1) as usize,
        }
    }

    pub fn cells(&self) -> usize {
        self.rows * self.cols
    }

    pub fn geo_transform(&self) -> GeoTransform {
        let res = 1.0 / self.per as f64;
        GeoTransform::north_up(
            self.left as f64 * res - res / 2.0,
            self.top as f64 * res + res / 2.0,
            res,
            res,
        )
    }

    /// Tile latitude and row within it for output row `row`.
    ///
    /// A lattice row on a whole degree belongs to the tile below it, where it
    /// is row 0, so no extra tile is needed for a shared edge.
    fn row_source(&self, row: usize) -> (i32, usize) {
        let iy = self.top - row as i64;
        let lat = (iy - 1).div_euclid(self.per);
        let in_tile = (lat + 1) * self.per - iy;
        (lat as i32, in_tile as usize)
    }

    /// Tile longitude and column within it for output column `col`.
    ///
    /// Columns east of 180° wrap round to the western tiles.
    fn col_source(&self, col: usize) -> (i32, usize) {
        let mut ix = self.left + col as i64;
        if ix > 180 * self.per {
            ix -= 360 * self.per;
        }
        let lon = ix.div_euclid(self.per);
        let in_tile = ix.rem_euclid(self.per);
        if lon >= 180 {
            // 180E is the eastern edge column of tile E179.
            (179, self.per as usize)
        } else {
            (lon as i32, in_tile as usize)
        }
    }

    /// Every tile the grid reads from.
    pub fn tiles(&self) -> Vec<TileId> {
        let mut lats: Vec<i32> = (0..self.rows).map(|r| self.row_source(r).0).collect();
        let mut lons: Vec<i32> = (0..self.cols).map(|c| self.col_source(c).0).collect();
        lats.dedup();
        lons.dedup();

        let mut tiles = Vec::with_capacity(lats.len() * lons.len());
        for &lat in &lats {
            for &lon in &lons {
                tiles.push(TileId { lat, lon });
            }
        }
        tiles.sort();
        tiles
    }

    /// Assemble the grid from `tiles`; absent tiles read as [`SRTM_VOID`].
    pub fn mosaic(&self, tiles: &HashMap<TileId, HgtTile>) -> Vec<f32> {
        let cols: Vec<(i32, usize)> = (0..self.cols).map(|c| self.col_source(c)).collect();
        let mut values = vec![SRTM_VOID as f32; self.rows * self.cols];

        values
            .par_chunks_mut(self.cols.max(1))
            .enumerate()
            .for_each(|(row, out_row)| {
                let (lat, tile_row) = self.row_source(row);
                for (out, &(lon, tile_col)) in out_row.iter_mut().zip(&cols) {
                    if let Some(tile) = tiles.get(&TileId { lat, lon }) {
                        *out = tile.get(tile_row, tile_col) as f32;
                    }
                }
            });

        values
    }
}
