//! Nearest-cell resampling of a staged elevation raster onto a template block.

use rayon::prelude::*;

use crate::block::{Block, BlockWindow};
use crate::error::Result;
use crate::geotransform::GeoTransform;
use crate::staging::StagedElevationRaster;

/// Value written where the staged raster has no data for an output pixel.
pub const NODATA: f32 = -32768.0;

/// Projected coordinates of every pixel centre in a block, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockCoords {
    pub rows: usize,
    pub cols: usize,
    pub xs: Vec<f64>,
    pub ys: Vec<f64>,
}

impl BlockCoords {
    pub fn for_window(geo_transform: &GeoTransform, window: &BlockWindow) -> Self {
        let mut xs = Vec::with_capacity(window.len());
        let mut ys = Vec::with_capacity(window.len());
        for row in window.row_off..window.row_off + window.rows {
            for col in window.col_off..window.col_off + window.cols {
                let (x, y) = geo_transform.pixel_center(row, col);
                xs.push(x);
                ys.push(y);
            }
        }

        Self {
            rows: window.rows,
            cols: window.cols,
            xs,
            ys,
        }
    }
}

/// Sample `staged` at every coordinate of `coords`.
///
/// Fractional source indices are floored, not rounded: a pixel centre picks
/// the staged cell whose upper-left corner precedes it. Coordinates outside
/// the staged grid, and staged cells holding the staged nodata value, become
/// [`NODATA`].
pub fn resample(coords: &BlockCoords, staged: &StagedElevationRaster) -> Result<Block<f32>> {
    let inverse = staged.geo_transform.invert()?;
    let staged_nodata = staged.nodata.map(|v| v as f32);
    let cols = coords.cols;

    let mut data = vec![NODATA; coords.rows * cols];
    if cols > 0 {
        data.par_chunks_mut(cols)
            .enumerate()
            .for_each(|(row, out_row)| {
                let start = row * cols;
                let xs = &coords.xs[start..start + cols];
                let ys = &coords.ys[start..start + cols];
                for ((out, &x), &y) in out_row.iter_mut().zip(xs).zip(ys) {
                    let (src_row, src_col) = inverse.apply(x, y);
                    let (src_row, src_col) = (src_row.floor(), src_col.floor());
                    if src_row < 0.0
                        || src_col < 0.0
                        || src_row >= staged.rows as f64
                        || src_col >= staged.cols as f64
                    {
                        continue;
                    }

                    let value = staged.get(src_row as usize, src_col as usize);
                    if Some(value) != staged_nodata && !value.is_nan() {
                        *out = value;
                    }
                }
            });
    }

    Ok(Block {
        rows: coords.rows,
        cols,
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn staged(rows: usize, cols: usize, gt: GeoTransform) -> StagedElevationRaster {
        let values = (0..rows * cols).map(|v| v as f32).collect();
        StagedElevationRaster::from_parts(rows, cols, gt, values, Some(NODATA as f64))
    }

    fn window(rows: usize, cols: usize) -> BlockWindow {
        BlockWindow {
            row_off: 0,
            col_off: 0,
            rows,
            cols,
        }
    }

    #[test]
    fn test_identical_grid_copies_every_cell() {
        let gt = GeoTransform::new([500000.0, 30.0, 0.0, 4000000.0, 0.0, -30.0]);
        let source = staged(8, 12, gt);

        let coords = BlockCoords::for_window(&gt, &window(8, 12));
        let block = resample(&coords, &source).unwrap();

        assert_eq!(block.shape(), (1, 8, 12));
        assert!(block.data.iter().all(|&v| v != NODATA));
        for row in 0..8 {
            for col in 0..12 {
                assert_eq!(block.get(row, col), source.get(row, col));
            }
        }
    }

    #[test]
    fn test_offset_window_indexes_full_grid() {
        let gt = GeoTransform::new([500000.0, 30.0, 0.0, 4000000.0, 0.0, -30.0]);
        let source = staged(8, 12, gt);

        let win = BlockWindow {
            row_off: 3,
            col_off: 5,
            rows: 2,
            cols: 4,
        };
        let block = resample(&BlockCoords::for_window(&gt, &win), &source).unwrap();
        assert_eq!(block.get(0, 0), source.get(3, 5));
        assert_eq!(block.get(1, 3), source.get(4, 8));
    }

    #[test]
    fn test_out_of_bounds_is_nodata() {
        let gt = GeoTransform::new([500000.0, 30.0, 0.0, 4000000.0, 0.0, -30.0]);
        // Staged grid is 3 columns narrower on the east edge.
        let source = staged(6, 7, gt);

        let block = resample(&BlockCoords::for_window(&gt, &window(6, 10)), &source).unwrap();
        for row in 0..6 {
            for col in 0..10 {
                let v = block.get(row, col);
                if col >= 7 {
                    assert_eq!(v, NODATA, "({}, {}) should be nodata", row, col);
                } else {
                    assert_eq!(v, source.get(row, col));
                }
            }
        }
    }

    #[test]
    fn test_floor_selects_upper_left_cell() {
        // Staged cells are 90 m; template pixels are 30 m.
        let template = GeoTransform::new([0.0, 30.0, 0.0, 0.0, 0.0, -30.0]);
        let source = staged(2, 2, GeoTransform::new([0.0, 90.0, 0.0, 0.0, 0.0, -90.0]));

        let block = resample(&BlockCoords::for_window(&template, &window(6, 6)), &source).unwrap();
        // Template column 2 centre is at x=75, source column 0.833 -> 0.
        assert_eq!(block.get(0, 2), source.get(0, 0));
        // Template column 3 centre is at x=105, source column 1.17 -> 1.
        assert_eq!(block.get(0, 3), source.get(0, 1));
        assert_eq!(block.get(5, 5), source.get(1, 1));
    }

    #[test]
    fn test_negative_fraction_is_outside() {
        // Template starts one pixel west of the staged grid: its first centre
        // (x=-15) maps to source column -0.5, which floors to -1.
        let template = GeoTransform::new([-30.0, 30.0, 0.0, 0.0, 0.0, -30.0]);
        let source = staged(1, 2, GeoTransform::new([0.0, 30.0, 0.0, 0.0, 0.0, -30.0]));

        let block = resample(&BlockCoords::for_window(&template, &window(1, 3)), &source).unwrap();
        assert_eq!(block.data, vec![NODATA, 0.0, 1.0]);
    }

    #[test]
    fn test_staged_nodata_passes_through_as_sentinel() {
        let gt = GeoTransform::new([0.0, 1.0, 0.0, 0.0, 0.0, -1.0]);
        let source =
            StagedElevationRaster::from_parts(1, 2, gt, vec![-9999.0, 12.5], Some(-9999.0));

        let block = resample(&BlockCoords::for_window(&gt, &window(1, 2)), &source).unwrap();
        assert_eq!(block.data, vec![NODATA, 12.5]);
    }

    #[test]
    fn test_values_come_from_staged_or_sentinel() {
        let template = GeoTransform::new([-45.0, 30.0, 0.0, 45.0, 0.0, -30.0]);
        let source = staged(5, 5, GeoTransform::new([0.0, 30.0, 0.0, 0.0, 0.0, -30.0]));

        let block = resample(&BlockCoords::for_window(&template, &window(9, 9)), &source).unwrap();
        assert!(block
            .data
            .iter()
            .all(|v| *v == NODATA || source.values.contains(v)));
    }
}
