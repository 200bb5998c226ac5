//! Tiled iteration over a template grid.
//!
//! The driver walks the output raster in fixed-size windows, hands each
//! window to a per-block routine and writes the returned block back into
//! band 1 of the output dataset.

use anyhow::{Context, Result};
use gdal::raster::{Buffer, GdalType};
use gdal::Dataset;
use tracing::{debug, info};

use crate::error::DemError;
use crate::geotransform::GeoTransform;
use crate::template::TemplateGridSpec;

pub const DEFAULT_BLOCK_SIZE: usize = 256;

/// Pixel window of a block within the full grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockWindow {
    pub row_off: usize,
    pub col_off: usize,
    pub rows: usize,
    pub cols: usize,
}

impl BlockWindow {
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Single-band block of pixels in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct Block<T> {
    pub rows: usize,
    pub cols: usize,
    pub data: Vec<T>,
}

impl<T: Copy> Block<T> {
    /// `(bands, rows, cols)`; always one band.
    pub fn shape(&self) -> (usize, usize, usize) {
        (1, self.rows, self.cols)
    }

    pub fn get(&self, row: usize, col: usize) -> T {
        self.data[row * self.cols + col]
    }
}

/// Per-block context passed to the compute routine.
#[derive(Debug, Clone, Copy)]
pub struct BlockInfo {
    pub window: BlockWindow,
    pub geo_transform: GeoTransform,
    pub index: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockDriver {
    pub block_rows: usize,
    pub block_cols: usize,
}

impl Default for BlockDriver {
    fn default() -> Self {
        Self::new(DEFAULT_BLOCK_SIZE, DEFAULT_BLOCK_SIZE)
    }
}

impl BlockDriver {
    pub fn new(block_rows: usize, block_cols: usize) -> Self {
        Self {
            block_rows: block_rows.max(1),
            block_cols: block_cols.max(1),
        }
    }

    /// Row-major windows covering a `rows x cols` grid; edge windows are clipped.
    pub fn windows(&self, rows: usize, cols: usize) -> Vec<BlockWindow> {
        let mut windows = Vec::new();
        for row_off in (0..rows).step_by(self.block_rows) {
            for col_off in (0..cols).step_by(self.block_cols) {
                windows.push(BlockWindow {
                    row_off,
                    col_off,
                    rows: self.block_rows.min(rows - row_off),
                    cols: self.block_cols.min(cols - col_off),
                });
            }
        }
        windows
    }

    /// Run `compute` once per block of `template` and write each result into
    /// band 1 of `output`. Blocks are processed sequentially.
    pub fn apply<T, F>(
        &self,
        template: &TemplateGridSpec,
        output: &mut Dataset,
        mut compute: F,
    ) -> Result<()>
    where
        T: GdalType + Copy,
        F: FnMut(&BlockInfo) -> Result<Block<T>>,
    {
        let windows = self.windows(template.rows, template.cols);
        let total = windows.len();
        info!(
            "Processing {} blocks of {}x{} over {}x{} pixels",
            total, self.block_rows, self.block_cols, template.rows, template.cols
        );

        let mut band = output
            .rasterband(1)
            .context("Failed to get output raster band")?;

        for (index, window) in windows.into_iter().enumerate() {
            let info = BlockInfo {
                window,
                geo_transform: template.geo_transform,
                index,
                total,
            };
            let block = compute(&info)
                .with_context(|| format!("Block {} of {} failed", index + 1, total))?;

            if (block.rows, block.cols) != window.shape() {
                return Err(DemError::BlockShape {
                    expected: window.shape(),
                    actual: (block.rows, block.cols),
                }
                .into());
            }

            let mut buffer = Buffer::new((window.cols, window.rows), block.data);
            band.write(
                (window.col_off as isize, window.row_off as isize),
                (window.cols, window.rows),
                &mut buffer,
            )
            .with_context(|| format!("Failed to write block at {:?}", window))?;

            debug!("Block {}/{} written: {:?}", index + 1, total, window);
        }

        Ok(())
    }
}

/// Read one window of band 1 from `dataset`.
pub fn read_block<T: GdalType + Copy>(dataset: &Dataset, window: &BlockWindow) -> Result<Block<T>> {
    let band = dataset.rasterband(1).context("Failed to get input raster band")?;
    let buffer = band
        .read_as::<T>(
            (window.col_off as isize, window.row_off as isize),
            (window.cols, window.rows),
            (window.cols, window.rows),
            None,
        )
        .with_context(|| format!("Failed to read block at {:?}", window))?;

    Ok(Block {
        rows: window.rows,
        cols: window.cols,
        data: buffer.data().to_vec(),
    })
}
