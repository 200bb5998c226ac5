use anyhow::{Context, Result};
use gdal::Dataset;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::bbox::ProjectedExtent;
use crate::block::{BlockDriver, DEFAULT_BLOCK_SIZE};
use crate::geotransform::GeoTransform;

/// Immutable description of the output grid, read once from the template image.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateGridSpec {
    pub path: PathBuf,
    pub rows: usize,
    pub cols: usize,
    pub geo_transform: GeoTransform,
    /// CRS definition (WKT) as stored in the template.
    pub projection: String,
    pub extent: ProjectedExtent,
    pub block_size: (usize, usize),
}

impl TemplateGridSpec {
    pub fn new(
        path: impl Into<PathBuf>,
        rows: usize,
        cols: usize,
        geo_transform: GeoTransform,
        projection: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            rows,
            cols,
            extent: geo_transform.extent(rows, cols),
            geo_transform,
            projection: projection.into(),
            block_size: (DEFAULT_BLOCK_SIZE, DEFAULT_BLOCK_SIZE),
        }
    }

    pub fn with_block_size(mut self, rows: usize, cols: usize) -> Self {
        self.block_size = (rows, cols);
        self
    }

    pub fn open(path: &Path) -> Result<Self> {
        let dataset = Dataset::open(path)
            .with_context(|| format!("Failed to open template image {:?}", path))?;
        Self::from_dataset(path, &dataset)
    }

    pub fn from_dataset(path: &Path, dataset: &Dataset) -> Result<Self> {
        let (cols, rows) = dataset.raster_size();
        let geo_transform = GeoTransform::new(
            dataset
                .geo_transform()
                .context("Template image has no geotransform")?,
        );
        let projection = dataset.projection();
        if projection.is_empty() {
            anyhow::bail!("Template image {:?} has no coordinate reference system", path);
        }

        let [_, a, b, _, d, e] = geo_transform.coefficients();
        if b != 0.0 || d != 0.0 {
            warn!(
                "Template geotransform is rotated (b={}, d={}); extent uses all four corners",
                b, d
            );
        }
        if a <= 0.0 || e >= 0.0 {
            warn!("Template grid is not north-up (a={}, e={})", a, e);
        }

        let spec = Self::new(path, rows, cols, geo_transform, projection);
        info!(
            "Template grid: {}x{} pixels, extent x {:.1}..{:.1}, y {:.1}..{:.1}",
            cols, rows, spec.extent.x_min, spec.extent.x_max, spec.extent.y_min, spec.extent.y_max
        );
        Ok(spec)
    }

    /// Directory holding the template image; staged files are written here by default.
    pub fn directory(&self) -> PathBuf {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    pub fn block_driver(&self) -> BlockDriver {
        BlockDriver::new(self.block_size.0, self.block_size.1)
    }
}
