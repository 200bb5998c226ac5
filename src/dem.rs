//! DEM image synthesis on a template grid.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::bbox::{bounding_box_for, GeographicBoundingBox, ProjectedExtent, DEFAULT_BUFFER_DEGREES};
use crate::fetch::{ElevationFetcher, Product};
use crate::geotransform::GeoTransform;
use crate::projection::{CoordinateProjector, TargetCrs};
use crate::reproject::Reprojector;
use crate::resample::{resample, BlockCoords, NODATA};
use crate::staging::{ElevationStagingCache, StagingKey, StagingRequest};
use crate::template::TemplateGridSpec;
use crate::writer::GeoTiffWriter;

#[derive(Debug, Clone, PartialEq)]
pub struct DemOptions {
    pub product: Product,
    /// Margin around the scene footprint, in degrees.
    pub buffer_degrees: f64,
    /// `(rows, cols)` of each processing block.
    pub block_size: (usize, usize),
    /// Where the staged DEM lives; the template's directory when `None`.
    pub staging_dir: Option<PathBuf>,
}

impl Default for DemOptions {
    fn default() -> Self {
        Self {
            product: Product::default(),
            buffer_degrees: DEFAULT_BUFFER_DEGREES,
            block_size: (
                crate::block::DEFAULT_BLOCK_SIZE,
                crate::block::DEFAULT_BLOCK_SIZE,
            ),
            staging_dir: None,
        }
    }
}

/// Everything a block needs, fixed before the first block runs.
#[derive(Debug, Clone, PartialEq)]
pub struct DemRunConfig {
    pub product: Product,
    pub bbox: GeographicBoundingBox,
    pub target: TargetCrs,
    pub staging_path: PathBuf,
    pub geo_transform: GeoTransform,
    pub footprint: ProjectedExtent,
}

impl DemRunConfig {
    pub fn new(template: &TemplateGridSpec, options: &DemOptions) -> Result<Self> {
        let projector = CoordinateProjector::new(&template.projection)
            .context("Failed to interpret the template image's CRS")?;
        let target = projector.target_crs()?;
        let bbox = bounding_box_for(&template.extent, &projector, options.buffer_degrees)?;

        let dir = options
            .staging_dir
            .clone()
            .unwrap_or_else(|| template.directory());
        let staging_path = StagingKey {
            product: options.product,
            bbox,
            target,
        }
        .path_in(&dir);

        Ok(Self {
            product: options.product,
            bbox,
            target,
            staging_path,
            geo_transform: template.geo_transform,
            footprint: template.extent,
        })
    }

    pub fn staging_request(&self) -> StagingRequest {
        StagingRequest {
            product: self.product,
            bbox: self.bbox,
            target: self.target,
            path: self.staging_path.clone(),
            footprint: Some(self.footprint),
        }
    }
}

/// Write a Float32 DEM on `template_path`'s grid to `outfile`.
///
/// The staged elevation raster is produced (or reused) when the first block
/// is computed. Pixels the staged raster does not cover are [`NODATA`].
pub fn make_dem_image<F: ElevationFetcher, R: Reprojector>(
    template_path: &Path,
    outfile: &Path,
    options: &DemOptions,
    cache: &ElevationStagingCache<F, R>,
) -> Result<()> {
    let template = TemplateGridSpec::open(template_path)?
        .with_block_size(options.block_size.0, options.block_size.1);
    let run = DemRunConfig::new(&template, options)?;
    info!(
        "DEM {} in {}, bounds ({:.4}, {:.4}, {:.4}, {:.4}), staging {:?}",
        run.product,
        run.target,
        run.bbox.lon_min,
        run.bbox.lat_min,
        run.bbox.lon_max,
        run.bbox.lat_max,
        run.staging_path
    );

    let request = run.staging_request();
    let mut output = GeoTiffWriter::new().create_aligned::<f32>(
        &template,
        outfile,
        Some(NODATA as f64),
        &[("DEM_PRODUCT", run.product.name())],
    )?;

    template
        .block_driver()
        .apply(&template, &mut output, |block| {
            let staged = cache.ensure_staged(&request)?;
            let coords = BlockCoords::for_window(&block.geo_transform, &block.window);
            let values = resample(&coords, &staged)?;
            debug!(
                "Resampled block {}/{} ({}x{})",
                block.index + 1,
                block.total,
                block.window.rows,
                block.window.cols
            );
            Ok(values)
        })?;

    info!("DEM written: {:?}", outfile);
    Ok(())
}
