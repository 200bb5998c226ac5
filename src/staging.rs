//! Staged elevation rasters and the cache that produces them.
//!
//! A staged raster is the elevation product clipped to a scene's buffered
//! footprint and warped into the scene's CRS. It is written once next to the
//! template image and reused by every block of the run, and by later runs
//! that ask for the same footprint, product and CRS.

use anyhow::{anyhow, Context, Result};
use gdal::Dataset;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

use crate::bbox::{GeographicBoundingBox, ProjectedExtent};
use crate::fetch::{ElevationFetcher, Product};
use crate::geotransform::GeoTransform;
use crate::projection::TargetCrs;
use crate::reproject::Reprojector;

/// Elevation samples plus the transform that places them.
#[derive(Debug, Clone, PartialEq)]
pub struct StagedElevationRaster {
    pub rows: usize,
    pub cols: usize,
    pub geo_transform: GeoTransform,
    /// Row-major samples.
    pub values: Vec<f32>,
    pub nodata: Option<f64>,
}

impl StagedElevationRaster {
    pub fn from_parts(
        rows: usize,
        cols: usize,
        geo_transform: GeoTransform,
        values: Vec<f32>,
        nodata: Option<f64>,
    ) -> Self {
        debug_assert_eq!(values.len(), rows * cols);
        Self {
            rows,
            cols,
            geo_transform,
            values,
            nodata,
        }
    }

    pub fn open(path: &Path) -> Result<Self> {
        let dataset = Dataset::open(path)
            .with_context(|| format!("Failed to open staged elevation raster {:?}", path))?;
        let (cols, rows) = dataset.raster_size();
        let geo_transform = GeoTransform::new(
            dataset
                .geo_transform()
                .context("Staged elevation raster has no geotransform")?,
        );

        let band = dataset.rasterband(1).context("Failed to get raster band")?;
        let nodata = band.no_data_value();
        let buffer = band
            .read_as::<f32>((0, 0), (cols, rows), (cols, rows), None)
            .context("Failed to read staged elevation data")?;

        Ok(Self::from_parts(
            rows,
            cols,
            geo_transform,
            buffer.data().to_vec(),
            nodata,
        ))
    }

    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.values[row * self.cols + col]
    }

    pub fn extent(&self) -> ProjectedExtent {
        self.geo_transform.extent(self.rows, self.cols)
    }

    /// True if the raster covers `footprint`, allowing one staged pixel of slack.
    pub fn covers(&self, footprint: &ProjectedExtent) -> bool {
        let [_, a, b, _, d, e] = self.geo_transform.coefficients();
        let tolerance = (a.abs() + b.abs()).max(d.abs() + e.abs());
        self.extent().contains(footprint, tolerance)
    }
}

/// Identity of a staged raster: what was fetched, where, and into which CRS.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StagingKey {
    pub product: Product,
    pub bbox: GeographicBoundingBox,
    pub target: TargetCrs,
}

impl StagingKey {
    /// First 16 hex digits of SHA-256 over a canonical text form of the key.
    pub fn fingerprint(&self) -> String {
        let canonical = format!(
            "{}|{:.6}|{:.6}|{:.6}|{:.6}|{}",
            self.product.name(),
            self.bbox.lon_min,
            self.bbox.lat_min,
            self.bbox.lon_max,
            self.bbox.lat_max,
            self.target
        );
        let digest = Sha256::digest(canonical.as_bytes());
        digest.iter().take(8).map(|b| format!("{:02x}", b)).collect()
    }

    pub fn file_name(&self) -> String {
        format!("DEM_{}_{}.tif", self.product.name(), self.fingerprint())
    }

    pub fn path_in(&self, dir: &Path) -> PathBuf {
        dir.join(self.file_name())
    }
}

/// Everything needed to stage (or reuse) one elevation raster.
#[derive(Debug, Clone, PartialEq)]
pub struct StagingRequest {
    pub product: Product,
    pub bbox: GeographicBoundingBox,
    pub target: TargetCrs,
    pub path: PathBuf,
    /// Projected extent the staged raster must cover to be reused.
    pub footprint: Option<ProjectedExtent>,
}

/// Lazily fetches, reprojects and loads staged elevation rasters.
///
/// Staging is single-flight within a process: concurrent callers asking for
/// the same path wait on one lock and share the loaded raster. Nothing guards
/// the staging file against other processes.
pub struct ElevationStagingCache<F, R> {
    fetcher: F,
    reprojector: R,
    staged: Mutex<HashMap<PathBuf, Arc<StagedElevationRaster>>>,
}

impl<F: ElevationFetcher, R: Reprojector> ElevationStagingCache<F, R> {
    pub fn new(fetcher: F, reprojector: R) -> Self {
        Self {
            fetcher,
            reprojector,
            staged: Mutex::new(HashMap::new()),
        }
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    pub fn ensure_staged(&self, request: &StagingRequest) -> Result<Arc<StagedElevationRaster>> {
        let mut staged = self
            .staged
            .lock()
            .map_err(|_| anyhow!("Staging cache lock was poisoned"))?;

        if let Some(raster) = staged.get(&request.path) {
            return Ok(Arc::clone(raster));
        }

        let raster = Arc::new(self.load_or_stage(request)?);
        staged.insert(request.path.clone(), Arc::clone(&raster));
        Ok(raster)
    }

    fn load_or_stage(&self, request: &StagingRequest) -> Result<StagedElevationRaster> {
        if request.path.exists() {
            let raster = StagedElevationRaster::open(&request.path)?;
            match &request.footprint {
                Some(footprint) if !raster.covers(footprint) => {
                    warn!(
                        "Staged DEM {:?} does not cover the scene footprint; fetching again",
                        request.path
                    );
                    fs::remove_file(&request.path).with_context(|| {
                        format!("Failed to remove stale staged DEM {:?}", request.path)
                    })?;
                }
                _ => {
                    info!("Reusing staged DEM: {:?}", request.path);
                    return Ok(raster);
                }
            }
        }

        self.stage(request)?;
        StagedElevationRaster::open(&request.path)
    }

    fn stage(&self, request: &StagingRequest) -> Result<()> {
        let unprojected = sibling(&request.path, "unprojected");
        let partial = sibling(&request.path, "partial");

        let (left, bottom, right, top) = request.bbox.as_bounds();
        info!(
            "Fetching {} for bounds ({:.4}, {:.4}, {:.4}, {:.4})",
            request.product.name(),
            left,
            bottom,
            right,
            top
        );

        let fetched = self
            .fetcher
            .fetch(&request.bbox, request.product, &unprojected);
        if let Err(e) = self.fetcher.clean() {
            warn!("Elevation cache maintenance failed: {:#}", e);
        }
        if let Err(e) = fetched {
            let _ = fs::remove_file(&unprojected);
            return Err(e.context(format!("Failed to fetch {}", request.product.name())));
        }

        info!("Reprojecting DEM to {}", request.target);
        let warped = self
            .reprojector
            .reproject(&unprojected, &partial, request.target.epsg);
        let _ = fs::remove_file(&unprojected);
        if let Err(e) = warped {
            let _ = fs::remove_file(&partial);
            return Err(e.context(format!("Failed to reproject DEM to {}", request.target)));
        }

        fs::rename(&partial, &request.path).with_context(|| {
            format!("Failed to move staged DEM into place at {:?}", request.path)
        })?;
        info!("Staged DEM written: {:?}", request.path);

        Ok(())
    }
}

/// `dir/DEM_x.tif` -> `dir/DEM_x.<tag>.tif`
fn sibling(path: &Path, tag: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("DEM");
    path.with_file_name(format!("{}.{}.tif", stem, tag))
}
