//! Elevation products and the fetcher that clips them to a bounding box.

pub mod download;
pub mod srtm;

use anyhow::{Context, Result};
use rayon::prelude::*;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};

use crate::bbox::GeographicBoundingBox;
use crate::writer::{GeoTiffWriter, RasterSpec};
use self::download::{TileDownloader, TileFile};
use self::srtm::{HgtTile, SampleGrid, TileId, SRTM_VOID};

/// Elevation product to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Product {
    /// 1 arc-second SRTM.
    Srtm1,
    /// 3 arc-second SRTM.
    #[default]
    Srtm3,
}

impl Product {
    pub fn name(&self) -> &'static str {
        match self {
            Product::Srtm1 => "SRTM1",
            Product::Srtm3 => "SRTM3",
        }
    }

    /// Samples along each edge of a 1° tile.
    pub fn samples(&self) -> usize {
        match self {
            Product::Srtm1 => 3601,
            Product::Srtm3 => 1201,
        }
    }

    pub fn default_url_template(&self) -> &'static str {
        match self {
            Product::Srtm1 => {
                "https://s3.amazonaws.com/elevation-tiles-prod/skadi/{lat_dir}/{name}.hgt.gz"
            }
            Product::Srtm3 => "https://terrain.ardupilot.org/SRTM3/{continent}/{name}.hgt.zip",
        }
    }
}

impl fmt::Display for Product {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Product {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "SRTM1" => Ok(Product::Srtm1),
            "SRTM3" => Ok(Product::Srtm3),
            _ => Err(format!("unknown elevation product '{}' (expected SRTM1 or SRTM3)", s)),
        }
    }
}

/// Source of unprojected elevation rasters.
pub trait ElevationFetcher: Send + Sync {
    /// Write `product` clipped to `bbox` as a GeoTIFF at `output`, in
    /// geographic coordinates.
    fn fetch(&self, bbox: &GeographicBoundingBox, product: Product, output: &Path) -> Result<()>;

    /// Tidy the fetcher's own download cache. Called after every fetch,
    /// successful or not.
    fn clean(&self) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetcherConfig {
    pub cache_dir: PathBuf,
    /// Overrides the product's default tile URL.
    pub url_template: Option<String>,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            url_template: None,
            timeout_secs: 300,
            max_retries: 3,
        }
    }
}

/// `$XDG_CACHE_HOME/landsat-dem`, falling back to `~/.cache/landsat-dem`.
pub fn default_cache_dir() -> PathBuf {
    let base = std::env::var_os("XDG_CACHE_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".cache")))
        .unwrap_or_else(std::env::temp_dir);
    base.join("landsat-dem")
}

/// Largest mosaic [`SrtmFetcher`] will assemble in memory, in cells.
pub const MAX_MOSAIC_CELLS: usize = 250_000_000;

/// Downloads SRTM tiles and mosaics them onto the sample lattice.
pub struct SrtmFetcher {
    config: FetcherConfig,
    writer: GeoTiffWriter,
}

impl SrtmFetcher {
    pub fn new(config: FetcherConfig) -> Self {
        Self {
            config,
            writer: GeoTiffWriter::new(),
        }
    }

    fn downloader(&self, product: Product) -> Result<TileDownloader> {
        TileDownloader::new(
            product,
            self.config.url_template.as_deref(),
            &self.config.cache_dir,
            self.config.timeout_secs,
            self.config.max_retries,
        )
    }
}

impl ElevationFetcher for SrtmFetcher {
    fn fetch(&self, bbox: &GeographicBoundingBox, product: Product, output: &Path) -> Result<()> {
        let grid = SampleGrid::covering(bbox, product.samples());
        if grid.cells() > MAX_MOSAIC_CELLS {
            anyhow::bail!(
                "{} grid {}x{} for bounds ({:.4}, {:.4}, {:.4}, {:.4}) exceeds {} cells",
                product,
                grid.cols,
                grid.rows,
                bbox.lon_min,
                bbox.lat_min,
                bbox.lon_max,
                bbox.lat_max,
                MAX_MOSAIC_CELLS
            );
        }
        let tiles = grid.tiles();
        info!(
            "{} grid {}x{} from {} tile(s)",
            product,
            grid.cols,
            grid.rows,
            tiles.len()
        );

        let downloader = self.downloader(product)?;
        let files: Vec<(TileId, TileFile)> = tiles
            .par_iter()
            .map(|&tile| downloader.ensure_tile(tile).map(|file| (tile, file)))
            .collect::<Result<_>>()?;

        let mut loaded = HashMap::new();
        for (tile, file) in files {
            let TileFile::Present(path) = file else {
                debug!("Tile {} is void", tile);
                continue;
            };
            let hgt = HgtTile::from_file(tile, &path)
                .with_context(|| format!("Failed to read tile {:?}", path))?;
            if hgt.samples != product.samples() {
                anyhow::bail!(
                    "Tile {:?} has {} samples per edge, expected {} for {}",
                    path,
                    hgt.samples,
                    product.samples(),
                    product
                );
            }
            loaded.insert(tile, hgt);
        }

        if loaded.is_empty() {
            anyhow::bail!("No {} data covers the requested bounding box", product);
        }

        let values = grid.mosaic(&loaded);
        let spec = RasterSpec::geographic(
            grid.rows,
            grid.cols,
            grid.geo_transform(),
            Some(SRTM_VOID as f64),
        )?;
        self.writer
            .write_raster(&spec, values, output, &[("DEM_PRODUCT", product.name())])
    }

    fn clean(&self) -> Result<()> {
        for product in [Product::Srtm1, Product::Srtm3] {
            self.downloader(product)?.clean()?;
        }
        Ok(())
    }
}
