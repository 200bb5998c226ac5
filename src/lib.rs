pub mod bbox;
pub mod block;
pub mod dem;
pub mod error;
pub mod fetch;
pub mod geotransform;
pub mod mtl;
pub mod projection;
pub mod qa;
pub mod reproject;
pub mod resample;
pub mod staging;
pub mod template;
pub mod writer;

pub use bbox::{GeographicBoundingBox, ProjectedExtent};
pub use block::{Block, BlockDriver, BlockWindow};
pub use dem::{make_dem_image, DemOptions, DemRunConfig};
pub use error::{DemError, Result};
pub use fetch::{ElevationFetcher, FetcherConfig, Product, SrtmFetcher};
pub use geotransform::GeoTransform;
pub use mtl::{MtlInfo, Sensor};
pub use projection::{CoordinateProjector, TargetCrs};
pub use qa::{make_qa_mask, QaCondition, QaMaskConfig};
pub use reproject::{GdalWarp, Reprojector};
pub use resample::NODATA;
pub use staging::{ElevationStagingCache, StagedElevationRaster};
pub use template::TemplateGridSpec;
pub use writer::GeoTiffWriter;
