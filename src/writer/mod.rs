use anyhow::{Context, Result};
use gdal::raster::{Buffer, GdalType};
use gdal::spatial_ref::SpatialRef;
use gdal::{Dataset, DriverManager, Metadata};
use std::path::Path;

use crate::geotransform::GeoTransform;
use crate::template::TemplateGridSpec;

/// Georeferencing and size of a whole single-band raster.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterSpec {
    pub rows: usize,
    pub cols: usize,
    pub geo_transform: GeoTransform,
    /// WKT of the raster's CRS.
    pub projection: String,
    pub nodata: Option<f64>,
}

impl RasterSpec {
    /// Raster in WGS84 longitude/latitude.
    pub fn geographic(
        rows: usize,
        cols: usize,
        geo_transform: GeoTransform,
        nodata: Option<f64>,
    ) -> Result<Self> {
        let srs = SpatialRef::from_epsg(4326).context("Failed to create SpatialRef from EPSG:4326")?;
        let projection = srs
            .to_wkt()
            .context("Failed to convert SpatialRef to WKT")?;
        Ok(Self {
            rows,
            cols,
            geo_transform,
            projection,
            nodata,
        })
    }
}

#[derive(Default)]
pub struct GeoTiffWriter {}

impl GeoTiffWriter {
    pub fn new() -> Self {
        Self {}
    }

    /// Create an empty single-band GeoTIFF on the template's exact grid.
    ///
    /// The returned dataset is filled block by block by the caller and
    /// flushed when dropped.
    pub fn create_aligned<T: GdalType>(
        &self,
        template: &TemplateGridSpec,
        output_path: &Path,
        nodata: Option<f64>,
        metadata: &[(&str, &str)],
    ) -> Result<Dataset> {
        let spec = RasterSpec {
            rows: template.rows,
            cols: template.cols,
            geo_transform: template.geo_transform,
            projection: template.projection.clone(),
            nodata,
        };
        self.create::<T>(&spec, output_path, metadata)
    }

    /// Write a complete single-band Float32 raster.
    pub fn write_raster(
        &self,
        spec: &RasterSpec,
        values: Vec<f32>,
        output_path: &Path,
        metadata: &[(&str, &str)],
    ) -> Result<()> {
        if values.len() != spec.rows * spec.cols {
            anyhow::bail!(
                "Raster has {} values, expected {}x{}",
                values.len(),
                spec.rows,
                spec.cols
            );
        }

        tracing::debug!(
            "Writing {}x{} GeoTIFF: {:?}",
            spec.cols,
            spec.rows,
            output_path
        );

        let dataset = self.create::<f32>(spec, output_path, metadata)?;
        let mut band = dataset.rasterband(1).context("Failed to get raster band")?;

        // Row-major, as GDAL expects.
        let mut buffer = Buffer::new((spec.cols, spec.rows), values);
        band.write((0, 0), (spec.cols, spec.rows), &mut buffer)
            .context("Failed to write raster data")?;

        Ok(())
    }

    fn create<T: GdalType>(
        &self,
        spec: &RasterSpec,
        output_path: &Path,
        metadata: &[(&str, &str)],
    ) -> Result<Dataset> {
        let driver =
            DriverManager::get_driver_by_name("GTiff").context("Failed to get GTiff driver")?;

        let mut dataset = driver
            .create_with_band_type::<T, _>(output_path, spec.cols, spec.rows, 1)
            .with_context(|| format!("Failed to create dataset {:?}", output_path))?;

        self.set_geo_metadata(&mut dataset, spec, metadata)?;

        if let Some(nodata) = spec.nodata {
            let mut band = dataset.rasterband(1).context("Failed to get raster band")?;
            band.set_no_data_value(Some(nodata))
                .context("Failed to set no data value")?;
        }

        Ok(dataset)
    }

    fn set_geo_metadata(
        &self,
        dataset: &mut Dataset,
        spec: &RasterSpec,
        metadata: &[(&str, &str)],
    ) -> Result<()> {
        dataset
            .set_geo_transform(&spec.geo_transform.coefficients())
            .context("Failed to set geo transform")?;

        if spec.projection.is_empty() {
            tracing::warn!("Writing raster without a coordinate reference system");
        } else {
            dataset
                .set_projection(&spec.projection)
                .context("Failed to set projection")?;
        }

        for (key, value) in metadata {
            dataset
                .set_metadata_item(key, value, "")
                .with_context(|| format!("Failed to set {} metadata", key))?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BlockDriver;
    use crate::resample::NODATA;
    use tempfile::TempDir;

    fn init_gdal() -> bool {
        DriverManager::get_driver_by_name("GTiff").is_ok()
    }

    fn utm_wkt() -> Option<String> {
        SpatialRef::from_epsg(32633).ok()?.to_wkt().ok()
    }

    #[test]
    fn test_write_raster() {
        if !init_gdal() {
            eprintln!("Skipping test: GTiff driver not available");
            return;
        }
        let temp_dir = TempDir::new().unwrap();
        let output_path = temp_dir.path().join("clip.tif");

        let gt = GeoTransform::north_up(139.0, 36.0, 0.001, 0.001);
        let Ok(spec) = RasterSpec::geographic(2, 3, gt, Some(NODATA as f64)) else {
            eprintln!("Skipping test: PROJ database not available");
            return;
        };
        let writer = GeoTiffWriter::new();
        writer
            .write_raster(
                &spec,
                vec![1.0, 2.0, 3.0, 4.0, 5.0, NODATA],
                &output_path,
                &[("DEM_PRODUCT", "SRTM3")],
            )
            .unwrap();

        let dataset = Dataset::open(&output_path).unwrap();
        assert_eq!(dataset.raster_size(), (3, 2));
        assert_eq!(dataset.geo_transform().unwrap(), gt.coefficients());
        assert_eq!(
            dataset.metadata_item("DEM_PRODUCT", "").as_deref(),
            Some("SRTM3")
        );

        let band = dataset.rasterband(1).unwrap();
        assert_eq!(band.no_data_value(), Some(NODATA as f64));
    }

    #[test]
    fn test_write_raster_rejects_wrong_length() {
        let gt = GeoTransform::north_up(0.0, 0.0, 1.0, 1.0);
        let spec = RasterSpec {
            rows: 2,
            cols: 2,
            geo_transform: gt,
            projection: String::new(),
            nodata: None,
        };
        let temp_dir = TempDir::new().unwrap();
        let result =
            GeoTiffWriter::new().write_raster(&spec, vec![0.0; 3], &temp_dir.path().join("x.tif"), &[]);
        assert!(result.is_err());
    }

    #[test]
    fn test_create_aligned_matches_template() {
        if !init_gdal() {
            eprintln!("Skipping test: GTiff driver not available");
            return;
        }
        let Some(wkt) = utm_wkt() else {
            eprintln!("Skipping test: PROJ database not available");
            return;
        };
        let temp_dir = TempDir::new().unwrap();
        let output_path = temp_dir.path().join("aligned.tif");

        let gt = GeoTransform::new([500000.0, 30.0, 0.0, 4000000.0, 0.0, -30.0]);
        let template = TemplateGridSpec::new("B1.TIF", 5, 7, gt, wkt).with_block_size(2, 3);

        let writer = GeoTiffWriter::new();
        {
            let mut dataset = writer
                .create_aligned::<u8>(&template, &output_path, None, &[])
                .unwrap();
            BlockDriver::new(2, 3)
                .apply(&template, &mut dataset, |info| {
                    let w = info.window;
                    let data = (0..w.rows)
                        .flat_map(|r| (0..w.cols).map(move |c| ((w.row_off + r) * 7 + w.col_off + c) as u8))
                        .collect();
                    Ok(crate::block::Block { rows: w.rows, cols: w.cols, data })
                })
                .unwrap();
        }

        let dataset = Dataset::open(&output_path).unwrap();
        assert_eq!(dataset.raster_size(), (7, 5));
        assert_eq!(dataset.geo_transform().unwrap(), gt.coefficients());

        let band = dataset.rasterband(1).unwrap();
        let buffer = band.read_as::<u8>((0, 0), (7, 5), (7, 5), None).unwrap();
        let expected: Vec<u8> = (0..35).collect();
        assert_eq!(buffer.data(), &expected[..]);
    }
}
