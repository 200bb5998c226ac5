use gdal::spatial_ref::{AxisMappingStrategy, CoordTransform, SpatialRef};
use std::fmt;

use crate::error::{DemError, Result};

const WGS84_EPSG: u32 = 4326;

/// Target coordinate system for the staged elevation raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetCrs {
    pub epsg: u32,
}

impl fmt::Display for TargetCrs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg)
    }
}

/// Converts between a template's projected CRS and WGS84 longitude/latitude.
///
/// Both references use traditional GIS axis order, so callers always pass
/// `(x, y)` and `(lon, lat)` regardless of how the CRS declares its axes.
pub struct CoordinateProjector {
    srs: SpatialRef,
    to_geographic: CoordTransform,
    to_projected: CoordTransform,
}

impl CoordinateProjector {
    /// Build a projector from a WKT, PROJ string or `EPSG:n` definition.
    pub fn new(definition: &str) -> Result<Self> {
        let mut srs = SpatialRef::from_definition(definition)?;
        srs.set_axis_mapping_strategy(AxisMappingStrategy::TraditionalGisOrder);

        let mut wgs84 = SpatialRef::from_epsg(WGS84_EPSG)?;
        wgs84.set_axis_mapping_strategy(AxisMappingStrategy::TraditionalGisOrder);

        let to_geographic = CoordTransform::new(&srs, &wgs84)?;
        let to_projected = CoordTransform::new(&wgs84, &srs)?;

        Ok(Self {
            srs,
            to_geographic,
            to_projected,
        })
    }

    pub fn to_geographic(&self, x: f64, y: f64) -> Result<(f64, f64)> {
        let mut xs = [x];
        let mut ys = [y];
        let mut zs = [0.0_f64];
        self.to_geographic
            .transform_coords(&mut xs, &mut ys, &mut zs)?;
        Ok((xs[0], ys[0]))
    }

    pub fn to_projected(&self, lon: f64, lat: f64) -> Result<(f64, f64)> {
        let mut xs = [lon];
        let mut ys = [lat];
        let mut zs = [0.0_f64];
        self.to_projected
            .transform_coords(&mut xs, &mut ys, &mut zs)?;
        Ok((xs[0], ys[0]))
    }

    /// Batch form of [`to_geographic`](Self::to_geographic), in place.
    pub fn to_geographic_many(&self, xs: &mut [f64], ys: &mut [f64]) -> Result<()> {
        let mut zs = vec![0.0_f64; xs.len()];
        self.to_geographic.transform_coords(xs, ys, &mut zs)?;
        Ok(())
    }

    /// EPSG code from the CRS authority record.
    ///
    /// Falls back to GDAL's EPSG auto-identification when the definition
    /// carries no root AUTHORITY node (common for WKT read back from GeoTIFF).
    pub fn target_crs(&self) -> Result<TargetCrs> {
        if let Some(epsg) = epsg_from_authority(&self.srs) {
            return Ok(TargetCrs { epsg });
        }

        let mut identified = self.srs.clone();
        if identified.auto_identify_epsg().is_ok() {
            if let Some(epsg) = epsg_from_authority(&identified) {
                return Ok(TargetCrs { epsg });
            }
        }

        Err(DemError::MissingEpsg(
            self.srs.to_proj4().unwrap_or_else(|_| "<unknown>".to_string()),
        ))
    }
}

fn epsg_from_authority(srs: &SpatialRef) -> Option<u32> {
    let authority = srs.auth_name()?;
    if !authority.eq_ignore_ascii_case("EPSG") {
        return None;
    }
    srs.auth_code().ok().and_then(|code| u32::try_from(code).ok())
}
