use tracing::debug;

use crate::error::{DemError, Result};
use crate::projection::CoordinateProjector;

/// Margin added around a scene's geographic footprint so the elevation clip
/// still covers the scene after reprojection distortion.
pub const DEFAULT_BUFFER_DEGREES: f64 = 0.2;

/// Axis-aligned extent in a template's projected coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectedExtent {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

impl ProjectedExtent {
    pub fn corners(&self) -> [(f64, f64); 4] {
        [
            (self.x_min, self.y_min),
            (self.x_min, self.y_max),
            (self.x_max, self.y_min),
            (self.x_max, self.y_max),
        ]
    }

    /// True if `other` lies entirely inside this extent, allowing `tolerance`
    /// of slack on each edge.
    pub fn contains(&self, other: &ProjectedExtent, tolerance: f64) -> bool {
        other.x_min >= self.x_min - tolerance
            && other.x_max <= self.x_max + tolerance
            && other.y_min >= self.y_min - tolerance
            && other.y_max <= self.y_max + tolerance
    }
}

/// Longitude/latitude box in WGS84 degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeographicBoundingBox {
    pub lon_min: f64,
    pub lon_max: f64,
    pub lat_min: f64,
    pub lat_max: f64,
}

impl GeographicBoundingBox {
    pub fn new(lon_min: f64, lon_max: f64, lat_min: f64, lat_max: f64) -> Result<Self> {
        let finite = [lon_min, lon_max, lat_min, lat_max]
            .iter()
            .all(|v| v.is_finite());
        if !finite || lon_min > lon_max || lat_min > lat_max {
            return Err(DemError::InvalidBoundingBox {
                lon_min,
                lon_max,
                lat_min,
                lat_max,
            });
        }

        Ok(Self {
            lon_min,
            lon_max,
            lat_min,
            lat_max,
        })
    }

    /// True when the box runs east past 180°, i.e. `lon_max` is expressed
    /// in the 180..540 range.
    pub fn crosses_antimeridian(&self) -> bool {
        self.lon_max > 180.0
    }

    /// Grow the box by `degrees` on every side, clamped to valid ranges.
    ///
    /// A box that already crosses the antimeridian keeps growing east.
    pub fn buffered(&self, degrees: f64) -> Self {
        let lon_max = self.lon_max + degrees;
        Self {
            lon_min: (self.lon_min - degrees).max(-180.0),
            lon_max: if self.crosses_antimeridian() {
                lon_max
            } else {
                lon_max.min(180.0)
            },
            lat_min: (self.lat_min - degrees).max(-90.0),
            lat_max: (self.lat_max + degrees).min(90.0),
        }
    }

    /// `(lon_min, lat_min, lon_max, lat_max)`, i.e. left/bottom/right/top.
    pub fn as_bounds(&self) -> (f64, f64, f64, f64) {
        (self.lon_min, self.lat_min, self.lon_max, self.lat_max)
    }

    pub fn contains_point(&self, lon: f64, lat: f64) -> bool {
        let lons = self.lon_min..=self.lon_max;
        let lon_in = lons.contains(&lon)
            || (self.crosses_antimeridian() && lons.contains(&(lon + 360.0)));
        lon_in && (self.lat_min..=self.lat_max).contains(&lat)
    }
}

/// Shift western longitudes east by 360° when the points straddle the
/// antimeridian, so that min/max give the short way round.
///
/// A set of corners spanning more than 180° of longitude is taken to cross
/// 180°; a Landsat scene is never that wide.
pub fn unwrap_longitudes(lons: &mut [f64]) {
    for lon in lons.iter_mut().filter(|lon| !(-180.0..=180.0).contains(&**lon)) {
        *lon = (*lon + 180.0).rem_euclid(360.0) - 180.0;
    }
    let (lo, hi) = min_max(lons);
    if hi - lo > 180.0 {
        for lon in lons.iter_mut().filter(|lon| **lon < 0.0) {
            *lon += 360.0;
        }
    }
}

fn min_max(values: &[f64]) -> (f64, f64) {
    values.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
        (lo.min(v), hi.max(v))
    })
}

/// Geographic box covering a projected extent, expanded by `buffer_degrees`.
///
/// All four corners are converted; projections whose axes are rotated or
/// flipped relative to lon/lat still get a box that covers the whole extent.
pub fn bounding_box_for(
    extent: &ProjectedExtent,
    projector: &CoordinateProjector,
    buffer_degrees: f64,
) -> Result<GeographicBoundingBox> {
    let corners = extent.corners();
    let mut xs: Vec<f64> = corners.iter().map(|c| c.0).collect();
    let mut ys: Vec<f64> = corners.iter().map(|c| c.1).collect();
    projector.to_geographic_many(&mut xs, &mut ys)?;
    unwrap_longitudes(&mut xs);

    let (lon_min, lon_max) = min_max(&xs);
    let (lat_min, lat_max) = min_max(&ys);

    let bbox = GeographicBoundingBox::new(lon_min, lon_max, lat_min, lat_max)?;
    debug!(
        "Scene footprint: lon {:.4}..{:.4}, lat {:.4}..{:.4}",
        bbox.lon_min, bbox.lon_max, bbox.lat_min, bbox.lat_max
    );
    if bbox.crosses_antimeridian() {
        debug!("Scene footprint crosses the antimeridian");
    }

    Ok(bbox.buffered(buffer_degrees))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_inverted_box() {
        assert!(GeographicBoundingBox::new(10.0, 9.0, 0.0, 1.0).is_err());
        assert!(GeographicBoundingBox::new(0.0, 1.0, 5.0, 4.0).is_err());
        assert!(GeographicBoundingBox::new(f64::NAN, 1.0, 0.0, 1.0).is_err());
    }

    #[test]
    fn test_buffer_and_clamp() {
        let bbox = GeographicBoundingBox::new(179.9, 180.0, -89.95, 10.0)
            .unwrap()
            .buffered(0.2);
        assert_eq!(bbox.lon_max, 180.0);
        assert_eq!(bbox.lat_min, -90.0);
        assert!((bbox.lon_min - 179.7).abs() < 1e-9);
        assert!((bbox.lat_max - 10.2).abs() < 1e-9);
    }

    #[test]
    fn test_bounds_order() {
        let bbox = GeographicBoundingBox::new(1.0, 2.0, 3.0, 4.0).unwrap();
        assert_eq!(bbox.as_bounds(), (1.0, 3.0, 2.0, 4.0));
    }

    #[test]
    fn test_extent_contains() {
        let outer = ProjectedExtent {
            x_min: 0.0,
            x_max: 100.0,
            y_min: 0.0,
            y_max: 100.0,
        };
        let inner = ProjectedExtent {
            x_min: 10.0,
            x_max: 100.5,
            y_min: 0.0,
            y_max: 50.0,
        };
        assert!(!outer.contains(&inner, 0.0));
        assert!(outer.contains(&inner, 1.0));
    }

    #[test]
    fn test_bounding_box_for_utm_scene() {
        let projector = match CoordinateProjector::new("EPSG:32633") {
            Ok(p) => p,
            Err(e) => {
                eprintln!("Skipping test: PROJ database not available ({})", e);
                return;
            }
        };

        // ~185 km Landsat scene straddling the zone 33 central meridian.
        let extent = ProjectedExtent {
            x_min: 407500.0,
            x_max: 592500.0,
            y_min: 4907500.0,
            y_max: 5092500.0,
        };
        let bbox = bounding_box_for(&extent, &projector, DEFAULT_BUFFER_DEGREES).unwrap();

        assert!(bbox.lon_min < bbox.lon_max);
        assert!(bbox.lat_min < bbox.lat_max);
        for (x, y) in extent.corners() {
            let (lon, lat) = projector.to_geographic(x, y).unwrap();
            assert!(bbox.contains_point(lon, lat));
        }
        assert!(bbox.contains_point(15.0, 45.0));
    }

    #[test]
    fn test_unwrap_longitudes_across_antimeridian() {
        let mut lons = [179.3, -179.3, 179.35, -179.25];
        unwrap_longitudes(&mut lons);
        assert_eq!(min_max(&lons), (179.3, 180.75));

        // Ordinary scenes are left alone, even west of Greenwich.
        let mut lons = [-1.5, 0.5, -1.25, 0.75];
        unwrap_longitudes(&mut lons);
        assert_eq!(lons, [-1.5, 0.5, -1.25, 0.75]);

        // Out-of-range longitudes are folded back before unwrapping.
        let mut lons = [-181.0, -178.5];
        unwrap_longitudes(&mut lons);
        assert_eq!(lons, [179.0, 181.5]);
    }

    #[test]
    fn test_crossing_box_buffers_east_and_contains_wrapped_points() {
        let bbox = GeographicBoundingBox::new(179.3, 180.75, 51.0, 52.0)
            .unwrap()
            .buffered(0.2);
        assert!(bbox.crosses_antimeridian());
        assert!((bbox.lon_max - 180.95).abs() < 1e-9);
        assert!(bbox.contains_point(179.8, 51.5));
        assert!(bbox.contains_point(-179.5, 51.5));
        assert!(!bbox.contains_point(-178.5, 51.5));
        assert!(!GeographicBoundingBox::new(10.0, 11.0, 0.0, 1.0)
            .unwrap()
            .crosses_antimeridian());
    }

    #[test]
    fn test_bounding_box_for_scene_across_antimeridian() {
        let projector = match CoordinateProjector::new("EPSG:32601") {
            Ok(p) => p,
            Err(e) => {
                eprintln!("Skipping test: PROJ database not available ({})", e);
                return;
            }
        };

        // Zone 1 scene west of its central meridian (177W) reaching into 179E.
        let extent = ProjectedExtent {
            x_min: 200000.0,
            x_max: 380000.0,
            y_min: 5650000.0,
            y_max: 5830000.0,
        };
        let bbox = bounding_box_for(&extent, &projector, DEFAULT_BUFFER_DEGREES).unwrap();

        assert!(bbox.crosses_antimeridian());
        assert!(bbox.lon_min > 170.0);
        assert!(bbox.lon_max - bbox.lon_min < 10.0);
        for (x, y) in extent.corners() {
            let (lon, lat) = projector.to_geographic(x, y).unwrap();
            assert!(bbox.contains_point(lon, lat), "({}, {})", lon, lat);
        }
    }
}
