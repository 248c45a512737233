//! Coordinate reference systems and transforms to geodetic longitude/latitude.

use gdal::spatial_ref::{AxisMappingStrategy, CoordTransform, SpatialRef};
use gdal::Dataset;
use geo::Coord;

use crate::error::{Error, Result};

/// Radius of the sphere underlying the VIIRS/MODIS sinusoidal grid, metres.
pub const SINUSOIDAL_RADIUS: f64 = 6_371_007.181;

/// A coordinate reference system, kept as the definition string it was built from
/// (PROJ string, WKT or anything GDAL's `SetFromUserInput` accepts).
#[derive(Debug, Clone, PartialEq)]
pub struct Crs {
    definition: String,
}

impl Crs {
    pub fn new(definition: impl Into<String>) -> Self {
        Self {
            definition: definition.into().trim().to_string(),
        }
    }

    /// The sinusoidal projection of the VIIRS land tile grid.
    pub fn viirs_sinusoidal() -> Self {
        Self::new(format!(
            "+proj=sinu +lon_0=0 +x_0=0 +y_0=0 +R={} +units=m +no_defs",
            SINUSOIDAL_RADIUS
        ))
    }

    pub fn definition(&self) -> &str {
        &self.definition
    }

    pub fn from_dataset(dataset: &Dataset) -> Result<Self> {
        let wkt = dataset.projection();
        if wkt.trim().is_empty() {
            return Err(Error::Metadata(
                "dataset carries no coordinate reference system".to_string(),
            ));
        }
        Ok(Crs::new(wkt))
    }

    pub fn to_spatial_ref(&self) -> Result<SpatialRef> {
        Ok(SpatialRef::from_definition(&self.definition)?)
    }

    pub fn to_wkt(&self) -> Result<String> {
        Ok(self.to_spatial_ref()?.to_wkt()?)
    }

    /// Same text, or the same CRS according to GDAL.
    pub fn is_equivalent(&self, other: &Crs) -> bool {
        if self.definition == other.definition {
            return true;
        }
        match (self.to_spatial_ref(), other.to_spatial_ref()) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }

    /// Transform from this CRS to geodetic longitude/latitude (degrees).
    pub fn geodetic_transform(&self) -> Result<Box<dyn CoordinateTransform>> {
        Ok(Box::new(GdalTransform::to_geodetic(self)?))
    }
}

/// In-place transform of coordinate arrays into geodetic longitude/latitude.
pub trait CoordinateTransform {
    /// On failure returns [`Error::Reprojection`] naming every input coordinate
    /// that could not be transformed; the buffers are then unspecified.
    fn transform_coords(&self, xs: &mut [f64], ys: &mut [f64]) -> Result<()>;

    fn transform_coord(&self, coord: Coord<f64>) -> Result<Coord<f64>> {
        let mut xs = [coord.x];
        let mut ys = [coord.y];
        self.transform_coords(&mut xs, &mut ys)?;
        Ok(Coord { x: xs[0], y: ys[0] })
    }
}

/// Wraps a longitude into [-180, 180]; values already inside are untouched.
pub fn wrap_longitude(lon: f64) -> f64 {
    if lon.abs() <= 180.0 {
        lon
    } else {
        let turns = ((lon + 180.0) / 360.0).floor();
        lon - 360.0 * turns
    }
}

fn is_geodetic(lon: f64, lat: f64) -> bool {
    lon.is_finite() && lat.is_finite() && lat.abs() <= 90.0
}

/// GDAL/PROJ transform to EPSG:4326 in longitude/latitude order.
///
/// Longitudes come back wrapped into [-180, 180], so points past the edge of a
/// projection's domain land on the far side of the antimeridian. Latitudes
/// outside [-90, 90] (points beyond a pole) are reported as failures.
pub struct GdalTransform {
    transform: CoordTransform,
}

impl GdalTransform {
    pub fn to_geodetic(source: &Crs) -> Result<Self> {
        let mut source_srs = source.to_spatial_ref()?;
        source_srs.set_axis_mapping_strategy(AxisMappingStrategy::TraditionalGisOrder);
        let mut target_srs = SpatialRef::from_epsg(4326)?;
        target_srs.set_axis_mapping_strategy(AxisMappingStrategy::TraditionalGisOrder);

        Ok(Self {
            transform: CoordTransform::new(&source_srs, &target_srs)?,
        })
    }

    fn transforms_cleanly(&self, x: f64, y: f64) -> bool {
        let mut xs = [x];
        let mut ys = [y];
        self.transform
            .transform_coords(&mut xs, &mut ys, &mut [])
            .is_ok()
            && is_geodetic(xs[0], ys[0])
    }
}

impl CoordinateTransform for GdalTransform {
    fn transform_coords(&self, xs: &mut [f64], ys: &mut [f64]) -> Result<()> {
        let original: Vec<(f64, f64)> = xs.iter().copied().zip(ys.iter().copied()).collect();

        let reason = match self.transform.transform_coords(xs, ys, &mut []) {
            Ok(()) if xs.iter().zip(ys.iter()).all(|(&x, &y)| is_geodetic(x, y)) => {
                for x in xs.iter_mut() {
                    *x = wrap_longitude(*x);
                }
                return Ok(());
            }
            Ok(()) => "transform produced coordinates outside the geodetic range".to_string(),
            Err(e) => e.to_string(),
        };

        // GDAL fails the whole batch; retry one by one to name the offenders.
        let coords: Vec<(f64, f64)> = original
            .into_iter()
            .filter(|&(x, y)| !self.transforms_cleanly(x, y))
            .collect();
        Err(Error::Reprojection { coords, reason })
    }
}
