//! Footprint geometry: densification, reprojection, simplification and
//! antimeridian handling.

pub mod antimeridian;
pub mod densify;
pub mod simplify;
pub mod validate;

use geo::{Coord, LineString, MultiPolygon, Polygon};

use crate::projection::Crs;

pub use antimeridian::{crosses_antimeridian, normalize, resolve, split, Strategy};
pub use densify::{densify, densify_and_reproject, densify_and_reproject_with, reproject};
pub use simplify::simplify;
pub use validate::{polygon_errors, validate_polygon};

/// A polygon in the native projected CRS of the rasters it was traced from.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedPolygon {
    pub polygon: Polygon<f64>,
    pub crs: Crs,
}

/// Final footprint geometry in (longitude, latitude) degrees.
#[derive(Debug, Clone, PartialEq)]
pub enum GeodeticGeometry {
    Polygon(Polygon<f64>),
    MultiPolygon(MultiPolygon<f64>),
}

impl GeodeticGeometry {
    pub fn polygons(&self) -> Vec<&Polygon<f64>> {
        match self {
            GeodeticGeometry::Polygon(p) => vec![p],
            GeodeticGeometry::MultiPolygon(mp) => mp.0.iter().collect(),
        }
    }

    /// (min lon, min lat, max lon, max lat) over every vertex.
    pub fn bounds(&self) -> Option<[f64; 4]> {
        let mut coords = self
            .polygons()
            .into_iter()
            .flat_map(|p| p.exterior().coords().copied())
            .peekable();
        coords.peek()?;
        let init = [
            f64::INFINITY,
            f64::INFINITY,
            f64::NEG_INFINITY,
            f64::NEG_INFINITY,
        ];
        Some(coords.fold(init, |b, c| {
            [b[0].min(c.x), b[1].min(c.y), b[2].max(c.x), b[3].max(c.y)]
        }))
    }
}

impl From<GeodeticGeometry> for geo::Geometry<f64> {
    fn from(geometry: GeodeticGeometry) -> Self {
        match geometry {
            GeodeticGeometry::Polygon(p) => geo::Geometry::Polygon(p),
            GeodeticGeometry::MultiPolygon(mp) => geo::Geometry::MultiPolygon(mp),
        }
    }
}

/// Drops consecutive duplicate vertices and makes sure the ring is closed.
pub(crate) fn dedup_ring(ring: &LineString<f64>) -> LineString<f64> {
    let mut coords: Vec<Coord<f64>> = Vec::with_capacity(ring.0.len());
    for &c in &ring.0 {
        if coords.last() != Some(&c) {
            coords.push(c);
        }
    }
    if let (Some(&first), Some(&last)) = (coords.first(), coords.last()) {
        if first != last {
            coords.push(first);
        }
    }
    LineString::from(coords)
}

pub(crate) fn map_rings<F>(polygon: &Polygon<f64>, mut f: F) -> Polygon<f64>
where
    F: FnMut(&LineString<f64>) -> LineString<f64>,
{
    Polygon::new(
        f(polygon.exterior()),
        polygon.interiors().iter().map(&mut f).collect(),
    )
}
