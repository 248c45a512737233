//! Detection and resolution of rings that cross the ±180° meridian.
//!
//! A ring crosses when two consecutive vertices are more than 180° of longitude
//! apart: the short way between them runs across the antimeridian. Each such
//! edge is handled on its own, so rings that zig-zag across the meridian
//! several times unwrap into one continuous band of longitudes.

use std::fmt;
use std::str::FromStr;

use geo::orient::{Direction, Orient};
use geo::{Area, BooleanOps, Coord, LineString, MultiPolygon, Polygon, Rect, Translate};

use crate::error::{Error, Result};
use crate::geometry::validate::polygon_errors;
use crate::geometry::{dedup_ring, GeodeticGeometry};

/// How a crossing footprint is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    /// Shift longitudes by ±360° so the ring is continuous; values may leave [-180, 180].
    Normalize,
    /// Cut at ±180° into a multi-polygon whose parts each stay on one side.
    #[default]
    Split,
}

impl FromStr for Strategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "normalize" => Ok(Strategy::Normalize),
            "split" => Ok(Strategy::Split),
            other => Err(Error::InvalidParameter(format!(
                "unknown antimeridian strategy '{}', expected 'normalize' or 'split'",
                other
            ))),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Normalize => write!(f, "normalize"),
            Strategy::Split => write!(f, "split"),
        }
    }
}

fn ring_crosses(ring: &LineString<f64>) -> bool {
    ring.lines().any(|line| line.delta().x.abs() > 180.0)
}

/// Whether any ring has an edge spanning more than 180° of longitude.
pub fn crosses_antimeridian(polygon: &Polygon<f64>) -> bool {
    ring_crosses(polygon.exterior()) || polygon.interiors().iter().any(ring_crosses)
}

/// A ring with the 360° jumps taken out.
pub(crate) struct UnwrappedRing {
    pub coords: Vec<Coord<f64>>,
    /// Longitude offset accumulated by the last vertex; non-zero when the
    /// ring goes once around a pole.
    pub net_shift: f64,
}

/// Removes longitude jumps, keeping the first vertex where it is.
pub(crate) fn unwrap_ring(ring: &LineString<f64>) -> UnwrappedRing {
    let mut coords = Vec::with_capacity(ring.0.len());
    let mut offset = 0.0;
    let mut prev: Option<Coord<f64>> = None;
    for &c in &ring.0 {
        if let Some(p) = prev {
            let delta = c.x - p.x;
            if delta > 180.0 {
                offset -= 360.0;
            } else if delta < -180.0 {
                offset += 360.0;
            }
        }
        coords.push(Coord {
            x: c.x + offset,
            y: c.y,
        });
        prev = Some(c);
    }
    UnwrappedRing {
        coords,
        net_shift: offset,
    }
}

/// Closes an unwrapped pole-enclosing ring along the pole it circles.
///
/// The pole is taken on the side of the ring's mean latitude.
pub(crate) fn close_over_pole(unwrapped: &UnwrappedRing) -> LineString<f64> {
    let coords = &unwrapped.coords;
    if unwrapped.net_shift == 0.0 || coords.len() < 2 {
        return LineString::from(coords.clone());
    }
    let mean_lat = coords.iter().map(|c| c.y).sum::<f64>() / coords.len() as f64;
    let pole = if mean_lat >= 0.0 { 90.0 } else { -90.0 };

    let first = coords[0];
    let last = coords[coords.len() - 1];
    let mut closed = coords.clone();
    closed.push(Coord { x: last.x, y: pole });
    closed.push(Coord { x: first.x, y: pole });
    closed.push(first);
    dedup_ring(&LineString::from(closed))
}

/// Continuous-longitude version of the polygon, anchored on the first exterior vertex.
///
/// Holes are shifted by whole turns to sit inside the exterior's longitude span.
pub fn normalize(polygon: &Polygon<f64>) -> Polygon<f64> {
    if !crosses_antimeridian(polygon) {
        return polygon.clone();
    }

    let exterior = close_over_pole(&unwrap_ring(polygon.exterior()));
    let (min_x, max_x) = lon_range(&exterior);
    let mid = (min_x + max_x) / 2.0;

    let interiors = polygon
        .interiors()
        .iter()
        .map(|ring| {
            let hole = LineString::from(unwrap_ring(ring).coords);
            let turns = match hole.0.first() {
                Some(first) => ((mid - first.x) / 360.0).round(),
                None => 0.0,
            };
            hole.translate(turns * 360.0, 0.0)
        })
        .collect();

    Polygon::new(exterior, interiors)
}

fn lon_range(ring: &LineString<f64>) -> (f64, f64) {
    ring.coords().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), c| {
        (lo.min(c.x), hi.max(c.x))
    })
}

/// Cuts a crossing polygon at the antimeridian.
///
/// Every part is shifted back into [-180, 180], oriented counter-clockwise
/// and checked to be a valid simple polygon. Non-crossing input comes back
/// as a single part.
pub fn split(polygon: &Polygon<f64>) -> Result<MultiPolygon<f64>> {
    if !crosses_antimeridian(polygon) {
        return Ok(MultiPolygon(vec![polygon.clone()]));
    }

    let unwrapped = normalize(polygon);
    let (min_x, max_x) = lon_range(unwrapped.exterior());
    let first_turn = ((min_x + 180.0) / 360.0).floor() as i64;
    let last_turn = ((max_x + 180.0) / 360.0).floor() as i64;

    let mut parts = Vec::new();
    for turn in first_turn..=last_turn {
        let shift = turn as f64 * 360.0;
        let strip = Rect::new(
            Coord {
                x: shift - 180.0,
                y: -91.0,
            },
            Coord {
                x: shift + 180.0,
                y: 91.0,
            },
        )
        .to_polygon();

        for piece in unwrapped.intersection(&strip) {
            if piece.unsigned_area() <= 0.0 {
                continue;
            }
            let shifted = piece.translate(-shift, 0.0);
            let cleaned = Polygon::new(
                clamp_ring(shifted.exterior()),
                shifted.interiors().iter().map(clamp_ring).collect(),
            )
            .orient(Direction::Default);

            let errors = polygon_errors(&cleaned);
            if !errors.is_empty() {
                return Err(Error::Geometry(format!(
                    "antimeridian split produced an invalid part: {}",
                    errors.join("; ")
                )));
            }
            parts.push(cleaned);
        }
    }

    if parts.is_empty() {
        return Err(Error::Geometry(
            "antimeridian split produced no parts".to_string(),
        ));
    }
    Ok(MultiPolygon(parts))
}

fn clamp_ring(ring: &LineString<f64>) -> LineString<f64> {
    let clamped: Vec<Coord<f64>> = ring
        .coords()
        .map(|c| Coord {
            x: c.x.clamp(-180.0, 180.0),
            y: c.y.clamp(-90.0, 90.0),
        })
        .collect();
    dedup_ring(&LineString::from(clamped))
}

/// Applies `strategy` to a geodetic polygon.
///
/// Polygons that do not cross come back unchanged as a single polygon.
pub fn resolve(polygon: &Polygon<f64>, strategy: Strategy) -> Result<GeodeticGeometry> {
    if !crosses_antimeridian(polygon) {
        return Ok(GeodeticGeometry::Polygon(polygon.clone()));
    }

    tracing::debug!("Footprint crosses the antimeridian, resolving with {}", strategy);
    match strategy {
        Strategy::Normalize => Ok(GeodeticGeometry::Polygon(normalize(polygon))),
        Strategy::Split => {
            let mut parts = split(polygon)?;
            if parts.0.len() == 1 {
                Ok(GeodeticGeometry::Polygon(parts.0.remove(0)))
            } else {
                Ok(GeodeticGeometry::MultiPolygon(parts))
            }
        }
    }
}
