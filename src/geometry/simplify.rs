use geo::{Coord, EuclideanDistance, LineString, Point, Polygon, Simplify};

use crate::error::{Error, Result};
use crate::geometry::antimeridian::{close_over_pole, unwrap_ring, UnwrappedRing};
use crate::geometry::dedup_ring;
use crate::geometry::validate::polygon_errors;
use crate::projection::wrap_longitude;

/// Slack for floating-point noise when checking the deviation bound.
const DEVIATION_EPSILON: f64 = 1e-9;

/// Douglas-Peucker simplification of a geodetic polygon.
///
/// Every vertex of `dense_reference` stays within `tolerance` degrees of the
/// simplified boundary. `tolerance == 0` only drops repeated vertices. Work
/// happens on continuous longitudes, so antimeridian-crossing input is
/// simplified the same way as any other and comes back wrapped into
/// [-180, 180].
///
/// Fails with [`Error::Simplification`] rather than return a ring with fewer
/// than three vertices, zero area or a self-intersection.
pub fn simplify(
    polygon: &Polygon<f64>,
    dense_reference: &Polygon<f64>,
    tolerance: f64,
) -> Result<Polygon<f64>> {
    if !tolerance.is_finite() || tolerance < 0.0 {
        return Err(Error::InvalidParameter(format!(
            "simplification tolerance must be a non-negative number of degrees, got {}",
            tolerance
        )));
    }

    let exterior = unwrap_ring(polygon.exterior());
    let interiors: Vec<UnwrappedRing> = polygon.interiors().iter().map(unwrap_ring).collect();

    let simplify_ring = |ring: &UnwrappedRing| -> UnwrappedRing {
        let line = LineString::from(ring.coords.clone());
        let simplified = if tolerance > 0.0 {
            line.simplify(&tolerance)
        } else {
            line
        };
        UnwrappedRing {
            coords: dedup_consecutive(simplified.0),
            net_shift: ring.net_shift,
        }
    };
    let simple_exterior = simplify_ring(&exterior);
    let simple_interiors: Vec<UnwrappedRing> = interiors.iter().map(simplify_ring).collect();

    let candidate = Polygon::new(
        close_over_pole(&simple_exterior),
        simple_interiors.iter().map(close_over_pole).collect(),
    );
    let errors = polygon_errors(&candidate);
    if !errors.is_empty() {
        return Err(Error::Simplification(format!(
            "tolerance {} would produce invalid geometry: {}",
            tolerance,
            errors.join("; ")
        )));
    }

    check_deviation(
        &simple_exterior.coords,
        dense_reference.exterior(),
        tolerance,
    )?;
    if dense_reference.interiors().len() == simple_interiors.len() {
        for (simple, reference) in simple_interiors.iter().zip(dense_reference.interiors()) {
            check_deviation(&simple.coords, reference, tolerance)?;
        }
    }

    let wrapped = Polygon::new(
        rewrap(&simple_exterior),
        simple_interiors.iter().map(rewrap).collect(),
    );
    tracing::debug!(
        "Simplified footprint from {} to {} exterior vertices",
        polygon.exterior().0.len(),
        wrapped.exterior().0.len()
    );
    Ok(wrapped)
}

fn dedup_consecutive(coords: Vec<Coord<f64>>) -> Vec<Coord<f64>> {
    let mut out: Vec<Coord<f64>> = Vec::with_capacity(coords.len());
    for c in coords {
        if out.last() != Some(&c) {
            out.push(c);
        }
    }
    out
}

/// Largest distance from a reference vertex to the simplified ring must not exceed `tolerance`.
fn check_deviation(
    simplified: &[Coord<f64>],
    reference: &LineString<f64>,
    tolerance: f64,
) -> Result<()> {
    let reference = unwrap_ring(reference).coords;
    let (Some(ref_first), Some(simple_first)) = (reference.first(), simplified.first()) else {
        return Ok(());
    };
    // the two rings may be unwrapped around different anchors
    let turns = ((ref_first.x - simple_first.x) / 360.0).round();
    let boundary = LineString::from(
        simplified
            .iter()
            .map(|c| Coord {
                x: c.x + turns * 360.0,
                y: c.y,
            })
            .collect::<Vec<_>>(),
    );

    let worst = reference
        .iter()
        .map(|&c| Point::from(c).euclidean_distance(&boundary))
        .fold(0.0, f64::max);
    if worst > tolerance + DEVIATION_EPSILON {
        return Err(Error::Simplification(format!(
            "simplified boundary deviates {} degrees from the dense footprint, tolerance is {}",
            worst, tolerance
        )));
    }
    Ok(())
}

fn rewrap(ring: &UnwrappedRing) -> LineString<f64> {
    let coords: Vec<Coord<f64>> = ring
        .coords
        .iter()
        .map(|c| Coord {
            x: wrap_longitude(c.x),
            y: c.y,
        })
        .collect();
    // the closing vertex can land on the other edge of the range (180 vs -180)
    let mut ring = LineString::from(coords);
    if let Some(&first) = ring.0.first() {
        if let Some(last) = ring.0.last_mut() {
            *last = first;
        }
    }
    dedup_ring(&ring)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    fn dense_square() -> Polygon<f64> {
        // unit square with midpoints and a repeated vertex
        polygon![
            (x: 0.0, y: 0.0),
            (x: 0.5, y: 0.0),
            (x: 0.5, y: 0.0),
            (x: 1.0, y: 0.0),
            (x: 1.0, y: 0.5),
            (x: 1.0, y: 1.0),
            (x: 0.5, y: 1.0),
            (x: 0.0, y: 1.0),
            (x: 0.0, y: 0.5),
            (x: 0.0, y: 0.0)
        ]
    }

    #[test]
    fn test_zero_tolerance_only_drops_duplicates() {
        let dense = dense_square();
        let simplified = simplify(&dense, &dense, 0.0).unwrap();
        assert_eq!(simplified.exterior().0.len(), dense.exterior().0.len() - 1);
        assert_eq!(simplified.exterior().0[1], Coord { x: 0.5, y: 0.0 });
    }

    #[test]
    fn test_collinear_vertices_are_removed() {
        let dense = dense_square();
        let simplified = simplify(&dense, &dense, 0.01).unwrap();
        assert_eq!(simplified.exterior().0.len(), 5);
    }

    #[test]
    fn test_over_simplification_is_an_error() {
        let dense = dense_square();
        match simplify(&dense, &dense, 10.0) {
            Err(Error::Simplification(msg)) => assert!(msg.contains("invalid")),
            other => panic!("expected simplification error, got {:?}", other),
        }
    }

    #[test]
    fn test_negative_tolerance_is_rejected() {
        let dense = dense_square();
        assert!(matches!(
            simplify(&dense, &dense, -1.0),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_deviation_from_reference_is_bounded() {
        // gentle arc along the bottom edge
        let mut ring: Vec<Coord<f64>> = (0..=20)
            .map(|i| {
                let x = i as f64 / 20.0;
                Coord {
                    x,
                    y: -0.001 * (x * std::f64::consts::PI).sin(),
                }
            })
            .collect();
        ring.push(Coord { x: 1.0, y: 1.0 });
        ring.push(Coord { x: 0.0, y: 1.0 });
        ring.push(Coord { x: 0.0, y: 0.0 });
        let dense = Polygon::new(LineString::from(ring), vec![]);

        let simplified = simplify(&dense, &dense, 0.0006).unwrap();
        assert!(simplified.exterior().0.len() < dense.exterior().0.len());
        for c in dense.exterior().coords() {
            let d = Point::from(*c).euclidean_distance(simplified.exterior());
            assert!(d <= 0.0006 + 1e-12, "vertex {:?} is {} away", c, d);
        }
    }

    #[test]
    fn test_crossing_polygon_is_simplified_on_continuous_longitudes() {
        let crossing = polygon![
            (x: 179.0, y: 0.0),
            (x: 179.5, y: 0.0),
            (x: -180.0, y: 0.0),
            (x: -179.0, y: 0.0),
            (x: -179.0, y: 1.0),
            (x: 179.0, y: 1.0),
            (x: 179.0, y: 0.0)
        ];
        let simplified = simplify(&crossing, &crossing, 0.001).unwrap();
        let xs: Vec<f64> = simplified.exterior().coords().map(|c| c.x).collect();
        assert_eq!(xs, vec![179.0, -179.0, -179.0, 179.0, 179.0]);
    }
}
