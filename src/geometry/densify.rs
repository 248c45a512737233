use geo::{Coord, LineString, Polygon};

use crate::error::{Error, Result};
use crate::geometry::{map_rings, ProjectedPolygon};
use crate::projection::CoordinateTransform;

/// Inserts `factor - 1` evenly spaced vertices along every ring edge.
///
/// `factor == 1` returns the polygon unchanged.
pub fn densify(polygon: &Polygon<f64>, factor: usize) -> Result<Polygon<f64>> {
    if factor == 0 {
        return Err(Error::InvalidParameter(
            "densification factor must be a positive integer".to_string(),
        ));
    }
    if factor == 1 {
        return Ok(polygon.clone());
    }
    Ok(map_rings(polygon, |ring| densify_ring(ring, factor)))
}

fn densify_ring(ring: &LineString<f64>, factor: usize) -> LineString<f64> {
    let mut coords = Vec::with_capacity(ring.0.len().saturating_sub(1) * factor + 1);
    for line in ring.lines() {
        coords.push(line.start);
        let delta = line.delta();
        for k in 1..factor {
            let t = k as f64 / factor as f64;
            coords.push(Coord {
                x: line.start.x + t * delta.x,
                y: line.start.y + t * delta.y,
            });
        }
    }
    if let Some(&last) = ring.0.last() {
        coords.push(last);
    }
    LineString::from(coords)
}

/// Transforms every vertex of every ring in one batch.
pub fn reproject(
    polygon: &Polygon<f64>,
    transform: &dyn CoordinateTransform,
) -> Result<Polygon<f64>> {
    let rings: Vec<&LineString<f64>> = std::iter::once(polygon.exterior())
        .chain(polygon.interiors())
        .collect();

    let mut xs: Vec<f64> = rings.iter().flat_map(|r| r.coords().map(|c| c.x)).collect();
    let mut ys: Vec<f64> = rings.iter().flat_map(|r| r.coords().map(|c| c.y)).collect();
    transform.transform_coords(&mut xs, &mut ys)?;

    let mut offset = 0;
    let mut out: Vec<LineString<f64>> = rings
        .iter()
        .map(|ring| {
            let n = ring.0.len();
            let coords: Vec<Coord<f64>> = (offset..offset + n)
                .map(|i| Coord { x: xs[i], y: ys[i] })
                .collect();
            offset += n;
            LineString::from(coords)
        })
        .collect();

    let exterior = out.remove(0);
    Ok(Polygon::new(exterior, out))
}

/// Densifies in projected space, then reprojects with the given transform.
pub fn densify_and_reproject_with(
    polygon: &Polygon<f64>,
    factor: usize,
    transform: &dyn CoordinateTransform,
) -> Result<Polygon<f64>> {
    let dense = densify(polygon, factor)?;
    tracing::debug!(
        "Densified footprint from {} to {} exterior vertices",
        polygon.exterior().0.len(),
        dense.exterior().0.len()
    );
    reproject(&dense, transform)
}

/// Densifies a projected polygon and reprojects it to geodetic coordinates.
pub fn densify_and_reproject(projected: &ProjectedPolygon, factor: usize) -> Result<Polygon<f64>> {
    let transform = projected.crs.geodetic_transform()?;
    densify_and_reproject_with(&projected.polygon, factor, transform.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    /// Kilometres to degrees, one to one; rows past 90 km fail.
    struct Kilometres;

    impl CoordinateTransform for Kilometres {
        fn transform_coords(&self, xs: &mut [f64], ys: &mut [f64]) -> Result<()> {
            let offending: Vec<(f64, f64)> = xs
                .iter()
                .zip(ys.iter())
                .filter(|&(_, &y)| y.abs() > 90_000.0)
                .map(|(&x, &y)| (x, y))
                .collect();
            if !offending.is_empty() {
                return Err(Error::Reprojection {
                    coords: offending,
                    reason: "beyond the pole".to_string(),
                });
            }
            for (x, y) in xs.iter_mut().zip(ys.iter_mut()) {
                *x /= 1000.0;
                *y /= 1000.0;
            }
            Ok(())
        }
    }

    fn square() -> Polygon<f64> {
        polygon![(x: 0.0, y: 0.0), (x: 10.0, y: 0.0), (x: 10.0, y: 10.0), (x: 0.0, y: 10.0), (x: 0.0, y: 0.0)]
    }

    #[test]
    fn test_factor_one_is_identity() {
        assert_eq!(densify(&square(), 1).unwrap(), square());
    }

    #[test]
    fn test_factor_zero_is_rejected() {
        assert!(matches!(
            densify(&square(), 0),
            Err(Error::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_factor_ten_inserts_evenly_spaced_vertices() {
        let dense = densify(&square(), 10).unwrap();
        let coords = &dense.exterior().0;

        assert_eq!(coords.len(), 4 * 10 + 1);
        assert_eq!(coords.first(), coords.last());
        for (i, c) in coords[..=10].iter().enumerate() {
            assert!((c.x - i as f64).abs() < 1e-12);
            assert_eq!(c.y, 0.0);
        }
        // original corners survive
        assert_eq!(coords[10], Coord { x: 10.0, y: 0.0 });
        assert_eq!(coords[20], Coord { x: 10.0, y: 10.0 });
        assert_eq!(coords[30], Coord { x: 0.0, y: 10.0 });
    }

    #[test]
    fn test_densify_keeps_holes() {
        let poly = polygon!(
            exterior: [(x: 0.0, y: 0.0), (x: 10.0, y: 0.0), (x: 10.0, y: 10.0), (x: 0.0, y: 10.0)],
            interiors: [[(x: 2.0, y: 2.0), (x: 2.0, y: 4.0), (x: 4.0, y: 4.0), (x: 4.0, y: 2.0)]],
        );
        let dense = densify(&poly, 3).unwrap();
        assert_eq!(dense.interiors().len(), 1);
        assert_eq!(dense.interiors()[0].0.len(), 4 * 3 + 1);
    }

    #[test]
    fn test_reproject_keeps_ring_structure() {
        let poly = polygon!(
            exterior: [(x: 10_000.0, y: 10_000.0), (x: 11_000.0, y: 10_000.0), (x: 11_000.0, y: 11_000.0), (x: 10_000.0, y: 10_000.0)],
            interiors: [[(x: 10_600.0, y: 10_200.0), (x: 10_900.0, y: 10_200.0), (x: 10_900.0, y: 10_500.0), (x: 10_600.0, y: 10_200.0)]],
        );

        let geodetic = densify_and_reproject_with(&poly, 2, &Kilometres).unwrap();
        let coords = &geodetic.exterior().0;
        assert_eq!(coords.len(), 7);
        assert!((coords[0].x - 10.0).abs() < 1e-9);
        assert!((coords[1].x - 10.5).abs() < 1e-9);
        assert!((coords[2].x - 11.0).abs() < 1e-9);
        assert_eq!(coords.first(), coords.last());

        assert_eq!(geodetic.interiors().len(), 1);
        assert_eq!(geodetic.interiors()[0].0.len(), 7);
        assert!((geodetic.interiors()[0].0[0].x - 10.6).abs() < 1e-9);
    }

    #[test]
    fn test_reprojection_error_names_offending_vertices() {
        let beyond_pole = 120_000.0;
        let poly = polygon![(x: 0.0, y: 0.0), (x: 1000.0, y: 0.0), (x: 1000.0, y: beyond_pole), (x: 0.0, y: 0.0)];
        match densify_and_reproject_with(&poly, 1, &Kilometres) {
            Err(Error::Reprojection { coords, .. }) => {
                assert_eq!(coords, vec![(1000.0, beyond_pole)]);
            }
            other => panic!("expected reprojection error, got {:?}", other),
        }
    }
}
