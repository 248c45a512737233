//! The per-scene pipeline: extraction, trace, densify/reproject, simplify and
//! antimeridian resolution.

use std::fs;
use std::path::{Path, PathBuf};

use crate::container::SubdatasetContainer;
use crate::error::{Error, Result};
use crate::extract::{ExtractReport, Extractor};
use crate::footprint::{outline, trace};
use crate::geometry::{
    densify_and_reproject, resolve, simplify, GeodeticGeometry, ProjectedPolygon, Strategy,
};
use crate::raster::{Raster, RasterSource};

pub const DEFAULT_DENSIFICATION_FACTOR: usize = 10;
/// About 60 m at the equator.
pub const DEFAULT_SIMPLIFICATION_TOLERANCE: f64 = 0.0006;

/// Parameters of one footprint computation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FootprintOptions {
    pub strategy: Strategy,
    /// Vertices per original edge after densification; 1 disables it.
    pub densification_factor: usize,
    /// Maximum deviation from the densified footprint, in degrees.
    pub simplification_tolerance: f64,
    pub use_data_footprint: bool,
}

impl Default for FootprintOptions {
    fn default() -> Self {
        Self {
            strategy: Strategy::Split,
            densification_factor: DEFAULT_DENSIFICATION_FACTOR,
            simplification_tolerance: DEFAULT_SIMPLIFICATION_TOLERANCE,
            use_data_footprint: false,
        }
    }
}

impl FootprintOptions {
    pub fn validate(&self) -> Result<()> {
        if self.densification_factor == 0 {
            return Err(Error::InvalidParameter(
                "densification factor must be a positive integer".to_string(),
            ));
        }
        if !self.simplification_tolerance.is_finite() || self.simplification_tolerance < 0.0 {
            return Err(Error::InvalidParameter(format!(
                "simplification tolerance must be a non-negative number of degrees, got {}",
                self.simplification_tolerance
            )));
        }
        Ok(())
    }
}

/// Geodetic footprint of a traced projected polygon.
pub fn geodetic_footprint(
    projected: &ProjectedPolygon,
    options: &FootprintOptions,
) -> Result<GeodeticGeometry> {
    options.validate()?;
    let dense = densify_and_reproject(projected, options.densification_factor)?;
    let simplified = simplify(&dense, &dense, options.simplification_tolerance)?;
    resolve(&simplified, options.strategy)
}

/// Footprint of the scene made of `rasters`.
pub fn footprint(rasters: &[Raster], options: &FootprintOptions) -> Result<GeodeticGeometry> {
    options.validate()?;
    let projected = trace(rasters, options.use_data_footprint)?;
    geodetic_footprint(&projected, options)
}

/// Footprint from grid metadata alone. Data footprints need pixel values, so
/// `use_data_footprint` is rejected here.
pub fn outline_footprint<'a, I>(sources: I, options: &FootprintOptions) -> Result<GeodeticGeometry>
where
    I: IntoIterator<Item = &'a RasterSource>,
{
    if options.use_data_footprint {
        return Err(Error::InvalidParameter(
            "a data footprint needs pixel values, not just raster metadata".to_string(),
        ));
    }
    options.validate()?;
    let projected = outline(sources)?;
    geodetic_footprint(&projected, options)
}

/// Receives finished scenes, e.g. to build catalog documents.
pub trait SceneSink {
    fn accept(
        &mut self,
        scene_id: &str,
        assets: &[PathBuf],
        geometry: &GeodeticGeometry,
    ) -> Result<()>;
}

/// A scene collected by the `Vec<Scene>` sink.
#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    pub id: String,
    pub assets: Vec<PathBuf>,
    pub geometry: GeodeticGeometry,
}

impl SceneSink for Vec<Scene> {
    fn accept(
        &mut self,
        scene_id: &str,
        assets: &[PathBuf],
        geometry: &GeodeticGeometry,
    ) -> Result<()> {
        self.push(Scene {
            id: scene_id.to_string(),
            assets: assets.to_vec(),
            geometry: geometry.clone(),
        });
        Ok(())
    }
}

/// Computes the footprint of `rasters` and hands the scene to `sink`.
/// Nothing reaches the sink if any stage fails.
pub fn process_scene<S>(
    scene_id: &str,
    rasters: &[Raster],
    assets: &[PathBuf],
    options: &FootprintOptions,
    sink: &mut S,
) -> Result<GeodeticGeometry>
where
    S: SceneSink + ?Sized,
{
    let geometry = footprint(rasters, options)?;
    sink.accept(scene_id, assets, &geometry)?;
    tracing::info!("Scene {} done", scene_id);
    Ok(geometry)
}

/// Like [`process_scene`] for tiles known only by their metadata, e.g. COGs
/// written earlier.
pub fn process_outline_scene<'a, I, S>(
    scene_id: &str,
    sources: I,
    assets: &[PathBuf],
    options: &FootprintOptions,
    sink: &mut S,
) -> Result<GeodeticGeometry>
where
    I: IntoIterator<Item = &'a RasterSource>,
    S: SceneSink + ?Sized,
{
    let geometry = outline_footprint(sources, options)?;
    sink.accept(scene_id, assets, &geometry)?;
    tracing::info!("Scene {} done", scene_id);
    Ok(geometry)
}

/// Runs the whole pipeline on one container, writing COGs to `cog_dir` when given.
///
/// All-or-nothing: if any subdataset fails to extract or the footprint cannot
/// be computed, the COGs written for this scene are removed again.
pub fn process_container<C, S>(
    container: &C,
    cog_dir: Option<&Path>,
    extractor: &Extractor,
    options: &FootprintOptions,
    sink: &mut S,
) -> Result<GeodeticGeometry>
where
    C: SubdatasetContainer + ?Sized,
    S: SceneSink + ?Sized,
{
    options.validate()?;
    let scene_id = container.stem();

    let assets = match cog_dir {
        Some(dir) => {
            let ExtractReport { written, failed } = extractor.extract_all(container, dir);
            if let Some((name, error)) = failed.into_iter().next() {
                discard(&written);
                tracing::error!("Scene {}: extracting {} failed", scene_id, name);
                return Err(error);
            }
            written
        }
        None => Vec::new(),
    };

    let result = container
        .subdataset_names()
        .iter()
        .map(|name| container.read(name))
        .collect::<Result<Vec<Raster>>>()
        .and_then(|rasters| process_scene(&scene_id, &rasters, &assets, options, sink));
    if result.is_err() {
        discard(&assets);
    }
    result
}

fn discard(paths: &[PathBuf]) {
    for path in paths {
        if let Err(e) = fs::remove_file(path) {
            tracing::warn!("Could not remove {}: {}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::InMemoryContainer;
    use crate::grid::TileId;
    use crate::projection::Crs;
    use crate::raster::{DataType, RasterData};
    use gdal::DriverManager;
    use tempfile::TempDir;

    fn geodetic_available() -> bool {
        match Crs::viirs_sinusoidal().geodetic_transform() {
            Ok(_) => true,
            Err(e) => {
                eprintln!("Skipping test: sinusoidal transform not available: {}", e);
                false
            }
        }
    }

    fn cog_available() -> bool {
        DriverManager::get_driver_by_name("COG").is_ok()
            && DriverManager::get_driver_by_name("MEM").is_ok()
    }

    fn tile_raster(tile: TileId, size: usize, values: Vec<u16>) -> Raster {
        let source = RasterSource {
            name: "radiance".to_string(),
            cols: size,
            rows: size,
            data_type: DataType::UInt16,
            nodata: Some(65535.0),
            geo_transform: tile.geo_transform(size, size),
            crs: Crs::viirs_sinusoidal(),
        };
        Raster::new(source, RasterData::UInt16(values)).unwrap()
    }

    #[test]
    fn test_default_options() {
        let options = FootprintOptions::default();
        assert_eq!(options.strategy, Strategy::Split);
        assert_eq!(options.densification_factor, 10);
        assert_eq!(options.simplification_tolerance, 0.0006);
        assert!(!options.use_data_footprint);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_invalid_options_are_rejected() {
        let zero_factor = FootprintOptions {
            densification_factor: 0,
            ..Default::default()
        };
        assert!(matches!(zero_factor.validate(), Err(Error::InvalidParameter(_))));

        let negative = FootprintOptions {
            simplification_tolerance: -0.1,
            ..Default::default()
        };
        assert!(matches!(negative.validate(), Err(Error::InvalidParameter(_))));
    }

    #[test]
    fn test_tile_footprint_stays_within_tile_latitudes() {
        if !geodetic_available() {
            return;
        }
        let raster = tile_raster(TileId::new(30, 5).unwrap(), 4, vec![1; 16]);
        let geometry = footprint(&[raster], &FootprintOptions::default()).unwrap();

        let GeodeticGeometry::Polygon(_) = &geometry else {
            panic!("expected a single polygon, got {:?}", geometry);
        };
        let [min_lon, min_lat, max_lon, max_lat] = geometry.bounds().unwrap();
        assert!((min_lat - 30.0).abs() < 1e-6, "{}", min_lat);
        assert!((max_lat - 40.0).abs() < 1e-6, "{}", max_lat);
        assert!(min_lon > 138.0 && max_lon < 170.0, "{} {}", min_lon, max_lon);
    }

    #[test]
    fn test_outline_footprint_rejects_data_mode() {
        let raster = tile_raster(TileId::new(30, 5).unwrap(), 2, vec![1; 4]);
        let options = FootprintOptions {
            use_data_footprint: true,
            ..Default::default()
        };
        assert!(matches!(
            outline_footprint([&raster.source], &options),
            Err(Error::InvalidParameter(_))
        ));

        let mut scenes: Vec<Scene> = Vec::new();
        let result = process_outline_scene("tile", [&raster.source], &[], &options, &mut scenes);
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
        assert!(scenes.is_empty());
    }

    #[test]
    fn test_outline_scene_reaches_sink() {
        if !geodetic_available() {
            return;
        }
        let raster = tile_raster(TileId::new(30, 5).unwrap(), 2, vec![1; 4]);
        let assets = vec![PathBuf::from("tile_radiance.tif")];
        let mut scenes: Vec<Scene> = Vec::new();

        let geometry = process_outline_scene(
            "tile",
            [&raster.source],
            &assets,
            &FootprintOptions::default(),
            &mut scenes,
        )
        .unwrap();
        assert_eq!(scenes.len(), 1);
        assert_eq!(scenes[0].assets, assets);
        assert_eq!(scenes[0].geometry, geometry);
    }

    #[test]
    fn test_process_container_hands_scene_to_sink() {
        if !geodetic_available() {
            return;
        }
        let raster = tile_raster(TileId::new(30, 5).unwrap(), 4, vec![1; 16]);
        let container = InMemoryContainer::new("VNP46A2.A2021001.h30v05.001.h5", vec![raster]);
        let mut scenes: Vec<Scene> = Vec::new();

        let geometry = process_container(
            &container,
            None,
            &Extractor::new(),
            &FootprintOptions::default(),
            &mut scenes,
        )
        .unwrap();

        assert_eq!(scenes.len(), 1);
        assert_eq!(scenes[0].id, "VNP46A2.A2021001.h30v05.001");
        assert!(scenes[0].assets.is_empty());
        assert_eq!(scenes[0].geometry, geometry);
    }

    #[test]
    fn test_failed_scene_never_reaches_sink() {
        let raster = tile_raster(TileId::new(30, 5).unwrap(), 2, vec![65535; 4]);
        let options = FootprintOptions {
            use_data_footprint: true,
            ..Default::default()
        };
        let mut scenes: Vec<Scene> = Vec::new();

        let result = process_scene("empty", &[raster], &[], &options, &mut scenes);
        assert!(matches!(result, Err(Error::EmptyFootprint(_))));
        assert!(scenes.is_empty());
    }

    #[test]
    fn test_failed_footprint_removes_written_cogs() {
        if !cog_available() {
            eprintln!("Skipping test: COG driver not available");
            return;
        }
        let cog_dir = TempDir::new().unwrap();
        let raster = tile_raster(TileId::new(30, 5).unwrap(), 2, vec![65535; 4]);
        let container = InMemoryContainer::new("VNP46A2.A2021001.h30v05.001.h5", vec![raster]);
        let options = FootprintOptions {
            use_data_footprint: true,
            ..Default::default()
        };
        let mut scenes: Vec<Scene> = Vec::new();

        let result = process_container(
            &container,
            Some(cog_dir.path()),
            &Extractor::new(),
            &options,
            &mut scenes,
        );
        assert!(matches!(result, Err(Error::EmptyFootprint(_))), "{:?}", result);
        assert!(scenes.is_empty());
        assert_eq!(std::fs::read_dir(cog_dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_failed_extraction_removes_the_other_cogs() {
        if !cog_available() {
            eprintln!("Skipping test: COG driver not available");
            return;
        }
        let cog_dir = TempDir::new().unwrap();
        let good = tile_raster(TileId::new(30, 5).unwrap(), 2, vec![1; 4]);
        let mut broken = tile_raster(TileId::new(30, 5).unwrap(), 2, vec![1; 4]);
        broken.source.name = "unreferenced".to_string();
        broken.source.crs = Crs::new("bogus");
        let container =
            InMemoryContainer::new("VNP46A2.A2021001.h30v05.001.h5", vec![good, broken]);
        let mut scenes: Vec<Scene> = Vec::new();

        let result = process_container(
            &container,
            Some(cog_dir.path()),
            &Extractor::new(),
            &FootprintOptions::default(),
            &mut scenes,
        );
        assert!(result.is_err());
        assert!(scenes.is_empty());
        assert_eq!(std::fs::read_dir(cog_dir.path()).unwrap().count(), 0);
    }
}
