//! Multi-subdataset containers: VIIRS H5 files read through GDAL, and an
//! in-memory stand-in holding arrays that are already loaded.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use gdal::{Dataset, Metadata};

use crate::error::{Error, Result};
use crate::grid::TileId;
use crate::projection::Crs;
use crate::raster::{open_dataset, DataType, GeoTransform, Raster, RasterSource};
use crate::sidecar::Sidecar;

const HORIZONTAL_TILE_KEY: &str = "HorizontalTileNumber";
const VERTICAL_TILE_KEY: &str = "VerticalTileNumber";
const FILL_VALUE_KEY: &str = "_FillValue";

/// A file holding several named 2-D arrays.
///
/// Implementations are shared between extraction workers, so `read` must be
/// callable concurrently.
pub trait SubdatasetContainer: Sync {
    fn path(&self) -> &Path;

    /// Short subdataset names, in container order.
    fn subdataset_names(&self) -> Vec<String>;

    /// Reads one subdataset with its georeferencing.
    fn read(&self, name: &str) -> Result<Raster>;

    /// File stem used to name outputs and identify the scene.
    fn stem(&self) -> String {
        scene_id(self.path())
    }

    fn contains(&self, name: &str) -> bool {
        self.subdataset_names().iter().any(|n| n == name)
    }
}

#[derive(Debug, Clone)]
struct Subdataset {
    name: String,
    gdal_name: String,
}

/// An HDF5/HDF-EOS5 file opened through GDAL's HDF5 driver.
///
/// Only subdataset names are kept; every `read` opens its own GDAL handle.
#[derive(Debug, Clone)]
pub struct Hdf5Container {
    path: PathBuf,
    subdatasets: Vec<Subdataset>,
    tile: Option<TileId>,
}

impl Hdf5Container {
    pub fn open(path: &Path) -> Result<Self> {
        let dataset = open_dataset(path)?;
        let gdal_names: Vec<String> = dataset
            .metadata_domain("SUBDATASETS")
            .unwrap_or_default()
            .into_iter()
            .filter_map(|entry| {
                let (key, value) = entry.split_once('=')?;
                key.ends_with("_NAME").then(|| value.to_string())
            })
            .collect();
        if gdal_names.is_empty() {
            return Err(Error::NotFound(format!(
                "no subdatasets in {}",
                path.display()
            )));
        }

        let subdatasets = short_names(&gdal_names)
            .into_iter()
            .zip(gdal_names)
            .map(|(name, gdal_name)| Subdataset { name, gdal_name })
            .collect::<Vec<_>>();
        let tile = find_tile(&dataset, path)?;
        tracing::info!(
            "Opened {} with {} subdatasets (tile {})",
            path.display(),
            subdatasets.len(),
            tile.map(|t| t.to_string()).unwrap_or_else(|| "unknown".into())
        );

        Ok(Self {
            path: path.to_path_buf(),
            subdatasets,
            tile,
        })
    }

    pub fn tile(&self) -> Option<TileId> {
        self.tile
    }

    fn georeference(&self, name: &str, dataset: &Dataset) -> Result<(GeoTransform, Crs)> {
        let own = dataset
            .geo_transform()
            .ok()
            .map(GeoTransform::from_gdal)
            .filter(|gt| !gt.is_default());
        if let (Some(gt), Ok(crs)) = (own, Crs::from_dataset(dataset)) {
            return Ok((gt, crs));
        }

        let (cols, rows) = dataset.raster_size();
        match self.tile {
            Some(tile) => Ok((tile.geo_transform(cols, rows), Crs::viirs_sinusoidal())),
            None => Err(Error::Metadata(format!(
                "{} in {} has no georeferencing and the tile number is unknown",
                name,
                self.path.display()
            ))),
        }
    }
}

impl SubdatasetContainer for Hdf5Container {
    fn path(&self) -> &Path {
        &self.path
    }

    fn subdataset_names(&self) -> Vec<String> {
        self.subdatasets.iter().map(|s| s.name.clone()).collect()
    }

    fn read(&self, name: &str) -> Result<Raster> {
        let subdataset = self
            .subdatasets
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "subdataset {} in {}",
                    name,
                    self.path.display()
                ))
            })?;

        let dataset = Dataset::open(&subdataset.gdal_name)?;
        let (cols, rows) = dataset.raster_size();
        let band = dataset.rasterband(1)?;
        let (geo_transform, crs) = self.georeference(name, &dataset)?;
        let nodata = band.no_data_value().or_else(|| {
            metadata_value(&band, FILL_VALUE_KEY)
                .or_else(|| metadata_value(&dataset, FILL_VALUE_KEY))
                .and_then(|v| v.parse().ok())
        });

        let source = RasterSource {
            name: name.to_string(),
            cols,
            rows,
            data_type: DataType::from_gdal(band.band_type())?,
            nodata,
            geo_transform,
            crs,
        };
        tracing::debug!(
            "Reading {} ({}x{} {}, nodata {:?})",
            name,
            cols,
            rows,
            source.data_type.name(),
            nodata
        );
        Raster::from_band(source, &band)
    }
}

/// Arrays already in memory, addressed by their [`RasterSource::name`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryContainer {
    path: PathBuf,
    rasters: Vec<Raster>,
}

impl InMemoryContainer {
    /// `path` only names the container; nothing is read from it.
    pub fn new(path: impl Into<PathBuf>, rasters: Vec<Raster>) -> Self {
        Self {
            path: path.into(),
            rasters,
        }
    }

    pub fn push(&mut self, raster: Raster) {
        self.rasters.push(raster);
    }
}

impl SubdatasetContainer for InMemoryContainer {
    fn path(&self) -> &Path {
        &self.path
    }

    fn subdataset_names(&self) -> Vec<String> {
        self.rasters.iter().map(|r| r.source.name.clone()).collect()
    }

    fn read(&self, name: &str) -> Result<Raster> {
        self.rasters
            .iter()
            .find(|r| r.source.name == name)
            .cloned()
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "subdataset {} in {}",
                    name,
                    self.path.display()
                ))
            })
    }
}

/// File name without its `.h5` (or last) extension.
pub fn scene_id(path: &Path) -> String {
    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    name.strip_suffix(".h5")
        .or_else(|| name.rsplit_once('.').map(|(stem, _)| stem))
        .unwrap_or(name)
        .to_string()
}

/// Tile numbers from the container attributes, else the sidecar document, else the file name.
fn find_tile(dataset: &Dataset, path: &Path) -> Result<Option<TileId>> {
    if let (Some(h), Some(v)) = (
        metadata_value(dataset, HORIZONTAL_TILE_KEY),
        metadata_value(dataset, VERTICAL_TILE_KEY),
    ) {
        return TileId::parse(&h, &v).map(Some);
    }
    if let Some(tile) = Sidecar::find(path)?.map(|s| s.tile()).transpose()?.flatten() {
        return Ok(Some(tile));
    }
    Ok(path
        .file_name()
        .and_then(|s| s.to_str())
        .and_then(TileId::from_file_name))
}

/// Value of the first default-domain item whose key ends with `suffix`.
///
/// The HDF5 driver prefixes attribute names with their group path.
fn metadata_value<M: Metadata>(item: &M, suffix: &str) -> Option<String> {
    let suffix = suffix.to_ascii_lowercase();
    item.metadata_domain("")?.into_iter().find_map(|entry| {
        let (key, value) = entry.split_once('=')?;
        key.to_ascii_lowercase()
            .ends_with(&suffix)
            .then(|| value.trim().to_string())
    })
}

/// Last path segment of each GDAL subdataset name, prefixed with the grid name
/// where two subdatasets would otherwise share a name.
fn short_names(gdal_names: &[String]) -> Vec<String> {
    let segments: Vec<Vec<&str>> = gdal_names
        .iter()
        .map(|full| {
            let inner = full.rsplit_once("://").map_or(full.as_str(), |(_, p)| p);
            inner.split('/').filter(|s| !s.is_empty()).collect()
        })
        .collect();

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for s in &segments {
        *counts.entry(s.last().copied().unwrap_or_default()).or_default() += 1;
    }

    segments
        .iter()
        .map(|s| {
            let short = s.last().copied().unwrap_or_default();
            let name = if counts.get(short).copied().unwrap_or(0) > 1 {
                match grid_name(s) {
                    Some(grid) => format!("{}_{}", grid, short),
                    None => s.join("_"),
                }
            } else {
                short.to_string()
            };
            sanitize(&name)
        })
        .collect()
}

fn grid_name<'a>(segments: &[&'a str]) -> Option<&'a str> {
    if let Some(i) = segments.iter().position(|s| *s == "GRIDS" || *s == "SWATHS") {
        return segments.get(i + 1).copied();
    }
    let parent = segments.len().checked_sub(2).map(|i| segments[i])?;
    if parent == "Data_Fields" || parent == "Data Fields" {
        segments.len().checked_sub(3).map(|i| segments[i])
    } else {
        Some(parent)
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
