use std::fs;
use std::path::Path;

use gdal::cpl::CslStringList;
use gdal::raster::{Buffer, GdalType};
use gdal::{Dataset, DriverManager, Metadata};

use crate::error::{Error, Result};
use crate::raster::{dispatch, Raster, RasterData, SUBDATASET_METADATA_KEY};

/// Creation options passed to GDAL's COG driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CogOptions {
    pub compression: String,
    /// Internal tile size in pixels.
    pub block_size: usize,
    pub overview_resampling: String,
}

impl Default for CogOptions {
    fn default() -> Self {
        Self {
            compression: "DEFLATE".to_string(),
            block_size: 512,
            overview_resampling: "NEAREST".to_string(),
        }
    }
}

impl CogOptions {
    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 || self.block_size % 16 != 0 {
            return Err(Error::InvalidParameter(format!(
                "COG block size must be a positive multiple of 16, got {}",
                self.block_size
            )));
        }
        Ok(())
    }

    fn creation_options(&self) -> Result<CslStringList> {
        let mut options = CslStringList::new();
        options.set_name_value("COMPRESS", &self.compression)?;
        options.set_name_value("BLOCKSIZE", &self.block_size.to_string())?;
        options.set_name_value("OVERVIEW_RESAMPLING", &self.overview_resampling)?;
        Ok(options)
    }
}

/// Writes rasters as tiled GeoTIFFs with an overview pyramid.
#[derive(Debug, Clone, Default)]
pub struct CogWriter {
    options: CogOptions,
}

impl CogWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: CogOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self { options })
    }

    pub fn options(&self) -> &CogOptions {
        &self.options
    }

    /// Writes `raster` to `output_path`.
    ///
    /// The file is built in a temporary directory next to `output_path` and
    /// renamed into place once GDAL has closed it, so a failed write leaves
    /// nothing at `output_path`.
    pub fn write(&self, raster: &Raster, output_path: &Path) -> Result<()> {
        let source = &raster.source;
        let (rows, cols) = source.shape();

        tracing::info!(
            "Writing {} as COG: {} x {} pixels ({})",
            source.name,
            cols,
            rows,
            source.data_type.name()
        );

        let mut dataset = dispatch!(&raster.data, values => mem_dataset(cols, rows, values))?;

        dataset.set_geo_transform(&source.geo_transform.to_gdal())?;
        dataset.set_projection(&source.crs.to_wkt()?)?;
        dataset.set_metadata_item(SUBDATASET_METADATA_KEY, &source.name, "")?;
        if let Some(nodata) = source.nodata {
            let mut band = dataset.rasterband(1)?;
            band.set_no_data_value(Some(nodata))?;
        }

        let parent = match output_path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let file_name = output_path.file_name().ok_or_else(|| {
            Error::InvalidParameter(format!("{} is not a file path", output_path.display()))
        })?;

        let staging = tempfile::Builder::new()
            .prefix(".viirs-cog-")
            .tempdir_in(parent)?;
        let staged = staging.path().join(file_name);

        let driver = DriverManager::get_driver_by_name("COG")?;
        let copy = dataset.create_copy(&driver, &staged, &self.options.creation_options()?)?;
        drop(copy);

        fs::rename(&staged, output_path)?;
        tracing::debug!("Wrote {}", output_path.display());
        Ok(())
    }
}

fn mem_dataset<T: GdalType + Copy>(cols: usize, rows: usize, values: &[T]) -> Result<Dataset> {
    let driver = DriverManager::get_driver_by_name("MEM")?;
    let dataset = driver.create_with_band_type::<T, _>("", cols, rows, 1)?;
    {
        let mut band = dataset.rasterband(1)?;
        let mut buffer = Buffer::new((cols, rows), values.to_vec());
        band.write((0, 0), (cols, rows), &mut buffer)?;
    }
    Ok(dataset)
}
