//! Subdataset to COG extraction.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rayon::prelude::*;

use crate::container::{Hdf5Container, SubdatasetContainer};
use crate::error::{Error, Result};
use crate::writer::CogWriter;

/// Outcome of extracting every subdataset of one container.
#[derive(Debug, Default)]
pub struct ExtractReport {
    pub written: Vec<PathBuf>,
    pub failed: Vec<(String, Error)>,
}

impl ExtractReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Extractor {
    writer: CogWriter,
    cancel: Option<Arc<AtomicBool>>,
}

impl Extractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_writer(writer: CogWriter) -> Self {
        Self {
            writer,
            cancel: None,
        }
    }

    /// Once `flag` is set, subdatasets not yet started fail with [`Error::Cancelled`].
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    /// `{outdir}/{container stem}_{subdataset}.tif`
    pub fn output_path<C>(container: &C, name: &str, outdir: &Path) -> PathBuf
    where
        C: SubdatasetContainer + ?Sized,
    {
        outdir.join(format!("{}_{}.tif", container.stem(), name))
    }

    /// Writes one subdataset to `outdir` and returns the COG path.
    pub fn extract<C>(&self, container: &C, name: &str, outdir: &Path) -> Result<PathBuf>
    where
        C: SubdatasetContainer + ?Sized,
    {
        if self.is_cancelled() {
            return Err(Error::Cancelled(name.to_string()));
        }
        if !container.contains(name) {
            return Err(Error::NotFound(format!(
                "subdataset {} in {}",
                name,
                container.path().display()
            )));
        }

        let raster = container.read(name)?;
        let output_path = Self::output_path(container, name, outdir);
        self.writer.write(&raster, &output_path)?;
        Ok(output_path)
    }

    /// Extracts every subdataset in parallel. A failed subdataset does not
    /// stop the others; it is listed in [`ExtractReport::failed`].
    pub fn extract_all<C>(&self, container: &C, outdir: &Path) -> ExtractReport
    where
        C: SubdatasetContainer + ?Sized,
    {
        let names = container.subdataset_names();
        tracing::info!(
            "Extracting {} subdatasets from {}",
            names.len(),
            container.path().display()
        );

        let results: Vec<(String, Result<PathBuf>)> = names
            .into_par_iter()
            .map(|name| {
                let result = self.extract(container, &name, outdir);
                (name, result)
            })
            .collect();

        let mut report = ExtractReport::default();
        for (name, result) in results {
            match result {
                Ok(path) => report.written.push(path),
                Err(e) => {
                    tracing::error!("Failed to extract {}: {}", name, e);
                    report.failed.push((name, e));
                }
            }
        }
        report
    }
}

/// Extracts `name` from the H5 file at `container_path` with default options.
pub fn extract(container_path: &Path, name: &str, outdir: &Path) -> Result<PathBuf> {
    let container = Hdf5Container::open(container_path)?;
    Extractor::new().extract(&container, name, outdir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::InMemoryContainer;
    use crate::grid::TileId;
    use crate::projection::Crs;
    use crate::raster::{DataType, Raster, RasterData, RasterSource};
    use gdal::DriverManager;
    use tempfile::TempDir;

    fn gdal_available() -> bool {
        DriverManager::get_driver_by_name("COG").is_ok()
            && DriverManager::get_driver_by_name("MEM").is_ok()
    }

    /// Two subdatasets of the same tile at 1 km and 500 m resolution.
    fn two_subdataset_container() -> InMemoryContainer {
        let tile = TileId::new(30, 5).unwrap();
        let coarse = RasterSource {
            name: "Radiance_1km".to_string(),
            cols: 4,
            rows: 4,
            data_type: DataType::UInt16,
            nodata: Some(65535.0),
            geo_transform: tile.geo_transform(4, 4),
            crs: Crs::viirs_sinusoidal(),
        };
        let fine = RasterSource {
            name: "Reflectance_500m".to_string(),
            cols: 8,
            rows: 8,
            data_type: DataType::Int16,
            nodata: Some(-28672.0),
            geo_transform: tile.geo_transform(8, 8),
            crs: Crs::viirs_sinusoidal(),
        };
        InMemoryContainer::new(
            "VNP09GA.A2021001.h30v05.001.h5",
            vec![
                Raster::new(coarse, RasterData::UInt16((0..16).collect())).unwrap(),
                Raster::new(fine, RasterData::Int16((0..64).collect())).unwrap(),
            ],
        )
    }

    #[test]
    fn test_extract_all_writes_independent_rasters() {
        if !gdal_available() {
            eprintln!("Skipping test: COG driver not available");
            return;
        }
        let outdir = TempDir::new().unwrap();
        let container = two_subdataset_container();

        let report = Extractor::new().extract_all(&container, outdir.path());
        assert!(report.is_success(), "{:?}", report.failed);
        assert_eq!(report.written.len(), 2);

        let coarse = Raster::open(
            &outdir
                .path()
                .join("VNP09GA.A2021001.h30v05.001_Radiance_1km.tif"),
        )
        .unwrap();
        let fine = Raster::open(
            &outdir
                .path()
                .join("VNP09GA.A2021001.h30v05.001_Reflectance_500m.tif"),
        )
        .unwrap();

        assert_eq!(coarse.source.shape(), (4, 4));
        assert_eq!(fine.source.shape(), (8, 8));
        assert_eq!(coarse.source.data_type, DataType::UInt16);
        assert_eq!(fine.source.data_type, DataType::Int16);
        assert_eq!(fine.source.nodata, Some(-28672.0));
        assert!(
            (coarse.source.geo_transform.pixel_width
                - 2.0 * fine.source.geo_transform.pixel_width)
                .abs()
                < 1e-6
        );
        assert_eq!(
            coarse.source.geo_transform.origin_x,
            fine.source.geo_transform.origin_x
        );
    }

    #[test]
    fn test_one_failed_subdataset_does_not_stop_the_others() {
        if !gdal_available() {
            eprintln!("Skipping test: COG driver not available");
            return;
        }
        let outdir = TempDir::new().unwrap();
        let mut container = two_subdataset_container();
        let broken = RasterSource {
            name: "Unreferenced".to_string(),
            cols: 2,
            rows: 2,
            data_type: DataType::UInt16,
            nodata: None,
            geo_transform: TileId::new(30, 5).unwrap().geo_transform(2, 2),
            crs: Crs::new("bogus"),
        };
        container.push(Raster::new(broken, RasterData::UInt16(vec![1, 2, 3, 4])).unwrap());

        let report = Extractor::new().extract_all(&container, outdir.path());
        assert!(!report.is_success());
        assert_eq!(report.written.len(), 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "Unreferenced");
        assert!(report.written.iter().all(|p| p.exists()));
        assert_eq!(std::fs::read_dir(outdir.path()).unwrap().count(), 2);
    }

    #[test]
    fn test_missing_subdataset_is_not_found_and_writes_nothing() {
        let outdir = TempDir::new().unwrap();
        let container = two_subdataset_container();

        let result = Extractor::new().extract(&container, "NoSuchBand", outdir.path());
        assert!(matches!(result, Err(Error::NotFound(_))), "{:?}", result);
        assert_eq!(std::fs::read_dir(outdir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_missing_container_is_not_found() {
        let outdir = TempDir::new().unwrap();
        let result = extract(
            Path::new("/nonexistent/VNP46A2.h30v05.h5"),
            "DNB",
            outdir.path(),
        );
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_cancelled_extraction_reports_every_subdataset() {
        let outdir = TempDir::new().unwrap();
        let container = two_subdataset_container();
        let flag = Arc::new(AtomicBool::new(true));

        let report = Extractor::new()
            .with_cancel_flag(flag)
            .extract_all(&container, outdir.path());
        assert!(report.written.is_empty());
        assert_eq!(report.failed.len(), 2);
        assert!(report
            .failed
            .iter()
            .all(|(_, e)| matches!(e, Error::Cancelled(_))));
        assert_eq!(std::fs::read_dir(outdir.path()).unwrap().count(), 0);
    }
}
