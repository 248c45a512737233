//! In-memory description of one subdataset: its pixel grid, georeferencing
//! and (optionally) its pixel values.

use std::path::Path;

use gdal::raster::{GdalDataType, GdalType, RasterBand};
use gdal::{Dataset, Metadata};
use geo::{Coord, LineString, Polygon};

use crate::error::{Error, Result};
use crate::projection::Crs;

/// Metadata key the COG writer uses to record which subdataset a tile came from.
pub const SUBDATASET_METADATA_KEY: &str = "SUBDATASET";

/// Affine pixel-to-projected transform in GDAL coefficient order.
///
/// ```text
/// x = origin_x + col * pixel_width + row * row_rotation
/// y = origin_y + col * col_rotation + row * pixel_height
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub pixel_width: f64,
    pub row_rotation: f64,
    pub origin_y: f64,
    pub col_rotation: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// North-up transform without rotation.
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            pixel_width,
            row_rotation: 0.0,
            origin_y,
            col_rotation: 0.0,
            pixel_height,
        }
    }

    pub fn from_gdal(coeffs: [f64; 6]) -> Self {
        Self {
            origin_x: coeffs[0],
            pixel_width: coeffs[1],
            row_rotation: coeffs[2],
            origin_y: coeffs[3],
            col_rotation: coeffs[4],
            pixel_height: coeffs[5],
        }
    }

    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.origin_x,
            self.pixel_width,
            self.row_rotation,
            self.origin_y,
            self.col_rotation,
            self.pixel_height,
        ]
    }

    /// Projected coordinate of a (fractional) pixel-grid position.
    pub fn apply(&self, col: f64, row: f64) -> Coord<f64> {
        Coord {
            x: self.origin_x + col * self.pixel_width + row * self.row_rotation,
            y: self.origin_y + col * self.col_rotation + row * self.pixel_height,
        }
    }

    /// GDAL's identity transform, which is what datasets without georeferencing report.
    pub fn is_default(&self) -> bool {
        self.to_gdal() == [0.0, 1.0, 0.0, 0.0, 0.0, 1.0]
    }
}

/// Pixel data types that survive extraction unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    UInt8,
    UInt16,
    Int16,
    UInt32,
    Int32,
    Float32,
    Float64,
}

impl DataType {
    pub fn from_gdal(data_type: GdalDataType) -> Result<Self> {
        match data_type {
            GdalDataType::UInt8 => Ok(DataType::UInt8),
            GdalDataType::UInt16 => Ok(DataType::UInt16),
            GdalDataType::Int16 => Ok(DataType::Int16),
            GdalDataType::UInt32 => Ok(DataType::UInt32),
            GdalDataType::Int32 => Ok(DataType::Int32),
            GdalDataType::Float32 => Ok(DataType::Float32),
            GdalDataType::Float64 => Ok(DataType::Float64),
            other => Err(Error::UnsupportedDataType(format!("{:?}", other))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DataType::UInt8 => "UInt8",
            DataType::UInt16 => "UInt16",
            DataType::Int16 => "Int16",
            DataType::UInt32 => "UInt32",
            DataType::Int32 => "Int32",
            DataType::Float32 => "Float32",
            DataType::Float64 => "Float64",
        }
    }
}

/// Row-major pixel values of a single band, kept in their native type.
#[derive(Debug, Clone, PartialEq)]
pub enum RasterData {
    UInt8(Vec<u8>),
    UInt16(Vec<u16>),
    Int16(Vec<i16>),
    UInt32(Vec<u32>),
    Int32(Vec<i32>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
}

macro_rules! dispatch {
    ($data:expr, $values:ident => $body:expr) => {
        match $data {
            RasterData::UInt8($values) => $body,
            RasterData::UInt16($values) => $body,
            RasterData::Int16($values) => $body,
            RasterData::UInt32($values) => $body,
            RasterData::Int32($values) => $body,
            RasterData::Float32($values) => $body,
            RasterData::Float64($values) => $body,
        }
    };
}

pub(crate) use dispatch;

impl RasterData {
    pub fn data_type(&self) -> DataType {
        match self {
            RasterData::UInt8(_) => DataType::UInt8,
            RasterData::UInt16(_) => DataType::UInt16,
            RasterData::Int16(_) => DataType::Int16,
            RasterData::UInt32(_) => DataType::UInt32,
            RasterData::Int32(_) => DataType::Int32,
            RasterData::Float32(_) => DataType::Float32,
            RasterData::Float64(_) => DataType::Float64,
        }
    }

    pub fn len(&self) -> usize {
        dispatch!(self, values => values.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `true` for every pixel that is finite and not equal to `nodata`.
    ///
    /// `nodata` is compared in the band's own type, so a fill value parsed from
    /// text matches the `f32` pixels it was written as.
    pub fn valid_mask(&self, nodata: Option<f64>) -> Vec<bool> {
        dispatch!(self, values => valid_pixels(values, nodata))
    }

    fn read(band: &RasterBand, cols: usize, rows: usize) -> Result<Self> {
        let data = match DataType::from_gdal(band.band_type())? {
            DataType::UInt8 => RasterData::UInt8(read_values(band, cols, rows)?),
            DataType::UInt16 => RasterData::UInt16(read_values(band, cols, rows)?),
            DataType::Int16 => RasterData::Int16(read_values(band, cols, rows)?),
            DataType::UInt32 => RasterData::UInt32(read_values(band, cols, rows)?),
            DataType::Int32 => RasterData::Int32(read_values(band, cols, rows)?),
            DataType::Float32 => RasterData::Float32(read_values(band, cols, rows)?),
            DataType::Float64 => RasterData::Float64(read_values(band, cols, rows)?),
        };
        Ok(data)
    }
}

/// Native pixel types and how a nodata value is expressed in each of them.
trait Pixel: Copy + PartialEq {
    /// `None` when no pixel of this type can hold `nodata`.
    fn from_nodata(nodata: f64) -> Option<Self>;

    fn is_finite(self) -> bool;
}

macro_rules! integer_pixel {
    ($($t:ty),*) => {$(
        impl Pixel for $t {
            fn from_nodata(nodata: f64) -> Option<Self> {
                let value = nodata as $t;
                (value as f64 == nodata).then_some(value)
            }

            fn is_finite(self) -> bool {
                true
            }
        }
    )*};
}

integer_pixel!(u8, u16, i16, u32, i32);

impl Pixel for f32 {
    fn from_nodata(nodata: f64) -> Option<Self> {
        Some(nodata as f32)
    }

    fn is_finite(self) -> bool {
        f32::is_finite(self)
    }
}

impl Pixel for f64 {
    fn from_nodata(nodata: f64) -> Option<Self> {
        Some(nodata)
    }

    fn is_finite(self) -> bool {
        f64::is_finite(self)
    }
}

fn valid_pixels<T: Pixel>(values: &[T], nodata: Option<f64>) -> Vec<bool> {
    let nodata = nodata.and_then(T::from_nodata);
    values
        .iter()
        .map(|&v| Pixel::is_finite(v) && nodata.map_or(true, |nd| v != nd))
        .collect()
}

fn read_values<T: GdalType + Copy>(band: &RasterBand, cols: usize, rows: usize) -> Result<Vec<T>> {
    let buffer = band.read_as::<T>((0, 0), (cols, rows), (cols, rows), None)?;
    Ok(buffer.data().to_vec())
}

/// One named 2-D array and the metadata needed to georeference it.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterSource {
    pub name: String,
    pub cols: usize,
    pub rows: usize,
    pub data_type: DataType,
    pub nodata: Option<f64>,
    pub geo_transform: GeoTransform,
    pub crs: Crs,
}

impl RasterSource {
    /// Reads band 1 metadata of a georeferenced raster file such as a written COG.
    pub fn open(path: &Path) -> Result<Self> {
        let dataset = open_dataset(path)?;
        Self::from_dataset(&dataset, path)
    }

    fn from_dataset(dataset: &Dataset, path: &Path) -> Result<Self> {
        let (cols, rows) = dataset.raster_size();
        let band = dataset.rasterband(1)?;
        let name = dataset
            .metadata_item(SUBDATASET_METADATA_KEY, "")
            .or_else(|| {
                path.file_stem()
                    .and_then(|s| s.to_str())
                    .map(|s| s.to_string())
            })
            .unwrap_or_default();

        Ok(Self {
            name,
            cols,
            rows,
            data_type: DataType::from_gdal(band.band_type())?,
            nodata: band.no_data_value(),
            geo_transform: GeoTransform::from_gdal(dataset.geo_transform()?),
            crs: Crs::from_dataset(dataset)?,
        })
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// The pixel-grid outline in projected coordinates, first vertex repeated last.
    ///
    /// Rotated geotransforms give a parallelogram.
    pub fn outline(&self) -> Polygon<f64> {
        let (cols, rows) = (self.cols as f64, self.rows as f64);
        let gt = &self.geo_transform;
        let ring = vec![
            gt.apply(0.0, 0.0),
            gt.apply(0.0, rows),
            gt.apply(cols, rows),
            gt.apply(cols, 0.0),
            gt.apply(0.0, 0.0),
        ];
        Polygon::new(LineString::from(ring), vec![])
    }
}

/// A [`RasterSource`] together with its pixel values.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    pub source: RasterSource,
    pub data: RasterData,
}

impl Raster {
    pub fn new(source: RasterSource, data: RasterData) -> Result<Self> {
        if data.len() != source.cols * source.rows {
            return Err(Error::InvalidParameter(format!(
                "{}: expected {} values for a {}x{} grid, got {}",
                source.name,
                source.cols * source.rows,
                source.cols,
                source.rows,
                data.len()
            )));
        }
        if data.data_type() != source.data_type {
            return Err(Error::InvalidParameter(format!(
                "{}: declared {} but data is {}",
                source.name,
                source.data_type.name(),
                data.data_type().name()
            )));
        }
        Ok(Self { source, data })
    }

    /// Reads metadata and the full band 1 of a georeferenced raster file.
    pub fn open(path: &Path) -> Result<Self> {
        let dataset = open_dataset(path)?;
        let source = RasterSource::from_dataset(&dataset, path)?;
        let band = dataset.rasterband(1)?;
        let data = RasterData::read(&band, source.cols, source.rows)?;
        Raster::new(source, data)
    }

    pub(crate) fn from_band(source: RasterSource, band: &RasterBand) -> Result<Self> {
        let data = RasterData::read(band, source.cols, source.rows)?;
        Raster::new(source, data)
    }

    pub fn valid_mask(&self) -> Vec<bool> {
        self.data.valid_mask(self.source.nodata)
    }
}

pub(crate) fn open_dataset(path: &Path) -> Result<Dataset> {
    if !path.exists() {
        return Err(Error::NotFound(path.display().to_string()));
    }
    Ok(Dataset::open(path)?)
}
