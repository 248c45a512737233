//! The global sinusoidal tile grid VIIRS land products are gridded on.

use std::fmt;

use crate::error::{Error, Result};
use crate::raster::GeoTransform;

/// Width and height of one tile, in metres.
pub const TILE_SIZE: f64 = 1_111_950.519_766_555_4;
/// Upper-left corner of tile h00v00.
pub const GRID_ORIGIN_X: f64 = -20_015_109.355_798;
pub const GRID_ORIGIN_Y: f64 = 10_007_554.677_899;
pub const HORIZONTAL_TILES: u32 = 36;
pub const VERTICAL_TILES: u32 = 18;

/// Horizontal and vertical tile numbers, `h00v00` at the upper left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileId {
    pub horizontal: u32,
    pub vertical: u32,
}

impl TileId {
    pub fn new(horizontal: u32, vertical: u32) -> Result<Self> {
        if horizontal >= HORIZONTAL_TILES || vertical >= VERTICAL_TILES {
            return Err(Error::Metadata(format!(
                "tile h{}v{} is outside the {}x{} sinusoidal grid",
                horizontal, vertical, HORIZONTAL_TILES, VERTICAL_TILES
            )));
        }
        Ok(Self {
            horizontal,
            vertical,
        })
    }

    /// Parses tile numbers given as text, e.g. `"08"` and `"05"`.
    pub fn parse(horizontal: &str, vertical: &str) -> Result<Self> {
        let number = |s: &str| {
            s.trim()
                .parse::<u32>()
                .map_err(|_| Error::Metadata(format!("invalid tile number '{}'", s)))
        };
        Self::new(number(horizontal)?, number(vertical)?)
    }

    /// Finds the `hHHvVV` token of a product file name such as
    /// `VNP46A2.A2021001.h30v05.001.2021020101010.h5`.
    pub fn from_file_name(name: &str) -> Option<Self> {
        name.split(['.', '_']).find_map(|token| {
            let bytes = token.as_bytes();
            if bytes.len() != 6 || bytes[0] != b'h' || bytes[3] != b'v' {
                return None;
            }
            Self::parse(token.get(1..3)?, token.get(4..6)?).ok()
        })
    }

    /// Geotransform of a `cols` x `rows` raster covering this tile.
    pub fn geo_transform(&self, cols: usize, rows: usize) -> GeoTransform {
        GeoTransform::new(
            GRID_ORIGIN_X + self.horizontal as f64 * TILE_SIZE,
            GRID_ORIGIN_Y - self.vertical as f64 * TILE_SIZE,
            TILE_SIZE / cols as f64,
            -TILE_SIZE / rows as f64,
        )
    }
}

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "h{:02}v{:02}", self.horizontal, self.vertical)
    }
}
