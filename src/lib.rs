pub mod container;
pub mod error;
pub mod extract;
pub mod footprint;
pub mod geometry;
pub mod grid;
pub mod projection;
pub mod raster;
pub mod scene;
pub mod sidecar;
pub mod writer;

pub use container::{scene_id, Hdf5Container, InMemoryContainer, SubdatasetContainer};
pub use error::{Error, Result};
pub use extract::{extract, ExtractReport, Extractor};
pub use footprint::trace;
pub use geometry::{GeodeticGeometry, ProjectedPolygon, Strategy};
pub use grid::TileId;
pub use projection::Crs;
pub use raster::{DataType, GeoTransform, Raster, RasterData, RasterSource};
pub use scene::{
    footprint, outline_footprint, process_container, process_outline_scene, process_scene,
    FootprintOptions, Scene, SceneSink,
};
pub use sidecar::Sidecar;
pub use writer::{CogOptions, CogWriter};
