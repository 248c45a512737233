use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use geo::{LineString, Polygon};
use rayon::ThreadPoolBuilder;
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};
use viirs_cog::scene::{DEFAULT_DENSIFICATION_FACTOR, DEFAULT_SIMPLIFICATION_TOLERANCE};
use viirs_cog::{
    process_container, process_outline_scene, process_scene, scene_id, Extractor,
    FootprintOptions, GeodeticGeometry, Hdf5Container, Raster, RasterSource, SceneSink, Strategy,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Number of worker threads (default: number of CPU cores)
    #[arg(short, long, global = true)]
    threads: Option<usize>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a COG for each subdataset in an H5 file
    CreateCogs {
        /// VIIRS H5 file
        #[arg(value_name = "INFILE")]
        infile: PathBuf,

        /// Directory for the COG files (default: the H5 file's directory)
        #[arg(short, long, value_name = "DIR")]
        outdir: Option<PathBuf>,
    },

    /// Compute the footprint of one H5 file and write it as a GeoJSON feature
    CreateFootprint {
        /// VIIRS H5 file
        #[arg(value_name = "INFILE")]
        infile: PathBuf,

        /// Directory for the `<scene>.json` feature
        #[arg(value_name = "OUTDIR")]
        outdir: PathBuf,

        #[command(flatten)]
        footprint: FootprintArgs,

        /// Convert the H5 subdatasets into COGs next to the H5 file
        #[arg(short, long)]
        create_cogs: bool,

        /// Text file with one subdataset COG path per line; used instead of the H5 file
        #[arg(short, long, value_name = "FILE")]
        file_list: Option<PathBuf>,
    },

    /// Compute footprints for every H5 file in a directory or list file
    CreateFootprints {
        /// Directory searched recursively for `.h5` files, or a text file listing them
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Directory for the `<scene>.json` features
        #[arg(value_name = "OUTDIR")]
        outdir: PathBuf,

        #[command(flatten)]
        footprint: FootprintArgs,

        /// Convert the H5 subdatasets into COGs next to each H5 file
        #[arg(short, long)]
        create_cogs: bool,
    },
}

#[derive(Args, Debug, Clone)]
struct FootprintArgs {
    /// Geometry strategy for antimeridian scenes: normalize or split
    #[arg(short, long, default_value_t = Strategy::Split)]
    antimeridian_strategy: Strategy,

    /// Factor by which to densify the footprint before reprojection
    #[arg(short, long, default_value_t = DEFAULT_DENSIFICATION_FACTOR)]
    densification_factor: usize,

    /// Error tolerance in footprint simplification, in degrees
    #[arg(short, long, default_value_t = DEFAULT_SIMPLIFICATION_TOLERANCE)]
    simplification_tolerance: f64,

    /// Follow the valid pixels instead of the raster outline
    #[arg(short, long)]
    use_data_footprint: bool,
}

impl FootprintArgs {
    fn options(&self) -> Result<FootprintOptions> {
        let options = FootprintOptions {
            strategy: self.antimeridian_strategy,
            densification_factor: self.densification_factor,
            simplification_tolerance: self.simplification_tolerance,
            use_data_footprint: self.use_data_footprint,
        };
        options.validate()?;
        Ok(options)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let start_time = std::time::Instant::now();

    if let Some(threads) = cli.threads {
        ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("Failed to build thread pool")?;
    }

    match &cli.command {
        Command::CreateCogs { infile, outdir } => create_cogs(infile, outdir.as_deref())?,
        Command::CreateFootprint {
            infile,
            outdir,
            footprint,
            create_cogs,
            file_list,
        } => {
            let options = footprint.options()?;
            fs::create_dir_all(outdir)?;
            let mut sink = GeoJsonSink::new(outdir);
            match file_list {
                Some(list) => footprint_from_file_list(infile, list, &options, &mut sink)?,
                None => footprint_from_container(infile, *create_cogs, &options, &mut sink)?,
            }
        }
        Command::CreateFootprints {
            input,
            outdir,
            footprint,
            create_cogs,
        } => {
            let options = footprint.options()?;
            fs::create_dir_all(outdir)?;
            process_batch(input, outdir, *create_cogs, &options)?;
        }
    }

    let elapsed = start_time.elapsed();
    info!("Total processing time: {:?}", elapsed);

    Ok(())
}

fn create_cogs(infile: &Path, outdir: Option<&Path>) -> Result<()> {
    let outdir = outdir.unwrap_or_else(|| h5_dir(infile));
    fs::create_dir_all(outdir)?;

    let container = Hdf5Container::open(infile)
        .with_context(|| format!("Failed to open {}", infile.display()))?;
    let report = Extractor::new().extract_all(&container, outdir);

    for path in &report.written {
        info!("Written COG: {:?}", path);
    }
    if !report.failed.is_empty() {
        error!("Failed to extract {} subdatasets:", report.failed.len());
        for (name, err) in &report.failed {
            error!("  {}: {}", name, err);
        }
        anyhow::bail!("{} subdatasets failed to extract", report.failed.len());
    }
    Ok(())
}

fn footprint_from_container(
    infile: &Path,
    create_cogs: bool,
    options: &FootprintOptions,
    sink: &mut GeoJsonSink,
) -> Result<()> {
    info!("Processing file: {:?}", infile);
    let container = Hdf5Container::open(infile)
        .with_context(|| format!("Failed to open {}", infile.display()))?;
    let cog_dir = create_cogs.then(|| h5_dir(infile));
    process_container(&container, cog_dir, &Extractor::new(), options, sink)
        .with_context(|| format!("Failed to process {}", infile.display()))?;
    Ok(())
}

fn footprint_from_file_list(
    infile: &Path,
    list: &Path,
    options: &FootprintOptions,
    sink: &mut GeoJsonSink,
) -> Result<()> {
    let assets = read_file_list(list)?;
    let scene = scene_id(infile);
    info!("Processing {} COGs of scene {}", assets.len(), scene);

    if options.use_data_footprint {
        let rasters = assets
            .iter()
            .map(|p| Raster::open(p).with_context(|| format!("Failed to read {}", p.display())))
            .collect::<Result<Vec<_>>>()?;
        process_scene(&scene, &rasters, &assets, options, sink)?;
    } else {
        let sources = assets
            .iter()
            .map(|p| {
                RasterSource::open(p).with_context(|| format!("Failed to read {}", p.display()))
            })
            .collect::<Result<Vec<_>>>()?;
        process_outline_scene(&scene, &sources, &assets, options, sink)?;
    }
    Ok(())
}

fn process_batch(
    input: &Path,
    outdir: &Path,
    create_cogs: bool,
    options: &FootprintOptions,
) -> Result<()> {
    use rayon::prelude::*;

    let files = if input.is_dir() {
        collect_h5_files(input)?
    } else {
        read_file_list(input)?
    };
    info!("Found {} H5 files", files.len());

    let results: Vec<Result<()>> = files
        .par_iter()
        .map(|path| {
            let mut sink = GeoJsonSink::new(outdir);
            footprint_from_container(path, create_cogs, options, &mut sink)
        })
        .collect();

    let mut errors = Vec::new();
    for (i, result) in results.into_iter().enumerate() {
        if let Err(e) = result {
            errors.push(format!("{}: {:#}", files[i].display(), e));
        }
    }

    if !errors.is_empty() {
        error!("Failed to process {} scenes:", errors.len());
        for err in &errors {
            error!("  {}", err);
        }
        anyhow::bail!("{} scenes failed to process", errors.len());
    }

    Ok(())
}

fn h5_dir(infile: &Path) -> &Path {
    match infile.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    }
}

fn read_file_list(list: &Path) -> Result<Vec<PathBuf>> {
    let text = fs::read_to_string(list)
        .with_context(|| format!("Failed to read file list {}", list.display()))?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(PathBuf::from)
        .collect())
}

fn collect_h5_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            files.extend(collect_h5_files(&path)?);
        } else if path.extension().and_then(|s| s.to_str()) == Some("h5") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Writes each scene as `<outdir>/<scene id>.json`, a GeoJSON feature.
struct GeoJsonSink {
    outdir: PathBuf,
}

impl GeoJsonSink {
    fn new(outdir: &Path) -> Self {
        Self {
            outdir: outdir.to_path_buf(),
        }
    }
}

impl SceneSink for GeoJsonSink {
    fn accept(
        &mut self,
        scene_id: &str,
        assets: &[PathBuf],
        geometry: &GeodeticGeometry,
    ) -> viirs_cog::Result<()> {
        let feature = feature(scene_id, assets, geometry);
        let path = self.outdir.join(format!("{}.json", scene_id));
        let text = serde_json::to_string_pretty(&feature).map_err(std::io::Error::from)?;
        fs::write(&path, text)?;
        info!("Written footprint: {:?}", path);
        Ok(())
    }
}

fn feature(scene_id: &str, assets: &[PathBuf], geometry: &GeodeticGeometry) -> Value {
    let geometry_json = match geometry {
        GeodeticGeometry::Polygon(p) => json!({
            "type": "Polygon",
            "coordinates": polygon_coordinates(p),
        }),
        GeodeticGeometry::MultiPolygon(mp) => json!({
            "type": "MultiPolygon",
            "coordinates": mp.0.iter().map(polygon_coordinates).collect::<Vec<_>>(),
        }),
    };
    let assets: Vec<String> = assets.iter().map(|p| p.display().to_string()).collect();

    json!({
        "type": "Feature",
        "id": scene_id,
        "bbox": geometry.bounds(),
        "geometry": geometry_json,
        "properties": { "assets": assets },
    })
}

fn polygon_coordinates(polygon: &Polygon<f64>) -> Value {
    std::iter::once(polygon.exterior())
        .chain(polygon.interiors())
        .map(ring_coordinates)
        .collect()
}

fn ring_coordinates(ring: &LineString<f64>) -> Value {
    ring.coords().map(|c| json!([c.x, c.y])).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, MultiPolygon};

    #[test]
    fn test_feature_of_split_geometry() {
        let east = polygon![(x: 179.0, y: 0.0), (x: 180.0, y: 0.0), (x: 180.0, y: 1.0), (x: 179.0, y: 1.0), (x: 179.0, y: 0.0)];
        let west = polygon![(x: -180.0, y: 0.0), (x: -179.0, y: 0.0), (x: -179.0, y: 1.0), (x: -180.0, y: 1.0), (x: -180.0, y: 0.0)];
        let geometry = GeodeticGeometry::MultiPolygon(MultiPolygon(vec![east, west]));

        let value = feature("scene", &[PathBuf::from("a.tif")], &geometry);
        assert_eq!(value["type"], "Feature");
        assert_eq!(value["id"], "scene");
        assert_eq!(value["geometry"]["type"], "MultiPolygon");
        assert_eq!(value["geometry"]["coordinates"][1][0][0], json!([-180.0, 0.0]));
        assert_eq!(value["bbox"], json!([-180.0, 0.0, 180.0, 1.0]));
        assert_eq!(value["properties"]["assets"], json!(["a.tif"]));
    }

    #[test]
    fn test_sink_writes_scene_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = GeoJsonSink::new(dir.path());
        let geometry = GeodeticGeometry::Polygon(
            polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0), (x: 0.0, y: 0.0)],
        );
        sink.accept("VNP46A2.A2021001.h30v05.001", &[], &geometry)
            .unwrap();

        let text =
            fs::read_to_string(dir.path().join("VNP46A2.A2021001.h30v05.001.json")).unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["geometry"]["type"], "Polygon");
    }

    #[test]
    fn test_read_file_list_skips_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let list = dir.path().join("cogs.txt");
        fs::write(&list, "a.tif\n\n  b.tif  \n# comment\n").unwrap();
        assert_eq!(
            read_file_list(&list).unwrap(),
            vec![PathBuf::from("a.tif"), PathBuf::from("b.tif")]
        );
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["viirs-cog", "create-footprint", "scene.h5", "out"]);
        let Command::CreateFootprint { footprint, .. } = cli.command else {
            panic!("wrong subcommand");
        };
        let options = footprint.options().unwrap();
        assert_eq!(options, FootprintOptions::default());

        let cli = Cli::parse_from([
            "viirs-cog",
            "create-footprint",
            "scene.h5",
            "out",
            "-a",
            "NORMALIZE",
            "-d",
            "1",
            "-s",
            "0",
            "-u",
        ]);
        let Command::CreateFootprint { footprint, .. } = cli.command else {
            panic!("wrong subcommand");
        };
        assert_eq!(footprint.antimeridian_strategy, Strategy::Normalize);
        assert_eq!(footprint.densification_factor, 1);
        assert!(footprint.use_data_footprint);
    }
}
