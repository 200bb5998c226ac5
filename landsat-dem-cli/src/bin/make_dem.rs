use anyhow::{Context, Result};
use clap::Parser;
use landsat_dem::fetch::default_cache_dir;
use landsat_dem::{
    make_dem_image, DemOptions, ElevationStagingCache, FetcherConfig, GdalWarp, MtlInfo, Product,
    Sensor, SrtmFetcher,
};
use rayon::ThreadPoolBuilder;
use std::path::PathBuf;
use tracing::info;

/// Make a DEM image pixel-aligned with a Landsat scene.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// MTL text file of USGS metadata
    #[arg(short, long, value_name = "FILE")]
    mtl: PathBuf,

    /// Image to use as the template grid for the output DEM
    #[arg(short, long, value_name = "FILE")]
    templateimg: PathBuf,

    /// Output DEM image
    #[arg(short, long, value_name = "FILE")]
    outfile: PathBuf,

    /// Elevation product (SRTM1 or SRTM3)
    #[arg(long, default_value_t = Product::Srtm3)]
    product: Product,

    /// Margin around the scene footprint, in degrees
    #[arg(long, default_value_t = landsat_dem::bbox::DEFAULT_BUFFER_DEGREES)]
    buffer: f64,

    /// Directory for downloaded SRTM tiles
    #[arg(long, value_name = "DIR")]
    cache_dir: Option<PathBuf>,

    /// Directory for the staged DEM (default: the template image's directory)
    #[arg(long, value_name = "DIR")]
    staging_dir: Option<PathBuf>,

    /// Block edge length in pixels
    #[arg(long, default_value_t = landsat_dem::block::DEFAULT_BLOCK_SIZE)]
    block_size: usize,

    /// Tile URL template with {name}, {lat_dir} and {continent} placeholders
    #[arg(long)]
    url_template: Option<String>,

    /// Number of worker threads (default: number of CPU cores)
    #[arg(short = 'j', long)]
    threads: Option<usize>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let start_time = std::time::Instant::now();

    if let Some(threads) = args.threads {
        ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("Failed to build thread pool")?;
    }

    let mtl = MtlInfo::from_file(&args.mtl)
        .with_context(|| format!("Failed to read MTL file {:?}", args.mtl))?;
    let sensor = Sensor::from_mtl(&mtl)?;
    info!(
        "Scene {} ({})",
        mtl.get("LANDSAT_PRODUCT_ID").unwrap_or("unknown"),
        sensor.name()
    );

    let fetcher = SrtmFetcher::new(FetcherConfig {
        cache_dir: args.cache_dir.unwrap_or_else(default_cache_dir),
        url_template: args.url_template,
        ..Default::default()
    });
    let cache = ElevationStagingCache::new(fetcher, GdalWarp::default());

    let options = DemOptions {
        product: args.product,
        buffer_degrees: args.buffer,
        block_size: (args.block_size, args.block_size),
        staging_dir: args.staging_dir,
    };
    make_dem_image(&args.templateimg, &args.outfile, &options, &cache)?;

    info!("Total processing time: {:?}", start_time.elapsed());
    Ok(())
}
