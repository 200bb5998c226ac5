use anyhow::{Context, Result};
use clap::Parser;
use landsat_dem::{make_qa_mask, BlockDriver, MtlInfo, QaMaskConfig, Sensor};
use std::path::PathBuf;
use tracing::info;

/// Mask pixels flagged in a Landsat QA band.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input QA band image
    #[arg(short, long, value_name = "FILE")]
    infile: PathBuf,

    /// MTL text file of USGS metadata
    #[arg(short, long, value_name = "FILE")]
    mtl: PathBuf,

    /// Output QA mask file
    #[arg(short, long, value_name = "FILE")]
    output: PathBuf,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let mtl = MtlInfo::from_file(&args.mtl)
        .with_context(|| format!("Failed to read MTL file {:?}", args.mtl))?;
    let sensor = Sensor::from_mtl(&mtl)?;
    info!("Sensor: {}", sensor.name());

    let config = QaMaskConfig::for_sensor(sensor);
    make_qa_mask(&args.infile, &args.output, &config, &BlockDriver::default())?;

    Ok(())
}
