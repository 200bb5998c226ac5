//! Reprojection of a fetched geographic raster into the scene's CRS.

use anyhow::{Context, Result};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

use crate::resample::NODATA;

pub trait Reprojector: Send + Sync {
    /// Warp `src` into EPSG:`epsg`, writing a GeoTIFF at `dst`.
    fn reproject(&self, src: &Path, dst: &Path, epsg: u32) -> Result<()>;
}

/// Runs the `gdalwarp` command-line tool.
#[derive(Debug, Clone, PartialEq)]
pub struct GdalWarp {
    pub program: PathBuf,
    /// Value passed to `-r`.
    pub resampling: String,
}

impl Default for GdalWarp {
    fn default() -> Self {
        Self {
            program: PathBuf::from("gdalwarp"),
            resampling: "near".to_string(),
        }
    }
}

impl GdalWarp {
    pub fn args(&self, src: &Path, dst: &Path, epsg: u32) -> Vec<OsString> {
        let nodata = format!("{}", NODATA);
        let mut args: Vec<OsString> = [
            "-overwrite",
            "-of",
            "GTiff",
            "-t_srs",
        ]
        .iter()
        .map(OsString::from)
        .collect();
        args.push(format!("EPSG:{}", epsg).into());
        args.push("-r".into());
        args.push(self.resampling.clone().into());
        args.push("-srcnodata".into());
        args.push(nodata.clone().into());
        args.push("-dstnodata".into());
        args.push(nodata.into());
        args.push(src.into());
        args.push(dst.into());
        args
    }
}

impl Reprojector for GdalWarp {
    fn reproject(&self, src: &Path, dst: &Path, epsg: u32) -> Result<()> {
        let args = self.args(src, dst, epsg);
        debug!("Running {:?} {:?}", self.program, args);

        let output = Command::new(&self.program)
            .args(&args)
            .output()
            .with_context(|| format!("Failed to run {:?}", self.program))?;

        if !output.status.success() {
            let _ = fs::remove_file(dst);
            anyhow::bail!(
                "{:?} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok(())
    }
}
