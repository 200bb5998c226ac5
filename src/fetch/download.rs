//! Tile retrieval into an on-disk cache.
//!
//! Tiles are written as `<name>.hgt.part` and renamed once complete, so an
//! interrupted download never looks like a cached tile. Tiles the server does
//! not have (open ocean) are remembered with an empty `<name>.void` marker.
//! Any other HTTP failure, 403 included, is retried and never cached.

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use reqwest::blocking::Client;
use reqwest::StatusCode;
use std::fs;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};
use zip::ZipArchive;

use super::srtm::TileId;
use super::Product;

/// Compression of a downloaded tile, detected from the URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
    Zip,
}

impl Compression {
    pub fn from_url(url: &str) -> Self {
        let lower = url.to_lowercase();
        if lower.ends_with(".gz") {
            Compression::Gzip
        } else if lower.ends_with(".zip") {
            Compression::Zip
        } else {
            Compression::None
        }
    }
}

/// Decompress a downloaded tile body.
pub fn decode(bytes: &[u8], compression: Compression) -> Result<Vec<u8>> {
    match compression {
        Compression::None => Ok(bytes.to_vec()),
        Compression::Gzip => {
            let mut data = Vec::new();
            GzDecoder::new(bytes)
                .read_to_end(&mut data)
                .context("Failed to decompress gzip")?;
            Ok(data)
        }
        Compression::Zip => extract_hgt_from_zip(bytes),
    }
}

/// What a tile request's HTTP status means for the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileStatus {
    Found,
    /// The source has no such tile; it is cached as void.
    Missing,
}

/// Only 404 means the tile does not exist. Every other failure is an error
/// and gets retried.
pub fn classify_status(status: StatusCode) -> Result<TileStatus> {
    match status {
        StatusCode::NOT_FOUND => Ok(TileStatus::Missing),
        s if s.is_success() => Ok(TileStatus::Found),
        s => anyhow::bail!("HTTP {}", s),
    }
}

enum Download {
    Data(Vec<u8>),
    Missing,
}

/// Result of looking up one tile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TileFile {
    Present(PathBuf),
    /// The source has no data for this tile.
    Void,
}

pub struct TileDownloader {
    client: Client,
    url_template: String,
    max_retries: u32,
    dir: PathBuf,
}

impl TileDownloader {
    pub fn new(
        product: Product,
        url_template: Option<&str>,
        cache_dir: &Path,
        timeout_secs: u64,
        max_retries: u32,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            url_template: url_template
                .unwrap_or(product.default_url_template())
                .to_string(),
            max_retries,
            dir: cache_dir.join(product.name()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Cached tile path, downloading it first if needed.
    pub fn ensure_tile(&self, tile: TileId) -> Result<TileFile> {
        let dest = self.dir.join(format!("{}.hgt", tile));
        let void_marker = self.dir.join(format!("{}.void", tile));
        if dest.exists() {
            return Ok(TileFile::Present(dest));
        }
        if void_marker.exists() {
            return Ok(TileFile::Void);
        }

        let Some(url) = build_url(&self.url_template, tile) else {
            debug!("No source region for tile {}; treating as void", tile);
            return Ok(TileFile::Void);
        };

        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create tile cache {:?}", self.dir))?;

        let mut last_error = None;
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                std::thread::sleep(Duration::from_millis(500 * attempt as u64));
                debug!("Retrying {} (attempt {})", url, attempt + 1);
            }

            match self.download(&url) {
                Ok(Download::Data(bytes)) => {
                    let part = self.dir.join(format!("{}.hgt.part", tile));
                    fs::write(&part, &bytes)
                        .with_context(|| format!("Failed to write {:?}", part))?;
                    fs::rename(&part, &dest)
                        .with_context(|| format!("Failed to move {:?} into place", part))?;
                    info!("Downloaded tile {}", tile);
                    return Ok(TileFile::Present(dest));
                }
                Ok(Download::Missing) => {
                    fs::write(&void_marker, b"")
                        .with_context(|| format!("Failed to write {:?}", void_marker))?;
                    debug!("Tile {} not available at source; marked void", tile);
                    return Ok(TileFile::Void);
                }
                Err(e) => {
                    warn!("Download of {} failed: {:#}", url, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| anyhow::anyhow!("Unknown error"))
            .context(format!("Failed to download tile {}", tile)))
    }

    /// Remove `.part` files left behind by interrupted downloads.
    pub fn clean(&self) -> Result<usize> {
        if !self.dir.exists() {
            return Ok(0);
        }

        let mut removed = 0;
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|s| s.to_str()) == Some("part") {
                fs::remove_file(&path)
                    .with_context(|| format!("Failed to remove stale download {:?}", path))?;
                removed += 1;
            }
        }
        if removed > 0 {
            info!("Removed {} stale partial downloads from {:?}", removed, self.dir);
        }
        Ok(removed)
    }

    fn download(&self, url: &str) -> Result<Download> {
        let response = self.client.get(url).send()?;
        match classify_status(response.status())? {
            TileStatus::Missing => return Ok(Download::Missing),
            TileStatus::Found => {}
        }

        let bytes = response.bytes()?;
        decode(&bytes, Compression::from_url(url)).map(Download::Data)
    }
}

fn extract_hgt_from_zip(data: &[u8]) -> Result<Vec<u8>> {
    let mut archive = ZipArchive::new(Cursor::new(data)).context("Failed to read ZIP archive")?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).context("Failed to read ZIP entry")?;
        if entry.name().to_lowercase().ends_with(".hgt") {
            let mut contents = Vec::new();
            entry
                .read_to_end(&mut contents)
                .context("Failed to extract .hgt from ZIP")?;
            return Ok(contents);
        }
    }

    anyhow::bail!("No .hgt file found in ZIP archive")
}

/// Expand `{name}`, `{lat_dir}` and `{continent}` in a URL template.
///
/// Returns `None` when the template needs a continent and the tile lies
/// outside every continent directory.
pub fn build_url(template: &str, tile: TileId) -> Option<String> {
    let continent = if template.contains("{continent}") {
        continent_of(tile)?
    } else {
        ""
    };

    Some(
        template
            .replace("{name}", &tile.to_string())
            .replace("{lat_dir}", &tile.lat_dir())
            .replace("{continent}", continent),
    )
}

/// Continent directory used by the ArduPilot SRTM3 mirror.
fn continent_of(tile: TileId) -> Option<&'static str> {
    let lat = tile.lat as f64 + 0.5;
    let lon = tile.lon as f64 + 0.5;

    if (15.0..=60.0).contains(&lat) && (-170.0..=-50.0).contains(&lon) {
        Some("North_America")
    } else if (-60.0..=15.0).contains(&lat) && (-90.0..=-30.0).contains(&lon) {
        Some("South_America")
    } else if (-50.0..=-10.0).contains(&lat) && (110.0..=180.0).contains(&lon) {
        Some("Australia")
    } else if (-35.0..=35.0).contains(&lat) && (-20.0..=55.0).contains(&lon) {
        Some("Africa")
    } else if (0.0..=60.0).contains(&lat) && (-15.0..=180.0).contains(&lon) {
        Some("Eurasia")
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_compression_from_url() {
        assert_eq!(Compression::from_url("a/N35E139.hgt.gz"), Compression::Gzip);
        assert_eq!(Compression::from_url("a/N35E139.hgt.ZIP"), Compression::Zip);
        assert_eq!(Compression::from_url("a/N35E139.hgt"), Compression::None);
    }

    #[test]
    fn test_build_url() {
        let tile = TileId { lat: 35, lon: 139 };
        assert_eq!(
            build_url(Product::Srtm1.default_url_template(), tile).unwrap(),
            "https://s3.amazonaws.com/elevation-tiles-prod/skadi/N35/N35E139.hgt.gz"
        );
        assert_eq!(
            build_url(Product::Srtm3.default_url_template(), tile).unwrap(),
            "https://terrain.ardupilot.org/SRTM3/Eurasia/N35E139.hgt.zip"
        );

        // Mid-Pacific has no continent directory.
        let ocean = TileId { lat: 0, lon: -150 };
        assert!(build_url(Product::Srtm3.default_url_template(), ocean).is_none());
        assert!(build_url(Product::Srtm1.default_url_template(), ocean).is_some());
    }

    #[test]
    fn test_extract_hgt_from_zip() {
        let mut buf = Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut buf);
            let options = zip::write::SimpleFileOptions::default();
            writer.start_file("readme.txt", options).unwrap();
            writer.write_all(b"ignore me").unwrap();
            writer.start_file("N35E139.hgt", options).unwrap();
            writer.write_all(&[1, 2, 3, 4]).unwrap();
            writer.finish().unwrap();
        }

        let data = extract_hgt_from_zip(buf.get_ref()).unwrap();
        assert_eq!(data, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_decode_gzip_and_plain() {
        use flate2::write::GzEncoder;

        let body: Vec<u8> = (0..=255u8).cycle().take(5000).collect();
        let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(&body).unwrap();
        let gz = encoder.finish().unwrap();

        assert_eq!(decode(&gz, Compression::Gzip).unwrap(), body);
        assert_eq!(decode(&body, Compression::None).unwrap(), body);
        assert!(decode(b"not gzip", Compression::Gzip).is_err());
    }

    #[test]
    fn test_only_not_found_is_missing() {
        assert_eq!(classify_status(StatusCode::NOT_FOUND).unwrap(), TileStatus::Missing);
        assert_eq!(classify_status(StatusCode::OK).unwrap(), TileStatus::Found);
        assert!(classify_status(StatusCode::FORBIDDEN).is_err());
        assert!(classify_status(StatusCode::TOO_MANY_REQUESTS).is_err());
        assert!(classify_status(StatusCode::SERVICE_UNAVAILABLE).is_err());
        assert!(classify_status(StatusCode::INTERNAL_SERVER_ERROR).is_err());
    }

    #[test]
    fn test_cached_and_void_tiles_skip_network() {
        let temp_dir = TempDir::new().unwrap();
        // Unroutable template: any network access would fail the test.
        let downloader = TileDownloader::new(
            Product::Srtm3,
            Some("http://127.0.0.1:9/{name}.hgt"),
            temp_dir.path(),
            1,
            0,
        )
        .unwrap();
        fs::create_dir_all(downloader.dir()).unwrap();

        let cached = TileId { lat: 35, lon: 139 };
        fs::write(downloader.dir().join("N35E139.hgt"), b"x").unwrap();
        let void = TileId { lat: 0, lon: -150 };
        fs::write(downloader.dir().join("N00W150.void"), b"").unwrap();

        assert_eq!(
            downloader.ensure_tile(cached).unwrap(),
            TileFile::Present(downloader.dir().join("N35E139.hgt"))
        );
        assert_eq!(downloader.ensure_tile(void).unwrap(), TileFile::Void);
    }

    #[test]
    fn test_clean_removes_partial_downloads() {
        let temp_dir = TempDir::new().unwrap();
        let downloader =
            TileDownloader::new(Product::Srtm1, None, temp_dir.path(), 1, 0).unwrap();
        assert_eq!(downloader.clean().unwrap(), 0);

        fs::create_dir_all(downloader.dir()).unwrap();
        fs::write(downloader.dir().join("N10E010.hgt.part"), b"half").unwrap();
        fs::write(downloader.dir().join("N10E011.hgt"), b"whole").unwrap();

        assert_eq!(downloader.clean().unwrap(), 1);
        assert!(!downloader.dir().join("N10E010.hgt.part").exists());
        assert!(downloader.dir().join("N10E011.hgt").exists());
    }
}
