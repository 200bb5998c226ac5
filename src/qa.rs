//! Pixel mask from a Landsat QA bit-field band.
//!
//! See <https://www.usgs.gov/landsat-missions/landsat-collection-2-quality-assessment-bands>
//! for the bit layout.

use anyhow::{Context, Result};
use gdal::Dataset;
use std::path::Path;
use tracing::info;

use crate::block::{read_block, Block, BlockDriver};
use crate::error::DemError;
use crate::mtl::Sensor;
use crate::template::TemplateGridSpec;
use crate::writer::GeoTiffWriter;

/// Bit `low..=high` of `value`, shifted down to bit 0.
pub fn extract_bits(value: u64, high: u32, low: u32) -> crate::Result<u64> {
    if low > high || high >= 64 {
        return Err(DemError::InvalidBitRange { high, low });
    }
    let width = high - low + 1;
    let mask = if width == 64 { u64::MAX } else { (1u64 << width) - 1 };
    Ok((value >> low) & mask)
}

/// [`extract_bits`] over a QA array, truncated to `u8`.
pub fn extract_bits_u8(values: &[u16], high: u32, low: u32) -> crate::Result<Vec<u8>> {
    // Validate once; the range cannot fail per element afterwards.
    extract_bits(0, high, low)?;
    values
        .iter()
        .map(|&v| extract_bits(v as u64, high, low).map(|bits| bits as u8))
        .collect()
}

/// A QA flag that marks a pixel as bad.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QaCondition {
    /// Terrain occlusion / dropped pixel, bit 9 of `QA_RADSAT`.
    DroppedPixel,
    /// Radiometric saturation of a 1-based band number.
    Saturation { band: u32 },
}

impl QaCondition {
    pub fn bit(&self) -> u32 {
        match self {
            QaCondition::DroppedPixel => 9,
            QaCondition::Saturation { band } => band.saturating_sub(1),
        }
    }

    pub fn name(&self) -> String {
        match self {
            QaCondition::DroppedPixel => "DROPPED_PIXEL".to_string(),
            QaCondition::Saturation { band } => format!("SATURATION_B{}", band),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QaMaskConfig {
    pub conditions: Vec<QaCondition>,
}

impl Default for QaMaskConfig {
    fn default() -> Self {
        Self {
            conditions: vec![QaCondition::DroppedPixel],
        }
    }
}

impl QaMaskConfig {
    /// Conditions checked for `sensor`. Only dropped pixels are flagged for
    /// every sensor at present.
    pub fn for_sensor(_sensor: Sensor) -> Self {
        Self::default()
    }
}

/// 1 where any configured condition is set, 0 elsewhere.
pub fn qa_mask_block(values: &[u16], config: &QaMaskConfig) -> crate::Result<Vec<u8>> {
    let mut mask = vec![0u8; values.len()];
    for condition in &config.conditions {
        let bit = condition.bit();
        let flags = extract_bits_u8(values, bit, bit)?;
        for (m, f) in mask.iter_mut().zip(flags) {
            *m |= f;
        }
    }
    Ok(mask)
}

/// Write a UInt8 mask of `infile`'s QA band to `outfile` on the same grid.
pub fn make_qa_mask(
    infile: &Path,
    outfile: &Path,
    config: &QaMaskConfig,
    driver: &BlockDriver,
) -> Result<()> {
    let input =
        Dataset::open(infile).with_context(|| format!("Failed to open QA band {:?}", infile))?;
    let grid = TemplateGridSpec::from_dataset(infile, &input)?;

    let names: Vec<String> = config.conditions.iter().map(QaCondition::name).collect();
    let names = names.join(",");
    info!("Building QA mask ({}) from {:?}", names, infile);

    let mut output = GeoTiffWriter::new().create_aligned::<u8>(
        &grid,
        outfile,
        None,
        &[("QA_CONDITIONS", names.as_str())],
    )?;

    driver.apply(&grid, &mut output, |block| {
        let qa = read_block::<u16>(&input, &block.window)?;
        Ok(Block {
            rows: qa.rows,
            cols: qa.cols,
            data: qa_mask_block(&qa.data, config)?,
        })
    })?;

    info!("QA mask written: {:?}", outfile);
    Ok(())
}
