//! USGS Landsat MTL metadata and sensor selection.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use crate::error::{DemError, Result};

/// Flattened `KEY = VALUE` pairs of an MTL text file.
///
/// Group nesting is dropped; keys are unique across groups in every MTL
/// layout USGS has shipped, so a later duplicate simply replaces an earlier one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MtlInfo {
    values: HashMap<String, String>,
}

impl MtlInfo {
    pub fn parse<R: Read>(reader: R) -> Result<Self> {
        let mut values = HashMap::new();

        for (index, line) in BufReader::new(reader).lines().enumerate() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            if trimmed == "END" {
                break;
            }

            let Some((key, value)) = trimmed.split_once('=') else {
                return Err(DemError::MalformedMetadata {
                    line: index + 1,
                    content: trimmed.to_string(),
                });
            };
            let key = key.trim();
            if key.is_empty() {
                return Err(DemError::MalformedMetadata {
                    line: index + 1,
                    content: trimmed.to_string(),
                });
            }
            if key == "GROUP" || key == "END_GROUP" {
                continue;
            }

            let value = value.trim().trim_matches('"');
            values.insert(key.to_string(), value.to_string());
        }

        Ok(Self { values })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        Self::parse(File::open(path)?)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn require(&self, key: &str) -> Result<&str> {
        self.get(key)
            .ok_or_else(|| DemError::MissingMetadata(key.to_string()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Landsat sensor family, as far as band layout is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sensor {
    LandsatMss,
    /// Landsat 4, 5 and 7 (TM / ETM+).
    Landsat47,
    /// Landsat 8 and 9 (OLI / TIRS).
    LandsatOli,
}

impl Sensor {
    pub fn from_mtl(mtl: &MtlInfo) -> Result<Self> {
        let spacecraft = mtl.require("SPACECRAFT_ID")?;
        let sensor = mtl.require("SENSOR_ID")?;

        if sensor == "MSS" {
            return Ok(Sensor::LandsatMss);
        }
        match spacecraft.chars().last() {
            Some('4' | '5' | '7') => Ok(Sensor::Landsat47),
            Some('8' | '9') => Ok(Sensor::LandsatOli),
            _ => Err(DemError::UnsupportedSensor {
                spacecraft: spacecraft.to_string(),
                sensor: sensor.to_string(),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Sensor::LandsatMss => "Landsat MSS",
            Sensor::Landsat47 => "Landsat 4-7",
            Sensor::LandsatOli => "Landsat 8-9",
        }
    }
}
