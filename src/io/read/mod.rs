// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Code to read raw Stokes exposures and calibration tables.

mod error;
mod table;

pub use error::ExposureReadError;
pub(crate) use table::read_table;
pub use table::TableReadError;

use std::{
    fs::File,
    io::{BufReader, Read},
    path::Path,
    str::FromStr,
};

use itertools::Itertools;
use log::trace;
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString};

use crate::constants::NO_LAMP;

#[derive(Debug, Display, EnumIter, EnumString, Clone, Copy, PartialEq, Eq)]
/// All supported raw Stokes exposure formats.
pub(crate) enum ExposureFileType {
    #[strum(serialize = "json")]
    Json,
    #[strum(to_string = "yaml", serialize = "yml")]
    Yaml,
}

lazy_static::lazy_static! {
    pub(crate) static ref EXPOSURE_FILE_EXTENSIONS: String = ExposureFileType::iter().join(", ");
}

fn default_lamp() -> String {
    NO_LAMP.to_string()
}

/// A raw Stokes exposure as it is stored on disk. Arrays are indexed
/// \[channel (sum, difference)\]\[wavelength\].
///
/// The identifying fields (object, configuration, waveplate and cycle) may be
/// left out, in which case they are parsed from the file name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExposureRecord {
    #[serde(default)]
    pub object: Option<String>,
    #[serde(default)]
    pub config: Option<String>,
    #[serde(default)]
    pub waveplate: Option<String>,
    #[serde(default)]
    pub cycle: Option<u32>,

    pub pattern: String,
    #[serde(default = "default_lamp")]
    pub lamp: String,
    pub telescope_pa: f64,
    #[serde(default)]
    pub tracker_rho: f64,
    #[serde(default)]
    pub grating: Option<String>,

    pub wavelength_start: f64,
    pub wavelength_step: f64,

    pub stokes: [Vec<f64>; 2],
    pub variance: [Vec<f64>; 2],
    pub bad_pixels: [Vec<u8>; 2],
}

/// Read a raw Stokes exposure record. The format is determined by the file
/// extension.
pub fn read_exposure(path: &Path) -> Result<ExposureRecord, ExposureReadError> {
    trace!("Reading exposure {}", path.display());
    let file_type = path
        .extension()
        .and_then(|e| e.to_str())
        .and_then(|e| ExposureFileType::from_str(&e.to_lowercase()).ok())
        .ok_or_else(|| ExposureReadError::UnknownType {
            path: path.display().to_string(),
            valid: EXPOSURE_FILE_EXTENSIONS.as_str(),
        })?;

    let mut contents = String::new();
    BufReader::new(File::open(path)?).read_to_string(&mut contents)?;
    let record = match file_type {
        ExposureFileType::Json => {
            serde_json::from_str(&contents).map_err(|e| ExposureReadError::Json {
                path: path.display().to_string(),
                err: e,
            })?
        }
        ExposureFileType::Yaml => {
            serde_yaml::from_str(&contents).map_err(|e| ExposureReadError::Yaml {
                path: path.display().to_string(),
                err: e,
            })?
        }
    };
    Ok(record)
}
