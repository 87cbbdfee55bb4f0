// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Raw Stokes exposures, and how they are grouped into waveplate pairs,
//! observations and instrument configurations.
//!
//! A raw Stokes exposure holds two channels over wavelength: index 0 is the
//! intensity-like O+E sum, index 1 is the O−E difference. Exposures are
//! identified by (object, configuration, waveplate position, cycle).


use std::{fmt::Display, path::PathBuf, str::FromStr};

use itertools::Itertools;
use log::trace;
use ndarray::prelude::*;
use thiserror::Error;
use vec1::Vec1;

use crate::io::read::ExposureRecord;

lazy_static::lazy_static! {
    static ref RAW_STOKES_NAME: regex::Regex =
        regex::Regex::new(r"^(?P<object>.+)_(?P<config>c[^_]*)_(?P<wp>h\d\d)_(?P<cycle>\d+)$")
            .expect("regex is valid");
}

/// A regularly-sampled wavelength axis \[Angstroms\].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WavelengthGrid {
    pub start: f64,
    pub step: f64,
    pub len: usize,
}

impl WavelengthGrid {
    pub fn wavelengths(&self) -> Array1<f64> {
        Array1::from_iter((0..self.len).map(|i| self.start + self.step * i as f64))
    }
}

/// A half-wave-plate station pair, e.g. "h04" for stations 0 and 4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WaveplateCode([u8; 2]);

impl WaveplateCode {
    pub fn new(first: u8, second: u8) -> WaveplateCode {
        WaveplateCode([first, second])
    }

    /// The first waveplate station. This sets the orientation of the raw
    /// instrumental frame.
    pub fn first(self) -> u8 {
        self.0[0]
    }
}

impl Display for WaveplateCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.0[0], self.0[1])
    }
}

impl FromStr for WaveplateCode {
    type Err = ExposureNameError;

    /// Accepts both "04" and "h04".
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix('h').unwrap_or(s);
        let mut chars = digits.chars().map(|c| c.to_digit(10));
        match (chars.next(), chars.next(), chars.next()) {
            (Some(Some(a)), Some(Some(b)), None) => Ok(WaveplateCode::new(a as u8, b as u8)),
            _ => Err(ExposureNameError::Waveplate(s.to_string())),
        }
    }
}

/// What identifies a raw Stokes exposure.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExposureKey {
    pub object: String,
    pub config: String,
    pub waveplate: WaveplateCode,
    pub cycle: u32,
}

impl ExposureKey {
    /// Parse a file stem following `<object>_c<config>_h<wp>_<cycle>`.
    pub fn from_file_stem(stem: &str) -> Result<ExposureKey, ExposureNameError> {
        let caps = RAW_STOKES_NAME
            .captures(stem)
            .ok_or_else(|| ExposureNameError::NotRawStokes(stem.to_string()))?;
        let cycle = caps["cycle"]
            .parse()
            .map_err(|_| ExposureNameError::NotRawStokes(stem.to_string()))?;
        Ok(ExposureKey {
            object: caps["object"].to_string(),
            config: caps["config"].to_string(),
            waveplate: caps["wp"].parse()?,
            cycle,
        })
    }
}

/// One raw Stokes exposure, read in and validated.
#[derive(Debug, Clone)]
pub struct RawStokesExposure {
    pub key: ExposureKey,
    pub grid: WavelengthGrid,

    /// Raw Stokes \[channel (sum, difference)\]\[wavelength\].
    pub stokes_sw: Array2<f64>,
    pub var_sw: Array2<f64>,
    pub bpm_sw: Array2<bool>,

    /// The name of the waveplate pattern this exposure was taken with.
    pub pattern: String,
    pub lamp: String,
    /// \[degrees\]
    pub telescope_pa: f64,
    /// The tracker rotation angle \[degrees\].
    pub tracker_rho: f64,

    pub path: PathBuf,
}

impl RawStokesExposure {
    /// Validate a record read from `path`. The identifying key comes from the
    /// record itself when all of its fields are present, otherwise from the
    /// file name.
    pub fn from_record(
        record: ExposureRecord,
        path: PathBuf,
    ) -> Result<RawStokesExposure, ExposureNameError> {
        let ExposureRecord {
            object,
            config,
            waveplate,
            cycle,
            pattern,
            lamp,
            telescope_pa,
            tracker_rho,
            grating: _,
            wavelength_start,
            wavelength_step,
            stokes,
            variance,
            bad_pixels,
        } = record;

        let key = match (object, config, waveplate, cycle) {
            (Some(object), Some(config), Some(waveplate), Some(cycle)) => ExposureKey {
                object,
                config,
                waveplate: waveplate.parse()?,
                cycle,
            },
            _ => {
                let stem = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .ok_or_else(|| ExposureNameError::NotRawStokes(path.display().to_string()))?;
                ExposureKey::from_file_stem(stem)?
            }
        };

        let len = stokes[0].len();
        let lengths = [
            stokes[1].len(),
            variance[0].len(),
            variance[1].len(),
            bad_pixels[0].len(),
            bad_pixels[1].len(),
        ];
        if len == 0 || lengths.iter().any(|&l| l != len) {
            return Err(ExposureNameError::ArrayLengths {
                path: path.display().to_string(),
            });
        }

        let to_array = |rows: [Vec<f64>; 2]| {
            let [a, b] = rows;
            let flat = a.into_iter().chain(b).collect::<Vec<_>>();
            Array2::from_shape_vec((2, len), flat)
        };
        let stokes_sw = to_array(stokes).map_err(|_| ExposureNameError::ArrayLengths {
            path: path.display().to_string(),
        })?;
        let var_sw = to_array(variance).map_err(|_| ExposureNameError::ArrayLengths {
            path: path.display().to_string(),
        })?;
        let bpm_sw = Array2::from_shape_fn((2, len), |(s, w)| bad_pixels[s][w] != 0);

        Ok(RawStokesExposure {
            key,
            grid: WavelengthGrid {
                start: wavelength_start,
                step: wavelength_step,
                len,
            },
            stokes_sw,
            var_sw,
            bpm_sw,
            pattern: pattern.trim().to_uppercase(),
            lamp: lamp.trim().to_uppercase(),
            telescope_pa,
            tracker_rho,
            path,
        })
    }
}

/// All of the cycles taken at one waveplate position of an observation,
/// sorted by cycle.
#[derive(Debug, Clone)]
pub struct PairExposures {
    pub waveplate: WaveplateCode,
    pub exposures: Vec1<RawStokesExposure>,
}

/// All of the waveplate pairs of one (object, configuration).
#[derive(Debug, Clone)]
pub struct ObservationExposures {
    pub object: String,
    pub config: String,
    pub pattern: String,
    pub pairs: Vec1<PairExposures>,
}

/// Every exposure taken in one instrument configuration. All exposures in a
/// configuration share the same wavelength grid.
#[derive(Debug, Clone)]
pub struct ConfigurationExposures {
    pub config: String,
    pub grid: WavelengthGrid,
    pub observations: Vec1<ObservationExposures>,
}

impl ConfigurationExposures {
    pub fn first_exposure(&self) -> &RawStokesExposure {
        self.observations.first().pairs.first().exposures.first()
    }
}

/// Sort exposures by configuration, object, waveplate and cycle, then group
/// them. Configurations whose exposures don't all share a wavelength grid are
/// returned separately and should be skipped.
pub fn group_exposures(
    mut exposures: Vec<RawStokesExposure>,
) -> (Vec<ConfigurationExposures>, Vec<GroupingError>) {
    exposures.sort_by(|a, b| {
        (&a.key.config, &a.key.object, a.key.waveplate, a.key.cycle).cmp(&(
            &b.key.config,
            &b.key.object,
            b.key.waveplate,
            b.key.cycle,
        ))
    });

    let mut configs = vec![];
    let mut errors = vec![];
    for (config, config_exposures) in &exposures
        .into_iter()
        .group_by(|e| e.key.config.clone())
    {
        let config_exposures = config_exposures.collect::<Vec<_>>();
        let grid = config_exposures[0].grid;
        if let Some(bad) = config_exposures.iter().find(|e| e.grid != grid) {
            errors.push(GroupingError::GridMismatch {
                config,
                path: bad.path.display().to_string(),
            });
            continue;
        }

        let mut observations = vec![];
        for (_, obs_exposures) in &config_exposures
            .into_iter()
            .group_by(|e| e.key.object.clone())
        {
            let mut pairs = vec![];
            for (waveplate, pair_exposures) in &obs_exposures.group_by(|e| e.key.waveplate) {
                // Each group is non-empty.
                if let Ok(exposures) = Vec1::try_from_vec(pair_exposures.collect()) {
                    pairs.push(PairExposures {
                        waveplate,
                        exposures,
                    });
                }
            }
            if let Ok(pairs) = Vec1::try_from_vec(pairs) {
                let first = pairs.first().exposures.first();
                trace!(
                    "Grouped observation {}_{} with {} pairs",
                    first.key.object,
                    first.key.config,
                    pairs.len()
                );
                observations.push(ObservationExposures {
                    object: first.key.object.clone(),
                    config: first.key.config.clone(),
                    pattern: first.pattern.clone(),
                    pairs,
                });
            }
        }

        if let Ok(observations) = Vec1::try_from_vec(observations) {
            configs.push(ConfigurationExposures {
                config,
                grid,
                observations,
            });
        }
    }

    (configs, errors)
}

#[derive(Error, Debug)]
pub enum ExposureNameError {
    #[error("'{0}' is not a raw Stokes file name (expected <object>_c<config>_h<wp>_<cycle>)")]
    NotRawStokes(String),

    #[error("'{0}' is not a waveplate code (expected two digits, e.g. h04)")]
    Waveplate(String),

    #[error("The Stokes, variance and bad-pixel arrays in '{path}' don't all have the same non-zero length")]
    ArrayLengths { path: String },
}

#[derive(Error, Debug)]
pub enum GroupingError {
    #[error("Configuration {config}: the wavelength grid of '{path}' doesn't match the other exposures; skipping the configuration")]
    GridMismatch { config: String, path: String },
}
