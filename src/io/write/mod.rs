// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Code to assemble and write out final Stokes spectra.

mod error;
pub use error::{FileWriteError, FinalStokesWriteError};

use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use itertools::Itertools;
use log::trace;
use ndarray::prelude::*;
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString};

use crate::{
    calibration::CalibrationFrame, cli::Warn, combine::Observation, exposure::WavelengthGrid,
    syserr::SystematicError,
};

#[derive(Debug, Display, EnumIter, EnumString, Clone, Copy, PartialEq, Eq)]
/// All write-supported final Stokes formats.
pub enum FinalStokesOutputType {
    #[strum(serialize = "json")]
    Json,

    #[strum(serialize = "yaml")]
    Yaml,
}

lazy_static::lazy_static! {
    pub(crate) static ref FINAL_STOKES_OUTPUT_EXTENSIONS: String = FinalStokesOutputType::iter().join(", ");
}

/// The final Stokes spectrum of an observation, as written to disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalStokesSpectrum {
    pub object: String,
    pub config: String,
    pub name: String,
    pub pattern: String,
    pub frame: CalibrationFrame,
    pub wavelength_start: f64,
    pub wavelength_step: f64,
    /// The meaning of the rows of `stokes` and `bad_pixels`.
    pub stokes_axis: String,
    /// The meaning of the rows of `variance`.
    pub variance_axis: String,
    /// \[I, Q, U\]\[wavelength\]
    pub stokes: Vec<Vec<f64>>,
    /// \[I, Q, U, QU covariance\]\[wavelength\]
    pub variance: Vec<Vec<f64>>,
    /// \[I, Q, U\]\[wavelength\]; 1 is bad.
    pub bad_pixels: Vec<Vec<u8>>,
    /// The estimated systematic error \[percent\]; zero if there was no
    /// significant excess chi-square or nothing to test.
    pub syserr_percent: f64,
    /// Which calibrations were applied.
    pub provenance: Vec<String>,
}

impl FinalStokesSpectrum {
    /// Assemble the output of an observation. Every Stokes parameter is
    /// flagged where Q and U are not usable, and any non-finite value is
    /// zeroed and flagged.
    #[allow(clippy::too_many_arguments)]
    pub fn assemble(
        observation: &Observation,
        frame: CalibrationFrame,
        grid: WavelengthGrid,
        stokes_fw: ArrayView2<f64>,
        var_fw: ArrayView2<f64>,
        ok_w: ArrayView1<bool>,
        syserr: SystematicError,
        provenance: Vec<String>,
    ) -> FinalStokesSpectrum {
        assert_eq!(stokes_fw.dim(), (3, grid.len));
        assert_eq!(var_fw.dim(), (4, grid.len));
        assert_eq!(ok_w.len(), grid.len);

        let mut bad_w = ok_w.mapv(|ok| !ok);
        for i_wav in 0..grid.len {
            let finite = stokes_fw.column(i_wav).iter().all(|v| v.is_finite())
                && var_fw.column(i_wav).iter().all(|v| v.is_finite());
            if !finite {
                trace!("Flagging non-finite values at wavelength index {i_wav}");
                bad_w[i_wav] = true;
            }
        }
        let sanitise = |row: ArrayView1<f64>| {
            row.iter()
                .map(|&v| if v.is_finite() { v } else { 0.0 })
                .collect::<Vec<_>>()
        };

        FinalStokesSpectrum {
            object: observation.object.clone(),
            config: observation.config.clone(),
            name: observation.name(),
            pattern: observation.pattern.to_uppercase(),
            frame,
            wavelength_start: grid.start,
            wavelength_step: grid.step,
            stokes_axis: "I,Q,U".to_string(),
            variance_axis: "I,Q,U,QU".to_string(),
            stokes: stokes_fw.outer_iter().map(sanitise).collect(),
            variance: var_fw.outer_iter().map(sanitise).collect(),
            bad_pixels: vec![bad_w.iter().map(|&bad| u8::from(bad)).collect(); 3],
            syserr_percent: syserr.percent(),
            provenance,
        }
    }

    pub fn file_name(&self, output_type: FinalStokesOutputType) -> String {
        format!("{}_stokes.{output_type}", self.name)
    }
}

/// Write a final Stokes spectrum into `dir`, returning the path of the new
/// file.
pub fn write_final_stokes(
    spectrum: &FinalStokesSpectrum,
    dir: &Path,
    output_type: FinalStokesOutputType,
) -> Result<PathBuf, FinalStokesWriteError> {
    let path = dir.join(spectrum.file_name(output_type));
    can_write_to_file(&path)?;
    trace!("Writing {}", path.display());

    let mut writer = BufWriter::new(File::create(&path)?);
    match output_type {
        FinalStokesOutputType::Json => serde_json::to_writer_pretty(&mut writer, spectrum)
            .map_err(|err| FinalStokesWriteError::Json {
                path: path.clone(),
                err,
            })?,
        FinalStokesOutputType::Yaml => {
            serde_yaml::to_writer(&mut writer, spectrum).map_err(|err| {
                FinalStokesWriteError::Yaml {
                    path: path.clone(),
                    err,
                }
            })?
        }
    }
    writer.flush()?;

    Ok(path)
}

/// Check that a directory exists or can be created, and that it's writable.
pub(crate) fn can_write_to_dir(dir: &Path) -> Result<(), FileWriteError> {
    trace!("Testing whether we can write to {}", dir.display());

    if !dir.exists() {
        match std::fs::DirBuilder::new()
            .recursive(true)
            .create(dir)
            .map_err(|e| e.kind())
        {
            Ok(()) => return Ok(()),
            Err(std::io::ErrorKind::PermissionDenied) => {
                return Err(FileWriteError::NewDirectory(dir.to_path_buf()))
            }
            Err(e) => return Err(FileWriteError::IO(e.into())),
        }
    }

    let metadata = std::fs::metadata(dir)?;
    if !metadata.is_dir() || metadata.permissions().readonly() {
        return Err(FileWriteError::FileNotWritable {
            file: dir.display().to_string(),
        });
    }
    Ok(())
}

/// Check that a file can be written, warning if it would be overwritten.
pub(crate) fn can_write_to_file(file: &Path) -> Result<(), FileWriteError> {
    trace!("Testing whether we can write to {}", file.display());

    let exists = can_write_to_file_inner(file)?;
    if exists {
        format!("Will overwrite the existing file '{}'", file.display()).warn();
    }
    Ok(())
}

fn can_write_to_file_inner(file: &Path) -> Result<bool, FileWriteError> {
    let file_exists = file.exists();

    match std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(file)
        .map_err(|e| e.kind())
    {
        // File is writable. Don't leave an empty file behind if it didn't
        // exist before.
        Ok(_) => {
            if !file_exists {
                std::fs::remove_file(file).map_err(FileWriteError::IO)?;
            }
        }

        // The directories leading up to the file don't exist; make them.
        Err(std::io::ErrorKind::NotFound) => {
            if let Some(p) = file.parent() {
                match std::fs::DirBuilder::new()
                    .recursive(true)
                    .create(p)
                    .map_err(|e| e.kind())
                {
                    Ok(()) => (),
                    Err(std::io::ErrorKind::PermissionDenied) => {
                        return Err(FileWriteError::NewDirectory(p.to_path_buf()))
                    }
                    Err(e) => return Err(FileWriteError::IO(e.into())),
                }
            }
        }

        Err(std::io::ErrorKind::PermissionDenied) => {
            return Err(FileWriteError::FileNotWritable {
                file: file.display().to_string(),
            })
        }

        Err(e) => {
            return Err(FileWriteError::IO(e.into()));
        }
    }

    Ok(file_exists)
}
