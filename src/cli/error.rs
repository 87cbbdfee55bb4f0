// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Error type for all polstokes-related errors. This should be the *only*
//! error enum that is publicly visible.

use thiserror::Error;

use super::final_stokes::FinalStokesArgsError;
use crate::{
    calibration::CalibrationError,
    io::{
        read::ExposureReadError,
        write::{FileWriteError, FinalStokesWriteError},
        GlobError,
    },
    params::FinalStokesError,
    pattern::PatternError,
};

/// The *only* publicly visible error from polstokes. Each error message should
/// say where to look for help, unless it's "generic".
#[derive(Error, Debug)]
pub enum PolstokesError {
    /// An error related to final-stokes arguments.
    #[error("{0}\n\nSee for more info: polstokes final-stokes --help")]
    FinalStokes(String),

    /// An error related to reading raw Stokes exposures.
    #[error("{0}\n\nRaw Stokes exposures are JSON or YAML files named <object>_c<config>_h<wp>_<cycle>. See for more info: polstokes final-stokes --help")]
    ExposureRead(String),

    /// An error related to calibration tables.
    #[error("{0}\n\nCalibration tables are whitespace-separated columns starting with wavelength. Calibration stages can be disabled with --no-hw-cal, --no-pol-zeropoint and --no-pa-zeropoint.")]
    Calibration(String),

    /// An error related to waveplate pattern tables.
    #[error("{0}\n\nPattern table lines are: NAME nstokes npositions a0 b0 a1 b1 ...")]
    Pattern(String),

    /// An error related to writing final Stokes spectra.
    #[error("{0}\n\nSee for more info: polstokes final-stokes --help")]
    Write(String),

    /// An error related to argument files.
    #[error("{0}\n\nSee for more info: polstokes final-stokes --help")]
    ArgFile(String),

    /// A generic error that can't be clarified further with documentation, e.g.
    /// IO errors.
    #[error("{0}")]
    Generic(String),
}

// When changing the error propagation below, ensure `Self::from(e)` uses the
// correct `e`!

impl From<FinalStokesArgsError> for PolstokesError {
    fn from(e: FinalStokesArgsError) -> Self {
        Self::FinalStokes(e.to_string())
    }
}

impl From<FinalStokesError> for PolstokesError {
    fn from(e: FinalStokesError) -> Self {
        match e {
            FinalStokesError::ExposureRead(e) => Self::from(e),
            FinalStokesError::Write(e) => Self::from(e),
        }
    }
}

impl From<ExposureReadError> for PolstokesError {
    fn from(e: ExposureReadError) -> Self {
        Self::ExposureRead(e.to_string())
    }
}

impl From<CalibrationError> for PolstokesError {
    fn from(e: CalibrationError) -> Self {
        Self::Calibration(e.to_string())
    }
}

impl From<PatternError> for PolstokesError {
    fn from(e: PatternError) -> Self {
        Self::Pattern(e.to_string())
    }
}

impl From<FinalStokesWriteError> for PolstokesError {
    fn from(e: FinalStokesWriteError) -> Self {
        Self::Write(e.to_string())
    }
}

impl From<FileWriteError> for PolstokesError {
    fn from(e: FileWriteError) -> Self {
        Self::Write(e.to_string())
    }
}

impl From<GlobError> for PolstokesError {
    fn from(e: GlobError) -> Self {
        Self::Generic(e.to_string())
    }
}

impl From<std::io::Error> for PolstokesError {
    fn from(e: std::io::Error) -> Self {
        Self::Generic(e.to_string())
    }
}
