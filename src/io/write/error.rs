// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors associated with writing out final Stokes spectra.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FinalStokesWriteError {
    #[error(transparent)]
    FileWrite(#[from] FileWriteError),

    #[error("Couldn't write '{path}' as JSON: {err}")]
    Json {
        path: PathBuf,
        err: serde_json::Error,
    },

    #[error("Couldn't write '{path}' as YAML: {err}")]
    Yaml {
        path: PathBuf,
        err: serde_yaml::Error,
    },

    #[error(transparent)]
    IO(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum FileWriteError {
    #[error("Cannot write to the specified file '{file}'. Do you have write permissions set?")]
    FileNotWritable { file: String },

    #[error(
        "Couldn't create directory '{0}' for output files. Do you have write permissions set?"
    )]
    NewDirectory(PathBuf),

    #[error(transparent)]
    IO(#[from] std::io::Error),
}
