// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors from reading raw Stokes exposures.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExposureReadError {
    #[error("Exposure file '{path}' doesn't have a recognised extension. Valid extensions are: {valid}")]
    UnknownType { path: String, valid: &'static str },

    #[error("Couldn't decode json from '{path}': {err}")]
    Json {
        path: String,
        err: serde_json::Error,
    },

    #[error("Couldn't decode yaml from '{path}': {err}")]
    Yaml {
        path: String,
        err: serde_yaml::Error,
    },

    #[error(transparent)]
    IO(#[from] std::io::Error),
}
