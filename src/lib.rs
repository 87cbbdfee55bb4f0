// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Combination and calibration of beam-split spectropolarimetric Stokes spectra.

Raw Stokes exposures of an observation are taken at several waveplate
positions, repeated over cycles. `polstokes` culls inconsistent cycles,
combines waveplate pairs into fractional polarisation, applies the
polarimetric calibration and writes final Stokes I, Q, U spectra with
variances, covariance and a bad-pixel mask.
 */

pub mod calibration;
mod cli;
pub mod combine;
pub mod constants;
pub mod cycles;
pub mod exposure;
pub mod io;
pub(crate) mod math;
pub mod params;
pub mod pattern;
pub mod report;
pub mod rotation;
pub mod syserr;

// Re-exports.
pub use cli::{Polstokes, PolstokesError};

use crossbeam_utils::atomic::AtomicCell;

lazy_static::lazy_static! {
    /// Are progress bars being drawn? This should only ever be enabled by CLI
    /// code.
    static ref PROGRESS_BARS: AtomicCell<bool> = AtomicCell::new(false);
}
